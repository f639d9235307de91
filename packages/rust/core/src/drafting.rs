//! Outreach email drafting.

use chrono::Utc;
use leadscout_llm::{LlmClient, Prompt, ResponseSchema};
use leadscout_shared::{
    Company, CompanyType, DecisionMaker, DraftId, DraftTarget, EmailDraft, Result, ReviewState, RunSummary,
    SenderConfig, Stage,
};
use serde::Deserialize;
use tracing::{info, instrument};

/// Subjects longer than this get a warning.
pub const MAX_SUBJECT_CHARS: usize = 60;

/// Openers and filler that make an email read as mass-produced.
const GENERIC_PHRASES: &[&str] = &[
    "i hope this email finds you well",
    "i hope this finds you well",
    "i've been following",
    "i came across your",
    "testament to",
    "excited to share",
    "touch base",
];

const SYSTEM: &str = "You write short, specific cold outreach emails from a pharmaceutical \
business-development team to decision makers at biotech companies. Reference the company's \
program or trial concretely, propose one clear next step, and never use flattery or filler. \
Do not add a signature.";

/// Drafting knobs taken from configuration.
#[derive(Debug, Clone, Copy)]
pub struct DraftSettings<'a> {
    pub word_budget: usize,
    pub sender: &'a SenderConfig,
}

#[derive(Debug, Deserialize)]
struct DraftReply {
    subject: String,
    body: String,
    #[serde(default)]
    reasoning: Option<String>,
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Style warnings for a draft. Never blocks the draft.
pub fn quality_warnings(subject: &str, body: &str) -> Vec<String> {
    let mut warnings = Vec::new();
    let subject_len = subject.chars().count();
    if subject_len > MAX_SUBJECT_CHARS {
        warnings.push(format!(
            "subject is {subject_len} characters (over {MAX_SUBJECT_CHARS})"
        ));
    }
    let lowered = body.to_lowercase();
    for phrase in GENERIC_PHRASES {
        if lowered.contains(phrase) {
            warnings.push(format!("generic phrase: \"{phrase}\""));
        }
    }
    warnings
}

/// Sign-off block built from the sender settings. Empty when no name is configured.
pub fn signature(sender: &SenderConfig) -> String {
    let name = sender.name.trim();
    if name.is_empty() {
        return String::new();
    }
    let mut lines = vec!["Best regards,".to_string(), name.to_string()];
    match (sender.title.trim(), sender.company.trim()) {
        ("", "") => {}
        (title, "") => lines.push(title.to_string()),
        ("", company) => lines.push(company.to_string()),
        (title, company) => lines.push(format!("{title}, {company}")),
    }
    if !sender.email.trim().is_empty() {
        lines.push(sender.email.trim().to_string());
    }
    lines.join("\n")
}

/// Words in `body`, not counting the sender's signature when it ends the body.
pub fn body_word_count(body: &str, sender: &SenderConfig) -> usize {
    let signature = signature(sender);
    let text = if signature.is_empty() {
        body
    } else {
        body.trim_end()
            .strip_suffix(signature.as_str())
            .unwrap_or(body)
    };
    word_count(text)
}

/// Build a pending draft from model output.
///
/// The word budget applies to the body as written by the model; the signature
/// is appended afterwards and not counted.
pub fn build_draft(
    subject: &str,
    body: &str,
    reasoning: Option<String>,
    target: DraftTarget,
    attempt: u32,
    settings: DraftSettings<'_>,
) -> EmailDraft {
    let subject = subject.trim().to_string();
    let body = body.trim().to_string();
    let warnings = quality_warnings(&subject, &body);

    let signature = signature(settings.sender);
    let body = if signature.is_empty() {
        body
    } else {
        format!("{body}\n\n{signature}")
    };
    let words = body_word_count(&body, settings.sender);

    EmailDraft {
        id: DraftId::new(),
        subject,
        body,
        target,
        state: ReviewState::Pending,
        attempt,
        word_count: words,
        over_budget: words > settings.word_budget,
        warnings,
        reasoning: reasoning.filter(|r| !r.trim().is_empty()),
        generated_at: Utc::now(),
    }
}

fn brief(company: &Company, contact: &DecisionMaker, query: &str) -> String {
    let mut out = format!(
        "Therapeutic focus of our search: {query}\n\nRecipient: {} ({})\nCompany: {}\n",
        contact.name, contact.title, company.name
    );
    if company.company_type == CompanyType::VcFirm {
        out.push_str("This is a venture firm: offer help to its portfolio companies with stalled programs.\n");
    }
    if let Some(overview) = &company.overview {
        out.push_str(&format!("Overview: {overview}\n"));
    }
    if let Some(t) = &company.trial {
        out.push_str(&format!("Trial: {} \"{}\" status {}\n", t.id, t.title, t.status));
        if let Some(why) = &t.why_stopped {
            out.push_str(&format!("Why stopped: {why}\n"));
        }
    }
    if !company.fit_reason.is_empty() {
        out.push_str(&format!("Why they fit: {}\n", company.fit_reason));
    }
    if let Some(notes) = &contact.research_notes {
        out.push_str(&format!("\nResearch notes:\n{notes}\n"));
    }
    out
}

/// Generate one draft for `contact`. Never cached, so a repeat call yields a fresh draft.
#[instrument(skip_all, fields(company = %company.key, contact = %contact.name, attempt = attempt))]
pub async fn draft_email(
    llm: &LlmClient,
    company: &Company,
    contact: &DecisionMaker,
    query: &str,
    settings: DraftSettings<'_>,
    attempt: u32,
    previous: Option<&EmailDraft>,
) -> Result<EmailDraft> {
    let mut user = brief(company, contact, query);
    user.push_str(&format!(
        "\nKeep the body under {} words.",
        settings.word_budget
    ));
    if let Some(prev) = previous {
        user.push_str(&format!(
            "\nThe previous draft (subject \"{}\") was rejected; take a different angle.",
            prev.subject
        ));
    }

    let schema = ResponseSchema::object(
        &["subject", "body"],
        r#"{"subject": "...", "body": "...", "reasoning": "why this angle"}"#,
    );
    let reply: DraftReply = llm
        .complete_as(&Prompt::new(SYSTEM, user).uncached(), &schema)
        .await?;

    let target = DraftTarget {
        company_key: company.key.clone(),
        contact_name: contact.name.clone(),
    };
    Ok(build_draft(
        &reply.subject,
        &reply.body,
        reply.reasoning,
        target,
        attempt,
        settings,
    ))
}

/// One draft per decision maker. Failures are recorded and skipped.
pub async fn draft_all(
    llm: &LlmClient,
    companies: &[Company],
    query: &str,
    settings: DraftSettings<'_>,
    summary: &mut RunSummary,
) -> Vec<EmailDraft> {
    let mut drafts = Vec::new();
    for company in companies {
        for contact in &company.decision_makers {
            match draft_email(llm, company, contact, query, settings, 1, None).await {
                Ok(draft) => {
                    summary.processed(Stage::Drafting, 1);
                    drafts.push(draft);
                }
                Err(e) => {
                    summary.skipped(Stage::Drafting, 1);
                    summary.failure(Stage::Drafting, format!("{} / {}: {e}", company.name, contact.name));
                }
            }
        }
    }
    info!(drafts = drafts.len(), "drafting finished");
    drafts
}
