//! Research notes for decision makers: operator-supplied or synthesized from news.

use leadscout_discovery::SearchProvider;
use leadscout_llm::{LlmClient, Prompt, ResponseSchema};
use leadscout_shared::{Company, DecisionMaker, LeadScoutError, ResearchMode, Result, RunSummary, Stage};
use leadscout_storage::ResearchNotes;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::operator::Operator;

/// Number of news results fed into automatic research.
const NEWS_RESULTS: usize = 5;

const QUESTIONS_SYSTEM: &str = "You prepare a business-development rep for a cold outreach email. \
Propose short research questions the rep should answer about the contact and their company \
before writing, focused on recent news, pipeline setbacks and partnering needs.";

const SUMMARY_SYSTEM: &str = "You summarize recent news about a biotech company for a \
business-development rep preparing a personalized outreach email. Stick to facts present in \
the material.";

/// Questions shown when the model cannot propose any.
fn default_questions(company: &Company, contact: &DecisionMaker) -> Vec<String> {
    vec![
        format!("What has {} announced recently?", company.name),
        format!("What is {} focused on right now?", contact.name),
        "What challenge could a partnership solve for them?".to_string(),
    ]
}

/// Model-proposed research questions, falling back to fixed ones.
pub async fn research_questions(
    llm: &LlmClient,
    company: &Company,
    contact: &DecisionMaker,
) -> Vec<String> {
    let schema = ResponseSchema::array(&[], "A JSON array of 2 to 4 question strings.");
    let prompt = Prompt::new(
        QUESTIONS_SYSTEM,
        format!(
            "Contact: {} ({})\nCompany: {}\nOverview: {}",
            contact.name,
            contact.title,
            company.name,
            company.overview.as_deref().unwrap_or("unknown")
        ),
    );
    match llm.complete_as::<Vec<String>>(&prompt, &schema).await {
        Ok(questions) if !questions.is_empty() => questions,
        Ok(_) => default_questions(company, contact),
        Err(e) => {
            debug!(error = %e, "using default research questions");
            default_questions(company, contact)
        }
    }
}

#[derive(Debug, Deserialize)]
struct NewsSummary {
    #[serde(default)]
    recent_activity: String,
    #[serde(default)]
    current_focus: String,
    #[serde(default)]
    pain_point: String,
    #[serde(default)]
    best_angle: String,
}

impl NewsSummary {
    fn render(&self) -> String {
        [
            ("Recent activity", &self.recent_activity),
            ("Current focus", &self.current_focus),
            ("Pain point", &self.pain_point),
            ("Best angle", &self.best_angle),
        ]
        .iter()
        .filter(|(_, v)| !v.trim().is_empty())
        .map(|(label, v)| format!("{label}: {}", v.trim()))
        .collect::<Vec<_>>()
        .join("\n")
    }
}

/// Synthesize notes from a news search plus a model summary.
///
/// Returns `Ok(None)` when the search finds nothing to summarize.
#[instrument(skip_all, fields(company = %company.key, contact = %contact.name))]
pub async fn auto_research(
    llm: &LlmClient,
    search: &dyn SearchProvider,
    company: &Company,
    contact: &DecisionMaker,
) -> Result<Option<String>> {
    let hits = search
        .search_news(&format!("\"{}\"", company.name), NEWS_RESULTS)
        .await?;
    if hits.is_empty() {
        return Ok(None);
    }

    let mut material = format!(
        "Company: {}\nContact: {} ({})\n\nNews:\n",
        company.name, contact.name, contact.title
    );
    for hit in &hits {
        material.push_str(&format!("- {}: {}\n", hit.title, hit.snippet));
    }

    let schema = ResponseSchema::object(
        &[],
        r#"{"recent_activity": "...", "current_focus": "...", "pain_point": "...", "best_angle": "..."}"#,
    );
    let summary: NewsSummary = llm.complete_as(&Prompt::new(SUMMARY_SYSTEM, material), &schema).await?;
    let notes = summary.render();
    Ok((!notes.is_empty()).then_some(notes))
}

/// Everything the research stage needs.
pub struct ResearchContext<'a> {
    pub llm: &'a LlmClient,
    pub search: &'a dyn SearchProvider,
    pub notes: &'a ResearchNotes,
}

/// Attach research notes to every decision maker according to `mode`.
///
/// Stored notes are reused without asking. An operator I/O failure ends the
/// manual session; remaining contacts are counted as skipped.
#[instrument(skip_all, fields(mode = ?mode, companies = companies.len()))]
pub async fn research_companies(
    ctx: &ResearchContext<'_>,
    companies: &mut [Company],
    mode: ResearchMode,
    operator: &mut dyn Operator,
    summary: &mut RunSummary,
) {
    if mode == ResearchMode::Off {
        return;
    }
    let mut operator_gone = false;

    for company in companies.iter_mut() {
        // Cloned so the operator can see the whole company while one contact is updated.
        let snapshot = company.clone();
        for contact in company.decision_makers.iter_mut() {
            if let Some(stored) = ctx.notes.get(&snapshot.key, &contact.name).await {
                debug!(contact = %contact.name, source = %stored.source, "reusing stored notes");
                contact.research_notes = Some(stored.notes);
                summary.processed(Stage::Research, 1);
                continue;
            }

            let gathered = match mode {
                ResearchMode::Off => Ok(None),
                ResearchMode::Manual if operator_gone => Ok(None),
                ResearchMode::Manual => {
                    let questions = research_questions(ctx.llm, &snapshot, contact).await;
                    match operator.research_notes(&snapshot, contact, &questions) {
                        Err(e @ LeadScoutError::Interaction(_)) => {
                            warn!(error = %e, "operator input closed, skipping remaining research");
                            operator_gone = true;
                            Err(e)
                        }
                        other => other,
                    }
                }
                ResearchMode::Auto => auto_research(ctx.llm, ctx.search, &snapshot, contact).await,
            };

            match gathered {
                Ok(Some(notes)) if !notes.trim().is_empty() => {
                    let notes = notes.trim().to_string();
                    let source = if mode == ResearchMode::Auto { "auto" } else { "manual" };
                    ctx.notes.save(&snapshot.key, &contact.name, &notes, source).await;
                    contact.research_notes = Some(notes);
                    summary.processed(Stage::Research, 1);
                }
                Ok(_) => summary.skipped(Stage::Research, 1),
                Err(e) => {
                    summary.skipped(Stage::Research, 1);
                    summary.failure(Stage::Research, format!("{} / {}: {e}", snapshot.name, contact.name));
                }
            }
        }
    }
    info!(
        researched = summary.stage(Stage::Research).map_or(0, |s| s.processed),
        "research finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedOperator, StubSearch, company_with_contact, hit, llm_with, notes_store};

    #[tokio::test]
    async fn manual_notes_are_stored_and_reused() {
        let notes = notes_store().await;
        let search = StubSearch::default();
        let llm = llm_with(vec![Ok(r#"["What did they announce?"]"#.into())]);
        let ctx = ResearchContext {
            llm: &llm,
            search: &search,
            notes: &notes,
        };

        let mut companies = vec![company_with_contact("Helix Therapeutics", "Maria Okafor")];
        let mut operator = ScriptedOperator::with_notes(vec![Some("  Shelved GLP-1 asset  ".into())]);
        let mut summary = RunSummary::default();
        research_companies(&ctx, &mut companies, ResearchMode::Manual, &mut operator, &mut summary).await;

        assert_eq!(
            companies[0].decision_makers[0].research_notes.as_deref(),
            Some("Shelved GLP-1 asset")
        );
        assert_eq!(operator.questions_seen[0], vec!["What did they announce?".to_string()]);

        // Second run: stored notes are reused without asking.
        let mut again = vec![company_with_contact("Helix Therapeutics", "Maria Okafor")];
        let mut silent = ScriptedOperator::default();
        research_companies(&ctx, &mut again, ResearchMode::Manual, &mut silent, &mut summary).await;
        assert!(silent.questions_seen.is_empty());
        assert_eq!(
            again[0].decision_makers[0].research_notes.as_deref(),
            Some("Shelved GLP-1 asset")
        );
    }

    #[tokio::test]
    async fn empty_answer_skips_contact() {
        let notes = ResearchNotes::default();
        let search = StubSearch::default();
        // Question generation fails; defaults are used.
        let llm = llm_with(vec![]);
        let ctx = ResearchContext {
            llm: &llm,
            search: &search,
            notes: &notes,
        };
        let mut companies = vec![company_with_contact("Helix Therapeutics", "Maria Okafor")];
        let mut operator = ScriptedOperator::with_notes(vec![Some("   ".into())]);
        let mut summary = RunSummary::default();
        research_companies(&ctx, &mut companies, ResearchMode::Manual, &mut operator, &mut summary).await;

        assert!(companies[0].decision_makers[0].research_notes.is_none());
        assert_eq!(operator.questions_seen[0].len(), 3);
        assert_eq!(summary.stage(Stage::Research).unwrap().skipped, 1);
    }

    #[tokio::test]
    async fn auto_mode_summarizes_news() {
        let notes = ResearchNotes::default();
        let search = StubSearch::with_news(vec![hit("Helix halts GLP-1 trial", "Seeking partner")]);
        let llm = llm_with(vec![Ok(
            r#"{"recent_activity": "Halted phase 2", "current_focus": "", "pain_point": "Funding", "best_angle": "Co-development"}"#
                .into(),
        )]);
        let ctx = ResearchContext {
            llm: &llm,
            search: &search,
            notes: &notes,
        };
        let mut companies = vec![company_with_contact("Helix Therapeutics", "Maria Okafor")];
        let mut operator = ScriptedOperator::default();
        let mut summary = RunSummary::default();
        research_companies(&ctx, &mut companies, ResearchMode::Auto, &mut operator, &mut summary).await;

        let got = companies[0].decision_makers[0].research_notes.clone().unwrap();
        assert!(got.contains("Recent activity: Halted phase 2"));
        assert!(!got.contains("Current focus"));
        assert!(operator.questions_seen.is_empty());
    }

    #[tokio::test]
    async fn off_mode_does_nothing() {
        let notes = ResearchNotes::default();
        let search = StubSearch::default();
        let llm = llm_with(vec![]);
        let ctx = ResearchContext {
            llm: &llm,
            search: &search,
            notes: &notes,
        };
        let mut companies = vec![company_with_contact("Helix Therapeutics", "Maria Okafor")];
        let mut summary = RunSummary::default();
        research_companies(
            &ctx,
            &mut companies,
            ResearchMode::Off,
            &mut ScriptedOperator::default(),
            &mut summary,
        )
        .await;
        assert!(summary.stage(Stage::Research).is_none());
    }
}
