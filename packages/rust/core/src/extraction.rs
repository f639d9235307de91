//! Company and decision-maker extraction from discovery batches.

use std::collections::BTreeSet;

use leadscout_discovery::accepts_title;
use leadscout_llm::{LlmClient, Prompt, ResponseSchema};
use leadscout_shared::{
    Company, CompanyType, ContactHandle, DecisionMaker, Result, SearchHit, TrialRecord,
    parse_website,
};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::dedupe::normalize;

/// Registry study page for a trial id.
pub fn trial_url(id: &str) -> String {
    format!("https://clinicaltrials.gov/study/{id}")
}

/// Everything discovery found for one query.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryBatch {
    pub query: String,
    pub hits: Vec<SearchHit>,
    pub trials: Vec<TrialRecord>,
}

impl DiscoveryBatch {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty() && self.trials.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len() + self.trials.len()
    }
}

/// Result of extracting one batch.
#[derive(Debug, Default)]
pub struct Extracted {
    pub companies: Vec<Company>,
    /// One reason per dropped element.
    pub rejected: Vec<String>,
}

const SYSTEM: &str = "You extract prospective licensing partners from biotech search results \
and clinical-trial records. Only include small or mid-size biotech or pharma companies that own \
a drug program relevant to the query. Never invent companies or people that are not supported \
by the material.";

const VC_SYSTEM: &str = "You extract biotech-focused venture capital firms from web search \
results. Only include firms whose portfolio holds drug developers that could need partnering or \
asset rescue. Never invent firms or people that are not supported by the material.";

fn schema(kind: CompanyType) -> ResponseSchema {
    match kind {
        CompanyType::Biotech => ResponseSchema::array(
            &["name"],
            r#"Each element: {"name": "...", "website": "https://..." | null, "therapeutic_areas": ["..."], "overview": "...", "location": "...", "size": "small" | "medium" | "large", "trial_id": "NCT..." | null, "source_url": "..." | null, "decision_makers": [{"name": "...", "title": "...", "contact": "email or profile URL" | null}]}"#,
        ),
        CompanyType::VcFirm => ResponseSchema::array(
            &["name"],
            r#"Each element: {"name": "...", "website": "https://..." | null, "therapeutic_areas": ["..."], "overview": "investment focus and notable portfolio companies", "location": "...", "source_url": "..." | null, "decision_makers": [{"name": "...", "title": "partner, principal or managing director", "contact": "email or profile URL" | null}]}"#,
        ),
    }
}

fn render_batch(batch: &DiscoveryBatch) -> String {
    let mut out = format!("Query: {}\n\nSearch results:\n", batch.query);
    for (i, hit) in batch.hits.iter().enumerate() {
        out.push_str(&format!(
            "{}. {}\n   {}\n   {}\n",
            i + 1,
            hit.title,
            hit.link,
            hit.snippet
        ));
    }
    if !batch.trials.is_empty() {
        out.push_str("\nClinical trials:\n");
        for t in &batch.trials {
            out.push_str(&format!(
                "- {} | {} | sponsor: {} | status: {} | phase: {} | condition: {} | why stopped: {}\n",
                t.id,
                t.title,
                t.sponsor.as_deref().unwrap_or("unknown"),
                t.status,
                t.phase.as_deref().unwrap_or("n/a"),
                t.condition.as_deref().unwrap_or("n/a"),
                t.why_stopped.as_deref().unwrap_or("n/a"),
            ));
        }
    }
    out
}

/// Whether `name` matches an exclusion term as whole words.
pub fn is_excluded(name: &str, exclusions: &[String]) -> bool {
    let padded = format!(" {} ", normalize(name));
    exclusions.iter().any(|term| {
        let term = normalize(term);
        !term.is_empty() && padded.contains(&format!(" {term} "))
    })
}

fn str_at<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Map one extracted element to a company, or a rejection reason.
pub fn company_from_value(
    value: &Value,
    batch: &DiscoveryBatch,
    exclusions: &[String],
    kind: CompanyType,
) -> std::result::Result<Company, String> {
    let name = str_at(value, "name").ok_or("missing company name")?;
    let key = normalize(name);
    if key.is_empty() {
        return Err(format!("unusable company name `{name}`"));
    }
    if is_excluded(name, exclusions) {
        return Err(format!("{name}: excluded company"));
    }
    if kind == CompanyType::Biotech && str_at(value, "size").is_some_and(|s| s.eq_ignore_ascii_case("large")) {
        return Err(format!("{name}: large company"));
    }

    let therapeutic_areas: BTreeSet<String> = value
        .get("therapeutic_areas")
        .and_then(Value::as_array)
        .map(|areas| {
            areas
                .iter()
                .filter_map(Value::as_str)
                .map(|a| a.trim().to_lowercase())
                .filter(|a| !a.is_empty())
                .collect()
        })
        .unwrap_or_default();

    // Prefer the trial the model cited, else one sponsored by this company.
    // Venture firms never carry a trial of their own.
    let trial = match kind {
        CompanyType::Biotech => str_at(value, "trial_id")
            .and_then(|id| batch.trials.iter().find(|t| t.id.eq_ignore_ascii_case(id)))
            .or_else(|| {
                batch
                    .trials
                    .iter()
                    .find(|t| t.sponsor.as_deref().is_some_and(|s| normalize(s) == key))
            })
            .cloned(),
        CompanyType::VcFirm => None,
    };

    let decision_makers = value
        .get("decision_makers")
        .and_then(Value::as_array)
        .map(|people| {
            people
                .iter()
                .filter_map(|p| {
                    let person = str_at(p, "name")?;
                    let title = str_at(p, "title").unwrap_or_default();
                    if !accepts_title(kind, title) {
                        return None;
                    }
                    Some(DecisionMaker {
                        name: person.to_string(),
                        title: title.to_string(),
                        employer: key.clone(),
                        contact: str_at(p, "contact").and_then(ContactHandle::parse),
                        research_notes: None,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let mut sources = Vec::new();
    if let Some(src) = str_at(value, "source_url") {
        sources.push(src.to_string());
    }
    if let Some(t) = &trial {
        sources.push(trial_url(&t.id));
    }

    Ok(Company {
        name: name.to_string(),
        key,
        company_type: kind,
        website: str_at(value, "website").and_then(parse_website),
        therapeutic_areas,
        fit_score: 0,
        fit_reason: String::new(),
        trial,
        decision_makers,
        overview: str_at(value, "overview").map(String::from),
        location: str_at(value, "location").map(String::from),
        sources,
    })
}

/// Extract companies of `kind` from one batch. Invalid elements are dropped individually.
#[instrument(skip_all, fields(query = %batch.query, items = batch.len(), kind = %kind))]
pub async fn extract_batch(
    llm: &LlmClient,
    batch: &DiscoveryBatch,
    exclusions: &[String],
    kind: CompanyType,
) -> Result<Extracted> {
    let schema = schema(kind);
    let system = match kind {
        CompanyType::Biotech => SYSTEM,
        CompanyType::VcFirm => VC_SYSTEM,
    };
    let prompt = Prompt::new(system, render_batch(batch));
    let reply = llm.complete_json(&prompt, &schema).await?;

    let mut extracted = Extracted::default();
    for element in reply.as_array().map(Vec::as_slice).unwrap_or_default() {
        let mapped = schema
            .check_element(element)
            .and_then(|_| company_from_value(element, batch, exclusions, kind));
        match mapped {
            Ok(company) => extracted.companies.push(company),
            Err(reason) => {
                debug!(%reason, "dropping extracted element");
                extracted.rejected.push(reason);
            }
        }
    }
    Ok(extracted)
}
