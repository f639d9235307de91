//! Query expansion: the user's query plus model-proposed sub-queries.

use leadscout_llm::{LlmClient, Prompt, ResponseSchema};
use leadscout_shared::Result;
use tracing::{debug, instrument};

/// Search angles used when the model cannot propose sub-queries.
const FALLBACK_ANGLES: &[&str] = &[
    "failed clinical trials biotech",
    "terminated phase 2 study companies",
    "suspended drug development",
    "biotech companies seeking partners",
    "shelved drug assets licensing",
];

/// Searches for biotech-focused venture firms. `{q}` is replaced by the user's query.
const VC_TEMPLATES: &[&str] = &[
    "biotech venture capital firms portfolio companies",
    "{q} biotech venture capital investors",
];

const SYSTEM: &str = "You help a pharmaceutical business-development team find small and \
mid-size biotech companies with stalled or failed drug programs that may want to out-license \
or partner. Given a therapeutic-area query, propose distinct web search queries that surface \
such companies (terminated trials, shelved assets, partnering announcements).";

/// Fixed-angle sub-queries for `query`.
pub fn fallback_queries(query: &str, max: usize) -> Vec<String> {
    FALLBACK_ANGLES
        .iter()
        .take(max)
        .map(|angle| format!("{query} {angle}"))
        .collect()
}

/// Venture-firm search queries for `query`.
pub fn vc_queries(query: &str) -> Vec<String> {
    VC_TEMPLATES
        .iter()
        .map(|t| t.replace("{q}", query.trim()).trim().to_string())
        .collect()
}

/// Build the query list: `query` first, then up to `max_subqueries` distinct sub-queries.
pub fn assemble(query: &str, proposed: Vec<String>, max_subqueries: usize) -> Vec<String> {
    let mut out = vec![query.trim().to_string()];
    for q in proposed {
        if out.len() > max_subqueries {
            break;
        }
        let q = q.trim().to_string();
        if q.is_empty() || out.iter().any(|existing| existing.eq_ignore_ascii_case(&q)) {
            continue;
        }
        out.push(q);
    }
    out
}

/// Ask the model for sub-queries. Errors are returned so the caller can fall back and record them.
#[instrument(skip(llm))]
pub async fn propose_subqueries(llm: &LlmClient, query: &str, max: usize) -> Result<Vec<String>> {
    if max == 0 {
        return Ok(Vec::new());
    }
    let schema = ResponseSchema::array(&[], format!("A JSON array of at most {max} strings."));
    let prompt = Prompt::new(SYSTEM, format!("Query: {query}\nReturn {max} search queries."));
    let proposed: Vec<String> = llm.complete_as(&prompt, &schema).await?;
    debug!(count = proposed.len(), "model proposed sub-queries");
    Ok(proposed)
}
