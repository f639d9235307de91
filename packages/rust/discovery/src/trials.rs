//! ClinicalTrials.gov v2 registry client.

use std::sync::LazyLock;

use async_trait::async_trait;
use leadscout_shared::{Result, TrialRecord, TrialStatus, http};
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::TrialsProvider;

/// Registry page size ceiling.
const MAX_PAGE_SIZE: usize = 1000;

/// Whether `id` looks like a registry identifier (`NCT` + 8 digits).
pub fn valid_nct_id(id: &str) -> bool {
    id.len() >= 11 && id.starts_with("NCT") && id[3..].chars().all(|c| c.is_ascii_digit())
}

/// Normalize registry phase labels: `PHASE2`, `Phase II`, `phase 2` all become `phase 2`.
///
/// Combined phases (`PHASE1/PHASE2`) keep both numbers (`phase 1/2`). `NA` and
/// unrecognized labels return `None`.
pub fn normalize_phase(raw: &str) -> Option<String> {
    static PHASE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)phase\s*([0-4]|iv|iii|ii|i)\b").expect("valid regex")
    });
    static EARLY_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)early[\s_]*phase\s*1").expect("valid regex"));

    if EARLY_RE.is_match(raw) {
        return Some("phase 1".into());
    }

    let numbers: Vec<&str> = PHASE_RE
        .captures_iter(raw)
        .filter_map(|c| c.get(1))
        .map(|m| match m.as_str().to_ascii_lowercase().as_str() {
            "i" | "1" => "1",
            "ii" | "2" => "2",
            "iii" | "3" => "3",
            "iv" | "4" => "4",
            _ => "0",
        })
        .collect();

    if numbers.is_empty() {
        return None;
    }
    Some(format!("phase {}", numbers.join("/")))
}

/// ClinicalTrials.gov `/api/v2/studies`.
pub struct ClinicalTrialsGov {
    client: Client,
    base_url: String,
    status_filter: String,
}

impl ClinicalTrialsGov {
    pub fn new(client: Client, base_url: String, status_filter: String) -> Self {
        Self {
            client,
            base_url,
            status_filter,
        }
    }
}

#[async_trait]
impl TrialsProvider for ClinicalTrialsGov {
    fn name(&self) -> &str {
        "clinicaltrials"
    }

    #[instrument(skip_all, fields(provider = "clinicaltrials", query = %query))]
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<TrialRecord>> {
        let page_size = max_results.clamp(1, MAX_PAGE_SIZE).to_string();
        let mut params = vec![
            ("query.term", query),
            ("pageSize", page_size.as_str()),
            ("format", "json"),
        ];
        if !self.status_filter.trim().is_empty() {
            params.push(("filter.overallStatus", self.status_filter.as_str()));
        }

        let response = self
            .client
            .get(&self.base_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| http::send_error("clinicaltrials", e))?;
        let body = http::read_json("clinicaltrials", response).await?;

        let studies = body
            .get("studies")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let records: Vec<TrialRecord> = studies
            .iter()
            .filter_map(parse_study)
            .take(max_results)
            .collect();

        debug!(
            returned = studies.len(),
            kept = records.len(),
            "parsed registry studies"
        );
        Ok(records)
    }
}

fn text(v: Option<&Value>) -> Option<String> {
    v.and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Map one `studies[]` element. Returns `None` when the NCT id is missing or invalid.
fn parse_study(study: &Value) -> Option<TrialRecord> {
    let protocol = study.get("protocolSection")?;
    let ident = protocol.get("identificationModule");
    let status = protocol.get("statusModule");

    let id = text(ident.and_then(|m| m.get("nctId")))?;
    if !valid_nct_id(&id) {
        debug!(%id, "dropping study with invalid NCT id");
        return None;
    }

    let title = text(ident.and_then(|m| m.get("briefTitle")))
        .or_else(|| text(ident.and_then(|m| m.get("officialTitle"))))
        .unwrap_or_default();

    let phase = protocol
        .get("designModule")
        .and_then(|m| m.get("phases"))
        .and_then(Value::as_array)
        .map(|phases| {
            phases
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join("/")
        })
        .and_then(|joined| normalize_phase(&joined));

    let overall = text(status.and_then(|m| m.get("overallStatus"))).unwrap_or_default();

    let condition = protocol
        .get("conditionsModule")
        .and_then(|m| m.get("conditions"))
        .and_then(Value::as_array)
        .and_then(|c| text(c.first()));

    let interventions = protocol
        .get("armsInterventionsModule")
        .and_then(|m| m.get("interventions"))
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(|i| text(i.get("name"))).collect())
        .unwrap_or_default();

    let sponsor = protocol
        .get("sponsorCollaboratorsModule")
        .and_then(|m| m.get("leadSponsor"))
        .and_then(|s| text(s.get("name")));

    Some(TrialRecord {
        id,
        title,
        phase,
        status: TrialStatus::from_registry(&overall),
        sponsor,
        condition,
        why_stopped: text(status.and_then(|m| m.get("whyStopped"))),
        interventions,
        completion_date: text(
            status
                .and_then(|m| m.get("completionDateStruct"))
                .and_then(|d| d.get("date")),
        ),
    })
}
