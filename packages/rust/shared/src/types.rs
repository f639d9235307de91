//! Core domain types for LeadScout lead reports.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::error::{LeadScoutError, Result};

/// Current schema version for the lead report format.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Upper bound of the fit score range.
pub const MAX_FIT_SCORE: u8 = 100;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").expect("valid email regex")
});

/// Clamp an arbitrary model- or rule-produced score into `0..=100`.
pub fn clamp_score(raw: i64) -> u8 {
    raw.clamp(0, i64::from(MAX_FIT_SCORE)) as u8
}

/// Parse a website string into an http(s) URL, tolerating a missing scheme.
pub fn parse_website(raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    Url::parse(&candidate)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some_and(|h| h.contains('.')))
}

// ---------------------------------------------------------------------------
// DraftId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for email draft identifiers (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftId(pub Uuid);

impl DraftId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for DraftId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DraftId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SearchHit
// ---------------------------------------------------------------------------

/// One web search result, in the order the service returned it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub snippet: String,
    /// Publisher or site name when the service reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

// ---------------------------------------------------------------------------
// TrialRecord
// ---------------------------------------------------------------------------

/// Coarse trial status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialStatus {
    Recruiting,
    Terminated,
    Completed,
    Withdrawn,
    Other,
}

impl TrialStatus {
    /// Map a registry `overallStatus` value (e.g. `TERMINATED`, `Not yet recruiting`).
    ///
    /// Suspended trials count as terminated.
    pub fn from_registry(raw: &str) -> Self {
        let norm = raw.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        match norm.as_str() {
            "RECRUITING" | "NOT_YET_RECRUITING" | "ENROLLING_BY_INVITATION" => Self::Recruiting,
            "TERMINATED" | "SUSPENDED" => Self::Terminated,
            "COMPLETED" => Self::Completed,
            "WITHDRAWN" => Self::Withdrawn,
            _ => Self::Other,
        }
    }

    /// Whether the trial stopped before completion.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Terminated | Self::Withdrawn)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recruiting => "recruiting",
            Self::Terminated => "terminated",
            Self::Completed => "completed",
            Self::Withdrawn => "withdrawn",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for TrialStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A clinical trial summary as fetched from the registry. Read-only once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    /// Registry identifier (NCT number).
    pub id: String,
    pub title: String,
    /// Normalized phase (`phase 2`), if the registry reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    pub status: TrialStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sponsor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub why_stopped: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interventions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_date: Option<String>,
}

// ---------------------------------------------------------------------------
// Company / DecisionMaker
// ---------------------------------------------------------------------------

/// How to reach a decision maker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ContactHandle {
    Profile(Url),
    Email(String),
}

impl ContactHandle {
    /// Classify a raw contact string. Returns `None` for anything that is
    /// neither a plausible email nor an http(s) URL.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let email = raw.strip_prefix("mailto:").unwrap_or(raw);
        if EMAIL_RE.is_match(email) {
            return Some(Self::Email(email.to_ascii_lowercase()));
        }
        Url::parse(raw)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .map(Self::Profile)
    }
}

impl std::fmt::Display for ContactHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Profile(url) => write!(f, "{url}"),
            Self::Email(email) => f.write_str(email),
        }
    }
}

/// A person at a company who could act on a licensing approach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionMaker {
    pub name: String,
    #[serde(default)]
    pub title: String,
    /// Normalized key of the company this person works for.
    pub employer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<ContactHandle>,
    /// Set only by the research stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_notes: Option<String>,
}

/// What kind of organization a lead is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyType {
    /// Drug developer with its own programs.
    #[default]
    Biotech,
    /// Venture investor reached for its portfolio.
    VcFirm,
}

impl CompanyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Biotech => "biotech",
            Self::VcFirm => "vc_firm",
        }
    }
}

impl std::fmt::Display for CompanyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A prospective partner company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub name: String,
    /// Normalized name; unique within a report.
    pub key: String,
    #[serde(default)]
    pub company_type: CompanyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<Url>,
    #[serde(default)]
    pub therapeutic_areas: BTreeSet<String>,
    /// Always within `0..=100`.
    #[serde(default)]
    pub fit_score: u8,
    #[serde(default)]
    pub fit_reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trial: Option<TrialRecord>,
    #[serde(default)]
    pub decision_makers: Vec<DecisionMaker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Links the company was found through.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

impl Company {
    /// Set the fit score, clamping into range.
    pub fn set_score(&mut self, raw: i64, reason: impl Into<String>) {
        self.fit_score = clamp_score(raw);
        self.fit_reason = reason.into();
    }

    pub fn decision_maker(&self, name: &str) -> Option<&DecisionMaker> {
        self.decision_makers
            .iter()
            .find(|dm| dm.name.eq_ignore_ascii_case(name))
    }
}

// ---------------------------------------------------------------------------
// EmailDraft
// ---------------------------------------------------------------------------

/// Review state of one draft.
///
/// `Pending` may move to any other state. `Approved`, `Edited` and `Skipped`
/// are decisions the operator can reopen, which moves the draft back to
/// `Pending`. `Regenerated` drafts are superseded and never reviewed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewState {
    Pending,
    Approved,
    Edited,
    Regenerated,
    Skipped,
}

impl ReviewState {
    pub fn can_transition(&self, to: ReviewState) -> bool {
        use ReviewState::*;
        matches!(
            (self, to),
            (Pending, Approved | Edited | Regenerated | Skipped)
                | (Approved | Edited | Skipped, Pending)
        )
    }

    /// Whether the operator has made a call on this draft.
    pub fn is_decided(&self) -> bool {
        matches!(self, Self::Approved | Self::Edited | Self::Skipped)
    }

    /// Whether a draft in this state ends up in `emails.csv`.
    pub fn is_exportable(&self) -> bool {
        matches!(self, Self::Approved | Self::Edited)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Edited => "edited",
            Self::Regenerated => "regenerated",
            Self::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for ReviewState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who a draft is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DraftTarget {
    pub company_key: String,
    pub contact_name: String,
}

/// One generated outreach email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailDraft {
    pub id: DraftId,
    pub subject: String,
    pub body: String,
    pub target: DraftTarget,
    pub state: ReviewState,
    /// 1 for the first draft, incremented per regeneration.
    pub attempt: u32,
    pub word_count: usize,
    pub over_budget: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub generated_at: DateTime<Utc>,
}

impl EmailDraft {
    /// Move to `to`, rejecting transitions out of terminal states.
    pub fn transition(&mut self, to: ReviewState) -> Result<()> {
        if !self.state.can_transition(to) {
            return Err(LeadScoutError::validation(format!(
                "draft {}: cannot move from {} to {}",
                self.id, self.state, to
            )));
        }
        self.state = to;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RunSummary
// ---------------------------------------------------------------------------

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    QueryExpansion,
    Discovery,
    Extraction,
    Deduplication,
    Scoring,
    Research,
    Drafting,
    Review,
    Export,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QueryExpansion => "query_expansion",
            Self::Discovery => "discovery",
            Self::Extraction => "extraction",
            Self::Deduplication => "deduplication",
            Self::Scoring => "scoring",
            Self::Research => "research",
            Self::Drafting => "drafting",
            Self::Review => "review",
            Self::Export => "export",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counts for one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: Stage,
    pub processed: usize,
    pub skipped: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,
}

/// Per-stage processed/skipped counts and failure messages for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub stages: Vec<StageSummary>,
}

impl RunSummary {
    /// Summary for `stage`, created on first use.
    pub fn stage_mut(&mut self, stage: Stage) -> &mut StageSummary {
        if let Some(pos) = self.stages.iter().position(|s| s.stage == stage) {
            return &mut self.stages[pos];
        }
        self.stages.push(StageSummary {
            stage,
            processed: 0,
            skipped: 0,
            failures: Vec::new(),
        });
        let last = self.stages.len() - 1;
        &mut self.stages[last]
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageSummary> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    pub fn processed(&mut self, stage: Stage, n: usize) {
        self.stage_mut(stage).processed += n;
    }

    pub fn skipped(&mut self, stage: Stage, n: usize) {
        self.stage_mut(stage).skipped += n;
    }

    pub fn failure(&mut self, stage: Stage, message: impl Into<String>) {
        self.stage_mut(stage).failures.push(message.into());
    }

    pub fn total_failures(&self) -> usize {
        self.stages.iter().map(|s| s.failures.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// LeadReport
// ---------------------------------------------------------------------------

/// The full result set of a run; written as `<stem>_report.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadReport {
    /// Schema version for forward compatibility.
    pub schema_version: u32,
    pub query: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Tool version that produced the report.
    pub tool_version: String,
    #[serde(default)]
    pub companies: Vec<Company>,
    #[serde(default)]
    pub drafts: Vec<EmailDraft>,
    #[serde(default)]
    pub summary: RunSummary,
}

impl LeadReport {
    pub fn new(query: impl Into<String>, tool_version: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            query: query.into(),
            created_at: now,
            updated_at: now,
            tool_version: tool_version.into(),
            companies: Vec::new(),
            drafts: Vec::new(),
            summary: RunSummary::default(),
        }
    }

    /// Parse a report, rejecting unknown schema versions.
    pub fn from_json(json: &str) -> Result<Self> {
        let report: LeadReport = serde_json::from_str(json)
            .map_err(|e| LeadScoutError::validation(format!("invalid lead report: {e}")))?;
        if report.schema_version != CURRENT_SCHEMA_VERSION {
            return Err(LeadScoutError::validation(format!(
                "unsupported report schema version {} (expected {CURRENT_SCHEMA_VERSION})",
                report.schema_version
            )));
        }
        Ok(report)
    }

    pub fn company(&self, key: &str) -> Option<&Company> {
        self.companies.iter().find(|c| c.key == key)
    }

    pub fn pending_drafts(&self) -> usize {
        self.drafts
            .iter()
            .filter(|d| d.state == ReviewState::Pending)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_ids_are_v7_and_distinct() {
        let a = DraftId::new();
        assert_ne!(a, DraftId::new());
        assert_eq!(a.0.get_version_num(), 7);
        assert_eq!(a.to_string(), a.0.to_string());
    }

    #[test]
    fn score_clamped() {
        assert_eq!(clamp_score(-20), 0);
        assert_eq!(clamp_score(55), 55);
        assert_eq!(clamp_score(400), 100);
    }

    #[test]
    fn website_parsing() {
        assert_eq!(
            parse_website("acme-bio.com").map(|u| u.to_string()),
            Some("https://acme-bio.com/".to_string())
        );
        assert!(parse_website("http://acme.io/about").is_some());
        assert!(parse_website("not a url").is_none());
        assert!(parse_website("ftp://acme.io").is_none());
        assert!(parse_website("").is_none());
    }

    #[test]
    fn contact_handle_classification() {
        assert_eq!(
            ContactHandle::parse("Jane.Doe@Acme.com"),
            Some(ContactHandle::Email("jane.doe@acme.com".into()))
        );
        assert!(matches!(
            ContactHandle::parse("https://www.linkedin.com/in/jane-doe"),
            Some(ContactHandle::Profile(_))
        ));
        assert_eq!(ContactHandle::parse("call the front desk"), None);
    }

    #[test]
    fn trial_status_mapping() {
        assert_eq!(TrialStatus::from_registry("TERMINATED"), TrialStatus::Terminated);
        assert_eq!(TrialStatus::from_registry("Suspended"), TrialStatus::Terminated);
        assert_eq!(
            TrialStatus::from_registry("Not yet recruiting"),
            TrialStatus::Recruiting
        );
        assert_eq!(TrialStatus::from_registry("UNKNOWN"), TrialStatus::Other);
        assert!(TrialStatus::Withdrawn.is_failed());
        assert!(!TrialStatus::Completed.is_failed());
    }

    #[test]
    fn review_transitions() {
        use ReviewState::*;
        assert!(Pending.can_transition(Approved));
        assert!(Pending.can_transition(Regenerated));
        for to in [Pending, Approved, Edited, Regenerated, Skipped] {
            assert!(!Regenerated.can_transition(to), "regenerated -> {to}");
        }
        for decided in [Approved, Edited, Skipped] {
            assert!(decided.is_decided());
            assert!(decided.can_transition(Pending), "{decided} reopens");
            for to in [Approved, Edited, Regenerated, Skipped] {
                assert!(!decided.can_transition(to), "{decided} -> {to}");
            }
        }
        assert!(!Pending.is_decided());
    }

    #[test]
    fn decided_draft_must_be_reopened_first() {
        let mut draft = EmailDraft {
            id: DraftId::new(),
            subject: "Phase 2 asset".into(),
            body: "Hi".into(),
            target: DraftTarget {
                company_key: "acme bio".into(),
                contact_name: "Jane Doe".into(),
            },
            state: ReviewState::Pending,
            attempt: 1,
            word_count: 1,
            over_budget: false,
            warnings: vec![],
            reasoning: None,
            generated_at: Utc::now(),
        };
        draft.transition(ReviewState::Skipped).expect("pending -> skipped");
        let err = draft.transition(ReviewState::Approved).unwrap_err();
        assert!(err.to_string().contains("cannot move from skipped to approved"));
        assert_eq!(draft.state, ReviewState::Skipped);
        draft.transition(ReviewState::Pending).expect("skipped -> pending");
        draft.transition(ReviewState::Approved).expect("pending -> approved");
    }

    #[test]
    fn summary_accumulates_per_stage() {
        let mut summary = RunSummary::default();
        summary.processed(Stage::Extraction, 3);
        summary.skipped(Stage::Extraction, 1);
        summary.failure(Stage::Discovery, "serpapi: gave up");
        summary.processed(Stage::Extraction, 2);

        let extraction = summary.stage(Stage::Extraction).expect("extraction stage");
        assert_eq!(extraction.processed, 5);
        assert_eq!(extraction.skipped, 1);
        assert_eq!(summary.total_failures(), 1);
        assert_eq!(summary.stages.len(), 2);
    }

    #[test]
    fn report_fixture_validates() {
        let fixture = std::fs::read_to_string("../../../fixtures/json/report.fixture.json")
            .expect("read fixture");
        let report = LeadReport::from_json(&fixture).expect("deserialize fixture report");
        assert_eq!(report.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(report.companies.len(), 2);
        assert_eq!(report.pending_drafts(), 1);
        let company = report.company("helix therapeutics").expect("fixture company");
        assert_eq!(company.trial.as_ref().map(|t| t.status), Some(TrialStatus::Terminated));
    }

    #[test]
    fn unknown_schema_version_rejected() {
        let mut report = LeadReport::new("obesity", "0.1.0");
        report.schema_version = 99;
        let json = serde_json::to_string(&report).expect("serialize");
        assert!(LeadReport::from_json(&json).is_err());
    }
}
