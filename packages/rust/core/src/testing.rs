//! Fixtures and scripted stand-ins shared by the core tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use leadscout_discovery::{SearchProvider, TrialsProvider};
use leadscout_llm::{LanguageModel, LlmClient, ModelRequest};
use leadscout_shared::{
    Company, DecisionMaker, DraftId, DraftTarget, EmailDraft, LeadScoutError, RateLimiter, Result,
    RetryPolicy, ReviewState, SearchHit, TrialRecord, TrialStatus,
};
use leadscout_storage::{ResearchNotes, ResponseCache, Storage};

use crate::dedupe::normalize;
use crate::operator::{Operator, ReviewDecision, ReviewPosition};

// ---------------------------------------------------------------------------
// Language models
// ---------------------------------------------------------------------------

/// Replays canned replies in order; errors once exhausted.
struct Scripted {
    replies: Mutex<VecDeque<Result<String>>>,
}

#[async_trait]
impl LanguageModel for Scripted {
    fn provider(&self) -> &str {
        "scripted"
    }
    fn model(&self) -> &str {
        "test-model"
    }
    async fn generate(&self, _request: &ModelRequest<'_>) -> Result<String> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LeadScoutError::provider("scripted", "script exhausted")))
    }
}

/// Answers by the first needle found in the system prompt.
struct Routed {
    routes: Vec<(&'static str, String)>,
}

#[async_trait]
impl LanguageModel for Routed {
    fn provider(&self) -> &str {
        "routed"
    }
    fn model(&self) -> &str {
        "test-model"
    }
    async fn generate(&self, request: &ModelRequest<'_>) -> Result<String> {
        self.routes
            .iter()
            .find(|(needle, _)| request.system.contains(needle))
            .map(|(_, reply)| reply.clone())
            .ok_or_else(|| LeadScoutError::provider("routed", "no route for prompt"))
    }
}

fn client(model: impl LanguageModel + 'static) -> LlmClient {
    LlmClient::new(
        Box::new(model),
        ResponseCache::disabled(),
        RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        },
        RateLimiter::unlimited(),
        0.2,
    )
}

pub(crate) fn llm_with(replies: Vec<Result<String>>) -> LlmClient {
    client(Scripted {
        replies: Mutex::new(replies.into()),
    })
}

pub(crate) fn llm_routed(routes: Vec<(&'static str, String)>) -> LlmClient {
    client(Routed { routes })
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

pub(crate) fn company(name: &str) -> Company {
    Company {
        name: name.into(),
        key: normalize(name),
        company_type: Default::default(),
        website: None,
        therapeutic_areas: Default::default(),
        fit_score: 0,
        fit_reason: String::new(),
        trial: None,
        decision_makers: vec![],
        overview: None,
        location: None,
        sources: vec![],
    }
}

pub(crate) fn company_with_contact(name: &str, contact: &str) -> Company {
    let mut c = company(name);
    c.decision_makers.push(DecisionMaker {
        name: contact.into(),
        title: "CEO".into(),
        employer: c.key.clone(),
        contact: None,
        research_notes: None,
    });
    c
}

pub(crate) fn failed_trial(id: &str) -> TrialRecord {
    TrialRecord {
        id: id.into(),
        title: "Oral GLP-1 agonist in type 2 diabetes".into(),
        phase: Some("phase 2".into()),
        status: TrialStatus::Terminated,
        sponsor: Some("Helix Therapeutics".into()),
        condition: Some("Type 2 Diabetes".into()),
        why_stopped: Some("Sponsor decision".into()),
        interventions: vec![],
        completion_date: None,
    }
}

pub(crate) fn hit(title: &str, snippet: &str) -> SearchHit {
    SearchHit {
        title: title.into(),
        link: "https://news.example.com/item".into(),
        snippet: snippet.into(),
        source: None,
    }
}

pub(crate) fn pending_draft(company_key: &str, contact: &str) -> EmailDraft {
    EmailDraft {
        id: DraftId::new(),
        subject: "Partnering".into(),
        body: "Short body".into(),
        target: DraftTarget {
            company_key: company_key.into(),
            contact_name: contact.into(),
        },
        state: ReviewState::Pending,
        attempt: 1,
        word_count: 2,
        over_budget: false,
        warnings: vec![],
        reasoning: None,
        generated_at: Utc::now(),
    }
}

pub(crate) async fn notes_store() -> ResearchNotes {
    let path = std::env::temp_dir().join(format!("ls_core_{}.db", uuid::Uuid::now_v7()));
    let store = Storage::open(&path).await.expect("open storage");
    ResearchNotes::new(Some(Arc::new(store)))
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct StubSearch {
    web: Vec<SearchHit>,
    news: Vec<SearchHit>,
    fail: bool,
}

impl StubSearch {
    pub(crate) fn with_web(web: Vec<SearchHit>) -> Self {
        Self {
            web,
            ..Self::default()
        }
    }

    pub(crate) fn with_news(news: Vec<SearchHit>) -> Self {
        Self {
            news,
            ..Self::default()
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl SearchProvider for StubSearch {
    fn name(&self) -> &str {
        "stub-search"
    }

    async fn search(&self, _query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        if self.fail {
            return Err(LeadScoutError::provider("stub-search", "HTTP 401: bad key"));
        }
        Ok(self.web.iter().take(max_results).cloned().collect())
    }

    async fn search_news(&self, _query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        if self.fail {
            return Err(LeadScoutError::provider("stub-search", "HTTP 401: bad key"));
        }
        Ok(self.news.iter().take(max_results).cloned().collect())
    }
}

pub(crate) struct StubTrials {
    trials: Vec<TrialRecord>,
}

impl StubTrials {
    pub(crate) fn with(trials: Vec<TrialRecord>) -> Self {
        Self { trials }
    }
}

#[async_trait]
impl TrialsProvider for StubTrials {
    fn name(&self) -> &str {
        "stub-trials"
    }

    async fn search(&self, _query: &str, max_results: usize) -> Result<Vec<TrialRecord>> {
        Ok(self.trials.iter().take(max_results).cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Operator
// ---------------------------------------------------------------------------

/// Answers from queues. Runs out of notes as "skip" and out of decisions as closed input.
#[derive(Default)]
pub(crate) struct ScriptedOperator {
    notes: VecDeque<Option<String>>,
    decisions: VecDeque<ReviewDecision>,
    pub(crate) questions_seen: Vec<Vec<String>>,
    pub(crate) regenerate_offered: Vec<bool>,
    /// 1-based position of every draft shown.
    pub(crate) positions: Vec<usize>,
}

impl ScriptedOperator {
    pub(crate) fn with_notes(notes: Vec<Option<String>>) -> Self {
        Self {
            notes: notes.into(),
            ..Self::default()
        }
    }

    pub(crate) fn with_decisions(decisions: Vec<ReviewDecision>) -> Self {
        Self {
            decisions: decisions.into(),
            ..Self::default()
        }
    }
}

impl Operator for ScriptedOperator {
    fn research_notes(
        &mut self,
        _company: &Company,
        _contact: &DecisionMaker,
        questions: &[String],
    ) -> Result<Option<String>> {
        self.questions_seen.push(questions.to_vec());
        Ok(self.notes.pop_front().flatten())
    }

    fn review(
        &mut self,
        _draft: &EmailDraft,
        _company: &Company,
        _contact: &DecisionMaker,
        position: &ReviewPosition,
    ) -> Result<ReviewDecision> {
        self.regenerate_offered.push(position.can_regenerate);
        self.positions.push(position.index);
        self.decisions
            .pop_front()
            .ok_or_else(|| LeadScoutError::Interaction("input closed".into()))
    }
}
