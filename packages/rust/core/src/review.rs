//! Draft review: operator decisions, navigation, regeneration and headless approval.

use std::collections::HashSet;
use std::sync::OnceLock;

use leadscout_llm::LlmClient;
use leadscout_shared::{
    AppConfig, Company, DecisionMaker, DraftId, DraftTarget, EmailDraft, LeadScoutError, Result,
    ReviewState, RunSummary, Stage,
};
use leadscout_storage::ResponseCache;
use tracing::{debug, info, instrument, warn};

use crate::drafting::{self, DraftSettings};
use crate::operator::{Operator, ReviewDecision, ReviewPosition};

/// Language model used to regenerate drafts.
pub enum Regenerator<'a> {
    Client(&'a LlmClient),
    /// Built from configuration on the first regeneration, so a session
    /// that never regenerates needs no API key.
    Deferred {
        config: &'a AppConfig,
        built: OnceLock<std::result::Result<LlmClient, String>>,
    },
}

impl<'a> Regenerator<'a> {
    pub fn deferred(config: &'a AppConfig) -> Self {
        Self::Deferred {
            config,
            built: OnceLock::new(),
        }
    }

    fn client(&self) -> Result<&LlmClient> {
        match self {
            Self::Client(llm) => Ok(*llm),
            Self::Deferred { config, built } => built
                .get_or_init(|| {
                    // Drafting prompts are never cached.
                    LlmClient::from_config(config, ResponseCache::disabled()).map_err(|e| e.to_string())
                })
                .as_ref()
                .map_err(|e| LeadScoutError::config(e.clone())),
        }
    }

    fn is_built(&self) -> bool {
        match self {
            Self::Client(_) => true,
            Self::Deferred { built, .. } => built.get().is_some(),
        }
    }
}

/// Everything review needs to regenerate drafts.
pub struct ReviewContext<'a> {
    pub llm: Regenerator<'a>,
    pub query: &'a str,
    pub settings: DraftSettings<'a>,
    pub max_regenerations: u32,
}

fn lookup<'c>(companies: &'c [Company], target: &DraftTarget) -> Option<(&'c Company, &'c DecisionMaker)> {
    let company = companies.iter().find(|c| c.key == target.company_key)?;
    let contact = company.decision_maker(&target.contact_name)?;
    Some((company, contact))
}

// ---------------------------------------------------------------------------
// Navigation
// ---------------------------------------------------------------------------

/// Superseded drafts are never shown again.
fn reviewable(draft: &EmailDraft) -> bool {
    draft.state != ReviewState::Regenerated
}

fn next_after(drafts: &[EmailDraft], at: usize) -> Option<usize> {
    (at + 1..drafts.len()).find(|&i| reviewable(&drafts[i]))
}

fn previous_before(drafts: &[EmailDraft], at: usize) -> Option<usize> {
    (0..at).rev().find(|&i| reviewable(&drafts[i]))
}

fn position(drafts: &[EmailDraft], at: usize, can_regenerate: bool) -> ReviewPosition {
    ReviewPosition {
        index: drafts[..=at].iter().filter(|d| reviewable(d)).count(),
        total: drafts.iter().filter(|d| reviewable(d)).count(),
        can_regenerate,
        has_previous: previous_before(drafts, at).is_some(),
        has_next: next_after(drafts, at).is_some(),
    }
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// Move `draft` to `to`, reopening an earlier decision first.
fn decide(draft: &mut EmailDraft, to: ReviewState) -> Result<()> {
    if draft.state == to {
        return Ok(());
    }
    if draft.state.is_decided() {
        draft.transition(ReviewState::Pending)?;
    }
    draft.transition(to)
}

/// Apply an edit and re-run the budget and style checks on the new text.
fn apply_edit(draft: &mut EmailDraft, subject: String, body: String, settings: &DraftSettings<'_>) -> Result<()> {
    if draft.state.is_decided() {
        draft.transition(ReviewState::Pending)?;
    }
    draft.transition(ReviewState::Edited)?;
    draft.word_count = drafting::body_word_count(&body, settings.sender);
    draft.over_budget = draft.word_count > settings.word_budget;
    draft.warnings = drafting::quality_warnings(&subject, &body);
    draft.subject = subject;
    draft.body = body;
    Ok(())
}

fn unapprove(draft: &mut EmailDraft) -> Result<()> {
    if !draft.state.is_exportable() {
        debug!(draft = %draft.id, state = %draft.state, "nothing to unapprove");
        return Ok(());
    }
    draft.transition(ReviewState::Pending)
}

/// Walk the drafts with the operator, starting at the first pending one.
///
/// Deciding a draft moves on to the next; the session ends after the last
/// draft, on `Done`, or when the operator's input fails (the rest stay as
/// they are). The operator may step back to reopen or unapprove earlier
/// drafts. A regenerated draft is replaced by a fresh pending one shown right
/// after it. Once a contact has used `max_regenerations`, or a regeneration
/// attempt for the draft failed, regeneration is not offered and a
/// regenerate answer counts as skip.
#[instrument(skip_all, fields(drafts = drafts.len()))]
pub async fn review_drafts(
    ctx: &ReviewContext<'_>,
    companies: &[Company],
    drafts: &mut Vec<EmailDraft>,
    operator: &mut dyn Operator,
    summary: &mut RunSummary,
) {
    let Some(mut at) = drafts.iter().position(|d| d.state == ReviewState::Pending) else {
        return;
    };
    let mut regeneration_failed: HashSet<DraftId> = HashSet::new();

    loop {
        let Some((company, contact)) = lookup(companies, &drafts[at].target) else {
            summary.failure(
                Stage::Review,
                format!("draft {} targets an unknown contact", drafts[at].id),
            );
            match next_after(drafts, at) {
                Some(next) => {
                    at = next;
                    continue;
                }
                None => break,
            }
        };

        let can_regenerate = drafts[at].state == ReviewState::Pending
            && drafts[at].attempt <= ctx.max_regenerations
            && !regeneration_failed.contains(&drafts[at].id);
        let shown = position(drafts, at, can_regenerate);

        let decision = match operator.review(&drafts[at], company, contact, &shown) {
            Ok(decision) => decision,
            Err(e) => {
                warn!(error = %e, "operator input closed, ending review");
                summary.failure(Stage::Review, e.to_string());
                return;
            }
        };

        let applied = match decision {
            ReviewDecision::Previous => {
                at = previous_before(drafts, at).unwrap_or(at);
                continue;
            }
            ReviewDecision::Next => {
                at = next_after(drafts, at).unwrap_or(at);
                continue;
            }
            ReviewDecision::Done => break,
            ReviewDecision::Approve => decide(&mut drafts[at], ReviewState::Approved),
            ReviewDecision::Edit { subject, body } => apply_edit(&mut drafts[at], subject, body, &ctx.settings),
            ReviewDecision::Skip => decide(&mut drafts[at], ReviewState::Skipped),
            ReviewDecision::Unapprove => unapprove(&mut drafts[at]),
            ReviewDecision::Regenerate if !can_regenerate => {
                warn!(contact = %contact.name, "regeneration unavailable, skipping draft");
                decide(&mut drafts[at], ReviewState::Skipped)
            }
            ReviewDecision::Regenerate => {
                let attempt = drafts[at].attempt + 1;
                let regenerated = match ctx.llm.client() {
                    Ok(llm) => {
                        drafting::draft_email(
                            llm,
                            company,
                            contact,
                            ctx.query,
                            ctx.settings,
                            attempt,
                            Some(&drafts[at]),
                        )
                        .await
                    }
                    Err(e) => Err(e),
                };
                match regenerated {
                    Ok(fresh) => match drafts[at].transition(ReviewState::Regenerated) {
                        Ok(()) => {
                            summary.processed(Stage::Review, 1);
                            drafts.insert(at + 1, fresh);
                            at += 1;
                            continue;
                        }
                        Err(e) => Err(e),
                    },
                    Err(e) => {
                        summary.failure(
                            Stage::Review,
                            format!("{} / {}: regeneration failed: {e}", company.name, contact.name),
                        );
                        regeneration_failed.insert(drafts[at].id);
                        continue;
                    }
                }
            }
        };

        match applied {
            Ok(()) => summary.processed(Stage::Review, 1),
            Err(e) => summary.failure(Stage::Review, e.to_string()),
        }
        match next_after(drafts, at) {
            Some(next) => at = next,
            None => break,
        }
    }

    info!(
        approved = drafts.iter().filter(|d| d.state.is_exportable()).count(),
        pending = drafts.iter().filter(|d| d.state == ReviewState::Pending).count(),
        model_used = ctx.llm.is_built(),
        "review finished"
    );
}

/// Approve every pending draft. Returns how many were approved.
pub fn auto_approve(drafts: &mut [EmailDraft]) -> usize {
    let mut approved = 0;
    for draft in drafts.iter_mut().filter(|d| d.state == ReviewState::Pending) {
        if draft.transition(ReviewState::Approved).is_ok() {
            approved += 1;
        }
    }
    approved
}
