//! Human checkpoints.
//!
//! The pipeline pauses at research and review through [`Operator`]. The CLI
//! answers with blocking terminal prompts.

use leadscout_shared::{Company, DecisionMaker, EmailDraft, Result};

/// Operator verdict on one draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    /// Replace subject and body, then mark the draft edited.
    Edit { subject: String, body: String },
    /// Discard this draft and request a fresh one.
    Regenerate,
    Skip,
    /// Withdraw an earlier approval or edit; the draft goes back to pending.
    Unapprove,
    Previous,
    Next,
    /// End the session; undecided drafts stay pending.
    Done,
}

/// Where the operator is in a review session and what is on offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewPosition {
    /// 1-based, among drafts that are still reviewable.
    pub index: usize,
    pub total: usize,
    /// False once the regeneration limit is reached or the draft is decided.
    pub can_regenerate: bool,
    pub has_previous: bool,
    pub has_next: bool,
}

/// Synchronous human-in-the-loop interface.
pub trait Operator {
    /// Collect research notes for `contact`. `None` (or blank) skips the contact.
    fn research_notes(
        &mut self,
        company: &Company,
        contact: &DecisionMaker,
        questions: &[String],
    ) -> Result<Option<String>>;

    /// Decide on `draft`.
    fn review(
        &mut self,
        draft: &EmailDraft,
        company: &Company,
        contact: &DecisionMaker,
        position: &ReviewPosition,
    ) -> Result<ReviewDecision>;
}
