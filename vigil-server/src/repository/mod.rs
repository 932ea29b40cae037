//! Repository abstraction for submissions, the vote ledger, and the audit log.
//!
//! This module defines the `ModerationRepository` trait that abstracts the
//! storage operations behind the review state machine. Implementations
//! provide different backends (in-memory, SQLite).
//!
//! # Conditional transitions
//!
//! Status changes driven by votes go through
//! [`ModerationRepository::apply_vote_threshold`]. Every backend performs the
//! tally, the threshold decision, the status write guarded on
//! `status IN ('draft', 'under_review')`, and the audit append as one atomic
//! unit. When several requests cross the threshold at once, exactly one
//! guarded write succeeds and only that one appends an audit record.

mod memory;
mod sqlite;

pub use memory::InMemoryRepository;
pub use sqlite::SqliteRepository;

use async_trait::async_trait;
use vigil_core::{
    crossing, AuditRecord, Submission, SubmissionStatus, Tally, TallySnapshot, TargetKind,
    TargetRef, Threshold, Transition, Vote, COMMUNITY_ACTOR,
};

/// Errors raised by a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("storage error during {operation}: {message}")]
    Storage {
        operation: &'static str,
        message: String,
    },
    #[error("corrupt {what} in storage")]
    Corruption { what: String },
}

impl RepositoryError {
    pub fn storage(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Storage {
            operation,
            message: message.into(),
        }
    }

    pub fn corruption(what: impl Into<String>) -> Self {
        Self::Corruption { what: what.into() }
    }
}

/// Filter for listing submissions, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionFilter {
    pub kind: Option<TargetKind>,
    pub status: Option<SubmissionStatus>,
    pub limit: usize,
}

impl SubmissionFilter {
    fn matches(&self, submission: &Submission) -> bool {
        self.kind.map_or(true, |k| k == submission.kind)
            && self.status.map_or(true, |s| s == submission.status)
    }
}

/// What happened when the threshold rule was applied to a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The tally does not reach the threshold in either direction.
    BelowThreshold,
    /// This call's guarded write changed the status.
    Applied {
        transition: Transition,
        from: SubmissionStatus,
    },
    /// The tally crosses the threshold but the target was no longer open,
    /// typically because a concurrent request already moved it.
    AlreadySettled { status: SubmissionStatus },
    /// The target does not exist.
    Missing,
}

/// The tally observed inside the atomic unit, plus what it led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionAttempt {
    pub tally: Tally,
    pub outcome: TransitionOutcome,
}

/// Repository trait for the review state machine.
#[async_trait]
pub trait ModerationRepository: Send + Sync {
    /// Store a new submission.
    async fn insert_submission(&self, submission: &Submission) -> Result<(), RepositoryError>;

    /// Get a submission, returning None if not found.
    async fn get_submission(
        &self,
        target: &TargetRef,
    ) -> Result<Option<Submission>, RepositoryError>;

    /// List submissions matching the filter, newest first.
    async fn list_submissions(
        &self,
        filter: &SubmissionFilter,
    ) -> Result<Vec<Submission>, RepositoryError>;

    /// Insert or overwrite the vote for `(vote.target, vote.voter_id)`.
    async fn upsert_vote(&self, vote: &Vote) -> Result<(), RepositoryError>;

    /// Like `upsert_vote`, but the write only happens while the target is
    /// `draft` or `under_review`, checked in the same atomic unit. Returns
    /// whether the vote was written.
    async fn upsert_vote_if_open(&self, vote: &Vote) -> Result<bool, RepositoryError>;

    /// Delete a voter's vote. Returns whether a row was removed.
    async fn delete_vote(&self, target: &TargetRef, voter_id: &str)
        -> Result<bool, RepositoryError>;

    /// All current votes for a target, ordered by voter id.
    async fn list_votes(&self, target: &TargetRef) -> Result<Vec<Vote>, RepositoryError>;

    /// Count current votes for a target.
    async fn tally(&self, target: &TargetRef) -> Result<Tally, RepositoryError>;

    /// Recompute the tally and, if it crosses `threshold` while the target is
    /// open, move the target to its terminal status and append a
    /// `vote_publish`/`vote_archive` audit record. Atomic per call.
    async fn apply_vote_threshold(
        &self,
        target: &TargetRef,
        threshold: Threshold,
        now: i64,
    ) -> Result<TransitionAttempt, RepositoryError>;

    /// Move a target from `draft` to `under_review`, guarded on `draft`, and
    /// append a `submit_for_review` audit record. Returns whether the write
    /// happened.
    async fn submit_for_review(
        &self,
        target: &TargetRef,
        actor: &str,
        now: i64,
    ) -> Result<bool, RepositoryError>;

    /// Audit records for a target, newest first.
    async fn audit_log(
        &self,
        target: &TargetRef,
        limit: usize,
    ) -> Result<Vec<AuditRecord>, RepositoryError>;
}

/// Outcome for a tally that produced no transition from `status`.
pub(crate) fn unapplied_outcome(
    status: SubmissionStatus,
    tally: &Tally,
    threshold: Threshold,
) -> TransitionOutcome {
    if crossing(tally, threshold).is_some() {
        TransitionOutcome::AlreadySettled { status }
    } else {
        TransitionOutcome::BelowThreshold
    }
}

/// Audit record for a vote-driven transition, attributed to the community.
pub(crate) fn vote_transition_record(
    target: &TargetRef,
    transition: Transition,
    from: SubmissionStatus,
    tally: &Tally,
    threshold: Threshold,
    now: i64,
) -> AuditRecord {
    let snapshot = TallySnapshot::new(tally, threshold);
    AuditRecord {
        id: 0,
        target: target.clone(),
        action: transition.audit_action(),
        actor: COMMUNITY_ACTOR.to_string(),
        from_status: from,
        to_status: transition.target_status(),
        details: serde_json::json!({
            "approvals": snapshot.approvals,
            "rejections": snapshot.rejections,
            "netScore": snapshot.net_score,
            "threshold": snapshot.threshold,
        }),
        recorded_at: now,
    }
}

/// Audit record for an author moving their draft into review.
pub(crate) fn submit_for_review_record(target: &TargetRef, actor: &str, now: i64) -> AuditRecord {
    AuditRecord {
        id: 0,
        target: target.clone(),
        action: vigil_core::AuditAction::SubmitForReview,
        actor: actor.to_string(),
        from_status: SubmissionStatus::Draft,
        to_status: SubmissionStatus::UnderReview,
        details: serde_json::json!({}),
        recorded_at: now,
    }
}
