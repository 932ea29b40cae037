//! Submission review state machine.
//!
//! `ModerationService` validates requests, checks preconditions, and drives
//! the repository. Status changes from votes only ever happen inside
//! [`ModerationRepository::apply_vote_threshold`], whose guarded write makes
//! each threshold crossing fire once no matter how many requests race on it.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;
use vigil_core::api::{
    CastVoteRequest, CastVoteResponse, ListQuery, NewSubmission, RemoveVoteRequest,
    RemoveVoteResponse, SubmissionView,
};
use vigil_core::{
    AuditRecord, RiskAssessment, Submission, SubmissionStatus, Tally, TargetKind, TargetRef,
    Threshold, Vote,
};

use crate::error::ModerationError;
use crate::repository::{ModerationRepository, SubmissionFilter, TransitionOutcome};

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_BODY_CHARS: usize = 20_000;
pub const DEFAULT_PAGE_LIMIT: usize = 50;
pub const MAX_PAGE_LIMIT: usize = 100;

/// What to do with a vote on a published or archived submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TerminalVotePolicy {
    /// Record the vote in the ledger; it can never move the status again.
    #[default]
    Record,
    /// Refuse the vote with `InvalidState`.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown terminal vote policy '{0}' (expected record or reject)")]
pub struct UnknownTerminalVotePolicy(pub String);

impl FromStr for TerminalVotePolicy {
    type Err = UnknownTerminalVotePolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "record" => Ok(Self::Record),
            "reject" => Ok(Self::Reject),
            _ => Err(UnknownTerminalVotePolicy(s.to_string())),
        }
    }
}

impl fmt::Display for TerminalVotePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Record => "record",
            Self::Reject => "reject",
        })
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn page_limit(limit: Option<usize>) -> Result<usize, ModerationError> {
    match limit {
        None => Ok(DEFAULT_PAGE_LIMIT),
        Some(n) if (1..=MAX_PAGE_LIMIT).contains(&n) => Ok(n),
        Some(n) => Err(ModerationError::InvalidInput(format!(
            "limit must be between 1 and {}, got {}",
            MAX_PAGE_LIMIT, n
        ))),
    }
}

fn target_ref(kind: TargetKind, id: String) -> Result<TargetRef, ModerationError> {
    if id.trim().is_empty() {
        return Err(ModerationError::InvalidInput(
            "targetId must not be empty".to_string(),
        ));
    }
    Ok(TargetRef::new(kind, id))
}

fn closed_to_votes(target: &TargetRef, status: SubmissionStatus) -> ModerationError {
    ModerationError::InvalidState(format!(
        "{} is {} and no longer accepts votes",
        target, status
    ))
}

#[derive(Clone)]
pub struct ModerationService {
    repository: Arc<dyn ModerationRepository>,
    threshold: Threshold,
    terminal_votes: TerminalVotePolicy,
}

impl ModerationService {
    pub fn new(
        repository: Arc<dyn ModerationRepository>,
        threshold: Threshold,
        terminal_votes: TerminalVotePolicy,
    ) -> Self {
        Self {
            repository,
            threshold,
            terminal_votes,
        }
    }

    pub fn threshold(&self) -> Threshold {
        self.threshold
    }

    pub fn terminal_vote_policy(&self) -> TerminalVotePolicy {
        self.terminal_votes
    }

    async fn require_submission(&self, target: &TargetRef) -> Result<Submission, ModerationError> {
        self.repository
            .get_submission(target)
            .await?
            .ok_or_else(|| ModerationError::NotFound(target.clone()))
    }

    async fn view(&self, submission: Submission) -> Result<SubmissionView, ModerationError> {
        let tally = self.repository.tally(&submission.target()).await?;
        Ok(SubmissionView::new(submission, tally, self.threshold.get()))
    }

    /// Create a submission owned by `author_id`.
    pub async fn create_submission(
        &self,
        author_id: &str,
        request: NewSubmission,
    ) -> Result<SubmissionView, ModerationError> {
        let draft = request.into_draft();

        let title = draft.title.trim();
        if title.is_empty() {
            return Err(ModerationError::InvalidInput(
                "title must not be empty".to_string(),
            ));
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(ModerationError::InvalidInput(format!(
                "title must be at most {} characters",
                MAX_TITLE_CHARS
            )));
        }
        if draft.body.chars().count() > MAX_BODY_CHARS {
            return Err(ModerationError::InvalidInput(format!(
                "body must be at most {} characters",
                MAX_BODY_CHARS
            )));
        }

        let status = draft.status.unwrap_or(SubmissionStatus::UnderReview);
        if !status.is_open() {
            return Err(ModerationError::InvalidInput(format!(
                "a new submission must start as draft or under_review, not {}",
                status
            )));
        }

        let risk = RiskAssessment::from_parts(draft.likelihood, draft.impact)
            .map_err(|e| ModerationError::InvalidInput(e.to_string()))?;

        let created_at = now();
        let submission = Submission {
            id: Uuid::new_v4().to_string(),
            kind: draft.kind,
            author_id: author_id.to_string(),
            title: title.to_string(),
            body: draft.body,
            risk,
            status,
            created_at,
            updated_at: created_at,
        };

        self.repository.insert_submission(&submission).await?;
        info!(
            "Created {} by {} in {}",
            submission.target(),
            author_id,
            status
        );

        Ok(SubmissionView::new(
            submission,
            Tally::default(),
            self.threshold.get(),
        ))
    }

    pub async fn get_submission(
        &self,
        target: &TargetRef,
    ) -> Result<SubmissionView, ModerationError> {
        let submission = self.require_submission(target).await?;
        self.view(submission).await
    }

    pub async fn list_submissions(
        &self,
        query: &ListQuery,
    ) -> Result<Vec<Submission>, ModerationError> {
        let filter = SubmissionFilter {
            kind: query.target_type,
            status: query.status,
            limit: page_limit(query.limit)?,
        };
        Ok(self.repository.list_submissions(&filter).await?)
    }

    /// Move the actor's own draft into review.
    pub async fn submit_for_review(
        &self,
        target: &TargetRef,
        actor_id: &str,
    ) -> Result<SubmissionView, ModerationError> {
        let submission = self.require_submission(target).await?;

        if submission.author_id != actor_id {
            return Err(ModerationError::Forbidden(
                "Only the author can submit a draft for review".to_string(),
            ));
        }
        if submission.status != SubmissionStatus::Draft {
            return Err(ModerationError::InvalidState(format!(
                "{} is {}, only drafts can be submitted for review",
                target, submission.status
            )));
        }

        if !self
            .repository
            .submit_for_review(target, actor_id, now())
            .await?
        {
            let current = self.require_submission(target).await?;
            return Err(ModerationError::InvalidState(format!(
                "{} moved to {} before it could be submitted for review",
                target, current.status
            )));
        }

        info!("{} submitted {} for review", actor_id, target);
        let submission = self.require_submission(target).await?;
        self.view(submission).await
    }

    /// Record `voter_id`'s vote and apply the threshold rule.
    pub async fn cast_vote(
        &self,
        voter_id: &str,
        request: CastVoteRequest,
    ) -> Result<CastVoteResponse, ModerationError> {
        let target = target_ref(request.target_type, request.target_id)?;
        let submission = self.require_submission(&target).await?;

        if submission.author_id == voter_id {
            return Err(ModerationError::Forbidden(
                "You cannot vote on your own submission".to_string(),
            ));
        }
        if submission.status.is_terminal() && self.terminal_votes == TerminalVotePolicy::Reject {
            return Err(closed_to_votes(&target, submission.status));
        }

        let cast_at = now();
        let vote = Vote {
            target: target.clone(),
            voter_id: voter_id.to_string(),
            value: request.vote_value,
            cast_at,
        };
        match self.terminal_votes {
            TerminalVotePolicy::Record => self.repository.upsert_vote(&vote).await?,
            TerminalVotePolicy::Reject => {
                if !self.repository.upsert_vote_if_open(&vote).await? {
                    // Settled (or deleted) between the read above and the write.
                    let current = self.require_submission(&target).await?;
                    return Err(closed_to_votes(&target, current.status));
                }
            }
        }

        let attempt = self
            .repository
            .apply_vote_threshold(&target, self.threshold, cast_at)
            .await?;

        let new_status = match attempt.outcome {
            TransitionOutcome::BelowThreshold => None,
            TransitionOutcome::Applied { transition, from } => {
                info!(
                    "{} moved {} -> {} (approvals={}, rejections={}, threshold={})",
                    target,
                    from,
                    transition.target_status(),
                    attempt.tally.approvals,
                    attempt.tally.rejections,
                    self.threshold
                );
                Some(self.require_submission(&target).await?.status)
            }
            // A concurrent request crossed the same threshold first.
            TransitionOutcome::AlreadySettled { status } if submission.status.is_open() => {
                debug!("{} already settled as {} by a concurrent vote", target, status);
                Some(status)
            }
            TransitionOutcome::AlreadySettled { .. } => None,
            TransitionOutcome::Missing => return Err(ModerationError::NotFound(target)),
        };

        Ok(CastVoteResponse {
            vote_recorded: true,
            net_score: attempt.tally.net_score(),
            new_status,
        })
    }

    /// Retract `voter_id`'s vote. Never triggers a transition.
    pub async fn remove_vote(
        &self,
        voter_id: &str,
        request: RemoveVoteRequest,
    ) -> Result<RemoveVoteResponse, ModerationError> {
        let target = target_ref(request.target_type, request.target_id)?;
        let vote_removed = self.repository.delete_vote(&target, voter_id).await?;
        let tally = self.repository.tally(&target).await?;

        if vote_removed {
            debug!("{} retracted their vote on {}", voter_id, target);
        }

        Ok(RemoveVoteResponse {
            vote_removed,
            net_score: tally.net_score(),
        })
    }

    pub async fn tally(&self, target: &TargetRef) -> Result<Tally, ModerationError> {
        Ok(self.repository.tally(target).await?)
    }

    pub async fn votes(&self, target: &TargetRef) -> Result<Vec<Vote>, ModerationError> {
        self.require_submission(target).await?;
        Ok(self.repository.list_votes(target).await?)
    }

    pub async fn audit_log(
        &self,
        target: &TargetRef,
        limit: Option<usize>,
    ) -> Result<Vec<AuditRecord>, ModerationError> {
        let limit = page_limit(limit)?;
        self.require_submission(target).await?;
        Ok(self.repository.audit_log(target, limit).await?)
    }
}
