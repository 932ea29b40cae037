//! In-memory implementation of `ModerationRepository`.
//!
//! All tables sit behind a single `RwLock`; the guarded status write in
//! `apply_vote_threshold` runs under one write guard. All state is lost on
//! restart.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use vigil_core::{decide, AuditRecord, Submission, SubmissionStatus, Tally, TargetRef, Threshold, Vote};

use super::{
    submit_for_review_record, unapplied_outcome, vote_transition_record, ModerationRepository,
    RepositoryError, SubmissionFilter, TransitionAttempt, TransitionOutcome,
};

#[derive(Default)]
struct Tables {
    submissions: HashMap<TargetRef, Submission>,
    /// Insertion order, oldest first.
    order: Vec<TargetRef>,
    /// Votes per target, keyed by voter id.
    votes: HashMap<TargetRef, BTreeMap<String, Vote>>,
    audit: Vec<AuditRecord>,
}

impl Tables {
    fn tally(&self, target: &TargetRef) -> Tally {
        self.votes
            .get(target)
            .map(|votes| Tally::from_values(votes.values().map(|v| v.value)))
            .unwrap_or_default()
    }

    /// Set `status` only if the current status is one of `expected`.
    ///
    /// Returns the previous status when the write happened.
    fn compare_and_set_status(
        &mut self,
        target: &TargetRef,
        expected: &[SubmissionStatus],
        status: SubmissionStatus,
        now: i64,
    ) -> Option<SubmissionStatus> {
        let submission = self.submissions.get_mut(target)?;
        if !expected.contains(&submission.status) {
            return None;
        }
        let previous = submission.status;
        submission.status = status;
        submission.updated_at = now;
        Some(previous)
    }

    fn append_audit(&mut self, mut record: AuditRecord) {
        record.id = self.audit.len() as i64 + 1;
        self.audit.push(record);
    }
}

/// In-memory moderation repository.
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModerationRepository for InMemoryRepository {
    async fn insert_submission(&self, submission: &Submission) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        let target = submission.target();
        if tables.submissions.contains_key(&target) {
            return Err(RepositoryError::storage(
                "insert_submission",
                format!("submission {} already exists", target),
            ));
        }
        tables.order.push(target.clone());
        tables.submissions.insert(target, submission.clone());
        Ok(())
    }

    async fn get_submission(
        &self,
        target: &TargetRef,
    ) -> Result<Option<Submission>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.submissions.get(target).cloned())
    }

    async fn list_submissions(
        &self,
        filter: &SubmissionFilter,
    ) -> Result<Vec<Submission>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .order
            .iter()
            .rev()
            .filter_map(|target| tables.submissions.get(target))
            .filter(|submission| filter.matches(submission))
            .take(filter.limit)
            .cloned()
            .collect())
    }

    async fn upsert_vote(&self, vote: &Vote) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        tables
            .votes
            .entry(vote.target.clone())
            .or_default()
            .insert(vote.voter_id.clone(), vote.clone());
        Ok(())
    }

    async fn upsert_vote_if_open(&self, vote: &Vote) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().await;
        let open = tables
            .submissions
            .get(&vote.target)
            .map_or(false, |submission| submission.status.is_open());
        if open {
            tables
                .votes
                .entry(vote.target.clone())
                .or_default()
                .insert(vote.voter_id.clone(), vote.clone());
        }
        Ok(open)
    }

    async fn delete_vote(
        &self,
        target: &TargetRef,
        voter_id: &str,
    ) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .votes
            .get_mut(target)
            .and_then(|votes| votes.remove(voter_id))
            .is_some())
    }

    async fn list_votes(&self, target: &TargetRef) -> Result<Vec<Vote>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .votes
            .get(target)
            .map(|votes| votes.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn tally(&self, target: &TargetRef) -> Result<Tally, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.tally(target))
    }

    async fn apply_vote_threshold(
        &self,
        target: &TargetRef,
        threshold: Threshold,
        now: i64,
    ) -> Result<TransitionAttempt, RepositoryError> {
        let mut tables = self.tables.write().await;
        let tally = tables.tally(target);

        let Some(status) = tables.submissions.get(target).map(|s| s.status) else {
            return Ok(TransitionAttempt {
                tally,
                outcome: TransitionOutcome::Missing,
            });
        };

        let Some(transition) = decide(status, &tally, threshold) else {
            return Ok(TransitionAttempt {
                tally,
                outcome: unapplied_outcome(status, &tally, threshold),
            });
        };

        let outcome = match tables.compare_and_set_status(
            target,
            &SubmissionStatus::OPEN,
            transition.target_status(),
            now,
        ) {
            Some(from) => {
                tables.append_audit(vote_transition_record(
                    target, transition, from, &tally, threshold, now,
                ));
                TransitionOutcome::Applied { transition, from }
            }
            None => TransitionOutcome::AlreadySettled { status },
        };

        Ok(TransitionAttempt { tally, outcome })
    }

    async fn submit_for_review(
        &self,
        target: &TargetRef,
        actor: &str,
        now: i64,
    ) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().await;
        let applied = tables
            .compare_and_set_status(
                target,
                &[SubmissionStatus::Draft],
                SubmissionStatus::UnderReview,
                now,
            )
            .is_some();
        if applied {
            tables.append_audit(submit_for_review_record(target, actor, now));
        }
        Ok(applied)
    }

    async fn audit_log(
        &self,
        target: &TargetRef,
        limit: usize,
    ) -> Result<Vec<AuditRecord>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .audit
            .iter()
            .rev()
            .filter(|record| &record.target == target)
            .take(limit)
            .cloned()
            .collect())
    }
}
