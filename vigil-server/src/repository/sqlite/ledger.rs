//! Vote ledger, tally, and the guarded threshold transition.

use rusqlite::{params, Connection, TransactionBehavior};
use tracing::debug;
use vigil_core::{decide, SubmissionStatus, Tally, TargetRef, Threshold, Vote, VoteValue};

use super::super::{
    unapplied_outcome, vote_transition_record, RepositoryError, TransitionAttempt,
    TransitionOutcome,
};
use super::submissions::get_status_sync;
use super::{audit, i64_to_count};

pub(super) fn upsert_vote_sync(conn: &Connection, vote: &Vote) -> Result<(), RepositoryError> {
    conn.execute(
        "INSERT INTO votes (target_kind, target_id, voter_id, value, cast_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(target_kind, target_id, voter_id) DO UPDATE SET
             value = excluded.value,
             cast_at = excluded.cast_at",
        params![
            vote.target.kind.as_str(),
            vote.target.id,
            vote.voter_id,
            vote.value.as_i64(),
            vote.cast_at
        ],
    )
    .map_err(|e| RepositoryError::storage("upsert_vote", e.to_string()))?;

    Ok(())
}

/// Upsert that only lands while the target is open. Returns whether the row
/// was written; zero changes means the target is missing or terminal.
pub(super) fn upsert_vote_if_open_sync(
    conn: &mut Connection,
    vote: &Vote,
) -> Result<bool, RepositoryError> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| RepositoryError::storage("upsert_vote_if_open begin", e.to_string()))?;

    // The WHERE clause also keeps SQLite from reading ON CONFLICT as a join.
    tx.execute(
        "INSERT INTO votes (target_kind, target_id, voter_id, value, cast_at)
         SELECT ?1, ?2, ?3, ?4, ?5
         WHERE EXISTS (
             SELECT 1 FROM submissions
             WHERE kind = ?1 AND id = ?2 AND status IN (?6, ?7)
         )
         ON CONFLICT(target_kind, target_id, voter_id) DO UPDATE SET
             value = excluded.value,
             cast_at = excluded.cast_at",
        params![
            vote.target.kind.as_str(),
            vote.target.id,
            vote.voter_id,
            vote.value.as_i64(),
            vote.cast_at,
            SubmissionStatus::OPEN[0].as_str(),
            SubmissionStatus::OPEN[1].as_str()
        ],
    )
    .map_err(|e| RepositoryError::storage("upsert_vote_if_open", e.to_string()))?;

    let written = tx.changes() == 1;
    tx.commit()
        .map_err(|e| RepositoryError::storage("upsert_vote_if_open commit", e.to_string()))?;

    Ok(written)
}

pub(super) fn delete_vote_sync(
    conn: &Connection,
    target: &TargetRef,
    voter_id: &str,
) -> Result<bool, RepositoryError> {
    let removed = conn
        .execute(
            "DELETE FROM votes WHERE target_kind = ?1 AND target_id = ?2 AND voter_id = ?3",
            params![target.kind.as_str(), target.id, voter_id],
        )
        .map_err(|e| RepositoryError::storage("delete_vote", e.to_string()))?;

    Ok(removed > 0)
}

pub(super) fn list_votes_sync(
    conn: &Connection,
    target: &TargetRef,
) -> Result<Vec<Vote>, RepositoryError> {
    let mut stmt = conn
        .prepare(
            "SELECT voter_id, value, cast_at FROM votes
             WHERE target_kind = ?1 AND target_id = ?2
             ORDER BY voter_id",
        )
        .map_err(|e| RepositoryError::storage("list_votes", e.to_string()))?;

    let rows = stmt
        .query_map(params![target.kind.as_str(), target.id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })
        .map_err(|e| RepositoryError::storage("list_votes", e.to_string()))?;

    let mut votes = Vec::new();
    for row in rows {
        let (voter_id, value, cast_at) =
            row.map_err(|e| RepositoryError::storage("list_votes row", e.to_string()))?;
        let value = VoteValue::try_from(value)
            .map_err(|_| RepositoryError::corruption(format!("vote value {}", value)))?;
        votes.push(Vote {
            target: target.clone(),
            voter_id,
            value,
            cast_at,
        });
    }

    Ok(votes)
}

pub(super) fn tally_sync(conn: &Connection, target: &TargetRef) -> Result<Tally, RepositoryError> {
    let (approvals, rejections): (i64, i64) = conn
        .query_row(
            "SELECT COALESCE(SUM(CASE WHEN value = 1 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN value = -1 THEN 1 ELSE 0 END), 0)
             FROM votes WHERE target_kind = ?1 AND target_id = ?2",
            params![target.kind.as_str(), target.id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .map_err(|e| RepositoryError::storage("tally", e.to_string()))?;

    Ok(Tally::new(
        i64_to_count(approvals, "approval count")?,
        i64_to_count(rejections, "rejection count")?,
    ))
}

pub(super) fn apply_vote_threshold_sync(
    conn: &mut Connection,
    target: &TargetRef,
    threshold: Threshold,
    now: i64,
) -> Result<TransitionAttempt, RepositoryError> {
    // IMMEDIATE takes the write lock up front so the tally we read is the one
    // the guarded update commits against, even across processes.
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| RepositoryError::storage("apply_vote_threshold begin", e.to_string()))?;

    let tally = tally_sync(&tx, target)?;

    let Some(status) = get_status_sync(&tx, target)? else {
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

    let to = transition.target_status();
    tx.execute(
        "UPDATE submissions SET status = ?1, updated_at = ?2
         WHERE kind = ?3 AND id = ?4 AND status IN (?5, ?6)",
        params![
            to.as_str(),
            now,
            target.kind.as_str(),
            target.id,
            SubmissionStatus::OPEN[0].as_str(),
            SubmissionStatus::OPEN[1].as_str()
        ],
    )
    .map_err(|e| RepositoryError::storage("apply_vote_threshold update", e.to_string()))?;

    let outcome = if tx.changes() == 1 {
        audit::append_audit_sync(
            &tx,
            &vote_transition_record(target, transition, status, &tally, threshold, now),
        )?;
        TransitionOutcome::Applied {
            transition,
            from: status,
        }
    } else {
        let current = get_status_sync(&tx, target)?.unwrap_or(to);
        debug!(
            "Guarded update for {} affected no rows; status is {}",
            target, current
        );
        TransitionOutcome::AlreadySettled { status: current }
    };

    tx.commit()
        .map_err(|e| RepositoryError::storage("apply_vote_threshold commit", e.to_string()))?;

    Ok(TransitionAttempt { tally, outcome })
}
