//! Submission rows: insert, lookup, listing, and the author's draft -> review step.

use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use vigil_core::{RiskAssessment, Submission, SubmissionStatus, TargetKind, TargetRef};

use super::super::{submit_for_review_record, RepositoryError, SubmissionFilter};
use super::{audit, usize_to_i64_limit};

const SUBMISSION_COLUMNS: &str =
    "id, kind, author_id, title, body, likelihood, impact, status, created_at, updated_at";

/// A submission row before its text columns are parsed back into enums.
struct SubmissionRow {
    id: String,
    kind: String,
    author_id: String,
    title: String,
    body: String,
    likelihood: Option<u8>,
    impact: Option<u8>,
    status: String,
    created_at: i64,
    updated_at: i64,
}

impl SubmissionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            author_id: row.get(2)?,
            title: row.get(3)?,
            body: row.get(4)?,
            likelihood: row.get(5)?,
            impact: row.get(6)?,
            status: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_submission(self) -> Result<Submission, RepositoryError> {
        let kind: TargetKind = self
            .kind
            .parse()
            .map_err(|_| RepositoryError::corruption(format!("submission kind '{}'", self.kind)))?;
        let status = parse_status(&self.status)?;
        let risk = RiskAssessment::from_parts(self.likelihood, self.impact)
            .map_err(|e| RepositoryError::corruption(format!("risk for {}: {}", self.id, e)))?;

        Ok(Submission {
            id: self.id,
            kind,
            author_id: self.author_id,
            title: self.title,
            body: self.body,
            risk,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub(super) fn parse_status(value: &str) -> Result<SubmissionStatus, RepositoryError> {
    value
        .parse()
        .map_err(|_| RepositoryError::corruption(format!("submission status '{}'", value)))
}

/// Read the current status of a target, if it exists.
pub(super) fn get_status_sync(
    conn: &Connection,
    target: &TargetRef,
) -> Result<Option<SubmissionStatus>, RepositoryError> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM submissions WHERE kind = ?1 AND id = ?2",
            params![target.kind.as_str(), target.id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| RepositoryError::storage("get_status", e.to_string()))?;

    status.as_deref().map(parse_status).transpose()
}

pub(super) fn insert_submission_sync(
    conn: &Connection,
    submission: &Submission,
) -> Result<(), RepositoryError> {
    conn.execute(
        "INSERT INTO submissions (id, kind, author_id, title, body, likelihood, impact,
                                  status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            submission.id,
            submission.kind.as_str(),
            submission.author_id,
            submission.title,
            submission.body,
            submission.risk.map(|r| r.likelihood()),
            submission.risk.map(|r| r.impact()),
            submission.status.as_str(),
            submission.created_at,
            submission.updated_at,
        ],
    )
    .map_err(|e| RepositoryError::storage("insert_submission", e.to_string()))?;

    Ok(())
}

pub(super) fn get_submission_sync(
    conn: &Connection,
    target: &TargetRef,
) -> Result<Option<Submission>, RepositoryError> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {} FROM submissions WHERE kind = ?1 AND id = ?2",
                SUBMISSION_COLUMNS
            ),
            params![target.kind.as_str(), target.id],
            SubmissionRow::from_row,
        )
        .optional()
        .map_err(|e| RepositoryError::storage("get_submission", e.to_string()))?;

    row.map(SubmissionRow::into_submission).transpose()
}

pub(super) fn list_submissions_sync(
    conn: &Connection,
    filter: &SubmissionFilter,
) -> Result<Vec<Submission>, RepositoryError> {
    let limit = usize_to_i64_limit(filter.limit, "list_submissions")?;

    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM submissions
             WHERE (?1 IS NULL OR kind = ?1) AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?3",
            SUBMISSION_COLUMNS
        ))
        .map_err(|e| RepositoryError::storage("list_submissions", e.to_string()))?;

    let rows = stmt
        .query_map(
            params![
                filter.kind.map(|k| k.as_str()),
                filter.status.map(|s| s.as_str()),
                limit
            ],
            SubmissionRow::from_row,
        )
        .map_err(|e| RepositoryError::storage("list_submissions", e.to_string()))?;

    let mut submissions = Vec::new();
    for row in rows {
        let row =
            row.map_err(|e| RepositoryError::storage("list_submissions row", e.to_string()))?;
        submissions.push(row.into_submission()?);
    }

    Ok(submissions)
}

pub(super) fn submit_for_review_sync(
    conn: &mut Connection,
    target: &TargetRef,
    actor: &str,
    now: i64,
) -> Result<bool, RepositoryError> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| RepositoryError::storage("submit_for_review begin", e.to_string()))?;

    tx.execute(
        "UPDATE submissions SET status = 'under_review', updated_at = ?1
         WHERE kind = ?2 AND id = ?3 AND status = 'draft'",
        params![now, target.kind.as_str(), target.id],
    )
    .map_err(|e| RepositoryError::storage("submit_for_review", e.to_string()))?;

    let applied = tx.changes() > 0;
    if applied {
        audit::append_audit_sync(&tx, &submit_for_review_record(target, actor, now))?;
    }

    tx.commit()
        .map_err(|e| RepositoryError::storage("submit_for_review commit", e.to_string()))?;

    Ok(applied)
}
