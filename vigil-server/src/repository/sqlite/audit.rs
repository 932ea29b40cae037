use rusqlite::{params, Connection};
use vigil_core::{AuditAction, AuditRecord, TargetRef};

use super::super::RepositoryError;
use super::submissions::parse_status;

/// Append an audit record. Callers pass the transaction that made the
/// status change so both commit together.
pub(super) fn append_audit_sync(
    conn: &Connection,
    record: &AuditRecord,
) -> Result<i64, RepositoryError> {
    let details = serde_json::to_string(&record.details)
        .map_err(|e| RepositoryError::storage("append_audit serialize", e.to_string()))?;

    conn.execute(
        "INSERT INTO audit_log (target_kind, target_id, action, actor, from_status,
                                to_status, details, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            record.target.kind.as_str(),
            record.target.id,
            record.action.as_str(),
            record.actor,
            record.from_status.as_str(),
            record.to_status.as_str(),
            details,
            record.recorded_at
        ],
    )
    .map_err(|e| RepositoryError::storage("append_audit", e.to_string()))?;

    Ok(conn.last_insert_rowid())
}

pub(super) fn audit_log_sync(
    conn: &Connection,
    target: &TargetRef,
    limit: i64,
) -> Result<Vec<AuditRecord>, RepositoryError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, action, actor, from_status, to_status, details, recorded_at
             FROM audit_log
             WHERE target_kind = ?1 AND target_id = ?2
             ORDER BY id DESC
             LIMIT ?3",
        )
        .map_err(|e| RepositoryError::storage("audit_log", e.to_string()))?;

    let rows = stmt
        .query_map(params![target.kind.as_str(), target.id, limit], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, i64>(6)?,
            ))
        })
        .map_err(|e| RepositoryError::storage("audit_log", e.to_string()))?;

    let mut records = Vec::new();
    for row in rows {
        let (id, action, actor, from_status, to_status, details, recorded_at) =
            row.map_err(|e| RepositoryError::storage("audit_log row", e.to_string()))?;

        let action: AuditAction = action
            .parse()
            .map_err(|_| RepositoryError::corruption(format!("audit action '{}'", action)))?;
        let details = serde_json::from_str(&details)
            .map_err(|_| RepositoryError::corruption(format!("details of audit record {}", id)))?;

        records.push(AuditRecord {
            id,
            target: target.clone(),
            action,
            actor,
            from_status: parse_status(&from_status)?,
            to_status: parse_status(&to_status)?,
            details,
            recorded_at,
        });
    }

    Ok(records)
}
