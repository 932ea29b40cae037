//! SQLite implementation of `ModerationRepository`.
//!
//! This provides persistent storage that survives service restarts and can
//! be shared by several server processes pointing at the same file.
//!
//! # Schema Versioning
//!
//! The database has a `schema_version` table that tracks the schema version.
//! When the schema needs to change, increment `CURRENT_SCHEMA_VERSION` and add
//! a migration in `run_migrations()`. Migrations run sequentially from the
//! current version to the target version.
//!
//! # Conditional transitions
//!
//! `apply_vote_threshold` runs inside a `BEGIN IMMEDIATE` transaction: the
//! tally, the status read, the `UPDATE ... WHERE status IN (...)` and the
//! audit insert commit together. The affected-row count of the guarded
//! update decides whether this call won; zero rows means another writer
//! already settled the target.

mod audit;
mod ledger;
mod submissions;

#[cfg(test)]
mod tests;

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;
use vigil_core::{AuditRecord, Submission, Tally, TargetRef, Threshold, Vote};

use super::{
    ModerationRepository, RepositoryError, SubmissionFilter, TransitionAttempt,
};

/// Current schema version. Increment this when making schema changes and add
/// corresponding migration logic in `run_migrations()`.
const CURRENT_SCHEMA_VERSION: i64 = 1;

/// SQLite-backed moderation repository.
///
/// Uses `tokio::task::spawn_blocking` to run synchronous rusqlite operations
/// without blocking the async runtime.
pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Create a new SQLite repository at the given path.
    ///
    /// Creates the database file and schema if they don't exist.
    /// Runs any pending migrations if the database exists but has an older schema.
    ///
    /// # Durability
    ///
    /// The database is configured with:
    /// - `journal_mode = WAL` so readers never block the single writer
    /// - `synchronous = FULL` for maximum durability (survives OS/power failure)
    /// - `busy_timeout = 5000ms` so competing writers wait instead of failing
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let path_ref = path.as_ref();

        // Ensure parent directory exists (unless it's :memory: or empty path)
        let path_str = path_ref.to_string_lossy();
        let is_in_memory = path_str == ":memory:";
        if !is_in_memory && !path_str.is_empty() {
            if let Some(parent) = path_ref.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        RepositoryError::storage(
                            "create database directory",
                            format!("{}: {}", parent.display(), e),
                        )
                    })?;
                }
            }
        }

        let conn = Connection::open(path_ref)
            .map_err(|e| RepositoryError::storage("open database", e.to_string()))?;

        // SQLite can silently keep DELETE mode on filesystems without shared
        // memory support. In-memory databases report "memory".
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| RepositoryError::storage("set journal_mode", e.to_string()))?;

        let journal_mode_ok = journal_mode.eq_ignore_ascii_case("wal")
            || (is_in_memory && journal_mode.eq_ignore_ascii_case("memory"));

        if !journal_mode_ok {
            return Err(RepositoryError::storage(
                "configure journal_mode",
                format!(
                    "Failed to enable WAL mode: SQLite returned '{}' instead of 'wal'. \
                     The vote ledger requires WAL mode so several server processes \
                     can share the database.",
                    journal_mode
                ),
            ));
        }

        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            "#,
        )
        .map_err(|e| RepositoryError::storage("configure pragmas", e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| RepositoryError::storage("create schema_version table", e.to_string()))?;

        // 0 if table is empty = fresh database
        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RepositoryError::storage("get schema version", e.to_string()))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run migrations from `from_version` to `CURRENT_SCHEMA_VERSION`.
    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), RepositoryError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(RepositoryError::storage(
                "schema version",
                format!(
                    "Database schema version {} is newer than supported version {}. \
                     Please upgrade the application.",
                    from_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }

        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        if from_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS submissions (
                    kind TEXT NOT NULL,
                    id TEXT NOT NULL,
                    author_id TEXT NOT NULL,
                    title TEXT NOT NULL,
                    body TEXT NOT NULL,
                    likelihood INTEGER,
                    impact INTEGER,
                    status TEXT NOT NULL
                        CHECK (status IN ('draft', 'under_review', 'published', 'archived')),
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    PRIMARY KEY (kind, id)
                );

                CREATE INDEX IF NOT EXISTS idx_submissions_listing
                    ON submissions(kind, status, created_at DESC);

                CREATE TABLE IF NOT EXISTS votes (
                    target_kind TEXT NOT NULL,
                    target_id TEXT NOT NULL,
                    voter_id TEXT NOT NULL,
                    value INTEGER NOT NULL CHECK (value IN (1, -1)),
                    cast_at INTEGER NOT NULL,
                    PRIMARY KEY (target_kind, target_id, voter_id)
                );

                CREATE TABLE IF NOT EXISTS audit_log (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    target_kind TEXT NOT NULL,
                    target_id TEXT NOT NULL,
                    action TEXT NOT NULL,
                    actor TEXT NOT NULL,
                    from_status TEXT NOT NULL,
                    to_status TEXT NOT NULL,
                    details TEXT NOT NULL,
                    recorded_at INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_audit_target
                    ON audit_log(target_kind, target_id, id DESC);
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v1", e.to_string()))?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?1)",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| RepositoryError::storage("update schema version", e.to_string()))?;

        Ok(())
    }

    /// Create a new in-memory SQLite repository (for testing).
    pub fn new_in_memory() -> Result<Self, RepositoryError> {
        Self::new(":memory:")
    }

    /// Run `f` against the connection on the blocking thread pool.
    async fn with_conn<T, F>(&self, operation: &'static str, f: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&mut Connection) -> Result<T, RepositoryError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|_| {
                warn!("SQLite connection mutex poisoned during {}", operation);
                RepositoryError::storage(operation, "connection mutex poisoned")
            })?;
            f(&mut conn)
        })
        .await
        .map_err(|e| RepositoryError::storage(operation, e.to_string()))?
    }
}

// =============================================================================
// Integer conversion helpers
// =============================================================================

/// Convert a usize limit to i64 for SQLite LIMIT clause.
///
/// Returns an error if the value exceeds i64::MAX, which would cause
/// silent overflow/wrap with `as i64`.
pub(super) fn usize_to_i64_limit(
    limit: usize,
    operation: &'static str,
) -> Result<i64, RepositoryError> {
    i64::try_from(limit).map_err(|_| {
        RepositoryError::storage(
            operation,
            format!(
                "limit {} exceeds maximum storable value ({})",
                limit,
                i64::MAX
            ),
        )
    })
}

/// Convert a COUNT/SUM result from SQLite to u64.
///
/// A negative count indicates database corruption.
pub(super) fn i64_to_count(value: i64, what: &'static str) -> Result<u64, RepositoryError> {
    u64::try_from(value).map_err(|_| RepositoryError::corruption(format!("negative {}", what)))
}

// =============================================================================
// ModerationRepository trait implementation
// =============================================================================

#[async_trait]
impl ModerationRepository for SqliteRepository {
    async fn insert_submission(&self, submission: &Submission) -> Result<(), RepositoryError> {
        let submission = submission.clone();
        self.with_conn("insert_submission", move |conn| {
            submissions::insert_submission_sync(conn, &submission)
        })
        .await
    }

    async fn get_submission(
        &self,
        target: &TargetRef,
    ) -> Result<Option<Submission>, RepositoryError> {
        let target = target.clone();
        self.with_conn("get_submission", move |conn| {
            submissions::get_submission_sync(conn, &target)
        })
        .await
    }

    async fn list_submissions(
        &self,
        filter: &SubmissionFilter,
    ) -> Result<Vec<Submission>, RepositoryError> {
        let filter = filter.clone();
        self.with_conn("list_submissions", move |conn| {
            submissions::list_submissions_sync(conn, &filter)
        })
        .await
    }

    async fn upsert_vote(&self, vote: &Vote) -> Result<(), RepositoryError> {
        let vote = vote.clone();
        self.with_conn("upsert_vote", move |conn| ledger::upsert_vote_sync(conn, &vote))
            .await
    }

    async fn upsert_vote_if_open(&self, vote: &Vote) -> Result<bool, RepositoryError> {
        let vote = vote.clone();
        self.with_conn("upsert_vote_if_open", move |conn| {
            ledger::upsert_vote_if_open_sync(conn, &vote)
        })
        .await
    }

    async fn delete_vote(
        &self,
        target: &TargetRef,
        voter_id: &str,
    ) -> Result<bool, RepositoryError> {
        let target = target.clone();
        let voter_id = voter_id.to_string();
        self.with_conn("delete_vote", move |conn| {
            ledger::delete_vote_sync(conn, &target, &voter_id)
        })
        .await
    }

    async fn list_votes(&self, target: &TargetRef) -> Result<Vec<Vote>, RepositoryError> {
        let target = target.clone();
        self.with_conn("list_votes", move |conn| ledger::list_votes_sync(conn, &target))
            .await
    }

    async fn tally(&self, target: &TargetRef) -> Result<Tally, RepositoryError> {
        let target = target.clone();
        self.with_conn("tally", move |conn| ledger::tally_sync(conn, &target))
            .await
    }

    async fn apply_vote_threshold(
        &self,
        target: &TargetRef,
        threshold: Threshold,
        now: i64,
    ) -> Result<TransitionAttempt, RepositoryError> {
        let target = target.clone();
        self.with_conn("apply_vote_threshold", move |conn| {
            ledger::apply_vote_threshold_sync(conn, &target, threshold, now)
        })
        .await
    }

    async fn submit_for_review(
        &self,
        target: &TargetRef,
        actor: &str,
        now: i64,
    ) -> Result<bool, RepositoryError> {
        let target = target.clone();
        let actor = actor.to_string();
        self.with_conn("submit_for_review", move |conn| {
            submissions::submit_for_review_sync(conn, &target, &actor, now)
        })
        .await
    }

    async fn audit_log(
        &self,
        target: &TargetRef,
        limit: usize,
    ) -> Result<Vec<AuditRecord>, RepositoryError> {
        let target = target.clone();
        let limit = usize_to_i64_limit(limit, "audit_log")?;
        self.with_conn("audit_log", move |conn| {
            audit::audit_log_sync(conn, &target, limit)
        })
        .await
    }
}
