//! Tests for SQLite repository implementation.

use std::sync::Arc;

use rusqlite::params;
use vigil_core::{
    AuditAction, RiskAssessment, Submission, SubmissionStatus, Tally, TargetKind, TargetRef,
    Threshold, Transition, Vote, VoteValue, COMMUNITY_ACTOR,
};

use super::super::{ModerationRepository, RepositoryError, SubmissionFilter, TransitionOutcome};
use super::{SqliteRepository, CURRENT_SCHEMA_VERSION};

use proptest::prelude::*;

fn threat(id: &str) -> TargetRef {
    TargetRef::new(TargetKind::Threat, id)
}

fn submission(kind: TargetKind, id: &str, status: SubmissionStatus, created_at: i64) -> Submission {
    Submission {
        id: id.to_string(),
        kind,
        author_id: "author".to_string(),
        title: format!("Title {}", id),
        body: "Body".to_string(),
        risk: None,
        status,
        created_at,
        updated_at: created_at,
    }
}

fn vote(target: &TargetRef, voter: &str, value: VoteValue) -> Vote {
    Vote {
        target: target.clone(),
        voter_id: voter.to_string(),
        value,
        cast_at: 500,
    }
}

async fn cast(repo: &SqliteRepository, target: &TargetRef, voters: &[&str], value: VoteValue) {
    for voter in voters {
        repo.upsert_vote(&vote(target, voter, value)).await.unwrap();
    }
}

#[tokio::test]
async fn test_get_returns_none_for_missing() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    assert!(repo.get_submission(&threat("nope")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_insert_then_get_preserves_risk() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let mut stored = submission(TargetKind::Threat, "t-1", SubmissionStatus::Draft, 100);
    stored.risk = Some(RiskAssessment::new(4, 5).unwrap());

    repo.insert_submission(&stored).await.unwrap();
    let retrieved = repo.get_submission(&threat("t-1")).await.unwrap().unwrap();

    assert_eq!(retrieved, stored);
}

#[tokio::test]
async fn test_insert_rejects_duplicate_key() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let stored = submission(TargetKind::Threat, "t-1", SubmissionStatus::Draft, 100);

    repo.insert_submission(&stored).await.unwrap();
    let err = repo.insert_submission(&stored).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Storage { .. }));
}

#[tokio::test]
async fn test_same_id_different_kind_are_distinct() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    repo.insert_submission(&submission(TargetKind::Threat, "x", SubmissionStatus::Draft, 1))
        .await
        .unwrap();
    repo.insert_submission(&submission(TargetKind::Fud, "x", SubmissionStatus::UnderReview, 2))
        .await
        .unwrap();

    let fud = TargetRef::new(TargetKind::Fud, "x");
    assert_eq!(
        repo.get_submission(&fud).await.unwrap().unwrap().status,
        SubmissionStatus::UnderReview
    );

    cast(&repo, &fud, &["a"], VoteValue::Approve).await;
    assert_eq!(repo.tally(&threat("x")).await.unwrap(), Tally::default());
    assert_eq!(repo.tally(&fud).await.unwrap(), Tally::new(1, 0));
}

#[tokio::test]
async fn test_list_filters_and_orders_newest_first() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    for (kind, id, status, at) in [
        (TargetKind::Threat, "a", SubmissionStatus::Draft, 10),
        (TargetKind::Threat, "b", SubmissionStatus::UnderReview, 20),
        (TargetKind::Bip, "c", SubmissionStatus::UnderReview, 30),
        (TargetKind::Threat, "d", SubmissionStatus::UnderReview, 40),
    ] {
        repo.insert_submission(&submission(kind, id, status, at))
            .await
            .unwrap();
    }

    let all = repo
        .list_submissions(&SubmissionFilter {
            kind: None,
            status: None,
            limit: 10,
        })
        .await
        .unwrap();
    let ids: Vec<_> = all.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["d", "c", "b", "a"]);

    let threats_in_review = repo
        .list_submissions(&SubmissionFilter {
            kind: Some(TargetKind::Threat),
            status: Some(SubmissionStatus::UnderReview),
            limit: 10,
        })
        .await
        .unwrap();
    let ids: Vec<_> = threats_in_review.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["d", "b"]);

    let limited = repo
        .list_submissions(&SubmissionFilter {
            kind: None,
            status: None,
            limit: 2,
        })
        .await
        .unwrap();
    assert_eq!(limited.len(), 2);
}

#[tokio::test]
async fn test_upsert_vote_replaces_previous_value() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let target = threat("t-1");

    cast(&repo, &target, &["alice"], VoteValue::Approve).await;
    cast(&repo, &target, &["alice"], VoteValue::Reject).await;

    let votes = repo.list_votes(&target).await.unwrap();
    assert_eq!(votes.len(), 1);
    assert_eq!(votes[0].value, VoteValue::Reject);
    assert_eq!(repo.tally(&target).await.unwrap(), Tally::new(0, 1));
}

#[tokio::test]
async fn test_upsert_vote_if_open_skips_missing_and_terminal_targets() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let open = threat("open");
    let settled = threat("settled");
    repo.insert_submission(&submission(TargetKind::Threat, "open", SubmissionStatus::Draft, 1))
        .await
        .unwrap();
    repo.insert_submission(&submission(TargetKind::Threat, "settled", SubmissionStatus::Published, 2))
        .await
        .unwrap();

    assert!(repo.upsert_vote_if_open(&vote(&open, "alice", VoteValue::Approve)).await.unwrap());
    assert!(repo.upsert_vote_if_open(&vote(&open, "alice", VoteValue::Reject)).await.unwrap());
    assert!(!repo.upsert_vote_if_open(&vote(&settled, "alice", VoteValue::Reject)).await.unwrap());
    assert!(!repo.upsert_vote_if_open(&vote(&threat("missing"), "alice", VoteValue::Reject)).await.unwrap());

    assert_eq!(repo.tally(&open).await.unwrap(), Tally::new(0, 1));
    assert!(repo.list_votes(&settled).await.unwrap().is_empty());
    assert!(repo.list_votes(&threat("missing")).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_vote_reports_whether_removed() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let target = threat("t-1");
    cast(&repo, &target, &["alice", "bob"], VoteValue::Approve).await;

    assert!(repo.delete_vote(&target, "alice").await.unwrap());
    assert!(!repo.delete_vote(&target, "alice").await.unwrap());
    assert_eq!(repo.tally(&target).await.unwrap(), Tally::new(1, 0));
}

#[tokio::test]
async fn test_apply_threshold_below_threshold_changes_nothing() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let target = threat("t-1");
    repo.insert_submission(&submission(TargetKind::Threat, "t-1", SubmissionStatus::UnderReview, 1))
        .await
        .unwrap();
    cast(&repo, &target, &["a", "b"], VoteValue::Approve).await;

    let attempt = repo
        .apply_vote_threshold(&target, Threshold::default(), 600)
        .await
        .unwrap();

    assert_eq!(attempt.tally, Tally::new(2, 0));
    assert_eq!(attempt.outcome, TransitionOutcome::BelowThreshold);
    assert!(repo.audit_log(&target, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_apply_threshold_publishes_and_audits_atomically() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let target = threat("t-1");
    repo.insert_submission(&submission(TargetKind::Threat, "t-1", SubmissionStatus::Draft, 1))
        .await
        .unwrap();
    cast(&repo, &target, &["a", "b", "c"], VoteValue::Approve).await;

    let attempt = repo
        .apply_vote_threshold(&target, Threshold::default(), 600)
        .await
        .unwrap();
    assert_eq!(
        attempt.outcome,
        TransitionOutcome::Applied {
            transition: Transition::Publish,
            from: SubmissionStatus::Draft
        }
    );

    let stored = repo.get_submission(&target).await.unwrap().unwrap();
    assert_eq!(stored.status, SubmissionStatus::Published);
    assert_eq!(stored.updated_at, 600);

    let audit = repo.audit_log(&target, 10).await.unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, AuditAction::VotePublish);
    assert_eq!(audit[0].actor, COMMUNITY_ACTOR);
    assert_eq!(audit[0].from_status, SubmissionStatus::Draft);
    assert_eq!(audit[0].to_status, SubmissionStatus::Published);
    assert_eq!(audit[0].recorded_at, 600);
    let snapshot = audit[0].tally_snapshot().unwrap();
    assert_eq!(snapshot.net_score, 3);
    assert_eq!(snapshot.threshold, 3);
}

#[tokio::test]
async fn test_apply_threshold_archives_on_negative_net() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let target = threat("t-1");
    repo.insert_submission(&submission(TargetKind::Threat, "t-1", SubmissionStatus::UnderReview, 1))
        .await
        .unwrap();
    cast(&repo, &target, &["a"], VoteValue::Approve).await;
    cast(&repo, &target, &["b", "c", "d", "e"], VoteValue::Reject).await;

    let attempt = repo
        .apply_vote_threshold(&target, Threshold::default(), 600)
        .await
        .unwrap();
    assert_eq!(
        attempt.outcome,
        TransitionOutcome::Applied {
            transition: Transition::Archive,
            from: SubmissionStatus::UnderReview
        }
    );
    assert_eq!(
        repo.audit_log(&target, 10).await.unwrap()[0].action,
        AuditAction::VoteArchive
    );
}

#[tokio::test]
async fn test_apply_threshold_on_terminal_target_is_settled() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let target = threat("t-1");
    repo.insert_submission(&submission(TargetKind::Threat, "t-1", SubmissionStatus::Archived, 1))
        .await
        .unwrap();
    cast(&repo, &target, &["a", "b", "c"], VoteValue::Approve).await;

    let attempt = repo
        .apply_vote_threshold(&target, Threshold::default(), 600)
        .await
        .unwrap();
    assert_eq!(
        attempt.outcome,
        TransitionOutcome::AlreadySettled {
            status: SubmissionStatus::Archived
        }
    );
    assert!(repo.audit_log(&target, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_apply_threshold_on_missing_target() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let target = threat("ghost");
    cast(&repo, &target, &["a", "b", "c"], VoteValue::Approve).await;

    let attempt = repo
        .apply_vote_threshold(&target, Threshold::default(), 600)
        .await
        .unwrap();
    assert_eq!(attempt.outcome, TransitionOutcome::Missing);
    assert_eq!(attempt.tally, Tally::new(3, 0));
}

#[tokio::test]
async fn test_submit_for_review_guarded_on_draft() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let target = threat("t-1");
    repo.insert_submission(&submission(TargetKind::Threat, "t-1", SubmissionStatus::Draft, 1))
        .await
        .unwrap();

    assert!(repo.submit_for_review(&target, "author", 50).await.unwrap());
    assert!(!repo.submit_for_review(&target, "author", 60).await.unwrap());

    let audit = repo.audit_log(&target, 10).await.unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, AuditAction::SubmitForReview);
    assert_eq!(audit[0].actor, "author");
    assert_eq!(audit[0].details, serde_json::json!({}));
}

#[tokio::test]
async fn test_audit_log_newest_first_with_limit() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let target = threat("t-1");
    repo.insert_submission(&submission(TargetKind::Threat, "t-1", SubmissionStatus::Draft, 1))
        .await
        .unwrap();
    repo.submit_for_review(&target, "author", 50).await.unwrap();
    cast(&repo, &target, &["a", "b", "c"], VoteValue::Approve).await;
    repo.apply_vote_threshold(&target, Threshold::default(), 60)
        .await
        .unwrap();

    let audit = repo.audit_log(&target, 10).await.unwrap();
    let actions: Vec<_> = audit.iter().map(|r| r.action).collect();
    assert_eq!(
        actions,
        vec![AuditAction::VotePublish, AuditAction::SubmitForReview]
    );
    assert!(audit[0].id > audit[1].id);

    assert_eq!(repo.audit_log(&target, 1).await.unwrap().len(), 1);
}

// =========================================================================
// Concurrency
// =========================================================================

/// Two repositories on one file stand in for two server processes. Both see
/// a crossing tally; exactly one guarded write may win.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_processes_apply_exactly_one_transition() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("race.db");

    let first = Arc::new(SqliteRepository::new(&db_path).unwrap());
    let second = Arc::new(SqliteRepository::new(&db_path).unwrap());
    let target = threat("t-1");

    first
        .insert_submission(&submission(TargetKind::Threat, "t-1", SubmissionStatus::UnderReview, 1))
        .await
        .unwrap();
    cast(&first, &target, &["a", "b", "c"], VoteValue::Approve).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let repo = if i % 2 == 0 {
            first.clone()
        } else {
            second.clone()
        };
        let target = target.clone();
        handles.push(tokio::spawn(async move {
            repo.apply_vote_threshold(&target, Threshold::default(), 700 + i)
                .await
                .unwrap()
        }));
    }

    let mut applied = 0;
    for handle in handles {
        match handle.await.unwrap().outcome {
            TransitionOutcome::Applied { .. } => applied += 1,
            TransitionOutcome::AlreadySettled { status } => {
                assert_eq!(status, SubmissionStatus::Published)
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    assert_eq!(applied, 1, "exactly one racer should win the guarded write");
    assert_eq!(second.audit_log(&target, 10).await.unwrap().len(), 1);
}

// =========================================================================
// On-disk behaviour
// =========================================================================

#[tokio::test]
async fn test_on_disk_persistence_basic() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let target = threat("t-1");

    {
        let repo = SqliteRepository::new(&db_path).unwrap();
        repo.insert_submission(&submission(TargetKind::Threat, "t-1", SubmissionStatus::Draft, 1))
            .await
            .unwrap();
        cast(&repo, &target, &["a", "b"], VoteValue::Approve).await;
    }

    {
        let repo = SqliteRepository::new(&db_path).unwrap();
        assert!(repo.get_submission(&target).await.unwrap().is_some());
        assert_eq!(repo.tally(&target).await.unwrap(), Tally::new(2, 0));
    }
}

#[tokio::test]
async fn test_creates_parent_directory() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("nested").join("state").join("test.db");

    assert!(!db_path.parent().unwrap().exists());
    let _repo = SqliteRepository::new(&db_path).unwrap();
    assert!(db_path.exists());
}

#[tokio::test]
async fn test_schema_version_persisted() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("test.db");

    {
        let _repo = SqliteRepository::new(&db_path).unwrap();
    }

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let version: i64 = conn
        .query_row(
            "SELECT version FROM schema_version WHERE id = 1",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(version, CURRENT_SCHEMA_VERSION);
}

#[tokio::test]
async fn test_rejects_newer_schema_version() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("test.db");

    {
        let _repo = SqliteRepository::new(&db_path).unwrap();
    }
    {
        let conn = rusqlite::Connection::open(&db_path).unwrap();
        conn.execute(
            "UPDATE schema_version SET version = ?1 WHERE id = 1",
            params![CURRENT_SCHEMA_VERSION + 1],
        )
        .unwrap();
    }

    assert!(SqliteRepository::new(&db_path).is_err());
}

#[tokio::test]
async fn test_corrupt_kind_surfaces_as_corruption() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("test.db");

    {
        let _repo = SqliteRepository::new(&db_path).unwrap();
        let conn = rusqlite::Connection::open(&db_path).unwrap();
        conn.execute(
            "INSERT INTO submissions (kind, id, author_id, title, body, status, created_at, updated_at) \
             VALUES ('rumour', 'r-1', 'a', 't', 'b', 'draft', 1, 1)",
            [],
        )
        .unwrap();
    }

    let repo = SqliteRepository::new(&db_path).unwrap();
    let err = repo
        .list_submissions(&SubmissionFilter {
            kind: None,
            status: None,
            limit: 10,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Corruption { .. }));
}

#[tokio::test]
async fn test_wal_mode_enabled() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("test.db");

    let _repo = SqliteRepository::new(&db_path).unwrap();

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let journal_mode: String = conn
        .query_row("PRAGMA journal_mode", [], |row| row.get(0))
        .unwrap();
    assert_eq!(
        journal_mode.to_lowercase(),
        "wal",
        "Database should be in WAL mode"
    );
}

#[tokio::test]
async fn test_vote_value_check_constraint() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let _repo = SqliteRepository::new(&db_path).unwrap();

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let result = conn.execute(
        "INSERT INTO votes (target_kind, target_id, voter_id, value, cast_at) \
         VALUES ('threat', 't-1', 'alice', 2, 0)",
        [],
    );
    assert!(result.is_err(), "only +1 and -1 are storable");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: the stored tally always matches each voter's latest vote,
    /// including after retractions.
    #[test]
    fn tally_matches_latest_votes(
        ops in proptest::collection::vec((0u8..6, proptest::option::of(any::<bool>())), 0..40)
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let repo = SqliteRepository::new_in_memory().unwrap();
            let target = threat("t-1");
            let mut latest = std::collections::HashMap::new();

            for (voter, op) in &ops {
                let voter_id = format!("voter-{}", voter);
                match op {
                    Some(approve) => {
                        let value = if *approve { VoteValue::Approve } else { VoteValue::Reject };
                        repo.upsert_vote(&vote(&target, &voter_id, value)).await.unwrap();
                        latest.insert(*voter, value);
                    }
                    None => {
                        let removed = repo.delete_vote(&target, &voter_id).await.unwrap();
                        assert_eq!(removed, latest.remove(voter).is_some());
                    }
                }
            }

            let expected = Tally::from_values(latest.values().copied());
            assert_eq!(repo.tally(&target).await.unwrap(), expected);
        });
    }
}
