//! Audit trail for status changes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::submission::{SubmissionStatus, TargetRef};
use crate::tally::{Tally, Threshold};

/// Actor recorded for transitions driven by peer votes rather than a person.
pub const COMMUNITY_ACTOR: &str = "community";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    VotePublish,
    VoteArchive,
    SubmitForReview,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VotePublish => "vote_publish",
            Self::VoteArchive => "vote_archive",
            Self::SubmitForReview => "submit_for_review",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown audit action '{0}'")]
pub struct UnknownAuditAction(pub String);

impl FromStr for AuditAction {
    type Err = UnknownAuditAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vote_publish" => Ok(Self::VotePublish),
            "vote_archive" => Ok(Self::VoteArchive),
            "submit_for_review" => Ok(Self::SubmitForReview),
            other => Err(UnknownAuditAction(other.to_string())),
        }
    }
}

/// The tally that triggered a vote-driven transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TallySnapshot {
    pub approvals: u64,
    pub rejections: u64,
    pub net_score: i64,
    pub threshold: u32,
}

impl TallySnapshot {
    pub fn new(tally: &Tally, threshold: Threshold) -> Self {
        Self {
            approvals: tally.approvals,
            rejections: tally.rejections,
            net_score: tally.net_score(),
            threshold: threshold.get(),
        }
    }
}

/// An append-only record of one status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// Storage-assigned sequence number (0 before it is stored).
    pub id: i64,
    pub target: TargetRef,
    pub action: AuditAction,
    pub actor: String,
    pub from_status: SubmissionStatus,
    pub to_status: SubmissionStatus,
    /// Action-specific payload; a [`TallySnapshot`] for vote transitions.
    pub details: serde_json::Value,
    /// Unix seconds.
    pub recorded_at: i64,
}

impl AuditRecord {
    /// Decode the triggering tally, if this record came from a vote transition.
    pub fn tally_snapshot(&self) -> Option<TallySnapshot> {
        match self.action {
            AuditAction::VotePublish | AuditAction::VoteArchive => {
                serde_json::from_value(self.details.clone()).ok()
            }
            AuditAction::SubmitForReview => None,
        }
    }
}
