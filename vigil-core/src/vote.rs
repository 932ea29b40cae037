//! Votes cast by community members on submissions.

use serde::{Deserialize, Serialize};

use crate::submission::TargetRef;

/// A single signed opinion: approve (+1) or reject (-1).
///
/// Serialized as the bare integer so the wire format stays `1 | -1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum VoteValue {
    Approve,
    Reject,
}

impl VoteValue {
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Approve => 1,
            Self::Reject => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("vote value must be 1 or -1, got {0}")]
pub struct InvalidVoteValue(pub i64);

impl TryFrom<i64> for VoteValue {
    type Error = InvalidVoteValue;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Approve),
            -1 => Ok(Self::Reject),
            other => Err(InvalidVoteValue(other)),
        }
    }
}

impl From<VoteValue> for i64 {
    fn from(value: VoteValue) -> Self {
        value.as_i64()
    }
}

/// One ledger row. At most one exists per (target, voter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub target: TargetRef,
    pub voter_id: String,
    pub value: VoteValue,
    /// Unix seconds of the most recent cast; re-voting overwrites it.
    pub cast_at: i64,
}
