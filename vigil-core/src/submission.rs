//! Submission types for community review.
//!
//! A submission is a community-authored record (threat, vulnerability, FUD
//! narrative, BIP evaluation) that moves through a small status lifecycle.
//! Only `Draft` and `UnderReview` are open to vote-driven transitions;
//! `Published` and `Archived` are terminal.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::risk::RiskAssessment;

/// Kind of record being reviewed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Threat,
    Vulnerability,
    Fud,
    Bip,
}

impl TargetKind {
    pub const ALL: [TargetKind; 4] = [
        TargetKind::Threat,
        TargetKind::Vulnerability,
        TargetKind::Fud,
        TargetKind::Bip,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Threat => "threat",
            Self::Vulnerability => "vulnerability",
            Self::Fud => "fud",
            Self::Bip => "bip",
        }
    }

    /// Whether submissions of this kind may carry a likelihood/impact assessment.
    pub fn supports_risk(&self) -> bool {
        matches!(self, Self::Threat | Self::Vulnerability)
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown target type '{0}' (expected threat, vulnerability, fud or bip)")]
pub struct UnknownTargetKind(pub String);

impl FromStr for TargetKind {
    type Err = UnknownTargetKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "threat" => Ok(Self::Threat),
            "vulnerability" => Ok(Self::Vulnerability),
            "fud" => Ok(Self::Fud),
            "bip" => Ok(Self::Bip),
            other => Err(UnknownTargetKind(other.to_string())),
        }
    }
}

/// Lifecycle status of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Draft,
    UnderReview,
    Published,
    Archived,
}

impl SubmissionStatus {
    /// Statuses from which a vote-driven transition may still fire.
    pub const OPEN: [SubmissionStatus; 2] = [SubmissionStatus::Draft, SubmissionStatus::UnderReview];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::UnderReview => "under_review",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Draft | Self::UnderReview)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown submission status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for SubmissionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "under_review" => Ok(Self::UnderReview),
            "published" => Ok(Self::Published),
            "archived" => Ok(Self::Archived),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Reference to a single submission: its kind plus its id within that kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    pub kind: TargetKind,
    pub id: String,
}

impl TargetRef {
    pub fn new(kind: TargetKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// A community-authored record subject to moderation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    #[serde(rename = "targetType")]
    pub kind: TargetKind,
    pub author_id: String,
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskAssessment>,
    pub status: SubmissionStatus,
    /// Unix seconds.
    pub created_at: i64,
    /// Unix seconds.
    pub updated_at: i64,
}

impl Submission {
    pub fn target(&self) -> TargetRef {
        TargetRef::new(self.kind, self.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in TargetKind::ALL {
            assert_eq!(kind.as_str().parse::<TargetKind>(), Ok(kind));
        }
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let err = "proposal".parse::<TargetKind>().unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"unknown target type 'proposal' (expected threat, vulnerability, fud or bip)");
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&SubmissionStatus::UnderReview).unwrap();
        assert_eq!(json, "\"under_review\"");
        assert_eq!(
            "under_review".parse::<SubmissionStatus>(),
            Ok(SubmissionStatus::UnderReview)
        );
    }

    #[test]
    fn test_open_and_terminal_partition() {
        assert!(SubmissionStatus::Draft.is_open());
        assert!(SubmissionStatus::UnderReview.is_open());
        assert!(SubmissionStatus::Published.is_terminal());
        assert!(SubmissionStatus::Archived.is_terminal());
    }

    #[test]
    fn test_risk_support_by_kind() {
        assert!(TargetKind::Threat.supports_risk());
        assert!(TargetKind::Vulnerability.supports_risk());
        assert!(!TargetKind::Fud.supports_risk());
        assert!(!TargetKind::Bip.supports_risk());
    }
}
