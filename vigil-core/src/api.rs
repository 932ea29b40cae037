//! JSON request and response bodies for the HTTP API.
//!
//! Shared by the server (which deserializes requests) and the CLI client
//! (which serializes them), so both ends agree on field names.

use serde::{Deserialize, Serialize};

use crate::audit::AuditRecord;
use crate::risk::RiskLevel;
use crate::submission::{Submission, SubmissionStatus, TargetKind};
use crate::tally::Tally;
use crate::vote::{Vote, VoteValue};

/// Body of `POST /votes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastVoteRequest {
    pub target_type: TargetKind,
    pub target_id: String,
    pub vote_value: VoteValue,
}

/// Response of `POST /votes`.
///
/// `new_status` is `None` (JSON `null`) when this request did not see a
/// threshold crossing; otherwise it is the status actually stored after the
/// conditional update, which may have been written by a concurrent request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastVoteResponse {
    pub vote_recorded: bool,
    pub net_score: i64,
    pub new_status: Option<SubmissionStatus>,
}

/// Body of `DELETE /votes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveVoteRequest {
    pub target_type: TargetKind,
    pub target_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveVoteResponse {
    pub vote_removed: bool,
    pub net_score: i64,
}

/// Content fields shared by every submission kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionContent {
    pub title: String,
    pub body: String,
    /// Initial status; `draft` or `under_review` (the default).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SubmissionStatus>,
}

/// Content for kinds that carry a likelihood/impact assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessedContent {
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SubmissionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub likelihood: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<u8>,
}

/// Body of `POST /submissions`, tagged by `targetType`.
///
/// Only threats and vulnerabilities accept risk fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "targetType", rename_all = "lowercase")]
pub enum NewSubmission {
    Threat(AssessedContent),
    Vulnerability(AssessedContent),
    Fud(SubmissionContent),
    Bip(SubmissionContent),
}

/// A `NewSubmission` flattened into one shape for validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionDraft {
    pub kind: TargetKind,
    pub title: String,
    pub body: String,
    pub status: Option<SubmissionStatus>,
    pub likelihood: Option<u8>,
    pub impact: Option<u8>,
}

impl NewSubmission {
    pub fn kind(&self) -> TargetKind {
        match self {
            Self::Threat(_) => TargetKind::Threat,
            Self::Vulnerability(_) => TargetKind::Vulnerability,
            Self::Fud(_) => TargetKind::Fud,
            Self::Bip(_) => TargetKind::Bip,
        }
    }

    pub fn into_draft(self) -> SubmissionDraft {
        let kind = self.kind();
        match self {
            Self::Threat(c) | Self::Vulnerability(c) => SubmissionDraft {
                kind,
                title: c.title,
                body: c.body,
                status: c.status,
                likelihood: c.likelihood,
                impact: c.impact,
            },
            Self::Fud(c) | Self::Bip(c) => SubmissionDraft {
                kind,
                title: c.title,
                body: c.body,
                status: c.status,
                likelihood: None,
                impact: None,
            },
        }
    }
}

/// A submission with its live tally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionView {
    #[serde(flatten)]
    pub submission: Submission,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    pub tally: Tally,
    pub net_score: i64,
    pub threshold: u32,
}

impl SubmissionView {
    pub fn new(submission: Submission, tally: Tally, threshold: u32) -> Self {
        let risk_score = submission.risk.map(|r| r.score());
        let risk_level = submission.risk.map(|r| r.level());
        Self {
            submission,
            risk_score,
            risk_level,
            net_score: tally.net_score(),
            tally,
            threshold,
        }
    }
}

/// Query string of `GET /submissions`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_type: Option<TargetKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SubmissionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionList {
    pub submissions: Vec<Submission>,
}

/// Current ledger rows for one target, ordered by voter id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteList {
    pub votes: Vec<Vote>,
}

/// Query string of `GET /submissions/:kind/:id/audit`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    pub entries: Vec<AuditRecord>,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cast_vote_request_shape() {
        let req: CastVoteRequest = serde_json::from_value(json!({
            "targetType": "fud",
            "targetId": "abc",
            "voteValue": -1
        }))
        .unwrap();
        assert_eq!(req.target_type, TargetKind::Fud);
        assert_eq!(req.vote_value, VoteValue::Reject);
    }

    #[test]
    fn test_cast_vote_request_rejects_bad_value() {
        let result: Result<CastVoteRequest, _> = serde_json::from_value(json!({
            "targetType": "threat",
            "targetId": "abc",
            "voteValue": 2
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_cast_vote_response_reports_null_status() {
        let resp = CastVoteResponse {
            vote_recorded: true,
            net_score: 2,
            new_status: None,
        };
        assert_eq!(
            serde_json::to_value(resp).unwrap(),
            json!({"voteRecorded": true, "netScore": 2, "newStatus": null})
        );
    }

    #[test]
    fn test_new_submission_tagged_by_kind() {
        let threat: NewSubmission = serde_json::from_value(json!({
            "targetType": "threat",
            "title": "Quantum break of ECDSA",
            "body": "...",
            "likelihood": 2,
            "impact": 5
        }))
        .unwrap();
        let draft = threat.into_draft();
        assert_eq!(draft.kind, TargetKind::Threat);
        assert_eq!((draft.likelihood, draft.impact), (Some(2), Some(5)));

        let fud: NewSubmission = serde_json::from_value(json!({
            "targetType": "fud",
            "title": "Bitcoin boils the oceans",
            "body": "...",
            "status": "draft"
        }))
        .unwrap();
        let draft = fud.into_draft();
        assert_eq!(draft.kind, TargetKind::Fud);
        assert_eq!(draft.status, Some(SubmissionStatus::Draft));
        assert_eq!(draft.likelihood, None);
    }

    #[test]
    fn test_new_submission_rejects_unknown_kind() {
        let result: Result<NewSubmission, _> = serde_json::from_value(json!({
            "targetType": "meme",
            "title": "t",
            "body": "b"
        }));
        assert!(result.is_err());
    }
}
