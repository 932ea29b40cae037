pub mod api;
pub mod audit;
pub mod client;
pub mod risk;
pub mod submission;
pub mod tally;
pub mod vote;

pub use audit::{AuditAction, AuditRecord, TallySnapshot, COMMUNITY_ACTOR};
pub use client::VigilClient;
pub use risk::{RiskAssessment, RiskError, RiskLevel};
pub use submission::{Submission, SubmissionStatus, TargetKind, TargetRef};
pub use tally::{crossing, decide, Tally, Threshold, Transition, DEFAULT_THRESHOLD};
pub use vote::{Vote, VoteValue};
