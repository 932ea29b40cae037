//! Vote tallies and the threshold rule that turns them into status transitions.
//!
//! The decision is a pure function of `(status, tally, threshold)`. Storage
//! backends call [`decide`] inside whatever atomic unit guards their
//! conditional status write, so the rule lives in one place.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::audit::AuditAction;
use crate::submission::SubmissionStatus;
use crate::vote::VoteValue;

/// Default net-score magnitude that triggers an automatic transition.
pub const DEFAULT_THRESHOLD: u32 = 3;

/// Aggregate counts over the current votes for one target. Never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    pub approvals: u64,
    pub rejections: u64,
}

impl Tally {
    pub fn new(approvals: u64, rejections: u64) -> Self {
        Self {
            approvals,
            rejections,
        }
    }

    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = VoteValue>,
    {
        values.into_iter().fold(Self::default(), |mut tally, value| {
            match value {
                VoteValue::Approve => tally.approvals += 1,
                VoteValue::Reject => tally.rejections += 1,
            }
            tally
        })
    }

    /// `approvals - rejections`.
    pub fn net_score(&self) -> i64 {
        self.approvals as i64 - self.rejections as i64
    }
}

/// Net-score magnitude for automatic transitions. Always at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Threshold(u32);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("vote threshold must be at least 1")]
pub struct ZeroThreshold;

impl Threshold {
    pub fn new(value: u32) -> Result<Self, ZeroThreshold> {
        if value == 0 {
            Err(ZeroThreshold)
        } else {
            Ok(Self(value))
        }
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self(DEFAULT_THRESHOLD)
    }
}

impl TryFrom<u32> for Threshold {
    type Error = ZeroThreshold;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Threshold> for u32 {
    fn from(threshold: Threshold) -> Self {
        threshold.0
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A vote-driven status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Publish,
    Archive,
}

impl Transition {
    pub fn target_status(&self) -> SubmissionStatus {
        match self {
            Self::Publish => SubmissionStatus::Published,
            Self::Archive => SubmissionStatus::Archived,
        }
    }

    pub fn audit_action(&self) -> AuditAction {
        match self {
            Self::Publish => AuditAction::VotePublish,
            Self::Archive => AuditAction::VoteArchive,
        }
    }
}

/// Which transition, if any, the tally calls for, ignoring the current status.
pub fn crossing(tally: &Tally, threshold: Threshold) -> Option<Transition> {
    let net = tally.net_score();
    let bound = i64::from(threshold.get());
    if net >= bound {
        Some(Transition::Publish)
    } else if net <= -bound {
        Some(Transition::Archive)
    } else {
        None
    }
}

/// Which transition, if any, should fire for a target currently in `status`.
///
/// Terminal statuses never transition again through voting.
pub fn decide(status: SubmissionStatus, tally: &Tally, threshold: Threshold) -> Option<Transition> {
    if status.is_open() {
        crossing(tally, threshold)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn three() -> Threshold {
        Threshold::new(3).unwrap()
    }

    #[test]
    fn test_net_score() {
        assert_eq!(Tally::new(5, 2).net_score(), 3);
        assert_eq!(Tally::new(0, 4).net_score(), -4);
        assert_eq!(Tally::default().net_score(), 0);
    }

    #[test]
    fn test_from_values_counts_each_side() {
        let tally = Tally::from_values([
            VoteValue::Approve,
            VoteValue::Reject,
            VoteValue::Approve,
        ]);
        assert_eq!(tally, Tally::new(2, 1));
    }

    #[test]
    fn test_publish_at_exact_threshold() {
        assert_eq!(
            decide(SubmissionStatus::UnderReview, &Tally::new(3, 0), three()),
            Some(Transition::Publish)
        );
        assert_eq!(
            decide(SubmissionStatus::Draft, &Tally::new(4, 1), three()),
            Some(Transition::Publish)
        );
    }

    #[test]
    fn test_archive_at_negative_threshold() {
        assert_eq!(
            decide(SubmissionStatus::UnderReview, &Tally::new(1, 4), three()),
            Some(Transition::Archive)
        );
    }

    #[test]
    fn test_no_transition_below_threshold() {
        assert_eq!(
            decide(SubmissionStatus::UnderReview, &Tally::new(2, 0), three()),
            None
        );
        assert_eq!(
            decide(SubmissionStatus::UnderReview, &Tally::new(10, 8), three()),
            None
        );
    }

    #[test]
    fn test_terminal_status_never_transitions() {
        for status in [SubmissionStatus::Published, SubmissionStatus::Archived] {
            assert_eq!(decide(status, &Tally::new(10, 0), three()), None);
            assert_eq!(decide(status, &Tally::new(0, 10), three()), None);
        }
    }

    #[test]
    fn test_threshold_rejects_zero() {
        assert_eq!(Threshold::new(0), Err(ZeroThreshold));
        assert_eq!(Threshold::default().get(), DEFAULT_THRESHOLD);
    }

    #[test]
    fn test_transition_maps_to_status_and_action() {
        assert_eq!(
            Transition::Publish.target_status(),
            SubmissionStatus::Published
        );
        assert_eq!(Transition::Archive.audit_action(), AuditAction::VoteArchive);
    }

    fn arb_votes() -> impl Strategy<Value = Vec<VoteValue>> {
        proptest::collection::vec(
            prop_oneof![Just(VoteValue::Approve), Just(VoteValue::Reject)],
            0..40,
        )
    }

    fn arb_status() -> impl Strategy<Value = SubmissionStatus> {
        prop_oneof![
            Just(SubmissionStatus::Draft),
            Just(SubmissionStatus::UnderReview),
            Just(SubmissionStatus::Published),
            Just(SubmissionStatus::Archived),
        ]
    }

    proptest! {
        /// Tally is order-independent.
        #[test]
        fn tally_ignores_vote_order(mut votes in arb_votes()) {
            let forward = Tally::from_values(votes.iter().copied());
            votes.reverse();
            let backward = Tally::from_values(votes.iter().copied());
            prop_assert_eq!(forward, backward);
            prop_assert_eq!(forward.approvals + forward.rejections, votes.len() as u64);
        }

        /// A transition fires iff the status is open and |net| >= threshold.
        #[test]
        fn decide_matches_threshold_rule(
            status in arb_status(),
            votes in arb_votes(),
            threshold in 1u32..8,
        ) {
            let threshold = Threshold::new(threshold).unwrap();
            let tally = Tally::from_values(votes);
            let decision = decide(status, &tally, threshold);
            let crosses = tally.net_score().unsigned_abs() >= u64::from(threshold.get());
            prop_assert_eq!(decision.is_some(), status.is_open() && crosses);
            if let Some(transition) = decision {
                prop_assert_eq!(
                    transition == Transition::Publish,
                    tally.net_score() > 0
                );
            }
        }
    }
}
