//! Likelihood x impact risk scoring for threat and vulnerability submissions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest accepted likelihood or impact rating.
pub const MIN_RATING: u8 = 1;
/// Highest accepted likelihood or impact rating.
pub const MAX_RATING: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RiskError {
    #[error("{field} must be between 1 and 5, got {value}")]
    OutOfRange { field: &'static str, value: u8 },
    #[error("likelihood and impact must be given together")]
    Incomplete,
}

/// A validated likelihood/impact pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRisk")]
pub struct RiskAssessment {
    likelihood: u8,
    impact: u8,
}

/// Unchecked wire form; deserialization goes through `RiskAssessment::new`.
#[derive(Deserialize)]
struct RawRisk {
    likelihood: u8,
    impact: u8,
}

impl TryFrom<RawRisk> for RiskAssessment {
    type Error = RiskError;

    fn try_from(raw: RawRisk) -> Result<Self, Self::Error> {
        Self::new(raw.likelihood, raw.impact)
    }
}

impl RiskAssessment {
    pub fn new(likelihood: u8, impact: u8) -> Result<Self, RiskError> {
        check_rating("likelihood", likelihood)?;
        check_rating("impact", impact)?;
        Ok(Self { likelihood, impact })
    }

    /// Build an assessment from optional request fields.
    ///
    /// Both absent is `Ok(None)`; exactly one present is an error.
    pub fn from_parts(
        likelihood: Option<u8>,
        impact: Option<u8>,
    ) -> Result<Option<Self>, RiskError> {
        match (likelihood, impact) {
            (None, None) => Ok(None),
            (Some(l), Some(i)) => Self::new(l, i).map(Some),
            _ => Err(RiskError::Incomplete),
        }
    }

    pub fn likelihood(&self) -> u8 {
        self.likelihood
    }

    pub fn impact(&self) -> u8 {
        self.impact
    }

    /// `likelihood * impact`, in `1..=25`.
    pub fn score(&self) -> u8 {
        self.likelihood * self.impact
    }

    pub fn level(&self) -> RiskLevel {
        match self.score() {
            0..=4 => RiskLevel::Low,
            5..=9 => RiskLevel::Medium,
            10..=16 => RiskLevel::High,
            _ => RiskLevel::Critical,
        }
    }
}

fn check_rating(field: &'static str, value: u8) -> Result<(), RiskError> {
    if (MIN_RATING..=MAX_RATING).contains(&value) {
        Ok(())
    } else {
        Err(RiskError::OutOfRange { field, value })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}
