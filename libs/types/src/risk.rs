//! Risk verdicts and assessment output
//!
//! A [`RiskAssessment`] is the only value the risk engine hands back to
//! its caller.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::{OrderId, UserId};

/// Reason recorded when no rule or degradation produced one
pub const ALL_CHECKS_PASSED: &str = "All risk checks passed";

/// Admission decision
///
/// Ordered by severity: `ACCEPT < WARN < REJECT`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    /// Admit
    #[default]
    ACCEPT,
    /// Admit with caution
    WARN,
    /// Deny
    REJECT,
}

impl Verdict {
    /// Combine with another verdict, keeping the more severe one.
    ///
    /// A verdict can only move up: `REJECT.escalate(WARN)` stays `REJECT`.
    pub fn escalate(self, other: Verdict) -> Verdict {
        self.max(other)
    }

    /// Whether the order is admitted (and its exposure recorded)
    pub fn is_admitted(&self) -> bool {
        !matches!(self, Verdict::REJECT)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::ACCEPT => "ACCEPT",
            Verdict::WARN => "WARN",
            Verdict::REJECT => "REJECT",
        }
    }
}

/// Result of assessing one order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub verdict: Verdict,
    /// Sum of the scores of every triggered rule
    pub risk_score: Decimal,
    /// Rule reasons in evaluation order, then any degradation notes
    pub reasons: Vec<String>,
    pub notional_amount: Decimal,
    /// Exposure after applying this order, whether or not it was recorded
    pub projected_user_exposure: Decimal,
    pub processing_time_ms: u64,
    pub assessed_at: DateTime<Utc>,
}

impl RiskAssessment {
    /// Check whether any reason contains `needle`
    pub fn has_reason(&self, needle: &str) -> bool {
        self.reasons.iter().any(|r| r.contains(needle))
    }
}
