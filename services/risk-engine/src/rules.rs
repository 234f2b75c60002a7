//! Pre-trade risk rules
//!
//! Each rule is a pure function of the order and the state gathered
//! before evaluation. Rules run in a fixed order and all of them run:
//! the score counts every risk signal, not just the first.
//!
//! Default order:
//! 1. Notional cap (REJECT, +50)
//! 2. Rate limit (REJECT, +30)
//! 3. Projected exposure (WARN, +20)
//! 4. Volatile symbol size (WARN, +15)
//! 5. Market hours (WARN, +10)

use rust_decimal::Decimal;
use types::order::Order;
use types::risk::Verdict;

use crate::config::{FailurePolicy, RiskEngineConfig};

const NOTIONAL_CAP_SCORE: u32 = 50;
const RATE_LIMIT_SCORE: u32 = 30;
const EXPOSURE_LIMIT_SCORE: u32 = 20;
const VOLATILE_SYMBOL_SCORE: u32 = 15;
const MARKET_HOURS_SCORE: u32 = 10;

/// What the rate limiter said about this order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateOutcome {
    Allowed,
    Limited,
    /// The limiter could not answer
    Unavailable,
}

/// Everything a rule may look at
#[derive(Debug, Clone)]
pub struct RuleInput<'a> {
    pub order: &'a Order,
    pub notional: Decimal,
    pub current_exposure: Decimal,
    pub projected_exposure: Decimal,
    pub rate: RateOutcome,
    /// Local wall-clock hour, 0-23
    pub hour: u32,
}

/// A rule's contribution when it triggers
#[derive(Debug, Clone, PartialEq)]
pub struct RuleHit {
    pub verdict: Verdict,
    pub score: Decimal,
    pub reason: String,
}

impl RuleHit {
    pub fn new(verdict: Verdict, score: u32, reason: impl Into<String>) -> Self {
        Self {
            verdict,
            score: Decimal::from(score),
            reason: reason.into(),
        }
    }
}

pub trait RiskRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// `None` when the rule does not apply to this order
    fn evaluate(&self, input: &RuleInput<'_>) -> Option<RuleHit>;
}

/// Rejects orders whose notional exceeds the per-order cap
#[derive(Debug, Clone)]
pub struct NotionalCapRule {
    pub max_notional: Decimal,
}

impl RiskRule for NotionalCapRule {
    fn name(&self) -> &'static str {
        "notional_cap"
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> Option<RuleHit> {
        (input.notional > self.max_notional).then(|| {
            RuleHit::new(
                Verdict::REJECT,
                NOTIONAL_CAP_SCORE,
                format!("Notional amount exceeds maximum allowed: {}", self.max_notional),
            )
        })
    }
}

/// Rejects orders from users over their order-rate allowance
#[derive(Debug, Clone)]
pub struct RateLimitRule {
    pub max_orders: u32,
    pub window_secs: u64,
    pub failure_policy: FailurePolicy,
}

impl RateLimitRule {
    fn window_label(&self) -> String {
        match self.window_secs {
            60 => "minute".to_string(),
            3600 => "hour".to_string(),
            secs => format!("{} seconds", secs),
        }
    }
}

impl RiskRule for RateLimitRule {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> Option<RuleHit> {
        match (input.rate, self.failure_policy) {
            (RateOutcome::Allowed, _) | (RateOutcome::Unavailable, FailurePolicy::FailOpen) => None,
            (RateOutcome::Limited, _) => Some(RuleHit::new(
                Verdict::REJECT,
                RATE_LIMIT_SCORE,
                format!(
                    "Rate limit exceeded: maximum {} orders per {}",
                    self.max_orders,
                    self.window_label()
                ),
            )),
            (RateOutcome::Unavailable, FailurePolicy::FailClosed) => Some(RuleHit::new(
                Verdict::REJECT,
                RATE_LIMIT_SCORE,
                "Rate limiter unavailable - order rejected",
            )),
        }
    }
}

/// Flags orders that would push the user's exposure over the limit
#[derive(Debug, Clone)]
pub struct ExposureLimitRule {
    pub max_exposure: Decimal,
}

impl RiskRule for ExposureLimitRule {
    fn name(&self) -> &'static str {
        "exposure_limit"
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> Option<RuleHit> {
        (input.projected_exposure > self.max_exposure).then(|| {
            RuleHit::new(
                Verdict::WARN,
                EXPOSURE_LIMIT_SCORE,
                format!("User exposure would exceed maximum allowed: {}", self.max_exposure),
            )
        })
    }
}

/// Flags large orders on volatile symbols
#[derive(Debug, Clone)]
pub struct VolatileSymbolRule {
    pub symbol_prefix: String,
    pub notional_threshold: Decimal,
}

impl RiskRule for VolatileSymbolRule {
    fn name(&self) -> &'static str {
        "volatile_symbol"
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> Option<RuleHit> {
        let volatile = input.order.symbol.starts_with(&self.symbol_prefix);
        (volatile && input.notional > self.notional_threshold).then(|| {
            RuleHit::new(
                Verdict::WARN,
                VOLATILE_SYMBOL_SCORE,
                format!(
                    "Large {} order - increased volatility risk",
                    self.symbol_prefix
                ),
            )
        })
    }
}

/// Flags orders placed outside `[open_hour, close_hour)`
#[derive(Debug, Clone)]
pub struct MarketHoursRule {
    pub open_hour: u32,
    pub close_hour: u32,
}

impl RiskRule for MarketHoursRule {
    fn name(&self) -> &'static str {
        "market_hours"
    }

    fn evaluate(&self, input: &RuleInput<'_>) -> Option<RuleHit> {
        let open = (self.open_hour..self.close_hour).contains(&input.hour);
        (!open).then(|| {
            RuleHit::new(
                Verdict::WARN,
                MARKET_HOURS_SCORE,
                "Order placed outside market hours - reduced liquidity risk",
            )
        })
    }
}

/// The production rule set, in evaluation order
pub fn default_rules(config: &RiskEngineConfig) -> Vec<Box<dyn RiskRule>> {
    vec![
        Box::new(NotionalCapRule {
            max_notional: config.max_notional_per_order,
        }),
        Box::new(RateLimitRule {
            max_orders: config.rate_limit.capacity,
            window_secs: config.rate_limit.refill_period_secs,
            failure_policy: config.rate_limit.failure_policy,
        }),
        Box::new(ExposureLimitRule {
            max_exposure: config.max_user_exposure,
        }),
        Box::new(VolatileSymbolRule {
            symbol_prefix: config.volatile_symbol_prefix.clone(),
            notional_threshold: config.volatile_notional_threshold,
        }),
        Box::new(MarketHoursRule {
            open_hour: config.market_open_hour,
            close_hour: config.market_close_hour,
        }),
    ]
}

/// Accumulated outcome of a rule pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub verdict: Verdict,
    pub score: Decimal,
    pub reasons: Vec<String>,
    /// Names of the rules that triggered, in order
    pub triggered: Vec<&'static str>,
}

impl Evaluation {
    /// Run every rule in order against `input`
    pub fn run(rules: &[Box<dyn RiskRule>], input: &RuleInput<'_>) -> Self {
        let mut evaluation = Self::default();
        for rule in rules {
            if let Some(hit) = rule.evaluate(input) {
                evaluation.apply(rule.name(), hit);
            }
        }
        evaluation
    }

    /// Fold one hit in: verdict escalates, score adds, reason appends
    pub fn apply(&mut self, rule: &'static str, hit: RuleHit) {
        self.verdict = self.verdict.escalate(hit.verdict);
        self.score += hit.score;
        self.reasons.push(hit.reason);
        self.triggered.push(rule);
    }
}
