//! Risk assessment orchestrator
//!
//! Ties together rate limiting, exposure accounting, rule evaluation and
//! publication for one order at a time. Many orders may be assessed
//! concurrently; the only shared state is per user.
//!
//! Stage order per order:
//! RECEIVED → RATE_CHECKED → EXPOSURE_EVALUATED → RULES_APPLIED →
//! USER_LOCKED → EXPOSURE_EVALUATED → RULES_APPLIED → LEDGER_UPDATED
//! (admitted orders only) → PUBLISHED (best effort) → ASSESSED
//!
//! Rejected orders skip the user lock. Admitted orders re-read exposure and
//! re-run the rules while holding it, so concurrent orders for one user
//! each build on the previous write.

use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;
use tracing::{error, info, trace, warn};
use types::order::Order;
use types::risk::{RiskAssessment, Verdict, ALL_CHECKS_PASSED};

use crate::clock::{Clock, SystemClock};
use crate::config::RiskEngineConfig;
use crate::error::{PublishError, StoreError};
use crate::events::EventPublisher;
use crate::exposure::{self, ExposureLedger};
use crate::rate_limit::{RateGate, RateLimiter};
use crate::rules::{self, Evaluation, RateOutcome, RiskRule, RuleInput};

pub const EXPOSURE_UNAVAILABLE_REASON: &str =
    "Exposure ledger unavailable - exposure assumed zero and not updated";
pub const EXPOSURE_BUSY_REASON: &str =
    "Exposure record busy with concurrent orders - order rejected";
pub const LEDGER_WRITE_FAILED_REASON: &str = "Failed to update exposure ledger";
pub const PUBLISH_FAILED_REASON: &str = "Failed to publish to analytics service";

/// Progress of a single assessment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssessmentStage {
    Received,
    RateChecked,
    ExposureEvaluated,
    RulesApplied,
    UserLocked,
    LedgerUpdated,
    Published,
    Assessed,
}

fn enter(order_id: &str, stage: AssessmentStage) {
    trace!(order_id, stage = ?stage, "Assessment stage");
}

/// One rule pass over an exposure reading
struct Pass {
    /// `None` when the exposure store could not be read
    current: Option<Decimal>,
    notional: Decimal,
    projected: Decimal,
    evaluation: Evaluation,
}

/// Risk engine service
pub struct RiskEngine {
    config: RiskEngineConfig,
    rate_gate: Arc<dyn RateGate>,
    ledger: Arc<ExposureLedger>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    rules: Vec<Box<dyn RiskRule>>,
}

impl RiskEngine {
    /// Create an engine with an in-process rate limiter, the default
    /// rule set and the system clock.
    pub fn new(
        config: RiskEngineConfig,
        ledger: Arc<ExposureLedger>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        let rate_gate = Arc::new(RateLimiter::new(&config.rate_limit));
        let rules = rules::default_rules(&config);
        Self {
            config,
            rate_gate,
            ledger,
            publisher,
            clock: Arc::new(SystemClock),
            rules,
        }
    }

    pub fn with_rate_gate(mut self, rate_gate: Arc<dyn RateGate>) -> Self {
        self.rate_gate = rate_gate;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the rule set; rules run in the given order
    pub fn with_rules(mut self, rules: Vec<Box<dyn RiskRule>>) -> Self {
        self.rules = rules;
        self
    }

    pub fn config(&self) -> &RiskEngineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &ExposureLedger {
        &self.ledger
    }

    /// Assess one order.
    ///
    /// Never fails: collaborator failures are logged and recorded as extra
    /// reasons after the rule reasons. They leave the verdict alone, except
    /// that an order whose exposure record stays locked past the lock
    /// timeout is rejected rather than admitted without being recorded.
    pub async fn assess(&self, order: &Order) -> RiskAssessment {
        let started = Instant::now();
        let order_id = order.order_id.as_str();
        let user_id = order.user_id.as_str();
        let hour = self.clock.local_hour();
        let mut notes: Vec<String> = Vec::new();
        enter(order_id, AssessmentStage::Received);

        let rate = match self.rate_gate.admit(user_id) {
            Ok(true) => RateOutcome::Allowed,
            Ok(false) => RateOutcome::Limited,
            Err(err) => {
                warn!(order_id, user_id, error = %err, "Rate limiter unavailable");
                RateOutcome::Unavailable
            }
        };
        enter(order_id, AssessmentStage::RateChecked);

        // Unlocked pass. A rejected order never writes, so it is settled
        // here without queueing behind the user's other orders.
        let current = self.read_exposure(order_id, user_id).await;
        let mut pass = self.evaluate(order, rate, current, hour);

        if pass.evaluation.verdict.is_admitted() && pass.current.is_some() {
            match self.ledger.lock_user(user_id).await {
                Ok(user_lock) => {
                    enter(order_id, AssessmentStage::UserLocked);
                    // Re-read under the lock so the write builds on the latest value
                    let current = self.read_exposure(order_id, user_id).await;
                    pass = self.evaluate(order, rate, current, hour);
                    if pass.evaluation.verdict.is_admitted() && pass.current.is_some() {
                        match self.ledger.write(user_id, pass.projected).await {
                            Ok(()) => enter(order_id, AssessmentStage::LedgerUpdated),
                            Err(err) => {
                                error!(order_id, user_id, error = %err, "Failed to update exposure");
                                notes.push(LEDGER_WRITE_FAILED_REASON.to_string());
                            }
                        }
                    }
                    drop(user_lock);
                }
                Err(err) => {
                    warn!(order_id, user_id, error = %err, "Exposure record busy, rejecting order");
                    pass.evaluation.verdict = pass.evaluation.verdict.escalate(Verdict::REJECT);
                    notes.push(EXPOSURE_BUSY_REASON.to_string());
                }
            }
        }
        if pass.current.is_none() {
            notes.insert(0, EXPOSURE_UNAVAILABLE_REASON.to_string());
        }

        match self.publish(order).await {
            Ok(()) => enter(order_id, AssessmentStage::Published),
            Err(err) => {
                error!(order_id, error = %err, "Failed to publish order to analytics service");
                notes.push(PUBLISH_FAILED_REASON.to_string());
            }
        }

        let Pass {
            notional,
            projected,
            evaluation,
            ..
        } = pass;
        let Evaluation {
            verdict,
            score,
            mut reasons,
            ..
        } = evaluation;
        reasons.extend(notes);
        if reasons.is_empty() {
            reasons.push(ALL_CHECKS_PASSED.to_string());
        }

        let processing_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        enter(order_id, AssessmentStage::Assessed);
        info!(
            order_id,
            verdict = verdict.as_str(),
            score = %score,
            time_ms = processing_time_ms,
            "Risk assessment completed"
        );

        RiskAssessment {
            order_id: order.order_id.clone(),
            user_id: order.user_id.clone(),
            verdict,
            risk_score: score,
            reasons,
            notional_amount: notional,
            projected_user_exposure: projected,
            processing_time_ms,
            assessed_at: self.clock.now(),
        }
    }

    /// Stored exposure, or `None` when the store cannot answer
    async fn read_exposure(&self, order_id: &str, user_id: &str) -> Option<Decimal> {
        match self.ledger.try_read(user_id).await {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(order_id, user_id, error = %err, "Exposure read failed");
                None
            }
        }
    }

    fn evaluate(
        &self,
        order: &Order,
        rate: RateOutcome,
        current: Option<Decimal>,
        hour: u32,
    ) -> Pass {
        let notional = order.notional();
        let current_exposure = current.unwrap_or(Decimal::ZERO);
        let projected = exposure::project(current_exposure, order.signed_notional());
        enter(order.order_id.as_str(), AssessmentStage::ExposureEvaluated);

        let input = RuleInput {
            order,
            notional,
            current_exposure,
            projected_exposure: projected,
            rate,
            hour,
        };
        let evaluation = Evaluation::run(&self.rules, &input);
        enter(order.order_id.as_str(), AssessmentStage::RulesApplied);

        Pass {
            current,
            notional,
            projected,
            evaluation,
        }
    }

    async fn publish(&self, order: &Order) -> Result<(), PublishError> {
        let limit = self.config.store_timeout();
        match tokio::time::timeout(limit, self.publisher.publish(order)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(limit).into()),
        }
    }
}
