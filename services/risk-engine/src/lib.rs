//! Risk Engine Service
//!
//! Real-time pre-trade risk gating. For each order the engine returns a
//! verdict (accept / warn / reject), a cumulative risk score and the
//! reasons behind it.
//!
//! Provides per-user rate limiting, per-user exposure accounting,
//! ordered rule evaluation and best-effort publication of processed
//! orders.

pub mod clock;
pub mod config;
pub mod error;
pub mod rate_limit;
pub mod store;
pub mod exposure;
pub mod rules;
pub mod events;
pub mod engine;

pub use config::{FailurePolicy, RateLimitConfig, RiskEngineConfig};
pub use engine::RiskEngine;
pub use error::{ConfigError, PublishError, StoreError};
