//! Risk engine configuration
//!
//! Defaults carry the production limits. A JSON document may override any
//! subset of fields; missing fields keep their defaults.

use std::path::Path;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Longest accepted exposure record lifetime (one year)
pub const MAX_EXPOSURE_TTL_SECS: u64 = 366 * 24 * 60 * 60;

/// What the engine does when the rate limiter cannot answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Treat as rate-limited (REJECT)
    FailClosed,
    /// Treat as admitted
    FailOpen,
}

/// Per-user token bucket settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Tokens per bucket, also the number added on each refill
    pub capacity: u32,
    /// Length of one refill interval
    pub refill_period_secs: u64,
    /// Soft cap on the number of buckets kept in memory
    pub max_tracked_users: usize,
    pub failure_policy: FailurePolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            refill_period_secs: 60,
            max_tracked_users: 100_000,
            failure_policy: FailurePolicy::FailClosed,
        }
    }
}

impl RateLimitConfig {
    pub fn refill_period(&self) -> Duration {
        Duration::from_secs(self.refill_period_secs)
    }
}

/// Risk engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskEngineConfig {
    /// Per-order notional cap; above it the order is rejected
    pub max_notional_per_order: Decimal,
    /// Projected exposure above which the order is flagged
    pub max_user_exposure: Decimal,
    /// Symbols with this prefix get the volatility check
    pub volatile_symbol_prefix: String,
    /// Notional above which a volatile-symbol order is flagged
    pub volatile_notional_threshold: Decimal,
    /// First local hour inside market hours
    pub market_open_hour: u32,
    /// First local hour after market hours
    pub market_close_hour: u32,
    /// Exposure record lifetime, renewed on every write
    pub exposure_ttl_secs: u64,
    /// Upper bound on any single store or publish round trip
    pub store_timeout_ms: u64,
    /// Longest wait for another assessment of the same user to release its record
    pub lock_timeout_ms: u64,
    pub rate_limit: RateLimitConfig,
}

impl Default for RiskEngineConfig {
    fn default() -> Self {
        Self {
            max_notional_per_order: Decimal::from(10_000),
            max_user_exposure: Decimal::from(50_000),
            volatile_symbol_prefix: "BTC".to_string(),
            volatile_notional_threshold: Decimal::from(5_000),
            market_open_hour: 9,
            market_close_hour: 16,
            exposure_ttl_secs: 24 * 60 * 60,
            store_timeout_ms: 2_000,
            lock_timeout_ms: 10_000,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl RiskEngineConfig {
    /// Parse and validate a JSON config document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_notional_per_order <= Decimal::ZERO {
            return Err(ConfigError::Invalid(
                "max_notional_per_order must be positive".into(),
            ));
        }
        if self.max_user_exposure <= Decimal::ZERO {
            return Err(ConfigError::Invalid("max_user_exposure must be positive".into()));
        }
        if self.market_open_hour >= self.market_close_hour || self.market_close_hour > 24 {
            return Err(ConfigError::Invalid(format!(
                "market hours [{}, {}) are not a valid window",
                self.market_open_hour, self.market_close_hour
            )));
        }
        if self.exposure_ttl_secs == 0 || self.exposure_ttl_secs > MAX_EXPOSURE_TTL_SECS {
            return Err(ConfigError::Invalid(format!(
                "exposure_ttl_secs must be between 1 and {}",
                MAX_EXPOSURE_TTL_SECS
            )));
        }
        if self.store_timeout_ms == 0 || self.lock_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "store_timeout_ms and lock_timeout_ms must be non-zero".into(),
            ));
        }
        if self.rate_limit.capacity == 0 || self.rate_limit.refill_period_secs == 0 {
            return Err(ConfigError::Invalid(
                "rate limit capacity and refill period must be non-zero".into(),
            ));
        }
        if self.rate_limit.max_tracked_users == 0 {
            return Err(ConfigError::Invalid("max_tracked_users must be non-zero".into()));
        }
        Ok(())
    }

    pub fn exposure_ttl(&self) -> Duration {
        Duration::from_secs(self.exposure_ttl_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
