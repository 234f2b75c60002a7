//! Per-user exposure ledger
//!
//! Net exposure per user, stored as a decimal string under
//! `user:exposure:{userId}` with a sliding 24h lifetime. An absent key
//! reads as zero, and so does a value that fails to parse.
//!
//! Read-modify-write is atomic per user within the process: a user's
//! updates serialize on a per-user async lock, held by [`UserLock`].
//! Users never share a lock.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::config::RiskEngineConfig;
use crate::error::{bounded, StoreError};
use crate::store::ExposureStore;

pub const EXPOSURE_KEY_PREFIX: &str = "user:exposure:";

/// Lock waits default to this many store timeouts: one holder makes at
/// most a read and a write, each bounded by the store timeout.
const LOCK_WAIT_STORE_TIMEOUTS: u32 = 5;

/// Store key for a user's exposure record
pub fn exposure_key(user_id: &str) -> String {
    format!("{}{}", EXPOSURE_KEY_PREFIX, user_id)
}

/// Exposure after applying a signed delta
///
/// `projected = current + delta`, saturating at `Decimal::MAX` / `Decimal::MIN`
pub fn project(current: Decimal, delta: Decimal) -> Decimal {
    current.checked_add(delta).unwrap_or(if delta.is_sign_negative() {
        Decimal::MIN
    } else {
        Decimal::MAX
    })
}

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// Exclusive hold on one user's exposure record.
///
/// Dropping it releases the user; the lock entry is discarded once
/// nobody holds or waits on it.
pub struct UserLock {
    guard: Option<OwnedMutexGuard<()>>,
    user_id: String,
    locks: Arc<LockMap>,
}

impl UserLock {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl Drop for UserLock {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.user_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Exposure accounting over an [`ExposureStore`]
pub struct ExposureLedger {
    store: Arc<dyn ExposureStore>,
    locks: Arc<LockMap>,
    ttl: Duration,
    timeout: Duration,
    lock_timeout: Duration,
}

impl ExposureLedger {
    pub fn new(store: Arc<dyn ExposureStore>, ttl: Duration, timeout: Duration) -> Self {
        Self {
            store,
            locks: Arc::new(DashMap::new()),
            ttl,
            timeout,
            lock_timeout: timeout.saturating_mul(LOCK_WAIT_STORE_TIMEOUTS),
        }
    }

    /// Ledger with the TTL and timeouts from `config`
    pub fn from_config(store: Arc<dyn ExposureStore>, config: &RiskEngineConfig) -> Self {
        Self::new(store, config.exposure_ttl(), config.store_timeout())
            .with_lock_timeout(config.lock_timeout())
    }

    /// Longest wait for another holder of a user's lock
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Current exposure; zero when absent, corrupt, or the store is unreachable.
    pub async fn read(&self, user_id: &str) -> Decimal {
        match self.try_read(user_id).await {
            Ok(value) => value,
            Err(err) => {
                warn!(user_id, error = %err, "Exposure store unavailable, reading zero");
                Decimal::ZERO
            }
        }
    }

    /// Current exposure, surfacing store failures.
    ///
    /// Absent and unparseable values still read as zero.
    pub async fn try_read(&self, user_id: &str) -> Result<Decimal, StoreError> {
        let key = exposure_key(user_id);
        let raw = bounded(self.timeout, self.store.get(&key)).await?;

        let Some(raw) = raw else {
            return Ok(Decimal::ZERO);
        };

        match Decimal::from_str(raw.trim()) {
            Ok(value) => Ok(value),
            Err(_) => {
                warn!(user_id, value = %raw, "Invalid exposure value, treating as zero");
                Ok(Decimal::ZERO)
            }
        }
    }

    /// Overwrite the user's exposure and renew its lifetime.
    ///
    /// Does not take the user lock; callers updating relative to a prior
    /// read should hold a [`UserLock`] across both.
    pub async fn write(&self, user_id: &str, value: Decimal) -> Result<(), StoreError> {
        let key = exposure_key(user_id);
        bounded(self.timeout, self.store.set(&key, value.to_string(), self.ttl)).await?;
        debug!(user_id, exposure = %value, "Updated exposure");
        Ok(())
    }

    /// Atomically add `amount`, returning the new exposure
    pub async fn increment(&self, user_id: &str, amount: Decimal) -> Result<Decimal, StoreError> {
        self.apply_delta(user_id, amount).await
    }

    /// Atomically subtract `amount`, returning the new exposure
    pub async fn decrement(&self, user_id: &str, amount: Decimal) -> Result<Decimal, StoreError> {
        self.apply_delta(user_id, -amount).await
    }

    /// Delete the record; later reads return zero
    pub async fn reset(&self, user_id: &str) -> Result<(), StoreError> {
        let _lock = self.lock_user(user_id).await?;
        let key = exposure_key(user_id);
        bounded(self.timeout, self.store.delete(&key)).await?;
        info!(user_id, "Reset exposure");
        Ok(())
    }

    /// Acquire exclusive access to a user's record.
    ///
    /// Waits at most the lock timeout, then fails with
    /// [`StoreError::LockTimeout`]; the store is not consulted.
    pub async fn lock_user(&self, user_id: &str) -> Result<UserLock, StoreError> {
        let lock = self
            .locks
            .entry(user_id.to_string())
            .or_default()
            .clone();

        let guard = tokio::time::timeout(self.lock_timeout, lock.lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout(self.lock_timeout))?;

        Ok(UserLock {
            guard: Some(guard),
            user_id: user_id.to_string(),
            locks: Arc::clone(&self.locks),
        })
    }

    /// Number of users with a live lock entry
    pub fn locked_users(&self) -> usize {
        self.locks.len()
    }

    async fn apply_delta(&self, user_id: &str, delta: Decimal) -> Result<Decimal, StoreError> {
        let _lock = self.lock_user(user_id).await?;
        let current = self.try_read(user_id).await?;
        let updated = project(current, delta);
        self.write(user_id, updated).await?;
        Ok(updated)
    }
}
