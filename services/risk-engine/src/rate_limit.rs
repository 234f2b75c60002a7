//! Per-user token-bucket rate limiting
//!
//! Each user gets a bucket of `capacity` tokens, created full on first use.
//! Every full refill period since the bucket was created adds `capacity`
//! tokens back (capped at capacity). Consumption runs under the bucket's
//! map-shard lock, so decrement-and-check is atomic per user and users on
//! different shards never contend.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use crate::config::RateLimitConfig;
use crate::error::StoreError;

/// Share of the cap freed by one LRU eviction pass (1/100)
const EVICTION_BATCH_DIVISOR: usize = 100;

/// Admission check consulted by the engine once per order
pub trait RateGate: Send + Sync {
    /// Consume one unit of the user's allowance.
    ///
    /// `Ok(false)` means the user is over the limit. `Err` means the
    /// limiter could not decide; the engine applies its failure policy.
    fn admit(&self, user_id: &str) -> Result<bool, StoreError>;
}

#[derive(Debug, Clone)]
struct Bucket {
    tokens: u32,
    last_refill: Instant,
    last_used: Instant,
}

impl Bucket {
    fn new(capacity: u32, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
            last_used: now,
        }
    }

    fn refill(&mut self, capacity: u32, period: Duration, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        if elapsed < period {
            return;
        }

        let periods = elapsed.as_nanos() / period.as_nanos();
        let added = u32::try_from(periods)
            .unwrap_or(u32::MAX)
            .saturating_mul(capacity);
        self.tokens = self.tokens.saturating_add(added).min(capacity);

        // Keep the interval grid anchored at bucket creation
        let remainder = (elapsed.as_nanos() % period.as_nanos()) as u64;
        self.last_refill = now
            .checked_sub(Duration::from_nanos(remainder))
            .unwrap_or(now);
    }

    fn try_consume(&mut self, capacity: u32, period: Duration, now: Instant) -> bool {
        self.refill(capacity, period, now);
        self.last_used = now;

        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false // Rate limited
        }
    }
}

/// In-process per-user rate limiter
pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
    capacity: u32,
    refill_period: Duration,
    max_tracked_users: usize,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            capacity: config.capacity,
            refill_period: config.refill_period(),
            max_tracked_users: config.max_tracked_users,
        }
    }

    /// Take one token from the user's bucket; `false` if it is empty.
    pub fn try_consume(&self, user_id: &str) -> bool {
        self.try_consume_at(user_id, Instant::now())
    }

    /// [`Self::try_consume`] against an explicit instant.
    pub fn try_consume_at(&self, user_id: &str, now: Instant) -> bool {
        if !self.buckets.contains_key(user_id) && self.buckets.len() >= self.max_tracked_users {
            self.evict(now);
        }

        let mut bucket = self
            .buckets
            .entry(user_id.to_string())
            .or_insert_with(|| Bucket::new(self.capacity, now));

        bucket.try_consume(self.capacity, self.refill_period, now)
    }

    /// Tokens the user could spend right now, without consuming any
    pub fn available_tokens_at(&self, user_id: &str, now: Instant) -> u32 {
        match self.buckets.get_mut(user_id) {
            Some(mut bucket) => {
                bucket.refill(self.capacity, self.refill_period, now);
                bucket.tokens
            }
            None => self.capacity,
        }
    }

    /// Number of buckets currently held
    pub fn tracked_users(&self) -> usize {
        self.buckets.len()
    }

    /// Make room for new buckets.
    ///
    /// Buckets idle for a full refill period would be full on their next
    /// use anyway, so dropping them changes no outcome. If the map is still
    /// above the low-water mark, the least recently used buckets go in one
    /// batch, so a full scan happens at most once per batch of new users.
    fn evict(&self, now: Instant) {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_used) < self.refill_period);
        let idle_dropped = before.saturating_sub(self.buckets.len());
        if idle_dropped > 0 {
            debug!(idle_dropped, "Dropped idle rate-limit buckets");
        }

        let batch = (self.max_tracked_users / EVICTION_BATCH_DIVISOR).max(1);
        let low_water = self.max_tracked_users.saturating_sub(batch);
        let excess = self.buckets.len().saturating_sub(low_water);
        if excess == 0 {
            return;
        }

        let mut by_age: Vec<(Instant, String)> = self
            .buckets
            .iter()
            .map(|entry| (entry.value().last_used, entry.key().clone()))
            .collect();
        if excess < by_age.len() {
            by_age.select_nth_unstable_by_key(excess, |(last_used, _)| *last_used);
        }
        for (_, key) in by_age.into_iter().take(excess) {
            self.buckets.remove(&key);
        }
        debug!(evicted = excess, "Evicted least recently used rate-limit buckets");
    }
}

impl RateGate for RateLimiter {
    fn admit(&self, user_id: &str) -> Result<bool, StoreError> {
        Ok(self.try_consume(user_id))
    }
}
