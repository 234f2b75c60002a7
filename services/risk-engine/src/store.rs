//! Key/value backends for exposure records
//!
//! Values are decimal strings with a per-key time-to-live. The ledger owns
//! key naming, parsing and atomicity; a store only moves strings.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::MultiplexedConnection;
use tokio::time::Instant;

use crate::error::StoreError;

/// Storage for string values with expiry
#[async_trait]
pub trait ExposureStore: Send + Sync {
    /// Fetch a live value; expired or missing keys yield `None`
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Overwrite a value and reset its time-to-live
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    /// `None` when the deadline is past what `Instant` can represent
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| deadline > now)
    }
}

/// Process-local store
///
/// Expiry follows the tokio clock, so paused-time tests can step past TTLs.
#[derive(Debug, Default)]
pub struct MemoryExposureStore {
    entries: DashMap<String, StoredValue>,
}

impl MemoryExposureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining lifetime of a live key
    pub fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| match entry.expires_at {
                Some(deadline) => deadline - now,
                None => Duration::MAX,
            })
    }

    /// Number of stored keys, including any not yet purged after expiry
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ExposureStore for MemoryExposureStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        self.entries.insert(
            key.to_string(),
            StoredValue {
                value,
                expires_at: Instant::now().checked_add(ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Redis-backed store
///
/// Uses `GET`, `SET key value EX ttl` and `DEL` over a shared multiplexed
/// connection.
#[derive(Clone)]
pub struct RedisExposureStore {
    conn: MultiplexedConnection,
}

impl RedisExposureStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        Ok(Self { conn })
    }

    pub fn from_connection(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

/// Redis `EX` takes whole seconds and rejects zero
pub(crate) fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl ExposureStore for RedisExposureStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_seconds(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }
}
