//! Error types for the risk engine's collaborators
//!
//! None of these escape [`crate::engine::RiskEngine::assess`]; the engine
//! turns each one into a degradation reason on the assessment.

use std::time::Duration;

use thiserror::Error;

/// Failure talking to a per-user state backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Another assessment held the user's record for too long.
    /// The backend itself may be healthy.
    #[error("user record still locked after {0:?}")]
    LockTimeout(Duration),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Failure publishing a processed order downstream
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to serialize order: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("publish failed: {0}")]
    Store(#[from] StoreError),
}

/// Invalid or unreadable engine configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Run a store call with an upper bound on its duration.
pub(crate) async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: std::future::Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let limit = Duration::from_secs(2);
        let result: Result<(), StoreError> = bounded(limit, async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(StoreError::Timeout(limit)));
    }

    #[tokio::test]
    async fn test_bounded_passes_through() {
        let result = bounded(Duration::from_secs(2), async { Ok::<_, StoreError>(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[test]
    fn test_publish_error_from_store() {
        let err: PublishError = StoreError::Unavailable("connection refused".into()).into();
        assert_eq!(err.to_string(), "publish failed: store unavailable: connection refused");
    }
}
