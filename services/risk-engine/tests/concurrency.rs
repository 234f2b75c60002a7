//! Concurrency tests
//!
//! Many orders assessed at once, for one user and across users. Per-user
//! state must stay exact: no extra tokens handed out, no lost exposure
//! updates, no interference between users.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use risk_engine::clock::FixedClock;
use risk_engine::events::InMemoryPublisher;
use risk_engine::exposure::ExposureLedger;
use risk_engine::store::{ExposureStore, MemoryExposureStore};
use risk_engine::{RiskEngine, RiskEngineConfig, StoreError};
use rust_decimal::Decimal;
use types::numeric::{Price, Quantity};
use types::order::{Order, OrderType, Side};
use types::risk::Verdict;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Memory store answering after a fixed network-like delay
struct LaggingStore {
    inner: MemoryExposureStore,
    lag: Duration,
}

#[async_trait]
impl ExposureStore for LaggingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        tokio::time::sleep(self.lag).await;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        tokio::time::sleep(self.lag).await;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }
}

fn engine(config: RiskEngineConfig) -> (Arc<RiskEngine>, Arc<InMemoryPublisher>) {
    engine_with_store(config, Arc::new(MemoryExposureStore::new()))
}

fn engine_with_store(
    config: RiskEngineConfig,
    store: Arc<dyn ExposureStore>,
) -> (Arc<RiskEngine>, Arc<InMemoryPublisher>) {
    let publisher = Arc::new(InMemoryPublisher::new());
    let ledger = Arc::new(ExposureLedger::from_config(store, &config));
    let engine = RiskEngine::new(config, ledger, publisher.clone())
        .with_clock(Arc::new(FixedClock::at_hour(10)));
    (Arc::new(engine), publisher)
}

fn order(id: usize, user: &str, side: Side, price: u64) -> Order {
    Order::new(
        format!("order-{}", id).as_str(),
        user,
        "ETH-USD",
        side,
        Quantity::from_u64(1),
        Price::from_u64(price),
        OrderType::MARKET,
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_same_user_burst_admits_exactly_capacity() {
    init_tracing();
    let (engine, publisher) = engine(RiskEngineConfig::default());

    let tasks: Vec<_> = (0..50)
        .map(|i| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.assess(&order(i, "user1", Side::BUY, 100)).await })
        })
        .collect();

    let mut admitted = 0;
    let mut limited = 0;
    for task in tasks {
        let result = task.await.unwrap();
        match result.verdict {
            Verdict::ACCEPT => admitted += 1,
            Verdict::REJECT => {
                assert!(result.has_reason("Rate limit exceeded"));
                limited += 1;
            }
            Verdict::WARN => panic!("unexpected warning: {:?}", result.reasons),
        }
    }

    assert_eq!(admitted, 10);
    assert_eq!(limited, 40);
    assert_eq!(publisher.len(), 50);
    // Only admitted orders count toward exposure
    assert_eq!(engine.ledger().read("user1").await, Decimal::from(1_000));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_same_user_exposure_has_no_lost_updates() {
    init_tracing();
    let mut config = RiskEngineConfig::default();
    config.rate_limit.capacity = 1_000;
    config.max_user_exposure = Decimal::from(10_000_000);
    let (engine, _) = engine(config);

    let tasks: Vec<_> = (0..200)
        .map(|i| {
            let engine = Arc::clone(&engine);
            let side = if i % 4 == 0 { Side::SELL } else { Side::BUY };
            tokio::spawn(async move { engine.assess(&order(i, "user1", side, 1_000)).await })
        })
        .collect();

    for task in tasks {
        assert!(task.await.unwrap().verdict.is_admitted());
    }

    // 150 buys, 50 sells of 1000 each
    assert_eq!(engine.ledger().read("user1").await, Decimal::from(100_000));
    assert_eq!(engine.ledger().locked_users(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_projection_matches_recorded_exposure() {
    let mut config = RiskEngineConfig::default();
    config.rate_limit.capacity = 100;
    let (engine, _) = engine(config);

    let tasks: Vec<_> = (0..60)
        .map(|i| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.assess(&order(i, "user1", Side::BUY, 1_000)).await })
        })
        .collect();

    let mut projections = Vec::new();
    for task in tasks {
        projections.push(task.await.unwrap().projected_user_exposure);
    }
    projections.sort();

    // Serialized per user: each order saw the previous one's write
    let expected: Vec<Decimal> = (1..=60).map(|n| Decimal::from(n * 1_000)).collect();
    assert_eq!(projections, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_lagging_store_records_every_admitted_order() {
    init_tracing();
    let store = Arc::new(LaggingStore {
        inner: MemoryExposureStore::new(),
        lag: Duration::from_millis(5),
    });
    let (engine, _) = engine_with_store(RiskEngineConfig::default(), store);

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.assess(&order(i, "user1", Side::BUY, 1_000)).await })
        })
        .collect();

    let mut admitted = 0;
    for task in tasks {
        let result = task.await.unwrap();
        if result.verdict.is_admitted() {
            admitted += 1;
        }
    }

    // 10 tokens per minute; every admitted order is on the ledger
    assert_eq!(admitted, 10);
    assert_eq!(
        engine.ledger().read("user1").await,
        Decimal::from(admitted * 1_000)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_users_are_independent_under_load() {
    init_tracing();
    let (engine, publisher) = engine(RiskEngineConfig::default());
    let users: Vec<String> = (0..20).map(|u| format!("user-{}", u)).collect();

    let mut tasks = Vec::new();
    for (u, user) in users.iter().enumerate() {
        for n in 0..10 {
            let engine = Arc::clone(&engine);
            let user = user.clone();
            tasks.push(tokio::spawn(async move {
                engine
                    .assess(&order(u * 100 + n, &user, Side::BUY, 500))
                    .await
            }));
        }
    }

    for task in tasks {
        assert_eq!(task.await.unwrap().verdict, Verdict::ACCEPT);
    }
    assert_eq!(publisher.len(), 200);

    for user in &users {
        assert_eq!(engine.ledger().read(user).await, Decimal::from(5_000));
    }
}

#[test]
fn test_rate_limiter_threads_across_users() {
    use risk_engine::rate_limit::RateLimiter;
    use risk_engine::RateLimitConfig;
    use std::thread;

    let limiter = Arc::new(RateLimiter::new(&RateLimitConfig::default()));
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let limiter = Arc::clone(&limiter);
            thread::spawn(move || {
                // Two threads per user racing on the same bucket
                let user = format!("user-{}", t % 2);
                (0..20).filter(|_| limiter.try_consume(&user)).count()
            })
        })
        .collect();

    let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(admitted, 20, "10 tokens per user, 2 users");
    assert_eq!(limiter.tracked_users(), 2);
}
