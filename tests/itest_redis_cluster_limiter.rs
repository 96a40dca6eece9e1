use std::{env, sync::Arc, time::Duration};

use swarmlimit::{
    AdmissionStrategy, CallContext, ClusterLimiter, ClusterLimiterOptions, Limiter, NoopMetrics,
    RatelimitType, RedisStore, RedisStoreOptions, Settings,
};

fn redis_url() -> Option<String> {
    let url = env::var("REDIS_URL").ok();
    if url.is_none() {
        eprintln!("skipping: REDIS_URL not set");
    }
    url
}

fn unique_group() -> String {
    let n: u64 = rand::random();
    format!("itest_{n}")
}

async fn connect(url: &str) -> RedisStore {
    RedisStore::connect(RedisStoreOptions {
        urls: vec![url.to_string()],
        command_timeout: Duration::from_secs(1),
        ..Default::default()
    })
    .await
    .unwrap()
}

fn limiter(
    store: RedisStore,
    group: &str,
    max_hits: u64,
    window: Duration,
    strategy: AdmissionStrategy,
) -> ClusterLimiter<RedisStore> {
    ClusterLimiter::new(ClusterLimiterOptions {
        store,
        settings: Settings::new(RatelimitType::ClusterClientRatelimit, group, max_hits, window)
            .unwrap(),
        strategy,
        metrics: Some(Arc::new(NoopMetrics)),
        clock: None,
    })
}

#[tokio::test]
async fn fleet_members_share_one_limit() {
    let Some(url) = redis_url() else { return };

    for strategy in [AdmissionStrategy::Sequential, AdmissionStrategy::Atomic] {
        let group = unique_group();
        let window = Duration::from_secs(10);

        // two proxies, two independent connections, one store
        let first = limiter(connect(&url).await, &group, 3, window, strategy);
        let second = limiter(connect(&url).await, &group, 3, window, strategy);

        assert!(first.allow("203.0.113.7").await);
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(second.allow("203.0.113.7").await);
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(first.allow("203.0.113.7").await);
        tokio::time::sleep(Duration::from_millis(2)).await;

        assert!(!second.allow("203.0.113.7").await, "{strategy:?}");
        assert!(!first.allow("203.0.113.7").await, "{strategy:?}");

        assert!(first.allow("198.51.100.1").await);
    }
}

#[tokio::test]
async fn window_rolls_over() {
    let Some(url) = redis_url() else { return };

    let limiter = limiter(
        connect(&url).await,
        &unique_group(),
        2,
        Duration::from_millis(500),
        AdmissionStrategy::Sequential,
    );

    assert!(limiter.allow("a").await);
    tokio::time::sleep(Duration::from_millis(2)).await;
    assert!(limiter.allow("a").await);
    assert!(!limiter.allow("a").await);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(limiter.allow("a").await);
}

#[tokio::test]
async fn timing_queries_reflect_recorded_hits() {
    let Some(url) = redis_url() else { return };

    let limiter = limiter(
        connect(&url).await,
        &unique_group(),
        1,
        Duration::from_secs(10),
        AdmissionStrategy::Sequential,
    );

    assert_eq!(limiter.retry_after("a").await, 1);
    assert!(limiter.delta("a").await < chrono::TimeDelta::zero());

    let before = chrono::Utc::now();
    assert!(limiter.allow("a").await);
    let after = chrono::Utc::now();

    let oldest = limiter.oldest("a").await;
    assert!(oldest >= before - chrono::TimeDelta::milliseconds(1));
    assert!(oldest <= after);

    let delta = limiter.delta("a").await;
    assert!(delta > chrono::TimeDelta::seconds(9));
    assert!(delta <= chrono::TimeDelta::seconds(10));

    // 9.x seconds left: truncated and padded
    assert_eq!(limiter.retry_after("a").await, 10);
}

#[tokio::test]
async fn expired_deadline_fails_open() {
    let Some(url) = redis_url() else { return };

    let store = connect(&url).await;
    let limiter = limiter(
        store,
        &unique_group(),
        1,
        Duration::from_secs(10),
        AdmissionStrategy::Sequential,
    );

    let ctx = CallContext::background().with_timeout(Duration::ZERO);

    for _ in 0..3 {
        assert!(Limiter::allow_with_context(&limiter, &ctx, "a").await);
    }
    assert_eq!(limiter.retry_after_with_context(&ctx, "a").await, 1);
}
