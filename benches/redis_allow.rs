use std::{env, hint::black_box, sync::Arc, time::Duration};

use criterion::{Criterion, criterion_group, criterion_main};

use swarmlimit::{
    AdmissionStrategy, ClusterLimiter, ClusterLimiterOptions, NoopMetrics, RatelimitType,
    RedisStore, RedisStoreOptions, Settings,
};

fn redis_url() -> String {
    env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/".to_string())
}

fn bench_allow(c: &mut Criterion) {
    let mut group = c.benchmark_group("redis_allow");
    group.sample_size(50);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .build()
        .unwrap();

    let store = rt.block_on(async {
        RedisStore::connect(RedisStoreOptions {
            urls: vec![redis_url()],
            command_timeout: Duration::from_secs(1),
            ..Default::default()
        })
        .await
        .unwrap()
    });

    for strategy in [AdmissionStrategy::Sequential, AdmissionStrategy::Atomic] {
        let limiter = ClusterLimiter::new(ClusterLimiterOptions {
            store: store.clone(),
            settings: Settings::new(
                RatelimitType::ClusterClientRatelimit,
                format!("bench_{strategy:?}"),
                1_000,
                Duration::from_secs(1),
            )
            .unwrap(),
            strategy,
            metrics: Some(Arc::new(NoopMetrics)),
            clock: None,
        });

        // warm the connection
        rt.block_on(limiter.allow("user_1"));

        group.bench_function(format!("allow/{strategy:?}/hot_key"), |b| {
            b.iter(|| black_box(rt.block_on(limiter.allow(black_box("user_1")))));
        });

        group.bench_function(format!("retry_after/{strategy:?}/hot_key"), |b| {
            b.iter(|| black_box(rt.block_on(limiter.retry_after(black_box("user_1")))));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_allow);
criterion_main!(benches);
