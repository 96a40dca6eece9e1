use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use clap::{Parser, ValueEnum};
use hdrhistogram::Histogram;
use tracing_subscriber::EnvFilter;

use swarmlimit::{
    AdmissionStrategy, CallContext, ClusterLimiter, ClusterLimiterOptions, CountingStore,
    MemoryStore, MetricsSink, RatelimitType, RedisStore, RedisStoreOptions, Settings,
};

mod overshoot;
use overshoot::OvershootTracker;

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum Provider {
    /// One in-process store shared by all simulated members.
    Memory,
    /// One Redis connection set per simulated member.
    Redis,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum Strategy {
    Sequential,
    Atomic,
}

impl From<Strategy> for AdmissionStrategy {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Sequential => AdmissionStrategy::Sequential,
            Strategy::Atomic => AdmissionStrategy::Atomic,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KeyDist {
    Hot,
    Uniform,
    Skewed,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "swarmlimit-stress",
    about = "Load test harness simulating a proxy fleet sharing one cluster limit"
)]
struct Args {
    #[arg(long, value_enum, default_value_t = Provider::Memory)]
    provider: Provider,

    #[arg(long, value_enum, default_value_t = Strategy::Sequential)]
    strategy: Strategy,

    #[arg(long, value_enum, default_value_t = KeyDist::Hot)]
    key_dist: KeyDist,

    /// Simulated fleet members, each with its own limiter.
    #[arg(long, default_value_t = 4)]
    members: usize,

    /// Concurrent request tasks per member.
    #[arg(long, default_value_t = 8)]
    tasks: usize,

    #[arg(long, default_value_t = 10)]
    duration_s: u64,

    #[arg(long, default_value_t = 1_000)]
    window_ms: u64,

    #[arg(long, default_value_t = 100)]
    max_hits: u64,

    #[arg(long, default_value = "stress")]
    group: String,

    #[arg(long, default_value_t = 10_000)]
    key_space: usize,

    #[arg(long, default_value_t = 0.8)]
    hot_fraction: f64,

    #[arg(long, default_value_t = 10)]
    sample_every: u64,

    /// Per-task request rate; unbounded when unset.
    #[arg(long)]
    target_qps: Option<u64>,

    /// Per-call deadline handed to the limiter.
    #[arg(long)]
    deadline_ms: Option<u64>,

    /// Redis shard URL; repeat for a sharded store.
    #[arg(long, default_value = "redis://127.0.0.1:6379/")]
    redis_url: Vec<String>,

    #[arg(long, default_value_t = 25)]
    command_timeout_ms: u64,
}

#[derive(Default)]
struct Counts {
    allowed: AtomicU64,
    rejected: AtomicU64,
    max_in_window: AtomicU64,
}

/// Counts fail-open decisions by watching the limiter's failure counters.
#[derive(Debug, Default)]
struct FailureCounter {
    failures: AtomicU64,
}

impl MetricsSink for FailureCounter {
    fn inc_counter(&self, name: &str) {
        if name.starts_with("swarm.redis.failures.") {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn measure_since(&self, _name: &str, _start: Instant) {}
}

fn build_keys(args: &Args) -> Vec<String> {
    let n = match args.key_dist {
        KeyDist::Hot => 1,
        _ => args.key_space.max(1),
    };
    (0..n).map(|i| format!("10.{}.{}.{}", (i >> 16) & 0xff, (i >> 8) & 0xff, i & 0xff)).collect()
}

fn should_sample(iter: u64, sample_every: u64) -> bool {
    if sample_every <= 1 {
        return true;
    }

    iter.is_multiple_of(sample_every)
}

fn pick_key(args: &Args, key_count: usize, rng: &mut impl FnMut() -> u64) -> usize {
    match args.key_dist {
        KeyDist::Hot => 0,
        KeyDist::Uniform => (rng() as usize) % key_count,
        KeyDist::Skewed => {
            let r = (rng() % 10_000) as f64 / 10_000.0;
            if r < args.hot_fraction {
                0
            } else {
                let tail = key_count.saturating_sub(1).max(1);
                (1 + (rng() as usize) % tail) % key_count
            }
        }
    }
}

fn settings(args: &Args) -> Settings {
    match Settings::new(
        RatelimitType::ClusterClientRatelimit,
        args.group.as_str(),
        args.max_hits,
        Duration::from_millis(args.window_ms),
    ) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("invalid limiter settings: {err}");
            std::process::exit(2);
        }
    }
}

fn limiter<S: CountingStore>(
    store: S,
    args: &Args,
    failures: &Arc<FailureCounter>,
) -> ClusterLimiter<S> {
    ClusterLimiter::new(ClusterLimiterOptions {
        store,
        settings: settings(args),
        strategy: args.strategy.into(),
        metrics: Some(failures.clone()),
        clock: None,
    })
}

async fn redis_store(args: &Args) -> RedisStore {
    let options = RedisStoreOptions {
        urls: args.redis_url.clone(),
        command_timeout: Duration::from_millis(args.command_timeout_ms),
        ..Default::default()
    };

    match RedisStore::connect(options).await {
        Ok(store) => store,
        Err(err) => {
            eprintln!("cannot connect to redis: {err}");
            std::process::exit(2);
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_member<S: CountingStore>(
    member: usize,
    task: usize,
    limiter: ClusterLimiter<S>,
    args: Args,
    keys: Arc<Vec<String>>,
    counts: Arc<Counts>,
    tracker: Arc<OvershootTracker>,
    stop: Arc<AtomicBool>,
) -> Histogram<u64> {
    let mut hist = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).unwrap();
    let mut i = 0_u64;
    let mut seed = ((member * 1_000 + task) as u64 + 1) * 0x9E37_79B9_7F4A_7C15;
    let mut next_deadline = Instant::now();

    let mut rng_u64 = || {
        // xorshift64*
        seed ^= seed >> 12;
        seed ^= seed << 25;
        seed ^= seed >> 27;
        seed = seed.wrapping_mul(0x2545_F491_4F6C_DD1D);
        seed
    };

    while !stop.load(Ordering::Relaxed) {
        if let Some(qps) = args.target_qps {
            let per_op_ns = 1_000_000_000u64 / qps.max(1);
            let now = Instant::now();
            if now < next_deadline {
                tokio::time::sleep(next_deadline - now).await;
            }
            next_deadline += Duration::from_nanos(per_op_ns);
        }

        i = i.wrapping_add(1);
        let idx = pick_key(&args, keys.len(), &mut rng_u64);
        let sample = should_sample(i, args.sample_every);
        let t0 = Instant::now();

        let ctx = match args.deadline_ms {
            Some(ms) => CallContext::background().with_timeout(Duration::from_millis(ms)),
            None => CallContext::background(),
        };
        let allowed = limiter.allow_with_context(&ctx, &keys[idx]).await;

        if sample {
            let us = t0.elapsed().as_micros() as u64;
            let _ = hist.record(us.max(1));
        }

        if allowed {
            counts.allowed.fetch_add(1, Ordering::Relaxed);
            let in_window = tracker.record(idx, Instant::now()) as u64;
            counts.max_in_window.fetch_max(in_window, Ordering::Relaxed);
        } else {
            counts.rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    hist
}

fn print_results(
    args: &Args,
    elapsed: Duration,
    hist: &Histogram<u64>,
    counts: &Counts,
    failures: u64,
) {
    let allowed = counts.allowed.load(Ordering::Relaxed);
    let rejected = counts.rejected.load(Ordering::Relaxed);
    let ops = allowed + rejected;
    let max_in_window = counts.max_in_window.load(Ordering::Relaxed);

    println!(
        "provider={:?} strategy={:?} key_dist={:?}",
        args.provider, args.strategy, args.key_dist
    );
    println!(
        "members={} tasks={} duration_s={} window_ms={} max_hits={} key_space={}",
        args.members, args.tasks, args.duration_s, args.window_ms, args.max_hits, args.key_space
    );
    println!(
        "elapsed_s={:.3} ops={} ops_per_s={:.0}",
        elapsed.as_secs_f64(),
        ops,
        ops as f64 / elapsed.as_secs_f64()
    );
    println!("allowed={allowed} rejected={rejected} fail_open={failures}");
    println!(
        "max_admitted_in_window={max_in_window} overshoot={}",
        max_in_window.saturating_sub(args.max_hits)
    );

    if !hist.is_empty() {
        println!(
            "lat_us p50={} p95={} p99={} p999={} max={}",
            hist.value_at_quantile(0.50),
            hist.value_at_quantile(0.95),
            hist.value_at_quantile(0.99),
            hist.value_at_quantile(0.999),
            hist.max()
        );
        println!("sample_every={} samples={}", args.sample_every, hist.len());
    } else {
        println!("no latency samples collected");
    }
}

async fn run(args: Args) {
    let keys = Arc::new(build_keys(&args));
    let counts = Arc::new(Counts::default());
    let failures = Arc::new(FailureCounter::default());
    let tracker = Arc::new(OvershootTracker::new(Duration::from_millis(args.window_ms)));
    let stop = Arc::new(AtomicBool::new(false));

    let shared_memory = MemoryStore::new();
    let members = args.members.max(1);
    let mut join = Vec::with_capacity(members * args.tasks);

    for member in 0..members {
        // every member gets its own connections, as separate proxies would
        let redis = match args.provider {
            Provider::Redis => Some(redis_store(&args).await),
            Provider::Memory => None,
        };
        tracing::info!(member, provider = ?args.provider, "starting fleet member");

        for task in 0..args.tasks {
            let args = args.clone();
            let keys = Arc::clone(&keys);
            let counts = Arc::clone(&counts);
            let tracker = Arc::clone(&tracker);
            let stop = Arc::clone(&stop);

            match &redis {
                Some(store) => {
                    let limiter = limiter(store.clone(), &args, &failures);
                    join.push(tokio::spawn(run_member(
                        member, task, limiter, args, keys, counts, tracker, stop,
                    )));
                }
                None => {
                    let limiter = limiter(shared_memory.clone(), &args, &failures);
                    join.push(tokio::spawn(run_member(
                        member, task, limiter, args, keys, counts, tracker, stop,
                    )));
                }
            }
        }
    }

    let started = Instant::now();
    tokio::time::sleep(Duration::from_secs(args.duration_s)).await;
    stop.store(true, Ordering::Relaxed);

    let mut merged = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).unwrap();
    for j in join {
        let hist = j.await.unwrap();
        merged.add(&hist).unwrap();
    }

    print_results(
        &args,
        started.elapsed(),
        &merged,
        &counts,
        failures.failures.load(Ordering::Relaxed),
    );
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads((args.members * args.tasks).clamp(2, 16))
        .build()
        .unwrap();

    rt.block_on(run(args));
}
