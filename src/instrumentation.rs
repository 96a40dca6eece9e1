//! Metric sinks for the cluster limiter.
//!
//! The limiter reports through [`MetricsSink`] on every call. [`FacadeMetrics`]
//! forwards to the [`metrics`](::metrics) facade, so whatever recorder the process
//! installed receives the values; [`NoopMetrics`] drops everything.

use std::{fmt::Debug, time::Instant};

pub(crate) const METRICS_PREFIX: &str = "swarm.redis.";

/// Receiver of limiter counters and timers.
pub trait MetricsSink: Send + Sync + Debug {
    /// Increment the counter `name` by one.
    fn inc_counter(&self, name: &str);

    /// Record the time elapsed since `start` under `name`.
    fn measure_since(&self, name: &str, start: Instant);
}

/// Sink forwarding to the global [`metrics`](::metrics) recorder.
///
/// Counters map to `metrics::counter!`, timers to `metrics::histogram!` in
/// seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct FacadeMetrics;

impl MetricsSink for FacadeMetrics {
    fn inc_counter(&self, name: &str) {
        ::metrics::counter!(name.to_string()).increment(1);
    }

    fn measure_since(&self, name: &str, start: Instant) {
        ::metrics::histogram!(name.to_string()).record(start.elapsed().as_secs_f64());
    }
}

/// Sink discarding everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn inc_counter(&self, _name: &str) {}

    fn measure_since(&self, _name: &str, _start: Instant) {}
}

/// Query whose duration and failures are measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Query {
    Allow,
    Oldest,
    Delta,
    RetryAfter,
}

impl Query {
    fn as_str(self) -> &'static str {
        match self {
            Query::Allow => "allow",
            Query::Oldest => "oldest",
            Query::Delta => "delta",
            Query::RetryAfter => "retryafter",
        }
    }
}

fn with_group(name: String, group: &str) -> String {
    if group.is_empty() {
        name
    } else {
        format!("{name}.{group}")
    }
}

/// `swarm.redis.query.<query>.<success|failure>[.<group>]`
pub(crate) fn query_timer_name(query: Query, failed: bool, group: &str) -> String {
    let result = if failed { "failure" } else { "success" };
    with_group(
        format!("{METRICS_PREFIX}query.{}.{result}", query.as_str()),
        group,
    )
}

/// `swarm.redis.failures.<query>[.<group>]`
pub(crate) fn failure_counter_name(query: Query, group: &str) -> String {
    with_group(format!("{METRICS_PREFIX}failures.{}", query.as_str()), group)
}

pub(crate) fn total_counter_name() -> String {
    format!("{METRICS_PREFIX}total")
}

pub(crate) fn allows_counter_name() -> String {
    format!("{METRICS_PREFIX}allows")
}

pub(crate) fn forbids_counter_name() -> String {
    format!("{METRICS_PREFIX}forbids")
}
