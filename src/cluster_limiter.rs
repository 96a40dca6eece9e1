use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::{DateTime, TimeDelta, Utc};
use tracing::Instrument;

use crate::{
    AdmissionStrategy, CallContext, Clock, CountingStore, FacadeMetrics, MetricsSink, RateKey,
    RedisStore, Settings, SwarmLimitError, SystemClock,
    clock::unix_nanos,
    derive_key,
    instrumentation::{
        Query, allows_counter_name, failure_counter_name, forbids_counter_name, query_timer_name,
        total_counter_name,
    },
    span::{QuerySpan, SpanName},
};

/// Extra lifetime of a key beyond its window, so a key never expires while
/// hits inside the window still count.
const HIT_TTL_MARGIN: Duration = Duration::from_secs(1);

/// Lower bound of [`ClusterLimiter::retry_after`], in seconds.
const MIN_RETRY_AFTER_SECONDS: u64 = 1;

/// Separates the acceptance time of a hit from its random suffix.
const HIT_SEPARATOR: char = ':';

/// Configuration for [`ClusterLimiter`].
///
/// # Examples
///
/// ```ignore
/// use std::time::Duration;
/// use swarmlimit::{
///     AdmissionStrategy, ClusterLimiter, ClusterLimiterOptions, RatelimitType, RedisStore,
///     RedisStoreOptions, Settings,
/// };
///
/// let store = RedisStore::connect(RedisStoreOptions::default()).await?;
///
/// let limiter = ClusterLimiter::new(ClusterLimiterOptions {
///     store,
///     settings: Settings::new(
///         RatelimitType::ClusterClientRatelimit,
///         "login",
///         10,
///         Duration::from_secs(60),
///     )?,
///     strategy: AdmissionStrategy::Sequential,
///     metrics: None,
///     clock: None,
/// });
/// ```
#[derive(Clone, Debug)]
pub struct ClusterLimiterOptions<S> {
    /// Shared store all fleet members talk to.
    ///
    /// The limiter never closes it; whoever created it owns its lifecycle.
    pub store: S,

    /// Window, max hits, group and kind.
    ///
    /// `group` must be identical on every fleet member enforcing the same
    /// limit.
    pub settings: Settings,

    /// Sequential round trips or one atomic command per decision.
    pub strategy: AdmissionStrategy,

    /// Metric sink. If `None`, defaults to [`FacadeMetrics`].
    pub metrics: Option<Arc<dyn MetricsSink>>,

    /// Time source for hit scores. If `None`, defaults to [`SystemClock`].
    pub clock: Option<Arc<dyn Clock>>,
}

/// Sliding-window-log rate limiter whose counts live in a shared store.
///
/// Every accepted request is recorded as one member of an ordered set keyed
/// by the caller's [`RateKey`] and scored by its acceptance time. A decision
/// prunes members older than one window, counts the rest, and records a new
/// member if the count is below `max_hits`. All fleet members use the same
/// store, so they see each other's hits without talking to each other.
///
/// # Semantics & Limitations
///
/// **Approximate counting:**
/// - With [`AdmissionStrategy::Sequential`], prune, count, add and expire are
///   four independent round trips
/// - Fleet members racing between count and add can all be admitted
/// - The fleet-wide count may overshoot `max_hits` by about the number of
///   racers; this is accepted
///
/// **Fail open:**
/// - Any store error, timeout or cancellation admits the request
/// - The failure is logged and recorded on the failure timer and counter
/// - Fail-open decisions also increment `swarm.redis.allows`, so that counter
///   alone cannot tell real admissions from failures
///
/// **No local state:**
/// - The limiter only holds immutable settings and shared handles
/// - Clones are cheap and safe to use from any number of tasks
///
/// # Metrics
///
/// Reported through the configured [`MetricsSink`]:
/// - `swarm.redis.total`, `swarm.redis.allows`, `swarm.redis.forbids`
/// - `swarm.redis.query.{allow,oldest,retryafter}.{success,failure}[.<group>]`
///   timers; every oldest-hit lookup is timed, including those made by
///   `delta` and `retry_after`
/// - `swarm.redis.failures.{allow,oldest,delta,retryafter}[.<group>]` counters
#[derive(Clone, Debug)]
pub struct ClusterLimiter<S: CountingStore = RedisStore> {
    settings: Settings,
    strategy: AdmissionStrategy,
    store: S,
    metrics: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
}

impl<S: CountingStore> ClusterLimiter<S> {
    /// Create a limiter over `options.store`.
    pub fn new(options: ClusterLimiterOptions<S>) -> Self {
        Self {
            settings: options.settings,
            strategy: options.strategy,
            store: options.store,
            metrics: options.metrics.unwrap_or_else(|| Arc::new(FacadeMetrics)),
            clock: options.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        }
    }

    /// Settings this limiter enforces.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Store key used for `identity`.
    pub fn key(&self, identity: &str) -> RateKey {
        derive_key(&self.settings.group, identity)
    }

    /// Decide whether a request from `identity` is allowed, recording it when
    /// it is.
    ///
    /// Never fails: store errors admit the request.
    pub async fn allow(&self, identity: &str) -> bool {
        self.allow_with_context(&CallContext::background(), identity)
            .await
    }

    /// Like [`allow`](Self::allow), bounded by the deadline and cancellation
    /// of `ctx`, and traced under its parent span if it has one.
    pub async fn allow_with_context(&self, ctx: &CallContext, identity: &str) -> bool {
        self.metrics.inc_counter(&total_counter_name());
        let start = Instant::now();
        let span = QuerySpan::start(ctx.parent_span(), SpanName::Allow, &self.settings);

        let result = ctx.run(self.admit(identity)).instrument(span.span()).await;

        let failed = result.is_err();
        span.finish(failed);
        self.measure_query(Query::Allow, failed, start);

        let allow = match result {
            Ok(allow) => allow,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    group = %self.settings.group,
                    "cluster rate limit check failed, allowing request"
                );
                self.metrics
                    .inc_counter(&failure_counter_name(Query::Allow, &self.settings.group));
                true
            }
        };

        if allow {
            self.metrics.inc_counter(&allows_counter_name());
        } else {
            tracing::debug!(group = %self.settings.group, "cluster rate limit exceeded");
            self.metrics.inc_counter(&forbids_counter_name());
        }

        allow
    } // end method allow_with_context

    async fn admit(&self, identity: &str) -> Result<bool, SwarmLimitError> {
        let key = self.key(identity);

        let now = unix_nanos(self.clock.now());
        let window_nanos = i64::try_from(self.settings.window.as_nanos()).unwrap_or(i64::MAX);
        let window_start = now.saturating_sub(window_nanos);
        let member = hit_member(now);
        let ttl = self.settings.window.saturating_add(HIT_TTL_MARGIN);

        match self.strategy {
            AdmissionStrategy::Atomic => {
                self.store
                    .admit_atomic(
                        &key,
                        window_start as f64,
                        now as f64,
                        &member,
                        *self.settings.max_hits,
                        ttl,
                    )
                    .await
            }
            AdmissionStrategy::Sequential => {
                // drop all hits which happened before one window ago
                self.store
                    .remove_range_by_score(&key, 0.0, window_start as f64)
                    .await?;

                let count = self.store.cardinality(&key).await?;
                if count >= *self.settings.max_hits {
                    return Ok(false);
                }

                self.store.add_scored(&key, now as f64, &member).await?;
                self.store.expire(&key, ttl).await?;

                Ok(true)
            }
        }
    } // end method admit

    /// Acceptance time of the oldest hit still recorded for `identity`.
    ///
    /// Read-only. Returns the Unix epoch when there is no hit or the store
    /// failed; treat that value as unknown, not as now.
    pub async fn oldest(&self, identity: &str) -> DateTime<Utc> {
        self.oldest_with_context(&CallContext::background(), identity)
            .await
    }

    /// Like [`oldest`](Self::oldest), bounded and traced by `ctx`.
    pub async fn oldest_with_context(&self, ctx: &CallContext, identity: &str) -> DateTime<Utc> {
        match self.oldest_hit(ctx, identity).await {
            Ok(oldest) => oldest.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            Err(err) => {
                tracing::error!(error = %err, "Failed to get the oldest known request time from the store");
                self.metrics
                    .inc_counter(&failure_counter_name(Query::Oldest, &self.settings.group));
                DateTime::<Utc>::UNIX_EPOCH
            }
        }
    }

    async fn oldest_hit(
        &self,
        ctx: &CallContext,
        identity: &str,
    ) -> Result<Option<DateTime<Utc>>, SwarmLimitError> {
        let key = self.key(identity);
        let now = unix_nanos(self.clock.now());
        let start = Instant::now();
        let span = QuerySpan::start(ctx.parent_span(), SpanName::OldestScore, &self.settings);

        let result = ctx
            .run(async {
                self.store
                    .lowest_in_range(&key, 0.0, now as f64)
                    .await?
                    .map(|member| parse_hit(&member))
                    .transpose()
            })
            .instrument(span.span())
            .await;

        let failed = result.is_err();
        span.finish(failed);
        self.measure_query(Query::Oldest, failed, start);

        result
    }

    async fn delta_from(
        &self,
        ctx: &CallContext,
        identity: &str,
        from: DateTime<Utc>,
    ) -> Result<TimeDelta, SwarmLimitError> {
        let oldest = self
            .oldest_hit(ctx, identity)
            .await?
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        let gap = from.signed_duration_since(oldest);
        let window = self.settings.window.as_time_delta();

        Ok(window.checked_sub(&gap).unwrap_or(if gap < TimeDelta::zero() {
            TimeDelta::MAX
        } else {
            TimeDelta::MIN
        }))
    }

    /// Time until the oldest recorded hit of `identity` leaves the window.
    ///
    /// Zero or negative means a request would be admitted now. Store errors
    /// yield zero.
    pub async fn delta(&self, identity: &str) -> TimeDelta {
        let now = self.clock.now();

        match self
            .delta_from(&CallContext::background(), identity, now)
            .await
        {
            Ok(delta) => delta,
            Err(err) => {
                tracing::error!(error = %err, "Failed to get the duration until the next call is allowed");
                self.metrics
                    .inc_counter(&failure_counter_name(Query::Delta, &self.settings.group));
                TimeDelta::zero()
            }
        }
    }

    /// Whole seconds a rejected caller should wait before retrying; at least
    /// one.
    ///
    /// A positive delta is truncated to seconds and padded by one. Retry hints
    /// and admission checks race against other fleet members, so retrying at
    /// the exact boundary would often be rejected again.
    pub async fn retry_after(&self, identity: &str) -> u64 {
        self.retry_after_with_context(&CallContext::background(), identity)
            .await
    }

    /// Like [`retry_after`](Self::retry_after), bounded and traced by `ctx`.
    pub async fn retry_after_with_context(&self, ctx: &CallContext, identity: &str) -> u64 {
        let start = Instant::now();
        let now = self.clock.now();

        let result = self.delta_from(ctx, identity, now).await;
        self.measure_query(Query::RetryAfter, result.is_err(), start);

        match result {
            Ok(delta) => match u64::try_from(delta.num_seconds()) {
                Ok(seconds) if seconds > 0 => seconds.saturating_add(1),
                _ => MIN_RETRY_AFTER_SECONDS,
            },
            Err(err) => {
                tracing::error!(error = %err, "Failed to get the duration to wait with the next request");
                self.metrics
                    .inc_counter(&failure_counter_name(Query::RetryAfter, &self.settings.group));
                MIN_RETRY_AFTER_SECONDS
            }
        }
    }

    /// No-op: all sizing lives in the shared store.
    pub fn resize(&self, _identity: &str, _n: usize) {}

    /// No-op: the limiter does not own the store and never tears it down.
    pub fn close(&self) {}

    fn measure_query(&self, query: Query, failed: bool, start: Instant) {
        self.metrics
            .measure_since(&query_timer_name(query, failed, &self.settings.group), start);
    }
}

/// Ordered-set member for a hit accepted at `nanos`.
///
/// The random suffix keeps hits accepted at the same instant, on this or any
/// other fleet member, from collapsing into one.
fn hit_member(nanos: i64) -> String {
    format!("{nanos}{HIT_SEPARATOR}{:016x}", rand::random::<u64>())
}

fn parse_hit(member: &str) -> Result<DateTime<Utc>, SwarmLimitError> {
    let timestamp = member
        .split_once(HIT_SEPARATOR)
        .map_or(member, |(nanos, _)| nanos);

    let nanos: i64 = timestamp.parse().map_err(|err| {
        SwarmLimitError::MalformedStoreResponse(format!(
            "hit {member:?} is not a nanosecond timestamp: {err}"
        ))
    })?;

    Ok(DateTime::<Utc>::from_timestamp_nanos(nanos))
}
