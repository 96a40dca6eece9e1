use std::sync::Arc;

use dashmap::DashMap;

use crate::{
    AdmissionStrategy, Clock, ClusterLimiter, ClusterLimiterOptions, CountingStore, FacadeMetrics,
    MetricsSink, RedisStore, Settings, SystemClock,
};

/// Configuration for [`Registry`].
#[derive(Clone, Debug)]
pub struct RegistryOptions<S> {
    /// Store shared by every limiter of the registry.
    pub store: S,
    /// Admission strategy of every limiter.
    pub strategy: AdmissionStrategy,
    /// Metric sink. If `None`, defaults to [`FacadeMetrics`].
    pub metrics: Option<Arc<dyn MetricsSink>>,
    /// Time source. If `None`, defaults to [`SystemClock`].
    pub clock: Option<Arc<dyn Clock>>,
}

/// Hands out one [`ClusterLimiter`] per distinct [`Settings`], all over the
/// same store.
///
/// Routes configured with equal settings share a limiter. Routes differing in
/// any field, including only the group, get separate limiters whose keys
/// never collide.
#[derive(Debug)]
pub struct Registry<S: CountingStore = RedisStore> {
    store: S,
    strategy: AdmissionStrategy,
    metrics: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
    limiters: DashMap<Settings, ClusterLimiter<S>>,
}

impl<S: CountingStore> Registry<S> {
    /// Create an empty registry.
    pub fn new(options: RegistryOptions<S>) -> Self {
        Self {
            store: options.store,
            strategy: options.strategy,
            metrics: options.metrics.unwrap_or_else(|| Arc::new(FacadeMetrics)),
            clock: options.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            limiters: DashMap::new(),
        }
    }

    /// Limiter for `settings`, created on first use.
    pub fn get(&self, settings: &Settings) -> ClusterLimiter<S> {
        if let Some(limiter) = self.limiters.get(settings) {
            return limiter.clone();
        }

        self.limiters
            .entry(settings.clone())
            .or_insert_with(|| {
                tracing::debug!(
                    group = %settings.group,
                    max_hits = *settings.max_hits,
                    window = ?*settings.window,
                    "creating cluster limiter"
                );

                ClusterLimiter::new(ClusterLimiterOptions {
                    store: self.store.clone(),
                    settings: settings.clone(),
                    strategy: self.strategy,
                    metrics: Some(self.metrics.clone()),
                    clock: Some(self.clock.clone()),
                })
            })
            .clone()
    }

    /// Number of distinct limiters handed out so far.
    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    /// Whether no limiter was handed out yet.
    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }

    /// Close every limiter and forget them. The store stays open.
    pub fn close(&self) {
        for limiter in self.limiters.iter() {
            limiter.close();
        }

        self.limiters.clear();
    }
}
