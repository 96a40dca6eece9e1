use std::future::Future;

use chrono::{DateTime, TimeDelta, Utc};

use crate::{CallContext, ClusterLimiter, CountingStore};

/// Operations every rate limiter variant of the proxy offers.
///
/// Request-path code written against this trait works unchanged with any
/// limiter. None of the operations fail; each degrades to a safe default.
pub trait Limiter: Send + Sync {
    /// Decide whether a request from `identity` is allowed.
    fn allow(&self, identity: &str) -> impl Future<Output = bool> + Send;

    /// Like [`allow`](Self::allow), bounded and traced by `ctx`.
    fn allow_with_context(
        &self,
        ctx: &CallContext,
        identity: &str,
    ) -> impl Future<Output = bool> + Send;

    /// Time until `identity` may be admitted again; non-positive means now.
    fn delta(&self, identity: &str) -> impl Future<Output = TimeDelta> + Send;

    /// Oldest recorded request time of `identity`; the Unix epoch if unknown.
    fn oldest(&self, identity: &str) -> impl Future<Output = DateTime<Utc>> + Send;

    /// Whole seconds to wait before retrying; at least one.
    fn retry_after(&self, identity: &str) -> impl Future<Output = u64> + Send;

    /// Like [`retry_after`](Self::retry_after), bounded and traced by `ctx`.
    fn retry_after_with_context(
        &self,
        ctx: &CallContext,
        identity: &str,
    ) -> impl Future<Output = u64> + Send;

    /// Adjust the local capacity kept for `identity`, for limiters that keep
    /// any.
    fn resize(&self, identity: &str, n: usize);

    /// Release resources owned by the limiter.
    fn close(&self);
}

impl<S: CountingStore> Limiter for ClusterLimiter<S> {
    fn allow(&self, identity: &str) -> impl Future<Output = bool> + Send {
        ClusterLimiter::allow(self, identity)
    }

    fn allow_with_context(
        &self,
        ctx: &CallContext,
        identity: &str,
    ) -> impl Future<Output = bool> + Send {
        ClusterLimiter::allow_with_context(self, ctx, identity)
    }

    fn delta(&self, identity: &str) -> impl Future<Output = TimeDelta> + Send {
        ClusterLimiter::delta(self, identity)
    }

    fn oldest(&self, identity: &str) -> impl Future<Output = DateTime<Utc>> + Send {
        ClusterLimiter::oldest(self, identity)
    }

    fn retry_after(&self, identity: &str) -> impl Future<Output = u64> + Send {
        ClusterLimiter::retry_after(self, identity)
    }

    fn retry_after_with_context(
        &self,
        ctx: &CallContext,
        identity: &str,
    ) -> impl Future<Output = u64> + Send {
        ClusterLimiter::retry_after_with_context(self, ctx, identity)
    }

    fn resize(&self, identity: &str, n: usize) {
        ClusterLimiter::resize(self, identity, n)
    }

    fn close(&self) {
        ClusterLimiter::close(self)
    }
}
