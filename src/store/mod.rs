//! Shared counting store.
//!
//! The limiter keeps no state of its own: every hit lives in an ordered set
//! in a store all fleet members talk to. [`CountingStore`] is the slice of
//! ordered-set behaviour the limiter needs.
//!
//! - [`RedisStore`]: Redis, optionally sharded over several instances.
//! - [`MemoryStore`]: in-process, for single-instance setups and tests.

use std::{future::Future, time::Duration};

use crate::SwarmLimitError;

mod memory_store;
pub use memory_store::*;

mod redis_store;
pub use redis_store::*;

mod ring;
pub(crate) use ring::*;

/// Ordered-set operations against the shared store.
///
/// Scores are Unix nanoseconds as `f64`. Every call is a single store command
/// and carries no ordering guarantee relative to other callers beyond the
/// store's per-command atomicity.
pub trait CountingStore: Clone + Send + Sync + 'static {
    /// Delete all members of `key` scored in `[min, max]`. Returns the number
    /// of removed members.
    fn remove_range_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> impl Future<Output = Result<u64, SwarmLimitError>> + Send;

    /// Number of members of `key`; zero for a missing key.
    fn cardinality(&self, key: &str) -> impl Future<Output = Result<u64, SwarmLimitError>> + Send;

    /// Insert `member` with `score`, or update its score. Returns the number
    /// of newly added members.
    fn add_scored(
        &self,
        key: &str,
        score: f64,
        member: &str,
    ) -> impl Future<Output = Result<u64, SwarmLimitError>> + Send;

    /// Set or refresh the time-to-live of `key`. Returns false when the key
    /// does not exist.
    fn expire(
        &self,
        key: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<bool, SwarmLimitError>> + Send;

    /// Lowest-scored member of `key` with score in `[min, max]` (offset 0,
    /// limit 1).
    fn lowest_in_range(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> impl Future<Output = Result<Option<String>, SwarmLimitError>> + Send;

    /// Prune members scored in `[0, window_start]`, and if fewer than
    /// `max_hits` remain, add `member` at `score` and set the TTL of `key`, all
    /// as one atomic command. Returns whether the member was added.
    fn admit_atomic(
        &self,
        key: &str,
        window_start: f64,
        score: f64,
        member: &str,
        max_hits: u64,
        ttl: Duration,
    ) -> impl Future<Output = Result<bool, SwarmLimitError>> + Send;
}
