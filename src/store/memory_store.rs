use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;

use crate::{Clock, CountingStore, SwarmLimitError, SystemClock};

#[derive(Debug, Default)]
struct ScoredSet {
    members: HashMap<String, f64>,
    expires_at: Option<DateTime<Utc>>,
}

impl ScoredSet {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    fn remove_range(&mut self, min: f64, max: f64) -> u64 {
        let before = self.members.len();
        self.members
            .retain(|_, score| !(*score >= min && *score <= max));
        (before - self.members.len()) as u64
    }

    fn lowest(&self, min: f64, max: f64) -> Option<&str> {
        self.members
            .iter()
            .filter(|(_, score)| **score >= min && **score <= max)
            // ties are broken by member, as Redis orders equal scores
            .min_by(|(a_member, a_score), (b_member, b_score)| {
                a_score
                    .total_cmp(b_score)
                    .then_with(|| a_member.cmp(b_member))
            })
            .map(|(member, _)| member.as_str())
    }
}

/// In-process [`CountingStore`].
///
/// Holds every key's ordered set in a [`DashMap`]. Keys expire lazily when
/// touched after their TTL, measured on the injected [`Clock`], and vanish
/// once their last member is removed, as they do in Redis.
///
/// State is local to the process, so limiters using it do not share counts
/// across a fleet. Clones share the same state.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    sets: Arc<DashMap<String, ScoredSet>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store expiring keys on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store expiring keys on `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            sets: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Number of live keys.
    pub fn key_count(&self) -> usize {
        let now = self.clock.now();
        self.sets.retain(|_, set| !set.is_expired(now));
        self.sets.len()
    }

    fn purge_expired(&self, key: &str) {
        let now = self.clock.now();
        self.sets.remove_if(key, |_, set| set.is_expired(now));
    }

    fn remove_if_empty(&self, key: &str) {
        self.sets.remove_if(key, |_, set| set.members.is_empty());
    }

    fn expiry(&self, ttl: Duration) -> Option<DateTime<Utc>> {
        let ttl = TimeDelta::from_std(ttl).ok()?;
        self.clock.now().checked_add_signed(ttl)
    }
}

impl CountingStore for MemoryStore {
    async fn remove_range_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> Result<u64, SwarmLimitError> {
        self.purge_expired(key);

        let removed = match self.sets.get_mut(key) {
            Some(mut set) => set.remove_range(min, max),
            None => return Ok(0),
        };

        self.remove_if_empty(key);
        Ok(removed)
    }

    async fn cardinality(&self, key: &str) -> Result<u64, SwarmLimitError> {
        self.purge_expired(key);

        Ok(self
            .sets
            .get(key)
            .map(|set| set.members.len() as u64)
            .unwrap_or(0))
    }

    async fn add_scored(&self, key: &str, score: f64, member: &str) -> Result<u64, SwarmLimitError> {
        self.purge_expired(key);

        let mut set = self.sets.entry(key.to_string()).or_default();
        let added = set.members.insert(member.to_string(), score).is_none();

        Ok(u64::from(added))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, SwarmLimitError> {
        self.purge_expired(key);

        let expires_at = self.expiry(ttl);
        match self.sets.get_mut(key) {
            Some(mut set) => {
                set.expires_at = expires_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn lowest_in_range(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> Result<Option<String>, SwarmLimitError> {
        self.purge_expired(key);

        Ok(self
            .sets
            .get(key)
            .and_then(|set| set.lowest(min, max).map(str::to_string)))
    }

    async fn admit_atomic(
        &self,
        key: &str,
        window_start: f64,
        score: f64,
        member: &str,
        max_hits: u64,
        ttl: Duration,
    ) -> Result<bool, SwarmLimitError> {
        self.purge_expired(key);

        let expires_at = self.expiry(ttl);
        let admitted = {
            // the entry guard keeps the key locked for the whole check
            let mut set = self.sets.entry(key.to_string()).or_default();
            set.remove_range(0.0, window_start);

            if set.members.len() as u64 >= max_hits {
                false
            } else {
                set.members.insert(member.to_string(), score);
                set.expires_at = expires_at;
                true
            }
        };

        if !admitted {
            self.remove_if_empty(key);
        }

        Ok(admitted)
    }
}
