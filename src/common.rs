use std::{fmt, ops::Deref, sync::Arc, time::Duration};

use crate::SwarmLimitError;

/// Kind of cluster rate limit a limiter enforces.
///
/// The kind does not change the admission algorithm; it is reported as the
/// `ratelimit_type` tag on emitted spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RatelimitType {
    /// One bucket per backend route, shared by all callers.
    ClusterServiceRatelimit,
    /// One bucket per calling client, identified by the caller.
    ClusterClientRatelimit,
}

impl fmt::Display for RatelimitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RatelimitType::ClusterServiceRatelimit => write!(f, "clusterServiceRatelimit"),
            RatelimitType::ClusterClientRatelimit => write!(f, "clusterClientRatelimit"),
        }
    }
}

/// Maximum number of hits accepted within one window.
///
/// This is a soft ceiling: fleet members racing on the same key may briefly
/// exceed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MaxHits(u64);

impl Deref for MaxHits {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for MaxHits {
    type Error = SwarmLimitError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value == 0 {
            Err(SwarmLimitError::InvalidMaxHits(
                "Max hits must be greater than 0".to_string(),
            ))
        } else {
            Ok(Self(value))
        }
    }
}

/// Length of the sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowSize(Duration);

impl WindowSize {
    /// The window as a signed duration, for timestamp arithmetic.
    pub(crate) fn as_time_delta(&self) -> chrono::TimeDelta {
        // Out-of-range windows saturate; nothing practical comes close.
        chrono::TimeDelta::from_std(self.0).unwrap_or(chrono::TimeDelta::MAX)
    }
}

impl Deref for WindowSize {
    type Target = Duration;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<Duration> for WindowSize {
    type Error = SwarmLimitError;

    fn try_from(value: Duration) -> Result<Self, Self::Error> {
        if value.is_zero() {
            Err(SwarmLimitError::InvalidWindowSize(
                "Window size must be greater than 0".to_string(),
            ))
        } else if chrono::TimeDelta::from_std(value).is_err() {
            Err(SwarmLimitError::InvalidWindowSize(
                "Window size is out of range".to_string(),
            ))
        } else {
            Ok(Self(value))
        }
    }
}

/// How the admission check talks to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AdmissionStrategy {
    /// Prune, count, add and expire as four separate round trips.
    ///
    /// Lowest latency per command, but fleet members racing on one key can
    /// overshoot `max_hits` by roughly the number of racers.
    #[default]
    Sequential,
    /// The same steps executed as a single compound store command.
    ///
    /// Removes the overshoot between count and add at the price of running a
    /// script on the store for every decision.
    Atomic,
}

/// Immutable settings of one cluster limiter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Settings {
    /// Kind of limit, reported on spans.
    pub kind: RatelimitType,
    /// Namespace separating limiters that share one store. Empty means
    /// ungrouped.
    pub group: Arc<str>,
    /// Hits accepted per window.
    pub max_hits: MaxHits,
    /// Window length.
    pub window: WindowSize,
}

impl Settings {
    /// Create settings from raw values, validating `max_hits` and `window`.
    pub fn new(
        kind: RatelimitType,
        group: impl Into<Arc<str>>,
        max_hits: u64,
        window: Duration,
    ) -> Result<Self, SwarmLimitError> {
        Ok(Self {
            kind,
            group: group.into(),
            max_hits: MaxHits::try_from(max_hits)?,
            window: WindowSize::try_from(window)?,
        })
    }
}
