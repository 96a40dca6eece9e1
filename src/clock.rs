//! Wall-clock source.
//!
//! Hit scores are wall-clock nanoseconds so that every fleet member scores
//! against the same time base. Skew between members shifts their windows by
//! the skew; nothing here tries to correct it.

use std::fmt::Debug;

use chrono::{DateTime, Utc};

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync + Debug {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// System wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Nanoseconds since the Unix epoch, saturating outside the representable
/// range (roughly years 1677 to 2262).
pub(crate) fn unix_nanos(at: DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt().unwrap_or(if at.timestamp() < 0 {
        i64::MIN
    } else {
        i64::MAX
    })
}
