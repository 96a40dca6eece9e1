use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use dashmap::DashMap;

/// Tracks admissions per key across all fleet members and remembers the
/// largest number of admissions seen within any one window.
pub(crate) struct OvershootTracker {
    window: Duration,
    admitted: DashMap<usize, VecDeque<Instant>>,
}

impl OvershootTracker {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            window,
            admitted: DashMap::new(),
        }
    }

    /// Record one admission of `key` at `at`; returns the admissions of
    /// `key` within the window ending at `at`.
    pub(crate) fn record(&self, key: usize, at: Instant) -> usize {
        let mut log = self.admitted.entry(key).or_default();

        while let Some(front) = log.front() {
            if at.saturating_duration_since(*front) >= self.window {
                log.pop_front();
            } else {
                break;
            }
        }

        log.push_back(at);
        log.len()
    }
}
