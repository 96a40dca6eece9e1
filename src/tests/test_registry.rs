use std::{sync::Arc, time::Duration};

use super::{
    mocks::{MockClock, RecordingMetrics, settings, t0},
    runtime,
};
use crate::{AdmissionStrategy, MemoryStore, Registry, RegistryOptions};

fn registry() -> (Registry<MemoryStore>, MemoryStore) {
    let clock = MockClock::new(t0());
    let store = MemoryStore::with_clock(Arc::new(clock.clone()));
    let registry = Registry::new(RegistryOptions {
        store: store.clone(),
        strategy: AdmissionStrategy::Sequential,
        metrics: Some(Arc::new(RecordingMetrics::default())),
        clock: Some(Arc::new(clock)),
    });

    (registry, store)
}

#[test]
fn equal_settings_share_one_limiter() {
    runtime::block_on(async {
        let (registry, _) = registry();
        let window = Duration::from_secs(10);

        let first = registry.get(&settings("api", 1, window));
        let second = registry.get(&settings("api", 1, window));
        assert_eq!(registry.len(), 1);

        assert!(first.allow("a").await);
        assert!(!second.allow("a").await);
    });
}

#[test]
fn different_groups_get_separate_limiters() {
    runtime::block_on(async {
        let (registry, store) = registry();
        let window = Duration::from_secs(10);

        let api = registry.get(&settings("api", 1, window));
        let login = registry.get(&settings("login", 1, window));
        assert_eq!(registry.len(), 2);

        assert!(api.allow("a").await);
        assert!(login.allow("a").await);
        assert_eq!(store.key_count(), 2);
    });
}

#[test]
fn close_forgets_limiters_but_keeps_store() {
    runtime::block_on(async {
        let (registry, store) = registry();
        assert!(registry.is_empty());

        let limiter = registry.get(&settings("", 1, Duration::from_secs(10)));
        assert!(limiter.allow("a").await);

        registry.close();
        assert!(registry.is_empty());
        assert_eq!(store.key_count(), 1);

        // a fresh limiter still sees the recorded hit
        let limiter = registry.get(&settings("", 1, Duration::from_secs(10)));
        assert!(!limiter.allow("a").await);
    });
}
