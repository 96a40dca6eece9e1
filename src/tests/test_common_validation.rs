use std::time::Duration;

use crate::{MaxHits, RatelimitType, Settings, SwarmLimitError, WindowSize};

#[test]
fn max_hits_try_from_validates_positive() {
    let hits = MaxHits::try_from(1u64).unwrap();
    assert_eq!(*hits, 1);

    let err = MaxHits::try_from(0u64).unwrap_err();
    assert!(matches!(err, SwarmLimitError::InvalidMaxHits(_)));
    assert_eq!(
        err.to_string(),
        "invalid max hits: Max hits must be greater than 0"
    );
}

#[test]
fn window_size_try_from_validates_nonzero() {
    let window = WindowSize::try_from(Duration::from_millis(1)).unwrap();
    assert_eq!(*window, Duration::from_millis(1));

    let err = WindowSize::try_from(Duration::ZERO).unwrap_err();
    assert!(matches!(err, SwarmLimitError::InvalidWindowSize(_)));
    assert_eq!(
        err.to_string(),
        "invalid window size: Window size must be greater than 0"
    );
}

#[test]
fn window_size_rejects_durations_beyond_timestamp_range() {
    let err = WindowSize::try_from(Duration::MAX).unwrap_err();
    assert!(matches!(err, SwarmLimitError::InvalidWindowSize(_)));
}

#[test]
fn settings_new_validates_every_field() {
    let settings = Settings::new(
        RatelimitType::ClusterServiceRatelimit,
        "api",
        10,
        Duration::from_secs(60),
    )
    .unwrap();

    assert_eq!(settings.kind, RatelimitType::ClusterServiceRatelimit);
    assert_eq!(&*settings.group, "api");
    assert_eq!(*settings.max_hits, 10);
    assert_eq!(*settings.window, Duration::from_secs(60));

    assert!(matches!(
        Settings::new(RatelimitType::ClusterClientRatelimit, "", 0, Duration::from_secs(1)),
        Err(SwarmLimitError::InvalidMaxHits(_))
    ));
    assert!(matches!(
        Settings::new(RatelimitType::ClusterClientRatelimit, "", 1, Duration::ZERO),
        Err(SwarmLimitError::InvalidWindowSize(_))
    ));
}

#[test]
fn settings_equality_covers_group() {
    let window = Duration::from_secs(1);
    let a = Settings::new(RatelimitType::ClusterClientRatelimit, "a", 5, window).unwrap();
    let b = Settings::new(RatelimitType::ClusterClientRatelimit, "b", 5, window).unwrap();

    assert_ne!(a, b);
    assert_eq!(a, a.clone());
}

#[test]
fn ratelimit_type_display_matches_span_tag() {
    assert_eq!(
        RatelimitType::ClusterServiceRatelimit.to_string(),
        "clusterServiceRatelimit"
    );
    assert_eq!(
        RatelimitType::ClusterClientRatelimit.to_string(),
        "clusterClientRatelimit"
    );
}
