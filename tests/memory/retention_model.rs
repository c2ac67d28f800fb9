use chrono::{Duration, Utc};

use memoria::core::memory::RetentionManager;
use memoria::core::memory::retention::clamp_strength;
use memoria::error::ErrorKind;

#[test]
fn decay_is_monotonic_in_elapsed_time() {
    let retention = RetentionManager::new(0.05, 0.2).unwrap();
    let created = Utc::now() - Duration::days(30);

    let mut previous = f64::INFINITY;
    for hours in [0, 1, 6, 24, 72, 240, 720] {
        let now = created + Duration::hours(hours);
        let value = retention.calculate_retention(created, None, now);
        assert!(value <= previous, "retention rose at {hours}h");
        assert!(value > 0.0 && value <= 1.0);
        previous = value;
    }
}

#[test]
fn later_access_restarts_the_clock() {
    let retention = RetentionManager::default();
    let created = Utc::now() - Duration::days(10);
    let accessed = created + Duration::days(9);
    let now = created + Duration::days(10);

    let since_creation = retention.calculate_retention(created, None, now);
    let since_access = retention.calculate_retention(created, Some(accessed), now);
    assert!(since_access > since_creation);

    let stale_access = retention.calculate_retention(created, Some(created - Duration::days(1)), now);
    assert!((stale_access - since_creation).abs() < 1e-12);
}

#[test]
fn future_anchor_counts_as_no_elapsed_time() {
    let retention = RetentionManager::default();
    let now = Utc::now();
    let value = retention.calculate_retention(now + Duration::hours(5), None, now);
    assert!((value - 1.0).abs() < f64::EPSILON);
}

#[test]
fn reinforcement_stays_within_bounds() {
    let retention = RetentionManager::new(0.01, 0.3).unwrap();
    for strength in [f64::MIN_POSITIVE, 0.01, 0.5, 0.99, 1.0] {
        let reinforced = retention.reinforce(strength);
        assert!(reinforced >= strength);
        assert!(reinforced <= 1.0);
    }
    for odd in [0.0, -1.0, f64::NAN, f64::INFINITY] {
        let reinforced = retention.reinforce(odd);
        assert!(reinforced > 0.0 && reinforced <= 1.0, "{odd} -> {reinforced}");
    }
    assert!((retention.reinforce(1.0) - 1.0).abs() < f64::EPSILON);
    assert!((clamp_strength(2.0) - 1.0).abs() < f64::EPSILON);
}

#[test]
fn repeated_reinforcement_converges_to_one() {
    let retention = RetentionManager::default();
    let mut strength = 0.1;
    for _ in 0..100 {
        let next = retention.reinforce(strength);
        assert!(next >= strength);
        strength = next;
    }
    assert!(strength > 0.999);
}

#[test]
fn invalid_parameters_are_rejected() {
    for (rate, factor) in [(0.0, 0.2), (-1.0, 0.2), (f64::NAN, 0.2), (0.1, 0.0), (0.1, 1.5)] {
        let err = RetentionManager::new(rate, factor).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
    assert!(RetentionManager::new(0.1, 1.0).is_ok());
}
