//! Unit tests for retry backoff growth

use agmarknet_ingest::ingest::config::{calculate_backoff, BACKOFF_BASE_SECS, MAX_ATTEMPTS};
use agmarknet_ingest::ingest::RetryPolicy;
use std::time::Duration;

#[test]
fn test_backoff_strictly_increasing_within_budget() {
    let policy = RetryPolicy::default();
    let waits: Vec<Duration> = (1..policy.max_attempts).map(|k| policy.backoff(k)).collect();

    assert_eq!(waits.len(), (MAX_ATTEMPTS - 1) as usize);
    assert!(waits.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn test_backoff_is_power_of_base() {
    assert_eq!(calculate_backoff(BACKOFF_BASE_SECS, 1), Duration::from_secs(2));
    assert_eq!(calculate_backoff(BACKOFF_BASE_SECS, 4), Duration::from_secs(16));
    assert_eq!(calculate_backoff(3, 2), Duration::from_secs(9));
}

#[test]
fn test_backoff_saturates_instead_of_overflowing() {
    assert_eq!(calculate_backoff(2, 200), Duration::from_secs(u64::MAX));
}
