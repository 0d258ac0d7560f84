//! Retry policies for transient failures.

use std::time::Duration;

use backon::ExponentialBuilder;

/// Backoff for optimistic-concurrency conflicts: short initial delay
/// with jitter so racing writers don't collide again in lockstep.
pub fn conflict_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(10))
        .with_max_delay(Duration::from_secs(2))
        .with_max_times(5)
        .with_jitter()
}

#[cfg(test)]
mod tests {
    use super::*;
    use backon::BackoffBuilder;

    #[test]
    fn test_conflict_backoff_is_bounded() {
        let delays: Vec<Duration> = conflict_backoff().build().collect();
        assert_eq!(delays.len(), 5);
        assert!(delays.iter().all(|d| *d <= Duration::from_secs(4)));
    }
}
