//! Time source used by every timed wait in the orchestrator.
//!
//! Probe polling, retry backoff and circuit cooldowns all read time through
//! [`Clock`] so tests can drive them with a manual clock instead of sleeping.

use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Monotonic time plus the ability to wait.
///
/// `now()` is measured from an arbitrary per-clock origin; only differences
/// between readings are meaningful.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;

    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `Instant` and `tokio::time::sleep`.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_system_clock_advances_across_sleep() {
        let clock = SystemClock::new();
        let before = clock.now();
        clock.sleep(Duration::from_millis(20)).await;
        assert!(clock.now() >= before + Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_system_clock_zero_sleep_returns_immediately() {
        let clock = SystemClock::new();
        clock.sleep(Duration::ZERO).await;
        assert!(clock.now() < Duration::from_secs(5));
    }
}
