//! Time source used by every timer in the crate.
//!
//! Timeouts, retry backoff and batch flush intervals all go through a
//! [`Clock`], so a caller can substitute its own scheduler. The default
//! [`TokioClock`] delegates to `tokio::time`, which means tests can run under
//! `#[tokio::test(start_paused = true)]` and advance virtual time
//! deterministically.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[async_trait]
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Suspend the calling task for `duration`.
    async fn sleep(&self, duration: Duration);

    fn name(&self) -> &'static str;
}

/// Clock backed by the tokio timer wheel.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        tokio::time::sleep(duration).await;
    }

    fn name(&self) -> &'static str {
        "tokio"
    }
}

/// Shared handle to the default clock.
pub fn default_clock() -> Arc<dyn Clock> {
    Arc::new(TokioClock)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_sleep_advances_virtual_time() {
        let clock = TokioClock;
        let start = clock.now();
        clock.sleep(Duration::from_millis(250)).await;
        assert_eq!(clock.now() - start, Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_sleep_returns_immediately() {
        let clock = default_clock();
        let start = clock.now();
        clock.sleep(Duration::ZERO).await;
        assert_eq!(clock.now(), start);
        assert_eq!(clock.name(), "tokio");
    }
}
