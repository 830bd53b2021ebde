use std::time::Duration;

/// Upper bound applied when no explicit cap is configured.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// `step * (retry_count + 1)`, capped at `max_delay`.
    Linear { step: Duration, max_delay: Duration },
    /// `base * multiplier^retry_count`, capped at `max_delay`.
    Exponential {
        base: Duration,
        multiplier: f64,
        max_delay: Duration,
    },
}

impl Backoff {
    pub fn linear(step: Duration) -> Self {
        Backoff::Linear {
            step,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    pub fn exponential(base: Duration, multiplier: f64) -> Self {
        Backoff::Exponential {
            base,
            multiplier,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    pub fn with_max_delay(self, cap: Duration) -> Self {
        match self {
            Backoff::Linear { step, .. } => Backoff::Linear {
                step,
                max_delay: cap,
            },
            Backoff::Exponential {
                base, multiplier, ..
            } => Backoff::Exponential {
                base,
                multiplier,
                max_delay: cap,
            },
        }
    }

    pub fn max_delay(&self) -> Duration {
        match self {
            Backoff::Linear { max_delay, .. } | Backoff::Exponential { max_delay, .. } => {
                *max_delay
            }
        }
    }

    /// Delay to wait before the retry that follows `retry_count` earlier retries.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let cap = self.max_delay();
        let cap_nanos = cap.as_nanos();
        let nanos = match self {
            Backoff::Linear { step, .. } => step
                .as_nanos()
                .saturating_mul(u128::from(retry_count) + 1),
            Backoff::Exponential {
                base, multiplier, ..
            } => {
                let exp = i32::try_from(retry_count).unwrap_or(i32::MAX);
                let scaled = (base.as_nanos() as f64) * multiplier.max(0.0).powi(exp);
                if !scaled.is_finite() || scaled >= cap_nanos as f64 {
                    return cap;
                }
                scaled.round() as u128
            }
        };
        if nanos >= cap_nanos {
            return cap;
        }
        // nanos < cap_nanos, so it fits the u64 seconds range of Duration
        Duration::from_secs((nanos / 1_000_000_000) as u64)
            + Duration::from_nanos((nanos % 1_000_000_000) as u64)
    }
}

/// Retry bookkeeping for a single operation.
///
/// Invariant: `retry_count <= max_retries`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryContext {
    pub retry_count: u32,
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl RetryContext {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            retry_count: 0,
            max_retries,
            base_delay,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: 2.0,
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::Exponential {
            base: self.base_delay,
            multiplier: self.multiplier,
            max_delay: self.max_delay,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Delay before the next retry: `min(base * multiplier^retry_count, max_delay)`.
    pub fn next_delay(&self) -> Duration {
        self.backoff().delay_for(self.retry_count)
    }

    /// Consume one retry from the budget, returning the delay to wait first.
    pub fn begin_retry(&mut self) -> Option<Duration> {
        if !self.can_retry() {
            return None;
        }
        let delay = self.next_delay();
        self.retry_count += 1;
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.retry_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_growth_and_refusal() {
        let mut ctx = RetryContext::new(3, Duration::from_millis(100)).with_multiplier(2.0);
        assert_eq!(ctx.begin_retry(), Some(Duration::from_millis(100)));
        assert_eq!(ctx.begin_retry(), Some(Duration::from_millis(200)));
        assert_eq!(ctx.begin_retry(), Some(Duration::from_millis(400)));
        assert!(!ctx.can_retry());
        assert_eq!(ctx.begin_retry(), None);
        assert_eq!(ctx.retry_count, 3);

        ctx.reset();
        assert!(ctx.can_retry());
    }

    #[test]
    fn test_exponential_is_capped() {
        let ctx = RetryContext::new(10, Duration::from_millis(500))
            .with_max_delay(Duration::from_secs(2));
        assert_eq!(ctx.backoff().delay_for(1), Duration::from_secs(1));
        assert_eq!(ctx.backoff().delay_for(2), Duration::from_secs(2));
        assert_eq!(ctx.backoff().delay_for(9), Duration::from_secs(2));
        assert_eq!(ctx.backoff().delay_for(u32::MAX), Duration::from_secs(2));
    }

    #[test]
    fn test_linear_schedule() {
        let backoff = Backoff::linear(Duration::from_millis(1000));
        assert_eq!(backoff.delay_for(0), Duration::from_millis(1000));
        assert_eq!(backoff.delay_for(1), Duration::from_millis(2000));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(3000));

        let capped = backoff.with_max_delay(Duration::from_millis(2500));
        assert_eq!(capped.delay_for(2), Duration::from_millis(2500));
    }

    #[test]
    fn test_constant_when_multiplier_is_one() {
        let backoff = Backoff::exponential(Duration::from_millis(300), 1.0);
        assert_eq!(backoff.delay_for(0), backoff.delay_for(5));
    }
}
