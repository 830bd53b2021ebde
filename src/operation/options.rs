use crate::resilience::{RetryContext, DEFAULT_MAX_DELAY};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runner configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationOptions {
    /// Deadline for a single execution. `None` or zero disables it.
    pub timeout: Option<Duration>,
    /// Number of `retry()` calls permitted after a failure.
    pub retries: u32,
    /// Delay before the first retry.
    pub retry_delay: Duration,
    /// Growth factor applied to `retry_delay` for each further retry.
    pub backoff_multiplier: f64,
    pub max_retry_delay: Duration,
    /// Hold the shared global loading indicator while executing.
    pub show_global_loader: bool,
}

impl Default for OperationOptions {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            retries: 0,
            retry_delay: Duration::from_millis(1000),
            backoff_multiplier: 2.0,
            max_retry_delay: DEFAULT_MAX_DELAY,
            show_global_loader: false,
        }
    }
}

impl OperationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_max_retry_delay(mut self, cap: Duration) -> Self {
        self.max_retry_delay = cap;
        self
    }

    pub fn with_global_loader(mut self, show: bool) -> Self {
        self.show_global_loader = show;
        self
    }

    /// Effective deadline, treating zero as disabled.
    pub fn effective_timeout(&self) -> Option<Duration> {
        self.timeout.filter(|t| !t.is_zero())
    }

    pub(crate) fn retry_context(&self) -> RetryContext {
        RetryContext::new(self.retries, self.retry_delay)
            .with_multiplier(self.backoff_multiplier)
            .with_max_delay(self.max_retry_delay)
    }
}

/// Named option sets for common call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationPreset {
    /// Short interactive lookups.
    Quick,
    /// Ordinary backend calls.
    Api,
    /// File and image uploads.
    Upload,
    /// Work nobody is waiting on.
    Background,
}

impl OperationPreset {
    pub const ALL: [OperationPreset; 4] = [
        OperationPreset::Quick,
        OperationPreset::Api,
        OperationPreset::Upload,
        OperationPreset::Background,
    ];

    pub fn options(&self) -> OperationOptions {
        let base = OperationOptions::default();
        match self {
            OperationPreset::Quick => base.with_timeout(Duration::from_secs(5)).with_retries(0),
            OperationPreset::Api => base
                .with_timeout(Duration::from_secs(10))
                .with_retries(2)
                .with_retry_delay(Duration::from_secs(1)),
            OperationPreset::Upload => base
                .with_timeout(Duration::from_secs(60))
                .with_retries(1)
                .with_retry_delay(Duration::from_secs(2))
                .with_global_loader(true),
            OperationPreset::Background => base
                .without_timeout()
                .with_retries(3)
                .with_retry_delay(Duration::from_secs(1)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OperationPreset::Quick => "quick",
            OperationPreset::Api => "api",
            OperationPreset::Upload => "upload",
            OperationPreset::Background => "background",
        }
    }
}

impl From<OperationPreset> for OperationOptions {
    fn from(preset: OperationPreset) -> Self {
        preset.options()
    }
}
