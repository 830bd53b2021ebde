//! Keyed retry executor.
//!
//! Wraps a request function with a bounded retry loop. Counters are tracked
//! per key so callers (and logs) can correlate attempts of the same logical
//! request; the entry for a key is removed as soon as the last request using
//! it settles, so the map never grows past the number of in-flight keys.

use super::backoff::Backoff;
use crate::clock::{default_clock, Clock};
use crate::telemetry::{noop_sink, FailureEvent, FailureSink, ReportPolicy};
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Default delay step between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Default)]
struct KeyCounter {
    retries: u32,
    active: usize,
}

pub struct RetryExecutor {
    backoff: Backoff,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn FailureSink>,
    report_policy: ReportPolicy,
    counters: Arc<Mutex<HashMap<String, KeyCounter>>>,
}

impl RetryExecutor {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            backoff,
            clock: default_clock(),
            sink: noop_sink(),
            report_policy: ReportPolicy::default(),
            counters: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_failure_sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_report_policy(mut self, policy: ReportPolicy) -> Self {
        self.report_policy = policy;
        self
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Retries recorded so far for requests currently in flight under `key`.
    pub fn retry_count(&self, key: &str) -> u32 {
        lock(&self.counters)
            .get(key)
            .map(|c| c.retries)
            .unwrap_or(0)
    }

    /// Number of keys with at least one request in flight.
    pub fn tracked_keys(&self) -> usize {
        lock(&self.counters).len()
    }

    /// Run `request_fn`, retrying failures up to `max_retries` times.
    ///
    /// The retry budget belongs to this call. On exhaustion the error of the
    /// last attempt is returned as-is.
    pub async fn execute_with_retry<T, E, F, Fut>(
        &self,
        key: &str,
        mut request_fn: F,
        max_retries: u32,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let _guard = CounterGuard::enter(&self.counters, key);
        let mut retry_count: u32 = 0;

        loop {
            let err = match request_fn().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let is_final = retry_count >= max_retries;
            if is_final {
                warn!(
                    key,
                    attempt = retry_count,
                    max_retries,
                    "request failed, retries exhausted: {}",
                    err
                );
            } else {
                debug!(
                    key,
                    attempt = retry_count,
                    max_retries,
                    "request attempt failed: {}",
                    err
                );
            }

            if self.report_policy.should_report(is_final) {
                let event = FailureEvent {
                    key: key.to_string(),
                    attempt: retry_count,
                    max_retries,
                    is_final,
                    message: err.to_string(),
                };
                let _ = self.sink.report(event).await;
            }

            if is_final {
                return Err(err);
            }

            let delay = self.backoff.delay_for(retry_count);
            retry_count += 1;
            if let Some(counter) = lock(&self.counters).get_mut(key) {
                counter.retries = counter.retries.saturating_add(1);
            }
            self.clock.sleep(delay).await;
        }
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(Backoff::linear(DEFAULT_RETRY_DELAY))
    }
}

fn lock(
    counters: &Mutex<HashMap<String, KeyCounter>>,
) -> std::sync::MutexGuard<'_, HashMap<String, KeyCounter>> {
    counters.lock().unwrap_or_else(|e| e.into_inner())
}

/// Registers a request under its key and removes the key's counter when the
/// last request for it settles or is dropped.
struct CounterGuard<'a> {
    counters: &'a Mutex<HashMap<String, KeyCounter>>,
    key: &'a str,
}

impl<'a> CounterGuard<'a> {
    fn enter(counters: &'a Mutex<HashMap<String, KeyCounter>>, key: &'a str) -> Self {
        lock(counters).entry(key.to_string()).or_default().active += 1;
        Self { counters, key }
    }
}

impl Drop for CounterGuard<'_> {
    fn drop(&mut self) {
        let mut counters = lock(self.counters);
        let remove = match counters.get_mut(self.key) {
            Some(counter) => {
                counter.active = counter.active.saturating_sub(1);
                counter.active == 0
            }
            None => false,
        };
        if remove {
            counters.remove(self.key);
        }
    }
}
