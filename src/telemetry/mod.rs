//! 失败上报模块：将重试失败事件投递到可注入的接收端。
//!
//! Failure reporting for retried requests.
//!
//! Retried requests fail in two ways: an intermediate attempt fails and another
//! attempt follows, or the last permitted attempt fails and the error is
//! returned to the caller. Every failure is logged through `tracing`; which
//! failures are additionally delivered to a [`FailureSink`] is decided by
//! [`ReportPolicy`].
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`FailureEvent`] | One failed attempt |
//! | [`FailureSink`] | Trait for failure destinations |
//! | [`ReportPolicy`] | Which failures reach the sink |
//! | [`NoopFailureSink`] | Default sink, drops everything |
//! | [`InMemoryFailureSink`] | Bounded in-memory sink for tests |
//! | [`TracingFailureSink`] | Emits events as `tracing` records |
//! | [`CompositeFailureSink`] | Fan out to several sinks |

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Which failed attempts are delivered to the [`FailureSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportPolicy {
    /// Only the failure that exhausts the retry budget is reported.
    #[default]
    FinalOnly,
    /// Every failed attempt is reported, intermediate ones with `is_final == false`.
    EveryAttempt,
}

impl ReportPolicy {
    pub fn should_report(&self, is_final: bool) -> bool {
        match self {
            ReportPolicy::FinalOnly => is_final,
            ReportPolicy::EveryAttempt => true,
        }
    }
}

/// A single failed attempt of a keyed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEvent {
    pub key: String,
    /// Zero-based attempt index (0 is the initial call).
    pub attempt: u32,
    pub max_retries: u32,
    /// True when no further attempt follows and the error goes to the caller.
    pub is_final: bool,
    pub message: String,
}

#[async_trait]
pub trait FailureSink: Send + Sync {
    async fn report(&self, event: FailureEvent) -> Result<()>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFailureSink;

#[async_trait]
impl FailureSink for NoopFailureSink {
    async fn report(&self, _event: FailureEvent) -> Result<()> {
        Ok(())
    }
}

pub fn noop_sink() -> Arc<dyn FailureSink> {
    Arc::new(NoopFailureSink)
}

/// In-memory sink for testing.
pub struct InMemoryFailureSink {
    events: Mutex<VecDeque<FailureEvent>>,
    max_events: usize,
}

impl InMemoryFailureSink {
    pub fn new(max: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            max_events: max,
        }
    }

    pub fn events(&self) -> Vec<FailureEvent> {
        self.lock().iter().cloned().collect()
    }

    pub fn events_for_key(&self, key: &str) -> Vec<FailureEvent> {
        self.lock().iter().filter(|e| e.key == key).cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<FailureEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl FailureSink for InMemoryFailureSink {
    async fn report(&self, event: FailureEvent) -> Result<()> {
        let mut events = self.lock();
        events.push_back(event);
        while events.len() > self.max_events {
            events.pop_front();
        }
        Ok(())
    }
}

/// Sink that turns events into `tracing` records.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingFailureSink;

#[async_trait]
impl FailureSink for TracingFailureSink {
    async fn report(&self, event: FailureEvent) -> Result<()> {
        if event.is_final {
            tracing::error!(
                key = event.key.as_str(),
                attempt = event.attempt,
                max_retries = event.max_retries,
                "request failed after retries: {}",
                event.message
            );
        } else {
            tracing::warn!(
                key = event.key.as_str(),
                attempt = event.attempt,
                max_retries = event.max_retries,
                "request attempt failed: {}",
                event.message
            );
        }
        Ok(())
    }
}

/// Composite sink for multiple destinations.
#[derive(Default)]
pub struct CompositeFailureSink {
    sinks: Vec<Arc<dyn FailureSink>>,
}

impl CompositeFailureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl FailureSink for CompositeFailureSink {
    async fn report(&self, event: FailureEvent) -> Result<()> {
        for s in &self.sinks {
            let _ = s.report(event.clone()).await;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        for s in &self.sinks {
            let _ = s.close().await;
        }
        Ok(())
    }
}
