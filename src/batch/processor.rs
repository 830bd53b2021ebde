//! Size- and interval-bounded batch processor.

use crate::clock::{default_clock, Clock};
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use uuid::Uuid;

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Queue length that triggers an immediate flush.
    pub batch_size: usize,
    /// Longest time an item waits before a timed flush.
    pub flush_interval: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

impl BatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }
}

/// Failure reported by a processor function.
#[derive(Debug, Clone)]
pub struct BatchError {
    pub message: String,
    pub batch_len: usize,
}

impl Display for BatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "batch of {} failed: {}", self.batch_len, self.message)
    }
}

impl std::error::Error for BatchError {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub flushes: u64,
    pub items_processed: u64,
    pub failures: u64,
}

type Processor<T> = Arc<dyn Fn(Vec<T>) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

struct Queue<T> {
    items: Vec<T>,
    timer: Option<CancellationToken>,
}

struct Inner<T> {
    config: BatchConfig,
    processor: Processor<T>,
    clock: Arc<dyn Clock>,
    queue: Mutex<Queue<T>>,
    flushes: AtomicU64,
    items_processed: AtomicU64,
    failures: AtomicU64,
}

/// Coalesces individual `add` calls into batched processor calls.
///
/// A batch is delivered when the queue reaches `batch_size`, or
/// `flush_interval` after the first item of a batch arrived, whichever comes
/// first. Processor failures are logged and counted, never returned.
pub struct BatchProcessor<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for BatchProcessor<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> BatchProcessor<T> {
    pub fn new<F, Fut, E>(config: BatchConfig, processor: F) -> Self
    where
        F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + 'static,
    {
        Self::new_with_clock(config, default_clock(), processor)
    }

    /// Like [`new`](Self::new), with flush timers driven by `clock`.
    pub fn new_with_clock<F, Fut, E>(config: BatchConfig, clock: Arc<dyn Clock>, processor: F) -> Self
    where
        F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + 'static,
    {
        let processor: Processor<T> =
            Arc::new(move |batch| processor(batch).map(|r| r.map_err(|e| e.to_string())).boxed());
        Self {
            inner: Arc::new(Inner {
                config,
                processor,
                clock,
                queue: Mutex::new(Queue {
                    items: Vec::new(),
                    timer: None,
                }),
                flushes: AtomicU64::new(0),
                items_processed: AtomicU64::new(0),
                failures: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.inner.config
    }

    /// Queue `item`. Reaching `batch_size` flushes right away; otherwise a
    /// flush timer is armed unless one is already pending.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn add(&self, item: T) {
        let full = {
            let mut queue = self.inner.lock();
            queue.items.push(item);
            if queue.items.len() >= self.inner.config.batch_size.max(1) {
                queue.take()
            } else {
                if queue.timer.is_none() {
                    queue.timer = Some(self.arm_timer());
                }
                None
            }
        };
        if let Some(batch) = full {
            self.inner.process(batch).await;
        }
    }

    /// Deliver everything queued so far. Does nothing when the queue is empty.
    pub async fn flush(&self) {
        self.inner.flush().await;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> BatchStats {
        BatchStats {
            flushes: self.inner.flushes.load(Ordering::Relaxed),
            items_processed: self.inner.items_processed.load(Ordering::Relaxed),
            failures: self.inner.failures.load(Ordering::Relaxed),
        }
    }

    fn arm_timer(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let inner = Arc::clone(&self.inner);
        let cancelled = token.clone();
        let interval = inner.config.flush_interval;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = inner.clock.sleep(interval) => inner.flush().await,
            }
        });
        token
    }
}

impl<T> Queue<T> {
    /// Swap out the queued items and disarm the flush timer.
    fn take(&mut self) -> Option<Vec<T>> {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        if self.items.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.items))
        }
    }
}

impl<T: Send + 'static> Inner<T> {
    async fn flush(&self) {
        let batch = self.lock().take();
        if let Some(batch) = batch {
            self.process(batch).await;
        }
    }

    async fn process(&self, batch: Vec<T>) {
        let size = batch.len();
        let batch_id = Uuid::new_v4();
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.items_processed.fetch_add(size as u64, Ordering::Relaxed);
        debug!(%batch_id, size, "flushing batch");

        if let Err(message) = (self.processor)(batch).await {
            self.failures.fetch_add(1, Ordering::Relaxed);
            let err = BatchError {
                message,
                batch_len: size,
            };
            error!(%batch_id, error = %err, "batch processing failed");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Queue<T>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}
