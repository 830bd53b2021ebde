//! Single-operation runner.

use super::global::GlobalLoader;
use super::options::OperationOptions;
use super::state::{OperationState, Subscribers, SubscriptionId};
use crate::clock::{default_clock, Clock};
use crate::error::OperationError;
use crate::resilience::RetryContext;
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

type OperationFn<T, E> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync>;
type SuccessCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;
type ErrorCallback<E> = Arc<dyn Fn(&OperationError<E>) + Send + Sync>;
type FinallyCallback = Arc<dyn Fn() + Send + Sync>;

struct Inner<T, E> {
    state: OperationState<T, E>,
    /// Bumped by every execute, cancel and reset. A settling call whose
    /// generation no longer matches leaves the state alone.
    generation: u64,
    retry: RetryContext,
    last_fn: Option<OperationFn<T, E>>,
    timer: Option<CancellationToken>,
    holds_global: bool,
}

/// Runs one async function at a time and tracks its loading state.
///
/// The runner owns its [`OperationState`]. Results are returned to the caller
/// of `execute` / `retry` and mirrored into the state, which listeners can
/// observe through [`subscribe`](Self::subscribe).
pub struct AsyncOperation<T, E> {
    options: OperationOptions,
    clock: Arc<dyn Clock>,
    global: Option<Arc<GlobalLoader>>,
    inner: Mutex<Inner<T, E>>,
    subscribers: Subscribers<OperationState<T, E>>,
    on_success: Option<SuccessCallback<T>>,
    on_error: Option<ErrorCallback<E>>,
    on_finally: Option<FinallyCallback>,
}

impl<T, E> AsyncOperation<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub fn new(options: OperationOptions) -> Self {
        let retry = options.retry_context();
        Self {
            options,
            clock: default_clock(),
            global: None,
            inner: Mutex::new(Inner {
                state: OperationState::default(),
                generation: 0,
                retry,
                last_fn: None,
                timer: None,
                holds_global: false,
            }),
            subscribers: Subscribers::new(),
            on_success: None,
            on_error: None,
            on_finally: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_global_loader(mut self, loader: Arc<GlobalLoader>) -> Self {
        self.global = Some(loader);
        self
    }

    pub fn on_success(mut self, callback: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(callback));
        self
    }

    pub fn on_error(
        mut self,
        callback: impl Fn(&OperationError<E>) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn on_finally(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_finally = Some(Arc::new(callback));
        self
    }

    pub fn options(&self) -> &OperationOptions {
        &self.options
    }

    /// Run `f`, superseding any call still in flight on this runner.
    ///
    /// A superseded call still returns its own result to its caller, but no
    /// longer updates the state.
    pub async fn execute<F, Fut>(&self, f: F) -> Result<T, OperationError<E>>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let op: OperationFn<T, E> = Arc::new(move || f().boxed());
        self.run(op, false).await
    }

    /// Re-run the last executed function after the current backoff delay.
    pub async fn retry(&self) -> Result<T, OperationError<E>> {
        let (op, delay) = {
            let inner = self.lock();
            let Some(op) = inner.last_fn.clone() else {
                return Err(OperationError::NothingToRetry);
            };
            if !inner.retry.can_retry() {
                return Err(OperationError::RetryLimitReached {
                    retry_count: inner.retry.retry_count,
                    max_retries: inner.retry.max_retries,
                });
            }
            (op, inner.retry.next_delay())
        };
        debug!(delay_ms = delay.as_millis() as u64, "retrying operation");
        self.clock.sleep(delay).await;
        self.run(op, true).await
    }

    /// Detach the in-flight call from the state.
    ///
    /// Returns false when nothing was loading. The wrapped future keeps
    /// running; its result just stops mattering to this runner.
    pub fn cancel(&self) -> bool {
        let now = self.clock.now();
        let (release_global, snapshot) = {
            let mut inner = self.lock();
            if !inner.state.is_loading {
                return false;
            }
            inner.generation += 1;
            if let Some(timer) = inner.timer.take() {
                timer.cancel();
            }
            inner.state.is_loading = false;
            inner.state.duration = inner.state.start_time.map(|s| now.duration_since(s));
            (std::mem::take(&mut inner.holds_global), inner.state.clone())
        };
        self.release_global(release_global);
        self.subscribers.notify(&snapshot);
        debug!(duration = ?snapshot.duration, "operation cancelled");
        true
    }

    /// Return to the initial state, dropping timers and the retry history.
    pub fn reset(&self) {
        let (release_global, snapshot) = {
            let mut inner = self.lock();
            inner.generation += 1;
            if let Some(timer) = inner.timer.take() {
                timer.cancel();
            }
            inner.last_fn = None;
            inner.retry.reset();
            inner.state = OperationState::default();
            (std::mem::take(&mut inner.holds_global), inner.state.clone())
        };
        self.release_global(release_global);
        self.subscribers.notify(&snapshot);
    }

    pub fn state(&self) -> OperationState<T, E> {
        self.lock().state.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().state.is_loading
    }

    pub fn data(&self) -> Option<T> {
        self.lock().state.data.clone()
    }

    pub fn error(&self) -> Option<OperationError<E>> {
        self.lock().state.error.clone()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.lock().state.duration
    }

    pub fn is_timed_out(&self) -> bool {
        self.lock().state.is_timed_out
    }

    pub fn retry_count(&self) -> u32 {
        self.lock().retry.retry_count
    }

    pub fn can_retry(&self) -> bool {
        let inner = self.lock();
        inner.last_fn.is_some() && inner.retry.can_retry()
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&OperationState<T, E>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscribers.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    async fn run(&self, op: OperationFn<T, E>, is_retry: bool) -> Result<T, OperationError<E>> {
        let execution_id = Uuid::new_v4();
        let timeout = self.options.effective_timeout();
        let disarm = CancellationToken::new();

        let (generation, start, acquire_global, snapshot) = {
            let mut inner = self.lock();
            inner.generation += 1;
            if let Some(previous) = inner.timer.replace(disarm.clone()) {
                previous.cancel();
            }
            inner.last_fn = Some(Arc::clone(&op));
            let start = self.clock.now();
            inner.state = OperationState {
                is_loading: true,
                start_time: Some(start),
                retry_count: inner.retry.retry_count,
                ..OperationState::default()
            };
            let acquire = self.options.show_global_loader
                && self.global.is_some()
                && !inner.holds_global;
            if acquire {
                inner.holds_global = true;
            }
            (inner.generation, start, acquire, inner.state.clone())
        };
        if acquire_global {
            if let Some(global) = &self.global {
                global.begin();
            }
        }
        self.subscribers.notify(&snapshot);
        debug!(%execution_id, is_retry, timeout = ?timeout, "operation started");

        let mut guard = SettleGuard {
            op: self,
            generation,
            start,
            armed: true,
        };
        let outcome = tokio::select! {
            biased;
            result = op() => result.map_err(OperationError::Failed),
            _ = deadline(self.clock.as_ref(), timeout, &disarm) => Err(OperationError::Timeout {
                timeout: timeout.unwrap_or_default(),
            }),
        };
        disarm.cancel();
        guard.armed = false;

        let now = self.clock.now();
        let settled = {
            let mut inner = self.lock();
            if inner.generation != generation {
                None
            } else {
                inner.timer = None;
                inner.state.is_loading = false;
                inner.state.duration = Some(now.duration_since(start));
                match &outcome {
                    Ok(value) => {
                        inner.state.data = Some(value.clone());
                        inner.state.error = None;
                        inner.retry.reset();
                    }
                    Err(err) => {
                        inner.state.data = None;
                        inner.state.error = Some(err.clone());
                        inner.state.is_timed_out = err.is_timeout();
                        if is_retry {
                            let max = inner.retry.max_retries;
                            inner.retry.retry_count = inner.retry.retry_count.saturating_add(1).min(max);
                        }
                    }
                }
                inner.state.retry_count = inner.retry.retry_count;
                Some((std::mem::take(&mut inner.holds_global), inner.state.clone()))
            }
        };

        match settled {
            Some((release_global, snapshot)) => {
                self.release_global(release_global);
                self.subscribers.notify(&snapshot);
                match &outcome {
                    Ok(value) => {
                        debug!(%execution_id, duration = ?snapshot.duration, "operation succeeded");
                        if let Some(callback) = &self.on_success {
                            callback(value);
                        }
                    }
                    Err(err) => {
                        if err.is_timeout() {
                            info!(
                                %execution_id,
                                timeout_ms = timeout.map(|t| t.as_millis() as u64).unwrap_or(0),
                                "operation timed out"
                            );
                        } else {
                            debug!(%execution_id, duration = ?snapshot.duration, "operation failed");
                        }
                        if let Some(callback) = &self.on_error {
                            callback(err);
                        }
                    }
                }
            }
            None => debug!(%execution_id, "superseded operation settled; state untouched"),
        }

        if let Some(callback) = &self.on_finally {
            callback();
        }
        outcome
    }

    /// Settle a call whose future was dropped before it finished. Leaves
    /// data and error as they were.
    fn abandon(&self, generation: u64, start: Instant) {
        let now = self.clock.now();
        let (release_global, snapshot) = {
            let mut inner = self.lock();
            if inner.generation != generation {
                return;
            }
            if let Some(timer) = inner.timer.take() {
                timer.cancel();
            }
            inner.state.is_loading = false;
            inner.state.duration = Some(now.duration_since(start));
            (std::mem::take(&mut inner.holds_global), inner.state.clone())
        };
        self.release_global(release_global);
        self.subscribers.notify(&snapshot);
        debug!(duration = ?snapshot.duration, "operation dropped before settling");
    }

    fn release_global(&self, release: bool) {
        if release {
            if let Some(global) = &self.global {
                global.end();
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T, E>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Settles the state of a call whose future is dropped mid-flight, e.g. by an
/// outer `tokio::time::timeout` or `select!`.
struct SettleGuard<'a, T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    op: &'a AsyncOperation<T, E>,
    generation: u64,
    start: Instant,
    armed: bool,
}

impl<T, E> Drop for SettleGuard<'_, T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn drop(&mut self) {
        if self.armed {
            self.op.abandon(self.generation, self.start);
        }
    }
}

/// Resolves when `timeout` elapses; pends forever when there is no timeout or
/// the timer has been disarmed.
async fn deadline(clock: &dyn Clock, timeout: Option<Duration>, disarm: &CancellationToken) {
    if let Some(t) = timeout {
        tokio::select! {
            _ = clock.sleep(t) => return,
            _ = disarm.cancelled() => {}
        }
    }
    std::future::pending::<()>().await
}
