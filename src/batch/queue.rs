//! Queued operation runners.

use crate::error::OperationError;
use crate::operation::{AsyncOperation, OperationOptions, OperationState, StateStore, SubscriptionId};
use futures::future::{join_all, BoxFuture, FutureExt};
use serde::Serialize;
use std::convert::Infallible;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

type QueuedFn<T, E> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

/// Per-position results of a queue run.
///
/// Both vectors have one slot per queued operation, in queue order. A slot
/// holds either a result or an error, never both.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueOutcome<T, E> {
    pub results: Vec<Option<T>>,
    pub errors: Vec<Option<E>>,
}

impl<T, E> QueueOutcome<T, E> {
    fn with_len(len: usize) -> Self {
        Self {
            results: std::iter::repeat_with(|| None).take(len).collect(),
            errors: std::iter::repeat_with(|| None).take(len).collect(),
        }
    }

    fn record(&mut self, index: usize, result: Result<T, E>) {
        match result {
            Ok(value) => self.results[index] = Some(value),
            Err(err) => self.errors[index] = Some(err),
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_some()).count()
    }

    pub fn error_count(&self) -> usize {
        self.errors.iter().filter(|e| e.is_some()).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.error_count() == 0
    }
}

/// Progress of the current or last queue run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueProgress {
    pub total: usize,
    /// Position of the operation currently running (sequential runs only).
    pub current_index: usize,
    pub completed: usize,
    pub errors: usize,
    pub is_running: bool,
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Queue storage, progress and the operation that tracks a whole run.
struct QueueCore<T, E> {
    items: Mutex<Vec<QueuedFn<T, E>>>,
    progress: Arc<StateStore<QueueProgress>>,
    operation: AsyncOperation<QueueOutcome<T, E>, Infallible>,
}

impl<T, E> QueueCore<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn new(options: OperationOptions) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            progress: Arc::new(StateStore::new(QueueProgress::default())),
            operation: AsyncOperation::new(options),
        }
    }

    fn push<F, Fut>(&self, f: F) -> usize
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let mut items = self.lock();
        items.push(Arc::new(move || f().boxed()));
        items.len()
    }

    fn snapshot(&self) -> Arc<Vec<QueuedFn<T, E>>> {
        Arc::new(self.lock().clone())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<QueuedFn<T, E>>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Runs queued operations one at a time, in order.
///
/// A failing operation does not stop the run; its error is recorded at its
/// position and the next operation starts once it has settled.
pub struct SequentialRunner<T, E> {
    core: QueueCore<T, E>,
}

impl<T, E> SequentialRunner<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// `options` apply to the run as a whole, e.g. its timeout.
    pub fn new(options: OperationOptions) -> Self {
        Self {
            core: QueueCore::new(options),
        }
    }

    /// Append an operation, returning the new queue length.
    pub fn add_to_queue<F, Fut>(&self, f: F) -> usize
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.core.push(f)
    }

    pub async fn execute_queue(&self) -> Result<QueueOutcome<T, E>, OperationError<Infallible>> {
        let items = self.core.snapshot();
        let progress = Arc::clone(&self.core.progress);
        self.core
            .operation
            .execute(move || {
                let items = Arc::clone(&items);
                let progress = Arc::clone(&progress);
                async move { Ok(run_sequential(&items, &progress).await) }
            })
            .await
    }

    pub fn clear_queue(&self) {
        self.core.lock().clear();
    }

    pub fn queue_len(&self) -> usize {
        self.core.lock().len()
    }

    pub fn is_running(&self) -> bool {
        self.core.operation.is_loading()
    }

    /// `current_index / total * 100`.
    pub fn progress(&self) -> f64 {
        let p = self.core.progress.get_state();
        percent(p.current_index, p.total)
    }

    pub fn progress_state(&self) -> QueueProgress {
        self.core.progress.get_state()
    }

    pub fn subscribe_progress(
        &self,
        listener: impl Fn(&QueueProgress) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.core.progress.subscribe(listener)
    }

    /// Loading state of the whole run.
    pub fn state(&self) -> OperationState<QueueOutcome<T, E>, Infallible> {
        self.core.operation.state()
    }
}

impl<T, E> Default for SequentialRunner<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(OperationOptions::new().without_timeout())
    }
}

async fn run_sequential<T, E>(
    items: &[QueuedFn<T, E>],
    progress: &StateStore<QueueProgress>,
) -> QueueOutcome<T, E> {
    let total = items.len();
    progress.update(|p| {
        *p = QueueProgress {
            total,
            is_running: true,
            ..QueueProgress::default()
        }
    });

    let mut outcome = QueueOutcome::with_len(total);
    for (index, item) in items.iter().enumerate() {
        progress.update(|p| p.current_index = index);
        let result = item().await;
        let failed = result.is_err();
        outcome.record(index, result);
        progress.update(|p| {
            p.completed += 1;
            if failed {
                p.errors += 1;
            }
        });
    }

    progress.update(|p| {
        p.current_index = total;
        p.is_running = false;
    });
    debug!(total, failed = outcome.error_count(), "sequential queue finished");
    outcome
}

/// Runs queued operations concurrently and waits for all of them.
///
/// One operation failing does not cancel the others. Outcomes are stored by
/// queue position regardless of completion order.
pub struct ParallelRunner<T, E> {
    core: QueueCore<T, E>,
}

impl<T, E> ParallelRunner<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(options: OperationOptions) -> Self {
        Self {
            core: QueueCore::new(options),
        }
    }

    pub fn add_operation<F, Fut>(&self, f: F) -> usize
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.core.push(f)
    }

    pub async fn execute_all(&self) -> Result<QueueOutcome<T, E>, OperationError<Infallible>> {
        let items = self.core.snapshot();
        let progress = Arc::clone(&self.core.progress);
        self.core
            .operation
            .execute(move || {
                let items = Arc::clone(&items);
                let progress = Arc::clone(&progress);
                async move { Ok(run_parallel(&items, &progress).await) }
            })
            .await
    }

    pub fn clear_queue(&self) {
        self.core.lock().clear();
    }

    pub fn queue_len(&self) -> usize {
        self.core.lock().len()
    }

    pub fn is_running(&self) -> bool {
        self.core.operation.is_loading()
    }

    pub fn completed_count(&self) -> usize {
        self.core.progress.get_state().completed
    }

    pub fn error_count(&self) -> usize {
        self.core.progress.get_state().errors
    }

    /// `completed / total * 100`.
    pub fn progress(&self) -> f64 {
        let p = self.core.progress.get_state();
        percent(p.completed, p.total)
    }

    pub fn progress_state(&self) -> QueueProgress {
        self.core.progress.get_state()
    }

    pub fn subscribe_progress(
        &self,
        listener: impl Fn(&QueueProgress) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.core.progress.subscribe(listener)
    }

    pub fn state(&self) -> OperationState<QueueOutcome<T, E>, Infallible> {
        self.core.operation.state()
    }
}

impl<T, E> Default for ParallelRunner<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(OperationOptions::new().without_timeout())
    }
}

async fn run_parallel<T, E>(
    items: &[QueuedFn<T, E>],
    progress: &StateStore<QueueProgress>,
) -> QueueOutcome<T, E> {
    let total = items.len();
    progress.update(|p| {
        *p = QueueProgress {
            total,
            is_running: true,
            ..QueueProgress::default()
        }
    });

    let settled = join_all(items.iter().enumerate().map(|(index, item)| {
        let fut = item();
        async move {
            let result = fut.await;
            let failed = result.is_err();
            progress.update(|p| {
                p.completed += 1;
                if failed {
                    p.errors += 1;
                }
            });
            (index, result)
        }
    }))
    .await;

    let mut outcome = QueueOutcome::with_len(total);
    for (index, result) in settled {
        outcome.record(index, result);
    }
    progress.update(|p| p.is_running = false);
    debug!(total, failed = outcome.error_count(), "parallel queue finished");
    outcome
}
