//! Request de-duplication.

use crate::resilience::RetryExecutor;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::any::Any;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Default retry budget for de-duplicated requests.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

type SharedRequest<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

/// Per-call options for [`RequestDeduplicator::request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    /// Share an in-flight request with concurrent callers of the same key.
    pub cache: bool,
    /// Override the deduplicator's default retry budget.
    pub max_retries: Option<u32>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            cache: true,
            max_retries: None,
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

struct PendingEntry {
    id: u64,
    waiters: usize,
    // Holds a `SharedRequest<T, E>`; the concrete types vary per key.
    future: Box<dyn Any + Send + Sync>,
}

/// Collapses concurrent requests that share a key into one in-flight future.
///
/// - At most one cached request per key is live at a time
/// - Callers joining a live request observe the same settlement
/// - The entry is removed once the request settles, success or final failure
/// - Dropping every caller before settlement drops the request and its entry
pub struct RequestDeduplicator {
    retry: Arc<RetryExecutor>,
    default_max_retries: u32,
    pending: Arc<Mutex<HashMap<String, PendingEntry>>>,
    next_id: AtomicU64,
}

impl RequestDeduplicator {
    pub fn new(retry: Arc<RetryExecutor>) -> Self {
        Self {
            retry,
            default_max_retries: DEFAULT_MAX_RETRIES,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    pub fn retry_executor(&self) -> &Arc<RetryExecutor> {
        &self.retry
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn is_pending(&self, key: &str) -> bool {
        lock(&self.pending).contains_key(key)
    }

    /// Run `request_fn` under `key`, joining an in-flight request when possible.
    pub async fn request<T, E, F, Fut>(
        &self,
        key: &str,
        request_fn: F,
        options: RequestOptions,
    ) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        E: Clone + Display + Send + Sync + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let max_retries = options.max_retries.unwrap_or(self.default_max_retries);

        if !options.cache {
            return self
                .retry
                .execute_with_retry(key, request_fn, max_retries)
                .await;
        }

        let slot = {
            let mut pending = lock(&self.pending);
            match pending.get_mut(key) {
                Some(entry) => match entry.future.downcast_ref::<SharedRequest<T, E>>().cloned() {
                    Some(shared) => {
                        entry.waiters += 1;
                        debug!(key, request_id = entry.id, "joining in-flight request");
                        Slot::Shared(shared, entry.id)
                    }
                    None => Slot::Occupied(request_fn),
                },
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let retry = Arc::clone(&self.retry);
                    let map = Arc::clone(&self.pending);
                    let owned_key = key.to_string();
                    let future: BoxFuture<'static, Result<T, E>> = async move {
                        let result = retry
                            .execute_with_retry(&owned_key, request_fn, max_retries)
                            .await;
                        remove_entry(&map, &owned_key, id);
                        result
                    }
                    .boxed();
                    let shared = future.shared();
                    pending.insert(
                        key.to_string(),
                        PendingEntry {
                            id,
                            waiters: 1,
                            future: Box::new(shared.clone()),
                        },
                    );
                    debug!(key, request_id = id, "starting request");
                    Slot::Shared(shared, id)
                }
            }
        };

        match slot {
            Slot::Shared(shared, id) => {
                let _waiter = WaiterGuard {
                    pending: &self.pending,
                    key,
                    id,
                };
                shared.await
            }
            Slot::Occupied(request_fn) => {
                debug!(key, "in-flight request has a different result type; running uncached");
                self.retry
                    .execute_with_retry(key, request_fn, max_retries)
                    .await
            }
        }
    }
}

enum Slot<T, E, F> {
    Shared(SharedRequest<T, E>, u64),
    Occupied(F),
}

/// One caller waiting on a shared request. The request is only driven while
/// someone polls it, so when the last waiter goes away unsettled the entry is
/// dropped with it and the key becomes free again.
struct WaiterGuard<'a> {
    pending: &'a Mutex<HashMap<String, PendingEntry>>,
    key: &'a str,
    id: u64,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        let abandoned = {
            let mut pending = lock(self.pending);
            let last = match pending.get_mut(self.key) {
                Some(entry) if entry.id == self.id => {
                    entry.waiters = entry.waiters.saturating_sub(1);
                    entry.waiters == 0
                }
                _ => false,
            };
            if last {
                pending.remove(self.key)
            } else {
                None
            }
        };
        if abandoned.is_some() {
            debug!(key = self.key, request_id = self.id, "request abandoned by every caller");
        }
    }
}

fn lock(
    pending: &Mutex<HashMap<String, PendingEntry>>,
) -> std::sync::MutexGuard<'_, HashMap<String, PendingEntry>> {
    pending.lock().unwrap_or_else(|e| e.into_inner())
}

fn remove_entry(pending: &Mutex<HashMap<String, PendingEntry>>, key: &str, id: u64) {
    let mut pending = lock(pending);
    if pending.get(key).map(|e| e.id) == Some(id) {
        pending.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::Backoff;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    fn deduplicator() -> RequestDeduplicator {
        RequestDeduplicator::new(Arc::new(RetryExecutor::new(Backoff::linear(
            Duration::from_millis(100),
        ))))
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_call() {
        let dedup = deduplicator();
        let calls = Arc::new(AtomicU32::new(0));

        let make = |calls: Arc<AtomicU32>| {
            move || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok::<_, String>(vec![1, 2, 3])
                }
            }
        };

        let (a, b) = tokio::join!(
            dedup.request("listings", make(calls.clone()), RequestOptions::default()),
            dedup.request("listings", make(calls.clone()), RequestOptions::default()),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a, Ok(vec![1, 2, 3]));
        assert_eq!(a, b);
        assert_eq!(dedup.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncached_calls_run_independently() {
        let dedup = deduplicator();
        let calls = Arc::new(AtomicU32::new(0));
        let opts = RequestOptions::new().with_cache(false);

        let make = |calls: Arc<AtomicU32>| {
            move || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok::<_, String>(7)
                }
            }
        };

        let (a, b) = tokio::join!(
            dedup.request("profile", make(calls.clone()), opts),
            dedup.request("profile", make(calls.clone()), opts),
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(a, Ok(7));
        assert_eq!(b, Ok(7));
        assert!(!dedup.is_pending("profile"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_failure_reaches_every_caller() {
        let dedup = deduplicator();
        let calls = Arc::new(AtomicU32::new(0));
        let opts = RequestOptions::new().with_max_retries(1);

        let make = |calls: Arc<AtomicU32>| {
            move || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, _>("service unavailable".to_string())
                }
            }
        };

        let (a, b) = tokio::join!(
            dedup.request("messages", make(calls.clone()), opts),
            dedup.request("messages", make(calls.clone()), opts),
        );
        // one initial attempt plus one retry, shared by both callers
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(a, Err("service unavailable".to_string()));
        assert_eq!(a, b);
        assert_eq!(dedup.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settled_key_starts_fresh() {
        let dedup = deduplicator();
        let calls = Arc::new(AtomicU32::new(0));

        for expected in 1..=2u32 {
            let c = calls.clone();
            let value = dedup
                .request(
                    "settings",
                    move || {
                        let c = c.clone();
                        async move { Ok::<_, String>(c.fetch_add(1, Ordering::SeqCst) + 1) }
                    },
                    RequestOptions::default(),
                )
                .await;
            assert_eq!(value, Ok(expected));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mismatched_types_do_not_collide() {
        let dedup = deduplicator();
        let (a, b) = tokio::join!(
            dedup.request(
                "k",
                || async {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok::<u32, String>(1)
                },
                RequestOptions::default(),
            ),
            dedup.request(
                "k",
                || async { Ok::<String, String>("text".to_string()) },
                RequestOptions::default(),
            ),
        );
        assert_eq!(a, Ok(1));
        assert_eq!(b, Ok("text".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_only_caller_frees_key() {
        let dedup = deduplicator();
        let slow = || async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<u32, String>(1)
        };

        let outer = tokio::time::timeout(
            Duration::from_millis(10),
            dedup.request("inbox", slow, RequestOptions::default()),
        )
        .await;
        assert!(outer.is_err());
        assert_eq!(dedup.pending_count(), 0);
        assert!(!dedup.is_pending("inbox"));

        let fresh = dedup
            .request("inbox", || async { Ok::<u32, String>(2) }, RequestOptions::default())
            .await;
        assert_eq!(fresh, Ok(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_caller_keeps_request_alive() {
        let dedup = deduplicator();
        let calls = Arc::new(AtomicU32::new(0));
        let make = |calls: Arc<AtomicU32>| {
            move || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok::<_, String>(5u32)
                }
            }
        };

        let (dropped, kept) = tokio::join!(
            tokio::time::timeout(
                Duration::from_millis(10),
                dedup.request("feed", make(calls.clone()), RequestOptions::default()),
            ),
            dedup.request("feed", make(calls.clone()), RequestOptions::default()),
        );
        assert!(dropped.is_err());
        assert_eq!(kept, Ok(5));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(dedup.pending_count(), 0);
    }
}
