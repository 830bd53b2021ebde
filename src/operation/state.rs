//! Observable state holders.
//!
//! UI bindings are external collaborators: they read a snapshot with
//! `state()` and register a callback with `subscribe` to hear about changes.

use crate::error::OperationError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener<S> = Arc<dyn Fn(&S) + Send + Sync>;

/// Registry of state-change listeners.
pub struct Subscribers<S> {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(SubscriptionId, Listener<S>)>>,
}

impl<S> Subscribers<S> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, listener: impl Fn(&S) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every listener with `state`. Listeners run outside the registry lock,
    /// so they may subscribe or unsubscribe re-entrantly.
    pub fn notify(&self, state: &S) {
        let listeners: Vec<Listener<S>> = self.lock().iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener(state);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Listener<S>)>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<S> Default for Subscribers<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// A mutex-guarded value plus its listeners.
pub struct StateStore<S> {
    state: Mutex<S>,
    subscribers: Subscribers<S>,
}

impl<S: Clone> StateStore<S> {
    pub fn new(initial: S) -> Self {
        Self {
            state: Mutex::new(initial),
            subscribers: Subscribers::new(),
        }
    }

    pub fn get_state(&self) -> S {
        self.lock().clone()
    }

    /// Mutate the state, then notify listeners with the new snapshot.
    pub fn update<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let (ret, snapshot) = {
            let mut state = self.lock();
            let ret = f(&mut state);
            (ret, state.clone())
        };
        self.subscribers.notify(&snapshot);
        ret
    }

    pub fn subscribe(&self, listener: impl Fn(&S) + Send + Sync + 'static) -> SubscriptionId {
        self.subscribers.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    fn lock(&self) -> MutexGuard<'_, S> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Snapshot of one runner's lifecycle.
///
/// After settlement at most one of `data` / `error` is set, and `is_loading`
/// is false after every terminal transition.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationState<T, E> {
    pub is_loading: bool,
    pub error: Option<OperationError<E>>,
    pub data: Option<T>,
    pub start_time: Option<Instant>,
    pub duration: Option<Duration>,
    pub is_timed_out: bool,
    pub retry_count: u32,
}

impl<T, E> OperationState<T, E> {
    pub fn is_idle(&self) -> bool {
        !self.is_loading && self.error.is_none() && self.data.is_none() && self.duration.is_none()
    }
}

impl<T, E> Default for OperationState<T, E> {
    fn default() -> Self {
        Self {
            is_loading: false,
            error: None,
            data: None,
            start_time: None,
            duration: None,
            is_timed_out: false,
            retry_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_store_notifies_subscribers() {
        let store = StateStore::new(0u32);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = store.subscribe(move |v| sink.lock().unwrap().push(*v));

        store.update(|v| *v += 1);
        store.update(|v| *v += 2);
        assert_eq!(*seen.lock().unwrap(), vec![1, 3]);

        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.update(|v| *v = 10);
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert_eq!(store.get_state(), 10);
    }

    #[test]
    fn test_listener_may_unsubscribe_itself() {
        let subscribers: Arc<Subscribers<()>> = Arc::new(Subscribers::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let id = {
            let subs = subscribers.clone();
            let calls = calls.clone();
            let slot = slot.clone();
            subscribers.subscribe(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let Some(id) = *slot.lock().unwrap() {
                    subs.unsubscribe(id);
                }
            })
        };
        *slot.lock().unwrap() = Some(id);

        subscribers.notify(&());
        subscribers.notify(&());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(subscribers.is_empty());
    }

    #[test]
    fn test_default_state_is_idle() {
        let state: OperationState<u8, String> = OperationState::default();
        assert!(state.is_idle());
        assert!(!state.is_timed_out);
    }
}
