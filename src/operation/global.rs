use super::state::{StateStore, SubscriptionId};

/// Shared "something is loading" indicator.
///
/// Runners created with `show_global_loader` hold one slot while executing.
/// The indicator is active while any slot is held.
pub struct GlobalLoader {
    store: StateStore<usize>,
}

impl GlobalLoader {
    pub fn new() -> Self {
        Self {
            store: StateStore::new(0),
        }
    }

    pub fn begin(&self) {
        self.store.update(|n| *n += 1);
    }

    pub fn end(&self) {
        self.store.update(|n| *n = n.saturating_sub(1));
    }

    pub fn active_count(&self) -> usize {
        self.store.get_state()
    }

    pub fn is_active(&self) -> bool {
        self.active_count() > 0
    }

    /// Listen to changes of the active count.
    pub fn subscribe(&self, listener: impl Fn(&usize) + Send + Sync + 'static) -> SubscriptionId {
        self.store.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.store.unsubscribe(id)
    }
}

impl Default for GlobalLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_counts_nested_holders() {
        let loader = GlobalLoader::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        loader.subscribe(move |n| sink.lock().unwrap().push(*n));

        loader.begin();
        loader.begin();
        assert!(loader.is_active());
        loader.end();
        assert!(loader.is_active());
        loader.end();
        loader.end();
        assert!(!loader.is_active());
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 1, 0, 0]);
    }
}
