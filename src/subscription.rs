use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::store::EntryStore;

/// Handle for one observer registration, returned by
/// [`SwrCache::subscribe`](crate::SwrCache::subscribe).
///
/// Dropping the handle unsubscribes; [`unsubscribe`](Subscription::unsubscribe)
/// does the same explicitly and is idempotent. When the last handle for a key
/// goes away, the key's timers stop and its entry is torn down after the
/// configured grace period.
pub struct Subscription<V>
where
    V: Clone + Send + Sync + 'static,
{
    store: Weak<EntryStore<V>>,
    key: String,
    id: u64,
    active: AtomicBool,
}

impl<V> Subscription<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(store: &Arc<EntryStore<V>>, key: &str, id: u64) -> Self {
        Subscription {
            store: Arc::downgrade(store),
            key: key.to_string(),
            id,
            active: AtomicBool::new(true),
        }
    }

    /// The key this subscription observes.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Remove the observer immediately. Safe to call more than once; later
    /// calls (and the eventual drop) are no-ops.
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            if let Some(store) = self.store.upgrade() {
                store.unsubscribe(&self.key, self.id);
            }
        }
    }
}

impl<V> Drop for Subscription<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
