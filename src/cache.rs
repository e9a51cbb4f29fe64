use std::sync::Arc;

use crate::builder::SwrCacheBuilder;
use crate::entry::EntrySnapshot;
use crate::fetcher::Fetcher;
use crate::scheduler::Trigger;
use crate::store::{EntryStore, Observer};
use crate::subscription::Subscription;
use crate::telemetry::TelemetrySink;

/// Keyed stale-while-revalidate cache.
///
/// One fetcher serves every key; results are cached per key, concurrent
/// requests for the same key are deduplicated, and subscribed keys are
/// revalidated on a schedule and on host focus/reconnect signals. Every
/// fetch outcome is reported to the configured telemetry sink.
///
/// Cloning is cheap and shares the underlying entry table.
///
/// Observer callbacks run inside the cache's critical section so every
/// subscriber of a key sees updates in commit order. Do not call back into
/// the cache from inside an observer; hand the snapshot off instead.
///
/// # Example
/// ```ignore
/// let cache: SwrCache<Overview> = SwrCache::builder(FnFetcher::new(fetch_overview))
///     .telemetry(HttpTelemetrySink::new("http://127.0.0.1:8000"))
///     .build();
///
/// let sub = cache.subscribe("overview", |snap| render(snap));
/// ```
pub struct SwrCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    store: Arc<EntryStore<V>>,
}

impl<V> Clone for SwrCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        SwrCache {
            store: Arc::clone(&self.store),
        }
    }
}

impl<V> SwrCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Start building a cache around the given fetcher.
    pub fn builder(fetcher: impl Fetcher<V> + 'static) -> SwrCacheBuilder<V> {
        SwrCacheBuilder::new(fetcher)
    }

    /// Create a cache with the default configuration and no telemetry.
    pub fn new(fetcher: impl Fetcher<V> + 'static) -> Self {
        SwrCacheBuilder::new(fetcher).build()
    }

    pub(crate) fn from_store(store: Arc<EntryStore<V>>) -> Self {
        SwrCache { store }
    }

    /// Register an observer for `key`.
    ///
    /// The observer immediately receives the current snapshot (cached data is
    /// delivered without a stale flash), then every subsequent update for the
    /// key, synchronously and in commit order. Subscribing also runs the
    /// mount revalidation check.
    pub fn subscribe<F>(&self, key: &str, observer: F) -> Subscription<V>
    where
        F: Fn(&EntrySnapshot<V>) + Send + Sync + 'static,
    {
        let observer: Observer<V> = Arc::new(observer);
        let id = self.store.subscribe(key, observer);
        if self.store.config.revalidate_on_mount {
            self.store.revalidate(key, Trigger::Mount);
        }
        Subscription::new(&self.store, key, id)
    }

    /// Current snapshot for `key` without subscribing, or `None` if the
    /// store has no entry for it.
    pub fn get(&self, key: &str) -> Option<EntrySnapshot<V>> {
        self.store.snapshot(key)
    }

    /// Ensure an entry exists for `key` and return its snapshot. Idempotent.
    pub fn entry(&self, key: &str) -> EntrySnapshot<V> {
        self.store.get_or_create(key)
    }

    /// Optimistic local update: overwrite the cached data, clear any recorded
    /// error, and fan out to all subscribers before returning. A fetch in
    /// flight for this key is superseded; its result will be discarded.
    pub fn mutate(&self, key: &str, value: V) {
        self.store.mutate(key, value);
    }

    /// [`mutate`](SwrCache::mutate), then immediately refetch to confirm
    /// against the source of truth.
    pub fn mutate_and_revalidate(&self, key: &str, value: V) {
        self.store.mutate(key, value);
        let _ = self.store.begin_fetch(key);
    }

    /// Expire the entry's freshness without changing its data. The next
    /// mount- or schedule-driven check refetches; no fetch starts here.
    pub fn invalidate(&self, key: &str) {
        self.store.invalidate(key);
    }

    /// Force a fetch for `key` (joining one already in flight, bypassing the
    /// dedup window otherwise) and wait for it to settle.
    pub async fn refresh(&self, key: &str) -> EntrySnapshot<V> {
        let mut rx = self.store.begin_fetch(key);
        // A closed channel means the entry settled and was already torn down.
        let _ = rx.wait_for(|done| *done).await;
        self.store
            .snapshot(key)
            .unwrap_or_else(|| EntrySnapshot::detached(key))
    }

    /// Host signal: foreground focus regained. Revalidates subscribed keys
    /// subject to the focus debounce. Without focus/reconnect signals the
    /// cache degrades to interval-only revalidation.
    pub fn handle_focus(&self) {
        self.store.handle_focus();
    }

    /// Host signal: connectivity restored. Revalidates all subscribed keys
    /// without a freshness check.
    pub fn handle_reconnect(&self) {
        self.store.handle_reconnect();
    }

    /// The telemetry sink, shared so the host can report page-level metrics
    /// (web vitals) through the same channel as fetch latency.
    pub fn telemetry(&self) -> Arc<dyn TelemetrySink> {
        Arc::clone(&self.store.sink)
    }
}
