//! The entry table: the single writer for all cache state.
//!
//! Every commit (fetch settlement, mutation, invalidation) happens inside one
//! synchronous critical section, so subscribers never observe a half-applied
//! update and updates to a key fan out in commit order. Asynchronous
//! suspension points (the fetcher await) are accounted for by a per-key
//! generation counter: a settlement whose captured generation no longer
//! matches lost a race against a newer mutation and is discarded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio::task::JoinHandle;

use crate::config::CacheConfig;
use crate::entry::EntrySnapshot;
use crate::error::FetchError;
use crate::fetcher::Fetcher;
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use crate::utils::now_ms;

/// Observer callback registered for a key.
pub(crate) type Observer<V> = Arc<dyn Fn(&EntrySnapshot<V>) + Send + Sync>;

/// One row of the entry table. Mutated only by [`EntryStore`] methods.
pub(crate) struct EntryRow<V> {
    pub(crate) data: Option<V>,
    pub(crate) error: Option<FetchError>,
    /// Wall-clock resolution time, surfaced in snapshots.
    pub(crate) fetched_at: Option<i64>,
    /// Monotonic resolution time, used for the mount and focus freshness
    /// checks. Tracked separately so the checks follow the runtime clock.
    pub(crate) fetched: Option<Instant>,
    /// Bumped on every committed settlement or mutation. An in-flight fetch
    /// captures it at start; a mismatch at settlement means it was superseded.
    pub(crate) generation: u64,
    /// Present exactly while a fetch for this key is in flight. Doubles as
    /// the deduplication slot: joiners subscribe to the settlement signal.
    pub(crate) in_flight: Option<watch::Sender<bool>>,
    /// Completion time of the last settled fetch, for the dedup window.
    pub(crate) last_settled: Option<Instant>,
    pub(crate) subscribers: HashMap<u64, Observer<V>>,
    /// Interval revalidation timer; installed while subscribed, torn down
    /// when the subscriber count reaches zero.
    pub(crate) interval_task: Option<JoinHandle<()>>,
    /// Pending grace-period teardown; cancelled by a new subscription.
    pub(crate) gc_task: Option<JoinHandle<()>>,
}

impl<V> EntryRow<V> {
    fn new() -> Self {
        EntryRow {
            data: None,
            error: None,
            fetched_at: None,
            fetched: None,
            generation: 0,
            in_flight: None,
            last_settled: None,
            subscribers: HashMap::new(),
            interval_task: None,
            gc_task: None,
        }
    }
}

/// Keyed entry table plus the collaborators every commit needs.
pub(crate) struct EntryStore<V> {
    pub(crate) entries: Mutex<HashMap<String, EntryRow<V>>>,
    pub(crate) fetcher: Arc<dyn Fetcher<V>>,
    pub(crate) sink: Arc<dyn TelemetrySink>,
    pub(crate) config: CacheConfig,
    next_observer_id: AtomicU64,
    /// Handed to spawned timer/GC tasks so they never keep the store alive.
    pub(crate) weak_self: Weak<EntryStore<V>>,
}

impl<V> EntryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        fetcher: Arc<dyn Fetcher<V>>,
        sink: Arc<dyn TelemetrySink>,
        config: CacheConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| EntryStore {
            entries: Mutex::new(HashMap::new()),
            fetcher,
            sink,
            config,
            next_observer_id: AtomicU64::new(0),
            weak_self: weak.clone(),
        })
    }

    /// Lock the table. A poisoned lock means an observer panicked mid-fanout;
    /// the table itself is still consistent (commits are all-or-nothing
    /// relative to the panic point within a single row), so keep serving.
    pub(crate) fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, EntryRow<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot_row(key: &str, row: &EntryRow<V>) -> EntrySnapshot<V> {
        EntrySnapshot {
            key: key.to_string(),
            data: row.data.clone(),
            error: row.error.clone(),
            fetched_at: row.fetched_at,
            is_validating: row.in_flight.is_some(),
        }
    }

    fn fan_out(row: &EntryRow<V>, snap: &EntrySnapshot<V>) {
        for observer in row.subscribers.values() {
            observer(snap);
        }
    }

    /// Current snapshot for `key`, or `None` if the store has no entry.
    pub(crate) fn snapshot(&self, key: &str) -> Option<EntrySnapshot<V>> {
        let entries = self.lock_entries();
        entries.get(key).map(|row| Self::snapshot_row(key, row))
    }

    /// Ensure a row exists for `key` and return its snapshot. Idempotent.
    pub(crate) fn get_or_create(&self, key: &str) -> EntrySnapshot<V> {
        let (snap, unobserved) = {
            let mut entries = self.lock_entries();
            let row = entries.entry(key.to_string()).or_insert_with(EntryRow::new);
            (Self::snapshot_row(key, row), Self::needs_gc(row))
        };
        if unobserved {
            self.arm_gc(key);
        }
        snap
    }

    /// True when the row has nothing keeping it alive: no subscribers, no
    /// fetch in flight, and no teardown already pending.
    fn needs_gc(row: &EntryRow<V>) -> bool {
        row.subscribers.is_empty() && row.in_flight.is_none() && row.gc_task.is_none()
    }

    /// Register an observer for `key`, creating the row if needed. The
    /// observer receives the current snapshot synchronously before this
    /// returns, then every later update in commit order.
    pub(crate) fn subscribe(&self, key: &str, observer: Observer<V>) -> u64 {
        let (id, first) = {
            let mut entries = self.lock_entries();
            let row = entries.entry(key.to_string()).or_insert_with(EntryRow::new);
            if let Some(gc) = row.gc_task.take() {
                gc.abort();
            }
            let first = row.subscribers.is_empty();
            let id = self.next_observer_id.fetch_add(1, Ordering::Relaxed);
            row.subscribers.insert(id, Arc::clone(&observer));
            let snap = Self::snapshot_row(key, row);
            observer(&snap);
            (id, first)
        };
        if first {
            self.install_interval(key);
        }
        id
    }

    /// Remove an observer. Idempotent; unknown ids are ignored. Draining the
    /// subscriber set tears down the interval timer immediately and arms the
    /// grace-period teardown.
    pub(crate) fn unsubscribe(&self, key: &str, id: u64) {
        let drained = {
            let mut entries = self.lock_entries();
            let Some(row) = entries.get_mut(key) else {
                return;
            };
            if row.subscribers.remove(&id).is_none() {
                return;
            }
            if row.subscribers.is_empty() {
                if let Some(task) = row.interval_task.take() {
                    task.abort();
                    tracing::debug!(key, "interval timer torn down");
                }
                true
            } else {
                false
            }
        };
        if drained {
            self.arm_gc(key);
        }
    }

    /// Start a fetch for `key`, or join the one already in flight.
    ///
    /// Returns a receiver that flips to `true` when the fetch settles. At
    /// most one fetcher invocation is outstanding per key: concurrent callers
    /// share the same invocation and its resolution timing.
    pub(crate) fn begin_fetch(&self, key: &str) -> watch::Receiver<bool> {
        let (generation, rx) = {
            let mut entries = self.lock_entries();
            let row = entries.entry(key.to_string()).or_insert_with(EntryRow::new);
            if let Some(in_flight) = &row.in_flight {
                return in_flight.subscribe();
            }
            let (tx, rx) = watch::channel(false);
            row.in_flight = Some(tx);
            let snap = Self::snapshot_row(key, row);
            Self::fan_out(row, &snap);
            (row.generation, rx)
        };

        // The store is reachable through `&self`, so the upgrade holds while
        // we are here; the fetch task takes a strong reference for its own
        // bounded lifetime.
        let Some(store) = self.weak_self.upgrade() else {
            return rx;
        };
        let key = key.to_string();
        tokio::spawn(async move {
            let started = Instant::now();
            let fetcher = Arc::clone(&store.fetcher);
            let fetch_key = key.clone();
            // Run the fetcher on its own task so a panicking adapter still
            // settles the entry as a failure instead of wedging `in_flight`.
            let result = match tokio::spawn(async move { fetcher.fetch(&fetch_key).await }).await {
                Ok(outcome) => outcome,
                Err(err) => Err(FetchError::new(format!("fetcher task failed: {err}"))),
            };
            let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
            store.settle(&key, generation, result, duration_ms);
        });
        rx
    }

    /// Commit a fetch outcome (settlement algorithm):
    /// record the completion time, discard superseded results by generation,
    /// otherwise apply success/failure stale-preservingly, clear the
    /// in-flight slot, fan out, and emit exactly one telemetry event.
    fn settle(
        &self,
        key: &str,
        generation: u64,
        result: Result<V, FetchError>,
        duration_ms: f64,
    ) {
        let success = result.is_ok();
        let arm_teardown = {
            let mut entries = self.lock_entries();
            match entries.get_mut(key) {
                Some(row) => {
                    row.last_settled = Some(Instant::now());
                    if let Some(done) = row.in_flight.take() {
                        let _ = done.send(true);
                    }
                    if row.generation == generation {
                        match result {
                            Ok(value) => {
                                row.data = Some(value);
                                row.error = None;
                                row.fetched_at = Some(now_ms());
                                row.fetched = Some(Instant::now());
                            }
                            Err(err) => {
                                // Stale data stays visible through failures.
                                row.error = Some(err);
                            }
                        }
                        row.generation += 1;
                    } else {
                        tracing::trace!(key, "superseded fetch result discarded");
                    }
                    let snap = Self::snapshot_row(key, row);
                    Self::fan_out(row, &snap);
                    Self::needs_gc(row)
                }
                None => false,
            }
        };
        if arm_teardown {
            self.arm_gc(key);
        }
        self.sink.report(TelemetryEvent::api_latency(
            key,
            duration_ms,
            &self.config.telemetry_path,
            success,
        ));
    }

    /// Imperatively overwrite the entry's data. Clears any recorded error,
    /// bumps the generation so an in-flight fetch's result is discarded, and
    /// fans out before returning.
    pub(crate) fn mutate(&self, key: &str, value: V) {
        let unobserved = {
            let mut entries = self.lock_entries();
            let row = entries.entry(key.to_string()).or_insert_with(EntryRow::new);
            row.data = Some(value);
            row.error = None;
            row.fetched_at = Some(now_ms());
            row.fetched = Some(Instant::now());
            row.generation += 1;
            let snap = Self::snapshot_row(key, row);
            Self::fan_out(row, &snap);
            Self::needs_gc(row)
        };
        // A mutation can create (or land on) an entry nobody observes; arm
        // the teardown so such entries do not accumulate.
        if unobserved {
            self.arm_gc(key);
        }
    }

    /// Expire the entry's freshness without touching its data. The next
    /// mount- or schedule-driven check will refetch; no fetch is started
    /// here.
    pub(crate) fn invalidate(&self, key: &str) {
        let mut entries = self.lock_entries();
        if let Some(row) = entries.get_mut(key) {
            row.fetched_at = None;
            row.fetched = None;
            row.last_settled = None;
            let snap = Self::snapshot_row(key, row);
            Self::fan_out(row, &snap);
        }
    }

    /// Keys that currently have at least one subscriber.
    pub(crate) fn subscribed_keys(&self) -> Vec<String> {
        let entries = self.lock_entries();
        entries
            .iter()
            .filter(|(_, row)| !row.subscribers.is_empty())
            .map(|(key, _)| key.clone())
            .collect()
    }
}
