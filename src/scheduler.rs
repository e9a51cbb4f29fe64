//! Revalidation scheduling: interval timers, focus/reconnect sweeps, the
//! dedup window, and grace-period teardown of unobserved entries.
//!
//! The scheduler never writes entry state itself. Every refetch it decides on
//! goes through [`EntryStore::begin_fetch`], preserving the single-writer
//! discipline; the only fields it owns are the per-row task handles.

use tokio::time::{Instant, MissedTickBehavior};

use crate::store::EntryStore;

/// What prompted a revalidation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trigger {
    /// A new subscription arrived.
    Mount,
    /// The per-key refresh timer ticked.
    Interval,
    /// The host regained foreground focus.
    Focus,
    /// Connectivity came back after an offline period.
    Reconnect,
}

impl<V> EntryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Trigger-driven revalidation. Applies the dedup window and the
    /// per-trigger freshness checks, then starts (or joins) a fetch.
    pub(crate) fn revalidate(&self, key: &str, trigger: Trigger) {
        let now = Instant::now();
        {
            let entries = self.lock_entries();
            if let Some(row) = entries.get(key) {
                // Already in flight: the eventual settlement covers this
                // trigger too.
                if row.in_flight.is_some() {
                    return;
                }
                // Trigger storms within the dedup window reuse the most
                // recent result instead of issuing a new call.
                if let Some(settled) = row.last_settled {
                    if now - settled < self.config.dedup_window {
                        tracing::trace!(key, ?trigger, "revalidation coalesced by dedup window");
                        return;
                    }
                }
                match trigger {
                    Trigger::Mount => {
                        let max_age = self.config.mount_max_age;
                        if let Some(fetched) = row.fetched {
                            // max_age of zero means always revalidate on mount.
                            if !max_age.is_zero() && now - fetched <= max_age {
                                return;
                            }
                        }
                    }
                    Trigger::Focus => {
                        let debounce = self.config.focus_debounce;
                        if let Some(fetched) = row.fetched {
                            if !debounce.is_zero() && now - fetched < debounce {
                                return;
                            }
                        }
                    }
                    // Interval ticks and reconnects carry no freshness check.
                    Trigger::Interval | Trigger::Reconnect => {}
                }
            }
        }
        let _ = self.begin_fetch(key);
    }

    /// Host signal: the application regained foreground focus. Revalidates
    /// all subscribed keys, subject to the focus debounce.
    pub(crate) fn handle_focus(&self) {
        if !self.config.revalidate_on_focus {
            return;
        }
        for key in self.subscribed_keys() {
            self.revalidate(&key, Trigger::Focus);
        }
    }

    /// Host signal: connectivity restored. Revalidates all subscribed keys
    /// regardless of freshness.
    pub(crate) fn handle_reconnect(&self) {
        if !self.config.revalidate_on_reconnect {
            return;
        }
        for key in self.subscribed_keys() {
            self.revalidate(&key, Trigger::Reconnect);
        }
    }

    /// Install the recurring refresh timer for `key`. Called on the 0 -> 1
    /// subscriber transition; exactly one timer exists per subscribed key.
    pub(crate) fn install_interval(&self, key: &str) {
        let Some(period) = self.config.refresh_interval else {
            return;
        };
        // The task holds only a weak reference so dropping the cache stops
        // the timers instead of the timers keeping the cache alive.
        let store = self.weak_self.clone();
        let timer_key = key.to_string();
        let handle = tokio::spawn(async move {
            let start = Instant::now() + period;
            let mut timer = tokio::time::interval_at(start, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                timer.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                store.revalidate(&timer_key, Trigger::Interval);
            }
        });

        let mut entries = self.lock_entries();
        match entries.get_mut(key) {
            Some(row) if !row.subscribers.is_empty() => {
                if let Some(old) = row.interval_task.replace(handle) {
                    old.abort();
                }
                tracing::debug!(key, "interval timer installed");
            }
            // Unsubscribed (or collected) between spawn and re-lock.
            _ => handle.abort(),
        }
    }

    /// Arm the grace-period teardown for a key that just lost its last
    /// subscriber. A new subscription before the grace elapses cancels it.
    pub(crate) fn arm_gc(&self, key: &str) {
        let grace = self.config.gc_grace;
        let store = self.weak_self.clone();
        let gc_key = key.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(store) = store.upgrade() {
                store.collect(&gc_key);
            }
        });

        let mut entries = self.lock_entries();
        match entries.get_mut(key) {
            Some(row) => {
                if let Some(old) = row.gc_task.replace(handle) {
                    old.abort();
                }
            }
            None => handle.abort(),
        }
    }

    /// Drop the entry if it is still unobserved. An outstanding fetch keeps
    /// it alive; its settlement re-arms the teardown.
    fn collect(&self, key: &str) {
        let mut entries = self.lock_entries();
        let idle = entries
            .get(key)
            .map(|row| row.subscribers.is_empty() && row.in_flight.is_none())
            .unwrap_or(false);
        if idle {
            entries.remove(key);
            tracing::debug!(key, "entry torn down after grace period");
        }
    }
}
