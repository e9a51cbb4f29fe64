use crate::error::FetchError;

/// Lifecycle state of a cache entry, derived from its visible fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Never fetched, nothing in flight.
    Empty,
    /// No data yet, first fetch in flight.
    Validating,
    /// Data present, no recorded failure.
    Resolved,
    /// The most recent fetch failed; any previous data is still served.
    ResolvedStaleError,
}

/// Point-in-time view of a cache entry, delivered to observers on every
/// committed change.
///
/// `data` and `error` reflect the most recent outcome: a successful fetch
/// clears `error`, a failed fetch sets `error` but leaves the previous `data`
/// untouched (stale-while-revalidate).
#[derive(Debug, Clone)]
pub struct EntrySnapshot<V> {
    /// The key this snapshot belongs to.
    pub key: String,
    /// Last successfully fetched value, if any.
    pub data: Option<V>,
    /// Last fetch failure, cleared by the next successful fetch or mutation.
    pub error: Option<FetchError>,
    /// Unix timestamp (ms) of the last successful resolution.
    pub fetched_at: Option<i64>,
    /// True exactly while a fetch for this key is in flight.
    pub is_validating: bool,
}

impl<V> EntrySnapshot<V> {
    /// A snapshot for a key with no entry in the store.
    pub(crate) fn detached(key: &str) -> Self {
        EntrySnapshot {
            key: key.to_string(),
            data: None,
            error: None,
            fetched_at: None,
            is_validating: false,
        }
    }

    /// Derive the entry's lifecycle state.
    pub fn state(&self) -> EntryState {
        if self.error.is_some() {
            EntryState::ResolvedStaleError
        } else if self.data.is_some() {
            EntryState::Resolved
        } else if self.is_validating {
            EntryState::Validating
        } else {
            EntryState::Empty
        }
    }

    /// True while there is nothing to render yet: no data and a fetch in
    /// flight. This is the conventional "show a spinner" condition.
    pub fn is_loading(&self) -> bool {
        self.data.is_none() && self.is_validating
    }

    /// Age of the data in milliseconds relative to `now`, or `None` if the
    /// entry never resolved.
    pub fn age_ms(&self, now: i64) -> Option<i64> {
        self.fetched_at.map(|at| now - at)
    }
}
