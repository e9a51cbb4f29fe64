//! Builder API for wiring a cache's fetcher, telemetry sink, and config.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::SwrCache;
use crate::config::CacheConfig;
use crate::fetcher::Fetcher;
use crate::store::EntryStore;
use crate::telemetry::{NullTelemetrySink, TelemetrySink};

/// Builder for [`SwrCache`].
///
/// # Example
/// ```ignore
/// let cache: SwrCache<Overview> = SwrCache::builder(FnFetcher::new(fetch_overview))
///     .telemetry(HttpTelemetrySink::new("http://127.0.0.1:8000"))
///     .refresh_interval(Some(Duration::from_secs(600)))
///     .telemetry_path("/dashboard")
///     .build();
/// ```
pub struct SwrCacheBuilder<V>
where
    V: Clone + Send + Sync + 'static,
{
    fetcher: Arc<dyn Fetcher<V>>,
    sink: Arc<dyn TelemetrySink>,
    config: CacheConfig,
}

impl<V> SwrCacheBuilder<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Start from a fetcher, the default config, and no telemetry.
    pub fn new(fetcher: impl Fetcher<V> + 'static) -> Self {
        SwrCacheBuilder {
            fetcher: Arc::new(fetcher),
            sink: Arc::new(NullTelemetrySink),
            config: CacheConfig::default(),
        }
    }

    /// Report fetch outcomes (and host-submitted web vitals) to this sink.
    pub fn telemetry(mut self, sink: impl TelemetrySink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// Replace the whole configuration at once.
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Recurring background refresh period, `None` to disable.
    pub fn refresh_interval(mut self, interval: Option<Duration>) -> Self {
        self.config.refresh_interval = interval;
        self
    }

    /// Window after a completed fetch in which trigger-driven revalidations
    /// are coalesced.
    pub fn dedup_window(mut self, window: Duration) -> Self {
        self.config.dedup_window = window;
        self
    }

    /// Whether a new subscription runs the mount revalidation check.
    pub fn revalidate_on_mount(mut self, enabled: bool) -> Self {
        self.config.revalidate_on_mount = enabled;
        self
    }

    /// On mount, skip the refetch for data younger than this.
    pub fn mount_max_age(mut self, max_age: Duration) -> Self {
        self.config.mount_max_age = max_age;
        self
    }

    /// Whether the host's focus signal revalidates subscribed keys.
    pub fn revalidate_on_focus(mut self, enabled: bool) -> Self {
        self.config.revalidate_on_focus = enabled;
        self
    }

    /// On focus, only refetch entries older than this.
    pub fn focus_debounce(mut self, debounce: Duration) -> Self {
        self.config.focus_debounce = debounce;
        self
    }

    /// Whether the host's reconnect signal revalidates subscribed keys.
    pub fn revalidate_on_reconnect(mut self, enabled: bool) -> Self {
        self.config.revalidate_on_reconnect = enabled;
        self
    }

    /// How long an unobserved entry survives before teardown.
    pub fn gc_grace(mut self, grace: Duration) -> Self {
        self.config.gc_grace = grace;
        self
    }

    /// Context string attached to api-latency telemetry.
    pub fn telemetry_path(mut self, path: impl Into<String>) -> Self {
        self.config.telemetry_path = path.into();
        self
    }

    /// Build the cache.
    pub fn build(self) -> SwrCache<V> {
        let store = EntryStore::new(self.fetcher, self.sink, self.config);
        SwrCache::from_store(store)
    }
}
