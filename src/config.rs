use std::time::Duration;

/// Revalidation and teardown tuning for a cache instance.
///
/// The defaults match the behavior of a typical dashboard client: always
/// revalidate on mount and focus, refresh every 10 minutes while observed,
/// and coalesce trigger storms within a 2 second window.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Recurring background refresh for keys with at least one subscriber.
    /// `None` disables interval revalidation entirely.
    pub refresh_interval: Option<Duration>,
    /// Trigger-driven revalidations arriving within this window of the last
    /// completed fetch are coalesced into the existing result.
    pub dedup_window: Duration,
    /// Revalidate when a subscription arrives, subject to `mount_max_age`.
    pub revalidate_on_mount: bool,
    /// On mount, data younger than this is considered fresh enough to skip
    /// the refetch. Zero means always revalidate on mount.
    pub mount_max_age: Duration,
    /// React to the host's focus signal.
    pub revalidate_on_focus: bool,
    /// On focus, only refetch entries older than this. Zero means always.
    pub focus_debounce: Duration,
    /// React to the host's reconnect signal (no freshness check).
    pub revalidate_on_reconnect: bool,
    /// How long an entry with zero subscribers survives before its state and
    /// timers are torn down.
    pub gc_grace: Duration,
    /// Context string attached to api-latency telemetry, typically the page
    /// path the cache serves.
    pub telemetry_path: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            refresh_interval: Some(Duration::from_secs(10 * 60)),
            dedup_window: Duration::from_secs(2),
            revalidate_on_mount: true,
            mount_max_age: Duration::ZERO,
            revalidate_on_focus: true,
            focus_debounce: Duration::ZERO,
            revalidate_on_reconnect: true,
            gc_grace: Duration::from_secs(60),
            telemetry_path: "/".to_string(),
        }
    }
}
