//! swr-hub - a keyed stale-while-revalidate cache for client-side data sync
//!
//! This library keeps remote resources, identified by opaque string keys,
//! cached in memory and up to date:
//! - Stale-while-revalidate semantics: cached data stays visible while a
//!   refresh runs in the background, including through fetch failures
//! - Request deduplication: at most one fetcher invocation per key at a time
//! - Scheduled and triggered revalidation: on mount, on a recurring interval,
//!   on host focus, on reconnect, with a dedup window against trigger storms
//! - Subscriptions: any number of observers per key, notified synchronously
//!   in commit order
//! - Mutation: optimistic local updates and invalidation, with out-of-order
//!   fetch results discarded via per-key generation counters
//! - Telemetry: every fetch's duration and outcome is reported to a
//!   best-effort sink that never blocks or fails the caller
//!
//! # Example
//!
//! ```ignore
//! use swr_hub::{FnFetcher, HttpTelemetrySink, SwrCache};
//!
//! #[tokio::main]
//! async fn main() {
//!     let cache: SwrCache<serde_json::Value> = SwrCache::builder(FnFetcher::new(
//!         |key: String| async move { fetch_json(&key).await },
//!     ))
//!     .telemetry(HttpTelemetrySink::new("http://127.0.0.1:8000"))
//!     .build();
//!
//!     // Observers render whatever the cache currently holds.
//!     let sub = cache.subscribe("/api/overview", |snap| {
//!         if let Some(data) = &snap.data {
//!             println!("overview: {data}");
//!         } else if snap.is_loading() {
//!             println!("loading...");
//!         }
//!     });
//!
//!     // Optimistic update, confirmed against the source of truth.
//!     cache.mutate_and_revalidate("/api/overview", serde_json::json!({"n": 1}));
//!
//!     sub.unsubscribe();
//! }
//! ```

mod builder;
mod cache;
mod config;
mod entry;
mod error;
mod fetcher;
mod scheduler;
mod store;
mod subscription;
mod telemetry;
mod utils;

// Re-export public API
pub use builder::SwrCacheBuilder;
pub use cache::SwrCache;
pub use config::CacheConfig;
pub use entry::{EntrySnapshot, EntryState};
pub use error::FetchError;
pub use fetcher::{Fetcher, FnFetcher};
pub use subscription::Subscription;
pub use telemetry::{HttpTelemetrySink, NullTelemetrySink, TelemetryEvent, TelemetrySink};
