//! Integration tests for swr-hub: dedup, stale-while-revalidate, mutation
//! supersession, scheduler teardown, and telemetry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use swr_hub::{
    EntrySnapshot, EntryState, FetchError, FnFetcher, HttpTelemetrySink, SwrCache, TelemetryEvent,
    TelemetrySink,
};

// ============================================================================
// Test Types
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
struct Payload {
    value: u64,
}

// ============================================================================
// Recording Sink
// ============================================================================

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingSink {
    fn api_latency_events(&self) -> Vec<(String, bool)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                TelemetryEvent::ApiLatency {
                    endpoint, success, ..
                } => Some((endpoint.clone(), *success)),
                _ => None,
            })
            .collect()
    }
}

impl TelemetrySink for RecordingSink {
    fn report(&self, event: TelemetryEvent) {
        self.events.lock().unwrap().push(event);
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn snapshot_log<V: Clone + Send + Sync + 'static>() -> (
    Arc<Mutex<Vec<EntrySnapshot<V>>>>,
    impl Fn(&EntrySnapshot<V>) + Send + Sync + 'static,
) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let log_clone = Arc::clone(&log);
    (log, move |snap: &EntrySnapshot<V>| {
        log_clone.lock().unwrap().push(snap.clone())
    })
}

// ============================================================================
// End-to-End Scenarios
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_overview_scenario() {
    let sink = Arc::new(RecordingSink::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);

    let cache: SwrCache<Payload> = SwrCache::builder(FnFetcher::new(move |_key: String| {
        let calls = Arc::clone(&calls_clone);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(Payload { value: 42 })
        }
    }))
    .telemetry(Arc::clone(&sink))
    .refresh_interval(None)
    .build();

    let (log, observer) = snapshot_log();
    let _sub = cache.subscribe("overview", observer);

    // Immediately after subscribe: validating, no data yet.
    let snap = cache.get("overview").unwrap();
    assert!(snap.is_validating);
    assert!(snap.data.is_none());
    assert!(snap.is_loading());

    tokio::time::sleep(Duration::from_millis(60)).await;

    let snap = cache.get("overview").unwrap();
    assert_eq!(snap.data, Some(Payload { value: 42 }));
    assert!(!snap.is_validating);
    assert_eq!(snap.state(), EntryState::Resolved);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Exactly one telemetry event, for this key, marked successful.
    assert_eq!(
        sink.api_latency_events(),
        vec![("overview".to_string(), true)]
    );

    // The observer saw the full transition in order.
    let states: Vec<_> = log
        .lock()
        .unwrap()
        .iter()
        .map(|s| (s.data.is_some(), s.is_validating))
        .collect();
    assert_eq!(states, vec![(false, false), (false, true), (true, false)]);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_subscriptions_dedupe() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);

    let cache: SwrCache<String> = SwrCache::builder(FnFetcher::new(move |key: String| {
        let calls = Arc::clone(&calls_clone);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(format!("value:{key}"))
        }
    }))
    .refresh_interval(None)
    .build();

    let (log_a, observer_a) = snapshot_log::<String>();
    let (log_b, observer_b) = snapshot_log::<String>();
    let _sub_a = cache.subscribe("x", observer_a);
    let _sub_b = cache.subscribe("x", observer_b);

    tokio::time::sleep(Duration::from_millis(20)).await;

    // One fetcher call, both observers settled on the same value.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let last_a = log_a.lock().unwrap().last().unwrap().clone();
    let last_b = log_b.lock().unwrap().last().unwrap().clone();
    assert_eq!(last_a.data.as_deref(), Some("value:x"));
    assert_eq!(last_b.data.as_deref(), Some("value:x"));
}

#[tokio::test(start_paused = true)]
async fn test_stale_preservation_through_failure() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_clone = Arc::clone(&attempts);

    let cache: SwrCache<Payload> = SwrCache::builder(FnFetcher::new(move |_key: String| {
        let attempts = Arc::clone(&attempts_clone);
        async move {
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(Payload { value: 1 })
            } else {
                Err(FetchError::new("backend unreachable"))
            }
        }
    }))
    .refresh_interval(None)
    .dedup_window(Duration::ZERO)
    .build();

    let first = cache.refresh("k").await;
    assert_eq!(first.data, Some(Payload { value: 1 }));

    let second = cache.refresh("k").await;
    // Stale-while-error: old data still rendered, error exposed next to it.
    assert_eq!(second.data, Some(Payload { value: 1 }));
    assert_eq!(second.error.as_ref().unwrap().message(), "backend unreachable");
    assert_eq!(second.state(), EntryState::ResolvedStaleError);
}

#[tokio::test(start_paused = true)]
async fn test_mutation_supersedes_in_flight_fetch() {
    let sink = Arc::new(RecordingSink::default());

    let cache: SwrCache<Payload> = SwrCache::builder(FnFetcher::new(|_key: String| async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(Payload { value: 3 })
    }))
    .telemetry(Arc::clone(&sink))
    .refresh_interval(None)
    .build();

    let (_log, observer) = snapshot_log();
    let _sub = cache.subscribe("k", observer);
    assert!(cache.get("k").unwrap().is_validating);

    // Optimistic update while the fetch is in flight: the mutation wins.
    cache.mutate("k", Payload { value: 2 });
    tokio::time::sleep(Duration::from_millis(60)).await;

    let snap = cache.get("k").unwrap();
    assert_eq!(snap.data, Some(Payload { value: 2 }));
    assert!(!snap.is_validating);

    // The discarded settlement still produced its telemetry event.
    assert_eq!(sink.api_latency_events(), vec![("k".to_string(), true)]);
}

#[tokio::test(start_paused = true)]
async fn test_subscriber_teardown_and_remount() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);

    let cache: SwrCache<String> = SwrCache::builder(FnFetcher::new(move |key: String| {
        let calls = Arc::clone(&calls_clone);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(key)
        }
    }))
    .refresh_interval(Some(Duration::from_secs(10)))
    .gc_grace(Duration::from_secs(1))
    .build();

    let (_log, observer) = snapshot_log::<String>();
    let sub = cache.subscribe("k", observer);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    sub.unsubscribe();

    // Past the grace period the entry is gone, and no interval timer is left
    // firing for the key.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(cache.get("k").is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // A fresh subscription starts mount revalidation from scratch.
    let (log, observer) = snapshot_log::<String>();
    let _sub = cache.subscribe("k", observer);
    assert!(log.lock().unwrap().first().unwrap().data.is_none());
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.get("k").unwrap().data.as_deref(), Some("k"));
}

#[tokio::test]
async fn test_unreachable_telemetry_backend_is_harmless() {
    // A sink whose every delivery fails must not raise, block, or corrupt
    // cache state.
    let cache: SwrCache<Payload> = SwrCache::builder(FnFetcher::new(|_key: String| async move {
        Ok(Payload { value: 7 })
    }))
    .telemetry(HttpTelemetrySink::new("http://127.0.0.1:1"))
    .refresh_interval(None)
    .build();

    let snap = cache.refresh("k").await;
    assert_eq!(snap.data, Some(Payload { value: 7 }));
    assert!(snap.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_per_key_update_ordering() {
    let cache: SwrCache<u64> = SwrCache::builder(FnFetcher::new(|_key: String| async move {
        Ok(0_u64)
    }))
    .refresh_interval(None)
    .revalidate_on_mount(false)
    .build();

    let (log_a, observer_a) = snapshot_log::<u64>();
    let (log_b, observer_b) = snapshot_log::<u64>();
    let _sub_a = cache.subscribe("k", observer_a);
    let _sub_b = cache.subscribe("k", observer_b);

    for n in 1..=5 {
        cache.mutate("k", n);
    }

    // Both observers saw every committed value, in commit order.
    let values = |log: &Arc<Mutex<Vec<EntrySnapshot<u64>>>>| -> Vec<Option<u64>> {
        log.lock().unwrap().iter().map(|s| s.data).collect()
    };
    assert_eq!(
        values(&log_a),
        vec![None, Some(1), Some(2), Some(3), Some(4), Some(5)]
    );
    assert_eq!(
        values(&log_b),
        vec![None, Some(1), Some(2), Some(3), Some(4), Some(5)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_then_remount_refetches() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);

    let cache: SwrCache<String> = SwrCache::builder(FnFetcher::new(move |key: String| {
        let calls = Arc::clone(&calls_clone);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(key)
        }
    }))
    .refresh_interval(None)
    .mount_max_age(Duration::from_secs(3600))
    .build();

    {
        let (_log, observer) = snapshot_log::<String>();
        let _sub = cache.subscribe("k", observer);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Within max age a remount is served from cache without a refetch.
    tokio::time::sleep(Duration::from_secs(5)).await;
    {
        let (_log, observer) = snapshot_log::<String>();
        let _sub = cache.subscribe("k", observer);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Invalidation expires the freshness, so the next mount refetches even
    // though the data itself is untouched.
    cache.invalidate("k");
    assert_eq!(cache.get("k").unwrap().data.as_deref(), Some("k"));
    {
        let (_log, observer) = snapshot_log::<String>();
        let _sub = cache.subscribe("k", observer);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_focus_and_reconnect_triggers() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);

    let cache: SwrCache<String> = SwrCache::builder(FnFetcher::new(move |key: String| {
        let calls = Arc::clone(&calls_clone);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(key)
        }
    }))
    .refresh_interval(None)
    .dedup_window(Duration::from_secs(2))
    .build();

    let (_log, observer) = snapshot_log::<String>();
    let _sub = cache.subscribe("k", observer);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Focus right after the fetch: coalesced by the dedup window.
    cache.handle_focus();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Focus after the window: revalidates.
    tokio::time::sleep(Duration::from_secs(3)).await;
    cache.handle_focus();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // Reconnect after the window: revalidates unconditionally.
    tokio::time::sleep(Duration::from_secs(3)).await;
    cache.handle_reconnect();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}
