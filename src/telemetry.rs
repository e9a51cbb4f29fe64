//! Best-effort telemetry for fetch outcomes and page-level metrics.
//!
//! Every settled fetch produces one api-latency event; the host application
//! can push its own page-level measurements (web vitals) through the same
//! sink. Delivery is fire-and-forget: a sink must never block the caller,
//! and a failed delivery is logged locally and swallowed.

use serde::Serialize;
use std::sync::Arc;

use crate::utils::now_ms;

/// Closed telemetry schema, one variant per metric kind.
///
/// Serializes with a `metric_type` tag and snake_case field names, matching
/// the backend's ingestion endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "metric_type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// One network call settled: which key, how long it took, whether it
    /// succeeded. Emitted for every fetcher invocation, including results
    /// that were superseded and discarded.
    ApiLatency {
        endpoint: String,
        duration_ms: f64,
        path: String,
        success: bool,
        timestamp_ms: i64,
    },
    /// A page-level paint/interactivity measurement reported by the host.
    WebVital {
        name: String,
        value: f64,
        id: Option<String>,
        label: Option<String>,
        path: String,
        timestamp_ms: i64,
    },
}

impl TelemetryEvent {
    /// Build an api-latency event stamped with the current time.
    pub fn api_latency(endpoint: &str, duration_ms: f64, path: &str, success: bool) -> Self {
        TelemetryEvent::ApiLatency {
            endpoint: endpoint.to_string(),
            duration_ms,
            path: path.to_string(),
            success,
            timestamp_ms: now_ms(),
        }
    }

    /// Build a web-vital event stamped with the current time.
    pub fn web_vital(
        name: &str,
        value: f64,
        id: Option<String>,
        label: Option<String>,
        path: &str,
    ) -> Self {
        TelemetryEvent::WebVital {
            name: name.to_string(),
            value,
            id,
            label,
            path: path.to_string(),
            timestamp_ms: now_ms(),
        }
    }
}

/// Receiver for telemetry events.
///
/// `report` runs on the hot path of fetch settlement, so implementations
/// must return immediately (buffer, spawn, or drop). They must never panic
/// and never surface delivery errors to the caller.
pub trait TelemetrySink: Send + Sync {
    /// Accept one event, best-effort.
    fn report(&self, event: TelemetryEvent);
}

/// Sink that discards every event. The default when no sink is configured.
pub struct NullTelemetrySink;

impl TelemetrySink for NullTelemetrySink {
    fn report(&self, _event: TelemetryEvent) {}
}

/// Sink that POSTs each event as JSON to a telemetry backend.
///
/// Each delivery runs on a detached task so an in-progress send never delays
/// the cache. An unreachable backend only produces a local warning.
pub struct HttpTelemetrySink {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTelemetrySink {
    /// Create a sink POSTing to `{base_url}/api/telemetry/{api-latency,web-vitals}`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        HttpTelemetrySink {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn endpoint(&self, event: &TelemetryEvent) -> String {
        match event {
            TelemetryEvent::ApiLatency { .. } => {
                format!("{}/api/telemetry/api-latency", self.base_url)
            }
            TelemetryEvent::WebVital { .. } => {
                format!("{}/api/telemetry/web-vitals", self.base_url)
            }
        }
    }
}

impl TelemetrySink for HttpTelemetrySink {
    fn report(&self, event: TelemetryEvent) {
        let url = self.endpoint(&event);
        let client = self.client.clone();
        // Outside a runtime there is nowhere to send from; dropping the event
        // is the contract (telemetry loss must not become a caller error).
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = client.post(&url).json(&event).send().await {
                        tracing::warn!(%url, error = %err, "telemetry delivery failed");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(%url, "telemetry dropped: no async runtime");
            }
        }
    }
}

/// Convenience for sharing one sink between the cache and host code that
/// reports web vitals.
impl<S: TelemetrySink + ?Sized> TelemetrySink for Arc<S> {
    fn report(&self, event: TelemetryEvent) {
        (**self).report(event);
    }
}
