use chrono::{DateTime, Utc};
use serde::Serialize;
use signalbox_types::ConfidenceLevel;
use std::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// One structured event per pipeline decision.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryEvent {
    pub timestamp: DateTime<Utc>,
    pub session_id: Uuid,
    /// `goal`, `execute`, or `call`.
    pub kind: &'static str,
    pub input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<ConfidenceLevel>,
    pub applied_rules: Vec<String>,
    /// Tool names of the emitted call list, in order.
    pub emitted: Vec<String>,
}

/// Multi-producer, append-only event sink.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: TelemetryEvent);
}

/// Default sink: events become structured tracing records.
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn record(&self, event: TelemetryEvent) {
        let payload = serde_json::to_string(&event).unwrap_or_default();
        info!(target: "signalbox::telemetry", kind = event.kind, %payload, "pipeline decision");
    }
}

/// Test sink that keeps events in memory.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        MemorySink::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().expect("telemetry lock poisoned").clone()
    }
}

impl TelemetrySink for MemorySink {
    fn record(&self, event: TelemetryEvent) {
        self.events.lock().expect("telemetry lock poisoned").push(event);
    }
}
