use async_trait::async_trait;
use gateway_observability::{emit_event, redact_text, ObservabilityEvent, ProcessKind};
use gateway_types::RawTrafficRef;
use tokio::sync::Mutex;

/// Every adapter call logs its full request/response pair to a side channel
/// (§4.4 "Adapters MUST log a raw-traffic record"), addressed by the
/// `RawTrafficRef` carried on the response. The sink itself is an injected
/// collaborator — a real deployment might ship these to blob storage; this
/// crate only guarantees the call site always has somewhere to write.
#[async_trait]
pub trait RawTrafficSink: Send + Sync {
    async fn record(&self, reference: &RawTrafficRef, request_json: &str, response_json: &str);
}

/// Default sink: writes a redacted summary through `tracing` rather than
/// persisting full payloads, preferring structured log events over ad hoc
/// side files.
pub struct TracingRawTrafficSink;

#[async_trait]
impl RawTrafficSink for TracingRawTrafficSink {
    async fn record(&self, reference: &RawTrafficRef, request_json: &str, response_json: &str) {
        emit_event(
            tracing::Level::INFO,
            ProcessKind::Engine,
            ObservabilityEvent {
                event: "raw_traffic",
                component: "gateway-providers",
                correlation_id: None,
                task_type: None,
                provider_id: None,
                model_id: None,
                status: Some(&reference.0),
                error_code: None,
                detail: Some(&format!(
                    "request={} response={}",
                    redact_text(request_json),
                    redact_text(response_json)
                )),
            },
        );
    }
}

/// Test double that keeps every recorded pair in memory for assertions.
#[derive(Default)]
pub struct InMemoryRawTrafficSink {
    records: Mutex<Vec<(RawTrafficRef, String, String)>>,
}

impl InMemoryRawTrafficSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<(RawTrafficRef, String, String)> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl RawTrafficSink for InMemoryRawTrafficSink {
    async fn record(&self, reference: &RawTrafficRef, request_json: &str, response_json: &str) {
        self.records.lock().await.push((
            reference.clone(),
            request_json.to_string(),
            response_json.to_string(),
        ));
    }
}
