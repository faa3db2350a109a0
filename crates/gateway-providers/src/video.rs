use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use gateway_types::{RawTrafficRef, TokenUsage};

use crate::{is_placeholder_api_key, truncate_for_error};

/// §4.3 "while the provider reports `predicting`/`fetching`" — the subset of
/// provider-reported states the Render Controller reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoProviderStatus {
    Predicting,
    Fetching,
    Ready,
    Failed,
}

#[derive(Debug, Clone)]
pub struct VideoSegmentRequest {
    pub model: String,
    pub prompt: String,
    pub seconds: f64,
    /// Set for every segment after the first (§4.3 "submitted as an extension").
    pub extends_handle: Option<String>,
    pub correlation_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSegmentResponse {
    pub handle: String,
    pub status: VideoProviderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    pub usage: TokenUsage,
    pub raw_traffic_ref: RawTrafficRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

/// Distinct from `ProviderAdapter`: video generation is submit-then-poll
/// rather than a single request/response (§4.3), so it gets its own contract.
#[async_trait]
pub trait VideoProviderAdapter: Send + Sync {
    async fn submit_segment(&self, request: VideoSegmentRequest) -> VideoSegmentResponse;
    async fn poll_segment(&self, handle: &str) -> VideoSegmentResponse;
}

/// HTTP-backed adapter using the same bearer-auth, JSON-body, JSON-response
/// shape as the text/image adapters in this crate, pointed at a generic
/// video-generation endpoint that returns `{id, status, videoUrl?}`.
pub struct HttpVideoAdapter {
    pub base_url: String,
    pub api_key: Option<String>,
    client: Client,
}

impl HttpVideoAdapter {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !is_placeholder_api_key(k)),
            client: Client::new(),
        }
    }

    fn parse_response(&self, value: serde_json::Value, raw_traffic_ref: RawTrafficRef) -> VideoSegmentResponse {
        let handle = value
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let status = match value.get("status").and_then(|v| v.as_str()).unwrap_or("predicting") {
            "fetching" => VideoProviderStatus::Fetching,
            "ready" | "succeeded" | "complete" => VideoProviderStatus::Ready,
            "failed" | "error" => VideoProviderStatus::Failed,
            _ => VideoProviderStatus::Predicting,
        };
        let video_url = value
            .get("videoUrl")
            .or_else(|| value.get("video_url"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let error_reason = value
            .get("error")
            .and_then(|v| v.get("message"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let seconds = value.get("seconds").and_then(|v| v.as_f64());
        VideoSegmentResponse {
            handle,
            status,
            video_url,
            usage: TokenUsage {
                video_seconds: seconds,
                ..Default::default()
            },
            raw_traffic_ref,
            error_reason,
        }
    }
}

#[async_trait]
impl VideoProviderAdapter for HttpVideoAdapter {
    async fn submit_segment(&self, request: VideoSegmentRequest) -> VideoSegmentResponse {
        let raw_traffic_ref = RawTrafficRef::new();
        let mut body = json!({
            "model": request.model,
            "prompt": request.prompt,
            "seconds": request.seconds,
        });
        if let Some(handle) = &request.extends_handle {
            body["extends"] = json!(handle);
        }

        let mut req = self.client.post(format!("{}/videos", self.base_url)).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        match req.send().await {
            Ok(resp) => {
                let status = resp.status();
                match resp.json::<serde_json::Value>().await {
                    Ok(value) if status.is_success() => self.parse_response(value, raw_traffic_ref),
                    Ok(value) => VideoSegmentResponse {
                        handle: String::new(),
                        status: VideoProviderStatus::Failed,
                        video_url: None,
                        usage: TokenUsage::default(),
                        raw_traffic_ref,
                        error_reason: Some(truncate_for_error(&value.to_string(), 300)),
                    },
                    Err(err) => VideoSegmentResponse {
                        handle: String::new(),
                        status: VideoProviderStatus::Failed,
                        video_url: None,
                        usage: TokenUsage::default(),
                        raw_traffic_ref,
                        error_reason: Some(err.to_string()),
                    },
                }
            }
            Err(err) => VideoSegmentResponse {
                handle: String::new(),
                status: VideoProviderStatus::Failed,
                video_url: None,
                usage: TokenUsage::default(),
                raw_traffic_ref,
                error_reason: Some(err.to_string()),
            },
        }
    }

    async fn poll_segment(&self, handle: &str) -> VideoSegmentResponse {
        let raw_traffic_ref = RawTrafficRef::new();
        let mut req = self.client.get(format!("{}/videos/{}", self.base_url, handle));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        match req.send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<serde_json::Value>().await {
                Ok(value) => self.parse_response(value, raw_traffic_ref),
                Err(err) => VideoSegmentResponse {
                    handle: handle.to_string(),
                    status: VideoProviderStatus::Failed,
                    video_url: None,
                    usage: TokenUsage::default(),
                    raw_traffic_ref,
                    error_reason: Some(err.to_string()),
                },
            },
            Ok(resp) => VideoSegmentResponse {
                handle: handle.to_string(),
                status: VideoProviderStatus::Failed,
                video_url: None,
                usage: TokenUsage::default(),
                raw_traffic_ref,
                error_reason: Some(format!("poll failed with status {}", resp.status())),
            },
            Err(err) => VideoSegmentResponse {
                handle: handle.to_string(),
                status: VideoProviderStatus::Failed,
                video_url: None,
                usage: TokenUsage::default(),
                raw_traffic_ref,
                error_reason: Some(err.to_string()),
            },
        }
    }
}
