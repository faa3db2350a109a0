mod raw_traffic;
pub mod video;

pub use raw_traffic::{InMemoryRawTrafficSink, RawTrafficSink, TracingRawTrafficSink};
pub use video::{HttpVideoAdapter, VideoProviderAdapter, VideoSegmentRequest, VideoSegmentResponse, VideoProviderStatus};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use gateway_config::ProviderModelRef;
use gateway_types::{
    GroundingMeta, InvocationMode, ProviderFamily, ProviderInvokeError, ProviderInvokeRequest,
    ProviderInvokeResponse, RawTrafficRef, TokenUsage,
};
use reqwest::Client;
use serde_json::json;

/// §4.4 "each adapter implements one method: `invoke(...)`". Implementations
/// must never propagate a recoverable provider failure as `Err` — they
/// encode it in `ProviderInvokeResponse::error` instead so the orchestrator
/// can persist a failure envelope (§7).
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> &str;
    fn family(&self) -> ProviderFamily;
    async fn invoke(&self, request: ProviderInvokeRequest) -> ProviderInvokeResponse;
}

/// One instance per configured vendor (§5 "Provider adapters are stateless;
/// one instance per provider is fine"). Built once at startup from
/// `AppConfig` and never mutated — the map itself is the "immutable struct"
/// referenced in §9.
pub struct ProviderRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    video_adapters: HashMap<String, Arc<dyn VideoProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn from_env() -> Self {
        let mut adapters: HashMap<String, Arc<dyn ProviderAdapter>> = HashMap::new();
        let mut video_adapters: HashMap<String, Arc<dyn VideoProviderAdapter>> = HashMap::new();

        adapters.insert(
            "openai-compatible".to_string(),
            Arc::new(OpenAiCompatibleAdapter::new(
                std::env::var("GATEWAY_CHAT_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                std::env::var("OPENAI_API_KEY").ok(),
            )),
        );
        adapters.insert(
            "search-grounded".to_string(),
            Arc::new(SearchGroundedAdapter::new(
                std::env::var("GATEWAY_SEARCH_BASE_URL")
                    .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".to_string()),
                std::env::var("GOOGLE_API_KEY").ok(),
            )),
        );
        adapters.insert(
            "image-gen".to_string(),
            Arc::new(ImageAdapter::new(
                std::env::var("GATEWAY_IMAGE_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                std::env::var("OPENAI_API_KEY").ok(),
            )),
        );
        video_adapters.insert(
            "video-gen".to_string(),
            Arc::new(HttpVideoAdapter::new(
                std::env::var("GATEWAY_VIDEO_BASE_URL")
                    .unwrap_or_else(|_| "https://api.video-provider.example/v1".to_string()),
                std::env::var("GATEWAY_VIDEO_API_KEY").ok(),
            )),
        );

        Self {
            adapters,
            video_adapters,
        }
    }

    pub fn resolve(&self, provider_model: &ProviderModelRef) -> anyhow::Result<Arc<dyn ProviderAdapter>> {
        self.adapters
            .get(&provider_model.vendor)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no provider adapter registered for vendor `{}`", provider_model.vendor))
    }

    pub fn resolve_video(&self, provider_model: &ProviderModelRef) -> anyhow::Result<Arc<dyn VideoProviderAdapter>> {
        self.video_adapters
            .get(&provider_model.vendor)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no video provider adapter registered for vendor `{}`", provider_model.vendor))
    }
}

fn is_placeholder_api_key(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("x") || trimmed.eq_ignore_ascii_case("placeholder")
}

fn truncate_for_error(input: &str, max_len: usize) -> String {
    if input.len() <= max_len {
        input.to_string()
    } else {
        format!("{}...", &input[..max_len])
    }
}

fn extract_openai_error(value: &serde_json::Value) -> Option<String> {
    value
        .get("error")
        .and_then(|v| v.get("message"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn extract_openai_text(value: &serde_json::Value) -> Option<String> {
    value
        .get("choices")
        .and_then(|v| v.get(0))
        .and_then(|v| v.get("message"))
        .and_then(|v| v.get("content"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn extract_usage(value: &serde_json::Value) -> TokenUsage {
    let usage = value.get("usage").cloned().unwrap_or_default();
    TokenUsage {
        prompt_tokens: usage.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
        candidates_tokens: usage.get("completion_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
        thoughts_tokens: usage.get("reasoning_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
        cached_tokens: usage
            .get("prompt_tokens_details")
            .and_then(|v| v.get("cached_tokens"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0),
        image_count: None,
        video_seconds: None,
    }
}

/// §6 bit-exact grounding-compatibility rule, applied defensively inside the
/// adapter itself (the gate in `gateway-prompts` is expected to have already
/// nulled out `output_schema` upstream for this combination — this is the
/// belt to that suspenders, and the reason both `hasGroundingTools` and
/// `hasResponseSchema` are observable together at the one place that logs
/// the outgoing wire request).
fn structured_output_allowed(family: ProviderFamily, request: &ProviderInvokeRequest) -> bool {
    let has_grounding_tools = !request.tools.is_empty();
    if family == ProviderFamily::SearchGrounded && has_grounding_tools {
        return false;
    }
    request.output_schema.is_some()
}

/// Chat-family adapter: generic OpenAI-compatible `/chat/completions`
/// endpoint.
pub struct OpenAiCompatibleAdapter {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl OpenAiCompatibleAdapter {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !is_placeholder_api_key(k)),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleAdapter {
    fn id(&self) -> &str {
        "openai-compatible"
    }

    fn family(&self) -> ProviderFamily {
        ProviderFamily::Chat
    }

    async fn invoke(&self, request: ProviderInvokeRequest) -> ProviderInvokeResponse {
        let raw_traffic_ref = RawTrafficRef::new();
        let use_structured_output = structured_output_allowed(self.family(), &request);

        let mut body = json!({
            "model": request.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
        });
        if use_structured_output {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": request.output_schema_name.clone().unwrap_or_else(|| "output".to_string()),
                    "schema": request.output_schema.clone().unwrap_or(json!({})),
                }
            });
        } else if matches!(request.mode, InvocationMode::Json) {
            body["response_format"] = json!({"type": "json_object"});
        }

        let mut req = self.client.post(format!("{}/chat/completions", self.base_url)).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await;
        let value = match response {
            Ok(resp) => {
                let status = resp.status();
                match resp.json::<serde_json::Value>().await {
                    Ok(v) if status.is_success() => v,
                    Ok(v) => {
                        let detail = extract_openai_error(&v)
                            .unwrap_or_else(|| format!("provider request failed with status {status}"));
                        return error_response(raw_traffic_ref, "provider_error", &detail, &v.to_string());
                    }
                    Err(err) => {
                        return error_response(raw_traffic_ref, "provider_error", &err.to_string(), "");
                    }
                }
            }
            Err(err) => {
                return error_response(raw_traffic_ref, "provider_error", &err.to_string(), "");
            }
        };

        if let Some(detail) = extract_openai_error(&value) {
            return error_response(raw_traffic_ref, "provider_error", &detail, &value.to_string());
        }

        let Some(text) = extract_openai_text(&value) else {
            return error_response(
                raw_traffic_ref,
                "provider_error",
                "provider returned no completion content",
                &truncate_for_error(&value.to_string(), 500),
            );
        };

        let parsed = if use_structured_output {
            serde_json::from_str::<serde_json::Value>(&text).ok()
        } else {
            None
        };

        ProviderInvokeResponse {
            text,
            parsed,
            usage: extract_usage(&value),
            finish_reason: value
                .get("choices")
                .and_then(|v| v.get(0))
                .and_then(|v| v.get("finish_reason"))
                .and_then(|v| v.as_str())
                .unwrap_or("stop")
                .to_string(),
            grounding_meta: None,
            raw_traffic_ref,
            error: None,
        }
    }
}

/// Search-grounded family adapter. Per the bit-exact gate (§6), this adapter
/// must never request structured output while grounding tools are declared.
pub struct SearchGroundedAdapter {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl SearchGroundedAdapter {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !is_placeholder_api_key(k)),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for SearchGroundedAdapter {
    fn id(&self) -> &str {
        "search-grounded"
    }

    fn family(&self) -> ProviderFamily {
        ProviderFamily::SearchGrounded
    }

    async fn invoke(&self, request: ProviderInvokeRequest) -> ProviderInvokeResponse {
        let raw_traffic_ref = RawTrafficRef::new();
        let has_grounding_tools = !request.tools.is_empty();
        let use_structured_output = structured_output_allowed(self.family(), &request);
        debug_assert!(
            !(has_grounding_tools && use_structured_output),
            "grounding tools and structured output must never both be set"
        );

        let mut body = json!({
            "model": request.model,
            "contents": [{
                "role": "user",
                "parts": [{"text": format!("{}\n\n{}", request.system, request.user)}],
            }],
        });
        if has_grounding_tools {
            body["tools"] = json!([{"googleSearchRetrieval": {}}]);
        } else if use_structured_output {
            body["generationConfig"] = json!({
                "responseMimeType": "application/json",
                "responseSchema": request.output_schema.clone().unwrap_or(json!({})),
            });
        }

        let mut req = self
            .client
            .post(format!("{}/models/{}:generateContent", self.base_url, request.model))
            .json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("x-goog-api-key", key);
        }

        let value = match req.send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<serde_json::Value>().await {
                Ok(v) => v,
                Err(err) => return error_response(raw_traffic_ref, "provider_error", &err.to_string(), ""),
            },
            Ok(resp) => {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                return error_response(
                    raw_traffic_ref,
                    "provider_error",
                    &format!("provider request failed with status {status}"),
                    &truncate_for_error(&text, 500),
                );
            }
            Err(err) => return error_response(raw_traffic_ref, "provider_error", &err.to_string(), ""),
        };

        let text = value
            .get("candidates")
            .and_then(|v| v.get(0))
            .and_then(|v| v.get("content"))
            .and_then(|v| v.get("parts"))
            .and_then(|v| v.get(0))
            .and_then(|v| v.get("text"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        if text.is_empty() {
            return error_response(
                raw_traffic_ref,
                "provider_error",
                "provider returned no completion content",
                &truncate_for_error(&value.to_string(), 500),
            );
        }

        let grounding_meta = value
            .get("candidates")
            .and_then(|v| v.get(0))
            .and_then(|v| v.get("groundingMetadata"))
            .map(|meta| GroundingMeta {
                grounded: true,
                sources: meta
                    .get("groundingChunks")
                    .and_then(|v| v.as_array())
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|c| c.get("web").and_then(|w| w.get("uri")).and_then(|v| v.as_str()))
                            .map(|s| s.to_string())
                            .collect()
                    })
                    .unwrap_or_default(),
            });

        let parsed = if use_structured_output && !has_grounding_tools {
            serde_json::from_str::<serde_json::Value>(&text).ok()
        } else {
            None
        };

        ProviderInvokeResponse {
            text,
            parsed,
            usage: extract_usage(&value),
            finish_reason: "stop".to_string(),
            grounding_meta,
            raw_traffic_ref,
            error: None,
        }
    }
}

/// Image family adapter — one still image per invocation (§3 `imageCount`).
pub struct ImageAdapter {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl ImageAdapter {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !is_placeholder_api_key(k)),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for ImageAdapter {
    fn id(&self) -> &str {
        "image-gen"
    }

    fn family(&self) -> ProviderFamily {
        ProviderFamily::Image
    }

    async fn invoke(&self, request: ProviderInvokeRequest) -> ProviderInvokeResponse {
        let raw_traffic_ref = RawTrafficRef::new();
        let mut req = self.client.post(format!("{}/images/generations", self.base_url)).json(&json!({
            "model": request.model,
            "prompt": request.user,
        }));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let value = match req.send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<serde_json::Value>().await {
                Ok(v) => v,
                Err(err) => return error_response(raw_traffic_ref, "provider_error", &err.to_string(), ""),
            },
            Ok(resp) => {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                return error_response(
                    raw_traffic_ref,
                    "provider_error",
                    &format!("provider request failed with status {status}"),
                    &truncate_for_error(&text, 500),
                );
            }
            Err(err) => return error_response(raw_traffic_ref, "provider_error", &err.to_string(), ""),
        };

        let url = value
            .get("data")
            .and_then(|v| v.get(0))
            .and_then(|v| v.get("url"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        if url.is_empty() {
            return error_response(
                raw_traffic_ref,
                "provider_error",
                "provider returned no image url",
                &truncate_for_error(&value.to_string(), 500),
            );
        }

        ProviderInvokeResponse {
            text: url,
            parsed: None,
            usage: TokenUsage {
                image_count: Some(1),
                ..Default::default()
            },
            finish_reason: "stop".to_string(),
            grounding_meta: None,
            raw_traffic_ref,
            error: None,
        }
    }
}

fn error_response(
    raw_traffic_ref: RawTrafficRef,
    reason: &str,
    message: &str,
    raw_preview: &str,
) -> ProviderInvokeResponse {
    ProviderInvokeResponse {
        text: String::new(),
        parsed: None,
        usage: TokenUsage::default(),
        finish_reason: "error".to_string(),
        grounding_meta: None,
        raw_traffic_ref,
        error: Some(ProviderInvokeError {
            reason: reason.to_string(),
            message: message.to_string(),
            raw_preview: truncate_for_error(raw_preview, 500),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_types::InvocationMode;

    fn request(tools: Vec<String>, output_schema: Option<serde_json::Value>) -> ProviderInvokeRequest {
        ProviderInvokeRequest {
            model: "test-model".to_string(),
            system: "system".to_string(),
            user: "user".to_string(),
            mode: InvocationMode::Json,
            task_type: "suggest".to_string(),
            output_schema,
            output_schema_name: None,
            tools,
            correlation_id: "c1".to_string(),
        }
    }

    #[test]
    fn search_grounded_with_grounding_tools_disables_structured_output() {
        let req = request(vec!["web_search".to_string()], Some(json!({"type": "object"})));
        assert!(!structured_output_allowed(ProviderFamily::SearchGrounded, &req));
    }

    #[test]
    fn search_grounded_without_grounding_tools_honors_output_schema() {
        let req = request(vec![], Some(json!({"type": "object"})));
        assert!(structured_output_allowed(ProviderFamily::SearchGrounded, &req));
    }

    #[test]
    fn chat_family_ignores_grounding_tools_for_the_gate() {
        let req = request(vec!["web_search".to_string()], Some(json!({"type": "object"})));
        assert!(structured_output_allowed(ProviderFamily::Chat, &req));
    }

    #[test]
    fn missing_output_schema_never_requests_structured_output() {
        let req = request(vec![], None);
        assert!(!structured_output_allowed(ProviderFamily::Chat, &req));
    }
}
