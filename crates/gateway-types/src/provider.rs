use serde::{Deserialize, Serialize};

/// `vendor:model` selector resolved from a task's provider-family mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    #[serde(alias = "providerID")]
    pub provider_id: String,
    #[serde(alias = "modelID")]
    pub model_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub provider_id: String,
    pub display_name: String,
    pub context_window: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub models: Vec<ModelInfo>,
}

/// Provider families referenced by the compatibility gate (§6 bit-exact rule).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderFamily {
    Chat,
    SearchGrounded,
    Image,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationMode {
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub candidates_tokens: u64,
    #[serde(default)]
    pub thoughts_tokens: u64,
    #[serde(default)]
    pub cached_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_seconds: Option<f64>,
}

/// Opaque pointer into the raw-traffic side channel every adapter call logs to (§4.4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTrafficRef(pub String);

impl RawTrafficRef {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for RawTrafficRef {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundingMeta {
    pub grounded: bool,
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Request passed uniformly to every Provider Adapter's `invoke` (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInvokeRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub mode: InvocationMode,
    pub task_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema_name: Option<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    pub correlation_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInvokeError {
    pub reason: String,
    pub message: String,
    pub raw_preview: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInvokeResponse {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed: Option<serde_json::Value>,
    pub usage: TokenUsage,
    pub finish_reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding_meta: Option<GroundingMeta>,
    pub raw_traffic_ref: RawTrafficRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ProviderInvokeError>,
}

impl ProviderInvokeResponse {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
