//! §4.1 step 1 — per-task context schemas. `run_task` looks one of these up by
//! `taskType` and fails closed with `invalid_context` on anything that won't
//! deserialize or is missing a required id.

use serde::Deserialize;

use gateway_types::{ErrorKind, GatewayError};

fn non_empty(field: &str, value: &str) -> Result<(), GatewayError> {
    if value.trim().is_empty() {
        Err(GatewayError::new(
            ErrorKind::InvalidContext,
            format!("`{field}` is required"),
        ))
    } else {
        Ok(())
    }
}

/// §6 request bodies are camelCase (`{taskType, context:{jobId, ...}}`); every
/// context struct below renames to match instead of requiring callers to send
/// the crate's internal snake_case field names.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestContext {
    pub job_id: String,
    #[serde(default)]
    pub visible_field_ids: Vec<String>,
    #[serde(default)]
    pub force_refresh: bool,
    #[serde(default, rename = "_skipLlm")]
    pub skip_llm: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefineContext {
    pub job_id: String,
    #[serde(default)]
    pub force_refresh: bool,
    #[serde(default, rename = "_skipLlm")]
    pub skip_llm: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsContext {
    pub job_id: String,
    #[serde(default)]
    pub force_refresh: bool,
    #[serde(default, rename = "_skipLlm")]
    pub skip_llm: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMasterContext {
    pub job_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetChannelBatchContext {
    pub job_id: String,
    pub channel_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetAdaptContext {
    pub job_id: String,
    pub format_id: String,
    pub channel_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyIntelContext {
    pub company_id: String,
    pub company_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePromptGenerationContext {
    pub job_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageGenerationContext {
    pub job_id: String,
    pub image_prompt: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageCaptionContext {
    pub job_id: String,
    pub image_prompt: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeroImageContext {
    pub job_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateCampaignAssetsContext {
    pub job_id: String,
    pub channel_ids: Vec<String>,
}

/// Parses `raw` as `T` and checks `job_id` (or the equivalent identity field
/// a caller passes in) is non-blank, folding both failure modes into the same
/// `invalid_context` error per §7.
pub fn parse_context<T: for<'de> Deserialize<'de>>(raw: &serde_json::Value) -> Result<T, GatewayError> {
    serde_json::from_value(raw.clone())
        .map_err(|e| GatewayError::new(ErrorKind::InvalidContext, format!("malformed context: {e}")))
}

pub fn require_job_id(job_id: &str) -> Result<(), GatewayError> {
    non_empty("job_id", job_id)
}

pub fn require_company_id(company_id: &str) -> Result<(), GatewayError> {
    non_empty("company_id", company_id)
}
