use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// §6 "Task type vocabulary" — closed enum of client-callable + internal task types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Suggest,
    Refine,
    Channels,
    CopilotAgent,
    AssetMaster,
    AssetChannelBatch,
    AssetAdapt,
    VideoStoryboard,
    VideoCaption,
    VideoCompliance,
    CompanyIntel,
    ImagePromptGeneration,
    ImageGeneration,
    ImageCaption,
    GenerateCampaignAssets,
    HeroImage,
    VideoCreateManifest,
    VideoRegenerate,
    VideoCaptionUpdate,
    VideoRender,
    /// Server-internal: render-cost accounting only, never client-dispatched.
    VideoGeneration,
}

impl TaskType {
    /// Logging-only aliases (§6): `suggest -> suggestions`, `refine -> refinement`.
    pub fn log_alias(self) -> &'static str {
        match self {
            TaskType::Suggest => "suggestions",
            TaskType::Refine => "refinement",
            other => other.as_str(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Suggest => "suggest",
            TaskType::Refine => "refine",
            TaskType::Channels => "channels",
            TaskType::CopilotAgent => "copilot_agent",
            TaskType::AssetMaster => "asset_master",
            TaskType::AssetChannelBatch => "asset_channel_batch",
            TaskType::AssetAdapt => "asset_adapt",
            TaskType::VideoStoryboard => "video_storyboard",
            TaskType::VideoCaption => "video_caption",
            TaskType::VideoCompliance => "video_compliance",
            TaskType::CompanyIntel => "company_intel",
            TaskType::ImagePromptGeneration => "image_prompt_generation",
            TaskType::ImageGeneration => "image_generation",
            TaskType::ImageCaption => "image_caption",
            TaskType::GenerateCampaignAssets => "generate_campaign_assets",
            TaskType::HeroImage => "hero_image",
            TaskType::VideoCreateManifest => "video_create_manifest",
            TaskType::VideoRegenerate => "video_regenerate",
            TaskType::VideoCaptionUpdate => "video_caption_update",
            TaskType::VideoRender => "video_render",
            TaskType::VideoGeneration => "video_generation",
        }
    }

    /// Inverse of `as_str`, for parsing the `taskType` field of `POST /api/llm` (§6).
    pub fn parse(raw: &str) -> Option<TaskType> {
        Some(match raw {
            "suggest" => TaskType::Suggest,
            "refine" => TaskType::Refine,
            "channels" => TaskType::Channels,
            "copilot_agent" => TaskType::CopilotAgent,
            "asset_master" => TaskType::AssetMaster,
            "asset_channel_batch" => TaskType::AssetChannelBatch,
            "asset_adapt" => TaskType::AssetAdapt,
            "video_storyboard" => TaskType::VideoStoryboard,
            "video_caption" => TaskType::VideoCaption,
            "video_compliance" => TaskType::VideoCompliance,
            "company_intel" => TaskType::CompanyIntel,
            "image_prompt_generation" => TaskType::ImagePromptGeneration,
            "image_generation" => TaskType::ImageGeneration,
            "image_caption" => TaskType::ImageCaption,
            "generate_campaign_assets" => TaskType::GenerateCampaignAssets,
            "hero_image" => TaskType::HeroImage,
            "video_create_manifest" => TaskType::VideoCreateManifest,
            "video_regenerate" => TaskType::VideoRegenerate,
            "video_caption_update" => TaskType::VideoCaptionUpdate,
            "video_render" => TaskType::VideoRender,
            "video_generation" => TaskType::VideoGeneration,
            _ => return None,
        })
    }

    /// Provider-family bucket this task's model resolution falls into (§6 "env variables
    /// select provider strings ... per task family").
    pub fn provider_family(self) -> &'static str {
        match self {
            TaskType::ImageGeneration | TaskType::ImagePromptGeneration | TaskType::HeroImage => {
                "image"
            }
            TaskType::VideoRender
            | TaskType::VideoGeneration
            | TaskType::VideoCreateManifest
            | TaskType::VideoRegenerate => "video",
            TaskType::Channels => "channel",
            TaskType::AssetMaster
            | TaskType::AssetChannelBatch
            | TaskType::AssetAdapt
            | TaskType::GenerateCampaignAssets => "asset-copy",
            _ => "chat",
        }
    }
}

/// Identity + logger scope carried through the orchestrator call (§4.1 "caller").
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
    pub correlation_id: String,
}

/// §7 error taxonomy (kinds, not types).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidContext,
    Unauthorized,
    Forbidden,
    NotFound,
    RequirementsIncomplete,
    InsufficientCredits,
    ProviderError,
    SchemaValidationFailed,
    GroundingIncompatible,
    RenderFailed,
    Timeout,
    Internal,
}

impl ErrorKind {
    /// §7 propagation policy mapping: HTTP status this kind maps to at the boundary
    /// (recoverable provider/schema errors are folded into a 200 `failure` payload
    /// by the orchestrator before this mapping is ever consulted, per §7).
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::InvalidContext => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::RequirementsIncomplete => 409,
            ErrorKind::SchemaValidationFailed => 422,
            ErrorKind::InsufficientCredits => 429,
            ErrorKind::GroundingIncompatible => 500,
            ErrorKind::ProviderError | ErrorKind::RenderFailed | ErrorKind::Timeout => 200,
            ErrorKind::Internal => 500,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct GatewayError {
    pub kind: ErrorKind,
    pub message: String,
}

impl GatewayError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// §7 "each task's response always has the shape `{jobId, payload, refreshed, updatedAt, failure?}`".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub job_id: String,
    pub payload: serde_json::Value,
    pub refreshed: bool,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<crate::suggestion::FailureEnvelope>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_the_inverse_of_as_str_for_every_variant() {
        let all = [
            TaskType::Suggest,
            TaskType::Refine,
            TaskType::Channels,
            TaskType::CopilotAgent,
            TaskType::AssetMaster,
            TaskType::AssetChannelBatch,
            TaskType::AssetAdapt,
            TaskType::VideoStoryboard,
            TaskType::VideoCaption,
            TaskType::VideoCompliance,
            TaskType::CompanyIntel,
            TaskType::ImagePromptGeneration,
            TaskType::ImageGeneration,
            TaskType::ImageCaption,
            TaskType::GenerateCampaignAssets,
            TaskType::HeroImage,
            TaskType::VideoCreateManifest,
            TaskType::VideoRegenerate,
            TaskType::VideoCaptionUpdate,
            TaskType::VideoRender,
            TaskType::VideoGeneration,
        ];
        for t in all {
            assert_eq!(TaskType::parse(t.as_str()), Some(t));
        }
        assert_eq!(TaskType::parse("not_a_task"), None);
    }
}
