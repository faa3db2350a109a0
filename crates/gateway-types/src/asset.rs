use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    Text,
    Image,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    Pending,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum AssetContent {
    Text { body: String },
    Image { url: String, prompt: String },
    Video { url: String },
}

/// §3 Asset Record. Identity `(jobId, formatId, channelId)` is exactly-once (§3 invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRecord {
    pub asset_id: String,
    pub job_id: String,
    pub format_id: String,
    pub channel_id: String,
    pub artifact_type: ArtifactType,
    pub status: AssetStatus,
    pub content: Option<AssetContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub schema_version: String,
    pub updated_at: DateTime<Utc>,
}

impl AssetRecord {
    /// Deterministic id so writes for the same (job, format, channel) collide
    /// into the same document, enforcing exactly-once (§3 invariant).
    pub fn derive_id(job_id: &str, format_id: &str, channel_id: &str) -> String {
        format!("{job_id}:{format_id}:{channel_id}")
    }

    pub fn new(
        job_id: impl Into<String>,
        format_id: impl Into<String>,
        channel_id: impl Into<String>,
        artifact_type: ArtifactType,
        now: DateTime<Utc>,
    ) -> Self {
        let job_id = job_id.into();
        let format_id = format_id.into();
        let channel_id = channel_id.into();
        let asset_id = Self::derive_id(&job_id, &format_id, &channel_id);
        Self {
            asset_id,
            job_id,
            format_id,
            channel_id,
            artifact_type,
            status: AssetStatus::Pending,
            content: None,
            provider: None,
            model: None,
            schema_version: "1".to_string(),
            updated_at: now,
        }
    }
}
