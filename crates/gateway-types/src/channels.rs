use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::suggestion::FailureEnvelope;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelRecommendation {
    pub channel: String,
    pub reason: String,
    pub expected_cpa: f64,
}

/// §3 Channel Recommendations — one per job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelRecommendationsDocument {
    pub job_id: String,
    #[serde(default)]
    pub recommendations: Vec<ChannelRecommendation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<FailureEnvelope>,
    pub schema_version: String,
    pub updated_at: DateTime<Utc>,
}

impl ChannelRecommendationsDocument {
    pub fn empty(job_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            job_id: job_id.into(),
            recommendations: Vec::new(),
            provider: None,
            model: None,
            last_failure: None,
            schema_version: "1".to_string(),
            updated_at: now,
        }
    }

    pub fn has_failure(&self) -> bool {
        self.last_failure.is_some()
    }
}
