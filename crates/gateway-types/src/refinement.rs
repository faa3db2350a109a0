use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::JobIntake;
use crate::suggestion::FailureEnvelope;

/// §3 Refinement Document — gated by `job.stateMachine.requiredComplete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementDocument {
    pub job_id: String,
    #[serde(default)]
    pub refined_job: JobIntake,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<FailureEnvelope>,
    pub schema_version: String,
    pub updated_at: DateTime<Utc>,
}

impl RefinementDocument {
    pub fn empty(job_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            job_id: job_id.into(),
            refined_job: JobIntake::default(),
            summary: String::new(),
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
