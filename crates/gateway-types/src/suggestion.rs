use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub proposal: serde_json::Value,
    pub rationale: String,
    pub confidence: f64,
}

impl Candidate {
    pub fn confidence_in_range(&self) -> bool {
        (0.0..=1.0).contains(&self.confidence)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureEnvelope {
    pub reason: String,
    pub raw_preview: String,
    pub error: String,
    pub occurred_at: DateTime<Utc>,
}

/// §3 Suggestion Document — one per job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionDocument {
    pub job_id: String,
    #[serde(default)]
    pub candidates: HashMap<String, Candidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<FailureEnvelope>,
    /// Fields of the intake snapshot this document's candidates were generated against,
    /// used by the cache-invalidation rule in §4.1 ("any required intake field changed").
    #[serde(default)]
    pub generated_against: HashMap<String, String>,
    pub schema_version: String,
    pub updated_at: DateTime<Utc>,
}

impl SuggestionDocument {
    pub fn empty(job_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            job_id: job_id.into(),
            candidates: HashMap::new(),
            provider: None,
            model: None,
            last_failure: None,
            generated_against: HashMap::new(),
            schema_version: "1".to_string(),
            updated_at: now,
        }
    }

    pub fn has_failure(&self) -> bool {
        self.last_failure.is_some()
    }
}
