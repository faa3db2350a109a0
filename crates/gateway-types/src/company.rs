use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CompanyProfile {
    pub company_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub industry: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub name_confirmed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DiscoveredJob {
    pub title: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub source_url: String,
}

/// §3 Company Context — cached, optional, used for prompt grounding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyContext {
    pub company_id: String,
    pub profile: CompanyProfile,
    #[serde(default)]
    pub discovered_jobs: Vec<DiscoveredJob>,
    pub schema_version: String,
    pub updated_at: DateTime<Utc>,
}

impl CompanyContext {
    pub fn empty(company_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        let company_id = company_id.into();
        Self {
            profile: CompanyProfile {
                company_id: company_id.clone(),
                ..Default::default()
            },
            company_id,
            discovered_jobs: Vec::new(),
            schema_version: "1".to_string(),
            updated_at: now,
        }
    }
}
