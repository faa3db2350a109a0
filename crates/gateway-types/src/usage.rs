use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageStatus {
    Committed,
    Refunded,
    Errored,
}

/// §3 Usage Entry — append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEntry {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub task_type: String,
    pub provider: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub thoughts_tokens: u64,
    #[serde(default)]
    pub cached_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_seconds: Option<f64>,
    pub estimated_cost_usd: f64,
    pub credits_used: u64,
    pub status: UsageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// §3 Credit Balance — one per user.
/// Invariants: `balance >= 0`, `reserved >= 0`, `available = balance - reserved >= 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditBalance {
    pub user_id: String,
    pub balance: u64,
    pub reserved: u64,
    pub lifetime_used: u64,
    pub updated_at: DateTime<Utc>,
}

impl CreditBalance {
    pub fn new(user_id: impl Into<String>, balance: u64, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            balance,
            reserved: 0,
            lifetime_used: 0,
            updated_at: now,
        }
    }

    pub fn available(&self) -> u64 {
        self.balance.saturating_sub(self.reserved)
    }
}

impl gateway_store::Document for CreditBalance {
    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}
