use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Copilot UI context the agent loop narrows its tool subset to (§4.2 "Staging").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopilotStage {
    Wizard,
    Refine,
    Assets,
    Channels,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
    System,
}

/// One entry in the §3 Copilot Chat document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopilotMessage {
    pub id: String,
    pub role: MessageRole,
    #[serde(rename = "type")]
    pub message_type: String,
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<CopilotStage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Retained length bounded (§3 invariant): default 20 stored, window of 8 fed per turn.
pub const COPILOT_CHAT_RETENTION: usize = 20;
pub const COPILOT_CHAT_TURN_WINDOW: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopilotChatDocument {
    pub job_id: String,
    #[serde(default)]
    pub messages: Vec<CopilotMessage>,
    pub schema_version: String,
    pub updated_at: DateTime<Utc>,
}

impl CopilotChatDocument {
    pub fn empty(job_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            job_id: job_id.into(),
            messages: Vec::new(),
            schema_version: "1".to_string(),
            updated_at: now,
        }
    }

    /// Appends a message and trims to `COPILOT_CHAT_RETENTION`, oldest first dropped.
    pub fn append(&mut self, message: CopilotMessage, now: DateTime<Utc>) {
        self.messages.push(message);
        if self.messages.len() > COPILOT_CHAT_RETENTION {
            let overflow = self.messages.len() - COPILOT_CHAT_RETENTION;
            self.messages.drain(0..overflow);
        }
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// Last up-to-8 messages fed to the agent per turn (§4.2).
    pub fn recent_window(&self) -> &[CopilotMessage] {
        let len = self.messages.len();
        let start = len.saturating_sub(COPILOT_CHAT_TURN_WINDOW);
        &self.messages[start..]
    }
}

/// A structured record describing a tool's side-effect (§4.2 "Action", GLOSSARY).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    FieldUpdate {
        job_id: String,
        field_id: String,
        value: serde_json::Value,
    },
    FieldBatchUpdate {
        job_id: String,
        fields: serde_json::Value,
    },
    RefinedFieldUpdate {
        job_id: String,
        field_id: String,
        value: serde_json::Value,
    },
    AssetUpdate {
        job_id: String,
        asset_id: String,
    },
    ChannelRecommendationUpdate {
        job_id: String,
    },
}

impl Action {
    pub fn job_id(&self) -> &str {
        match self {
            Action::FieldUpdate { job_id, .. } => job_id,
            Action::FieldBatchUpdate { job_id, .. } => job_id,
            Action::RefinedFieldUpdate { job_id, .. } => job_id,
            Action::AssetUpdate { job_id, .. } => job_id,
            Action::ChannelRecommendationUpdate { job_id } => job_id,
        }
    }

    /// Whether this action mutates the intake (triggers refine-stage mirroring, §4.2).
    pub fn is_intake_mutation(&self) -> bool {
        matches!(self, Action::FieldUpdate { .. } | Action::FieldBatchUpdate { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: &str, now: DateTime<Utc>) -> CopilotMessage {
        CopilotMessage {
            id: id.to_string(),
            role: MessageRole::User,
            message_type: "text".to_string(),
            content: id.to_string(),
            metadata: serde_json::json!({}),
            stage: None,
            context_id: None,
            created_at: now,
        }
    }

    #[test]
    fn append_trims_to_retention_limit() {
        let now: DateTime<Utc> = "2026-01-01T00:00:00Z".parse().unwrap();
        let mut doc = CopilotChatDocument::empty("j1", now);
        for i in 0..30 {
            doc.append(msg(&i.to_string(), now), now);
        }
        assert_eq!(doc.messages.len(), COPILOT_CHAT_RETENTION);
        assert_eq!(doc.messages.first().unwrap().id, "10");
    }

    #[test]
    fn recent_window_caps_at_eight() {
        let now: DateTime<Utc> = "2026-01-01T00:00:00Z".parse().unwrap();
        let mut doc = CopilotChatDocument::empty("j1", now);
        for i in 0..5 {
            doc.append(msg(&i.to_string(), now), now);
        }
        assert_eq!(doc.recent_window().len(), 5);
        for i in 5..15 {
            doc.append(msg(&i.to_string(), now), now);
        }
        assert_eq!(doc.recent_window().len(), COPILOT_CHAT_TURN_WINDOW);
    }
}
