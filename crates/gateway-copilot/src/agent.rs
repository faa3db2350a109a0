//! C7 Copilot Agent Loop (§4.2): translates one user utterance into at most
//! `max_turns` iterations of { LLM turn -> optional tool call }, producing a
//! final reply and the list of `Action`s applied along the way. Modeled as a
//! single-shot turn/tool-call loop rather than a streamed one: every turn
//! goes through the orchestrator's
//! metered `ProviderInvoker::call`/`settle` pair (§4.2 "every turn's LLM call
//! is metered via the orchestrator's usage tracker"), not a token stream.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use gateway_orchestrator::{CompanyIntelLoader, ProviderInvoker};
use gateway_store::{collections, DocumentStore, TypedStore};
use gateway_tools::{JobCache, ToolContext, ToolRegistry};
use gateway_types::{
    Action, Caller, CopilotChatDocument, CopilotMessage, CopilotStage, ErrorKind, GatewayError,
    Job, MessageRole, RefinementDocument,
};

use crate::parsing::{parse_agent_step, AgentStep};
use crate::stage::{config_for, StageConfig};

/// §4.2 "Hard cap K turns" — default 8.
pub const DEFAULT_MAX_TURNS: usize = 8;

pub struct CopilotTurnOutcome {
    pub message: String,
    pub actions: Vec<Action>,
    pub turns_used: usize,
    pub hit_turn_cap: bool,
}

pub struct CopilotAgent {
    store: Arc<dyn DocumentStore>,
    invoker: Arc<ProviderInvoker>,
    tools: ToolRegistry,
    company_intel: Arc<CompanyIntelLoader>,
    max_turns: usize,
}

impl CopilotAgent {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        invoker: Arc<ProviderInvoker>,
        tools: ToolRegistry,
        company_intel: Arc<CompanyIntelLoader>,
    ) -> Self {
        Self {
            store,
            invoker,
            tools,
            company_intel,
            max_turns: DEFAULT_MAX_TURNS,
        }
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    fn company_id_for(job: &Job) -> Option<String> {
        let trimmed = job.intake.company_name.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(
            trimmed
                .to_lowercase()
                .chars()
                .map(|c| if c.is_alphanumeric() { c } else { '-' })
                .collect(),
        )
    }

    async fn company_context_text(&self, job: &Job) -> String {
        let Some(company_id) = Self::company_id_for(job) else {
            return String::new();
        };
        match self.company_intel.load(&company_id).await {
            Ok(lookup) => lookup
                .context
                .map(|ctx| format!("{} ({}): {}", ctx.profile.name, ctx.profile.industry, ctx.profile.summary))
                .unwrap_or_default(),
            Err(_) => String::new(),
        }
    }

    fn chat_window_text(chat: &CopilotChatDocument) -> String {
        chat.recent_window()
            .iter()
            .map(|m| format!("{:?}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// §4.2: authorize, load the last 8 chat messages / Suggestion snapshot /
    /// Refinement snapshot / Company Context, resolve the stage's tool
    /// subset, then run the bounded loop.
    pub async fn handle_turn(
        &self,
        job_id: &str,
        stage: CopilotStage,
        user_message: String,
        caller: &Caller,
    ) -> Result<CopilotTurnOutcome, GatewayError> {
        let job = self
            .store
            .get::<Job>(collections::JOBS, job_id)
            .await
            .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))?
            .ok_or_else(|| GatewayError::new(ErrorKind::NotFound, format!("job {job_id} not found")))?;
        if job.owner_user_id != caller.user_id {
            return Err(GatewayError::new(ErrorKind::Forbidden, "caller does not own this job"));
        }

        let now = Utc::now();
        let mut chat = self
            .store
            .get::<CopilotChatDocument>(collections::WIZARD_COPILOT_CHATS, job_id)
            .await
            .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))?
            .unwrap_or_else(|| CopilotChatDocument::empty(job_id, now));
        chat.append(
            CopilotMessage {
                id: Uuid::new_v4().to_string(),
                role: MessageRole::User,
                message_type: "text".to_string(),
                content: user_message.clone(),
                metadata: json!({}),
                stage: Some(stage),
                context_id: None,
                created_at: now,
            },
            now,
        );

        let company_context = self.company_context_text(&job).await;
        let stage_config = config_for(stage);
        let tool_ctx = ToolContext {
            store: self.store.clone(),
            company_intel: self.company_intel.clone(),
            user_id: caller.user_id.clone(),
            job_id: job_id.to_string(),
            cache: JobCache::new(),
        };

        let mut scratchpad: Vec<String> = Vec::new();
        let mut actions: Vec<Action> = Vec::new();
        let mut turns_used = 0usize;
        let mut final_message: Option<String> = None;

        while turns_used < self.max_turns {
            turns_used += 1;

            let outcome = self
                .run_one_llm_turn(&job, &chat, &company_context, &stage_config, &user_message, &scratchpad, caller)
                .await?;

            if outcome.response.is_error() {
                self.invoker.settle(&outcome, caller, Some(job_id.to_string())).await?;
                final_message = Some(
                    "I hit a snag talking to the model just now — please try that again.".to_string(),
                );
                break;
            }
            self.invoker.settle(&outcome, caller, Some(job_id.to_string())).await?;

            match parse_agent_step(&outcome.response.text) {
                AgentStep::Final { message } => {
                    final_message = Some(message);
                    break;
                }
                AgentStep::ToolCall { tool, input } => {
                    if !stage_config.tool_names.contains(&tool.as_str()) {
                        scratchpad.push(format!(
                            "tool_error: `{tool}` is not available in stage `{stage:?}`"
                        ));
                        continue;
                    }
                    match self.tools.execute(&tool, &tool_ctx, input).await {
                        Ok(output) if output.status == "ok" => {
                            scratchpad.push(format!("tool_result: {tool} -> {}", output.result));
                            if let Some(action) = output.action {
                                let synthesized = synthesize_reply(&action);
                                actions.push(action);
                                // §4.2: the agent MAY terminate immediately after a
                                // mutating tool call rather than spend another turn
                                // asking the model to restate what it just did.
                                final_message = Some(synthesized);
                                break;
                            }
                        }
                        Ok(output) => {
                            scratchpad.push(format!("tool_error: {tool} -> {}", output.result));
                        }
                        Err(err) => {
                            scratchpad.push(format!("tool_error: {tool} -> {}", err.message));
                        }
                    }
                }
            }
        }

        let hit_turn_cap = final_message.is_none();
        let message = final_message.unwrap_or_else(|| {
            "I hit a snag working through that request — could you rephrase or try again?".to_string()
        });

        let now = Utc::now();
        chat.append(
            CopilotMessage {
                id: Uuid::new_v4().to_string(),
                role: MessageRole::Assistant,
                message_type: "text".to_string(),
                content: message.clone(),
                metadata: json!({ "actions": actions.len() }),
                stage: Some(stage),
                context_id: None,
                created_at: now,
            },
            now,
        );
        self.store
            .save(collections::WIZARD_COPILOT_CHATS, job_id, &chat)
            .await
            .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))?;

        if stage == CopilotStage::Refine {
            self.sync_refined_fields(job_id, &actions, now).await?;
        }

        Ok(CopilotTurnOutcome { message, actions, turns_used, hit_turn_cap })
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_one_llm_turn(
        &self,
        job: &Job,
        chat: &CopilotChatDocument,
        company_context: &str,
        stage_config: &StageConfig,
        user_message: &str,
        scratchpad: &[String],
        caller: &Caller,
    ) -> Result<gateway_orchestrator::CallOutcome, GatewayError> {
        let spec = self.invoker.prompts.resolve(gateway_types::TaskType::CopilotAgent);

        let tool_manifest: Vec<Value> = self
            .tools
            .schemas(stage_config.tool_names)
            .into_iter()
            .map(|t| json!({ "name": t.name, "description": t.description, "inputSchema": t.input_schema }))
            .collect();

        let mut vars: HashMap<&str, String> = HashMap::new();
        vars.insert("mission", stage_config.mission.to_string());
        vars.insert("guardrails", stage_config.guardrails.to_string());
        vars.insert(
            "instructions",
            format!(
                "{}\n\nAvailable tools:\n{}\n\nReply with exactly one JSON object: either {{\"type\":\"tool_call\",\"tool\":\"<name>\",\"input\":{{...}}}} or {{\"type\":\"final\",\"message\":\"...\"}}.",
                stage_config.instructions,
                serde_json::to_string(&tool_manifest).unwrap_or_default()
            ),
        );
        vars.insert(
            "job_snapshot",
            format!(
                "{}\nCompany context: {}",
                serde_json::to_string(&job.intake).unwrap_or_default(),
                company_context
            ),
        );
        vars.insert("chat_window", Self::chat_window_text(chat));
        vars.insert("scratchpad", scratchpad.join("\n"));
        vars.insert("user_message", user_message.to_string());
        let prompt = spec.render(&vars);

        self.invoker
            .call(
                gateway_types::TaskType::CopilotAgent,
                String::new(),
                prompt,
                spec.output_schema.clone(),
                spec.output_schema_name.map(str::to_string),
                spec.grounding_tools.iter().map(|s| s.to_string()).collect(),
                caller,
            )
            .await
    }

    /// §9 Open Question: refine-stage mirroring happens both inline in tools
    /// and in this post-loop reconciliation; the reconciliation form is
    /// authoritative, so it always wins by copying the committed intake over
    /// the refinement draft's mirrored fields.
    async fn sync_refined_fields(
        &self,
        job_id: &str,
        actions: &[Action],
        now: chrono::DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        if !actions.iter().any(Action::is_intake_mutation) {
            return Ok(());
        }
        let job = self
            .store
            .get::<Job>(collections::JOBS, job_id)
            .await
            .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))?
            .ok_or_else(|| GatewayError::new(ErrorKind::NotFound, format!("job {job_id} not found")))?;
        let mut doc = self
            .store
            .get::<RefinementDocument>(collections::JOB_REFINEMENTS, job_id)
            .await
            .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))?
            .unwrap_or_else(|| RefinementDocument::empty(job_id, now));
        doc.refined_job = job.intake;
        doc.updated_at = now;
        self.store
            .save(collections::JOB_REFINEMENTS, job_id, &doc)
            .await
            .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))
    }
}

fn synthesize_reply(action: &Action) -> String {
    match action {
        Action::FieldUpdate { field_id, .. } => format!("I updated {field_id} as requested."),
        Action::FieldBatchUpdate { fields, .. } => {
            let names = fields
                .as_object()
                .map(|m| m.keys().cloned().collect::<Vec<_>>().join(", "))
                .unwrap_or_default();
            format!("I updated {names} as requested.")
        }
        Action::RefinedFieldUpdate { field_id, .. } => {
            format!("I updated the refined {field_id} as requested.")
        }
        Action::AssetUpdate { asset_id, .. } => format!("I updated the asset {asset_id} as requested."),
        Action::ChannelRecommendationUpdate { .. } => {
            "I updated the channel recommendations as requested.".to_string()
        }
    }
}
