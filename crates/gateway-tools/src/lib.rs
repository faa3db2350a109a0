//! C8 Copilot Tools (§4.2): ~12 tools operating on job/suggestion/refinement/
//! channel/asset/company documents. Each tool is a value `{name, description,
//! inputSchema, execute}` per §4.2 "Tool contract" — no subclassing, no
//! dynamic registration beyond a flat name -> Arc<dyn CopilotTool> map
//! (§9 "Tool polymorphism").
//!
//! Tools are pure-in-their-side-effects: the only way one mutates persisted
//! state is writing through the `DocumentStore` in `execute`, and every
//! mutation returns an `Action` describing what happened so the agent loop's
//! caller can decide which updated snapshots to hand back to the client.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use gateway_orchestrator::CompanyIntelLoader;
use gateway_store::{collections, DocumentStore, TypedStore};
use gateway_types::{
    Action, AssetContent, AssetRecord, AssetStatus, ArtifactType, ChannelRecommendation,
    ChannelRecommendationsDocument, CompanyContext, EmploymentType, ErrorKind, GatewayError, Job,
    JobIntake, RefinementDocument, SalaryFields, SeniorityLevel, SuggestionDocument, WorkModel,
};

/// Per-invocation memoization of the job document (§4.2 "a context `cache`
/// that memoizes the job document within this invocation"). Scoped to one
/// agent-loop call: tools sharing a `ToolContext` see a consistent snapshot
/// without re-fetching on every turn, while still writing straight through.
#[derive(Clone, Default)]
pub struct JobCache {
    inner: Arc<Mutex<HashMap<String, Job>>>,
}

impl JobCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn get(
        &self,
        store: &Arc<dyn DocumentStore>,
        job_id: &str,
    ) -> anyhow::Result<Job> {
        if let Some(job) = self.inner.lock().await.get(job_id) {
            return Ok(job.clone());
        }
        let job = store
            .get::<Job>(collections::JOBS, job_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("job {job_id} not found"))?;
        self.inner.lock().await.insert(job_id.to_string(), job.clone());
        Ok(job)
    }

    async fn put(&self, job: Job) {
        self.inner.lock().await.insert(job.job_id.clone(), job);
    }
}

/// `{documentStore, logger, userId, jobId, cache}` (§4.2 "Tool contract").
#[derive(Clone)]
pub struct ToolContext {
    pub store: Arc<dyn DocumentStore>,
    pub company_intel: Arc<CompanyIntelLoader>,
    pub user_id: String,
    pub job_id: String,
    pub cache: JobCache,
}

/// `{status, ...result, action?}` (§4.2).
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: &'static str,
    pub result: Value,
    pub action: Option<Action>,
}

impl ToolOutput {
    pub fn ok(result: Value) -> Self {
        Self { status: "ok", result, action: None }
    }

    pub fn ok_with_action(result: Value, action: Action) -> Self {
        Self { status: "ok", result, action: Some(action) }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { status: "error", result: json!({ "message": message.into() }), action: None }
    }
}

#[async_trait]
pub trait CopilotTool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn input_schema(&self) -> Value;
    async fn execute(&self, ctx: &ToolContext, input: Value) -> anyhow::Result<ToolOutput>;
}

#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

/// Flat name -> tool map (§9 "Tool polymorphism"). Stage-scoped subsets are
/// resolved by the caller (the copilot agent loop) against `names()`, not
/// baked in here — this registry is just the full catalog.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: Arc<HashMap<&'static str, Arc<dyn CopilotTool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        let mut tools: HashMap<&'static str, Arc<dyn CopilotTool>> = HashMap::new();
        let mut register = |tool: Arc<dyn CopilotTool>| {
            tools.insert(tool.name(), tool);
        };
        register(Arc::new(GetJobSnapshotTool));
        register(Arc::new(UpdateJobFieldTool));
        register(Arc::new(UpdateJobFieldsBatchTool));
        register(Arc::new(GetSuggestionSnapshotTool));
        register(Arc::new(AcceptSuggestionTool));
        register(Arc::new(GetRefinementSnapshotTool));
        register(Arc::new(UpdateRefinedFieldTool));
        register(Arc::new(GetChannelRecommendationsTool));
        register(Arc::new(SetChannelRecommendationsTool));
        register(Arc::new(UpdateAssetContentTool));
        register(Arc::new(ConfirmCompanyNameTool));
        register(Arc::new(FetchCompanyOverviewTool));
        Self { tools: Arc::new(tools) }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CopilotTool>> {
        self.tools.get(name).cloned()
    }

    pub fn schemas(&self, names: &[&str]) -> Vec<ToolSchema> {
        names
            .iter()
            .filter_map(|n| self.tools.get(n))
            .map(|t| ToolSchema {
                name: t.name(),
                description: t.description(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    pub async fn execute(
        &self,
        name: &str,
        ctx: &ToolContext,
        input: Value,
    ) -> Result<ToolOutput, GatewayError> {
        let tool = self
            .get(name)
            .ok_or_else(|| GatewayError::new(ErrorKind::InvalidContext, format!("unknown tool `{name}`")))?;
        tool.execute(ctx, input)
            .await
            .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits a string on commas, trimming and dropping empty segments — the
/// array-field coercion a copilot utterance like "Set benefits to 'Remote,
/// Equity, 4-day week'" needs before it can land in `JobIntake.benefits`.
fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn value_as_string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.trim().to_string()))
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) => split_csv(s),
        _ => Vec::new(),
    }
}

/// Applies one `{field_id, value}` pair to an intake snapshot. Shared by
/// `update_job_field`, `update_job_fields_batch`, and `accept_suggestion` so
/// the three only ever disagree on how many fields they touch per call, not
/// on field coercion semantics.
pub fn apply_intake_field(intake: &mut JobIntake, field_id: &str, value: &Value) -> Result<(), String> {
    match field_id {
        "role_title" => intake.role_title = value.as_str().unwrap_or_default().to_string(),
        "company_name" => intake.company_name = value.as_str().unwrap_or_default().to_string(),
        "location" => intake.location = value.as_str().unwrap_or_default().to_string(),
        "job_description" => intake.job_description = value.as_str().unwrap_or_default().to_string(),
        "seniority_level" => {
            intake.seniority_level = value
                .as_str()
                .and_then(|s| serde_json::from_value::<SeniorityLevel>(json!(s)).ok());
        }
        "employment_type" => {
            intake.employment_type = value
                .as_str()
                .and_then(|s| serde_json::from_value::<EmploymentType>(json!(s)).ok());
        }
        "work_model" => {
            intake.work_model = value
                .as_str()
                .and_then(|s| serde_json::from_value::<WorkModel>(json!(s)).ok());
        }
        "core_duties" => intake.core_duties = value_as_string_list(value),
        "must_haves" => intake.must_haves = value_as_string_list(value),
        "benefits" => intake.benefits = value_as_string_list(value),
        "salary" => {
            intake.salary = serde_json::from_value::<SalaryFields>(value.clone()).unwrap_or_default();
        }
        other => return Err(format!("unknown job field `{other}`")),
    }
    Ok(())
}

async fn load_job_mut(ctx: &ToolContext) -> anyhow::Result<Job> {
    ctx.cache.get(&ctx.store, &ctx.job_id).await
}

async fn save_job(ctx: &ToolContext, mut job: Job) -> anyhow::Result<Job> {
    let now = Utc::now();
    job.recompute_state(now);
    ctx.store.save(collections::JOBS, &job.job_id, &job).await?;
    ctx.cache.put(job.clone()).await;
    Ok(job)
}

// ---------------------------------------------------------------------
// Job tools
// ---------------------------------------------------------------------

pub struct GetJobSnapshotTool;

#[async_trait]
impl CopilotTool for GetJobSnapshotTool {
    fn name(&self) -> &'static str {
        "get_job_snapshot"
    }

    fn description(&self) -> &'static str {
        "Returns the current job intake fields and state machine status."
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, ctx: &ToolContext, _input: Value) -> anyhow::Result<ToolOutput> {
        let job = load_job_mut(ctx).await?;
        Ok(ToolOutput::ok(serde_json::to_value(&job)?))
    }
}

pub struct UpdateJobFieldTool;

#[async_trait]
impl CopilotTool for UpdateJobFieldTool {
    fn name(&self) -> &'static str {
        "update_job_field"
    }

    fn description(&self) -> &'static str {
        "Sets a single job intake field to a new value."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "field_id": {"type": "string"},
                "value": {}
            },
            "required": ["field_id", "value"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> anyhow::Result<ToolOutput> {
        let field_id = input
            .get("field_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing `field_id`"))?
            .to_string();
        let value = input.get("value").cloned().unwrap_or(Value::Null);

        let mut job = load_job_mut(ctx).await?;
        if let Err(message) = apply_intake_field(&mut job.intake, &field_id, &value) {
            return Ok(ToolOutput::error(message));
        }
        let job = save_job(ctx, job).await?;

        Ok(ToolOutput::ok_with_action(
            json!({ "job": job }),
            Action::FieldUpdate { job_id: ctx.job_id.clone(), field_id, value },
        ))
    }
}

pub struct UpdateJobFieldsBatchTool;

#[async_trait]
impl CopilotTool for UpdateJobFieldsBatchTool {
    fn name(&self) -> &'static str {
        "update_job_fields_batch"
    }

    fn description(&self) -> &'static str {
        "Sets multiple job intake fields in one call."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "fields": {"type": "object"} },
            "required": ["fields"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> anyhow::Result<ToolOutput> {
        let fields = input
            .get("fields")
            .and_then(|v| v.as_object())
            .ok_or_else(|| anyhow::anyhow!("missing `fields` object"))?
            .clone();

        let mut job = load_job_mut(ctx).await?;
        for (field_id, value) in fields.iter() {
            if let Err(message) = apply_intake_field(&mut job.intake, field_id, value) {
                return Ok(ToolOutput::error(message));
            }
        }
        let job = save_job(ctx, job).await?;

        Ok(ToolOutput::ok_with_action(
            json!({ "job": job }),
            Action::FieldBatchUpdate { job_id: ctx.job_id.clone(), fields: Value::Object(fields) },
        ))
    }
}

// ---------------------------------------------------------------------
// Suggestion tools
// ---------------------------------------------------------------------

pub struct GetSuggestionSnapshotTool;

#[async_trait]
impl CopilotTool for GetSuggestionSnapshotTool {
    fn name(&self) -> &'static str {
        "get_suggestion_snapshot"
    }

    fn description(&self) -> &'static str {
        "Returns the job's current AI field suggestions."
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, ctx: &ToolContext, _input: Value) -> anyhow::Result<ToolOutput> {
        let doc = ctx
            .store
            .get::<SuggestionDocument>(collections::JOB_SUGGESTIONS, &ctx.job_id)
            .await?;
        Ok(ToolOutput::ok(json!({ "candidates": doc.map(|d| d.candidates).unwrap_or_default() })))
    }
}

pub struct AcceptSuggestionTool;

#[async_trait]
impl CopilotTool for AcceptSuggestionTool {
    fn name(&self) -> &'static str {
        "accept_suggestion"
    }

    fn description(&self) -> &'static str {
        "Applies a previously-suggested field value onto the job intake."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "field_id": {"type": "string"} },
            "required": ["field_id"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> anyhow::Result<ToolOutput> {
        let field_id = input
            .get("field_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing `field_id`"))?
            .to_string();

        let Some(doc) = ctx
            .store
            .get::<SuggestionDocument>(collections::JOB_SUGGESTIONS, &ctx.job_id)
            .await?
        else {
            return Ok(ToolOutput::error("no suggestions exist for this job"));
        };
        let Some(candidate) = doc.candidates.get(&field_id) else {
            return Ok(ToolOutput::error(format!("no suggestion for field `{field_id}`")));
        };
        let value = candidate.proposal.clone();

        let mut job = load_job_mut(ctx).await?;
        if let Err(message) = apply_intake_field(&mut job.intake, &field_id, &value) {
            return Ok(ToolOutput::error(message));
        }
        let job = save_job(ctx, job).await?;

        Ok(ToolOutput::ok_with_action(
            json!({ "job": job }),
            Action::FieldUpdate { job_id: ctx.job_id.clone(), field_id, value },
        ))
    }
}

// ---------------------------------------------------------------------
// Refinement tools
// ---------------------------------------------------------------------

pub struct GetRefinementSnapshotTool;

#[async_trait]
impl CopilotTool for GetRefinementSnapshotTool {
    fn name(&self) -> &'static str {
        "get_refinement_snapshot"
    }

    fn description(&self) -> &'static str {
        "Returns the job's polished refinement draft, if one exists."
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, ctx: &ToolContext, _input: Value) -> anyhow::Result<ToolOutput> {
        let doc = ctx
            .store
            .get::<RefinementDocument>(collections::JOB_REFINEMENTS, &ctx.job_id)
            .await?;
        Ok(ToolOutput::ok(serde_json::to_value(&doc)?))
    }
}

pub struct UpdateRefinedFieldTool;

#[async_trait]
impl CopilotTool for UpdateRefinedFieldTool {
    fn name(&self) -> &'static str {
        "update_refined_field"
    }

    fn description(&self) -> &'static str {
        "Sets a single field on the polished refinement draft directly, without re-running refinement."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "field_id": {"type": "string"},
                "value": {}
            },
            "required": ["field_id", "value"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> anyhow::Result<ToolOutput> {
        let field_id = input
            .get("field_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing `field_id`"))?
            .to_string();
        let value = input.get("value").cloned().unwrap_or(Value::Null);

        let now = Utc::now();
        let mut doc = ctx
            .store
            .get::<RefinementDocument>(collections::JOB_REFINEMENTS, &ctx.job_id)
            .await?
            .unwrap_or_else(|| RefinementDocument::empty(&ctx.job_id, now));
        if let Err(message) = apply_intake_field(&mut doc.refined_job, &field_id, &value) {
            return Ok(ToolOutput::error(message));
        }
        doc.updated_at = now;
        ctx.store.save(collections::JOB_REFINEMENTS, &ctx.job_id, &doc).await?;

        Ok(ToolOutput::ok_with_action(
            json!({ "refinement": doc }),
            Action::RefinedFieldUpdate { job_id: ctx.job_id.clone(), field_id, value },
        ))
    }
}

// ---------------------------------------------------------------------
// Channel recommendation tools
// ---------------------------------------------------------------------

pub struct GetChannelRecommendationsTool;

#[async_trait]
impl CopilotTool for GetChannelRecommendationsTool {
    fn name(&self) -> &'static str {
        "get_channel_recommendations"
    }

    fn description(&self) -> &'static str {
        "Returns the job's current sourcing channel recommendations."
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, ctx: &ToolContext, _input: Value) -> anyhow::Result<ToolOutput> {
        let doc = ctx
            .store
            .get::<ChannelRecommendationsDocument>(collections::JOB_CHANNEL_RECOMMENDATIONS, &ctx.job_id)
            .await?;
        Ok(ToolOutput::ok(json!({ "recommendations": doc.map(|d| d.recommendations).unwrap_or_default() })))
    }
}

pub struct SetChannelRecommendationsTool;

#[async_trait]
impl CopilotTool for SetChannelRecommendationsTool {
    fn name(&self) -> &'static str {
        "set_channel_recommendations"
    }

    fn description(&self) -> &'static str {
        "Overwrites the job's channel recommendations with an explicit list."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "recommendations": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "channel": {"type": "string"},
                            "reason": {"type": "string"},
                            "expected_cpa": {"type": "number"}
                        },
                        "required": ["channel", "reason", "expected_cpa"]
                    }
                }
            },
            "required": ["recommendations"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> anyhow::Result<ToolOutput> {
        let recommendations: Vec<ChannelRecommendation> = input
            .get("recommendations")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .ok_or_else(|| anyhow::anyhow!("invalid `recommendations`"))?;

        let now = Utc::now();
        let mut doc = ctx
            .store
            .get::<ChannelRecommendationsDocument>(collections::JOB_CHANNEL_RECOMMENDATIONS, &ctx.job_id)
            .await?
            .unwrap_or_else(|| ChannelRecommendationsDocument::empty(&ctx.job_id, now));
        doc.recommendations = recommendations;
        doc.last_failure = None;
        doc.updated_at = now;
        ctx.store
            .save(collections::JOB_CHANNEL_RECOMMENDATIONS, &ctx.job_id, &doc)
            .await?;

        Ok(ToolOutput::ok_with_action(
            json!({ "recommendations": doc.recommendations }),
            Action::ChannelRecommendationUpdate { job_id: ctx.job_id.clone() },
        ))
    }
}

// ---------------------------------------------------------------------
// Asset tools
// ---------------------------------------------------------------------

pub struct UpdateAssetContentTool;

#[async_trait]
impl CopilotTool for UpdateAssetContentTool {
    fn name(&self) -> &'static str {
        "update_asset_content"
    }

    fn description(&self) -> &'static str {
        "Writes (or overwrites) the text body of one (format, channel) asset for this job."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "format_id": {"type": "string"},
                "channel_id": {"type": "string"},
                "body": {"type": "string"}
            },
            "required": ["format_id", "channel_id", "body"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> anyhow::Result<ToolOutput> {
        let format_id = input
            .get("format_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing `format_id`"))?;
        let channel_id = input
            .get("channel_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing `channel_id`"))?;
        let body = input
            .get("body")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing `body`"))?
            .to_string();

        let now = Utc::now();
        let asset_id = AssetRecord::derive_id(&ctx.job_id, format_id, channel_id);
        let mut record = ctx
            .store
            .get::<AssetRecord>(collections::JOB_ASSETS, &asset_id)
            .await?
            .unwrap_or_else(|| AssetRecord::new(&ctx.job_id, format_id, channel_id, ArtifactType::Text, now));
        record.status = AssetStatus::Ready;
        record.content = Some(AssetContent::Text { body });
        record.updated_at = now;
        ctx.store.save(collections::JOB_ASSETS, &asset_id, &record).await?;

        Ok(ToolOutput::ok_with_action(
            json!({ "asset": record }),
            Action::AssetUpdate { job_id: ctx.job_id.clone(), asset_id },
        ))
    }
}

// ---------------------------------------------------------------------
// Company context tools
// ---------------------------------------------------------------------

pub struct ConfirmCompanyNameTool;

#[async_trait]
impl CopilotTool for ConfirmCompanyNameTool {
    fn name(&self) -> &'static str {
        "confirm_company_name"
    }

    fn description(&self) -> &'static str {
        "Records whether the user approved the company name resolved for this job."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "company_id": {"type": "string"},
                "approved": {"type": "boolean"}
            },
            "required": ["company_id", "approved"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> anyhow::Result<ToolOutput> {
        let company_id = input
            .get("company_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing `company_id`"))?
            .to_string();
        let approved = input.get("approved").and_then(|v| v.as_bool()).unwrap_or(false);

        let now = Utc::now();
        let mut context = ctx
            .company_intel
            .load(&company_id)
            .await?
            .context
            .unwrap_or_else(|| CompanyContext::empty(&company_id, now));
        context.profile.name_confirmed = approved;
        context.updated_at = now;
        ctx.company_intel.save(&context).await?;

        Ok(ToolOutput::ok(json!({ "company_context": context })))
    }
}

pub struct FetchCompanyOverviewTool;

#[async_trait]
impl CopilotTool for FetchCompanyOverviewTool {
    fn name(&self) -> &'static str {
        "fetch_company_overview"
    }

    fn description(&self) -> &'static str {
        "Returns the cached company profile and discovered jobs for grounding."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "company_id": {"type": "string"} },
            "required": ["company_id"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> anyhow::Result<ToolOutput> {
        let company_id = input
            .get("company_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing `company_id`"))?;
        let lookup = ctx.company_intel.load(company_id).await?;
        Ok(ToolOutput::ok(json!({
            "company_context": lookup.context,
            "freshness": format!("{:?}", lookup.freshness),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_store::InMemoryStore;

    fn ctx(store: Arc<dyn DocumentStore>, job_id: &str) -> ToolContext {
        ToolContext {
            company_intel: Arc::new(CompanyIntelLoader::new(store.clone())),
            store,
            user_id: "u1".to_string(),
            job_id: job_id.to_string(),
            cache: JobCache::new(),
        }
    }

    async fn seed_job(store: &Arc<dyn DocumentStore>, job_id: &str) {
        let job = Job::new(job_id, "u1", Utc::now());
        store.save(collections::JOBS, job_id, &job).await.unwrap();
    }

    #[tokio::test]
    async fn update_job_field_normalizes_comma_separated_benefits() {
        let store = InMemoryStore::new() as Arc<dyn DocumentStore>;
        seed_job(&store, "j1").await;
        let registry = ToolRegistry::new();
        let context = ctx(store.clone(), "j1");

        let out = registry
            .execute(
                "update_job_field",
                &context,
                json!({ "field_id": "benefits", "value": "Remote, Equity, 4-day week" }),
            )
            .await
            .unwrap();
        assert_eq!(out.status, "ok");
        assert!(matches!(out.action, Some(Action::FieldUpdate { .. })));

        let job: Job = store.get(collections::JOBS, "j1").await.unwrap().unwrap();
        assert_eq!(job.intake.benefits, vec!["Remote", "Equity", "4-day week"]);
    }

    #[tokio::test]
    async fn update_job_fields_batch_applies_all_fields_and_returns_batch_action() {
        let store = InMemoryStore::new() as Arc<dyn DocumentStore>;
        seed_job(&store, "j1").await;
        let registry = ToolRegistry::new();
        let context = ctx(store.clone(), "j1");

        let out = registry
            .execute(
                "update_job_fields_batch",
                &context,
                json!({ "fields": { "role_title": "Staff Engineer", "location": "Remote" } }),
            )
            .await
            .unwrap();
        assert!(matches!(out.action, Some(Action::FieldBatchUpdate { .. })));

        let job: Job = store.get(collections::JOBS, "j1").await.unwrap().unwrap();
        assert_eq!(job.intake.role_title, "Staff Engineer");
        assert_eq!(job.intake.location, "Remote");
    }

    #[tokio::test]
    async fn accept_suggestion_applies_candidate_proposal() {
        let store = InMemoryStore::new() as Arc<dyn DocumentStore>;
        seed_job(&store, "j1").await;
        let mut doc = SuggestionDocument::empty("j1", Utc::now());
        doc.candidates.insert(
            "role_title".to_string(),
            gateway_types::Candidate {
                proposal: json!("Senior Backend Engineer"),
                rationale: "matches intake".to_string(),
                confidence: 0.8,
            },
        );
        store.save(collections::JOB_SUGGESTIONS, "j1", &doc).await.unwrap();

        let registry = ToolRegistry::new();
        let context = ctx(store.clone(), "j1");
        let out = registry
            .execute("accept_suggestion", &context, json!({ "field_id": "role_title" }))
            .await
            .unwrap();
        assert_eq!(out.status, "ok");

        let job: Job = store.get(collections::JOBS, "j1").await.unwrap().unwrap();
        assert_eq!(job.intake.role_title, "Senior Backend Engineer");
    }

    #[tokio::test]
    async fn confirm_company_name_then_fetch_overview_reports_confirmed() {
        let store = InMemoryStore::new() as Arc<dyn DocumentStore>;
        let registry = ToolRegistry::new();
        let context = ctx(store.clone(), "j1");

        registry
            .execute(
                "confirm_company_name",
                &context,
                json!({ "company_id": "acme", "approved": true }),
            )
            .await
            .unwrap();

        let out = registry
            .execute("fetch_company_overview", &context, json!({ "company_id": "acme" }))
            .await
            .unwrap();
        assert_eq!(
            out.result["company_context"]["profile"]["name_confirmed"],
            json!(true)
        );
    }

    #[tokio::test]
    async fn unknown_field_id_returns_error_status_not_err() {
        let store = InMemoryStore::new() as Arc<dyn DocumentStore>;
        seed_job(&store, "j1").await;
        let registry = ToolRegistry::new();
        let context = ctx(store.clone(), "j1");

        let out = registry
            .execute("update_job_field", &context, json!({ "field_id": "nonsense", "value": "x" }))
            .await
            .unwrap();
        assert_eq!(out.status, "error");
    }
}
