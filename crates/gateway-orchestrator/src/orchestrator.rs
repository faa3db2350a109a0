//! C6 Task Orchestrator — the `runTask(taskType, context, caller)` pipeline
//! (§4.1): validate -> enrich -> reserve -> resolve -> gate -> invoke ->
//! post-process -> persist -> commit/refund -> emit usage -> return.
//!
//! Dispatch is a flat match over `TaskType` (§9 "dynamic dispatch by
//! taskType") rather than a trait-object table: the dozen task handlers share
//! almost no code beyond the document load/cache/invoke/persist skeleton each
//! one inlines, so a registry of boxed closures would just hide that skeleton
//! behind an extra layer of indirection without saving anything.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use gateway_store::{collections, DocumentStore, TypedStore};
use gateway_types::{
    AssetContent, AssetRecord, AssetStatus, ArtifactType, Caller, ChannelRecommendation,
    ChannelRecommendationsDocument, CompanyContext, CompanyProfile, DiscoveredJob, ErrorKind,
    FailureEnvelope, GatewayError, Job, JobIntake, RefinementDocument, SuggestionDocument,
    TaskResult, TaskType,
};
use serde_json::{json, Value};

use crate::company_intel::CompanyIntelLoader;
use crate::context::{
    self, AssetAdaptContext, AssetChannelBatchContext, AssetMasterContext, ChannelsContext,
    CompanyIntelContext, GenerateCampaignAssetsContext, HeroImageContext,
    ImageCaptionContext, ImageGenerationContext, ImagePromptGenerationContext, RefineContext,
    SuggestContext,
};
use crate::invoker::ProviderInvoker;

pub struct Orchestrator {
    pub store: Arc<dyn DocumentStore>,
    pub invoker: Arc<ProviderInvoker>,
    pub company_intel: Arc<CompanyIntelLoader>,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn DocumentStore>, invoker: Arc<ProviderInvoker>) -> Self {
        Self {
            company_intel: Arc::new(CompanyIntelLoader::new(store.clone())),
            store,
            invoker,
        }
    }

    pub async fn run_task(
        &self,
        task_type: TaskType,
        raw_context: Value,
        caller: Caller,
    ) -> Result<TaskResult, GatewayError> {
        match task_type {
            TaskType::Suggest => self.run_suggest(raw_context, &caller).await,
            TaskType::Refine => self.run_refine(raw_context, &caller).await,
            TaskType::Channels => self.run_channels(raw_context, &caller).await,
            TaskType::AssetMaster => self.run_asset_master(raw_context, &caller).await,
            TaskType::AssetChannelBatch => self.run_asset_channel_batch(raw_context, &caller).await,
            TaskType::AssetAdapt => self.run_asset_adapt(raw_context, &caller).await,
            TaskType::CompanyIntel => self.run_company_intel(raw_context, &caller).await,
            TaskType::ImagePromptGeneration => {
                self.run_image_prompt_generation(raw_context, &caller).await
            }
            TaskType::ImageGeneration => self.run_image_generation(raw_context, &caller).await,
            TaskType::ImageCaption => self.run_image_caption(raw_context, &caller).await,
            TaskType::HeroImage => self.run_hero_image(raw_context, &caller).await,
            TaskType::GenerateCampaignAssets => {
                self.run_generate_campaign_assets(raw_context, &caller).await
            }
            other => Err(GatewayError::new(
                ErrorKind::InvalidContext,
                format!("task `{}` is not dispatched through run_task", other.as_str()),
            )),
        }
    }

    async fn load_job(&self, job_id: &str) -> Result<Job, GatewayError> {
        context::require_job_id(job_id)?;
        self.store
            .get::<Job>(collections::JOBS, job_id)
            .await
            .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))?
            .ok_or_else(|| GatewayError::new(ErrorKind::NotFound, format!("job {job_id} not found")))
    }

    /// Slugifies `company_name` into the best-effort company identity the
    /// Company-Intel cache is keyed on (jobs carry a name, not a foreign key).
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
                .map(|ctx| {
                    format!(
                        "{} ({}): {}",
                        ctx.profile.name, ctx.profile.industry, ctx.profile.summary
                    )
                })
                .unwrap_or_default(),
            Err(_) => String::new(),
        }
    }

    /// §4.1 cache-invalidation key: the required intake fields a suggestion,
    /// refinement, or channel-recommendation document was generated against.
    fn intake_snapshot(intake: &JobIntake) -> HashMap<String, String> {
        let mut snapshot = HashMap::new();
        snapshot.insert("role_title".to_string(), intake.role_title.clone());
        snapshot.insert("company_name".to_string(), intake.company_name.clone());
        snapshot.insert("location".to_string(), intake.location.clone());
        snapshot.insert(
            "seniority_level".to_string(),
            intake.seniority_level.map(|v| format!("{v:?}")).unwrap_or_default(),
        );
        snapshot.insert(
            "employment_type".to_string(),
            intake.employment_type.map(|v| format!("{v:?}")).unwrap_or_default(),
        );
        snapshot.insert("job_description".to_string(), intake.job_description.clone());
        snapshot
    }

    fn failure_envelope(error: &gateway_types::ProviderInvokeError) -> FailureEnvelope {
        FailureEnvelope {
            reason: error.reason.clone(),
            raw_preview: error.raw_preview.clone(),
            error: error.message.clone(),
            occurred_at: Utc::now(),
        }
    }

    // ---- suggest ------------------------------------------------------

    async fn run_suggest(&self, raw: Value, caller: &Caller) -> Result<TaskResult, GatewayError> {
        let ctx: SuggestContext = context::parse_context(&raw)?;
        context::require_job_id(&ctx.job_id)?;
        let job = self.load_job(&ctx.job_id).await?;
        let now = Utc::now();

        let mut doc = self
            .store
            .get::<SuggestionDocument>(collections::JOB_SUGGESTIONS, &ctx.job_id)
            .await
            .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))?
            .unwrap_or_else(|| SuggestionDocument::empty(&ctx.job_id, now));

        let snapshot = Self::intake_snapshot(&job.intake);
        let cache_hit = !ctx.skip_llm
            && !ctx.force_refresh
            && !doc.candidates.is_empty()
            && doc.generated_against == snapshot
            && !doc.has_failure();

        if ctx.skip_llm || cache_hit {
            return Ok(TaskResult {
                job_id: ctx.job_id,
                payload: json!({ "candidates": doc.candidates }),
                refreshed: false,
                updated_at: doc.updated_at,
                failure: doc.last_failure.clone(),
            });
        }

        let spec = self.invoker.prompts.resolve(TaskType::Suggest);
        let company_context = self.company_context_text(&job).await;
        let visible_field_ids = if ctx.visible_field_ids.is_empty() {
            "role_title,company_name,location,seniority_level,employment_type,job_description".to_string()
        } else {
            ctx.visible_field_ids.join(",")
        };
        let mut vars = HashMap::new();
        vars.insert("role_title", job.intake.role_title.clone());
        vars.insert("company_name", job.intake.company_name.clone());
        vars.insert("location", job.intake.location.clone());
        vars.insert("visible_field_ids", visible_field_ids);
        vars.insert(
            "job_snapshot",
            serde_json::to_string(&job.intake).unwrap_or_default(),
        );
        vars.insert("company_context", company_context);
        let prompt = spec.render(&vars);

        let outcome = self
            .invoker
            .call(
                TaskType::Suggest,
                String::new(),
                prompt,
                spec.output_schema.clone(),
                spec.output_schema_name.map(str::to_string),
                vec![],
                caller,
            )
            .await?;

        if let Some(error) = &outcome.response.error {
            doc.last_failure = Some(Self::failure_envelope(error));
            doc.updated_at = now;
            self.store
                .save(collections::JOB_SUGGESTIONS, &ctx.job_id, &doc)
                .await
                .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))?;
            self.invoker.settle(&outcome, caller, Some(ctx.job_id.clone())).await?;
            return Ok(TaskResult {
                job_id: ctx.job_id,
                payload: json!({ "candidates": doc.candidates }),
                refreshed: false,
                updated_at: doc.updated_at,
                failure: doc.last_failure.clone(),
            });
        }

        let candidates = outcome
            .response
            .parsed
            .as_ref()
            .and_then(|v| v.get("candidates"))
            .cloned()
            .unwrap_or_else(|| json!({}));
        doc.candidates = serde_json::from_value(candidates).unwrap_or_default();
        doc.provider = Some(outcome.provider_id.clone());
        doc.model = Some(outcome.model_id.clone());
        doc.last_failure = None;
        doc.generated_against = snapshot;
        doc.updated_at = now;
        self.store
            .save(collections::JOB_SUGGESTIONS, &ctx.job_id, &doc)
            .await
            .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))?;

        self.invoker.settle(&outcome, caller, Some(ctx.job_id.clone())).await?;

        Ok(TaskResult {
            job_id: ctx.job_id,
            payload: json!({ "candidates": doc.candidates }),
            refreshed: true,
            updated_at: doc.updated_at,
            failure: None,
        })
    }

    // ---- refine ---------------------------------------------------------

    async fn run_refine(&self, raw: Value, caller: &Caller) -> Result<TaskResult, GatewayError> {
        let ctx: RefineContext = context::parse_context(&raw)?;
        context::require_job_id(&ctx.job_id)?;
        let job = self.load_job(&ctx.job_id).await?;
        let now = Utc::now();

        if !job.state_machine.required_complete {
            return Err(GatewayError::new(
                ErrorKind::RequirementsIncomplete,
                "required intake fields must be complete before refinement",
            ));
        }

        let mut doc = self
            .store
            .get::<RefinementDocument>(collections::JOB_REFINEMENTS, &ctx.job_id)
            .await
            .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))?
            .unwrap_or_else(|| RefinementDocument::empty(&ctx.job_id, now));

        // RefinementDocument carries no generated_against snapshot (unlike
        // SuggestionDocument) since refinement only ever runs once intake is
        // required-complete: a prior non-empty refinement is cache-valid
        // until the caller explicitly re-requests it.
        let already_refined = !doc.refined_job.role_title.is_empty() || !doc.summary.is_empty();
        let cache_hit = !ctx.skip_llm && !ctx.force_refresh && already_refined && !doc.has_failure();

        if ctx.skip_llm || cache_hit {
            return Ok(TaskResult {
                job_id: ctx.job_id,
                payload: json!({ "refined_job": doc.refined_job, "summary": doc.summary }),
                refreshed: false,
                updated_at: doc.updated_at,
                failure: doc.last_failure.clone(),
            });
        }

        let spec = self.invoker.prompts.resolve(TaskType::Refine);
        let mut vars = HashMap::new();
        vars.insert(
            "job_snapshot",
            serde_json::to_string(&job.intake).unwrap_or_default(),
        );
        let prompt = spec.render(&vars);

        let outcome = self
            .invoker
            .call(
                TaskType::Refine,
                String::new(),
                prompt,
                spec.output_schema.clone(),
                spec.output_schema_name.map(str::to_string),
                vec![],
                caller,
            )
            .await?;

        if let Some(error) = &outcome.response.error {
            doc.last_failure = Some(Self::failure_envelope(error));
            doc.updated_at = now;
            self.store
                .save(collections::JOB_REFINEMENTS, &ctx.job_id, &doc)
                .await
                .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))?;
            self.invoker.settle(&outcome, caller, Some(ctx.job_id.clone())).await?;
            return Ok(TaskResult {
                job_id: ctx.job_id,
                payload: json!({ "refined_job": doc.refined_job, "summary": doc.summary }),
                refreshed: false,
                updated_at: doc.updated_at,
                failure: doc.last_failure.clone(),
            });
        }

        let parsed = outcome.response.parsed.clone().unwrap_or_else(|| json!({}));
        doc.refined_job = parsed
            .get("refined_job")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        doc.summary = parsed
            .get("summary")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        doc.provider = Some(outcome.provider_id.clone());
        doc.model = Some(outcome.model_id.clone());
        doc.last_failure = None;
        doc.updated_at = now;
        self.store
            .save(collections::JOB_REFINEMENTS, &ctx.job_id, &doc)
            .await
            .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))?;

        self.invoker.settle(&outcome, caller, Some(ctx.job_id.clone())).await?;

        Ok(TaskResult {
            job_id: ctx.job_id,
            payload: json!({ "refined_job": doc.refined_job, "summary": doc.summary }),
            refreshed: true,
            updated_at: doc.updated_at,
            failure: None,
        })
    }

    // ---- channels ---------------------------------------------------------

    async fn run_channels(&self, raw: Value, caller: &Caller) -> Result<TaskResult, GatewayError> {
        let ctx: ChannelsContext = context::parse_context(&raw)?;
        context::require_job_id(&ctx.job_id)?;
        let job = self.load_job(&ctx.job_id).await?;
        let now = Utc::now();

        let mut doc = self
            .store
            .get::<ChannelRecommendationsDocument>(collections::JOB_CHANNEL_RECOMMENDATIONS, &ctx.job_id)
            .await
            .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))?
            .unwrap_or_else(|| ChannelRecommendationsDocument::empty(&ctx.job_id, now));

        let cache_hit = !ctx.skip_llm && !ctx.force_refresh && !doc.recommendations.is_empty() && !doc.has_failure();
        if ctx.skip_llm || cache_hit {
            return Ok(TaskResult {
                job_id: ctx.job_id,
                payload: json!({ "recommendations": doc.recommendations }),
                refreshed: false,
                updated_at: doc.updated_at,
                failure: doc.last_failure.clone(),
            });
        }

        let refinement = self
            .store
            .get::<RefinementDocument>(collections::JOB_REFINEMENTS, &ctx.job_id)
            .await
            .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))?;

        let spec = self.invoker.prompts.resolve(TaskType::Channels);
        let mut vars = HashMap::new();
        vars.insert(
            "job_snapshot",
            serde_json::to_string(&job.intake).unwrap_or_default(),
        );
        vars.insert(
            "refinement_snapshot",
            refinement
                .as_ref()
                .map(|r| r.summary.clone())
                .unwrap_or_default(),
        );
        let prompt = spec.render(&vars);

        let outcome = self
            .invoker
            .call(
                TaskType::Channels,
                String::new(),
                prompt,
                spec.output_schema.clone(),
                spec.output_schema_name.map(str::to_string),
                vec![],
                caller,
            )
            .await?;

        if let Some(error) = &outcome.response.error {
            doc.last_failure = Some(Self::failure_envelope(error));
            doc.updated_at = now;
            self.store
                .save(collections::JOB_CHANNEL_RECOMMENDATIONS, &ctx.job_id, &doc)
                .await
                .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))?;
            self.invoker.settle(&outcome, caller, Some(ctx.job_id.clone())).await?;
            return Ok(TaskResult {
                job_id: ctx.job_id,
                payload: json!({ "recommendations": doc.recommendations }),
                refreshed: false,
                updated_at: doc.updated_at,
                failure: doc.last_failure.clone(),
            });
        }

        let recommendations: Vec<ChannelRecommendation> = outcome
            .response
            .parsed
            .as_ref()
            .and_then(|v| v.get("recommendations"))
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        doc.recommendations = recommendations;
        doc.provider = Some(outcome.provider_id.clone());
        doc.model = Some(outcome.model_id.clone());
        doc.last_failure = None;
        doc.updated_at = now;
        self.store
            .save(collections::JOB_CHANNEL_RECOMMENDATIONS, &ctx.job_id, &doc)
            .await
            .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))?;

        self.invoker.settle(&outcome, caller, Some(ctx.job_id.clone())).await?;

        Ok(TaskResult {
            job_id: ctx.job_id,
            payload: json!({ "recommendations": doc.recommendations }),
            refreshed: true,
            updated_at: doc.updated_at,
            failure: None,
        })
    }

    // ---- assets ---------------------------------------------------------

    async fn persist_asset(
        &self,
        job_id: &str,
        format_id: &str,
        channel_id: &str,
        body: String,
        provider: &str,
        model: &str,
    ) -> Result<AssetRecord, GatewayError> {
        let now = Utc::now();
        let asset_id = AssetRecord::derive_id(job_id, format_id, channel_id);
        let mut record = self
            .store
            .get::<AssetRecord>(collections::JOB_ASSETS, &asset_id)
            .await
            .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))?
            .unwrap_or_else(|| AssetRecord::new(job_id, format_id, channel_id, ArtifactType::Text, now));
        record.status = AssetStatus::Ready;
        record.content = Some(AssetContent::Text { body });
        record.provider = Some(provider.to_string());
        record.model = Some(model.to_string());
        record.updated_at = now;
        self.store
            .save(collections::JOB_ASSETS, &asset_id, &record)
            .await
            .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))?;
        Ok(record)
    }

    async fn run_asset_master(&self, raw: Value, caller: &Caller) -> Result<TaskResult, GatewayError> {
        let ctx: AssetMasterContext = context::parse_context(&raw)?;
        context::require_job_id(&ctx.job_id)?;
        let job = self.load_job(&ctx.job_id).await?;

        let spec = self.invoker.prompts.resolve(TaskType::AssetMaster);
        let mut vars = HashMap::new();
        vars.insert(
            "job_snapshot",
            serde_json::to_string(&job.intake).unwrap_or_default(),
        );
        let prompt = spec.render(&vars);

        let outcome = self
            .invoker
            .call(
                TaskType::AssetMaster,
                String::new(),
                prompt,
                spec.output_schema.clone(),
                spec.output_schema_name.map(str::to_string),
                vec![],
                caller,
            )
            .await?;

        if let Some(error) = &outcome.response.error {
            let envelope = Self::failure_envelope(error);
            self.invoker.settle(&outcome, caller, Some(ctx.job_id.clone())).await?;
            return Ok(TaskResult {
                job_id: ctx.job_id,
                payload: json!({}),
                refreshed: false,
                updated_at: Utc::now(),
                failure: Some(envelope),
            });
        }

        let body = outcome
            .response
            .parsed
            .as_ref()
            .and_then(|v| v.get("body"))
            .and_then(|v| v.as_str())
            .unwrap_or(&outcome.response.text)
            .to_string();
        let record = self
            .persist_asset(&ctx.job_id, "master", "master", body, &outcome.provider_id, &outcome.model_id)
            .await?;

        self.invoker.settle(&outcome, caller, Some(ctx.job_id.clone())).await?;

        Ok(TaskResult {
            job_id: ctx.job_id,
            payload: serde_json::to_value(&record).unwrap_or_default(),
            refreshed: true,
            updated_at: record.updated_at,
            failure: None,
        })
    }

    async fn run_asset_channel_batch(&self, raw: Value, caller: &Caller) -> Result<TaskResult, GatewayError> {
        let ctx: AssetChannelBatchContext = context::parse_context(&raw)?;
        context::require_job_id(&ctx.job_id)?;
        self.load_job(&ctx.job_id).await?;

        let master = self
            .store
            .get::<AssetRecord>(collections::JOB_ASSETS, &AssetRecord::derive_id(&ctx.job_id, "master", "master"))
            .await
            .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))?;
        let master_copy = master
            .and_then(|r| r.content)
            .map(|c| match c {
                AssetContent::Text { body } => body,
                _ => String::new(),
            })
            .unwrap_or_default();

        let spec = self.invoker.prompts.resolve(TaskType::AssetChannelBatch);
        let mut records = Vec::new();
        let mut last_updated = Utc::now();
        for channel_id in &ctx.channel_ids {
            let mut vars = HashMap::new();
            vars.insert("channel_id", channel_id.clone());
            vars.insert("master_copy", master_copy.clone());
            let prompt = spec.render(&vars);

            let outcome = self
                .invoker
                .call(
                    TaskType::AssetChannelBatch,
                    String::new(),
                    prompt,
                    spec.output_schema.clone(),
                    spec.output_schema_name.map(str::to_string),
                    vec![],
                    caller,
                )
                .await?;

            if outcome.response.is_error() {
                self.invoker.settle(&outcome, caller, Some(ctx.job_id.clone())).await?;
                continue;
            }

            let body = outcome
                .response
                .parsed
                .as_ref()
                .and_then(|v| v.get("body"))
                .and_then(|v| v.as_str())
                .unwrap_or(&outcome.response.text)
                .to_string();
            let record = self
                .persist_asset(&ctx.job_id, "channel_copy", channel_id, body, &outcome.provider_id, &outcome.model_id)
                .await?;
            last_updated = record.updated_at;
            self.invoker.settle(&outcome, caller, Some(ctx.job_id.clone())).await?;
            records.push(record);
        }

        Ok(TaskResult {
            job_id: ctx.job_id,
            payload: json!({ "assets": records }),
            refreshed: true,
            updated_at: last_updated,
            failure: None,
        })
    }

    async fn run_asset_adapt(&self, raw: Value, caller: &Caller) -> Result<TaskResult, GatewayError> {
        let ctx: AssetAdaptContext = context::parse_context(&raw)?;
        context::require_job_id(&ctx.job_id)?;
        self.load_job(&ctx.job_id).await?;

        let source = self
            .store
            .get::<AssetRecord>(
                collections::JOB_ASSETS,
                &AssetRecord::derive_id(&ctx.job_id, "channel_copy", &ctx.channel_id),
            )
            .await
            .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))?;
        let source_copy = source
            .and_then(|r| r.content)
            .map(|c| match c {
                AssetContent::Text { body } => body,
                _ => String::new(),
            })
            .unwrap_or_default();

        let spec = self.invoker.prompts.resolve(TaskType::AssetAdapt);
        let mut vars = HashMap::new();
        vars.insert("format_id", ctx.format_id.clone());
        vars.insert("channel_id", ctx.channel_id.clone());
        vars.insert("source_copy", source_copy);
        let prompt = spec.render(&vars);

        let outcome = self
            .invoker
            .call(
                TaskType::AssetAdapt,
                String::new(),
                prompt,
                spec.output_schema.clone(),
                spec.output_schema_name.map(str::to_string),
                vec![],
                caller,
            )
            .await?;

        if let Some(error) = &outcome.response.error {
            let envelope = Self::failure_envelope(error);
            self.invoker.settle(&outcome, caller, Some(ctx.job_id.clone())).await?;
            return Ok(TaskResult {
                job_id: ctx.job_id,
                payload: json!({}),
                refreshed: false,
                updated_at: Utc::now(),
                failure: Some(envelope),
            });
        }

        let body = outcome
            .response
            .parsed
            .as_ref()
            .and_then(|v| v.get("body"))
            .and_then(|v| v.as_str())
            .unwrap_or(&outcome.response.text)
            .to_string();
        let record = self
            .persist_asset(&ctx.job_id, &ctx.format_id, &ctx.channel_id, body, &outcome.provider_id, &outcome.model_id)
            .await?;

        self.invoker.settle(&outcome, caller, Some(ctx.job_id.clone())).await?;

        Ok(TaskResult {
            job_id: ctx.job_id,
            payload: serde_json::to_value(&record).unwrap_or_default(),
            refreshed: true,
            updated_at: record.updated_at,
            failure: None,
        })
    }

    // ---- company intel (C12) --------------------------------------------

    async fn run_company_intel(&self, raw: Value, caller: &Caller) -> Result<TaskResult, GatewayError> {
        let ctx: CompanyIntelContext = context::parse_context(&raw)?;
        context::require_company_id(&ctx.company_id)?;

        let spec = self.invoker.prompts.resolve(TaskType::CompanyIntel);
        let mut vars = HashMap::new();
        vars.insert("company_name", ctx.company_name.clone());
        let prompt = spec.render(&vars);

        let outcome = self
            .invoker
            .call(
                TaskType::CompanyIntel,
                String::new(),
                prompt,
                spec.output_schema.clone(),
                spec.output_schema_name.map(str::to_string),
                spec.grounding_tools.iter().map(|s| s.to_string()).collect(),
                caller,
            )
            .await?;

        if let Some(error) = &outcome.response.error {
            let envelope = Self::failure_envelope(error);
            self.invoker.settle(&outcome, caller, None).await?;
            return Ok(TaskResult {
                job_id: ctx.company_id,
                payload: json!({}),
                refreshed: false,
                updated_at: Utc::now(),
                failure: Some(envelope),
            });
        }

        let parsed = outcome.response.parsed.clone().unwrap_or_else(|| json!({}));
        let now = Utc::now();
        let profile = CompanyProfile {
            company_id: ctx.company_id.clone(),
            name: parsed
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or(&ctx.company_name)
                .to_string(),
            industry: parsed.get("industry").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            summary: parsed.get("summary").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            name_confirmed: true,
        };
        let discovered_jobs: Vec<DiscoveredJob> = parsed
            .get("discovered_jobs")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        let context_doc = CompanyContext {
            company_id: ctx.company_id.clone(),
            profile,
            discovered_jobs,
            schema_version: "1".to_string(),
            updated_at: now,
        };
        self.company_intel
            .save(&context_doc)
            .await
            .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))?;

        self.invoker.settle(&outcome, caller, None).await?;

        Ok(TaskResult {
            job_id: ctx.company_id,
            payload: serde_json::to_value(&context_doc).unwrap_or_default(),
            refreshed: true,
            updated_at: now,
            failure: None,
        })
    }

    // ---- hero image / image sub-steps ------------------------------------

    async fn run_image_prompt_generation(&self, raw: Value, caller: &Caller) -> Result<TaskResult, GatewayError> {
        let ctx: ImagePromptGenerationContext = context::parse_context(&raw)?;
        context::require_job_id(&ctx.job_id)?;
        let job = self.load_job(&ctx.job_id).await?;

        let spec = self.invoker.prompts.resolve(TaskType::ImagePromptGeneration);
        let mut vars = HashMap::new();
        vars.insert(
            "job_snapshot",
            serde_json::to_string(&job.intake).unwrap_or_default(),
        );
        let prompt = spec.render(&vars);

        let outcome = self
            .invoker
            .call(
                TaskType::ImagePromptGeneration,
                String::new(),
                prompt,
                spec.output_schema.clone(),
                spec.output_schema_name.map(str::to_string),
                vec![],
                caller,
            )
            .await?;

        let result = self.text_only_result(&ctx.job_id, &outcome, caller, "image_prompt").await?;
        Ok(result)
    }

    async fn run_image_generation(&self, raw: Value, caller: &Caller) -> Result<TaskResult, GatewayError> {
        let ctx: ImageGenerationContext = context::parse_context(&raw)?;
        context::require_job_id(&ctx.job_id)?;
        self.load_job(&ctx.job_id).await?;

        let spec = self.invoker.prompts.resolve(TaskType::ImageGeneration);
        let mut vars = HashMap::new();
        vars.insert("image_prompt", ctx.image_prompt.clone());
        let prompt = spec.render(&vars);

        let outcome = self
            .invoker
            .call(
                TaskType::ImageGeneration,
                String::new(),
                prompt,
                None,
                None,
                vec![],
                caller,
            )
            .await?;

        if let Some(error) = &outcome.response.error {
            let envelope = Self::failure_envelope(error);
            self.invoker.settle(&outcome, caller, Some(ctx.job_id.clone())).await?;
            return Ok(TaskResult {
                job_id: ctx.job_id,
                payload: json!({}),
                refreshed: false,
                updated_at: Utc::now(),
                failure: Some(envelope),
            });
        }

        let now = Utc::now();
        let asset_id = AssetRecord::derive_id(&ctx.job_id, "hero_image", "master");
        let mut record = self
            .store
            .get::<AssetRecord>(collections::JOB_ASSETS, &asset_id)
            .await
            .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))?
            .unwrap_or_else(|| AssetRecord::new(&ctx.job_id, "hero_image", "master", ArtifactType::Image, now));
        record.status = AssetStatus::Ready;
        record.content = Some(AssetContent::Image {
            url: outcome.response.text.clone(),
            prompt: ctx.image_prompt.clone(),
        });
        record.provider = Some(outcome.provider_id.clone());
        record.model = Some(outcome.model_id.clone());
        record.updated_at = now;
        self.store
            .save(collections::JOB_ASSETS, &asset_id, &record)
            .await
            .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))?;

        self.invoker.settle(&outcome, caller, Some(ctx.job_id.clone())).await?;

        Ok(TaskResult {
            job_id: ctx.job_id,
            payload: serde_json::to_value(&record).unwrap_or_default(),
            refreshed: true,
            updated_at: now,
            failure: None,
        })
    }

    async fn run_image_caption(&self, raw: Value, caller: &Caller) -> Result<TaskResult, GatewayError> {
        let ctx: ImageCaptionContext = context::parse_context(&raw)?;
        context::require_job_id(&ctx.job_id)?;
        self.load_job(&ctx.job_id).await?;

        let spec = self.invoker.prompts.resolve(TaskType::ImageCaption);
        let mut vars = HashMap::new();
        vars.insert("image_prompt", ctx.image_prompt.clone());
        let prompt = spec.render(&vars);

        let outcome = self
            .invoker
            .call(
                TaskType::ImageCaption,
                String::new(),
                prompt,
                spec.output_schema.clone(),
                spec.output_schema_name.map(str::to_string),
                vec![],
                caller,
            )
            .await?;

        if let Some(error) = &outcome.response.error {
            let envelope = Self::failure_envelope(error);
            self.invoker.settle(&outcome, caller, Some(ctx.job_id.clone())).await?;
            return Ok(TaskResult {
                job_id: ctx.job_id,
                payload: json!({}),
                refreshed: false,
                updated_at: Utc::now(),
                failure: Some(envelope),
            });
        }

        let payload = outcome.response.parsed.clone().unwrap_or_else(|| json!({ "text": outcome.response.text }));
        let now = Utc::now();
        self.invoker.settle(&outcome, caller, Some(ctx.job_id.clone())).await?;
        Ok(TaskResult {
            job_id: ctx.job_id,
            payload,
            refreshed: true,
            updated_at: now,
            failure: None,
        })
    }

    async fn text_only_result(
        &self,
        job_id: &str,
        outcome: &crate::invoker::CallOutcome,
        caller: &Caller,
        field: &str,
    ) -> Result<TaskResult, GatewayError> {
        let now = Utc::now();
        if let Some(error) = &outcome.response.error {
            let envelope = Self::failure_envelope(error);
            self.invoker.settle(outcome, caller, Some(job_id.to_string())).await?;
            return Ok(TaskResult {
                job_id: job_id.to_string(),
                payload: json!({}),
                refreshed: false,
                updated_at: now,
                failure: Some(envelope),
            });
        }
        let body = outcome
            .response
            .parsed
            .as_ref()
            .and_then(|v| v.get("body"))
            .and_then(|v| v.as_str())
            .unwrap_or(&outcome.response.text)
            .to_string();
        self.invoker.settle(outcome, caller, Some(job_id.to_string())).await?;
        Ok(TaskResult {
            job_id: job_id.to_string(),
            payload: json!({ field: body }),
            refreshed: true,
            updated_at: now,
            failure: None,
        })
    }

    // ---- composite orchestrator tasks ------------------------------------

    /// hero_image = image_prompt_generation -> image_generation -> image_caption,
    /// each sub-call metered and persisted independently (§4.1.1).
    async fn run_hero_image(&self, raw: Value, caller: &Caller) -> Result<TaskResult, GatewayError> {
        let ctx: HeroImageContext = context::parse_context(&raw)?;
        context::require_job_id(&ctx.job_id)?;

        let prompt_result = self
            .run_image_prompt_generation(json!({ "jobId": ctx.job_id }), caller)
            .await?;
        if prompt_result.failure.is_some() {
            return Ok(prompt_result);
        }
        let image_prompt = prompt_result
            .payload
            .get("image_prompt")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let image_result = self
            .run_image_generation(
                json!({ "jobId": ctx.job_id, "imagePrompt": image_prompt.clone() }),
                caller,
            )
            .await?;
        if image_result.failure.is_some() {
            return Ok(image_result);
        }

        let caption_result = self
            .run_image_caption(json!({ "jobId": ctx.job_id, "imagePrompt": image_prompt }), caller)
            .await?;

        Ok(TaskResult {
            job_id: ctx.job_id,
            payload: json!({ "asset": image_result.payload, "caption": caption_result.payload }),
            refreshed: true,
            updated_at: caption_result.updated_at,
            failure: caption_result.failure,
        })
    }

    /// generate_campaign_assets = asset_master -> asset_channel_batch over
    /// every requested channel (§4.1.1).
    async fn run_generate_campaign_assets(&self, raw: Value, caller: &Caller) -> Result<TaskResult, GatewayError> {
        let ctx: GenerateCampaignAssetsContext = context::parse_context(&raw)?;
        context::require_job_id(&ctx.job_id)?;

        let master_result = self
            .run_asset_master(json!({ "jobId": ctx.job_id }), caller)
            .await?;
        if master_result.failure.is_some() {
            return Ok(master_result);
        }

        let batch_result = self
            .run_asset_channel_batch(
                json!({ "jobId": ctx.job_id, "channelIds": ctx.channel_ids }),
                caller,
            )
            .await?;

        Ok(TaskResult {
            job_id: ctx.job_id,
            payload: json!({ "master": master_result.payload, "channels": batch_result.payload }),
            refreshed: true,
            updated_at: batch_result.updated_at,
            failure: batch_result.failure,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_types::{EmploymentType, SeniorityLevel};

    fn now() -> chrono::DateTime<Utc> {
        "2026-01-01T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn intake_snapshot_changes_when_a_required_field_changes() {
        let mut job = Job::new("j1", "u1", now());
        job.intake.role_title = "Senior Backend Engineer".to_string();
        job.intake.company_name = "Acme".to_string();
        job.intake.location = "Berlin".to_string();
        job.intake.seniority_level = Some(SeniorityLevel::Senior);
        job.intake.employment_type = Some(EmploymentType::FullTime);
        job.intake.job_description = "Own ingestion.".to_string();

        let before = Orchestrator::intake_snapshot(&job.intake);
        job.intake.role_title = "Staff Backend Engineer".to_string();
        let after = Orchestrator::intake_snapshot(&job.intake);
        assert_ne!(before, after);
    }

    #[test]
    fn intake_snapshot_is_stable_for_unchanged_intake() {
        let mut job = Job::new("j1", "u1", now());
        job.intake.role_title = "Senior Backend Engineer".to_string();
        let a = Orchestrator::intake_snapshot(&job.intake);
        let b = Orchestrator::intake_snapshot(&job.intake);
        assert_eq!(a, b);
    }

    #[test]
    fn company_id_slugifies_name_and_is_none_when_blank() {
        let mut job = Job::new("j1", "u1", now());
        job.intake.company_name = "  Acme, Inc.  ".to_string();
        assert_eq!(Orchestrator::company_id_for(&job).as_deref(), Some("acme--inc-"));

        job.intake.company_name = "   ".to_string();
        assert_eq!(Orchestrator::company_id_for(&job), None);
    }
}
