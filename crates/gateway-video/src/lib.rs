//! Video Generation Pipeline (§4.3, C9-C11): manifest build -> storyboard ->
//! compliance -> caption -> segmented multi-extend render -> polling ->
//! artifact persistence. `video_*` task types are not dispatched through
//! `gateway_orchestrator::Orchestrator::run_task` (§4.1.1 scopes that
//! pipeline to the core suggest/refine/asset/image family) — `VideoService`
//! is the sibling entry point the HTTP layer calls for every `/videos` route
//! and the `video_create_manifest`/`video_regenerate`/`video_caption_update`/
//! `video_render` orchestrator task types (§6).

pub mod manifest;
pub mod render;
pub mod segment_planner;

pub use manifest::build_manifest;
pub use render::RenderController;
pub use segment_planner::{plan_segments, recap_summary, segment_prompt, SegmentContext};

use std::sync::Arc;

use chrono::Utc;
use gateway_config::AppConfig;
use gateway_ledger::CreditLedger;
use gateway_orchestrator::ProviderInvoker;
use gateway_providers::ProviderRegistry;
use gateway_store::{collections, DocumentStore, TypedStore};
use gateway_types::{Caller, ErrorKind, GatewayError, Job, VideoItem, VideoStatus};
use uuid::Uuid;

pub struct VideoService {
    store: Arc<dyn DocumentStore>,
    invoker: Arc<ProviderInvoker>,
    render: RenderController,
}

impl VideoService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        invoker: Arc<ProviderInvoker>,
        providers: Arc<ProviderRegistry>,
        ledger: Arc<CreditLedger>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            render: RenderController::new(store.clone(), providers, ledger, config),
            store,
            invoker,
        }
    }

    async fn load_job(&self, job_id: &str, caller: &Caller) -> Result<Job, GatewayError> {
        let job = self
            .store
            .get::<Job>(collections::JOBS, job_id)
            .await
            .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))?
            .ok_or_else(|| GatewayError::new(ErrorKind::NotFound, format!("job {job_id} not found")))?;
        if job.owner_user_id != caller.user_id {
            return Err(GatewayError::new(ErrorKind::Forbidden, "caller does not own this job"));
        }
        Ok(job)
    }

    pub async fn load(&self, video_id: &str) -> Result<VideoItem, GatewayError> {
        self.store
            .get::<VideoItem>(collections::VIDEOS, video_id)
            .await
            .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))?
            .ok_or_else(|| GatewayError::new(ErrorKind::NotFound, format!("video {video_id} not found")))
    }

    async fn save(&self, item: &VideoItem) -> Result<(), GatewayError> {
        self.store
            .save(collections::VIDEOS, &item.video_id, item)
            .await
            .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))
    }

    /// §4.3 "create (manifest build)". Always allocates a fresh `videoId` —
    /// callers that want to refresh an existing item's manifest use
    /// `regenerate` instead.
    pub async fn create(&self, job_id: &str, channel_id: &str, caller: &Caller) -> Result<VideoItem, GatewayError> {
        let job = self.load_job(job_id, caller).await?;
        let now = Utc::now();
        let video_id = Uuid::new_v4().to_string();
        let mut item = VideoItem::new(video_id, job_id, channel_id, now);
        let manifest = build_manifest(&self.invoker, &job, channel_id, caller).await?;
        item.active_manifest = Some(manifest);
        self.save(&item).await?;
        Ok(item)
    }

    /// §4.3 "regenerate": re-runs the manifest build and overwrites
    /// `activeManifest`. Resets `status` back to `planned` directly rather
    /// than through `VideoItem::transition_status` — the guarded DAG has no
    /// edge back to `Planned` from a rendered state, but §8's testable
    /// property ("no transition ready -> generating except through explicit
    /// regenerate, which goes via planned") only holds if regenerate is the
    /// one place that bypasses the guard, discarding whatever render state
    /// existed under the old manifest (documented in DESIGN.md).
    pub async fn regenerate(&self, video_id: &str, caller: &Caller) -> Result<VideoItem, GatewayError> {
        let mut item = self.load(video_id).await?;
        let job = self.load_job(&item.job_id, caller).await?;
        let manifest = build_manifest(&self.invoker, &job, &item.channel_id, caller).await?;
        item.active_manifest = Some(manifest);
        item.status = VideoStatus::Planned;
        item.render_task = Default::default();
        item.updated_at = Utc::now().max(item.updated_at);
        self.save(&item).await?;
        Ok(item)
    }

    /// §4.3 "caption update": edits the caption atomically without
    /// re-rendering, regardless of the item's render status.
    pub async fn update_caption(
        &self,
        video_id: &str,
        caller: &Caller,
        text: String,
        hashtags: Vec<String>,
    ) -> Result<VideoItem, GatewayError> {
        let mut item = self.load(video_id).await?;
        self.load_job(&item.job_id, caller).await?;
        let manifest = item
            .active_manifest
            .as_mut()
            .ok_or_else(|| GatewayError::new(ErrorKind::InvalidContext, "video item has no manifest"))?;
        manifest.caption.text = text;
        manifest.caption.hashtags = hashtags;
        item.updated_at = Utc::now().max(item.updated_at);
        self.save(&item).await?;
        Ok(item)
    }

    /// §4.3 "render (trigger)" + the client-triggered refresh model (§9):
    /// both the explicit trigger and the polling `fetch` below route through
    /// the same `RenderController::trigger`, which is idempotent on an
    /// already-submitted segment.
    pub async fn trigger_render(&self, video_id: &str, caller: &Caller) -> Result<VideoItem, GatewayError> {
        let item = self.load(video_id).await?;
        self.load_job(&item.job_id, caller).await?;
        self.render.trigger(item, caller).await
    }

    pub async fn retry_render(&self, video_id: &str, caller: &Caller) -> Result<VideoItem, GatewayError> {
        let item = self.load(video_id).await?;
        self.load_job(&item.job_id, caller).await?;
        self.render.retry(item, caller).await
    }

    /// `GET /videos/:id` — a poll tick for whatever segment is in flight.
    pub async fn fetch(&self, video_id: &str, caller: &Caller) -> Result<VideoItem, GatewayError> {
        let item = self.load(video_id).await?;
        self.load_job(&item.job_id, caller).await?;
        match item.status {
            VideoStatus::Generating | VideoStatus::Extending => self.render.trigger(item, caller).await,
            _ => Ok(item),
        }
    }

    pub async fn list_for_job(&self, job_id: &str, caller: &Caller) -> Result<Vec<VideoItem>, GatewayError> {
        self.load_job(job_id, caller).await?;
        let all: Vec<VideoItem> = self
            .store
            .list(collections::VIDEOS)
            .await
            .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))?;
        Ok(all.into_iter().filter(|v| v.job_id == job_id).collect())
    }

    /// §4.3 "approve / publish: pure status transitions from `ready`".
    pub async fn approve(&self, video_id: &str, caller: &Caller) -> Result<VideoItem, GatewayError> {
        let mut item = self.load(video_id).await?;
        self.load_job(&item.job_id, caller).await?;
        item.transition_status(VideoStatus::Approved, Utc::now())
            .map_err(|e| GatewayError::new(ErrorKind::InvalidContext, e))?;
        self.save(&item).await?;
        Ok(item)
    }

    pub async fn publish(&self, video_id: &str, caller: &Caller) -> Result<VideoItem, GatewayError> {
        let mut item = self.load(video_id).await?;
        self.load_job(&item.job_id, caller).await?;
        item.transition_status(VideoStatus::Published, Utc::now())
            .map_err(|e| GatewayError::new(ErrorKind::InvalidContext, e))?;
        self.save(&item).await?;
        Ok(item)
    }

    pub async fn archive(&self, video_id: &str, caller: &Caller) -> Result<VideoItem, GatewayError> {
        let mut item = self.load(video_id).await?;
        self.load_job(&item.job_id, caller).await?;
        item.transition_status(VideoStatus::Archived, Utc::now())
            .map_err(|e| GatewayError::new(ErrorKind::InvalidContext, e))?;
        self.save(&item).await?;
        Ok(item)
    }

    /// `POST /videos/bulk` (§6) — applies the same action to several videos,
    /// collecting per-id failures rather than aborting the batch on the
    /// first one (mirrors the tool-registry's per-tool error isolation in
    /// `gateway-tools`, generalized to a batch of ids instead of a batch of
    /// tool calls).
    pub async fn bulk(
        &self,
        video_ids: &[String],
        action: BulkAction,
        caller: &Caller,
    ) -> Vec<(String, Result<VideoItem, GatewayError>)> {
        let mut results = Vec::with_capacity(video_ids.len());
        for video_id in video_ids {
            let outcome = match action {
                BulkAction::Approve => self.approve(video_id, caller).await,
                BulkAction::Publish => self.publish(video_id, caller).await,
                BulkAction::Archive => self.archive(video_id, caller).await,
                BulkAction::TriggerRender => self.trigger_render(video_id, caller).await,
            };
            results.push((video_id.clone(), outcome));
        }
        results
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkAction {
    Approve,
    Publish,
    Archive,
    TriggerRender,
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_prompts::PromptRegistry;
    use gateway_store::InMemoryStore;
    use gateway_types::{
        Caption, Compliance, RenderPlan, RenderStrategy, SegmentSpec, Shot, ShotPhase, Storyboard,
        VideoManifest,
    };

    fn service(store: Arc<dyn DocumentStore>) -> VideoService {
        let config = Arc::new(AppConfig::from_env().expect("config"));
        let providers = Arc::new(ProviderRegistry::from_env());
        let prompts = Arc::new(PromptRegistry::bootstrap());
        let ledger = Arc::new(CreditLedger::new(store.clone(), config.clone()));
        let invoker = Arc::new(ProviderInvoker::new(providers.clone(), prompts, ledger.clone(), config.clone()));
        VideoService::new(store, invoker, providers, ledger, config)
    }

    fn caller() -> Caller {
        Caller {
            user_id: "u1".to_string(),
            correlation_id: "c1".to_string(),
        }
    }

    async fn seed_job(store: &Arc<dyn DocumentStore>, job_id: &str) {
        let job = Job::new(job_id, "u1", Utc::now());
        store.save(collections::JOBS, job_id, &job).await.unwrap();
    }

    fn manifest_with(strategy: RenderStrategy, segments: Vec<SegmentSpec>, shots: Vec<Shot>) -> gateway_types::VideoManifest {
        VideoManifest {
            storyboard: Storyboard { shots },
            compliance: Compliance::default(),
            caption: Caption::default(),
            render_plan: RenderPlan { strategy, segments },
        }
    }

    fn shot(phase: ShotPhase) -> Shot {
        Shot {
            phase,
            visual: "v".to_string(),
            on_screen_text: "t".to_string(),
            voice_over: "vo".to_string(),
            duration_seconds: 15.0,
        }
    }

    #[tokio::test]
    async fn single_segment_render_converges_to_ready() {
        let store: Arc<dyn DocumentStore> = InMemoryStore::new();
        seed_job(&store, "j1").await;
        let svc = service(store.clone());
        let caller = caller();

        let video_id = Uuid::new_v4().to_string();
        let mut item = VideoItem::new(&video_id, "j1", "TIKTOK_LEAD", Utc::now());
        item.active_manifest = Some(manifest_with(
            RenderStrategy::Single,
            vec![SegmentSpec { seconds: 15.0 }],
            vec![shot(ShotPhase::Hook), shot(ShotPhase::Middle), shot(ShotPhase::Cta)],
        ));
        store.save(collections::VIDEOS, &video_id, &item).await.unwrap();
        svc.render.ledger.grant("u1", 1000).await.unwrap();

        let item = svc.trigger_render(&video_id, &caller).await.unwrap();
        assert_eq!(item.status, VideoStatus::Ready);
        assert!(item.render_task.result.video_url.is_some());
        assert_eq!(item.generation_metrics.seconds_generated, 15.0);

        // §8 idempotence: triggering again on a ready item is a no-op that
        // returns the same URL.
        let again = svc.trigger_render(&video_id, &caller).await.unwrap();
        assert_eq!(again.render_task.result.video_url, item.render_task.result.video_url);
    }

    #[tokio::test]
    async fn empty_storyboard_fails_without_submitting_a_segment() {
        let store: Arc<dyn DocumentStore> = InMemoryStore::new();
        seed_job(&store, "j1").await;
        let svc = service(store.clone());
        let caller = caller();

        let video_id = Uuid::new_v4().to_string();
        let mut item = VideoItem::new(&video_id, "j1", "TIKTOK_LEAD", Utc::now());
        item.active_manifest = Some(manifest_with(RenderStrategy::Single, vec![SegmentSpec { seconds: 15.0 }], vec![]));
        store.save(collections::VIDEOS, &video_id, &item).await.unwrap();

        let item = svc.trigger_render(&video_id, &caller).await.unwrap();
        assert_eq!(item.status, VideoStatus::Failed);
        assert_eq!(item.render_task.failure_reason.as_deref(), Some("empty_storyboard"));
    }

    #[tokio::test]
    async fn non_owner_cannot_trigger_render() {
        let store: Arc<dyn DocumentStore> = InMemoryStore::new();
        seed_job(&store, "j1").await;
        let svc = service(store.clone());

        let video_id = Uuid::new_v4().to_string();
        let item = VideoItem::new(&video_id, "j1", "TIKTOK_LEAD", Utc::now());
        store.save(collections::VIDEOS, &video_id, &item).await.unwrap();

        let intruder = Caller {
            user_id: "someone-else".to_string(),
            correlation_id: "c2".to_string(),
        };
        let err = svc.trigger_render(&video_id, &intruder).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn approve_then_publish_then_reject_generating() {
        let store: Arc<dyn DocumentStore> = InMemoryStore::new();
        seed_job(&store, "j1").await;
        let svc = service(store.clone());
        let caller = caller();

        let video_id = Uuid::new_v4().to_string();
        let mut item = VideoItem::new(&video_id, "j1", "TIKTOK_LEAD", Utc::now());
        item.status = VideoStatus::Ready;
        store.save(collections::VIDEOS, &video_id, &item).await.unwrap();

        let item = svc.approve(&video_id, &caller).await.unwrap();
        assert_eq!(item.status, VideoStatus::Approved);
        let item = svc.publish(&video_id, &caller).await.unwrap();
        assert_eq!(item.status, VideoStatus::Published);
    }
}
