//! C11 Render Controller (§4.3 "render (trigger)" through "stitch & ready"):
//! submits segments to the video provider strictly sequentially, polls
//! in-flight ones, and stitches the final `videoUrl` once every segment is
//! ready. Modeled as a state machine driven by a client-triggered refresh
//! (§9 "async polling of video segments") rather than a background loop:
//! `VideoService::fetch` is the tick.
//!
//! Billing is deterministic here, unlike the text/image path in
//! `gateway-orchestrator::ProviderInvoker`: §4.5 prices video at
//! `perSecondCost * seconds` from the render plan, not from provider-reported
//! usage, so credits are reserved and committed against the planned segment
//! duration rather than an estimate-then-true-up pair.

use std::sync::Arc;

use chrono::Utc;
use gateway_config::AppConfig;
use gateway_ledger::CreditLedger;
use gateway_observability::{emit_event, ObservabilityEvent, ProcessKind};
use gateway_providers::{ProviderRegistry, VideoProviderStatus, VideoSegmentRequest};
use gateway_store::{collections, DocumentStore, TypedStore};
use gateway_types::{
    Caller, ErrorKind, GatewayError, SegmentStatus, SegmentTask, TaskType, UsageStatus, VideoItem,
    VideoStatus,
};
use tracing::Level;
use uuid::Uuid;

use crate::segment_planner::{plan_segments, segment_prompt};

pub struct RenderController {
    pub store: Arc<dyn DocumentStore>,
    pub providers: Arc<ProviderRegistry>,
    pub ledger: Arc<CreditLedger>,
    pub config: Arc<AppConfig>,
}

impl RenderController {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        providers: Arc<ProviderRegistry>,
        ledger: Arc<CreditLedger>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            store,
            providers,
            ledger,
            config,
        }
    }

    async fn save(&self, item: &VideoItem) -> Result<(), GatewayError> {
        self.store
            .save(collections::VIDEOS, &item.video_id, item)
            .await
            .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))
    }

    /// §4.3 "render (trigger): transition `planned -> generating`" plus the
    /// idempotence law "`triggerRender` on a `ready` item is a no-op".
    pub async fn trigger(&self, mut item: VideoItem, caller: &Caller) -> Result<VideoItem, GatewayError> {
        match item.status {
            VideoStatus::Ready | VideoStatus::Approved | VideoStatus::Published => Ok(item),
            VideoStatus::Generating | VideoStatus::Extending => self.tick(item, caller).await,
            VideoStatus::Failed | VideoStatus::Archived => Ok(item),
            VideoStatus::Planned => {
                let Some(manifest) = item.active_manifest.clone() else {
                    return Err(GatewayError::new(
                        ErrorKind::InvalidContext,
                        "video item has no manifest to render",
                    ));
                };
                let contexts = plan_segments(&manifest.storyboard, &manifest.render_plan);
                if contexts.is_empty() {
                    item.render_task.failure_reason = Some("empty_storyboard".to_string());
                    item.status = VideoStatus::Failed;
                    item.updated_at = Utc::now().max(item.updated_at);
                    self.save(&item).await?;
                    return Ok(item);
                }

                item.render_task.segments = contexts
                    .iter()
                    .enumerate()
                    .map(|(i, ctx)| SegmentTask {
                        index: ctx.index,
                        phase: ctx.phase,
                        prompt: segment_prompt(ctx, &contexts[..i]),
                        status: SegmentStatus::Pending,
                        handle: None,
                        segment_url: None,
                        failure_reason: None,
                    })
                    .collect();
                item.render_task.next_segment_index = 0;
                item.render_task.failed_segment_index = None;
                item.render_task.failure_reason = None;
                item.transition_status(VideoStatus::Generating, Utc::now())
                    .map_err(|e| GatewayError::new(ErrorKind::Internal, e))?;
                self.save(&item).await?;
                self.tick(item, caller).await
            }
        }
    }

    /// §4.3 "retry restarts from the first failed segment with the same
    /// segment plan (deterministic)".
    pub async fn retry(&self, mut item: VideoItem, caller: &Caller) -> Result<VideoItem, GatewayError> {
        if item.status != VideoStatus::Failed {
            return Ok(item);
        }
        let Some(failed_at) = item.render_task.failed_segment_index else {
            return Ok(item);
        };
        for segment in item.render_task.segments.iter_mut().skip(failed_at) {
            segment.status = SegmentStatus::Pending;
            segment.handle = None;
            segment.segment_url = None;
            segment.failure_reason = None;
        }
        item.render_task.next_segment_index = failed_at;
        item.render_task.failed_segment_index = None;
        item.render_task.failure_reason = None;
        item.status = if failed_at == 0 {
            VideoStatus::Generating
        } else {
            VideoStatus::Extending
        };
        item.updated_at = Utc::now().max(item.updated_at);
        self.save(&item).await?;
        self.tick(item, caller).await
    }

    async fn fail_segment(
        &self,
        item: &mut VideoItem,
        idx: usize,
        reason: String,
    ) -> Result<(), GatewayError> {
        item.render_task.segments[idx].status = SegmentStatus::Failed;
        item.render_task.segments[idx].failure_reason = Some(reason.clone());
        item.render_task.failed_segment_index = Some(idx);
        item.render_task.failure_reason = Some(reason);
        item.status = VideoStatus::Failed;
        item.updated_at = Utc::now().max(item.updated_at);
        self.save(item).await
    }

    /// One poll/submit step (§9 "the controller holds `nextSegmentIndex`").
    /// Submits the segment at `next_segment_index` if it hasn't been
    /// submitted yet, otherwise polls its in-flight handle; stitches and
    /// moves to `ready` once the last segment comes back ready.
    async fn tick(&self, mut item: VideoItem, caller: &Caller) -> Result<VideoItem, GatewayError> {
        let idx = item.render_task.next_segment_index;
        if idx >= item.render_task.segments.len() {
            return Ok(item);
        }

        let Some(manifest) = item.active_manifest.clone() else {
            return Ok(item);
        };
        let seconds = manifest
            .render_plan
            .segments
            .get(idx)
            .map(|s| s.seconds)
            .unwrap_or(0.0);

        let provider_ref = self.config.provider_for_family("video");
        let adapter = match self.providers.resolve_video(&provider_ref) {
            Ok(adapter) => adapter,
            Err(err) => {
                self.fail_segment(&mut item, idx, err.to_string()).await?;
                return Ok(item);
            }
        };
        let ratios = self.config.credit_ratios_for(&provider_ref.vendor, &provider_ref.model);
        let correlation_id = Uuid::new_v4().to_string();

        let status = item.render_task.segments[idx].status;
        let response = match status {
            SegmentStatus::Pending => {
                let credits = gateway_ledger::video_credits(seconds, ratios);
                let reservation = match self.ledger.reserve(&caller.user_id, credits, &correlation_id).await {
                    Ok(Ok(r)) => r,
                    Ok(Err(_)) => {
                        self.fail_segment(&mut item, idx, "insufficient_credits".to_string()).await?;
                        return Ok(item);
                    }
                    Err(err) => {
                        self.fail_segment(&mut item, idx, err.to_string()).await?;
                        return Ok(item);
                    }
                };

                let extends_handle = if idx == 0 {
                    None
                } else {
                    item.render_task.segments[idx - 1].handle.clone()
                };
                let prompt = item.render_task.segments[idx].prompt.clone();
                let request = VideoSegmentRequest {
                    model: provider_ref.model.clone(),
                    prompt,
                    seconds,
                    extends_handle,
                    correlation_id: correlation_id.clone(),
                };
                emit_event(
                    Level::INFO,
                    ProcessKind::Engine,
                    ObservabilityEvent {
                        event: "video_segment_submit",
                        component: "gateway-video",
                        correlation_id: Some(&correlation_id),
                        task_type: Some(TaskType::VideoRender.as_str()),
                        provider_id: Some(&provider_ref.vendor),
                        model_id: Some(&provider_ref.model),
                        status: None,
                        error_code: None,
                        detail: Some(&format!("segment={idx}")),
                    },
                );
                let response = adapter.submit_segment(request).await;

                let (usage_status, credits_used, error_reason) = if response.error_reason.is_some()
                    || response.status == VideoProviderStatus::Failed
                {
                    let _ = self.ledger.refund(&reservation.reservation_id).await;
                    (UsageStatus::Errored, 0, response.error_reason.clone())
                } else {
                    let committed = self
                        .ledger
                        .commit(&reservation.reservation_id, credits)
                        .await
                        .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))?;
                    (UsageStatus::Committed, committed, None)
                };
                let usage_entry = gateway_ledger::CreditLedger::usage_entry(
                    caller.user_id.clone(),
                    Some(item.job_id.clone()),
                    TaskType::VideoGeneration.as_str().to_string(),
                    provider_ref.vendor.clone(),
                    provider_ref.model.clone(),
                    &response.usage,
                    credits_used,
                    0.0,
                    usage_status,
                    error_reason,
                );
                if let Err(err) = self.ledger.append_usage(usage_entry).await {
                    tracing::warn!(error = %err, "failed to append video usage log entry");
                }
                response
            }
            _ => adapter
                .poll_segment(item.render_task.segments[idx].handle.as_deref().unwrap_or_default())
                .await,
        };

        if response.error_reason.is_some() || response.status == VideoProviderStatus::Failed {
            let reason = response.error_reason.unwrap_or_else(|| "render_failed".to_string());
            self.fail_segment(&mut item, idx, reason).await?;
            return Ok(item);
        }

        item.render_task.segments[idx].handle = Some(response.handle.clone());
        item.render_task.segments[idx].status = match response.status {
            VideoProviderStatus::Predicting => SegmentStatus::Predicting,
            VideoProviderStatus::Fetching => SegmentStatus::Fetching,
            VideoProviderStatus::Ready => SegmentStatus::Ready,
            VideoProviderStatus::Failed => unreachable!("handled above"),
        };
        if let Some(url) = &response.video_url {
            item.render_task.segments[idx].segment_url = Some(url.clone());
        }

        if item.render_task.segments[idx].status != SegmentStatus::Ready {
            item.updated_at = Utc::now().max(item.updated_at);
            self.save(&item).await?;
            return Ok(item);
        }

        let total_segments = item.render_task.segments.len();
        if idx + 1 < total_segments {
            item.render_task.next_segment_index = idx + 1;
            if item.status == VideoStatus::Generating {
                item.status = VideoStatus::Extending;
            }
            item.updated_at = Utc::now().max(item.updated_at);
            self.save(&item).await?;
            return Ok(item);
        }

        self.stitch(&mut item, &manifest.render_plan)?;
        self.save(&item).await?;
        Ok(item)
    }

    /// §4.3 "stitch & ready": the last segment's URL is already the full
    /// cumulative render under the multi-extend contract (each extension
    /// call returns the video rendered so far, not just the new slice), so
    /// stitching is a matter of reading it off rather than concatenating
    /// separate clips — recorded as an Open Question resolution in
    /// DESIGN.md.
    fn stitch(&self, item: &mut VideoItem, render_plan: &gateway_types::RenderPlan) -> Result<(), GatewayError> {
        let last = item
            .render_task
            .segments
            .last()
            .ok_or_else(|| GatewayError::new(ErrorKind::Internal, "stitch called with no segments"))?;
        item.render_task.result.video_url = last.segment_url.clone();
        item.generation_metrics.seconds_generated = render_plan.segments.iter().map(|s| s.seconds).sum();
        let provider_ref = self.config.provider_for_family("video");
        let ratios = self.config.credit_ratios_for(&provider_ref.vendor, &provider_ref.model);
        let credits = gateway_ledger::video_credits(item.generation_metrics.seconds_generated, ratios);
        item.generation_metrics.cost_estimate_usd = credits as f64 * 0.01;
        item.generation_metrics.synth_id_watermark = Some(format!("synthid-{}", item.video_id));
        item.transition_status(VideoStatus::Ready, Utc::now())
            .map_err(|e| GatewayError::new(ErrorKind::Internal, e))?;
        Ok(())
    }
}
