//! C9 Video Manifest Builder (§4.3 "create"/"regenerate"): produces a
//! `VideoManifest` (storyboard, compliance, caption, render plan) from a job
//! snapshot + channel, via three chained chat-family LLM calls through the
//! same metered `ProviderInvoker::call`/`settle` pair the core task pipeline
//! uses (§4.1 steps 3-6, 9-10) — manifest building is not a special-cased
//! credit path, it's three ordinary structured-output calls.

use std::collections::HashMap;

use gateway_orchestrator::ProviderInvoker;
use gateway_types::{
    Caller, Caption, Compliance, ErrorKind, GatewayError, Job, RenderPlan, RenderStrategy,
    SegmentSpec, Shot, Storyboard, TaskType, VideoManifest,
};
use serde_json::json;

/// §4.3 "create": storyboard -> compliance -> caption, each call grounded on
/// the previous stage's output. A fixed default render plan is attached here
/// (single segment under the job's on-screen duration budget, `multi_extend`
/// once the storyboard crosses 3 shots) since the source spec does not give
/// the plan its own LLM call — `renderPlan.strategy` is a deterministic
/// function of storyboard length, not a model decision.
pub async fn build_manifest(
    invoker: &ProviderInvoker,
    job: &Job,
    channel_id: &str,
    caller: &Caller,
) -> Result<VideoManifest, GatewayError> {
    let job_snapshot = serde_json::to_string(&job.intake).unwrap_or_default();

    let storyboard = build_storyboard(invoker, job, channel_id, &job_snapshot, caller).await?;
    let storyboard_json = serde_json::to_string(&storyboard).unwrap_or_default();
    let compliance = build_compliance(invoker, &storyboard_json, caller, Some(&job.job_id)).await?;
    let caption = build_caption(invoker, &storyboard_json, caller, Some(&job.job_id)).await?;
    let render_plan = default_render_plan(&storyboard);

    Ok(VideoManifest {
        storyboard,
        compliance,
        caption,
        render_plan,
    })
}

async fn build_storyboard(
    invoker: &ProviderInvoker,
    job: &Job,
    channel_id: &str,
    job_snapshot: &str,
    caller: &Caller,
) -> Result<Storyboard, GatewayError> {
    let spec = invoker.prompts.resolve(TaskType::VideoStoryboard);
    let mut vars = HashMap::new();
    vars.insert("role_title", job.intake.role_title.clone());
    vars.insert("channel_id", channel_id.to_string());
    vars.insert("job_snapshot", job_snapshot.to_string());
    let prompt = spec.render(&vars);

    let outcome = invoker
        .call(
            TaskType::VideoStoryboard,
            String::new(),
            prompt,
            spec.output_schema.clone(),
            spec.output_schema_name.map(str::to_string),
            vec![],
            caller,
        )
        .await?;
    invoker.settle(&outcome, caller, Some(job.job_id.clone())).await?;

    if let Some(error) = &outcome.response.error {
        return Err(GatewayError::new(ErrorKind::ProviderError, error.message.clone()));
    }

    let parsed = outcome.response.parsed.clone().unwrap_or_else(|| json!({}));
    let shots: Vec<Shot> = parsed
        .get("shots")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();
    Ok(Storyboard { shots })
}

async fn build_compliance(
    invoker: &ProviderInvoker,
    storyboard_json: &str,
    caller: &Caller,
    job_id: Option<&str>,
) -> Result<Compliance, GatewayError> {
    let spec = invoker.prompts.resolve(TaskType::VideoCompliance);
    let mut vars = HashMap::new();
    vars.insert("storyboard", storyboard_json.to_string());
    let prompt = spec.render(&vars);

    let outcome = invoker
        .call(
            TaskType::VideoCompliance,
            String::new(),
            prompt,
            spec.output_schema.clone(),
            spec.output_schema_name.map(str::to_string),
            vec![],
            caller,
        )
        .await?;
    invoker.settle(&outcome, caller, job_id.map(str::to_string)).await?;

    if outcome.response.error.is_some() {
        // Compliance is advisory, not gating (§4.3 lists it as a manifest
        // field, not a precondition) — a failed compliance call yields an
        // empty checklist rather than failing the whole manifest build.
        return Ok(Compliance::default());
    }
    let parsed = outcome.response.parsed.clone().unwrap_or_else(|| json!({}));
    Ok(serde_json::from_value(parsed).unwrap_or_default())
}

async fn build_caption(
    invoker: &ProviderInvoker,
    storyboard_json: &str,
    caller: &Caller,
    job_id: Option<&str>,
) -> Result<Caption, GatewayError> {
    let spec = invoker.prompts.resolve(TaskType::VideoCaption);
    let mut vars = HashMap::new();
    vars.insert("storyboard", storyboard_json.to_string());
    let prompt = spec.render(&vars);

    let outcome = invoker
        .call(
            TaskType::VideoCaption,
            String::new(),
            prompt,
            spec.output_schema.clone(),
            spec.output_schema_name.map(str::to_string),
            vec![],
            caller,
        )
        .await?;
    invoker.settle(&outcome, caller, job_id.map(str::to_string)).await?;

    if outcome.response.error.is_some() {
        return Ok(Caption::default());
    }
    let parsed = outcome.response.parsed.clone().unwrap_or_else(|| json!({}));
    Ok(serde_json::from_value(parsed).unwrap_or_default())
}

/// Single segment under 4 shots, `multi_extend` with one segment per shot
/// group otherwise — 3 groups (hook/middle/cta) capped so a very long
/// storyboard doesn't produce a segment per shot.
fn default_render_plan(storyboard: &Storyboard) -> RenderPlan {
    if storyboard.shots.len() <= 3 {
        let seconds: f64 = storyboard.shots.iter().map(|s| s.duration_seconds).sum();
        return RenderPlan {
            strategy: RenderStrategy::Single,
            segments: vec![SegmentSpec {
                seconds: seconds.max(1.0),
            }],
        };
    }
    let total: f64 = storyboard.shots.iter().map(|s| s.duration_seconds).sum();
    let per_segment = (total / 3.0).max(1.0);
    RenderPlan {
        strategy: RenderStrategy::MultiExtend,
        segments: vec![
            SegmentSpec { seconds: per_segment },
            SegmentSpec { seconds: per_segment },
            SegmentSpec { seconds: per_segment },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_types::ShotPhase;

    fn shot(phase: ShotPhase, seconds: f64) -> Shot {
        Shot {
            phase,
            visual: "visual".to_string(),
            on_screen_text: "text".to_string(),
            voice_over: "vo".to_string(),
            duration_seconds: seconds,
        }
    }

    #[test]
    fn short_storyboard_gets_single_segment() {
        let storyboard = Storyboard {
            shots: vec![shot(ShotPhase::Hook, 5.0), shot(ShotPhase::Cta, 5.0)],
        };
        let plan = default_render_plan(&storyboard);
        assert_eq!(plan.strategy, RenderStrategy::Single);
        assert_eq!(plan.segments.len(), 1);
    }

    #[test]
    fn long_storyboard_gets_multi_extend() {
        let storyboard = Storyboard {
            shots: vec![
                shot(ShotPhase::Hook, 5.0),
                shot(ShotPhase::Middle, 5.0),
                shot(ShotPhase::Middle, 5.0),
                shot(ShotPhase::Cta, 5.0),
            ],
        };
        let plan = default_render_plan(&storyboard);
        assert_eq!(plan.strategy, RenderStrategy::MultiExtend);
        assert_eq!(plan.segments.len(), 3);
    }
}
