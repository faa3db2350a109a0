use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// §4.3 "Phase normalization" target vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShotPhase {
    Hook,
    Middle,
    Cta,
}

/// Normalizes a raw phase label to the fixed `{hook, middle, cta}` vocabulary (§4.3).
/// Unknown labels fall through to `middle`.
pub fn normalize_phase(raw: &str) -> ShotPhase {
    let lower = raw.trim().to_ascii_lowercase();
    const HOOK: &[&str] = &["hook", "intro", "introduction", "opening", "attention"];
    const CTA: &[&str] = &["cta", "action", "call to action", "closing", "close", "finale", "end"];
    if HOOK.contains(&lower.as_str()) {
        ShotPhase::Hook
    } else if CTA.contains(&lower.as_str()) {
        ShotPhase::Cta
    } else {
        ShotPhase::Middle
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shot {
    pub phase: ShotPhase,
    pub visual: String,
    pub on_screen_text: String,
    pub voice_over: String,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceSeverity {
    Info,
    Warning,
    Blocking,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceFlag {
    pub message: String,
    pub severity: ComplianceSeverity,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Compliance {
    #[serde(default)]
    pub flags: Vec<ComplianceFlag>,
    #[serde(default)]
    pub qa_checklist: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Caption {
    pub text: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderStrategy {
    Single,
    MultiExtend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentSpec {
    pub seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderPlan {
    pub strategy: RenderStrategy,
    pub segments: Vec<SegmentSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Storyboard {
    pub shots: Vec<Shot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoManifest {
    pub storyboard: Storyboard,
    pub compliance: Compliance,
    pub caption: Caption,
    pub render_plan: RenderPlan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    Pending,
    Predicting,
    Fetching,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentTask {
    pub index: usize,
    pub phase: ShotPhase,
    pub prompt: String,
    pub status: SegmentStatus,
    /// Provider-side submission handle, set once `submit_segment` succeeds;
    /// `poll_segment` and the next extension's `extends_handle` key off this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RenderResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RenderTask {
    #[serde(default)]
    pub segments: Vec<SegmentTask>,
    pub next_segment_index: usize,
    #[serde(default)]
    pub result: RenderResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_segment_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerationMetrics {
    #[serde(default)]
    pub seconds_generated: f64,
    #[serde(default)]
    pub cost_estimate_usd: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synth_id_watermark: Option<String>,
}

/// §3 Video Item status — monotone along the allowed DAG (§8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    Planned,
    Generating,
    Extending,
    Ready,
    Failed,
    Approved,
    Published,
    Archived,
}

impl VideoStatus {
    /// Legal direct successors per §3/§8's allowed DAG. `Regenerate` is the only
    /// path back to `Planned` from a rendered state, modeled separately by the
    /// caller (it re-enters via `create`, not a `transition_to` call).
    pub fn can_transition_to(self, to: VideoStatus) -> bool {
        use VideoStatus::*;
        matches!(
            (self, to),
            (Planned, Generating)
                | (Generating, Extending)
                | (Generating, Ready)
                | (Generating, Failed)
                | (Extending, Extending)
                | (Extending, Ready)
                | (Extending, Failed)
                | (Ready, Approved)
                | (Approved, Published)
                | (_, Archived)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoItem {
    pub video_id: String,
    pub job_id: String,
    pub channel_id: String,
    pub status: VideoStatus,
    pub active_manifest: Option<VideoManifest>,
    pub render_task: RenderTask,
    pub generation_metrics: GenerationMetrics,
    pub schema_version: String,
    pub updated_at: DateTime<Utc>,
}

impl VideoItem {
    pub fn new(
        video_id: impl Into<String>,
        job_id: impl Into<String>,
        channel_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            video_id: video_id.into(),
            job_id: job_id.into(),
            channel_id: channel_id.into(),
            status: VideoStatus::Planned,
            active_manifest: None,
            render_task: RenderTask::default(),
            generation_metrics: GenerationMetrics::default(),
            schema_version: "1".to_string(),
            updated_at: now,
        }
    }

    /// Applies a status transition, rejecting anything outside the allowed DAG (§8).
    pub fn transition_status(&mut self, to: VideoStatus, now: DateTime<Utc>) -> Result<(), String> {
        if self.status == to {
            return Ok(());
        }
        if !self.status.can_transition_to(to) {
            return Err(format!(
                "illegal video status transition {:?} -> {:?}",
                self.status, to
            ));
        }
        self.status = to;
        if now > self.updated_at {
            self.updated_at = now;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_normalization_maps_known_labels() {
        assert_eq!(normalize_phase("HOOK"), ShotPhase::Hook);
        assert_eq!(normalize_phase("Opening"), ShotPhase::Hook);
        assert_eq!(normalize_phase("PROOF"), ShotPhase::Middle);
        assert_eq!(normalize_phase("OFFER"), ShotPhase::Middle);
        assert_eq!(normalize_phase("call to action"), ShotPhase::Cta);
        assert_eq!(normalize_phase("Finale"), ShotPhase::Cta);
        assert_eq!(normalize_phase("body"), ShotPhase::Middle);
        assert_eq!(normalize_phase("unknown-weird-label"), ShotPhase::Middle);
    }

    #[test]
    fn ready_to_generating_is_illegal_except_via_regenerate() {
        let now: DateTime<Utc> = "2026-01-01T00:00:00Z".parse().unwrap();
        let mut v = VideoItem::new("v1", "j1", "TIKTOK_LEAD", now);
        v.transition_status(VideoStatus::Generating, now).unwrap();
        v.transition_status(VideoStatus::Ready, now).unwrap();
        assert!(v.transition_status(VideoStatus::Generating, now).is_err());
    }

    #[test]
    fn archived_reachable_from_any_state() {
        let now: DateTime<Utc> = "2026-01-01T00:00:00Z".parse().unwrap();
        let mut v = VideoItem::new("v1", "j1", "TIKTOK_LEAD", now);
        assert!(v.transition_status(VideoStatus::Archived, now).is_ok());
    }
}
