//! Segment Planner: maps storyboard shots onto the `renderPlan.segments`
//! sequence — segment 0 carries the hook, segment N-1 carries the cta, and
//! anything in between carries the middle shots.
//!
//! Open-question resolution (recorded in DESIGN.md): when a storyboard has
//! no hook or no cta shots, the edge segment takes a "share" of the middle
//! shots instead. This plans shares by treating every slot that still needs
//! shots (an empty edge slot plus every interior slot) as one divisor of the
//! remaining middle pool, `floor` + remainder assigned to the earliest such
//! slot first.

use gateway_types::{RenderPlan, Shot, ShotPhase, Storyboard};

#[derive(Debug, Clone)]
pub struct SegmentContext {
    pub index: usize,
    pub phase: ShotPhase,
    pub shots: Vec<Shot>,
}

/// Empty storyboard or empty render plan both yield zero segment contexts
/// (§8 boundary: "Empty storyboard: segment planner returns zero segment
/// contexts, render transitions straight to `failed`").
pub fn plan_segments(storyboard: &Storyboard, render_plan: &RenderPlan) -> Vec<SegmentContext> {
    let n = render_plan.segments.len();
    if storyboard.shots.is_empty() || n == 0 {
        return Vec::new();
    }

    if n == 1 {
        return vec![SegmentContext {
            index: 0,
            phase: ShotPhase::Middle,
            shots: storyboard.shots.clone(),
        }];
    }

    let hook: Vec<Shot> = storyboard
        .shots
        .iter()
        .filter(|s| s.phase == ShotPhase::Hook)
        .cloned()
        .collect();
    let cta: Vec<Shot> = storyboard
        .shots
        .iter()
        .filter(|s| s.phase == ShotPhase::Cta)
        .cloned()
        .collect();
    let mut middle: std::collections::VecDeque<Shot> = storyboard
        .shots
        .iter()
        .filter(|s| s.phase == ShotPhase::Middle)
        .cloned()
        .collect();

    let needs_hook_share = hook.is_empty();
    let needs_cta_share = cta.is_empty();
    let middle_slot_count = n.saturating_sub(2);

    let consumers = (needs_hook_share as usize) + (needs_cta_share as usize) + middle_slot_count;
    let shares: Vec<usize> = if consumers == 0 {
        Vec::new()
    } else {
        let base = middle.len() / consumers;
        let remainder = middle.len() % consumers;
        (0..consumers).map(|i| base + usize::from(i < remainder)).collect()
    };
    let mut shares = shares.into_iter();

    let mut segments = Vec::with_capacity(n);

    let slot0_shots = if needs_hook_share {
        let take = shares.next().unwrap_or(0);
        (0..take).filter_map(|_| middle.pop_front()).collect()
    } else {
        hook
    };
    segments.push(SegmentContext {
        index: 0,
        phase: ShotPhase::Hook,
        shots: slot0_shots,
    });

    for idx in 1..=middle_slot_count {
        let take = shares.next().unwrap_or(0);
        let shots = (0..take).filter_map(|_| middle.pop_front()).collect();
        segments.push(SegmentContext {
            index: idx,
            phase: ShotPhase::Middle,
            shots,
        });
    }

    let last_index = n - 1;
    let last_shots = if needs_cta_share {
        // Exhausts whatever the floor/remainder split left rather than
        // re-consuming `shares` — guards against drift if rounding left a
        // shot behind.
        middle.into_iter().collect()
    } else {
        cta
    };
    segments.push(SegmentContext {
        index: last_index,
        phase: ShotPhase::Cta,
        shots: last_shots,
    });

    segments
}

/// §4.3 "a ... recap summary of prior segments" — 3 visuals, truncated to
/// 150 chars, drawn from the most recently planned shots.
pub fn recap_summary(prior_segments: &[SegmentContext]) -> String {
    let visuals: Vec<&str> = prior_segments
        .iter()
        .flat_map(|s| s.shots.iter().map(|shot| shot.visual.as_str()))
        .collect();
    let last_three: Vec<&str> = visuals.iter().rev().take(3).rev().copied().collect();
    let mut recap = last_three.join("; ");
    if recap.len() > 150 {
        recap.truncate(150);
        while !recap.is_char_boundary(recap.len()) {
            recap.pop();
        }
    }
    recap
}

/// §4.3 "the formatted shot list for this segment (phase, visual, text
/// overlay, VO)".
pub fn format_shot_list(shots: &[Shot]) -> String {
    shots
        .iter()
        .map(|s| {
            format!(
                "[{:?}] visual: {} | on-screen text: {} | voice-over: {}",
                s.phase, s.visual, s.on_screen_text, s.voice_over
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Builds the prompt sent for one segment submission: the recap (absent for
/// segment 0) followed by its own shot list.
pub fn segment_prompt(segment: &SegmentContext, prior_segments: &[SegmentContext]) -> String {
    if prior_segments.is_empty() {
        return format_shot_list(&segment.shots);
    }
    let recap = recap_summary(prior_segments);
    if recap.is_empty() {
        format_shot_list(&segment.shots)
    } else {
        format!("Recap of prior segments: {}\n\n{}", recap, format_shot_list(&segment.shots))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_types::{RenderStrategy, SegmentSpec};

    fn shot(phase: ShotPhase, visual: &str) -> Shot {
        Shot {
            phase,
            visual: visual.to_string(),
            on_screen_text: "".to_string(),
            voice_over: "".to_string(),
            duration_seconds: 8.0,
        }
    }

    #[test]
    fn empty_storyboard_yields_no_segments() {
        let storyboard = Storyboard { shots: vec![] };
        let plan = RenderPlan {
            strategy: RenderStrategy::Single,
            segments: vec![SegmentSpec { seconds: 15.0 }],
        };
        assert!(plan_segments(&storyboard, &plan).is_empty());
    }

    #[test]
    fn three_segment_multi_extend_matches_spec_scenario() {
        let storyboard = Storyboard {
            shots: vec![
                shot(ShotPhase::Hook, "hook"),
                shot(ShotPhase::Middle, "middle-1"),
                shot(ShotPhase::Middle, "middle-2"),
                shot(ShotPhase::Cta, "cta"),
            ],
        };
        let plan = RenderPlan {
            strategy: RenderStrategy::MultiExtend,
            segments: vec![
                SegmentSpec { seconds: 8.0 },
                SegmentSpec { seconds: 8.0 },
                SegmentSpec { seconds: 8.0 },
            ],
        };
        let contexts = plan_segments(&storyboard, &plan);
        assert_eq!(contexts.len(), 3);
        assert_eq!(contexts[0].phase, ShotPhase::Hook);
        assert_eq!(contexts[0].shots.len(), 1);
        assert_eq!(contexts[1].phase, ShotPhase::Middle);
        assert_eq!(contexts[1].shots.len(), 2);
        assert_eq!(contexts[2].phase, ShotPhase::Cta);
        assert_eq!(contexts[2].shots.len(), 1);
    }

    #[test]
    fn missing_hook_borrows_a_share_of_middle() {
        let storyboard = Storyboard {
            shots: vec![
                shot(ShotPhase::Middle, "m1"),
                shot(ShotPhase::Middle, "m2"),
                shot(ShotPhase::Middle, "m3"),
                shot(ShotPhase::Middle, "m4"),
                shot(ShotPhase::Cta, "cta"),
            ],
        };
        let plan = RenderPlan {
            strategy: RenderStrategy::MultiExtend,
            segments: vec![SegmentSpec { seconds: 8.0 }, SegmentSpec { seconds: 8.0 }],
        };
        let contexts = plan_segments(&storyboard, &plan);
        assert_eq!(contexts.len(), 2);
        assert_eq!(contexts[0].phase, ShotPhase::Hook);
        assert!(!contexts[0].shots.is_empty());
        assert_eq!(contexts[1].phase, ShotPhase::Cta);
    }

    #[test]
    fn recap_truncates_to_150_chars_and_keeps_last_three_visuals() {
        let long_visual = "x".repeat(200);
        let segments = vec![SegmentContext {
            index: 0,
            phase: ShotPhase::Hook,
            shots: vec![shot(ShotPhase::Hook, &long_visual)],
        }];
        let recap = recap_summary(&segments);
        assert!(recap.len() <= 150);
    }
}
