//! Stage-scoped tool whitelists (§4.2 "Staging"). A request in stage `assets`
//! may not reach wizard-only tools — the manifest handed to the LLM each turn
//! is built from exactly this list, so an unavailable tool is never even
//! named, let alone invoked.

use gateway_types::CopilotStage;

pub struct StageConfig {
    pub mission: &'static str,
    pub guardrails: &'static str,
    pub instructions: &'static str,
    pub tool_names: &'static [&'static str],
}

pub fn config_for(stage: CopilotStage) -> StageConfig {
    match stage {
        CopilotStage::Wizard => StageConfig {
            mission: "You are helping a recruiter fill in a job posting through conversation.",
            guardrails: "Only change fields the user asked about. Never invent a company, salary, or location.",
            instructions: "Use get_job_snapshot to see current values. Use update_job_field or update_job_fields_batch to apply changes. Use get_suggestion_snapshot / accept_suggestion when the user wants an AI-proposed value applied. Use confirm_company_name and fetch_company_overview to resolve ambiguous company identity.",
            tool_names: &[
                "get_job_snapshot",
                "update_job_field",
                "update_job_fields_batch",
                "get_suggestion_snapshot",
                "accept_suggestion",
                "confirm_company_name",
                "fetch_company_overview",
            ],
        },
        CopilotStage::Refine => StageConfig {
            mission: "You are helping a recruiter polish the wording of an already-complete job posting.",
            guardrails: "Keep edits scoped to wording and tone. Do not re-ask for fields already marked required-complete.",
            instructions: "Use get_refinement_snapshot to see the current polished draft. Use update_refined_field for wording-only changes, or update_job_field/update_job_fields_batch when the user wants to change the underlying intake itself.",
            tool_names: &[
                "get_job_snapshot",
                "get_refinement_snapshot",
                "update_refined_field",
                "update_job_field",
                "update_job_fields_batch",
            ],
        },
        CopilotStage::Assets => StageConfig {
            mission: "You are helping a recruiter write and adjust campaign marketing copy for this job.",
            guardrails: "Only touch the asset the user names. Preserve facts from the job snapshot.",
            instructions: "Use get_job_snapshot for context and update_asset_content to write or revise one (format, channel) asset's text body.",
            tool_names: &["get_job_snapshot", "update_asset_content", "get_suggestion_snapshot"],
        },
        CopilotStage::Channels => StageConfig {
            mission: "You are helping a recruiter choose sourcing channels for this job.",
            guardrails: "Only change the recommendation list when the user explicitly asks to add, remove, or replace a channel.",
            instructions: "Use get_channel_recommendations to see the current list and set_channel_recommendations to overwrite it with an updated one.",
            tool_names: &["get_job_snapshot", "get_channel_recommendations", "set_channel_recommendations"],
        },
    }
}
