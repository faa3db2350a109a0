pub mod gate;

pub use gate::{decide, GateDecision};

use std::collections::HashMap;

use gateway_types::{ProviderFamily, TaskType};
use serde_json::{json, Value};

/// C3 Prompt Registry entry (§2 "task-id -> { version, template, variables,
/// output schema, grounding tools, provider preference }").
#[derive(Debug, Clone)]
pub struct PromptSpec {
    pub task_type: TaskType,
    pub version: u32,
    /// A `{var}`-style template; `render` substitutes `variables` positionally
    /// by name (plain string substitution, no templating engine dependency
    /// pulled in for this).
    pub template: String,
    pub variables: Vec<&'static str>,
    pub output_schema: Option<Value>,
    pub output_schema_name: Option<&'static str>,
    /// Non-empty iff this task declares provider-side grounding tools (§6).
    pub grounding_tools: Vec<&'static str>,
    pub provider_family: ProviderFamily,
}

impl PromptSpec {
    pub fn has_output_schema(&self) -> bool {
        self.output_schema.is_some()
    }

    pub fn has_grounding_tools(&self) -> bool {
        !self.grounding_tools.is_empty()
    }

    /// Fills `{name}` placeholders in `template` from `values`, leaving any
    /// placeholder with no matching value untouched (surfaces as a visible
    /// gap rather than panicking — prompt authoring is an external Prompt
    /// Registry concern, out of scope here).
    pub fn render(&self, values: &HashMap<&str, String>) -> String {
        let mut out = self.template.clone();
        for var in &self.variables {
            if let Some(value) = values.get(var) {
                out = out.replace(&format!("{{{var}}}"), value);
            }
        }
        out
    }
}

/// Process-wide, initialized at startup, read-only thereafter (§5 "Shared
/// resources"). Synthesizes a `(task id, empty template)` prompt for any task
/// not explicitly registered, per §4.1 step 4: "if no prompt is registered,
/// use a synthetic prompt — provider still invoked."
pub struct PromptRegistry {
    prompts: HashMap<TaskType, PromptSpec>,
}

impl PromptRegistry {
    pub fn bootstrap() -> Self {
        let mut prompts = HashMap::new();
        for spec in default_prompts() {
            prompts.insert(spec.task_type, spec);
        }
        Self { prompts }
    }

    pub fn resolve(&self, task_type: TaskType) -> PromptSpec {
        self.prompts
            .get(&task_type)
            .cloned()
            .unwrap_or_else(|| synthetic_prompt(task_type))
    }

    pub fn is_registered(&self, task_type: TaskType) -> bool {
        self.prompts.contains_key(&task_type)
    }
}

fn synthetic_prompt(task_type: TaskType) -> PromptSpec {
    PromptSpec {
        task_type,
        version: 0,
        template: String::new(),
        variables: Vec::new(),
        output_schema: None,
        output_schema_name: None,
        grounding_tools: Vec::new(),
        provider_family: ProviderFamily::Chat,
    }
}

fn suggestion_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "candidates": {
                "type": "object",
                "additionalProperties": {
                    "type": "object",
                    "properties": {
                        "proposal": {},
                        "rationale": {"type": "string"},
                        "confidence": {"type": "number"}
                    },
                    "required": ["proposal", "rationale", "confidence"]
                }
            }
        },
        "required": ["candidates"]
    })
}

fn refinement_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "refined_job": {"type": "object"},
            "summary": {"type": "string"}
        },
        "required": ["refined_job", "summary"]
    })
}

fn channels_schema() -> Value {
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

fn storyboard_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "shots": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "phase": {"type": "string"},
                        "visual": {"type": "string"},
                        "on_screen_text": {"type": "string"},
                        "voice_over": {"type": "string"},
                        "duration_seconds": {"type": "number"}
                    },
                    "required": ["phase", "visual", "on_screen_text", "voice_over", "duration_seconds"]
                }
            }
        },
        "required": ["shots"]
    })
}

fn compliance_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "flags": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "message": {"type": "string"},
                        "severity": {"type": "string"}
                    },
                    "required": ["message", "severity"]
                }
            },
            "qa_checklist": {"type": "array", "items": {"type": "string"}}
        },
        "required": ["flags", "qa_checklist"]
    })
}

fn caption_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "text": {"type": "string"},
            "hashtags": {"type": "array", "items": {"type": "string"}}
        },
        "required": ["text", "hashtags"]
    })
}

fn company_intel_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": {"type": "string"},
            "industry": {"type": "string"},
            "summary": {"type": "string"},
            "discovered_jobs": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": {"type": "string"},
                        "location": {"type": "string"},
                        "source_url": {"type": "string"}
                    }
                }
            }
        },
        "required": ["name", "industry", "summary"]
    })
}

fn asset_copy_schema() -> Value {
    json!({
        "type": "object",
        "properties": {"body": {"type": "string"}},
        "required": ["body"]
    })
}

/// The registry's seed content (§1 Non-goals: "prompt text quality is a
/// content concern handled by an external Prompt Registry collaborator" — so
/// templates here are intentionally thin scaffolding, not tuned copy).
fn default_prompts() -> Vec<PromptSpec> {
    vec![
        PromptSpec {
            task_type: TaskType::Suggest,
            version: 1,
            template: "Given job {role_title} at {company_name} ({location}), propose values for: {visible_field_ids}.\n\nContext:\n{job_snapshot}\n\nCompany context:\n{company_context}".to_string(),
            variables: vec!["role_title", "company_name", "location", "visible_field_ids", "job_snapshot", "company_context"],
            output_schema: Some(suggestion_schema()),
            output_schema_name: Some("suggestion_output"),
            grounding_tools: vec![],
            provider_family: ProviderFamily::Chat,
        },
        PromptSpec {
            task_type: TaskType::Refine,
            version: 1,
            template: "Polish this completed job intake into publish-ready copy.\n\n{job_snapshot}".to_string(),
            variables: vec!["job_snapshot"],
            output_schema: Some(refinement_schema()),
            output_schema_name: Some("refinement_output"),
            grounding_tools: vec![],
            provider_family: ProviderFamily::Chat,
        },
        PromptSpec {
            task_type: TaskType::Channels,
            version: 1,
            template: "Recommend sourcing channels for this job.\n\n{job_snapshot}\n\nRefined:\n{refinement_snapshot}".to_string(),
            variables: vec!["job_snapshot", "refinement_snapshot"],
            output_schema: Some(channels_schema()),
            output_schema_name: Some("channels_output"),
            grounding_tools: vec![],
            provider_family: ProviderFamily::Chat,
        },
        PromptSpec {
            task_type: TaskType::CopilotAgent,
            version: 1,
            template: "{mission}\n\n{guardrails}\n\n{instructions}\n\nJob:\n{job_snapshot}\n\nRecent chat:\n{chat_window}\n\nScratchpad:\n{scratchpad}\n\nUser: {user_message}".to_string(),
            variables: vec!["mission", "guardrails", "instructions", "job_snapshot", "chat_window", "scratchpad", "user_message"],
            output_schema: None,
            output_schema_name: None,
            grounding_tools: vec![],
            provider_family: ProviderFamily::Chat,
        },
        PromptSpec {
            task_type: TaskType::AssetMaster,
            version: 1,
            template: "Write the master campaign copy for this job.\n\n{job_snapshot}".to_string(),
            variables: vec!["job_snapshot"],
            output_schema: Some(asset_copy_schema()),
            output_schema_name: Some("asset_output"),
            grounding_tools: vec![],
            provider_family: ProviderFamily::Chat,
        },
        PromptSpec {
            task_type: TaskType::AssetChannelBatch,
            version: 1,
            template: "Adapt the master copy for channel {channel_id}.\n\n{master_copy}".to_string(),
            variables: vec!["channel_id", "master_copy"],
            output_schema: Some(asset_copy_schema()),
            output_schema_name: Some("asset_output"),
            grounding_tools: vec![],
            provider_family: ProviderFamily::Chat,
        },
        PromptSpec {
            task_type: TaskType::AssetAdapt,
            version: 1,
            template: "Adapt this copy for format {format_id} on channel {channel_id}.\n\n{source_copy}".to_string(),
            variables: vec!["format_id", "channel_id", "source_copy"],
            output_schema: Some(asset_copy_schema()),
            output_schema_name: Some("asset_output"),
            grounding_tools: vec![],
            provider_family: ProviderFamily::Chat,
        },
        PromptSpec {
            task_type: TaskType::VideoStoryboard,
            version: 1,
            template: "Produce a 3-5 shot storyboard for job {role_title} on channel {channel_id}.\n\n{job_snapshot}".to_string(),
            variables: vec!["role_title", "channel_id", "job_snapshot"],
            output_schema: Some(storyboard_schema()),
            output_schema_name: Some("storyboard_output"),
            grounding_tools: vec![],
            provider_family: ProviderFamily::Chat,
        },
        PromptSpec {
            task_type: TaskType::VideoCompliance,
            version: 1,
            template: "Flag compliance issues in this storyboard.\n\n{storyboard}".to_string(),
            variables: vec!["storyboard"],
            output_schema: Some(compliance_schema()),
            output_schema_name: Some("compliance_output"),
            grounding_tools: vec![],
            provider_family: ProviderFamily::Chat,
        },
        PromptSpec {
            task_type: TaskType::VideoCaption,
            version: 1,
            template: "Write a caption and hashtags for this video.\n\n{storyboard}".to_string(),
            variables: vec!["storyboard"],
            output_schema: Some(caption_schema()),
            output_schema_name: Some("caption_output"),
            grounding_tools: vec![],
            provider_family: ProviderFamily::Chat,
        },
        PromptSpec {
            task_type: TaskType::CompanyIntel,
            version: 1,
            template: "Research the company {company_name} and summarize for recruiting context.".to_string(),
            variables: vec!["company_name"],
            output_schema: Some(company_intel_schema()),
            output_schema_name: Some("company_intel_output"),
            // Grounding tools declared: this is the task/provider pairing the
            // compatibility gate (§4.1 step 5, §6) exists to handle.
            grounding_tools: vec!["web_search"],
            provider_family: ProviderFamily::SearchGrounded,
        },
        PromptSpec {
            task_type: TaskType::ImagePromptGeneration,
            version: 1,
            template: "Write an image-generation prompt for a hero image for this job.\n\n{job_snapshot}".to_string(),
            variables: vec!["job_snapshot"],
            output_schema: Some(asset_copy_schema()),
            output_schema_name: Some("image_prompt_output"),
            grounding_tools: vec![],
            provider_family: ProviderFamily::Chat,
        },
        PromptSpec {
            task_type: TaskType::ImageGeneration,
            version: 1,
            template: "{image_prompt}".to_string(),
            variables: vec!["image_prompt"],
            output_schema: None,
            output_schema_name: None,
            grounding_tools: vec![],
            provider_family: ProviderFamily::Image,
        },
        PromptSpec {
            task_type: TaskType::ImageCaption,
            version: 1,
            template: "Write alt text and a short caption for this hero image prompt.\n\n{image_prompt}".to_string(),
            variables: vec!["image_prompt"],
            output_schema: Some(caption_schema()),
            output_schema_name: Some("image_caption_output"),
            grounding_tools: vec![],
            provider_family: ProviderFamily::Chat,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_task_gets_synthetic_prompt_with_empty_template() {
        let registry = PromptRegistry::bootstrap();
        assert!(!registry.is_registered(TaskType::VideoRender));
        let spec = registry.resolve(TaskType::VideoRender);
        assert!(spec.template.is_empty());
        assert!(!spec.has_output_schema());
    }

    #[test]
    fn company_intel_declares_grounding_tools_on_search_grounded_family() {
        let registry = PromptRegistry::bootstrap();
        let spec = registry.resolve(TaskType::CompanyIntel);
        assert!(spec.has_grounding_tools());
        assert_eq!(spec.provider_family, ProviderFamily::SearchGrounded);
    }

    #[test]
    fn render_substitutes_known_variables_and_leaves_unknown_placeholders() {
        let registry = PromptRegistry::bootstrap();
        let spec = registry.resolve(TaskType::Refine);
        let mut values = HashMap::new();
        values.insert("job_snapshot", "Senior Backend Engineer at Acme".to_string());
        let rendered = spec.render(&values);
        assert!(rendered.contains("Senior Backend Engineer at Acme"));
    }

    #[test]
    fn suggest_prompt_has_output_schema_and_no_grounding_tools() {
        let registry = PromptRegistry::bootstrap();
        let spec = registry.resolve(TaskType::Suggest);
        assert!(spec.has_output_schema());
        assert!(!spec.has_grounding_tools());
    }
}
