use gateway_types::ProviderFamily;

/// C4 — the schema/grounding compatibility decision (§6 "bit-exact" rule),
/// factored out as a single pure function so every adapter consults the same
/// logic instead of re-deriving it.
///
/// `(hasGroundingTools, hasResponseSchema)` must satisfy: if the resolved
/// provider is the search-grounded family AND the task declares grounding
/// tools, structured output is disabled regardless of whether the task has
/// an output schema; otherwise it's enabled iff the task has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateDecision {
    pub has_grounding_tools: bool,
    pub has_response_schema: bool,
}

pub fn decide(family: ProviderFamily, has_grounding_tools: bool, has_output_schema: bool) -> GateDecision {
    let has_response_schema = if family == ProviderFamily::SearchGrounded && has_grounding_tools {
        false
    } else {
        has_output_schema
    };
    GateDecision {
        has_grounding_tools,
        has_response_schema,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_grounded_with_tools_disables_schema_even_if_task_has_one() {
        let decision = decide(ProviderFamily::SearchGrounded, true, true);
        assert!(!decision.has_response_schema);
    }

    #[test]
    fn search_grounded_without_tools_honors_output_schema() {
        let decision = decide(ProviderFamily::SearchGrounded, false, true);
        assert!(decision.has_response_schema);
    }

    #[test]
    fn chat_family_always_honors_output_schema_flag() {
        assert!(decide(ProviderFamily::Chat, true, true).has_response_schema);
        assert!(!decide(ProviderFamily::Chat, true, false).has_response_schema);
    }

    #[test]
    fn image_and_video_families_behave_like_chat_for_the_gate() {
        assert!(decide(ProviderFamily::Image, false, true).has_response_schema);
        assert!(decide(ProviderFamily::Video, false, true).has_response_schema);
    }
}
