//! Defensive parsing of the LLM's free-text turn reply. The `CopilotAgent`
//! prompt declares no output schema (the compatibility gate never requests
//! structured output for chat-family calls without grounding tools), so
//! every turn's reply is plain text that is *expected* to be a JSON object
//! but is handled with best-effort extraction rather than required to parse.

use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum AgentStep {
    ToolCall { tool: String, input: Value },
    Final { message: String },
}

pub fn parse_agent_step(text: &str) -> AgentStep {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return AgentStep::Final { message: String::new() };
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if let Some(step) = step_from_value(&value) {
            return step;
        }
    }

    if let Some(block) = extract_first_json_object(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(&block) {
            if let Some(step) = step_from_value(&value) {
                return step;
            }
        }
    }

    AgentStep::Final { message: trimmed.to_string() }
}

fn step_from_value(value: &Value) -> Option<AgentStep> {
    let obj = value.as_object()?;
    match obj.get("type").and_then(Value::as_str)? {
        "tool_call" => {
            let tool = obj.get("tool").and_then(Value::as_str)?.to_string();
            let input = obj.get("input").cloned().unwrap_or_else(|| json!({}));
            Some(AgentStep::ToolCall { tool, input })
        }
        "final" => {
            let message = obj.get("message").and_then(Value::as_str).unwrap_or_default().to_string();
            Some(AgentStep::Final { message })
        }
        _ => None,
    }
}

/// Scans for the first balanced `{...}` span, so a JSON object embedded in
/// surrounding prose can still be recovered.
fn extract_first_json_object(input: &str) -> Option<String> {
    let mut start = None;
    let mut depth = 0usize;
    for (idx, ch) in input.char_indices() {
        if ch == '{' {
            if start.is_none() {
                start = Some(idx);
            }
            depth += 1;
        } else if ch == '}' {
            if depth == 0 {
                continue;
            }
            depth -= 1;
            if depth == 0 {
                let begin = start?;
                return input.get(begin..=idx).map(str::to_string);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tool_call_object() {
        let step = parse_agent_step(r#"{"type":"tool_call","tool":"get_job_snapshot","input":{}}"#);
        assert_eq!(step, AgentStep::ToolCall { tool: "get_job_snapshot".to_string(), input: json!({}) });
    }

    #[test]
    fn parses_final_object_embedded_in_prose() {
        let step = parse_agent_step("Sure thing! {\"type\":\"final\",\"message\":\"Done.\"} Let me know if you need more.");
        assert_eq!(step, AgentStep::Final { message: "Done.".to_string() });
    }

    #[test]
    fn falls_back_to_raw_text_when_unparseable() {
        let step = parse_agent_step("Sounds good, I'll leave that as-is.");
        assert_eq!(step, AgentStep::Final { message: "Sounds good, I'll leave that as-is.".to_string() });
    }

    #[test]
    fn empty_reply_is_an_empty_final_message() {
        assert_eq!(parse_agent_step("   "), AgentStep::Final { message: String::new() });
    }
}
