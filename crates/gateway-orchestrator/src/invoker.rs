//! The metered, single-shot LLM call primitive (§4.1 steps 3-6, 9-10): every
//! text/image/video-prompt LLM call in the gateway — whether from the core
//! task pipeline, the copilot agent loop, or the video manifest builder —
//! goes through this so credit reserve/commit/refund and usage-row emission
//! never get re-derived ad hoc at a call site.
//!
//! Split into `call` and `settle` rather than one shot: §4.1 requires the
//! document write to land *before* the credit commit, so the caller persists
//! between the two.

use std::sync::Arc;

use gateway_config::{AppConfig, CreditRatios, ProviderModelRef};
use gateway_ledger::CreditLedger;
use gateway_observability::{emit_event, ObservabilityEvent, ProcessKind};
use gateway_prompts::{decide, PromptRegistry};
use gateway_providers::ProviderRegistry;
use gateway_types::{
    Caller, ErrorKind, GatewayError, InvocationMode, ProviderFamily, ProviderInvokeRequest,
    ProviderInvokeResponse, TaskType, UsageStatus,
};
use tracing::Level;

/// Rough token estimate from prompt+payload character length (§4.1 step 3:
/// "ceil over 4-char tokens").
pub fn estimate_tokens(text: &str) -> u64 {
    ((text.len() as f64) / 4.0).ceil() as u64
}

/// Result of `call()`: the provider response plus everything `settle()` needs
/// to resolve the reservation it opened.
pub struct CallOutcome {
    pub response: ProviderInvokeResponse,
    pub provider_id: String,
    pub model_id: String,
    reservation_id: String,
    ratios: CreditRatios,
    task_type: TaskType,
}

pub struct ProviderInvoker {
    pub providers: Arc<ProviderRegistry>,
    pub prompts: Arc<PromptRegistry>,
    pub ledger: Arc<CreditLedger>,
    pub config: Arc<AppConfig>,
}

impl ProviderInvoker {
    pub fn new(
        providers: Arc<ProviderRegistry>,
        prompts: Arc<PromptRegistry>,
        ledger: Arc<CreditLedger>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            providers,
            prompts,
            ledger,
            config,
        }
    }

    fn provider_family_kind(vendor: &str) -> ProviderFamily {
        match vendor {
            "search-grounded" => ProviderFamily::SearchGrounded,
            "image-gen" => ProviderFamily::Image,
            "video-gen" => ProviderFamily::Video,
            _ => ProviderFamily::Chat,
        }
    }

    /// §4.5 conversion dispatch: image calls bill per unit, everything routed
    /// through this single-shot text/JSON path bills per token.
    fn estimate_credits(vendor: &str, ratios: CreditRatios, prompt_tokens: u64) -> u64 {
        if vendor == "image-gen" {
            gateway_ledger::image_credits(1, ratios)
        } else {
            gateway_ledger::text_credits(prompt_tokens, ratios)
        }
    }

    fn actual_credits(vendor: &str, ratios: CreditRatios, usage: &gateway_types::TokenUsage) -> u64 {
        if vendor == "image-gen" {
            gateway_ledger::image_credits(usage.image_count.unwrap_or(1), ratios)
        } else {
            gateway_ledger::text_credits(usage.prompt_tokens + usage.candidates_tokens, ratios)
        }
    }

    pub fn provider_for(&self, task_type: TaskType) -> ProviderModelRef {
        self.config.provider_for_family(task_type.provider_family())
    }

    /// §4.1 steps 3 (reserve), 4 (resolve provider — caller has already
    /// rendered the prompt text from the Prompt Registry), 5 (compatibility
    /// gate), 6 (invoke). Does NOT resolve the reservation — call `settle`
    /// after persisting the task's result document.
    #[allow(clippy::too_many_arguments)]
    pub async fn call(
        &self,
        task_type: TaskType,
        system: String,
        user: String,
        output_schema: Option<serde_json::Value>,
        output_schema_name: Option<String>,
        grounding_tools: Vec<String>,
        caller: &Caller,
    ) -> Result<CallOutcome, GatewayError> {
        let family = self.provider_for(task_type);
        let provider_family_kind = Self::provider_family_kind(&family.vendor);

        let estimate_text = format!("{system}\n{user}");
        let estimated_tokens = estimate_tokens(&estimate_text);
        let ratios = self.config.credit_ratios_for(&family.vendor, &family.model);
        let estimated_credits = Self::estimate_credits(&family.vendor, ratios, estimated_tokens);

        let reservation = self
            .ledger
            .reserve(&caller.user_id, estimated_credits, &caller.correlation_id)
            .await
            .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))?
            .map_err(|_| {
                GatewayError::new(ErrorKind::InsufficientCredits, "insufficient credits reserved")
            })?;

        let gate = decide(
            provider_family_kind,
            !grounding_tools.is_empty(),
            output_schema.is_some(),
        );

        let adapter = self.providers.resolve(&family).map_err(|e| {
            GatewayError::new(ErrorKind::Internal, format!("no provider adapter: {e}"))
        })?;

        let request = ProviderInvokeRequest {
            model: family.model.clone(),
            system,
            user,
            mode: if gate.has_response_schema {
                InvocationMode::Json
            } else {
                InvocationMode::Text
            },
            task_type: task_type.as_str().to_string(),
            output_schema: if gate.has_response_schema { output_schema } else { None },
            output_schema_name: if gate.has_response_schema {
                output_schema_name
            } else {
                None
            },
            tools: grounding_tools,
            correlation_id: caller.correlation_id.clone(),
        };

        emit_event(
            Level::INFO,
            ProcessKind::Engine,
            ObservabilityEvent {
                event: "provider_invoke_start",
                component: "gateway-orchestrator",
                correlation_id: Some(&caller.correlation_id),
                task_type: Some(task_type.as_str()),
                provider_id: Some(&family.vendor),
                model_id: Some(&family.model),
                status: None,
                error_code: None,
                detail: None,
            },
        );

        let response = adapter.invoke(request).await;

        emit_event(
            Level::INFO,
            ProcessKind::Engine,
            ObservabilityEvent {
                event: "provider_invoke_finish",
                component: "gateway-orchestrator",
                correlation_id: Some(&caller.correlation_id),
                task_type: Some(task_type.as_str()),
                provider_id: Some(&family.vendor),
                model_id: Some(&family.model),
                status: Some(if response.is_error() { "error" } else { "ok" }),
                error_code: response.error.as_ref().map(|e| e.reason.as_str()),
                detail: None,
            },
        );

        Ok(CallOutcome {
            response,
            provider_id: family.vendor,
            model_id: family.model,
            reservation_id: reservation.reservation_id,
            ratios,
            task_type,
        })
    }

    /// §4.1 steps 9 (commit on success / refund on error) and 10 (emit usage
    /// row). Must run only after the caller has durably persisted the task's
    /// result (or failure envelope).
    pub async fn settle(
        &self,
        outcome: &CallOutcome,
        caller: &Caller,
        job_id: Option<String>,
    ) -> Result<u64, GatewayError> {
        let (status, credits_used, error_reason) = if outcome.response.is_error() {
            self.ledger
                .refund(&outcome.reservation_id)
                .await
                .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))?;
            (
                UsageStatus::Errored,
                0,
                outcome.response.error.as_ref().map(|e| e.reason.clone()),
            )
        } else {
            let actual_credits =
                Self::actual_credits(&outcome.provider_id, outcome.ratios, &outcome.response.usage);
            let committed = self
                .ledger
                .commit(&outcome.reservation_id, actual_credits)
                .await
                .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))?;
            (UsageStatus::Committed, committed, None)
        };

        let usage_entry = gateway_ledger::CreditLedger::usage_entry(
            caller.user_id.clone(),
            job_id,
            outcome.task_type.log_alias().to_string(),
            outcome.provider_id.clone(),
            outcome.model_id.clone(),
            &outcome.response.usage,
            credits_used,
            0.0,
            status,
            error_reason,
        );
        // Usage emission is best-effort and not transactional with the
        // document write (§4.1 ordering note) — log and continue on failure.
        if let Err(err) = self.ledger.append_usage(usage_entry).await {
            tracing::warn!(error = %err, "failed to append usage log entry");
        }

        Ok(credits_used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_tokens_ceils_character_count_over_four() {
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(""), 0);
    }
}
