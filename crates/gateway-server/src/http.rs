//! Route handlers for the axum router built in `lib.rs`. Each handler:
//! resolves the `Caller` from request headers, loads/authorizes as needed,
//! and maps the crate's `GatewayError` onto the §7 HTTP status taxonomy via
//! `error_response`.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use gateway_store::{collections, DocumentStore, TypedStore};
use gateway_types::{Caller, CopilotChatDocument, CopilotStage, ErrorKind, GatewayError, Job, TaskType, VideoItem};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::AppState;

pub async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// §6 "Authentication": the bearer-token gate in `lib.rs` establishes that
/// the request is allowed in; this resolves *who* made it. A missing
/// `X-User-Id` is itself an `unauthorized` (401) — the orchestrator must
/// never run with no caller identity (§6 "Unauthenticated requests → 401
/// before enrichment").
fn caller_from(headers: &HeaderMap) -> Result<Caller, GatewayError> {
    let user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| GatewayError::new(ErrorKind::Unauthorized, "missing X-User-Id header"))?
        .to_string();
    let correlation_id = headers
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    Ok(Caller {
        user_id,
        correlation_id,
    })
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    kind: &'static str,
}

fn error_response(err: GatewayError) -> Response {
    let status = StatusCode::from_u16(err.kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let kind = match err.kind {
        ErrorKind::InvalidContext => "invalid_context",
        ErrorKind::Unauthorized => "unauthorized",
        ErrorKind::Forbidden => "forbidden",
        ErrorKind::NotFound => "not_found",
        ErrorKind::RequirementsIncomplete => "requirements_incomplete",
        ErrorKind::InsufficientCredits => "insufficient_credits",
        ErrorKind::ProviderError => "provider_error",
        ErrorKind::SchemaValidationFailed => "schema_validation_failed",
        ErrorKind::GroundingIncompatible => "grounding_incompatible",
        ErrorKind::RenderFailed => "render_failed",
        ErrorKind::Timeout => "timeout",
        ErrorKind::Internal => "internal",
    };
    (
        status,
        Json(ErrorEnvelope {
            error: ErrorBody {
                message: err.message,
                kind,
            },
        }),
    )
        .into_response()
}

#[derive(Deserialize)]
pub struct RunLlmTaskRequest {
    pub task_type: String,
    #[serde(default)]
    pub context: Value,
}

/// `POST /api/llm` (§6): the single dispatch point for every core/orchestrator
/// task type. `video_*` task types are routed to `gateway-video` instead of
/// `Orchestrator::run_task`, mirroring the split already enforced inside the
/// orchestrator crate (§4.1.1 "video_* task types are not dispatched through
/// this pipeline").
pub async fn run_llm_task(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<RunLlmTaskRequest>) -> Response {
    let caller = match caller_from(&headers) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };
    let Some(task_type) = TaskType::parse(&body.task_type) else {
        return error_response(GatewayError::new(
            ErrorKind::InvalidContext,
            format!("unknown taskType `{}`", body.task_type),
        ));
    };

    let result = if task_type.provider_family() == "video" {
        run_video_task(&state, task_type, body.context, &caller).await
    } else {
        state
            .orchestrator
            .run_task(task_type, body.context, caller)
            .await
            .map(|r| serde_json::to_value(r).unwrap_or(Value::Null))
    };

    match result {
        Ok(value) => Json(value).into_response(),
        Err(e) => error_response(e),
    }
}

async fn run_video_task(state: &AppState, task_type: TaskType, context: Value, caller: &Caller) -> Result<Value, GatewayError> {
    let job_id = context
        .get("jobId")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::new(ErrorKind::InvalidContext, "context.jobId is required"))?;
    let video_id = context.get("videoId").and_then(Value::as_str);

    let item = match task_type {
        TaskType::VideoCreateManifest => {
            let channel_id = context
                .get("channelId")
                .and_then(Value::as_str)
                .ok_or_else(|| GatewayError::new(ErrorKind::InvalidContext, "context.channelId is required"))?;
            state.video.create(job_id, channel_id, caller).await?
        }
        TaskType::VideoRegenerate => {
            let video_id = video_id.ok_or_else(|| GatewayError::new(ErrorKind::InvalidContext, "context.videoId is required"))?;
            state.video.regenerate(video_id, caller).await?
        }
        TaskType::VideoCaptionUpdate => {
            let video_id = video_id.ok_or_else(|| GatewayError::new(ErrorKind::InvalidContext, "context.videoId is required"))?;
            let text = context.get("text").and_then(Value::as_str).unwrap_or_default().to_string();
            let hashtags = context
                .get("hashtags")
                .and_then(|v| v.as_array())
                .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default();
            state.video.update_caption(video_id, caller, text, hashtags).await?
        }
        TaskType::VideoRender => {
            let video_id = video_id.ok_or_else(|| GatewayError::new(ErrorKind::InvalidContext, "context.videoId is required"))?;
            state.video.trigger_render(video_id, caller).await?
        }
        other => {
            return Err(GatewayError::new(
                ErrorKind::InvalidContext,
                format!("task `{}` is not dispatched through /api/llm's video path", other.as_str()),
            ))
        }
    };

    Ok(serde_json::json!({
        "jobId": item.job_id,
        "payload": item,
        "refreshed": true,
        "updatedAt": item.updated_at,
    }))
}

#[derive(Deserialize)]
pub struct ListVideosQuery {
    #[serde(rename = "jobId")]
    pub job_id: String,
}

pub async fn list_videos(State(state): State<AppState>, headers: HeaderMap, Query(q): Query<ListVideosQuery>) -> Response {
    let caller = match caller_from(&headers) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };
    match state.video.list_for_job(&q.job_id, &caller).await {
        Ok(items) => Json(items).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn get_video(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    let caller = match caller_from(&headers) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };
    match state.video.fetch(&id, &caller).await {
        Ok(item) => Json(item).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn approve_video(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    let caller = match caller_from(&headers) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };
    match state.video.approve(&id, &caller).await {
        Ok(item) => Json(item).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn publish_video(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    let caller = match caller_from(&headers) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };
    match state.video.publish(&id, &caller).await {
        Ok(item) => Json(item).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn archive_video(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    let caller = match caller_from(&headers) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };
    match state.video.archive(&id, &caller).await {
        Ok(item) => Json(item).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn retry_video(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    let caller = match caller_from(&headers) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };
    match state.video.retry_render(&id, &caller).await {
        Ok(item) => Json(item).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
pub struct BulkVideosRequest {
    pub video_ids: Vec<String>,
    pub action: String,
}

#[derive(Serialize)]
pub struct BulkVideoOutcome {
    pub video_id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<VideoItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `POST /videos/bulk` (§6): applies one action to a batch of videos,
/// returning per-id outcomes rather than failing the whole request on one
/// bad id (§9 "bulk operations isolate per-item failure").
pub async fn bulk_videos(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<BulkVideosRequest>) -> Response {
    let caller = match caller_from(&headers) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };
    let action = match body.action.as_str() {
        "approve" => gateway_video::BulkAction::Approve,
        "publish" => gateway_video::BulkAction::Publish,
        "archive" => gateway_video::BulkAction::Archive,
        "trigger_render" => gateway_video::BulkAction::TriggerRender,
        other => {
            return error_response(GatewayError::new(
                ErrorKind::InvalidContext,
                format!("unknown bulk action `{other}`"),
            ))
        }
    };
    let results = state.video.bulk(&body.video_ids, action, &caller).await;
    let outcomes: Vec<BulkVideoOutcome> = results
        .into_iter()
        .map(|(video_id, outcome)| match outcome {
            Ok(item) => BulkVideoOutcome {
                video_id,
                ok: true,
                item: Some(item),
                error: None,
            },
            Err(e) => BulkVideoOutcome {
                video_id,
                ok: false,
                item: None,
                error: Some(e.message),
            },
        })
        .collect();
    Json(outcomes).into_response()
}

#[derive(Deserialize)]
pub struct CopilotChatQuery {
    #[serde(rename = "jobId")]
    pub job_id: String,
}

const COPILOT_CHAT_HISTORY_LIMIT: usize = 20;

/// `GET /copilot/chat?jobId=…` (§6) — history, capped at 20 most-recent
/// messages.
pub async fn copilot_chat_history(State(state): State<AppState>, headers: HeaderMap, Query(q): Query<CopilotChatQuery>) -> Response {
    let caller = match caller_from(&headers) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };
    match load_owned_job(&state.store, &q.job_id, &caller).await {
        Ok(_) => {}
        Err(e) => return error_response(e),
    }
    let chat = match state
        .store
        .get::<CopilotChatDocument>(collections::WIZARD_COPILOT_CHATS, &q.job_id)
        .await
    {
        Ok(Some(doc)) => doc,
        Ok(None) => return Json(Vec::<Value>::new()).into_response(),
        Err(e) => return error_response(GatewayError::new(ErrorKind::Internal, e.to_string())),
    };
    let len = chat.messages.len();
    let start = len.saturating_sub(COPILOT_CHAT_HISTORY_LIMIT);
    Json(&chat.messages[start..]).into_response()
}

#[derive(Deserialize)]
pub struct CopilotChatTurnRequest {
    pub job_id: String,
    pub stage: CopilotStage,
    pub user_message: String,
}

#[derive(Serialize)]
pub struct CopilotChatTurnResponse {
    pub message: String,
    pub actions: Vec<gateway_types::Action>,
    pub turns_used: usize,
    pub hit_turn_cap: bool,
}

/// Submits one user utterance to the bounded copilot agent loop and returns
/// its reply. Required for the chat to actually be drivable — the GET route
/// alone only reads history back.
pub async fn copilot_chat_turn(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<CopilotChatTurnRequest>) -> Response {
    let caller = match caller_from(&headers) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };
    match state
        .copilot
        .handle_turn(&body.job_id, body.stage, body.user_message, &caller)
        .await
    {
        Ok(outcome) => Json(CopilotChatTurnResponse {
            message: outcome.message,
            actions: outcome.actions,
            turns_used: outcome.turns_used,
            hit_turn_cap: outcome.hit_turn_cap,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn load_owned_job(store: &Arc<dyn DocumentStore>, job_id: &str, caller: &Caller) -> Result<Job, GatewayError> {
    let job = store
        .get::<Job>(collections::JOBS, job_id)
        .await
        .map_err(|e| GatewayError::new(ErrorKind::Internal, e.to_string()))?
        .ok_or_else(|| GatewayError::new(ErrorKind::NotFound, format!("job {job_id} not found")))?;
    if job.owner_user_id != caller.user_id {
        return Err(GatewayError::new(ErrorKind::Forbidden, "caller does not own this job"));
    }
    Ok(job)
}
