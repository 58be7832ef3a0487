//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    AcceptedResponse, AudioQuery, CommandRequest, ErrorResponse, SessionResponse,
    SuccessResponse, VoiceResponse,
};
use super::AppState;
use crate::presentation::SessionView;
use crate::runtime::{SessionError, SessionEvent};
use crate::speech::AudioClip;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::time::Duration;

/// Media type assumed when an upload does not declare one
const DEFAULT_AUDIO_TYPE: &str = "audio/webm";

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Session lifecycle
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session).delete(end_session))
        // User actions
        .route("/api/sessions/:id/command", post(submit_command))
        .route("/api/sessions/:id/voice", post(start_voice))
        .route("/api/sessions/:id/audio", post(upload_audio))
        // SSE streaming
        .route("/api/sessions/:id/stream", get(stream_session))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Session Lifecycle
// ============================================================

async fn create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    let id = state.sessions.create_session().await;
    let snapshot = state.sessions.snapshot(&id).await?;
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            session: SessionView::render(&snapshot, &state.assets),
        }),
    ))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let snapshot = state.sessions.snapshot(&id).await?;
    Ok(Json(SessionResponse {
        session: SessionView::render(&snapshot, &state.assets),
    }))
}

async fn end_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.sessions.end_session(&id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

// ============================================================
// User Actions
// ============================================================

async fn submit_command(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CommandRequest>,
) -> Result<(StatusCode, Json<AcceptedResponse>), AppError> {
    state.sessions.submit_text(&id, &req.text).await?;
    Ok((StatusCode::ACCEPTED, Json(AcceptedResponse { accepted: true })))
}

async fn start_voice(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<VoiceResponse>), AppError> {
    state.sessions.start_voice(&id).await?;
    let capture = state.sessions.snapshot(&id).await?.capture;
    Ok((
        StatusCode::ACCEPTED,
        Json(VoiceResponse {
            accepted: true,
            capture,
        }),
    ))
}

async fn upload_audio(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<AudioQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<AcceptedResponse>), AppError> {
    let media_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_AUDIO_TYPE.to_string());

    let mut clip = AudioClip::new(body.to_vec(), media_type);
    if let Some(ms) = query.duration_ms {
        clip = clip.with_duration(Duration::from_millis(ms));
    }

    tracing::debug!(session_id = %id, bytes = clip.len(), media_type = %clip.media_type, "Audio uploaded");
    state.sessions.deliver_audio(&id, clip).await?;
    Ok((StatusCode::ACCEPTED, Json(AcceptedResponse { accepted: true })))
}

// ============================================================
// SSE Streaming
// ============================================================

async fn stream_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let (snapshot, broadcast_rx) = state.sessions.subscribe(&id).await?;
    let init_event = SessionEvent::Init {
        view: SessionView::render(&snapshot, &state.assets),
    };
    Ok(sse_stream(init_event, broadcast_rx, state.assets.clone()))
}

async fn get_version() -> &'static str {
    concat!("aria ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        let message = e.to_string();
        match e {
            SessionError::NotFound(_) => AppError::NotFound(message),
            SessionError::EmptyCommand => AppError::BadRequest(message),
            SessionError::Busy(_) | SessionError::NotListening | SessionError::AudioRejected(_) => {
                AppError::Conflict(message)
            }
            SessionError::Closed => AppError::Internal(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
