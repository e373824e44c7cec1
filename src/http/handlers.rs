use super::state::AppState;
use crate::error::VoiceError;
use crate::events::StreamFrame;
use crate::session::{SessionManager, TranscriptSnapshot};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, Sse},
        IntoResponse, Json, Response,
    },
};
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct StartSessionRequest {
    /// Optional session ID (if absent or blank, one is generated)
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub success: bool,
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SetListeningRequest {
    pub listening: bool,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub success: bool,
    #[serde(flatten)]
    pub snapshot: TranscriptSnapshot,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    pub deepgram_enabled: bool,
    pub active_sessions: usize,
}

// ============================================================================
// Helpers
// ============================================================================

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            success: false,
            message: message.into(),
        }),
    )
        .into_response()
}

fn status_for(err: &VoiceError) -> StatusCode {
    match err {
        VoiceError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        VoiceError::StartFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        VoiceError::NotFound(_) => StatusCode::NOT_FOUND,
        VoiceError::SendFailed(_) => StatusCode::BAD_REQUEST,
        VoiceError::AlreadyExists(_) => StatusCode::CONFLICT,
    }
}

fn voice_error(err: VoiceError) -> Response {
    error_response(status_for(&err), err.to_string())
}

fn voice_manager(state: &AppState) -> Result<&Arc<SessionManager>, Response> {
    state.voice.as_ref().ok_or_else(|| {
        voice_error(VoiceError::ProviderUnavailable(
            "Voice transcription is not configured".to_string(),
        ))
    })
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/voice/start
/// Start a new voice session
pub async fn start_session(State(state): State<AppState>, body: Bytes) -> Response {
    let manager = match voice_manager(&state) {
        Ok(manager) => manager,
        Err(response) => return response,
    };

    // The body is optional; an empty one means "generate an id"
    let req = if body.is_empty() {
        StartSessionRequest::default()
    } else {
        match serde_json::from_slice::<StartSessionRequest>(&body) {
            Ok(req) => req,
            Err(e) => {
                return error_response(StatusCode::BAD_REQUEST, format!("Invalid request: {}", e))
            }
        }
    };

    match manager.start_session(req.session_id).await {
        Ok(session_id) => (
            StatusCode::OK,
            Json(StartSessionResponse {
                success: true,
                session_id,
                message: "Voice session started".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to start voice session: {}", e);
            voice_error(e)
        }
    }
}

/// POST /api/voice/audio/:session_id
/// Forward a raw audio chunk to the session's provider connection
pub async fn send_audio(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> Response {
    let manager = match voice_manager(&state) {
        Ok(manager) => manager,
        Err(response) => return response,
    };

    match manager.feed_audio(&session_id, body).await {
        Ok(()) => (
            StatusCode::OK,
            Json(SuccessResponse {
                success: true,
                message: None,
            }),
        )
            .into_response(),
        // Unknown sessions and send failures are both client errors here
        Err(e @ (VoiceError::NotFound(_) | VoiceError::SendFailed(_))) => {
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e) => voice_error(e),
    }
}

/// GET /api/voice/transcript/:session_id
/// Accumulated and interim transcript for a session
pub async fn get_transcript(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let manager = match voice_manager(&state) {
        Ok(manager) => manager,
        Err(response) => return response,
    };

    match manager.query_transcript(&session_id).await {
        Ok(snapshot) => (
            StatusCode::OK,
            Json(TranscriptResponse {
                success: true,
                snapshot,
            }),
        )
            .into_response(),
        Err(e) => voice_error(e),
    }
}

/// POST /api/voice/listening/:session_id
/// Toggle the listening flag
pub async fn set_listening(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<SetListeningRequest>,
) -> Response {
    let manager = match voice_manager(&state) {
        Ok(manager) => manager,
        Err(response) => return response,
    };

    match manager.set_listening(&session_id, req.listening).await {
        Ok(()) => (
            StatusCode::OK,
            Json(SuccessResponse {
                success: true,
                message: None,
            }),
        )
            .into_response(),
        Err(e) => voice_error(e),
    }
}

/// POST /api/voice/stop/:session_id
/// Stop and close a voice session
pub async fn stop_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let manager = match voice_manager(&state) {
        Ok(manager) => manager,
        Err(response) => return response,
    };

    match manager.stop_session(&session_id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(SuccessResponse {
                success: true,
                message: Some("Voice session stopped".to_string()),
            }),
        )
            .into_response(),
        Err(e) => {
            warn!("Stop requested for {}: {}", session_id, e);
            voice_error(e)
        }
    }
}

/// GET /api/voice/transcript-stream
/// Server-sent events: one JSON transcript event per frame, `{}` keep-alives
pub async fn transcript_stream(State(state): State<AppState>) -> Response {
    let manager = match voice_manager(&state) {
        Ok(manager) => manager,
        Err(response) => return response,
    };

    let subscription = manager.publisher().subscribe();
    info!(
        "Transcript stream subscriber connected ({} total)",
        manager.publisher().subscriber_count()
    );

    let stream = subscription.into_stream().map(|frame| {
        let data = match frame {
            StreamFrame::Event(event) => serde_json::to_string(&event).unwrap_or_else(|e| {
                error!("Failed to serialize transcript event: {}", e);
                "{}".to_string()
            }),
            StreamFrame::KeepAlive => "{}".to_string(),
        };
        Ok::<_, Infallible>(Event::default().data(data))
    });

    Sse::new(stream).into_response()
}

/// GET /api/health
/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let active_sessions = match &state.voice {
        Some(manager) => manager.active_sessions().await,
        None => 0,
    };

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            message: format!("{} is running", state.service_name),
            deepgram_enabled: state.voice_enabled(),
            active_sessions,
        }),
    )
}
