use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/api/health", get(handlers::health_check))
        // Session control
        .route("/api/voice/start", post(handlers::start_session))
        .route("/api/voice/stop/:session_id", post(handlers::stop_session))
        .route(
            "/api/voice/listening/:session_id",
            post(handlers::set_listening),
        )
        // Audio in, transcripts out
        .route("/api/voice/audio/:session_id", post(handlers::send_audio))
        .route(
            "/api/voice/transcript/:session_id",
            get(handlers::get_transcript),
        )
        .route(
            "/api/voice/transcript-stream",
            get(handlers::transcript_stream),
        )
        // Browser clients call from another origin
        .layer(CorsLayer::permissive())
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
