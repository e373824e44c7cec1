//! HTTP API for voice sessions
//!
//! - POST /api/voice/start - Start a session (optional `session_id`)
//! - POST /api/voice/audio/:id - Push a raw PCM chunk
//! - GET /api/voice/transcript/:id - Poll accumulated + interim transcript
//! - POST /api/voice/listening/:id - Toggle the listening flag
//! - POST /api/voice/stop/:id - Stop a session
//! - GET /api/voice/transcript-stream - Server-sent transcript events
//! - GET /api/health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{
    ErrorResponse, HealthResponse, StartSessionRequest, StartSessionResponse, SuccessResponse,
    TranscriptResponse,
};
pub use routes::create_router;
pub use state::AppState;
