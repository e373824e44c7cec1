use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time view of a session's transcript state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSnapshot {
    pub session_id: String,

    /// Final fragments joined with the separator
    pub transcript: String,

    /// Latest non-final fragment, empty after a final one
    pub interim_transcript: String,

    pub listening: bool,

    pub created_at: DateTime<Utc>,
}
