use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::VoiceResult;

/// One transcription update for a session.
///
/// Serialized with the `transcript` key so browser clients can consume the
/// event-stream payload directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub session_id: String,

    #[serde(rename = "transcript")]
    pub text: String,

    /// Provider-declared stable fragment
    pub is_final: bool,

    pub timestamp: DateTime<Utc>,
}

impl TranscriptEvent {
    pub fn new(session_id: impl Into<String>, text: impl Into<String>, is_final: bool) -> Self {
        Self {
            session_id: session_id.into(),
            text: text.into(),
            is_final,
            timestamp: Utc::now(),
        }
    }
}

/// Write side of the channel every provider connection reports into
pub type EventSink = mpsc::UnboundedSender<TranscriptEvent>;

/// Factory for provider connections
///
/// Implementations:
/// - Deepgram live transcription over WebSocket
/// - In-process scripted providers (tests)
#[async_trait::async_trait]
pub trait TranscriptionProvider: Send + Sync {
    /// Open a connection for `session_id`.
    ///
    /// Transcript events produced by the connection are written to `events`
    /// in the order the provider delivers them. An `Err` here means no
    /// connection exists and nothing needs closing.
    async fn open(
        &self,
        session_id: &str,
        events: EventSink,
    ) -> VoiceResult<Box<dyn TranscriptionStream>>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// A live provider connection owned by exactly one session
#[async_trait::async_trait]
pub trait TranscriptionStream: Send + Sync {
    /// Queue an audio chunk for the provider without waiting on the network
    fn send_audio(&self, audio: Bytes) -> VoiceResult<()>;

    /// Shut the connection down.
    ///
    /// Idempotent. Once this returns, the connection emits no further events.
    async fn close(&mut self) -> VoiceResult<()>;

    /// Whether the underlying connection is still up
    fn is_open(&self) -> bool;
}
