use super::snapshot::TranscriptSnapshot;
use crate::error::{VoiceError, VoiceResult};
use crate::transcription::TranscriptionStream;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, error};

/// One caller's live transcription state
pub struct Session {
    id: String,

    /// Append-only; grows by one final fragment plus separator at a time
    accumulated_transcript: String,

    /// Replaced on every interim result, cleared on every final one
    interim_fragment: String,

    listening: bool,

    created_at: DateTime<Utc>,

    /// Last audio chunk or transcript result, for idle expiry
    last_activity: Instant,

    /// Provider connection; `None` once released
    stream: Option<Box<dyn TranscriptionStream>>,
}

impl Session {
    /// Create a session that is listening from the start
    pub fn new(id: impl Into<String>, stream: Box<dyn TranscriptionStream>) -> Self {
        Self {
            id: id.into(),
            accumulated_transcript: String::new(),
            interim_fragment: String::new(),
            listening: true,
            created_at: Utc::now(),
            last_activity: Instant::now(),
            stream: Some(stream),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn transcript(&self) -> &str {
        &self.accumulated_transcript
    }

    pub fn interim(&self) -> &str {
        &self.interim_fragment
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Apply one transcript result
    pub fn apply_transcript(&mut self, text: &str, is_final: bool, separator: &str) {
        if is_final {
            self.accumulated_transcript.push_str(text);
            self.accumulated_transcript.push_str(separator);
            self.interim_fragment.clear();
        } else {
            self.interim_fragment.clear();
            self.interim_fragment.push_str(text);
        }
        self.touch();
    }

    pub fn set_listening(&mut self, listening: bool) {
        self.listening = listening;
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Hand an audio chunk to the provider connection
    pub fn send_audio(&mut self, audio: Bytes) -> VoiceResult<()> {
        let stream = self.stream.as_ref().ok_or_else(|| {
            VoiceError::SendFailed(format!("Session {} has no open connection", self.id))
        })?;
        stream.send_audio(audio)?;
        self.touch();
        Ok(())
    }

    /// Detach the provider connection without closing it.
    ///
    /// Lets a caller close the connection after releasing the session lock.
    pub fn take_stream(&mut self) -> Option<Box<dyn TranscriptionStream>> {
        self.stream.take()
    }

    /// Close and drop the provider connection.
    ///
    /// Returns `false` when it was already released.
    pub async fn release_stream(&mut self) -> bool {
        let stream = self.stream.take();
        close_stream(&self.id, stream).await
    }

    pub fn snapshot(&self) -> TranscriptSnapshot {
        TranscriptSnapshot {
            session_id: self.id.clone(),
            transcript: self.accumulated_transcript.clone(),
            interim_transcript: self.interim_fragment.clone(),
            listening: self.listening,
            created_at: self.created_at,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("accumulated_transcript", &self.accumulated_transcript)
            .field("interim_fragment", &self.interim_fragment)
            .field("listening", &self.listening)
            .field("created_at", &self.created_at)
            .field("has_stream", &self.stream.is_some())
            .finish()
    }
}

/// Close a connection detached from its session.
///
/// Returns `false` when there was nothing to close.
pub(crate) async fn close_stream(
    session_id: &str,
    stream: Option<Box<dyn TranscriptionStream>>,
) -> bool {
    match stream {
        Some(mut stream) => {
            if let Err(e) = stream.close().await {
                error!("Failed to close connection for session {}: {}", session_id, e);
            }
            true
        }
        None => {
            debug!("Connection for session {} already released", session_id);
            false
        }
    }
}
