use super::session::Session;
use super::snapshot::TranscriptSnapshot;
use crate::error::{VoiceError, VoiceResult};
use crate::transcription::TranscriptionStream;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// A session behind its own lock
pub type SharedSession = Arc<Mutex<Session>>;

/// Live sessions keyed by id.
///
/// The map lock is held only for lookup, insert and remove. Field updates
/// take the per-session lock, so work on one session never waits on another.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SharedSession>>,
    separator: String,
}

impl SessionStore {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            separator: separator.into(),
        }
    }

    /// Register a new session owning `stream`.
    ///
    /// On `AlreadyExists` the rejected stream is closed before returning, so
    /// the caller never holds an orphaned connection.
    pub async fn create(&self, id: &str, stream: Box<dyn TranscriptionStream>) -> VoiceResult<()> {
        let mut session = Session::new(id, stream);

        {
            let mut sessions = self.sessions.write().await;
            if !sessions.contains_key(id) {
                sessions.insert(id.to_string(), Arc::new(Mutex::new(session)));
                debug!("Registered session {}", id);
                return Ok(());
            }
        }

        warn!("Session {} already exists, closing duplicate connection", id);
        session.release_stream().await;
        Err(VoiceError::AlreadyExists(id.to_string()))
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    /// Handle to a live session
    pub async fn session(&self, id: &str) -> Option<SharedSession> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn get(&self, id: &str) -> Option<TranscriptSnapshot> {
        let session = self.session(id).await?;
        let session = session.lock().await;
        Some(session.snapshot())
    }

    pub async fn update_transcript(&self, id: &str, text: &str, is_final: bool) -> VoiceResult<()> {
        let session = self
            .session(id)
            .await
            .ok_or_else(|| VoiceError::NotFound(id.to_string()))?;
        session
            .lock()
            .await
            .apply_transcript(text, is_final, &self.separator);
        Ok(())
    }

    pub async fn set_listening(&self, id: &str, listening: bool) -> VoiceResult<()> {
        let session = self
            .session(id)
            .await
            .ok_or_else(|| VoiceError::NotFound(id.to_string()))?;
        session.lock().await.set_listening(listening);
        Ok(())
    }

    /// Forward audio to the session's provider connection
    pub async fn send_audio(&self, id: &str, audio: Bytes) -> VoiceResult<()> {
        let session = self
            .session(id)
            .await
            .ok_or_else(|| VoiceError::NotFound(id.to_string()))?;
        let mut session = session.lock().await;
        session.send_audio(audio)
    }

    /// Unregister a session. The caller owns releasing its stream.
    pub async fn remove(&self, id: &str) -> Option<SharedSession> {
        self.sessions.write().await.remove(id)
    }

    pub async fn ids(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Ids of sessions with no activity for at least `idle_for`
    pub async fn idle_sessions(&self, idle_for: Duration) -> Vec<String> {
        let sessions: Vec<SharedSession> = self.sessions.read().await.values().cloned().collect();

        let mut idle = Vec::new();
        for session in sessions {
            let session = session.lock().await;
            if session.last_activity().elapsed() >= idle_for {
                idle.push(session.id().to_string());
            }
        }
        idle
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(" ")
    }
}
