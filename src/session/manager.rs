use super::config::SessionConfig;
use super::session::close_stream;
use super::snapshot::TranscriptSnapshot;
use super::store::SessionStore;
use crate::error::{VoiceError, VoiceResult};
use crate::events::EventPublisher;
use crate::transcription::{EventSink, TranscriptEvent, TranscriptionProvider};
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Orchestrates provider connections, the session store and the publisher.
///
/// Provider connections write their events onto one channel; a dispatcher
/// task drains it in arrival order, applies each event to the store and then
/// publishes it. Events whose session is gone are dropped and logged, never
/// published.
pub struct SessionManager {
    store: Arc<SessionStore>,
    provider: Arc<dyn TranscriptionProvider>,
    publisher: EventPublisher,
    events_tx: EventSink,
    config: SessionConfig,
    dispatcher: JoinHandle<()>,
    reaper: Option<JoinHandle<()>>,
}

impl SessionManager {
    /// Create the manager and spawn its dispatcher (and reaper, when idle
    /// expiry is enabled). Must be called inside a tokio runtime.
    pub fn new(
        provider: Arc<dyn TranscriptionProvider>,
        publisher: EventPublisher,
        config: SessionConfig,
    ) -> Self {
        let store = Arc::new(SessionStore::new(config.transcript_separator.clone()));
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let dispatcher = tokio::spawn(dispatch_events(
            Arc::clone(&store),
            publisher.clone(),
            events_rx,
        ));

        let reaper = config.idle_timeout.map(|idle_timeout| {
            tokio::spawn(reap_idle_sessions(
                Arc::clone(&store),
                idle_timeout,
                config.reap_interval,
            ))
        });

        info!(
            "Session manager ready (provider: {}, idle timeout: {:?})",
            provider.name(),
            config.idle_timeout
        );

        Self {
            store,
            provider,
            publisher,
            events_tx,
            config,
            dispatcher,
            reaper,
        }
    }

    /// Open a provider connection and register a listening session.
    ///
    /// A blank `requested_id` is treated as absent and an id is generated.
    /// Nothing is registered unless the connection opened.
    pub async fn start_session(&self, requested_id: Option<String>) -> VoiceResult<String> {
        let session_id = requested_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(generate_session_id);

        if self.store.contains(&session_id).await {
            return Err(VoiceError::AlreadyExists(session_id));
        }

        info!("Starting voice session: {}", session_id);

        let stream = self
            .provider
            .open(&session_id, self.events_tx.clone())
            .await
            .map_err(|e| match e {
                VoiceError::ProviderUnavailable(_) | VoiceError::StartFailed(_) => e,
                other => VoiceError::StartFailed(other.to_string()),
            })?;

        self.store.create(&session_id, stream).await?;

        info!("Voice session started: {}", session_id);
        Ok(session_id)
    }

    /// Forward an audio chunk to the session's provider connection.
    ///
    /// Empty chunks are accepted and not forwarded; the provider reads a
    /// zero-length frame as end of stream.
    pub async fn feed_audio(&self, session_id: &str, audio: Bytes) -> VoiceResult<()> {
        if audio.is_empty() {
            if !self.store.contains(session_id).await {
                return Err(VoiceError::NotFound(session_id.to_string()));
            }
            return Ok(());
        }

        let len = audio.len();
        self.store.send_audio(session_id, audio).await.inspect_err(|e| {
            warn!("Audio for session {} rejected: {}", session_id, e);
        })?;
        debug!("Queued {} bytes of audio for session {}", len, session_id);
        Ok(())
    }

    pub async fn query_transcript(&self, session_id: &str) -> VoiceResult<TranscriptSnapshot> {
        self.store
            .get(session_id)
            .await
            .ok_or_else(|| VoiceError::NotFound(session_id.to_string()))
    }

    pub async fn set_listening(&self, session_id: &str, listening: bool) -> VoiceResult<()> {
        self.store.set_listening(session_id, listening).await?;
        info!("Session {} listening: {}", session_id, listening);
        Ok(())
    }

    /// Close the session's connection and unregister it
    pub async fn stop_session(&self, session_id: &str) -> VoiceResult<()> {
        stop_session_in(&self.store, session_id).await
    }

    /// Apply a transcript event and publish it.
    ///
    /// Returns `false` when the session no longer exists and the event was
    /// dropped.
    pub async fn handle_event(&self, event: TranscriptEvent) -> bool {
        apply_event(&self.store, &self.publisher, event).await
    }

    /// Stop every session idle for longer than the configured timeout
    pub async fn reap_idle(&self) -> Vec<String> {
        match self.config.idle_timeout {
            Some(idle_timeout) => reap_once(&self.store, idle_timeout).await,
            None => Vec::new(),
        }
    }

    /// Stop every live session
    pub async fn shutdown(&self) {
        let ids = self.store.ids().await;
        info!("Stopping {} voice sessions", ids.len());
        for id in ids {
            let _ = stop_session_in(&self.store, &id).await;
        }
    }

    pub async fn active_sessions(&self) -> usize {
        self.store.len().await
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.dispatcher.abort();
        if let Some(reaper) = &self.reaper {
            reaper.abort();
        }
    }
}

/// Server-generated session id: `session_<unix-millis>_<uuid>`
pub fn generate_session_id() -> String {
    format!(
        "session_{}_{}",
        Utc::now().timestamp_millis(),
        uuid::Uuid::new_v4().simple()
    )
}

async fn stop_session_in(store: &SessionStore, session_id: &str) -> VoiceResult<()> {
    let session = store
        .remove(session_id)
        .await
        .ok_or_else(|| VoiceError::NotFound(session_id.to_string()))?;

    info!("Stopping voice session: {}", session_id);
    // Closing waits on the network; keep the session lock out of it
    let stream = session.lock().await.take_stream();
    close_stream(session_id, stream).await;
    info!("Voice session stopped: {}", session_id);
    Ok(())
}

async fn apply_event(store: &SessionStore, publisher: &EventPublisher, event: TranscriptEvent) -> bool {
    match store
        .update_transcript(&event.session_id, &event.text, event.is_final)
        .await
    {
        Ok(()) => {
            debug!(
                "Transcript for {} (final: {}): {}",
                event.session_id, event.is_final, event.text
            );
            publisher.publish(event);
            true
        }
        Err(_) => {
            debug!("Dropping transcript event for unknown session {}", event.session_id);
            false
        }
    }
}

async fn dispatch_events(
    store: Arc<SessionStore>,
    publisher: EventPublisher,
    mut events_rx: mpsc::UnboundedReceiver<TranscriptEvent>,
) {
    debug!("Transcript dispatcher started");
    while let Some(event) = events_rx.recv().await {
        apply_event(&store, &publisher, event).await;
    }
    debug!("Transcript dispatcher stopped");
}

async fn reap_once(store: &SessionStore, idle_timeout: Duration) -> Vec<String> {
    let idle = store.idle_sessions(idle_timeout).await;
    let mut reaped = Vec::with_capacity(idle.len());
    for id in idle {
        info!("Session {} idle for over {:?}, stopping", id, idle_timeout);
        match stop_session_in(store, &id).await {
            Ok(()) => reaped.push(id),
            // Stopped concurrently by a client
            Err(VoiceError::NotFound(_)) => {}
            Err(e) => error!("Failed to reap session {}: {}", id, e),
        }
    }
    reaped
}

async fn reap_idle_sessions(store: Arc<SessionStore>, idle_timeout: Duration, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        reap_once(&store, idle_timeout).await;
    }
}
