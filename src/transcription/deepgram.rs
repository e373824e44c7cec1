//! Deepgram live transcription over WebSocket.
//!
//! Each session gets its own connection task:
//!
//! ```text
//! send_audio() ──▶ audio_tx (mpsc) ──▶ ┌────────────────┐ ──▶ provider
//!                                      │ connection task│
//! EventSink   ◀── TranscriptEvent ◀─── └────────────────┘ ◀── provider
//! ```
//!
//! The task owns the socket. Closing the stream signals the task, which sends
//! `CloseStream` and exits; `close()` waits for it so no event is emitted
//! after it returns.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::messages::{ControlMessage, ProviderMessage};
use super::options::StreamingOptions;
use super::provider::{EventSink, TranscriptEvent, TranscriptionProvider, TranscriptionStream};
use crate::config::DeepgramConfig;
use crate::error::{VoiceError, VoiceResult};

/// Queued audio chunks per connection before `send_audio` reports backpressure
const AUDIO_QUEUE_CAPACITY: usize = 64;

/// Upper bound on waiting for the connection task during `close`
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

type ProviderSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens Deepgram connections with a fixed capability record
pub struct DeepgramProvider {
    api_key: String,
    url: String,
    options: StreamingOptions,
    connect_timeout: Duration,
    keepalive_interval: Duration,
}

impl DeepgramProvider {
    /// Build a provider from config.
    ///
    /// Fails with `ProviderUnavailable` when no credential is configured.
    pub fn from_config(config: &DeepgramConfig) -> VoiceResult<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                VoiceError::ProviderUnavailable("DEEPGRAM_API_KEY is not set".to_string())
            })?;

        let options = StreamingOptions {
            model: config.model.clone(),
            language: config.language.clone(),
            smart_format: config.smart_format,
            ..StreamingOptions::default()
        };

        // Reject a malformed endpoint now rather than on the first session
        options.listen_url(&config.url)?;

        Ok(Self {
            api_key: api_key.to_string(),
            url: config.url.clone(),
            options,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            keepalive_interval: Duration::from_secs(config.keepalive_interval_secs.max(1)),
        })
    }

    pub fn options(&self) -> &StreamingOptions {
        &self.options
    }

    async fn connect(&self) -> VoiceResult<ProviderSocket> {
        let url = self.options.listen_url(&self.url)?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| VoiceError::StartFailed(format!("Invalid WebSocket request: {}", e)))?;
        let token = HeaderValue::from_str(&format!("Token {}", self.api_key))
            .map_err(|e| VoiceError::ProviderUnavailable(format!("Invalid API key: {}", e)))?;
        request.headers_mut().insert(AUTHORIZATION, token);

        let (socket, _response) = timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| {
                VoiceError::StartFailed(format!(
                    "Timed out after {:?} connecting to Deepgram",
                    self.connect_timeout
                ))
            })?
            .map_err(|e| VoiceError::StartFailed(format!("Failed to connect to Deepgram: {}", e)))?;

        Ok(socket)
    }
}

#[async_trait::async_trait]
impl TranscriptionProvider for DeepgramProvider {
    async fn open(
        &self,
        session_id: &str,
        events: EventSink,
    ) -> VoiceResult<Box<dyn TranscriptionStream>> {
        info!("Creating Deepgram connection for session: {}", session_id);

        let socket = self.connect().await.inspect_err(|e| {
            error!("Deepgram connection failed for session {}: {}", session_id, e);
        })?;

        info!("Deepgram connection opened for session: {}", session_id);

        let (audio_tx, audio_rx) = mpsc::channel::<Bytes>(AUDIO_QUEUE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let connected = Arc::new(AtomicBool::new(true));
        let closing = Arc::new(AtomicBool::new(false));

        let task = ConnectionTask {
            session_id: session_id.to_string(),
            events,
            connected: Arc::clone(&connected),
            closing: Arc::clone(&closing),
            keepalive_interval: self.keepalive_interval,
        };
        let handle = tokio::spawn(task.run(socket, audio_rx, shutdown_rx));

        Ok(Box::new(DeepgramStream {
            session_id: session_id.to_string(),
            audio_tx: Some(audio_tx),
            shutdown_tx: Some(shutdown_tx),
            task: Some(handle),
            connected,
            closing,
        }))
    }

    fn name(&self) -> &str {
        "deepgram"
    }
}

/// Handle to one live Deepgram connection
pub struct DeepgramStream {
    session_id: String,
    audio_tx: Option<mpsc::Sender<Bytes>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    connected: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
}

#[async_trait::async_trait]
impl TranscriptionStream for DeepgramStream {
    fn send_audio(&self, audio: Bytes) -> VoiceResult<()> {
        let sender = match &self.audio_tx {
            Some(sender) if self.connected.load(Ordering::Acquire) => sender,
            _ => {
                return Err(VoiceError::SendFailed(format!(
                    "Deepgram connection for session {} is closed",
                    self.session_id
                )))
            }
        };

        sender.try_send(audio).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                VoiceError::SendFailed("Audio queue is full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                VoiceError::SendFailed("Deepgram connection task has exited".to_string())
            }
        })
    }

    async fn close(&mut self) -> VoiceResult<()> {
        // Stop emitting before anything else so in-flight results are dropped
        self.closing.store(true, Ordering::Release);
        self.audio_tx = None;

        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }

        if let Some(mut handle) = self.task.take() {
            match timeout(CLOSE_TIMEOUT, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Deepgram connection task panicked: {}", e),
                Err(_) => {
                    warn!(
                        "Deepgram connection for session {} did not close in {:?}, aborting",
                        self.session_id, CLOSE_TIMEOUT
                    );
                    handle.abort();
                    let _ = handle.await;
                }
            }
            info!("Deepgram connection finished for session: {}", self.session_id);
        }

        self.connected.store(false, Ordering::Release);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

impl Drop for DeepgramStream {
    fn drop(&mut self) {
        self.closing.store(true, Ordering::Release);
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}

struct ConnectionTask {
    session_id: String,
    events: EventSink,
    connected: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
    keepalive_interval: Duration,
}

impl ConnectionTask {
    async fn run(
        self,
        socket: ProviderSocket,
        mut audio_rx: mpsc::Receiver<Bytes>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        let (mut sink, mut stream) = socket.split();
        let mut keepalive = interval_at(
            Instant::now() + self.keepalive_interval,
            self.keepalive_interval,
        );

        loop {
            tokio::select! {
                // Fires on explicit close and when the handle is dropped
                _ = &mut shutdown_rx => {
                    debug!("Shutdown requested for session {}", self.session_id);
                    if let Ok(json) = serde_json::to_string(&ControlMessage::CloseStream) {
                        let _ = sink.send(Message::Text(json.into())).await;
                    }
                    let _ = sink.close().await;
                    break;
                }

                Some(audio) = audio_rx.recv() => {
                    let len = audio.len();
                    if let Err(e) = sink.send(Message::Binary(audio)).await {
                        warn!("Failed to send audio for session {}: {}", self.session_id, e);
                        break;
                    }
                    keepalive.reset();
                    debug!("Sent {} bytes of audio for session {}", len, self.session_id);
                }

                _ = keepalive.tick() => {
                    if let Ok(json) = serde_json::to_string(&ControlMessage::KeepAlive) {
                        if let Err(e) = sink.send(Message::Text(json.into())).await {
                            warn!("Failed to send keep-alive for session {}: {}", self.session_id, e);
                            break;
                        }
                    }
                }

                message = stream.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()),
                        Some(Ok(Message::Close(frame))) => {
                            info!("Deepgram connection closed for session {}: {:?}", self.session_id, frame);
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!("Deepgram stream error for session {}: {}", self.session_id, e);
                            break;
                        }
                        None => {
                            info!("Deepgram stream ended for session {}", self.session_id);
                            break;
                        }
                    }
                }
            }
        }

        self.connected.store(false, Ordering::Release);
    }

    fn handle_text(&self, text: &str) {
        match ProviderMessage::parse(text) {
            Ok(ProviderMessage::Transcript(Some(update))) => {
                if self.closing.load(Ordering::Acquire) {
                    debug!("Dropping transcript for closing session {}", self.session_id);
                    return;
                }
                let event = TranscriptEvent::new(&self.session_id, update.text, update.is_final);
                if self.events.send(event).is_err() {
                    warn!("Transcript channel closed, dropping event for {}", self.session_id);
                }
            }
            Ok(ProviderMessage::Transcript(None)) => {}
            Ok(ProviderMessage::Metadata(metadata)) => {
                debug!("Deepgram metadata for session {}: {}", self.session_id, metadata);
            }
            Ok(ProviderMessage::UtteranceEnd) => {
                debug!("Utterance end for session {}", self.session_id);
            }
            Ok(ProviderMessage::SpeechStarted) => {
                debug!("Speech started for session {}", self.session_id);
            }
            Ok(ProviderMessage::Error(err)) => {
                warn!("Deepgram error for session {}: {}", self.session_id, err);
            }
            Ok(ProviderMessage::Unknown(raw)) => {
                debug!("Unknown Deepgram message for session {}: {}", self.session_id, raw);
            }
            Err(e) => {
                warn!("Malformed Deepgram payload for session {}: {}", self.session_id, e);
            }
        }
    }
}
