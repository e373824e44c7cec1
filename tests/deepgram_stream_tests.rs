// Tests for the Deepgram WebSocket adapter
//
// A local WebSocket server plays the provider: it replays scripted result
// payloads and records every frame the adapter sends back.

mod common;

use anyhow::{anyhow, Result};
use bytes::Bytes;
use common::eventually;
use crisis_voice::config::DeepgramConfig;
use crisis_voice::transcription::{TranscriptionProvider, TranscriptionStream};
use crisis_voice::{DeepgramProvider, TranscriptEvent, VoiceError};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::Message;

/// A frame received by the local provider
#[derive(Debug, Clone, PartialEq)]
enum Seen {
    Binary(usize),
    Text(String),
    Close,
}

struct LocalProvider {
    addr: SocketAddr,
    handshake: oneshot::Receiver<(Option<String>, String)>,
    seen: mpsc::UnboundedReceiver<Seen>,
}

impl LocalProvider {
    fn config(&self) -> DeepgramConfig {
        DeepgramConfig {
            api_key: Some("test-key".to_string()),
            url: format!("ws://{}/v1/listen", self.addr),
            connect_timeout_secs: 5,
            keepalive_interval_secs: 1,
            ..DeepgramConfig::default()
        }
    }

    /// Wait for a frame matching `want`, skipping others
    async fn wait_for(&mut self, want: impl Fn(&Seen) -> bool) -> bool {
        let search = async {
            while let Some(frame) = self.seen.recv().await {
                if want(&frame) {
                    return true;
                }
            }
            false
        };
        timeout(Duration::from_secs(4), search).await.unwrap_or(false)
    }
}

fn result(text: &str, is_final: bool) -> Value {
    json!({
        "type": "Results",
        "channel_index": [0, 1],
        "is_final": is_final,
        "speech_final": is_final,
        "channel": {"alternatives": [{"transcript": text, "confidence": 0.97}]}
    })
}

/// Accept one connection, send `script`, then record what the adapter sends.
/// With `hang_up` the server closes right after the script.
async fn spawn_local_provider(script: Vec<Value>, hang_up: bool) -> Result<LocalProvider> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (handshake_tx, handshake_rx) = oneshot::channel();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let Ok((tcp, _)) = listener.accept().await else {
            return;
        };

        let callback = move |req: &Request, resp: Response| {
            let auth = req
                .headers()
                .get("authorization")
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            let query = req.uri().query().unwrap_or_default().to_string();
            let _ = handshake_tx.send((auth, query));
            Ok::<_, ErrorResponse>(resp)
        };
        let Ok(socket) = accept_hdr_async(tcp, callback).await else {
            return;
        };
        let (mut write, mut read) = socket.split();

        for payload in script {
            if write.send(Message::Text(payload.to_string().into())).await.is_err() {
                return;
            }
        }

        if hang_up {
            let _ = write.send(Message::Close(None)).await;
            return;
        }

        while let Some(Ok(message)) = read.next().await {
            let frame = match message {
                Message::Binary(data) => Seen::Binary(data.len()),
                Message::Text(text) => {
                    let text = text.as_str().to_string();
                    if text.contains("CloseStream") {
                        // A result still in flight when the client closes
                        let late = result("late words", true).to_string();
                        let _ = write.send(Message::Text(late.into())).await;
                    }
                    Seen::Text(text)
                }
                Message::Close(_) => Seen::Close,
                _ => continue,
            };
            let done = frame == Seen::Close;
            let _ = seen_tx.send(frame);
            if done {
                break;
            }
        }
    });

    Ok(LocalProvider {
        addr,
        handshake: handshake_rx,
        seen: seen_rx,
    })
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<TranscriptEvent>) -> Result<TranscriptEvent> {
    timeout(Duration::from_secs(2), rx.recv())
        .await?
        .ok_or_else(|| anyhow!("event channel closed"))
}

#[tokio::test]
async fn test_results_become_transcript_events() -> Result<()> {
    let script = vec![
        json!({"type": "Metadata", "request_id": "req-1", "channels": 1, "models": ["nova-2"]}),
        result("hel", false),
        result("", true),
        json!({"type": "SpeechStarted", "channel": [0], "timestamp": 0.2}),
        result("hello", true),
    ];
    let mut server = spawn_local_provider(script, false).await?;
    let provider = DeepgramProvider::from_config(&server.config())?;

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut stream = provider.open("call-1", events_tx).await?;
    assert!(stream.is_open());

    let (auth, query) = timeout(Duration::from_secs(2), &mut server.handshake).await??;
    assert_eq!(auth.as_deref(), Some("Token test-key"));
    assert!(query.contains("encoding=linear16"));
    assert!(query.contains("sample_rate=16000"));
    assert!(query.contains("interim_results=true"));

    let interim = next_event(&mut events_rx).await?;
    assert_eq!(interim.session_id, "call-1");
    assert_eq!(interim.text, "hel");
    assert!(!interim.is_final);

    // The empty final in between produced nothing
    let last = next_event(&mut events_rx).await?;
    assert_eq!(last.text, "hello");
    assert!(last.is_final);

    stream.close().await?;
    assert!(
        events_rx.recv().await.is_none(),
        "No events once the connection is closed"
    );

    Ok(())
}

#[tokio::test]
async fn test_audio_is_sent_as_binary_frames() -> Result<()> {
    let mut server = spawn_local_provider(Vec::new(), false).await?;
    let provider = DeepgramProvider::from_config(&server.config())?;

    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let mut stream = provider.open("call-2", events_tx).await?;

    // 10ms of 16kHz mono linear16
    stream.send_audio(Bytes::from(vec![0u8; 320]))?;
    assert!(server.wait_for(|frame| *frame == Seen::Binary(320)).await);

    stream.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_idle_connection_gets_keepalive() -> Result<()> {
    let mut server = spawn_local_provider(Vec::new(), false).await?;
    let provider = DeepgramProvider::from_config(&server.config())?;

    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let mut stream = provider.open("call-3", events_tx).await?;

    let keepalive = Seen::Text(r#"{"type":"KeepAlive"}"#.to_string());
    assert!(server.wait_for(|frame| *frame == keepalive).await);
    assert!(stream.is_open());

    stream.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_close_sends_close_stream_and_is_idempotent() -> Result<()> {
    let mut server = spawn_local_provider(Vec::new(), false).await?;
    let provider = DeepgramProvider::from_config(&server.config())?;

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut stream = provider.open("call-4", events_tx).await?;

    stream.close().await?;
    assert!(!stream.is_open());

    let close_stream = Seen::Text(r#"{"type":"CloseStream"}"#.to_string());
    assert!(server.wait_for(|frame| *frame == close_stream).await);
    assert!(server.wait_for(|frame| *frame == Seen::Close).await);

    // Second close is a no-op
    stream.close().await?;

    let result = stream.send_audio(Bytes::from_static(&[0, 1, 2, 3]));
    assert!(matches!(result, Err(VoiceError::SendFailed(_))));

    // The in-flight result the server sent after CloseStream is never emitted
    assert!(events_rx.recv().await.is_none());

    Ok(())
}

#[tokio::test]
async fn test_server_hang_up_marks_stream_closed() -> Result<()> {
    let server = spawn_local_provider(vec![result("help", true)], true).await?;
    let provider = DeepgramProvider::from_config(&server.config())?;

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut stream = provider.open("call-5", events_tx).await?;

    assert_eq!(next_event(&mut events_rx).await?.text, "help");

    let s = &stream;
    assert!(eventually(|| async move { !s.is_open() }).await);

    let result = stream.send_audio(Bytes::from_static(&[0, 1]));
    assert!(matches!(result, Err(VoiceError::SendFailed(_))));

    stream.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_unreachable_provider_fails_to_start() -> Result<()> {
    // Reserve a port, then free it so nothing is listening
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let config = DeepgramConfig {
        api_key: Some("test-key".to_string()),
        url: format!("ws://{}/v1/listen", addr),
        connect_timeout_secs: 2,
        ..DeepgramConfig::default()
    };
    let provider = DeepgramProvider::from_config(&config)?;

    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let result = provider.open("call-6", events_tx).await;
    assert!(matches!(result, Err(VoiceError::StartFailed(_))));

    Ok(())
}
