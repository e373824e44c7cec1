// Shared fixtures for voice session tests
//
// `ScriptedProvider` stands in for the streaming provider: it records audio,
// counts opens/closes, and lets a test push transcript events for a session.

#![allow(dead_code)]

use bytes::Bytes;
use crisis_voice::transcription::{
    EventSink, TranscriptEvent, TranscriptionProvider, TranscriptionStream,
};
use crisis_voice::{VoiceError, VoiceResult};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct ScriptedProvider {
    open_error: Mutex<Option<VoiceError>>,
    fail_send: Arc<AtomicBool>,
    sinks: Mutex<HashMap<String, EventSink>>,
    audio: Arc<Mutex<HashMap<String, Vec<Bytes>>>>,
    opens: AtomicUsize,
    closes: Arc<AtomicUsize>,
    close_delay_ms: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A provider whose connections never open
    pub fn failing() -> Arc<Self> {
        Self::failing_with(VoiceError::StartFailed(
            "provider rejected connection".to_string(),
        ))
    }

    /// A provider whose `open` always returns `error`
    pub fn failing_with(error: VoiceError) -> Arc<Self> {
        let provider = Self::default();
        *provider.open_error.lock().unwrap() = Some(error);
        Arc::new(provider)
    }

    pub fn set_fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    /// Make every `close` take this long, like a slow network shutdown
    pub fn set_close_delay(&self, delay: Duration) {
        self.close_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    /// Push a transcript event as the provider would
    pub fn emit(&self, session_id: &str, text: &str, is_final: bool) -> bool {
        let sinks = self.sinks.lock().unwrap();
        match sinks.get(session_id) {
            Some(sink) => sink
                .send(TranscriptEvent::new(session_id, text, is_final))
                .is_ok(),
            None => false,
        }
    }

    pub fn audio_for(&self, session_id: &str) -> Vec<Bytes> {
        self.audio
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TranscriptionProvider for ScriptedProvider {
    async fn open(
        &self,
        session_id: &str,
        events: EventSink,
    ) -> VoiceResult<Box<dyn TranscriptionStream>> {
        if let Some(error) = self.open_error.lock().unwrap().clone() {
            return Err(error);
        }

        self.opens.fetch_add(1, Ordering::SeqCst);
        self.sinks
            .lock()
            .unwrap()
            .insert(session_id.to_string(), events);

        Ok(Box::new(ScriptedStream {
            session_id: session_id.to_string(),
            open: AtomicBool::new(true),
            fail_send: Arc::clone(&self.fail_send),
            audio: Arc::clone(&self.audio),
            closes: Arc::clone(&self.closes),
            close_delay_ms: Arc::clone(&self.close_delay_ms),
        }))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub struct ScriptedStream {
    session_id: String,
    open: AtomicBool,
    fail_send: Arc<AtomicBool>,
    audio: Arc<Mutex<HashMap<String, Vec<Bytes>>>>,
    closes: Arc<AtomicUsize>,
    close_delay_ms: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl TranscriptionStream for ScriptedStream {
    fn send_audio(&self, audio: Bytes) -> VoiceResult<()> {
        if self.fail_send.load(Ordering::SeqCst) || !self.open.load(Ordering::SeqCst) {
            return Err(VoiceError::SendFailed("scripted send failure".to_string()));
        }
        self.audio
            .lock()
            .unwrap()
            .entry(self.session_id.clone())
            .or_default()
            .push(audio);
        Ok(())
    }

    async fn close(&mut self) -> VoiceResult<()> {
        let delay = self.close_delay_ms.load(Ordering::SeqCst) as u64;
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.open.swap(false, Ordering::SeqCst) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
