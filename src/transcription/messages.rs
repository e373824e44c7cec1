//! Provider wire messages.
//!
//! Incoming payloads are dispatched on their `type` field. Transcript results
//! arrive in two shapes depending on the provider API revision:
//!
//! - structured: `{"channel": {"alternatives": [{"transcript": ..}]}, "is_final": ..}`
//! - flat key/value: `{"transcript": .., "is_final": ..}`
//!
//! Both are accepted. A result with an empty or missing transcript yields no
//! update.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Text and stability extracted from a transcript result
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptUpdate {
    pub text: String,
    pub is_final: bool,
}

/// A parsed message received from the provider
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderMessage {
    /// Transcript result; `None` when it carried no text
    Transcript(Option<TranscriptUpdate>),
    Metadata(Value),
    UtteranceEnd,
    SpeechStarted,
    Error(ProviderErrorMessage),
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProviderErrorMessage {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub variant: Option<String>,
}

impl std::fmt::Display for ProviderErrorMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = self
            .description
            .as_deref()
            .or(self.message.as_deref())
            .unwrap_or("unspecified provider error");
        match &self.variant {
            Some(variant) => write!(f, "{} ({})", text, variant),
            None => write!(f, "{}", text),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StructuredResult {
    channel: ResultChannel,
    #[serde(default)]
    is_final: bool,
}

#[derive(Debug, Deserialize)]
struct ResultChannel {
    #[serde(default)]
    alternatives: Vec<ResultAlternative>,
}

#[derive(Debug, Deserialize)]
struct ResultAlternative {
    #[serde(default)]
    transcript: String,
}

impl ProviderMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;

        let message = match value.get("type").and_then(Value::as_str) {
            Some("Results") => ProviderMessage::Transcript(extract_transcript(&value)),
            Some("Metadata") => ProviderMessage::Metadata(value),
            Some("UtteranceEnd") => ProviderMessage::UtteranceEnd,
            Some("SpeechStarted") => ProviderMessage::SpeechStarted,
            Some("Error") => ProviderMessage::Error(serde_json::from_value(value)?),
            // Untyped payloads still count as results when they carry a transcript
            None if value.get("channel").is_some() || value.get("transcript").is_some() => {
                ProviderMessage::Transcript(extract_transcript(&value))
            }
            _ => ProviderMessage::Unknown(text.to_string()),
        };

        Ok(message)
    }
}

/// Pull `{text, is_final}` out of a transcript result in either shape
pub fn extract_transcript(value: &Value) -> Option<TranscriptUpdate> {
    let (text, is_final) = match StructuredResult::deserialize(value) {
        Ok(result) => {
            let text = result
                .channel
                .alternatives
                .into_iter()
                .next()
                .map(|alt| alt.transcript)
                .unwrap_or_default();
            (text, result.is_final)
        }
        Err(_) => {
            let text = value
                .get("transcript")
                .or_else(|| value.pointer("/channel/alternatives/0/transcript"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let is_final = value
                .get("is_final")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            (text, is_final)
        }
    };

    if text.trim().is_empty() {
        return None;
    }

    Some(TranscriptUpdate { text, is_final })
}

/// Control messages sent to the provider as text frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    KeepAlive,
    CloseStream,
}
