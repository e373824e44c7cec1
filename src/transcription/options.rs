use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{VoiceError, VoiceResult};

/// Default streaming endpoint
pub const DEFAULT_LISTEN_URL: &str = "wss://api.deepgram.com/v1/listen";

/// Capability record sent once when a provider connection is opened.
///
/// Encoding parameters are fixed for every session: the provider is fed
/// linear PCM, 16kHz, mono. Browser-native compressed containers are not
/// negotiated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingOptions {
    pub model: String,
    pub language: String,
    pub smart_format: bool,
    pub encoding: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub interim_results: bool,
    /// Silence (ms) before the provider finalizes an utterance
    pub endpoint_silence_ms: u32,
    pub vad_events: bool,
    pub utterance_end_ms: u32,
}

impl Default for StreamingOptions {
    fn default() -> Self {
        Self {
            model: "nova-2".to_string(),
            language: "en-US".to_string(),
            smart_format: true,
            encoding: "linear16".to_string(),
            sample_rate: 16000,
            channels: 1,
            interim_results: true,
            endpoint_silence_ms: 300,
            vad_events: true,
            utterance_end_ms: 1000,
        }
    }
}

impl StreamingOptions {
    /// Build the provider listen URL with these options as query parameters
    pub fn listen_url(&self, base: &str) -> VoiceResult<Url> {
        let mut url = Url::parse(base).map_err(|e| {
            VoiceError::ProviderUnavailable(format!("Invalid provider URL {}: {}", base, e))
        })?;

        url.query_pairs_mut()
            .append_pair("model", &self.model)
            .append_pair("language", &self.language)
            .append_pair("smart_format", bool_param(self.smart_format))
            .append_pair("encoding", &self.encoding)
            .append_pair("sample_rate", &self.sample_rate.to_string())
            .append_pair("channels", &self.channels.to_string())
            .append_pair("interim_results", bool_param(self.interim_results))
            .append_pair("endpointing", &self.endpoint_silence_ms.to_string())
            .append_pair("vad_events", bool_param(self.vad_events))
            .append_pair("utterance_end_ms", &self.utterance_end_ms.to_string());

        Ok(url)
    }
}

fn bool_param(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}
