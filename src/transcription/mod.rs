//! Streaming transcription provider boundary
//!
//! A provider turns raw PCM chunks into a sequence of `TranscriptEvent`s
//! written onto a channel owned by the session manager.

pub mod deepgram;
pub mod messages;
pub mod options;
pub mod provider;

pub use deepgram::{DeepgramProvider, DeepgramStream};
pub use messages::{extract_transcript, ControlMessage, ProviderMessage, TranscriptUpdate};
pub use options::{StreamingOptions, DEFAULT_LISTEN_URL};
pub use provider::{EventSink, TranscriptEvent, TranscriptionProvider, TranscriptionStream};
