pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod session;
pub mod transcription;

pub use config::Config;
pub use error::{VoiceError, VoiceResult};
pub use events::{EventPublisher, StreamFrame, Subscription};
pub use http::{create_router, AppState};
pub use session::{SessionConfig, SessionManager, SessionStore, TranscriptSnapshot};
pub use transcription::{
    DeepgramProvider, StreamingOptions, TranscriptEvent, TranscriptionProvider,
    TranscriptionStream,
};
