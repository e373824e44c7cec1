use thiserror::Error;

/// Errors surfaced by the voice subsystem.
///
/// Every variant is recoverable at the request boundary; the HTTP layer maps
/// each one onto a status code and a `{success: false}` body.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VoiceError {
    /// Missing credential or an unusable provider configuration
    #[error("Transcription provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The provider rejected or failed the connection open
    #[error("Failed to start voice session: {0}")]
    StartFailed(String),

    /// Unknown session id
    #[error("Session {0} not found")]
    NotFound(String),

    /// Audio could not be handed to the provider connection
    #[error("Failed to send audio: {0}")]
    SendFailed(String),

    /// A caller-supplied id is already bound to a live session
    #[error("Session {0} already exists")]
    AlreadyExists(String),
}

pub type VoiceResult<T> = Result<T, VoiceError>;
