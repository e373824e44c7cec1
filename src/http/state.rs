use crate::session::SessionManager;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// `None` when no provider credential is configured; voice routes then
    /// report unavailable while the rest of the API keeps serving
    pub voice: Option<Arc<SessionManager>>,

    /// Service name reported by the health check
    pub service_name: String,
}

impl AppState {
    pub fn new(voice: Option<Arc<SessionManager>>) -> Self {
        Self {
            voice,
            service_name: "crisis-voice".to_string(),
        }
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    pub fn voice_enabled(&self) -> bool {
        self.voice.is_some()
    }
}
