use std::time::Duration;

/// Session lifecycle settings shared by every session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Appended after each final fragment
    pub transcript_separator: String,

    /// Sessions without audio or transcript activity for this long are
    /// stopped by the reaper. `None` keeps sessions until explicitly stopped.
    pub idle_timeout: Option<Duration>,

    /// How often the reaper scans for idle sessions
    pub reap_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            transcript_separator: " ".to_string(),
            idle_timeout: Some(Duration::from_secs(300)), // 5 minutes
            reap_interval: Duration::from_secs(30),
        }
    }
}
