//! Voice session management
//!
//! This module provides:
//! - `Session`: one caller's transcript state and its provider connection
//! - `SessionStore`: concurrency-safe id → session map with per-session locks
//! - `SessionManager`: start / feed / query / stop orchestration, the event
//!   dispatcher task and the idle-session reaper

mod config;
mod manager;
mod session;
mod snapshot;
mod store;

pub use config::SessionConfig;
pub use manager::{generate_session_id, SessionManager};
pub use session::Session;
pub use snapshot::TranscriptSnapshot;
pub use store::{SessionStore, SharedSession};
