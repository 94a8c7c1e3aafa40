//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::events::SessionEvent;
use crate::permission::PermissionState;
use crate::session::{SessionId, SessionStatus, UiState};

/// Requests from UI to daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current daemon status
    GetStatus,

    /// Start a recognition session
    Start,

    /// Ping to check connectivity
    Ping,

    /// Subscribe to session events and UI state changes
    Subscribe,
}

/// Responses from daemon to UI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// Session started; results arrive as notifications
    Started { session_id: SessionId },

    /// Start refused before any engine call
    Rejected { code: String, message: String },

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

/// Push notification from daemon to UI (for subscribed clients)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Session lifecycle event occurred
    Session { event: SessionEvent },
    /// Rendered state changed
    UiChanged { state: UiState },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Busy indicator
    pub in_progress: bool,

    /// Last completed transcript
    pub transcript: String,

    /// Microphone permission as resolved at startup
    pub permission: PermissionState,

    /// Whether a recognition service was found
    pub engine_available: bool,

    /// Status of the live session, if any
    pub session: Option<SessionStatus>,

    /// Last notice raised, including ones raised before any client connected
    pub last_notice: Option<String>,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            in_progress: false,
            transcript: String::new(),
            permission: PermissionState::Unknown,
            engine_available: false,
            session: None,
            last_notice: None,
            uptime_secs: 0,
        }
    }
}

impl DaemonStatus {
    pub fn with_ui(mut self, ui: &UiState) -> Self {
        self.in_progress = ui.in_progress;
        self.transcript = ui.transcript.clone();
        self
    }
}
