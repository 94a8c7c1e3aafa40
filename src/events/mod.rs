//! Events module for session lifecycle notifications
//!
//! Published by the controller on a broadcast channel; subscribed
//! presentation clients receive them as they happen.

use serde::{Deserialize, Serialize};

use crate::errors::ErrorKind;
use crate::session::SessionId;

/// Events emitted while sessions are started, run and ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Recognizer allocated and asked to listen
    SessionStarted { session_id: SessionId },

    /// Engine reported readiness; busy indicator on
    Listening { session_id: SessionId },

    SpeechBegan { session_id: SessionId },

    SpeechEnded { session_id: SessionId },

    /// Session completed with ranked candidates
    ResultsReady {
        session_id: SessionId,
        candidates: Vec<String>,
        /// Milliseconds from start to results
        duration_ms: u64,
    },

    /// Session ended with an engine error
    SessionFailed {
        session_id: SessionId,
        kind: ErrorKind,
        duration_ms: u64,
    },

    /// Transient user-visible message
    Notice { message: String },

    /// A start request was refused before any engine call
    StartRejected { reason: String },
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::SessionStarted { session_id } => {
                write!(f, "SESSION_STARTED ({})", session_id)
            }
            SessionEvent::Listening { session_id } => write!(f, "LISTENING ({})", session_id),
            SessionEvent::SpeechBegan { session_id } => write!(f, "SPEECH_BEGAN ({})", session_id),
            SessionEvent::SpeechEnded { session_id } => write!(f, "SPEECH_ENDED ({})", session_id),
            SessionEvent::ResultsReady {
                session_id,
                candidates,
                duration_ms,
            } => write!(
                f,
                "RESULTS_READY ({}, {} candidates, {}ms)",
                session_id,
                candidates.len(),
                duration_ms
            ),
            SessionEvent::SessionFailed {
                session_id,
                kind,
                duration_ms,
            } => write!(f, "SESSION_FAILED ({}, {:?}, {}ms)", session_id, kind, duration_ms),
            SessionEvent::Notice { message } => write!(f, "NOTICE ({})", message),
            SessionEvent::StartRejected { reason } => write!(f, "START_REJECTED ({})", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = SessionEvent::ResultsReady {
            session_id: SessionId(4),
            candidates: vec!["hello world".to_string()],
            duration_ms: 1500,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("results_ready"));
        assert!(json.contains("1500"));
        assert!(json.contains("hello world"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"notice","message":"Network error"}"#;
        let event: SessionEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            SessionEvent::Notice {
                message: "Network error".to_string()
            }
        );
    }

    #[test]
    fn test_display() {
        let event = SessionEvent::SessionFailed {
            session_id: SessionId(2),
            kind: ErrorKind::Network,
            duration_ms: 30,
        };
        assert_eq!(event.to_string(), "SESSION_FAILED (2, Network, 30ms)");
    }
}
