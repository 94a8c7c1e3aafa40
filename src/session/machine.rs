//! Recognition session state machine
//!
//! One session covers a single listen attempt, from `start` to the first
//! terminal callback (results or error). The recognizer handle is held only
//! while the session is live and is released on every exit path.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::{EngineCallback, EngineError, EngineHandle, ListenConfig};
use crate::errors::{classify, RecognitionError};

/// Identifier of one listen attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle states of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No engine resources held
    Idle,
    /// Listen requested, waiting for the engine to report readiness
    Starting,
    /// Engine is ready and capturing speech
    Listening,
    /// End of speech seen, waiting for results
    Processing,
    Completed,
    Failed,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::Idle
    }
}

impl SessionStatus {
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            SessionStatus::Starting | SessionStatus::Listening | SessionStatus::Processing
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "Idle"),
            SessionStatus::Starting => write!(f, "Starting"),
            SessionStatus::Listening => write!(f, "Listening"),
            SessionStatus::Processing => write!(f, "Processing"),
            SessionStatus::Completed => write!(f, "Completed"),
            SessionStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// Observable effect of applying one engine callback
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Callback had no effect on the session
    Ignored,
    Ready,
    SpeechBegan,
    SpeechEnded,
    Completed {
        candidates: Vec<String>,
        /// Candidates joined for display
        transcript: String,
        duration_ms: u64,
    },
    Failed {
        code: i32,
        error: RecognitionError,
        duration_ms: u64,
    },
}

impl Transition {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Transition::Completed { .. } | Transition::Failed { .. })
    }
}

/// A single recognition attempt and the engine handle backing it
#[derive(Debug)]
pub struct RecognitionSession {
    id: SessionId,
    status: SessionStatus,
    language_tag: String,
    /// Candidates in engine rank order
    result_text: Vec<String>,
    handle: Option<EngineHandle>,
    started_at: Option<Instant>,
}

impl RecognitionSession {
    pub fn new(id: SessionId, language_tag: impl Into<String>) -> Self {
        Self {
            id,
            status: SessionStatus::Idle,
            language_tag: language_tag.into(),
            result_text: Vec::new(),
            handle: None,
            started_at: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn language_tag(&self) -> &str {
        &self.language_tag
    }

    /// True between the ready signal and the terminal callback
    #[cfg(test)]
    pub fn in_progress(&self) -> bool {
        matches!(self.status, SessionStatus::Listening | SessionStatus::Processing)
    }

    #[cfg(test)]
    pub fn holds_handle(&self) -> bool {
        self.handle.is_some()
    }

    /// Take ownership of `handle` and ask the engine to listen
    ///
    /// On failure the handle is released and the session ends as `Failed`.
    pub fn start(&mut self, mut handle: EngineHandle, config: &ListenConfig) -> Result<(), EngineError> {
        debug_assert_eq!(self.status, SessionStatus::Idle);

        if let Err(e) = handle.start_listening(config) {
            handle.release();
            self.status = SessionStatus::Failed;
            return Err(e);
        }

        self.handle = Some(handle);
        self.started_at = Some(Instant::now());
        self.transition_to(SessionStatus::Starting);
        Ok(())
    }

    /// Apply an engine callback
    pub fn apply(&mut self, callback: EngineCallback) -> Transition {
        if !self.status.is_live() {
            debug!(session_id = %self.id, status = %self.status, ?callback, "callback after session ended");
            return Transition::Ignored;
        }

        match callback {
            EngineCallback::Ready => {
                if self.status != SessionStatus::Starting {
                    return Transition::Ignored;
                }
                self.transition_to(SessionStatus::Listening);
                Transition::Ready
            }
            EngineCallback::BeginningOfSpeech => {
                if self.status == SessionStatus::Listening {
                    Transition::SpeechBegan
                } else {
                    Transition::Ignored
                }
            }
            // Not terminal: the session stays busy in Processing until results
            // or an error arrive, so a second start is still refused here.
            EngineCallback::EndOfSpeech => {
                if self.status != SessionStatus::Listening {
                    return Transition::Ignored;
                }
                self.transition_to(SessionStatus::Processing);
                Transition::SpeechEnded
            }
            EngineCallback::Results { candidates } => {
                let duration_ms = self.finish(SessionStatus::Completed);
                self.result_text = candidates;
                Transition::Completed {
                    candidates: self.result_text.clone(),
                    transcript: self.transcript(),
                    duration_ms,
                }
            }
            EngineCallback::Error { code } => {
                let duration_ms = self.finish(SessionStatus::Failed);
                Transition::Failed {
                    code,
                    error: classify(code),
                    duration_ms,
                }
            }
            EngineCallback::Event { event_type } => {
                debug!(session_id = %self.id, event_type, "engine event");
                Transition::Ignored
            }
            other => {
                debug!(session_id = %self.id, callback = ?other, "engine callback ignored");
                Transition::Ignored
            }
        }
    }

    /// Release the engine handle without a terminal callback
    pub fn teardown(&mut self) {
        if self.status.is_live() {
            info!(session_id = %self.id, status = %self.status, "session torn down");
            self.status = SessionStatus::Failed;
        }
        self.release();
    }

    /// Candidates joined for display, one per line in rank order
    pub fn transcript(&self) -> String {
        join_candidates(&self.result_text)
    }

    fn finish(&mut self, status: SessionStatus) -> u64 {
        let duration_ms = self
            .started_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);
        self.transition_to(status);
        self.release();
        duration_ms
    }

    fn release(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.release();
        }
    }

    fn transition_to(&mut self, new_status: SessionStatus) {
        info!(
            session_id = %self.id,
            from = %self.status,
            to = %new_status,
            "session transition"
        );
        self.status = new_status;
    }
}

/// Join ranked candidates with newlines, keeping engine order
fn join_candidates(candidates: &[String]) -> String {
    candidates.join("\n")
}
