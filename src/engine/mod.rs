//! Speech engine abstraction
//!
//! The recognizer itself is owned by the platform. This module describes the
//! seam: how a recognizer handle is created, started and destroyed, and how
//! its callbacks are delivered back to the controller.

pub mod codes;
mod command;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::session::SessionId;

pub use command::CommandEngine;

/// Language tag passed to every listen request
pub const LANGUAGE_TAG: &str = "ru-RU";

/// Recognition mode requested from the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageModel {
    /// Free dictation tuned for short search-style phrases
    WebSearch,
}

impl LanguageModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageModel::WebSearch => "web_search",
        }
    }
}

/// Parameters of one listen request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenConfig {
    pub language_tag: String,
    pub language_model: LanguageModel,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            language_tag: LANGUAGE_TAG.to_string(),
            language_model: LanguageModel::WebSearch,
        }
    }
}

/// Callbacks a recognizer delivers while listening
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineCallback {
    Ready,
    BeginningOfSpeech,
    RmsChanged { rms_db: f32 },
    BufferReceived { len: usize },
    EndOfSpeech,
    PartialResults { candidates: Vec<String> },
    /// Final ranked candidates, best first
    Results { candidates: Vec<String> },
    SegmentResults { candidates: Vec<String> },
    EndOfSegmentedSession,
    LanguageDetection { language: String },
    Error { code: i32 },
    Event { event_type: i32 },
}

/// A callback tagged with the session it belongs to
#[derive(Debug, Clone)]
pub struct EngineMessage {
    pub session: SessionId,
    pub callback: EngineCallback,
}

/// Sender handed to a recognizer; tags callbacks with the owning session
#[derive(Debug, Clone)]
pub struct CallbackSink {
    session: SessionId,
    tx: mpsc::UnboundedSender<EngineMessage>,
}

impl CallbackSink {
    pub fn new(session: SessionId, tx: mpsc::UnboundedSender<EngineMessage>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Deliver a callback to the controller, dropping it if the controller is gone
    pub fn deliver(&self, callback: EngineCallback) {
        let message = EngineMessage {
            session: self.session,
            callback,
        };
        if self.tx.send(message).is_err() {
            debug!(session_id = %self.session, "controller gone, callback dropped");
        }
    }
}

/// Errors raised while talking to the engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("speech recognition service is not available")]
    Unavailable,

    #[error("failed to start listening: {0}")]
    Listen(String),

    #[error("recognition support check failed with code {0}")]
    Support(i32),
}

/// Result of the optional recognition support pre-flight
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionSupport {
    #[serde(default)]
    pub installed_languages: Vec<String>,
    #[serde(default)]
    pub online_languages: Vec<String>,
}

impl RecognitionSupport {
    pub fn supports(&self, language_tag: &str) -> bool {
        self.installed_languages
            .iter()
            .chain(self.online_languages.iter())
            .any(|lang| lang.eq_ignore_ascii_case(language_tag))
    }
}

/// Platform speech recognition service
pub trait SpeechEngine: Send + Sync {
    /// Whether a recognition service is present at all
    fn is_available(&self) -> bool;

    /// Allocate a recognizer that reports through `sink`
    fn create_recognizer(&self, sink: CallbackSink) -> Result<Box<dyn RecognizerHandle>, EngineError>;

    /// Ask which languages can be recognized with `config`
    ///
    /// Engines that cannot answer return `ERROR_CANNOT_CHECK_SUPPORT`.
    fn check_support(&self, _config: &ListenConfig) -> Result<RecognitionSupport, EngineError> {
        Err(EngineError::Support(codes::ERROR_CANNOT_CHECK_SUPPORT))
    }
}

/// One allocated recognizer instance
pub trait RecognizerHandle: Send {
    fn start_listening(&mut self, config: &ListenConfig) -> Result<(), EngineError>;

    /// Release engine resources; called once by [`EngineHandle`]
    fn destroy(&mut self);
}

/// Owns a recognizer handle and destroys it when dropped
pub struct EngineHandle {
    inner: Option<Box<dyn RecognizerHandle>>,
    session: SessionId,
}

impl EngineHandle {
    pub fn new(session: SessionId, inner: Box<dyn RecognizerHandle>) -> Self {
        Self {
            inner: Some(inner),
            session,
        }
    }

    pub fn start_listening(&mut self, config: &ListenConfig) -> Result<(), EngineError> {
        match self.inner.as_mut() {
            Some(handle) => handle.start_listening(config),
            None => {
                warn!(session_id = %self.session, "start_listening on released handle");
                Err(EngineError::Listen("handle already released".to_string()))
            }
        }
    }

    /// Destroy the underlying recognizer; further calls are no-ops
    pub fn release(&mut self) {
        if let Some(mut handle) = self.inner.take() {
            debug!(session_id = %self.session, "releasing recognizer handle");
            handle.destroy();
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("session", &self.session)
            .field("live", &self.inner.is_some())
            .finish()
    }
}
