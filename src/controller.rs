//! Top-level session controller
//!
//! Owns the permission gate, the engine and at most one live
//! [`RecognitionSession`]. All engine callbacks and presentation commands
//! are processed here one at a time; this is the only place [`UiState`] is
//! mutated.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::engine::{CallbackSink, EngineError, EngineHandle, EngineMessage, ListenConfig, SpeechEngine};
use crate::events::SessionEvent;
use crate::permission::{PermissionGate, PermissionState};
use crate::probe::{preflight, spawn_probe, LanguageDetailsSource};
use crate::session::{RecognitionSession, SessionId, SessionStatus, Transition, UiState};

pub const PERMISSION_NOTICE: &str = "Insufficient permissions error";
pub const UNAVAILABLE_NOTICE: &str = "Speech recognition service IS NOT available!";

/// Requests accepted by the controller task
#[derive(Debug)]
pub enum Command {
    Start {
        reply: oneshot::Sender<Result<SessionId, StartError>>,
    },
    Status {
        reply: oneshot::Sender<ControllerStatus>,
    },
}

/// Why a start request was refused
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("microphone permission not granted")]
    PermissionDenied,

    #[error("speech recognition service is not available")]
    EngineUnavailable,

    #[error("session {0} is still in progress")]
    Busy(SessionId),

    #[error("recognition support check failed: {0}")]
    SupportCheck(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("controller has shut down")]
    ShutDown,
}

impl StartError {
    /// Stable identifier for IPC clients
    pub fn code(&self) -> &'static str {
        match self {
            StartError::PermissionDenied => "permission_denied",
            StartError::EngineUnavailable => "engine_unavailable",
            StartError::Busy(_) => "busy",
            StartError::SupportCheck(_) => "support_check_failed",
            StartError::Engine(_) => "engine_error",
            StartError::ShutDown => "shut_down",
        }
    }
}

/// Snapshot answered to status requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerStatus {
    pub permission: PermissionState,
    pub engine_available: bool,
    pub session: Option<(SessionId, SessionStatus)>,
    pub ui: UiState,
    /// Most recent notice, kept for clients that connect after it was raised
    pub last_notice: Option<String>,
}

/// Owner of the recognition session lifecycle
pub struct Controller {
    engine: Arc<dyn SpeechEngine>,
    gate: PermissionGate,
    listen: ListenConfig,
    preflight_support_check: bool,
    probe: Option<(Arc<dyn LanguageDetailsSource>, Duration)>,
    engine_available: bool,
    session: Option<RecognitionSession>,
    next_session: u64,
    callback_tx: mpsc::UnboundedSender<EngineMessage>,
    ui: UiState,
    ui_tx: watch::Sender<UiState>,
    event_tx: broadcast::Sender<SessionEvent>,
    last_notice: Option<String>,
    torn_down: bool,
}

impl Controller {
    /// Create a controller and the receiver its engine callbacks arrive on
    pub fn new(
        engine: Arc<dyn SpeechEngine>,
        gate: PermissionGate,
        listen: ListenConfig,
        event_tx: broadcast::Sender<SessionEvent>,
    ) -> (Self, mpsc::UnboundedReceiver<EngineMessage>) {
        let (callback_tx, callback_rx) = mpsc::unbounded_channel();
        let (ui_tx, _) = watch::channel(UiState::default());

        let controller = Self {
            engine,
            gate,
            listen,
            preflight_support_check: false,
            probe: None,
            engine_available: false,
            session: None,
            next_session: 1,
            callback_tx,
            ui: UiState::default(),
            ui_tx,
            event_tx,
            last_notice: None,
            torn_down: false,
        };

        (controller, callback_rx)
    }

    /// Fire a language-details probe on every start
    pub fn with_probe(mut self, source: Arc<dyn LanguageDetailsSource>, timeout: Duration) -> Self {
        self.probe = Some((source, timeout));
        self
    }

    /// Check recognition support before listening
    pub fn with_preflight(mut self, enabled: bool) -> Self {
        self.preflight_support_check = enabled;
        self
    }

    pub fn subscribe_ui(&self) -> watch::Receiver<UiState> {
        self.ui_tx.subscribe()
    }

    pub fn ui(&self) -> &UiState {
        &self.ui
    }

    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            permission: self.gate.state(),
            engine_available: self.engine_available,
            session: self.session.as_ref().map(|s| (s.id(), s.status())),
            ui: self.ui().clone(),
            last_notice: self.last_notice.clone(),
        }
    }

    /// Resolve microphone access and engine availability
    ///
    /// Availability is checked once; an absent engine short-circuits every
    /// later start.
    pub async fn initialize(&mut self) -> PermissionState {
        let permission = self.gate.ensure_microphone_access().await;

        if permission != PermissionState::Granted {
            self.notice(PERMISSION_NOTICE);
            return permission;
        }

        self.engine_available = self.engine.is_available();
        if self.engine_available {
            info!("speech recognition service available");
        } else {
            warn!("speech recognition service not available");
            self.notice(UNAVAILABLE_NOTICE);
        }

        permission
    }

    /// Start a fresh session
    ///
    /// Refused while another session is live; a refused start never touches
    /// the engine. Completion is reported through engine callbacks.
    pub fn start(&mut self) -> Result<SessionId, StartError> {
        if self.torn_down {
            return Err(StartError::ShutDown);
        }

        if self.gate.state() != PermissionState::Granted {
            self.notice(PERMISSION_NOTICE);
            return Err(self.reject(StartError::PermissionDenied));
        }

        if !self.engine_available {
            self.notice(UNAVAILABLE_NOTICE);
            return Err(self.reject(StartError::EngineUnavailable));
        }

        if let Some(session) = self.session.as_ref().filter(|s| s.status().is_live()) {
            let id = session.id();
            warn!(session_id = %id, status = %session.status(), "start ignored, session in progress");
            return Err(self.reject(StartError::Busy(id)));
        }

        // Any previous session is finished; engine instances are never reused.
        self.session = None;

        if let Some((source, timeout)) = &self.probe {
            spawn_probe(Arc::clone(source), *timeout);
        }

        if self.preflight_support_check {
            let verdict = preflight(self.engine.as_ref(), &self.listen);
            if let Some(message) = verdict.refusal() {
                self.notice(&message);
                return Err(self.reject(StartError::SupportCheck(message)));
            }
        }

        let id = SessionId(self.next_session);
        self.next_session += 1;

        let sink = CallbackSink::new(id, self.callback_tx.clone());
        let handle = match self.engine.create_recognizer(sink) {
            Ok(handle) => EngineHandle::new(id, handle),
            Err(e) => {
                self.notice(&engine_notice(&e));
                return Err(self.reject(e.into()));
            }
        };

        let mut session = RecognitionSession::new(id, self.listen.language_tag.clone());
        if let Err(e) = session.start(handle, &self.listen) {
            self.notice(&engine_notice(&e));
            return Err(self.reject(e.into()));
        }

        info!(session_id = %id, language = %session.language_tag(), "session started");
        self.session = Some(session);
        self.publish(SessionEvent::SessionStarted { session_id: id });

        Ok(id)
    }

    /// Apply one engine callback to the active session
    ///
    /// Callbacks for any other session, including one already torn down,
    /// are dropped.
    pub fn handle_engine_message(&mut self, message: EngineMessage) {
        let session_id = message.session;

        let transition = match self.session.as_mut() {
            Some(session) if session.id() == session_id => session.apply(message.callback),
            _ => {
                debug!(%session_id, callback = ?message.callback, "dropping late callback");
                return;
            }
        };

        match &transition {
            Transition::Ignored => return,
            Transition::Ready => self.publish(SessionEvent::Listening { session_id }),
            Transition::SpeechBegan => self.publish(SessionEvent::SpeechBegan { session_id }),
            Transition::SpeechEnded => self.publish(SessionEvent::SpeechEnded { session_id }),
            Transition::Completed {
                candidates,
                transcript,
                duration_ms,
            } => {
                debug!(%session_id, results = %transcript, "recognition results");
                self.publish(SessionEvent::ResultsReady {
                    session_id,
                    candidates: candidates.clone(),
                    duration_ms: *duration_ms,
                });
            }
            Transition::Failed {
                code,
                error,
                duration_ms,
            } => {
                info!(%session_id, code, kind = ?error.kind(), "session failed");
                self.publish(SessionEvent::SessionFailed {
                    session_id,
                    kind: error.kind(),
                    duration_ms: *duration_ms,
                });
                match error.notice() {
                    Some(message) => self.notice(message),
                    None => debug!(%session_id, code, "silent recognizer error"),
                }
            }
        }

        let next = self.ui.reduce(&transition);
        self.set_ui(next);

        if transition.is_terminal() {
            self.session = None;
        }
    }

    /// Release the active session; later callbacks become no-ops
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if let Some(mut session) = self.session.take() {
            session.teardown();
        }
        let next = self.ui.idle();
        self.set_ui(next);
        info!("controller torn down");
    }

    /// Process commands and engine callbacks until the command channel closes
    pub async fn run(
        &mut self,
        mut commands: mpsc::Receiver<Command>,
        mut callbacks: mpsc::UnboundedReceiver<EngineMessage>,
    ) {
        info!("controller started");

        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => break,
                    }
                }
                Some(message) = callbacks.recv() => {
                    self.handle_engine_message(message);
                }
            }
        }

        info!("controller stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { reply } => {
                let result = self.start();
                let _ = reply.send(result);
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }

    fn reject(&self, error: StartError) -> StartError {
        debug!(?error, "start rejected");
        self.publish(SessionEvent::StartRejected {
            reason: error.to_string(),
        });
        error
    }

    fn notice(&mut self, message: &str) {
        info!(message, "notice");
        self.last_notice = Some(message.to_string());
        self.publish(SessionEvent::Notice {
            message: message.to_string(),
        });
    }

    fn publish(&self, event: SessionEvent) {
        debug!(%event, "emitting session event");
        let _ = self.event_tx.send(event);
    }

    fn set_ui(&mut self, next: UiState) {
        if next != self.ui {
            self.ui = next.clone();
            self.ui_tx.send_replace(next);
        }
    }
}

/// User-facing notice for an engine failure during start
fn engine_notice(error: &EngineError) -> String {
    match error {
        EngineError::Unavailable => UNAVAILABLE_NOTICE.to_string(),
        other => other.to_string(),
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.teardown();
        }
    }
}
