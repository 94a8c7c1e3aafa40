//! Recognizer backed by an external command
//!
//! The command is spawned once per session with the language tag and model as
//! arguments. It writes one JSON callback per line on stdout, e.g.
//! `{"type":"ready"}` or `{"type":"results","candidates":["..."]}`.
//!
//! Invoked as `<program> --check-support --language <tag>` it prints a single
//! JSON object with `installed_languages` and `online_languages`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::codes::{ERROR_CANNOT_CHECK_SUPPORT, ERROR_CLIENT};
use super::{
    CallbackSink, EngineCallback, EngineError, ListenConfig, RecognitionSupport, RecognizerHandle,
    SpeechEngine,
};

/// Engine that runs a recognizer program per session
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: Option<PathBuf>,
}

impl CommandEngine {
    pub fn new(program: Option<PathBuf>) -> Self {
        Self { program }
    }

    fn resolve(&self) -> Option<PathBuf> {
        let program = self.program.as_ref()?;
        if program.components().count() > 1 {
            return program.is_file().then(|| program.clone());
        }

        let path = std::env::var_os("PATH")?;
        std::env::split_paths(&path)
            .map(|dir| dir.join(program))
            .find(|candidate| candidate.is_file())
    }
}

impl SpeechEngine for CommandEngine {
    fn is_available(&self) -> bool {
        self.resolve().is_some()
    }

    fn create_recognizer(&self, sink: CallbackSink) -> Result<Box<dyn RecognizerHandle>, EngineError> {
        let program = self.resolve().ok_or(EngineError::Unavailable)?;
        debug!(session_id = %sink.session(), ?program, "recognizer created");
        Ok(Box::new(CommandRecognizer {
            program,
            sink,
            child: None,
            reader: None,
        }))
    }

    fn check_support(&self, config: &ListenConfig) -> Result<RecognitionSupport, EngineError> {
        let program = self.resolve().ok_or(EngineError::Unavailable)?;
        let output = std::process::Command::new(&program)
            .arg("--check-support")
            .arg("--language")
            .arg(&config.language_tag)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|e| {
                warn!(?e, ?program, "recognizer support check failed to run");
                EngineError::Support(ERROR_CANNOT_CHECK_SUPPORT)
            })?;

        if !output.status.success() {
            warn!(status = ?output.status, "recognizer support check exited with failure");
            return Err(EngineError::Support(ERROR_CANNOT_CHECK_SUPPORT));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| {
            warn!(?e, "unparseable recognizer support output");
            EngineError::Support(ERROR_CANNOT_CHECK_SUPPORT)
        })
    }
}

struct CommandRecognizer {
    program: PathBuf,
    sink: CallbackSink,
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
}

impl RecognizerHandle for CommandRecognizer {
    fn start_listening(&mut self, config: &ListenConfig) -> Result<(), EngineError> {
        if self.child.is_some() {
            return Err(EngineError::Listen("recognizer already listening".to_string()));
        }

        let mut child = spawn_recognizer(&self.program, config)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Listen("recognizer stdout not captured".to_string()))?;

        info!(
            session_id = %self.sink.session(),
            language = %config.language_tag,
            model = config.language_model.as_str(),
            "recognizer listening"
        );

        let sink = self.sink.clone();
        self.reader = Some(tokio::spawn(async move {
            forward_callbacks(BufReader::new(stdout), sink).await;
        }));
        self.child = Some(child);

        Ok(())
    }

    fn destroy(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                debug!(?e, "recognizer process already exited");
            }
        }
    }
}

fn spawn_recognizer(program: &Path, config: &ListenConfig) -> Result<Child, EngineError> {
    Command::new(program)
        .arg("--language")
        .arg(&config.language_tag)
        .arg("--model")
        .arg(config.language_model.as_str())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| EngineError::Listen(e.to_string()))
}

/// Read JSON-lines callbacks until EOF
///
/// A recognizer that exits without a terminal callback is reported as a
/// client error so the session still ends.
async fn forward_callbacks<R>(reader: BufReader<R>, sink: CallbackSink)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = reader.lines();
    let mut terminal_seen = false;

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<EngineCallback>(line) {
                    Ok(callback) => {
                        terminal_seen |= matches!(
                            callback,
                            EngineCallback::Results { .. } | EngineCallback::Error { .. }
                        );
                        sink.deliver(callback);
                    }
                    Err(e) => {
                        warn!(?e, line, "unparseable recognizer output");
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(?e, "failed reading recognizer output");
                break;
            }
        }
    }

    if !terminal_seen {
        warn!(session_id = %sink.session(), "recognizer exited without a result");
        sink.deliver(EngineCallback::Error { code: ERROR_CLIENT });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionId;
    use tokio::sync::mpsc;

    #[test]
    fn test_unconfigured_engine_unavailable() {
        let engine = CommandEngine::new(None);
        assert!(!engine.is_available());
    }

    #[test]
    fn test_missing_program_unavailable() {
        let engine = CommandEngine::new(Some(PathBuf::from("/nonexistent/dir/recognizer")));
        assert!(!engine.is_available());

        let (tx, _rx) = mpsc::unbounded_channel();
        let result = engine.create_recognizer(CallbackSink::new(SessionId(1), tx));
        assert!(matches!(result, Err(EngineError::Unavailable)));
    }

    /// Write an executable shell script standing in for a recognizer
    fn script_recognizer(name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = std::env::temp_dir().join(format!("{}-{}.sh", name, std::process::id()));
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_check_support_reads_languages() {
        let program = script_recognizer(
            "recognizer-support",
            r#"[ "$1" = "--check-support" ] || exit 2
echo '{"installed_languages":["ru-RU"],"online_languages":["en-US"]}'"#,
        );
        let engine = CommandEngine::new(Some(program.clone()));

        let support = engine.check_support(&ListenConfig::default()).unwrap();
        std::fs::remove_file(&program).ok();

        assert!(support.supports("ru-RU"));
        assert_eq!(support.online_languages, vec!["en-US".to_string()]);
    }

    #[test]
    fn test_check_support_failure_maps_to_code() {
        let program = script_recognizer("recognizer-no-support", "exit 1");
        let engine = CommandEngine::new(Some(program.clone()));

        let result = engine.check_support(&ListenConfig::default());
        std::fs::remove_file(&program).ok();

        assert!(matches!(
            result,
            Err(EngineError::Support(ERROR_CANNOT_CHECK_SUPPORT))
        ));
    }

    #[test]
    fn test_check_support_unconfigured() {
        let engine = CommandEngine::new(None);
        assert!(matches!(
            engine.check_support(&ListenConfig::default()),
            Err(EngineError::Unavailable)
        ));
    }

    #[tokio::test]
    async fn test_forward_callbacks() {
        let output = b"{\"type\":\"ready\"}\n\nnot json\n{\"type\":\"results\",\"candidates\":[\"hello world\"]}\n";
        let (tx, mut rx) = mpsc::unbounded_channel();

        forward_callbacks(BufReader::new(&output[..]), CallbackSink::new(SessionId(2), tx)).await;

        assert_eq!(rx.recv().await.unwrap().callback, EngineCallback::Ready);
        assert_eq!(
            rx.recv().await.unwrap().callback,
            EngineCallback::Results {
                candidates: vec!["hello world".to_string()],
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_early_exit_reported_as_client_error() {
        let output = b"{\"type\":\"ready\"}\n";
        let (tx, mut rx) = mpsc::unbounded_channel();

        forward_callbacks(BufReader::new(&output[..]), CallbackSink::new(SessionId(2), tx)).await;

        assert_eq!(rx.recv().await.unwrap().callback, EngineCallback::Ready);
        assert_eq!(
            rx.recv().await.unwrap().callback,
            EngineCallback::Error { code: ERROR_CLIENT }
        );
    }
}
