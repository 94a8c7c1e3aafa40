//! Configuration loading and management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::engine::ListenConfig;
use crate::permission::MicrophonePolicy;

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Recognizer program; `None` leaves the engine unavailable
    pub recognizer_command: Option<PathBuf>,

    /// How microphone permission requests are answered
    pub microphone: MicrophonePolicy,

    /// Run the recognition support check before every listen
    pub preflight_support_check: bool,

    /// Upper bound for the language-details probe
    pub probe_timeout: Duration,

    /// Fixed language tag and recognition mode
    pub listen: ListenConfig,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME").context("HOME is not set")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("speech-session");

        let socket_path = env_var("SPEECH_SESSION_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("daemon.sock"));

        let microphone = match env_var("SPEECH_SESSION_MICROPHONE") {
            Some(policy) => policy.parse().context("invalid SPEECH_SESSION_MICROPHONE")?,
            None => MicrophonePolicy::default(),
        };

        let preflight_support_check = env_var("SPEECH_SESSION_PREFLIGHT")
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            socket_path,
            data_dir,
            recognizer_command: env_var("SPEECH_SESSION_RECOGNIZER").map(PathBuf::from),
            microphone,
            preflight_support_check,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            listen: ListenConfig::default(),
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

/// Non-empty environment variable
fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
