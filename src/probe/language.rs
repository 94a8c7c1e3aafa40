//! Best-effort query for the languages the recognizer supports

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Answer to a language-details query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageDetails {
    /// Language the recognizer prefers, if it reports one
    pub preferred: Option<String>,
    #[serde(default)]
    pub supported: Vec<String>,
}

/// Something that can answer which languages are supported
#[async_trait]
pub trait LanguageDetailsSource: Send + Sync {
    async fn language_details(&self) -> Result<LanguageDetails>;
}

/// Asks the recognizer program via `--language-details`
#[derive(Debug, Clone)]
pub struct CommandLanguageDetails {
    program: PathBuf,
}

impl CommandLanguageDetails {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }
}

#[async_trait]
impl LanguageDetailsSource for CommandLanguageDetails {
    async fn language_details(&self) -> Result<LanguageDetails> {
        let output = Command::new(&self.program)
            .arg("--language-details")
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.program.display()))?;

        if !output.status.success() {
            anyhow::bail!("language details query exited with {}", output.status);
        }

        serde_json::from_slice(&output.stdout).context("failed to parse language details")
    }
}

/// Fire the probe without waiting for it
///
/// The answer is only logged. Returns `None` when called outside a runtime.
pub fn spawn_probe(source: Arc<dyn LanguageDetailsSource>, timeout: Duration) -> Option<JoinHandle<()>> {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        debug!("no runtime, language probe skipped");
        return None;
    };

    Some(runtime.spawn(async move {
        match tokio::time::timeout(timeout, source.language_details()).await {
            Ok(Ok(details)) => {
                info!(
                    preferred = ?details.preferred,
                    supported = ?details.supported,
                    "recognizer language details"
                );
            }
            Ok(Err(e)) => {
                warn!(?e, "language details query failed");
            }
            Err(_) => {
                debug!(timeout_ms = timeout.as_millis() as u64, "language details query timed out");
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl LanguageDetailsSource for CountingSource {
        async fn language_details(&self) -> Result<LanguageDetails> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(LanguageDetails {
                preferred: Some("ru-RU".to_string()),
                supported: vec!["ru-RU".to_string(), "en-US".to_string()],
            })
        }
    }

    #[test]
    fn test_skipped_without_runtime() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        });
        assert!(spawn_probe(source.clone(), Duration::from_secs(1)).is_none());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_probe_runs_in_background() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        });

        let handle = spawn_probe(source.clone(), Duration::from_secs(1)).unwrap();
        handle.await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_probe_times_out_quietly() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            delay: Duration::from_secs(5),
        });

        let handle = spawn_probe(source, Duration::from_millis(10)).unwrap();
        handle.await.unwrap();
    }

    #[test]
    fn test_details_parsing() {
        let json = r#"{"preferred":"ru-RU","supported":["ru-RU","en-US"]}"#;
        let details: LanguageDetails = serde_json::from_str(json).unwrap();
        assert_eq!(details.preferred.as_deref(), Some("ru-RU"));
        assert_eq!(details.supported.len(), 2);

        let details: LanguageDetails = serde_json::from_str(r#"{"preferred":null}"#).unwrap();
        assert!(details.supported.is_empty());
    }
}
