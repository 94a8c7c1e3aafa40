//! Recognition support pre-flight

use tracing::{info, warn};

use crate::engine::{EngineError, ListenConfig, SpeechEngine};

/// Outcome of asking the engine whether `config` can be recognized
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreflightVerdict {
    Supported,
    /// Engine answered but does not list the configured language
    Unsupported,
    /// Engine could not answer; carries its error code
    Failed(i32),
}

impl PreflightVerdict {
    /// Notice shown when listening is refused
    ///
    /// Only a failed check refuses. An unsupported language is logged and
    /// listening goes ahead, leaving the engine to report its own error.
    pub fn refusal(&self) -> Option<String> {
        match self {
            PreflightVerdict::Supported | PreflightVerdict::Unsupported => None,
            PreflightVerdict::Failed(code) => Some(format!(
                "Speech recognition service IS NOT available! Error: {}",
                code
            )),
        }
    }
}

/// Check recognition support for `config` before listening
pub fn preflight(engine: &dyn SpeechEngine, config: &ListenConfig) -> PreflightVerdict {
    match engine.check_support(config) {
        Ok(support) => {
            info!(
                installed = ?support.installed_languages,
                online = ?support.online_languages,
                "recognition support"
            );
            if support.supports(&config.language_tag) {
                PreflightVerdict::Supported
            } else {
                warn!(language = %config.language_tag, "language not listed by recognizer");
                PreflightVerdict::Unsupported
            }
        }
        Err(EngineError::Support(code)) => {
            warn!(code, "recognition support check failed");
            PreflightVerdict::Failed(code)
        }
        Err(e) => {
            warn!(?e, "recognition support check failed");
            PreflightVerdict::Failed(crate::engine::codes::ERROR_CLIENT)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::codes::ERROR_CANNOT_CHECK_SUPPORT;
    use crate::engine::mock::MockEngine;
    use crate::engine::RecognitionSupport;

    #[test]
    fn test_supported_language() {
        let mut engine = MockEngine::new();
        engine.support = Some(RecognitionSupport {
            installed_languages: vec!["ru-RU".to_string()],
            online_languages: vec![],
        });

        let verdict = preflight(&engine, &ListenConfig::default());
        assert_eq!(verdict, PreflightVerdict::Supported);
        assert_eq!(verdict.refusal(), None);
    }

    #[test]
    fn test_unsupported_language() {
        let mut engine = MockEngine::new();
        engine.support = Some(RecognitionSupport {
            installed_languages: vec!["en-US".to_string()],
            online_languages: vec!["de-DE".to_string()],
        });

        let verdict = preflight(&engine, &ListenConfig::default());
        assert_eq!(verdict, PreflightVerdict::Unsupported);
        assert_eq!(verdict.refusal(), None);
    }

    #[test]
    fn test_engine_cannot_check() {
        let engine = MockEngine::new();

        let verdict = preflight(&engine, &ListenConfig::default());
        assert_eq!(verdict, PreflightVerdict::Failed(ERROR_CANNOT_CHECK_SUPPORT));
        assert_eq!(
            verdict.refusal().unwrap(),
            "Speech recognition service IS NOT available! Error: 14"
        );
    }
}
