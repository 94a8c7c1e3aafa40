//! Recognizer error classification
//!
//! Maps engine error codes onto [`RecognitionError`]. The table is built once
//! from an ordered entry list; when the list contains the same code twice the
//! first entry wins and the later one is reported at construction.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::codes::*;

/// What went wrong, independent of how it is presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Audio,
    Server,
    Client,
    Network,
    NetworkTimeout,
    SpeechTimeout,
    NoMatch,
    Busy,
    InsufficientPermissions,
    LanguageNotSupported,
    LanguageUnavailable,
    /// Code not present in the table
    Unknown(i32),
}

/// Outcome of classifying one engine error code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "severity", rename_all = "snake_case")]
pub enum RecognitionError {
    /// Shown to the user as a transient notice
    Fatal { kind: ErrorKind, message: String },
    /// Resets the session without telling the user
    Silent { kind: ErrorKind },
}

impl RecognitionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RecognitionError::Fatal { kind, .. } | RecognitionError::Silent { kind } => *kind,
        }
    }

    /// Message to surface, `None` for silent errors
    pub fn notice(&self) -> Option<&str> {
        match self {
            RecognitionError::Fatal { message, .. } => Some(message),
            RecognitionError::Silent { .. } => None,
        }
    }
}

/// Table entry: `None` message marks a silent classification
pub type Entry = (i32, ErrorKind, Option<&'static str>);

const DEFAULT_ENTRIES: &[Entry] = &[
    (ERROR_AUDIO, ErrorKind::Audio, Some("Audio recording error")),
    (ERROR_SERVER, ErrorKind::Server, Some("Server error")),
    (ERROR_CLIENT, ErrorKind::Client, Some("Client error")),
    (ERROR_NETWORK, ErrorKind::Network, Some("Network error")),
    (ERROR_NETWORK_TIMEOUT, ErrorKind::NetworkTimeout, Some("Network timeout error")),
    (ERROR_SPEECH_TIMEOUT, ErrorKind::SpeechTimeout, Some("Speech timeout")),
    (ERROR_NO_MATCH, ErrorKind::NoMatch, Some("No recognition result matched")),
    (ERROR_RECOGNIZER_BUSY, ErrorKind::Busy, None),
    (
        ERROR_INSUFFICIENT_PERMISSIONS,
        ErrorKind::InsufficientPermissions,
        Some("Insufficient permissions error"),
    ),
    (
        ERROR_LANGUAGE_NOT_SUPPORTED,
        ErrorKind::LanguageNotSupported,
        Some("Language isn't supported"),
    ),
    (
        ERROR_LANGUAGE_UNAVAILABLE,
        ErrorKind::LanguageUnavailable,
        Some("Language unavailable"),
    ),
];

/// Code to classification lookup with an explicit fallback arm
#[derive(Debug, Clone)]
pub struct ErrorTable {
    entries: HashMap<i32, RecognitionError>,
}

impl ErrorTable {
    /// Build a table from an ordered entry list, first entry per code wins
    pub fn from_entries(list: &[Entry]) -> Self {
        let mut entries = HashMap::with_capacity(list.len());

        for &(code, kind, message) in list {
            if entries.contains_key(&code) {
                warn!(code, ?kind, "duplicate error table entry ignored");
                continue;
            }
            let classification = match message {
                Some(message) => RecognitionError::Fatal {
                    kind,
                    message: message.to_string(),
                },
                None => RecognitionError::Silent { kind },
            };
            entries.insert(code, classification);
        }

        Self { entries }
    }

    pub fn classify(&self, code: i32) -> RecognitionError {
        self.entries
            .get(&code)
            .cloned()
            .unwrap_or_else(|| RecognitionError::Fatal {
                kind: ErrorKind::Unknown(code),
                message: format!("Unknown error {}", code),
            })
    }

    /// Codes with an explicit entry
    #[cfg(test)]
    pub fn codes(&self) -> impl Iterator<Item = i32> + '_ {
        self.entries.keys().copied()
    }
}

impl Default for ErrorTable {
    fn default() -> Self {
        Self::from_entries(DEFAULT_ENTRIES)
    }
}

/// Classify an engine error code against the default table
pub fn classify(code: i32) -> RecognitionError {
    static TABLE: OnceLock<ErrorTable> = OnceLock::new();
    TABLE.get_or_init(ErrorTable::default).classify(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_is_silent() {
        let error = classify(ERROR_RECOGNIZER_BUSY);
        assert!(matches!(error, RecognitionError::Silent { .. }));
        assert_eq!(error.kind(), ErrorKind::Busy);
        assert_eq!(error.notice(), None);
    }

    #[test]
    fn test_mapped_codes_are_fatal_with_message() {
        let table = ErrorTable::default();
        for code in table.codes() {
            if code == ERROR_RECOGNIZER_BUSY {
                continue;
            }
            let error = table.classify(code);
            let message = error.notice().unwrap();
            assert!(!message.is_empty(), "code {} has empty message", code);
        }
    }

    #[test]
    fn test_classification_is_deterministic() {
        for code in -2..20 {
            assert_eq!(classify(code), classify(code));
        }
    }

    #[test]
    fn test_network_error_message() {
        assert_eq!(
            classify(ERROR_NETWORK),
            RecognitionError::Fatal {
                kind: ErrorKind::Network,
                message: "Network error".to_string(),
            }
        );
    }

    #[test]
    fn test_timeouts_have_distinct_messages() {
        assert_eq!(classify(ERROR_NETWORK_TIMEOUT).notice(), Some("Network timeout error"));
        assert_eq!(classify(ERROR_SPEECH_TIMEOUT).notice(), Some("Speech timeout"));
    }

    #[test]
    fn test_unmapped_code_falls_through() {
        // too many requests has no entry
        let error = classify(10);
        assert_eq!(error.kind(), ErrorKind::Unknown(10));
        assert_eq!(error.notice(), Some("Unknown error 10"));

        assert_eq!(classify(-42).notice(), Some("Unknown error -42"));
    }

    #[test]
    fn test_duplicate_entries_first_wins() {
        let table = ErrorTable::from_entries(&[
            (ERROR_SPEECH_TIMEOUT, ErrorKind::NetworkTimeout, Some("Network timeout error")),
            (ERROR_SPEECH_TIMEOUT, ErrorKind::SpeechTimeout, Some("Speech timeout")),
        ]);

        let error = table.classify(ERROR_SPEECH_TIMEOUT);
        assert_eq!(error.kind(), ErrorKind::NetworkTimeout);
        assert_eq!(error.notice(), Some("Network timeout error"));
        assert_eq!(table.codes().count(), 1);
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&classify(ERROR_RECOGNIZER_BUSY)).unwrap();
        assert!(json.contains("silent"));
        assert!(json.contains("busy"));
    }
}
