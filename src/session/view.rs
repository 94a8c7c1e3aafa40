//! UI-facing snapshot derived from session transitions

use serde::{Deserialize, Serialize};

use super::machine::Transition;

/// What the presentation layer renders
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiState {
    /// Busy indicator: shown between ready and the terminal callback
    pub in_progress: bool,
    /// Last completed transcript; kept across failed attempts
    pub transcript: String,
}

impl UiState {
    /// Next snapshot after `transition`
    pub fn reduce(&self, transition: &Transition) -> UiState {
        match transition {
            Transition::Ignored | Transition::SpeechBegan | Transition::SpeechEnded => self.clone(),
            Transition::Ready => UiState {
                in_progress: true,
                transcript: self.transcript.clone(),
            },
            Transition::Completed { transcript, .. } => UiState {
                in_progress: false,
                transcript: transcript.clone(),
            },
            Transition::Failed { .. } => UiState {
                in_progress: false,
                transcript: self.transcript.clone(),
            },
        }
    }

    /// Snapshot after a session ended without a terminal callback
    pub fn idle(&self) -> UiState {
        UiState {
            in_progress: false,
            transcript: self.transcript.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::classify;

    #[test]
    fn test_default_is_idle() {
        let state = UiState::default();
        assert!(!state.in_progress);
        assert!(state.transcript.is_empty());
    }

    #[test]
    fn test_ready_then_results() {
        let state = UiState::default().reduce(&Transition::Ready);
        assert!(state.in_progress);

        let state = state.reduce(&Transition::SpeechEnded);
        assert!(state.in_progress);

        let state = state.reduce(&Transition::Completed {
            candidates: vec!["one".to_string(), "two".to_string()],
            transcript: "one\ntwo".to_string(),
            duration_ms: 10,
        });
        assert_eq!(
            state,
            UiState {
                in_progress: false,
                transcript: "one\ntwo".to_string(),
            }
        );
    }

    #[test]
    fn test_failure_keeps_transcript() {
        let state = UiState {
            in_progress: true,
            transcript: "earlier".to_string(),
        };

        let state = state.reduce(&Transition::Failed {
            code: 2,
            error: classify(2),
            duration_ms: 5,
        });
        assert!(!state.in_progress);
        assert_eq!(state.transcript, "earlier");
    }
}
