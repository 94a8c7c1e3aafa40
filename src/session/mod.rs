//! Recognition session lifecycle
//!
//! Session states:
//! - Idle: no engine resources held
//! - Starting: listen requested, engine not ready yet
//! - Listening / Processing: recognition in progress
//! - Completed / Failed: terminal, handle released

mod machine;
mod view;

pub use machine::{RecognitionSession, SessionId, SessionStatus, Transition};
pub use view::UiState;
