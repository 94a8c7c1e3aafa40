//! Error classification for recognizer failures
//!
//! Every engine error code maps to exactly one [`RecognitionError`]:
//! - Fatal: surfaced once as a transient notice
//! - Silent: session resets, user is not told (recognizer busy)

mod mapper;

pub use mapper::{classify, ErrorKind, RecognitionError};
