//! Error codes reported by the platform speech engine
//!
//! Numbering follows the platform recognizer so codes coming off the wire
//! can be compared directly. Codes the daemon never inspects (10, 11, 15)
//! are classified as unknown.

pub const ERROR_NETWORK_TIMEOUT: i32 = 1;
pub const ERROR_NETWORK: i32 = 2;
pub const ERROR_AUDIO: i32 = 3;
pub const ERROR_SERVER: i32 = 4;
pub const ERROR_CLIENT: i32 = 5;
pub const ERROR_SPEECH_TIMEOUT: i32 = 6;
pub const ERROR_NO_MATCH: i32 = 7;
pub const ERROR_RECOGNIZER_BUSY: i32 = 8;
pub const ERROR_INSUFFICIENT_PERMISSIONS: i32 = 9;
pub const ERROR_LANGUAGE_NOT_SUPPORTED: i32 = 12;
pub const ERROR_LANGUAGE_UNAVAILABLE: i32 = 13;
pub const ERROR_CANNOT_CHECK_SUPPORT: i32 = 14;
