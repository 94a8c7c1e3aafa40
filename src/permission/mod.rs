//! Microphone permission handling
//!
//! Recognition only starts after [`PermissionGate`] resolves to granted.
//! The platform prompt is issued at most once per check.

mod gate;
mod platform;

pub use gate::{PermissionGate, PermissionState};
pub use platform::{ConfiguredPermissions, MicrophonePolicy};

#[cfg(test)]
pub use gate::mock;
