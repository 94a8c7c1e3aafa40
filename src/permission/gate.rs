//! Permission gate in front of session creation

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Runtime permissions the daemon may ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Microphone,
}

/// Last known answer from the permission platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    #[default]
    Unknown,
    Granted,
    Denied,
}

/// Host permission subsystem
#[async_trait]
pub trait PermissionPlatform: Send + Sync {
    /// Whether the permission is already held, without prompting
    fn is_granted(&self, permission: Permission) -> bool;

    /// Prompt once; resolves when the platform answers
    async fn request(&self, permission: Permission) -> bool;
}

/// Resolves microphone access before any recognition attempt
pub struct PermissionGate {
    platform: Arc<dyn PermissionPlatform>,
    state: PermissionState,
}

impl PermissionGate {
    pub fn new(platform: Arc<dyn PermissionPlatform>) -> Self {
        Self {
            platform,
            state: PermissionState::Unknown,
        }
    }

    pub fn state(&self) -> PermissionState {
        self.state
    }

    /// Ensure microphone access, prompting at most once
    ///
    /// Already-granted access resolves without a prompt. A denied prompt is
    /// final for this check; nothing retries automatically.
    pub async fn ensure_microphone_access(&mut self) -> PermissionState {
        if self.platform.is_granted(Permission::Microphone) {
            debug!("microphone access already granted");
            self.state = PermissionState::Granted;
            return self.state;
        }

        info!("requesting microphone access");
        self.state = if self.platform.request(Permission::Microphone).await {
            info!("microphone access granted");
            PermissionState::Granted
        } else {
            warn!("microphone access denied");
            PermissionState::Denied
        };

        self.state
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockPermissions;
    use super::*;

    #[test]
    fn test_initial_state_unknown() {
        let gate = PermissionGate::new(Arc::new(MockPermissions::new(true, true)));
        assert_eq!(gate.state(), PermissionState::Unknown);
    }

    #[test]
    fn test_already_granted_skips_prompt() {
        let platform = Arc::new(MockPermissions::new(true, false));
        let mut gate = PermissionGate::new(platform.clone());

        let state = tokio_test::block_on(gate.ensure_microphone_access());

        assert_eq!(state, PermissionState::Granted);
        assert_eq!(platform.prompts(), 0);
    }

    #[test]
    fn test_prompt_granted() {
        let platform = Arc::new(MockPermissions::new(false, true));
        let mut gate = PermissionGate::new(platform.clone());

        let state = tokio_test::block_on(gate.ensure_microphone_access());

        assert_eq!(state, PermissionState::Granted);
        assert_eq!(gate.state(), PermissionState::Granted);
        assert_eq!(platform.prompts(), 1);
    }

    #[test]
    fn test_prompt_denied_once() {
        let platform = Arc::new(MockPermissions::new(false, false));
        let mut gate = PermissionGate::new(platform.clone());

        let state = tokio_test::block_on(gate.ensure_microphone_access());

        assert_eq!(state, PermissionState::Denied);
        assert_eq!(platform.prompts(), 1);
    }
}
