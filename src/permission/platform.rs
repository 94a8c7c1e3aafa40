//! Desktop permission platform
//!
//! There is no system prompt for microphone access on the desktop, so the
//! answer comes from configuration. A granted prompt leaves a marker file in
//! the data directory so later checks resolve without asking again.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::gate::{Permission, PermissionPlatform};

const MICROPHONE_MARKER: &str = "microphone.granted";

/// How microphone requests are answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicrophonePolicy {
    /// Always held, no prompt
    Granted,
    /// Never held, every request refused
    Denied,
    /// Held once a request has been granted and persisted
    PromptGrant,
}

impl Default for MicrophonePolicy {
    fn default() -> Self {
        Self::PromptGrant
    }
}

impl FromStr for MicrophonePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "granted" => Ok(MicrophonePolicy::Granted),
            "denied" => Ok(MicrophonePolicy::Denied),
            "prompt-grant" | "prompt" => Ok(MicrophonePolicy::PromptGrant),
            other => anyhow::bail!("unknown microphone policy: {}", other),
        }
    }
}

/// Permission platform driven by [`MicrophonePolicy`]
#[derive(Debug, Clone)]
pub struct ConfiguredPermissions {
    policy: MicrophonePolicy,
    marker: PathBuf,
}

impl ConfiguredPermissions {
    pub fn new(policy: MicrophonePolicy, data_dir: &Path) -> Self {
        Self {
            policy,
            marker: data_dir.join(MICROPHONE_MARKER),
        }
    }
}

#[async_trait]
impl PermissionPlatform for ConfiguredPermissions {
    fn is_granted(&self, permission: Permission) -> bool {
        match (permission, self.policy) {
            (Permission::Microphone, MicrophonePolicy::Granted) => true,
            (Permission::Microphone, MicrophonePolicy::Denied) => false,
            (Permission::Microphone, MicrophonePolicy::PromptGrant) => self.marker.exists(),
        }
    }

    async fn request(&self, permission: Permission) -> bool {
        match (permission, self.policy) {
            (Permission::Microphone, MicrophonePolicy::Granted) => true,
            (Permission::Microphone, MicrophonePolicy::Denied) => false,
            (Permission::Microphone, MicrophonePolicy::PromptGrant) => {
                if let Some(parent) = self.marker.parent() {
                    if let Err(e) = tokio::fs::create_dir_all(parent).await {
                        warn!(?e, "failed to create permission directory");
                    }
                }
                if let Err(e) = tokio::fs::write(&self.marker, b"").await {
                    warn!(?e, marker = ?self.marker, "failed to persist microphone grant");
                } else {
                    debug!(marker = ?self.marker, "microphone grant persisted");
                }
                true
            }
        }
    }
}
