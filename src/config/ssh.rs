// ABOUTME: SSH settings shared by every remote target.
// ABOUTME: Host key policy, key path, and command timeout defaults.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct SshSettings {
    /// Private key to use instead of the agent and default key locations.
    #[serde(default)]
    pub key_path: Option<PathBuf>,

    #[serde(default)]
    pub known_hosts: Option<PathBuf>,

    /// Accept and remember unknown host keys.
    #[serde(default)]
    pub trust_first_connection: bool,

    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub command_timeout: Duration,
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(300)
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            key_path: None,
            known_hosts: None,
            trust_first_connection: false,
            command_timeout: default_command_timeout(),
        }
    }
}
