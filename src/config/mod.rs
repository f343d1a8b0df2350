// ABOUTME: Agent configuration types and parsing for hal.yml.
// ABOUTME: Handles YAML parsing, file discovery, and template generation.

mod env_value;
mod server;
mod ssh;
mod waiter;

pub use env_value::{EnvValue, resolve_env_map};
pub use server::{ServerConfig, ServerEntry, deserialize_server};
pub use ssh::SshSettings;
pub use waiter::{WaiterConfig, WaitersConfig};

use crate::error::{Error, Result};
use crate::output::OutputMode;
use serde::Deserialize;
use std::path::Path;

pub const CONFIG_FILENAME: &str = "hal.yml";
pub const CONFIG_FILENAME_ALT: &str = "hal.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".hal/config.yml";

/// Agent-wide settings. Every field has a default so an empty file is valid.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub output: OutputMode,

    #[serde(default)]
    pub waiters: WaitersConfig,

    #[serde(default)]
    pub ssh: SshSettings,

    /// Default AWS region for platforms that don't name one.
    #[serde(default)]
    pub region: Option<String>,
}

impl AgentConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Like [`discover`](Self::discover) but falls back to defaults when no file exists.
    pub fn discover_or_default(dir: &Path) -> Result<Self> {
        match Self::discover(dir) {
            Err(Error::ConfigNotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }
}

/// Write a commented `hal.yml` with the default tunables.
pub fn init_config(dir: &Path, region: Option<&str>, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    std::fs::write(&config_path, template_yaml(region))?;
    Ok(())
}

fn template_yaml(region: Option<&str>) -> String {
    let defaults = WaitersConfig::default();
    let waiter = |name: &str, w: &WaiterConfig| {
        format!(
            "  {}:\n    interval: {}s\n    max_attempts: {}\n    log_every: {}\n",
            name,
            w.interval.as_secs(),
            w.max_attempts,
            w.log_every
        )
    };

    let mut yaml = String::from("# Output mode: normal, quiet, or json\noutput: normal\n");
    if let Some(region) = region {
        yaml.push_str(&format!("region: {}\n", region));
    } else {
        yaml.push_str("# region: us-east-1\n");
    }
    yaml.push_str("waiters:\n");
    yaml.push_str(&waiter("codedeploy", &defaults.codedeploy));
    yaml.push_str(&waiter("beanstalk", &defaults.beanstalk));
    yaml.push_str(&waiter("elb", &defaults.elb));
    yaml.push_str(&waiter("ssm", &defaults.ssm));
    yaml.push_str(
        "ssh:\n  # Accept unknown host keys on first connection\n  trust_first_connection: false\n  command_timeout: 5m\n",
    );
    yaml
}
