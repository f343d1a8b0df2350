// ABOUTME: Process and remote command execution seam used by non-AWS platforms.
// ABOUTME: Defines CommandExecutor, RemoteConnector, and shell quoting helpers.

mod local;
mod remote;

pub use local::LocalExecutor;
pub use remote::{SshConnector, SshExecutor};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ServerConfig;

/// Captured result of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Short human description of why the command failed.
    pub fn failure_summary(&self) -> String {
        let code = match self.exit_code {
            Some(code) => format!("exited with code {}", code),
            None => "was terminated by a signal".to_string(),
        };
        let detail = self.stderr.trim();
        if detail.is_empty() {
            code
        } else {
            let last = detail.lines().last().unwrap_or(detail);
            format!("{}: {}", code, last)
        }
    }
}

/// Errors from executing a command. A command that ran and exited non-zero
/// is not an error; it is a [`CommandOutput`] with `success() == false`.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("failed to start command: {0}")]
    Spawn(String),

    #[error("SSH error: {0}")]
    Ssh(#[from] crate::ssh::Error),

    #[error("session already closed")]
    Closed,
}

/// Runs shell commands somewhere: locally or on a remote host.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `command` through a POSIX shell with `env` exported.
    async fn run(
        &self,
        command: &str,
        env: &HashMap<String, String>,
    ) -> Result<CommandOutput, ExecError>;

    /// Where commands run, for log messages.
    fn target(&self) -> String;

    /// Release the underlying connection. Safe to call more than once.
    async fn close(&self) -> Result<(), ExecError> {
        Ok(())
    }
}

/// Opens executors for remote servers.
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(&self, server: &ServerConfig) -> Result<Arc<dyn CommandExecutor>, ExecError>;
}

/// Quote a value for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// `export` prefix for running a command with `env` over a channel that
/// can't set variables directly. Keys are sorted for stable output.
pub fn export_prefix(env: &HashMap<String, String>) -> String {
    let mut keys: Vec<&String> = env.keys().collect();
    keys.sort();
    keys.into_iter()
        .map(|k| format!("export {}={}; ", k, shell_quote(&env[k])))
        .collect()
}
