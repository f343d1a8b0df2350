// ABOUTME: Local command execution through tokio::process.
// ABOUTME: Runs commands with `sh -c` in the job workspace and captures their output.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::{CommandExecutor, CommandOutput, ExecError};

/// Runs commands on the agent host.
#[derive(Debug, Clone, Default)]
pub struct LocalExecutor {
    working_dir: Option<PathBuf>,
}

impl LocalExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run commands from `dir` instead of the agent's current directory.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            working_dir: Some(dir.to_path_buf()),
        }
    }
}

#[async_trait]
impl CommandExecutor for LocalExecutor {
    async fn run(
        &self,
        command: &str,
        env: &HashMap<String, String>,
    ) -> Result<CommandOutput, ExecError> {
        tracing::debug!("Running locally: {}", command);

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| ExecError::Spawn(e.to_string()))?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    fn target(&self) -> String {
        match self.working_dir {
            Some(ref dir) => format!("local ({})", dir.display()),
            None => "local".to_string(),
        }
    }
}
