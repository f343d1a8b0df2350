// ABOUTME: Remote command execution over an SSH session.
// ABOUTME: Provides the SSH-backed executor and the connector that opens it.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::{CommandExecutor, CommandOutput, ExecError, RemoteConnector, export_prefix};
use crate::config::{ServerConfig, SshSettings};
use crate::ssh::{Session, SessionConfig};

/// Runs commands on a remote host through one SSH session.
pub struct SshExecutor {
    target: String,
    session: Mutex<Option<Arc<Session>>>,
}

impl SshExecutor {
    pub fn new(session: Session) -> Self {
        Self {
            target: session.target(),
            session: Mutex::new(Some(Arc::new(session))),
        }
    }

    fn session(&self) -> Result<Arc<Session>, ExecError> {
        self.session.lock().clone().ok_or(ExecError::Closed)
    }
}

#[async_trait]
impl CommandExecutor for SshExecutor {
    async fn run(
        &self,
        command: &str,
        env: &HashMap<String, String>,
    ) -> Result<CommandOutput, ExecError> {
        let session = self.session()?;
        let full = format!("{}{}", export_prefix(env), command);
        tracing::debug!("Running on {}: {}", self.target, command);

        let output = session.exec(&full).await?;
        Ok(CommandOutput {
            exit_code: i32::try_from(output.exit_status).ok(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    fn target(&self) -> String {
        self.target.clone()
    }

    async fn close(&self) -> Result<(), ExecError> {
        // Take the session out before awaiting so the lock is never held across it.
        let session = self.session.lock().take();
        match session {
            Some(session) => session.disconnect().await.map_err(ExecError::from),
            None => Ok(()),
        }
    }
}

/// Opens [`SshExecutor`]s with shared SSH settings.
#[derive(Debug, Clone, Default)]
pub struct SshConnector {
    settings: SshSettings,
}

impl SshConnector {
    pub fn new(settings: SshSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl RemoteConnector for SshConnector {
    async fn connect(&self, server: &ServerConfig) -> Result<Arc<dyn CommandExecutor>, ExecError> {
        let config = SessionConfig::for_server(server, &self.settings);
        let session = Session::connect(config).await?;
        Ok(Arc::new(SshExecutor::new(session)))
    }
}
