// ABOUTME: CodeDeploy deployment convergence.
// ABOUTME: Polls a deployment until it leaves the in-flight states, then re-reads the final status.

use std::sync::Arc;

use super::Convergence;
use super::clients::CodeDeployApi;
use super::error::AwsError;
use super::types::{DeploymentInfo, DeploymentStatus};
use crate::events::{EventContext, EventLogger};
use crate::types::DeploymentId;
use crate::waiter::{Poll, Progress, WaitError, Waiter};

pub struct DeploymentWatcher {
    client: Arc<dyn CodeDeployApi>,
    waiter: Waiter,
    progress: Progress,
}

impl DeploymentWatcher {
    pub fn new(client: Arc<dyn CodeDeployApi>, waiter: Waiter, progress: Progress) -> Self {
        Self {
            client,
            waiter,
            progress,
        }
    }

    /// Wait until `id` is no longer created, queued or in progress.
    ///
    /// Settling says nothing about success; check the returned status.
    pub async fn wait_for(
        &self,
        id: &DeploymentId,
        logger: &dyn EventLogger,
    ) -> Result<Convergence<DeploymentInfo>, AwsError> {
        let client = &self.client;
        let progress = self.progress;
        let result = self
            .waiter
            .wait(|attempt| async move {
                let info = client.get_deployment(id).await?;
                if !info.status.is_in_flight() {
                    return Ok(Poll::Done);
                }
                if progress.should_report(attempt) {
                    logger.info(
                        &format!("Deployment {} is {} ({})", id, info.status, info.overview),
                        &EventContext::new()
                            .with("deployment", id)
                            .with("attempt", attempt.number),
                    );
                }
                Ok::<_, AwsError>(Poll::Continue)
            })
            .await;

        match result {
            Ok(()) => Ok(Convergence::Settled(self.client.get_deployment(id).await?)),
            Err(WaitError::Timeout { attempts }) => Ok(Convergence::TimedOut { attempts }),
            Err(WaitError::Predicate(e)) => Err(e),
        }
    }
}

/// `Ok` when the deployment succeeded, otherwise the reason it did not.
pub fn check_deployment(info: &DeploymentInfo) -> Result<(), String> {
    if info.status == DeploymentStatus::Succeeded {
        return Ok(());
    }
    let mut reason = format!("deployment {} finished as {}", info.id, info.status);
    if let Some(message) = &info.error_message {
        reason.push_str(&format!(": {}", message));
    } else if let Some(code) = &info.error_code {
        reason.push_str(&format!(" ({})", code));
    }
    Err(reason)
}
