// ABOUTME: SSM Run Command convergence across a set of instances.
// ABOUTME: Polls every invocation until none is in flight, then re-reads them all.

use std::sync::Arc;

use super::Convergence;
use super::clients::{INVOCATION_DOES_NOT_EXIST, SsmApi};
use super::error::AwsError;
use super::types::{CommandInvocation, InvocationStatus};
use crate::events::{EventContext, EventLogger};
use crate::types::{CommandId, InstanceId};
use crate::waiter::{Poll, Progress, WaitError, Waiter};

pub struct CommandWatcher {
    client: Arc<dyn SsmApi>,
    waiter: Waiter,
    progress: Progress,
}

impl CommandWatcher {
    pub fn new(client: Arc<dyn SsmApi>, waiter: Waiter, progress: Progress) -> Self {
        Self {
            client,
            waiter,
            progress,
        }
    }

    /// Wait until `command` has finished on every instance.
    pub async fn wait_for(
        &self,
        command: &CommandId,
        instances: &[InstanceId],
        logger: &dyn EventLogger,
    ) -> Result<Convergence<Vec<CommandInvocation>>, AwsError> {
        let client = &self.client;
        let progress = self.progress;
        let result = self
            .waiter
            .wait(|attempt| async move {
                let mut running = 0;
                for instance in instances {
                    match client.get_command_invocation(command, instance).await {
                        Ok(invocation) if !invocation.status.is_in_flight() => {}
                        Ok(_) => running += 1,
                        // Invocations appear shortly after the command is accepted.
                        Err(e) if e.code() == Some(INVOCATION_DOES_NOT_EXIST) => running += 1,
                        Err(e) => return Err(e),
                    }
                }
                if running == 0 {
                    return Ok(Poll::Done);
                }
                if progress.should_report(attempt) {
                    logger.info(
                        &format!(
                            "Command {} still running on {}/{} instances",
                            command,
                            running,
                            instances.len()
                        ),
                        &EventContext::new()
                            .with("command", command)
                            .with("attempt", attempt.number),
                    );
                }
                Ok(Poll::Continue)
            })
            .await;

        match result {
            Ok(()) => {
                let mut invocations = Vec::with_capacity(instances.len());
                for instance in instances {
                    invocations.push(self.client.get_command_invocation(command, instance).await?);
                }
                Ok(Convergence::Settled(invocations))
            }
            Err(WaitError::Timeout { attempts }) => Ok(Convergence::TimedOut { attempts }),
            Err(WaitError::Predicate(e)) => Err(e),
        }
    }
}

/// `Ok` when every invocation succeeded, otherwise one line per failed instance.
pub fn check_invocations(invocations: &[CommandInvocation]) -> Result<(), String> {
    let failed: Vec<String> = invocations
        .iter()
        .filter(|i| i.status != InvocationStatus::Success)
        .map(|i| {
            let detail = i.stderr.trim().lines().last().unwrap_or("");
            if detail.is_empty() {
                format!("{}: {}", i.instance_id, i.status)
            } else {
                format!("{}: {} ({})", i.instance_id, i.status, detail)
            }
        })
        .collect();

    if failed.is_empty() {
        Ok(())
    } else {
        Err(format!("command failed on {}", failed.join("; ")))
    }
}
