// ABOUTME: Elastic Beanstalk environment convergence.
// ABOUTME: Polls an environment while it is updating or launching, then re-reads its final state.

use std::sync::Arc;

use super::Convergence;
use super::clients::BeanstalkApi;
use super::error::AwsError;
use super::types::{EnvironmentDescription, EnvironmentHealth, EnvironmentStatus};
use crate::events::{EventContext, EventLogger};
use crate::waiter::{Poll, Progress, WaitError, Waiter};

pub struct EnvironmentWatcher {
    client: Arc<dyn BeanstalkApi>,
    waiter: Waiter,
    progress: Progress,
}

impl EnvironmentWatcher {
    pub fn new(client: Arc<dyn BeanstalkApi>, waiter: Waiter, progress: Progress) -> Self {
        Self {
            client,
            waiter,
            progress,
        }
    }

    pub async fn wait_for(
        &self,
        environment: &str,
        logger: &dyn EventLogger,
    ) -> Result<Convergence<EnvironmentDescription>, AwsError> {
        let client = &self.client;
        let progress = self.progress;
        let result = self
            .waiter
            .wait(|attempt| async move {
                let env = client.describe_environment(environment).await?;
                if !env.status.is_in_flight() {
                    return Ok(Poll::Done);
                }
                if progress.should_report(attempt) {
                    logger.info(
                        &format!(
                            "Environment {} is {} (health {})",
                            environment, env.status, env.health
                        ),
                        &EventContext::new()
                            .with("environment", environment)
                            .with("attempt", attempt.number),
                    );
                }
                Ok::<_, AwsError>(Poll::Continue)
            })
            .await;

        match result {
            Ok(()) => Ok(Convergence::Settled(
                self.client.describe_environment(environment).await?,
            )),
            Err(WaitError::Timeout { attempts }) => Ok(Convergence::TimedOut { attempts }),
            Err(WaitError::Predicate(e)) => Err(e),
        }
    }
}

/// `Ok` when the environment is `Ready` and `Green`, and runs `version_label`
/// if one is given.
pub fn check_environment(
    env: &EnvironmentDescription,
    version_label: Option<&str>,
) -> Result<(), String> {
    if env.status != EnvironmentStatus::Ready || env.health != EnvironmentHealth::Green {
        return Err(format!(
            "environment {} is {} with health {}",
            env.environment_id, env.status, env.health
        ));
    }
    match (version_label, env.version_label.as_deref()) {
        (Some(expected), Some(actual)) if expected != actual => Err(format!(
            "environment {} runs version {} instead of {}",
            env.environment_id, actual, expected
        )),
        _ => Ok(()),
    }
}
