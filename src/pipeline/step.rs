// ABOUTME: The uniform step contract every pipeline stage implements.
// ABOUTME: Defines PlatformStep, the per-invocation context, outcomes, and the configure adapter.

use async_trait::async_trait;
use std::any::Any;

use super::cleanup::CleanupRegistry;
use super::stage::Stage;
use super::state::{PipelineState, PlatformConfig, StepOutput};
use crate::aws::AwsError;
use crate::events::{EventContext, EventLogger};
use crate::exec::ExecError;
use crate::job::JobExecution;

/// Unexpected step failure. Expected remote failures are reported as a
/// failed [`StepOutcome`] instead.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// An earlier stage should have produced this. The pipeline is miswired.
    #[error("missing input: {0}")]
    MissingInput(&'static str),

    #[error("invalid AWS request: {0}")]
    Aws(AwsError),

    #[error("command execution failed: {0}")]
    Exec(#[from] ExecError),

    #[error("{0}")]
    Internal(String),
}

/// What a step reports back to the runner.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    success: bool,
    reason: Option<String>,
    output: Option<StepOutput>,
}

impl StepOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            reason: None,
            output: None,
        }
    }

    pub fn produced(output: StepOutput) -> Self {
        Self {
            success: true,
            reason: None,
            output: Some(output),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
            output: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn output(&self) -> Option<&StepOutput> {
        self.output.as_ref()
    }

    pub(crate) fn into_output(self) -> Option<StepOutput> {
        self.output
    }
}

/// Everything a step can see while it runs.
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    pub execution: &'a JobExecution,
    pub state: &'a PipelineState,
    pub logger: &'a dyn EventLogger,
    pub cleanup: &'a CleanupRegistry,
    pub stage: Stage,
}

impl<'a> StepContext<'a> {
    /// The platform config as `T`.
    pub fn platform<T: Any>(&self) -> Result<&'a T, StepError> {
        self.state
            .platform::<T>()
            .ok_or(StepError::MissingInput("platform config"))
    }

    /// Event context naming the stage and platform.
    pub fn event_context(&self) -> EventContext {
        EventContext::new()
            .with("stage", self.stage)
            .with("platform", self.execution.platform())
    }

    pub fn info(&self, message: &str) {
        self.logger.info(message, &self.event_context());
    }
}

/// A single unit of pipeline work.
#[async_trait]
pub trait PlatformStep: Send + Sync {
    /// Short name shown in plans and logs.
    fn name(&self) -> &'static str;

    async fn invoke(&self, ctx: StepContext<'_>) -> Result<StepOutcome, StepError>;
}

/// Resolves a job into its platform config. `None` means "not configured".
#[async_trait]
pub trait Configurator: Send + Sync {
    async fn configure(&self, ctx: StepContext<'_>) -> Result<Option<PlatformConfig>, StepError>;
}

/// Adapts a [`Configurator`] into the configure stage step.
pub struct ConfigureStep<C>(pub C);

#[async_trait]
impl<C: Configurator> PlatformStep for ConfigureStep<C> {
    fn name(&self) -> &'static str {
        "configure"
    }

    async fn invoke(&self, ctx: StepContext<'_>) -> Result<StepOutcome, StepError> {
        match self.0.configure(ctx).await? {
            Some(config) => Ok(StepOutcome::produced(StepOutput::Configured(config))),
            None => Ok(StepOutcome::failed("platform not configured")),
        }
    }
}
