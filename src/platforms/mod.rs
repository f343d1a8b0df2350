// ABOUTME: Platform pipelines: maps each Platform to its configured set of steps.
// ABOUTME: Shared step plumbing (services, failure sorting, command helpers) lives here.

/// Implement [`PlatformStep`](crate::pipeline::PlatformStep) for a type with an
/// inherent `async fn run(&self, StepContext) -> StepResult<StepOutcome>`.
macro_rules! platform_step {
    ($ty:ident, $name:literal) => {
        #[async_trait::async_trait]
        impl $crate::pipeline::PlatformStep for $ty {
            fn name(&self) -> &'static str {
                $name
            }

            async fn invoke(
                &self,
                ctx: $crate::pipeline::StepContext<'_>,
            ) -> Result<$crate::pipeline::StepOutcome, $crate::pipeline::StepError> {
                $crate::platforms::finish(self.run(ctx).await)
            }
        }
    };
}

mod beanstalk;
mod codedeploy;
mod docker;
mod elb;
mod export;
mod hooks;
mod package;
mod rsync;
mod s3;
mod script;
mod ssm;

pub use docker::{DockerOperation, DockerTarget};
pub use export::ExportStep;
pub use hooks::{Hook, HookStep};

use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::aws::{AwsClientProvider, AwsError, SwapError};
use crate::config::{SshSettings, WaitersConfig};
use crate::exec::{CommandExecutor, CommandOutput, ExecError, RemoteConnector, shell_quote};
use crate::job::Platform;
use crate::pipeline::{
    Artifact, Pipeline, PipelineError, StepContext, StepError, StepOutcome,
};

/// Collaborators the platform steps are built from.
#[derive(Clone)]
pub struct Services {
    pub local: Arc<dyn CommandExecutor>,
    pub connector: Arc<dyn RemoteConnector>,
    pub aws: Option<Arc<dyn AwsClientProvider>>,
    pub waiters: WaitersConfig,
    pub ssh: SshSettings,
    /// Used when a job doesn't name a region.
    pub region: Option<String>,
}

impl Services {
    pub fn new(local: Arc<dyn CommandExecutor>, connector: Arc<dyn RemoteConnector>) -> Self {
        Self {
            local,
            connector,
            aws: None,
            waiters: WaitersConfig::default(),
            ssh: SshSettings::default(),
            region: None,
        }
    }

    pub fn with_aws(mut self, provider: Arc<dyn AwsClientProvider>) -> Self {
        self.aws = Some(provider);
        self
    }

    pub fn with_waiters(mut self, waiters: WaitersConfig) -> Self {
        self.waiters = waiters;
        self
    }

    pub fn with_ssh(mut self, ssh: SshSettings) -> Self {
        self.ssh = ssh;
        self
    }

    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    pub(crate) fn aws_access(&self) -> AwsAccess {
        AwsAccess {
            provider: self.aws.clone(),
            default_region: self.region.clone(),
        }
    }
}

/// Assemble the pipeline for `platform`.
pub fn build_pipeline(platform: Platform, services: &Services) -> Result<Pipeline, PipelineError> {
    match platform {
        Platform::Docker => docker::pipeline(services),
        Platform::Rsync => rsync::pipeline(services),
        Platform::Script => script::pipeline(services),
        Platform::S3 => s3::pipeline(services),
        Platform::CodeDeploy => codedeploy::pipeline(services),
        Platform::ElasticBeanstalk => beanstalk::pipeline(services),
        Platform::Elb => elb::pipeline(services),
        Platform::Ssm => ssm::pipeline(services),
    }
}

/// Why a step stopped early.
#[derive(Debug)]
pub(crate) enum Halt {
    /// Expected failure; becomes a failed outcome.
    Failed(String),
    /// Unexpected; propagates out of the pipeline.
    Error(StepError),
}

pub(crate) type StepResult<T> = Result<T, Halt>;

impl Halt {
    pub(crate) fn failed(reason: impl Into<String>) -> Self {
        Halt::Failed(reason.into())
    }
}

impl From<StepError> for Halt {
    fn from(e: StepError) -> Self {
        Halt::Error(e)
    }
}

impl From<AwsError> for Halt {
    fn from(e: AwsError) -> Self {
        if e.is_expected() {
            tracing::warn!("AWS call failed: {}", e);
            Halt::Failed(e.to_string())
        } else {
            Halt::Error(StepError::Aws(e))
        }
    }
}

impl From<SwapError> for Halt {
    fn from(e: SwapError) -> Self {
        match e {
            SwapError::Aws(e) => Halt::from(e),
            other => Halt::Failed(other.to_string()),
        }
    }
}

impl From<ExecError> for Halt {
    fn from(e: ExecError) -> Self {
        match e {
            ExecError::Closed => Halt::Error(StepError::Exec(e)),
            other => Halt::Failed(other.to_string()),
        }
    }
}

/// Turn a step body's result into what the runner expects.
pub(crate) fn finish(result: StepResult<StepOutcome>) -> Result<StepOutcome, StepError> {
    match result {
        Ok(outcome) => Ok(outcome),
        Err(Halt::Failed(reason)) => Ok(StepOutcome::failed(reason)),
        Err(Halt::Error(e)) => Err(e),
    }
}

/// Decode the job's platform parameters, logging why they don't fit.
pub(crate) fn parameters<T: DeserializeOwned>(ctx: &StepContext<'_>) -> Option<T> {
    match ctx.execution.parameters::<T>() {
        Ok(params) => Some(params),
        Err(e) => {
            ctx.info(&format!(
                "Invalid {} parameters: {}",
                ctx.execution.platform(),
                e
            ));
            None
        }
    }
}

/// Client provider and region, resolved at configure time.
#[derive(Clone)]
pub(crate) struct AwsAccess {
    provider: Option<Arc<dyn AwsClientProvider>>,
    default_region: Option<String>,
}

impl AwsAccess {
    /// Provider and region for this job, or `None` with the reason logged.
    pub(crate) fn resolve(
        &self,
        ctx: &StepContext<'_>,
        region: Option<&str>,
    ) -> Option<(Arc<dyn AwsClientProvider>, String)> {
        let Some(provider) = self.provider.clone() else {
            ctx.info("No AWS client provider is available");
            return None;
        };
        match region.or(self.default_region.as_deref()) {
            Some(region) => Some((provider, region.to_string())),
            None => {
                ctx.info("No AWS region configured");
                None
            }
        }
    }
}

/// Unwrap a client from the provider. Expected errors mean "not configured".
pub(crate) fn client<T>(
    ctx: &StepContext<'_>,
    result: Result<T, AwsError>,
) -> Result<Option<T>, StepError> {
    match result {
        Ok(client) => Ok(Some(client)),
        Err(e) if e.is_expected() => {
            ctx.info(&format!("AWS client unavailable: {}", e));
            Ok(None)
        }
        Err(e) => Err(StepError::Aws(e)),
    }
}

/// Directory the deploy stages work from: the exported directory when there
/// is one, the workspace otherwise.
pub(crate) fn staged_dir(ctx: &StepContext<'_>) -> PathBuf {
    match ctx.state.exported() {
        Some(Artifact::Directory(dir)) => dir.clone(),
        _ => ctx.execution.workspace().to_path_buf(),
    }
}

pub(crate) fn in_dir(dir: &str, command: &str) -> String {
    format!("cd {} && {}", shell_quote(dir), command)
}

pub(crate) fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Run one command, failing the step when it exits non-zero.
pub(crate) async fn run_checked(
    executor: &dyn CommandExecutor,
    command: &str,
    env: &HashMap<String, String>,
    what: &str,
) -> StepResult<CommandOutput> {
    let output = executor.run(command, env).await?;
    if !output.stdout.trim().is_empty() {
        tracing::debug!("{} output:\n{}", what, output.stdout.trim_end());
    }
    if output.success() {
        Ok(output)
    } else {
        Err(Halt::failed(format!("{} {}", what, output.failure_summary())))
    }
}

/// Run user commands in order in `dir`, stopping at the first failure.
pub(crate) async fn run_commands(
    ctx: &StepContext<'_>,
    executor: &dyn CommandExecutor,
    dir: &str,
    commands: &[String],
) -> StepResult<()> {
    let env = ctx.execution.hook_env();
    for command in commands {
        ctx.info(&format!("Running `{}` on {}", command, executor.target()));
        run_checked(executor, &in_dir(dir, command), &env, &format!("`{}`", command)).await?;
    }
    Ok(())
}

/// Job id reduced to characters safe in container names and file names.
pub(crate) fn safe_name(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect()
}
