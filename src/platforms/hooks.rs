// ABOUTME: User command stages: build_transform, before_deploy, and after_deploy.
// ABOUTME: Runs the job's command lists locally or on the platform's remote host with HAL_* env.

use async_trait::async_trait;
use std::sync::Arc;

use super::{StepResult, finish, path_str, run_commands, staged_dir};
use crate::exec::CommandExecutor;
use crate::job::StageCommands;
use crate::pipeline::{PipelineState, PlatformStep, Stage, StepContext, StepError, StepOutcome};

/// Which user command list a [`HookStep`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    BuildTransform,
    BeforeDeploy,
    AfterDeploy,
}

impl Hook {
    pub fn stage(&self) -> Stage {
        match self {
            Hook::BuildTransform => Stage::BuildTransform,
            Hook::BeforeDeploy => Stage::BeforeDeploy,
            Hook::AfterDeploy => Stage::AfterDeploy,
        }
    }

    pub fn commands<'a>(&self, commands: &'a StageCommands) -> &'a [String] {
        match self {
            Hook::BuildTransform => &commands.build_transform,
            Hook::BeforeDeploy => &commands.before_deploy,
            Hook::AfterDeploy => &commands.after_deploy,
        }
    }
}

/// Finds the remote host and directory hooks should run in, from the platform config.
pub type RemoteResolver = fn(&PipelineState) -> Option<(Arc<dyn CommandExecutor>, String)>;

pub struct HookStep {
    hook: Hook,
    local: Arc<dyn CommandExecutor>,
    remote: Option<RemoteResolver>,
}

impl HookStep {
    /// Run the hook on the agent host, in the exported directory.
    pub fn local(hook: Hook, local: Arc<dyn CommandExecutor>) -> Self {
        Self {
            hook,
            local,
            remote: None,
        }
    }

    /// Run the hook on the host `resolver` finds, falling back to the agent host.
    pub fn remote(hook: Hook, local: Arc<dyn CommandExecutor>, resolver: RemoteResolver) -> Self {
        Self {
            hook,
            local,
            remote: Some(resolver),
        }
    }

    async fn run(&self, ctx: StepContext<'_>) -> StepResult<StepOutcome> {
        let commands = self.hook.commands(ctx.execution.commands());
        if commands.is_empty() {
            tracing::debug!("No {} commands", self.hook.stage());
            return Ok(StepOutcome::ok());
        }

        let (executor, dir) = match self.remote.and_then(|resolve| resolve(ctx.state)) {
            Some(remote) => remote,
            None => (Arc::clone(&self.local), path_str(&staged_dir(&ctx))),
        };

        run_commands(&ctx, executor.as_ref(), &dir, commands).await?;
        Ok(StepOutcome::ok())
    }
}

#[async_trait]
impl PlatformStep for HookStep {
    fn name(&self) -> &'static str {
        self.hook.stage().name()
    }

    async fn invoke(&self, ctx: StepContext<'_>) -> Result<StepOutcome, StepError> {
        finish(self.run(ctx).await)
    }
}
