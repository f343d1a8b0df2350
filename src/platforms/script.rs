// ABOUTME: Script deploy platform: the job's deploy commands run on the agent host.
// ABOUTME: Commands run in the exported directory with the HAL_* environment.

use async_trait::async_trait;
use std::sync::Arc;

use super::{ExportStep, Hook, HookStep, Services, StepResult, path_str, run_commands, staged_dir};
use crate::exec::CommandExecutor;
use crate::pipeline::{
    ConfigureStep, Configurator, DeploymentRecord, Pipeline, PipelineError, PipelineKind,
    PlatformConfig, Stage, StepContext, StepError, StepOutcome, StepOutput,
};

struct ScriptConfigurator;

/// Marker config; scripts need nothing beyond the job's commands.
#[derive(Debug)]
struct ScriptTarget;

#[async_trait]
impl Configurator for ScriptConfigurator {
    async fn configure(&self, ctx: StepContext<'_>) -> Result<Option<PlatformConfig>, StepError> {
        if ctx.execution.commands().deploy.is_empty() {
            ctx.info("No deploy commands configured");
            return Ok(None);
        }
        Ok(Some(PlatformConfig::new("script", ScriptTarget)))
    }
}

struct ScriptDeploy {
    local: Arc<dyn CommandExecutor>,
}

impl ScriptDeploy {
    async fn run(&self, ctx: StepContext<'_>) -> StepResult<StepOutcome> {
        let commands = &ctx.execution.commands().deploy;
        let dir = path_str(&staged_dir(&ctx));
        run_commands(&ctx, self.local.as_ref(), &dir, commands).await?;
        Ok(StepOutcome::produced(StepOutput::Deployed(
            DeploymentRecord::Script {
                commands: commands.len(),
            },
        )))
    }
}

platform_step!(ScriptDeploy, "script");

pub(super) fn pipeline(services: &Services) -> Result<Pipeline, PipelineError> {
    let local = &services.local;
    Pipeline::builder(PipelineKind::Deploy)
        .step(Stage::Configure, ConfigureStep(ScriptConfigurator))
        .step(Stage::Export, ExportStep)
        .step(
            Stage::BuildTransform,
            HookStep::local(Hook::BuildTransform, Arc::clone(local)),
        )
        .step(
            Stage::BeforeDeploy,
            HookStep::local(Hook::BeforeDeploy, Arc::clone(local)),
        )
        .step(
            Stage::Deploy,
            ScriptDeploy {
                local: Arc::clone(local),
            },
        )
        .step(
            Stage::AfterDeploy,
            HookStep::local(Hook::AfterDeploy, Arc::clone(local)),
        )
        .build()
}
