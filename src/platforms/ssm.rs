// ABOUTME: SSM deploy platform: runs the job's deploy commands on tagged instances via Run Command.
// ABOUTME: Waits for every invocation to finish; verify requires all of them to succeed.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::{
    AwsAccess, ExportStep, Halt, Hook, HookStep, Services, StepResult, client, parameters,
};
use crate::aws::types::SendCommandRequest;
use crate::aws::{CommandWatcher, Convergence, Ec2Api, SsmApi, check_invocations};
use crate::config::WaiterConfig;
use crate::pipeline::{
    ConfigureStep, Configurator, DeploymentRecord, Pipeline, PipelineError, PipelineKind,
    PlatformConfig, Stage, StepContext, StepError, StepOutcome, StepOutput,
};
use crate::types::TagFilters;

#[derive(Debug, Deserialize)]
struct SsmParams {
    tags: TagFilters,
    #[serde(default = "default_document")]
    document: String,
    #[serde(default)]
    working_directory: Option<String>,
    #[serde(default)]
    region: Option<String>,
}

fn default_document() -> String {
    "AWS-RunShellScript".to_string()
}

pub struct SsmTarget {
    params: SsmParams,
    ec2: Arc<dyn Ec2Api>,
    ssm: Arc<dyn SsmApi>,
    watcher: CommandWatcher,
}

struct SsmConfigurator {
    aws: AwsAccess,
    waiter: WaiterConfig,
}

#[async_trait]
impl Configurator for SsmConfigurator {
    async fn configure(&self, ctx: StepContext<'_>) -> Result<Option<PlatformConfig>, StepError> {
        let Some(params) = parameters::<SsmParams>(&ctx) else {
            return Ok(None);
        };
        if ctx.execution.commands().deploy.is_empty() {
            ctx.info("No deploy commands configured");
            return Ok(None);
        }
        let Some((provider, region)) = self.aws.resolve(&ctx, params.region.as_deref()) else {
            return Ok(None);
        };
        let Some(ec2) = client(&ctx, provider.ec2(&region))? else {
            return Ok(None);
        };
        let Some(ssm) = client(&ctx, provider.ssm(&region))? else {
            return Ok(None);
        };

        let watcher =
            CommandWatcher::new(Arc::clone(&ssm), self.waiter.waiter(), self.waiter.progress());
        Ok(Some(PlatformConfig::new(
            "ssm",
            SsmTarget {
                params,
                ec2,
                ssm,
                watcher,
            },
        )))
    }
}

struct SsmDeploy;

impl SsmDeploy {
    async fn run(&self, ctx: StepContext<'_>) -> StepResult<StepOutcome> {
        let target = ctx.platform::<SsmTarget>()?;
        let params = &target.params;

        let instances = target.ec2.describe_running_instances(&params.tags).await?;
        if instances.is_empty() {
            return Err(Halt::failed(format!(
                "no running instances match {}",
                params.tags
            )));
        }

        let command = target
            .ssm
            .send_command(&SendCommandRequest {
                instance_ids: instances.clone(),
                document: params.document.clone(),
                commands: ctx.execution.commands().deploy.clone(),
                working_directory: params.working_directory.clone(),
                comment: format!("hal {}", ctx.execution.job().id),
            })
            .await?;
        ctx.info(&format!(
            "Sent command {} to {} instances",
            command,
            instances.len()
        ));

        match target
            .watcher
            .wait_for(&command, &instances, ctx.logger)
            .await?
        {
            Convergence::Settled(invocations) => Ok(StepOutcome::produced(StepOutput::Deployed(
                DeploymentRecord::Commands(invocations),
            ))),
            Convergence::TimedOut { attempts } => Err(Halt::failed(format!(
                "waited {} times for command {} but it is still running; outcome unknown",
                attempts, command
            ))),
        }
    }
}

platform_step!(SsmDeploy, "ssm run command");

struct SsmVerify;

impl SsmVerify {
    async fn run(&self, ctx: StepContext<'_>) -> StepResult<StepOutcome> {
        let Some(DeploymentRecord::Commands(invocations)) = ctx.state.deployment() else {
            return Err(Halt::Error(StepError::MissingInput("ssm invocations")));
        };
        check_invocations(invocations).map_err(Halt::Failed)?;
        ctx.info(&format!(
            "Command succeeded on {} instances",
            invocations.len()
        ));
        Ok(StepOutcome::ok())
    }
}

platform_step!(SsmVerify, "ssm status");

pub(super) fn pipeline(services: &Services) -> Result<Pipeline, PipelineError> {
    let local = &services.local;
    Pipeline::builder(PipelineKind::Deploy)
        .step(
            Stage::Configure,
            ConfigureStep(SsmConfigurator {
                aws: services.aws_access(),
                waiter: services.waiters.ssm,
            }),
        )
        .step(Stage::Export, ExportStep)
        .step(
            Stage::BuildTransform,
            HookStep::local(Hook::BuildTransform, Arc::clone(local)),
        )
        .step(
            Stage::BeforeDeploy,
            HookStep::local(Hook::BeforeDeploy, Arc::clone(local)),
        )
        .step(Stage::Deploy, SsmDeploy)
        .step(Stage::Verify, SsmVerify)
        .step(
            Stage::AfterDeploy,
            HookStep::local(Hook::AfterDeploy, Arc::clone(local)),
        )
        .build()
}
