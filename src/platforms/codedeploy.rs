// ABOUTME: CodeDeploy deploy platform: uploads a revision bundle and waits for the deployment.
// ABOUTME: Verify checks the settled deployment actually succeeded.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::package::{BundleParams, archive, upload};
use super::{
    AwsAccess, ExportStep, Halt, Hook, HookStep, Services, StepResult, client, parameters,
};
use crate::aws::types::CreateDeploymentRequest;
use crate::aws::{CodeDeployApi, Convergence, DeploymentWatcher, S3Api, check_deployment};
use crate::config::WaiterConfig;
use crate::exec::CommandExecutor;
use crate::pipeline::{
    ConfigureStep, Configurator, DeploymentRecord, Pipeline, PipelineError, PipelineKind,
    PlatformConfig, Stage, StepContext, StepError, StepOutcome, StepOutput,
};

#[derive(Debug, Deserialize)]
struct CodeDeployParams {
    application: String,
    deployment_group: String,
    #[serde(default = "default_deployment_config")]
    deployment_config: String,
    #[serde(flatten)]
    bundle: BundleParams,
    #[serde(default)]
    region: Option<String>,
}

fn default_deployment_config() -> String {
    "CodeDeployDefault.OneAtATime".to_string()
}

pub struct CodeDeployTarget {
    params: CodeDeployParams,
    s3: Arc<dyn S3Api>,
    codedeploy: Arc<dyn CodeDeployApi>,
    watcher: DeploymentWatcher,
}

struct CodeDeployConfigurator {
    aws: AwsAccess,
    waiter: WaiterConfig,
}

#[async_trait]
impl Configurator for CodeDeployConfigurator {
    async fn configure(&self, ctx: StepContext<'_>) -> Result<Option<PlatformConfig>, StepError> {
        let Some(params) = parameters::<CodeDeployParams>(&ctx) else {
            return Ok(None);
        };
        let Some((provider, region)) = self.aws.resolve(&ctx, params.region.as_deref()) else {
            return Ok(None);
        };
        let Some(s3) = client(&ctx, provider.s3(&region))? else {
            return Ok(None);
        };
        let Some(codedeploy) = client(&ctx, provider.codedeploy(&region))? else {
            return Ok(None);
        };

        let watcher = DeploymentWatcher::new(
            Arc::clone(&codedeploy),
            self.waiter.waiter(),
            self.waiter.progress(),
        );
        Ok(Some(PlatformConfig::new(
            "codedeploy",
            CodeDeployTarget {
                params,
                s3,
                codedeploy,
                watcher,
            },
        )))
    }
}

struct CodeDeployDeploy {
    local: Arc<dyn CommandExecutor>,
}

impl CodeDeployDeploy {
    async fn run(&self, ctx: StepContext<'_>) -> StepResult<StepOutcome> {
        let target = ctx.platform::<CodeDeployTarget>()?;
        let params = &target.params;
        let job = ctx.execution.job();
        let revision = params.bundle.location(job.id.as_str());

        let bundle = archive(&ctx, self.local.as_ref()).await?;
        upload(
            &ctx,
            &target.s3,
            &bundle,
            &revision,
            params.bundle.cleanup_on_failure,
        )
        .await?;

        let id = target
            .codedeploy
            .create_deployment(&CreateDeploymentRequest {
                application: params.application.clone(),
                deployment_group: params.deployment_group.clone(),
                deployment_config: params.deployment_config.clone(),
                revision,
                description: format!("hal {} ({})", job.id, job.reference.as_deref().unwrap_or("-")),
            })
            .await?;
        ctx.info(&format!(
            "Created deployment {} for {}/{}",
            id, params.application, params.deployment_group
        ));

        match target.watcher.wait_for(&id, ctx.logger).await? {
            Convergence::Settled(info) => Ok(StepOutcome::produced(StepOutput::Deployed(
                DeploymentRecord::CodeDeploy(info),
            ))),
            Convergence::TimedOut { attempts } => Err(Halt::failed(format!(
                "waited {} times for deployment {} but it is still running; outcome unknown",
                attempts, id
            ))),
        }
    }
}

platform_step!(CodeDeployDeploy, "codedeploy");

struct CodeDeployVerify;

impl CodeDeployVerify {
    async fn run(&self, ctx: StepContext<'_>) -> StepResult<StepOutcome> {
        let Some(DeploymentRecord::CodeDeploy(info)) = ctx.state.deployment() else {
            return Err(Halt::Error(StepError::MissingInput("codedeploy deployment")));
        };
        check_deployment(info).map_err(Halt::Failed)?;
        ctx.info(&format!("Deployment {} succeeded ({})", info.id, info.overview));
        Ok(StepOutcome::ok())
    }
}

platform_step!(CodeDeployVerify, "codedeploy status");

pub(super) fn pipeline(services: &Services) -> Result<Pipeline, PipelineError> {
    let local = &services.local;
    Pipeline::builder(PipelineKind::Deploy)
        .step(
            Stage::Configure,
            ConfigureStep(CodeDeployConfigurator {
                aws: services.aws_access(),
                waiter: services.waiters.codedeploy,
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
        .step(
            Stage::Deploy,
            CodeDeployDeploy {
                local: Arc::clone(local),
            },
        )
        .step(Stage::Verify, CodeDeployVerify)
        .step(
            Stage::AfterDeploy,
            HookStep::local(Hook::AfterDeploy, Arc::clone(local)),
        )
        .build()
}
