// ABOUTME: Elastic Beanstalk deploy platform: new application version, environment update, wait.
// ABOUTME: Verify requires the environment to settle Ready and Green on the new version.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::package::{BundleParams, archive, upload};
use super::{
    AwsAccess, ExportStep, Halt, Hook, HookStep, Services, StepResult, client, parameters,
};
use crate::aws::types::ApplicationVersionRequest;
use crate::aws::{BeanstalkApi, Convergence, EnvironmentWatcher, S3Api, check_environment};
use crate::config::WaiterConfig;
use crate::exec::CommandExecutor;
use crate::pipeline::{
    ConfigureStep, Configurator, DeploymentRecord, Pipeline, PipelineError, PipelineKind,
    PlatformConfig, Stage, StepContext, StepError, StepOutcome, StepOutput,
};

#[derive(Debug, Deserialize)]
struct BeanstalkParams {
    application: String,
    environment: String,
    /// Defaults to the job id.
    #[serde(default)]
    version_label: Option<String>,
    #[serde(flatten)]
    bundle: BundleParams,
    #[serde(default)]
    region: Option<String>,
}

pub struct BeanstalkTarget {
    params: BeanstalkParams,
    s3: Arc<dyn S3Api>,
    beanstalk: Arc<dyn BeanstalkApi>,
    watcher: EnvironmentWatcher,
}

struct BeanstalkConfigurator {
    aws: AwsAccess,
    waiter: WaiterConfig,
}

#[async_trait]
impl Configurator for BeanstalkConfigurator {
    async fn configure(&self, ctx: StepContext<'_>) -> Result<Option<PlatformConfig>, StepError> {
        let Some(params) = parameters::<BeanstalkParams>(&ctx) else {
            return Ok(None);
        };
        let Some((provider, region)) = self.aws.resolve(&ctx, params.region.as_deref()) else {
            return Ok(None);
        };
        let Some(s3) = client(&ctx, provider.s3(&region))? else {
            return Ok(None);
        };
        let Some(beanstalk) = client(&ctx, provider.beanstalk(&region))? else {
            return Ok(None);
        };

        let watcher = EnvironmentWatcher::new(
            Arc::clone(&beanstalk),
            self.waiter.waiter(),
            self.waiter.progress(),
        );
        Ok(Some(PlatformConfig::new(
            "elasticbeanstalk",
            BeanstalkTarget {
                params,
                s3,
                beanstalk,
                watcher,
            },
        )))
    }
}

struct BeanstalkDeploy {
    local: Arc<dyn CommandExecutor>,
}

impl BeanstalkDeploy {
    async fn run(&self, ctx: StepContext<'_>) -> StepResult<StepOutcome> {
        let target = ctx.platform::<BeanstalkTarget>()?;
        let params = &target.params;
        let job = ctx.execution.job();
        let version_label = params
            .version_label
            .clone()
            .unwrap_or_else(|| job.id.to_string());
        let source = params.bundle.location(job.id.as_str());

        let bundle = archive(&ctx, self.local.as_ref()).await?;
        upload(
            &ctx,
            &target.s3,
            &bundle,
            &source,
            params.bundle.cleanup_on_failure,
        )
        .await?;

        target
            .beanstalk
            .create_application_version(&ApplicationVersionRequest {
                application: params.application.clone(),
                version_label: version_label.clone(),
                description: format!("hal {}", job.id),
                source,
            })
            .await?;
        target
            .beanstalk
            .update_environment(&params.environment, &version_label)
            .await?;
        ctx.info(&format!(
            "Updating {} to version {}",
            params.environment, version_label
        ));

        match target.watcher.wait_for(&params.environment, ctx.logger).await? {
            Convergence::Settled(environment) => Ok(StepOutcome::produced(StepOutput::Deployed(
                DeploymentRecord::Beanstalk {
                    environment,
                    version_label,
                },
            ))),
            Convergence::TimedOut { attempts } => Err(Halt::failed(format!(
                "waited {} times for environment {} but it is still updating; outcome unknown",
                attempts, params.environment
            ))),
        }
    }
}

platform_step!(BeanstalkDeploy, "elasticbeanstalk");

struct BeanstalkVerify;

impl BeanstalkVerify {
    async fn run(&self, ctx: StepContext<'_>) -> StepResult<StepOutcome> {
        let Some(DeploymentRecord::Beanstalk {
            environment,
            version_label,
        }) = ctx.state.deployment()
        else {
            return Err(Halt::Error(StepError::MissingInput("beanstalk environment")));
        };
        check_environment(environment, Some(version_label.as_str())).map_err(Halt::Failed)?;
        ctx.info(&format!(
            "Environment {} is Ready and Green",
            environment.environment_id
        ));
        Ok(StepOutcome::ok())
    }
}

platform_step!(BeanstalkVerify, "elasticbeanstalk health");

pub(super) fn pipeline(services: &Services) -> Result<Pipeline, PipelineError> {
    let local = &services.local;
    Pipeline::builder(PipelineKind::Deploy)
        .step(
            Stage::Configure,
            ConfigureStep(BeanstalkConfigurator {
                aws: services.aws_access(),
                waiter: services.waiters.beanstalk,
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
            BeanstalkDeploy {
                local: Arc::clone(local),
            },
        )
        .step(Stage::Verify, BeanstalkVerify)
        .step(
            Stage::AfterDeploy,
            HookStep::local(Hook::AfterDeploy, Arc::clone(local)),
        )
        .build()
}
