// ABOUTME: S3 deploy platform: packs the exported directory and uploads the bundle.
// ABOUTME: Optionally deletes the upload again when a later stage fails.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::package::{BundleParams, archive, upload};
use super::{AwsAccess, ExportStep, Hook, HookStep, Services, StepResult, client, parameters};
use crate::aws::S3Api;
use crate::exec::CommandExecutor;
use crate::pipeline::{
    ConfigureStep, Configurator, DeploymentRecord, Pipeline, PipelineError, PipelineKind,
    PlatformConfig, Stage, StepContext, StepError, StepOutcome, StepOutput,
};

#[derive(Debug, Deserialize)]
struct S3Params {
    #[serde(flatten)]
    bundle: BundleParams,
    #[serde(default)]
    region: Option<String>,
}

pub struct S3Target {
    bundle: BundleParams,
    s3: Arc<dyn S3Api>,
}

struct S3Configurator {
    aws: AwsAccess,
}

#[async_trait]
impl Configurator for S3Configurator {
    async fn configure(&self, ctx: StepContext<'_>) -> Result<Option<PlatformConfig>, StepError> {
        let Some(params) = parameters::<S3Params>(&ctx) else {
            return Ok(None);
        };
        let Some((provider, region)) = self.aws.resolve(&ctx, params.region.as_deref()) else {
            return Ok(None);
        };
        let Some(s3) = client(&ctx, provider.s3(&region))? else {
            return Ok(None);
        };

        Ok(Some(PlatformConfig::new(
            "s3",
            S3Target {
                bundle: params.bundle,
                s3,
            },
        )))
    }
}

struct S3Deploy {
    local: Arc<dyn CommandExecutor>,
}

impl S3Deploy {
    async fn run(&self, ctx: StepContext<'_>) -> StepResult<StepOutcome> {
        let target = ctx.platform::<S3Target>()?;
        let location = target.bundle.location(ctx.execution.job().id.as_str());

        let bundle = archive(&ctx, self.local.as_ref()).await?;
        upload(
            &ctx,
            &target.s3,
            &bundle,
            &location,
            target.bundle.cleanup_on_failure,
        )
        .await?;

        Ok(StepOutcome::produced(StepOutput::Deployed(
            DeploymentRecord::Upload(location),
        )))
    }
}

platform_step!(S3Deploy, "s3 upload");

pub(super) fn pipeline(services: &Services) -> Result<Pipeline, PipelineError> {
    let local = &services.local;
    Pipeline::builder(PipelineKind::Deploy)
        .step(
            Stage::Configure,
            ConfigureStep(S3Configurator {
                aws: services.aws_access(),
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
            S3Deploy {
                local: Arc::clone(local),
            },
        )
        .step(
            Stage::AfterDeploy,
            HookStep::local(Hook::AfterDeploy, Arc::clone(local)),
        )
        .build()
}
