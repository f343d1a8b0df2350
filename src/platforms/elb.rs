// ABOUTME: ELB deploy platform: blue/green swap of tagged instances between two load balancers.
// ABOUTME: Deploy plans and swaps; verify checks both load balancers report the new members healthy.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::{
    AwsAccess, ExportStep, Halt, Hook, HookStep, Services, StepResult, client, parameters,
};
use crate::aws::{BlueGreenSwap, SwapRequest};
use crate::config::WaiterConfig;
use crate::pipeline::{
    ConfigureStep, Configurator, DeploymentRecord, Pipeline, PipelineError, PipelineKind,
    PlatformConfig, Stage, StepContext, StepError, StepOutcome, StepOutput,
};
use crate::types::TagFilters;

#[derive(Debug, Deserialize)]
struct ElbParams {
    active_lb: String,
    passive_lb: String,
    /// `key` or `key=value`, comma-separated.
    tags: TagFilters,
    #[serde(default)]
    region: Option<String>,
}

pub struct ElbTarget {
    request: SwapRequest,
    swap: BlueGreenSwap,
}

struct ElbConfigurator {
    aws: AwsAccess,
    waiter: WaiterConfig,
}

#[async_trait]
impl Configurator for ElbConfigurator {
    async fn configure(&self, ctx: StepContext<'_>) -> Result<Option<PlatformConfig>, StepError> {
        let Some(params) = parameters::<ElbParams>(&ctx) else {
            return Ok(None);
        };
        if params.active_lb == params.passive_lb {
            ctx.info("Active and passive load balancers must differ");
            return Ok(None);
        }
        let Some((provider, region)) = self.aws.resolve(&ctx, params.region.as_deref()) else {
            return Ok(None);
        };
        let Some(ec2) = client(&ctx, provider.ec2(&region))? else {
            return Ok(None);
        };
        let Some(elb) = client(&ctx, provider.elb(&region))? else {
            return Ok(None);
        };

        Ok(Some(PlatformConfig::new(
            "elb",
            ElbTarget {
                request: SwapRequest {
                    filters: params.tags,
                    active_lb: params.active_lb,
                    passive_lb: params.passive_lb,
                },
                swap: BlueGreenSwap::new(ec2, elb, self.waiter.waiter(), self.waiter.progress()),
            },
        )))
    }
}

struct ElbDeploy;

impl ElbDeploy {
    async fn run(&self, ctx: StepContext<'_>) -> StepResult<StepOutcome> {
        let target = ctx.platform::<ElbTarget>()?;
        let plan = target.swap.plan(&target.request, ctx.logger).await?;
        ctx.info(&format!("Swap plan: {}", plan));
        target.swap.swap_all(&plan, ctx.logger).await?;
        Ok(StepOutcome::produced(StepOutput::Deployed(
            DeploymentRecord::Swap(plan),
        )))
    }
}

platform_step!(ElbDeploy, "elb swap");

struct ElbVerify;

impl ElbVerify {
    async fn run(&self, ctx: StepContext<'_>) -> StepResult<StepOutcome> {
        let target = ctx.platform::<ElbTarget>()?;
        let Some(DeploymentRecord::Swap(plan)) = ctx.state.deployment() else {
            return Err(Halt::Error(StepError::MissingInput("swap plan")));
        };
        target.swap.verify(plan).await?;
        ctx.info("Both load balancers report their new members in service");
        Ok(StepOutcome::ok())
    }
}

platform_step!(ElbVerify, "elb health");

pub(super) fn pipeline(services: &Services) -> Result<Pipeline, PipelineError> {
    let local = &services.local;
    Pipeline::builder(PipelineKind::Deploy)
        .step(
            Stage::Configure,
            ConfigureStep(ElbConfigurator {
                aws: services.aws_access(),
                waiter: services.waiters.elb,
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
        .step(Stage::Deploy, ElbDeploy)
        .step(Stage::Verify, ElbVerify)
        .step(
            Stage::AfterDeploy,
            HookStep::local(Hook::AfterDeploy, Arc::clone(local)),
        )
        .build()
}
