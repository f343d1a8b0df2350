// ABOUTME: Runs a pipeline's steps in stage order and reports the result.
// ABOUTME: Handles deploy status threading, the after_deploy guarantee, and cleanup on every exit path.

use futures::FutureExt;
use serde::Serialize;
use snafu::{ResultExt, ensure};
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use super::cleanup::CleanupRegistry;
use super::error::{
    DuplicateStageSnafu, PipelineError, StageNotInPipelineSnafu, StepSnafu, UnexpectedOutputSnafu,
};
use super::stage::{PipelineKind, Stage};
use super::state::PipelineState;
use super::step::{PlatformStep, StepContext, StepError, StepOutcome};
use crate::diagnostics::{Diagnostics, Warning};
use crate::events::{EventContext, EventLogger};
use crate::job::{DeployStatus, JobExecution};

/// Overall verdict of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunResult {
    Success,
    Failure,
}

/// Summary of a finished run.
#[derive(Debug, Serialize)]
pub struct PipelineReport {
    pub kind: PipelineKind,
    pub result: RunResult,
    pub failed_stage: Option<Stage>,
    pub reason: Option<String>,
    pub deploy_status: Option<DeployStatus>,
    pub warnings: Vec<Warning>,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    #[serde(skip)]
    pub state: PipelineState,
}

impl PipelineReport {
    pub fn succeeded(&self) -> bool {
        self.result == RunResult::Success
    }
}

struct StageFailure {
    stage: Stage,
    reason: String,
}

struct StagesRun {
    state: PipelineState,
    failure: Option<StageFailure>,
}

/// An ordered set of steps for one pipeline kind.
pub struct Pipeline {
    kind: PipelineKind,
    steps: Vec<(Stage, Box<dyn PlatformStep>)>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("kind", &self.kind)
            .field("plan", &self.plan())
            .finish()
    }
}

pub struct PipelineBuilder {
    kind: PipelineKind,
    steps: Vec<(Stage, Box<dyn PlatformStep>)>,
}

impl PipelineBuilder {
    pub fn step(self, stage: Stage, step: impl PlatformStep + 'static) -> Self {
        self.boxed_step(stage, Box::new(step))
    }

    pub fn boxed_step(mut self, stage: Stage, step: Box<dyn PlatformStep>) -> Self {
        self.steps.push((stage, step));
        self
    }

    /// Check every step belongs to this kind and order them by stage.
    pub fn build(mut self) -> Result<Pipeline, PipelineError> {
        let kind = self.kind;
        for (index, (stage, _)) in self.steps.iter().enumerate() {
            let stage = *stage;
            ensure!(kind.contains(stage), StageNotInPipelineSnafu { stage, kind });
            ensure!(
                !self.steps[..index].iter().any(|(s, _)| *s == stage),
                DuplicateStageSnafu { stage }
            );
        }

        let order = |stage: &Stage| kind.stages().iter().position(|s| s == stage);
        self.steps.sort_by_key(|(stage, _)| order(stage));

        Ok(Pipeline {
            kind,
            steps: self.steps,
        })
    }
}

impl Pipeline {
    pub fn builder(kind: PipelineKind) -> PipelineBuilder {
        PipelineBuilder {
            kind,
            steps: Vec::new(),
        }
    }

    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    /// Stages that have a step, in run order, with the step name.
    pub fn plan(&self) -> Vec<(Stage, &'static str)> {
        self.steps
            .iter()
            .map(|(stage, step)| (*stage, step.name()))
            .collect()
    }

    fn step(&self, stage: Stage) -> Option<&dyn PlatformStep> {
        self.steps
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, step)| step.as_ref())
    }

    /// Run every stage in order.
    ///
    /// Expected failures end up in the report; only unexpected step errors
    /// and miswired outputs are returned as `Err`. Either way the failing
    /// stage gets one failure event, and a failed deploy or verify still runs
    /// `after_deploy`. Registered cleanup runs before this returns, and
    /// before a panic resumes.
    pub async fn run(
        &self,
        execution: &mut JobExecution,
        logger: &dyn EventLogger,
    ) -> Result<PipelineReport, PipelineError> {
        let started = Instant::now();
        let cleanup = CleanupRegistry::new();
        let mut diagnostics = Diagnostics::default();

        let run = AssertUnwindSafe(self.run_stages(execution, logger, &cleanup, &mut diagnostics))
            .catch_unwind()
            .await;

        let failed = !matches!(&run, Ok(Ok(stages)) if stages.failure.is_none());
        cleanup.drain(failed, &mut diagnostics).await;

        let stages = match run {
            Ok(result) => result?,
            Err(panic) => std::panic::resume_unwind(panic),
        };

        let (failed_stage, reason) = match stages.failure {
            Some(failure) => (Some(failure.stage), Some(failure.reason)),
            None => (None, None),
        };
        let result = if failed_stage.is_some() {
            RunResult::Failure
        } else {
            logger.success(
                &format!("{} pipeline finished", self.kind),
                &EventContext::new().with("platform", execution.platform()),
            );
            RunResult::Success
        };

        Ok(PipelineReport {
            kind: self.kind,
            result,
            failed_stage,
            reason,
            deploy_status: execution.deploy_status(),
            warnings: diagnostics.into_warnings(),
            duration: started.elapsed(),
            state: stages.state,
        })
    }

    async fn run_stages(
        &self,
        execution: &mut JobExecution,
        logger: &dyn EventLogger,
        cleanup: &CleanupRegistry,
        diagnostics: &mut Diagnostics,
    ) -> Result<StagesRun, PipelineError> {
        let deploying = self.kind == PipelineKind::Deploy;
        let mut state = PipelineState::default();
        let mut failure: Option<StageFailure> = None;
        let mut escaped: Option<PipelineError> = None;

        if deploying {
            execution.set_deploy_status(DeployStatus::Pending);
        }

        for &stage in self.kind.stages() {
            if let Some(failed) = &failure {
                if stage != Stage::AfterDeploy || !failed.stage.reaches_after_deploy() {
                    continue;
                }
            }

            match stage {
                Stage::Deploy => execution.set_deploy_status(DeployStatus::Running),
                Stage::AfterDeploy if failure.is_some() => {
                    execution.set_deploy_status(DeployStatus::Failure)
                }
                Stage::AfterDeploy => execution.set_deploy_status(DeployStatus::Success),
                _ => {}
            }

            let context = EventContext::new()
                .with("stage", stage)
                .with("platform", execution.platform());

            let verdict = match self.step(stage) {
                Some(step) => {
                    logger.info(&format!("Starting {}", step.name()), &context);
                    let ctx = StepContext {
                        execution: &*execution,
                        state: &state,
                        logger,
                        cleanup,
                        stage,
                    };
                    let result = step.invoke(ctx).await;
                    match Self::apply(stage, result, &mut state) {
                        Ok(verdict) => verdict,
                        Err(error) => {
                            // Report it like any failure, surface it once the run settles.
                            let reason = match &error {
                                PipelineError::Step { source, .. } => source.to_string(),
                                other => other.to_string(),
                            };
                            escaped.get_or_insert(error);
                            Err(reason)
                        }
                    }
                }
                None => Ok(()),
            };

            let verdict = match verdict {
                Ok(()) if stage == Stage::Configure && state.config().is_none() => {
                    Err("platform not configured".to_string())
                }
                other => other,
            };

            match verdict {
                Ok(()) => {
                    if self.step(stage).is_some() {
                        logger.success(&format!("{} complete", stage), &context);
                    }
                }
                Err(reason) if failure.is_some() => {
                    // The deploy already failed; the hook result can't change that.
                    diagnostics.warn(Warning::hook(format!(
                        "{} failed after a failed deploy: {}",
                        stage, reason
                    )));
                }
                Err(reason) => {
                    logger.failure(
                        &format!("{} failed: {}", stage, reason),
                        &context.clone().with("reason", &reason),
                    );
                    failure = Some(StageFailure { stage, reason });
                }
            }
        }

        if deploying {
            let status = match &failure {
                Some(f) if f.stage != Stage::AfterDeploy => DeployStatus::Failure,
                _ => DeployStatus::Success,
            };
            execution.set_deploy_status(status);
        }

        match escaped {
            Some(error) => Err(error),
            None => Ok(StagesRun { state, failure }),
        }
    }

    /// Fold a step's result into the run state.
    ///
    /// `Ok(Err(reason))` is an expected failure; `Err` is an error that must
    /// escape the run once `after_deploy` has had its turn.
    fn apply(
        stage: Stage,
        result: Result<StepOutcome, StepError>,
        state: &mut PipelineState,
    ) -> Result<Result<(), String>, PipelineError> {
        let outcome = result.context(StepSnafu { stage })?;
        if !outcome.is_success() {
            return Ok(Err(outcome.reason().unwrap_or("step failed").to_string()));
        }
        if let Some(output) = outcome.into_output() {
            let writer = output.writer();
            ensure!(
                writer == stage,
                UnexpectedOutputSnafu {
                    stage,
                    output: output.kind(),
                    writer,
                }
            );
            state.record(output);
        }
        Ok(Ok(()))
    }
}
