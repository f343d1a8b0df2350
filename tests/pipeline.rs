// ABOUTME: Pipeline runner tests: stage order, deploy status threading, and cleanup.
// ABOUTME: Drives the script platform with a recording executor plus hand-written steps.

mod support;

use async_trait::async_trait;
use futures::FutureExt;
use hal_agent::events::{MemoryLogger, Severity};
use hal_agent::job::{DEPLOY_STATUS_VAR, DeployStatus, Platform, StageCommands};
use hal_agent::pipeline::{
    DeploymentRecord, Pipeline, PipelineErrorKind, PipelineKind, PlatformConfig, PlatformStep,
    RunResult, Stage, StepContext, StepError, StepOutcome, StepOutput,
};
use hal_agent::platforms::build_pipeline;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use support::RecordingExecutor;

fn script_commands() -> StageCommands {
    StageCommands {
        before_deploy: vec!["./check.sh".to_string()],
        deploy: vec!["./deploy.sh".to_string()],
        after_deploy: vec!["./notify.sh".to_string()],
        ..Default::default()
    }
}

fn status_seen_by(recorder: &RecordingExecutor, needle: &str) -> Vec<String> {
    recorder
        .ran(needle)
        .into_iter()
        .filter_map(|c| c.env.get(DEPLOY_STATUS_VAR).cloned())
        .collect()
}

#[tokio::test]
async fn after_deploy_sees_failure_once_when_deploy_fails() {
    support::init_tracing();
    let workspace = tempfile::tempdir().unwrap();
    let recorder = Arc::new(RecordingExecutor::new().failing_on("./deploy.sh"));
    let pipeline = build_pipeline(Platform::Script, &support::services(&recorder)).unwrap();
    let mut execution =
        support::execution(Platform::Script, workspace.path()).with_commands(script_commands());
    let logger = MemoryLogger::new();

    let report = pipeline.run(&mut execution, &logger).await.unwrap();

    assert_eq!(report.result, RunResult::Failure);
    assert_eq!(report.failed_stage, Some(Stage::Deploy));
    assert_eq!(report.deploy_status, Some(DeployStatus::Failure));
    assert_eq!(status_seen_by(&recorder, "./notify.sh"), vec!["failure"]);
    assert_eq!(status_seen_by(&recorder, "./deploy.sh"), vec!["running"]);
    assert_eq!(status_seen_by(&recorder, "./check.sh"), vec!["pending"]);

    let failures = logger.with_severity(Severity::Failure);
    assert_eq!(failures.len(), 1);
    assert!(failures[0].message.starts_with("deploy failed: "));
    assert_eq!(failures[0].context.get("stage"), Some("deploy"));
}

#[tokio::test]
async fn after_deploy_sees_success_once_when_deploy_succeeds() {
    let workspace = tempfile::tempdir().unwrap();
    let recorder = Arc::new(RecordingExecutor::new());
    let pipeline = build_pipeline(Platform::Script, &support::services(&recorder)).unwrap();
    let mut execution =
        support::execution(Platform::Script, workspace.path()).with_commands(script_commands());
    let logger = MemoryLogger::new();

    let report = pipeline.run(&mut execution, &logger).await.unwrap();

    assert!(report.succeeded());
    assert_eq!(report.deploy_status, Some(DeployStatus::Success));
    assert_eq!(status_seen_by(&recorder, "./notify.sh"), vec!["success"]);
    assert!(matches!(
        report.state.deployment(),
        Some(DeploymentRecord::Script { commands: 1 })
    ));
    assert!(logger.with_severity(Severity::Failure).is_empty());
    assert!(logger.contains("deploy pipeline finished"));
}

#[tokio::test]
async fn before_deploy_failure_skips_deploy_and_after_deploy() {
    let workspace = tempfile::tempdir().unwrap();
    let recorder = Arc::new(RecordingExecutor::new().failing_on("./check.sh"));
    let pipeline = build_pipeline(Platform::Script, &support::services(&recorder)).unwrap();
    let mut execution =
        support::execution(Platform::Script, workspace.path()).with_commands(script_commands());
    let logger = MemoryLogger::new();

    let report = pipeline.run(&mut execution, &logger).await.unwrap();

    assert_eq!(report.failed_stage, Some(Stage::BeforeDeploy));
    assert_eq!(report.deploy_status, Some(DeployStatus::Failure));
    assert!(recorder.ran("./deploy.sh").is_empty());
    assert!(recorder.ran("./notify.sh").is_empty());
    assert_eq!(logger.with_severity(Severity::Failure).len(), 1);
}

#[tokio::test]
async fn after_deploy_failure_after_failed_deploy_is_only_a_warning() {
    let workspace = tempfile::tempdir().unwrap();
    let recorder = Arc::new(
        RecordingExecutor::new()
            .failing_on("./deploy.sh")
            .failing_on("./notify.sh"),
    );
    let pipeline = build_pipeline(Platform::Script, &support::services(&recorder)).unwrap();
    let mut execution =
        support::execution(Platform::Script, workspace.path()).with_commands(script_commands());
    let logger = MemoryLogger::new();

    let report = pipeline.run(&mut execution, &logger).await.unwrap();

    assert_eq!(report.failed_stage, Some(Stage::Deploy));
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].message.contains("after_deploy"));
    assert_eq!(logger.with_severity(Severity::Failure).len(), 1);
}

#[tokio::test]
async fn after_deploy_failure_after_good_deploy_fails_the_run() {
    let workspace = tempfile::tempdir().unwrap();
    let recorder = Arc::new(RecordingExecutor::new().failing_on("./notify.sh"));
    let pipeline = build_pipeline(Platform::Script, &support::services(&recorder)).unwrap();
    let mut execution =
        support::execution(Platform::Script, workspace.path()).with_commands(script_commands());
    let logger = MemoryLogger::new();

    let report = pipeline.run(&mut execution, &logger).await.unwrap();

    assert_eq!(report.failed_stage, Some(Stage::AfterDeploy));
    assert_eq!(report.deploy_status, Some(DeployStatus::Success));
}

#[tokio::test]
async fn missing_deploy_commands_fail_at_configure() {
    let workspace = tempfile::tempdir().unwrap();
    let recorder = Arc::new(RecordingExecutor::new());
    let pipeline = build_pipeline(Platform::Script, &support::services(&recorder)).unwrap();
    let mut execution = support::execution(Platform::Script, workspace.path());
    let logger = MemoryLogger::new();

    let report = pipeline.run(&mut execution, &logger).await.unwrap();

    assert_eq!(report.failed_stage, Some(Stage::Configure));
    assert_eq!(report.reason.as_deref(), Some("platform not configured"));
    assert!(recorder.commands().is_empty());
}

// Hand-written steps for exercising the runner directly.

struct Configured;

#[async_trait]
impl PlatformStep for Configured {
    fn name(&self) -> &'static str {
        "test configure"
    }

    async fn invoke(&self, _ctx: StepContext<'_>) -> Result<StepOutcome, StepError> {
        Ok(StepOutcome::produced(StepOutput::Configured(
            PlatformConfig::new("test", ()),
        )))
    }
}

/// Registers a cleanup that flips `flag`, then behaves as told.
struct Acquire {
    flag: Arc<AtomicBool>,
    behaviour: Behaviour,
}

#[derive(Clone, Copy)]
enum Behaviour {
    Fail,
    Panic,
    Internal,
    WrongOutput,
}

#[async_trait]
impl PlatformStep for Acquire {
    fn name(&self) -> &'static str {
        "acquire"
    }

    async fn invoke(&self, ctx: StepContext<'_>) -> Result<StepOutcome, StepError> {
        let flag = Arc::clone(&self.flag);
        ctx.cleanup.register("release test resource", move || async move {
            flag.store(true, Ordering::SeqCst);
            Ok::<(), String>(())
        });
        match self.behaviour {
            Behaviour::Fail => Ok(StepOutcome::failed("resource exhausted")),
            Behaviour::Panic => panic!("step blew up"),
            Behaviour::Internal => Err(StepError::Internal("lost track of container".to_string())),
            Behaviour::WrongOutput => Ok(StepOutcome::produced(StepOutput::Deployed(
                DeploymentRecord::Script { commands: 0 },
            ))),
        }
    }
}

fn build_with(behaviour: Behaviour, flag: &Arc<AtomicBool>) -> Pipeline {
    Pipeline::builder(PipelineKind::Build)
        .step(
            Stage::Build,
            Acquire {
                flag: Arc::clone(flag),
                behaviour,
            },
        )
        .step(Stage::Configure, Configured)
        .build()
        .unwrap()
}

#[tokio::test]
async fn cleanup_runs_when_a_step_fails() {
    let workspace = tempfile::tempdir().unwrap();
    let flag = Arc::new(AtomicBool::new(false));
    let pipeline = build_with(Behaviour::Fail, &flag);
    let mut execution = support::execution(Platform::Docker, workspace.path());

    let report = pipeline
        .run(&mut execution, &MemoryLogger::new())
        .await
        .unwrap();

    assert_eq!(report.failed_stage, Some(Stage::Build));
    assert_eq!(report.deploy_status, None);
    assert!(flag.load(Ordering::SeqCst));
}

#[tokio::test]
async fn cleanup_runs_before_a_panic_escapes() {
    let workspace = tempfile::tempdir().unwrap();
    let flag = Arc::new(AtomicBool::new(false));
    let pipeline = build_with(Behaviour::Panic, &flag);
    let mut execution = support::execution(Platform::Docker, workspace.path());
    let logger = MemoryLogger::new();

    let outcome = AssertUnwindSafe(pipeline.run(&mut execution, &logger))
        .catch_unwind()
        .await;

    assert!(outcome.is_err(), "panic should propagate");
    assert!(flag.load(Ordering::SeqCst));
}

#[tokio::test]
async fn unexpected_step_error_escapes_with_stage() {
    let workspace = tempfile::tempdir().unwrap();
    let flag = Arc::new(AtomicBool::new(false));
    let pipeline = build_with(Behaviour::Internal, &flag);
    let mut execution = support::execution(Platform::Docker, workspace.path());

    let err = pipeline
        .run(&mut execution, &MemoryLogger::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), PipelineErrorKind::StepError);
    assert_eq!(err.stage(), Stage::Build);
    assert!(flag.load(Ordering::SeqCst));
}

#[tokio::test]
async fn output_written_by_the_wrong_stage_is_rejected() {
    let workspace = tempfile::tempdir().unwrap();
    let flag = Arc::new(AtomicBool::new(false));
    let pipeline = build_with(Behaviour::WrongOutput, &flag);
    let mut execution = support::execution(Platform::Docker, workspace.path());

    let err = pipeline
        .run(&mut execution, &MemoryLogger::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), PipelineErrorKind::InvalidPipeline);
    assert!(err.to_string().contains("deployed"));
}

/// Deploy step that loses its connection mid-run.
struct DroppedSession;

#[async_trait]
impl PlatformStep for DroppedSession {
    fn name(&self) -> &'static str {
        "dropped session"
    }

    async fn invoke(&self, _ctx: StepContext<'_>) -> Result<StepOutcome, StepError> {
        Err(StepError::Internal("session closed mid-transfer".to_string()))
    }
}

/// Records the deploy status each time it runs.
struct StatusProbe(Arc<Mutex<Vec<Option<DeployStatus>>>>);

#[async_trait]
impl PlatformStep for StatusProbe {
    fn name(&self) -> &'static str {
        "record status"
    }

    async fn invoke(&self, ctx: StepContext<'_>) -> Result<StepOutcome, StepError> {
        self.0.lock().unwrap().push(ctx.execution.deploy_status());
        Ok(StepOutcome::ok())
    }
}

#[tokio::test]
async fn after_deploy_runs_when_deploy_errors_unexpectedly() {
    let workspace = tempfile::tempdir().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let pipeline = Pipeline::builder(PipelineKind::Deploy)
        .step(Stage::Configure, Configured)
        .step(Stage::Deploy, DroppedSession)
        .step(Stage::AfterDeploy, StatusProbe(Arc::clone(&seen)))
        .build()
        .unwrap();
    let mut execution = support::execution(Platform::Script, workspace.path());
    let logger = MemoryLogger::new();

    let err = pipeline.run(&mut execution, &logger).await.unwrap_err();

    assert_eq!(err.kind(), PipelineErrorKind::StepError);
    assert_eq!(err.stage(), Stage::Deploy);
    assert_eq!(*seen.lock().unwrap(), vec![Some(DeployStatus::Failure)]);
    assert_eq!(execution.deploy_status(), Some(DeployStatus::Failure));
    assert_eq!(
        execution.env().get(DEPLOY_STATUS_VAR).map(String::as_str),
        Some("failure")
    );

    let failures = logger.with_severity(Severity::Failure);
    assert_eq!(failures.len(), 1);
    assert_eq!(
        failures[0].message,
        "deploy failed: session closed mid-transfer"
    );
    assert_eq!(failures[0].context.get("stage"), Some("deploy"));
}

#[tokio::test]
async fn unexpected_error_before_deploy_skips_after_deploy() {
    let workspace = tempfile::tempdir().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let pipeline = Pipeline::builder(PipelineKind::Deploy)
        .step(Stage::Configure, Configured)
        .step(Stage::BeforeDeploy, DroppedSession)
        .step(Stage::AfterDeploy, StatusProbe(Arc::clone(&seen)))
        .build()
        .unwrap();
    let mut execution = support::execution(Platform::Script, workspace.path());
    let logger = MemoryLogger::new();

    let err = pipeline.run(&mut execution, &logger).await.unwrap_err();

    assert_eq!(err.stage(), Stage::BeforeDeploy);
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(execution.deploy_status(), Some(DeployStatus::Failure));
    assert_eq!(logger.with_severity(Severity::Failure).len(), 1);
}

#[test]
fn builder_orders_steps_by_stage() {
    let flag = Arc::new(AtomicBool::new(false));
    let pipeline = build_with(Behaviour::Fail, &flag);
    let plan: Vec<Stage> = pipeline.plan().into_iter().map(|(stage, _)| stage).collect();
    assert_eq!(plan, vec![Stage::Configure, Stage::Build]);
}

#[test]
fn builder_rejects_stage_from_other_kind() {
    let err = Pipeline::builder(PipelineKind::Build)
        .step(Stage::Deploy, Configured)
        .build()
        .unwrap_err();
    assert_eq!(err.kind(), PipelineErrorKind::InvalidPipeline);
    assert_eq!(err.stage(), Stage::Deploy);
}

#[test]
fn builder_rejects_duplicate_stage() {
    let err = Pipeline::builder(PipelineKind::Deploy)
        .step(Stage::Configure, Configured)
        .step(Stage::Configure, Configured)
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("more than one step"));
}

#[test]
fn every_platform_builds_a_pipeline_of_its_kind() {
    let recorder = Arc::new(RecordingExecutor::new());
    let services = support::services(&recorder);
    for platform in [
        Platform::Docker,
        Platform::Rsync,
        Platform::Script,
        Platform::S3,
        Platform::CodeDeploy,
        Platform::ElasticBeanstalk,
        Platform::Elb,
        Platform::Ssm,
    ] {
        let pipeline = build_pipeline(platform, &services).unwrap();
        assert_eq!(
            pipeline.kind(),
            PipelineKind::from(platform.job_kind()),
            "{platform}"
        );
        assert_eq!(pipeline.plan()[0].0, Stage::Configure, "{platform}");
    }
}
