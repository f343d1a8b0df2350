// ABOUTME: Pipeline runs for the docker build and rsync deploy platforms.
// ABOUTME: Records every shell command to check order, remote hooks, and container cleanup.

mod support;

use hal_agent::events::MemoryLogger;
use hal_agent::job::{Platform, StageCommands};
use hal_agent::pipeline::{Artifact, DeploymentRecord, Stage};
use hal_agent::platforms::build_pipeline;
use std::sync::Arc;
use support::RecordingExecutor;

fn position(commands: &[String], needle: &str) -> usize {
    commands
        .iter()
        .position(|c| c.contains(needle))
        .unwrap_or_else(|| panic!("no command containing {needle:?} in {commands:#?}"))
}

#[tokio::test]
async fn docker_build_runs_in_container_and_removes_it() {
    support::init_tracing();
    let workspace = tempfile::tempdir().unwrap();
    let recorder = Arc::new(RecordingExecutor::new());
    let mut execution = support::execution(Platform::Docker, workspace.path())
        .with_parameter("image", "node:20")
        .with_commands(StageCommands {
            build: vec!["npm ci".to_string(), "npm run build".to_string()],
            ..Default::default()
        });

    let pipeline = build_pipeline(Platform::Docker, &support::services(&recorder)).unwrap();
    let report = pipeline
        .run(&mut execution, &MemoryLogger::new())
        .await
        .unwrap();

    assert!(report.succeeded(), "{:?}", report.reason);
    assert_eq!(report.deploy_status, None);

    let commands: Vec<String> = recorder.commands().into_iter().map(|c| c.command).collect();
    let create = position(&commands, "docker create --name hal-build-r.101");
    let start = position(&commands, "docker start");
    let build = position(&commands, "npm run build");
    let copy_out = position(&commands, "docker cp hal-build-r.101:");
    let remove = position(&commands, "docker rm --force hal-build-r.101");
    assert!(create < start && start < build && build < copy_out && copy_out < remove);

    let exec = &recorder.ran("npm ci")[0];
    assert!(exec.command.contains("--env HAL_JOB_ID=r.101"));
    assert!(matches!(report.state.imported(), Some(Artifact::Directory(_))));
}

#[tokio::test]
async fn docker_container_is_removed_when_build_fails() {
    let workspace = tempfile::tempdir().unwrap();
    let recorder = Arc::new(RecordingExecutor::new().failing_on("npm test"));
    let mut execution = support::execution(Platform::Docker, workspace.path())
        .with_parameter("image", "node:20")
        .with_commands(StageCommands {
            build: vec!["npm test".to_string()],
            ..Default::default()
        });

    let pipeline = build_pipeline(Platform::Docker, &support::services(&recorder)).unwrap();
    let report = pipeline
        .run(&mut execution, &MemoryLogger::new())
        .await
        .unwrap();

    assert_eq!(report.failed_stage, Some(Stage::Build));
    assert_eq!(recorder.ran("docker rm --force").len(), 1);
    assert!(recorder.ran("docker cp hal-build-r.101:").is_empty());
}

#[tokio::test]
async fn docker_without_build_commands_is_not_configured() {
    let workspace = tempfile::tempdir().unwrap();
    let recorder = Arc::new(RecordingExecutor::new());
    let mut execution = support::execution(Platform::Docker, workspace.path())
        .with_parameter("image", "node:20");

    let pipeline = build_pipeline(Platform::Docker, &support::services(&recorder)).unwrap();
    let report = pipeline
        .run(&mut execution, &MemoryLogger::new())
        .await
        .unwrap();

    assert_eq!(report.failed_stage, Some(Stage::Configure));
    assert!(recorder.ran("docker create").is_empty());
}

#[tokio::test]
async fn rsync_syncs_then_runs_hooks_on_the_remote() {
    let workspace = tempfile::tempdir().unwrap();
    let recorder = Arc::new(RecordingExecutor::new());
    let mut execution = support::execution(Platform::Rsync, workspace.path())
        .with_parameter("server", "deploy@web1.example.com:2222")
        .with_parameter("remote_path", "/srv/app")
        .with_commands(StageCommands {
            before_deploy: vec!["./maintenance on".to_string()],
            after_deploy: vec!["./maintenance off".to_string()],
            ..Default::default()
        });

    let pipeline = build_pipeline(Platform::Rsync, &support::services(&recorder)).unwrap();
    let report = pipeline
        .run(&mut execution, &MemoryLogger::new())
        .await
        .unwrap();

    assert!(report.succeeded(), "{:?}", report.reason);
    let commands: Vec<String> = recorder.commands().into_iter().map(|c| c.command).collect();
    let before = position(&commands, "./maintenance on");
    let mkdir = position(&commands, "mkdir -p /srv/app");
    let rsync = position(&commands, "rsync -az");
    let after = position(&commands, "./maintenance off");
    assert!(before < mkdir && mkdir < rsync && rsync < after);

    assert!(commands[before].starts_with("cd /srv/app && "));
    assert!(commands[rsync].contains("ssh -p 2222"));
    assert!(commands[rsync].contains("deploy@web1.example.com:/srv/app/"));
    assert!(matches!(
        report.state.deployment(),
        Some(DeploymentRecord::Files { target }) if target == "deploy@web1.example.com:/srv/app"
    ));
}
