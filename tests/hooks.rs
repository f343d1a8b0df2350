// ABOUTME: User command stages run through the real local executor.
// ABOUTME: Writes marker files from hook commands to check ordering and the HAL_* environment.

mod support;

use hal_agent::events::MemoryLogger;
use hal_agent::exec::{LocalExecutor, SshConnector};
use hal_agent::job::{Platform, StageCommands};
use hal_agent::pipeline::Stage;
use hal_agent::platforms::{Services, build_pipeline};
use std::fs;
use std::sync::Arc;

fn local_services() -> Services {
    Services::new(
        Arc::new(LocalExecutor::new()),
        Arc::new(SshConnector::default()),
    )
}

#[tokio::test]
async fn hooks_run_in_order_inside_the_exported_directory() {
    support::init_tracing();
    let workspace = tempfile::tempdir().unwrap();
    fs::create_dir(workspace.path().join("site")).unwrap();

    let mut execution = support::execution(Platform::Script, workspace.path())
        .with_parameter("source", "site")
        .with_commands(StageCommands {
            build_transform: vec!["echo transform >> ../trace".to_string()],
            before_deploy: vec!["echo \"before $HAL_DEPLOY_STATUS\" >> ../trace".to_string()],
            deploy: vec!["echo \"deploy $HAL_DEPLOY_STATUS $HAL_JOB_ID\" >> ../trace".to_string()],
            after_deploy: vec!["echo \"after $HAL_DEPLOY_STATUS $HAL_ENVIRONMENT\" >> ../trace".to_string()],
            ..Default::default()
        });

    let pipeline = build_pipeline(Platform::Script, &local_services()).unwrap();
    let report = pipeline
        .run(&mut execution, &MemoryLogger::new())
        .await
        .unwrap();

    assert!(report.succeeded(), "{:?}", report.reason);
    let trace = fs::read_to_string(workspace.path().join("trace")).unwrap();
    assert_eq!(
        trace.lines().collect::<Vec<_>>(),
        vec![
            "transform",
            "before pending",
            "deploy running r.101",
            "after success staging",
        ]
    );
}

#[tokio::test]
async fn failing_command_stops_the_stage_and_reports_exit_code() {
    let workspace = tempfile::tempdir().unwrap();
    let mut execution = support::execution(Platform::Script, workspace.path()).with_commands(
        StageCommands {
            deploy: vec![
                "echo 'disk full' >&2; exit 3".to_string(),
                "touch never-created".to_string(),
            ],
            after_deploy: vec!["echo \"$HAL_DEPLOY_STATUS\" > status".to_string()],
            ..Default::default()
        },
    );

    let pipeline = build_pipeline(Platform::Script, &local_services()).unwrap();
    let report = pipeline
        .run(&mut execution, &MemoryLogger::new())
        .await
        .unwrap();

    assert_eq!(report.failed_stage, Some(Stage::Deploy));
    let reason = report.reason.unwrap();
    assert!(reason.contains("exited with code 3"), "{reason}");
    assert!(reason.contains("disk full"), "{reason}");
    assert!(!workspace.path().join("never-created").exists());
    assert_eq!(
        fs::read_to_string(workspace.path().join("status")).unwrap().trim(),
        "failure"
    );
}

#[tokio::test]
async fn missing_source_directory_fails_export() {
    let workspace = tempfile::tempdir().unwrap();
    let mut execution = support::execution(Platform::Script, workspace.path())
        .with_parameter("source", "dist")
        .with_commands(StageCommands {
            deploy: vec!["true".to_string()],
            ..Default::default()
        });

    let pipeline = build_pipeline(Platform::Script, &local_services()).unwrap();
    let report = pipeline
        .run(&mut execution, &MemoryLogger::new())
        .await
        .unwrap();

    assert_eq!(report.failed_stage, Some(Stage::Export));
    assert!(report.reason.unwrap().contains("dist"));
}
