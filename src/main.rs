// ABOUTME: Entry point for the hal-agent CLI application.
// ABOUTME: Parses arguments and dispatches to init, validate, and run.

mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use hal_agent::config::{self, AgentConfig};
use hal_agent::error::{Error, Result};
use hal_agent::events::{EventLogger, Tee, TracingLogger};
use hal_agent::exec::{LocalExecutor, SshConnector};
use hal_agent::job::JobFile;
use hal_agent::output::{Output, OutputMode};
use hal_agent::pipeline::PipelineReport;
use hal_agent::platforms::{Services, build_pipeline};
use std::env;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        // Nothing left to report to if stderr is gone.
        let _ = writeln!(io::stderr(), "Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cwd = env::current_dir()?;
    let verbose = cli.verbose;
    match cli.command {
        Commands::Init { region, force } => {
            config::init_config(&cwd, region.as_deref(), force)?;
            println!("Created {}", config::CONFIG_FILENAME);
            Ok(())
        }
        Commands::Validate { job } => validate(&cwd, &job),
        Commands::Run { job, output } => run_job(&cwd, &job, output, verbose).await,
    }
}

fn services(config: &AgentConfig, local: LocalExecutor) -> Services {
    Services::new(
        Arc::new(local),
        Arc::new(SshConnector::new(config.ssh.clone())),
    )
    .with_waiters(config.waiters)
    .with_ssh(config.ssh.clone())
    .with_region(config.region.clone())
}

fn validate(cwd: &Path, job_path: &Path) -> Result<()> {
    let config = AgentConfig::discover_or_default(cwd)?;
    let file = JobFile::load(job_path)?;
    let job = file.job.clone();

    let pipeline = build_pipeline(job.platform, &services(&config, LocalExecutor::new()))?;
    println!("{} {} ({} pipeline)", job.platform, job.id, pipeline.kind());
    for (stage, step) in pipeline.plan() {
        println!("  {:<16} {}", stage.name(), step);
    }
    Ok(())
}

async fn run_job(
    cwd: &Path,
    job_path: &Path,
    mode: Option<OutputMode>,
    verbose: bool,
) -> Result<()> {
    let config = AgentConfig::discover_or_default(cwd)?;
    let file = JobFile::load(job_path)?;
    let base_dir = job_path
        .parent()
        .map(|p| cwd.join(p))
        .unwrap_or_else(|| cwd.to_path_buf());
    let mut execution = file.into_execution(&base_dir)?;

    if !execution.workspace().is_dir() {
        return Err(Error::InvalidConfig(format!(
            "workspace {} is not a directory",
            execution.workspace().display()
        )));
    }

    let services = services(&config, LocalExecutor::in_dir(execution.workspace()));

    let output = Output::new(mode.unwrap_or(config.output));
    // With -v every event also lands in the debug log.
    let tee = Tee::new(vec![&output as &dyn EventLogger, &TracingLogger]);
    let logger: &dyn EventLogger = if verbose { &tee } else { &output };

    let pipeline = build_pipeline(execution.platform(), &services)?;
    let mut report = pipeline.run(&mut execution, logger).await?;

    print_report(&output, &mut report);
    if report.succeeded() {
        Ok(())
    } else {
        Err(Error::JobFailed(format!(
            "{} failed at {}",
            execution.job().id,
            report
                .failed_stage
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown stage".to_string())
        )))
    }
}

fn print_report(output: &Output, report: &mut PipelineReport) {
    report.warnings.extend(output.fallback_warning());
    match output.mode() {
        OutputMode::Json => {
            if let Ok(json) = serde_json::to_string(report) {
                output.line(&json);
            }
        }
        OutputMode::Normal | OutputMode::Quiet => {
            for warning in &report.warnings {
                output.error_line(&format!("Warning: {}", warning.message));
            }
            if let Some(status) = report.deploy_status {
                output.line(&format!("Deploy status: {status}"));
            }
        }
    }
    if let Some(warning) = output.fallback_warning() {
        tracing::warn!("{}", warning.message);
    }
}
