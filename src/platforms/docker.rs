// ABOUTME: Docker build platform driven through the docker CLI.
// ABOUTME: Creates a build container, copies source in, runs build commands, copies artifacts out.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{Halt, Services, StepResult, parameters, path_str, run_checked, safe_name};
use crate::exec::{CommandExecutor, CommandOutput, ExecError, shell_quote};
use crate::pipeline::{
    Artifact, ConfigureStep, Configurator, Pipeline, PipelineError, PipelineKind, PlatformConfig,
    Stage, StepContext, StepError, StepOutcome, StepOutput,
};

/// One docker CLI operation. Every variant maps to exactly one command.
#[derive(Debug, Clone, Copy)]
pub enum DockerOperation<'a> {
    Create { image: &'a str, workdir: &'a str },
    Start,
    CopyIn { source: &'a Path, workdir: &'a str },
    Exec {
        command: &'a str,
        workdir: &'a str,
        env: &'a HashMap<String, String>,
    },
    CopyOut { path: &'a str, destination: &'a Path },
    Remove,
}

impl DockerOperation<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            DockerOperation::Create { .. } => "create",
            DockerOperation::Start => "start",
            DockerOperation::CopyIn { .. } => "copy in",
            DockerOperation::Exec { .. } => "exec",
            DockerOperation::CopyOut { .. } => "copy out",
            DockerOperation::Remove => "remove",
        }
    }

    /// The shell command performing this operation on `container`.
    pub fn command(&self, container: &str) -> String {
        let name = shell_quote(container);
        match self {
            // The container idles so build commands can be exec'd into it.
            DockerOperation::Create { image, workdir } => format!(
                "docker create --name {} --workdir {} --entrypoint tail {} -f /dev/null",
                name,
                shell_quote(workdir),
                shell_quote(image)
            ),
            DockerOperation::Start => format!("docker start {}", name),
            DockerOperation::CopyIn { source, workdir } => format!(
                "docker cp {} {}",
                shell_quote(&format!("{}/.", source.display())),
                shell_quote(&format!("{}:{}", container, workdir))
            ),
            DockerOperation::Exec {
                command,
                workdir,
                env,
            } => {
                let mut keys: Vec<&String> = env.keys().collect();
                keys.sort();
                let flags: String = keys
                    .into_iter()
                    .map(|k| format!("--env {} ", shell_quote(&format!("{}={}", k, env[k]))))
                    .collect();
                format!(
                    "docker exec --workdir {} {}{} sh -c {}",
                    shell_quote(workdir),
                    flags,
                    name,
                    shell_quote(command)
                )
            }
            DockerOperation::CopyOut { path, destination } => format!(
                "docker cp {} {}",
                shell_quote(&format!("{}:{}", container, path)),
                shell_quote(&path_str(destination))
            ),
            DockerOperation::Remove => format!("docker rm --force {}", name),
        }
    }
}

/// Runs [`DockerOperation`]s against one container.
#[derive(Clone)]
struct Docker {
    executor: Arc<dyn CommandExecutor>,
    container: String,
}

impl Docker {
    async fn run(&self, op: DockerOperation<'_>) -> StepResult<CommandOutput> {
        tracing::debug!("docker {} on {}", op.name(), self.container);
        run_checked(
            self.executor.as_ref(),
            &op.command(&self.container),
            &HashMap::new(),
            &format!("docker {}", op.name()),
        )
        .await
    }

    /// Remove the container; a container that is already gone is fine.
    async fn remove(&self) -> Result<(), ExecError> {
        let output = self
            .executor
            .run(&DockerOperation::Remove.command(&self.container), &HashMap::new())
            .await?;
        if output.success() || output.stderr.contains("No such container") {
            Ok(())
        } else {
            Err(ExecError::Spawn(output.failure_summary()))
        }
    }
}

#[derive(Debug, Deserialize)]
struct DockerParams {
    image: String,
    #[serde(default = "default_workdir")]
    workdir: String,
    #[serde(default)]
    source: Option<PathBuf>,
    /// Path inside the container, relative to `workdir`, to copy back out.
    #[serde(default = "default_artifacts")]
    artifacts: String,
    /// Local destination, relative to the workspace.
    #[serde(default = "default_destination")]
    destination: PathBuf,
}

fn default_workdir() -> String {
    "/build".to_string()
}

fn default_artifacts() -> String {
    ".".to_string()
}

fn default_destination() -> PathBuf {
    PathBuf::from("dist")
}

/// Resolved build container settings.
#[derive(Debug, Clone)]
pub struct DockerTarget {
    pub image: String,
    pub container: String,
    pub workdir: String,
    pub source: PathBuf,
    pub artifacts: String,
    pub destination: PathBuf,
}

struct DockerConfigurator {
    local: Arc<dyn CommandExecutor>,
}

#[async_trait]
impl Configurator for DockerConfigurator {
    async fn configure(&self, ctx: StepContext<'_>) -> Result<Option<PlatformConfig>, StepError> {
        let Some(params) = parameters::<DockerParams>(&ctx) else {
            return Ok(None);
        };
        if ctx.execution.commands().build.is_empty() {
            ctx.info("No build commands configured");
            return Ok(None);
        }

        let probe = self
            .local
            .run("docker version --format '{{.Server.Version}}'", &HashMap::new())
            .await;
        match probe {
            Ok(output) if output.success() => {
                tracing::debug!("Docker server {}", output.stdout.trim());
            }
            Ok(output) => {
                ctx.info(&format!("Docker is not available: {}", output.failure_summary()));
                return Ok(None);
            }
            Err(e) => {
                ctx.info(&format!("Docker is not available: {}", e));
                return Ok(None);
            }
        }

        let workspace = ctx.execution.workspace();
        let target = DockerTarget {
            image: params.image,
            container: format!("hal-build-{}", safe_name(ctx.execution.job().id.as_str())),
            workdir: params.workdir,
            source: params
                .source
                .map(|s| workspace.join(s))
                .unwrap_or_else(|| workspace.to_path_buf()),
            artifacts: params.artifacts,
            destination: workspace.join(params.destination),
        };
        Ok(Some(PlatformConfig::new("docker", target)))
    }
}

/// Create and start the build container, then copy the source in.
struct DockerExport {
    local: Arc<dyn CommandExecutor>,
}

impl DockerExport {
    async fn run(&self, ctx: StepContext<'_>) -> StepResult<StepOutcome> {
        let target = ctx.platform::<DockerTarget>()?;
        let docker = Docker {
            executor: Arc::clone(&self.local),
            container: target.container.clone(),
        };

        ctx.info(&format!("Creating {} from {}", target.container, target.image));
        docker
            .run(DockerOperation::Create {
                image: &target.image,
                workdir: &target.workdir,
            })
            .await?;

        let remover = docker.clone();
        ctx.cleanup
            .register(format!("remove container {}", target.container), move || async move {
                remover.remove().await
            });

        docker.run(DockerOperation::Start).await?;
        docker
            .run(DockerOperation::CopyIn {
                source: &target.source,
                workdir: &target.workdir,
            })
            .await?;

        Ok(StepOutcome::produced(StepOutput::Exported(Artifact::Container(
            target.container.clone(),
        ))))
    }
}

/// Run each build command inside the container.
struct DockerBuild {
    local: Arc<dyn CommandExecutor>,
}

impl DockerBuild {
    async fn run(&self, ctx: StepContext<'_>) -> StepResult<StepOutcome> {
        let target = ctx.platform::<DockerTarget>()?;
        let Some(Artifact::Container(container)) = ctx.state.exported() else {
            return Err(Halt::Error(StepError::MissingInput("build container")));
        };
        let docker = Docker {
            executor: Arc::clone(&self.local),
            container: container.clone(),
        };
        let env = ctx.execution.hook_env();

        for command in &ctx.execution.commands().build {
            ctx.info(&format!("Running `{}` in {}", command, container));
            docker
                .run(DockerOperation::Exec {
                    command,
                    workdir: &target.workdir,
                    env: &env,
                })
                .await
                .map_err(|halt| match halt {
                    Halt::Failed(reason) => Halt::Failed(format!("`{}`: {}", command, reason)),
                    other => other,
                })?;
        }
        Ok(StepOutcome::ok())
    }
}

/// Copy build artifacts from the container into the workspace.
struct DockerImport {
    local: Arc<dyn CommandExecutor>,
}

impl DockerImport {
    async fn run(&self, ctx: StepContext<'_>) -> StepResult<StepOutcome> {
        let target = ctx.platform::<DockerTarget>()?;
        let docker = Docker {
            executor: Arc::clone(&self.local),
            container: target.container.clone(),
        };

        tokio::fs::create_dir_all(&target.destination)
            .await
            .map_err(|e| {
                Halt::failed(format!("cannot create {}: {}", target.destination.display(), e))
            })?;

        let path = format!("{}/{}", target.workdir.trim_end_matches('/'), target.artifacts);
        docker
            .run(DockerOperation::CopyOut {
                path: &path,
                destination: &target.destination,
            })
            .await?;

        ctx.info(&format!("Imported artifacts into {}", target.destination.display()));
        Ok(StepOutcome::produced(StepOutput::Imported(Artifact::Directory(
            target.destination.clone(),
        ))))
    }
}

platform_step!(DockerExport, "docker export");
platform_step!(DockerBuild, "docker build");
platform_step!(DockerImport, "docker import");

pub(super) fn pipeline(services: &Services) -> Result<Pipeline, PipelineError> {
    let local = &services.local;
    Pipeline::builder(PipelineKind::Build)
        .step(
            Stage::Configure,
            ConfigureStep(DockerConfigurator {
                local: Arc::clone(local),
            }),
        )
        .step(Stage::Export, DockerExport { local: Arc::clone(local) })
        .step(Stage::Build, DockerBuild { local: Arc::clone(local) })
        .step(Stage::Import, DockerImport { local: Arc::clone(local) })
        .build()
}
