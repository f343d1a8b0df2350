// ABOUTME: rsync deploy platform: ships the exported directory to a remote host over SSH.
// ABOUTME: Hooks run remotely in the target directory through the same SSH session.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use super::{
    ExportStep, Hook, HookStep, Services, StepResult, parameters, path_str, run_checked,
    staged_dir,
};
use crate::config::{ServerConfig, SshSettings, deserialize_server};
use crate::exec::{CommandExecutor, RemoteConnector, shell_quote};
use crate::pipeline::{
    ConfigureStep, Configurator, DeploymentRecord, Pipeline, PipelineError, PipelineKind,
    PipelineState, PlatformConfig, Stage, StepContext, StepError, StepOutcome, StepOutput,
};

#[derive(Debug, Deserialize)]
struct RsyncParams {
    #[serde(deserialize_with = "deserialize_server")]
    server: ServerConfig,
    remote_path: String,
    #[serde(default)]
    exclude: Vec<String>,
    /// Delete remote files that are not in the source.
    #[serde(default)]
    delete: bool,
}

/// Connected remote target.
pub struct RsyncTarget {
    pub server: ServerConfig,
    pub remote_path: String,
    pub exclude: Vec<String>,
    pub delete: bool,
    pub remote: Arc<dyn CommandExecutor>,
}

impl RsyncTarget {
    fn destination(&self) -> String {
        format!("{}:{}", self.server.destination(), self.remote_path)
    }
}

struct RsyncConfigurator {
    connector: Arc<dyn RemoteConnector>,
}

#[async_trait]
impl Configurator for RsyncConfigurator {
    async fn configure(&self, ctx: StepContext<'_>) -> Result<Option<PlatformConfig>, StepError> {
        let Some(params) = parameters::<RsyncParams>(&ctx) else {
            return Ok(None);
        };

        let remote = match self.connector.connect(&params.server).await {
            Ok(remote) => remote,
            Err(e) => {
                ctx.info(&format!("Could not connect to {}: {}", params.server, e));
                return Ok(None);
            }
        };

        let session = Arc::clone(&remote);
        ctx.cleanup.register_disconnect(
            format!("close session to {}", params.server),
            move || async move { session.close().await },
        );

        Ok(Some(PlatformConfig::new(
            "rsync",
            RsyncTarget {
                server: params.server,
                remote_path: params.remote_path,
                exclude: params.exclude,
                delete: params.delete,
                remote,
            },
        )))
    }
}

/// `ssh` invocation rsync uses as its transport.
fn ssh_command(server: &ServerConfig, settings: &SshSettings) -> String {
    let mut cmd = format!("ssh -p {}", server.port);
    if let Some(key) = &settings.key_path {
        cmd.push_str(&format!(" -i {}", shell_quote(&path_str(key))));
    }
    if let Some(known_hosts) = &settings.known_hosts {
        cmd.push_str(&format!(
            " -o UserKnownHostsFile={}",
            shell_quote(&path_str(known_hosts))
        ));
    }
    if settings.trust_first_connection {
        cmd.push_str(" -o StrictHostKeyChecking=accept-new");
    }
    cmd
}

fn rsync_command(target: &RsyncTarget, source: &str, ssh: &str) -> String {
    let mut cmd = String::from("rsync -az");
    if target.delete {
        cmd.push_str(" --delete");
    }
    for pattern in &target.exclude {
        cmd.push_str(&format!(" --exclude {}", shell_quote(pattern)));
    }
    format!(
        "{} -e {} {} {}",
        cmd,
        shell_quote(ssh),
        shell_quote(&format!("{}/", source.trim_end_matches('/'))),
        shell_quote(&format!("{}/", target.destination().trim_end_matches('/')))
    )
}

struct RsyncDeploy {
    local: Arc<dyn CommandExecutor>,
    ssh: SshSettings,
}

impl RsyncDeploy {
    async fn run(&self, ctx: StepContext<'_>) -> StepResult<StepOutcome> {
        let target = ctx.platform::<RsyncTarget>()?;
        let none = HashMap::new();

        run_checked(
            target.remote.as_ref(),
            &format!("mkdir -p {}", shell_quote(&target.remote_path)),
            &none,
            "mkdir",
        )
        .await?;

        let source = path_str(&staged_dir(&ctx));
        ctx.info(&format!("Syncing {} to {}", source, target.destination()));
        run_checked(
            self.local.as_ref(),
            &rsync_command(target, &source, &ssh_command(&target.server, &self.ssh)),
            &none,
            "rsync",
        )
        .await?;

        Ok(StepOutcome::produced(StepOutput::Deployed(
            DeploymentRecord::Files {
                target: target.destination(),
            },
        )))
    }
}

platform_step!(RsyncDeploy, "rsync");

fn remote_host(state: &PipelineState) -> Option<(Arc<dyn CommandExecutor>, String)> {
    state
        .platform::<RsyncTarget>()
        .map(|t| (Arc::clone(&t.remote), t.remote_path.clone()))
}

pub(super) fn pipeline(services: &Services) -> Result<Pipeline, PipelineError> {
    let local = &services.local;
    Pipeline::builder(PipelineKind::Deploy)
        .step(
            Stage::Configure,
            ConfigureStep(RsyncConfigurator {
                connector: Arc::clone(&services.connector),
            }),
        )
        .step(Stage::Export, ExportStep)
        .step(
            Stage::BuildTransform,
            HookStep::local(Hook::BuildTransform, Arc::clone(local)),
        )
        .step(
            Stage::BeforeDeploy,
            HookStep::remote(Hook::BeforeDeploy, Arc::clone(local), remote_host),
        )
        .step(
            Stage::Deploy,
            RsyncDeploy {
                local: Arc::clone(local),
                ssh: services.ssh.clone(),
            },
        )
        .step(
            Stage::AfterDeploy,
            HookStep::remote(Hook::AfterDeploy, Arc::clone(local), remote_host),
        )
        .build()
}
