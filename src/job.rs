// ABOUTME: Job and job execution types consumed by the pipeline runner.
// ABOUTME: Covers job kinds, target platforms, stage commands, and the deploy status marker.

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::{EnvValue, resolve_env_map};
use crate::error::{Error, Result};
use crate::types::JobId;

/// Environment variable carrying the deploy outcome to user hooks.
pub const DEPLOY_STATUS_VAR: &str = "HAL_DEPLOY_STATUS";

/// Whether a job produces an artifact or ships one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Build,
    #[serde(alias = "deploy")]
    Release,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Build => f.write_str("build"),
            JobKind::Release => f.write_str("release"),
        }
    }
}

/// Target platform of a job. Closed set; each variant maps to one pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Docker,
    Rsync,
    Script,
    S3,
    #[serde(alias = "cd")]
    CodeDeploy,
    #[serde(alias = "eb")]
    ElasticBeanstalk,
    Elb,
    Ssm,
}

impl Platform {
    pub fn name(&self) -> &'static str {
        match self {
            Platform::Docker => "docker",
            Platform::Rsync => "rsync",
            Platform::Script => "script",
            Platform::S3 => "s3",
            Platform::CodeDeploy => "codedeploy",
            Platform::ElasticBeanstalk => "elasticbeanstalk",
            Platform::Elb => "elb",
            Platform::Ssm => "ssm",
        }
    }

    /// The kind of job this platform runs.
    pub fn job_kind(&self) -> JobKind {
        match self {
            Platform::Docker => JobKind::Build,
            _ => JobKind::Release,
        }
    }

    /// Whether the platform talks to AWS and needs SDK clients.
    pub fn requires_aws(&self) -> bool {
        matches!(
            self,
            Platform::S3
                | Platform::CodeDeploy
                | Platform::ElasticBeanstalk
                | Platform::Elb
                | Platform::Ssm
        )
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Deploy outcome marker exposed to hooks as `HAL_DEPLOY_STATUS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployStatus {
    Pending,
    Running,
    Success,
    Failure,
}

impl DeployStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployStatus::Pending => "pending",
            DeployStatus::Running => "running",
            DeployStatus::Success => "success",
            DeployStatus::Failure => "failure",
        }
    }
}

impl fmt::Display for DeployStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved build or release. Read-only for the pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub platform: Platform,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub commit: Option<String>,
}

/// User-supplied command lists, one per stage that runs user commands.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StageCommands {
    #[serde(default)]
    pub build: Vec<String>,
    #[serde(default)]
    pub build_transform: Vec<String>,
    #[serde(default)]
    pub before_deploy: Vec<String>,
    #[serde(default)]
    pub deploy: Vec<String>,
    #[serde(default)]
    pub after_deploy: Vec<String>,
}

/// Parameters for a single pipeline run.
#[derive(Debug, Clone)]
pub struct JobExecution {
    job: Job,
    workspace: PathBuf,
    env: BTreeMap<String, String>,
    parameters: serde_yaml::Mapping,
    commands: StageCommands,
    deploy_status: Option<DeployStatus>,
}

impl JobExecution {
    pub fn new(job: Job, workspace: impl Into<PathBuf>) -> Self {
        Self {
            job,
            workspace: workspace.into(),
            env: BTreeMap::new(),
            parameters: serde_yaml::Mapping::new(),
            commands: StageCommands::default(),
            deploy_status: None,
        }
    }

    pub fn with_env(mut self, env: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn with_parameters(mut self, parameters: serde_yaml::Mapping) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_parameter(mut self, key: &str, value: impl Into<serde_yaml::Value>) -> Self {
        self.parameters
            .insert(serde_yaml::Value::String(key.to_string()), value.into());
        self
    }

    pub fn with_commands(mut self, commands: StageCommands) -> Self {
        self.commands = commands;
        self
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn platform(&self) -> Platform {
        self.job.platform
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn commands(&self) -> &StageCommands {
        &self.commands
    }

    /// Configured environment, including the deploy status marker once set.
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn deploy_status(&self) -> Option<DeployStatus> {
        self.deploy_status
    }

    /// Decode the platform parameters into a typed struct.
    pub fn parameters<T: DeserializeOwned>(&self) -> std::result::Result<T, serde_yaml::Error> {
        serde_yaml::from_value(serde_yaml::Value::Mapping(self.parameters.clone()))
    }

    /// The only mutation allowed mid-run.
    pub(crate) fn set_deploy_status(&mut self, status: DeployStatus) {
        self.deploy_status = Some(status);
        self.env
            .insert(DEPLOY_STATUS_VAR.to_string(), status.as_str().to_string());
    }

    /// Environment handed to user commands.
    pub fn hook_env(&self) -> HashMap<String, String> {
        let mut env: HashMap<String, String> = self
            .env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        env.insert("HAL_JOB_ID".to_string(), self.job.id.to_string());
        env.insert("HAL_JOB_KIND".to_string(), self.job.kind.to_string());
        env.insert("HAL_PLATFORM".to_string(), self.job.platform.to_string());
        if let Some(ref environment) = self.job.environment {
            env.insert("HAL_ENVIRONMENT".to_string(), environment.clone());
        }
        if let Some(ref reference) = self.job.reference {
            env.insert("HAL_REFERENCE".to_string(), reference.clone());
        }
        if let Some(ref commit) = self.job.commit {
            env.insert("HAL_COMMIT".to_string(), commit.clone());
        }
        env
    }
}

/// On-disk description of a job and how to run it.
#[derive(Debug, Clone, Deserialize)]
pub struct JobFile {
    pub job: Job,

    #[serde(default)]
    pub workspace: Option<PathBuf>,

    #[serde(default)]
    pub env: HashMap<String, EnvValue>,

    #[serde(default)]
    pub parameters: serde_yaml::Mapping,

    #[serde(default)]
    pub commands: StageCommands,
}

impl JobFile {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: JobFile = serde_yaml::from_str(yaml)?;
        file.validate()?;
        Ok(file)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    fn validate(&self) -> Result<()> {
        let expected = self.job.platform.job_kind();
        if self.job.kind != expected {
            return Err(Error::PlatformMismatch {
                platform: self.job.platform,
                kind: self.job.kind,
            });
        }
        Ok(())
    }

    /// Resolve env references and build the execution.
    ///
    /// A relative workspace is resolved against `base_dir`.
    pub fn into_execution(self, base_dir: &Path) -> Result<JobExecution> {
        let env = resolve_env_map(&self.env)?;
        let workspace = match self.workspace {
            Some(path) if path.is_absolute() => path,
            Some(path) => base_dir.join(path),
            None => base_dir.to_path_buf(),
        };

        Ok(JobExecution::new(self.job, workspace)
            .with_env(env)
            .with_parameters(self.parameters)
            .with_commands(self.commands))
    }
}
