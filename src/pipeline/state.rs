// ABOUTME: Typed values threaded between pipeline stages.
// ABOUTME: Holds the platform config, exported and imported artifacts, and the deployment record.

use std::any::Any;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use super::stage::Stage;
use crate::aws::SwapPlan;
use crate::aws::types::{CommandInvocation, DeploymentInfo, EnvironmentDescription, S3Location};

/// Resolved platform-specific target info. Immutable once produced.
#[derive(Clone)]
pub struct PlatformConfig {
    platform: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

impl PlatformConfig {
    pub fn new<T: Any + Send + Sync>(platform: &'static str, value: T) -> Self {
        Self {
            platform,
            value: Arc::new(value),
        }
    }

    pub fn platform(&self) -> &'static str {
        self.platform
    }

    /// The config as `T`, if that's what the configurator produced.
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}

/// Something a stage produced for a later stage to consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    Directory(PathBuf),
    Archive(PathBuf),
    Object(S3Location),
    Container(String),
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Artifact::Directory(path) | Artifact::Archive(path) => {
                write!(f, "{}", path.display())
            }
            Artifact::Object(location) => write!(f, "{}", location),
            Artifact::Container(name) => write!(f, "container {}", name),
        }
    }
}

/// What the deploy stage did, for the verify stage to check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentRecord {
    CodeDeploy(DeploymentInfo),
    Beanstalk {
        environment: EnvironmentDescription,
        version_label: String,
    },
    Swap(SwapPlan),
    Commands(Vec<CommandInvocation>),
    Upload(S3Location),
    Files {
        target: String,
    },
    Script {
        commands: usize,
    },
}

/// Output a step hands back to the runner.
#[derive(Debug, Clone)]
pub enum StepOutput {
    Configured(PlatformConfig),
    Exported(Artifact),
    Imported(Artifact),
    Deployed(DeploymentRecord),
}

impl StepOutput {
    pub fn kind(&self) -> &'static str {
        match self {
            StepOutput::Configured(_) => "configured",
            StepOutput::Exported(_) => "exported",
            StepOutput::Imported(_) => "imported",
            StepOutput::Deployed(_) => "deployed",
        }
    }

    /// The one stage allowed to write this output.
    pub fn writer(&self) -> Stage {
        match self {
            StepOutput::Configured(_) => Stage::Configure,
            StepOutput::Exported(_) => Stage::Export,
            StepOutput::Imported(_) => Stage::Import,
            StepOutput::Deployed(_) => Stage::Deploy,
        }
    }
}

/// Outputs of the stages run so far. Each field is written by exactly one stage.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    config: Option<PlatformConfig>,
    exported: Option<Artifact>,
    imported: Option<Artifact>,
    deployment: Option<DeploymentRecord>,
}

impl PipelineState {
    pub fn config(&self) -> Option<&PlatformConfig> {
        self.config.as_ref()
    }

    /// The platform config downcast to `T`.
    pub fn platform<T: Any>(&self) -> Option<&T> {
        self.config.as_ref().and_then(PlatformConfig::get::<T>)
    }

    pub fn exported(&self) -> Option<&Artifact> {
        self.exported.as_ref()
    }

    pub fn imported(&self) -> Option<&Artifact> {
        self.imported.as_ref()
    }

    pub fn deployment(&self) -> Option<&DeploymentRecord> {
        self.deployment.as_ref()
    }

    /// Store `output`. The caller has already checked the writer stage.
    pub(crate) fn record(&mut self, output: StepOutput) {
        match output {
            StepOutput::Configured(config) => self.config = Some(config),
            StepOutput::Exported(artifact) => self.exported = Some(artifact),
            StepOutput::Imported(artifact) => self.imported = Some(artifact),
            StepOutput::Deployed(record) => self.deployment = Some(record),
        }
    }
}
