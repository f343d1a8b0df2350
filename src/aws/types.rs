// ABOUTME: Request and status types exchanged with the AWS client traits.
// ABOUTME: Only the fields the agent interprets are modelled.

use std::fmt;
use std::path::PathBuf;

use crate::types::{CommandId, DeploymentId, InstanceId};

/// Classic ELB instance state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceState {
    InService,
    OutOfService,
    Unknown(String),
}

impl InstanceState {
    pub fn parse(s: &str) -> Self {
        match s {
            "InService" => InstanceState::InService,
            "OutOfService" => InstanceState::OutOfService,
            other => InstanceState::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceState::InService => f.write_str("InService"),
            InstanceState::OutOfService => f.write_str("OutOfService"),
            InstanceState::Unknown(s) => f.write_str(s),
        }
    }
}

/// One entry of a load balancer's instance-health list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceHealth {
    pub instance_id: InstanceId,
    pub state: InstanceState,
    pub reason_code: Option<String>,
    pub description: Option<String>,
}

impl InstanceHealth {
    pub fn new(instance_id: impl Into<InstanceId>, state: InstanceState) -> Self {
        Self {
            instance_id: instance_id.into(),
            state,
            reason_code: None,
            description: None,
        }
    }

    pub fn with_reason(mut self, code: &str, description: &str) -> Self {
        self.reason_code = Some(code.to_string());
        self.description = Some(description.to_string());
        self
    }

    pub fn is_in_service(&self) -> bool {
        self.state == InstanceState::InService
    }

    /// Anything other than `OutOfService` may be taking traffic.
    pub fn is_active(&self) -> bool {
        self.state != InstanceState::OutOfService
    }

    /// Reason code worth reporting. `N/A` and empty codes are neutral.
    pub fn reason(&self) -> Option<&str> {
        self.reason_code
            .as_deref()
            .filter(|code| !code.is_empty() && *code != "N/A")
    }
}

/// CodeDeploy deployment status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentStatus {
    Created,
    Queued,
    InProgress,
    Baking,
    Ready,
    Succeeded,
    Failed,
    Stopped,
    Other(String),
}

impl DeploymentStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "Created" => DeploymentStatus::Created,
            "Queued" => DeploymentStatus::Queued,
            "InProgress" => DeploymentStatus::InProgress,
            "Baking" => DeploymentStatus::Baking,
            "Ready" => DeploymentStatus::Ready,
            "Succeeded" => DeploymentStatus::Succeeded,
            "Failed" => DeploymentStatus::Failed,
            "Stopped" => DeploymentStatus::Stopped,
            other => DeploymentStatus::Other(other.to_string()),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Created | DeploymentStatus::Queued | DeploymentStatus::InProgress
        )
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeploymentStatus::Created => "Created",
            DeploymentStatus::Queued => "Queued",
            DeploymentStatus::InProgress => "InProgress",
            DeploymentStatus::Baking => "Baking",
            DeploymentStatus::Ready => "Ready",
            DeploymentStatus::Succeeded => "Succeeded",
            DeploymentStatus::Failed => "Failed",
            DeploymentStatus::Stopped => "Stopped",
            DeploymentStatus::Other(s) => s,
        };
        f.write_str(s)
    }
}

/// Per-instance counters reported with a CodeDeploy deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeploymentOverview {
    pub pending: u64,
    pub in_progress: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
}

impl fmt::Display for DeploymentOverview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pending {}, in progress {}, succeeded {}, failed {}, skipped {}",
            self.pending, self.in_progress, self.succeeded, self.failed, self.skipped
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentInfo {
    pub id: DeploymentId,
    pub status: DeploymentStatus,
    pub overview: DeploymentOverview,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

/// Where a revision bundle lives in S3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Location {
    pub bucket: String,
    pub key: String,
}

impl fmt::Display for S3Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDeploymentRequest {
    pub application: String,
    pub deployment_group: String,
    pub deployment_config: String,
    pub revision: S3Location,
    pub description: String,
}

/// Elastic Beanstalk environment status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentStatus {
    Launching,
    Updating,
    Ready,
    Terminating,
    Terminated,
    Other(String),
}

impl EnvironmentStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "Launching" => EnvironmentStatus::Launching,
            "Updating" => EnvironmentStatus::Updating,
            "Ready" => EnvironmentStatus::Ready,
            "Terminating" => EnvironmentStatus::Terminating,
            "Terminated" => EnvironmentStatus::Terminated,
            other => EnvironmentStatus::Other(other.to_string()),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, EnvironmentStatus::Launching | EnvironmentStatus::Updating)
    }
}

impl fmt::Display for EnvironmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EnvironmentStatus::Launching => "Launching",
            EnvironmentStatus::Updating => "Updating",
            EnvironmentStatus::Ready => "Ready",
            EnvironmentStatus::Terminating => "Terminating",
            EnvironmentStatus::Terminated => "Terminated",
            EnvironmentStatus::Other(s) => s,
        };
        f.write_str(s)
    }
}

/// Elastic Beanstalk environment health color.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentHealth {
    Green,
    Yellow,
    Red,
    Grey,
    Other(String),
}

impl EnvironmentHealth {
    pub fn parse(s: &str) -> Self {
        match s {
            "Green" => EnvironmentHealth::Green,
            "Yellow" => EnvironmentHealth::Yellow,
            "Red" => EnvironmentHealth::Red,
            "Grey" => EnvironmentHealth::Grey,
            other => EnvironmentHealth::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EnvironmentHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EnvironmentHealth::Green => "Green",
            EnvironmentHealth::Yellow => "Yellow",
            EnvironmentHealth::Red => "Red",
            EnvironmentHealth::Grey => "Grey",
            EnvironmentHealth::Other(s) => s,
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentDescription {
    pub environment_id: String,
    pub status: EnvironmentStatus,
    pub health: EnvironmentHealth,
    pub version_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationVersionRequest {
    pub application: String,
    pub version_label: String,
    pub description: String,
    pub source: S3Location,
}

/// SSM command invocation status for one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationStatus {
    Pending,
    InProgress,
    Delayed,
    Success,
    Cancelled,
    Cancelling,
    TimedOut,
    Failed,
    Other(String),
}

impl InvocationStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "Pending" => InvocationStatus::Pending,
            "InProgress" => InvocationStatus::InProgress,
            "Delayed" => InvocationStatus::Delayed,
            "Success" => InvocationStatus::Success,
            "Cancelled" => InvocationStatus::Cancelled,
            "Cancelling" => InvocationStatus::Cancelling,
            "TimedOut" => InvocationStatus::TimedOut,
            "Failed" => InvocationStatus::Failed,
            other => InvocationStatus::Other(other.to_string()),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            InvocationStatus::Pending
                | InvocationStatus::InProgress
                | InvocationStatus::Delayed
                | InvocationStatus::Cancelling
        )
    }
}

impl fmt::Display for InvocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvocationStatus::Pending => "Pending",
            InvocationStatus::InProgress => "InProgress",
            InvocationStatus::Delayed => "Delayed",
            InvocationStatus::Success => "Success",
            InvocationStatus::Cancelled => "Cancelled",
            InvocationStatus::Cancelling => "Cancelling",
            InvocationStatus::TimedOut => "TimedOut",
            InvocationStatus::Failed => "Failed",
            InvocationStatus::Other(s) => s,
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub command_id: CommandId,
    pub instance_id: InstanceId,
    pub status: InvocationStatus,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendCommandRequest {
    pub instance_ids: Vec<InstanceId>,
    pub document: String,
    pub commands: Vec<String>,
    pub working_directory: Option<String>,
    pub comment: String,
}

/// Local file to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutObjectRequest {
    pub location: S3Location,
    pub source: PathBuf,
    pub content_type: Option<String>,
}
