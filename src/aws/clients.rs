// ABOUTME: Async traits for the AWS services the agent talks to.
// ABOUTME: Each trait exposes only the operations the pipelines use; SDK glue implements them.

use async_trait::async_trait;
use std::sync::Arc;

use super::error::AwsError;
use super::types::{
    ApplicationVersionRequest, CommandInvocation, CreateDeploymentRequest, DeploymentInfo,
    EnvironmentDescription, InstanceHealth, PutObjectRequest, S3Location, SendCommandRequest,
};
use crate::types::{CommandId, DeploymentId, InstanceId, TagFilters};

pub type AwsResult<T> = Result<T, AwsError>;

#[async_trait]
pub trait Ec2Api: Send + Sync {
    /// Running instances matching every filter.
    async fn describe_running_instances(&self, filters: &TagFilters) -> AwsResult<Vec<InstanceId>>;
}

/// Classic Elastic Load Balancing.
#[async_trait]
pub trait ElbApi: Send + Sync {
    /// Health of `instances` on `load_balancer`, or of every registered
    /// instance when `instances` is empty.
    async fn describe_instance_health(
        &self,
        load_balancer: &str,
        instances: &[InstanceId],
    ) -> AwsResult<Vec<InstanceHealth>>;

    async fn register_instances(&self, load_balancer: &str, instances: &[InstanceId])
    -> AwsResult<()>;

    async fn deregister_instances(
        &self,
        load_balancer: &str,
        instances: &[InstanceId],
    ) -> AwsResult<()>;
}

#[async_trait]
pub trait CodeDeployApi: Send + Sync {
    async fn create_deployment(&self, request: &CreateDeploymentRequest) -> AwsResult<DeploymentId>;

    async fn get_deployment(&self, id: &DeploymentId) -> AwsResult<DeploymentInfo>;
}

#[async_trait]
pub trait BeanstalkApi: Send + Sync {
    async fn create_application_version(&self, request: &ApplicationVersionRequest)
    -> AwsResult<()>;

    async fn update_environment(&self, environment: &str, version_label: &str) -> AwsResult<()>;

    async fn describe_environment(&self, environment: &str) -> AwsResult<EnvironmentDescription>;
}

/// Error code SSM returns while an invocation has not been created yet.
pub const INVOCATION_DOES_NOT_EXIST: &str = "InvocationDoesNotExist";

#[async_trait]
pub trait SsmApi: Send + Sync {
    async fn send_command(&self, request: &SendCommandRequest) -> AwsResult<CommandId>;

    async fn get_command_invocation(
        &self,
        command: &CommandId,
        instance: &InstanceId,
    ) -> AwsResult<CommandInvocation>;
}

#[async_trait]
pub trait S3Api: Send + Sync {
    async fn put_object(&self, request: &PutObjectRequest) -> AwsResult<()>;

    /// Deleting a missing object succeeds.
    async fn delete_object(&self, location: &S3Location) -> AwsResult<()>;
}

/// Builds region-scoped clients. Credential resolution lives behind this seam.
pub trait AwsClientProvider: Send + Sync {
    fn ec2(&self, region: &str) -> AwsResult<Arc<dyn Ec2Api>>;
    fn elb(&self, region: &str) -> AwsResult<Arc<dyn ElbApi>>;
    fn codedeploy(&self, region: &str) -> AwsResult<Arc<dyn CodeDeployApi>>;
    fn beanstalk(&self, region: &str) -> AwsResult<Arc<dyn BeanstalkApi>>;
    fn ssm(&self, region: &str) -> AwsResult<Arc<dyn SsmApi>>;
    fn s3(&self, region: &str) -> AwsResult<Arc<dyn S3Api>>;
}
