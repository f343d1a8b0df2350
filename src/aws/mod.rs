// ABOUTME: AWS collaborators: client traits, status types, and convergence logic.
// ABOUTME: The blue/green swap and the CodeDeploy/Beanstalk/SSM watchers live here.

mod beanstalk;
mod clients;
mod codedeploy;
mod elb;
mod error;
mod ssm;
pub mod types;

pub use beanstalk::{EnvironmentWatcher, check_environment};
pub use clients::{
    AwsClientProvider, AwsResult, BeanstalkApi, CodeDeployApi, Ec2Api, ElbApi,
    INVOCATION_DOES_NOT_EXIST, S3Api, SsmApi,
};
pub use codedeploy::{DeploymentWatcher, check_deployment};
pub use elb::{BlueGreenSwap, SwapError, SwapPlan, SwapRequest};
pub use error::AwsError;
pub use ssm::{CommandWatcher, check_invocations};

/// How a convergence wait ended.
///
/// A settled value is the final state re-read after the wait; whether it
/// counts as success is a separate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Convergence<T> {
    Settled(T),
    /// The remote operation may still complete or fail; nothing was rolled back.
    TimedOut { attempts: u32 },
}
