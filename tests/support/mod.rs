// ABOUTME: Test support utilities.
// ABOUTME: Provides in-memory AWS clients, a recording executor, job builders, and tracing setup.

#![allow(dead_code)]

use async_trait::async_trait;
use hal_agent::aws::types::{
    ApplicationVersionRequest, CommandInvocation, CreateDeploymentRequest, DeploymentInfo,
    DeploymentOverview, DeploymentStatus, EnvironmentDescription, InstanceHealth, InstanceState,
    PutObjectRequest, S3Location, SendCommandRequest,
};
use hal_agent::aws::{
    AwsClientProvider, AwsError, AwsResult, BeanstalkApi, CodeDeployApi, Ec2Api, ElbApi, S3Api,
    SsmApi,
};
use hal_agent::config::{ServerConfig, WaiterConfig, WaitersConfig};
use hal_agent::exec::{CommandExecutor, CommandOutput, ExecError, RemoteConnector};
use hal_agent::job::{Job, JobExecution, Platform};
use hal_agent::platforms::Services;
use hal_agent::types::{CommandId, DeploymentId, InstanceId, JobId, TagFilters};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Once};
use std::time::Duration;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("hal_agent=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn ids(values: &[&str]) -> Vec<InstanceId> {
    values.iter().map(|v| InstanceId::new(*v)).collect()
}

/// Waiters that never sleep long enough to matter in tests.
pub fn fast_waiters() -> WaitersConfig {
    let fast = WaiterConfig::new(Duration::from_millis(1), 5, 0);
    WaitersConfig {
        codedeploy: fast,
        beanstalk: fast,
        elb: fast,
        ssm: fast,
    }
}

pub fn job(platform: Platform) -> Job {
    Job {
        id: JobId::new("r.101"),
        kind: platform.job_kind(),
        platform,
        environment: Some("staging".to_string()),
        reference: Some("main".to_string()),
        commit: Some("9c1e77a".to_string()),
    }
}

pub fn execution(platform: Platform, workspace: &std::path::Path) -> JobExecution {
    JobExecution::new(job(platform), workspace)
}

// ---------------------------------------------------------------------------
// EC2 / ELB

pub struct MockEc2 {
    instances: Vec<InstanceId>,
}

impl MockEc2 {
    pub fn new(instances: &[&str]) -> Self {
        Self {
            instances: ids(instances),
        }
    }
}

#[async_trait]
impl Ec2Api for MockEc2 {
    async fn describe_running_instances(&self, _filters: &TagFilters) -> AwsResult<Vec<InstanceId>> {
        Ok(self.instances.clone())
    }
}

/// A stateful classic ELB. Registered instances come up `InService` at once.
#[derive(Default)]
pub struct MockElb {
    balancers: Mutex<HashMap<String, Vec<InstanceHealth>>>,
    mutations: Mutex<HashMap<String, usize>>,
    failing: Mutex<Option<String>>,
    stuck: Mutex<Option<String>>,
}

impl MockElb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, load_balancer: &str, health: Vec<InstanceHealth>) -> Self {
        self.balancers
            .lock()
            .insert(load_balancer.to_string(), health);
        self
    }

    /// Every register or deregister call on `load_balancer` fails.
    pub fn failing_on(self, load_balancer: &str) -> Self {
        *self.failing.lock() = Some(load_balancer.to_string());
        self
    }

    /// Instances registered on `load_balancer` never leave `OutOfService`.
    pub fn stuck_on(self, load_balancer: &str) -> Self {
        *self.stuck.lock() = Some(load_balancer.to_string());
        self
    }

    /// Register and deregister calls made against `load_balancer`.
    pub fn mutations(&self, load_balancer: &str) -> usize {
        self.mutations
            .lock()
            .get(load_balancer)
            .copied()
            .unwrap_or(0)
    }

    pub fn registered(&self, load_balancer: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .balancers
            .lock()
            .get(load_balancer)
            .map(|h| h.iter().map(|h| h.instance_id.to_string()).collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    fn mutate(&self, load_balancer: &str) -> AwsResult<()> {
        *self
            .mutations
            .lock()
            .entry(load_balancer.to_string())
            .or_default() += 1;
        if self.failing.lock().as_deref() == Some(load_balancer) {
            return Err(AwsError::service("elb", "Throttling", "Rate exceeded"));
        }
        Ok(())
    }
}

#[async_trait]
impl ElbApi for MockElb {
    async fn describe_instance_health(
        &self,
        load_balancer: &str,
        instances: &[InstanceId],
    ) -> AwsResult<Vec<InstanceHealth>> {
        let balancers = self.balancers.lock();
        let health = balancers.get(load_balancer).cloned().unwrap_or_default();
        if instances.is_empty() {
            return Ok(health);
        }
        Ok(health
            .into_iter()
            .filter(|h| instances.contains(&h.instance_id))
            .collect())
    }

    async fn register_instances(&self, load_balancer: &str, instances: &[InstanceId]) -> AwsResult<()> {
        self.mutate(load_balancer)?;
        let state = if self.stuck.lock().as_deref() == Some(load_balancer) {
            InstanceState::OutOfService
        } else {
            InstanceState::InService
        };
        let mut balancers = self.balancers.lock();
        let health = balancers.entry(load_balancer.to_string()).or_default();
        for id in instances {
            health.retain(|h| &h.instance_id != id);
            health.push(InstanceHealth::new(id.clone(), state.clone()));
        }
        Ok(())
    }

    async fn deregister_instances(
        &self,
        load_balancer: &str,
        instances: &[InstanceId],
    ) -> AwsResult<()> {
        self.mutate(load_balancer)?;
        let mut balancers = self.balancers.lock();
        if let Some(health) = balancers.get_mut(load_balancer) {
            health.retain(|h| !instances.contains(&h.instance_id));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CodeDeploy

/// Returns scripted statuses in order, repeating the last one.
pub struct MockCodeDeploy {
    statuses: Mutex<VecDeque<DeploymentStatus>>,
    pub created: Mutex<Vec<CreateDeploymentRequest>>,
    pub polls: Mutex<u32>,
}

impl MockCodeDeploy {
    pub fn new(statuses: Vec<DeploymentStatus>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            created: Mutex::new(Vec::new()),
            polls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl CodeDeployApi for MockCodeDeploy {
    async fn create_deployment(&self, request: &CreateDeploymentRequest) -> AwsResult<DeploymentId> {
        self.created.lock().push(request.clone());
        Ok(DeploymentId::new("d-TEST0001"))
    }

    async fn get_deployment(&self, id: &DeploymentId) -> AwsResult<DeploymentInfo> {
        *self.polls.lock() += 1;
        let mut statuses = self.statuses.lock();
        let next = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().cloned()
        };
        let status = next.unwrap_or(DeploymentStatus::Succeeded);

        let failed = status == DeploymentStatus::Failed;
        Ok(DeploymentInfo {
            id: id.clone(),
            status,
            overview: DeploymentOverview::default(),
            error_code: failed.then(|| "HEALTH_CONSTRAINTS".to_string()),
            error_message: failed.then(|| "too many individual instances failed".to_string()),
        })
    }
}

// ---------------------------------------------------------------------------
// Beanstalk

pub struct MockBeanstalk {
    pub description: Mutex<EnvironmentDescription>,
    pub versions: Mutex<Vec<ApplicationVersionRequest>>,
}

impl MockBeanstalk {
    pub fn new(description: EnvironmentDescription) -> Self {
        Self {
            description: Mutex::new(description),
            versions: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl BeanstalkApi for MockBeanstalk {
    async fn create_application_version(&self, request: &ApplicationVersionRequest) -> AwsResult<()> {
        self.versions.lock().push(request.clone());
        Ok(())
    }

    async fn update_environment(&self, _environment: &str, version_label: &str) -> AwsResult<()> {
        self.description.lock().version_label = Some(version_label.to_string());
        Ok(())
    }

    async fn describe_environment(&self, _environment: &str) -> AwsResult<EnvironmentDescription> {
        Ok(self.description.lock().clone())
    }
}

// ---------------------------------------------------------------------------
// SSM

pub struct MockSsm {
    pub invocations: Mutex<HashMap<String, CommandInvocation>>,
    pub sent: Mutex<Vec<SendCommandRequest>>,
}

impl MockSsm {
    pub fn new(invocations: Vec<CommandInvocation>) -> Self {
        Self {
            invocations: Mutex::new(
                invocations
                    .into_iter()
                    .map(|i| (i.instance_id.to_string(), i))
                    .collect(),
            ),
            sent: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SsmApi for MockSsm {
    async fn send_command(&self, request: &SendCommandRequest) -> AwsResult<CommandId> {
        self.sent.lock().push(request.clone());
        Ok(CommandId::new("cmd-0001"))
    }

    async fn get_command_invocation(
        &self,
        _command: &CommandId,
        instance: &InstanceId,
    ) -> AwsResult<CommandInvocation> {
        self.invocations
            .lock()
            .get(instance.as_str())
            .cloned()
            .ok_or_else(|| {
                AwsError::service("ssm", "InvocationDoesNotExist", "no invocation yet")
            })
    }
}

// ---------------------------------------------------------------------------
// S3

#[derive(Default)]
pub struct MockS3 {
    pub puts: Mutex<Vec<S3Location>>,
    pub deletes: Mutex<Vec<S3Location>>,
}

#[async_trait]
impl S3Api for MockS3 {
    async fn put_object(&self, request: &PutObjectRequest) -> AwsResult<()> {
        self.puts.lock().push(request.location.clone());
        Ok(())
    }

    async fn delete_object(&self, location: &S3Location) -> AwsResult<()> {
        self.deletes.lock().push(location.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Provider

/// Hands out whichever mock clients a test installed.
#[derive(Default)]
pub struct MockProvider {
    pub ec2: Option<Arc<MockEc2>>,
    pub elb: Option<Arc<MockElb>>,
    pub codedeploy: Option<Arc<MockCodeDeploy>>,
    pub beanstalk: Option<Arc<MockBeanstalk>>,
    pub ssm: Option<Arc<MockSsm>>,
    pub s3: Option<Arc<MockS3>>,
}

fn installed<T: ?Sized>(client: Option<Arc<T>>, service: &str) -> AwsResult<Arc<T>> {
    client.ok_or_else(|| AwsError::Credentials(format!("no {} client in this test", service)))
}

impl AwsClientProvider for MockProvider {
    fn ec2(&self, _region: &str) -> AwsResult<Arc<dyn Ec2Api>> {
        installed(self.ec2.clone(), "ec2").map(|c| c as Arc<dyn Ec2Api>)
    }

    fn elb(&self, _region: &str) -> AwsResult<Arc<dyn ElbApi>> {
        installed(self.elb.clone(), "elb").map(|c| c as Arc<dyn ElbApi>)
    }

    fn codedeploy(&self, _region: &str) -> AwsResult<Arc<dyn CodeDeployApi>> {
        installed(self.codedeploy.clone(), "codedeploy").map(|c| c as Arc<dyn CodeDeployApi>)
    }

    fn beanstalk(&self, _region: &str) -> AwsResult<Arc<dyn BeanstalkApi>> {
        installed(self.beanstalk.clone(), "beanstalk").map(|c| c as Arc<dyn BeanstalkApi>)
    }

    fn ssm(&self, _region: &str) -> AwsResult<Arc<dyn SsmApi>> {
        installed(self.ssm.clone(), "ssm").map(|c| c as Arc<dyn SsmApi>)
    }

    fn s3(&self, _region: &str) -> AwsResult<Arc<dyn S3Api>> {
        installed(self.s3.clone(), "s3").map(|c| c as Arc<dyn S3Api>)
    }
}

// ---------------------------------------------------------------------------
// Executors

#[derive(Debug, Clone)]
pub struct RecordedCommand {
    pub command: String,
    pub env: HashMap<String, String>,
}

/// Records every command and succeeds unless the command contains a
/// configured failure marker.
#[derive(Default)]
pub struct RecordingExecutor {
    commands: Mutex<Vec<RecordedCommand>>,
    fail_on: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(self, marker: &str) -> Self {
        self.fail_on.lock().push(marker.to_string());
        self
    }

    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.commands.lock().clone()
    }

    pub fn ran(&self, needle: &str) -> Vec<RecordedCommand> {
        self.commands
            .lock()
            .iter()
            .filter(|c| c.command.contains(needle))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CommandExecutor for RecordingExecutor {
    async fn run(
        &self,
        command: &str,
        env: &HashMap<String, String>,
    ) -> Result<CommandOutput, ExecError> {
        self.commands.lock().push(RecordedCommand {
            command: command.to_string(),
            env: env.clone(),
        });
        let failed = self.fail_on.lock().iter().any(|m| command.contains(m));
        Ok(CommandOutput {
            exit_code: Some(if failed { 1 } else { 0 }),
            stdout: String::new(),
            stderr: if failed {
                "simulated failure".to_string()
            } else {
                String::new()
            },
        })
    }

    fn target(&self) -> String {
        "recorder".to_string()
    }
}

/// Hands out one shared executor for every server.
pub struct FixedConnector(pub Arc<RecordingExecutor>);

#[async_trait]
impl RemoteConnector for FixedConnector {
    async fn connect(&self, _server: &ServerConfig) -> Result<Arc<dyn CommandExecutor>, ExecError> {
        Ok(Arc::clone(&self.0) as Arc<dyn CommandExecutor>)
    }
}

/// Services wired to a recording local executor and fast waiters.
pub fn services(local: &Arc<RecordingExecutor>) -> Services {
    Services::new(
        Arc::clone(local) as Arc<dyn CommandExecutor>,
        Arc::new(FixedConnector(Arc::clone(local))),
    )
    .with_waiters(fast_waiters())
    .with_region(Some("us-east-1".to_string()))
}
