// ABOUTME: Blue/green traffic swap between two classic load balancers.
// ABOUTME: Discovers tagged instances, validates membership, swaps in two ordered directions, then checks health.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use super::clients::{Ec2Api, ElbApi};
use super::error::AwsError;
use super::types::InstanceHealth;
use crate::events::{EventContext, EventLogger};
use crate::types::{InstanceId, TagFilters};
use crate::waiter::{Attempt, Poll, Progress, WaitError, Waiter};

/// Why a swap did not complete.
#[derive(Debug, thiserror::Error)]
pub enum SwapError {
    #[error("no running instances match {filters}")]
    NoInstances { filters: String },

    #[error("load balancer {load_balancer} is serving instances outside the tagged set: {}", join(.instances))]
    UnknownActive {
        load_balancer: String,
        instances: Vec<InstanceId>,
    },

    #[error("every tagged instance is already in {load_balancer}; nothing to swap in")]
    NothingToSwap { load_balancer: String },

    #[error("waited for {load_balancer} {attempts} times but it did not settle; outcome unknown")]
    Timeout {
        load_balancer: String,
        attempts: u32,
    },

    #[error("instances not in service on {load_balancer}: {}", join(.instances))]
    Unhealthy {
        load_balancer: String,
        instances: Vec<InstanceId>,
    },

    #[error(transparent)]
    Aws(#[from] AwsError),
}

impl SwapError {
    /// Remote or validation failure the step reports as a failed outcome.
    pub fn is_expected(&self) -> bool {
        match self {
            SwapError::Aws(e) => e.is_expected(),
            _ => true,
        }
    }
}

fn join(ids: &[InstanceId]) -> String {
    ids.iter()
        .map(InstanceId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// What to swap and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRequest {
    pub filters: TagFilters,
    pub active_lb: String,
    pub passive_lb: String,
}

/// Result of discovery and validation. Input to [`BlueGreenSwap::swap_all`] and
/// [`BlueGreenSwap::verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapPlan {
    pub active_lb: String,
    pub passive_lb: String,
    /// Tagged instances the active load balancer currently holds.
    pub active_set: Vec<InstanceId>,
    /// Tagged instances outside the active load balancer.
    pub passive_set: Vec<InstanceId>,
    /// Members of `passive_set` the passive load balancer currently holds.
    pub passive_registered: Vec<InstanceId>,
}

impl fmt::Display for SwapPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} [{}], {} -> {} [{}]",
            self.active_lb,
            self.passive_lb,
            join(&self.active_set),
            self.passive_lb,
            self.active_lb,
            join(&self.passive_set)
        )
    }
}

/// Drives a blue/green swap through EC2 and ELB clients.
pub struct BlueGreenSwap {
    ec2: Arc<dyn Ec2Api>,
    elb: Arc<dyn ElbApi>,
    waiter: Waiter,
    progress: Progress,
}

impl BlueGreenSwap {
    pub fn new(ec2: Arc<dyn Ec2Api>, elb: Arc<dyn ElbApi>, waiter: Waiter, progress: Progress) -> Self {
        Self {
            ec2,
            elb,
            waiter,
            progress,
        }
    }

    /// Running instances matching `filters`. Zero matches is an error.
    pub async fn find_tagged_instances(
        &self,
        filters: &TagFilters,
    ) -> Result<Vec<InstanceId>, SwapError> {
        let instances = self.ec2.describe_running_instances(filters).await?;
        if instances.is_empty() {
            return Err(SwapError::NoInstances {
                filters: filters.to_string(),
            });
        }
        Ok(instances)
    }

    /// Tagged instances registered with `load_balancer`.
    ///
    /// Fails when the load balancer holds an instance outside `tagged` that is
    /// anything but `OutOfService`. Out-of-service strangers are logged and ignored.
    pub async fn valid_instances(
        &self,
        load_balancer: &str,
        tagged: &[InstanceId],
        logger: &dyn EventLogger,
    ) -> Result<Vec<InstanceId>, SwapError> {
        let health = self.elb.describe_instance_health(load_balancer, &[]).await?;
        let tagged: HashSet<&InstanceId> = tagged.iter().collect();

        let (known, unknown): (Vec<InstanceHealth>, Vec<InstanceHealth>) = health
            .into_iter()
            .partition(|h| tagged.contains(&h.instance_id));

        let mut active_strangers = Vec::new();
        for record in unknown {
            if record.is_active() {
                active_strangers.push(record.instance_id);
                continue;
            }
            let mut context = EventContext::new()
                .with("lb", load_balancer)
                .with("instance", &record.instance_id);
            if let Some(reason) = record.reason() {
                context.insert("reason", reason);
            }
            logger.info("Ignoring out-of-service instance outside the tagged set", &context);
        }

        if !active_strangers.is_empty() {
            return Err(SwapError::UnknownActive {
                load_balancer: load_balancer.to_string(),
                instances: active_strangers,
            });
        }

        Ok(known.into_iter().map(|h| h.instance_id).collect())
    }

    /// Discover tagged instances and validate both load balancers.
    pub async fn plan(
        &self,
        request: &SwapRequest,
        logger: &dyn EventLogger,
    ) -> Result<SwapPlan, SwapError> {
        let tagged = self.find_tagged_instances(&request.filters).await?;
        let in_active = self
            .valid_instances(&request.active_lb, &tagged, logger)
            .await?;
        let in_passive = self
            .valid_instances(&request.passive_lb, &tagged, logger)
            .await?;

        let in_active: HashSet<&InstanceId> = in_active.iter().collect();
        let (active_set, passive_set): (Vec<InstanceId>, Vec<InstanceId>) = tagged
            .iter()
            .cloned()
            .partition(|id| in_active.contains(id));

        if passive_set.is_empty() {
            return Err(SwapError::NothingToSwap {
                load_balancer: request.active_lb.clone(),
            });
        }

        let passive_registered = in_passive
            .into_iter()
            .filter(|id| passive_set.contains(id))
            .collect();

        Ok(SwapPlan {
            active_lb: request.active_lb.clone(),
            passive_lb: request.passive_lb.clone(),
            active_set,
            passive_set,
            passive_registered,
        })
    }

    /// Register and deregister on one load balancer, then wait until the
    /// registered instances are in service and the deregistered ones are out.
    pub async fn swap(
        &self,
        load_balancer: &str,
        register: &[InstanceId],
        deregister: &[InstanceId],
        logger: &dyn EventLogger,
    ) -> Result<(), SwapError> {
        let context = EventContext::new()
            .with("lb", load_balancer)
            .with("register", join(register))
            .with("deregister", join(deregister));
        logger.info("Swapping instances", &context);

        if !register.is_empty() {
            self.elb.register_instances(load_balancer, register).await?;
        }
        if !deregister.is_empty() {
            self.elb.deregister_instances(load_balancer, deregister).await?;
        }

        let elb = &self.elb;
        let progress = self.progress;
        let result = self
            .waiter
            .wait(|attempt: Attempt| async move {
                let health = elb.describe_instance_health(load_balancer, &[]).await?;
                let settled = SettleCheck::new(&health, register, deregister);
                if settled.is_done() {
                    return Ok(Poll::Done);
                }
                if progress.should_report(attempt) {
                    logger.info(
                        &format!(
                            "Waiting for {}: {}/{} in service, {} still registered",
                            load_balancer,
                            settled.in_service,
                            settled.expected,
                            settled.lingering
                        ),
                        &EventContext::new().with("attempt", attempt.number),
                    );
                }
                Ok::<_, AwsError>(Poll::Continue)
            })
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(WaitError::Timeout { attempts }) => Err(SwapError::Timeout {
                load_balancer: load_balancer.to_string(),
                attempts,
            }),
            Err(WaitError::Predicate(e)) => Err(SwapError::Aws(e)),
        }
    }

    /// Both directions, passive load balancer first.
    pub async fn swap_all(&self, plan: &SwapPlan, logger: &dyn EventLogger) -> Result<(), SwapError> {
        self.swap(
            &plan.passive_lb,
            &plan.active_set,
            &plan.passive_registered,
            logger,
        )
        .await?;
        self.swap(&plan.active_lb, &plan.passive_set, &plan.active_set, logger)
            .await
    }

    /// Check that `expected` are all `InService` on `load_balancer`.
    pub async fn verify_health(
        &self,
        load_balancer: &str,
        expected: &[InstanceId],
    ) -> Result<(), SwapError> {
        let health = self.elb.describe_instance_health(load_balancer, &[]).await?;
        let unhealthy: Vec<InstanceId> = expected
            .iter()
            .filter(|id| {
                !health
                    .iter()
                    .any(|h| &h.instance_id == *id && h.is_in_service())
            })
            .cloned()
            .collect();

        if unhealthy.is_empty() {
            Ok(())
        } else {
            Err(SwapError::Unhealthy {
                load_balancer: load_balancer.to_string(),
                instances: unhealthy,
            })
        }
    }

    /// Post-swap health of both load balancers.
    pub async fn verify(&self, plan: &SwapPlan) -> Result<(), SwapError> {
        self.verify_health(&plan.active_lb, &plan.passive_set).await?;
        if !plan.active_set.is_empty() {
            self.verify_health(&plan.passive_lb, &plan.active_set).await?;
        }
        Ok(())
    }

    /// Plan, swap and verify in one go.
    pub async fn run(&self, request: &SwapRequest, logger: &dyn EventLogger) -> Result<SwapPlan, SwapError> {
        let plan = self.plan(request, logger).await?;
        self.swap_all(&plan, logger).await?;
        self.verify(&plan).await?;
        Ok(plan)
    }
}

struct SettleCheck {
    expected: usize,
    in_service: usize,
    lingering: usize,
}

impl SettleCheck {
    fn new(health: &[InstanceHealth], register: &[InstanceId], deregister: &[InstanceId]) -> Self {
        let in_service = register
            .iter()
            .filter(|id| {
                health
                    .iter()
                    .any(|h| &h.instance_id == *id && h.is_in_service())
            })
            .count();
        // Deregistered instances may linger as OutOfService or vanish from the list.
        let lingering = deregister
            .iter()
            .filter(|id| health.iter().any(|h| &h.instance_id == *id && h.is_active()))
            .count();
        Self {
            expected: register.len(),
            in_service,
            lingering,
        }
    }

    fn is_done(&self) -> bool {
        self.in_service == self.expected && self.lingering == 0
    }
}
