// ABOUTME: Polling tunables for each convergence flow.
// ABOUTME: Interval, attempt budget, and progress throttle with per-flow defaults.

use serde::Deserialize;
use std::time::Duration;

use crate::waiter::{Progress, Waiter};

/// Tunables for one kind of wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct WaiterConfig {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    pub max_attempts: u32,
    /// Emit a progress line every N attempts.
    #[serde(default = "default_log_every")]
    pub log_every: u32,
}

fn default_log_every() -> u32 {
    6
}

impl WaiterConfig {
    pub const fn new(interval: Duration, max_attempts: u32, log_every: u32) -> Self {
        Self {
            interval,
            max_attempts,
            log_every,
        }
    }

    pub fn waiter(&self) -> Waiter {
        Waiter::new(self.interval, self.max_attempts)
    }

    pub fn progress(&self) -> Progress {
        Progress::every(self.log_every)
    }
}

/// Waiter tunables for every flow that polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct WaitersConfig {
    #[serde(default = "default_codedeploy")]
    pub codedeploy: WaiterConfig,
    #[serde(default = "default_beanstalk")]
    pub beanstalk: WaiterConfig,
    #[serde(default = "default_elb")]
    pub elb: WaiterConfig,
    #[serde(default = "default_ssm")]
    pub ssm: WaiterConfig,
}

impl Default for WaitersConfig {
    fn default() -> Self {
        Self {
            codedeploy: default_codedeploy(),
            beanstalk: default_beanstalk(),
            elb: default_elb(),
            ssm: default_ssm(),
        }
    }
}

fn default_codedeploy() -> WaiterConfig {
    WaiterConfig::new(Duration::from_secs(10), 90, 6)
}

fn default_beanstalk() -> WaiterConfig {
    WaiterConfig::new(Duration::from_secs(10), 90, 6)
}

fn default_elb() -> WaiterConfig {
    WaiterConfig::new(Duration::from_secs(10), 30, 3)
}

fn default_ssm() -> WaiterConfig {
    WaiterConfig::new(Duration::from_secs(5), 120, 6)
}
