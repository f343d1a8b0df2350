// ABOUTME: Application-wide error types for hal-agent.
// ABOUTME: Uses thiserror for configuration, job file, and I/O failures.

use std::path::PathBuf;
use thiserror::Error;

use crate::job::{JobKind, Platform};

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("platform {platform} cannot run {kind} jobs")]
    PlatformMismatch { platform: Platform, kind: JobKind },

    #[error("pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),

    #[error("{0}")]
    JobFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
