// ABOUTME: Staged pipeline engine: stages, steps, typed state, cleanup, and the runner.
// ABOUTME: Platforms plug steps into a Pipeline; the runner owns ordering and failure handling.

mod cleanup;
mod error;
mod runner;
mod stage;
mod state;
mod step;

pub use cleanup::CleanupRegistry;
pub use error::{PipelineError, PipelineErrorKind};
pub use runner::{Pipeline, PipelineBuilder, PipelineReport, RunResult};
pub use stage::{PipelineKind, Stage};
pub use state::{Artifact, DeploymentRecord, PipelineState, PlatformConfig, StepOutput};
pub use step::{
    ConfigureStep, Configurator, PlatformStep, StepContext, StepError, StepOutcome,
};
