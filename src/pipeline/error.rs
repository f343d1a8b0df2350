// ABOUTME: Pipeline error types with SNAFU pattern.
// ABOUTME: Covers miswired pipelines and unexpected step errors, tagged with the stage.

use snafu::Snafu;

use super::stage::{PipelineKind, Stage};
use super::step::StepError;

/// Errors that escape a pipeline run. Expected failures are in the report instead.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    #[snafu(display("stage {stage} is not part of a {kind} pipeline"))]
    StageNotInPipeline { stage: Stage, kind: PipelineKind },

    #[snafu(display("stage {stage} has more than one step"))]
    DuplicateStage { stage: Stage },

    #[snafu(display("{stage} failed unexpectedly: {source}"))]
    Step { stage: Stage, source: StepError },

    #[snafu(display("{stage} produced {output} output, which only {writer} may write"))]
    UnexpectedOutput {
        stage: Stage,
        output: &'static str,
        writer: Stage,
    },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    /// The pipeline was assembled wrong.
    InvalidPipeline,
    /// A step reached a state it has no outcome for.
    StepError,
}

impl PipelineError {
    pub fn kind(&self) -> PipelineErrorKind {
        match self {
            PipelineError::StageNotInPipeline { .. }
            | PipelineError::DuplicateStage { .. }
            | PipelineError::UnexpectedOutput { .. } => PipelineErrorKind::InvalidPipeline,
            PipelineError::Step { .. } => PipelineErrorKind::StepError,
        }
    }

    /// The stage the error is attributed to.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::StageNotInPipeline { stage, .. }
            | PipelineError::DuplicateStage { stage }
            | PipelineError::Step { stage, .. }
            | PipelineError::UnexpectedOutput { stage, .. } => *stage,
        }
    }
}
