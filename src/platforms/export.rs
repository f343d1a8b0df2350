// ABOUTME: Export stage shared by the deploy platforms.
// ABOUTME: Resolves the directory to ship from the workspace and the optional `source` parameter.

use serde::Deserialize;
use std::path::PathBuf;

use super::{Halt, StepResult};
use crate::pipeline::{Artifact, StepContext, StepOutcome, StepOutput};

#[derive(Debug, Deserialize)]
struct SourceParams {
    #[serde(default)]
    source: Option<PathBuf>,
}

/// Resolves `workspace/source` and checks it is a directory.
#[derive(Debug, Default)]
pub struct ExportStep;

impl ExportStep {
    async fn run(&self, ctx: StepContext<'_>) -> StepResult<StepOutcome> {
        let params: SourceParams = ctx
            .execution
            .parameters()
            .map_err(|e| Halt::failed(format!("invalid parameters: {}", e)))?;
        let workspace = ctx.execution.workspace();
        let dir = match params.source {
            Some(source) if source.is_absolute() => source,
            Some(source) => workspace.join(source),
            None => workspace.to_path_buf(),
        };

        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => {
                ctx.info(&format!("Exporting {}", dir.display()));
                Ok(StepOutcome::produced(StepOutput::Exported(Artifact::Directory(dir))))
            }
            Ok(_) => Err(Halt::failed(format!("{} is not a directory", dir.display()))),
            Err(e) => Err(Halt::failed(format!("cannot read {}: {}", dir.display(), e))),
        }
    }
}

platform_step!(ExportStep, "export");
