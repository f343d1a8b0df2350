// ABOUTME: Pipeline stages and the two pipeline kinds.
// ABOUTME: Each kind fixes the order its stages run in.

use serde::Serialize;
use std::fmt;

use crate::job::JobKind;

/// One named phase of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Configure,
    Export,
    Build,
    Import,
    BuildTransform,
    BeforeDeploy,
    Deploy,
    Verify,
    AfterDeploy,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Configure => "configure",
            Stage::Export => "export",
            Stage::Build => "build",
            Stage::Import => "import",
            Stage::BuildTransform => "build_transform",
            Stage::BeforeDeploy => "before_deploy",
            Stage::Deploy => "deploy",
            Stage::Verify => "verify",
            Stage::AfterDeploy => "after_deploy",
        }
    }

    /// Stages whose failure still lets `after_deploy` run.
    pub fn reaches_after_deploy(&self) -> bool {
        matches!(self, Stage::Deploy | Stage::Verify)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const BUILD_STAGES: &[Stage] = &[Stage::Configure, Stage::Export, Stage::Build, Stage::Import];

const DEPLOY_STAGES: &[Stage] = &[
    Stage::Configure,
    Stage::Export,
    Stage::BuildTransform,
    Stage::BeforeDeploy,
    Stage::Deploy,
    Stage::Verify,
    Stage::AfterDeploy,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineKind {
    Build,
    Deploy,
}

impl PipelineKind {
    /// Stages in execution order.
    pub fn stages(&self) -> &'static [Stage] {
        match self {
            PipelineKind::Build => BUILD_STAGES,
            PipelineKind::Deploy => DEPLOY_STAGES,
        }
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.stages().contains(&stage)
    }
}

impl From<JobKind> for PipelineKind {
    fn from(kind: JobKind) -> Self {
        match kind {
            JobKind::Build => PipelineKind::Build,
            JobKind::Release => PipelineKind::Deploy,
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineKind::Build => f.write_str("build"),
            PipelineKind::Deploy => f.write_str("deploy"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deploy_pipeline_ends_with_after_deploy() {
        let stages = PipelineKind::Deploy.stages();
        assert_eq!(stages.first(), Some(&Stage::Configure));
        assert_eq!(stages.last(), Some(&Stage::AfterDeploy));
        assert!(!PipelineKind::Deploy.contains(Stage::Import));
    }

    #[test]
    fn build_pipeline_has_no_deploy_stages() {
        assert!(!PipelineKind::Build.contains(Stage::Deploy));
        assert!(!PipelineKind::Build.contains(Stage::AfterDeploy));
        assert_eq!(PipelineKind::Build.stages().len(), 4);
        assert_eq!(PipelineKind::Build.stages().last(), Some(&Stage::Import));
    }

    #[test]
    fn stage_names_are_snake_case() {
        assert_eq!(Stage::BuildTransform.to_string(), "build_transform");
        assert_eq!(
            serde_json::to_string(&Stage::AfterDeploy).unwrap(),
            "\"after_deploy\""
        );
    }
}
