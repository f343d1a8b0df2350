// ABOUTME: Diagnostics accumulator for non-fatal warnings during a pipeline run.
// ABOUTME: Collects problems that shouldn't change the run's result but should be shown to users.

use serde::Serialize;

/// Collects non-fatal warnings during a run.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

/// A non-fatal warning collected during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// A registered cleanup action failed.
    pub fn cleanup(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Cleanup,
            message: message.into(),
        }
    }

    /// A user hook failed where failure is not fatal.
    pub fn hook(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Hook,
            message: message.into(),
        }
    }

    /// A remote session did not close cleanly.
    pub fn disconnect(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Disconnect,
            message: message.into(),
        }
    }

    /// Events could not be written to the terminal and went to the log instead.
    pub fn logger(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Logger,
            message: message.into(),
        }
    }
}

/// Categories of warnings that can occur during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// A cleanup action failed; the resource may still exist.
    Cleanup,
    /// `after_deploy` failed after the deploy had already failed.
    Hook,
    /// Closing an SSH session failed.
    Disconnect,
    /// CLI output failed; events fell back to the tracing log.
    Logger,
}
