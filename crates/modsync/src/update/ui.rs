//! Contract between the orchestrator and whatever presents the run to a person

use std::fmt;

use crate::core::error::SyncError;

/// One progress line, optionally positioned within a phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallProgress {
    pub message: String,
    /// `(current, total)`, 1-based
    pub step: Option<(usize, usize)>,
}

impl InstallProgress {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            step: None,
        }
    }

    pub fn with_step<S: Into<String>>(message: S, current: usize, total: usize) -> Self {
        Self {
            message: message.into(),
            step: Some((current, total)),
        }
    }
}

impl fmt::Display for InstallProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.step {
            Some((current, total)) => write!(f, "({}/{}) {}", current, total, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Answer to a batch of per-file failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDecision {
    /// Carry on without the failed files
    Continue,
    /// Abort the run without saving anything
    Cancel,
    /// Stop here and leave the installation as it is, without treating it as an error
    Ignore,
}

/// Answer to a proposed launcher component change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LauncherDecision {
    /// Write the new component versions
    Update,
    /// Leave the launcher alone and carry on with the files
    Skip,
    Cancel,
}

/// A launcher component whose version differs from what the pack wants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentChange {
    /// Pack-side name, e.g. `minecraft` or `fabric`
    pub component: String,
    pub current: Option<String>,
    /// `None` when the component is removed for the launcher to recreate
    pub wanted: Option<String>,
}

impl fmt::Display for ComponentChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} -> {}",
            self.component,
            self.current.as_deref().unwrap_or("none"),
            self.wanted.as_deref().unwrap_or("removed")
        )
    }
}

/// A file that could not be processed in some phase
#[derive(Debug)]
pub struct FailureReport {
    pub name: String,
    pub error: SyncError,
}

/// An optional file whose inclusion the user decides
pub trait OptionChoice: Send {
    fn name(&self) -> String;
    fn description(&self) -> Option<&str>;
    fn value(&self) -> bool;
    fn set_value(&mut self, value: bool);
}

pub trait UserInterface: Send + Sync {
    fn report_progress(&self, progress: InstallProgress);

    /// Called at most once per phase with every failure of that phase
    fn present_failures(
        &self,
        failures: &[FailureReport],
        total: usize,
        allow_ignore: bool,
    ) -> FailureDecision;

    /// Let the user toggle optional files in place; returns `true` if the run was cancelled
    fn present_options(&self, options: &mut [&mut dyn OptionChoice]) -> bool;

    /// Ask before rewriting the launcher's component versions
    fn confirm_launcher_update(&self, changes: &[ComponentChange]) -> LauncherDecision;

    /// Show an error that ends the run
    fn report_fatal(&self, error: &SyncError);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_renders_step_prefix() {
        assert_eq!(
            InstallProgress::with_step("Downloaded Sodium", 3, 10).to_string(),
            "(3/10) Downloaded Sodium"
        );
        assert_eq!(InstallProgress::new("Loading pack file...").to_string(), "Loading pack file...");
    }

    #[test]
    fn component_change_names_both_versions() {
        let change = ComponentChange {
            component: "fabric".to_string(),
            current: Some("0.14.21".to_string()),
            wanted: Some("0.15.0".to_string()),
        };
        assert_eq!(change.to_string(), "fabric: 0.14.21 -> 0.15.0");
    }
}
