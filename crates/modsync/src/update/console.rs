use tracing::{error, info, warn};

use super::ui::{
    ComponentChange, FailureDecision, FailureReport, InstallProgress, LauncherDecision,
    OptionChoice, UserInterface,
};
use crate::core::error::SyncError;

/// Non-interactive terminal front end
///
/// Progress goes to stdout, failures to stderr. Optional files keep their declared defaults and
/// launcher versions are always brought in line with the pack.
#[derive(Debug, Clone, Default)]
pub struct ConsoleInterface {
    title: Option<String>,
    continue_on_error: bool,
}

impl ConsoleInterface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title<S: Into<String>>(mut self, title: S) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Keep going past failed files instead of cancelling the run
    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    fn prefix(&self) -> String {
        match &self.title {
            Some(title) => format!("[{}] ", title),
            None => String::new(),
        }
    }
}

impl UserInterface for ConsoleInterface {
    fn report_progress(&self, progress: InstallProgress) {
        println!("{}{}", self.prefix(), progress);
    }

    fn present_failures(
        &self,
        failures: &[FailureReport],
        total: usize,
        allow_ignore: bool,
    ) -> FailureDecision {
        eprintln!(
            "{}Failed to process {} of {} files:",
            self.prefix(),
            failures.len(),
            total
        );
        for failure in failures {
            eprintln!("  {}: {}", failure.name, failure.error);
            warn!(file = %failure.name, category = failure.error.category(), "{}", failure.error);
        }

        if self.continue_on_error {
            info!("Continuing without the failed files");
            FailureDecision::Continue
        } else {
            if allow_ignore {
                eprintln!("Rerun with --continue-on-error to install the remaining files anyway.");
            }
            FailureDecision::Cancel
        }
    }

    fn present_options(&self, options: &mut [&mut dyn OptionChoice]) -> bool {
        println!("{}Optional files (using pack defaults):", self.prefix());
        for option in options.iter() {
            let state = if option.value() { "enabled" } else { "disabled" };
            match option.description() {
                Some(description) => println!("  [{}] {}: {}", state, option.name(), description),
                None => println!("  [{}] {}", state, option.name()),
            }
            info!(option = %option.name(), enabled = option.value(), "Keeping default");
        }
        false
    }

    fn confirm_launcher_update(&self, changes: &[ComponentChange]) -> LauncherDecision {
        println!("{}Updating launcher components:", self.prefix());
        for change in changes {
            println!("  {}", change);
        }
        LauncherDecision::Update
    }

    fn report_fatal(&self, err: &SyncError) {
        error!(category = err.category(), severity = ?err.severity(), "{}", err);
        eprint!("{}{}", self.prefix(), err.detailed_report());
    }
}
