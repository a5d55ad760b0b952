//! Reconciliation of a local pack folder with its remote pack
//!
//! [`UpdateManager`] drives the whole run: it loads the cache, short-circuits when nothing
//! changed, then pushes every index entry through a [`DownloadTask`] in two bounded concurrent
//! phases (metadata, then downloads) and persists the merged cache. CurseForge links are looked
//! up in one batch between the two phases, and a MultiMC instance gets its component versions
//! synced right after the pack descriptor is read. All interaction with a person goes through a
//! [`UserInterface`].

mod console;
mod launcher;
mod manager;
mod task;
mod ui;

pub use console::ConsoleInterface;
pub use launcher::{sync_multimc, LauncherStatus, MULTIMC_MANIFEST};
pub use manager::{UpdateManager, UpdateOutcome};
pub use task::{DownloadTask, TaskContext, TaskOutcome, TaskReport, TaskState};
pub use ui::{
    ComponentChange, FailureDecision, FailureReport, InstallProgress, LauncherDecision,
    OptionChoice, UserInterface,
};
