//! Modpack Synchronizer Library
//!
//! Keeps a local folder in sync with a remotely published modpack. A pack descriptor points at
//! a file index; the index lists every managed file with its digest, either directly or through
//! a per-file metadata document. Each run compares the remote state with a local cache, fetches
//! only what changed, verifies every byte before it is moved into place and records the result.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use modsync::{
//!     ConsoleInterface, HasherRegistry, Location, Side, SourceResolver, SyncConfig,
//!     UpdateManager, UpdateOptions, UpdateOutcome,
//! };
//!
//! # async fn example() -> modsync::Result<()> {
//! let config = SyncConfig::default();
//! let resolver = SourceResolver::with_defaults(&config)?;
//! let hashers = HasherRegistry::with_defaults();
//! let ui = ConsoleInterface::new().with_title("My Pack");
//!
//! let options = UpdateOptions::new(Location::parse("https://example.com/pack/pack.toml")?, ".")
//!     .with_side(Side::Client);
//!
//! match UpdateManager::new(options, config, &resolver, &hashers, &ui).run().await? {
//!     UpdateOutcome::Completed(summary) => println!("{} files downloaded", summary.downloaded),
//!     UpdateOutcome::AlreadyUpToDate => println!("Nothing to do"),
//!     UpdateOutcome::Cancelled | UpdateOutcome::Ignored => println!("Stopped"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Digest algorithms**: sha1, sha256, sha512, md5 and the whitespace-normalized murmur2
//! - **Sources**: http(s), local files, and files inside GitHub repositories served from a
//!   single zipball download per run
//! - **Incremental runs**: unchanged packs finish after one request; changed packs only fetch
//!   changed files
//! - **Optional files and sides**: client/server filtering and user-chosen optional files
//! - **Rollback**: a file that fails keeps its previous cache entry
//! - **CurseForge**: provider-hosted files are looked up in one batched API request; files the
//!   API may not hand out are reported with the page to download them from
//! - **MultiMC**: the instance's Minecraft and loader versions follow the pack

pub mod core;
pub mod hash;
pub mod manifest;
pub mod source;
pub mod update;

// Re-export commonly used types for convenience
pub use crate::core::{
    ErrorSeverity, Result, SyncConfig, SyncError, SyncMetrics, UpdateOptions, UpdateSummary,
    DEFAULT_CACHE_FILE,
};
pub use hash::{Digest, Hasher, HasherRegistry};
pub use manifest::{Cache, CacheEntry, PackPath, Side};
pub use source::{Location, SourceHandler, SourceResolver};
pub use update::{
    ComponentChange, ConsoleInterface, FailureDecision, FailureReport, InstallProgress,
    LauncherDecision, OptionChoice, UpdateManager, UpdateOutcome, UserInterface,
};
