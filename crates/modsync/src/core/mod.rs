//! Core types used throughout the synchronizer
//!
//! Errors, configuration, file helpers and run counters. Everything else depends on these and
//! they depend on nothing but the hash layer.

pub mod config;
pub mod error;
pub mod files;
pub mod metrics;

pub use config::{SyncConfig, UpdateOptions, DEFAULT_CACHE_FILE};
pub use error::{ErrorSeverity, FileOperation, Result, SyncError};
pub use metrics::{SyncMetrics, UpdateSummary};
