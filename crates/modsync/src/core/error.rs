//! Error types for the synchronizer with context and recovery information

use std::error::Error;
use std::path::PathBuf;
use thiserror::Error;

/// Every failure the synchronizer can surface, with enough context to report it once per phase
#[derive(Error, Debug)]
pub enum SyncError {
    /// Request could not be sent or its body could not be read
    #[error("Request to '{location}' failed")]
    Transport {
        location: String,
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a non-success status
    #[error("Request to '{location}' returned HTTP {status}")]
    HttpStatus {
        location: String,
        status: u16,
    },

    /// Read timeout elapsed while waiting on the server
    #[error("Request to '{location}' timed out after {duration_secs}s (check network and rerun)")]
    NetworkTimeout {
        location: String,
        duration_secs: u64,
    },

    /// Stream broke off while reading a response body
    #[error("Reading from '{location}' failed")]
    TransportIo {
        location: String,
        #[source]
        source: std::io::Error,
    },

    /// No registered handler accepts the location
    #[error("No source handler for '{location}' (supported: {supported})")]
    NoHandler {
        location: String,
        supported: String,
    },

    /// Handler understood the location but could not serve it
    #[error("Cannot serve '{location}': {reason}")]
    Protocol {
        location: String,
        reason: String,
    },

    /// Remote archive is not a readable zip
    #[error("Archive '{location}' could not be read")]
    Archive {
        location: String,
        #[source]
        source: zip::result::ZipError,
    },

    /// Provider does not allow third-party downloads of the file
    #[error("'{file}' must be downloaded manually from {url} and saved to '{destination}'")]
    ManualDownload {
        file: String,
        url: String,
        destination: PathBuf,
    },

    /// Launcher instance file is not in a shape that can be updated
    #[error("Launcher manifest '{path}' cannot be used: {reason}")]
    LauncherManifest {
        path: PathBuf,
        reason: String,
    },

    /// Digest text does not parse for its algorithm
    #[error("Malformed {algorithm} digest '{value}': {reason}")]
    MalformedDigest {
        algorithm: String,
        value: String,
        reason: String,
    },

    /// Digest algorithm tag is not registered
    #[error("Unsupported hash algorithm '{algorithm}'")]
    UnsupportedAlgorithm {
        algorithm: String,
    },

    /// Secondary metadata document does not match its index digest
    #[error("Metadata for '{file}' failed verification: expected {expected}, got {actual}")]
    MetadataIntegrity {
        file: String,
        expected: String,
        actual: String,
    },

    /// Payload does not match its declared digest
    #[error("Payload for '{file}' failed verification: expected {expected}, got {actual}")]
    PayloadIntegrity {
        file: String,
        expected: String,
        actual: String,
    },

    /// Pack descriptor or file index does not match its declared digest
    #[error("The {document} at '{location}' failed verification: expected {expected}, got {actual}")]
    DocumentIntegrity {
        document: &'static str,
        location: String,
        expected: String,
        actual: String,
    },

    /// Entry has no usable display name
    #[error("No display name can be derived for '{file}'")]
    MissingName {
        file: String,
    },

    /// Pack-relative path is not acceptable
    #[error("Invalid pack path '{path}': {reason}")]
    InvalidPath {
        path: String,
        reason: String,
    },

    /// Location text is neither a URL nor a usable local path
    #[error("Invalid location '{location}'")]
    InvalidLocation {
        location: String,
        #[source]
        source: url::ParseError,
    },

    /// Remote TOML document could not be decoded
    #[error("Could not parse {document} from '{location}'")]
    Parse {
        document: &'static str,
        location: String,
        #[source]
        source: toml::de::Error,
    },

    /// Cache file is not valid JSON for the cache model
    #[error("Cache file '{path}' is unreadable")]
    CacheFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// File system I/O errors with file context
    #[error("File operation failed on '{path}' while {operation}")]
    FileSystem {
        path: PathBuf,
        operation: FileOperation,
        #[source]
        source: std::io::Error,
    },

    /// Configuration errors
    #[error("Invalid configuration: {message}")]
    Configuration {
        message: String,
        suggestion: Option<String>,
    },
}

/// Types of file operations for error context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOperation {
    Read,
    Write,
    Create,
    Delete,
    Move,
    Metadata,
    CreateDir,
}

impl std::fmt::Display for FileOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileOperation::Read => write!(f, "reading"),
            FileOperation::Write => write!(f, "writing"),
            FileOperation::Create => write!(f, "creating"),
            FileOperation::Delete => write!(f, "deleting"),
            FileOperation::Move => write!(f, "moving"),
            FileOperation::Metadata => write!(f, "reading metadata"),
            FileOperation::CreateDir => write!(f, "creating directory"),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    pub(crate) fn file_system(
        path: impl Into<PathBuf>,
        operation: FileOperation,
        source: std::io::Error,
    ) -> Self {
        SyncError::FileSystem {
            path: path.into(),
            operation,
            source,
        }
    }

    /// Whether rerunning the whole process has a chance of succeeding
    pub fn is_recoverable(&self) -> bool {
        match self {
            SyncError::Transport { source, .. } => source
                .status()
                .map_or(true, |status| status.is_server_error() || status == 429),
            SyncError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            SyncError::NetworkTimeout { .. } => true,
            SyncError::TransportIo { .. } => true,
            SyncError::FileSystem { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            SyncError::Transport { .. }
            | SyncError::HttpStatus { .. }
            | SyncError::NetworkTimeout { .. }
            | SyncError::TransportIo { .. } => "transport",
            SyncError::NoHandler { .. } => "no_handler",
            SyncError::Protocol { .. } | SyncError::Archive { .. } => "protocol",
            SyncError::ManualDownload { .. } => "manual_download",
            SyncError::LauncherManifest { .. } => "launcher_manifest",
            SyncError::MalformedDigest { .. } => "malformed_digest",
            SyncError::UnsupportedAlgorithm { .. } => "unsupported_algorithm",
            SyncError::MetadataIntegrity { .. } => "metadata_integrity",
            SyncError::PayloadIntegrity { .. } => "payload_integrity",
            SyncError::DocumentIntegrity { .. } => "document_integrity",
            SyncError::MissingName { .. } => "missing_name",
            SyncError::InvalidPath { .. } => "invalid_path",
            SyncError::InvalidLocation { .. } => "invalid_location",
            SyncError::Parse { .. } => "parse",
            SyncError::CacheFormat { .. } => "cache_format",
            SyncError::FileSystem { .. } => "file_system",
            SyncError::Configuration { .. } => "configuration",
        }
    }

    /// Get severity level for error prioritization
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            SyncError::MissingName { .. } => ErrorSeverity::Low,
            SyncError::ManualDownload { .. } => ErrorSeverity::Medium,
            SyncError::Transport { .. }
            | SyncError::HttpStatus { .. }
            | SyncError::NetworkTimeout { .. }
            | SyncError::TransportIo { .. } => ErrorSeverity::Medium,
            SyncError::DocumentIntegrity { .. } | SyncError::CacheFormat { .. } => {
                ErrorSeverity::Critical
            }
            _ => ErrorSeverity::High,
        }
    }

    /// Get user-friendly suggestion for resolving the error
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            SyncError::NetworkTimeout { .. } | SyncError::TransportIo { .. } => {
                Some("Check your internet connection and run the update again")
            }
            SyncError::NoHandler { .. } => Some("Use an http(s), file or GitHub blob location"),
            SyncError::MetadataIntegrity { .. }
            | SyncError::PayloadIntegrity { .. }
            | SyncError::DocumentIntegrity { .. } => {
                Some("The pack was probably updated mid-run or is corrupt; ask the pack author to refresh its index")
            }
            SyncError::CacheFormat { .. } => {
                Some("Delete the cache file to force a full reinstall")
            }
            SyncError::ManualDownload { .. } => {
                Some("Download the file in a browser, save it where the message says and run the update again")
            }
            SyncError::LauncherManifest { .. } => {
                Some("Fix or remove mmc-pack.json, or point --multimc-folder at the right instance")
            }
            SyncError::Configuration { suggestion, .. } => suggestion.as_deref(),
            _ => None,
        }
    }

    /// Create a detailed error report for debugging
    pub fn detailed_report(&self) -> String {
        let mut report = format!("Error: {}\n", self);
        report.push_str(&format!("Category: {}\n", self.category()));
        report.push_str(&format!("Severity: {:?}\n", self.severity()));
        report.push_str(&format!("Recoverable: {}\n", self.is_recoverable()));

        if let Some(suggestion) = self.suggestion() {
            report.push_str(&format!("Suggestion: {}\n", suggestion));
        }

        let mut cause = self.source();
        while let Some(err) = cause {
            report.push_str(&format!("Caused by: {}\n", err));
            cause = err.source();
        }

        report
    }
}

/// Error severity levels for prioritization
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}
