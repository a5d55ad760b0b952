//! Source resolution
//!
//! Turns a [`Location`] into a byte stream. Handlers are tried in registration order and the
//! first whose `matches` predicate accepts the location serves it:
//!
//! 1. [`ArchiveHandler`] over [`GithubLayout`]: files inside a repository, served out of the
//!    repository's zipball which is fetched once per run
//! 2. [`HttpHandler`]: plain http(s) requests
//! 3. [`FileHandler`]: local `file://` paths
//!
//! No handler verifies content. Digest checks happen one layer up, around the returned stream.
//!
//! [`CurseForgeClient`] is not a handler: it turns CurseForge project and file ids into plain
//! https locations before the download phase.

mod archive;
mod curseforge;
mod file;
mod github;
mod http;
mod location;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tracing::debug;

use crate::core::config::SyncConfig;
use crate::core::error::{Result, SyncError};

pub use archive::{ArchiveEntry, ArchiveHandler, ArchiveLayout};
pub use curseforge::{CurseForgeClient, CurseForgeLookup, CurseForgeResolution};
pub use file::FileHandler;
pub use github::GithubLayout;
pub use http::HttpHandler;
pub use location::Location;

/// Unverified content as handed out by a handler
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// One way of dereferencing locations
#[async_trait]
pub trait SourceHandler: Send + Sync {
    /// Short name for logs and error messages
    fn name(&self) -> &'static str;

    /// Whether this handler is responsible for the location
    fn matches(&self, location: &Location) -> bool;

    async fn open(&self, location: &Location) -> Result<ByteStream>;
}

/// Ordered set of handlers, built once per run and shared by reference
pub struct SourceResolver {
    handlers: Vec<Arc<dyn SourceHandler>>,
}

impl SourceResolver {
    /// Create a new empty resolver
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Append a handler; earlier handlers take precedence
    pub fn register<H: SourceHandler + 'static>(self, handler: H) -> Self {
        self.register_shared(Arc::new(handler))
    }

    pub fn register_shared(mut self, handler: Arc<dyn SourceHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// GitHub archive indirection, then http(s), then local files
    pub fn with_defaults(config: &SyncConfig) -> Result<Self> {
        let http: Arc<dyn SourceHandler> = Arc::new(HttpHandler::new(config)?);
        Ok(Self::new()
            .register(ArchiveHandler::new(GithubLayout::default(), http.clone()))
            .register_shared(http)
            .register(FileHandler))
    }

    /// Join a relative reference onto a base location
    pub fn resolve(&self, base: &Location, relative: &str) -> Result<Location> {
        base.join(relative)
    }

    pub fn find_handler(&self, location: &Location) -> Result<&dyn SourceHandler> {
        self.handlers
            .iter()
            .find(|h| h.matches(location))
            .map(|h| h.as_ref())
            .ok_or_else(|| SyncError::NoHandler {
                location: location.to_string(),
                supported: self
                    .handlers
                    .iter()
                    .map(|h| h.name())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    pub async fn open(&self, location: &Location) -> Result<ByteStream> {
        let handler = self.find_handler(location)?;
        debug!("Opening {} via {}", location, handler.name());
        handler.open(location).await
    }
}

impl Default for SourceResolver {
    fn default() -> Self {
        Self::new()
    }
}
