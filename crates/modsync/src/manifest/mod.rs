//! Typed models of the remote documents and of the local cache
//!
//! The remote side is a chain of three TOML documents: the pack descriptor points at the file
//! index, and index entries flagged as metafiles point at per-file metadata. The local side is a
//! single JSON cache keyed by index path.

mod cache;
mod index;
mod metadata;
mod pack;
mod path;
mod side;

pub use cache::{Cache, CacheEntry};
pub use index::{FileIndex, FileIndexEntry};
pub use metadata::{DownloadSpec, FileMetadata, CURSEFORGE_MODE};
pub use pack::{IndexPointer, PackDescriptor};
pub use path::PackPath;
pub use side::{Optionality, Side};
