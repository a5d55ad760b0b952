//! Persisted record of what a previous run installed

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::path::PackPath;
use super::side::Side;
use crate::core::error::{FileOperation, Result, SyncError};
use crate::core::files;
use crate::hash::Digest;

/// Root cache object, stored as JSON next to the pack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cache {
    #[serde(default)]
    pub pack_file_hash: Option<Digest>,
    #[serde(default)]
    pub index_file_hash: Option<Digest>,
    #[serde(default)]
    pub cached_files: BTreeMap<PackPath, CacheEntry>,
    #[serde(default = "default_side")]
    pub cached_side: Side,
}

/// One installed (or deliberately not installed) index entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Digest the index declared for this entry when it was last reconciled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<Digest>,
    /// Payload digest from the metadata document, for metafile entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_file_hash: Option<Digest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_location: Option<PackPath>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_optional: bool,
    #[serde(default = "enabled")]
    pub option_value: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub only_other_side: bool,
}

fn default_side() -> Side {
    Side::Client
}

fn enabled() -> bool {
    true
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            pack_file_hash: None,
            index_file_hash: None,
            cached_files: BTreeMap::new(),
            cached_side: default_side(),
        }
    }
}

impl Default for CacheEntry {
    fn default() -> Self {
        Self {
            hash: None,
            linked_file_hash: None,
            cached_location: None,
            is_optional: false,
            option_value: true,
            only_other_side: false,
        }
    }
}

impl CacheEntry {
    /// Whether this entry is supposed to have a file on disk right now
    pub fn should_be_installed(&self) -> bool {
        !self.only_other_side && (!self.is_optional || self.option_value)
    }
}

impl Cache {
    /// Load the cache; a missing file means a first install
    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No cache at {}, treating this as a fresh install", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(SyncError::file_system(path, FileOperation::Read, e)),
        };

        let cache: Cache = serde_json::from_slice(&bytes).map_err(|source| SyncError::CacheFormat {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(
            "Loaded cache with {} entries from {}",
            cache.cached_files.len(),
            path.display()
        );
        Ok(cache)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self).map_err(|source| SyncError::CacheFormat {
            path: path.to_path_buf(),
            source,
        })?;
        files::write_atomically(path, &json).await?;
        debug!("Saved cache with {} entries to {}", self.cached_files.len(), path.display());
        Ok(())
    }

    /// Entries that should be on disk but are not
    pub fn missing_on_disk(&self, pack_folder: &Path) -> BTreeSet<PackPath> {
        self.cached_files
            .iter()
            .filter(|(_, entry)| entry.should_be_installed())
            .filter(|(_, entry)| match &entry.cached_location {
                Some(location) => !location.to_fs_path(pack_folder).exists(),
                None => true,
            })
            .map(|(key, _)| key.clone())
            .collect()
    }
}
