use serde::{Deserialize, Serialize};

use super::metadata::FileMetadata;
use super::path::PackPath;
use crate::core::error::{Result, SyncError};

/// The file index (`index.toml`): every managed file with its digest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FileIndex {
    pub hash_format: String,
    #[serde(default)]
    pub files: Vec<FileIndexEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FileIndexEntry {
    pub file: PackPath,
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<PackPath>,
    /// The entry points at a [`FileMetadata`] document instead of being the payload
    #[serde(default)]
    pub metafile: bool,
    /// Never overwrite a file that already exists at the destination
    #[serde(default)]
    pub preserve: bool,
}

impl FileIndex {
    pub fn parse(text: &str, location: &str) -> Result<Self> {
        toml::from_str(text).map_err(|source| SyncError::Parse {
            document: "file index",
            location: location.to_string(),
            source,
        })
    }
}

impl FileIndexEntry {
    /// Fill in the index-wide algorithm when the entry does not name one
    pub fn inherit_algorithm(&mut self, index_default: &str) {
        if self.hash_format.as_deref().map_or(true, str::is_empty) {
            self.hash_format = Some(index_default.to_string());
        }
    }

    pub fn algorithm(&self) -> &str {
        self.hash_format.as_deref().unwrap_or(crate::hash::DEFAULT_ALGORITHM)
    }

    /// Pack-relative path the payload is written to
    pub fn destination(&self, metadata: Option<&FileMetadata>) -> Result<PackPath> {
        if let Some(alias) = &self.alias {
            return Ok(alias.clone());
        }
        match metadata {
            Some(meta) if self.metafile => self.file.resolve_sibling(&meta.filename),
            _ => Ok(self.file.clone()),
        }
    }

    /// Human-facing name for progress and dialogs
    pub fn display_name(&self, metadata: Option<&FileMetadata>) -> Result<String> {
        if let Some(meta) = metadata {
            if !meta.name.is_empty() {
                return Ok(meta.name.clone());
            }
            if !meta.filename.is_empty() {
                return Ok(meta.filename.clone());
            }
        }
        self.file
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| SyncError::MissingName {
                file: self.file.to_string(),
            })
    }
}
