use serde::{Deserialize, Serialize};

use super::side::{Optionality, Side};
use crate::core::error::{Result, SyncError};

/// Download mode whose link is looked up through the CurseForge API
pub const CURSEFORGE_MODE: &str = "metadata:curseforge";

/// Secondary document describing the real download behind a metafile entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FileMetadata {
    #[serde(default)]
    pub name: String,
    pub filename: String,
    #[serde(default = "both_sides")]
    pub side: Side,
    pub download: DownloadSpec,
    #[serde(default)]
    pub option: Optionality,
    /// Update-source hints; `[update.curseforge]` carries the ids for CurseForge downloads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<toml::Table>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DownloadSpec {
    #[serde(default)]
    pub url: Option<String>,
    pub hash_format: String,
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

fn both_sides() -> Side {
    Side::Both
}

impl FileMetadata {
    pub fn parse(text: &str, location: &str) -> Result<Self> {
        toml::from_str(text).map_err(|source| SyncError::Parse {
            document: "file metadata",
            location: location.to_string(),
            source,
        })
    }

    /// `(project id, file id)` from the `[update.curseforge]` table
    pub fn curseforge_ids(&self) -> Option<(u32, u32)> {
        let table = self.update.as_ref()?.get("curseforge")?.as_table()?;
        let id = |key: &str| {
            table
                .get(key)?
                .as_integer()
                .and_then(|value| u32::try_from(value).ok())
        };
        Some((id("project-id")?, id("file-id")?))
    }
}

impl DownloadSpec {
    pub fn is_curseforge(&self) -> bool {
        self.mode.as_deref() == Some(CURSEFORGE_MODE)
    }

    /// URL written in the document itself.
    ///
    /// Only the plain URL mode has one; modes that need a provider API are refused here.
    pub fn direct_url(&self, file: &str) -> Result<&str> {
        match self.mode.as_deref() {
            None | Some("") | Some("url") => {}
            Some(mode) => {
                return Err(SyncError::Protocol {
                    location: file.to_string(),
                    reason: format!("download mode '{}' is not supported", mode),
                });
            }
        }
        self.url.as_deref().ok_or_else(|| SyncError::Protocol {
            location: file.to_string(),
            reason: "metadata has no download url".to_string(),
        })
    }
}
