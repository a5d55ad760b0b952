use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::error::{Result, SyncError};

const DEFAULT_PACK_FORMAT: &str = "packwiz:1.0.0";

/// Top-level pack document (`pack.toml`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PackDescriptor {
    pub name: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default = "default_pack_format")]
    pub pack_format: String,
    /// Component versions, e.g. `minecraft = "1.20.1"`
    #[serde(default)]
    pub versions: BTreeMap<String, String>,
    pub index: IndexPointer,
}

/// Where the file index lives and what it must hash to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IndexPointer {
    pub file: String,
    pub hash_format: String,
    pub hash: String,
}

fn default_pack_format() -> String {
    DEFAULT_PACK_FORMAT.to_string()
}

impl PackDescriptor {
    pub fn parse(text: &str, location: &str) -> Result<Self> {
        toml::from_str(text).map_err(|source| SyncError::Parse {
            document: "pack descriptor",
            location: location.to_string(),
            source,
        })
    }
}
