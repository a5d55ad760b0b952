//! Canonical pack-relative paths
//!
//! Every path that comes out of a remote document is untrusted. [`PackPath`] normalizes
//! separators, collapses `.` and `..` without ever climbing above the pack root, and rejects
//! NUL bytes and drive letters, so joining it onto the pack folder always stays inside it.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::error::{Result, SyncError};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackPath(String);

impl PackPath {
    pub fn new(raw: &str) -> Result<Self> {
        let invalid = |reason: &str| SyncError::InvalidPath {
            path: raw.to_string(),
            reason: reason.to_string(),
        };

        if raw.contains('\0') {
            return Err(invalid("contains a NUL byte"));
        }

        let normalized = raw.replace('\\', "/");
        let mut segments: Vec<String> = Vec::new();
        for segment in normalized.split('/') {
            let segment = decode_dots(segment);
            match segment.as_str() {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                _ => {
                    let bytes = segment.as_bytes();
                    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
                        return Err(invalid("must not name a drive"));
                    }
                    segments.push(segment);
                }
            }
        }

        Ok(Self(segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The pack root itself
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Final path segment
    pub fn file_name(&self) -> Option<&str> {
        self.0.rsplit('/').next().filter(|name| !name.is_empty())
    }

    pub fn parent(&self) -> PackPath {
        match self.0.rfind('/') {
            Some(idx) => PackPath(self.0[..idx].to_string()),
            None => PackPath(String::new()),
        }
    }

    /// Resolve `relative` against the folder containing this path.
    ///
    /// A leading separator resolves from the pack root instead.
    pub fn resolve_sibling(&self, relative: &str) -> Result<PackPath> {
        if relative.starts_with('/') || relative.starts_with('\\') {
            return PackPath::new(relative);
        }
        let parent = self.parent();
        if parent.is_root() {
            PackPath::new(relative)
        } else {
            PackPath::new(&format!("{}/{}", parent.0, relative))
        }
    }

    /// Location of this path under a pack folder on disk
    pub fn to_fs_path(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        for segment in self.0.split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        path
    }
}

fn decode_dots(segment: &str) -> String {
    if segment.len() >= 3 && segment.to_ascii_lowercase().contains("%2e") {
        let lowered = segment.replace("%2E", "%2e");
        let decoded = lowered.replace("%2e", ".");
        if decoded.chars().all(|c| c == '.') {
            return decoded;
        }
    }
    segment.to_string()
}

impl fmt::Display for PackPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PackPath {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self> {
        PackPath::new(&value)
    }
}

impl From<PackPath> for String {
    fn from(value: PackPath) -> Self {
        value.0
    }
}
