use std::fmt;
use std::path::Path;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use url::Url;

use crate::core::error::{FileOperation, Result, SyncError};

/// Characters escaped when a pack-relative path is joined onto a URL
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Absolute location of a remote or local document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location(Url);

impl Location {
    /// Parse a URL, or a filesystem path which becomes a `file://` URL
    pub fn parse(text: &str) -> Result<Self> {
        match Url::parse(text) {
            // a single-letter scheme is a Windows drive, not a URL
            Ok(url) if url.scheme().len() > 1 => Ok(Self(url)),
            Ok(_) | Err(url::ParseError::RelativeUrlWithoutBase) => Self::from_path(Path::new(text)),
            Err(source) => Err(SyncError::InvalidLocation {
                location: text.to_string(),
                source,
            }),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let absolute = std::path::absolute(path)
            .map_err(|e| SyncError::file_system(path, FileOperation::Metadata, e))?;
        Url::from_file_path(&absolute)
            .map(Self)
            .map_err(|()| SyncError::InvalidPath {
                path: path.display().to_string(),
                reason: "cannot be expressed as a file URL".to_string(),
            })
    }

    pub fn from_url(url: Url) -> Self {
        Self(url)
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    pub fn scheme(&self) -> &str {
        self.0.scheme()
    }

    /// Resolve a relative reference against this location.
    ///
    /// Literal spaces and other characters that would end or split a URL path are escaped
    /// first, so `mods/a b.jar` survives as a path rather than being truncated.
    pub fn join(&self, relative: &str) -> Result<Location> {
        let escaped = utf8_percent_encode(relative, PATH_SEGMENT).to_string();
        self.0
            .join(&escaped)
            .map(Self)
            .map_err(|source| SyncError::InvalidLocation {
                location: format!("{} + {}", self.0, relative),
                source,
            })
    }

    /// URL path with percent-escapes decoded
    pub fn decoded_path(&self) -> String {
        percent_decode_str(self.0.path()).decode_utf8_lossy().into_owned()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}
