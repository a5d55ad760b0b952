//! Pluggable digest algorithms
//!
//! A [`Digest`] is an immutable `(algorithm, value)` pair whose value is stored in the
//! algorithm's canonical textual form, so plain equality is the per-algorithm comparison:
//! hex algorithms compare case-insensitively, `murmur2` compares the 32-bit number.
//! Digests of different algorithms are never equal.
//!
//! Algorithms are looked up through a [`HasherRegistry`] that is built once at start-up and
//! handed to whoever needs it; there is no global table.

mod cryptographic;
mod murmur2;
mod reader;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::error::{Result, SyncError};

pub use cryptographic::CryptoHasher;
pub use murmur2::{murmur2, Murmur2Hasher};
pub use reader::DigestingReader;

/// Algorithm used for documents that do not declare one (the pack descriptor)
pub const DEFAULT_ALGORITHM: &str = "sha256";

/// A digest value tagged with the algorithm that produced it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest {
    #[serde(rename = "type")]
    algorithm: String,
    value: String,
}

impl Digest {
    pub(crate) fn new(algorithm: &str, value: String) -> Self {
        Self {
            algorithm: algorithm.to_string(),
            value,
        }
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.value)
    }
}

/// Incremental digest computation
pub trait DigestState: Send {
    fn update(&mut self, data: &[u8]);
    fn finish(self: Box<Self>) -> Digest;
}

/// One digest algorithm
pub trait Hasher: Send + Sync {
    /// Tag used in documents, e.g. `sha256`
    fn algorithm(&self) -> &str;

    /// Parse a textual digest into its comparable form
    fn digest_of(&self, text: &str) -> Result<Digest>;

    fn start(&self) -> Box<dyn DigestState>;

    fn digest_bytes(&self, data: &[u8]) -> Digest {
        let mut state = self.start();
        state.update(data);
        state.finish()
    }
}

/// Registry of available digest algorithms, keyed by tag
#[derive(Clone)]
pub struct HasherRegistry {
    hashers: HashMap<String, Arc<dyn Hasher>>,
}

impl HasherRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            hashers: HashMap::new(),
        }
    }

    /// Registry holding sha1, sha256, sha512, md5 and murmur2
    pub fn with_defaults() -> Self {
        Self::new()
            .register(cryptographic::sha1())
            .register(cryptographic::sha256())
            .register(cryptographic::sha512())
            .register(cryptographic::md5())
            .register(Murmur2Hasher)
    }

    /// Register an algorithm, replacing any earlier one with the same tag
    pub fn register<H: Hasher + 'static>(mut self, hasher: H) -> Self {
        self.hashers
            .insert(hasher.algorithm().to_ascii_lowercase(), Arc::new(hasher));
        self
    }

    pub fn hasher_for(&self, algorithm: &str) -> Result<Arc<dyn Hasher>> {
        self.hashers
            .get(&algorithm.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| SyncError::UnsupportedAlgorithm {
                algorithm: algorithm.to_string(),
            })
    }

    /// Shorthand for `hasher_for(algorithm)?.digest_of(text)`
    pub fn digest_of(&self, algorithm: &str, text: &str) -> Result<Digest> {
        self.hasher_for(algorithm)?.digest_of(text)
    }

    /// Wrap a reader so that it digests everything passing through it
    pub fn wrap<R>(&self, algorithm: &str, reader: R) -> Result<DigestingReader<R>> {
        let hasher = self.hasher_for(algorithm)?;
        Ok(DigestingReader::new(reader, hasher.start()))
    }

    pub fn algorithms(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.hashers.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}

impl Default for HasherRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for HasherRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HasherRegistry")
            .field("algorithms", &self.algorithms())
            .finish()
    }
}
