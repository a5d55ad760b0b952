use std::marker::PhantomData;

use super::{Digest, DigestState, Hasher};
use crate::core::error::{Result, SyncError};

/// Hex-encoded digest backed by a RustCrypto implementation
pub struct CryptoHasher<D> {
    algorithm: &'static str,
    _digest: PhantomData<fn() -> D>,
}

impl<D> CryptoHasher<D> {
    pub const fn new(algorithm: &'static str) -> Self {
        Self {
            algorithm,
            _digest: PhantomData,
        }
    }
}

pub fn sha1() -> CryptoHasher<sha1::Sha1> {
    CryptoHasher::new("sha1")
}

pub fn sha256() -> CryptoHasher<sha2::Sha256> {
    CryptoHasher::new("sha256")
}

pub fn sha512() -> CryptoHasher<sha2::Sha512> {
    CryptoHasher::new("sha512")
}

pub fn md5() -> CryptoHasher<md5::Md5> {
    CryptoHasher::new("md5")
}

impl<D> Hasher for CryptoHasher<D>
where
    D: sha2::Digest + Send + 'static,
{
    fn algorithm(&self) -> &str {
        self.algorithm
    }

    fn digest_of(&self, text: &str) -> Result<Digest> {
        let malformed = |reason: String| SyncError::MalformedDigest {
            algorithm: self.algorithm.to_string(),
            value: text.to_string(),
            reason,
        };

        let bytes = hex::decode(text.trim()).map_err(|e| malformed(e.to_string()))?;
        let expected = <D as sha2::Digest>::output_size();
        if bytes.len() != expected {
            return Err(malformed(format!(
                "expected {} bytes, found {}",
                expected,
                bytes.len()
            )));
        }

        Ok(Digest::new(self.algorithm, hex::encode(bytes)))
    }

    fn start(&self) -> Box<dyn DigestState> {
        Box::new(CryptoState {
            algorithm: self.algorithm,
            inner: D::new(),
        })
    }
}

struct CryptoState<D> {
    algorithm: &'static str,
    inner: D,
}

impl<D> DigestState for CryptoState<D>
where
    D: sha2::Digest + Send,
{
    fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    fn finish(self: Box<Self>) -> Digest {
        Digest::new(self.algorithm, hex::encode(self.inner.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn hex_comparison_is_case_insensitive() {
        let hasher = sha256();
        let lower = hasher.digest_of(HELLO_SHA256).unwrap();
        let upper = hasher.digest_of(&HELLO_SHA256.to_uppercase()).unwrap();
        assert_eq!(lower, upper);
        assert_eq!(hasher.digest_bytes(b"hello world"), lower);
    }

    #[test]
    fn known_vectors() {
        assert_eq!(
            sha1().digest_bytes(b"hello world").value(),
            "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"
        );
        assert_eq!(
            md5().digest_bytes(b"hello world").value(),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
        assert_eq!(sha512().digest_bytes(b"").value().len(), 128);
    }

    #[test]
    fn malformed_hex_is_rejected() {
        let err = sha256().digest_of("not-hex").err().unwrap();
        assert!(matches!(err, SyncError::MalformedDigest { .. }));

        // valid hex, wrong width
        let err = sha256().digest_of("abcd").err().unwrap();
        assert!(matches!(err, SyncError::MalformedDigest { reason, .. } if reason.contains("32 bytes")));
    }

    #[test]
    fn streaming_updates_match_one_shot() {
        let hasher = sha256();
        let mut state = hasher.start();
        state.update(b"hello ");
        state.update(b"world");
        assert_eq!(state.finish().value(), HELLO_SHA256);
    }
}
