//! 32-bit MurmurHash2 as used by the CurseForge file fingerprint.
//!
//! The fingerprint is taken over the input with all tab, newline, carriage return and space
//! bytes removed, seeded with 1. Textual digests are decimal and may be written signed, so
//! `-1` and `4294967295` denote the same fingerprint.

use super::{Digest, DigestState, Hasher};
use crate::core::error::{Result, SyncError};

const ALGORITHM: &str = "murmur2";
const SEED: u32 = 1;
const M: u32 = 0x5bd1_e995;
const R: u32 = 24;

fn is_ignored(byte: u8) -> bool {
    matches!(byte, 9 | 10 | 13 | 32)
}

/// MurmurHash2 of `data` with the given seed, no normalization
pub fn murmur2(data: &[u8], seed: u32) -> u32 {
    let mut h = seed ^ data.len() as u32;

    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);
        h = h.wrapping_mul(M);
        h ^= k;
    }

    let tail = chunks.remainder();
    if tail.len() == 3 {
        h ^= (tail[2] as u32) << 16;
    }
    if tail.len() >= 2 {
        h ^= (tail[1] as u32) << 8;
    }
    if !tail.is_empty() {
        h ^= tail[0] as u32;
        h = h.wrapping_mul(M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;
    h
}

/// Whitespace-normalized MurmurHash2 fingerprint
#[derive(Debug, Clone, Copy, Default)]
pub struct Murmur2Hasher;

impl Hasher for Murmur2Hasher {
    fn algorithm(&self) -> &str {
        ALGORITHM
    }

    fn digest_of(&self, text: &str) -> Result<Digest> {
        let number: i64 = text
            .trim()
            .parse()
            .map_err(|e: std::num::ParseIntError| SyncError::MalformedDigest {
                algorithm: ALGORITHM.to_string(),
                value: text.to_string(),
                reason: e.to_string(),
            })?;
        // Only the low 32 bits are meaningful
        Ok(Digest::new(ALGORITHM, (number as u32).to_string()))
    }

    fn start(&self) -> Box<dyn DigestState> {
        Box::new(Murmur2State::default())
    }
}

/// The length goes into the initial state, so normalized input is buffered until finish
#[derive(Default)]
struct Murmur2State {
    normalized: Vec<u8>,
}

impl DigestState for Murmur2State {
    fn update(&mut self, data: &[u8]) {
        self.normalized
            .extend(data.iter().copied().filter(|b| !is_ignored(*b)));
    }

    fn finish(self: Box<Self>) -> Digest {
        Digest::new(ALGORITHM, murmur2(&self.normalized, SEED).to_string())
    }
}
