//! # Bloom Filter Module
//!
//! Per-run membership filter used to skip runs that cannot contain a key.
//!
//! A bloom filter answers "definitely not present" or "maybe present";
//! it never produces a false negative for a key that was inserted. Each
//! run carries one filter in a `.filter` sidecar file, sized from the
//! memtable capacity so that the default of 8 bits per key yields roughly
//! a 1 % false-positive rate.
//!
//! ## Hash family
//!
//! The `k` probe positions for a key are derived by mixing the probe
//! index into the key with an invertible XOR step and hashing the result
//! with 64-bit xxHash. The family is fully deterministic across processes
//! and platforms, so serialized filters round-trip exactly.
//!
//! ## On-disk layout
//!
//! ```text
//! offset 0  : m  u64 LE     bit count
//! offset 8  : k  u64 LE     hash count
//! offset 16 : packed bits   ceil(m/8) bytes, LSB-first within each byte
//! ```
//!
//! Deserialization rejects any file whose bit-array length disagrees with
//! the declared `m` — a filter that does not match its run is worse than
//! no filter at all.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::fs::{File, rename};
use std::io::{self, Read, Write};
use std::path::Path;

use thiserror::Error;
use tracing::trace;
use xxhash_rust::xxh64::xxh64;

use crate::encoding::{Decode, Encode, EncodingError};

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Odd multiplier folding the probe index into the hash seed. Derived
/// from the 64-bit golden ratio; any odd constant keeps the mix
/// invertible for a fixed probe index.
const PROBE_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Header bytes preceding the packed bit array: `m` and `k`, both `u64`.
const FILTER_HEADER_SIZE: usize = 16;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by [`BloomFilter`] operations.
#[derive(Debug, Error)]
pub enum FilterError {
    /// Underlying file I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Header decoding failure.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// Union attempted between filters with different parameters.
    #[error("incompatible filters: ({left_bits}, {left_hashes}) vs ({right_bits}, {right_hashes})")]
    Incompatible {
        /// Bit count of the receiving filter.
        left_bits: u64,
        /// Hash count of the receiving filter.
        left_hashes: u64,
        /// Bit count of the other filter.
        right_bits: u64,
        /// Hash count of the other filter.
        right_hashes: u64,
    },

    /// Serialized bit array length disagrees with the declared bit count.
    #[error("filter size mismatch: declared {expected} bytes of bits, found {actual}")]
    SizeMismatch {
        /// Byte length implied by the header.
        expected: usize,
        /// Byte length actually present.
        actual: usize,
    },

    /// Declared parameters cannot describe a usable filter.
    #[error("invalid filter parameters: m = {bit_count}, k = {hash_count}")]
    InvalidParameters {
        /// Declared bit count.
        bit_count: u64,
        /// Declared hash count.
        hash_count: u64,
    },
}

// ------------------------------------------------------------------------------------------------
// BloomFilter
// ------------------------------------------------------------------------------------------------

/// A fixed-size bloom filter over `i32` keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    /// Number of bits in the filter (`m`).
    bit_count: u64,

    /// Number of hash probes per key (`k`).
    hash_count: u64,

    /// Packed bit array, LSB-first within each byte.
    bits: Vec<u8>,
}

impl BloomFilter {
    /// Creates an empty filter sized for `max_keys` entries at
    /// `bits_per_key` bits each.
    ///
    /// The probe count follows the textbook optimum
    /// `k = round((m / n) · ln 2)`, clamped to at least one probe.
    pub fn for_capacity(max_keys: usize, bits_per_key: usize) -> Self {
        let bit_count = ((max_keys * bits_per_key).max(8)) as u64;
        let hash_count = if max_keys == 0 {
            1
        } else {
            let optimal =
                (bit_count as f64 / max_keys as f64 * std::f64::consts::LN_2).round() as u64;
            optimal.max(1)
        };

        Self::with_params(bit_count, hash_count)
    }

    /// Creates an empty filter with explicit parameters.
    pub fn with_params(bit_count: u64, hash_count: u64) -> Self {
        let byte_len = bit_count.div_ceil(8) as usize;
        Self {
            bit_count,
            hash_count,
            bits: vec![0u8; byte_len],
        }
    }

    /// Number of bits in the filter (`m`).
    pub fn bit_count(&self) -> u64 {
        self.bit_count
    }

    /// Number of hash probes per key (`k`).
    pub fn hash_count(&self) -> u64 {
        self.hash_count
    }

    /// Probe position of hash `i` for `key`.
    ///
    /// The probe index is folded into the key with an invertible XOR of
    /// an odd-constant multiple, then the mixed word is hashed with
    /// xxh64. Deterministic across runs and platforms.
    #[inline]
    fn position(&self, key: i32, probe: u64) -> u64 {
        let mixed = (key as u32 as u64) ^ probe.wrapping_mul(PROBE_MIX);
        xxh64(&mixed.to_le_bytes(), 0) % self.bit_count
    }

    /// Sets the `k` bits for `key`.
    pub fn insert(&mut self, key: i32) {
        for probe in 0..self.hash_count {
            let pos = self.position(key, probe);
            self.bits[(pos / 8) as usize] |= 1 << (pos % 8);
        }
    }

    /// Returns `true` iff all `k` bits for `key` are set.
    ///
    /// A `false` answer is definitive; a `true` answer may be a false
    /// positive.
    pub fn may_contain(&self, key: i32) -> bool {
        (0..self.hash_count).all(|probe| {
            let pos = self.position(key, probe);
            self.bits[(pos / 8) as usize] & (1 << (pos % 8)) != 0
        })
    }

    /// Bitwise-ORs `other` into a new filter.
    ///
    /// The result accepts every key either input accepts, which makes it
    /// a valid filter for a run merged from the two inputs: the merged
    /// key set is contained in the union, so no false negative can be
    /// introduced. Filters with differing parameters cannot be combined.
    pub fn union(&self, other: &BloomFilter) -> Result<BloomFilter, FilterError> {
        if self.bit_count != other.bit_count || self.hash_count != other.hash_count {
            return Err(FilterError::Incompatible {
                left_bits: self.bit_count,
                left_hashes: self.hash_count,
                right_bits: other.bit_count,
                right_hashes: other.hash_count,
            });
        }

        let bits = self
            .bits
            .iter()
            .zip(other.bits.iter())
            .map(|(a, b)| a | b)
            .collect();

        Ok(BloomFilter {
            bit_count: self.bit_count,
            hash_count: self.hash_count,
            bits,
        })
    }

    // --------------------------------------------------------------------------------------------
    // Serialization
    // --------------------------------------------------------------------------------------------

    /// Serializes the filter to its on-disk byte form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FILTER_HEADER_SIZE + self.bits.len());
        self.bit_count.encode_to(&mut buf);
        self.hash_count.encode_to(&mut buf);
        buf.extend_from_slice(&self.bits);
        buf
    }

    /// Reconstructs a filter from its on-disk byte form.
    ///
    /// Rejects headers declaring unusable parameters and bit arrays whose
    /// length disagrees with the declared bit count.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, FilterError> {
        let mut off = 0;
        let (bit_count, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (hash_count, n) = u64::decode_from(&buf[off..])?;
        off += n;

        if bit_count == 0 || hash_count == 0 {
            return Err(FilterError::InvalidParameters {
                bit_count,
                hash_count,
            });
        }

        let expected = bit_count.div_ceil(8) as usize;
        let actual = buf.len() - off;
        if expected != actual {
            return Err(FilterError::SizeMismatch { expected, actual });
        }

        Ok(Self {
            bit_count,
            hash_count,
            bits: buf[off..].to_vec(),
        })
    }

    /// Writes the filter to `path` atomically (`.tmp` → fsync → rename).
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), FilterError> {
        let final_path = path.as_ref();
        let tmp_path = final_path.with_extension("tmp");

        let mut file = File::create(&tmp_path)?;
        file.write_all(&self.to_bytes())?;
        file.sync_all()?;
        rename(&tmp_path, final_path)?;

        trace!(path = %final_path.display(), bits = self.bit_count, "filter written");
        Ok(())
    }

    /// Reads a filter back from `path`.
    pub fn read_from(path: impl AsRef<Path>) -> Result<Self, FilterError> {
        let mut buf = Vec::new();
        File::open(path.as_ref())?.read_to_end(&mut buf)?;
        Self::from_bytes(&buf)
    }
}
