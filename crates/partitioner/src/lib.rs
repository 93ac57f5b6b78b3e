//! # Partitioner - Partition Key Tokens
//!
//! Maps the partition-key values of a [`Row`] to a 64-bit [`Token`]. Tokens
//! decide placement in the target cluster and the order of partitions inside
//! every segment file, so they must be bit-for-bit reproducible across runs.
//!
//! ## Key serialization
//!
//! ```text
//! single component:  value bytes
//! composite:         [len: u16 BE][value bytes][0x00]  ... per component
//! value bytes:       timestamp -> i64 BE, int -> i32 BE, text -> UTF-8
//! ```
//!
//! ## Algorithms
//!
//! | Name      | Token                                                      |
//! |-----------|------------------------------------------------------------|
//! | `murmur3` | Murmur3 x64/128 (seed 0), first half, `i64::MIN -> i64::MAX` |
//! | `fnv1a`   | FNV-1a 64 over the key bytes                               |
//!
//! `murmur3` reproduces the target engine's default partitioner, including
//! its sign-extending tail handling, so bulk-loaded partitions land on the
//! same replicas as normally written ones.

mod murmur3;

use schema::{Row, Schema};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use murmur3::hash3_x64_128;

const SIGN_BIT: u64 = 0x8000_0000_0000_0000;

/// A totally ordered 64-bit partition token.
///
/// Signed engine tokens are stored with the sign bit flipped, which keeps
/// their order under unsigned comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(u64);

impl Token {
    pub const MIN: Token = Token(0);
    pub const MAX: Token = Token(u64::MAX);

    #[must_use]
    pub fn new(raw: u64) -> Self {
        Token(raw)
    }

    /// Converts a signed engine token into the unsigned token space.
    #[must_use]
    pub fn from_signed(v: i64) -> Self {
        Token((v as u64) ^ SIGN_BIT)
    }

    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// The token as the target engine reports it.
    #[must_use]
    pub fn as_signed(self) -> i64 {
        (self.0 ^ SIGN_BIT) as i64
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_signed())
    }
}

/// Hash function used to derive tokens. Resolved once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithm {
    #[default]
    Murmur3,
    Fnv1a,
}

impl HashAlgorithm {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Murmur3 => "murmur3",
            HashAlgorithm::Fnv1a => "fnv1a",
        }
    }

    /// Stable on-disk code, recorded in segment headers.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            HashAlgorithm::Murmur3 => 1,
            HashAlgorithm::Fnv1a => 2,
        }
    }

    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(HashAlgorithm::Murmur3),
            2 => Some(HashAlgorithm::Fnv1a),
            _ => None,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown hash algorithm {0:?} (expected murmur3 or fnv1a)")]
pub struct UnknownHashAlgorithm(pub String);

impl FromStr for HashAlgorithm {
    type Err = UnknownHashAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "murmur3" | "murmur3partitioner" => Ok(HashAlgorithm::Murmur3),
            "fnv1a" | "fnv" => Ok(HashAlgorithm::Fnv1a),
            _ => Err(UnknownHashAlgorithm(s.to_string())),
        }
    }
}

/// Computes tokens for rows of a fixed schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct Partitioner {
    algorithm: HashAlgorithm,
}

impl Partitioner {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Token of already-serialized partition key bytes.
    #[must_use]
    pub fn token_for_key(&self, key: &[u8]) -> Token {
        match self.algorithm {
            HashAlgorithm::Murmur3 => {
                let (h1, _) = hash3_x64_128(key, 0);
                let signed = h1 as i64;
                Token::from_signed(if signed == i64::MIN { i64::MAX } else { signed })
            }
            HashAlgorithm::Fnv1a => Token(fnv1a_64(key)),
        }
    }

    /// Token of the row's partition key.
    #[must_use]
    pub fn token(&self, schema: &Schema, row: &Row) -> Token {
        self.token_for_key(&serialize_partition_key(schema, row))
    }
}

/// Serializes the partition-key values of `row`.
///
/// Null key values serialize as empty, and components longer than `u16::MAX`
/// would not fit their length prefix. [`Schema::validate`] rejects both kinds
/// of row before they reach the partitioner.
pub fn serialize_partition_key(schema: &Schema, row: &Row) -> Vec<u8> {
    let key = schema.partition_key();
    if let [only] = key {
        return row.value(*only).map(|v| v.to_key_bytes()).unwrap_or_default();
    }

    let mut out = Vec::with_capacity(schema.partition_key_len(row));
    for &idx in key {
        let bytes = row.value(idx).map(|v| v.to_key_bytes()).unwrap_or_default();
        out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
        out.extend_from_slice(&bytes);
        out.push(0);
    }
    out
}

fn fnv1a_64(data: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x00000100000001b3;
    let mut hash = FNV_OFFSET;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
