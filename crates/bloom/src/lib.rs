//! # Bloom Filter
//!
//! Probabilistic partition-membership summary stored in every segment file.
//!
//! A downstream loader (or the segment reader) asks the filter before it
//! touches the partition index: "no" is definitive, "maybe" means look it up.
//! Filters are built from serialized partition keys, the same bytes the
//! partitioner hashes.
//!
//! Bit positions come from one Murmur3 x64/128 hash per key, split into
//! `h1`/`h2` for double hashing: `bit(i) = (h1 + i * h2) mod num_bits`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use bloom::BloomFilter;
//!
//! let mut bf = BloomFilter::new(1000, 0.01);
//! bf.insert(b"enwiki:Main_Page");
//! assert!(bf.may_contain(b"enwiki:Main_Page"));
//! ```
use partitioner::hash3_x64_128;
use std::io::{self, Read, Write};

/// Upper bound on the serialized bit vector accepted by [`BloomFilter::read_from`].
const MAX_BLOOM_BYTES: usize = 128 * 1024 * 1024;

/// A bloom filter backed by a bit vector with `k` hash functions.
pub struct BloomFilter {
    bits: Vec<u8>,
    num_bits: u64,
    num_hashes: u32,
    /// Number of keys inserted (duplicates included).
    inserted: u64,
}

impl BloomFilter {
    /// Sizes a filter for `expected_items` keys at `false_positive_rate`.
    ///
    /// # Panics
    ///
    /// Panics if `expected_items` is 0 or `false_positive_rate` is not in `(0, 1)`.
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        assert!(expected_items > 0, "expected_items must be > 0");
        assert!(
            false_positive_rate > 0.0 && false_positive_rate < 1.0,
            "false_positive_rate must be in (0, 1)"
        );

        // m = -n * ln(p) / ln(2)^2, k = (m / n) * ln(2)
        let n = expected_items as f64;
        let m = (-n * false_positive_rate.ln() / std::f64::consts::LN_2.powi(2)).ceil() as u64;
        let m = m.max(64);
        let k = ((m as f64 / n) * std::f64::consts::LN_2).round().clamp(1.0, 20.0) as u32;

        Self {
            bits: vec![0u8; m.div_ceil(8) as usize],
            num_bits: m,
            num_hashes: k,
            inserted: 0,
        }
    }

    pub fn insert(&mut self, key: &[u8]) {
        let (h1, h2) = hash3_x64_128(key, 0);
        for i in 0..self.num_hashes {
            let idx = self.bit_index(h1, h2, i);
            self.bits[(idx / 8) as usize] |= 1 << (idx % 8);
        }
        self.inserted += 1;
    }

    /// `false` means the key was never inserted.
    #[must_use]
    pub fn may_contain(&self, key: &[u8]) -> bool {
        let (h1, h2) = hash3_x64_128(key, 0);
        (0..self.num_hashes).all(|i| {
            let idx = self.bit_index(h1, h2, i);
            (self.bits[(idx / 8) as usize] >> (idx % 8)) & 1 == 1
        })
    }

    #[must_use]
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    #[must_use]
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    #[must_use]
    pub fn inserted(&self) -> u64 {
        self.inserted
    }

    /// Serialized size in bytes: `num_bits(8) + num_hashes(4) + inserted(8) + bits_len(4) + bits`.
    #[must_use]
    pub fn serialized_size(&self) -> usize {
        8 + 4 + 8 + 4 + self.bits.len()
    }

    /// Wire format (little-endian):
    /// `[num_bits: u64][num_hashes: u32][inserted: u64][bits_len: u32][bits]`
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.num_bits.to_le_bytes())?;
        w.write_all(&self.num_hashes.to_le_bytes())?;
        w.write_all(&self.inserted.to_le_bytes())?;
        w.write_all(&(self.bits.len() as u32).to_le_bytes())?;
        w.write_all(&self.bits)
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut buf8 = [0u8; 8];
        let mut buf4 = [0u8; 4];

        r.read_exact(&mut buf8)?;
        let num_bits = u64::from_le_bytes(buf8);
        r.read_exact(&mut buf4)?;
        let num_hashes = u32::from_le_bytes(buf4);
        r.read_exact(&mut buf8)?;
        let inserted = u64::from_le_bytes(buf8);
        r.read_exact(&mut buf4)?;
        let bits_len = u32::from_le_bytes(buf4) as usize;

        if bits_len > MAX_BLOOM_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bloom filter too large: {} bytes", bits_len),
            ));
        }
        if num_bits == 0 || num_bits > (bits_len as u64) * 8 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bloom filter claims {} bits in {} bytes", num_bits, bits_len),
            ));
        }

        if num_hashes == 0 || num_hashes > 64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bloom filter claims {} hash functions", num_hashes),
            ));
        }

        let mut bits = vec![0u8; bits_len];
        r.read_exact(&mut bits)?;

        Ok(Self {
            bits,
            num_bits,
            num_hashes,
            inserted,
        })
    }

    fn bit_index(&self, h1: u64, h2: u64, i: u32) -> u64 {
        h1.wrapping_add((i as u64).wrapping_mul(h2)) % self.num_bits
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("num_bits", &self.num_bits)
            .field("num_hashes", &self.num_hashes)
            .field("inserted", &self.inserted)
            .finish()
    }
}
