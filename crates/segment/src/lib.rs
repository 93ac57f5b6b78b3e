//! # Segment - Immutable Sorted Table Files
//!
//! On-disk representation of one finalized [`builder::Segment`]. A segment
//! file is *write-once*: it is assembled in a temporary file, fsynced and
//! renamed into place, and never touched again.
//!
//! Every file is self-describing. The header carries the table schema and the
//! partitioner, the footer carries the row count and the total byte length,
//! so a downstream loader can check a file is complete without any external
//! index.
//!
//! ## File layout (v1)
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ HEADER                                                        │
//! │ magic "BLKH" (u32) | version (u16) | partitioner (u8)         │
//! │ keyspace | table | columns | partition key | clustering key   │
//! ├───────────────────────────────────────────────────────────────┤
//! │ DATA (rows in (token, clustering) order)                      │
//! │                                                               │
//! │ crc32 (u32) | body_len (u32) | token (u64)                    │
//! │ per column: tag (u8, 0 = null) | [value]                      │
//! │                                                               │
//! │ The CRC32 covers the body (token through last value).         │
//! ├───────────────────────────────────────────────────────────────┤
//! │ BLOOM (serialized BloomFilter over partition keys)            │
//! ├───────────────────────────────────────────────────────────────┤
//! │ INDEX (one entry per partition run)                           │
//! │ token (u64) | key_len (u32) | key | data_offset (u64)         │
//! ├───────────────────────────────────────────────────────────────┤
//! │ FOOTER (always last 60 bytes)                                 │
//! │ row_count | min_token | max_token | data_offset               │
//! │ bloom_offset | index_offset | file_len (u64 LE each)          │
//! │ magic "BLK1" (u32 LE)                                         │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. Strings are `len (u16) | UTF-8 bytes`
//! in the header and `len (u32) | UTF-8 bytes` in row values.

mod format;
mod reader;
mod writer;

use std::io;
use thiserror::Error;

pub use format::{Footer, FOOTER_BYTES, FORMAT_VERSION, HEADER_MAGIC, SEGMENT_MAGIC};
pub use reader::{IndexEntry, SegmentReader, SegmentRows};
pub use writer::{SegmentFileInfo, SegmentWriter};

/// Errors raised while writing or reading segment files.
#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("refusing to write an empty segment")]
    Empty,

    #[error("segment file already exists: {0}")]
    AlreadyExists(std::path::PathBuf),

    #[error("corrupt segment: {0}")]
    Corrupt(String),

    #[error("segment header describes an invalid schema: {0}")]
    Schema(#[from] schema::SchemaError),
}

#[cfg(test)]
mod tests;
