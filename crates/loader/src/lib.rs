//! # Loader - Segment Writer / Flush Controller
//!
//! Turns finalized [`builder::Segment`]s into files under one table's output
//! directory and drives the per-writer lifecycle.
//!
//! ## Architecture
//!
//! ```text
//! rows
//!   |
//!   v
//! ┌───────────────────────────────────────────────┐
//! │ TableWriter (one per input stream)            │
//! │                                               │
//! │ append() → SegmentBuilder::insert             │
//! │              |                                │
//! │              |  (threshold reached?)          │
//! │              |            yes                 │
//! │              v                                │
//! │ Arc<SegmentDirectory>::flush()                │
//! │   id ← Mutex counter                          │
//! │   SegmentWriter::write(seg-<id>.db)           │
//! │   MANIFEST += <id>:<file>:<rows>              │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module        | Purpose                                                 |
//! |---------------|---------------------------------------------------------|
//! | [`lib.rs`]    | `LoadError`, `SegmentId`                                |
//! | [`directory`] | Output tree, tmp cleanup, id allocation, `flush()`      |
//! | [`manifest`]  | Persistent list of written segments (atomic file ops)   |
//! | [`writer`]    | `TableWriter` state machine and `Drop` close            |
//!
//! ## Crash Safety
//!
//! Segment files and the manifest are both written to a `.tmp` sibling and
//! renamed into place. Reopening a directory removes `.tmp` leftovers and
//! registers any complete segment the manifest missed.

mod directory;
mod manifest;
mod writer;

use schema::ValidationError;
use segment::SegmentError;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub use directory::SegmentDirectory;
pub use manifest::{Manifest, ManifestEntry, MANIFEST_FILENAME};
pub use writer::{TableWriter, WriterState};

/// Errors raised by the output side of a load.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The output directory could not be created or is not a directory.
    #[error("cannot use output directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("writer is closed")]
    ClosedWriter,

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Segment(#[from] SegmentError),

    #[error("manifest line {line}: {reason}")]
    Manifest { line: usize, reason: String },

    /// The row does not conform to the table schema.
    #[error("invalid row: {0}")]
    InvalidRow(#[from] ValidationError),
}

impl LoadError {
    /// Everything except a rejected row aborts the run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, LoadError::InvalidRow(_))
    }
}

/// Identifier of one segment file within a table directory.
///
/// Ids are allocated in increasing order and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentId(pub u64);

impl SegmentId {
    /// `seg-<id:020>.db`
    #[must_use]
    pub fn file_name(self) -> String {
        format!("seg-{:020}.db", self.0)
    }

    /// Parses a file name produced by [`file_name`](SegmentId::file_name).
    pub fn from_file_name(name: &str) -> Option<Self> {
        let digits = name.strip_prefix("seg-")?.strip_suffix(".db")?;
        if digits.len() != 20 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().map(SegmentId)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:020}", self.0)
    }
}

#[cfg(test)]
mod tests;
