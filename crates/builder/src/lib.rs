//! # Builder - Sorted Segment Builder
//!
//! In-memory ordered buffer that turns a stream of rows into finalized,
//! sorted [`Segment`]s.
//!
//! Every accepted row is keyed by `(token, clustering tuple, arrival seq)` in
//! a `BTreeMap`, so the buffer is always in segment order and rows with equal
//! token and clustering values keep their input order. When the buffer hits
//! the row-count or byte-size threshold it is drained into one immutable
//! [`Segment`] and starts over empty.
//!
//! ```text
//! insert(row) -> validate -> token -> BTreeMap<(token, ck, seq), row>
//!                                         |
//!                      (rows >= max_rows || bytes >= max_bytes)?
//!                                         | yes
//!                                         v
//!                                  Some(Segment)
//! ```
//!
//! ## Known limitation
//!
//! Memory is bounded per segment, not per partition. A partition whose rows
//! straddle a threshold ends up split across two consecutive segments.
//! Downstream loaders merge such splits on import.

use partitioner::{Partitioner, Token};
use schema::{Row, Schema, ValidationError, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

/// Fixed per-row overhead added to the byte estimate (token + framing).
const ROW_OVERHEAD_BYTES: usize = 16;

/// Limits that close the current segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Maximum rows per segment.
    pub max_rows: usize,
    /// Maximum approximate payload bytes per segment.
    pub max_bytes: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_rows: 100_000,
            max_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Summary of a finalized segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentMeta {
    pub row_count: u64,
    /// Approximate payload bytes (not the on-disk size).
    pub byte_size: u64,
    pub min_token: Token,
    pub max_token: Token,
}

/// An immutable, sorted run of rows destined for one output file.
#[derive(Debug, Clone)]
pub struct Segment {
    schema: Arc<Schema>,
    partitioner: Partitioner,
    rows: Vec<(Token, Row)>,
    meta: SegmentMeta,
}

impl Segment {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The partitioner that produced the row tokens.
    pub fn partitioner(&self) -> Partitioner {
        self.partitioner
    }

    /// Rows in segment order, each with its partition token.
    pub fn rows(&self) -> &[(Token, Row)] {
        &self.rows
    }

    pub fn meta(&self) -> SegmentMeta {
        self.meta
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct SortKey {
    token: Token,
    clustering: Vec<Value>,
    seq: u64,
}

/// Buffers rows for one table and emits sorted segments.
#[derive(Debug)]
pub struct SegmentBuilder {
    schema: Arc<Schema>,
    partitioner: Partitioner,
    thresholds: Thresholds,
    buffer: BTreeMap<SortKey, Row>,
    approx_size: usize,
    /// Arrival counter; breaks ties between equal `(token, clustering)` keys.
    seq: u64,
}

impl SegmentBuilder {
    pub fn new(schema: Arc<Schema>, partitioner: Partitioner, thresholds: Thresholds) -> Self {
        Self {
            schema,
            partitioner,
            thresholds: Thresholds {
                max_rows: thresholds.max_rows.max(1),
                max_bytes: thresholds.max_bytes.max(1),
            },
            buffer: BTreeMap::new(),
            approx_size: 0,
            seq: 0,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn partitioner(&self) -> Partitioner {
        self.partitioner
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Validates and buffers `row`.
    ///
    /// Returns `Ok(Some(segment))` when this row filled the buffer.
    ///
    /// # Errors
    ///
    /// A row that does not conform to the schema is rejected and the buffer
    /// is left untouched.
    pub fn insert(&mut self, row: Row) -> Result<Option<Segment>, ValidationError> {
        self.schema.validate(&row)?;

        let key = SortKey {
            token: self.partitioner.token(&self.schema, &row),
            clustering: self.schema.clustering_values(&row),
            seq: self.seq,
        };
        self.seq += 1;
        self.approx_size += row.approx_size() + ROW_OVERHEAD_BYTES;
        self.buffer.insert(key, row);

        if self.buffer.len() >= self.thresholds.max_rows
            || self.approx_size >= self.thresholds.max_bytes
        {
            return Ok(self.drain());
        }
        Ok(None)
    }

    /// Drains whatever is buffered into a final, possibly short, segment.
    pub fn finish(&mut self) -> Option<Segment> {
        self.drain()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn approx_size(&self) -> usize {
        self.approx_size
    }

    fn drain(&mut self) -> Option<Segment> {
        if self.buffer.is_empty() {
            return None;
        }
        let buffer = std::mem::take(&mut self.buffer);
        let byte_size = std::mem::take(&mut self.approx_size) as u64;

        let rows: Vec<(Token, Row)> = buffer.into_iter().map(|(k, row)| (k.token, row)).collect();
        // BTreeMap order: first and last carry the token bounds
        let min_token = rows.first().map_or(Token::MIN, |(t, _)| *t);
        let max_token = rows.last().map_or(Token::MIN, |(t, _)| *t);

        trace!(rows = rows.len(), byte_size, "segment finalized");

        Some(Segment {
            schema: Arc::clone(&self.schema),
            partitioner: self.partitioner,
            meta: SegmentMeta {
                row_count: rows.len() as u64,
                byte_size,
                min_token,
                max_token,
            },
            rows,
        })
    }
}
