//! Write path: `open()`, `append()`, `flush()`, `close()`.

use builder::{SegmentBuilder, Thresholds};
use partitioner::Partitioner;
use schema::{Row, Schema};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{LoadError, SegmentDirectory, SegmentId};

/// Lifecycle of a [`TableWriter`].
///
/// ```text
/// Idle -> Open -> {Flushing -> Open}* -> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Idle,
    Open,
    Flushing,
    Closed,
}

/// Buffers rows for one table and writes them out as sorted segments.
///
/// # Write Path
///
/// 1. Validate the row and insert it into the [`SegmentBuilder`].
/// 2. When the builder reaches a threshold, hand the finalized segment to the
///    shared [`SegmentDirectory`], which assigns the id and writes the file.
/// 3. `close()` drains whatever is left into a final, possibly short, segment.
///
/// After `close()` every operation returns [`LoadError::ClosedWriter`].
pub struct TableWriter {
    directory: Arc<SegmentDirectory>,
    builder: SegmentBuilder,
    state: WriterState,
    segments: Vec<SegmentId>,
    rows_written: u64,
}

impl std::fmt::Debug for TableWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableWriter")
            .field("state", &self.state)
            .field("directory", &self.directory.path())
            .field("buffered_rows", &self.builder.len())
            .field("buffered_bytes", &self.builder.approx_size())
            .field("segments_written", &self.segments.len())
            .field("rows_written", &self.rows_written)
            .finish()
    }
}

impl TableWriter {
    pub fn new(
        directory: Arc<SegmentDirectory>,
        schema: Arc<Schema>,
        partitioner: Partitioner,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            directory,
            builder: SegmentBuilder::new(schema, partitioner, thresholds),
            state: WriterState::Idle,
            segments: Vec::new(),
            rows_written: 0,
        }
    }

    /// Moves an idle writer to `Open`. Opening an open writer is a no-op.
    pub fn open(&mut self) -> Result<(), LoadError> {
        match self.state {
            WriterState::Closed => Err(LoadError::ClosedWriter),
            WriterState::Idle => {
                self.state = WriterState::Open;
                debug!(table = %self.builder.schema().table(), "writer opened");
                Ok(())
            }
            WriterState::Open | WriterState::Flushing => Ok(()),
        }
    }

    /// Buffers one row, opening the writer first if it is still idle.
    ///
    /// # Errors
    ///
    /// [`LoadError::InvalidRow`] if the row does not fit the schema (the
    /// writer stays usable), [`LoadError::ClosedWriter`] after `close()`, or
    /// any failure writing a segment that this row completed.
    pub fn append(&mut self, row: Row) -> Result<(), LoadError> {
        self.open()?;
        if let Some(segment) = self.builder.insert(row)? {
            self.write_segment(&segment)?;
        }
        Ok(())
    }

    /// Forces the buffered rows out as a segment. No-op when nothing is buffered.
    pub fn flush(&mut self) -> Result<Option<SegmentId>, LoadError> {
        if self.state == WriterState::Closed {
            return Err(LoadError::ClosedWriter);
        }
        match self.builder.finish() {
            Some(segment) => self.write_segment(&segment).map(Some),
            None => Ok(None),
        }
    }

    /// Flushes the remainder and closes the writer.
    ///
    /// The writer is `Closed` afterwards even if the final flush failed.
    pub fn close(&mut self) -> Result<(), LoadError> {
        if self.state == WriterState::Closed {
            return Err(LoadError::ClosedWriter);
        }
        let result = self.flush().map(|_| ());
        self.state = WriterState::Closed;

        info!(
            table = %self.builder.schema().table(),
            segments = self.segments.len(),
            rows = self.rows_written,
            "writer closed"
        );
        result
    }

    fn write_segment(&mut self, segment: &builder::Segment) -> Result<SegmentId, LoadError> {
        self.state = WriterState::Flushing;
        let result = self.directory.flush(segment);
        self.state = WriterState::Open;

        let id = result?;
        self.segments.push(id);
        self.rows_written += segment.len() as u64;
        Ok(id)
    }

    #[must_use]
    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Ids of the segments this writer produced, in write order.
    pub fn segments(&self) -> &[SegmentId] {
        &self.segments
    }

    /// Rows already written to segment files.
    #[must_use]
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Rows accepted but not yet written.
    #[must_use]
    pub fn buffered_rows(&self) -> usize {
        self.builder.len()
    }

    pub fn directory(&self) -> &Arc<SegmentDirectory> {
        &self.directory
    }
}

/// Best-effort close on drop.
///
/// Buffered rows are written out if the writer was never closed. `Drop`
/// cannot propagate a failure, so it is logged instead.
impl Drop for TableWriter {
    fn drop(&mut self) {
        if self.state != WriterState::Closed {
            let pending = self.builder.len();
            if let Err(e) = self.close() {
                warn!(
                    table = %self.builder.schema().table(),
                    rows = pending,
                    error = %e,
                    "close on drop failed, buffered rows lost"
                );
            }
        }
    }
}
