//! Drives a whole run: input files in, segment files out.
//!
//! ```text
//! file ─> parse_timestamp ─> RecordReader ─> Mapper::map ─> TableWriter::append
//!           | error             | error        | error          | InvalidRow
//!           v                   v              v                v
//!        skip file        skip rest of file   reject record  reject record
//! ```
//!
//! Only output-side failures (directory, I/O, closed writer) abort the run.

use config::LoaderConfig;
use loader::{LoadError, SegmentDirectory, TableWriter};
use partitioner::Partitioner;
use rayon::prelude::*;
use schema::Mapper;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::input::{parse_timestamp, RecordReader};

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub files_processed: u64,
    pub files_skipped: u64,
    pub records_accepted: u64,
    pub records_rejected: u64,
    pub segments_written: u64,
}

impl RunSummary {
    fn merge(mut self, other: RunSummary) -> RunSummary {
        self.files_processed += other.files_processed;
        self.files_skipped += other.files_skipped;
        self.records_accepted += other.records_accepted;
        self.records_rejected += other.records_rejected;
        self.segments_written += other.segments_written;
        self
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "files processed: {}, files skipped: {}, records accepted: {}, records rejected: {}, segments written: {}",
            self.files_processed,
            self.files_skipped,
            self.records_accepted,
            self.records_rejected,
            self.segments_written
        )
    }
}

/// Loads `files` into the table described by `config`.
///
/// With `config.jobs == 1` every file feeds one writer, in argument order.
/// With more jobs each file gets its own writer on a rayon pool; all writers
/// share one [`SegmentDirectory`].
///
/// # Errors
///
/// Only fatal [`LoadError`]s. Bad files and bad records are counted in the
/// returned summary instead.
pub fn run(config: &LoaderConfig, files: &[PathBuf]) -> Result<RunSummary, LoadError> {
    let schema = &config.schema;
    let directory = Arc::new(SegmentDirectory::open(
        &config.output_dir,
        schema.keyspace(),
        schema.table(),
    )?);
    let partitioner = Partitioner::new(config.hash_algorithm);
    let mapper = Mapper::new(schema);

    info!(
        files = files.len(),
        output = %directory.path().display(),
        partitioner = %config.hash_algorithm,
        jobs = config.jobs,
        "load started"
    );

    let new_writer = || {
        TableWriter::new(
            Arc::clone(&directory),
            Arc::clone(schema),
            partitioner,
            config.thresholds,
        )
    };

    let summary = if config.jobs > 1 && files.len() > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.jobs)
            .build()
            .map_err(|e| LoadError::Io(io::Error::new(io::ErrorKind::Other, e)))?;

        let per_file = pool.install(|| {
            files
                .par_iter()
                .map(|path| -> Result<RunSummary, LoadError> {
                    let mut writer = new_writer();
                    let mut summary = load_file(path, &mapper, &mut writer)?;
                    writer.close()?;
                    summary.segments_written = writer.segments().len() as u64;
                    Ok(summary)
                })
                .collect::<Result<Vec<_>, LoadError>>()
        })?;
        per_file.into_iter().fold(RunSummary::default(), RunSummary::merge)
    } else {
        let mut writer = new_writer();
        let mut summary = RunSummary::default();
        for path in files {
            summary = summary.merge(load_file(path, &mapper, &mut writer)?);
        }
        writer.close()?;
        summary.segments_written = writer.segments().len() as u64;
        summary
    };

    info!(
        files_processed = summary.files_processed,
        files_skipped = summary.files_skipped,
        records_accepted = summary.records_accepted,
        records_rejected = summary.records_rejected,
        segments_written = summary.segments_written,
        "load finished"
    );
    Ok(summary)
}

/// Streams one file into `writer`. Never fails for input problems.
fn load_file(
    path: &Path,
    mapper: &Mapper<'_>,
    writer: &mut TableWriter,
) -> Result<RunSummary, LoadError> {
    let mut summary = RunSummary::default();

    let opened = parse_timestamp(path).and_then(|ts| Ok((ts, RecordReader::open(path)?)));
    let (timestamp, records) = match opened {
        Ok(opened) => opened,
        Err(e) => {
            warn!(file = %path.display(), error = %e, "skipping file");
            summary.files_skipped = 1;
            return Ok(summary);
        }
    };

    for record in records {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "read error, rest of file skipped");
                break;
            }
        };

        let row = match mapper.map(timestamp, &record.fields) {
            Ok(row) => row,
            Err(reason) => {
                warn!(file = %path.display(), line = record.line, %reason, "malformed record");
                summary.records_rejected += 1;
                continue;
            }
        };

        match writer.append(row) {
            Ok(()) => summary.records_accepted += 1,
            Err(e) if !e.is_fatal() => {
                warn!(file = %path.display(), line = record.line, reason = %e, "record rejected");
                summary.records_rejected += 1;
            }
            Err(e) => return Err(e),
        }
    }

    summary.files_processed = 1;
    info!(
        file = %path.display(),
        accepted = summary.records_accepted,
        rejected = summary.records_rejected,
        "file loaded"
    );
    Ok(summary)
}
