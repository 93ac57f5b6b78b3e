//! Input side of a load: hourly dump files named `data-<yyyyMMddHHmm>.gz`.
//!
//! The file name carries the hour every record in the file belongs to. The
//! body is a gzip stream (possibly multi-member) of one record per line,
//! fields separated by ASCII whitespace.

use chrono::NaiveDate;
use flate2::read::MultiGzDecoder;
use regex::Regex;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Split};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

/// Errors that make the loader skip (the rest of) one input file.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("no timestamp in file name {} (expected data-yyyyMMddHHmm.gz)", path.display())]
    TimestampParse { path: PathBuf },

    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("read failed in {} after line {line}: {source}", path.display())]
    Read {
        path: PathBuf,
        line: usize,
        #[source]
        source: io::Error,
    },
}

fn file_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"data-(\d{12})\.gz$").expect("valid file name regex"))
}

/// Epoch milliseconds (UTC) of the hour named by `path`.
///
/// `data-202401011200.gz` gives 2024-01-01T12:00:00Z. Digits that do not form
/// a real date (month 13, minute 61, ...) are a [`InputError::TimestampParse`].
pub fn parse_timestamp(path: &Path) -> Result<i64, InputError> {
    let err = || InputError::TimestampParse {
        path: path.to_path_buf(),
    };

    let name = path.file_name().and_then(|n| n.to_str()).ok_or_else(err)?;
    let digits = file_name_regex()
        .captures(name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(err)?;

    let field = |range: std::ops::Range<usize>| digits[range].parse::<u32>().map_err(|_| err());
    let year = field(0..4)? as i32;
    let (month, day) = (field(4..6)?, field(6..8)?);
    let (hour, minute) = (field(8..10)?, field(10..12)?);

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
        .ok_or_else(err)
}

/// One non-blank input line split into fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// 1-based line number within the decompressed stream.
    pub line: usize,
    pub fields: Vec<String>,
}

/// Lazily decodes records from one gzip file.
pub struct RecordReader {
    path: PathBuf,
    lines: Split<BufReader<MultiGzDecoder<File>>>,
    line: usize,
    failed: bool,
}

impl RecordReader {
    pub fn open(path: &Path) -> Result<Self, InputError> {
        let file = File::open(path).map_err(|source| InputError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            lines: BufReader::new(MultiGzDecoder::new(file)).split(b'\n'),
            line: 0,
            failed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Iterator for RecordReader {
    type Item = Result<Record, InputError>;

    /// Skips blank lines. Invalid UTF-8 is replaced rather than rejected; the
    /// mapper reports whatever field ends up malformed. A read error ends the
    /// iteration after being yielded once.
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            let bytes = match self.lines.next()? {
                Ok(bytes) => bytes,
                Err(source) => {
                    self.failed = true;
                    return Some(Err(InputError::Read {
                        path: self.path.clone(),
                        line: self.line,
                        source,
                    }));
                }
            };
            self.line += 1;

            let text = String::from_utf8_lossy(&bytes);
            let fields: Vec<String> = text.split_ascii_whitespace().map(str::to_owned).collect();
            if fields.is_empty() {
                continue;
            }
            return Some(Ok(Record {
                line: self.line,
                fields,
            }));
        }
    }
}
