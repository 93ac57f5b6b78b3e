//! # Manifest - Segment Inventory
//!
//! Records every segment file written into a table directory, so a
//! downstream importer can pick up exactly the complete files.
//!
//! ## File Format
//!
//! Text, one segment per line, ordered by id:
//!
//! ```text
//! 1:seg-00000000000000000001.db:100000
//! 2:seg-00000000000000000002.db:31337
//! ```
//!
//! Lines starting with `#` are comments. Empty lines are ignored.
//!
//! ## Crash Safety
//!
//! The manifest is rewritten atomically: write to a `.tmp` file, fsync, then
//! rename over the existing manifest.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::{LoadError, SegmentId};

/// Name of the manifest file within a table directory.
pub const MANIFEST_FILENAME: &str = "MANIFEST";

const MANIFEST_TMP_FILENAME: &str = "MANIFEST.tmp";

/// One written segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub id: SegmentId,
    /// Basename of the segment file.
    pub filename: String,
    pub rows: u64,
}

/// In-memory representation of the manifest.
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Loads `dir/MANIFEST`, or starts an empty manifest if there is none.
    ///
    /// # Errors
    ///
    /// [`LoadError::Manifest`] if a line cannot be parsed.
    pub fn load_or_create(dir: &Path) -> Result<Self, LoadError> {
        let path = dir.join(MANIFEST_FILENAME);
        if !path.exists() {
            return Ok(Self {
                path,
                entries: Vec::new(),
            });
        }

        let reader = BufReader::new(File::open(&path)?);
        let mut entries = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let bad = |reason: &str| LoadError::Manifest {
                line: line_num + 1,
                reason: format!("{} (expected '<id>:<filename>:<rows>'): {}", reason, trimmed),
            };

            let mut parts = trimmed.splitn(3, ':');
            let (id, filename, rows) = match (parts.next(), parts.next(), parts.next()) {
                (Some(id), Some(filename), Some(rows)) => (id, filename, rows),
                _ => return Err(bad("invalid format")),
            };
            let id = id.parse::<u64>().map_err(|_| bad("invalid id"))?;
            let rows = rows.parse::<u64>().map_err(|_| bad("invalid row count"))?;

            entries.push(ManifestEntry {
                id: SegmentId(id),
                filename: filename.to_string(),
                rows,
            });
        }
        entries.sort_by_key(|e| e.id);

        Ok(Self { path, entries })
    }

    /// Persists the manifest (tmp + fsync + rename).
    pub fn save(&self) -> Result<(), LoadError> {
        let tmp_path = self.path.with_file_name(MANIFEST_TMP_FILENAME);
        {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            Self::write_contents(&mut f, &self.entries)?;
            f.flush()?;
            f.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn write_contents(f: &mut File, entries: &[ManifestEntry]) -> Result<(), LoadError> {
        writeln!(f, "# bulkload segment manifest")?;
        writeln!(f, "# Format: <id>:<filename>:<rows>")?;
        for entry in entries {
            writeln!(f, "{}:{}:{}", entry.id.0, entry.filename, entry.rows)?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries ordered by segment id.
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn contains(&self, id: SegmentId) -> bool {
        self.entries.binary_search_by_key(&id, |e| e.id).is_ok()
    }

    /// Total rows across all recorded segments.
    pub fn total_rows(&self) -> u64 {
        self.entries.iter().map(|e| e.rows).sum()
    }

    /// Records a segment (does **not** save to disk). Keeps id order.
    pub fn add(&mut self, id: SegmentId, rows: u64) {
        let entry = ManifestEntry {
            id,
            filename: id.file_name(),
            rows,
        };
        match self.entries.binary_search_by_key(&id, |e| e.id) {
            Ok(pos) => self.entries[pos] = entry,
            Err(pos) => self.entries.insert(pos, entry),
        }
    }
}
