//! Output directory of one table and segment id allocation.

use builder::Segment;
use segment::{SegmentError, SegmentReader, SegmentWriter};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::manifest::Manifest;
use crate::{LoadError, SegmentId};

#[derive(Debug)]
struct DirState {
    next_id: u64,
    manifest: Manifest,
}

/// Output tree for one table: `<base>/<keyspace>/<table>/`.
///
/// Shared between writers through an `Arc`. The id counter and the manifest
/// sit behind a single mutex; segment files themselves are written outside
/// the lock, so parallel writers only serialize on id allocation and on the
/// manifest update.
#[derive(Debug)]
pub struct SegmentDirectory {
    path: PathBuf,
    state: Mutex<DirState>,
}

impl SegmentDirectory {
    /// Creates (or reopens) `<base>/<keyspace>/<table>`.
    ///
    /// # Recovery Steps
    ///
    /// 1. Create the directory tree if it does not exist.
    /// 2. Remove leftover `.tmp` files from interrupted writes.
    /// 3. Load the manifest and register complete segments it is missing.
    /// 4. Seed the id counter past the highest existing segment id.
    ///
    /// # Errors
    ///
    /// [`LoadError::Directory`] if the tree cannot be created or the target
    /// exists but is not a directory.
    pub fn open<P: AsRef<Path>>(base: P, keyspace: &str, table: &str) -> Result<Self, LoadError> {
        let path = base.as_ref().join(keyspace).join(table);

        fs::create_dir_all(&path).map_err(|source| LoadError::Directory {
            path: path.clone(),
            source,
        })?;
        if !path.is_dir() {
            return Err(LoadError::Directory {
                path,
                source: io::Error::new(io::ErrorKind::AlreadyExists, "not a directory"),
            });
        }

        Self::cleanup_tmp_files(&path);

        let mut manifest = Manifest::load_or_create(&path)?;
        let mut existing: Vec<SegmentId> = fs::read_dir(&path)?
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().to_str().and_then(SegmentId::from_file_name))
            .collect();
        existing.sort();

        let mut recovered = false;
        for &id in &existing {
            if manifest.contains(id) {
                continue;
            }
            match SegmentReader::open(path.join(id.file_name())) {
                Ok(reader) => {
                    manifest.add(id, reader.row_count());
                    recovered = true;
                }
                Err(e) => warn!(segment = %id, error = %e, "unreadable segment left out of manifest"),
            }
        }
        if recovered {
            manifest.save()?;
        }

        let highest = existing
            .iter()
            .copied()
            .chain(manifest.entries().iter().map(|e| e.id))
            .max()
            .map_or(0, |id| id.0);

        info!(
            path = %path.display(),
            existing = manifest.entries().len(),
            next_id = highest + 1,
            "segment directory opened"
        );

        Ok(Self {
            path,
            state: Mutex::new(DirState {
                next_id: highest + 1,
                manifest,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `segment` to the next free `seg-<id>.db` and records it in the
    /// manifest.
    ///
    /// # Errors
    ///
    /// Any I/O or encoding failure; [`SegmentError::Empty`] for an empty segment.
    pub fn flush(&self, segment: &Segment) -> Result<SegmentId, LoadError> {
        let id = loop {
            let id = self.allocate_id();
            let path = self.path.join(id.file_name());
            match SegmentWriter::write(&path, segment) {
                Ok(info) => {
                    debug!(
                        segment = %id,
                        rows = info.row_count,
                        partitions = info.partitions,
                        bytes = info.file_len,
                        "segment flushed"
                    );
                    break id;
                }
                // someone else took the name; move on to the next id
                Err(SegmentError::AlreadyExists(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        };

        let mut state = self.lock();
        state.manifest.add(id, segment.len() as u64);
        state.manifest.save()?;
        Ok(id)
    }

    /// Snapshot of the manifest.
    pub fn manifest(&self) -> Manifest {
        self.lock().manifest.clone()
    }

    /// Number of segments recorded so far.
    pub fn segment_count(&self) -> usize {
        self.lock().manifest.entries().len()
    }

    fn allocate_id(&self) -> SegmentId {
        let mut state = self.lock();
        loop {
            let id = SegmentId(state.next_id);
            state.next_id += 1;
            if !self.path.join(id.file_name()).exists() {
                return id;
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, DirState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn cleanup_tmp_files(dir: &Path) {
        if let Ok(entries) = fs::read_dir(dir) {
            for entry in entries.flatten() {
                let p = entry.path();
                if let Some(name) = p.file_name().and_then(|n| n.to_str()) {
                    if name.ends_with(".tmp") {
                        debug!(file = name, "removing leftover tmp file");
                        let _ = fs::remove_file(&p);
                    }
                }
            }
        }
    }
}
