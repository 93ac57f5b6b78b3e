use bloom::BloomFilter;
use builder::Segment;
use byteorder::{LittleEndian, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use partitioner::serialize_partition_key;
use std::fs::{rename, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::format::{write_header, write_value, Footer, FOOTER_BYTES};
use crate::SegmentError;

/// Bloom filter false positive rate (1%).
const BLOOM_FPR: f64 = 0.01;

/// What ended up on disk for one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentFileInfo {
    pub path: PathBuf,
    pub row_count: u64,
    /// Number of partition runs (index entries).
    pub partitions: u64,
    pub file_len: u64,
}

/// Serializes a finalized [`Segment`] into an immutable file.
///
/// Stateless: the whole job happens inside [`write`](SegmentWriter::write).
pub struct SegmentWriter {}

impl SegmentWriter {
    /// Writes `segment` to `path`, rows in the segment's stored order.
    ///
    /// # Crash Safety
    ///
    /// Bytes go to `<path>.tmp`, which is fsynced and renamed onto `path`. An
    /// interrupted write leaves only the `.tmp` file, which the output
    /// directory removes the next time it is opened.
    ///
    /// # Errors
    ///
    /// [`SegmentError::Empty`] for an empty segment, [`SegmentError::AlreadyExists`]
    /// if `path` is taken (segments are never overwritten), or any I/O error.
    pub fn write(path: &Path, segment: &Segment) -> Result<SegmentFileInfo, SegmentError> {
        if segment.is_empty() {
            return Err(SegmentError::Empty);
        }
        if path.exists() {
            return Err(SegmentError::AlreadyExists(path.to_path_buf()));
        }

        let tmp_path = tmp_path_for(path);
        let raw_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        let mut file = BufWriter::new(raw_file);

        let schema = segment.schema();
        let mut header = Vec::with_capacity(128);
        write_header(&mut header, schema, segment.partitioner().algorithm())?;
        file.write_all(&header)?;

        // Offsets are tracked by hand; seeking a BufWriter flushes it.
        let mut pos = header.len() as u64;

        // Write DATA section
        let data_offset = pos;
        let mut bloom = BloomFilter::new(segment.len(), BLOOM_FPR);
        // one entry per run of rows sharing a partition key
        let mut index: Vec<(u64, Vec<u8>, u64)> = Vec::new();
        let mut record_buf: Vec<u8> = Vec::with_capacity(256);

        for (token, row) in segment.rows() {
            record_buf.clear();
            record_buf.write_u64::<LittleEndian>(token.as_u64())?;
            for value in row.values() {
                write_value(&mut record_buf, value.as_ref())?;
            }

            let mut hasher = Crc32::new();
            hasher.update(&record_buf);
            let crc = hasher.finalize();

            let offset = pos;
            file.write_u32::<LittleEndian>(crc)?;
            file.write_u32::<LittleEndian>(record_buf.len() as u32)?;
            file.write_all(&record_buf)?;
            pos += 8 + record_buf.len() as u64;

            let key = serialize_partition_key(schema, row);
            let new_run = index
                .last()
                .map_or(true, |(t, k, _)| *t != token.as_u64() || *k != key);
            if new_run {
                bloom.insert(&key);
                index.push((token.as_u64(), key, offset));
            }
        }

        // Write BLOOM section
        let bloom_offset = pos;
        bloom.write_to(&mut file)?;
        pos += bloom.serialized_size() as u64;

        // Write INDEX section
        let index_offset = pos;
        for (token, key, data_offset) in &index {
            file.write_u64::<LittleEndian>(*token)?;
            file.write_u32::<LittleEndian>(key.len() as u32)?;
            file.write_all(key)?;
            file.write_u64::<LittleEndian>(*data_offset)?;
            pos += 8 + 4 + key.len() as u64 + 8;
        }

        let meta = segment.meta();
        let file_len = pos + FOOTER_BYTES;
        Footer {
            row_count: meta.row_count,
            min_token: meta.min_token,
            max_token: meta.max_token,
            data_offset,
            bloom_offset,
            index_offset,
            file_len,
        }
        .write_to(&mut file)?;

        file.flush()?;
        file.into_inner().map_err(|e| e.into_error())?.sync_all()?;

        if path.exists() {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(SegmentError::AlreadyExists(path.to_path_buf()));
        }
        rename(&tmp_path, path)?;

        // Make the rename durable.
        if let Some(parent) = path.parent() {
            if let Ok(dir) = std::fs::File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        debug!(
            path = %path.display(),
            rows = meta.row_count,
            partitions = index.len(),
            bytes = file_len,
            "segment written"
        );

        Ok(SegmentFileInfo {
            path: path.to_path_buf(),
            row_count: meta.row_count,
            partitions: index.len() as u64,
            file_len,
        })
    }
}

/// `seg-0001.db` -> `seg-0001.db.tmp`
pub(crate) fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
