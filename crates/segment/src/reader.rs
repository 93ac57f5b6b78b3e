use bloom::BloomFilter;
use byteorder::{LittleEndian, ReadBytesExt};
use crc32fast::Hasher as Crc32;
use partitioner::{serialize_partition_key, Partitioner, Token};
use schema::{Row, Schema};
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::format::{read_header, read_value, Footer, FOOTER_BYTES, MAX_KEY_BYTES, MAX_RECORD_BYTES};
use crate::SegmentError;

/// One partition run in the segment's index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub token: Token,
    /// Serialized partition key.
    pub key: Vec<u8>,
    /// Offset of the run's first record.
    pub data_offset: u64,
}

/// Reads a segment file written by [`SegmentWriter`](crate::SegmentWriter).
///
/// [`open`](SegmentReader::open) validates the footer against the real file
/// length, decodes the header schema and loads the bloom filter and the
/// partition index into memory. Rows are streamed on demand.
#[derive(Debug)]
pub struct SegmentReader {
    path: PathBuf,
    schema: Arc<Schema>,
    partitioner: Partitioner,
    footer: Footer,
    bloom: BloomFilter,
    index: Vec<IndexEntry>,
}

impl SegmentReader {
    /// Opens `path` and loads its metadata.
    ///
    /// # Errors
    ///
    /// [`SegmentError::Corrupt`] if the footer, header, bloom or index
    /// sections are inconsistent (including a truncated file), or any I/O error.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SegmentError> {
        let path = path.as_ref().to_path_buf();
        let mut f = BufReader::new(File::open(&path)?);

        let footer = Footer::read_from(&mut f)?;

        f.seek(SeekFrom::Start(0))?;
        let (schema, algorithm) = read_header(&mut f)?;
        if f.stream_position()? != footer.data_offset {
            return Err(SegmentError::Corrupt(
                "header does not end at the data section".into(),
            ));
        }

        f.seek(SeekFrom::Start(footer.bloom_offset))?;
        let bloom = BloomFilter::read_from(&mut f)
            .map_err(|e| SegmentError::Corrupt(format!("bloom section: {}", e)))?;
        if f.stream_position()? != footer.index_offset {
            return Err(SegmentError::Corrupt(
                "bloom section does not end at the index".into(),
            ));
        }

        let index_end = footer.file_len - FOOTER_BYTES;
        let mut index = Vec::new();
        let mut pos = footer.index_offset;
        while pos < index_end {
            let token = Token::new(f.read_u64::<LittleEndian>()?);
            let key_len = f.read_u32::<LittleEndian>()? as usize;
            if key_len > MAX_KEY_BYTES {
                return Err(SegmentError::Corrupt(format!(
                    "index key_len {} exceeds maximum {}",
                    key_len, MAX_KEY_BYTES
                )));
            }
            let mut key = vec![0u8; key_len];
            f.read_exact(&mut key)?;
            let data_offset = f.read_u64::<LittleEndian>()?;
            if data_offset < footer.data_offset || data_offset >= footer.bloom_offset {
                return Err(SegmentError::Corrupt(format!(
                    "index offset {} outside the data section",
                    data_offset
                )));
            }
            index.push(IndexEntry {
                token,
                key,
                data_offset,
            });
            pos += 8 + 4 + key_len as u64 + 8;
        }
        if pos != index_end {
            return Err(SegmentError::Corrupt("index overruns the footer".into()));
        }

        Ok(Self {
            path,
            schema: Arc::new(schema),
            partitioner: Partitioner::new(algorithm),
            footer,
            bloom,
            index,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Schema recorded in the file header.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn partitioner(&self) -> Partitioner {
        self.partitioner
    }

    pub fn footer(&self) -> &Footer {
        &self.footer
    }

    #[must_use]
    pub fn row_count(&self) -> u64 {
        self.footer.row_count
    }

    /// Partition runs in file order (ascending token).
    pub fn index(&self) -> &[IndexEntry] {
        &self.index
    }

    /// `false` means no row of this partition is in the file.
    #[must_use]
    pub fn may_contain_partition(&self, key: &[u8]) -> bool {
        self.bloom.may_contain(key)
    }

    /// Streams every row in file order, verifying each record's CRC.
    pub fn iter(&self) -> Result<SegmentRows, SegmentError> {
        let mut f = BufReader::new(File::open(&self.path)?);
        f.seek(SeekFrom::Start(self.footer.data_offset))?;
        Ok(SegmentRows {
            reader: f,
            columns: self.schema.columns().len(),
            remaining: self.footer.row_count,
            pos: self.footer.data_offset,
            end: self.footer.bloom_offset,
        })
    }

    /// Reads every row into memory.
    pub fn read_all(&self) -> Result<Vec<(Token, Row)>, SegmentError> {
        self.iter()?.collect()
    }

    /// Point lookup of all rows for one serialized partition key.
    ///
    /// The bloom filter is checked first; a negative answer skips the index
    /// and the disk entirely.
    pub fn partition(&self, key: &[u8]) -> Result<Vec<Row>, SegmentError> {
        if !self.bloom.may_contain(key) {
            return Ok(Vec::new());
        }

        let token = self.partitioner.token_for_key(key);
        let start = self.index.partition_point(|e| e.token < token);
        let mut rows = Vec::new();

        for entry in self.index[start..].iter().take_while(|e| e.token == token) {
            if entry.key != key {
                continue;
            }
            let mut f = BufReader::new(File::open(&self.path)?);
            f.seek(SeekFrom::Start(entry.data_offset))?;
            let mut pos = entry.data_offset;
            while pos < self.footer.bloom_offset {
                let (row_token, row, len) = read_record(&mut f, self.schema.columns().len())?;
                pos += len;
                if row_token != token || serialize_partition_key(&self.schema, &row) != key {
                    break;
                }
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

/// Iterator over the rows of a segment file.
pub struct SegmentRows {
    reader: BufReader<File>,
    columns: usize,
    remaining: u64,
    pos: u64,
    end: u64,
}

impl Iterator for SegmentRows {
    type Item = Result<(Token, Row), SegmentError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        if self.pos >= self.end {
            self.remaining = 0;
            return Some(Err(SegmentError::Corrupt(
                "data section ended before row_count rows".into(),
            )));
        }
        match read_record(&mut self.reader, self.columns) {
            Ok((token, row, len)) => {
                self.remaining -= 1;
                self.pos += len;
                Some(Ok((token, row)))
            }
            Err(e) => {
                self.remaining = 0;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining as usize))
    }
}

/// Reads one `[crc][body_len][body]` record, returning the decoded row and
/// the number of bytes consumed.
fn read_record<R: Read>(r: &mut R, columns: usize) -> Result<(Token, Row, u64), SegmentError> {
    let stored_crc = r.read_u32::<LittleEndian>()?;
    let body_len = r.read_u32::<LittleEndian>()? as usize;
    if body_len > MAX_RECORD_BYTES {
        return Err(SegmentError::Corrupt(format!(
            "record of {} bytes exceeds maximum {}",
            body_len, MAX_RECORD_BYTES
        )));
    }
    let mut body = vec![0u8; body_len];
    r.read_exact(&mut body)?;

    let mut hasher = Crc32::new();
    hasher.update(&body);
    let actual_crc = hasher.finalize();
    if actual_crc != stored_crc {
        return Err(SegmentError::Corrupt(format!(
            "CRC32 mismatch: expected {:#010x}, got {:#010x}",
            stored_crc, actual_crc
        )));
    }

    let mut cur = Cursor::new(body.as_slice());
    let token = Token::new(cur.read_u64::<LittleEndian>()?);
    let values = (0..columns)
        .map(|_| read_value(&mut cur))
        .collect::<Result<Vec<_>, _>>()?;
    if cur.position() != body_len as u64 {
        return Err(SegmentError::Corrupt("trailing bytes in record".into()));
    }

    Ok((token, Row::new(values), 8 + body_len as u64))
}
