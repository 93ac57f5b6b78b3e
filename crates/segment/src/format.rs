//! Segment binary format: magic numbers, footer, header and value codecs.
//!
//! ## Footer (60 bytes)
//!
//! ```text
//! [row_count: u64][min_token: u64][max_token: u64][data_offset: u64]
//! [bloom_offset: u64][index_offset: u64][file_len: u64][magic: u32 = "BLK1"]
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use partitioner::{HashAlgorithm, Token};
use schema::{ColumnType, Schema, Value};
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::SegmentError;

/// Magic number closing every segment file (ASCII "BLK1").
pub const SEGMENT_MAGIC: u32 = 0x424c_4b31;

/// Magic number opening every segment file (ASCII "BLKH").
pub const HEADER_MAGIC: u32 = 0x424c_4b48;

pub const FORMAT_VERSION: u16 = 1;

/// Footer size: seven `u64` fields plus the `u32` magic.
pub const FOOTER_BYTES: u64 = 7 * 8 + 4;

/// Values longer than this are treated as corruption on read. Same bound
/// [`Schema::validate`] enforces on write.
pub(crate) const MAX_VALUE_BYTES: usize = schema::MAX_TEXT_BYTES;

/// Row record bodies longer than this are treated as corruption (64 MiB).
///
/// A validated row encodes to at most `MAX_ROW_BYTES` plus the token and
/// four length bytes per column, well under this.
pub(crate) const MAX_RECORD_BYTES: usize = 64 * 1024 * 1024;

/// Index keys longer than this are treated as corruption.
pub(crate) const MAX_KEY_BYTES: usize = schema::MAX_PARTITION_KEY_BYTES;

/// Fixed-size trailer of a segment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub row_count: u64,
    pub min_token: Token,
    pub max_token: Token,
    pub data_offset: u64,
    pub bloom_offset: u64,
    pub index_offset: u64,
    /// Total file length including this footer.
    pub file_len: u64,
}

impl Footer {
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u64::<LittleEndian>(self.row_count)?;
        w.write_u64::<LittleEndian>(self.min_token.as_u64())?;
        w.write_u64::<LittleEndian>(self.max_token.as_u64())?;
        w.write_u64::<LittleEndian>(self.data_offset)?;
        w.write_u64::<LittleEndian>(self.bloom_offset)?;
        w.write_u64::<LittleEndian>(self.index_offset)?;
        w.write_u64::<LittleEndian>(self.file_len)?;
        w.write_u32::<LittleEndian>(SEGMENT_MAGIC)?;
        Ok(())
    }

    /// Reads and sanity-checks the footer at the end of `r`.
    ///
    /// Checks the magic, that `file_len` equals the actual length (detects
    /// truncated or appended files) and that section offsets are ordered.
    pub fn read_from<R: Read + Seek>(r: &mut R) -> Result<Self, SegmentError> {
        let filesize = r.seek(SeekFrom::End(0))?;
        if filesize < FOOTER_BYTES {
            return Err(SegmentError::Corrupt("file too small for footer".into()));
        }

        r.seek(SeekFrom::End(-(FOOTER_BYTES as i64)))?;
        let row_count = r.read_u64::<LittleEndian>()?;
        let min_token = Token::new(r.read_u64::<LittleEndian>()?);
        let max_token = Token::new(r.read_u64::<LittleEndian>()?);
        let data_offset = r.read_u64::<LittleEndian>()?;
        let bloom_offset = r.read_u64::<LittleEndian>()?;
        let index_offset = r.read_u64::<LittleEndian>()?;
        let file_len = r.read_u64::<LittleEndian>()?;
        let magic = r.read_u32::<LittleEndian>()?;

        if magic != SEGMENT_MAGIC {
            return Err(SegmentError::Corrupt(format!(
                "unknown segment magic: {:#x}",
                magic
            )));
        }
        if file_len != filesize {
            return Err(SegmentError::Corrupt(format!(
                "footer records {} bytes, file has {}",
                file_len, filesize
            )));
        }
        let footer_start = filesize - FOOTER_BYTES;
        if !(data_offset <= bloom_offset && bloom_offset <= index_offset && index_offset <= footer_start)
        {
            return Err(SegmentError::Corrupt("section offsets out of order".into()));
        }
        if min_token > max_token {
            return Err(SegmentError::Corrupt("min_token > max_token".into()));
        }

        Ok(Self {
            row_count,
            min_token,
            max_token,
            data_offset,
            bloom_offset,
            index_offset,
            file_len,
        })
    }
}

fn header_u16(n: usize, what: &str) -> io::Result<u16> {
    u16::try_from(n).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} {} does not fit the header", what, n),
        )
    })
}

fn write_short_str<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    w.write_u16::<LittleEndian>(header_u16(s.len(), "string length")?)?;
    w.write_all(s.as_bytes())
}

fn read_short_str<R: Read>(r: &mut R) -> Result<String, SegmentError> {
    let len = r.read_u16::<LittleEndian>()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| SegmentError::Corrupt("header string is not UTF-8".into()))
}

/// Writes the self-describing header.
pub(crate) fn write_header<W: Write>(
    w: &mut W,
    schema: &Schema,
    algorithm: HashAlgorithm,
) -> io::Result<()> {
    w.write_u32::<LittleEndian>(HEADER_MAGIC)?;
    w.write_u16::<LittleEndian>(FORMAT_VERSION)?;
    w.write_u8(algorithm.code())?;
    write_short_str(w, schema.keyspace())?;
    write_short_str(w, schema.table())?;

    w.write_u16::<LittleEndian>(header_u16(schema.columns().len(), "column count")?)?;
    for c in schema.columns() {
        write_short_str(w, &c.name)?;
        w.write_u8(c.kind.code())?;
        w.write_u8(u8::from(c.nullable))?;
    }

    for key in [schema.partition_key(), schema.clustering_key()] {
        w.write_u16::<LittleEndian>(header_u16(key.len(), "key length")?)?;
        for &idx in key {
            w.write_u16::<LittleEndian>(header_u16(idx, "column index")?)?;
        }
    }
    Ok(())
}

/// Reads the header written by [`write_header`], rebuilding the schema
/// through the regular validating builder.
pub(crate) fn read_header<R: Read>(r: &mut R) -> Result<(Schema, HashAlgorithm), SegmentError> {
    let magic = r.read_u32::<LittleEndian>()?;
    if magic != HEADER_MAGIC {
        return Err(SegmentError::Corrupt(format!(
            "unknown header magic: {:#x}",
            magic
        )));
    }
    let version = r.read_u16::<LittleEndian>()?;
    if version != FORMAT_VERSION {
        return Err(SegmentError::Corrupt(format!(
            "unsupported format version {}",
            version
        )));
    }
    let code = r.read_u8()?;
    let algorithm = HashAlgorithm::from_code(code)
        .ok_or_else(|| SegmentError::Corrupt(format!("unknown partitioner code {}", code)))?;

    let keyspace = read_short_str(r)?;
    let table = read_short_str(r)?;
    let mut builder = Schema::builder(keyspace, table);

    let ncols = r.read_u16::<LittleEndian>()? as usize;
    let mut names = Vec::with_capacity(ncols);
    for _ in 0..ncols {
        let name = read_short_str(r)?;
        let type_code = r.read_u8()?;
        let kind = ColumnType::from_code(type_code)
            .ok_or_else(|| SegmentError::Corrupt(format!("unknown column type {}", type_code)))?;
        builder = if r.read_u8()? != 0 {
            builder.nullable_column(name.clone(), kind)
        } else {
            builder.column(name.clone(), kind)
        };
        names.push(name);
    }

    let read_key = |r: &mut R| -> Result<Vec<String>, SegmentError> {
        let n = r.read_u16::<LittleEndian>()? as usize;
        (0..n)
            .map(|_| {
                let idx = r.read_u16::<LittleEndian>()? as usize;
                names
                    .get(idx)
                    .cloned()
                    .ok_or_else(|| SegmentError::Corrupt(format!("key column {} out of range", idx)))
            })
            .collect()
    };
    let partition_key = read_key(r)?;
    let clustering_key = read_key(r)?;

    let schema = builder
        .partition_key(partition_key)
        .clustering_key(clustering_key)
        .build()?;
    Ok((schema, algorithm))
}

/// Appends one nullable value: tag byte (0 = null, else type code) then payload.
pub(crate) fn write_value(buf: &mut Vec<u8>, value: Option<&Value>) -> io::Result<()> {
    match value {
        None => buf.write_u8(0)?,
        Some(v) => {
            buf.write_u8(v.column_type().code())?;
            match v {
                Value::Timestamp(ms) => buf.write_i64::<LittleEndian>(*ms)?,
                Value::Int(n) => buf.write_i32::<LittleEndian>(*n)?,
                Value::Text(s) => {
                    buf.write_u32::<LittleEndian>(s.len() as u32)?;
                    buf.extend_from_slice(s.as_bytes());
                }
            }
        }
    }
    Ok(())
}

pub(crate) fn read_value<R: Read>(r: &mut R) -> Result<Option<Value>, SegmentError> {
    let tag = r.read_u8()?;
    if tag == 0 {
        return Ok(None);
    }
    let kind = ColumnType::from_code(tag)
        .ok_or_else(|| SegmentError::Corrupt(format!("unknown value tag {}", tag)))?;
    let value = match kind {
        ColumnType::Timestamp => Value::Timestamp(r.read_i64::<LittleEndian>()?),
        ColumnType::Int => Value::Int(r.read_i32::<LittleEndian>()?),
        ColumnType::Text => {
            let len = r.read_u32::<LittleEndian>()? as usize;
            if len > MAX_VALUE_BYTES {
                return Err(SegmentError::Corrupt(format!(
                    "text value of {} bytes exceeds maximum {}",
                    len, MAX_VALUE_BYTES
                )));
            }
            let mut buf = vec![0u8; len];
            r.read_exact(&mut buf)?;
            Value::Text(
                String::from_utf8(buf)
                    .map_err(|_| SegmentError::Corrupt("text value is not UTF-8".into()))?,
            )
        }
    };
    Ok(Some(value))
}
