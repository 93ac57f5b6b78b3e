use super::helpers::{sample_segment, segment_of, view_row, views_schema};
use crate::*;
use anyhow::Result;
use partitioner::{serialize_partition_key, HashAlgorithm};
use schema::Value;
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use tempfile::tempdir;

fn write_sample(dir: &std::path::Path) -> Result<std::path::PathBuf> {
    let path = dir.join("seg.db");
    SegmentWriter::write(&path, &sample_segment())?;
    Ok(path)
}

#[test]
fn rows_round_trip_in_segment_order() -> Result<()> {
    let dir = tempdir()?;
    let seg = sample_segment();
    let path = dir.path().join("seg.db");
    SegmentWriter::write(&path, &seg)?;

    let reader = SegmentReader::open(&path)?;
    assert_eq!(reader.row_count(), 5);
    assert_eq!(reader.read_all()?, seg.rows().to_vec());
    Ok(())
}

#[test]
fn header_describes_the_table() -> Result<()> {
    let dir = tempdir()?;
    let reader = SegmentReader::open(write_sample(dir.path())?)?;

    assert_eq!(**reader.schema(), *views_schema());
    assert_eq!(reader.partitioner().algorithm(), HashAlgorithm::Murmur3);
    assert_eq!(reader.schema().keyspace(), "wiki");
    assert_eq!(reader.schema().table(), "pageviews");
    Ok(())
}

#[test]
fn nulls_and_negative_values_survive() -> Result<()> {
    let dir = tempdir()?;
    let reader = SegmentReader::open(write_sample(dir.path())?)?;
    let rows = reader.read_all()?;

    let paris = rows
        .iter()
        .map(|(_, r)| r)
        .find(|r| r.value(1) == Some(&Value::Text("Paris".into())))
        .expect("Paris row");
    assert_eq!(paris.value(3), None);

    let main = rows
        .iter()
        .map(|(_, r)| r)
        .find(|r| r.value(1) == Some(&Value::Text("Main_Page".into())))
        .expect("Main_Page row");
    assert_eq!(main.value(2), Some(&Value::Timestamp(-86_400_000)));
    assert_eq!(main.value(3), Some(&Value::Int(-1)));
    Ok(())
}

#[test]
fn rows_are_sorted_by_token_then_clustering() -> Result<()> {
    let dir = tempdir()?;
    let reader = SegmentReader::open(write_sample(dir.path())?)?;
    let rows = reader.read_all()?;

    for pair in rows.windows(2) {
        let (ta, ra) = &pair[0];
        let (tb, rb) = &pair[1];
        assert!(ta <= tb);
        if ta == tb {
            assert!(ra.value(2) <= rb.value(2));
        }
    }
    assert_eq!(rows.first().map(|(t, _)| *t), Some(reader.footer().min_token));
    assert_eq!(rows.last().map(|(t, _)| *t), Some(reader.footer().max_token));
    Ok(())
}

#[test]
fn index_has_one_entry_per_partition_run() -> Result<()> {
    let dir = tempdir()?;
    let reader = SegmentReader::open(write_sample(dir.path())?)?;

    let index = reader.index();
    assert_eq!(index.len(), 4);
    assert!(index.windows(2).all(|w| w[0].token <= w[1].token));
    assert_eq!(index[0].data_offset, reader.footer().data_offset);
    Ok(())
}

#[test]
fn partition_lookup_returns_clustered_rows() -> Result<()> {
    let dir = tempdir()?;
    let reader = SegmentReader::open(write_sample(dir.path())?)?;
    let schema = views_schema();

    let key = serialize_partition_key(&schema, &view_row("enwiki", "Foo_Bar", 0, None));
    assert!(reader.may_contain_partition(&key));

    let rows = reader.partition(&key)?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].value(2), Some(&Value::Timestamp(1_704_067_200_000)));
    assert_eq!(rows[0].value(3), Some(&Value::Int(42)));
    assert_eq!(rows[1].value(2), Some(&Value::Timestamp(1_704_070_800_000)));
    assert_eq!(rows[1].value(3), Some(&Value::Int(7)));
    Ok(())
}

#[test]
fn partition_lookup_of_missing_key_is_empty() -> Result<()> {
    let dir = tempdir()?;
    let reader = SegmentReader::open(write_sample(dir.path())?)?;
    let schema = views_schema();

    let key = serialize_partition_key(&schema, &view_row("jawiki", "Nowhere", 0, None));
    assert!(reader.partition(&key)?.is_empty());
    Ok(())
}

#[test]
fn every_written_partition_passes_the_bloom_filter() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("seg.db");
    let rows: Vec<_> = (0..500)
        .map(|i| view_row("enwiki", &format!("Title_{}", i), i, Some(i as i32)))
        .collect();
    SegmentWriter::write(&path, &segment_of(rows.clone()))?;

    let reader = SegmentReader::open(&path)?;
    let schema = views_schema();
    for row in &rows {
        assert!(reader.may_contain_partition(&serialize_partition_key(&schema, row)));
    }
    Ok(())
}

#[test]
fn flipped_data_byte_fails_crc() -> Result<()> {
    let dir = tempdir()?;
    let path = write_sample(dir.path())?;
    let data_offset = SegmentReader::open(&path)?.footer().data_offset;

    // last byte of the first record's token
    let mut f = OpenOptions::new().write(true).read(true).open(&path)?;
    let mut byte = [0u8; 1];
    f.seek(SeekFrom::Start(data_offset + 8 + 7))?;
    f.read_exact(&mut byte)?;
    f.seek(SeekFrom::Start(data_offset + 8 + 7))?;
    f.write_all(&[byte[0] ^ 0xFF])?;
    drop(f);

    let reader = SegmentReader::open(&path)?;
    let err = reader.read_all().unwrap_err();
    assert!(matches!(err, SegmentError::Corrupt(ref m) if m.contains("CRC32")));
    Ok(())
}

#[test]
fn truncated_file_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let path = write_sample(dir.path())?;
    let len = fs::metadata(&path)?.len();

    let f = OpenOptions::new().write(true).open(&path)?;
    f.set_len(len - 10)?;
    drop(f);

    let err = SegmentReader::open(&path).unwrap_err();
    assert!(matches!(err, SegmentError::Corrupt(_)));
    Ok(())
}

#[test]
fn tiny_file_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("tiny.db");
    fs::write(&path, b"BLK")?;

    let err = SegmentReader::open(&path).unwrap_err();
    assert!(err.to_string().contains("too small"));
    Ok(())
}

#[test]
fn fnv_segments_record_their_partitioner() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("fnv.db");

    let mut b = builder::SegmentBuilder::new(
        views_schema(),
        partitioner::Partitioner::new(HashAlgorithm::Fnv1a),
        builder::Thresholds::default(),
    );
    b.insert(view_row("enwiki", "Foo_Bar", 0, Some(1)))?;
    SegmentWriter::write(&path, &b.finish().expect("one row"))?;

    let reader = SegmentReader::open(&path)?;
    assert_eq!(reader.partitioner().algorithm(), HashAlgorithm::Fnv1a);
    let key = serialize_partition_key(reader.schema(), &view_row("enwiki", "Foo_Bar", 0, None));
    assert_eq!(reader.partition(&key)?.len(), 1);
    Ok(())
}

#[test]
fn longest_accepted_key_round_trips() -> Result<()> {
    let dir = tempdir()?;
    // 9 bytes for "enwiki", 3 bytes framing the title
    let title = "T".repeat(schema::MAX_PARTITION_KEY_BYTES - 12);
    let row = view_row("enwiki", &title, 0, Some(1));
    let key = serialize_partition_key(&views_schema(), &row);
    assert_eq!(key.len(), schema::MAX_PARTITION_KEY_BYTES);

    let path = dir.path().join("seg.db");
    SegmentWriter::write(&path, &segment_of(vec![row.clone()]))?;

    let reader = SegmentReader::open(&path)?;
    assert_eq!(reader.index()[0].key, key);
    assert_eq!(reader.partition(&key)?, vec![row]);
    Ok(())
}

#[test]
fn oversized_key_never_reaches_a_segment() -> Result<()> {
    let dir = tempdir()?;
    let mut builder = builder::SegmentBuilder::new(
        views_schema(),
        partitioner::Partitioner::new(HashAlgorithm::Murmur3),
        builder::Thresholds {
            max_rows: usize::MAX,
            max_bytes: usize::MAX,
        },
    );
    let long = view_row("enwiki", &"T".repeat(70_000), 0, Some(1));
    assert!(matches!(
        builder.insert(long),
        Err(schema::ValidationError::KeyTooLarge { .. })
    ));
    builder.insert(view_row("enwiki", "Foo", 0, Some(2)))?;

    let path = dir.path().join("seg.db");
    let segment = builder.finish().expect("one row buffered");
    SegmentWriter::write(&path, &segment)?;
    assert_eq!(SegmentReader::open(&path)?.read_all()?.len(), 1);
    Ok(())
}
