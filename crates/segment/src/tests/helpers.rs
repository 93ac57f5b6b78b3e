use builder::{Segment, SegmentBuilder, Thresholds};
use partitioner::{HashAlgorithm, Partitioner};
use schema::{ColumnType, Row, Schema, Value};
use std::sync::Arc;

pub fn views_schema() -> Arc<Schema> {
    Arc::new(
        Schema::builder("wiki", "pageviews")
            .column("wiki", ColumnType::Text)
            .column("title", ColumnType::Text)
            .column("datetime", ColumnType::Timestamp)
            .nullable_column("views", ColumnType::Int)
            .partition_key(["wiki", "title"])
            .clustering_key(["datetime"])
            .build()
            .unwrap(),
    )
}

pub fn view_row(wiki: &str, title: &str, ts: i64, views: Option<i32>) -> Row {
    Row::new(vec![
        Some(Value::Text(wiki.into())),
        Some(Value::Text(title.into())),
        Some(Value::Timestamp(ts)),
        views.map(Value::Int),
    ])
}

/// Builds one segment holding every row.
pub fn segment_of(rows: Vec<Row>) -> Segment {
    let mut b = SegmentBuilder::new(
        views_schema(),
        Partitioner::new(HashAlgorithm::Murmur3),
        Thresholds {
            max_rows: usize::MAX,
            max_bytes: usize::MAX,
        },
    );
    for row in rows {
        assert!(b.insert(row).unwrap().is_none());
    }
    b.finish().expect("at least one row")
}

pub fn sample_segment() -> Segment {
    segment_of(vec![
        view_row("enwiki", "Foo_Bar", 1_704_067_200_000, Some(42)),
        view_row("enwiki", "Foo_Bar", 1_704_070_800_000, Some(7)),
        view_row("dewiki", "Hauptseite", 1_704_067_200_000, Some(1000)),
        view_row("frwiki", "Paris", 1_704_067_200_000, None),
        view_row("enwiki", "Main_Page", -86_400_000, Some(-1)),
    ])
}
