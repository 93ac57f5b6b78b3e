use builder::Thresholds;
use schema::{ColumnType, Row, Schema, Value};
use std::fs;
use std::path::Path;
use std::sync::Arc;

pub fn views_schema() -> Arc<Schema> {
    Arc::new(
        Schema::builder("wiki", "views")
            .column("datetime", ColumnType::Timestamp)
            .column("wiki", ColumnType::Text)
            .column("title", ColumnType::Text)
            .column("views", ColumnType::Int)
            .partition_key(["datetime", "wiki", "title"])
            .build()
            .unwrap(),
    )
}

pub fn row(i: i32) -> Row {
    Row::from_values([
        Value::Timestamp(1_704_067_200_000),
        Value::Text("enwiki".into()),
        Value::Text(format!("Title_{}", i)),
        Value::Int(i),
    ])
}

pub fn rows_per_segment(n: usize) -> Thresholds {
    Thresholds {
        max_rows: n,
        max_bytes: usize::MAX,
    }
}

pub fn count_segment_files(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .map(|ext| ext == "db")
                .unwrap_or(false)
        })
        .count()
}
