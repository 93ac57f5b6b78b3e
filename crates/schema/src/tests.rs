use super::*;
use anyhow::Result;

fn wiki_views() -> Schema {
    Schema::builder("wiki", "views")
        .column("datetime", ColumnType::Timestamp)
        .column("wiki", ColumnType::Text)
        .column("title", ColumnType::Text)
        .column("views", ColumnType::Int)
        .partition_key(["datetime", "wiki", "title"])
        .build()
        .unwrap()
}

// 2024-01-01T00:00:00Z
const JAN_1_2024: i64 = 1_704_067_200_000;

// -------------------- Construction --------------------

#[test]
fn builds_valid_schema() {
    let s = wiki_views();
    assert_eq!(s.keyspace(), "wiki");
    assert_eq!(s.table(), "views");
    assert_eq!(s.partition_key(), &[0, 1, 2]);
    assert!(s.clustering_key().is_empty());
    assert_eq!(s.column_index("views"), Some(3));
}

#[test]
fn empty_partition_key_is_rejected() {
    let err = Schema::builder("ks", "t")
        .column("a", ColumnType::Int)
        .build()
        .unwrap_err();
    assert_eq!(err, SchemaError::EmptyPartitionKey);
}

#[test]
fn unknown_key_column_is_rejected() {
    let err = Schema::builder("ks", "t")
        .column("a", ColumnType::Int)
        .partition_key(["a"])
        .clustering_key(["missing"])
        .build()
        .unwrap_err();
    assert_eq!(err, SchemaError::UnknownKeyColumn("missing".into()));
}

#[test]
fn duplicate_column_is_rejected() {
    let err = Schema::builder("ks", "t")
        .column("a", ColumnType::Int)
        .column("a", ColumnType::Text)
        .partition_key(["a"])
        .build()
        .unwrap_err();
    assert_eq!(err, SchemaError::DuplicateColumn("a".into()));
}

#[test]
fn column_in_both_keys_is_rejected() {
    let err = Schema::builder("ks", "t")
        .column("a", ColumnType::Int)
        .partition_key(["a"])
        .clustering_key(["a"])
        .build()
        .unwrap_err();
    assert_eq!(err, SchemaError::DuplicateKeyColumn("a".into()));
}

#[test]
fn nullable_key_column_is_rejected() {
    let err = Schema::builder("ks", "t")
        .nullable_column("a", ColumnType::Int)
        .partition_key(["a"])
        .build()
        .unwrap_err();
    assert_eq!(err, SchemaError::NullableKeyColumn("a".into()));
}

#[test]
fn path_like_table_name_is_rejected() {
    let err = Schema::builder("ks", "../etc")
        .column("a", ColumnType::Int)
        .partition_key(["a"])
        .build()
        .unwrap_err();
    assert!(matches!(err, SchemaError::InvalidIdentifier { what: "table", .. }));
}

#[test]
fn display_renders_create_table() {
    let text = wiki_views().to_string();
    assert_eq!(
        text,
        "CREATE TABLE wiki.views (datetime timestamp, wiki text, title text, views int, \
         PRIMARY KEY ((datetime, wiki, title)))"
    );
}

// -------------------- Row validation --------------------

#[test]
fn validate_accepts_conforming_row() {
    let s = wiki_views();
    let row = Row::from_values([
        Value::Timestamp(JAN_1_2024),
        Value::Text("enwiki".into()),
        Value::Text("Foo".into()),
        Value::Int(1),
    ]);
    assert_eq!(s.validate(&row), Ok(()));
}

#[test]
fn validate_reports_type_mismatch() {
    let s = wiki_views();
    let row = Row::from_values([
        Value::Timestamp(JAN_1_2024),
        Value::Text("enwiki".into()),
        Value::Text("Foo".into()),
        Value::Text("many".into()),
    ]);
    assert!(matches!(
        s.validate(&row),
        Err(ValidationError::TypeMismatch { ref column, .. }) if column == "views"
    ));
}

#[test]
fn validate_reports_null_key_and_arity() {
    let s = wiki_views();
    let row = Row::new(vec![
        Some(Value::Timestamp(JAN_1_2024)),
        None,
        Some(Value::Text("Foo".into())),
        Some(Value::Int(1)),
    ]);
    assert_eq!(
        s.validate(&row),
        Err(ValidationError::NullKey {
            column: "wiki".into()
        })
    );

    let short = Row::from_values([Value::Timestamp(JAN_1_2024)]);
    assert_eq!(
        s.validate(&short),
        Err(ValidationError::Arity {
            expected: 4,
            found: 1
        })
    );
}

fn view_row(title: &str) -> Row {
    Row::from_values([
        Value::Timestamp(JAN_1_2024),
        Value::Text("enwiki".into()),
        Value::Text(title.into()),
        Value::Int(1),
    ])
}

#[test]
fn validate_rejects_partition_key_over_u16() {
    let s = wiki_views();
    // 11 + 9 bytes for datetime and wiki, 3 bytes framing the title
    let row = view_row(&"T".repeat(70_000));
    assert_eq!(s.partition_key_len(&row), 11 + 9 + 70_003);
    assert_eq!(
        s.validate(&row),
        Err(ValidationError::KeyTooLarge {
            len: 70_023,
            max: MAX_PARTITION_KEY_BYTES
        })
    );
}

#[test]
fn validate_accepts_partition_key_at_limit() {
    let s = wiki_views();
    let title = "T".repeat(MAX_PARTITION_KEY_BYTES - 23);
    let row = view_row(&title);
    assert_eq!(s.partition_key_len(&row), MAX_PARTITION_KEY_BYTES);
    assert_eq!(s.validate(&row), Ok(()));

    let over = view_row(&format!("{}x", title));
    assert!(matches!(
        s.validate(&over),
        Err(ValidationError::KeyTooLarge { .. })
    ));
}

#[test]
fn validate_rejects_oversized_text_value() {
    let s = Schema::builder("ks", "docs")
        .column("id", ColumnType::Int)
        .nullable_column("body", ColumnType::Text)
        .partition_key(["id"])
        .build()
        .unwrap();
    let row = Row::from_values([Value::Int(1), Value::Text("x".repeat(MAX_TEXT_BYTES + 1))]);
    assert_eq!(
        s.validate(&row),
        Err(ValidationError::ValueTooLarge {
            column: "body".into(),
            len: MAX_TEXT_BYTES + 1,
            max: MAX_TEXT_BYTES
        })
    );

    let fits = Row::from_values([Value::Int(1), Value::Text("x".repeat(MAX_TEXT_BYTES))]);
    assert_eq!(s.validate(&fits), Ok(()));
}

#[test]
fn validate_rejects_oversized_row() {
    let s = Schema::builder("ks", "docs")
        .column("id", ColumnType::Int)
        .nullable_column("a", ColumnType::Text)
        .nullable_column("b", ColumnType::Text)
        .nullable_column("c", ColumnType::Text)
        .partition_key(["id"])
        .build()
        .unwrap();
    let big = || Value::Text("x".repeat(MAX_TEXT_BYTES - 1));
    let row = Row::from_values([Value::Int(1), big(), big(), big()]);
    assert!(matches!(
        s.validate(&row),
        Err(ValidationError::RowTooLarge { max: MAX_ROW_BYTES, .. })
    ));
}

// -------------------- Mapping --------------------

#[test]
fn maps_wiki_views_line() -> Result<()> {
    let s = wiki_views();
    let fields: Vec<&str> = "enwiki Foo_Bar 42".split_whitespace().collect();
    let row = map_record(&s, JAN_1_2024, &fields)?;

    assert_eq!(row.get(&s, "datetime"), Some(&Value::Timestamp(JAN_1_2024)));
    assert_eq!(row.get(&s, "wiki"), Some(&Value::Text("enwiki".into())));
    assert_eq!(row.get(&s, "title"), Some(&Value::Text("Foo_Bar".into())));
    assert_eq!(row.get(&s, "views"), Some(&Value::Int(42)));
    assert_eq!(
        row.get(&s, "datetime").unwrap().to_string(),
        "2024-01-01T00:00:00.000Z"
    );
    s.validate(&row)?;
    Ok(())
}

#[test]
fn arity_mismatch_is_never_padded_or_truncated() {
    let s = wiki_views();
    assert_eq!(
        map_record(&s, 0, &["enwiki", "Foo"]),
        Err(MalformedRecordError::Arity {
            expected: 3,
            found: 2
        })
    );
    assert_eq!(
        map_record(&s, 0, &["enwiki", "Foo", "1", "2048"]),
        Err(MalformedRecordError::Arity {
            expected: 3,
            found: 4
        })
    );
}

#[test]
fn non_numeric_int_names_the_field() {
    let s = wiki_views();
    let err = map_record(&s, 0, &["enwiki", "Foo", "lots"]).unwrap_err();
    assert_eq!(
        err,
        MalformedRecordError::InvalidInt {
            field: 2,
            column: "views".into(),
            value: "lots".into()
        }
    );
    assert!(err.to_string().contains("views"));
}

#[test]
fn int_overflow_is_rejected() {
    let s = wiki_views();
    let err = map_record(&s, 0, &["enwiki", "Foo", "4294967296"]).unwrap_err();
    assert!(matches!(err, MalformedRecordError::InvalidInt { .. }));
}

#[test]
fn empty_required_field_is_rejected() {
    let s = wiki_views();
    assert_eq!(
        map_record(&s, 0, &["", "Foo", "1"]),
        Err(MalformedRecordError::EmptyField {
            field: 0,
            column: "wiki".into()
        })
    );
}

#[test]
fn empty_nullable_field_maps_to_null() -> Result<()> {
    let s = Schema::builder("ks", "t")
        .column("ts", ColumnType::Timestamp)
        .column("id", ColumnType::Text)
        .nullable_column("note", ColumnType::Text)
        .partition_key(["id"])
        .build()?;
    let row = map_record(&s, 5, &["k", ""])?;
    assert_eq!(row.values()[2], None);
    s.validate(&row)?;
    Ok(())
}

#[test]
fn explicit_timestamp_column_and_body_timestamps() -> Result<()> {
    let s = Schema::builder("ks", "events")
        .column("seen", ColumnType::Timestamp)
        .column("loaded", ColumnType::Timestamp)
        .column("id", ColumnType::Int)
        .partition_key(["id"])
        .clustering_key(["seen"])
        .build()?;

    let mapper = Mapper::with_timestamp_column(&s, "loaded")?;
    assert_eq!(mapper.expected_fields(), 2);
    let row = mapper.map(99, &["17", "3"])?;
    assert_eq!(row.value(0), Some(&Value::Timestamp(17)));
    assert_eq!(row.value(1), Some(&Value::Timestamp(99)));

    let err = mapper.map(99, &["yesterday", "3"]).unwrap_err();
    assert!(matches!(err, MalformedRecordError::InvalidTimestamp { field: 0, .. }));

    assert_eq!(
        Mapper::with_timestamp_column(&s, "id").unwrap_err(),
        SchemaError::BadTimestampColumn("id".into())
    );
    Ok(())
}
