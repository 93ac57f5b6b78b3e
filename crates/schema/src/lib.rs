//! # Schema - Table Descriptor and Typed Rows
//!
//! Immutable definition of the single table a bulk-load run produces files
//! for, plus the typed [`Row`] values that flow through the pipeline.
//!
//! A [`Schema`] is built once at startup (see [`SchemaBuilder`]) and is
//! read-only afterwards. Construction enforces the structural invariants:
//!
//! ```text
//! - at least one column, unique non-empty names
//! - non-empty partition key
//! - every key column exists, appears in at most one key list
//! - key columns are NOT NULL
//! - keyspace / table are plain identifiers (they become directory names)
//! ```
//!
//! Per-row checks (arity, types, non-null keys, size limits) live in
//! [`Schema::validate`]. Mapping raw text fields onto a row is done by
//! [`mapper::Mapper`].
//!
//! ## Example
//!
//! ```rust
//! use schema::{ColumnType, Schema};
//!
//! let schema = Schema::builder("wiki", "views")
//!     .column("datetime", ColumnType::Timestamp)
//!     .column("wiki", ColumnType::Text)
//!     .column("title", ColumnType::Text)
//!     .column("views", ColumnType::Int)
//!     .partition_key(["datetime", "wiki", "title"])
//!     .build()
//!     .unwrap();
//! assert_eq!(schema.columns().len(), 4);
//! ```

pub mod mapper;

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

pub use mapper::{map_record, MalformedRecordError, Mapper};

/// Column types supported by the bulk loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// Milliseconds since the Unix epoch, UTC.
    Timestamp,
    /// UTF-8 text.
    Text,
    /// Signed 32-bit integer.
    Int,
}

impl ColumnType {
    /// Stable on-disk code for this type.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            ColumnType::Timestamp => 1,
            ColumnType::Text => 2,
            ColumnType::Int => 3,
        }
    }

    /// Inverse of [`code`](ColumnType::code).
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(ColumnType::Timestamp),
            2 => Some(ColumnType::Text),
            3 => Some(ColumnType::Int),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Timestamp => "timestamp",
            ColumnType::Text => "text",
            ColumnType::Int => "int",
        };
        f.write_str(name)
    }
}

/// A single typed cell value.
///
/// Values of the same variant order naturally (numeric for timestamps and
/// ints, bytewise for text), which is what clustering-key comparison needs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    Timestamp(i64),
    Text(String),
    Int(i32),
}

impl Value {
    /// Returns the column type this value belongs to.
    #[must_use]
    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::Timestamp(_) => ColumnType::Timestamp,
            Value::Text(_) => ColumnType::Text,
            Value::Int(_) => ColumnType::Int,
        }
    }

    /// Serialized form used for partition keys: big-endian fixed width for
    /// numbers, raw UTF-8 for text.
    #[must_use]
    pub fn to_key_bytes(&self) -> Vec<u8> {
        match self {
            Value::Timestamp(ms) => ms.to_be_bytes().to_vec(),
            Value::Text(s) => s.as_bytes().to_vec(),
            Value::Int(v) => v.to_be_bytes().to_vec(),
        }
    }

    /// Approximate in-memory payload size in bytes.
    #[must_use]
    pub fn approx_size(&self) -> usize {
        match self {
            Value::Timestamp(_) => 8,
            Value::Text(s) => s.len(),
            Value::Int(_) => 4,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Timestamp(ms) => match DateTime::<Utc>::from_timestamp_millis(*ms) {
                Some(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.3fZ")),
                None => write!(f, "{}ms", ms),
            },
            Value::Text(s) => f.write_str(s),
            Value::Int(v) => write!(f, "{}", v),
        }
    }
}

/// A typed row, values stored positionally in schema column order.
///
/// Rows are immutable once built. `None` marks a null in a nullable column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    values: Vec<Option<Value>>,
}

impl Row {
    pub fn new(values: Vec<Option<Value>>) -> Self {
        Self { values }
    }

    /// Convenience constructor for rows without nulls.
    pub fn from_values<I: IntoIterator<Item = Value>>(values: I) -> Self {
        Self {
            values: values.into_iter().map(Some).collect(),
        }
    }

    pub fn values(&self) -> &[Option<Value>] {
        &self.values
    }

    /// Value at column position `idx`, `None` if null or out of range.
    pub fn value(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx).and_then(|v| v.as_ref())
    }

    /// Looks a value up by column name.
    pub fn get<'a>(&'a self, schema: &Schema, name: &str) -> Option<&'a Value> {
        schema.column_index(name).and_then(|idx| self.value(idx))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Approximate payload size, used for segment byte thresholds.
    pub fn approx_size(&self) -> usize {
        self.values
            .iter()
            .map(|v| 1 + v.as_ref().map_or(0, Value::approx_size))
            .sum()
    }
}

/// One column of a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnType,
    pub nullable: bool,
}

/// Errors raised while constructing a [`Schema`]. Always fatal for a run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("schema has no columns")]
    NoColumns,

    #[error("partition key must not be empty")]
    EmptyPartitionKey,

    #[error("invalid {what} name: {name:?}")]
    InvalidIdentifier { what: &'static str, name: String },

    #[error("duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("key column {0} is not declared in columns")]
    UnknownKeyColumn(String),

    #[error("column {0} appears more than once in the primary key")]
    DuplicateKeyColumn(String),

    #[error("key column {0} must not be nullable")]
    NullableKeyColumn(String),

    #[error("timestamp column {0} is missing or not of type timestamp")]
    BadTimestampColumn(String),
}

/// Longest serialized partition key a row may carry.
pub const MAX_PARTITION_KEY_BYTES: usize = u16::MAX as usize;

/// Longest single text value (16 MiB).
pub const MAX_TEXT_BYTES: usize = 16 * 1024 * 1024;

/// Largest row as measured by [`Row::approx_size`] (32 MiB).
pub const MAX_ROW_BYTES: usize = 32 * 1024 * 1024;

/// Reasons a [`Row`] does not conform to a [`Schema`]. Recoverable: the row
/// is dropped and the run continues.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("row has {found} values, schema has {expected} columns")]
    Arity { expected: usize, found: usize },

    #[error("column {column}: expected {expected}, found {found}")]
    TypeMismatch {
        column: String,
        expected: ColumnType,
        found: ColumnType,
    },

    #[error("key column {column} is null")]
    NullKey { column: String },

    #[error("column {column} is not nullable")]
    NullValue { column: String },

    #[error("column {column}: text of {len} bytes exceeds maximum {max}")]
    ValueTooLarge {
        column: String,
        len: usize,
        max: usize,
    },

    #[error("partition key of {len} bytes exceeds maximum {max}")]
    KeyTooLarge { len: usize, max: usize },

    #[error("row of {len} bytes exceeds maximum {max}")]
    RowTooLarge { len: usize, max: usize },
}

/// Immutable table definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    keyspace: String,
    table: String,
    columns: Vec<Column>,
    partition_key: Vec<usize>,
    clustering_key: Vec<usize>,
}

impl Schema {
    /// Starts a [`SchemaBuilder`] for `keyspace.table`.
    pub fn builder(keyspace: impl Into<String>, table: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            keyspace: keyspace.into(),
            table: table.into(),
            columns: Vec::new(),
            partition_key: Vec::new(),
            clustering_key: Vec::new(),
        }
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column positions forming the partition key, in key order.
    pub fn partition_key(&self) -> &[usize] {
        &self.partition_key
    }

    /// Column positions forming the clustering key, in key order.
    pub fn clustering_key(&self) -> &[usize] {
        &self.clustering_key
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn is_key_column(&self, idx: usize) -> bool {
        self.partition_key.contains(&idx) || self.clustering_key.contains(&idx)
    }

    /// Checks that `row` conforms to this schema.
    ///
    /// # Errors
    ///
    /// Returns the first violation found, scanning columns in order.
    pub fn validate(&self, row: &Row) -> Result<(), ValidationError> {
        if row.len() != self.columns.len() {
            return Err(ValidationError::Arity {
                expected: self.columns.len(),
                found: row.len(),
            });
        }

        for (idx, (column, value)) in self.columns.iter().zip(row.values()).enumerate() {
            match value {
                Some(v) if v.column_type() != column.kind => {
                    return Err(ValidationError::TypeMismatch {
                        column: column.name.clone(),
                        expected: column.kind,
                        found: v.column_type(),
                    });
                }
                Some(Value::Text(s)) if s.len() > MAX_TEXT_BYTES => {
                    return Err(ValidationError::ValueTooLarge {
                        column: column.name.clone(),
                        len: s.len(),
                        max: MAX_TEXT_BYTES,
                    });
                }
                Some(_) => {}
                None if self.is_key_column(idx) => {
                    return Err(ValidationError::NullKey {
                        column: column.name.clone(),
                    });
                }
                None if !column.nullable => {
                    return Err(ValidationError::NullValue {
                        column: column.name.clone(),
                    });
                }
                None => {}
            }
        }

        let key_len = self.partition_key_len(row);
        if key_len > MAX_PARTITION_KEY_BYTES {
            return Err(ValidationError::KeyTooLarge {
                len: key_len,
                max: MAX_PARTITION_KEY_BYTES,
            });
        }
        let row_len = row.approx_size();
        if row_len > MAX_ROW_BYTES {
            return Err(ValidationError::RowTooLarge {
                len: row_len,
                max: MAX_ROW_BYTES,
            });
        }
        Ok(())
    }

    /// Length of the serialized partition key of `row`: the raw value for a
    /// single-column key, `[len: u16][bytes][0x00]` per component otherwise.
    pub fn partition_key_len(&self, row: &Row) -> usize {
        // payload size equals the key-bytes length for every type
        let component = |idx: usize| row.value(idx).map_or(0, Value::approx_size);
        match self.partition_key.as_slice() {
            [only] => component(*only),
            key => key.iter().map(|&idx| 2 + component(idx) + 1).sum(),
        }
    }

    /// Clustering-key values of `row`, in declared key order.
    pub fn clustering_values(&self, row: &Row) -> Vec<Value> {
        self.clustering_key
            .iter()
            .filter_map(|&idx| row.value(idx).cloned())
            .collect()
    }
}

impl fmt::Display for Schema {
    /// Renders the schema as a CQL-like `CREATE TABLE` statement.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CREATE TABLE {}.{} (", self.keyspace, self.table)?;
        for c in &self.columns {
            write!(f, "{} {}, ", c.name, c.kind)?;
        }
        let names = |ids: &[usize]| {
            ids.iter()
                .map(|&i| self.columns[i].name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        write!(f, "PRIMARY KEY (({})", names(&self.partition_key))?;
        if !self.clustering_key.is_empty() {
            write!(f, ", {}", names(&self.clustering_key))?;
        }
        f.write_str("))")
    }
}

/// Builder for [`Schema`]. Nothing is checked until [`build`](SchemaBuilder::build).
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    keyspace: String,
    table: String,
    columns: Vec<Column>,
    partition_key: Vec<String>,
    clustering_key: Vec<String>,
}

impl SchemaBuilder {
    /// Adds a NOT NULL column.
    pub fn column(mut self, name: impl Into<String>, kind: ColumnType) -> Self {
        self.columns.push(Column {
            name: name.into(),
            kind,
            nullable: false,
        });
        self
    }

    /// Adds a column that may hold nulls. Key columns must not use this.
    pub fn nullable_column(mut self, name: impl Into<String>, kind: ColumnType) -> Self {
        self.columns.push(Column {
            name: name.into(),
            kind,
            nullable: true,
        });
        self
    }

    pub fn partition_key<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.partition_key = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn clustering_key<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.clustering_key = names.into_iter().map(Into::into).collect();
        self
    }

    /// Validates the definition and produces an immutable [`Schema`].
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] describing the first structural problem.
    pub fn build(self) -> Result<Schema, SchemaError> {
        check_identifier("keyspace", &self.keyspace)?;
        check_identifier("table", &self.table)?;

        if self.columns.is_empty() {
            return Err(SchemaError::NoColumns);
        }

        let mut seen = HashSet::new();
        for c in &self.columns {
            if c.name.is_empty() {
                return Err(SchemaError::InvalidIdentifier {
                    what: "column",
                    name: c.name.clone(),
                });
            }
            if !seen.insert(c.name.as_str()) {
                return Err(SchemaError::DuplicateColumn(c.name.clone()));
            }
        }

        if self.partition_key.is_empty() {
            return Err(SchemaError::EmptyPartitionKey);
        }

        let mut key_seen = HashSet::new();
        let mut resolve = |names: &[String]| -> Result<Vec<usize>, SchemaError> {
            names
                .iter()
                .map(|name| {
                    let idx = self
                        .columns
                        .iter()
                        .position(|c| &c.name == name)
                        .ok_or_else(|| SchemaError::UnknownKeyColumn(name.clone()))?;
                    if !key_seen.insert(idx) {
                        return Err(SchemaError::DuplicateKeyColumn(name.clone()));
                    }
                    if self.columns[idx].nullable {
                        return Err(SchemaError::NullableKeyColumn(name.clone()));
                    }
                    Ok(idx)
                })
                .collect()
        };

        let partition_key = resolve(&self.partition_key)?;
        let clustering_key = resolve(&self.clustering_key)?;

        Ok(Schema {
            keyspace: self.keyspace,
            table: self.table,
            columns: self.columns,
            partition_key,
            clustering_key,
        })
    }
}

fn check_identifier(what: &'static str, name: &str) -> Result<(), SchemaError> {
    let ok = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(SchemaError::InvalidIdentifier {
            what,
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests;
