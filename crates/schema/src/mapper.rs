//! Record validator/mapper: raw field strings + out-of-band timestamp -> [`Row`].
//!
//! Mapping is positional. The timestamp column is filled from the value the
//! caller derives from the source file name; every other column consumes the
//! next raw field in declared column order. The number of fields must match
//! exactly, nothing is padded or truncated.

use thiserror::Error;

use crate::{ColumnType, Row, Schema, SchemaError, Value};

/// Why a raw record could not be turned into a [`Row`].
///
/// `field` is the 0-based position in the raw record.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MalformedRecordError {
    #[error("expected {expected} fields, found {found}")]
    Arity { expected: usize, found: usize },

    #[error("field {field} ({column}) is empty")]
    EmptyField { field: usize, column: String },

    #[error("field {field} ({column}): {value:?} is not a 32-bit integer")]
    InvalidInt {
        field: usize,
        column: String,
        value: String,
    },

    #[error("field {field} ({column}): {value:?} is not an epoch-millisecond timestamp")]
    InvalidTimestamp {
        field: usize,
        column: String,
        value: String,
    },
}

/// Maps raw records onto rows of one [`Schema`].
#[derive(Debug, Clone, Copy)]
pub struct Mapper<'a> {
    schema: &'a Schema,
    timestamp_column: Option<usize>,
}

impl<'a> Mapper<'a> {
    /// Uses the first `timestamp` column as the out-of-band timestamp slot.
    /// If the schema has none, every column is read from the record body.
    pub fn new(schema: &'a Schema) -> Self {
        let timestamp_column = schema
            .columns()
            .iter()
            .position(|c| c.kind == ColumnType::Timestamp);
        Self {
            schema,
            timestamp_column,
        }
    }

    /// Uses the named column as the out-of-band timestamp slot.
    ///
    /// # Errors
    ///
    /// [`SchemaError::BadTimestampColumn`] if the column does not exist or is
    /// not of type `timestamp`.
    pub fn with_timestamp_column(schema: &'a Schema, name: &str) -> Result<Self, SchemaError> {
        match schema.column_index(name) {
            Some(idx) if schema.columns()[idx].kind == ColumnType::Timestamp => Ok(Self {
                schema,
                timestamp_column: Some(idx),
            }),
            _ => Err(SchemaError::BadTimestampColumn(name.to_string())),
        }
    }

    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    /// Number of raw fields a record must carry.
    #[must_use]
    pub fn expected_fields(&self) -> usize {
        self.schema.columns().len() - usize::from(self.timestamp_column.is_some())
    }

    /// Converts one raw record into a [`Row`].
    ///
    /// # Errors
    ///
    /// See [`MalformedRecordError`].
    pub fn map<S: AsRef<str>>(
        &self,
        timestamp: i64,
        fields: &[S],
    ) -> Result<Row, MalformedRecordError> {
        let expected = self.expected_fields();
        if fields.len() != expected {
            return Err(MalformedRecordError::Arity {
                expected,
                found: fields.len(),
            });
        }

        let mut raw = fields.iter().map(AsRef::as_ref).enumerate();
        let mut values = Vec::with_capacity(self.schema.columns().len());

        for (idx, column) in self.schema.columns().iter().enumerate() {
            if Some(idx) == self.timestamp_column {
                values.push(Some(Value::Timestamp(timestamp)));
                continue;
            }
            // arity was checked above
            let Some((field, text)) = raw.next() else {
                return Err(MalformedRecordError::Arity {
                    expected,
                    found: fields.len(),
                });
            };

            if text.is_empty() {
                if column.nullable {
                    values.push(None);
                    continue;
                }
                return Err(MalformedRecordError::EmptyField {
                    field,
                    column: column.name.clone(),
                });
            }

            let value = match column.kind {
                ColumnType::Text => Value::Text(text.to_string()),
                ColumnType::Int => text.parse::<i32>().map(Value::Int).map_err(|_| {
                    MalformedRecordError::InvalidInt {
                        field,
                        column: column.name.clone(),
                        value: text.to_string(),
                    }
                })?,
                ColumnType::Timestamp => {
                    text.parse::<i64>().map(Value::Timestamp).map_err(|_| {
                        MalformedRecordError::InvalidTimestamp {
                            field,
                            column: column.name.clone(),
                            value: text.to_string(),
                        }
                    })?
                }
            };
            values.push(Some(value));
        }

        Ok(Row::new(values))
    }
}

/// One-shot form of [`Mapper::map`] using the schema's default timestamp column.
///
/// # Errors
///
/// See [`MalformedRecordError`].
pub fn map_record<S: AsRef<str>>(
    schema: &Schema,
    timestamp: i64,
    fields: &[S],
) -> Result<Row, MalformedRecordError> {
    Mapper::new(schema).map(timestamp, fields)
}
