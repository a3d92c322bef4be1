// Persisted row contract: a flat column-name -> scalar mapping per indicator kind.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const TIME_BUCKET: &str = "time_bucket";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Long,
}

impl ColumnType {
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Int | ColumnType::Long => "INTEGER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub column_type: ColumnType,
}

impl Column {
    pub const fn new(name: &'static str, column_type: ColumnType) -> Self {
        Self { name, column_type }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnValue {
    Int(i32),
    Long(i64),
    Text(String),
}

pub type Row = BTreeMap<String, ColumnValue>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("column {0} missing from row")]
    MissingColumn(&'static str),
    #[error("column {column} holds {found}, expected a number")]
    NotNumeric {
        column: &'static str,
        found: String,
    },
    #[error("column {column} value {value} out of range")]
    OutOfRange { column: &'static str, value: i64 },
    #[error(transparent)]
    Indicator(#[from] super::IndicatorError),
}

/// Maps an indicator to and from its persisted row. `to_row` followed by `from_row`
/// must reproduce every persisted field.
pub trait StorageBuilder: Sized {
    /// Base table name; one table exists per granularity.
    const INDEX_NAME: &'static str;
    /// Persisted columns, `time_bucket` included, `id` excluded.
    const COLUMNS: &'static [Column];

    fn to_row(&self) -> Row;

    fn from_row(row: &Row) -> Result<Self, StorageError>;
}

/// Reads any numeric column as i64; storage engines may widen or narrow integers.
pub fn row_long(row: &Row, column: &'static str) -> Result<i64, StorageError> {
    match row.get(column) {
        Some(ColumnValue::Int(v)) => Ok(i64::from(*v)),
        Some(ColumnValue::Long(v)) => Ok(*v),
        Some(ColumnValue::Text(s)) => Err(StorageError::NotNumeric {
            column,
            found: s.clone(),
        }),
        None => Err(StorageError::MissingColumn(column)),
    }
}

pub fn row_int(row: &Row, column: &'static str) -> Result<i32, StorageError> {
    let value = row_long(row, column)?;
    i32::try_from(value).map_err(|_| StorageError::OutOfRange { column, value })
}
