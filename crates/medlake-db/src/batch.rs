//! Column-typed record batches built from loosely shaped JSON records.
//!
//! The batch schema is the union of keys seen across all records, in order of
//! first appearance (keys within one record iterate sorted). Each column's SQL
//! type is inferred from its non-null values; records missing a key contribute
//! NULL for that column. Only columns named by the caller may become
//! TIMESTAMPTZ; any other string column is TEXT whatever its content.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Postgres identifiers longer than this are silently truncated by the server,
/// which could merge distinct keys into one column.
const MAX_IDENTIFIER_BYTES: usize = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    BigInt,
    Double,
    Boolean,
    Timestamptz,
    Text,
}

impl ColumnType {
    #[must_use]
    pub fn sql(self) -> &'static str {
        match self {
            Self::BigInt => "BIGINT",
            Self::Double => "DOUBLE PRECISION",
            Self::Boolean => "BOOLEAN",
            Self::Timestamptz => "TIMESTAMPTZ",
            Self::Text => "TEXT",
        }
    }

    /// The narrowest type that can hold `value`, or `None` for JSON null.
    /// RFC 3339 strings are timestamps only when `timestamps` is set.
    fn of(value: &Value, timestamps: bool) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(Self::Boolean),
            Value::Number(n) if n.is_i64() => Some(Self::BigInt),
            Value::Number(_) => Some(Self::Double),
            Value::String(s) if timestamps && DateTime::parse_from_rfc3339(s).is_ok() => {
                Some(Self::Timestamptz)
            }
            Value::String(_) | Value::Array(_) | Value::Object(_) => Some(Self::Text),
        }
    }

    fn widen(self, other: Self) -> Self {
        match (self, other) {
            (a, b) if a == b => a,
            (Self::BigInt, Self::Double) | (Self::Double, Self::BigInt) => Self::Double,
            _ => Self::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

/// A typed, nullable value ready to be bound as a query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    BigInt(Option<i64>),
    Double(Option<f64>),
    Boolean(Option<bool>),
    Timestamptz(Option<DateTime<Utc>>),
    Text(Option<String>),
}

impl Cell {
    /// Convert `value` into a cell of `column_type`. Inference guarantees the
    /// value fits; anything that does not becomes NULL.
    fn convert(column_type: ColumnType, value: Option<&Value>) -> Self {
        let value = value.filter(|v| !v.is_null());
        match column_type {
            ColumnType::BigInt => Self::BigInt(value.and_then(Value::as_i64)),
            ColumnType::Double => Self::Double(value.and_then(Value::as_f64)),
            ColumnType::Boolean => Self::Boolean(value.and_then(Value::as_bool)),
            ColumnType::Timestamptz => Self::Timestamptz(
                value
                    .and_then(Value::as_str)
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc)),
            ),
            ColumnType::Text => Self::Text(value.map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordBatch {
    columns: Vec<Column>,
    rows: Vec<Vec<Cell>>,
}

impl RecordBatch {
    /// Build a batch whose schema is the union of keys across `records`.
    ///
    /// Keys that are empty or longer than 63 bytes cannot be column names and
    /// are dropped with a warning. A column whose values are all null is TEXT.
    /// Only the keys in `timestamp_columns` are typed TIMESTAMPTZ when every
    /// value parses as RFC 3339.
    #[must_use]
    pub fn from_records(records: &[Map<String, Value>], timestamp_columns: &[&str]) -> Self {
        let mut columns: Vec<(String, Option<ColumnType>)> = Vec::new();
        let mut dropped: HashSet<String> = HashSet::new();

        for record in records {
            for (key, value) in record {
                let observed = ColumnType::of(value, timestamp_columns.contains(&key.as_str()));
                if let Some((_, slot)) = columns.iter_mut().find(|(name, _)| name == key) {
                    *slot = match (*slot, observed) {
                        (Some(a), Some(b)) => Some(a.widen(b)),
                        (a, b) => a.or(b),
                    };
                } else if usable_column_name(key) {
                    columns.push((key.clone(), observed));
                } else if dropped.insert(key.clone()) {
                    tracing::warn!(key = %key, "dropping field that cannot be a column name");
                }
            }
        }

        let columns: Vec<Column> = columns
            .into_iter()
            .map(|(name, ty)| Column {
                name,
                column_type: ty.unwrap_or(ColumnType::Text),
            })
            .collect();

        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|c| Cell::convert(c.column_type, record.get(&c.name)))
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    /// Build a batch from an explicit schema and already-typed rows.
    ///
    /// Rows shorter than the schema are padded with NULLs of the column type;
    /// extra cells are ignored.
    #[must_use]
    pub fn from_rows(columns: Vec<Column>, rows: Vec<Vec<Cell>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.truncate(width);
                for column in &columns[row.len()..] {
                    row.push(Cell::convert(column.column_type, None));
                }
                row
            })
            .collect();
        Self { columns, rows }
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn usable_column_name(key: &str) -> bool {
    !key.is_empty() && key.len() <= MAX_IDENTIFIER_BYTES && !key.contains('\0')
}

#[cfg(test)]
#[path = "batch_test.rs"]
mod tests;
