//! Decoded result rows and the default row scanner.

use crate::error::{DbError, DbResult};
use crate::models::value::{FromValue, Value};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// One result row: column names shared across the result set plus this row's values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    /// Create a row. `values` must line up with `columns`.
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Build a row from (column, value) pairs. Mostly useful for tests and mocks.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        let (columns, values): (Vec<String>, Vec<Value>) =
            pairs.into_iter().map(|(c, v)| (c.into(), v)).unzip();
        Self::new(columns.into(), values)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Look up a column's raw value by name.
    pub fn value(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    /// Decode a column into a field type.
    ///
    /// A column absent from the result set decodes as NULL, so `Option` fields
    /// tolerate partial field selection while required fields report it.
    pub fn get<T: FromValue>(&self, column: &str) -> DbResult<T> {
        let value = self.value(column).unwrap_or(&Value::Null);
        T::from_value(value).map_err(|message| {
            if self.value(column).is_none() {
                DbError::decode(column, format!("column not in result set ({})", message))
            } else {
                DbError::decode(column, message)
            }
        })
    }

    /// Convert the row into a JSON object keyed by column name.
    pub fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
        self.columns
            .iter()
            .zip(&self.values)
            .map(|(column, value)| {
                let json = serde_json::to_value(value).unwrap_or(JsonValue::Null);
                (column.clone(), json)
            })
            .collect()
    }
}

/// Types that can be populated from one result row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> DbResult<Self>;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> DbResult<Self> {
        Ok(row.clone())
    }
}

/// Default row scanner: decode every row into `T`, preserving result-set order.
pub fn scan_rows<T: FromRow>(rows: Vec<Row>) -> DbResult<Vec<T>> {
    rows.iter().map(T::from_row).collect()
}

/// Implement [`FromRow`] for a plain struct by naming the column of each field.
///
/// ```ignore
/// impl_from_row!(Student {
///     id => "id",
///     name => "name",
///     status => "status",
/// });
/// ```
#[macro_export]
macro_rules! impl_from_row {
    ($ty:ident { $($field:ident => $column:literal),+ $(,)? }) => {
        impl $crate::models::FromRow for $ty {
            fn from_row(row: &$crate::models::Row) -> $crate::error::DbResult<Self> {
                Ok(Self {
                    $( $field: row.get($column)?, )+
                })
            }
        }
    };
}
