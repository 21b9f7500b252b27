//! Result decoding for the sqlx driver.
//!
//! # Architecture
//!
//! Decoding uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Backend-specific decoders extract a [`Value`] for that category
//!
//! Decoding never fails: a value that cannot be read as its category's type
//! becomes NULL and is logged.

use crate::models::{Row, Value};
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row as _, Type, TypeInfo};
use std::sync::Arc;

/// Backend a column type name comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    MySql,
    SQLite,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::MySql => write!(f, "mysql"),
            Backend::SQLite => write!(f, "sqlite"),
        }
    }
}

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    DateTime,
    Text,
    Binary,
    Null,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, backend: Backend) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if backend == Backend::SQLite {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("int") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "datetime" || lower == "timestamp" {
        return TypeCategory::DateTime;
    }

    if lower.contains("blob") || lower.contains("binary") {
        return TypeCategory::Binary;
    }

    if lower == "null" {
        return TypeCategory::Null;
    }

    if lower.contains("char") || lower.contains("text") || lower == "json" || lower == "enum" {
        return TypeCategory::Text;
    }

    // date, time, year, set, bit and anything else
    TypeCategory::Unknown
}

/// Wrapper type for raw DECIMAL values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

fn column_names<R: sqlx::Row>(row: &R) -> Arc<[String]> {
    row.columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect::<Vec<_>>()
        .into()
}

/// Convert MySQL rows, sharing one column list across the result set.
pub fn mysql_rows(rows: &[MySqlRow]) -> Vec<Row> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    let columns = column_names(first);
    rows.iter()
        .map(|row| {
            let values = row
                .columns()
                .iter()
                .enumerate()
                .map(|(idx, col)| {
                    let type_name = col.type_info().name();
                    mysql::decode_column(row, idx, categorize_type(type_name, Backend::MySql))
                })
                .collect();
            Row::new(Arc::clone(&columns), values)
        })
        .collect()
}

/// Convert SQLite rows, sharing one column list across the result set.
pub fn sqlite_rows(rows: &[SqliteRow]) -> Vec<Row> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    let columns = column_names(first);
    rows.iter()
        .map(|row| {
            let values = row
                .columns()
                .iter()
                .enumerate()
                .map(|(idx, col)| {
                    let type_name = col.type_info().name();
                    sqlite::decode_column(row, idx, categorize_type(type_name, Backend::SQLite))
                })
                .collect();
            Row::new(Arc::clone(&columns), values)
        })
        .collect()
}

mod mysql {
    use super::*;
    use sqlx::Row as _;

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> Value {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::DateTime => decode_datetime(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            // NULL-typed columns fall through to the text decoder
            _ => decode_text(row, idx),
        }
    }

    fn decode_decimal(row: &MySqlRow, idx: usize) -> Value {
        match row.try_get::<Option<RawDecimal>, _>(idx) {
            Ok(Some(v)) => Value::String(v.0),
            Ok(None) => Value::Null,
            Err(e) => {
                tracing::error!("Failed to decode DECIMAL: {:?}", e);
                Value::Null
            }
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> Value {
        // Check NULL first
        if let Ok(None) = row.try_get::<Option<i64>, _>(idx) {
            return Value::Null;
        }
        if let Ok(Some(v)) = row.try_get::<Option<i8>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return Value::Int(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<u8>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u16>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u32>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(idx) {
            // Beyond i64 range keep the exact digits
            return i64::try_from(v)
                .map(Value::Int)
                .unwrap_or_else(|_| Value::String(v.to_string()));
        }
        Value::Null
    }

    fn decode_boolean(row: &MySqlRow, idx: usize) -> Value {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null)
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> Value {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return Value::Float(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return Value::Float(v.into());
        }
        Value::Null
    }

    fn decode_datetime(row: &MySqlRow, idx: usize) -> Value {
        match row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
            Ok(Some(v)) => Value::DateTime(v),
            Ok(None) => Value::Null,
            Err(_) => decode_text(row, idx),
        }
    }

    fn decode_binary(row: &MySqlRow, idx: usize) -> Value {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null)
    }

    fn decode_text(row: &MySqlRow, idx: usize) -> Value {
        if let Ok(Some(v)) = row.try_get::<Option<String>, _>(idx) {
            return Value::String(v);
        }
        // DATE, TIME and friends are not String-compatible in sqlx
        if let Ok(Some(v)) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
            return Value::String(v.to_string());
        }
        if let Ok(Some(v)) = row.try_get::<Option<chrono::NaiveTime>, _>(idx) {
            return Value::String(v.to_string());
        }
        row.try_get_unchecked::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(|bytes| match String::from_utf8(bytes) {
                Ok(s) => Value::String(s),
                Err(e) => Value::Bytes(e.into_bytes()),
            })
            .unwrap_or(Value::Null)
    }
}

mod sqlite {
    use super::*;
    use sqlx::{Row as _, ValueRef};

    pub fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> Value {
        match category {
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float | TypeCategory::Decimal => decode_float(row, idx),
            TypeCategory::DateTime => decode_datetime(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Text => decode_text(row, idx),
            // Expression columns (COUNT(*), 1+1, ...) have no declared type
            TypeCategory::Null | TypeCategory::Unknown => decode_dynamic(row, idx),
        }
    }

    fn decode_integer(row: &SqliteRow, idx: usize) -> Value {
        match row.try_get::<Option<i64>, _>(idx) {
            Ok(Some(v)) => Value::Int(v),
            Ok(None) => Value::Null,
            Err(_) => decode_dynamic(row, idx),
        }
    }

    fn decode_boolean(row: &SqliteRow, idx: usize) -> Value {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null)
    }

    fn decode_float(row: &SqliteRow, idx: usize) -> Value {
        match row.try_get::<Option<f64>, _>(idx) {
            Ok(Some(v)) => Value::Float(v),
            Ok(None) => Value::Null,
            Err(_) => decode_dynamic(row, idx),
        }
    }

    fn decode_datetime(row: &SqliteRow, idx: usize) -> Value {
        match row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
            Ok(Some(v)) => Value::DateTime(v),
            Ok(None) => Value::Null,
            Err(_) => decode_text(row, idx),
        }
    }

    fn decode_binary(row: &SqliteRow, idx: usize) -> Value {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null)
    }

    fn decode_text(row: &SqliteRow, idx: usize) -> Value {
        match row.try_get::<Option<String>, _>(idx) {
            Ok(Some(v)) => Value::String(v),
            Ok(None) => Value::Null,
            Err(_) => decode_dynamic(row, idx),
        }
    }

    /// SQLite is dynamically typed; a column's declared type does not bind its
    /// values, so fall back to the stored value's own type.
    fn decode_dynamic(row: &SqliteRow, idx: usize) -> Value {
        let category = match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => return Value::Null,
            Ok(raw) => categorize_type(raw.type_info().name(), Backend::SQLite),
            Err(_) => return Value::Null,
        };
        let decoded = match category {
            TypeCategory::Integer => row.try_get_unchecked::<i64, _>(idx).map(Value::Int),
            TypeCategory::Float => row.try_get_unchecked::<f64, _>(idx).map(Value::Float),
            TypeCategory::Binary => row.try_get_unchecked::<Vec<u8>, _>(idx).map(Value::Bytes),
            _ => row.try_get_unchecked::<String, _>(idx).map(Value::String),
        };
        decoded.unwrap_or_else(|e| {
            tracing::error!("Failed to decode SQLite column {}: {:?}", idx, e);
            Value::Null
        })
    }
}
