//! Argument and column values.
//!
//! `Value` is what flows between the mapper, the compiler and the driver:
//! predicate and assignment values, bound statement arguments, and decoded
//! result columns.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

/// Formats accepted when reading a datetime out of a text column.
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// A single SQL value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Date and time without timezone
    DateTime(NaiveDateTime),
    /// Binary data (base64 encoded in JSON)
    #[serde(serialize_with = "base64_bytes::serialize")]
    Bytes(Vec<u8>),
    /// A list of values, used by `in`/`not in`/`between` predicates
    List(Vec<Value>),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this is a list with no elements.
    pub fn is_empty_list(&self) -> bool {
        matches!(self, Self::List(items) if items.is_empty())
    }

    /// Get the type name of this value for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::DateTime(_) => "datetime",
            Self::Bytes(_) => "bytes",
            Self::List(_) => "list",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::String(v) => f.write_str(v),
            Self::DateTime(v) => write!(f, "{}", v),
            Self::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Render an argument list the way log lines print it: `[1 N1 2]`.
pub fn format_args_list(args: &[Value]) -> String {
    Value::List(args.to_vec()).to_string()
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(v) => Value::Bool(v),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            obj @ serde_json::Value::Object(_) => Value::String(obj.to_string()),
        }
    }
}

// =============================================================================
// Field -> Value
// =============================================================================

/// Conversion of a parameter struct field into an optional argument.
///
/// `None` means the field is unset and must not produce a predicate or an
/// assignment; it is what an `Option` field returns when empty.
pub trait ToArg {
    fn to_arg(&self) -> Option<Value>;
}

macro_rules! int_to_arg {
    ($($t:ty),*) => {
        $(
            impl ToArg for $t {
                fn to_arg(&self) -> Option<Value> {
                    Some(Value::Int(i64::from(*self)))
                }
            }
        )*
    };
}

int_to_arg!(i8, i16, i32, i64, u16, u32);

impl ToArg for bool {
    fn to_arg(&self) -> Option<Value> {
        Some(Value::Bool(*self))
    }
}

impl ToArg for f32 {
    fn to_arg(&self) -> Option<Value> {
        Some(Value::Float(f64::from(*self)))
    }
}

impl ToArg for f64 {
    fn to_arg(&self) -> Option<Value> {
        Some(Value::Float(*self))
    }
}

impl ToArg for String {
    fn to_arg(&self) -> Option<Value> {
        Some(Value::String(self.clone()))
    }
}

impl ToArg for &str {
    fn to_arg(&self) -> Option<Value> {
        Some(Value::String((*self).to_string()))
    }
}

impl ToArg for NaiveDateTime {
    fn to_arg(&self) -> Option<Value> {
        Some(Value::DateTime(*self))
    }
}

impl ToArg for Value {
    fn to_arg(&self) -> Option<Value> {
        Some(self.clone())
    }
}

impl<T: ToArg> ToArg for Option<T> {
    fn to_arg(&self) -> Option<Value> {
        self.as_ref().and_then(ToArg::to_arg)
    }
}

impl<T: ToArg> ToArg for Vec<T> {
    fn to_arg(&self) -> Option<Value> {
        Some(Value::List(
            self.iter()
                .map(|item| item.to_arg().unwrap_or(Value::Null))
                .collect(),
        ))
    }
}

// =============================================================================
// Value -> Field
// =============================================================================

/// Conversion of a decoded column value into a record field.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, String>;
}

fn mismatch(expected: &str, value: &Value) -> String {
    format!("expected {}, found {}", expected, value.type_name())
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, String> {
        Ok(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Int(v) => Ok(*v),
            Value::Bool(v) => Ok(i64::from(*v)),
            other => Err(mismatch("int", other)),
        }
    }
}

macro_rules! narrow_int_from_value {
    ($($t:ty),*) => {
        $(
            impl FromValue for $t {
                fn from_value(value: &Value) -> Result<Self, String> {
                    let wide = i64::from_value(value)?;
                    <$t>::try_from(wide)
                        .map_err(|_| format!("{} out of range for {}", wide, stringify!($t)))
                }
            }
        )*
    };
}

narrow_int_from_value!(i8, i16, i32, u16, u32, u64);

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Float(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            Value::String(s) => s
                .parse::<f64>()
                .map_err(|e| format!("invalid decimal '{}': {}", s, e)),
            other => Err(mismatch("float", other)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Bool(v) => Ok(*v),
            Value::Int(v) => Ok(*v != 0),
            other => Err(mismatch("bool", other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::String(s) => Ok(s.clone()),
            Value::Bytes(b) => String::from_utf8(b.clone()).map_err(|e| e.to_string()),
            other => Err(mismatch("string", other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Bytes(b) => Ok(b.clone()),
            Value::String(s) => Ok(s.clone().into_bytes()),
            other => Err(mismatch("bytes", other)),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::DateTime(v) => Ok(*v),
            Value::String(s) => DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .ok_or_else(|| format!("invalid datetime '{}'", s)),
            other => Err(mismatch("datetime", other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_types() {
        assert!(Value::Null.is_null());
        assert!(!Value::Bool(true).is_null());
        assert_eq!(Value::Int(42).type_name(), "int");
        assert!(Value::List(vec![]).is_empty_list());
        assert!(!Value::List(vec![Value::Int(1)]).is_empty_list());
    }

    #[test]
    fn test_display_matches_log_format() {
        let args = vec![
            Value::Int(1),
            Value::String("N1".to_string()),
            Value::List(vec![Value::Int(2), Value::Int(3)]),
            Value::Null,
        ];
        assert_eq!(format_args_list(&args), "[1 N1 [2 3] NULL]");
    }

    #[test]
    fn test_option_to_arg() {
        assert_eq!(None::<i64>.to_arg(), None);
        assert_eq!(Some(7i32).to_arg(), Some(Value::Int(7)));
        assert_eq!(
            vec![1i64, 2].to_arg(),
            Some(Value::List(vec![Value::Int(1), Value::Int(2)]))
        );
    }

    #[test]
    fn test_from_value_conversions() {
        assert_eq!(i32::from_value(&Value::Int(5)), Ok(5));
        assert!(i8::from_value(&Value::Int(1000)).is_err());
        assert_eq!(bool::from_value(&Value::Int(1)), Ok(true));
        assert_eq!(Option::<String>::from_value(&Value::Null), Ok(None));
        assert!(String::from_value(&Value::Int(1)).is_err());
        let dt = NaiveDateTime::from_value(&Value::String("2024-03-01 10:20:30".into())).unwrap();
        assert_eq!(dt.to_string(), "2024-03-01 10:20:30");
    }

    #[test]
    fn test_bytes_serialize_as_base64() {
        let json = serde_json::to_value(Value::Bytes(b"hi".to_vec())).unwrap();
        assert_eq!(json, serde_json::json!("aGk="));
    }

    #[test]
    fn test_from_json() {
        let v = Value::from(serde_json::json!([1, "a", null, 1.5]));
        assert_eq!(
            v,
            Value::List(vec![
                Value::Int(1),
                Value::String("a".into()),
                Value::Null,
                Value::Float(1.5)
            ])
        );
    }
}
