//! Argument binding for the sqlx driver.
//!
//! Binds [`Value`] arguments to backend-specific sqlx queries. Lists have no
//! native column type and are bound as JSON text.

use crate::models::Value;
use sqlx::mysql::MySqlArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::{MySql, Sqlite};

fn list_as_json(items: &[Value]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

/// Bind a value to a MySQL query.
pub(crate) fn bind_mysql_value<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    value: &'q Value,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(v) => query.bind(*v),
        Value::Int(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::String(v) => query.bind(v.as_str()),
        Value::DateTime(v) => query.bind(*v),
        Value::Bytes(v) => query.bind(v.as_slice()),
        Value::List(items) => query.bind(list_as_json(items)),
    }
}

/// Bind a value to a SQLite query.
pub(crate) fn bind_sqlite_value<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &'q Value,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(v) => query.bind(*v),
        Value::Int(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::String(v) => query.bind(v.as_str()),
        Value::DateTime(v) => query.bind(*v),
        Value::Bytes(v) => query.bind(v.as_slice()),
        Value::List(items) => query.bind(list_as_json(items)),
    }
}

/// Bind every argument of a MySQL query, in order.
pub(crate) fn bind_mysql<'q>(
    mut query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    args: &'q [Value],
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    for arg in args {
        query = bind_mysql_value(query, arg);
    }
    query
}

/// Bind every argument of a SQLite query, in order.
pub(crate) fn bind_sqlite<'q>(
    mut query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    args: &'q [Value],
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    for arg in args {
        query = bind_sqlite_value(query, arg);
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_as_json() {
        assert_eq!(list_as_json(&[]), "[]");
        assert_eq!(
            list_as_json(&[Value::Int(1), Value::String("a".into())]),
            r#"[1,"a"]"#
        );
    }
}
