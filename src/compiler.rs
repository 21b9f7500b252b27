//! Default SQL compiler.
//!
//! Turns a table name plus predicate/assignment maps into parameterized SQL
//! with `?` placeholders (MySQL and SQLite syntax). The CRUD engine calls these
//! through function pointers, so any of them can be swapped per call.
//!
//! Predicate keys are either a bare column (equality) or `"column op"`.
//! Supported operators: `=`, `!=`, `<>`, `>`, `>=`, `<`, `<=`, `like`,
//! `not like`, `in`, `not in`, `between`. Two special keys shape SELECTs:
//! `_orderby` (a string such as `"id desc"`) and `_limit` (a count, or a
//! two-element `[offset, count]` list).
//!
//! Only values are bound as arguments. Table names, column names, selected
//! fields and the `_orderby` string are written into the SQL text as given,
//! so they must come from code, never from untrusted input.

use crate::error::{DbError, DbResult};
use crate::mapper::PredicateMap;
use crate::models::Value;
use std::fmt;

const ORDER_BY_KEY: &str = "_orderby";
const LIMIT_KEY: &str = "_limit";

/// Parameterized SQL plus its positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    pub sql: String,
    pub args: Vec<Value>,
}

impl CompiledStatement {
    pub fn new(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }
}

impl fmt::Display for CompiledStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sql[{}] args[{}]",
            self.sql,
            crate::models::format_args_list(&self.args)
        )
    }
}

/// INSERT flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertKind {
    #[default]
    Common,
    /// `INSERT IGNORE`: duplicate-key rows are skipped
    Ignore,
    /// `REPLACE`: duplicate-key rows are replaced
    Replace,
}

impl InsertKind {
    fn verb(self) -> &'static str {
        match self {
            Self::Common => "INSERT INTO",
            Self::Ignore => "INSERT IGNORE INTO",
            Self::Replace => "REPLACE INTO",
        }
    }
}

/// Build `SELECT fields FROM table [WHERE ...] [ORDER BY ...] [LIMIT ...]`.
pub fn build_select(
    table: &str,
    fields: &[String],
    wheres: &PredicateMap,
) -> DbResult<CompiledStatement> {
    check_table(table)?;
    if fields.is_empty() {
        return Err(DbError::build("no fields selected"));
    }

    let mut args = Vec::new();
    let columns: Vec<String> = fields.iter().map(|f| quote_ident(f)).collect();
    let mut sql = format!("SELECT {} FROM {}", columns.join(","), quote_ident(table));
    push_where(&mut sql, &mut args, wheres)?;
    push_tail(&mut sql, &mut args, wheres, true)?;
    Ok(CompiledStatement::new(sql, args))
}

/// Build a single multi-row INSERT. Every row must assign the same columns.
pub fn build_insert(
    table: &str,
    kind: InsertKind,
    rows: &[PredicateMap],
) -> DbResult<CompiledStatement> {
    check_table(table)?;
    let first = rows
        .first()
        .ok_or_else(|| DbError::build("no rows to insert"))?;
    if first.is_empty() {
        return Err(DbError::build("insert row has no assignments"));
    }

    let columns: Vec<&String> = first.keys().collect();
    let mut args = Vec::with_capacity(columns.len() * rows.len());
    let mut groups = Vec::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        if row.len() != columns.len() || !columns.iter().all(|c| row.contains_key(*c)) {
            return Err(DbError::build(format!(
                "insert row {} assigns different columns than row 0",
                idx
            )));
        }
        args.extend(row.values().cloned());
        groups.push(placeholders(columns.len()));
    }

    let quoted: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let sql = format!(
        "{} {} ({}) VALUES {}",
        kind.verb(),
        quote_ident(table),
        quoted.join(","),
        groups.join(",")
    );
    Ok(CompiledStatement::new(sql, args))
}

/// Build `UPDATE table SET ... [WHERE ...]`.
pub fn build_update(
    table: &str,
    wheres: &PredicateMap,
    assigns: &PredicateMap,
) -> DbResult<CompiledStatement> {
    check_table(table)?;
    if assigns.is_empty() {
        return Err(DbError::build("update has no assignments"));
    }

    let mut args = Vec::new();
    let sets: Vec<String> = assigns
        .iter()
        .map(|(column, value)| {
            args.push(value.clone());
            format!("{}=?", quote_ident(column))
        })
        .collect();
    let mut sql = format!("UPDATE {} SET {}", quote_ident(table), sets.join(","));
    push_where(&mut sql, &mut args, wheres)?;
    push_tail(&mut sql, &mut args, wheres, false)?;
    Ok(CompiledStatement::new(sql, args))
}

/// Build `DELETE FROM table [WHERE ...]`.
pub fn build_delete(table: &str, wheres: &PredicateMap) -> DbResult<CompiledStatement> {
    check_table(table)?;
    let mut args = Vec::new();
    let mut sql = format!("DELETE FROM {}", quote_ident(table));
    push_where(&mut sql, &mut args, wheres)?;
    push_tail(&mut sql, &mut args, wheres, false)?;
    Ok(CompiledStatement::new(sql, args))
}

fn check_table(table: &str) -> DbResult<()> {
    if table.trim().is_empty() {
        return Err(DbError::build("table name is empty"));
    }
    Ok(())
}

/// Backtick-quote a plain identifier. `*` and expressions pass through untouched.
///
/// This is not an escaping routine: a name containing anything beyond
/// `[A-Za-z0-9_.]` is emitted verbatim.
fn quote_ident(name: &str) -> String {
    let is_plain = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if name == "*" || !is_plain {
        return name.to_string();
    }
    name.split('.')
        .map(|part| format!("`{}`", part))
        .collect::<Vec<_>>()
        .join(".")
}

fn placeholders(n: usize) -> String {
    format!("({})", vec!["?"; n].join(","))
}

fn is_special(key: &str) -> bool {
    key == ORDER_BY_KEY || key == LIMIT_KEY
}

fn push_where(sql: &mut String, args: &mut Vec<Value>, wheres: &PredicateMap) -> DbResult<()> {
    let mut conditions = Vec::new();
    for (key, value) in wheres.iter().filter(|(k, _)| !is_special(k)) {
        conditions.push(condition(key, value, args)?);
    }
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    Ok(())
}

fn condition(key: &str, value: &Value, args: &mut Vec<Value>) -> DbResult<String> {
    let (column, op) = match key.trim().split_once(' ') {
        Some((column, op)) => (column, op.trim().to_ascii_lowercase()),
        None => (key.trim(), "=".to_string()),
    };
    let column = quote_ident(column);

    match (op.as_str(), value) {
        ("=", Value::Null) => Ok(format!("{} IS NULL", column)),
        ("!=" | "<>", Value::Null) => Ok(format!("{} IS NOT NULL", column)),
        ("in" | "not in", Value::List(items)) => {
            if items.is_empty() {
                return Err(DbError::build(format!("empty list for '{}'", key)));
            }
            args.extend(items.iter().cloned());
            let keyword = if op == "in" { "IN" } else { "NOT IN" };
            Ok(format!("{} {} {}", column, keyword, placeholders(items.len())))
        }
        ("in" | "not in", single) => {
            args.push(single.clone());
            let keyword = if op == "in" { "IN" } else { "NOT IN" };
            Ok(format!("{} {} (?)", column, keyword))
        }
        ("between", Value::List(items)) if items.len() == 2 => {
            args.extend(items.iter().cloned());
            Ok(format!("{} BETWEEN ? AND ?", column))
        }
        ("between", _) => Err(DbError::build(format!(
            "'{}' needs a two-element list",
            key
        ))),
        (_, Value::List(_)) => Err(DbError::build(format!(
            "list value is not valid for '{}'",
            key
        ))),
        ("=" | "!=" | "<>" | ">" | ">=" | "<" | "<=", v) => {
            args.push(v.clone());
            Ok(format!("{}{}?", column, op))
        }
        ("like" | "not like", v) => {
            args.push(v.clone());
            Ok(format!("{} {} ?", column, op.to_ascii_uppercase()))
        }
        (other, _) => Err(DbError::build(format!("unsupported operator '{}'", other))),
    }
}

fn push_tail(
    sql: &mut String,
    args: &mut Vec<Value>,
    wheres: &PredicateMap,
    allow_offset: bool,
) -> DbResult<()> {
    if let Some(order) = wheres.get(ORDER_BY_KEY) {
        match order {
            Value::String(order) if !order.trim().is_empty() => {
                // Emitted verbatim
                sql.push_str(" ORDER BY ");
                sql.push_str(order.trim());
            }
            other => {
                return Err(DbError::build(format!(
                    "_orderby must be a non-empty string, found {}",
                    other.type_name()
                )));
            }
        }
    }

    if let Some(limit) = wheres.get(LIMIT_KEY) {
        match limit {
            Value::Int(_) => {
                sql.push_str(" LIMIT ?");
                args.push(limit.clone());
            }
            Value::List(items) if items.len() == 1 => {
                sql.push_str(" LIMIT ?");
                args.push(items[0].clone());
            }
            Value::List(items) if items.len() == 2 && allow_offset => {
                sql.push_str(" LIMIT ?,?");
                args.extend(items.iter().cloned());
            }
            _ => return Err(DbError::build("_limit must be a count or [offset, count]")),
        }
    }
    Ok(())
}
