//! The low-level driver seam.
//!
//! A [`Driver`] is the raw connection pool underneath a
//! [`Database`](crate::db::Database): it runs SQL with positional `?`
//! arguments and begins transactions. Nothing at this level is instrumented.

use crate::error::DbResult;
use crate::models::{Row, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

/// Outcome of a statement that returns no rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Auto-increment id produced by the statement, 0 when none.
    pub last_insert_id: i64,
}

impl ExecResult {
    pub fn new(rows_affected: u64, last_insert_id: i64) -> Self {
        Self {
            rows_affected,
            last_insert_id,
        }
    }
}

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsolationLevel::ReadUncommitted => write!(f, "READ UNCOMMITTED"),
            IsolationLevel::ReadCommitted => write!(f, "READ COMMITTED"),
            IsolationLevel::RepeatableRead => write!(f, "REPEATABLE READ"),
            IsolationLevel::Serializable => write!(f, "SERIALIZABLE"),
        }
    }
}

/// Options for beginning a transaction. The default is the driver's default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxOptions {
    pub isolation: Option<IsolationLevel>,
    pub read_only: bool,
}

impl TxOptions {
    pub fn is_default(&self) -> bool {
        self.isolation.is_none() && !self.read_only
    }
}

/// A raw connection pool.
pub trait Driver: Send + Sync + 'static {
    type Tx: DriverTx;

    fn ping(&self) -> impl Future<Output = DbResult<()>> + Send;

    /// Prepare `sql` on the server, surfacing syntax errors early.
    ///
    /// No handle is returned. For sqlx pools this validates the statement and
    /// warms the acquiring connection's statement cache.
    fn prepare(&self, sql: &str) -> impl Future<Output = DbResult<()>> + Send;

    fn exec(&self, sql: &str, args: &[Value]) -> impl Future<Output = DbResult<ExecResult>> + Send;

    fn query(&self, sql: &str, args: &[Value]) -> impl Future<Output = DbResult<Vec<Row>>> + Send;

    fn begin(&self, opts: &TxOptions) -> impl Future<Output = DbResult<Self::Tx>> + Send;

    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// A raw transaction holding one connection.
///
/// Once committed or rolled back, every further call fails with
/// [`DbError::TransactionDone`](crate::error::DbError::TransactionDone).
/// Dropping an unfinished transaction rolls it back.
pub trait DriverTx: Send + 'static {
    fn exec(&mut self, sql: &str, args: &[Value]) -> impl Future<Output = DbResult<ExecResult>> + Send;

    fn query(&mut self, sql: &str, args: &[Value]) -> impl Future<Output = DbResult<Vec<Row>>> + Send;

    fn commit(&mut self) -> impl Future<Output = DbResult<()>> + Send;

    fn rollback(&mut self) -> impl Future<Output = DbResult<()>> + Send;
}
