//! Request-scoped execution context and nested transaction coordination.
//!
//! An [`ExecutionContext`] is created once per logical request and passed by
//! `&mut` down the call chain. It routes every statement to the right executor:
//! the active transaction when one is open, the shared database handle
//! otherwise.
//!
//! Transactional scopes nest freely. Only the outermost [`enter`] begins a
//! physical transaction and only the matching outermost [`leave`] commits or
//! rolls it back; inner scopes just move a counter.
//!
//! ```ignore
//! let mut ctx = ExecutionContext::new(db.clone());
//! ctx.enter(&TxOptions::default()).await?;      // BEGIN
//! ctx.enter(&TxOptions::default()).await?;      // nested, no-op
//! ctx.exec("UPDATE ...", &args).await?;         // runs inside the tx
//! ctx.leave(false).await?;                      // inner, no-op
//! ctx.leave(true).await?;                       // COMMIT
//! ```
//!
//! [`enter`]: ExecutionContext::enter
//! [`leave`]: ExecutionContext::leave

use crate::db::{Database, DbTx, Driver, ExecResult, TxOptions};
use crate::error::{DbError, DbResult};
use crate::models::{Row, Value};
use futures_util::future::BoxFuture;
use tracing::{debug, warn};

/// Correlation data handed to loggers and hook handlers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInfo {
    log_id: Option<String>,
}

impl RequestInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log_id(log_id: impl Into<String>) -> Self {
        Self {
            log_id: Some(log_id.into()),
        }
    }

    /// A fresh random log id.
    pub fn generate() -> Self {
        Self::with_log_id(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn log_id(&self) -> Option<&str> {
        self.log_id.as_deref()
    }
}

/// The executor a statement should run on.
pub enum ActiveExecutor<'a, D: Driver> {
    Conn(&'a Database<D>),
    Tx(&'a mut DbTx<D>),
}

impl<D: Driver> ActiveExecutor<'_, D> {
    pub fn is_transaction(&self) -> bool {
        matches!(self, Self::Tx(_))
    }

    pub async fn exec(
        &mut self,
        info: &RequestInfo,
        sql: &str,
        args: &[Value],
    ) -> DbResult<ExecResult> {
        match self {
            Self::Conn(db) => db.exec(info, sql, args).await,
            Self::Tx(tx) => tx.exec(info, sql, args).await,
        }
    }

    pub async fn query(&mut self, info: &RequestInfo, sql: &str, args: &[Value]) -> DbResult<Vec<Row>> {
        match self {
            Self::Conn(db) => db.query(info, sql, args).await,
            Self::Tx(tx) => tx.query(info, sql, args).await,
        }
    }

    pub async fn query_row(&mut self, info: &RequestInfo, sql: &str, args: &[Value]) -> DbResult<Row> {
        match self {
            Self::Conn(db) => db.query_row(info, sql, args).await,
            Self::Tx(tx) => tx.query_row(info, sql, args).await,
        }
    }
}

/// Per-request state: base connection, optional transaction, nesting depth, log id.
pub struct ExecutionContext<D: Driver> {
    db: Database<D>,
    tx: Option<DbTx<D>>,
    open_count: usize,
    info: RequestInfo,
}

impl<D: Driver> ExecutionContext<D> {
    pub fn new(db: Database<D>) -> Self {
        Self::with_info(db, RequestInfo::default())
    }

    pub fn with_info(db: Database<D>, info: RequestInfo) -> Self {
        Self {
            db,
            tx: None,
            open_count: 0,
            info,
        }
    }

    pub fn info(&self) -> &RequestInfo {
        &self.info
    }

    pub fn database(&self) -> &Database<D> {
        &self.db
    }

    /// Number of transactional scopes currently open.
    pub fn open_count(&self) -> usize {
        self.open_count
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    /// The active transaction if one is open, the base connection otherwise.
    pub fn executor(&mut self) -> ActiveExecutor<'_, D> {
        self.resolve().0
    }

    fn resolve(&mut self) -> (ActiveExecutor<'_, D>, &RequestInfo) {
        let executor = match self.tx.as_mut() {
            Some(tx) => ActiveExecutor::Tx(tx),
            None => ActiveExecutor::Conn(&self.db),
        };
        (executor, &self.info)
    }

    pub async fn exec(&mut self, sql: &str, args: &[Value]) -> DbResult<ExecResult> {
        let (mut executor, info) = self.resolve();
        executor.exec(info, sql, args).await
    }

    pub async fn query(&mut self, sql: &str, args: &[Value]) -> DbResult<Vec<Row>> {
        let (mut executor, info) = self.resolve();
        executor.query(info, sql, args).await
    }

    /// First row of the result; [`DbError::NoRows`] when there is none.
    pub async fn query_row(&mut self, sql: &str, args: &[Value]) -> DbResult<Row> {
        let (mut executor, info) = self.resolve();
        executor.query_row(info, sql, args).await
    }

    pub async fn ping(&self) -> DbResult<()> {
        self.db.ping(&self.info).await
    }

    /// Open a transactional scope.
    ///
    /// Begins a physical transaction with `opts` only when no scope is open;
    /// nested calls just increase the depth and their options are ignored.
    pub async fn enter(&mut self, opts: &TxOptions) -> DbResult<()> {
        if self.open_count == 0 {
            let tx = self.db.begin(&self.info, opts).await?;
            self.tx = Some(tx);
            debug!(log_id = ?self.info.log_id(), "Transaction scope opened");
        }
        self.open_count += 1;
        Ok(())
    }

    /// Close a transactional scope.
    ///
    /// Inner scopes always succeed without touching the transaction. The
    /// outermost scope commits when `succeeded` is true and rolls back
    /// otherwise, returning the physical outcome.
    pub async fn leave(&mut self, succeeded: bool) -> DbResult<()> {
        if self.open_count == 0 {
            return Err(DbError::TransactionNotInitialized);
        }
        self.open_count -= 1;
        if self.open_count > 0 {
            return Ok(());
        }

        let Some(mut tx) = self.tx.take() else {
            return Err(DbError::TransactionNotInitialized);
        };
        debug!(
            log_id = ?self.info.log_id(),
            commit = succeeded,
            "Transaction scope closed"
        );
        if succeeded {
            tx.commit_or_rollback(&self.info).await
        } else {
            tx.rollback(&self.info).await
        }
    }

    /// Run `f` inside a transactional scope.
    ///
    /// The scope commits when `f` succeeds and rolls back when it fails. An
    /// error from `f` is returned in preference to an error from closing.
    ///
    /// ```ignore
    /// ctx.transaction(&TxOptions::default(), |ctx| {
    ///     Box::pin(async move {
    ///         ctx.exec("DELETE FROM students WHERE id=?", &[Value::Int(1)]).await?;
    ///         Ok(())
    ///     })
    /// })
    /// .await?;
    /// ```
    pub async fn transaction<T, F>(&mut self, opts: &TxOptions, f: F) -> DbResult<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut Self) -> BoxFuture<'c, DbResult<T>> + Send,
    {
        self.enter(opts).await?;
        let result = f(self).await;
        let closed = self.leave(result.is_ok()).await;
        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                warn!(
                    log_id = ?self.info.log_id(),
                    error = %close_err,
                    "Failed to close transaction after error"
                );
                Err(e)
            }
        }
    }
}

impl<D: Driver> Drop for ExecutionContext<D> {
    fn drop(&mut self) {
        if self.open_count > 0 {
            warn!(
                log_id = ?self.info.log_id(),
                open_count = self.open_count,
                "Execution context dropped with an open transaction; it will be rolled back"
            );
        }
    }
}
