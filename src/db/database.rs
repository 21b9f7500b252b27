//! Instrumented database handle.
//!
//! [`Database`] wraps a [`Driver`] together with a name, a hook table and a
//! logger. Every operation run through it, or through a [`DbTx`] or
//! [`Statement`] obtained from it, is reported to the hooks registered for
//! its [`EventKind`]. Kinds with no handler run untimed.

use crate::context::RequestInfo;
use crate::db::driver::{Driver, DriverTx, ExecResult, TxOptions};
use crate::error::{DbError, DbResult};
use crate::hook::{Event, EventKind, HookTable};
use crate::logger::{self, Logger, SharedLogger};
use crate::models::{Row, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

struct DatabaseInner<D> {
    name: String,
    driver: D,
    hooks: HookTable,
    logger: SharedLogger,
}

impl<D: Driver> DatabaseInner<D> {
    async fn instrument<T, F>(
        &self,
        kind: EventKind,
        request: &RequestInfo,
        sql: &str,
        args: &[Value],
        operation: F,
    ) -> DbResult<T>
    where
        F: Future<Output = DbResult<T>>,
    {
        if self.hooks.is_empty(kind) {
            return operation.await;
        }

        let start = Instant::now();
        let result = operation.await;
        let event = Event {
            kind,
            cost: start.elapsed(),
            sql,
            args,
            error: result.as_ref().err(),
            database: &self.name,
            logger: self.logger.as_ref(),
        };
        self.hooks.trigger(request, &event);
        result
    }
}

/// A named, instrumented handle over a driver. Cheap to clone.
pub struct Database<D: Driver> {
    inner: Arc<DatabaseInner<D>>,
}

impl<D: Driver> Clone for Database<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: Driver> fmt::Debug for Database<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.inner.name)
            .field("hooks", &self.inner.hooks)
            .finish_non_exhaustive()
    }
}

impl<D: Driver> Database<D> {
    /// A handle with no hooks and the no-op logger.
    pub fn new(name: impl Into<String>, driver: D) -> Self {
        Self::builder(name, driver).build()
    }

    pub fn builder(name: impl Into<String>, driver: D) -> DatabaseBuilder<D> {
        DatabaseBuilder {
            name: name.into(),
            driver,
            hooks: HookTable::new(),
            logger: logger::noop(),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn driver(&self) -> &D {
        &self.inner.driver
    }

    pub fn hooks(&self) -> &HookTable {
        &self.inner.hooks
    }

    pub fn logger(&self) -> &dyn Logger {
        self.inner.logger.as_ref()
    }

    pub async fn ping(&self, request: &RequestInfo) -> DbResult<()> {
        self.inner
            .instrument(EventKind::Ping, request, "", &[], self.inner.driver.ping())
            .await
    }

    /// Prepare `sql` and return a reusable statement bound to this handle.
    pub async fn prepare(&self, request: &RequestInfo, sql: &str) -> DbResult<Statement<D>> {
        self.inner
            .instrument(
                EventKind::Prepare,
                request,
                sql,
                &[],
                self.inner.driver.prepare(sql),
            )
            .await?;
        Ok(Statement {
            db: self.clone(),
            sql: sql.to_string(),
        })
    }

    pub async fn exec(&self, request: &RequestInfo, sql: &str, args: &[Value]) -> DbResult<ExecResult> {
        self.inner
            .instrument(
                EventKind::Exec,
                request,
                sql,
                args,
                self.inner.driver.exec(sql, args),
            )
            .await
    }

    pub async fn query(&self, request: &RequestInfo, sql: &str, args: &[Value]) -> DbResult<Vec<Row>> {
        self.inner
            .instrument(
                EventKind::Query,
                request,
                sql,
                args,
                self.inner.driver.query(sql, args),
            )
            .await
    }

    /// First row of the result; [`DbError::NoRows`] when there is none.
    pub async fn query_row(&self, request: &RequestInfo, sql: &str, args: &[Value]) -> DbResult<Row> {
        let driver = &self.inner.driver;
        self.inner
            .instrument(EventKind::QueryRow, request, sql, args, async {
                first_row(driver.query(sql, args).await?)
            })
            .await
    }

    pub async fn begin(&self, request: &RequestInfo, opts: &TxOptions) -> DbResult<DbTx<D>> {
        let raw = self
            .inner
            .instrument(EventKind::TxBegin, request, "", &[], self.inner.driver.begin(opts))
            .await?;
        Ok(DbTx {
            raw,
            db: self.clone(),
        })
    }

    /// Close the underlying pool.
    pub async fn close(&self) {
        self.inner.driver.close().await;
        info!(database = %self.inner.name, "Database closed");
    }
}

fn first_row(rows: Vec<Row>) -> DbResult<Row> {
    rows.into_iter().next().ok_or(DbError::NoRows)
}

/// Builds a [`Database`]. Hooks can only be registered here; a built handle's
/// hook table never changes.
pub struct DatabaseBuilder<D> {
    name: String,
    driver: D,
    hooks: HookTable,
    logger: SharedLogger,
}

impl<D: Driver> DatabaseBuilder<D> {
    /// Replace the handlers for `kind`.
    pub fn set_hook<F>(mut self, kind: EventKind, handler: F) -> Self
    where
        F: Fn(&RequestInfo, &Event<'_>) + Send + Sync + 'static,
    {
        self.hooks.set_handler(kind, handler);
        self
    }

    /// Add a handler for `kind` after the existing ones.
    pub fn add_hook<F>(mut self, kind: EventKind, handler: F) -> Self
    where
        F: Fn(&RequestInfo, &Event<'_>) + Send + Sync + 'static,
    {
        self.hooks.add_handler(kind, handler);
        self
    }

    /// Merge a prepared hook table.
    pub fn hooks(mut self, hooks: &HookTable) -> Self {
        self.hooks.append(hooks);
        self
    }

    /// Log every operation through the handle's logger.
    pub fn enable_log(self, enabled: bool) -> Self {
        if enabled {
            self.hooks(&HookTable::with_logging())
        } else {
            self
        }
    }

    pub fn logger(mut self, logger: impl Logger + 'static) -> Self {
        self.logger = Arc::new(logger);
        self
    }

    pub fn shared_logger(mut self, logger: SharedLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn build(self) -> Database<D> {
        Database {
            inner: Arc::new(DatabaseInner {
                name: self.name,
                driver: self.driver,
                hooks: self.hooks,
                logger: self.logger,
            }),
        }
    }
}

/// An instrumented transaction obtained from [`Database::begin`].
pub struct DbTx<D: Driver> {
    raw: D::Tx,
    db: Database<D>,
}

impl<D: Driver> DbTx<D> {
    pub fn database(&self) -> &Database<D> {
        &self.db
    }

    pub async fn exec(&mut self, request: &RequestInfo, sql: &str, args: &[Value]) -> DbResult<ExecResult> {
        self.db
            .inner
            .instrument(EventKind::Exec, request, sql, args, self.raw.exec(sql, args))
            .await
    }

    pub async fn query(&mut self, request: &RequestInfo, sql: &str, args: &[Value]) -> DbResult<Vec<Row>> {
        self.db
            .inner
            .instrument(EventKind::Query, request, sql, args, self.raw.query(sql, args))
            .await
    }

    pub async fn query_row(&mut self, request: &RequestInfo, sql: &str, args: &[Value]) -> DbResult<Row> {
        let raw = &mut self.raw;
        self.db
            .inner
            .instrument(EventKind::QueryRow, request, sql, args, async move {
                first_row(raw.query(sql, args).await?)
            })
            .await
    }

    pub async fn commit(&mut self, request: &RequestInfo) -> DbResult<()> {
        self.db
            .inner
            .instrument(EventKind::TxCommit, request, "", &[], self.raw.commit())
            .await
    }

    pub async fn rollback(&mut self, request: &RequestInfo) -> DbResult<()> {
        self.db
            .inner
            .instrument(EventKind::TxRollback, request, "", &[], self.raw.rollback())
            .await
    }

    /// Commit; on failure, roll back.
    ///
    /// A rollback failing with [`DbError::TransactionDone`] is dropped and the
    /// commit error returned alone. Any other rollback failure is returned
    /// together with the commit error as [`DbError::TxClose`].
    pub async fn commit_or_rollback(&mut self, request: &RequestInfo) -> DbResult<()> {
        let Err(commit) = self.commit(request).await else {
            return Ok(());
        };
        match self.rollback(request).await {
            Ok(()) => Err(commit),
            Err(rollback) if rollback.is_tx_done() => Err(commit),
            Err(rollback) => Err(DbError::TxClose {
                commit: Box::new(commit),
                rollback: Box::new(rollback),
            }),
        }
    }
}

/// A prepared statement bound to its [`Database`].
///
/// Only the SQL text is held. sqlx caches prepared statements per pooled
/// connection, so each execution re-uses (or re-prepares) the server-side
/// statement on whichever connection it acquires.
pub struct Statement<D: Driver> {
    db: Database<D>,
    sql: String,
}

impl<D: Driver> Statement<D> {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub async fn exec(&self, request: &RequestInfo, args: &[Value]) -> DbResult<ExecResult> {
        self.db.exec(request, &self.sql, args).await
    }

    pub async fn query(&self, request: &RequestInfo, args: &[Value]) -> DbResult<Vec<Row>> {
        self.db.query(request, &self.sql, args).await
    }

    pub async fn query_row(&self, request: &RequestInfo, args: &[Value]) -> DbResult<Row> {
        self.db.query_row(request, &self.sql, args).await
    }

    /// Fire [`EventKind::StmtClose`] and drop the handle. No server-side
    /// statement is released; sqlx evicts cached statements on its own.
    pub async fn close(self, request: &RequestInfo) -> DbResult<()> {
        self.db
            .inner
            .instrument(EventKind::StmtClose, request, &self.sql, &[], async { Ok(()) })
            .await
    }
}
