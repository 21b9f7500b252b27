//! Generic CRUD engine.
//!
//! A [`Crud`] is bound to one table, a row type `T` and a parameter type `P`.
//! Each verb maps `P` values to predicates or assignments, compiles them with
//! the configured compiler, runs the statement on the context's active
//! executor and logs one line with the elapsed time.
//!
//! ```ignore
//! let students: Crud<Student, StudentParam> = Crud::new("students");
//! let mut ctx = ExecutionContext::new(db.clone());
//! let found = students.query(&mut ctx, Some(&StudentParam { id: Some(1), ..Default::default() })).await?;
//! let ids = students.insert_list_with(&mut ctx, &rows, &CrudOptions::new().batch_size(100)).await?;
//! ```

use crate::compiler::{self, CompiledStatement, InsertKind};
use crate::context::{ExecutionContext, RequestInfo};
use crate::db::Driver;
use crate::error::{DbError, DbResult};
use crate::logger::{self, Logger, SharedLogger};
use crate::mapper::{self, Params, PredicateMap};
use crate::models::{FromRow, Row, format_args_list, scan_rows};
use std::fmt;
use std::marker::PhantomData;
use std::time::Instant;

/// Compiles a SELECT from table, fields and predicates.
pub type SelectBuilder = fn(&str, &[String], &PredicateMap) -> DbResult<CompiledStatement>;

/// Compiles one INSERT from table, kind and assignment rows.
pub type InsertBuilder = fn(&str, InsertKind, &[PredicateMap]) -> DbResult<CompiledStatement>;

/// Compiles an UPDATE from table, predicates and assignments.
pub type UpdateBuilder = fn(&str, &PredicateMap, &PredicateMap) -> DbResult<CompiledStatement>;

/// Compiles a DELETE from table and predicates.
pub type DeleteBuilder = fn(&str, &PredicateMap) -> DbResult<CompiledStatement>;

/// Decodes result rows into the row type.
pub type RowsScanner<T> = fn(Vec<Row>) -> DbResult<Vec<T>>;

/// Per-call CRUD settings. Start from [`CrudOptions::new`] and override.
pub struct CrudOptions<T> {
    pub select_builder: SelectBuilder,
    pub insert_builder: InsertBuilder,
    pub update_builder: UpdateBuilder,
    pub delete_builder: DeleteBuilder,
    /// Selected columns (default `*`). Written into the SQL text unescaped.
    pub fields: Vec<String>,
    pub insert_kind: InsertKind,
    /// Maximum rows per INSERT; 0 means unbounded
    pub batch_size: usize,
    pub rows_scanner: RowsScanner<T>,
}

impl<T: FromRow> CrudOptions<T> {
    pub fn new() -> Self {
        Self {
            select_builder: compiler::build_select,
            insert_builder: compiler::build_insert,
            update_builder: compiler::build_update,
            delete_builder: compiler::build_delete,
            fields: vec!["*".to_string()],
            insert_kind: InsertKind::Common,
            batch_size: 0,
            rows_scanner: scan_rows::<T>,
        }
    }
}

impl<T: FromRow> Default for CrudOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CrudOptions<T> {
    pub fn select_builder(mut self, builder: SelectBuilder) -> Self {
        self.select_builder = builder;
        self
    }

    pub fn insert_builder(mut self, builder: InsertBuilder) -> Self {
        self.insert_builder = builder;
        self
    }

    pub fn update_builder(mut self, builder: UpdateBuilder) -> Self {
        self.update_builder = builder;
        self
    }

    pub fn delete_builder(mut self, builder: DeleteBuilder) -> Self {
        self.delete_builder = builder;
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn insert_kind(mut self, kind: InsertKind) -> Self {
        self.insert_kind = kind;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn rows_scanner(mut self, scanner: RowsScanner<T>) -> Self {
        self.rows_scanner = scanner;
        self
    }

    /// Effective chunk length for `len` rows.
    fn chunk_len(&self, len: usize) -> usize {
        match self.batch_size {
            0 => len.max(1),
            size => size,
        }
    }
}

impl<T> Clone for CrudOptions<T> {
    fn clone(&self) -> Self {
        Self {
            select_builder: self.select_builder,
            insert_builder: self.insert_builder,
            update_builder: self.update_builder,
            delete_builder: self.delete_builder,
            fields: self.fields.clone(),
            insert_kind: self.insert_kind,
            batch_size: self.batch_size,
            rows_scanner: self.rows_scanner,
        }
    }
}

impl<T> fmt::Debug for CrudOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrudOptions")
            .field("fields", &self.fields)
            .field("insert_kind", &self.insert_kind)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

fn cost_ms(begin: Instant) -> u128 {
    begin.elapsed().as_millis()
}

/// Typed CRUD operations on one table.
pub struct Crud<T, P> {
    table: String,
    logger: SharedLogger,
    _marker: PhantomData<fn() -> (T, P)>,
}

impl<T, P> Clone for Crud<T, P> {
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
            logger: self.logger.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T, P> fmt::Debug for Crud<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crud").field("table", &self.table).finish()
    }
}

impl<T, P> Crud<T, P>
where
    T: FromRow,
    P: Params,
{
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            logger: logger::noop(),
            _marker: PhantomData,
        }
    }

    pub fn with_logger(mut self, logger: SharedLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn log_error(&self, request: &RequestInfo, begin: Instant, phase: &str, stmt: Option<&CompiledStatement>, err: &DbError) {
        match stmt {
            Some(stmt) => self.logger.error(
                request,
                format_args!(
                    "cost[{}] [{}] sql[{}] args[{}] err[{}]",
                    cost_ms(begin),
                    phase,
                    stmt.sql,
                    format_args_list(&stmt.args),
                    err
                ),
            ),
            None => self.logger.error(
                request,
                format_args!("cost[{}] [{}] err[{}]", cost_ms(begin), phase, err),
            ),
        }
    }

    fn log_success(&self, request: &RequestInfo, begin: Instant, phase: &str, stmt: &CompiledStatement, count: &str) {
        self.logger.info(
            request,
            format_args!(
                "cost[{}] [{}] sql[{}] args[{}] {}",
                cost_ms(begin),
                phase,
                stmt.sql,
                format_args_list(&stmt.args),
                count
            ),
        );
    }

    /// First matching row, or `None`.
    pub async fn query<D: Driver>(
        &self,
        ctx: &mut ExecutionContext<D>,
        filter: Option<&P>,
    ) -> DbResult<Option<T>> {
        self.query_with(ctx, filter, &CrudOptions::new()).await
    }

    pub async fn query_with<D: Driver>(
        &self,
        ctx: &mut ExecutionContext<D>,
        filter: Option<&P>,
        options: &CrudOptions<T>,
    ) -> DbResult<Option<T>> {
        let list = self.query_list_with(ctx, filter, options).await?;
        Ok(list.into_iter().next())
    }

    /// Every matching row in result order. No rows is an empty list, not an error.
    pub async fn query_list<D: Driver>(
        &self,
        ctx: &mut ExecutionContext<D>,
        filter: Option<&P>,
    ) -> DbResult<Vec<T>> {
        self.query_list_with(ctx, filter, &CrudOptions::new()).await
    }

    pub async fn query_list_with<D: Driver>(
        &self,
        ctx: &mut ExecutionContext<D>,
        filter: Option<&P>,
        options: &CrudOptions<T>,
    ) -> DbResult<Vec<T>> {
        let begin = Instant::now();
        let wheres = mapper::to_where(filter);

        let stmt = match (options.select_builder)(&self.table, &options.fields, &wheres) {
            Ok(stmt) => stmt,
            Err(e) => {
                self.log_error(ctx.info(), begin, "QueryBuild", None, &e);
                return Err(e);
            }
        };

        let rows = match ctx.query(&stmt.sql, &stmt.args).await {
            Ok(rows) => rows,
            Err(e) if e.is_no_rows() => Vec::new(),
            Err(e) => {
                self.log_error(ctx.info(), begin, "QueryExec", Some(&stmt), &e);
                return Err(e);
            }
        };

        let list = match (options.rows_scanner)(rows) {
            Ok(list) => list,
            Err(e) => {
                self.log_error(ctx.info(), begin, "QueryScan", Some(&stmt), &e);
                return Err(e);
            }
        };

        self.log_success(ctx.info(), begin, "QuerySucc", &stmt, &format!("len[{}]", list.len()));
        Ok(list)
    }

    /// Insert one row; returns its auto-increment id.
    pub async fn insert<D: Driver>(&self, ctx: &mut ExecutionContext<D>, data: &P) -> DbResult<i64> {
        self.insert_with(ctx, data, &CrudOptions::new()).await
    }

    pub async fn insert_with<D: Driver>(
        &self,
        ctx: &mut ExecutionContext<D>,
        data: &P,
        options: &CrudOptions<T>,
    ) -> DbResult<i64> {
        self.insert_list_with(ctx, std::slice::from_ref(data), options)
            .await
    }

    /// Insert rows in chunks of the configured batch size, one INSERT per
    /// chunk. Returns the last-insert id of the final chunk.
    ///
    /// The first failing chunk stops the operation; chunks already written
    /// stay written unless the context is inside a transaction.
    pub async fn insert_list<D: Driver>(&self, ctx: &mut ExecutionContext<D>, data: &[P]) -> DbResult<i64> {
        self.insert_list_with(ctx, data, &CrudOptions::new()).await
    }

    pub async fn insert_list_with<D: Driver>(
        &self,
        ctx: &mut ExecutionContext<D>,
        data: &[P],
        options: &CrudOptions<T>,
    ) -> DbResult<i64> {
        if data.is_empty() {
            return Ok(0);
        }

        let begin = Instant::now();
        let mut last_id = 0;
        for (chunk_idx, chunk) in data.chunks(options.chunk_len(data.len())).enumerate() {
            let assigns = mapper::to_assign_list(chunk);
            let phase = |name: &str| format!("{}] [{}", name, chunk_idx);

            let stmt = match (options.insert_builder)(&self.table, options.insert_kind, &assigns) {
                Ok(stmt) => stmt,
                Err(e) => {
                    self.log_error(ctx.info(), begin, &phase("InsertBuild"), None, &e);
                    return Err(e);
                }
            };

            let result = match ctx.exec(&stmt.sql, &stmt.args).await {
                Ok(result) => result,
                Err(e) => {
                    self.log_error(ctx.info(), begin, &phase("InsertExec"), Some(&stmt), &e);
                    return Err(e);
                }
            };

            last_id = result.last_insert_id;
            self.log_success(
                ctx.info(),
                begin,
                &phase("InsertSucc"),
                &stmt,
                &format!("len[{}] last_id[{}]", chunk.len(), last_id),
            );
        }
        Ok(last_id)
    }

    /// Update rows matching `filter` with the set fields of `data`; returns rows affected.
    pub async fn update<D: Driver>(
        &self,
        ctx: &mut ExecutionContext<D>,
        filter: Option<&P>,
        data: &P,
    ) -> DbResult<u64> {
        self.update_with(ctx, filter, data, &CrudOptions::new()).await
    }

    pub async fn update_with<D: Driver>(
        &self,
        ctx: &mut ExecutionContext<D>,
        filter: Option<&P>,
        data: &P,
        options: &CrudOptions<T>,
    ) -> DbResult<u64> {
        let begin = Instant::now();
        let wheres = mapper::to_where(filter);
        let assigns = mapper::to_assign(data);

        let stmt = match (options.update_builder)(&self.table, &wheres, &assigns) {
            Ok(stmt) => stmt,
            Err(e) => {
                self.log_error(ctx.info(), begin, "UpdateBuild", None, &e);
                return Err(e);
            }
        };
        self.exec_counted(ctx, begin, "Update", stmt).await
    }

    /// Delete rows matching `filter`; returns rows affected.
    pub async fn delete<D: Driver>(&self, ctx: &mut ExecutionContext<D>, filter: Option<&P>) -> DbResult<u64> {
        self.delete_with(ctx, filter, &CrudOptions::new()).await
    }

    pub async fn delete_with<D: Driver>(
        &self,
        ctx: &mut ExecutionContext<D>,
        filter: Option<&P>,
        options: &CrudOptions<T>,
    ) -> DbResult<u64> {
        let begin = Instant::now();
        let wheres = mapper::to_where(filter);

        let stmt = match (options.delete_builder)(&self.table, &wheres) {
            Ok(stmt) => stmt,
            Err(e) => {
                self.log_error(ctx.info(), begin, "DeleteBuild", None, &e);
                return Err(e);
            }
        };
        self.exec_counted(ctx, begin, "Delete", stmt).await
    }

    async fn exec_counted<D: Driver>(
        &self,
        ctx: &mut ExecutionContext<D>,
        begin: Instant,
        verb: &str,
        stmt: CompiledStatement,
    ) -> DbResult<u64> {
        match ctx.exec(&stmt.sql, &stmt.args).await {
            Ok(result) => {
                self.log_success(
                    ctx.info(),
                    begin,
                    &format!("{}Succ", verb),
                    &stmt,
                    &format!("rows[{}]", result.rows_affected),
                );
                Ok(result.rows_affected)
            }
            Err(e) => {
                self.log_error(ctx.info(), begin, &format!("{}Exec", verb), Some(&stmt), &e);
                Err(e)
            }
        }
    }
}
