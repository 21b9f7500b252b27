//! Operation hooks.
//!
//! Every operation a [`Database`](crate::db::Database) performs belongs to one
//! of nine fixed [`EventKind`]s. Handlers registered for a kind receive an
//! [`Event`] describing the finished operation: cost, SQL, arguments and error.
//! When no handler is registered for a kind, the operation is neither timed
//! nor described.

use crate::context::RequestInfo;
use crate::error::DbError;
use crate::logger::Logger;
use crate::models::{Value, format_args_list};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// The nine observable operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Ping,
    Prepare,
    StmtClose,
    TxBegin,
    TxCommit,
    TxRollback,
    Exec,
    QueryRow,
    Query,
}

impl EventKind {
    pub const COUNT: usize = 9;

    pub const ALL: [EventKind; Self::COUNT] = [
        EventKind::Ping,
        EventKind::Prepare,
        EventKind::StmtClose,
        EventKind::TxBegin,
        EventKind::TxCommit,
        EventKind::TxRollback,
        EventKind::Exec,
        EventKind::QueryRow,
        EventKind::Query,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Ping => "Ping",
            Self::Prepare => "Prepare",
            Self::StmtClose => "StmtClose",
            Self::TxBegin => "TxBegin",
            Self::TxCommit => "TxCommit",
            Self::TxRollback => "TxRollback",
            Self::Exec => "Exec",
            Self::QueryRow => "QueryRow",
            Self::Query => "Query",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One completed (or attempted) operation.
pub struct Event<'a> {
    pub kind: EventKind,
    pub cost: Duration,
    /// Empty for ping and transaction begin/commit/rollback
    pub sql: &'a str,
    pub args: &'a [Value],
    pub error: Option<&'a DbError>,
    /// Name of the originating database handle
    pub database: &'a str,
    pub logger: &'a dyn Logger,
}

impl fmt::Debug for Event<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("kind", &self.kind)
            .field("cost", &self.cost)
            .field("sql", &self.sql)
            .field("args", &self.args)
            .field("error", &self.error)
            .field("database", &self.database)
            .finish()
    }
}

/// A hook handler. Observes, never alters, the outcome.
pub type Handler = Arc<dyn Fn(&RequestInfo, &Event<'_>) + Send + Sync>;

/// Handler lists indexed by [`EventKind`].
#[derive(Clone, Default)]
pub struct HookTable {
    handlers: [Vec<Handler>; EventKind::COUNT],
}

impl HookTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table with [`log_hook`] registered for every kind.
    pub fn with_logging() -> Self {
        let mut table = Self::new();
        for kind in EventKind::ALL {
            table.add_handler(kind, log_hook);
        }
        table
    }

    /// True when no handler is registered for `kind`.
    pub fn is_empty(&self, kind: EventKind) -> bool {
        self.handlers[kind.index()].is_empty()
    }

    /// Number of handlers registered for `kind`.
    pub fn len(&self, kind: EventKind) -> usize {
        self.handlers[kind.index()].len()
    }

    /// Replace every handler for `kind` with `handler`.
    pub fn set_handler<F>(&mut self, kind: EventKind, handler: F)
    where
        F: Fn(&RequestInfo, &Event<'_>) + Send + Sync + 'static,
    {
        self.handlers[kind.index()] = vec![Arc::new(handler)];
    }

    /// Append `handler` to the handlers for `kind`.
    pub fn add_handler<F>(&mut self, kind: EventKind, handler: F)
    where
        F: Fn(&RequestInfo, &Event<'_>) + Send + Sync + 'static,
    {
        self.handlers[kind.index()].push(Arc::new(handler));
    }

    /// Merge another table into this one; existing handlers keep running first.
    pub fn append(&mut self, other: &HookTable) {
        for (mine, theirs) in self.handlers.iter_mut().zip(other.handlers.iter()) {
            mine.extend(theirs.iter().cloned());
        }
    }

    /// Run every handler for `event.kind`, in registration order.
    pub fn trigger(&self, request: &RequestInfo, event: &Event<'_>) {
        for handler in &self.handlers[event.kind.index()] {
            handler(request, event);
        }
    }
}

impl fmt::Debug for HookTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for kind in EventKind::ALL {
            map.entry(&kind.name(), &self.len(kind));
        }
        map.finish()
    }
}

/// Writes one line per event through the event's logger; errors go to the error level.
pub fn log_hook(request: &RequestInfo, event: &Event<'_>) {
    let message = format!(
        "logid[{}] event[{}] db[{}] cost[{}us] sql[{}] args[{}] err[{}]",
        request.log_id().unwrap_or_default(),
        event.kind,
        event.database,
        event.cost.as_micros(),
        event.sql,
        format_args_list(event.args),
        event
            .error
            .map(ToString::to_string)
            .unwrap_or_else(|| "<nil>".to_string()),
    );
    match event.error {
        Some(_) => event.logger.error(request, format_args!("{}", message)),
        None => event.logger.info(request, format_args!("{}", message)),
    }
}
