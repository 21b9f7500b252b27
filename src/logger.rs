//! Pluggable logging backend.
//!
//! The CRUD engine and the log hook write through a [`Logger`] handed to them
//! explicitly. [`NoopLogger`] is the default so nothing needs configuring;
//! [`TracingLogger`] forwards to `tracing` with the request's log id attached.

use crate::context::RequestInfo;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

/// Leveled, request-aware log sink.
pub trait Logger: Send + Sync {
    fn info(&self, request: &RequestInfo, message: fmt::Arguments<'_>);

    fn error(&self, request: &RequestInfo, message: fmt::Arguments<'_>);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn info(&self, _request: &RequestInfo, _message: fmt::Arguments<'_>) {}

    fn error(&self, _request: &RequestInfo, _message: fmt::Arguments<'_>) {}
}

/// Emits `tracing` events under the `sqlscope` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, request: &RequestInfo, message: fmt::Arguments<'_>) {
        info!(
            target: "sqlscope",
            log_id = request.log_id().unwrap_or_default(),
            "{}",
            message
        );
    }

    fn error(&self, request: &RequestInfo, message: fmt::Arguments<'_>) {
        error!(
            target: "sqlscope",
            log_id = request.log_id().unwrap_or_default(),
            "{}",
            message
        );
    }
}

/// Shared handle used wherever a logger is stored.
pub type SharedLogger = Arc<dyn Logger>;

/// The default logger: a no-op.
pub fn noop() -> SharedLogger {
    Arc::new(NoopLogger)
}
