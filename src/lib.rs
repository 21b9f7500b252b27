//! sqlscope
//!
//! A convenience layer over SQL databases (MySQL, SQLite) providing:
//! - Context-scoped nested transactions, where only the outermost scope
//!   begins and commits
//! - A generic CRUD engine over typed parameter structs with a pluggable
//!   SQL compiler and batch insert splitting
//! - Typed operation hooks with no timing cost when nothing is registered

pub mod compiler;
pub mod config;
pub mod context;
pub mod crud;
pub mod db;
pub mod error;
pub mod hook;
pub mod logger;
pub mod mapper;
pub mod models;

pub use compiler::{CompiledStatement, InsertKind};
pub use config::{Config, DatabaseConfig};
pub use context::{ExecutionContext, RequestInfo};
pub use crud::{Crud, CrudOptions};
pub use db::{Database, DbPool, TxOptions};
pub use error::{DbError, DbResult};
pub use hook::{Event, EventKind, HookTable};
pub use mapper::Params;
pub use models::{FromRow, Row, Value};
