//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - The raw driver seam and its sqlx implementation
//! - The instrumented database handle, transactions and prepared statements
//! - Argument binding and result decoding
//! - A scripted mock driver for tests

pub mod database;
pub mod driver;
pub mod mock;
pub(crate) mod params;
pub mod pool;
pub mod types;

pub use database::{Database, DatabaseBuilder, DbTx, Statement};
pub use driver::{Driver, DriverTx, ExecResult, IsolationLevel, TxOptions};
pub use mock::{MockCall, MockDriver, RecordedCall};
pub use pool::{DbPool, DbTransaction};
pub use types::Backend;
