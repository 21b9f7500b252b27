//! Data models for sqlscope.
//!
//! This module re-exports the value and row types shared by every layer.

pub mod row;
pub mod value;

// Re-export commonly used types
pub use row::{FromRow, Row, scan_rows};
pub use value::{FromValue, ToArg, Value, format_args_list};
