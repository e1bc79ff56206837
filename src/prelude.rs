//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::connection::{Database, ScopeFlags, scope_flags};
pub use crate::error::DbError;
pub use crate::notify::{BroadcastNotifier, CommitNotifier};
pub use crate::results::{Row, RowSet};
pub use crate::sqlite::{DatabaseOptions, RunResult, SqliteEngine, StorageEngine};
pub use crate::types::{Record, SqlValue};
