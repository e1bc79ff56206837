// SQLite engine module - the storage collaborator behind the access layer
//
// - config: open options and their builder
// - engine: the `StorageEngine` seam and its rusqlite implementation
// - params: value conversion into rusqlite types
// - query: row extraction

pub mod config;
pub mod engine;
pub mod params;
pub mod query;

pub use config::{DatabaseOptions, DatabaseOptionsBuilder};
pub use engine::{RunResult, SqliteEngine, StatementHandle, StorageEngine};
