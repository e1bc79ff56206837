mod chunked;
mod dml;
mod handle;
mod instrument;
mod prepared;
mod select;
mod tx;

pub use chunked::CHUNK_MARKER;
pub use handle::Database;
pub use prepared::StatementCache;
pub use tx::{ScopeFlags, scope_flags};
