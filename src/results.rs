mod row;
mod row_set;

pub use row::{Columns, Row};
pub use row_set::RowSet;
