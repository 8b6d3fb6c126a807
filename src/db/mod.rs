pub mod models;
pub mod row_source;

pub use models::{Row, RowId, RowValue};
pub use row_source::{PostgresRowSource, RowSource, SourceError};
