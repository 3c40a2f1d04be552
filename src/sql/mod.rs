//! SQL text building blocks shared by the DDL and DML generators.

pub mod dialect;
pub mod helper;

use thiserror::Error;

use crate::schema::SchemaError;

pub use dialect::{ColumnAlteration, GenericDialect, PostgresDialect, SqlDialect};
pub use helper::SqlGenerationHelper;

#[derive(Debug, Error)]
pub enum SqlGenerationError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("{operation} on '{table}' lists {columns} column(s) but row {row} has {values} value(s)")]
    ValueCountMismatch {
        operation: &'static str,
        table: String,
        row: usize,
        columns: usize,
        values: usize,
    },

    #[error("{operation} on '{table}' has {keys} key row(s) but {rows} value row(s)")]
    RowCountMismatch {
        operation: &'static str,
        table: String,
        keys: usize,
        rows: usize,
    },

    #[error("{operation} on '{table}' needs at least one key column")]
    MissingKey { operation: &'static str, table: String },

    #[error("the {dialect} dialect cannot render {operation}")]
    Unsupported {
        dialect: &'static str,
        operation: String,
    },

    #[error("parameter '{0}' is not bound in this batch")]
    UnboundParameter(String),
}
