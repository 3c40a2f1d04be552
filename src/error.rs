//! Crate-level error aggregate.
//!
//! Each subsystem owns its own error enum; [`RelmigError`] lets callers that
//! drive several of them (the CLI, the script generator) use a single `?`.

use crate::executor::ExecutorError;
use crate::migration::{DiffError, HistoryError};
use crate::schema::SchemaError;
use crate::sql::SqlGenerationError;
use crate::update::UpdateError;

#[derive(Debug, thiserror::Error)]
pub enum RelmigError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error(transparent)]
    Update(#[from] UpdateError),

    #[error(transparent)]
    SqlGeneration(#[from] SqlGenerationError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_is_transparent() {
        let err: RelmigError = SchemaError::UnknownTable("dbo.Orders".to_string()).into();
        assert_eq!(err.to_string(), "unknown table 'dbo.Orders'");
    }

    #[test]
    fn test_executor_error_converts() {
        let err: RelmigError = ExecutorError::Cancelled.into();
        assert!(matches!(err, RelmigError::Executor(ExecutorError::Cancelled)));
    }
}
