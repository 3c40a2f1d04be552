//! Differ and history repository errors.

use thiserror::Error;

use crate::executor::ExecutorError;
use crate::schema::SchemaError;
use crate::sql::SqlGenerationError;
use crate::update::UpdateError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiffError {
    #[error("entities '{first}' and '{second}' both map to table '{identity}'")]
    AmbiguousTable {
        identity: String,
        first: String,
        second: String,
    },

    #[error("table '{source_table}' is claimed as the previous name of both '{first}' and '{second}'")]
    AmbiguousRename {
        source_table: String,
        first: String,
        second: String,
    },

    #[error("invalid model: {0}")]
    InvalidModel(SchemaError),

    #[error("seed data cannot be ordered: {0}")]
    SeedData(#[from] UpdateError),
}

impl From<SchemaError> for DiffError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::AmbiguousTable {
                identity,
                first,
                second,
            } => DiffError::AmbiguousTable {
                identity,
                first,
                second,
            },
            other => DiffError::InvalidModel(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    SqlGeneration(#[from] SqlGenerationError),

    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error("migration id must not be empty")]
    EmptyMigrationId,

    #[error("invalid migration id '{0}': expected <14-digit timestamp>_<name>")]
    InvalidMigrationId(String),

    #[error("history row {row} has no value in column '{column}'")]
    MalformedRow { row: usize, column: String },

    #[error("the history repository has no executor; it can only render scripts")]
    NoExecutor,

    #[error("the history coroutine panicked")]
    CoroutinePanicked,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_ambiguity_becomes_diff_ambiguity() {
        let err: DiffError = SchemaError::AmbiguousTable {
            identity: "Orders".into(),
            first: "Order".into(),
            second: "LegacyOrder".into(),
        }
        .into();
        assert!(matches!(err, DiffError::AmbiguousTable { .. }));
        assert_eq!(err.to_string(), "entities 'Order' and 'LegacyOrder' both map to table 'Orders'");
    }

    #[test]
    fn test_other_schema_errors_are_invalid_model() {
        let err: DiffError = SchemaError::UnknownTable("Orders".into()).into();
        assert_eq!(err.to_string(), "invalid model: unknown table 'Orders'");
    }
}
