//! Errors raised while validating or mutating a schema snapshot.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("unknown table '{0}'")]
    UnknownTable(String),

    #[error("unknown column '{column}' on table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("entities '{first}' and '{second}' both map to table '{identity}'")]
    AmbiguousTable {
        identity: String,
        first: String,
        second: String,
    },

    #[error("table '{0}' already exists")]
    DuplicateTable(String),

    #[error("column '{column}' is defined more than once on table '{table}'")]
    DuplicateColumn { table: String, column: String },

    #[error("constraint or index name '{name}' is used more than once in schema '{schema}'")]
    DuplicateConstraint { schema: String, name: String },

    #[error("unknown constraint or index '{name}' on table '{table}'")]
    UnknownConstraint { table: String, name: String },

    #[error("foreign key '{name}' on '{table}' references unknown table '{principal}'")]
    UnknownPrincipal {
        table: String,
        name: String,
        principal: String,
    },

    #[error("foreign key '{name}' on '{table}' has {dependent} column(s) but references {principal} column(s)")]
    ForeignKeyArity {
        table: String,
        name: String,
        dependent: usize,
        principal: usize,
    },

    #[error("table '{0}' has seed data but no primary key")]
    SeedWithoutKey(String),

    #[error("seed row on table '{table}' is missing a value for key column '{column}'")]
    SeedMissingKey { table: String, column: String },

    #[error("no seed row on table '{table}' matches key {key}")]
    UnknownSeedRow { table: String, key: String },

    #[error("no store type is known for logical type '{0}'")]
    UnmappedType(String),

    #[error("'{constraint}' on table '{table}' is violated: {detail}")]
    ConstraintViolation {
        table: String,
        constraint: String,
        detail: String,
    },

    #[error("table '{0}' already has a primary key")]
    PrimaryKeyExists(String),

    #[error("invalid snapshot document: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for SchemaError {
    fn from(err: serde_json::Error) -> Self {
        SchemaError::Serialization(err.to_string())
    }
}
