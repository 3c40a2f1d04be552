//! # relmig
//!
//! Relational migration plumbing for PostgreSQL on the `may` runtime.
//!
//! The crate is organised leaf-first:
//!
//! - [`schema`]: immutable schema snapshots (tables, columns, keys, indexes, seed rows)
//! - [`migration`]: migration operations, the model differ, the DDL generator,
//!   the history repository and script generation
//! - [`update`]: modification commands, the command batch preparer and the DML generator
//! - [`sql`]: identifier delimiting / literal escaping and provider dialects
//! - [`executor`]: the `SqlExecutor` seam and its `may_postgres` implementation
//!
//! # Example
//!
//! ```rust
//! use relmig::migration::ModelDiffer;
//! use relmig::schema::{Column, SchemaSnapshot, Table};
//!
//! let source = SchemaSnapshot::new().with_table(
//!     Table::new("Orders")
//!         .column(Column::new("Id", "int"))
//!         .column(Column::new("Total", "int"))
//!         .primary_key("PK_Orders", ["Id"]),
//! );
//! let target = SchemaSnapshot::new().with_table(
//!     Table::new("Orders")
//!         .column(Column::new("Id", "int"))
//!         .column(Column::new("Total", "int"))
//!         .column(Column::new("Total2", "int"))
//!         .primary_key("PK_Orders", ["Id"]),
//! );
//!
//! let differ = ModelDiffer::default();
//! let up = differ.get_differences(Some(&source), Some(&target)).unwrap();
//! assert_eq!(up.len(), 1);
//! ```

pub mod config;
pub mod error;
pub mod executor;
#[cfg(any(feature = "metrics", feature = "tracing"))]
pub mod metrics;
pub mod migration;
pub mod schema;
pub mod sql;
pub mod update;
pub mod value;

pub use config::{ColumnNaming, DatabaseConfig, MigrationsConfig};
pub use error::RelmigError;
pub use executor::{CancellationToken, ExecutorError, MayPostgresExecutor, SqlExecutor};
pub use migration::{
    HistoryRepository, HistoryRow, HistoryTask, Migration, MigrationId, MigrationOperation, MigrationScripter,
    MigrationsSqlGenerator, ModelDiffer, ScriptOptions, ScriptTarget,
};
pub use schema::{Column, ForeignKey, Index, QualifiedName, SchemaSnapshot, Table};
pub use sql::{GenericDialect, PostgresDialect, SqlDialect, SqlGenerationHelper};
pub use update::{
    BatchLimits, ColumnModification, CommandBatchPreparer, EntityState, ModificationCommand,
    ModificationCommandBatch, ResultSetMapping, UpdateError, UpdateSqlGenerator,
};
pub use value::Value;

#[cfg(any(test, feature = "mock"))]
pub use executor::mock::RecordingExecutor;
