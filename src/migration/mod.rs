//! Schema migrations.
//!
//! - [`ModelDiffer`] compares two [`SchemaSnapshot`](crate::schema::SchemaSnapshot)s
//!   and produces an ordered list of [`MigrationOperation`]s
//! - [`MigrationsSqlGenerator`] renders those operations to DDL
//! - [`HistoryRepository`] tracks which migrations a database has applied
//! - [`MigrationScripter`] renders a range of migrations as one script
//!
//! # Example
//!
//! ```rust
//! use relmig::migration::{MigrationsSqlGenerator, ModelDiffer};
//! use relmig::schema::{Column, SchemaSnapshot, Table};
//!
//! let target = SchemaSnapshot::new().with_table(
//!     Table::new("Blogs")
//!         .column(Column::new("Id", "int").identity())
//!         .column(Column::new("Url", "string").max_length(200))
//!         .primary_key("PK_Blogs", ["Id"]),
//! );
//!
//! let operations = ModelDiffer::default().get_differences(None, Some(&target)).unwrap();
//! let script = MigrationsSqlGenerator::default().generate_script(&operations).unwrap();
//! assert!(script.starts_with("CREATE TABLE \"Blogs\" (\n"));
//! ```

pub mod apply;
pub mod differ;
pub mod error;
pub mod history;
#[allow(clippy::module_inception)]
pub mod migration;
pub mod operations;
pub mod rename;
pub mod scripter;
pub mod sql_generator;
pub(crate) mod table_ordering;

pub use differ::ModelDiffer;
pub use error::{DiffError, HistoryError};
pub use history::{HistoryRepository, HistoryRow, HistoryTask};
pub use migration::{Migration, MigrationId};
pub use operations::*;
pub use rename::{AnnotationRenameStrategy, NoRenameStrategy, RenameStrategy};
pub use scripter::{MigrationScripter, ScriptOptions, ScriptTarget, INITIAL_DATABASE};
pub use sql_generator::{MigrationCommand, MigrationsSqlGenerator};
