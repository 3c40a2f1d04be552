//! The migrations history table.
//!
//! One row per applied migration: `MigrationId` (varchar(150), primary key)
//! and `ProductVersion` (varchar(32), not null). The repository can query the
//! table through a [`SqlExecutor`] and render every script that touches it.
//! Queries come in a blocking form and a coroutine form; the coroutine form
//! runs the same code on the `may` scheduler.

use std::sync::Arc;

use may::coroutine::JoinHandle;
use once_cell::sync::OnceCell;

use crate::config::{ColumnNaming, MigrationsConfig};
use crate::executor::{CancellationToken, SqlExecutor};
use crate::migration::differ::ModelDiffer;
use crate::migration::error::HistoryError;
use crate::migration::migration::MigrationId;
use crate::migration::sql_generator::MigrationsSqlGenerator;
use crate::schema::{Column, DefaultTypeMapper, QualifiedName, SchemaSnapshot, Table};
use crate::sql::{PostgresDialect, SqlDialect};
use crate::value::Value;

pub const DEFAULT_TABLE_NAME: &str = "__EFMigrationsHistory";
const MIGRATION_ID_MAX_LENGTH: u32 = 150;
const PRODUCT_VERSION_MAX_LENGTH: u32 = 32;

/// One applied migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRow {
    pub migration_id: String,
    pub product_version: String,
}

impl HistoryRow {
    /// # Errors
    ///
    /// Returns [`HistoryError::InvalidMigrationId`] when the stored id was not
    /// written in the `YYYYMMDDHHMMSS_Name` form.
    pub fn id(&self) -> Result<MigrationId, HistoryError> {
        self.migration_id.parse()
    }
}

#[derive(Debug, Clone)]
struct HistoryColumns {
    migration_id: String,
    product_version: String,
}

impl HistoryColumns {
    fn for_naming(naming: ColumnNaming) -> Self {
        match naming {
            ColumnNaming::Pascal => Self {
                migration_id: "MigrationId".to_string(),
                product_version: "ProductVersion".to_string(),
            },
            ColumnNaming::Snake => Self {
                migration_id: "migration_id".to_string(),
                product_version: "product_version".to_string(),
            },
        }
    }
}

/// A history query running on the `may` scheduler.
pub struct HistoryTask<T> {
    handle: JoinHandle<Result<T, HistoryError>>,
}

impl<T> HistoryTask<T> {
    /// Wait for the coroutine to finish.
    ///
    /// # Errors
    ///
    /// Returns the query's own error, or [`HistoryError::CoroutinePanicked`].
    pub fn join(self) -> Result<T, HistoryError> {
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => Err(HistoryError::CoroutinePanicked),
        }
    }
}

/// Reads and scripts the migrations history table.
#[derive(Clone)]
pub struct HistoryRepository {
    executor: Option<Arc<dyn SqlExecutor>>,
    dialect: Arc<dyn SqlDialect>,
    differ: ModelDiffer,
    generator: MigrationsSqlGenerator,
    table: QualifiedName,
    naming: ColumnNaming,
    product_version: String,
    columns: OnceCell<HistoryColumns>,
    cancellation: CancellationToken,
}

impl std::fmt::Debug for HistoryRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryRepository")
            .field("table", &self.table)
            .field("dialect", &self.dialect.name())
            .field("connected", &self.executor.is_some())
            .finish()
    }
}

impl Default for HistoryRepository {
    fn default() -> Self {
        Self::new(Arc::new(PostgresDialect::new()), &MigrationsConfig::default())
    }
}

impl HistoryRepository {
    /// A repository that can render scripts but not query.
    pub fn new(dialect: Arc<dyn SqlDialect>, config: &MigrationsConfig) -> Self {
        let type_mapper = Arc::new(DefaultTypeMapper::new());
        Self {
            executor: None,
            generator: MigrationsSqlGenerator::new(Arc::clone(&dialect), type_mapper),
            differ: ModelDiffer::default(),
            dialect,
            table: config.history_table_name(),
            naming: config.column_naming,
            product_version: config.product_version.clone(),
            columns: OnceCell::new(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn SqlExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Queries check `token` before each round trip.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn table_name(&self) -> &QualifiedName {
        &self.table
    }

    pub fn product_version(&self) -> &str {
        &self.product_version
    }

    pub fn migration_id_column(&self) -> &str {
        &self.columns().migration_id
    }

    pub fn product_version_column(&self) -> &str {
        &self.columns().product_version
    }

    fn columns(&self) -> &HistoryColumns {
        self.columns.get_or_init(|| HistoryColumns::for_naming(self.naming))
    }

    fn executor(&self) -> Result<&dyn SqlExecutor, HistoryError> {
        self.executor.as_deref().ok_or(HistoryError::NoExecutor)
    }

    /// The history table as a one-table model, as the differ sees it.
    pub fn model(&self) -> SchemaSnapshot {
        let columns = self.columns();
        let mut table = Table::new(self.table.name.clone())
            .column(Column::new(columns.migration_id.clone(), "string").max_length(MIGRATION_ID_MAX_LENGTH))
            .column(
                Column::new(columns.product_version.clone(), "string").max_length(PRODUCT_VERSION_MAX_LENGTH),
            )
            .primary_key(format!("PK_{}", self.table.name), [columns.migration_id.clone()]);
        if let Some(schema) = &self.table.schema {
            table = table.in_schema(schema.clone());
        }
        SchemaSnapshot::new().with_table(table)
    }

    /// Whether the history table exists.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::NoExecutor`] without an executor, or the
    /// executor's error unchanged.
    pub fn exists(&self) -> Result<bool, HistoryError> {
        #[cfg(feature = "tracing")]
        let _span = crate::metrics::tracing_helpers::history_span("exists").entered();

        let executor = self.executor()?;
        self.cancellation.check()?;
        if !executor.database_exists()? {
            log::debug!("Database does not exist, so neither does {}", self.table);
            return Ok(false);
        }
        self.cancellation.check()?;
        let value = executor.execute_scalar(&self.dialect.history_exists_sql(&self.table), &[])?;
        let exists = value.as_ref().is_some_and(|v| self.dialect.interpret_exists_result(v));
        log::debug!("History table {} exists: {}", self.table, exists);
        Ok(exists)
    }

    /// [`exists`](Self::exists) on a new coroutine.
    pub fn spawn_exists(&self) -> HistoryTask<bool> {
        let repository = self.clone();
        HistoryTask {
            handle: may::go!(move || repository.exists()),
        }
    }

    /// Applied migrations in ascending id order. Empty when the table does
    /// not exist yet.
    ///
    /// # Errors
    ///
    /// - [`HistoryError::NoExecutor`] without an executor
    /// - [`HistoryError::MalformedRow`] for a row with a missing or non-text value
    /// - the executor's error, unchanged
    pub fn applied_migrations(&self) -> Result<Vec<HistoryRow>, HistoryError> {
        if !self.exists()? {
            return Ok(Vec::new());
        }

        #[cfg(feature = "tracing")]
        let _span = crate::metrics::tracing_helpers::history_span("applied_migrations").entered();

        let executor = self.executor()?;
        self.cancellation.check()?;
        let rows = executor.query(&self.applied_migrations_sql(), &[])?;

        let columns = self.columns();
        let mut applied = rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                let text = |position: usize, column: &str| {
                    row.get(position)
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .ok_or_else(|| HistoryError::MalformedRow {
                            row: index,
                            column: column.to_string(),
                        })
                };
                Ok(HistoryRow {
                    migration_id: text(0, &columns.migration_id)?,
                    product_version: text(1, &columns.product_version)?,
                })
            })
            .collect::<Result<Vec<_>, HistoryError>>()?;
        applied.sort_by(|a, b| a.migration_id.cmp(&b.migration_id));

        log::info!("{} migration(s) applied according to {}", applied.len(), self.table);
        Ok(applied)
    }

    /// [`applied_migrations`](Self::applied_migrations) on a new coroutine.
    pub fn spawn_applied_migrations(&self) -> HistoryTask<Vec<HistoryRow>> {
        let repository = self.clone();
        HistoryTask {
            handle: may::go!(move || repository.applied_migrations()),
        }
    }

    fn applied_migrations_sql(&self) -> String {
        let helper = self.dialect.helper();
        let columns = self.columns();
        let id = helper.delimit_identifier(&columns.migration_id);
        format!(
            "SELECT {}, {}\nFROM {}\nORDER BY {}{}\n",
            id,
            helper.delimit_identifier(&columns.product_version),
            helper.delimit_name(&self.table),
            id,
            helper.statement_terminator()
        )
    }

    /// DDL that creates the history table.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::SqlGeneration`] if the DDL cannot be rendered.
    pub fn create_script(&self) -> Result<String, HistoryError> {
        let operations = self.differ.get_differences(None, Some(&self.model()))?;
        Ok(self.generator.generate_script(&operations)?)
    }

    /// [`create_script`](Self::create_script), guarded so it is a no-op when
    /// the table already exists.
    ///
    /// # Errors
    ///
    /// Same as [`create_script`](Self::create_script).
    pub fn create_if_not_exists_script(&self) -> Result<String, HistoryError> {
        let script = self.create_script()?;
        Ok(self.dialect.create_if_not_exists_script(&self.table, &script))
    }

    /// Statement recording `row` as applied.
    pub fn insert_script(&self, row: &HistoryRow) -> String {
        let helper = self.dialect.helper();
        let columns = self.columns();
        format!(
            "INSERT INTO {} ({}, {})\nVALUES ({}, {}){}\n",
            helper.delimit_name(&self.table),
            helper.delimit_identifier(&columns.migration_id),
            helper.delimit_identifier(&columns.product_version),
            helper.string_literal(&row.migration_id),
            helper.string_literal(&row.product_version),
            helper.statement_terminator()
        )
    }

    /// Statement forgetting `migration_id`.
    pub fn delete_script(&self, migration_id: &str) -> String {
        let helper = self.dialect.helper();
        format!(
            "DELETE FROM {}\nWHERE {} = {}{}\n",
            helper.delimit_name(&self.table),
            helper.delimit_identifier(&self.columns().migration_id),
            helper.string_literal(migration_id),
            helper.statement_terminator()
        )
    }

    /// Opens a block that runs only if `migration_id` is not recorded yet.
    pub fn begin_if_not_exists(&self, migration_id: &str) -> String {
        self.dialect
            .begin_if_not_exists(&self.table, &self.columns().migration_id, migration_id)
    }

    /// Opens a block that runs only if `migration_id` is recorded.
    pub fn begin_if_exists(&self, migration_id: &str) -> String {
        self.dialect
            .begin_if_exists(&self.table, &self.columns().migration_id, migration_id)
    }

    pub fn end_if(&self) -> String {
        self.dialect.end_if()
    }
}
