//! Provider dialects.
//!
//! A [`SqlDialect`] owns every piece of syntax that differs between
//! providers. The DDL and DML generators are written once against this trait.

use std::fmt;

use crate::schema::QualifiedName;
use crate::sql::helper::SqlGenerationHelper;
use crate::update::ModificationCommand;
use crate::value::Value;

/// Target definition of an altered column, already rendered to SQL fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnAlteration {
    pub store_type: String,
    pub nullable: bool,
    /// Default expression or literal, if any.
    pub default: Option<String>,
    /// `Some` when identity generation was switched on or off.
    pub identity: Option<bool>,
}

pub trait SqlDialect: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn helper(&self) -> &SqlGenerationHelper;

    /// Placeholder text for the parameter at batch position `index`.
    fn parameter_placeholder(&self, index: usize, name: &str) -> String;

    /// Largest number of bound parameters one round trip may carry.
    fn max_parameters(&self) -> usize;

    /// Whether INSERT/UPDATE/DELETE ... RETURNING is available.
    fn supports_returning(&self) -> bool {
        false
    }

    fn rows_affected_function(&self) -> &str;

    fn identity_function(&self) -> &str;

    /// Commands the provider cannot batch with anything else.
    fn requires_standalone(&self, _command: &ModificationCommand) -> bool {
        false
    }

    fn literal(&self, value: &Value) -> String {
        let helper = self.helper();
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(true) => "TRUE".to_string(),
            Value::Bool(false) => "FALSE".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Double(d) if d.is_finite() => format!("{d:?}"),
            Value::Double(d) => helper.string_literal(&d.to_string()),
            Value::Decimal(d) => d.to_string(),
            Value::String(s) => helper.string_literal(s),
            Value::Bytes(bytes) => self.bytes_literal(bytes),
            Value::Uuid(u) => helper.string_literal(&u.to_string()),
            Value::Timestamp(t) => helper.string_literal(&t.to_rfc3339()),
            Value::Json(j) => helper.string_literal(&j.to_string()),
        }
    }

    fn bytes_literal(&self, bytes: &[u8]) -> String {
        format!("X'{}'", hex(bytes))
    }

    /// Clause appended to an identity column definition.
    fn identity_column_clause(&self) -> &'static str;

    /// Clause that makes a column computed from `expression`.
    fn computed_column_clause(&self, expression: &str) -> String {
        format!(" AS ({expression})")
    }

    fn alter_column_sql(&self, table: &QualifiedName, column: &str, alteration: &ColumnAlteration) -> Vec<String>;

    fn rename_table_sql(&self, old: &QualifiedName, new: &QualifiedName) -> Vec<String> {
        let helper = self.helper();
        vec![format!(
            "ALTER TABLE {} RENAME TO {}",
            helper.delimit_name(old),
            helper.delimit_identifier(&new.name)
        )]
    }

    fn rename_column_sql(&self, table: &QualifiedName, old: &str, new: &str) -> String {
        let helper = self.helper();
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            helper.delimit_name(table),
            helper.delimit_identifier(old),
            helper.delimit_identifier(new)
        )
    }

    fn drop_index_sql(&self, table: &QualifiedName, name: &str) -> String;

    fn ensure_schema_sql(&self, schema: &str) -> String;

    fn table_comment_sql(&self, _table: &QualifiedName, _comment: Option<&str>) -> Option<String> {
        None
    }

    fn column_comment_sql(&self, _table: &QualifiedName, _column: &str, _comment: Option<&str>) -> Option<String> {
        None
    }

    /// Query returning a single value that says whether `table` exists.
    fn history_exists_sql(&self, table: &QualifiedName) -> String;

    fn interpret_exists_result(&self, value: &Value) -> bool;

    /// Rewrite a CREATE TABLE script so that it is a no-op when the table exists.
    fn create_if_not_exists_script(&self, table: &QualifiedName, create_script: &str) -> String;

    fn begin_if_not_exists(&self, table: &QualifiedName, id_column: &str, migration_id: &str) -> String;

    fn begin_if_exists(&self, table: &QualifiedName, id_column: &str, migration_id: &str) -> String;

    fn end_if(&self) -> String;
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

/// PostgreSQL: `$n` placeholders, RETURNING read-back, `DO` blocks for
/// conditional scripts.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect {
    helper: SqlGenerationHelper,
}

impl PostgresDialect {
    pub fn new() -> Self {
        Self::default()
    }

    fn history_probe(&self, table: &QualifiedName, id_column: &str, migration_id: &str) -> String {
        let helper = self.helper();
        format!(
            "SELECT 1 FROM {} WHERE {} = {}",
            helper.delimit_name(table),
            helper.delimit_identifier(id_column),
            helper.string_literal(migration_id)
        )
    }
}

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn helper(&self) -> &SqlGenerationHelper {
        &self.helper
    }

    fn parameter_placeholder(&self, index: usize, _name: &str) -> String {
        format!("${}", index + 1)
    }

    fn max_parameters(&self) -> usize {
        65535
    }

    fn supports_returning(&self) -> bool {
        true
    }

    fn rows_affected_function(&self) -> &str {
        "1"
    }

    fn identity_function(&self) -> &str {
        "lastval()"
    }

    fn bytes_literal(&self, bytes: &[u8]) -> String {
        format!("'\\x{}'::bytea", hex(bytes))
    }

    fn identity_column_clause(&self) -> &'static str {
        " GENERATED BY DEFAULT AS IDENTITY"
    }

    fn computed_column_clause(&self, expression: &str) -> String {
        format!(" GENERATED ALWAYS AS ({expression}) STORED")
    }

    fn alter_column_sql(&self, table: &QualifiedName, column: &str, alteration: &ColumnAlteration) -> Vec<String> {
        let helper = self.helper();
        let prefix = format!(
            "ALTER TABLE {} ALTER COLUMN {}",
            helper.delimit_name(table),
            helper.delimit_identifier(column)
        );
        let mut statements = vec![format!("{prefix} TYPE {}", alteration.store_type)];
        statements.push(if alteration.nullable {
            format!("{prefix} DROP NOT NULL")
        } else {
            format!("{prefix} SET NOT NULL")
        });
        statements.push(match &alteration.default {
            Some(default) => format!("{prefix} SET DEFAULT {default}"),
            None => format!("{prefix} DROP DEFAULT"),
        });
        match alteration.identity {
            Some(true) => statements.push(format!("{prefix} ADD GENERATED BY DEFAULT AS IDENTITY")),
            Some(false) => statements.push(format!("{prefix} DROP IDENTITY")),
            None => {}
        }
        statements
    }

    fn rename_table_sql(&self, old: &QualifiedName, new: &QualifiedName) -> Vec<String> {
        let helper = self.helper();
        let mut statements = Vec::new();
        if old.name != new.name {
            statements.push(format!(
                "ALTER TABLE {} RENAME TO {}",
                helper.delimit_name(old),
                helper.delimit_identifier(&new.name)
            ));
        }
        if old.schema != new.schema {
            let renamed = QualifiedName::new(old.schema.as_deref(), new.name.clone());
            statements.push(format!(
                "ALTER TABLE {} SET SCHEMA {}",
                helper.delimit_name(&renamed),
                helper.delimit_identifier(new.schema.as_deref().unwrap_or("public"))
            ));
        }
        statements
    }

    fn drop_index_sql(&self, table: &QualifiedName, name: &str) -> String {
        format!(
            "DROP INDEX {}",
            self.helper().delimit_qualified(name, table.schema.as_deref())
        )
    }

    fn ensure_schema_sql(&self, schema: &str) -> String {
        format!("CREATE SCHEMA IF NOT EXISTS {}", self.helper().delimit_identifier(schema))
    }

    fn table_comment_sql(&self, table: &QualifiedName, comment: Option<&str>) -> Option<String> {
        let helper = self.helper();
        Some(format!(
            "COMMENT ON TABLE {} IS {}",
            helper.delimit_name(table),
            comment.map_or_else(|| "NULL".to_string(), |c| helper.string_literal(c))
        ))
    }

    fn column_comment_sql(&self, table: &QualifiedName, column: &str, comment: Option<&str>) -> Option<String> {
        let helper = self.helper();
        Some(format!(
            "COMMENT ON COLUMN {}.{} IS {}",
            helper.delimit_name(table),
            helper.delimit_identifier(column),
            comment.map_or_else(|| "NULL".to_string(), |c| helper.string_literal(c))
        ))
    }

    fn history_exists_sql(&self, table: &QualifiedName) -> String {
        let helper = self.helper();
        let schema = match &table.schema {
            Some(schema) => helper.string_literal(schema),
            None => "current_schema()".to_string(),
        };
        format!(
            "SELECT EXISTS (SELECT 1 FROM pg_catalog.pg_class c JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace WHERE n.nspname = {} AND c.relname = {})",
            schema,
            helper.string_literal(&table.name)
        )
    }

    fn interpret_exists_result(&self, value: &Value) -> bool {
        match value {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            _ => false,
        }
    }

    fn create_if_not_exists_script(&self, _table: &QualifiedName, create_script: &str) -> String {
        create_script.replacen("CREATE TABLE", "CREATE TABLE IF NOT EXISTS", 1)
    }

    fn begin_if_not_exists(&self, table: &QualifiedName, id_column: &str, migration_id: &str) -> String {
        format!(
            "DO $EF$\nBEGIN\n    IF NOT EXISTS({}) THEN\n",
            self.history_probe(table, id_column, migration_id)
        )
    }

    fn begin_if_exists(&self, table: &QualifiedName, id_column: &str, migration_id: &str) -> String {
        format!(
            "DO $EF$\nBEGIN\n    IF EXISTS({}) THEN\n",
            self.history_probe(table, id_column, migration_id)
        )
    }

    fn end_if(&self) -> String {
        "    END IF;\nEND $EF$;\n".to_string()
    }
}

/// A configurable ANSI-flavoured dialect: `@name` placeholders, function-based
/// rows-affected and identity checks, `IF ... BEGIN ... END` blocks.
#[derive(Debug, Clone)]
pub struct GenericDialect {
    helper: SqlGenerationHelper,
    rows_affected_function: String,
    identity_function: String,
    max_parameters: usize,
    standalone_identity_inserts: bool,
}

impl Default for GenericDialect {
    fn default() -> Self {
        Self {
            helper: SqlGenerationHelper::ansi(),
            rows_affected_function: "ROW_COUNT()".to_string(),
            identity_function: "LAST_INSERT_ID()".to_string(),
            max_parameters: 2100,
            standalone_identity_inserts: false,
        }
    }
}

impl GenericDialect {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_helper(mut self, helper: SqlGenerationHelper) -> Self {
        self.helper = helper;
        self
    }

    pub fn with_functions(mut self, rows_affected: impl Into<String>, identity: impl Into<String>) -> Self {
        self.rows_affected_function = rows_affected.into();
        self.identity_function = identity.into();
        self
    }

    pub fn with_max_parameters(mut self, max_parameters: usize) -> Self {
        self.max_parameters = max_parameters;
        self
    }

    /// Run every insert that reads back a generated key in its own batch.
    pub fn with_standalone_identity_inserts(mut self, standalone: bool) -> Self {
        self.standalone_identity_inserts = standalone;
        self
    }

    fn history_probe(&self, table: &QualifiedName, id_column: &str, migration_id: &str) -> String {
        format!(
            "SELECT * FROM {} WHERE {} = {}",
            self.helper.delimit_name(table),
            self.helper.delimit_identifier(id_column),
            self.helper.string_literal(migration_id)
        )
    }
}

impl SqlDialect for GenericDialect {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn helper(&self) -> &SqlGenerationHelper {
        &self.helper
    }

    fn parameter_placeholder(&self, _index: usize, name: &str) -> String {
        format!("@{name}")
    }

    fn max_parameters(&self) -> usize {
        self.max_parameters
    }

    fn rows_affected_function(&self) -> &str {
        &self.rows_affected_function
    }

    fn identity_function(&self) -> &str {
        &self.identity_function
    }

    fn requires_standalone(&self, command: &ModificationCommand) -> bool {
        self.standalone_identity_inserts
            && command.state().is_insert()
            && command.read_modifications().any(|m| m.is_key())
    }

    fn identity_column_clause(&self) -> &'static str {
        " IDENTITY"
    }

    fn alter_column_sql(&self, table: &QualifiedName, column: &str, alteration: &ColumnAlteration) -> Vec<String> {
        let helper = self.helper();
        let mut sql = format!(
            "ALTER TABLE {} ALTER COLUMN {} {}",
            helper.delimit_name(table),
            helper.delimit_identifier(column),
            alteration.store_type
        );
        sql.push_str(if alteration.nullable { " NULL" } else { " NOT NULL" });
        let mut statements = vec![sql];
        if let Some(default) = &alteration.default {
            statements.push(format!(
                "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
                helper.delimit_name(table),
                helper.delimit_identifier(column),
                default
            ));
        }
        statements
    }

    fn drop_index_sql(&self, table: &QualifiedName, name: &str) -> String {
        format!(
            "DROP INDEX {} ON {}",
            self.helper.delimit_identifier(name),
            self.helper.delimit_name(table)
        )
    }

    fn ensure_schema_sql(&self, schema: &str) -> String {
        format!("CREATE SCHEMA {}", self.helper.delimit_identifier(schema))
    }

    fn history_exists_sql(&self, table: &QualifiedName) -> String {
        let mut sql = format!(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = {}",
            self.helper.string_literal(&table.name)
        );
        if let Some(schema) = &table.schema {
            sql.push_str(&format!(" AND table_schema = {}", self.helper.string_literal(schema)));
        }
        sql
    }

    fn interpret_exists_result(&self, value: &Value) -> bool {
        match value {
            Value::Int(i) => *i > 0,
            Value::Bool(b) => *b,
            _ => false,
        }
    }

    fn create_if_not_exists_script(&self, table: &QualifiedName, create_script: &str) -> String {
        format!(
            "IF NOT EXISTS ({})\nBEGIN\n{}END;\n",
            self.history_exists_sql(table).replacen("SELECT COUNT(*)", "SELECT *", 1),
            create_script
        )
    }

    fn begin_if_not_exists(&self, table: &QualifiedName, id_column: &str, migration_id: &str) -> String {
        format!(
            "IF NOT EXISTS({})\nBEGIN\n",
            self.history_probe(table, id_column, migration_id)
        )
    }

    fn begin_if_exists(&self, table: &QualifiedName, id_column: &str, migration_id: &str) -> String {
        format!("IF EXISTS({})\nBEGIN\n", self.history_probe(table, id_column, migration_id))
    }

    fn end_if(&self) -> String {
        "END;\n".to_string()
    }
}
