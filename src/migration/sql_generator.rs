//! DDL rendering for migration operations.
//!
//! Each operation kind has one render routine; [`MigrationsSqlGenerator::generate`]
//! dispatches on the kind and collects the resulting statements into
//! [`MigrationCommand`]s. Identifiers and literals always go through the
//! dialect's [`SqlGenerationHelper`](crate::sql::SqlGenerationHelper).

use std::sync::Arc;

use crate::migration::operations::*;
use crate::schema::{Column, DefaultTypeMapper, ForeignKey, QualifiedName, ReferentialAction, TypeMapper};
use crate::sql::{ColumnAlteration, PostgresDialect, SqlDialect, SqlGenerationError};
use crate::value::Value;

/// One executable statement of a migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationCommand {
    /// Statement text including its terminator and trailing newline.
    pub command_text: String,
    /// The statement cannot run inside a transaction.
    pub suppress_transaction: bool,
}

/// Accumulates statement text and cuts it into commands.
#[derive(Debug, Default)]
struct MigrationCommandListBuilder {
    commands: Vec<MigrationCommand>,
    current: String,
}

impl MigrationCommandListBuilder {
    fn append(&mut self, text: &str) -> &mut Self {
        self.current.push_str(text);
        self
    }

    fn append_line(&mut self, text: &str) -> &mut Self {
        self.current.push_str(text);
        self.current.push('\n');
        self
    }

    fn end_command(&mut self, terminator: &str, suppress_transaction: bool) {
        if self.current.is_empty() {
            return;
        }
        let mut command_text = std::mem::take(&mut self.current);
        command_text.push_str(terminator);
        command_text.push('\n');
        self.commands.push(MigrationCommand {
            command_text,
            suppress_transaction,
        });
    }

    fn statement(&mut self, sql: &str, terminator: &str) {
        self.append(sql).end_command(terminator, false);
    }

    fn build(self) -> Vec<MigrationCommand> {
        self.commands
    }
}

/// Renders migration operations to DDL (and literal DML for data operations).
#[derive(Debug, Clone)]
pub struct MigrationsSqlGenerator {
    dialect: Arc<dyn SqlDialect>,
    type_mapper: Arc<dyn TypeMapper>,
}

impl Default for MigrationsSqlGenerator {
    fn default() -> Self {
        Self::new(Arc::new(PostgresDialect::new()), Arc::new(DefaultTypeMapper::new()))
    }
}

impl MigrationsSqlGenerator {
    pub fn new(dialect: Arc<dyn SqlDialect>, type_mapper: Arc<dyn TypeMapper>) -> Self {
        Self { dialect, type_mapper }
    }

    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    /// Render `operations` in order.
    ///
    /// # Errors
    ///
    /// - [`SqlGenerationError::Schema`] for a column whose type cannot be mapped
    /// - [`SqlGenerationError::ValueCountMismatch`] for a data row of the wrong width
    /// - [`SqlGenerationError::MissingKey`] for an update or delete without key columns
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(operations = operations.len())))]
    pub fn generate(&self, operations: &[MigrationOperation]) -> Result<Vec<MigrationCommand>, SqlGenerationError> {
        let mut builder = MigrationCommandListBuilder::default();
        for operation in operations {
            self.render(operation, &mut builder)?;
        }
        let commands = builder.build();
        log::debug!(
            "Rendered {} operation(s) into {} command(s) for {}",
            operations.len(),
            commands.len(),
            self.dialect.name()
        );
        Ok(commands)
    }

    /// Commands of [`generate`](Self::generate) joined into one script, each
    /// followed by a blank line.
    ///
    /// # Errors
    ///
    /// Same as [`generate`](Self::generate).
    pub fn generate_script(&self, operations: &[MigrationOperation]) -> Result<String, SqlGenerationError> {
        let batch_terminator = self.dialect.helper().batch_terminator();
        let mut script = String::new();
        for command in self.generate(operations)? {
            script.push_str(&command.command_text);
            script.push('\n');
            if !batch_terminator.is_empty() {
                script.push_str(batch_terminator);
                script.push_str("\n\n");
            }
        }
        Ok(script)
    }

    fn render(&self, operation: &MigrationOperation, builder: &mut MigrationCommandListBuilder) -> Result<(), SqlGenerationError> {
        match operation {
            MigrationOperation::EnsureSchema(op) => self.ensure_schema(op, builder),
            MigrationOperation::CreateTable(op) => self.create_table(op, builder),
            MigrationOperation::DropTable(op) => self.drop_table(op, builder),
            MigrationOperation::RenameTable(op) => self.rename_table(op, builder),
            MigrationOperation::AlterTable(op) => self.alter_table(op, builder),
            MigrationOperation::AddColumn(op) => self.add_column(op, builder),
            MigrationOperation::DropColumn(op) => self.drop_column(op, builder),
            MigrationOperation::AlterColumn(op) => self.alter_column(op, builder),
            MigrationOperation::RenameColumn(op) => self.rename_column(op, builder),
            MigrationOperation::AddPrimaryKey(op) => self.add_primary_key(op, builder),
            MigrationOperation::DropPrimaryKey(op) => self.drop_constraint(&op.table, &op.name, builder),
            MigrationOperation::AddUniqueConstraint(op) => self.add_unique_constraint(op, builder),
            MigrationOperation::DropUniqueConstraint(op) => self.drop_constraint(&op.table, &op.name, builder),
            MigrationOperation::AddForeignKey(op) => self.add_foreign_key(op, builder),
            MigrationOperation::DropForeignKey(op) => self.drop_constraint(&op.table, &op.name, builder),
            MigrationOperation::CreateIndex(op) => self.create_index(op, builder),
            MigrationOperation::DropIndex(op) => self.drop_index(op, builder),
            MigrationOperation::Insert(op) => self.insert(op, builder),
            MigrationOperation::Update(op) => self.update(op, builder),
            MigrationOperation::Delete(op) => self.delete(op, builder),
            MigrationOperation::Sql(op) => self.sql(op, builder),
        }
    }

    fn terminator(&self) -> &'static str {
        self.dialect.helper().statement_terminator()
    }

    fn name(&self, table: &QualifiedName) -> String {
        self.dialect.helper().delimit_name(table)
    }

    fn ident(&self, identifier: &str) -> String {
        self.dialect.helper().delimit_identifier(identifier)
    }

    fn column_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn default_clause(&self, column: &Column) -> Option<String> {
        column
            .default_sql
            .clone()
            .or_else(|| column.default_value.as_ref().map(|v| self.dialect.literal(v)))
    }

    fn column_definition(&self, column: &Column) -> Result<String, SqlGenerationError> {
        let mut sql = format!("{} {}", self.ident(&column.name), self.type_mapper.column_type(column)?);
        if let Some(expression) = &column.computed_sql {
            sql.push_str(&self.dialect.computed_column_clause(expression));
            return Ok(sql);
        }
        if column.identity {
            sql.push_str(self.dialect.identity_column_clause());
        }
        sql.push_str(if column.nullable { " NULL" } else { " NOT NULL" });
        if let Some(default) = self.default_clause(column) {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default);
        }
        Ok(sql)
    }

    fn foreign_key_clause(&self, fk: &ForeignKey) -> String {
        let mut sql = format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            self.ident(&fk.name),
            self.column_list(&fk.columns),
            self.name(&fk.principal),
            self.column_list(&fk.principal_columns)
        );
        if fk.on_delete != ReferentialAction::NoAction {
            sql.push_str(" ON DELETE ");
            sql.push_str(fk.on_delete.as_sql());
        }
        sql
    }

    fn column_comment(&self, table: &QualifiedName, column: &Column, builder: &mut MigrationCommandListBuilder) {
        if let Some(sql) = self
            .dialect
            .column_comment_sql(table, &column.name, column.comment.as_deref())
        {
            builder.statement(&sql, self.terminator());
        }
    }

    fn ensure_schema(&self, op: &EnsureSchemaOperation, builder: &mut MigrationCommandListBuilder) -> Result<(), SqlGenerationError> {
        builder.statement(&self.dialect.ensure_schema_sql(&op.name), self.terminator());
        Ok(())
    }

    fn create_table(&self, op: &CreateTableOperation, builder: &mut MigrationCommandListBuilder) -> Result<(), SqlGenerationError> {
        let mut lines = Vec::with_capacity(op.columns.len() + 2);
        for column in &op.columns {
            lines.push(self.column_definition(column)?);
        }
        if let Some(pk) = &op.primary_key {
            lines.push(format!(
                "CONSTRAINT {} PRIMARY KEY ({})",
                self.ident(&pk.name),
                self.column_list(&pk.columns)
            ));
        }
        for unique in &op.unique_constraints {
            lines.push(format!(
                "CONSTRAINT {} UNIQUE ({})",
                self.ident(&unique.name),
                self.column_list(&unique.columns)
            ));
        }
        for fk in &op.foreign_keys {
            lines.push(self.foreign_key_clause(fk));
        }

        builder.append_line(&format!("CREATE TABLE {} (", self.name(&op.table)));
        for (i, line) in lines.iter().enumerate() {
            builder.append("    ").append(line);
            builder.append(if i + 1 < lines.len() { ",\n" } else { "\n" });
        }
        builder.append(")").end_command(self.terminator(), false);

        if op.comment.is_some() {
            if let Some(sql) = self.dialect.table_comment_sql(&op.table, op.comment.as_deref()) {
                builder.statement(&sql, self.terminator());
            }
        }
        for column in op.columns.iter().filter(|c| c.comment.is_some()) {
            self.column_comment(&op.table, column, builder);
        }
        Ok(())
    }

    fn drop_table(&self, op: &DropTableOperation, builder: &mut MigrationCommandListBuilder) -> Result<(), SqlGenerationError> {
        builder.statement(&format!("DROP TABLE {}", self.name(&op.table)), self.terminator());
        Ok(())
    }

    fn rename_table(&self, op: &RenameTableOperation, builder: &mut MigrationCommandListBuilder) -> Result<(), SqlGenerationError> {
        for sql in self.dialect.rename_table_sql(&op.table, &op.new_name) {
            builder.statement(&sql, self.terminator());
        }
        Ok(())
    }

    fn alter_table(&self, op: &AlterTableOperation, builder: &mut MigrationCommandListBuilder) -> Result<(), SqlGenerationError> {
        match self.dialect.table_comment_sql(&op.table, op.comment.as_deref()) {
            Some(sql) => builder.statement(&sql, self.terminator()),
            None => log::debug!("{} has no table comments; skipping AlterTable on {}", self.dialect.name(), op.table),
        }
        Ok(())
    }

    fn add_column(&self, op: &AddColumnOperation, builder: &mut MigrationCommandListBuilder) -> Result<(), SqlGenerationError> {
        let sql = format!(
            "ALTER TABLE {} ADD {}",
            self.name(&op.table),
            self.column_definition(&op.column)?
        );
        builder.statement(&sql, self.terminator());
        if op.column.comment.is_some() {
            self.column_comment(&op.table, &op.column, builder);
        }
        Ok(())
    }

    fn drop_column(&self, op: &DropColumnOperation, builder: &mut MigrationCommandListBuilder) -> Result<(), SqlGenerationError> {
        let sql = format!("ALTER TABLE {} DROP COLUMN {}", self.name(&op.table), self.ident(&op.name));
        builder.statement(&sql, self.terminator());
        Ok(())
    }

    fn alter_column(&self, op: &AlterColumnOperation, builder: &mut MigrationCommandListBuilder) -> Result<(), SqlGenerationError> {
        let column = &op.column;
        let old = &op.old_column;
        let definition_changed = self.type_mapper.column_type(column)? != self.type_mapper.column_type(old)?
            || column.nullable != old.nullable
            || self.default_clause(column) != self.default_clause(old)
            || column.identity != old.identity
            || column.computed_sql != old.computed_sql;

        if definition_changed {
            let alteration = ColumnAlteration {
                store_type: self.type_mapper.column_type(column)?,
                nullable: column.nullable,
                default: self.default_clause(column),
                identity: (column.identity != old.identity).then_some(column.identity),
            };
            for sql in self.dialect.alter_column_sql(&op.table, &column.name, &alteration) {
                builder.statement(&sql, self.terminator());
            }
        }
        if column.comment != old.comment {
            self.column_comment(&op.table, column, builder);
        }
        Ok(())
    }

    fn rename_column(&self, op: &RenameColumnOperation, builder: &mut MigrationCommandListBuilder) -> Result<(), SqlGenerationError> {
        builder.statement(
            &self.dialect.rename_column_sql(&op.table, &op.name, &op.new_name),
            self.terminator(),
        );
        Ok(())
    }

    fn add_primary_key(&self, op: &AddPrimaryKeyOperation, builder: &mut MigrationCommandListBuilder) -> Result<(), SqlGenerationError> {
        let sql = format!(
            "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY ({})",
            self.name(&op.table),
            self.ident(&op.primary_key.name),
            self.column_list(&op.primary_key.columns)
        );
        builder.statement(&sql, self.terminator());
        Ok(())
    }

    fn add_unique_constraint(
        &self,
        op: &AddUniqueConstraintOperation,
        builder: &mut MigrationCommandListBuilder,
    ) -> Result<(), SqlGenerationError> {
        let sql = format!(
            "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({})",
            self.name(&op.table),
            self.ident(&op.constraint.name),
            self.column_list(&op.constraint.columns)
        );
        builder.statement(&sql, self.terminator());
        Ok(())
    }

    fn add_foreign_key(&self, op: &AddForeignKeyOperation, builder: &mut MigrationCommandListBuilder) -> Result<(), SqlGenerationError> {
        let sql = format!(
            "ALTER TABLE {} ADD {}",
            self.name(&op.table),
            self.foreign_key_clause(&op.foreign_key)
        );
        builder.statement(&sql, self.terminator());
        Ok(())
    }

    fn drop_constraint(
        &self,
        table: &QualifiedName,
        name: &str,
        builder: &mut MigrationCommandListBuilder,
    ) -> Result<(), SqlGenerationError> {
        let sql = format!("ALTER TABLE {} DROP CONSTRAINT {}", self.name(table), self.ident(name));
        builder.statement(&sql, self.terminator());
        Ok(())
    }

    fn create_index(&self, op: &CreateIndexOperation, builder: &mut MigrationCommandListBuilder) -> Result<(), SqlGenerationError> {
        let index = &op.index;
        let mut sql = format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            self.ident(&index.name),
            self.name(&op.table),
            self.column_list(&index.columns)
        );
        if let Some(filter) = &index.filter {
            sql.push_str(" WHERE ");
            sql.push_str(filter);
        }
        builder.statement(&sql, self.terminator());
        Ok(())
    }

    fn drop_index(&self, op: &DropIndexOperation, builder: &mut MigrationCommandListBuilder) -> Result<(), SqlGenerationError> {
        builder.statement(&self.dialect.drop_index_sql(&op.table, &op.name), self.terminator());
        Ok(())
    }

    fn check_width(
        &self,
        operation: &'static str,
        table: &QualifiedName,
        row: usize,
        columns: usize,
        values: usize,
    ) -> Result<(), SqlGenerationError> {
        if columns == values {
            return Ok(());
        }
        Err(SqlGenerationError::ValueCountMismatch {
            operation,
            table: table.to_string(),
            row,
            columns,
            values,
        })
    }

    fn key_predicate(&self, columns: &[String], values: &[Value]) -> String {
        columns
            .iter()
            .zip(values)
            .map(|(column, value)| match value {
                Value::Null => format!("{} IS NULL", self.ident(column)),
                value => format!("{} = {}", self.ident(column), self.dialect.literal(value)),
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    fn insert(&self, op: &InsertOperation, builder: &mut MigrationCommandListBuilder) -> Result<(), SqlGenerationError> {
        if op.values.is_empty() {
            return Ok(());
        }
        let mut rows = Vec::with_capacity(op.values.len());
        for (i, row) in op.values.iter().enumerate() {
            self.check_width("Insert", &op.table, i, op.columns.len(), row.len())?;
            let literals: Vec<String> = row.iter().map(|v| self.dialect.literal(v)).collect();
            rows.push(format!("({})", literals.join(", ")));
        }
        builder
            .append_line(&format!(
                "INSERT INTO {} ({})",
                self.name(&op.table),
                self.column_list(&op.columns)
            ))
            .append("VALUES ")
            .append(&rows.join(",\n"))
            .end_command(self.terminator(), false);
        Ok(())
    }

    fn update(&self, op: &UpdateOperation, builder: &mut MigrationCommandListBuilder) -> Result<(), SqlGenerationError> {
        if op.key_columns.is_empty() {
            return Err(SqlGenerationError::MissingKey {
                operation: "Update",
                table: op.table.to_string(),
            });
        }
        if op.key_values.len() != op.values.len() {
            return Err(SqlGenerationError::RowCountMismatch {
                operation: "Update",
                table: op.table.to_string(),
                keys: op.key_values.len(),
                rows: op.values.len(),
            });
        }
        for (i, (keys, values)) in op.key_values.iter().zip(&op.values).enumerate() {
            self.check_width("Update", &op.table, i, op.key_columns.len(), keys.len())?;
            self.check_width("Update", &op.table, i, op.columns.len(), values.len())?;
            let assignments: Vec<String> = op
                .columns
                .iter()
                .zip(values)
                .map(|(column, value)| format!("{} = {}", self.ident(column), self.dialect.literal(value)))
                .collect();
            builder
                .append_line(&format!("UPDATE {} SET {}", self.name(&op.table), assignments.join(", ")))
                .append(&format!("WHERE {}", self.key_predicate(&op.key_columns, keys)))
                .end_command(self.terminator(), false);
        }
        Ok(())
    }

    fn delete(&self, op: &DeleteOperation, builder: &mut MigrationCommandListBuilder) -> Result<(), SqlGenerationError> {
        if op.key_columns.is_empty() {
            return Err(SqlGenerationError::MissingKey {
                operation: "Delete",
                table: op.table.to_string(),
            });
        }
        for (i, keys) in op.key_values.iter().enumerate() {
            self.check_width("Delete", &op.table, i, op.key_columns.len(), keys.len())?;
            builder
                .append_line(&format!("DELETE FROM {}", self.name(&op.table)))
                .append(&format!("WHERE {}", self.key_predicate(&op.key_columns, keys)))
                .end_command(self.terminator(), false);
        }
        Ok(())
    }

    fn sql(&self, op: &SqlOperation, builder: &mut MigrationCommandListBuilder) -> Result<(), SqlGenerationError> {
        let sql = op.sql.trim_end();
        let terminator = if sql.ends_with(self.terminator()) { "" } else { self.terminator() };
        builder.append(sql).end_command(terminator, op.suppress_transaction);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Index, PrimaryKey};
    use crate::sql::{GenericDialect, SqlGenerationHelper};

    fn generator() -> MigrationsSqlGenerator {
        MigrationsSqlGenerator::default()
    }

    fn texts(operations: &[MigrationOperation]) -> Vec<String> {
        generator()
            .generate(operations)
            .unwrap()
            .into_iter()
            .map(|c| c.command_text)
            .collect()
    }

    #[test]
    fn test_create_table() {
        let op = MigrationOperation::CreateTable(CreateTableOperation {
            table: QualifiedName::new(Some("blogging"), "Posts"),
            columns: vec![
                Column::new("Id", "int").identity(),
                Column::new("Title", "string").max_length(100),
                Column::new("BlogId", "int").nullable(),
            ],
            primary_key: Some(PrimaryKey {
                name: "PK_Posts".into(),
                columns: vec!["Id".into()],
            }),
            unique_constraints: Vec::new(),
            foreign_keys: vec![ForeignKey::new("FK_Posts_Blogs", ["BlogId"], "blogging.Blogs", ["Id"])
                .on_delete(ReferentialAction::Cascade)],
            comment: None,
        });
        assert_eq!(
            texts(&[op]),
            [concat!(
                "CREATE TABLE \"blogging\".\"Posts\" (\n",
                "    \"Id\" integer GENERATED BY DEFAULT AS IDENTITY NOT NULL,\n",
                "    \"Title\" character varying(100) NOT NULL,\n",
                "    \"BlogId\" integer NULL,\n",
                "    CONSTRAINT \"PK_Posts\" PRIMARY KEY (\"Id\"),\n",
                "    CONSTRAINT \"FK_Posts_Blogs\" FOREIGN KEY (\"BlogId\") REFERENCES \"blogging\".\"Blogs\" (\"Id\") ON DELETE CASCADE\n",
                ");\n"
            )]
        );
    }

    #[test]
    fn test_add_and_drop_column() {
        let table = QualifiedName::from("Orders");
        let ops = [
            MigrationOperation::AddColumn(AddColumnOperation {
                table: table.clone(),
                column: Column::new("Total2", "int").default_value(0),
            }),
            MigrationOperation::DropColumn(DropColumnOperation {
                table,
                name: "Total2".into(),
            }),
        ];
        assert_eq!(
            texts(&ops),
            [
                "ALTER TABLE \"Orders\" ADD \"Total2\" integer NOT NULL DEFAULT 0;\n",
                "ALTER TABLE \"Orders\" DROP COLUMN \"Total2\";\n",
            ]
        );
    }

    #[test]
    fn test_alter_column_postgres_statements() {
        let op = MigrationOperation::AlterColumn(AlterColumnOperation {
            table: "Orders".into(),
            column: Column::new("Total", "long").nullable(),
            old_column: Column::new("Total", "int"),
        });
        assert_eq!(
            texts(&[op]),
            [
                "ALTER TABLE \"Orders\" ALTER COLUMN \"Total\" TYPE bigint;\n",
                "ALTER TABLE \"Orders\" ALTER COLUMN \"Total\" DROP NOT NULL;\n",
                "ALTER TABLE \"Orders\" ALTER COLUMN \"Total\" DROP DEFAULT;\n",
            ]
        );
    }

    #[test]
    fn test_index_and_constraints() {
        let ops = [
            MigrationOperation::CreateIndex(CreateIndexOperation {
                table: "Blogs".into(),
                index: Index::new("IX_Blogs_Url", ["Url"]).unique().filter("\"Url\" IS NOT NULL"),
            }),
            MigrationOperation::DropForeignKey(DropForeignKeyOperation {
                table: "Posts".into(),
                name: "FK_Posts_Blogs".into(),
            }),
        ];
        assert_eq!(
            texts(&ops),
            [
                "CREATE UNIQUE INDEX \"IX_Blogs_Url\" ON \"Blogs\" (\"Url\") WHERE \"Url\" IS NOT NULL;\n",
                "ALTER TABLE \"Posts\" DROP CONSTRAINT \"FK_Posts_Blogs\";\n",
            ]
        );
    }

    #[test]
    fn test_data_operations_use_escaped_literals() {
        let ops = [
            MigrationOperation::Insert(InsertOperation {
                table: "Blogs".into(),
                columns: vec!["Id".into(), "Url".into()],
                values: vec![
                    vec![Value::Int(1), Value::from("it's")],
                    vec![Value::Int(2), Value::Null],
                ],
            }),
            MigrationOperation::Delete(DeleteOperation {
                table: "Blogs".into(),
                key_columns: vec!["Id".into()],
                key_values: vec![vec![Value::Int(2)]],
            }),
        ];
        assert_eq!(
            texts(&ops),
            [
                "INSERT INTO \"Blogs\" (\"Id\", \"Url\")\nVALUES (1, 'it''s'),\n(2, NULL);\n",
                "DELETE FROM \"Blogs\"\nWHERE \"Id\" = 2;\n",
            ]
        );
    }

    #[test]
    fn test_row_width_is_checked() {
        let op = MigrationOperation::Insert(InsertOperation {
            table: "Blogs".into(),
            columns: vec!["Id".into(), "Url".into()],
            values: vec![vec![Value::Int(1)]],
        });
        let err = generator().generate(&[op]).unwrap_err();
        assert!(matches!(err, SqlGenerationError::ValueCountMismatch { columns: 2, values: 1, .. }));
    }

    #[test]
    fn test_update_rows_must_pair_with_keys() {
        let op = MigrationOperation::Update(UpdateOperation {
            table: "Blogs".into(),
            key_columns: vec!["Id".into()],
            key_values: vec![vec![Value::Int(1)], vec![Value::Int(2)]],
            columns: vec!["Url".into()],
            values: vec![vec![Value::from("https://a.example")]],
        });
        let err = generator().generate(&[op]).unwrap_err();
        assert!(matches!(err, SqlGenerationError::RowCountMismatch { keys: 2, rows: 1, .. }));
    }

    #[test]
    fn test_raw_sql_keeps_transaction_flag() {
        let op = MigrationOperation::Sql(SqlOperation {
            sql: "VACUUM;".into(),
            suppress_transaction: true,
        });
        let commands = generator().generate(&[op]).unwrap();
        assert_eq!(commands[0].command_text, "VACUUM;\n");
        assert!(commands[0].suppress_transaction);
    }

    #[test]
    fn test_script_uses_batch_terminator() {
        let dialect = GenericDialect::new().with_helper(SqlGenerationHelper::bracketed());
        let generator = MigrationsSqlGenerator::new(Arc::new(dialect), Arc::new(DefaultTypeMapper::new()));
        let script = generator
            .generate_script(&[MigrationOperation::DropTable(DropTableOperation { table: "Blogs".into() })])
            .unwrap();
        assert_eq!(script, "DROP TABLE [Blogs];\n\nGO\n\n");
    }

    #[test]
    fn test_unmapped_type_is_an_error() {
        let op = MigrationOperation::AddColumn(AddColumnOperation {
            table: "Blogs".into(),
            column: Column::new("Shape", "geometry"),
        });
        assert!(matches!(generator().generate(&[op]), Err(SqlGenerationError::Schema(_))));
    }
}
