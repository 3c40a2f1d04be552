//! Migration operations.
//!
//! Each variant carries exactly what is needed to apply or render it. Data
//! operations (`Insert`, `Update`, `Delete`) can be turned into
//! [`ModificationCommand`]s so they share the update pipeline's dependency
//! ordering.

use serde::{Deserialize, Serialize};

use crate::schema::{Column, ForeignKey, Index, PrimaryKey, QualifiedName, UniqueConstraint};
use crate::update::{ColumnModification, EntityState, ModificationCommand, UpdateError};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsureSchemaOperation {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTableOperation {
    pub table: QualifiedName,
    pub columns: Vec<Column>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<PrimaryKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unique_constraints: Vec<UniqueConstraint>,
    /// Foreign keys created inline; the rest are separate `AddForeignKey`s.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropTableOperation {
    pub table: QualifiedName,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenameTableOperation {
    pub table: QualifiedName,
    pub new_name: QualifiedName,
}

/// Table-level annotation change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlterTableOperation {
    pub table: QualifiedName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddColumnOperation {
    pub table: QualifiedName,
    pub column: Column,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropColumnOperation {
    pub table: QualifiedName,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlterColumnOperation {
    pub table: QualifiedName,
    pub column: Column,
    pub old_column: Column,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenameColumnOperation {
    pub table: QualifiedName,
    pub name: String,
    pub new_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddPrimaryKeyOperation {
    pub table: QualifiedName,
    pub primary_key: PrimaryKey,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropPrimaryKeyOperation {
    pub table: QualifiedName,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddUniqueConstraintOperation {
    pub table: QualifiedName,
    pub constraint: UniqueConstraint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropUniqueConstraintOperation {
    pub table: QualifiedName,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddForeignKeyOperation {
    pub table: QualifiedName,
    pub foreign_key: ForeignKey,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropForeignKeyOperation {
    pub table: QualifiedName,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateIndexOperation {
    pub table: QualifiedName,
    pub index: Index,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropIndexOperation {
    pub table: QualifiedName,
    pub name: String,
}

/// Insert one or more rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertOperation {
    pub table: QualifiedName,
    pub columns: Vec<String>,
    pub values: Vec<Vec<Value>>,
}

/// Update rows located by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateOperation {
    pub table: QualifiedName,
    pub key_columns: Vec<String>,
    pub key_values: Vec<Vec<Value>>,
    pub columns: Vec<String>,
    pub values: Vec<Vec<Value>>,
}

/// Delete rows located by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteOperation {
    pub table: QualifiedName,
    pub key_columns: Vec<String>,
    pub key_values: Vec<Vec<Value>>,
}

/// Raw SQL passed through unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlOperation {
    pub sql: String,
    #[serde(default)]
    pub suppress_transaction: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MigrationOperation {
    EnsureSchema(EnsureSchemaOperation),
    CreateTable(CreateTableOperation),
    DropTable(DropTableOperation),
    RenameTable(RenameTableOperation),
    AlterTable(AlterTableOperation),
    AddColumn(AddColumnOperation),
    DropColumn(DropColumnOperation),
    AlterColumn(AlterColumnOperation),
    RenameColumn(RenameColumnOperation),
    AddPrimaryKey(AddPrimaryKeyOperation),
    DropPrimaryKey(DropPrimaryKeyOperation),
    AddUniqueConstraint(AddUniqueConstraintOperation),
    DropUniqueConstraint(DropUniqueConstraintOperation),
    AddForeignKey(AddForeignKeyOperation),
    DropForeignKey(DropForeignKeyOperation),
    CreateIndex(CreateIndexOperation),
    DropIndex(DropIndexOperation),
    Insert(InsertOperation),
    Update(UpdateOperation),
    Delete(DeleteOperation),
    Sql(SqlOperation),
}

impl MigrationOperation {
    pub fn kind(&self) -> &'static str {
        match self {
            MigrationOperation::EnsureSchema(_) => "EnsureSchema",
            MigrationOperation::CreateTable(_) => "CreateTable",
            MigrationOperation::DropTable(_) => "DropTable",
            MigrationOperation::RenameTable(_) => "RenameTable",
            MigrationOperation::AlterTable(_) => "AlterTable",
            MigrationOperation::AddColumn(_) => "AddColumn",
            MigrationOperation::DropColumn(_) => "DropColumn",
            MigrationOperation::AlterColumn(_) => "AlterColumn",
            MigrationOperation::RenameColumn(_) => "RenameColumn",
            MigrationOperation::AddPrimaryKey(_) => "AddPrimaryKey",
            MigrationOperation::DropPrimaryKey(_) => "DropPrimaryKey",
            MigrationOperation::AddUniqueConstraint(_) => "AddUniqueConstraint",
            MigrationOperation::DropUniqueConstraint(_) => "DropUniqueConstraint",
            MigrationOperation::AddForeignKey(_) => "AddForeignKey",
            MigrationOperation::DropForeignKey(_) => "DropForeignKey",
            MigrationOperation::CreateIndex(_) => "CreateIndex",
            MigrationOperation::DropIndex(_) => "DropIndex",
            MigrationOperation::Insert(_) => "Insert",
            MigrationOperation::Update(_) => "Update",
            MigrationOperation::Delete(_) => "Delete",
            MigrationOperation::Sql(_) => "Sql",
        }
    }

    /// The table the operation applies to, if any.
    pub fn table(&self) -> Option<&QualifiedName> {
        match self {
            MigrationOperation::EnsureSchema(_) | MigrationOperation::Sql(_) => None,
            MigrationOperation::CreateTable(op) => Some(&op.table),
            MigrationOperation::DropTable(op) => Some(&op.table),
            MigrationOperation::RenameTable(op) => Some(&op.table),
            MigrationOperation::AlterTable(op) => Some(&op.table),
            MigrationOperation::AddColumn(op) => Some(&op.table),
            MigrationOperation::DropColumn(op) => Some(&op.table),
            MigrationOperation::AlterColumn(op) => Some(&op.table),
            MigrationOperation::RenameColumn(op) => Some(&op.table),
            MigrationOperation::AddPrimaryKey(op) => Some(&op.table),
            MigrationOperation::DropPrimaryKey(op) => Some(&op.table),
            MigrationOperation::AddUniqueConstraint(op) => Some(&op.table),
            MigrationOperation::DropUniqueConstraint(op) => Some(&op.table),
            MigrationOperation::AddForeignKey(op) => Some(&op.table),
            MigrationOperation::DropForeignKey(op) => Some(&op.table),
            MigrationOperation::CreateIndex(op) => Some(&op.table),
            MigrationOperation::DropIndex(op) => Some(&op.table),
            MigrationOperation::Insert(op) => Some(&op.table),
            MigrationOperation::Update(op) => Some(&op.table),
            MigrationOperation::Delete(op) => Some(&op.table),
        }
    }

    /// Operations that lose data when applied.
    pub fn is_destructive(&self) -> bool {
        match self {
            MigrationOperation::DropTable(_) | MigrationOperation::DropColumn(_) => true,
            MigrationOperation::AlterColumn(op) => {
                op.old_column.nullable && !op.column.nullable
                    || op.old_column.logical_type != op.column.logical_type
                    || op.old_column.store_type != op.column.store_type
                    || match (op.column.max_length, op.old_column.max_length) {
                        (Some(new), Some(old)) => new < old,
                        (Some(_), None) => true,
                        _ => false,
                    }
            }
            _ => false,
        }
    }

    pub fn is_data_operation(&self) -> bool {
        matches!(
            self,
            MigrationOperation::Insert(_) | MigrationOperation::Update(_) | MigrationOperation::Delete(_)
        )
    }

    /// Modification commands for a data operation, one per row; empty for
    /// schema operations.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::EmptyCommand`] for a row without columns.
    pub fn to_modification_commands(&self) -> Result<Vec<ModificationCommand>, UpdateError> {
        match self {
            MigrationOperation::Insert(op) => op.to_modification_commands(),
            MigrationOperation::Update(op) => op.to_modification_commands(),
            MigrationOperation::Delete(op) => op.to_modification_commands(),
            _ => Ok(Vec::new()),
        }
    }
}

impl InsertOperation {
    pub fn to_modification_commands(&self) -> Result<Vec<ModificationCommand>, UpdateError> {
        self.values
            .iter()
            .map(|row| {
                let modifications = self
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(column, value)| ColumnModification::new(column.as_str()).key().write(value.clone()))
                    .collect();
                ModificationCommand::new(self.table.clone(), EntityState::Added, modifications)
            })
            .collect()
    }
}

impl UpdateOperation {
    pub fn to_modification_commands(&self) -> Result<Vec<ModificationCommand>, UpdateError> {
        self.key_values
            .iter()
            .zip(&self.values)
            .map(|(keys, values)| {
                let mut modifications = key_conditions(&self.key_columns, keys);
                modifications.extend(
                    self.columns
                        .iter()
                        .zip(values)
                        .map(|(column, value)| ColumnModification::new(column.as_str()).write(value.clone())),
                );
                ModificationCommand::new(self.table.clone(), EntityState::Modified, modifications)
            })
            .collect()
    }
}

impl DeleteOperation {
    pub fn to_modification_commands(&self) -> Result<Vec<ModificationCommand>, UpdateError> {
        self.key_values
            .iter()
            .map(|keys| {
                ModificationCommand::new(
                    self.table.clone(),
                    EntityState::Deleted,
                    key_conditions(&self.key_columns, keys),
                )
            })
            .collect()
    }
}

fn key_conditions(columns: &[String], values: &[Value]) -> Vec<ColumnModification> {
    columns
        .iter()
        .zip(values)
        .map(|(column, value)| ColumnModification::new(column.as_str()).key().condition(value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_columns_are_written_keys() {
        let op = InsertOperation {
            table: QualifiedName::from("Blogs"),
            columns: vec!["Id".into(), "Url".into()],
            values: vec![
                vec![Value::Int(1), Value::from("a")],
                vec![Value::Int(2), Value::from("b")],
            ],
        };
        let commands = op.to_modification_commands().unwrap();
        assert_eq!(commands.len(), 2);
        let first = &commands[0];
        assert_eq!(first.state(), EntityState::Added);
        assert!(first.column_modifications().iter().all(|m| m.is_write() && m.is_key()));
        assert!(first.column_modifications().iter().all(|m| !m.is_read() && !m.is_condition()));
    }

    #[test]
    fn test_update_splits_keys_and_values() {
        let op = UpdateOperation {
            table: QualifiedName::from("Blogs"),
            key_columns: vec!["Id".into()],
            key_values: vec![vec![Value::Int(1)]],
            columns: vec!["Url".into()],
            values: vec![vec![Value::from("c")]],
        };
        let command = op.to_modification_commands().unwrap().remove(0);
        assert_eq!(command.key_modifications().count(), 1);
        assert_eq!(command.condition_modifications().count(), 1);
        let value = command.value_modifications().next().unwrap();
        assert!(!value.is_key() && !value.is_condition());
    }

    #[test]
    fn test_delete_uses_key_conditions() {
        let op = MigrationOperation::Delete(DeleteOperation {
            table: QualifiedName::from("Blogs"),
            key_columns: vec!["Id".into()],
            key_values: vec![vec![Value::Int(1)]],
        });
        let command = op.to_modification_commands().unwrap().remove(0);
        assert_eq!(command.to_string(), "Delete Blogs {Id: 1}");
        assert!(command.validate().is_ok());
    }

    #[test]
    fn test_destructive_changes() {
        let table = QualifiedName::from("Blogs");
        let drop = MigrationOperation::DropColumn(DropColumnOperation { table: table.clone(), name: "Url".into() });
        assert!(drop.is_destructive());
        let widen = MigrationOperation::AlterColumn(AlterColumnOperation {
            table,
            column: Column::new("Url", "string").nullable(),
            old_column: Column::new("Url", "string"),
        });
        assert!(!widen.is_destructive());
    }

    #[test]
    fn test_serialized_tag() {
        let op = MigrationOperation::EnsureSchema(EnsureSchemaOperation { name: "sales".into() });
        let json = serde_json::to_string(&op).unwrap();
        assert_eq!(json, r#"{"kind":"ensure_schema","name":"sales"}"#);
    }
}
