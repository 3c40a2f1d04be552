//! In-memory replay of migration operations against a snapshot.
//!
//! Used to check that a diff really transforms one snapshot into the other
//! and by tooling that wants the model a migration leaves behind. Seed rows
//! stand in for the table contents, so the keys, unique indexes and foreign
//! keys in force are checked against them after every write.

use std::collections::HashSet;

use crate::migration::operations::*;
use crate::schema::{ForeignKey, QualifiedName, SchemaError, SchemaSnapshot, SeedRow, Table};
use crate::value::Value;

impl SchemaSnapshot {
    /// Apply `operations` in order.
    ///
    /// Raw SQL and schema creation have no effect on the model.
    ///
    /// # Errors
    ///
    /// Returns the first operation that does not fit the snapshot, e.g. a
    /// drop of an unknown table, an update of a missing seed row or a write
    /// that leaves a row without its principal. Operations before it stay
    /// applied.
    pub fn apply(&mut self, operations: &[MigrationOperation]) -> Result<(), SchemaError> {
        for operation in operations {
            self.apply_one(operation)?;
            if let Some(table) = checked_table(operation) {
                self.check_rows(table)?;
            }
        }
        Ok(())
    }

    fn apply_one(&mut self, operation: &MigrationOperation) -> Result<(), SchemaError> {
        match operation {
            MigrationOperation::EnsureSchema(_) | MigrationOperation::Sql(_) => Ok(()),
            MigrationOperation::CreateTable(op) => {
                if self.table(&op.table).is_some() {
                    return Err(SchemaError::DuplicateTable(op.table.to_string()));
                }
                let mut table = Table::new(op.table.name.clone());
                table.schema = op.table.schema.clone();
                table.columns = op.columns.clone();
                table.primary_key = op.primary_key.clone();
                table.unique_constraints = op.unique_constraints.clone();
                table.foreign_keys = op.foreign_keys.clone();
                table.comment = op.comment.clone();
                self.tables.push(table);
                Ok(())
            }
            MigrationOperation::DropTable(op) => {
                let before = self.tables.len();
                self.tables.retain(|t| t.qualified_name() != op.table);
                if self.tables.len() == before {
                    return Err(SchemaError::UnknownTable(op.table.to_string()));
                }
                Ok(())
            }
            MigrationOperation::RenameTable(op) => self.rename_table(&op.table, &op.new_name),
            MigrationOperation::AlterTable(op) => {
                self.table_mut(&op.table)?.comment = op.comment.clone();
                Ok(())
            }
            MigrationOperation::AddColumn(op) => {
                let table = self.table_mut(&op.table)?;
                if table.find_column(&op.column.name).is_some() {
                    return Err(SchemaError::DuplicateColumn {
                        table: op.table.to_string(),
                        column: op.column.name.clone(),
                    });
                }
                table.columns.push(op.column.clone());
                Ok(())
            }
            MigrationOperation::DropColumn(op) => {
                let table = self.table_mut(&op.table)?;
                let position = column_position(table, &op.table, &op.name)?;
                table.columns.remove(position);
                for row in &mut table.seed_data {
                    row.values.remove(&op.name);
                }
                Ok(())
            }
            MigrationOperation::AlterColumn(op) => {
                let table = self.table_mut(&op.table)?;
                let position = column_position(table, &op.table, &op.column.name)?;
                table.columns[position] = op.column.clone();
                Ok(())
            }
            MigrationOperation::RenameColumn(op) => self.rename_column(&op.table, &op.name, &op.new_name),
            MigrationOperation::AddPrimaryKey(op) => {
                let table = self.table_mut(&op.table)?;
                if table.primary_key.is_some() {
                    return Err(SchemaError::PrimaryKeyExists(op.table.to_string()));
                }
                table.primary_key = Some(op.primary_key.clone());
                Ok(())
            }
            MigrationOperation::DropPrimaryKey(op) => {
                let table = self.table_mut(&op.table)?;
                match &table.primary_key {
                    Some(pk) if pk.name == op.name => {
                        table.primary_key = None;
                        Ok(())
                    }
                    _ => Err(unknown_constraint(&op.table, &op.name)),
                }
            }
            MigrationOperation::AddUniqueConstraint(op) => {
                self.table_mut(&op.table)?
                    .unique_constraints
                    .push(op.constraint.clone());
                Ok(())
            }
            MigrationOperation::DropUniqueConstraint(op) => {
                let table = self.table_mut(&op.table)?;
                remove_named(&mut table.unique_constraints, |u| u.name == op.name)
                    .ok_or_else(|| unknown_constraint(&op.table, &op.name))
            }
            MigrationOperation::AddForeignKey(op) => {
                self.table_mut(&op.table)?
                    .foreign_keys
                    .push(op.foreign_key.clone());
                Ok(())
            }
            MigrationOperation::DropForeignKey(op) => {
                let table = self.table_mut(&op.table)?;
                remove_named(&mut table.foreign_keys, |fk| fk.name == op.name)
                    .ok_or_else(|| unknown_constraint(&op.table, &op.name))
            }
            MigrationOperation::CreateIndex(op) => {
                self.table_mut(&op.table)?.indexes.push(op.index.clone());
                Ok(())
            }
            MigrationOperation::DropIndex(op) => {
                let table = self.table_mut(&op.table)?;
                remove_named(&mut table.indexes, |index| index.name == op.name)
                    .ok_or_else(|| unknown_constraint(&op.table, &op.name))
            }
            MigrationOperation::Insert(op) => {
                let table = self.table_mut(&op.table)?;
                for row in &op.values {
                    table.seed_data.push(
                        op.columns
                            .iter()
                            .cloned()
                            .zip(row.iter().cloned())
                            .collect::<SeedRow>(),
                    );
                }
                Ok(())
            }
            MigrationOperation::Update(op) => {
                let table = self.table_mut(&op.table)?;
                for (keys, values) in op.key_values.iter().zip(&op.values) {
                    let position = seed_position(table, &op.table, &op.key_columns, keys)?;
                    let row = &mut table.seed_data[position];
                    for (column, value) in op.columns.iter().zip(values) {
                        row.values.insert(column.clone(), value.clone());
                    }
                }
                Ok(())
            }
            MigrationOperation::Delete(op) => {
                let table = self.table_mut(&op.table)?;
                for keys in &op.key_values {
                    let position = seed_position(table, &op.table, &op.key_columns, keys)?;
                    table.seed_data.remove(position);
                }
                Ok(())
            }
        }
    }

    /// Check the rows of `name` against its unique column sets and every
    /// foreign key it takes part in, on either side.
    fn check_rows(&self, name: &QualifiedName) -> Result<(), SchemaError> {
        let Some(table) = self.table(name) else {
            return Ok(());
        };
        for (constraint, columns) in unique_sets(table) {
            let mut seen = HashSet::new();
            for values in table.seed_data.iter().filter_map(|row| row.key(columns)) {
                if !seen.insert(values.clone()) {
                    return Err(SchemaError::ConstraintViolation {
                        table: name.to_string(),
                        constraint: constraint.to_string(),
                        detail: format!("more than one row has {}", describe(columns, &values)),
                    });
                }
            }
        }
        for fk in &table.foreign_keys {
            self.check_references(table, fk)?;
        }
        for dependent in &self.tables {
            for fk in dependent.foreign_keys.iter().filter(|fk| fk.principal == *name) {
                self.check_references(dependent, fk)?;
            }
        }
        Ok(())
    }

    fn check_references(&self, dependent: &Table, fk: &ForeignKey) -> Result<(), SchemaError> {
        let Some(principal) = self.table(&fk.principal) else {
            return Ok(());
        };
        for values in dependent.seed_data.iter().filter_map(|row| row.key(&fk.columns)) {
            let found = principal
                .seed_data
                .iter()
                .any(|row| row.key(&fk.principal_columns).as_ref() == Some(&values));
            if !found {
                return Err(SchemaError::ConstraintViolation {
                    table: dependent.qualified_name().to_string(),
                    constraint: fk.name.clone(),
                    detail: format!(
                        "no row of '{}' has {}",
                        fk.principal,
                        describe(&fk.principal_columns, &values)
                    ),
                });
            }
        }
        Ok(())
    }

    fn rename_table(&mut self, old: &QualifiedName, new: &QualifiedName) -> Result<(), SchemaError> {
        if old != new && self.table(new).is_some() {
            return Err(SchemaError::DuplicateTable(new.to_string()));
        }
        let table = self.table_mut(old)?;
        table.name = new.name.clone();
        table.schema = new.schema.clone();

        for fk in self.tables.iter_mut().flat_map(|t| t.foreign_keys.iter_mut()) {
            if fk.principal == *old {
                fk.principal = new.clone();
            }
        }
        Ok(())
    }

    fn rename_column(&mut self, table_name: &QualifiedName, old: &str, new: &str) -> Result<(), SchemaError> {
        let table = self.table_mut(table_name)?;
        if table.find_column(new).is_some() {
            return Err(SchemaError::DuplicateColumn {
                table: table_name.to_string(),
                column: new.to_string(),
            });
        }
        let position = column_position(table, table_name, old)?;
        table.columns[position].name = new.to_string();

        let rename = |columns: &mut Vec<String>| {
            for column in columns.iter_mut().filter(|c| c.as_str() == old) {
                *column = new.to_string();
            }
        };
        if let Some(pk) = &mut table.primary_key {
            rename(&mut pk.columns);
        }
        table.unique_constraints.iter_mut().for_each(|u| rename(&mut u.columns));
        table.indexes.iter_mut().for_each(|i| rename(&mut i.columns));
        table.foreign_keys.iter_mut().for_each(|fk| rename(&mut fk.columns));
        for row in &mut table.seed_data {
            if let Some(value) = row.values.remove(old) {
                row.values.insert(new.to_string(), value);
            }
        }

        for fk in self.tables.iter_mut().flat_map(|t| t.foreign_keys.iter_mut()) {
            if fk.principal == *table_name {
                rename(&mut fk.principal_columns);
            }
        }
        Ok(())
    }
}

/// Table whose rows must be rechecked after `operation`.
fn checked_table(operation: &MigrationOperation) -> Option<&QualifiedName> {
    match operation {
        MigrationOperation::Insert(op) => Some(&op.table),
        MigrationOperation::Update(op) => Some(&op.table),
        MigrationOperation::Delete(op) => Some(&op.table),
        MigrationOperation::AddPrimaryKey(op) => Some(&op.table),
        MigrationOperation::AddUniqueConstraint(op) => Some(&op.table),
        MigrationOperation::AddForeignKey(op) => Some(&op.table),
        MigrationOperation::CreateIndex(op) if op.index.unique => Some(&op.table),
        _ => None,
    }
}

fn unique_sets(table: &Table) -> Vec<(&str, &[String])> {
    table
        .primary_key
        .iter()
        .map(|pk| (pk.name.as_str(), pk.columns.as_slice()))
        .chain(
            table
                .unique_constraints
                .iter()
                .map(|u| (u.name.as_str(), u.columns.as_slice())),
        )
        .chain(
            table
                .indexes
                .iter()
                .filter(|i| i.unique && i.filter.is_none())
                .map(|i| (i.name.as_str(), i.columns.as_slice())),
        )
        .collect()
}

fn describe(columns: &[String], values: &[Value]) -> String {
    columns
        .iter()
        .zip(values)
        .map(|(c, v)| format!("{c}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn column_position(table: &Table, table_name: &QualifiedName, column: &str) -> Result<usize, SchemaError> {
    table
        .columns
        .iter()
        .position(|c| c.name == column)
        .ok_or_else(|| SchemaError::UnknownColumn {
            table: table_name.to_string(),
            column: column.to_string(),
        })
}

fn seed_position(
    table: &Table,
    table_name: &QualifiedName,
    key_columns: &[String],
    key_values: &[Value],
) -> Result<usize, SchemaError> {
    table
        .seed_data
        .iter()
        .position(|row| {
            key_columns
                .iter()
                .zip(key_values)
                .all(|(column, value)| row.get(column) == Some(value))
        })
        .ok_or_else(|| SchemaError::UnknownSeedRow {
            table: table_name.to_string(),
            key: describe(key_columns, key_values),
        })
}

fn remove_named<T>(items: &mut Vec<T>, matches: impl Fn(&T) -> bool) -> Option<()> {
    let position = items.iter().position(matches)?;
    items.remove(position);
    Some(())
}

fn unknown_constraint(table: &QualifiedName, name: &str) -> SchemaError {
    SchemaError::UnknownConstraint {
        table: table.to_string(),
        name: name.to_string(),
    }
}
