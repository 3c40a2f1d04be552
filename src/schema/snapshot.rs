//! Immutable schema snapshots.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

use super::error::SchemaError;
use super::table::{Column, QualifiedName, SeedRow, Table};
use super::type_mapping::{DefaultTypeMapper, TypeMapper};

/// Tables, columns, keys, indexes and seed rows at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    #[serde(default)]
    pub tables: Vec<Table>,
}

impl SchemaSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table(&self, name: &QualifiedName) -> Option<&Table> {
        self.tables
            .iter()
            .find(|t| t.schema == name.schema && t.name == name.name)
    }

    pub(crate) fn table_mut(&mut self, name: &QualifiedName) -> Result<&mut Table, SchemaError> {
        self.tables
            .iter_mut()
            .find(|t| t.schema == name.schema && t.name == name.name)
            .ok_or_else(|| SchemaError::UnknownTable(name.to_string()))
    }

    /// Non-default schemas referenced by any table, sorted.
    pub fn schemas(&self) -> BTreeSet<String> {
        self.tables.iter().filter_map(|t| t.schema.clone()).collect()
    }

    /// Check the snapshot's structural invariants.
    ///
    /// # Errors
    ///
    /// Returns the first violation found, in table order.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut identities: HashMap<QualifiedName, &Table> = HashMap::new();
        for table in &self.tables {
            if let Some(existing) = identities.insert(table.qualified_name(), table) {
                return Err(SchemaError::AmbiguousTable {
                    identity: table.qualified_name().to_string(),
                    first: existing.display_name(),
                    second: table.display_name(),
                });
            }
        }

        let mut constraint_names: HashSet<(Option<String>, String)> = HashSet::new();
        for table in &self.tables {
            validate_table(self, table)?;
            for name in table.constraint_names() {
                if !constraint_names.insert((table.schema.clone(), name.to_string())) {
                    return Err(SchemaError::DuplicateConstraint {
                        schema: table.schema.clone().unwrap_or_else(|| "default".to_string()),
                        name: name.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Parse and validate a JSON snapshot document.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Serialization`] for malformed JSON, or any
    /// validation error.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let snapshot: SchemaSnapshot = serde_json::from_str(json)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// # Errors
    ///
    /// Returns [`SchemaError::Serialization`] if a value cannot be encoded.
    pub fn to_json(&self) -> Result<String, SchemaError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Structural equality under the default type mapper.
    pub fn structurally_equals(&self, other: &SchemaSnapshot) -> bool {
        self.structurally_equals_with(other, &DefaultTypeMapper::new())
    }

    /// Structural equality: same tables, columns, keys, constraints, indexes
    /// and seed rows. Table and column order, entity labels and rename
    /// annotations are ignored.
    pub fn structurally_equals_with(&self, other: &SchemaSnapshot, mapper: &dyn TypeMapper) -> bool {
        if self.tables.len() != other.tables.len() {
            return false;
        }
        self.tables.iter().all(|table| {
            other
                .table(&table.qualified_name())
                .is_some_and(|candidate| tables_match(table, candidate, mapper))
        })
    }
}

fn validate_table(snapshot: &SchemaSnapshot, table: &Table) -> Result<(), SchemaError> {
    let table_name = table.qualified_name().to_string();
    let mut seen = HashSet::new();
    for column in &table.columns {
        if !seen.insert(column.name.as_str()) {
            return Err(SchemaError::DuplicateColumn {
                table: table_name,
                column: column.name.clone(),
            });
        }
    }

    let check_columns = |columns: &[String]| -> Result<(), SchemaError> {
        for column in columns {
            if table.find_column(column).is_none() {
                return Err(SchemaError::UnknownColumn {
                    table: table_name.clone(),
                    column: column.clone(),
                });
            }
        }
        Ok(())
    };

    if let Some(pk) = &table.primary_key {
        check_columns(&pk.columns)?;
    }
    for unique in &table.unique_constraints {
        check_columns(&unique.columns)?;
    }
    for index in &table.indexes {
        check_columns(&index.columns)?;
    }
    for fk in &table.foreign_keys {
        check_columns(&fk.columns)?;
        let principal = snapshot
            .table(&fk.principal)
            .ok_or_else(|| SchemaError::UnknownPrincipal {
                table: table_name.clone(),
                name: fk.name.clone(),
                principal: fk.principal.to_string(),
            })?;
        if fk.columns.len() != fk.principal_columns.len() {
            return Err(SchemaError::ForeignKeyArity {
                table: table_name.clone(),
                name: fk.name.clone(),
                dependent: fk.columns.len(),
                principal: fk.principal_columns.len(),
            });
        }
        for column in &fk.principal_columns {
            if principal.find_column(column).is_none() {
                return Err(SchemaError::UnknownColumn {
                    table: fk.principal.to_string(),
                    column: column.clone(),
                });
            }
        }
    }

    if !table.seed_data.is_empty() {
        let key = table.key_columns();
        if key.is_empty() {
            return Err(SchemaError::SeedWithoutKey(table_name));
        }
        for row in &table.seed_data {
            if let Some(missing) = key.iter().find(|c| row.get(c).is_none()) {
                return Err(SchemaError::SeedMissingKey {
                    table: table_name,
                    column: missing.clone(),
                });
            }
            for column in row.values.keys() {
                if table.find_column(column).is_none() {
                    return Err(SchemaError::UnknownColumn {
                        table: table_name,
                        column: column.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Whether two columns would render to the same definition.
pub(crate) fn same_column_definition(a: &Column, b: &Column, mapper: &dyn TypeMapper) -> bool {
    let same_type = match (mapper.column_type(a), mapper.column_type(b)) {
        (Ok(left), Ok(right)) => left == right,
        _ => a.logical_type == b.logical_type && a.max_length == b.max_length && a.store_type == b.store_type,
    };
    same_type
        && a.nullable == b.nullable
        && a.default_sql == b.default_sql
        && a.default_value == b.default_value
        && a.identity == b.identity
        && a.computed_sql == b.computed_sql
        && a.comment == b.comment
}

fn tables_match(a: &Table, b: &Table, mapper: &dyn TypeMapper) -> bool {
    if a.columns.len() != b.columns.len() || a.comment != b.comment || a.primary_key != b.primary_key {
        return false;
    }
    let columns_match = a.columns.iter().all(|column| {
        b.find_column(&column.name)
            .is_some_and(|other| same_column_definition(column, other, mapper))
    });

    columns_match
        && same_set(&a.unique_constraints, &b.unique_constraints)
        && same_set(&a.foreign_keys, &b.foreign_keys)
        && same_set(&a.indexes, &b.indexes)
        && same_rows(&a.seed_data, &b.seed_data)
}

fn same_set<T: Eq + std::hash::Hash>(a: &[T], b: &[T]) -> bool {
    a.len() == b.len() && a.iter().collect::<HashSet<_>>() == b.iter().collect::<HashSet<_>>()
}

fn same_rows(a: &[SeedRow], b: &[SeedRow]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut remaining: Vec<SeedRow> = b.iter().map(SeedRow::normalized).collect();
    for row in a.iter().map(SeedRow::normalized) {
        match remaining.iter().position(|candidate| *candidate == row) {
            Some(pos) => {
                remaining.swap_remove(pos);
            }
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ForeignKey, Index};
    use crate::value::Value;

    fn orders() -> Table {
        Table::new("Orders")
            .column(Column::new("Id", "int"))
            .column(Column::new("Total", "int"))
            .primary_key("PK_Orders", ["Id"])
    }

    #[test]
    fn test_validate_rejects_ambiguous_tables() {
        let snapshot = SchemaSnapshot::new()
            .with_table(orders().entity("Order"))
            .with_table(orders().entity("LegacyOrder"));
        let err = snapshot.validate().unwrap_err();
        assert_eq!(
            err,
            SchemaError::AmbiguousTable {
                identity: "Orders".to_string(),
                first: "Order".to_string(),
                second: "LegacyOrder".to_string(),
            }
        );
    }

    #[test]
    fn test_validate_rejects_duplicate_constraint_names_across_tables() {
        let snapshot = SchemaSnapshot::new()
            .with_table(orders().index(Index::new("IX_Total", ["Total"])))
            .with_table(
                Table::new("Invoices")
                    .column(Column::new("Total", "int"))
                    .index(Index::new("IX_Total", ["Total"])),
            );
        assert!(matches!(
            snapshot.validate(),
            Err(SchemaError::DuplicateConstraint { name, .. }) if name == "IX_Total"
        ));
    }

    #[test]
    fn test_same_constraint_name_allowed_in_different_schemas() {
        let snapshot = SchemaSnapshot::new()
            .with_table(orders())
            .with_table(orders().in_schema("archive"));
        assert!(snapshot.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_principal() {
        let snapshot = SchemaSnapshot::new().with_table(
            Table::new("Lines")
                .column(Column::new("OrderId", "int"))
                .foreign_key(ForeignKey::new("FK_Lines_Orders", ["OrderId"], "Orders", ["Id"])),
        );
        assert!(matches!(snapshot.validate(), Err(SchemaError::UnknownPrincipal { .. })));
    }

    #[test]
    fn test_seed_rows_require_a_key() {
        let snapshot = SchemaSnapshot::new().with_table(
            Table::new("Tags")
                .column(Column::new("Name", "string"))
                .seed([("Name", "rust")]),
        );
        assert_eq!(snapshot.validate(), Err(SchemaError::SeedWithoutKey("Tags".to_string())));
    }

    #[test]
    fn test_structural_equality_ignores_order_and_labels() {
        let a = SchemaSnapshot::new().with_table(
            orders()
                .entity("Order")
                .seed([("Id", Value::Int(1)), ("Total", Value::Int(3))])
                .seed([("Id", Value::Int(2)), ("Total", Value::Null)]),
        );
        let mut reordered = orders();
        reordered.columns.reverse();
        let b = SchemaSnapshot::new().with_table(
            reordered
                .seed([("Id", Value::Int(2))])
                .seed([("Id", Value::Int(1)), ("Total", Value::Int(3))]),
        );
        assert!(a.structurally_equals(&b));
    }

    #[test]
    fn test_structural_equality_sees_type_changes() {
        let a = SchemaSnapshot::new().with_table(orders());
        let mut changed = orders();
        changed.columns[1] = Column::new("Total", "long");
        let b = SchemaSnapshot::new().with_table(changed);
        assert!(!a.structurally_equals(&b));
    }

    #[test]
    fn test_json_round_trip_keeps_structure() {
        let snapshot = SchemaSnapshot::new().with_table(orders().in_schema("sales"));
        let json = snapshot.to_json().unwrap();
        let parsed = SchemaSnapshot::from_json(&json).unwrap();
        assert_eq!(parsed, snapshot);
    }
}
