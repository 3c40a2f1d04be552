//! Rename detection.
//!
//! Whether a target table (or column) continues a source one under a new name
//! is decided by a [`RenameStrategy`]. The differ asks only after exact
//! identity matching has failed.

use std::fmt;

use crate::schema::{Column, SchemaSnapshot, Table};

pub trait RenameStrategy: Send + Sync + fmt::Debug {
    /// Index of the source table that `target` continues, if any.
    fn previous_table(&self, target: &Table, source: &SchemaSnapshot) -> Option<usize>;

    /// Index of the column of `source_table` that `target` continues, if any.
    fn previous_column(&self, target: &Column, source_table: &Table) -> Option<usize>;
}

/// Follows `renamed_from` annotations in either direction, so that the diff
/// from the old model to the new one and the diff back both see the rename.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnnotationRenameStrategy;

impl RenameStrategy for AnnotationRenameStrategy {
    fn previous_table(&self, target: &Table, source: &SchemaSnapshot) -> Option<usize> {
        let target_name = target.qualified_name();
        source.tables.iter().position(|candidate| {
            target.renamed_from.as_ref() == Some(&candidate.qualified_name())
                || candidate.renamed_from.as_ref() == Some(&target_name)
        })
    }

    fn previous_column(&self, target: &Column, source_table: &Table) -> Option<usize> {
        source_table.columns.iter().position(|candidate| {
            target.renamed_from.as_deref() == Some(candidate.name.as_str())
                || candidate.renamed_from.as_deref() == Some(target.name.as_str())
        })
    }
}

/// Never detects renames; every rename becomes a drop and a create.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRenameStrategy;

impl RenameStrategy for NoRenameStrategy {
    fn previous_table(&self, _target: &Table, _source: &SchemaSnapshot) -> Option<usize> {
        None
    }

    fn previous_column(&self, _target: &Column, _source_table: &Table) -> Option<usize> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotation_is_followed_both_ways() {
        let old = SchemaSnapshot::new().with_table(Table::new("Orders"));
        let new = SchemaSnapshot::new().with_table(Table::new("PurchaseOrders").renamed_from("Orders"));
        let strategy = AnnotationRenameStrategy;

        assert_eq!(strategy.previous_table(&new.tables[0], &old), Some(0));
        assert_eq!(strategy.previous_table(&old.tables[0], &new), Some(0));
        assert_eq!(NoRenameStrategy.previous_table(&new.tables[0], &old), None);
    }

    #[test]
    fn test_column_annotation() {
        let source = Table::new("Orders").column(Column::new("Total", "int"));
        let renamed = Column::new("Amount", "int").renamed_from("Total");
        assert_eq!(AnnotationRenameStrategy.previous_column(&renamed, &source), Some(0));
        assert_eq!(AnnotationRenameStrategy.previous_column(&Column::new("Other", "int"), &source), None);
    }
}
