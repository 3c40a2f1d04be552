//! Structural diff between two schema snapshots.
//!
//! Tables are matched by storage identity first and by the configured
//! [`RenameStrategy`] second; columns the same way within matched tables.
//! Operations are then collected into phases whose order keeps the sequence
//! executable:
//!
//! ```text
//! drop FKs ─▶ drop keys/indexes ─▶ seed deletes ─▶ drop columns ─▶ drop tables
//!   ─▶ ensure schemas ─▶ renames ─▶ alters ─▶ create tables ─▶ add columns
//!   ─▶ seed updates/inserts ─▶ add keys ─▶ create indexes ─▶ add FKs
//! ```
//!
//! Drops and seed deletes address tables and columns by their old names,
//! everything after the rename phase by the new ones. Seed rows are written
//! while only the constraints both snapshots share are in force; the keys,
//! indexes and foreign keys the target adds are checked against the final rows.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use crate::migration::error::DiffError;
use crate::migration::migration::{Migration, MigrationId};
use crate::migration::operations::*;
use crate::migration::rename::{AnnotationRenameStrategy, RenameStrategy};
use crate::migration::table_ordering::principals_first;
use crate::schema::{
    Column, DefaultTypeMapper, ForeignKey, Index, PrimaryKey, QualifiedName, SchemaSnapshot, SeedRow, Table,
    TypeMapper, UniqueConstraint,
};
use crate::update::{CommandGraph, ModificationCommand};
use crate::value::Value;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Computes the operations that turn one schema snapshot into another.
#[derive(Debug, Clone)]
pub struct ModelDiffer {
    type_mapper: Arc<dyn TypeMapper>,
    rename_strategy: Arc<dyn RenameStrategy>,
}

impl Default for ModelDiffer {
    fn default() -> Self {
        Self::new(Arc::new(DefaultTypeMapper::new()), Arc::new(AnnotationRenameStrategy))
    }
}

impl ModelDiffer {
    pub fn new(type_mapper: Arc<dyn TypeMapper>, rename_strategy: Arc<dyn RenameStrategy>) -> Self {
        Self {
            type_mapper,
            rename_strategy,
        }
    }

    pub fn type_mapper(&self) -> &dyn TypeMapper {
        self.type_mapper.as_ref()
    }

    /// Whether [`get_differences`](Self::get_differences) would produce any
    /// operation.
    ///
    /// # Errors
    ///
    /// Same as [`get_differences`](Self::get_differences).
    pub fn has_differences(
        &self,
        source: Option<&SchemaSnapshot>,
        target: Option<&SchemaSnapshot>,
    ) -> Result<bool, DiffError> {
        Ok(!self.get_differences(source, target)?.is_empty())
    }

    /// Operations that transform `source` into `target`. A missing source
    /// creates everything in `target`; a missing target drops everything in
    /// `source`.
    ///
    /// # Errors
    ///
    /// - [`DiffError::AmbiguousTable`] when two entities map to one table
    /// - [`DiffError::AmbiguousRename`] when two tables claim the same
    ///   previous table
    /// - [`DiffError::InvalidModel`] for any other invalid snapshot
    /// - [`DiffError::SeedData`] when seed rows reference each other in a cycle
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn get_differences(
        &self,
        source: Option<&SchemaSnapshot>,
        target: Option<&SchemaSnapshot>,
    ) -> Result<Vec<MigrationOperation>, DiffError> {
        let start = Instant::now();
        let empty = SchemaSnapshot::default();
        let source = source.unwrap_or(&empty);
        let target = target.unwrap_or(&empty);
        source.validate()?;
        target.validate()?;

        let context = DiffContext::new(source, target, self.type_mapper.as_ref(), self.rename_strategy.as_ref())?;
        let operations = context.operations()?;

        log::debug!(
            "Diffed {} source table(s) against {} target table(s): {} operation(s)",
            source.tables.len(),
            target.tables.len(),
            operations.len()
        );
        #[cfg(feature = "metrics")]
        METRICS.record_diff(operations.len(), start.elapsed());
        #[cfg(not(feature = "metrics"))]
        let _ = start;

        Ok(operations)
    }

    /// Up and down operations between `source` and `target`. The down
    /// sequence is a fresh diff in the opposite direction.
    ///
    /// # Errors
    ///
    /// Same as [`get_differences`](Self::get_differences).
    pub fn get_migration(
        &self,
        source: Option<&SchemaSnapshot>,
        target: Option<&SchemaSnapshot>,
    ) -> Result<(Vec<MigrationOperation>, Vec<MigrationOperation>), DiffError> {
        let up = self.get_differences(source, target)?;
        let down = self.get_differences(target, source)?;
        Ok((up, down))
    }

    /// # Errors
    ///
    /// Same as [`get_differences`](Self::get_differences).
    pub fn create_migration(
        &self,
        id: MigrationId,
        source: Option<&SchemaSnapshot>,
        target: Option<&SchemaSnapshot>,
    ) -> Result<Migration, DiffError> {
        let (up, down) = self.get_migration(source, target)?;
        log::info!("Created migration {} ({} up, {} down)", id, up.len(), down.len());
        Ok(Migration { id, up, down })
    }
}

/// A key referenced by foreign keys: table plus its (unordered) columns.
type KeyRef = (QualifiedName, BTreeSet<String>);

fn key_ref(table: &QualifiedName, columns: &[String]) -> KeyRef {
    (table.clone(), columns.iter().cloned().collect())
}

#[derive(Default)]
struct Phases {
    drop_foreign_keys: Vec<MigrationOperation>,
    drop_keys: Vec<MigrationOperation>,
    source_data: Vec<MigrationOperation>,
    drop_columns: Vec<MigrationOperation>,
    drop_tables: Vec<MigrationOperation>,
    ensure_schemas: Vec<MigrationOperation>,
    rename_tables: Vec<MigrationOperation>,
    rename_columns: Vec<MigrationOperation>,
    alters: Vec<MigrationOperation>,
    create_tables: Vec<MigrationOperation>,
    add_columns: Vec<MigrationOperation>,
    target_data: Vec<MigrationOperation>,
    add_keys: Vec<MigrationOperation>,
    create_indexes: Vec<MigrationOperation>,
    add_foreign_keys: Vec<MigrationOperation>,
}

impl Phases {
    fn into_operations(self) -> Vec<MigrationOperation> {
        [
            self.drop_foreign_keys,
            self.drop_keys,
            self.source_data,
            self.drop_columns,
            self.drop_tables,
            self.ensure_schemas,
            self.rename_tables,
            self.rename_columns,
            self.alters,
            self.create_tables,
            self.add_columns,
            self.target_data,
            self.add_keys,
            self.create_indexes,
            self.add_foreign_keys,
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

struct DiffContext<'a> {
    source: &'a SchemaSnapshot,
    target: &'a SchemaSnapshot,
    mapper: &'a dyn TypeMapper,
    source_index: HashMap<QualifiedName, usize>,
    target_index: HashMap<QualifiedName, usize>,
    /// Source table index -> matched target table index.
    target_of: Vec<Option<usize>>,
    /// Target table index -> matched source table index.
    source_of: Vec<Option<usize>>,
    /// Per source table: source column name -> target column name.
    column_maps: Vec<HashMap<String, String>>,
    /// Per target table: columns whose type, nullability or generation changes.
    altered: Vec<HashSet<String>>,
}

impl<'a> DiffContext<'a> {
    fn new(
        source: &'a SchemaSnapshot,
        target: &'a SchemaSnapshot,
        mapper: &'a dyn TypeMapper,
        strategy: &dyn RenameStrategy,
    ) -> Result<Self, DiffError> {
        let source_index = source
            .tables
            .iter()
            .enumerate()
            .map(|(i, t)| (t.qualified_name(), i))
            .collect();
        let target_index: HashMap<QualifiedName, usize> = target
            .tables
            .iter()
            .enumerate()
            .map(|(i, t)| (t.qualified_name(), i))
            .collect();

        let mut context = Self {
            source,
            target,
            mapper,
            source_index,
            target_index,
            target_of: vec![None; source.tables.len()],
            source_of: vec![None; target.tables.len()],
            column_maps: vec![HashMap::new(); source.tables.len()],
            altered: vec![HashSet::new(); target.tables.len()],
        };
        context.match_tables(strategy)?;
        context.match_columns(strategy);
        Ok(context)
    }

    fn match_tables(&mut self, strategy: &dyn RenameStrategy) -> Result<(), DiffError> {
        let (source, target) = (self.source, self.target);
        for (t, table) in target.tables.iter().enumerate() {
            if let Some(&s) = self.source_index.get(&table.qualified_name()) {
                self.link(s, t);
            }
        }

        // Source tables claimed by a rename, so a second claim is reported.
        let mut renamed_to: HashMap<usize, usize> = HashMap::new();
        for (t, table) in target.tables.iter().enumerate() {
            if self.source_of[t].is_some() {
                continue;
            }
            let Some(s) = strategy.previous_table(table, source) else {
                continue;
            };
            if let Some(&first) = renamed_to.get(&s) {
                return Err(DiffError::AmbiguousRename {
                    source_table: source.tables[s].qualified_name().to_string(),
                    first: target.tables[first].qualified_name().to_string(),
                    second: table.qualified_name().to_string(),
                });
            }
            if self.target_of[s].is_some() {
                // Stale annotation: the old name is still in use as-is.
                continue;
            }
            renamed_to.insert(s, t);
            self.link(s, t);
        }
        Ok(())
    }

    fn link(&mut self, s: usize, t: usize) {
        self.target_of[s] = Some(t);
        self.source_of[t] = Some(s);
    }

    fn match_columns(&mut self, strategy: &dyn RenameStrategy) {
        let (source, target) = (self.source, self.target);
        for (t, target_table) in target.tables.iter().enumerate() {
            let Some(s) = self.source_of[t] else {
                continue;
            };
            let source_table = &source.tables[s];
            let mut claimed = vec![false; source_table.columns.len()];
            let mut matched: Vec<Option<usize>> = vec![None; target_table.columns.len()];

            for (tc, column) in target_table.columns.iter().enumerate() {
                if let Some(sc) = source_table.columns.iter().position(|c| c.name == column.name) {
                    claimed[sc] = true;
                    matched[tc] = Some(sc);
                }
            }
            for (tc, column) in target_table.columns.iter().enumerate() {
                if matched[tc].is_some() {
                    continue;
                }
                if let Some(sc) = strategy.previous_column(column, source_table) {
                    if !claimed[sc] {
                        claimed[sc] = true;
                        matched[tc] = Some(sc);
                    }
                }
            }

            for (tc, sc) in matched.into_iter().enumerate() {
                let Some(sc) = sc else {
                    continue;
                };
                let old = &source_table.columns[sc];
                let new = &target_table.columns[tc];
                self.column_maps[s].insert(old.name.clone(), new.name.clone());
                if self.is_structural_change(old, new) {
                    self.altered[t].insert(new.name.clone());
                }
            }
        }
    }

    /// Changes that can conflict with constraints over the column.
    fn is_structural_change(&self, old: &Column, new: &Column) -> bool {
        let type_changed = match (self.mapper.column_type(old), self.mapper.column_type(new)) {
            (Ok(a), Ok(b)) => a != b,
            _ => old.logical_type != new.logical_type || old.max_length != new.max_length,
        };
        type_changed || old.nullable != new.nullable || old.computed_sql != new.computed_sql || old.identity != new.identity
    }

    fn map_table(&self, name: &QualifiedName) -> Option<(usize, usize)> {
        let s = *self.source_index.get(name)?;
        Some((s, self.target_of[s]?))
    }

    fn map_columns(&self, s: usize, columns: &[String]) -> Option<Vec<String>> {
        columns
            .iter()
            .map(|c| self.column_maps[s].get(c).cloned())
            .collect()
    }

    fn touches_altered(&self, t: usize, columns: &[String]) -> bool {
        columns.iter().any(|c| self.altered[t].contains(c))
    }

    fn map_foreign_key(&self, s: usize, fk: &ForeignKey) -> Option<ForeignKey> {
        let (ps, pt) = self.map_table(&fk.principal)?;
        Some(ForeignKey {
            name: fk.name.clone(),
            columns: self.map_columns(s, &fk.columns)?,
            principal: self.target.tables[pt].qualified_name(),
            principal_columns: self.map_columns(ps, &fk.principal_columns)?,
            on_delete: fk.on_delete,
        })
    }

    fn operations(&self) -> Result<Vec<MigrationOperation>, DiffError> {
        let mut phases = Phases::default();
        let mut pending_keys: HashSet<KeyRef> = HashSet::new();
        let mut dropped_keys: HashSet<KeyRef> = HashSet::new();

        for (t, target_table) in self.target.tables.iter().enumerate() {
            if let Some(s) = self.source_of[t] {
                self.diff_table(s, t, target_table, &mut phases, &mut pending_keys, &mut dropped_keys);
            }
        }

        let inlined = self.create_tables(&mut phases, &pending_keys);
        self.drop_tables(&mut phases, &dropped_keys);
        self.diff_foreign_keys(&mut phases, &pending_keys, &inlined);

        for schema in self.target.schemas().difference(&self.source.schemas()) {
            phases
                .ensure_schemas
                .push(MigrationOperation::EnsureSchema(EnsureSchemaOperation { name: schema.clone() }));
        }

        self.diff_seed_data(&mut phases)?;
        Ok(phases.into_operations())
    }

    fn diff_table(
        &self,
        s: usize,
        t: usize,
        target_table: &Table,
        phases: &mut Phases,
        pending_keys: &mut HashSet<KeyRef>,
        dropped_keys: &mut HashSet<KeyRef>,
    ) {
        let source_table = &self.source.tables[s];
        let old_name = source_table.qualified_name();
        let new_name = target_table.qualified_name();

        if old_name != new_name {
            phases.rename_tables.push(MigrationOperation::RenameTable(RenameTableOperation {
                table: old_name.clone(),
                new_name: new_name.clone(),
            }));
        }
        if source_table.comment != target_table.comment {
            phases.alters.push(MigrationOperation::AlterTable(AlterTableOperation {
                table: new_name.clone(),
                comment: target_table.comment.clone(),
                old_comment: source_table.comment.clone(),
            }));
        }

        // Columns
        for column in &source_table.columns {
            if !self.column_maps[s].contains_key(&column.name) {
                phases.drop_columns.push(MigrationOperation::DropColumn(DropColumnOperation {
                    table: old_name.clone(),
                    name: column.name.clone(),
                }));
            }
        }
        let previous: HashMap<&str, &Column> = source_table
            .columns
            .iter()
            .filter_map(|c| self.column_maps[s].get(&c.name).map(|new| (new.as_str(), c)))
            .collect();
        for column in &target_table.columns {
            let Some(old) = previous.get(column.name.as_str()) else {
                phases.add_columns.push(MigrationOperation::AddColumn(AddColumnOperation {
                    table: new_name.clone(),
                    column: column.clone(),
                }));
                continue;
            };
            if old.name != column.name {
                phases.rename_columns.push(MigrationOperation::RenameColumn(RenameColumnOperation {
                    table: new_name.clone(),
                    name: old.name.clone(),
                    new_name: column.name.clone(),
                }));
            }
            if !crate::schema::snapshot::same_column_definition(old, column, self.mapper) {
                let mut old_column = (*old).clone();
                old_column.name = column.name.clone();
                phases.alters.push(MigrationOperation::AlterColumn(AlterColumnOperation {
                    table: new_name.clone(),
                    column: column.clone(),
                    old_column,
                }));
            }
        }

        // Primary key
        let kept_pk = source_table.primary_key.as_ref().is_some_and(|pk| {
            self.map_columns(s, &pk.columns).is_some_and(|columns| {
                target_table.primary_key.as_ref()
                    == Some(&PrimaryKey {
                        name: pk.name.clone(),
                        columns,
                    })
            }) && !self.touches_altered(t, target_table.key_columns())
        });
        if !kept_pk {
            if let Some(pk) = &source_table.primary_key {
                dropped_keys.insert(key_ref(&old_name, &pk.columns));
                phases.drop_keys.push(MigrationOperation::DropPrimaryKey(DropPrimaryKeyOperation {
                    table: old_name.clone(),
                    name: pk.name.clone(),
                }));
            }
            if let Some(pk) = &target_table.primary_key {
                pending_keys.insert(key_ref(&new_name, &pk.columns));
                phases.add_keys.push(MigrationOperation::AddPrimaryKey(AddPrimaryKeyOperation {
                    table: new_name.clone(),
                    primary_key: pk.clone(),
                }));
            }
        }

        // Unique constraints
        let mut kept: HashSet<&str> = HashSet::new();
        for unique in &source_table.unique_constraints {
            let mapped = self.map_columns(s, &unique.columns).map(|columns| UniqueConstraint {
                name: unique.name.clone(),
                columns,
            });
            match mapped {
                Some(mapped)
                    if target_table.unique_constraints.contains(&mapped)
                        && !self.touches_altered(t, &mapped.columns) =>
                {
                    kept.insert(unique.name.as_str());
                }
                _ => {
                    dropped_keys.insert(key_ref(&old_name, &unique.columns));
                    phases
                        .drop_keys
                        .push(MigrationOperation::DropUniqueConstraint(DropUniqueConstraintOperation {
                            table: old_name.clone(),
                            name: unique.name.clone(),
                        }));
                }
            }
        }
        for unique in &target_table.unique_constraints {
            if !kept.contains(unique.name.as_str()) {
                pending_keys.insert(key_ref(&new_name, &unique.columns));
                phases
                    .add_keys
                    .push(MigrationOperation::AddUniqueConstraint(AddUniqueConstraintOperation {
                        table: new_name.clone(),
                        constraint: unique.clone(),
                    }));
            }
        }

        // Indexes
        let mut kept: HashSet<&str> = HashSet::new();
        for index in &source_table.indexes {
            let mapped = self.map_columns(s, &index.columns).map(|columns| Index {
                columns,
                ..index.clone()
            });
            match mapped {
                Some(mapped) if target_table.indexes.contains(&mapped) && !self.touches_altered(t, &mapped.columns) => {
                    kept.insert(index.name.as_str());
                }
                _ => {
                    if index.unique {
                        dropped_keys.insert(key_ref(&old_name, &index.columns));
                    }
                    phases.drop_keys.push(MigrationOperation::DropIndex(DropIndexOperation {
                        table: old_name.clone(),
                        name: index.name.clone(),
                    }));
                }
            }
        }
        for index in &target_table.indexes {
            if !kept.contains(index.name.as_str()) {
                phases.create_indexes.push(MigrationOperation::CreateIndex(CreateIndexOperation {
                    table: new_name.clone(),
                    index: index.clone(),
                }));
            }
        }
    }

    /// Emit CreateTable (principals first) for unmatched target tables and
    /// return the `(target table, foreign key)` pairs created inline.
    fn create_tables(&self, phases: &mut Phases, pending_keys: &HashSet<KeyRef>) -> HashSet<(usize, String)> {
        let created: Vec<usize> = (0..self.target.tables.len())
            .filter(|t| self.source_of[*t].is_none())
            .collect();
        let tables: Vec<&Table> = created.iter().map(|t| &self.target.tables[*t]).collect();
        let ordering = principals_first(&tables);
        let position: HashMap<QualifiedName, usize> = ordering
            .order
            .iter()
            .enumerate()
            .map(|(pos, i)| (tables[*i].qualified_name(), pos))
            .collect();

        let mut inlined = HashSet::new();
        for (pos, &i) in ordering.order.iter().enumerate() {
            let table = tables[i];
            let name = table.qualified_name();
            let mut foreign_keys = Vec::new();
            for fk in &table.foreign_keys {
                let inline = if fk.principal == name {
                    true
                } else if let Some(&principal_pos) = position.get(&fk.principal) {
                    principal_pos < pos && !ordering.is_deferred(i, &fk.name)
                } else {
                    // An existing table: its key must not be rebuilt later on.
                    !pending_keys.contains(&key_ref(&fk.principal, &fk.principal_columns))
                };
                if inline {
                    inlined.insert((created[i], fk.name.clone()));
                    foreign_keys.push(fk.clone());
                }
            }

            phases.create_tables.push(MigrationOperation::CreateTable(CreateTableOperation {
                table: name.clone(),
                columns: table.columns.clone(),
                primary_key: table.primary_key.clone(),
                unique_constraints: table.unique_constraints.clone(),
                foreign_keys,
                comment: table.comment.clone(),
            }));
            for index in &table.indexes {
                phases.create_indexes.push(MigrationOperation::CreateIndex(CreateIndexOperation {
                    table: name.clone(),
                    index: index.clone(),
                }));
            }
        }
        inlined
    }

    /// Emit DropTable (dependents first) for unmatched source tables, plus the
    /// foreign key drops those tables need to go first.
    fn drop_tables(&self, phases: &mut Phases, dropped_keys: &HashSet<KeyRef>) {
        let tables: Vec<&Table> = (0..self.source.tables.len())
            .filter(|s| self.target_of[*s].is_none())
            .map(|s| &self.source.tables[s])
            .collect();
        let ordering = principals_first(&tables);

        for (i, table) in tables.iter().enumerate() {
            let name = table.qualified_name();
            for fk in &table.foreign_keys {
                let blocks_survivor = match self.map_table(&fk.principal) {
                    Some((ps, pt)) => {
                        dropped_keys.contains(&key_ref(&fk.principal, &fk.principal_columns))
                            || self
                                .map_columns(ps, &fk.principal_columns)
                                .map_or(true, |columns| self.touches_altered(pt, &columns))
                    }
                    None => false,
                };
                if blocks_survivor || ordering.is_deferred(i, &fk.name) {
                    phases
                        .drop_foreign_keys
                        .push(MigrationOperation::DropForeignKey(DropForeignKeyOperation {
                            table: name.clone(),
                            name: fk.name.clone(),
                        }));
                }
            }
        }

        for &i in ordering.order.iter().rev() {
            phases.drop_tables.push(MigrationOperation::DropTable(DropTableOperation {
                table: tables[i].qualified_name(),
            }));
        }
    }

    fn diff_foreign_keys(&self, phases: &mut Phases, pending_keys: &HashSet<KeyRef>, inlined: &HashSet<(usize, String)>) {
        let mut kept: HashSet<(usize, String)> = HashSet::new();

        for (s, source_table) in self.source.tables.iter().enumerate() {
            let Some(t) = self.target_of[s] else {
                continue;
            };
            let target_table = &self.target.tables[t];
            for fk in &source_table.foreign_keys {
                let keep = self.map_foreign_key(s, fk).is_some_and(|mapped| {
                    let principal_altered = self
                        .target_index
                        .get(&mapped.principal)
                        .is_some_and(|pt| self.touches_altered(*pt, &mapped.principal_columns));
                    target_table.foreign_keys.contains(&mapped)
                        && !self.touches_altered(t, &mapped.columns)
                        && !principal_altered
                        && !pending_keys.contains(&key_ref(&mapped.principal, &mapped.principal_columns))
                });
                if keep {
                    kept.insert((t, fk.name.clone()));
                } else {
                    phases
                        .drop_foreign_keys
                        .push(MigrationOperation::DropForeignKey(DropForeignKeyOperation {
                            table: source_table.qualified_name(),
                            name: fk.name.clone(),
                        }));
                }
            }
        }

        for (t, table) in self.target.tables.iter().enumerate() {
            for fk in &table.foreign_keys {
                let key = (t, fk.name.clone());
                if kept.contains(&key) || inlined.contains(&key) {
                    continue;
                }
                phases
                    .add_foreign_keys
                    .push(MigrationOperation::AddForeignKey(AddForeignKeyOperation {
                        table: table.qualified_name(),
                        foreign_key: fk.clone(),
                    }));
            }
        }
    }

    /// Source seed row expressed in target column names; removed columns are
    /// left out.
    fn map_row(&self, s: usize, row: &SeedRow) -> SeedRow {
        SeedRow {
            values: row
                .values
                .iter()
                .filter_map(|(column, value)| {
                    self.column_maps[s]
                        .get(column)
                        .map(|new| (new.clone(), value.clone()))
                })
                .collect(),
        }
    }

    /// Seed rows are matched by the target key. Deletes that wait on nothing
    /// but other such deletes run against the old schema; everything else runs
    /// once the new columns exist.
    fn diff_seed_data(&self, phases: &mut Phases) -> Result<(), DiffError> {
        let mut deletes: Vec<SeedChange> = Vec::new();
        let mut updates: Vec<SeedChange> = Vec::new();
        let mut inserts: Vec<SeedChange> = Vec::new();

        for (t, table) in self.target.tables.iter().enumerate() {
            let name = table.qualified_name();
            let key = table.key_columns();
            let source_table = self.source_of[t].map(|s| &self.source.tables[s]);
            let source_rows: Vec<(&SeedRow, SeedRow)> = match self.source_of[t] {
                Some(s) => self.source.tables[s]
                    .seed_data
                    .iter()
                    .map(|row| (row, self.map_row(s, row)))
                    .filter(|(_, row)| !row.normalized().values.is_empty())
                    .collect(),
                None => Vec::new(),
            };
            let mut claimed = vec![false; source_rows.len()];

            for row in &table.seed_data {
                let Some(row_key) = row.key(key) else {
                    continue;
                };
                let previous = source_rows
                    .iter()
                    .enumerate()
                    .position(|(i, (_, old))| !claimed[i] && old.key(key).as_ref() == Some(&row_key));

                match previous {
                    Some(i) => {
                        claimed[i] = true;
                        let old = &source_rows[i].1;
                        let changed: Vec<(String, Value)> = table
                            .columns
                            .iter()
                            .filter(|c| !key.contains(&c.name))
                            .filter(|c| row.get(&c.name) != old.get(&c.name))
                            .map(|c| (c.name.clone(), row.get(&c.name).cloned().unwrap_or(Value::Null)))
                            .collect();
                        if changed.is_empty() {
                            continue;
                        }
                        let (columns, values) = changed.into_iter().unzip();
                        updates.push(SeedChange {
                            operation: MigrationOperation::Update(UpdateOperation {
                                table: name.clone(),
                                key_columns: key.to_vec(),
                                key_values: vec![row_key],
                                columns,
                                values: vec![values],
                            }),
                            before_drops: None,
                            original: old.clone(),
                        });
                    }
                    None => {
                        let (columns, values): (Vec<String>, Vec<Value>) = table
                            .columns
                            .iter()
                            .filter_map(|c| row.get(&c.name).map(|v| (c.name.clone(), v.clone())))
                            .unzip();
                        inserts.push(SeedChange {
                            operation: MigrationOperation::Insert(InsertOperation {
                                table: name.clone(),
                                columns,
                                values: vec![values],
                            }),
                            before_drops: None,
                            original: SeedRow::default(),
                        });
                    }
                }
            }

            for (i, (source_row, row)) in source_rows.iter().enumerate() {
                if claimed[i] {
                    continue;
                }
                deletes.push(SeedChange {
                    operation: delete_row(table, row),
                    before_drops: source_table.map(|source| delete_row(source, source_row)),
                    original: row.clone(),
                });
            }
        }

        let pending: Vec<SeedChange> = deletes.into_iter().chain(updates).chain(inserts).collect();
        if pending.is_empty() {
            return Ok(());
        }

        let mut commands: Vec<ModificationCommand> = Vec::with_capacity(pending.len());
        let mut owners: Vec<usize> = Vec::with_capacity(pending.len());
        for (p, change) in pending.iter().enumerate() {
            for command in change.operation.to_modification_commands()? {
                commands.push(command.with_original_values(change.original.values.clone()));
                owners.push(p);
            }
        }
        let graph = CommandGraph::build(&commands, self.target);
        let order = graph.topological_order(&commands)?;

        // A delete that has to wait for an update (or for a delete that does)
        // stays with the target-side writes.
        let mut late = vec![false; commands.len()];
        for &i in &order {
            let waits = !commands[i].state().is_delete() || graph.predecessors(i).iter().any(|&p| late[p]);
            late[i] = waits;
        }

        let mut slots: Vec<Option<SeedChange>> = pending.into_iter().map(Some).collect();
        let (mut source_data, mut target_data) = (Vec::new(), Vec::new());
        for i in order {
            let Some(change) = slots[owners[i]].take() else {
                continue;
            };
            match change.before_drops {
                Some(early) if !late[i] => source_data.push(early),
                _ => target_data.push(change.operation),
            }
        }
        phases.source_data = merge_data_operations(source_data);
        phases.target_data = merge_data_operations(target_data);
        Ok(())
    }
}

/// One seed row change. `original` holds the row as it was, in target column
/// names, so the dependency graph sees the values a delete or update releases.
struct SeedChange {
    operation: MigrationOperation,
    /// The same delete addressed by the source table's names.
    before_drops: Option<MigrationOperation>,
    original: SeedRow,
}

/// Delete `row` from `table` by its key, or by every column it holds when the
/// table has no key.
fn delete_row(table: &Table, row: &SeedRow) -> MigrationOperation {
    let key = table.key_columns();
    let (key_columns, key_values) = match row.key(key).filter(|_| !key.is_empty()) {
        Some(values) => (key.to_vec(), values),
        None => row.normalized().values.into_iter().unzip(),
    };
    MigrationOperation::Delete(DeleteOperation {
        table: table.qualified_name(),
        key_columns,
        key_values: vec![key_values],
    })
}

/// Fold runs of single-row data operations on the same table and columns into
/// one multi-row operation.
fn merge_data_operations(operations: Vec<MigrationOperation>) -> Vec<MigrationOperation> {
    let mut merged: Vec<MigrationOperation> = Vec::with_capacity(operations.len());
    for operation in operations {
        match (merged.last_mut(), operation) {
            (Some(MigrationOperation::Insert(last)), MigrationOperation::Insert(next))
                if last.table == next.table && last.columns == next.columns =>
            {
                last.values.extend(next.values);
            }
            (Some(MigrationOperation::Update(last)), MigrationOperation::Update(next))
                if last.table == next.table && last.key_columns == next.key_columns && last.columns == next.columns =>
            {
                last.key_values.extend(next.key_values);
                last.values.extend(next.values);
            }
            (Some(MigrationOperation::Delete(last)), MigrationOperation::Delete(next))
                if last.table == next.table && last.key_columns == next.key_columns =>
            {
                last.key_values.extend(next.key_values);
            }
            (_, operation) => merged.push(operation),
        }
    }
    merged
}
