//! DML rendering for modification command batches.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;

use crate::sql::{SqlDialect, SqlGenerationError};
use crate::update::batch::{ModificationCommandBatch, ParameterBinding};
use crate::update::column_modification::ColumnModification;
use crate::update::command::{EntityState, ModificationCommand};
use crate::update::error::ConcurrencyConflict;

/// Where the affected-row information of a command lives in the batch's
/// result sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultSetMapping {
    /// The command produces no result set.
    NoResultSet,
    /// The command's rows share a result set with the commands after it.
    NotLastInResultSet,
    /// The command's rows end the current result set.
    LastInResultSet,
}

/// SQL text for one batch plus what the executor needs to interpret it.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchCommandText {
    pub sql: String,
    pub parameters: Vec<ParameterBinding>,
    /// One entry per command, in batch order.
    pub result_set_mappings: Vec<ResultSetMapping>,
    pub expected_rows_affected: u64,
    pub commands: Vec<String>,
}

impl BatchCommandText {
    /// Compare the affected-row count reported by the database with the
    /// expected one.
    ///
    /// # Errors
    ///
    /// Returns [`ConcurrencyConflict`] when they differ.
    pub fn check_rows_affected(&self, actual: u64) -> Result<(), ConcurrencyConflict> {
        if actual == self.expected_rows_affected {
            return Ok(());
        }
        Err(ConcurrencyConflict {
            expected: self.expected_rows_affected,
            actual,
            commands: self.commands.clone(),
        })
    }
}

type Placeholders<'a> = HashMap<&'a str, String>;

#[derive(Debug, Clone)]
pub struct UpdateSqlGenerator {
    dialect: Arc<dyn SqlDialect>,
}

impl UpdateSqlGenerator {
    pub fn new(dialect: Arc<dyn SqlDialect>) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    /// Render every command of `batch` into one command text.
    ///
    /// # Errors
    ///
    /// Returns [`SqlGenerationError::UnboundParameter`] if a command refers to
    /// a parameter the batch did not bind.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(commands = batch.len())))]
    pub fn generate_batch(&self, batch: &ModificationCommandBatch) -> Result<BatchCommandText, SqlGenerationError> {
        let placeholders: Placeholders<'_> = batch
            .parameters()
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.as_str(), self.dialect.parameter_placeholder(i, &p.name)))
            .collect();

        let commands = batch.commands();
        let mut sql = String::new();
        let mut mappings = Vec::with_capacity(commands.len());
        let mut i = 0;
        while i < commands.len() {
            match commands[i].state() {
                EntityState::Added => {
                    let mut end = i + 1;
                    if self.dialect.supports_returning() {
                        while end < commands.len() && can_merge_inserts(&commands[i], &commands[end]) {
                            end += 1;
                        }
                    }
                    let group = &commands[i..end];
                    let mapping = self.append_insert_operation(&mut sql, group, &placeholders)?;
                    if mapping == ResultSetMapping::NoResultSet {
                        mappings.extend(group.iter().map(|_| ResultSetMapping::NoResultSet));
                    } else {
                        mappings.extend((1..group.len()).map(|_| ResultSetMapping::NotLastInResultSet));
                        mappings.push(ResultSetMapping::LastInResultSet);
                    }
                    i = end;
                }
                EntityState::Modified => {
                    mappings.push(self.append_update_operation(&mut sql, &commands[i], &placeholders)?);
                    i += 1;
                }
                EntityState::Deleted => {
                    mappings.push(self.append_delete_operation(&mut sql, &commands[i], &placeholders)?);
                    i += 1;
                }
            }
        }

        log::trace!("Generated batch SQL for {} command(s):\n{}", commands.len(), sql);
        Ok(BatchCommandText {
            sql,
            parameters: batch.parameters().to_vec(),
            result_set_mappings: mappings,
            expected_rows_affected: batch.expected_rows_affected(),
            commands: commands.iter().map(ToString::to_string).collect(),
        })
    }

    /// Append an INSERT for one command, or a multi-row INSERT for a group
    /// of commands with the same shape.
    fn append_insert_operation(
        &self,
        sql: &mut String,
        group: &[ModificationCommand],
        placeholders: &Placeholders<'_>,
    ) -> Result<ResultSetMapping, SqlGenerationError> {
        let helper = self.dialect.helper();
        let terminator = helper.statement_terminator();
        let first = &group[0];
        let table = helper.delimit_name(first.table());
        let written: Vec<&ColumnModification> = first.value_modifications().collect();

        let _ = write!(sql, "INSERT INTO {table}");
        if written.is_empty() {
            let _ = write!(sql, "\nDEFAULT VALUES");
        } else {
            let columns = written
                .iter()
                .map(|m| helper.delimit_identifier(m.column_name()))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = write!(sql, " ({columns})\nVALUES ");
            for (row, command) in group.iter().enumerate() {
                if row > 0 {
                    sql.push_str(",\n");
                }
                let values = command
                    .value_modifications()
                    .map(|m| current_placeholder(m, placeholders))
                    .collect::<Result<Vec<_>, _>>()?
                    .join(", ");
                let _ = write!(sql, "({values})");
            }
        }

        if !first.requires_read_back() {
            let _ = writeln!(sql, "{terminator}");
            return Ok(ResultSetMapping::NoResultSet);
        }

        let reads = read_columns(first, helper);
        if self.dialect.supports_returning() {
            let _ = writeln!(sql, "\nRETURNING {reads}{terminator}");
            return Ok(ResultSetMapping::LastInResultSet);
        }

        let _ = writeln!(sql, "{terminator}");
        let mut conditions = vec![format!("{} = 1", self.dialect.rows_affected_function())];
        for key in first.key_modifications() {
            let value = if key.is_read() {
                self.dialect.identity_function().to_string()
            } else {
                current_placeholder(key, placeholders)?
            };
            conditions.push(format!("{} = {}", helper.delimit_identifier(key.column_name()), value));
        }
        let _ = writeln!(
            sql,
            "SELECT {reads}\nFROM {table}\nWHERE {}{terminator}",
            conditions.join(" AND ")
        );
        Ok(ResultSetMapping::LastInResultSet)
    }

    fn append_update_operation(
        &self,
        sql: &mut String,
        command: &ModificationCommand,
        placeholders: &Placeholders<'_>,
    ) -> Result<ResultSetMapping, SqlGenerationError> {
        let helper = self.dialect.helper();
        let table = helper.delimit_name(command.table());
        let assignments = command
            .value_modifications()
            .map(|m| {
                Ok(format!(
                    "{} = {}",
                    helper.delimit_identifier(m.column_name()),
                    current_placeholder(m, placeholders)?
                ))
            })
            .collect::<Result<Vec<_>, SqlGenerationError>>()?
            .join(", ");
        let where_clause = self.where_clause(command, placeholders)?;
        let _ = write!(sql, "UPDATE {table} SET {assignments}\nWHERE {where_clause}");
        self.append_rows_affected_check(sql, command, placeholders)
    }

    fn append_delete_operation(
        &self,
        sql: &mut String,
        command: &ModificationCommand,
        placeholders: &Placeholders<'_>,
    ) -> Result<ResultSetMapping, SqlGenerationError> {
        let helper = self.dialect.helper();
        let table = helper.delimit_name(command.table());
        let where_clause = self.where_clause(command, placeholders)?;
        let _ = write!(sql, "DELETE FROM {table}\nWHERE {where_clause}");
        self.append_rows_affected_check(sql, command, placeholders)
    }

    /// Finish an UPDATE or DELETE with the statement that reports how many
    /// rows it touched, reading back generated values when there are any.
    fn append_rows_affected_check(
        &self,
        sql: &mut String,
        command: &ModificationCommand,
        placeholders: &Placeholders<'_>,
    ) -> Result<ResultSetMapping, SqlGenerationError> {
        let helper = self.dialect.helper();
        let terminator = helper.statement_terminator();
        let rows_affected = self.dialect.rows_affected_function();

        if self.dialect.supports_returning() {
            let returning = if command.requires_read_back() {
                read_columns(command, helper)
            } else {
                rows_affected.to_string()
            };
            let _ = writeln!(sql, "\nRETURNING {returning}{terminator}");
            return Ok(ResultSetMapping::LastInResultSet);
        }

        let _ = writeln!(sql, "{terminator}");
        if command.requires_read_back() {
            let mut conditions = vec![format!("{rows_affected} = 1")];
            for key in command.key_modifications() {
                conditions.push(self.condition(key, placeholders)?);
            }
            let _ = writeln!(
                sql,
                "SELECT {}\nFROM {}\nWHERE {}{terminator}",
                read_columns(command, helper),
                helper.delimit_name(command.table()),
                conditions.join(" AND ")
            );
        } else {
            let _ = writeln!(sql, "SELECT {rows_affected}{terminator}");
        }
        Ok(ResultSetMapping::LastInResultSet)
    }

    fn where_clause(
        &self,
        command: &ModificationCommand,
        placeholders: &Placeholders<'_>,
    ) -> Result<String, SqlGenerationError> {
        Ok(command
            .condition_modifications()
            .map(|m| self.condition(m, placeholders))
            .collect::<Result<Vec<_>, _>>()?
            .join(" AND "))
    }

    fn condition(
        &self,
        modification: &ColumnModification,
        placeholders: &Placeholders<'_>,
    ) -> Result<String, SqlGenerationError> {
        let column = self.dialect.helper().delimit_identifier(modification.column_name());
        if !modification.use_original_value_parameter() {
            return Ok(format!("{column} IS NULL"));
        }
        let name = modification.original_parameter_name().unwrap_or_default();
        let placeholder = placeholders
            .get(name)
            .ok_or_else(|| SqlGenerationError::UnboundParameter(name.to_string()))?;
        Ok(format!("{column} = {placeholder}"))
    }
}

fn current_placeholder(
    modification: &ColumnModification,
    placeholders: &Placeholders<'_>,
) -> Result<String, SqlGenerationError> {
    let name = modification.parameter_name().unwrap_or_default();
    placeholders
        .get(name)
        .cloned()
        .ok_or_else(|| SqlGenerationError::UnboundParameter(name.to_string()))
}

fn read_columns(command: &ModificationCommand, helper: &crate::sql::SqlGenerationHelper) -> String {
    command
        .read_modifications()
        .map(|m| helper.delimit_identifier(m.column_name()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Two inserts can share a multi-row VALUES list when they target the same
/// table with the same written and read-back columns.
fn can_merge_inserts(first: &ModificationCommand, next: &ModificationCommand) -> bool {
    fn shape(c: &ModificationCommand) -> (Vec<&str>, Vec<&str>) {
        (
            c.value_modifications().map(ColumnModification::column_name).collect(),
            c.read_modifications().map(ColumnModification::column_name).collect(),
        )
    }
    next.state().is_insert()
        && first.table() == next.table()
        && first.value_modifications().next().is_some()
        && shape(first) == shape(next)
}
