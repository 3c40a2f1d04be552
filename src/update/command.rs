//! Row-level modification commands.

use std::collections::BTreeMap;
use std::fmt;

use crate::schema::QualifiedName;
use crate::update::column_modification::ColumnModification;
use crate::update::error::UpdateError;
use crate::value::Value;

/// What a command does to its row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityState {
    Added,
    Modified,
    Deleted,
}

impl EntityState {
    pub fn is_insert(self) -> bool {
        self == EntityState::Added
    }

    pub fn is_update(self) -> bool {
        self == EntityState::Modified
    }

    pub fn is_delete(self) -> bool {
        self == EntityState::Deleted
    }

    pub fn verb(self) -> &'static str {
        match self {
            EntityState::Added => "Insert",
            EntityState::Modified => "Update",
            EntityState::Deleted => "Delete",
        }
    }
}

/// One logical row mutation: a table plus the column modifications that
/// describe the insert, update or delete.
#[derive(Debug, Clone, PartialEq)]
pub struct ModificationCommand {
    table: QualifiedName,
    state: EntityState,
    column_modifications: Vec<ColumnModification>,
    /// Row values that are not part of the statement but matter for ordering,
    /// e.g. foreign key columns of a row being deleted.
    original_values: BTreeMap<String, Value>,
}

impl ModificationCommand {
    /// # Errors
    ///
    /// Returns [`UpdateError::EmptyCommand`] if `column_modifications` is empty.
    pub fn new(
        table: impl Into<QualifiedName>,
        state: EntityState,
        column_modifications: Vec<ColumnModification>,
    ) -> Result<Self, UpdateError> {
        let table = table.into();
        if column_modifications.is_empty() {
            return Err(UpdateError::EmptyCommand {
                table: table.to_string(),
            });
        }
        Ok(Self {
            table,
            state,
            column_modifications,
            original_values: BTreeMap::new(),
        })
    }

    pub fn with_original_values<I, K, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.original_values
            .extend(values.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn table(&self) -> &QualifiedName {
        &self.table
    }

    pub fn table_name(&self) -> &str {
        &self.table.name
    }

    pub fn schema(&self) -> Option<&str> {
        self.table.schema.as_deref()
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    pub fn column_modifications(&self) -> &[ColumnModification] {
        &self.column_modifications
    }

    pub(crate) fn column_modifications_mut(&mut self) -> &mut [ColumnModification] {
        &mut self.column_modifications
    }

    pub fn key_modifications(&self) -> impl Iterator<Item = &ColumnModification> {
        self.column_modifications.iter().filter(|m| m.is_key())
    }

    pub fn value_modifications(&self) -> impl Iterator<Item = &ColumnModification> {
        self.column_modifications.iter().filter(|m| m.is_write())
    }

    pub fn condition_modifications(&self) -> impl Iterator<Item = &ColumnModification> {
        self.column_modifications.iter().filter(|m| m.is_condition())
    }

    pub fn read_modifications(&self) -> impl Iterator<Item = &ColumnModification> {
        self.column_modifications.iter().filter(|m| m.is_read())
    }

    /// The command produces values that have to be read back.
    pub fn requires_read_back(&self) -> bool {
        self.column_modifications.iter().any(ColumnModification::is_read)
    }

    pub fn parameter_count(&self) -> usize {
        self.column_modifications
            .iter()
            .map(ColumnModification::parameter_count)
            .sum()
    }

    /// # Errors
    ///
    /// Returns [`UpdateError::MalformedCommand`] when the command could not be
    /// rendered into a meaningful statement.
    pub fn validate(&self) -> Result<(), UpdateError> {
        let malformed = |reason| UpdateError::MalformedCommand {
            command: self.to_string(),
            reason,
        };
        if self.value_modifications().next().is_none() && self.key_modifications().next().is_none() {
            return Err(malformed("it has neither key nor write columns"));
        }
        match self.state {
            EntityState::Added => Ok(()),
            EntityState::Modified if self.value_modifications().next().is_none() => {
                Err(malformed("an update must write at least one column"))
            }
            EntityState::Modified | EntityState::Deleted
                if self.condition_modifications().next().is_none() =>
            {
                Err(malformed("it has no condition columns to locate the row"))
            }
            _ => Ok(()),
        }
    }

    fn find(&self, column: &str) -> Option<&ColumnModification> {
        self.column_modifications
            .iter()
            .find(|m| m.column_name() == column)
    }

    /// Value the row holds after the command runs. `None` for deletes and for
    /// values the database will generate.
    pub fn current_value(&self, column: &str) -> Option<&Value> {
        if self.state.is_delete() {
            return None;
        }
        match self.find(column) {
            Some(m) if m.value().is_some() => m.value(),
            Some(m) if m.is_read() => None,
            Some(m) => m.original_value().or_else(|| self.original_values.get(column)),
            None => self.original_values.get(column),
        }
    }

    /// Value the row held before the command runs. `None` for inserts.
    pub fn original_value(&self, column: &str) -> Option<&Value> {
        if self.state.is_insert() {
            return None;
        }
        self.find(column)
            .and_then(ColumnModification::original_value)
            .or_else(|| self.original_values.get(column))
    }

    /// Current values of `columns` (original values for deletes), or `None`
    /// if any is unknown or null.
    pub(crate) fn values_of(&self, columns: &[String], original: bool) -> Option<Vec<Value>> {
        columns
            .iter()
            .map(|c| {
                let value = if original {
                    self.original_value(c)
                } else {
                    self.current_value(c)
                };
                value.filter(|v| !v.is_null()).cloned()
            })
            .collect()
    }
}

impl fmt::Display for ModificationCommand {
    /// `Insert Parent {Id: 1}`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {{", self.state.verb(), self.table)?;
        for (i, key) in self.key_modifications().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            let value = if self.state.is_insert() {
                key.value()
            } else {
                key.original_value().or(key.value())
            };
            match value {
                Some(value) => write!(f, "{}: {}", key.column_name(), value)?,
                None => write!(f, "{}: <generated>", key.column_name())?,
            }
        }
        write!(f, "}}")
    }
}
