//! One column's part in a row modification.

use crate::value::Value;

/// A column participating in an insert, update or delete.
///
/// Flags:
/// - `is_write`: the column appears in `SET` / `VALUES` with its current value
/// - `is_condition`: the column appears in `WHERE` with its original value
/// - `is_key`: the column identifies the row
/// - `is_read`: the database generates the value and it must be read back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnModification {
    column_name: String,
    parameter_name: Option<String>,
    original_parameter_name: Option<String>,
    original_value: Option<Value>,
    value: Option<Value>,
    is_read: bool,
    is_write: bool,
    is_key: bool,
    is_condition: bool,
}

impl ColumnModification {
    pub fn new(column_name: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
            parameter_name: None,
            original_parameter_name: None,
            original_value: None,
            value: None,
            is_read: false,
            is_write: false,
            is_key: false,
            is_condition: false,
        }
    }

    /// Write `value` into the column.
    pub fn write(mut self, value: impl Into<Value>) -> Self {
        self.is_write = true;
        self.value = Some(value.into());
        self
    }

    /// Match the row on the column's `original` value.
    pub fn condition(mut self, original: impl Into<Value>) -> Self {
        self.is_condition = true;
        self.original_value = Some(original.into());
        self
    }

    /// Record the value the column held before the change without making it
    /// part of the statement.
    pub fn original(mut self, original: impl Into<Value>) -> Self {
        self.original_value = Some(original.into());
        self
    }

    pub fn key(mut self) -> Self {
        self.is_key = true;
        self
    }

    pub fn read(mut self) -> Self {
        self.is_read = true;
        self
    }

    pub fn column_name(&self) -> &str {
        &self.column_name
    }

    pub fn parameter_name(&self) -> Option<&str> {
        self.parameter_name.as_deref()
    }

    pub fn original_parameter_name(&self) -> Option<&str> {
        self.original_parameter_name.as_deref()
    }

    pub fn original_value(&self) -> Option<&Value> {
        self.original_value.as_ref()
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn is_read(&self) -> bool {
        self.is_read
    }

    pub fn is_write(&self) -> bool {
        self.is_write
    }

    pub fn is_key(&self) -> bool {
        self.is_key
    }

    pub fn is_condition(&self) -> bool {
        self.is_condition
    }

    /// The current value is sent as a parameter.
    pub fn use_current_value_parameter(&self) -> bool {
        self.is_write
    }

    /// The original value is sent as a parameter. Null originals are
    /// rendered as `IS NULL` and need none.
    pub fn use_original_value_parameter(&self) -> bool {
        self.is_condition && self.original_value.as_ref().is_some_and(|v| !v.is_null())
    }

    pub fn parameter_count(&self) -> usize {
        usize::from(self.use_current_value_parameter()) + usize::from(self.use_original_value_parameter())
    }

    pub(crate) fn set_parameter_names(&mut self, current: Option<String>, original: Option<String>) {
        self.parameter_name = current;
        self.original_parameter_name = original;
    }
}
