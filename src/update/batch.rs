//! Batches of modification commands sharing one round trip.

use crate::update::command::ModificationCommand;
use crate::value::Value;

/// Hands out batch-local parameter names `p0`, `p1`, ...
#[derive(Debug, Default, Clone)]
pub struct ParameterNameGenerator {
    count: usize,
}

impl ParameterNameGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generate_next(&mut self) -> String {
        let name = format!("p{}", self.count);
        self.count += 1;
        name
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}

/// A parameter name bound to the value it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterBinding {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, Default)]
pub struct ModificationCommandBatch {
    commands: Vec<ModificationCommand>,
    parameters: Vec<ParameterBinding>,
    names: ParameterNameGenerator,
}

impl ModificationCommandBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `command`, naming its parameters by their batch-local position.
    pub fn push(&mut self, mut command: ModificationCommand) {
        for modification in command.column_modifications_mut() {
            let current = if modification.use_current_value_parameter() {
                let name = self.names.generate_next();
                self.parameters.push(ParameterBinding {
                    name: name.clone(),
                    value: modification.value().cloned().unwrap_or(Value::Null),
                });
                Some(name)
            } else {
                None
            };
            let original = if modification.use_original_value_parameter() {
                let name = self.names.generate_next();
                self.parameters.push(ParameterBinding {
                    name: name.clone(),
                    value: modification.original_value().cloned().unwrap_or(Value::Null),
                });
                Some(name)
            } else {
                None
            };
            modification.set_parameter_names(current, original);
        }
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[ModificationCommand] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<ModificationCommand> {
        self.commands
    }

    pub fn parameters(&self) -> &[ParameterBinding] {
        &self.parameters
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Rows that updates and deletes in this batch must hit: one per
    /// key-matching command.
    pub fn expected_rows_affected(&self) -> u64 {
        self.commands
            .iter()
            .filter(|c| !c.state().is_insert())
            .count() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::{ColumnModification, EntityState};

    #[test]
    fn test_push_names_parameters_in_order() {
        let mut batch = ModificationCommandBatch::new();
        batch.push(
            ModificationCommand::new(
                "Ducks",
                EntityState::Added,
                vec![
                    ColumnModification::new("Id").key().read(),
                    ColumnModification::new("Name").write("Mallard"),
                ],
            )
            .unwrap(),
        );
        batch.push(
            ModificationCommand::new(
                "Ducks",
                EntityState::Modified,
                vec![
                    ColumnModification::new("Id").key().condition(5),
                    ColumnModification::new("Name").write("Teal"),
                ],
            )
            .unwrap(),
        );

        let names: Vec<_> = batch.parameters().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["p0", "p1", "p2"]);
        assert_eq!(batch.parameters()[1].value, Value::Int(5));
        let update = &batch.commands()[1];
        assert_eq!(update.column_modifications()[0].original_parameter_name(), Some("p1"));
        assert_eq!(update.column_modifications()[1].parameter_name(), Some("p2"));
        assert_eq!(batch.expected_rows_affected(), 1);
    }
}
