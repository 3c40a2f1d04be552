//! Errors raised while preparing modification command batches.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdateError {
    #[error("modification command for '{table}' has no column modifications")]
    EmptyCommand { table: String },

    #[error("malformed command {command}: {reason}")]
    MalformedCommand { command: String, reason: &'static str },

    #[error("cyclic dependency detected between commands: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("command {command} needs {parameters} parameters but a batch may hold at most {limit}")]
    ParameterLimitExceeded {
        command: String,
        parameters: usize,
        limit: usize,
    },
}

/// Raised by callers when a batch affected a different number of rows than
/// the generator expected. The data changed underneath the update.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected {expected} row(s) to be affected but {actual} were; commands: {}", .commands.join(", "))]
pub struct ConcurrencyConflict {
    pub expected: u64,
    pub actual: u64,
    pub commands: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_commands() {
        let err = UpdateError::CyclicDependency {
            cycle: vec!["Insert A {Id: 1}".into(), "Insert B {Id: 1}".into(), "Insert A {Id: 1}".into()],
        };
        assert_eq!(
            err.to_string(),
            "cyclic dependency detected between commands: Insert A {Id: 1} -> Insert B {Id: 1} -> Insert A {Id: 1}"
        );
    }
}
