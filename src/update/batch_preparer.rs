//! Ordering and grouping of modification commands into batches.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use crate::config::MigrationsConfig;
use crate::schema::SchemaSnapshot;
use crate::sql::SqlDialect;
use crate::update::batch::ModificationCommandBatch;
use crate::update::command::ModificationCommand;
use crate::update::dependency_graph::CommandGraph;
use crate::update::error::UpdateError;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Size limits applied while batching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_commands: usize,
    pub max_parameters: usize,
    /// Batches with fewer commands are split into single-command batches.
    pub min_batch_size: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_commands: 1000,
            max_parameters: 65535,
            min_batch_size: 1,
        }
    }
}

impl From<&MigrationsConfig> for BatchLimits {
    fn from(config: &MigrationsConfig) -> Self {
        Self {
            max_commands: config.max_batch_size.max(1),
            max_parameters: config.max_parameters.max(1),
            min_batch_size: config.min_batch_size,
        }
    }
}

/// Groups commands into batches that respect foreign key and uniqueness
/// dependencies and the provider's size limits.
#[derive(Debug, Clone)]
pub struct CommandBatchPreparer {
    dialect: Arc<dyn SqlDialect>,
    limits: BatchLimits,
}

impl CommandBatchPreparer {
    pub fn new(dialect: Arc<dyn SqlDialect>, limits: BatchLimits) -> Self {
        Self { dialect, limits }
    }

    pub fn limits(&self) -> BatchLimits {
        self.limits
    }

    fn parameter_limit(&self) -> usize {
        self.limits.max_parameters.min(self.dialect.max_parameters())
    }

    /// Order `commands` by their dependencies in `model` and group them into
    /// batches.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::MalformedCommand`] for a command that cannot be rendered
    /// - [`UpdateError::CyclicDependency`] when the rows depend on each other
    /// - [`UpdateError::ParameterLimitExceeded`] for a command that cannot fit
    ///   in any batch
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(commands = commands.len())))]
    pub fn prepare(
        &self,
        model: &SchemaSnapshot,
        commands: Vec<ModificationCommand>,
    ) -> Result<Vec<ModificationCommandBatch>, UpdateError> {
        let start = Instant::now();
        for command in &commands {
            command.validate()?;
        }

        let graph = CommandGraph::build(&commands, model);
        let order = graph.topological_order(&commands)?;
        let read_back: Vec<bool> = commands.iter().map(ModificationCommand::requires_read_back).collect();
        let limit = self.parameter_limit();
        let command_count = commands.len();

        let mut slots: Vec<Option<ModificationCommand>> = commands.into_iter().map(Some).collect();
        let mut batches = Vec::new();
        let mut current = ModificationCommandBatch::new();
        let mut in_current: HashSet<usize> = HashSet::new();
        let mut current_standalone = false;

        for index in order {
            let Some(command) = slots[index].take() else {
                continue;
            };
            let parameters = command.parameter_count();
            if parameters > limit {
                return Err(UpdateError::ParameterLimitExceeded {
                    command: command.to_string(),
                    parameters,
                    limit,
                });
            }

            let standalone = self.dialect.requires_standalone(&command);
            let waits_on_read_back = graph
                .predecessors(index)
                .iter()
                .any(|p| in_current.contains(p) && read_back[*p]);
            let full = current.len() >= self.limits.max_commands
                || current.parameter_count() + parameters > limit;

            if !current.is_empty() && (standalone || current_standalone || waits_on_read_back || full) {
                batches.push(std::mem::take(&mut current));
                in_current.clear();
            }

            current.push(command);
            in_current.insert(index);
            current_standalone = standalone;
        }
        if !current.is_empty() {
            batches.push(current);
        }

        let batches = self.split_small_batches(batches);

        log::debug!(
            "Prepared {} command(s) into {} batch(es) ({} dependency edge(s))",
            command_count,
            batches.len(),
            graph.edge_count()
        );
        #[cfg(feature = "metrics")]
        METRICS.record_prepare(batches.len(), command_count, start.elapsed());
        #[cfg(not(feature = "metrics"))]
        let _ = start;

        Ok(batches)
    }

    fn split_small_batches(&self, batches: Vec<ModificationCommandBatch>) -> Vec<ModificationCommandBatch> {
        if self.limits.min_batch_size <= 1 {
            return batches;
        }
        let mut result = Vec::with_capacity(batches.len());
        for batch in batches {
            if batch.len() >= self.limits.min_batch_size {
                result.push(batch);
                continue;
            }
            for command in batch.into_commands() {
                let mut single = ModificationCommandBatch::new();
                single.push(command);
                result.push(single);
            }
        }
        result
    }
}

/// Dependency order of `commands` as indices into the slice, without
/// batching.
///
/// # Errors
///
/// Returns [`UpdateError::CyclicDependency`] when the rows depend on each other.
pub fn order_commands(model: &SchemaSnapshot, commands: &[ModificationCommand]) -> Result<Vec<usize>, UpdateError> {
    CommandGraph::build(commands, model).topological_order(commands)
}
