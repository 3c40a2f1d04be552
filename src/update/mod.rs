//! Row modification commands, their batching and their DML rendering.
//!
//! ```text
//! Vec<ModificationCommand> ──CommandBatchPreparer──▶ Vec<ModificationCommandBatch>
//!                                                        │
//!                                     UpdateSqlGenerator ▼
//!                                                  BatchCommandText
//! ```

pub mod batch;
pub mod batch_preparer;
pub mod column_modification;
pub mod command;
pub mod dependency_graph;
pub mod error;
pub mod sql_generator;

pub use batch::{ModificationCommandBatch, ParameterBinding, ParameterNameGenerator};
pub use batch_preparer::{order_commands, BatchLimits, CommandBatchPreparer};
pub use column_modification::ColumnModification;
pub use command::{EntityState, ModificationCommand};
pub use dependency_graph::CommandGraph;
pub use error::{ConcurrencyConflict, UpdateError};
pub use sql_generator::{BatchCommandText, ResultSetMapping, UpdateSqlGenerator};
