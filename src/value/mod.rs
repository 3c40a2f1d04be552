//! Value type system for relmig
//!
//! [`Value`] is the single representation of row data flowing through the
//! crate: seed rows in schema snapshots, column modifications in update
//! commands, literals in generated scripts and results read back from the
//! executor.

pub mod types;

pub use types::Value;
