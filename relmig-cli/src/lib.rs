//! relmig CLI library
//!
//! File handling behind the `relmig` binary: model snapshots and migration
//! documents are JSON files, one migration per file named after its id.

pub mod files;

pub use files::{load_migrations, load_snapshot, pending_migrations, write_migration, FileError};
