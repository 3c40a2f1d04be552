//! Schema model: immutable snapshots of tables, columns, keys, indexes and
//! seed rows for one point in time.

pub mod error;
pub mod snapshot;
pub mod table;
pub mod type_mapping;

pub use error::SchemaError;
pub use snapshot::SchemaSnapshot;
pub use table::{
    Column, ForeignKey, Index, PrimaryKey, QualifiedName, ReferentialAction, SeedRow, Table,
    UniqueConstraint,
};
pub use type_mapping::{DefaultTypeMapper, TypeMapper};
