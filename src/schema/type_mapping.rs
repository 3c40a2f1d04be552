//! Logical type to store type resolution.
//!
//! The differ and the SQL generators only ever see store type names; which
//! provider table produced them is not their concern.

use std::collections::HashMap;
use std::fmt;

use super::error::SchemaError;
use super::table::Column;

/// Resolves a column's logical type to a provider store type name.
pub trait TypeMapper: Send + Sync + fmt::Debug {
    /// # Errors
    ///
    /// Returns [`SchemaError::UnmappedType`] when the logical type is unknown.
    fn store_type(&self, logical_type: &str, max_length: Option<u32>) -> Result<String, SchemaError>;

    /// Store type for `column`, honouring an explicit `store_type`.
    fn column_type(&self, column: &Column) -> Result<String, SchemaError> {
        match &column.store_type {
            Some(store_type) => Ok(store_type.clone()),
            None => self.store_type(&column.logical_type, column.max_length),
        }
    }
}

/// PostgreSQL-flavoured defaults with per-type overrides.
#[derive(Debug, Clone, Default)]
pub struct DefaultTypeMapper {
    overrides: HashMap<String, String>,
}

impl DefaultTypeMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `logical_type` (case-insensitive) to `store_type` verbatim.
    pub fn with_override(mut self, logical_type: &str, store_type: impl Into<String>) -> Self {
        self.overrides
            .insert(logical_type.to_lowercase(), store_type.into());
        self
    }
}

impl TypeMapper for DefaultTypeMapper {
    fn store_type(&self, logical_type: &str, max_length: Option<u32>) -> Result<String, SchemaError> {
        let lower = logical_type.to_lowercase();
        if let Some(store_type) = self.overrides.get(&lower) {
            return Ok(store_type.clone());
        }

        let mapped = match lower.as_str() {
            "bool" | "boolean" => "boolean".to_string(),
            "short" | "i16" | "smallint" => "smallint".to_string(),
            "int" | "i32" | "integer" => "integer".to_string(),
            "long" | "i64" | "bigint" => "bigint".to_string(),
            "float" | "f32" | "real" => "real".to_string(),
            "double" | "f64" => "double precision".to_string(),
            "decimal" | "numeric" => "numeric".to_string(),
            "string" | "text" => match max_length {
                Some(n) => format!("character varying({n})"),
                None => "text".to_string(),
            },
            "bytes" | "binary" => "bytea".to_string(),
            "uuid" | "guid" => "uuid".to_string(),
            "date" => "date".to_string(),
            "time" => "time".to_string(),
            "datetime" | "timestamp" => "timestamp with time zone".to_string(),
            "json" | "jsonb" => "jsonb".to_string(),
            _ => return Err(SchemaError::UnmappedType(logical_type.to_string())),
        };
        Ok(mapped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_length_drives_varchar() {
        let mapper = DefaultTypeMapper::new();
        assert_eq!(mapper.store_type("string", Some(150)).unwrap(), "character varying(150)");
        assert_eq!(mapper.store_type("String", None).unwrap(), "text");
    }

    #[test]
    fn test_explicit_store_type_wins() {
        let mapper = DefaultTypeMapper::new();
        let column = Column::new("Total", "int").store_type("numeric(10,2)");
        assert_eq!(mapper.column_type(&column).unwrap(), "numeric(10,2)");
    }

    #[test]
    fn test_override_and_unknown() {
        let mapper = DefaultTypeMapper::new().with_override("Money", "money");
        assert_eq!(mapper.store_type("money", None).unwrap(), "money");
        assert!(matches!(
            mapper.store_type("hologram", None),
            Err(SchemaError::UnmappedType(t)) if t == "hologram"
        ));
    }
}
