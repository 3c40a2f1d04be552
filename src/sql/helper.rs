//! Identifier delimiting and literal escaping.
//!
//! Every identifier and string literal that ends up in generated SQL passes
//! through [`SqlGenerationHelper`]; nothing else in the crate concatenates raw
//! names into statements.

use crate::schema::QualifiedName;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlGenerationHelper {
    open_delimiter: char,
    close_delimiter: char,
    statement_terminator: &'static str,
    batch_terminator: &'static str,
}

impl Default for SqlGenerationHelper {
    fn default() -> Self {
        Self::ansi()
    }
}

impl SqlGenerationHelper {
    /// Double-quoted identifiers, `;` terminator.
    pub const fn ansi() -> Self {
        Self {
            open_delimiter: '"',
            close_delimiter: '"',
            statement_terminator: ";",
            batch_terminator: "",
        }
    }

    /// `[bracketed]` identifiers with a `GO` batch terminator.
    pub const fn bracketed() -> Self {
        Self {
            open_delimiter: '[',
            close_delimiter: ']',
            statement_terminator: ";",
            batch_terminator: "GO",
        }
    }

    pub fn statement_terminator(&self) -> &'static str {
        self.statement_terminator
    }

    pub fn batch_terminator(&self) -> &'static str {
        self.batch_terminator
    }

    /// Escape the closing delimiter by doubling it.
    pub fn escape_identifier(&self, identifier: &str) -> String {
        let close = self.close_delimiter.to_string();
        identifier.replace(&close, &close.repeat(2))
    }

    pub fn delimit_identifier(&self, identifier: &str) -> String {
        format!(
            "{}{}{}",
            self.open_delimiter,
            self.escape_identifier(identifier),
            self.close_delimiter
        )
    }

    /// `"schema"."name"`, or just `"name"` without a schema.
    pub fn delimit_qualified(&self, name: &str, schema: Option<&str>) -> String {
        match schema {
            Some(schema) => format!(
                "{}.{}",
                self.delimit_identifier(schema),
                self.delimit_identifier(name)
            ),
            None => self.delimit_identifier(name),
        }
    }

    pub fn delimit_name(&self, name: &QualifiedName) -> String {
        self.delimit_qualified(&name.name, name.schema.as_deref())
    }

    /// Escape single quotes by doubling them.
    pub fn escape_literal(&self, literal: &str) -> String {
        literal.replace('\'', "''")
    }

    pub fn string_literal(&self, literal: &str) -> String {
        format!("'{}'", self.escape_literal(literal))
    }
}
