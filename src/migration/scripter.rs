//! Whole-database scripts spanning several migrations.

use std::str::FromStr;

use crate::migration::error::HistoryError;
use crate::migration::history::{HistoryRepository, HistoryRow};
use crate::migration::migration::{Migration, MigrationId};
use crate::migration::sql_generator::{MigrationCommand, MigrationsSqlGenerator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptOptions {
    /// Guard every statement so the script can be re-run against a database
    /// in any intermediate state.
    pub idempotent: bool,
    /// Prefix the script with the history table DDL.
    pub create_history_table: bool,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            idempotent: false,
            create_history_table: true,
        }
    }
}

/// Migration name standing for the empty database.
pub const INITIAL_DATABASE: &str = "0";

/// Where a script leaves the database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ScriptTarget {
    /// After the newest migration.
    #[default]
    Latest,
    /// Before the first migration.
    Initial,
    /// Right after this migration.
    Migration(MigrationId),
}

impl FromStr for ScriptTarget {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == INITIAL_DATABASE {
            return Ok(ScriptTarget::Initial);
        }
        s.parse().map(ScriptTarget::Migration)
    }
}

/// Renders a range of migrations, plus their history bookkeeping, as one
/// script.
#[derive(Debug, Clone)]
pub struct MigrationScripter {
    generator: MigrationsSqlGenerator,
    history: HistoryRepository,
}

impl MigrationScripter {
    pub fn new(generator: MigrationsSqlGenerator, history: HistoryRepository) -> Self {
        Self { generator, history }
    }

    /// Script moving a database from `from` to `to`.
    ///
    /// `None` for `from` is the empty database. When `to` lies before `from`
    /// the script reverts migrations newest first using their `down`
    /// operations; [`ScriptTarget::Initial`] reverts every one up to `from`.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::SqlGeneration`] if an operation cannot be
    /// rendered.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(migrations = migrations.len())))]
    pub fn generate_script(
        &self,
        migrations: &[Migration],
        from: Option<&MigrationId>,
        to: &ScriptTarget,
        options: ScriptOptions,
    ) -> Result<String, HistoryError> {
        let mut ordered: Vec<&Migration> = migrations.iter().collect();
        ordered.sort_by(|a, b| a.id.cmp(&b.id));

        // Lower bound (exclusive) of a revert, `None` when reverting to empty.
        let revert_to = match (from, to) {
            (Some(_), ScriptTarget::Initial) => Some(None),
            (Some(from), ScriptTarget::Migration(to)) if to < from => Some(Some(to)),
            _ => None,
        };
        let mut script = String::new();

        if let Some(lower) = revert_to {
            let selected: Vec<&Migration> = ordered
                .into_iter()
                .rev()
                .filter(|m| from.map_or(true, |f| m.id <= *f) && lower.map_or(true, |t| m.id > *t))
                .collect();
            log::info!("Scripting revert of {} migration(s)", selected.len());
            for migration in selected {
                self.revert(migration, options, &mut script)?;
            }
            return Ok(script);
        }
        if *to == ScriptTarget::Initial {
            log::info!("Database is already at its initial state");
            return Ok(script);
        }

        if options.create_history_table {
            let create = if options.idempotent {
                self.history.create_if_not_exists_script()?
            } else {
                self.history.create_script()?
            };
            script.push_str(&create);
        }

        let selected: Vec<&Migration> = ordered
            .into_iter()
            .filter(|m| {
                from.map_or(true, |f| m.id > *f)
                    && match to {
                        ScriptTarget::Migration(t) => m.id <= *t,
                        _ => true,
                    }
            })
            .collect();
        log::info!("Scripting {} migration(s)", selected.len());
        for migration in selected {
            self.apply(migration, options, &mut script)?;
        }
        Ok(script)
    }

    fn apply(&self, migration: &Migration, options: ScriptOptions, script: &mut String) -> Result<(), HistoryError> {
        let id = migration.id.to_string();
        let commands = self.generator.generate(&migration.up)?;
        let insert = self.history.insert_script(&HistoryRow {
            migration_id: id.clone(),
            product_version: self.history.product_version().to_string(),
        });
        for text in statements(&commands).chain(std::iter::once(insert)) {
            if options.idempotent {
                self.guarded(&self.history.begin_if_not_exists(&id), &text, script);
            } else {
                self.unguarded(&text, script);
            }
        }
        Ok(())
    }

    fn revert(&self, migration: &Migration, options: ScriptOptions, script: &mut String) -> Result<(), HistoryError> {
        let id = migration.id.to_string();
        let commands = self.generator.generate(&migration.down)?;
        let delete = self.history.delete_script(&id);
        for text in statements(&commands).chain(std::iter::once(delete)) {
            if options.idempotent {
                self.guarded(&self.history.begin_if_exists(&id), &text, script);
            } else {
                self.unguarded(&text, script);
            }
        }
        Ok(())
    }

    fn guarded(&self, begin: &str, text: &str, script: &mut String) {
        script.push_str(begin);
        for line in text.lines() {
            script.push_str("    ");
            script.push_str(line);
            script.push('\n');
        }
        script.push_str(&self.history.end_if());
        self.end_batch(script);
    }

    fn unguarded(&self, text: &str, script: &mut String) {
        script.push_str(text);
        self.end_batch(script);
    }

    fn end_batch(&self, script: &mut String) {
        script.push('\n');
        let batch_terminator = self.generator.dialect().helper().batch_terminator();
        if !batch_terminator.is_empty() {
            script.push_str(batch_terminator);
            script.push_str("\n\n");
        }
    }
}

fn statements(commands: &[MigrationCommand]) -> impl Iterator<Item = String> + '_ {
    commands.iter().map(|command| command.command_text.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::operations::{MigrationOperation, SqlOperation};

    fn migration(id: &str, up: &str, down: &str) -> Migration {
        Migration {
            id: id.parse().unwrap(),
            up: vec![MigrationOperation::Sql(SqlOperation {
                sql: up.to_string(),
                suppress_transaction: false,
            })],
            down: vec![MigrationOperation::Sql(SqlOperation {
                sql: down.to_string(),
                suppress_transaction: false,
            })],
        }
    }

    fn scripter() -> MigrationScripter {
        MigrationScripter::new(MigrationsSqlGenerator::default(), HistoryRepository::default())
    }

    fn migrations() -> Vec<Migration> {
        vec![
            migration("20240201000000_Second", "SELECT 2", "SELECT -2"),
            migration("20240101000000_First", "SELECT 1", "SELECT -1"),
        ]
    }

    #[test]
    fn test_up_script_runs_in_id_order_with_history_inserts() {
        let options = ScriptOptions {
            create_history_table: false,
            ..ScriptOptions::default()
        };
        let script = scripter().generate_script(&migrations(), None, &ScriptTarget::Latest, options).unwrap();
        let version = env!("CARGO_PKG_VERSION");
        assert_eq!(
            script,
            format!(
                concat!(
                    "SELECT 1;\n\n",
                    "INSERT INTO \"__EFMigrationsHistory\" (\"MigrationId\", \"ProductVersion\")\n",
                    "VALUES ('20240101000000_First', '{v}');\n\n",
                    "SELECT 2;\n\n",
                    "INSERT INTO \"__EFMigrationsHistory\" (\"MigrationId\", \"ProductVersion\")\n",
                    "VALUES ('20240201000000_Second', '{v}');\n\n",
                ),
                v = version
            )
        );
    }

    #[test]
    fn test_range_is_exclusive_of_from() {
        let from: MigrationId = "20240101000000_First".parse().unwrap();
        let options = ScriptOptions {
            create_history_table: false,
            ..ScriptOptions::default()
        };
        let script = scripter().generate_script(&migrations(), Some(&from), &ScriptTarget::Latest, options).unwrap();
        assert!(!script.contains("SELECT 1;"));
        assert!(script.starts_with("SELECT 2;\n"));
    }

    #[test]
    fn test_idempotent_script_guards_every_statement() {
        let options = ScriptOptions {
            idempotent: true,
            create_history_table: true,
        };
        let script = scripter().generate_script(&migrations()[1..], None, &ScriptTarget::Latest, options).unwrap();
        assert!(script.starts_with("CREATE TABLE IF NOT EXISTS \"__EFMigrationsHistory\""));
        assert_eq!(script.matches("DO $EF$\nBEGIN\n    IF NOT EXISTS(").count(), 2);
        assert!(script.contains("THEN\n    SELECT 1;\n    END IF;\nEND $EF$;\n"));
    }

    #[test]
    fn test_down_script_reverts_newest_first() {
        let from: MigrationId = "20240201000000_Second".parse().unwrap();
        let to: ScriptTarget = "20240101000000_First".parse().unwrap();
        let options = ScriptOptions {
            idempotent: true,
            create_history_table: true,
        };
        let script = scripter()
            .generate_script(&migrations(), Some(&from), &to, options)
            .unwrap();
        assert!(!script.contains("CREATE TABLE"));
        assert!(!script.contains("SELECT -1"));
        assert!(script.contains("IF EXISTS(SELECT 1 FROM \"__EFMigrationsHistory\" WHERE \"MigrationId\" = '20240201000000_Second')"));
        let revert = script.find("SELECT -2;").unwrap();
        let delete = script.find("DELETE FROM \"__EFMigrationsHistory\"").unwrap();
        assert!(revert < delete);
    }

    #[test]
    fn test_initial_target_reverts_everything() {
        let from: MigrationId = "20240201000000_Second".parse().unwrap();
        let to: ScriptTarget = INITIAL_DATABASE.parse().unwrap();
        assert_eq!(to, ScriptTarget::Initial);

        let script = scripter()
            .generate_script(&migrations(), Some(&from), &to, ScriptOptions::default())
            .unwrap();
        let second = script.find("SELECT -2;").unwrap();
        let first = script.find("SELECT -1;").unwrap();
        assert!(second < first);
        assert_eq!(script.matches("DELETE FROM \"__EFMigrationsHistory\"").count(), 2);
        assert!(!script.contains("CREATE TABLE"));

        let nothing = scripter()
            .generate_script(&migrations(), None, &to, ScriptOptions::default())
            .unwrap();
        assert!(nothing.is_empty());
    }
}
