//! Snapshot and migration files.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use relmig::migration::{HistoryRow, Migration};
use relmig::schema::{SchemaError, SchemaSnapshot};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("failed to read or write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{path}' is not a valid snapshot: {source}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: SchemaError,
    },

    #[error("'{path}' is not a valid migration: {source}")]
    Migration {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("migration '{0}' is defined more than once")]
    DuplicateMigration(String),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> FileError + '_ {
    move |source| FileError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Read a snapshot; `None` stands for the empty model.
///
/// # Errors
///
/// Returns [`FileError`] if the file cannot be read or is not a valid snapshot.
pub fn load_snapshot(path: Option<&Path>) -> Result<Option<SchemaSnapshot>, FileError> {
    let Some(path) = path else {
        return Ok(None);
    };
    let json = fs::read_to_string(path).map_err(io_error(path))?;
    let snapshot = SchemaSnapshot::from_json(&json).map_err(|source| FileError::Snapshot {
        path: path.to_path_buf(),
        source,
    })?;
    log::debug!("Loaded snapshot {} ({} table(s))", path.display(), snapshot.tables.len());
    Ok(Some(snapshot))
}

/// Write `migration` to `<dir>/<id>.json`, creating `dir` if needed.
///
/// # Errors
///
/// Returns [`FileError`] if the directory or file cannot be written.
pub fn write_migration(dir: &Path, migration: &Migration) -> Result<PathBuf, FileError> {
    fs::create_dir_all(dir).map_err(io_error(dir))?;
    let path = dir.join(format!("{}.json", migration.id));
    let json = serde_json::to_string_pretty(migration).map_err(|source| FileError::Migration {
        path: path.clone(),
        source,
    })?;
    fs::write(&path, json).map_err(io_error(&path))?;
    Ok(path)
}

/// Every `*.json` migration in `dir`, in id order. A missing directory holds
/// no migrations.
///
/// # Errors
///
/// Returns [`FileError`] for unreadable or malformed files and for ids that
/// appear twice.
pub fn load_migrations(dir: &Path) -> Result<Vec<Migration>, FileError> {
    if !dir.exists() {
        log::warn!("Migrations directory {} does not exist", dir.display());
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error(dir))? {
        let path = entry.map_err(io_error(dir))?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }

    let mut seen = HashSet::new();
    let mut migrations = Vec::with_capacity(paths.len());
    for path in paths {
        let json = fs::read_to_string(&path).map_err(io_error(&path))?;
        let migration: Migration = serde_json::from_str(&json).map_err(|source| FileError::Migration {
            path: path.clone(),
            source,
        })?;
        if !seen.insert(migration.id.clone()) {
            return Err(FileError::DuplicateMigration(migration.id.to_string()));
        }
        migrations.push(migration);
    }
    migrations.sort_by(|a, b| a.id.cmp(&b.id));
    log::debug!("Loaded {} migration(s) from {}", migrations.len(), dir.display());
    Ok(migrations)
}

/// Migrations not recorded in `applied`, in id order.
pub fn pending_migrations<'a>(migrations: &'a [Migration], applied: &[HistoryRow]) -> Vec<&'a Migration> {
    let applied: HashSet<&str> = applied.iter().map(|row| row.migration_id.as_str()).collect();
    migrations
        .iter()
        .filter(|migration| !applied.contains(migration.id.to_string().as_str()))
        .collect()
}
