//! Migration identity and the up/down operation pair.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::migration::error::HistoryError;
use crate::migration::operations::MigrationOperation;

/// `YYYYMMDDHHMMSS_Name`
static MIGRATION_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{14})_([A-Za-z0-9_]+)$").unwrap_or_else(|_| unreachable!("migration id pattern is valid"))
});

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Identifier of a migration, e.g. `20240120120000_CreateBlogs`.
///
/// Ids sort by timestamp first, which is the order migrations are applied in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MigrationId {
    timestamp: String,
    name: String,
}

impl MigrationId {
    /// New id stamped with the current UTC time.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::InvalidMigrationId`] if `name` contains
    /// characters other than ASCII letters, digits and `_`.
    pub fn generate(name: &str) -> Result<Self, HistoryError> {
        Self::at(Utc::now(), name)
    }

    /// # Errors
    ///
    /// Same as [`generate`](Self::generate).
    pub fn at(timestamp: DateTime<Utc>, name: &str) -> Result<Self, HistoryError> {
        format!("{}_{}", timestamp.format(TIMESTAMP_FORMAT), name).parse()
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The timestamp part as a point in time.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(&self.timestamp, TIMESTAMP_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }
}

impl FromStr for MigrationId {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(HistoryError::EmptyMigrationId);
        }
        let captures = MIGRATION_ID
            .captures(s)
            .ok_or_else(|| HistoryError::InvalidMigrationId(s.to_string()))?;
        Ok(Self {
            timestamp: captures[1].to_string(),
            name: captures[2].to_string(),
        })
    }
}

impl TryFrom<String> for MigrationId {
    type Error = HistoryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MigrationId> for String {
    fn from(id: MigrationId) -> Self {
        id.to_string()
    }
}

impl fmt::Display for MigrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.timestamp, self.name)
    }
}

/// A named pair of operation sequences: `up` moves the schema forward, `down`
/// moves it back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Migration {
    pub id: MigrationId,
    pub up: Vec<MigrationOperation>,
    pub down: Vec<MigrationOperation>,
}
