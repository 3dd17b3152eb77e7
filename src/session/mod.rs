use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use thiserror::Error;

/// Feature key under which the submit action records its last attempt.
pub const SUBMIT_ATTEMPT_KEY: &str = "self-service-submit";

/// Errors that can occur during session store operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("invalid session entry for '{feature}': {source}")]
    Json {
        feature: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// A stored entry, as listed by `session show`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEntry {
    pub feature: String,
    pub value: String,
    pub updated_at: String,
}

/// SQLite-backed session cache.
///
/// Holds small JSON blobs keyed by feature name. Entries are read when a view
/// mounts and written on user action only; writes are last-write-wins.
pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    /// Open or create the session store at the given path.
    ///
    /// Creates the parent directory and the entries table if needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Store that lives only as long as the process.
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS session_entries (
                feature TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )?;
        Ok(Self { conn })
    }

    /// Read and decode the entry for `feature`, if any.
    pub fn get<T: DeserializeOwned>(&self, feature: &str) -> Result<Option<T>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM session_entries WHERE feature = ?1",
                params![feature],
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|text| {
            serde_json::from_str(&text).map_err(|source| SessionError::Json {
                feature: feature.to_string(),
                source,
            })
        })
        .transpose()
    }

    /// Write the entry for `feature`, replacing any previous value.
    pub fn put<T: Serialize>(&mut self, feature: &str, value: &T) -> Result<()> {
        let text = serde_json::to_string(value).map_err(|source| SessionError::Json {
            feature: feature.to_string(),
            source,
        })?;
        self.conn.execute(
            "INSERT INTO session_entries (feature, value, updated_at)
             VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(feature) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![feature, text],
        )?;
        Ok(())
    }

    /// Remove the entry for `feature`. Returns whether one existed.
    pub fn clear(&mut self, feature: &str) -> Result<bool> {
        let count = self.conn.execute(
            "DELETE FROM session_entries WHERE feature = ?1",
            params![feature],
        )?;
        Ok(count > 0)
    }

    /// Remove every entry. Returns the number removed.
    pub fn clear_all(&mut self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM session_entries", [])?)
    }

    /// List all entries sorted by feature name.
    pub fn entries(&self) -> Result<Vec<SessionEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT feature, value, updated_at FROM session_entries ORDER BY feature",
        )?;
        let entries = stmt
            .query_map([], |row| {
                Ok(SessionEntry {
                    feature: row.get(0)?,
                    value: row.get(1)?,
                    updated_at: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Record that the user attempted `feature` at `at`.
    pub fn record_attempt(&mut self, feature: &str, at: DateTime<Utc>) -> Result<()> {
        self.put(&attempt_key(feature), &at)
    }

    pub fn last_attempt(&self, feature: &str) -> Result<Option<DateTime<Utc>>> {
        self.get(&attempt_key(feature))
    }

    pub fn clear_attempt(&mut self, feature: &str) -> Result<bool> {
        self.clear(&attempt_key(feature))
    }
}

fn attempt_key(feature: &str) -> String {
    format!("{}:last-attempt", feature)
}
