//! SQLite access for the memory tiers.
//!
//! All stores share one connection behind an async `RwLock`. Writers take the
//! write guard and open a transaction, so every mutation is atomic per record.
//!
//! SQL migrations are embedded as strings and executed when the database is opened.

use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{Error, Result};

/// Shared connection handle
pub type Db = Arc<RwLock<Connection>>;

/// Memory tables SQL (001)
pub const MEMORY_TABLES_SQL: &str = include_str!("migrations/001_memory_tables.sql");

/// Run all migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(MEMORY_TABLES_SQL)?;
    Ok(())
}

/// Open (or create) a database file and apply migrations.
pub fn open(path: &Path) -> Result<Db> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let conn = Connection::open(path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    run_migrations(&conn)?;

    tracing::debug!(path = %path.display(), "Opened memory database");
    Ok(Arc::new(RwLock::new(conn)))
}

/// Open a private in-memory database with migrations applied.
pub fn open_in_memory() -> Result<Db> {
    let conn = Connection::open_in_memory()?;
    run_migrations(&conn)?;
    Ok(Arc::new(RwLock::new(conn)))
}

/// Serialize a string list for a `*_json` column.
pub(crate) fn to_json_list(items: &[String]) -> Result<String> {
    Ok(serde_json::to_string(items)?)
}

/// Read a `*_json` list column inside a row mapper.
pub(crate) fn json_list(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Read a `*_json` object column inside a row mapper.
pub(crate) fn json_value(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<serde_json::Value> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Read an enum column stored via `as_str()`.
pub(crate) fn parsed<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(Error::Validation(e)),
        )
    })
}

/// Placeholder list `?,?,?` for an `IN (...)` clause.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}
