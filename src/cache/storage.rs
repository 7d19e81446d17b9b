//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::traits::{CacheEntry, RequestKey};
use crate::http::{Headers, Response, ResponseKind};

/// Trait for cache storage backends.
///
/// Writes are atomic per key and replace any previous entry wholesale.
pub trait CacheStorage: Send + Sync {
  /// Create the namespace if it does not exist yet.
  fn open_namespace(&self, namespace: &str) -> Result<()>;

  /// Names of every namespace currently present.
  fn list_namespaces(&self) -> Result<Vec<String>>;

  /// Delete a namespace and all its entries. Returns false if it did not exist.
  fn delete_namespace(&self, namespace: &str) -> Result<bool>;

  /// Look up an entry by request key.
  fn get_entry(&self, namespace: &str, key: &RequestKey) -> Result<Option<CacheEntry>>;

  /// Store a response snapshot, creating the namespace if needed.
  fn put_entry(&self, namespace: &str, key: &RequestKey, response: &Response) -> Result<()>;
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Create a new SQLite storage at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Create a new SQLite storage at `path`.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Create a storage that lives only as long as this value.
  pub fn in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;

    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("tidewater").join("cache.db"))
  }

  pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache and retry tables.
const CACHE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS cache_namespaces (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL
);

-- One row per (namespace, request identity); replaced wholesale on refresh
CREATE TABLE IF NOT EXISTS cache_entries (
    namespace TEXT NOT NULL,
    key_hash TEXT NOT NULL,
    identity TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    kind TEXT NOT NULL,
    stored_at TEXT NOT NULL,
    PRIMARY KEY (namespace, key_hash),
    FOREIGN KEY (namespace) REFERENCES cache_namespaces(name) ON DELETE CASCADE
);

-- Offline mutations awaiting replay
CREATE TABLE IF NOT EXISTS retry_tasks (
    tag TEXT PRIMARY KEY,
    enqueued_at TEXT NOT NULL
);
"#;

impl CacheStorage for SqliteStorage {
  fn open_namespace(&self, namespace: &str) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute(
        "INSERT OR IGNORE INTO cache_namespaces (name, created_at) VALUES (?, ?)",
        params![namespace, Utc::now().to_rfc3339()],
      )
      .map_err(|e| eyre!("Failed to open namespace {}: {}", namespace, e))?;
    Ok(())
  }

  fn list_namespaces(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT name FROM cache_namespaces ORDER BY name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list namespaces: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read namespace row: {}", e))?;

    Ok(names)
  }

  fn delete_namespace(&self, namespace: &str) -> Result<bool> {
    let conn = self.lock()?;
    let removed = conn
      .execute(
        "DELETE FROM cache_namespaces WHERE name = ?",
        params![namespace],
      )
      .map_err(|e| eyre!("Failed to delete namespace {}: {}", namespace, e))?;
    Ok(removed > 0)
  }

  fn get_entry(&self, namespace: &str, key: &RequestKey) -> Result<Option<CacheEntry>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare(
        "SELECT status, headers, body, kind, stored_at FROM cache_entries
         WHERE namespace = ? AND key_hash = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let row: Option<(u16, String, Vec<u8>, String, String)> = stmt
      .query_row(params![namespace, key.cache_hash()], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
      })
      .optional()
      .map_err(|e| eyre!("Failed to read entry {}: {}", key, e))?;

    let Some((status, headers, body, kind, stored_at)) = row else {
      return Ok(None);
    };

    let headers: Headers = serde_json::from_str(&headers)
      .map_err(|e| eyre!("Failed to deserialize headers for {}: {}", key, e))?;

    Ok(Some(CacheEntry {
      response: Response {
        status,
        headers,
        body,
        kind: ResponseKind::parse(&kind),
      },
      stored_at: parse_datetime(&stored_at)?,
    }))
  }

  fn put_entry(&self, namespace: &str, key: &RequestKey, response: &Response) -> Result<()> {
    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;
    let now = Utc::now().to_rfc3339();

    let conn = self.lock()?;
    conn
      .execute(
        "INSERT OR IGNORE INTO cache_namespaces (name, created_at) VALUES (?, ?)",
        params![namespace, now],
      )
      .map_err(|e| eyre!("Failed to open namespace {}: {}", namespace, e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO cache_entries
           (namespace, key_hash, identity, status, headers, body, kind, stored_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        params![
          namespace,
          key.cache_hash(),
          key.identity(),
          response.status,
          headers,
          response.body,
          response.kind.as_str(),
          now
        ],
      )
      .map_err(|e| eyre!("Failed to store entry {}: {}", key, e))?;

    Ok(())
  }
}

/// Parse an RFC 3339 timestamp written by this module.
pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
