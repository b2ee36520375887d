//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use super::traits::{CachedEntry, RequestKey};

/// Trait for cache storage backends.
///
/// Every method is a single synchronous unit of work: a caller either sees it
/// fully applied or not at all.
pub trait CacheStorage: Send + Sync {
  /// Create the namespace if it does not exist yet.
  fn open_namespace(&self, name: &str) -> Result<()>;

  /// All namespace names, oldest first.
  fn namespaces(&self) -> Result<Vec<String>>;

  /// Delete a namespace and all of its entries. Returns false if it did not exist.
  fn delete_namespace(&self, name: &str) -> Result<bool>;

  /// Store entries in one transaction, replacing any with the same key.
  fn put_entries(&self, namespace: &str, entries: &[(RequestKey, CachedEntry)]) -> Result<()>;

  /// Look up an entry in one namespace, or in all of them oldest first.
  fn get_entry(&self, namespace: Option<&str>, key: &RequestKey) -> Result<Option<CachedEntry>>;

  /// Number of entries held by a namespace.
  fn entry_count(&self, namespace: &str) -> Result<usize>;
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Private in-memory database that disappears with the process.
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory cache: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_namespaces (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Response snapshots keyed by request identity hash
CREATE TABLE IF NOT EXISTS cache_entries (
    namespace TEXT NOT NULL,
    entry_key TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL,
    PRIMARY KEY (namespace, entry_key),
    FOREIGN KEY (namespace) REFERENCES cache_namespaces(name) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_key ON cache_entries(entry_key);
"#;

impl CacheStorage for SqliteStorage {
  fn open_namespace(&self, name: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    // OR IGNORE keeps the original rowid, which fixes lookup order
    conn
      .execute(
        "INSERT OR IGNORE INTO cache_namespaces (name) VALUES (?)",
        params![name],
      )
      .map_err(|e| eyre!("Failed to open namespace {}: {}", name, e))?;

    Ok(())
  }

  fn namespaces(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT name FROM cache_namespaces ORDER BY rowid")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list namespaces: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read namespace row: {}", e))?;

    Ok(names)
  }

  fn delete_namespace(&self, name: &str) -> Result<bool> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM cache_entries WHERE namespace = ?", params![name])
      .map_err(|e| eyre!("Failed to delete entries of {}: {}", name, e))?;

    let removed = tx
      .execute("DELETE FROM cache_namespaces WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete namespace {}: {}", name, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn put_entries(&self, namespace: &str, entries: &[(RequestKey, CachedEntry)]) -> Result<()> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "INSERT OR IGNORE INTO cache_namespaces (name) VALUES (?)",
      params![namespace],
    )
    .map_err(|e| eyre!("Failed to open namespace {}: {}", namespace, e))?;

    for (key, entry) in entries {
      let headers = serde_json::to_string(&entry.headers)
        .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

      tx.execute(
        "INSERT OR REPLACE INTO cache_entries
           (namespace, entry_key, method, url, status, headers, body, cached_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        params![
          namespace,
          key.cache_hash(),
          key.method,
          key.url,
          entry.status,
          headers,
          entry.body,
          entry.cached_at.to_rfc3339(),
        ],
      )
      .map_err(|e| eyre!("Failed to store entry for {}: {}", key.url, e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn get_entry(&self, namespace: Option<&str>, key: &RequestKey) -> Result<Option<CachedEntry>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT e.namespace, e.status, e.headers, e.body, e.cached_at
         FROM cache_entries e
         INNER JOIN cache_namespaces n ON n.name = e.namespace
         WHERE e.entry_key = ?1 AND (?2 IS NULL OR e.namespace = ?2)
         ORDER BY n.rowid
         LIMIT 1",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let row: Option<(String, u16, String, Vec<u8>, String)> = stmt
      .query_row(params![key.cache_hash(), namespace], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
      })
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", key.url, e))?;

    match row {
      Some((namespace, status, headers, body, cached_at)) => {
        let headers: Vec<(String, String)> = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to parse stored headers: {}", e))?;
        Ok(Some(CachedEntry {
          namespace,
          status,
          headers,
          body,
          cached_at: parse_datetime(&cached_at)?,
        }))
      }
      None => Ok(None),
    }
  }

  fn entry_count(&self, namespace: &str) -> Result<usize> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM cache_entries WHERE namespace = ?",
        params![namespace],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count entries of {}: {}", namespace, e))?;

    Ok(count as usize)
  }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::net::{Request, Response};
  use reqwest::StatusCode;
  use url::Url;

  fn key(path: &str) -> RequestKey {
    let url = Url::parse("http://app").unwrap().join(path).unwrap();
    RequestKey::from_request(&Request::get(url), &[])
  }

  fn entry(ns: &str, body: &str) -> CachedEntry {
    CachedEntry::snapshot(ns, &Response::new(StatusCode::OK, body))
  }

  #[test]
  fn test_namespaces_listed_in_creation_order() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.open_namespace("b").unwrap();
    storage.open_namespace("a").unwrap();
    storage.open_namespace("b").unwrap();

    assert_eq!(storage.namespaces().unwrap(), vec!["b", "a"]);
  }

  #[test]
  fn test_lookup_prefers_oldest_namespace() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.open_namespace("static").unwrap();
    storage.open_namespace("dynamic").unwrap();
    storage
      .put_entries("dynamic", &[(key("/x"), entry("dynamic", "new"))])
      .unwrap();
    storage
      .put_entries("static", &[(key("/x"), entry("static", "old"))])
      .unwrap();

    let any = storage.get_entry(None, &key("/x")).unwrap().unwrap();
    assert_eq!(any.namespace, "static");
    let scoped = storage.get_entry(Some("dynamic"), &key("/x")).unwrap().unwrap();
    assert_eq!(scoped.body, b"new");
    assert!(storage.get_entry(None, &key("/missing")).unwrap().is_none());
  }

  #[test]
  fn test_delete_namespace_drops_entries() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage
      .put_entries("legacy", &[(key("/a"), entry("legacy", "a")), (key("/b"), entry("legacy", "b"))])
      .unwrap();
    assert_eq!(storage.entry_count("legacy").unwrap(), 2);

    assert!(storage.delete_namespace("legacy").unwrap());
    assert!(!storage.delete_namespace("legacy").unwrap());
    assert_eq!(storage.entry_count("legacy").unwrap(), 0);
    assert!(storage.get_entry(None, &key("/a")).unwrap().is_none());
  }

  #[test]
  fn test_open_on_disk_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("cache.db");
    {
      let storage = SqliteStorage::open(&path).unwrap();
      storage.put_entries("ns", &[(key("/"), entry("ns", "root"))]).unwrap();
    }

    let reopened = SqliteStorage::open(&path).unwrap();
    let found = reopened.get_entry(Some("ns"), &key("/")).unwrap().unwrap();
    assert_eq!(found.body, b"root");
  }
}
