//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::key::RequestKey;
use crate::db::{self, format_timestamp, parse_timestamp};
use crate::net::Response;

/// A response read back from the cache.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  /// The stored response, byte for byte
  pub response: Response,
  /// When the response was written
  pub stored_at: DateTime<Utc>,
}

/// Named, versioned key→response storage.
///
/// Every method is a single atomic operation. Callers must not assume that a
/// read followed by a write on the same key is free of races.
pub trait CacheStorage: Send + Sync {
  /// Create the named cache if it does not exist yet.
  fn open_cache(&self, name: &str) -> Result<()>;

  /// Names of every cache currently in storage.
  fn cache_names(&self) -> Result<Vec<String>>;

  /// Delete a cache and all its entries. Returns false if it did not exist.
  fn delete_cache(&self, name: &str) -> Result<bool>;

  fn get(&self, cache: &str, key: &RequestKey) -> Result<Option<CachedResponse>>;

  /// Store a response with an explicit timestamp, replacing any existing entry.
  fn put_at(
    &self,
    cache: &str,
    key: &RequestKey,
    response: &Response,
    stored_at: DateTime<Utc>,
  ) -> Result<()>;

  fn put(&self, cache: &str, key: &RequestKey, response: &Response) -> Result<()> {
    self.put_at(cache, key, response, Utc::now())
  }

  fn delete(&self, cache: &str, key: &RequestKey) -> Result<bool>;

  /// All keys in a cache, in insertion order.
  fn keys(&self, cache: &str) -> Result<Vec<RequestKey>>;

  /// Keys whose entries were stored strictly before `cutoff`.
  fn keys_stored_before(&self, cache: &str, cutoff: DateTime<Utc>) -> Result<Vec<RequestKey>>;
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the storage database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    Ok(Self {
      conn: Mutex::new(db::open(path)?),
    })
  }

  pub fn open_in_memory() -> Result<Self> {
    Ok(Self {
      conn: Mutex::new(db::open_in_memory()?),
    })
  }

  fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

impl CacheStorage for SqliteStorage {
  fn open_cache(&self, name: &str) -> Result<()> {
    let conn = self.conn()?;
    conn
      .execute(
        "INSERT OR IGNORE INTO cache_names (name, created_at) VALUES (?, ?)",
        params![name, format_timestamp(Utc::now())],
      )
      .map_err(|e| eyre!("Failed to open cache {}: {}", name, e))?;
    Ok(())
  }

  fn cache_names(&self) -> Result<Vec<String>> {
    let conn = self.conn()?;
    let mut stmt = conn
      .prepare("SELECT name FROM cache_names ORDER BY created_at, name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list caches: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache name: {}", e))?;

    Ok(names)
  }

  fn delete_cache(&self, name: &str) -> Result<bool> {
    let mut conn = self.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM cache_entries WHERE cache_name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete entries of cache {}: {}", name, e))?;
    let removed = tx
      .execute("DELETE FROM cache_names WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete cache {}: {}", name, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn get(&self, cache: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
    let conn = self.conn()?;
    let row: Option<(u16, String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT status, headers, body, stored_at FROM cache_entries
         WHERE cache_name = ? AND key_hash = ?",
        params![cache, key.hash()],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cache entry {}: {}", key, e))?;

    match row {
      Some((status, headers, body, stored_at)) => {
        let headers: Vec<(String, String)> = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to deserialize headers of {}: {}", key, e))?;
        Ok(Some(CachedResponse {
          response: Response {
            status,
            headers,
            body,
          },
          stored_at: parse_timestamp(&stored_at)?,
        }))
      }
      None => Ok(None),
    }
  }

  fn put_at(
    &self,
    cache: &str,
    key: &RequestKey,
    response: &Response,
    stored_at: DateTime<Utc>,
  ) -> Result<()> {
    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;
    let stored_at = format_timestamp(stored_at);

    let mut conn = self.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "INSERT OR IGNORE INTO cache_names (name, created_at) VALUES (?, ?)",
      params![cache, stored_at],
    )
    .map_err(|e| eyre!("Failed to open cache {}: {}", cache, e))?;

    tx.execute(
      "INSERT OR REPLACE INTO cache_entries
         (cache_name, key_hash, method, url, status, headers, body, stored_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
      params![
        cache,
        key.hash(),
        key.method(),
        key.url(),
        response.status,
        headers,
        response.body,
        stored_at
      ],
    )
    .map_err(|e| eyre!("Failed to store cache entry {}: {}", key, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn delete(&self, cache: &str, key: &RequestKey) -> Result<bool> {
    let conn = self.conn()?;
    let removed = conn
      .execute(
        "DELETE FROM cache_entries WHERE cache_name = ? AND key_hash = ?",
        params![cache, key.hash()],
      )
      .map_err(|e| eyre!("Failed to delete cache entry {}: {}", key, e))?;
    Ok(removed > 0)
  }

  fn keys(&self, cache: &str) -> Result<Vec<RequestKey>> {
    let conn = self.conn()?;
    let mut stmt = conn
      .prepare(
        "SELECT method, url FROM cache_entries
         WHERE cache_name = ?
         ORDER BY rowid",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    collect_keys(&mut stmt, params![cache])
  }

  fn keys_stored_before(&self, cache: &str, cutoff: DateTime<Utc>) -> Result<Vec<RequestKey>> {
    let conn = self.conn()?;
    let mut stmt = conn
      .prepare(
        "SELECT method, url FROM cache_entries
         WHERE cache_name = ? AND stored_at < ?
         ORDER BY stored_at",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    collect_keys(&mut stmt, params![cache, format_timestamp(cutoff)])
  }
}

fn collect_keys(
  stmt: &mut rusqlite::Statement<'_>,
  params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<RequestKey>> {
  stmt
    .query_map(params, |row| {
      Ok(RequestKey::from_parts(row.get(0)?, row.get(1)?))
    })
    .map_err(|e| eyre!("Failed to query cache keys: {}", e))?
    .collect::<rusqlite::Result<Vec<_>>>()
    .map_err(|e| eyre!("Failed to read cache key: {}", e))
}
