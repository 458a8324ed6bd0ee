use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::{OutboxItem, OutboxKind};
use crate::db::{self, format_timestamp, parse_timestamp};

/// SQLite-backed outbox.
pub struct Outbox {
  conn: Mutex<Connection>,
}

impl Outbox {
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

  pub(super) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Append an action, returning its id.
  pub fn enqueue(&self, kind: OutboxKind, payload: &Value) -> Result<i64> {
    self.enqueue_at(kind, payload, Utc::now())
  }

  pub fn enqueue_at(&self, kind: OutboxKind, payload: &Value, at: DateTime<Utc>) -> Result<i64> {
    let payload =
      serde_json::to_string(payload).map_err(|e| eyre!("Failed to serialize payload: {}", e))?;

    let conn = self.conn()?;
    conn
      .execute(
        "INSERT INTO outbox (kind, payload, enqueued_at) VALUES (?, ?, ?)",
        params![kind.as_str(), payload, format_timestamp(at)],
      )
      .map_err(|e| eyre!("Failed to enqueue {} action: {}", kind, e))?;

    Ok(conn.last_insert_rowid())
  }

  /// Pending items of one kind, oldest first.
  pub fn pending(&self, kind: OutboxKind) -> Result<Vec<OutboxItem>> {
    let conn = self.conn()?;
    let mut stmt = conn
      .prepare(
        "SELECT id, kind, payload, enqueued_at FROM outbox
         WHERE kind = ?
         ORDER BY id",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows = stmt
      .query_map(params![kind.as_str()], read_row)
      .map_err(|e| eyre!("Failed to query outbox: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read outbox row: {}", e))?;

    rows.into_iter().map(into_item).collect()
  }

  pub fn get(&self, id: i64) -> Result<Option<OutboxItem>> {
    let conn = self.conn()?;
    let row = conn
      .query_row(
        "SELECT id, kind, payload, enqueued_at FROM outbox WHERE id = ?",
        params![id],
        read_row,
      )
      .optional()
      .map_err(|e| eyre!("Failed to read outbox item {}: {}", id, e))?;

    row.map(into_item).transpose()
  }

  /// Returns false if the item was already gone.
  pub fn delete(&self, id: i64) -> Result<bool> {
    let conn = self.conn()?;
    let removed = conn
      .execute("DELETE FROM outbox WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to delete outbox item {}: {}", id, e))?;
    Ok(removed > 0)
  }

  /// Ids of items enqueued strictly before `cutoff`.
  pub fn ids_enqueued_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<i64>> {
    let conn = self.conn()?;
    let mut stmt = conn
      .prepare("SELECT id FROM outbox WHERE enqueued_at < ? ORDER BY id")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let ids = stmt
      .query_map(params![format_timestamp(cutoff)], |row| row.get(0))
      .map_err(|e| eyre!("Failed to query outbox: {}", e))?
      .collect::<rusqlite::Result<Vec<i64>>>()
      .map_err(|e| eyre!("Failed to read outbox id: {}", e))?;

    Ok(ids)
  }

  pub fn len(&self) -> Result<usize> {
    let conn = self.conn()?;
    let count: i64 = conn
      .query_row("SELECT COUNT(*) FROM outbox", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to count outbox: {}", e))?;
    Ok(count as usize)
  }

  pub fn is_empty(&self) -> Result<bool> {
    Ok(self.len()? == 0)
  }
}

type Row = (i64, String, String, String);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
  Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn into_item((id, kind, payload, enqueued_at): Row) -> Result<OutboxItem> {
  Ok(OutboxItem {
    id,
    kind: kind.parse().map_err(|e: String| eyre!(e))?,
    payload: serde_json::from_str(&payload)
      .map_err(|e| eyre!("Failed to deserialize outbox item {}: {}", id, e))?,
    enqueued_at: parse_timestamp(&enqueued_at)?,
  })
}
