/// Schema for the cache generations, cached responses and the offline outbox.
pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- Known cache generations
CREATE TABLE IF NOT EXISTS cache_names (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL
);

-- Stored responses, one row per (generation, request key)
CREATE TABLE IF NOT EXISTS cache_entries (
    cache_name TEXT NOT NULL,
    key_hash TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    stored_at TEXT NOT NULL,
    PRIMARY KEY (cache_name, key_hash),
    FOREIGN KEY (cache_name) REFERENCES cache_names(name) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_stored
    ON cache_entries(cache_name, stored_at);

-- Actions recorded while offline
CREATE TABLE IF NOT EXISTS outbox (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    payload TEXT NOT NULL,
    enqueued_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_outbox_kind ON outbox(kind, id);
CREATE INDEX IF NOT EXISTS idx_outbox_enqueued ON outbox(enqueued_at);
"#;
