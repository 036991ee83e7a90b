use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::error::Result;

/// Key-value keyspace backing run-time contexts.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn put(&self, key: &str, value: &Value) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Keys starting with `prefix`, in first-insertion order.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete every key starting with `prefix`; returns how many were removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize>;
}

const CREATE_KV_SQL: &str = "
CREATE TABLE IF NOT EXISTS context_kv (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    key TEXT NOT NULL UNIQUE,
    value_json TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

/// SQLite-backed context keyspace.
pub struct SqliteKv {
    conn: Mutex<Connection>,
}

impl SqliteKv {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(dir) = db_path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open context store at {}", db_path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(CREATE_KV_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory keyspace (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_KV_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl KvStore for SqliteKv {
    async fn put(&self, key: &str, value: &Value) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO context_kv (key, value_json, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at",
            params![key, value.to_string(), chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let conn = self.conn();
        let raw = conn
            .query_row(
                "SELECT value_json FROM context_kv WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT key FROM context_kv WHERE substr(key, 1, length(?1)) = ?1 ORDER BY seq",
        )?;
        let keys = stmt
            .query_map(params![prefix], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute("DELETE FROM context_kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let conn = self.conn();
        let removed = conn.execute(
            "DELETE FROM context_kv WHERE substr(key, 1, length(?1)) = ?1",
            params![prefix],
        )?;
        Ok(removed)
    }
}
