use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension};
use serde_json::Value;

use super::backend::{DocumentStore, StoreKey, Versioned};
use super::schema;
use crate::error::{OrchError, Result};

/// SQLite-backed document store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the document database.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(dir) = db_path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open document store at {}", db_path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(schema::CREATE_TABLES_SQL)?;
        conn.execute_batch(schema::CREATE_INDEXES_SQL)?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at, description) VALUES (?1, ?2, ?3)",
            params![schema::SCHEMA_VERSION, now(), "Initial schema"],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn query_values(&self, sql: &str, args: &[String]) -> Result<Vec<Value>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.iter()
            .map(|raw| Ok(serde_json::from_str(raw)?))
            .collect()
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn index_json(index: &[(&str, &str)]) -> String {
    let map: serde_json::Map<String, Value> = index
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect();
    Value::Object(map).to_string()
}

/// Append `json_extract` conditions for every bound field of `key`.
fn push_field_filters(sql: &mut String, args: &mut Vec<String>, column: &str, key: &StoreKey) {
    for (field, value) in key.bound_fields() {
        args.push(format!("$.{field}"));
        args.push(value.to_string());
        sql.push_str(&format!(
            " AND json_extract({column}, ?{}) = ?{}",
            args.len() - 1,
            args.len()
        ));
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

#[async_trait]
impl DocumentStore for SqliteStore {
    // ─── Writes ─────────────────────────────────────────────────────────────

    async fn insert_indexed(
        &self,
        collection: &str,
        key: &StoreKey,
        tag: &str,
        value: &Value,
        index: &[(&str, &str)],
    ) -> Result<()> {
        let key_json = key.to_json()?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO documents (collection, key_json, arity, tag, value_json, index_json, version, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)
             ON CONFLICT(collection, key_json, tag) DO UPDATE SET
                value_json = excluded.value_json,
                index_json = excluded.index_json,
                version = documents.version + 1,
                updated_at = excluded.updated_at",
            params![
                collection,
                key_json,
                key.arity() as i64,
                tag,
                value.to_string(),
                index_json(index),
                now()
            ],
        )?;
        Ok(())
    }

    async fn create(
        &self,
        collection: &str,
        key: &StoreKey,
        tag: &str,
        value: &Value,
        index: &[(&str, &str)],
    ) -> Result<()> {
        let key_json = key.to_json()?;
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT INTO documents (collection, key_json, arity, tag, value_json, index_json, version, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)",
            params![
                collection,
                key_json,
                key.arity() as i64,
                tag,
                value.to_string(),
                index_json(index),
                now()
            ],
        );
        match inserted {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => {
                Err(OrchError::Conflict(format!("{tag} for {key} already exists")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn compare_and_swap(
        &self,
        collection: &str,
        key: &StoreKey,
        tag: &str,
        value: &Value,
        expected_version: i64,
    ) -> Result<bool> {
        if expected_version == 0 {
            return match self.create(collection, key, tag, value, &[]).await {
                Ok(()) => Ok(true),
                Err(OrchError::Conflict(_)) => Ok(false),
                Err(e) => Err(e),
            };
        }
        let key_json = key.to_json()?;
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE documents SET value_json = ?1, version = version + 1, updated_at = ?2
             WHERE collection = ?3 AND key_json = ?4 AND tag = ?5 AND version = ?6",
            params![value.to_string(), now(), collection, key_json, tag, expected_version],
        )?;
        Ok(updated == 1)
    }

    async fn put_blob(&self, collection: &str, key: &StoreKey, tag: &str, data: &[u8]) -> Result<()> {
        let key_json = key.to_json()?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO blobs (collection, key_json, tag, data, size, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(collection, key_json, tag) DO UPDATE SET
                data = excluded.data, size = excluded.size, updated_at = excluded.updated_at",
            params![collection, key_json, tag, data, data.len() as i64, now()],
        )?;
        Ok(())
    }

    // ─── Reads ──────────────────────────────────────────────────────────────

    async fn find(&self, collection: &str, key: &StoreKey, tag: &str) -> Result<Vec<Value>> {
        let mut args = vec![collection.to_string(), tag.to_string()];
        let mut sql = format!(
            "SELECT value_json FROM documents WHERE collection = ?1 AND tag = ?2 AND arity = {}",
            key.arity()
        );
        push_field_filters(&mut sql, &mut args, "key_json", key);
        sql.push_str(" ORDER BY rowid");
        self.query_values(&sql, &args)
    }

    async fn find_by_index(
        &self,
        collection: &str,
        key: &StoreKey,
        tag: &str,
        index_field: &str,
        index_value: &str,
    ) -> Result<Vec<Value>> {
        let mut args = vec![
            collection.to_string(),
            tag.to_string(),
            format!("$.{index_field}"),
            index_value.to_string(),
        ];
        let mut sql = format!(
            "SELECT value_json FROM documents
             WHERE collection = ?1 AND tag = ?2 AND json_extract(index_json, ?3) = ?4 AND arity = {}",
            key.arity()
        );
        push_field_filters(&mut sql, &mut args, "key_json", key);
        sql.push_str(" ORDER BY rowid");
        self.query_values(&sql, &args)
    }

    async fn get_versioned(
        &self,
        collection: &str,
        key: &StoreKey,
        tag: &str,
    ) -> Result<Option<Versioned<Value>>> {
        let key_json = key.to_json()?;
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT value_json, version FROM documents
                 WHERE collection = ?1 AND key_json = ?2 AND tag = ?3",
                params![collection, key_json, tag],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;
        match row {
            Some((raw, version)) => Ok(Some(Versioned {
                value: serde_json::from_str(&raw)?,
                version,
            })),
            None => Ok(None),
        }
    }

    async fn get_blob(&self, collection: &str, key: &StoreKey, tag: &str) -> Result<Option<Vec<u8>>> {
        let key_json = key.to_json()?;
        let conn = self.conn();
        let data = conn
            .query_row(
                "SELECT data FROM blobs WHERE collection = ?1 AND key_json = ?2 AND tag = ?3",
                params![collection, key_json, tag],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(data)
    }

    // ─── Removal ────────────────────────────────────────────────────────────

    async fn remove(&self, collection: &str, key: &StoreKey) -> Result<()> {
        if !key.is_exact() {
            return Err(OrchError::validation(format!(
                "refusing to remove with a partial key: {key}"
            )));
        }
        let key_json = key.to_json()?;
        let conn = self.conn();

        let mut args = vec![collection.to_string()];
        let mut sql = format!(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1 AND arity > {}",
            key.arity()
        );
        push_field_filters(&mut sql, &mut args, "key_json", key);
        let children: i64 = conn.query_row(&sql, params_from_iter(args.iter()), |row| row.get(0))?;
        if children > 0 {
            return Err(OrchError::Conflict(format!(
                "{key} still has {children} child row(s)"
            )));
        }

        let removed = conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND key_json = ?2",
            params![collection, key_json],
        )?;
        let removed_blobs = conn.execute(
            "DELETE FROM blobs WHERE collection = ?1 AND key_json = ?2",
            params![collection, key_json],
        )?;
        if removed + removed_blobs == 0 {
            return Err(OrchError::not_found(key.to_string()));
        }
        tracing::debug!(collection, key = %key, rows = removed, "Removed document rows");
        Ok(())
    }

    async fn remove_tag(&self, collection: &str, key: &StoreKey, tag: &str) -> Result<()> {
        let key_json = key.to_json()?;
        let conn = self.conn();
        conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND key_json = ?2 AND tag = ?3",
            params![collection, key_json, tag],
        )?;
        conn.execute(
            "DELETE FROM blobs WHERE collection = ?1 AND key_json = ?2 AND tag = ?3",
            params![collection, key_json, tag],
        )?;
        Ok(())
    }
}
