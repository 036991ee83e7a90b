use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Structured key addressing a document row.
///
/// Fields are kept sorted so the serialized form is canonical. A field with an
/// empty value acts as a wildcard in [`DocumentStore::find`].
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoreKey(BTreeMap<String, String>);

impl StoreKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &str, value: impl Into<String>) -> Self {
        self.0.insert(field.to_string(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn arity(&self) -> usize {
        self.0.len()
    }

    /// True when every field carries a value, i.e. the key names one row.
    pub fn is_exact(&self) -> bool {
        self.0.values().all(|v| !v.is_empty())
    }

    /// Fields that constrain a lookup (non-empty values).
    pub fn bound_fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "{}", parts.join(","))
    }
}

/// A value read together with its row version for optimistic writes.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: i64,
}

/// Document store consumed by the registry and the DIG state machine.
///
/// Rows live at `(collection, key, tag)`. Several tags may share one key
/// (metadata and state of the same DIG, for instance), and removal works on
/// the whole key.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Upsert a row.
    async fn insert(&self, collection: &str, key: &StoreKey, tag: &str, value: &Value) -> Result<()> {
        self.insert_indexed(collection, key, tag, value, &[]).await
    }

    /// Upsert a row together with secondary index values.
    async fn insert_indexed(
        &self,
        collection: &str,
        key: &StoreKey,
        tag: &str,
        value: &Value,
        index: &[(&str, &str)],
    ) -> Result<()>;

    /// Insert a row that must not exist yet; fails with `Conflict` otherwise.
    async fn create(
        &self,
        collection: &str,
        key: &StoreKey,
        tag: &str,
        value: &Value,
        index: &[(&str, &str)],
    ) -> Result<()>;

    /// Rows whose key matches every bound field of `key` and has the same arity.
    async fn find(&self, collection: &str, key: &StoreKey, tag: &str) -> Result<Vec<Value>>;

    async fn find_one(&self, collection: &str, key: &StoreKey, tag: &str) -> Result<Option<Value>> {
        Ok(self.find(collection, key, tag).await?.into_iter().next())
    }

    /// Like [`find`](Self::find), additionally filtered on a secondary index value.
    async fn find_by_index(
        &self,
        collection: &str,
        key: &StoreKey,
        tag: &str,
        index_field: &str,
        index_value: &str,
    ) -> Result<Vec<Value>>;

    async fn get_versioned(
        &self,
        collection: &str,
        key: &StoreKey,
        tag: &str,
    ) -> Result<Option<Versioned<Value>>>;

    /// Replace a row only if its version still equals `expected_version`.
    /// An expected version of 0 means the row must not exist yet.
    async fn compare_and_swap(
        &self,
        collection: &str,
        key: &StoreKey,
        tag: &str,
        value: &Value,
        expected_version: i64,
    ) -> Result<bool>;

    async fn put_blob(&self, collection: &str, key: &StoreKey, tag: &str, data: &[u8]) -> Result<()>;

    async fn get_blob(&self, collection: &str, key: &StoreKey, tag: &str) -> Result<Option<Vec<u8>>>;

    /// Remove every tag stored under `key`.
    ///
    /// Fails with `NotFound` when nothing is stored there and with `Conflict`
    /// when child rows still reference the key.
    async fn remove(&self, collection: &str, key: &StoreKey) -> Result<()>;

    async fn remove_tag(&self, collection: &str, key: &StoreKey, tag: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_canonical() {
        let a = StoreKey::new().with("project", "p").with("compositeApp", "ca");
        let b = StoreKey::new().with("compositeApp", "ca").with("project", "p");
        assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
        assert_eq!(a.to_string(), "compositeApp=ca,project=p");
    }

    #[test]
    fn test_wildcard_fields_are_unbound() {
        let key = StoreKey::new().with("project", "p").with("app", "");
        assert!(!key.is_exact());
        let bound: Vec<_> = key.bound_fields().collect();
        assert_eq!(bound, vec![("project", "p")]);
    }
}
