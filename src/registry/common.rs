use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{OrchError, Result};
use crate::store::{DocumentStore, StoreKey};

const MAX_NAME_LEN: usize = 128;

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]*$").expect("static regex"))
}

/// Entity names: alphanumeric first, then `[A-Za-z0-9_.-]`, at most 128 chars.
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(OrchError::validation(format!("{kind} name is empty")));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(OrchError::validation(format!(
            "{kind} name {name:?} is longer than {MAX_NAME_LEN} characters"
        )));
    }
    if !name_regex().is_match(name) {
        return Err(OrchError::validation(format!(
            "{kind} name {name:?} contains invalid characters"
        )));
    }
    Ok(())
}

/// An update addresses one row by name; the body must agree.
pub fn check_update_name(kind: &str, addressed: &str, body: &str) -> Result<()> {
    if addressed != body {
        return Err(OrchError::validation(format!(
            "{kind} name in body ({body:?}) does not match {addressed:?}"
        )));
    }
    Ok(())
}

pub fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}

/// Fetch one row or fail with `NotFound` naming `what`.
pub async fn get_as<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    key: &StoreKey,
    tag: &str,
    what: impl FnOnce() -> String,
) -> Result<T> {
    match store.find_one(collection, key, tag).await? {
        Some(value) => from_value(value),
        None => Err(OrchError::NotFound(what())),
    }
}

pub async fn list_as<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    key: &StoreKey,
    tag: &str,
) -> Result<Vec<T>> {
    store
        .find(collection, key, tag)
        .await?
        .into_iter()
        .map(from_value)
        .collect()
}

pub async fn exists(store: &dyn DocumentStore, collection: &str, key: &StoreKey, tag: &str) -> Result<bool> {
    Ok(store.find_one(collection, key, tag).await?.is_some())
}

/// Fail with `NotFound` unless the parent row exists.
pub async fn require_parent(
    store: &dyn DocumentStore,
    collection: &str,
    key: &StoreKey,
    tag: &str,
    what: impl FnOnce() -> String,
) -> Result<()> {
    if exists(store, collection, key, tag).await? {
        Ok(())
    } else {
        Err(OrchError::NotFound(what()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_rules() {
        assert!(validate_name("project", "p-1.a_b").is_ok());
        assert!(validate_name("project", "").is_err());
        assert!(validate_name("project", "-lead").is_err());
        assert!(validate_name("project", "has space").is_err());
        assert!(validate_name("project", &"a".repeat(128)).is_ok());
        assert!(validate_name("project", &"a".repeat(129)).is_err());
    }

    #[test]
    fn test_update_name_must_match() {
        let err = check_update_name("app", "web", "db").unwrap_err();
        assert_eq!(err.http_status(), 400);
        assert!(check_update_name("app", "web", "web").is_ok());
    }
}
