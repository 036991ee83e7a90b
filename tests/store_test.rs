use orkestra::store::{DocumentStore, SqliteStore, StoreKey};
use orkestra::OrchError;
use serde_json::json;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

const COLL: &str = "orchestrator";

fn create_test_store() -> (TempDir, SqliteStore) {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open(&dir.path().join("orkestra.db")).unwrap();
    (dir, store)
}

fn project(name: &str) -> StoreKey {
    StoreKey::new().with("project", name)
}

fn app(project: &str, name: &str) -> StoreKey {
    StoreKey::new().with("project", project).with("app", name)
}

#[tokio::test]
async fn test_insert_and_find_one() {
    let (_dir, store) = create_test_store();
    store.insert(COLL, &project("p1"), "meta", &json!({"name": "p1"})).await.unwrap();

    let found = store.find_one(COLL, &project("p1"), "meta").await.unwrap();
    assert_eq!(found, Some(json!({"name": "p1"})));
    assert!(store.find_one(COLL, &project("p2"), "meta").await.unwrap().is_none());
    assert!(store.find_one(COLL, &project("p1"), "other").await.unwrap().is_none());
}

#[tokio::test]
async fn test_insert_is_an_upsert() {
    let (_dir, store) = create_test_store();
    store.insert(COLL, &project("p1"), "meta", &json!(1)).await.unwrap();
    store.insert(COLL, &project("p1"), "meta", &json!(2)).await.unwrap();
    assert_eq!(store.find(COLL, &project(""), "meta").await.unwrap(), vec![json!(2)]);
}

#[tokio::test]
async fn test_create_conflicts_on_existing_row() {
    let (_dir, store) = create_test_store();
    assert_ok!(store.create(COLL, &project("p1"), "meta", &json!(1), &[]).await);
    let err = assert_err!(store.create(COLL, &project("p1"), "meta", &json!(2), &[]).await);
    assert!(matches!(err, OrchError::Conflict(_)));
    assert_eq!(store.find_one(COLL, &project("p1"), "meta").await.unwrap(), Some(json!(1)));
}

#[tokio::test]
async fn test_wildcard_find_matches_arity() {
    let (_dir, store) = create_test_store();
    store.insert(COLL, &project("p1"), "meta", &json!("p1")).await.unwrap();
    store.insert(COLL, &app("p1", "web"), "meta", &json!("web")).await.unwrap();
    store.insert(COLL, &app("p1", "db"), "meta", &json!("db")).await.unwrap();
    store.insert(COLL, &app("p2", "web"), "meta", &json!("other")).await.unwrap();

    let mut apps = store.find(COLL, &app("p1", ""), "meta").await.unwrap();
    apps.sort_by_key(|v| v.to_string());
    assert_eq!(apps, vec![json!("db"), json!("web")]);
    assert_eq!(store.find(COLL, &project(""), "meta").await.unwrap(), vec![json!("p1")]);
}

#[tokio::test]
async fn test_find_by_index() {
    let (_dir, store) = create_test_store();
    let index_web = [("app", "web")];
    let index_db = [("app", "db")];
    store
        .insert_indexed(COLL, &project("p1").with("profile", "a"), "prof", &json!("a"), &index_web)
        .await
        .unwrap();
    store
        .insert_indexed(COLL, &project("p1").with("profile", "b"), "prof", &json!("b"), &index_db)
        .await
        .unwrap();

    let key = project("p1").with("profile", "");
    assert_eq!(
        store.find_by_index(COLL, &key, "prof", "app", "db").await.unwrap(),
        vec![json!("b")]
    );
    assert!(store.find_by_index(COLL, &key, "prof", "app", "cache").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_compare_and_swap_versions() {
    let (_dir, store) = create_test_store();
    let key = project("p1");

    assert!(store.compare_and_swap(COLL, &key, "state", &json!("a"), 0).await.unwrap());
    assert!(!store.compare_and_swap(COLL, &key, "state", &json!("x"), 0).await.unwrap());

    let current = store.get_versioned(COLL, &key, "state").await.unwrap().unwrap();
    assert_eq!(current.value, json!("a"));

    assert!(store
        .compare_and_swap(COLL, &key, "state", &json!("b"), current.version)
        .await
        .unwrap());
    // A stale writer loses.
    assert!(!store
        .compare_and_swap(COLL, &key, "state", &json!("c"), current.version)
        .await
        .unwrap());

    let latest = store.get_versioned(COLL, &key, "state").await.unwrap().unwrap();
    assert_eq!(latest.value, json!("b"));
    assert!(latest.version > current.version);
}

#[tokio::test]
async fn test_blobs_round_trip() {
    let (_dir, store) = create_test_store();
    let key = app("p1", "web");
    let data = vec![0x1f, 0x8b, 0x00, 0xff];
    store.put_blob(COLL, &key, "content", &data).await.unwrap();
    assert_eq!(store.get_blob(COLL, &key, "content").await.unwrap(), Some(data));
    assert!(store.get_blob(COLL, &key, "other").await.unwrap().is_none());
}

#[tokio::test]
async fn test_remove_refuses_parent_with_children() {
    let (_dir, store) = create_test_store();
    store.insert(COLL, &project("p1"), "meta", &json!("p1")).await.unwrap();
    store.insert(COLL, &app("p1", "web"), "meta", &json!("web")).await.unwrap();

    let err = store.remove(COLL, &project("p1")).await.unwrap_err();
    assert!(matches!(err, OrchError::Conflict(_)));
    assert!(store.find_one(COLL, &project("p1"), "meta").await.unwrap().is_some());

    store.remove(COLL, &app("p1", "web")).await.unwrap();
    store.remove(COLL, &project("p1")).await.unwrap();
    assert!(store.find_one(COLL, &project("p1"), "meta").await.unwrap().is_none());
}

#[tokio::test]
async fn test_remove_drops_every_tag_and_blob() {
    let (_dir, store) = create_test_store();
    let key = app("p1", "web");
    store.insert(COLL, &key, "meta", &json!(1)).await.unwrap();
    store.insert(COLL, &key, "state", &json!(2)).await.unwrap();
    store.put_blob(COLL, &key, "content", b"abc").await.unwrap();

    store.remove(COLL, &key).await.unwrap();
    assert!(store.find_one(COLL, &key, "meta").await.unwrap().is_none());
    assert!(store.find_one(COLL, &key, "state").await.unwrap().is_none());
    assert!(store.get_blob(COLL, &key, "content").await.unwrap().is_none());
}

#[tokio::test]
async fn test_remove_errors() {
    let (_dir, store) = create_test_store();
    assert!(store.remove(COLL, &project("ghost")).await.unwrap_err().is_not_found());
    assert!(matches!(
        store.remove(COLL, &app("p1", "")).await,
        Err(OrchError::Validation(_))
    ));
}

#[tokio::test]
async fn test_remove_tag_keeps_siblings() {
    let (_dir, store) = create_test_store();
    let key = project("p1");
    store.insert(COLL, &key, "meta", &json!(1)).await.unwrap();
    store.insert(COLL, &key, "intents", &json!(2)).await.unwrap();
    store.remove_tag(COLL, &key, "intents").await.unwrap();
    assert!(store.find_one(COLL, &key, "intents").await.unwrap().is_none());
    assert_eq!(store.find_one(COLL, &key, "meta").await.unwrap(), Some(json!(1)));
}

#[tokio::test]
async fn test_collections_are_separate() {
    let (_dir, store) = create_test_store();
    store.insert("cluster", &project("p1"), "meta", &json!("c")).await.unwrap();
    assert!(store.find_one(COLL, &project("p1"), "meta").await.unwrap().is_none());
}

#[tokio::test]
async fn test_reopen_keeps_rows() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("orkestra.db");
    {
        let store = SqliteStore::open(&path).unwrap();
        store.insert(COLL, &project("p1"), "meta", &json!("kept")).await.unwrap();
    }
    let store = SqliteStore::open(&path).unwrap();
    assert_eq!(
        store.find_one(COLL, &project("p1"), "meta").await.unwrap(),
        Some(json!("kept"))
    );
}
