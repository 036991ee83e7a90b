use std::sync::Arc;

use orkestra::context::{
    AppContext, CompositeAppMeta, ContextStatus, InstructionKind, KvStore, ResourceStatus, SqliteKv,
};
use orkestra::context::types::ClusterSnapshot;
use serde_json::json;

fn kv() -> Arc<dyn KvStore> {
    Arc::new(SqliteKv::open_memory().unwrap())
}

#[tokio::test]
async fn test_create_and_load() {
    let kv = kv();
    let ctx = AppContext::create(kv.clone()).await.unwrap();
    assert!(ctx.exists().await.unwrap());

    let loaded = AppContext::load(kv.clone(), ctx.id()).await.unwrap();
    assert_eq!(loaded.id(), ctx.id());
    assert_eq!(loaded.root(), ctx.root());

    let other = AppContext::create(kv.clone()).await.unwrap();
    assert_ne!(other.id(), ctx.id());
}

#[tokio::test]
async fn test_load_unknown_context_is_not_found() {
    let err = AppContext::load(kv(), "nope").await.err().unwrap();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_tree_structure() {
    let ctx = AppContext::create(kv()).await.unwrap();
    let web = ctx.add_app("web").await.unwrap();
    ctx.add_app("db").await.unwrap();

    let c1 = ctx.add_cluster(&web, "prov+c1", None).await.unwrap();
    ctx.add_cluster(&web, "prov+c2", Some(1)).await.unwrap();
    ctx.add_resource(&c1, "web+Service", "kind: Service\n").await.unwrap();
    ctx.add_resource(&c1, "web+Deployment", "kind: Deployment\n").await.unwrap();

    assert_eq!(ctx.app_names().await.unwrap(), vec!["web", "db"]);
    assert_eq!(ctx.cluster_names("web").await.unwrap(), vec!["prov+c1", "prov+c2"]);
    assert!(ctx.cluster_names("db").await.unwrap().is_empty());
    assert_eq!(
        ctx.resource_names("web", "prov+c1").await.unwrap(),
        vec!["web+Service", "web+Deployment"]
    );
    assert_eq!(
        ctx.resource_content("web", "prov+c1", "web+Deployment").await.unwrap(),
        "kind: Deployment\n"
    );
    assert!(ctx.app_handle("cache").await.unwrap_err().is_not_found());
    assert!(ctx.cluster_handle("web", "prov+c9").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_cluster_groups() {
    let ctx = AppContext::create(kv()).await.unwrap();
    let app = ctx.add_app("x").await.unwrap();
    ctx.add_cluster(&app, "p+m", None).await.unwrap();
    ctx.add_cluster(&app, "p+c1", Some(1)).await.unwrap();
    ctx.add_cluster(&app, "p+c2", Some(1)).await.unwrap();
    ctx.add_cluster(&app, "p+c3", Some(2)).await.unwrap();

    assert_eq!(ctx.cluster_group("x", "p+m").await.unwrap(), None);
    assert_eq!(ctx.cluster_group("x", "p+c2").await.unwrap(), Some(1));

    let groups = ctx.cluster_group_map("x").await.unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[&1], vec!["p+c1", "p+c2"]);
    assert_eq!(groups[&2], vec!["p+c3"]);

    ctx.delete_cluster("x", "p+c1").await.unwrap();
    assert_eq!(ctx.cluster_group_map("x").await.unwrap()[&1], vec!["p+c2"]);
    assert_eq!(ctx.cluster_names("x").await.unwrap(), vec!["p+m", "p+c2", "p+c3"]);
}

#[tokio::test]
async fn test_status_flags_and_ids() {
    let ctx = AppContext::create(kv()).await.unwrap();
    assert_eq!(ctx.status().await.unwrap(), None);
    assert!(!ctx.stop_flag().await.unwrap());
    assert_eq!(ctx.status_context_id().await.unwrap(), None);

    ctx.set_status(ContextStatus::Instantiating).await.unwrap();
    ctx.set_stop_flag(true).await.unwrap();
    ctx.set_status_context_id("abc").await.unwrap();

    assert_eq!(ctx.status().await.unwrap(), Some(ContextStatus::Instantiating));
    assert!(ctx.stop_flag().await.unwrap());
    assert_eq!(ctx.status_context_id().await.unwrap().as_deref(), Some("abc"));
}

#[tokio::test]
async fn test_composite_meta_round_trip() {
    let ctx = AppContext::create(kv()).await.unwrap();
    assert!(ctx.composite_meta().await.unwrap_err().is_not_found());

    let meta = CompositeAppMeta {
        project: "p1".into(),
        composite_app: "shop".into(),
        version: "v1".into(),
        release: "r1".into(),
        deployment_intent_group: "dig1".into(),
        namespace: "apps".into(),
        level: "1".into(),
        logical_cloud: "lc1".into(),
    };
    ctx.set_composite_meta(&meta).await.unwrap();
    assert_eq!(ctx.composite_meta().await.unwrap(), meta);
}

#[tokio::test]
async fn test_resource_status_defaults_to_pending() {
    let ctx = AppContext::create(kv()).await.unwrap();
    let app = ctx.add_app("web").await.unwrap();
    let cluster = ctx.add_cluster(&app, "p+c1", None).await.unwrap();
    ctx.add_resource(&cluster, "web+Service", "kind: Service\n").await.unwrap();

    assert_eq!(
        ctx.resource_status("web", "p+c1", "web+Service").await.unwrap(),
        ResourceStatus::Pending
    );
    ctx.set_resource_status("web", "p+c1", "web+Service", ResourceStatus::Applied)
        .await
        .unwrap();
    assert_eq!(
        ctx.resource_status("web", "p+c1", "web+Service").await.unwrap(),
        ResourceStatus::Applied
    );
    // The status level is not a resource of its own.
    assert_eq!(ctx.resource_names("web", "p+c1").await.unwrap(), vec!["web+Service"]);
}

#[tokio::test]
async fn test_cluster_snapshot() {
    let ctx = AppContext::create(kv()).await.unwrap();
    let app = ctx.add_app("web").await.unwrap();
    ctx.add_cluster(&app, "p+c1", None).await.unwrap();
    assert_eq!(ctx.cluster_snapshot("web", "p+c1").await.unwrap(), None);

    let mut snapshot = ClusterSnapshot {
        ready: true,
        ..Default::default()
    };
    snapshot.resources.insert("web+Service".into(), "Ready".into());
    ctx.set_cluster_snapshot("web", "p+c1", &snapshot).await.unwrap();
    assert_eq!(ctx.cluster_snapshot("web", "p+c1").await.unwrap(), Some(snapshot));
    assert_eq!(ctx.ready_status("web", "p+c1").await.unwrap(), None);
}

#[tokio::test]
async fn test_instructions_and_levels() {
    let ctx = AppContext::create(kv()).await.unwrap();
    let order = json!({"apporder": ["web", "db"]});
    ctx.add_instruction(ctx.root(), InstructionKind::Order, &order).await.unwrap();
    assert_eq!(
        ctx.instruction(ctx.root(), InstructionKind::Order).await.unwrap(),
        Some(order)
    );
    assert_eq!(ctx.instruction(ctx.root(), InstructionKind::Dependency).await.unwrap(), None);

    ctx.set_level_value(ctx.root(), "owner", &json!("ops")).await.unwrap();
    assert_eq!(ctx.level_value(ctx.root(), "owner").await.unwrap(), Some(json!("ops")));
}

#[tokio::test]
async fn test_delete_removes_only_that_context() {
    let kv = kv();
    let a = AppContext::create(kv.clone()).await.unwrap();
    let b = AppContext::create(kv.clone()).await.unwrap();
    a.add_app("web").await.unwrap();
    b.add_app("web").await.unwrap();

    a.delete().await.unwrap();
    assert!(!a.exists().await.unwrap());
    assert!(AppContext::load(kv.clone(), a.id()).await.is_err());
    assert_eq!(b.app_names().await.unwrap(), vec!["web"]);
}

#[tokio::test]
async fn test_all_handles_walks_the_tree() {
    let ctx = AppContext::create(kv()).await.unwrap();
    let app = ctx.add_app("web").await.unwrap();
    let cluster = ctx.add_cluster(&app, "p+c1", None).await.unwrap();
    let res = ctx.add_resource(&cluster, "web+Service", "kind: Service\n").await.unwrap();

    let handles = ctx.all_handles().await.unwrap();
    for h in [ctx.root(), &app, &cluster, &res] {
        assert!(handles.contains(h), "missing {h}");
    }
    assert!(handles.iter().all(|h| h.context_id() == Some(ctx.id())));
}
