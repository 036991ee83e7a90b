mod common;

use common::*;
use orkestra::context::types::ClusterSnapshot;
use orkestra::context::ResourceStatus;
use orkestra::deploy::{DigState, StatusQuery, StatusView};
use orkestra::placement::ClusterRef;

fn query() -> StatusQuery {
    StatusQuery::default()
}

#[tokio::test]
async fn test_summary_of_current_instance() {
    let (world, dig) = World::seeded().await;
    let id = world.instantiate(&dig).await;
    let ctx = world.context(&id).await;
    ctx.set_resource_status("web", "prov+c1", "web+Service", ResourceStatus::Applied)
        .await
        .unwrap();

    let status = world.orch.status().summary(&dig, &query()).await.unwrap();
    assert_eq!(status.context_id, id);
    assert_eq!(status.status_context_id, id);
    assert_eq!(status.state, DigState::Instantiated);
    assert_eq!(status.actions.len(), 3);
    assert_eq!(status.view, StatusView::Rsync);

    let apps: Vec<&str> = status.apps.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(apps, vec!["web", "db"]);
    let web = &status.apps[0];
    assert_eq!(
        web.clusters.iter().map(|c| c.cluster.clone()).collect::<Vec<_>>(),
        vec![ClusterRef::new(PROVIDER, "c1"), ClusterRef::new(PROVIDER, "c2")]
    );
    let first = &web.clusters[0].resources[0];
    assert_eq!(first.name, "web+Service");
    assert_eq!(first.status, "Applied");
    assert_eq!(first.gvk.as_ref().map(|g| g.kind.as_str()), Some("Service"));

    // 3 clusters x 2 resources, one of them applied.
    assert_eq!(status.resource_counts.get("Applied"), Some(&1));
    assert_eq!(status.resource_counts.get("Pending"), Some(&5));
}

#[tokio::test]
async fn test_summary_filters() {
    let (world, dig) = World::seeded().await;
    world.instantiate(&dig).await;

    let q = StatusQuery {
        apps: vec!["web".into()],
        clusters: vec!["c2".into()],
        resources: vec!["web+Deployment".into()],
        ..query()
    };
    let status = world.orch.status().summary(&dig, &q).await.unwrap();
    assert_eq!(status.apps.len(), 1);
    let clusters = &status.apps[0].clusters;
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0].cluster, ClusterRef::new(PROVIDER, "c2"));
    assert_eq!(clusters[0].resources.len(), 1);
    assert_eq!(clusters[0].resources[0].name, "web+Deployment");
}

#[tokio::test]
async fn test_unknown_app_filter_is_not_found() {
    let (world, dig) = World::seeded().await;
    world.instantiate(&dig).await;
    let q = StatusQuery {
        apps: vec!["cache".into()],
        ..query()
    };
    assert!(world.orch.status().apps(&dig, &q).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_unknown_instance_is_not_found() {
    let (world, dig) = World::seeded().await;
    world.instantiate(&dig).await;
    let q = StatusQuery {
        instance: Some("not-a-context".into()),
        ..query()
    };
    assert!(world.orch.status().summary(&dig, &q).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_status_before_instantiate_is_not_found() {
    let (world, dig) = World::seeded().await;
    assert!(world.orch.status().summary(&dig, &query()).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_older_instance_can_be_queried() {
    let (world, dig) = World::seeded().await;
    let first = world.instantiate(&dig).await;
    world.orch.lifecycle().update(&dig).await.unwrap();

    let current = world.orch.status().summary(&dig, &query()).await.unwrap();
    assert_ne!(current.context_id, first);
    assert_eq!(current.status_context_id, first);

    let q = StatusQuery {
        instance: Some(first.clone()),
        ..query()
    };
    assert_eq!(world.orch.status().summary(&dig, &q).await.unwrap().context_id, first);
}

#[tokio::test]
async fn test_cluster_view_reads_snapshots() {
    let (world, dig) = World::seeded().await;
    let id = world.instantiate(&dig).await;
    let ctx = world.context(&id).await;

    let mut snapshot = ClusterSnapshot {
        ready: true,
        ..Default::default()
    };
    snapshot.resources.insert("db+Deployment".into(), "Ready".into());
    ctx.set_cluster_snapshot("db", "prov+c4", &snapshot).await.unwrap();

    let q = StatusQuery {
        view: StatusView::Cluster,
        apps: vec!["db".into()],
        ..query()
    };
    let status = world.orch.status().summary(&dig, &q).await.unwrap();
    let resources = &status.apps[0].clusters[0].resources;
    let by_name: Vec<(&str, &str)> = resources.iter().map(|r| (r.name.as_str(), r.status.as_str())).collect();
    assert_eq!(by_name, vec![("db+Service", "Pending"), ("db+Deployment", "Ready")]);
}

#[tokio::test]
async fn test_apps_and_clusters_by_app() {
    let (world, dig) = World::seeded().await;
    world.instantiate(&dig).await;
    let status = world.orch.status();

    assert_eq!(status.apps(&dig, &query()).await.unwrap(), vec!["web", "db"]);

    let clusters = status.clusters_by_app(&dig, &query()).await.unwrap();
    assert_eq!(clusters.len(), 2);
    assert_eq!(clusters[0].app, "web");
    assert_eq!(
        clusters[0].clusters,
        vec![ClusterRef::new(PROVIDER, "c1"), ClusterRef::new(PROVIDER, "c2")]
    );
    assert_eq!(clusters[1].clusters, vec![ClusterRef::new(PROVIDER, "c4")]);
}

#[tokio::test]
async fn test_resources_by_app_uses_first_cluster_in_rsync_view() {
    let (world, dig) = World::seeded().await;
    let id = world.instantiate(&dig).await;
    let ctx = world.context(&id).await;
    ctx.set_resource_status("web", "prov+c2", "web+Service", ResourceStatus::Failed)
        .await
        .unwrap();

    let resources = world.orch.status().resources_by_app(&dig, &query()).await.unwrap();
    assert_eq!(resources[0].app, "web");
    let names: Vec<&str> = resources[0].resources.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["web+Service", "web+Deployment"]);
    // c1 comes first, so c2's failure is not what gets reported.
    assert!(resources[0].resources.iter().all(|r| r.status == "Pending"));
}

#[tokio::test]
async fn test_summary_serializes_with_wire_names() {
    let (world, dig) = World::seeded().await;
    world.instantiate(&dig).await;
    let status = world.orch.status().summary(&dig, &query()).await.unwrap();
    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["deploymentIntentGroup"], DIG);
    assert_eq!(json["state"], "Instantiated");
    assert_eq!(json["view"], "rsync");
    assert!(json["resourceCounts"].is_object());
}
