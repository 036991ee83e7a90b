mod common;

use std::fs;
use std::sync::Arc;

use common::*;
use orkestra::bundle::{parse_bundle, BundleApplier, Outcome};
use orkestra::registry::{ControllerType, Registry};
use orkestra::store::{DocumentStore, SqliteStore};

fn registry() -> Registry {
    let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::open_memory().unwrap());
    Registry::with_store(store)
}

const BUNDLE: &str = r#"
kind: Project
metadata:
  name: proj
---
kind: CompositeApp
project: proj
metadata:
  name: shop
spec:
  version: v1
---
kind: App
project: proj
compositeApp: shop
version: v1
file: web.tgz
metadata:
  name: web
---
kind: CompositeProfile
project: proj
compositeApp: shop
version: v1
metadata:
  name: default
---
kind: AppProfile
project: proj
compositeApp: shop
version: v1
compositeProfile: default
file: web-profile.tgz
metadata:
  name: web-profile
spec:
  app: web
---
kind: Controller
metadata:
  name: hpa
spec:
  host: hpa.svc
  port: 9040
  type: placement
  priority: 3
---
kind: Cluster
provider: prov
name: c1
labels: [edge]
---
kind: DeploymentIntentGroup
project: proj
compositeApp: shop
version: v1
metadata:
  name: dig1
spec:
  profile: default
  version: r1
  logicalCloud: cloud
---
kind: GenericPlacementIntent
project: proj
compositeApp: shop
version: v1
dig: dig1
metadata:
  name: gpi
---
kind: DigIntents
project: proj
compositeApp: shop
version: v1
dig: dig1
intent:
  genericPlacementIntent: gpi
  hpa: hpa-intent
"#;

fn write_bundle(dir: &std::path::Path) -> std::path::PathBuf {
    fs::write(dir.join("web.tgz"), chart("web")).unwrap();
    fs::write(dir.join("web-profile.tgz"), profile()).unwrap();
    let path = dir.join("bundle.yaml");
    fs::write(&path, BUNDLE).unwrap();
    path
}

#[tokio::test]
async fn test_apply_creates_every_document_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_bundle(dir.path());
    let r = registry();

    let applied = BundleApplier::apply_file(&r, &path).await.unwrap();
    let kinds: Vec<&str> = applied.iter().map(|a| a.kind.as_str()).collect();
    assert_eq!(
        kinds,
        vec![
            "Project",
            "CompositeApp",
            "App",
            "CompositeProfile",
            "AppProfile",
            "Controller",
            "Cluster",
            "DeploymentIntentGroup",
            "GenericPlacementIntent",
            "DigIntents",
        ]
    );
    assert!(applied.iter().all(|a| a.outcome == Outcome::Created));
    assert_eq!(applied[6].name, "prov/c1");

    let ca = orkestra::registry::CompositeAppRef::new("proj", "shop", "v1");
    assert_eq!(r.apps.get_app_content(&ca, "web").await.unwrap(), chart("web"));
    let hpa = r.controllers.get_controller("hpa").await.unwrap();
    assert_eq!(hpa.spec.controller_type, ControllerType::Placement);
    assert_eq!(hpa.spec.priority, 3);
    let intents = r.digs.intents(&ca.dig("dig1")).await.unwrap();
    assert_eq!(intents.intent.get("hpa").map(String::as_str), Some("hpa-intent"));
}

#[tokio::test]
async fn test_reapply_reports_existing_entities() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_bundle(dir.path());
    let r = registry();

    BundleApplier::apply_file(&r, &path).await.unwrap();
    let again = BundleApplier::apply_file(&r, &path).await.unwrap();
    let project = &again[0];
    assert_eq!(project.kind, "Project");
    assert_eq!(project.outcome, Outcome::Exists);
    assert_eq!(again.iter().find(|a| a.kind == "App").unwrap().outcome, Outcome::Exists);
}

#[tokio::test]
async fn test_missing_parent_names_the_document() {
    let r = registry();
    let docs = parse_bundle("kind: CompositeApp\nproject: nope\nmetadata:\n  name: shop\nspec:\n  version: v1\n").unwrap();
    let err = BundleApplier::new(&r, ".").apply_all(&docs).await.unwrap_err();
    assert!(format!("{err:#}").contains("document 1 (CompositeApp)"));
}

#[tokio::test]
async fn test_unknown_kind_and_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let r = registry();

    let docs = parse_bundle("kind: Spaceship\nmetadata:\n  name: x\n").unwrap();
    let err = BundleApplier::new(&r, dir.path()).apply_all(&docs).await.unwrap_err();
    assert!(format!("{err:#}").contains("unknown kind"));

    let docs = parse_bundle(
        "kind: Project\nmetadata:\n  name: proj\n---\nkind: CompositeApp\nproject: proj\nmetadata:\n  name: shop\nspec:\n  version: v1\n---\nkind: App\nproject: proj\ncompositeApp: shop\nversion: v1\nfile: nowhere.tgz\nmetadata:\n  name: web\n",
    )
    .unwrap();
    let err = BundleApplier::new(&r, dir.path()).apply_all(&docs).await.unwrap_err();
    assert!(format!("{err:#}").contains("nowhere.tgz"));
}
