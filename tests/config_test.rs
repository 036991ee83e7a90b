use std::fs;

use orkestra::config::loader::{parse_config, validate_config};
use orkestra::config::{load_config, OrchestratorConfig};

#[test]
fn test_load_full_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("orkestra.yaml");
    fs::write(
        &path,
        r#"
service-port: 9100
database:
  path: /var/lib/orkestra/docs.db
context-store:
  path: /var/lib/orkestra/ctx.db
rpc:
  deadline-secs: 30
  ready-notify-backoff-secs: 2
helm:
  binary: /usr/local/bin/helm
  profile-manifest: profile.yaml
max-blob-bytes: 1048576
sync-controller: rsync-east
tls:
  ca-file: ca.pem
  server-cert: cert.pem
  server-key: key.pem
"#,
    )
    .unwrap();

    let config = load_config(&path).expect("Should load config");
    assert_eq!(config.service_port, 9100);
    assert_eq!(config.database.path, "/var/lib/orkestra/docs.db");
    assert_eq!(config.context_store.path, "/var/lib/orkestra/ctx.db");
    assert_eq!(config.rpc.deadline().as_secs(), 30);
    assert_eq!(config.rpc.ready_notify_backoff().as_secs(), 2);
    assert_eq!(config.helm.binary, "/usr/local/bin/helm");
    assert_eq!(config.helm.profile_manifest, "profile.yaml");
    assert_eq!(config.max_blob_bytes, 1_048_576);
    assert_eq!(config.sync_controller, "rsync-east");
    assert!(config.tls_enabled());
}

#[test]
fn test_missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config(&dir.path().join("absent.yaml")).unwrap();
    assert_eq!(config.database.path, OrchestratorConfig::default().database.path);
    assert_eq!(config.sync_controller, "rsync");
    assert!(!config.tls_enabled());
}

#[test]
fn test_parse_invalid_yaml() {
    assert!(parse_config("service-port: [").is_err());
    assert!(parse_config("service-port: not-a-port\n").is_err());
}

#[test]
fn test_invalid_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.yaml");
    fs::write(&path, "rpc: [1, 2\n").unwrap();
    let err = load_config(&path).unwrap_err();
    assert!(format!("{err:#}").contains("broken.yaml"));
}

#[test]
fn test_validation_rejects_unusable_settings() {
    let config = parse_config("sync-controller: \"  \"\n").unwrap();
    assert!(validate_config(&config).is_err());

    let config = parse_config("max-blob-bytes: 0\n").unwrap();
    assert!(validate_config(&config).is_err());

    let config = parse_config("service-port: 0\n").unwrap();
    assert!(validate_config(&config).is_err());

    let config = parse_config("tls:\n  server-key: key.pem\n").unwrap();
    assert!(validate_config(&config).is_err());
}

#[test]
fn test_zero_deadline_fails_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("orkestra.yaml");
    fs::write(&path, "rpc:\n  deadline-secs: 0\n").unwrap();
    assert!(load_config(&path).is_err());
}
