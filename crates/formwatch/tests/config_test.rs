use formwatch::config::{ConfigError, ConfigLoader};
use formwatch_common::{CaptureConfig, TriggerSource};
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn partial_file_keeps_defaults() {
    let file = write_config(
        r#"
retry:
  max_attempts: 5
  delay_overrides:
    cross_check: [100]
ignore:
  extra_patterns: ["donate"]
network:
  capture_unclassified: false
"#,
    );
    let config = ConfigLoader::load_from(file.path()).await.unwrap();

    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.retry.delays_ms, vec![300, 600]);
    assert_eq!(config.retry.delays_for(TriggerSource::CrossCheck), &[100]);
    assert!(config.ignore.patterns.iter().any(|p| p == "login"));
    assert_eq!(config.ignore.extra_patterns, vec!["donate"]);
    assert!(!config.network.capture_unclassified);
    assert_eq!(config.watcher.rescan_interval_ms, 1500);
}

#[tokio::test]
async fn empty_file_is_default() {
    let file = write_config("   \n");
    let config = ConfigLoader::load_from(file.path()).await.unwrap();
    assert_eq!(config, CaptureConfig::default());
}

#[tokio::test]
async fn malformed_yaml_is_a_parse_error() {
    let file = write_config("retry: [not, a, table");
    let err = ConfigLoader::load_from(file.path()).await.unwrap_err();
    match err {
        ConfigError::Parse { path, .. } => assert_eq!(path, file.path()),
        other => panic!("expected a parse error, got {other}"),
    }
}

#[tokio::test]
async fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ConfigLoader::load_from(&dir.path().join("absent.yaml"))
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("absent.yaml"));
}

#[tokio::test]
async fn explicit_path_wins_over_search() {
    let file = write_config("dispatch:\n  duplicate_window_ms: 0\n");
    let config = ConfigLoader::resolve(Some(file.path())).await.unwrap();
    assert_eq!(config.dispatch.duplicate_window_ms, 0);
}

#[tokio::test]
async fn config_round_trips_through_yaml() {
    let yaml = serde_yaml::to_string(&CaptureConfig::default()).unwrap();
    let file = write_config(&yaml);
    let config = ConfigLoader::load_from(file.path()).await.unwrap();
    assert_eq!(config, CaptureConfig::default());
}

#[tokio::test]
async fn zero_attempts_names_retry_section() {
    let file = write_config("retry:\n  max_attempts: 0\n");
    let err = ConfigLoader::load_from(file.path()).await.unwrap_err();
    match &err {
        ConfigError::Invalid { section, reason, .. } => {
            assert_eq!(*section, "retry");
            assert!(reason.contains("max_attempts"));
        }
        other => panic!("expected a validation error, got {other}"),
    }
    assert!(err.to_string().contains("[retry]"));
}

#[tokio::test]
async fn empty_override_names_its_trigger() {
    let file = write_config("retry:\n  delay_overrides:\n    watched_click: []\n");
    let err = ConfigLoader::load_from(file.path()).await.unwrap_err();
    assert!(err.to_string().contains("delay_overrides.watched_click"));
}

#[tokio::test]
async fn zero_rescan_interval_names_watcher_section() {
    let file = write_config("watcher:\n  rescan_interval_ms: 0\n");
    let err = ConfigLoader::load_from(file.path()).await.unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { section: "watcher", .. }));

    let disabled = write_config("watcher:\n  enabled: false\n  rescan_interval_ms: 0\n");
    let config = ConfigLoader::load_from(disabled.path()).await.unwrap();
    assert!(!config.watcher.enabled);
}

#[tokio::test]
async fn search_takes_first_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("formwatch.yaml");
    let present = dir.path().join("formwatch.yml");
    std::fs::write(&present, "retry:\n  max_attempts: 7\n").unwrap();

    let config = ConfigLoader::load_first(&[missing.clone(), present])
        .await
        .unwrap();
    assert_eq!(config.retry.max_attempts, 7);

    let config = ConfigLoader::load_first(&[missing]).await.unwrap();
    assert_eq!(config, CaptureConfig::default());
}

#[test]
fn search_path_prefers_working_directory() {
    let paths = ConfigLoader::search_path();
    assert_eq!(paths[0], std::path::PathBuf::from("formwatch.yaml"));
    assert_eq!(paths[1], std::path::PathBuf::from("formwatch.yml"));
    assert!(paths.iter().all(|p| p.ends_with("formwatch.yaml")
        || p.ends_with("formwatch.yml")
        || p.ends_with("config.yaml")));
}
