use serial_test::serial;
use temp_env::with_vars;

use super::*;

fn cleanup_all_datastore_env_vars() {
    for (key, _) in std::env::vars() {
        if key.starts_with("DATASTORE__") || key == "DATASTORE_CONFIG_PATH" {
            std::env::remove_var(&key);
        }
    }
}

#[test]
#[serial]
fn default_config_should_initialize_with_hardcoded_values() {
    let config = DatastoreConfig::default();

    assert_eq!(config.lock_ttl_ms, 20_000);
    assert_eq!(config.lock_ttl(), Duration::from_secs(20));
    assert_eq!(config.retry.sync.max_elapsed_ms, 60_000);
    assert!(!config.retry.resync.is_bounded());
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn new_should_merge_environment_overrides() {
    cleanup_all_datastore_env_vars();
    with_vars(
        vec![
            ("DATASTORE__LOCK_TTL_MS", Some("5000")),
            ("DATASTORE__RETRY__SYNC__MAX_ELAPSED_MS", Some("1500")),
        ],
        || {
            let config = DatastoreConfig::new().unwrap();

            assert_eq!(config.lock_ttl_ms, 5000);
            assert_eq!(config.retry.sync.max_elapsed_ms, 1500);
            // Untouched fields keep their defaults
            assert_eq!(config.retry.sync.initial_interval_ms, 500);
            assert_eq!(config.watch_buffer, 16);
        },
    );
}

#[test]
#[serial]
fn with_override_config_should_merge_file_settings() {
    cleanup_all_datastore_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("datastore.toml");

    std::fs::write(
        &config_path,
        r#"
        lock_ttl_ms = 30000

        [retry.resync]
        initial_interval_ms = 100
        max_interval_ms = 2000
        "#,
    )
    .unwrap();

    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let config = DatastoreConfig::default()
            .with_override_config(config_path.to_str().unwrap())
            .unwrap();

        assert_eq!(config.lock_ttl_ms, 30000);
        assert_eq!(config.retry.resync.initial_interval_ms, 100);
        assert_eq!(config.retry.resync.max_interval_ms, 2000);
        assert_eq!(config.retry.sync.max_elapsed_ms, 60_000);
    });
}

#[test]
#[serial]
fn env_should_win_over_config_file() {
    cleanup_all_datastore_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("datastore.toml");
    std::fs::write(&config_path, "lock_ttl_ms = 30000\n").unwrap();

    with_vars(
        vec![
            ("DATASTORE_CONFIG_PATH", Some(config_path.to_str().unwrap())),
            ("DATASTORE__LOCK_TTL_MS", Some("7000")),
        ],
        || {
            let config = DatastoreConfig::new().unwrap();
            assert_eq!(config.lock_ttl_ms, 7000);
        },
    );
}

#[test]
#[serial]
fn new_should_fail_on_missing_config_file() {
    cleanup_all_datastore_env_vars();
    with_vars(vec![("DATASTORE_CONFIG_PATH", Some("/nonexistent/datastore.toml"))], || {
        assert!(DatastoreConfig::new().is_err());
    });
}

#[test]
fn validate_should_reject_zero_lock_ttl() {
    let config = DatastoreConfig {
        lock_ttl_ms: 0,
        ..Default::default()
    };
    assert!(matches!(config.validate(), Err(Error::Config(_))));
}

#[test]
fn validate_should_reject_unbounded_sync_policy() {
    let mut config = DatastoreConfig::default();
    config.retry.sync.max_elapsed_ms = 0;
    assert!(config.validate().is_err());
}

#[test]
fn validate_should_reject_bad_backoff_shape() {
    let mut config = DatastoreConfig::default();
    config.retry.resync.multiplier = 0.5;
    assert!(config.clone().validate().is_err());

    let mut config = DatastoreConfig::default();
    config.retry.resync.randomization_factor = 1.0;
    assert!(config.clone().validate().is_err());

    let mut config = DatastoreConfig::default();
    config.retry.resync.max_interval_ms = 10;
    assert!(config.validate().is_err());
}
