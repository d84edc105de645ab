use relay_core::RelayCore;
use relay_core::types::{AppConfig, Config, DAY, SavedConfig, SweepScope};
use tempfile::TempDir;

/// Verify a missing config file yields the documented defaults.
#[test]
fn test_missing_file_gives_defaults() {
    let temp = TempDir::new().unwrap();
    let config = AppConfig::load(&AppConfig::path(temp.path())).unwrap();

    assert_eq!(config.general.password, "abc");
    assert_eq!(config.general.address, "127.0.0.1:80");
    assert_eq!(config.storage.capacity_bytes, 1 << 30);
    assert_eq!(config.storage.clips_limit, 100);
    assert_eq!(config.lifecycle.grey_days, 15);
    assert_eq!(config.lifecycle.expire_days, 30);
    assert_eq!(config.lifecycle.sweep_scope, SweepScope::AllKinds);
    assert_eq!(config.session.max_age_days, 99);
    assert!(config.validate().is_empty());
}

/// Verify a saved config loads back with the same values.
#[test]
fn test_save_and_load() {
    let temp = TempDir::new().unwrap();
    let path = AppConfig::path(temp.path());
    let mut config = AppConfig::default();
    config.general.password = "s3cret".to_string();
    config.storage.capacity_bytes = 4096;
    config.lifecycle.sweep_scope = SweepScope::FilesOnly;

    config.save(&path).unwrap();
    let loaded = AppConfig::load(&path).unwrap();

    assert_eq!(loaded.general.password, "s3cret");
    assert_eq!(loaded.storage.capacity_bytes, 4096);
    assert_eq!(loaded.lifecycle.sweep_scope, SweepScope::FilesOnly);
}

/// Verify a partial file fills the missing sections with defaults.
#[test]
fn test_partial_file() {
    let temp = TempDir::new().unwrap();
    let path = AppConfig::path(temp.path());
    std::fs::write(
        &path,
        "[storage]\nclips_limit = 5\n\n[lifecycle]\nsweep_scope = \"files-only\"\n",
    )
    .unwrap();

    let config = AppConfig::load(&path).unwrap();

    assert_eq!(config.storage.clips_limit, 5);
    assert_eq!(config.storage.capacity_bytes, 1 << 30);
    assert_eq!(config.lifecycle.sweep_scope, SweepScope::FilesOnly);
    assert_eq!(config.general.password, "abc");
}

/// Verify malformed TOML is reported instead of silently ignored.
#[test]
fn test_malformed_file_is_error() {
    let temp = TempDir::new().unwrap();
    let path = AppConfig::path(temp.path());
    std::fs::write(&path, "[storage\nclips_limit = ").unwrap();

    assert!(AppConfig::load(&path).is_err());
}

/// Verify invalid values are reported and replaced by defaults.
#[test]
fn test_invalid_values() {
    let mut config = AppConfig::default();
    config.general.password.clear();
    config.storage.clips_limit = 0;
    config.lifecycle.grey_days = 30;
    config.lifecycle.expire_days = 10;

    assert_eq!(config.validate().len(), 3);

    let fixed = config.with_defaults_for_invalid();
    assert!(fixed.validate().is_empty());
    assert_eq!(fixed.general.password, "abc");
    assert_eq!(fixed.storage.clips_limit, 100);
    assert_eq!(fixed.lifecycle.grey_days, 15);
    assert_eq!(fixed.lifecycle.expire_days, 30);
}

/// Verify the file settings reach the store.
#[test]
fn test_saved_config_drives_store() {
    let temp = TempDir::new().unwrap();
    let mut app = AppConfig::default();
    app.storage.capacity_bytes = 10;
    app.lifecycle.grey_days = 2;
    app.lifecycle.expire_days = 4;

    let saved = SavedConfig::from(&app);
    assert_eq!(saved.grey_after, 2 * DAY);
    assert_eq!(saved.expire_after, 4 * DAY);

    let core = RelayCore::open(Config {
        base_path: temp.path().to_path_buf(),
        saved,
    })
    .unwrap();

    assert_eq!(core.usage().unwrap().capacity, 10);
    assert!(
        core.submit_text("more than ten bytes", std::time::SystemTime::now())
            .is_err()
    );
}
