//! Tests for configuration loading and database path resolution
//!
//! Uses serial_test to prevent environment variable races: tests that touch
//! QCAPP_DATABASE or QCAPP_CONFIG are marked #[serial].

use qc_common::config::{
    default_database_path, load_toml_config, load_toml_config_from, resolve_database_path,
    TomlConfig, CONFIG_ENV_VAR, DATABASE_ENV_VAR,
};
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};

#[test]
#[serial]
fn test_resolver_with_no_overrides_uses_default() {
    env::remove_var(DATABASE_ENV_VAR);

    let path = resolve_database_path(None, &TomlConfig::default());

    assert_eq!(path, default_database_path());
}

#[test]
#[serial]
fn test_resolver_env_var_beats_toml() {
    env::set_var(DATABASE_ENV_VAR, "/tmp/qcapp-env.db");
    let config = TomlConfig {
        database: Some(PathBuf::from("/tmp/qcapp-toml.db")),
        ..Default::default()
    };

    let path = resolve_database_path(None, &config);
    assert_eq!(path, PathBuf::from("/tmp/qcapp-env.db"));

    env::remove_var(DATABASE_ENV_VAR);
}

#[test]
#[serial]
fn test_resolver_cli_beats_env_var() {
    env::set_var(DATABASE_ENV_VAR, "/tmp/qcapp-env.db");

    let path = resolve_database_path(Some(Path::new("/tmp/qcapp-cli.db")), &TomlConfig::default());
    assert_eq!(path, PathBuf::from("/tmp/qcapp-cli.db"));

    env::remove_var(DATABASE_ENV_VAR);
}

#[test]
#[serial]
fn test_resolver_toml_used_without_env() {
    env::remove_var(DATABASE_ENV_VAR);
    let config = TomlConfig {
        database: Some(PathBuf::from("/tmp/qcapp-toml.db")),
        ..Default::default()
    };

    assert_eq!(resolve_database_path(None, &config), PathBuf::from("/tmp/qcapp-toml.db"));
}

#[test]
#[serial]
fn test_config_env_var_points_at_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
database = "/data/qc.db"

[server]
task_timeout_secs = 30
worker_count = 2

[ingest]
render_command = "/opt/qc/render"
"#,
    )
    .unwrap();

    env::set_var(CONFIG_ENV_VAR, &path);
    let config = load_toml_config().unwrap();
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(config.database, Some(PathBuf::from("/data/qc.db")));
    assert_eq!(config.server.task_timeout_secs, Some(30));
    assert_eq!(config.server.worker_count, Some(2));
    assert_eq!(config.ingest.render_command.as_deref(), Some("/opt/qc/render"));
}

#[test]
fn test_malformed_config_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "database = [unterminated").unwrap();

    let result = load_toml_config_from(&path);
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("Configuration error"));
}
