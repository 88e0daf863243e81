//! Unit tests for configuration resolution
//!
//! Covers:
//! - Missing TOML files do not stop startup
//! - Priority order CLI → ENV → TOML → compiled default
//! - Storage directory creation
//!
//! Tests that touch SIGHTLINE_* variables are marked #[serial] so they
//! never run in parallel with each other.

use serial_test::serial;
use sightline_common::config::{
    load_toml_config, CompiledDefaults, ConfigOverrides, ServerConfig, TomlConfig,
    DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_PORT,
};
use std::env;
use std::path::PathBuf;

fn clear_env() {
    for name in [
        "SIGHTLINE_ROOT_FOLDER",
        "SIGHTLINE_HOST",
        "SIGHTLINE_PORT",
        "SIGHTLINE_DETECTOR_URL",
        "SIGHTLINE_TTS_URL",
        "SIGHTLINE_PUBLIC_URL",
        "SIGHTLINE_FALLBACK_URL",
        "SIGHTLINE_MAX_UPLOAD_BYTES",
        "SIGHTLINE_MAX_JOBS",
    ] {
        env::remove_var(name);
    }
}

#[test]
fn test_compiled_defaults_for_current_platform() {
    let defaults = CompiledDefaults::for_current_platform();

    assert!(!defaults.root_folder.as_os_str().is_empty());
    assert_eq!(defaults.port, DEFAULT_PORT);
    assert!(defaults.max_concurrent_jobs >= 1);
}

#[test]
#[serial]
fn test_resolve_with_nothing_uses_defaults() {
    clear_env();

    let config = ServerConfig::resolve(&ConfigOverrides::default(), None).unwrap();
    let defaults = CompiledDefaults::for_current_platform();

    assert_eq!(config.root_folder, defaults.root_folder);
    assert_eq!(config.port, DEFAULT_PORT);
    assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
    assert_eq!(config.public_url, "http://localhost:8000");
    assert_eq!(config.logging.level, "info");
}

#[test]
#[serial]
fn test_toml_beats_default() {
    clear_env();

    let toml: TomlConfig = toml::from_str(
        r#"
        root_folder = "/srv/sightline"
        port = 9100
        detector_url = "http://gpu-box:9000/detect"

        [logging]
        level = "debug"
        "#,
    )
    .unwrap();

    let config = ServerConfig::resolve(&ConfigOverrides::default(), Some(&toml)).unwrap();
    assert_eq!(config.root_folder, PathBuf::from("/srv/sightline"));
    assert_eq!(config.port, 9100);
    assert_eq!(config.detector_url, "http://gpu-box:9000/detect");
    assert_eq!(config.logging.level, "debug");
    // Advertised URL follows the resolved port
    assert_eq!(config.public_url, "http://localhost:9100");
}

#[test]
#[serial]
fn test_env_beats_toml() {
    clear_env();
    env::set_var("SIGHTLINE_PORT", "9200");
    env::set_var("SIGHTLINE_ROOT_FOLDER", "/tmp/sightline-env");

    let toml = TomlConfig {
        port: Some(9100),
        root_folder: Some(PathBuf::from("/srv/sightline")),
        ..Default::default()
    };
    let config = ServerConfig::resolve(&ConfigOverrides::default(), Some(&toml)).unwrap();

    assert_eq!(config.port, 9200);
    assert_eq!(config.root_folder, PathBuf::from("/tmp/sightline-env"));

    clear_env();
}

#[test]
#[serial]
fn test_cli_beats_env() {
    clear_env();
    env::set_var("SIGHTLINE_PORT", "9200");

    let overrides = ConfigOverrides {
        port: Some(9300),
        log_level: Some("warn".to_string()),
        ..Default::default()
    };
    let config = ServerConfig::resolve(&overrides, None).unwrap();

    assert_eq!(config.port, 9300);
    assert_eq!(config.logging.level, "warn");

    clear_env();
}

#[test]
#[serial]
fn test_invalid_env_port_is_config_error() {
    clear_env();
    env::set_var("SIGHTLINE_PORT", "not-a-port");

    let result = ServerConfig::resolve(&ConfigOverrides::default(), None);
    assert!(result.is_err());

    clear_env();
}

#[test]
#[serial]
fn test_zero_concurrent_jobs_rejected() {
    clear_env();
    env::set_var("SIGHTLINE_MAX_JOBS", "0");

    let result = ServerConfig::resolve(&ConfigOverrides::default(), None);
    assert!(result.is_err());

    clear_env();
}

#[test]
fn test_explicit_missing_config_file_is_error() {
    let result = load_toml_config(Some(&PathBuf::from("/nonexistent/sightline.toml")));
    assert!(result.is_err());
}

#[test]
fn test_explicit_config_file_is_parsed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "port = 8123\nmax_concurrent_jobs = 3\n").unwrap();

    let config = load_toml_config(Some(&path)).unwrap().unwrap();
    assert_eq!(config.port, Some(8123));
    assert_eq!(config.max_concurrent_jobs, Some(3));
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_malformed_config_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "port = \"eighty\"").unwrap();

    assert!(load_toml_config(Some(&path)).is_err());
}

#[test]
fn test_ensure_directories_creates_storage_tree() {
    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig::with_root(dir.path().join("root"));

    config.ensure_directories().unwrap();

    assert!(config.uploads_dir().is_dir());
    assert!(config.history_dir().is_dir());
    assert!(config.tmp_dir().is_dir());
    assert_eq!(config.database_path(), dir.path().join("root").join("sightline.db"));
}
