//! Unit tests for configuration and graceful degradation
//!
//! Covers:
//! - Missing TOML files fall back to defaults
//! - Root folder resolution priority (CLI → ENV → TOML → default)
//! - Automatic root folder creation
//!
//! Tests that manipulate LYRA_ROOT_FOLDER are marked with #[serial]
//! so they run sequentially, not in parallel.

use lyra_common::config::{
    load_module_config, load_toml_config, CompiledDefaults, RootFolderInitializer,
    RootFolderResolver, ROOT_FOLDER_ENV,
};
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_compiled_defaults_for_current_platform() {
    let defaults = CompiledDefaults::for_current_platform();

    assert!(!defaults.root_folder.as_os_str().is_empty());
    assert_eq!(defaults.log_level, "info");
    assert!(defaults.log_file.is_none());
    assert!(defaults.root_folder.to_string_lossy().contains("lyra"));
}

#[test]
#[serial]
fn test_resolver_with_no_overrides_uses_default() {
    env::remove_var(ROOT_FOLDER_ENV);

    let resolver = RootFolderResolver::new("test-module");
    let root_folder = resolver.resolve();

    let defaults = CompiledDefaults::for_current_platform();
    assert_eq!(root_folder, defaults.root_folder);
}

#[test]
#[serial]
fn test_resolver_env_var_beats_toml() {
    let test_path = "/tmp/lyra-test-env-folder";
    env::set_var(ROOT_FOLDER_ENV, test_path);

    let resolver = RootFolderResolver::new("test-module")
        .with_toml_root(Some(PathBuf::from("/tmp/lyra-from-toml")));
    let root_folder = resolver.resolve();

    env::remove_var(ROOT_FOLDER_ENV);
    assert_eq!(root_folder, PathBuf::from(test_path));
}

#[test]
#[serial]
fn test_resolver_cli_beats_env() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/lyra-test-env-folder");

    let resolver = RootFolderResolver::new("test-module")
        .with_cli_override(Some(PathBuf::from("/tmp/lyra-cli")));
    let root_folder = resolver.resolve();

    env::remove_var(ROOT_FOLDER_ENV);
    assert_eq!(root_folder, PathBuf::from("/tmp/lyra-cli"));
}

#[test]
#[serial]
fn test_resolver_uses_toml_when_no_env() {
    env::remove_var(ROOT_FOLDER_ENV);

    let resolver = RootFolderResolver::new("test-module")
        .with_toml_root(Some(PathBuf::from("/tmp/lyra-from-toml")));

    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/lyra-from-toml"));
}

#[test]
fn test_initializer_creates_directory() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("nested").join("lyra");

    let initializer = RootFolderInitializer::new(root.clone());
    initializer.ensure_directory_exists().unwrap();

    assert!(root.is_dir());
    assert_eq!(initializer.database_path(), root.join("lyra.db"));
}

#[test]
fn test_explicit_missing_config_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("absent.toml");

    assert!(load_module_config("lyra-ca", Some(&missing)).is_err());
}

#[test]
fn test_malformed_toml_reports_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "[pipeline\nchunk_size = ").unwrap();

    let err = load_toml_config(&path).unwrap_err();
    assert!(err.to_string().contains("Configuration error"));
}

#[test]
fn test_full_config_parses() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("lyra-ca.toml");
    std::fs::write(
        &path,
        r#"
root_folder = "/srv/lyra"

[logging]
level = "debug"

[cache]
ttl_minutes = 45
durable_enabled = false

[pipeline]
chunk_size = 80
max_attempts = 4
base_delay_ms = 250
inter_chunk_delay_ms = 100

[annotation]
endpoint = "https://classifier.example.org/annotate"
requests_per_second = 5

[corpora.gaucho]
url = "https://data.example.org/gaucho.json"
"#,
    )
    .unwrap();

    let config = load_module_config("lyra-ca", Some(&path)).unwrap();
    assert_eq!(config.root_folder, Some(PathBuf::from("/srv/lyra")));
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.cache.ttl_minutes, 45);
    assert!(!config.cache.durable_enabled);
    assert_eq!(config.pipeline.chunk_size, 80);
    assert_eq!(config.pipeline.max_attempts, 4);
    assert_eq!(config.pipeline.malformed_warn_ratio, 0.1);
    assert_eq!(
        config.annotation.endpoint.as_deref(),
        Some("https://classifier.example.org/annotate")
    );
    assert_eq!(config.annotation.timeout_secs, 60);
    assert!(config.corpora.contains_key("gaucho"));
}
