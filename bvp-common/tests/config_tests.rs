//! Unit tests for configuration file resolution and graceful degradation
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate BVP_CONFIG are marked with #[serial].

use bvp_common::config::{
    load_toml, load_toml_or_default, resolve_config_path, LoggingConfig, CONFIG_ENV_VAR,
};
use bvp_common::Error;
use serde::Deserialize;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};

#[derive(Debug, Default, Deserialize, PartialEq)]
struct SampleConfig {
    #[serde(default)]
    logging: LoggingConfig,
    #[serde(default)]
    name: Option<String>,
}

#[test]
#[serial]
fn test_env_var_used_when_no_cli_argument() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/bvp-from-env.toml");

    let path = resolve_config_path(None, CONFIG_ENV_VAR, "bvp-test");
    assert_eq!(path, Some(PathBuf::from("/tmp/bvp-from-env.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_cli_argument_overrides_env_var() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/bvp-from-env.toml");

    let path = resolve_config_path(Some(Path::new("/tmp/cli.toml")), CONFIG_ENV_VAR, "bvp-test");
    assert_eq!(path, Some(PathBuf::from("/tmp/cli.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_empty_env_var_is_ignored() {
    env::set_var(CONFIG_ENV_VAR, "");

    // App name chosen so no per-user file can exist
    let path = resolve_config_path(None, CONFIG_ENV_VAR, "bvp-test-nonexistent-app");
    assert_eq!(path, None);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.toml");

    let config: SampleConfig = load_toml_or_default(Some(&missing)).unwrap();
    assert_eq!(config, SampleConfig::default());
}

#[test]
fn test_no_path_falls_back_to_defaults() {
    let config: SampleConfig = load_toml_or_default(None).unwrap();
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_valid_file_is_parsed() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "name = \"demo\"\n[logging]\nlevel = \"debug\"").unwrap();

    let config: SampleConfig = load_toml(file.path()).unwrap();
    assert_eq!(config.name.as_deref(), Some("demo"));
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_malformed_file_is_config_error() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "name = [unterminated").unwrap();

    let result: Result<SampleConfig, Error> = load_toml_or_default(Some(file.path()));
    assert!(matches!(result, Err(Error::Config(_))));
}
