//! Unit tests for configuration resolution and graceful degradation
//!
//! Covers:
//! - Missing TOML files do not cause termination (defaults are returned)
//! - Priority order CLI → ENV → config file → compiled default
//! - Atomic TOML writes
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate CODA_* variables are marked with #[serial].

use coda_common::config::{
    default_root_folder, load_toml_config, open_log_file, read_json, resolve_config_file, resolve_root_folder,
    write_json, write_toml_config, LoggingConfig,
};
use serde::{Deserialize, Serialize};
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct SampleConfig {
    #[serde(default)]
    logging: LoggingConfig,
    #[serde(default)]
    root_folder: Option<PathBuf>,
}

#[test]
fn test_logging_config_defaults_to_info() {
    let logging = LoggingConfig::default();
    assert_eq!(logging.level, "info");
    assert!(logging.file.is_none());
}

#[test]
fn test_missing_config_file_returns_defaults() {
    let temp_dir = tempfile::tempdir().unwrap();
    let missing = temp_dir.path().join("does-not-exist.toml");

    let config: SampleConfig = load_toml_config(Some(&missing)).unwrap();
    assert_eq!(config, SampleConfig::default(), "Missing file should yield defaults");

    let config: SampleConfig = load_toml_config(None).unwrap();
    assert_eq!(config, SampleConfig::default(), "No file should yield defaults");
}

#[test]
fn test_partial_config_fills_defaults() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("partial.toml");
    std::fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();

    let config: SampleConfig = load_toml_config(Some(&path)).unwrap();
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.file.is_none());
    assert!(config.root_folder.is_none());
}

#[test]
fn test_malformed_config_is_an_error() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "[logging\nlevel = ").unwrap();

    let result: coda_common::Result<SampleConfig> = load_toml_config(Some(&path));
    assert!(result.is_err(), "Malformed TOML must not silently fall back");
}

#[test]
fn test_write_toml_config_is_atomic_and_round_trips() {
    let temp_dir = tempfile::tempdir().unwrap();
    let target = temp_dir.path().join("nested").join("coda-cal.toml");

    let config = SampleConfig {
        logging: LoggingConfig {
            level: "warn".to_string(),
            file: Some(PathBuf::from("/tmp/coda.log")),
        },
        root_folder: Some(PathBuf::from("/data/coda")),
    };
    write_toml_config(&config, &target).unwrap();

    assert!(target.exists());
    assert!(!temp_dir.path().join("nested").join("coda-cal.toml.tmp").exists());

    let loaded: SampleConfig = load_toml_config(Some(&target)).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_json_helpers() {
    let temp_dir = tempfile::tempdir().unwrap();
    let target = temp_dir.path().join("out").join("values.json");
    write_json(&vec![1.5, 2.5], &target).unwrap();
    let values: Vec<f64> = read_json(&target).unwrap();
    assert_eq!(values, vec![1.5, 2.5]);

    let missing: coda_common::Result<Vec<f64>> = read_json(&temp_dir.path().join("nope.json"));
    assert!(matches!(missing, Err(coda_common::Error::NotFound(_))));
}

#[test]
#[serial]
fn test_config_file_cli_beats_env() {
    env::set_var("CODA_TEST_CONFIG", "/from/env.toml");
    let resolved = resolve_config_file(Some(Path::new("/from/cli.toml")), "CODA_TEST_CONFIG", "x.toml");
    assert_eq!(resolved, Some(PathBuf::from("/from/cli.toml")));

    let resolved = resolve_config_file(None, "CODA_TEST_CONFIG", "x.toml");
    assert_eq!(resolved, Some(PathBuf::from("/from/env.toml")));
    env::remove_var("CODA_TEST_CONFIG");
}

#[test]
#[serial]
fn test_root_folder_priority_order() {
    env::remove_var("CODA_TEST_ROOT");

    // Priority 4: compiled default
    let resolved = resolve_root_folder(None, "CODA_TEST_ROOT", None);
    assert_eq!(resolved, default_root_folder());

    // Priority 3: config value
    let resolved = resolve_root_folder(None, "CODA_TEST_ROOT", Some(Path::new("/cfg")));
    assert_eq!(resolved, PathBuf::from("/cfg"));

    // Priority 2: environment beats config
    env::set_var("CODA_TEST_ROOT", "/env");
    let resolved = resolve_root_folder(None, "CODA_TEST_ROOT", Some(Path::new("/cfg")));
    assert_eq!(resolved, PathBuf::from("/env"));

    // Priority 1: CLI beats everything
    let resolved = resolve_root_folder(Some(Path::new("/cli")), "CODA_TEST_ROOT", Some(Path::new("/cfg")));
    assert_eq!(resolved, PathBuf::from("/cli"));

    env::remove_var("CODA_TEST_ROOT");
}

#[test]
fn test_default_root_folder_is_not_empty() {
    assert!(!default_root_folder().as_os_str().is_empty());
}

#[test]
fn test_log_file_is_created_and_appended() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logs").join("coda-cal.log");

    {
        use std::io::Write;
        let mut file = open_log_file(&path).unwrap();
        writeln!(file, "first").unwrap();
    }
    {
        use std::io::Write;
        let mut file = open_log_file(&path).unwrap();
        writeln!(file, "second").unwrap();
    }

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content, "first\nsecond\n");
}
