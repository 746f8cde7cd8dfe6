//! Configuration file resolution and dataset round trips
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate CODA_CAL_CONFIG / CODA_ROOT_FOLDER are marked with
//! #[serial].

mod helpers;

use coda_cal::config::{CodaCalToml, CONFIG_ENV_VAR, CONFIG_FILE_NAME, ROOT_FOLDER_ENV_VAR};
use coda_cal::repository::Repository;
use coda_cal::CalibrationDataset;
use coda_common::config::{
    load_toml_config, resolve_config_file, resolve_root_folder, write_json, write_toml_config,
};
use serial_test::serial;
use std::path::Path;

#[test]
#[serial]
fn test_env_config_file_is_loaded() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(
        &path,
        "[logging]\nlevel = \"debug\"\n\n[calibration.optimizer]\nseed = 7\n",
    )
    .unwrap();

    std::env::set_var(CONFIG_ENV_VAR, &path);
    let resolved = resolve_config_file(None, CONFIG_ENV_VAR, CONFIG_FILE_NAME);
    std::env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(resolved.as_deref(), Some(path.as_path()));
    let config: CodaCalToml = load_toml_config(resolved.as_deref()).unwrap();
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.calibration.optimizer.seed, Some(7));
    assert_eq!(config.calibration.phase_velocity, 3.5);
}

#[test]
#[serial]
fn test_cli_config_beats_env() {
    std::env::set_var(CONFIG_ENV_VAR, "/nonexistent/env.toml");
    let cli = Path::new("/tmp/cli.toml");
    let resolved = resolve_config_file(Some(cli), CONFIG_ENV_VAR, CONFIG_FILE_NAME);
    std::env::remove_var(CONFIG_ENV_VAR);
    assert_eq!(resolved.as_deref(), Some(cli));
}

#[test]
#[serial]
fn test_output_folder_priority() {
    let from_toml = Path::new("/data/from-toml");

    std::env::set_var(ROOT_FOLDER_ENV_VAR, "/data/from-env");
    assert_eq!(
        resolve_root_folder(Some(Path::new("/data/from-cli")), ROOT_FOLDER_ENV_VAR, Some(from_toml)),
        Path::new("/data/from-cli")
    );
    assert_eq!(
        resolve_root_folder(None, ROOT_FOLDER_ENV_VAR, Some(from_toml)),
        Path::new("/data/from-env")
    );
    std::env::remove_var(ROOT_FOLDER_ENV_VAR);

    assert_eq!(resolve_root_folder(None, ROOT_FOLDER_ENV_VAR, Some(from_toml)), from_toml);
}

#[test]
fn test_written_config_reloads_unchanged() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("nested").join(CONFIG_FILE_NAME);

    let mut config = CodaCalToml::default();
    config.calibration.optimizer.seed = Some(99);
    config.calibration.reference_phase = "PG".to_string();
    write_toml_config(&config, &path).unwrap();

    let reloaded: CodaCalToml = load_toml_config(Some(&path)).unwrap();
    assert_eq!(reloaded.calibration, config.calibration);
}

#[test]
fn test_dataset_file_loads_into_repositories() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("dataset.json");
    write_json(&helpers::three_event_dataset([0.0, 0.2, 0.4]), &path).unwrap();

    let dataset = CalibrationDataset::load(&path).unwrap();
    assert_eq!(dataset.stacks.len(), 6);

    let repositories = dataset.into_repositories();
    let stacks = repositories.stacks.get_all_stacks().unwrap();
    assert_eq!(stacks.len(), 6);
    assert!(stacks.iter().all(|w| w.is_valid() && w.end_pick().is_some()));
    assert_eq!(repositories.reference_mws.find_all().unwrap().len(), 1);
    assert!(repositories.find_mdac_ps("lg").unwrap().is_some());
}
