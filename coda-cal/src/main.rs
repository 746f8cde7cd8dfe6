//! coda-cal - coda amplitude calibration
//!
//! Loads a JSON dataset (stacks, band parameters, MDAC constants, reference
//! magnitudes), runs one calibration and writes the calibrated parameters
//! and magnitudes as JSON into the output folder.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use coda_cal::config::{CodaCalToml, CONFIG_ENV_VAR, CONFIG_FILE_NAME, ROOT_FOLDER_ENV_VAR};
use coda_cal::repository::Repository;
use coda_cal::{
    CalibrationDataset, CalibrationJobController, CalibrationOutcome, CalibrationRepositories,
    CalibrationServices,
};
use coda_common::config::{
    load_toml_config, open_log_file, resolve_config_file, resolve_root_folder, write_json,
};
use coda_common::events::{CalibrationStatus, CodaEvent, EventBus};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for coda-cal
#[derive(Parser, Debug)]
#[command(name = "coda-cal")]
#[command(about = "Calibrate coda amplitude path, site and source models")]
#[command(version)]
struct Args {
    /// JSON dataset to calibrate
    #[arg(short, long)]
    dataset: PathBuf,

    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output folder for results
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Pick coda end times for stacks without an analyst pick
    #[arg(long)]
    auto_pick: bool,

    /// Seed for the path optimizer's random starts
    #[arg(long)]
    seed: Option<u64>,
}

fn load_config(args: &Args) -> Result<CodaCalToml> {
    let path = resolve_config_file(args.config.as_deref(), CONFIG_ENV_VAR, CONFIG_FILE_NAME);
    let mut config: CodaCalToml = load_toml_config(path.as_deref()).context("Failed to load configuration")?;
    if let Some(seed) = args.seed {
        config.calibration.optimizer.seed = Some(seed);
    }
    config
        .calibration
        .validate()
        .context("Invalid calibration configuration")?;
    Ok(config)
}

fn write_results(
    output: &Path,
    outcome: &CalibrationOutcome,
    repositories: &CalibrationRepositories,
) -> Result<()> {
    let shared: Vec<_> = outcome.parameters.values().cloned().collect();
    write_json(&shared, &output.join("shared_parameters.json"))?;
    write_json(&outcome.site_parameters, &output.join("site_parameters.json"))?;
    write_json(&outcome.measured_mws, &output.join("measured_mws.json"))?;
    write_json(&outcome.path_diagnostics, &output.join("path_diagnostics.json"))?;
    let spectra = repositories.spectra.find_all()?;
    write_json(&spectra, &output.join("spectra.json"))?;
    info!("Results written to {}", output.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    // Log to the configured file, or to stderr when none is set
    let (file_layer, stderr_layer) = match &config.logging.file {
        Some(path) => {
            let file = open_log_file(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(file));
            (Some(layer), None)
        }
        None => (
            None,
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        ),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .with(file_layer)
        .with(stderr_layer)
        .init();

    info!("Starting coda-cal {}", env!("CARGO_PKG_VERSION"));

    let output = resolve_root_folder(
        args.output.as_deref(),
        ROOT_FOLDER_ENV_VAR,
        config.root_folder.as_deref(),
    );
    info!("Output folder: {}", output.display());

    let dataset = CalibrationDataset::load(&args.dataset)
        .with_context(|| format!("Failed to load dataset {}", args.dataset.display()))?;
    let repositories = dataset.into_repositories();

    let events = EventBus::new(256);
    let mut rx = events.subscribe();
    let controller = CalibrationJobController::new(
        repositories.clone(),
        CalibrationServices::from_config(&config.calibration),
        events,
    );

    let run_id = controller.peek_next_run_id();
    if !controller.start(args.auto_pick) {
        bail!("Calibration could not be started");
    }

    loop {
        match rx.recv().await {
            Ok(CodaEvent::CalibrationStageChanged { stage, description, .. }) => {
                info!(run_id, stage, "{}", description);
            }
            Ok(CodaEvent::PathBandFitted { summary, .. }) if !summary.converged => {
                warn!(
                    run_id,
                    "Path fit for {}-{} Hz did not converge",
                    summary.low_frequency,
                    summary.high_frequency
                );
            }
            Ok(CodaEvent::CalibrationStatusChanged { run_id: id, status, .. })
                if id == run_id && status.is_terminal() =>
            {
                info!(run_id, %status, "Calibration finished");
                break;
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Progress events dropped"),
            Err(RecvError::Closed) => break,
        }
    }

    let handle = controller
        .take_handle()
        .ok_or_else(|| anyhow!("Calibration run handle missing"))?;
    let outcome = handle
        .await
        .context("Calibration worker failed")?
        .context("Calibration failed")?;

    write_results(&output, &outcome, &repositories)?;
    if outcome.measured_mws.is_empty() {
        warn!("No magnitudes were measured");
    }
    info!(
        status = %CalibrationStatus::Complete,
        magnitudes = outcome.measured_mws.len(),
        "Done"
    );
    Ok(())
}
