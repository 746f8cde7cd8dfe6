//! Calibration pipeline
//!
//! Runs the nine calibration stages in order against a
//! [`CalibrationRepositories`] bundle:
//!
//! 1. Snapshot band parameters and fetch stacks
//! 2. Peak velocity/SNR, SNR filter, reset intermediate stores
//! 3. Coda shape fit (optionally auto-picking end times)
//! 4. Synthetics and raw spectra for end-picked stacks
//! 5. Path correction fit
//! 6. Path-corrected spectra
//! 7. Site terms and moment magnitudes
//! 8. Site-corrected spectra, persisted with their synthetics
//! 9. Done
//!
//! Each stage boundary is announced on the event bus. Errors end the run
//! at the stage where they happen; the caller reports the terminal status.

use crate::config::{CalibrationConfig, MwFitConfig};
use crate::error::{CalibrationError, CalibrationResult};
use crate::models::{
    CalibrationRun, CalibrationStage, FrequencyBand, MeasuredMwParameters,
    PathCalibrationMeasurement, SharedFrequencyBandParameters, SiteFrequencyBandParameters,
    Waveform,
};
use crate::repository::{replace_all, CalibrationRepositories};
use crate::services::{
    filter_by_min_snr, CodaShapeCalibrator, CodaSnrEndTimePicker, DistanceCalculator,
    MaxVelocityCalculator, MdacCalculator, PathCorrectionOptimizer, PeakVelocityMeasurer,
    ShapeCalibrator, SiteCorrectionEngine, SourceSpectrumModel, SpectraCalculator,
    SpectraMeasurer, SpectralMwFitter, SyntheticCodaGenerator, SyntheticGenerator, Wgs84Distance,
};
use coda_common::events::{BandFitSummary, CodaEvent, EventBus};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Stage collaborators
#[derive(Clone)]
pub struct CalibrationServices {
    pub peak_velocity: Arc<dyn PeakVelocityMeasurer>,
    pub shape: Arc<dyn ShapeCalibrator>,
    pub synthetics: Arc<dyn SyntheticGenerator>,
    pub spectra: Arc<dyn SpectraMeasurer>,
    pub path: Arc<PathCorrectionOptimizer>,
    pub source_model: Arc<dyn SourceSpectrumModel>,
    pub mw_fit: MwFitConfig,
    /// Phase whose MDAC constants drive site terms and magnitudes
    pub phase: String,
}

impl CalibrationServices {
    /// Default collaborators with WGS84 distances
    pub fn from_config(config: &CalibrationConfig) -> Self {
        Self::with_distance(config, Arc::new(Wgs84Distance))
    }

    pub fn with_distance(config: &CalibrationConfig, distance: Arc<dyn DistanceCalculator>) -> Self {
        let picker = Arc::new(CodaSnrEndTimePicker::new(
            config.shape.pick_window,
            config.shape.spike_slope,
        ));
        Self {
            peak_velocity: Arc::new(MaxVelocityCalculator::new(
                Arc::clone(&distance),
                config.peak_velocity.clone(),
            )),
            shape: Arc::new(CodaShapeCalibrator::new(picker, config.shape.clone())),
            synthetics: Arc::new(SyntheticCodaGenerator::new(
                Arc::clone(&distance),
                config.synthetics.clone(),
            )),
            spectra: Arc::new(SpectraCalculator::new(
                Arc::clone(&distance),
                config.phase_velocity,
                config.spectra.clone(),
            )),
            path: Arc::new(PathCorrectionOptimizer::new(
                distance,
                config.optimizer.clone(),
                config.phase_velocity,
            )),
            source_model: Arc::new(MdacCalculator),
            mw_fit: config.mw_fit.clone(),
            phase: config.reference_phase.clone(),
        }
    }
}

/// What a completed run produced
#[derive(Debug, Clone, Default)]
pub struct CalibrationOutcome {
    pub parameters: BTreeMap<FrequencyBand, SharedFrequencyBandParameters>,
    pub site_parameters: Vec<SiteFrequencyBandParameters>,
    pub measured_mws: Vec<MeasuredMwParameters>,
    pub path_diagnostics: Vec<PathCalibrationMeasurement>,
    /// Number of final spectra measurements
    pub spectra_count: usize,
}

/// Stage sequencer for one calibration run
pub struct CalibrationPipeline {
    repositories: CalibrationRepositories,
    services: CalibrationServices,
    events: EventBus,
}

impl CalibrationPipeline {
    pub fn new(repositories: CalibrationRepositories, services: CalibrationServices, events: EventBus) -> Self {
        Self {
            repositories,
            services,
            events,
        }
    }

    fn enter(&self, run: &mut CalibrationRun, stage: CalibrationStage) {
        run.enter_stage(stage);
        info!(
            run_id = run.run_id,
            stage = stage.number(),
            "{}",
            stage.description()
        );
        self.events.emit_lossy(CodaEvent::CalibrationStageChanged {
            run_id: run.run_id,
            stage: stage.number(),
            description: stage.description().to_string(),
            timestamp: coda_common::time::now(),
        });
    }

    /// Run every stage; the run's status is left to the caller
    pub fn run(&self, run: &mut CalibrationRun) -> CalibrationResult<CalibrationOutcome> {
        let repos = &self.repositories;
        let services = &self.services;

        // 1
        self.enter(run, CalibrationStage::Loading);
        let mut params = repos.shared_parameters_by_band()?;
        let stacks = repos.stacks.get_all_stacks()?;
        debug!(run_id = run.run_id, bands = params.len(), stacks = stacks.len(), "Inputs loaded");

        // 2
        self.enter(run, CalibrationStage::Velocity);
        let velocities = services.peak_velocity.measure_peak_velocities(&stacks);
        repos.peak_velocities.delete_all()?;
        repos.synthetics.delete_all()?;
        let filtered = filter_by_min_snr(velocities, &params);
        repos.peak_velocities.save(filtered.clone())?;

        // 3
        self.enter(run, CalibrationStage::Shape);
        let shapes = services.shape.measure_shapes(filtered, &params, run.auto_picking)?;
        params = shapes.parameters;
        replace_all(repos.shared_parameters.as_ref(), params.values().cloned().collect())?;
        replace_all(repos.shape_measurements.as_ref(), shapes.measurements)?;
        let stacks = if run.auto_picking {
            let picked: Vec<Arc<Waveform>> = shapes
                .velocities
                .iter()
                .filter(|m| m.waveform.is_auto_picked())
                .map(|m| Arc::clone(&m.waveform))
                .collect();
            repos.stacks.update_stacks(&picked)?;
            repos.stacks.get_all_stacks()?
        } else {
            stacks
        };

        // 4
        self.enter(run, CalibrationStage::Synthetics);
        let stacks = end_picked(stacks);
        let synthetics = services.synthetics.generate_synthetics(&stacks, &params);
        let spectra = services.spectra.measure_amplitudes(&synthetics, &params, None);

        // 5
        self.enter(run, CalibrationStage::Path);
        let path = services.path.measure_path_corrections(&spectra, &params)?;
        params = path.parameters;
        replace_all(repos.shared_parameters.as_ref(), params.values().cloned().collect())?;
        for diagnostic in &path.diagnostics {
            self.events.emit_lossy(CodaEvent::PathBandFitted {
                run_id: run.run_id,
                summary: BandFitSummary {
                    low_frequency: diagnostic.low_frequency,
                    high_frequency: diagnostic.high_frequency,
                    initial_residual: diagnostic.initial_residual,
                    final_residual: diagnostic.final_residual,
                    converged: diagnostic.converged,
                },
                timestamp: coda_common::time::now(),
            });
        }
        let path_diagnostics = replace_all(repos.path_diagnostics.as_ref(), path.diagnostics)?;

        // 6
        self.enter(run, CalibrationStage::PathSpectra);
        let synthetics = services.synthetics.generate_synthetics(&stacks, &params);
        let spectra = services.spectra.measure_amplitudes(&synthetics, &params, None);

        // 7
        self.enter(run, CalibrationStage::Site);
        let fi = repos.find_mdac_fi()?.ok_or_else(|| {
            CalibrationError::InvalidInput("no MDAC frequency-independent parameters".to_string())
        })?;
        let ps = repos.find_mdac_ps(&services.phase)?.ok_or_else(|| {
            CalibrationError::InvalidInput(format!("no MDAC parameters for phase {}", services.phase))
        })?;
        let mw_calculator = Arc::new(SpectralMwFitter::new(
            Arc::clone(&services.source_model),
            fi.clone(),
            repos.mdac_ps.find_all()?,
            services.mw_fit.clone(),
        ));
        let engine = SiteCorrectionEngine::new(
            Arc::clone(&services.source_model),
            mw_calculator,
            services.phase.clone(),
        );
        let references = repos.reference_mws.find_all()?;
        let site = engine.measure_site_corrections(&spectra, &references, &fi, &ps)?;
        let site_terms = site.site_term_map();
        let site_parameters = replace_all(repos.site_parameters.as_ref(), site.site_parameters)?;
        let measured_mws = replace_all(repos.measured_mws.as_ref(), site.measured_mws)?;

        // 8
        self.enter(run, CalibrationStage::FinalSpectra);
        let synthetics = services.synthetics.generate_synthetics(&stacks, &params);
        let synthetics = replace_all(repos.synthetics.as_ref(), synthetics)?;
        let spectra = services
            .spectra
            .measure_amplitudes(&synthetics, &params, Some(&site_terms));
        let spectra = replace_all(repos.spectra.as_ref(), spectra)?;

        // 9
        self.enter(run, CalibrationStage::Done);
        info!(
            run_id = run.run_id,
            bands = params.len(),
            site_terms = site_parameters.len(),
            magnitudes = measured_mws.len(),
            spectra = spectra.len(),
            "Calibration complete"
        );

        Ok(CalibrationOutcome {
            parameters: params,
            site_parameters,
            measured_mws,
            path_diagnostics,
            spectra_count: spectra.len(),
        })
    }
}

/// Stacks with an F pick at a positive time after origin
pub fn end_picked(stacks: Vec<Arc<Waveform>>) -> Vec<Arc<Waveform>> {
    stacks
        .into_iter()
        .filter(|w| {
            w.end_pick()
                .map(|p| p.pick_time_sec_from_origin > 0.0)
                .unwrap_or(false)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PickType, WaveformPick};
    use crate::repository::Repository;
    use crate::services::mdac::tests::fi;
    use chrono::{TimeZone, Utc};

    fn stack(id: u64, picks: Vec<WaveformPick>) -> Arc<Waveform> {
        let t = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        Arc::new(Waveform {
            id,
            event: None,
            stream: None,
            begin_time: t,
            end_time: t,
            sample_rate: 1.0,
            segment: vec![0.0],
            low_frequency: 1.0,
            high_frequency: 2.0,
            associated_picks: picks,
        })
    }

    #[test]
    fn test_end_picked_requires_positive_f_pick() {
        let stacks = vec![
            stack(1, vec![WaveformPick::new(PickType::F, 120.0)]),
            stack(2, vec![WaveformPick::new(PickType::F, 0.0)]),
            stack(3, vec![WaveformPick::new(PickType::Other, 50.0)]),
            stack(4, vec![]),
        ];
        let kept: Vec<u64> = end_picked(stacks).iter().map(|w| w.id).collect();
        assert_eq!(kept, vec![1]);
    }

    #[test]
    fn test_missing_mdac_phase_fails_run() {
        let repos = CalibrationRepositories::in_memory();
        repos
            .shared_parameters
            .save(vec![SharedFrequencyBandParameters::for_band(FrequencyBand::new(1.0, 2.0))])
            .unwrap();
        repos.mdac_fi.save(vec![fi()]).unwrap();

        let events = EventBus::new(64);
        let mut rx = events.subscribe();
        let config = CalibrationConfig::default();
        let pipeline = CalibrationPipeline::new(repos, CalibrationServices::from_config(&config), events);

        let mut run = CalibrationRun::new(7, false);
        let result = pipeline.run(&mut run);
        assert!(matches!(result, Err(CalibrationError::InvalidInput(_))));
        assert_eq!(run.stage, Some(CalibrationStage::Site));

        let mut stages = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let CodaEvent::CalibrationStageChanged { stage, run_id, .. } = event {
                assert_eq!(run_id, 7);
                stages.push(stage);
            }
        }
        assert_eq!(stages, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_empty_dataset_completes() {
        let repos = CalibrationRepositories::in_memory();
        repos
            .shared_parameters
            .save(vec![SharedFrequencyBandParameters::for_band(FrequencyBand::new(1.0, 2.0))])
            .unwrap();
        repos.mdac_fi.save(vec![fi()]).unwrap();
        repos
            .mdac_ps
            .save(vec![crate::services::mdac::tests::lg()])
            .unwrap();

        let config = CalibrationConfig::default();
        let pipeline = CalibrationPipeline::new(
            repos.clone(),
            CalibrationServices::from_config(&config),
            EventBus::new(64),
        );
        let mut run = CalibrationRun::new(1, true);
        let outcome = pipeline.run(&mut run).unwrap();

        assert_eq!(run.stage, Some(CalibrationStage::Done));
        assert_eq!(outcome.parameters.len(), 1);
        assert!(outcome.measured_mws.is_empty());
        assert!(outcome.path_diagnostics.is_empty());
        assert_eq!(repos.shared_parameters.find_all().unwrap().len(), 1);
    }
}
