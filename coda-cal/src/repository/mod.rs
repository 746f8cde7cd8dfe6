//! Storage seams for calibration inputs and outputs
//!
//! The pipeline reads stacks through [`WaveformSource`] and every other
//! record type through a [`Repository`]. [`CalibrationRepositories`] bundles
//! one repository per record type and adds the keyed lookups the pipeline
//! needs. In-memory implementations live in [`memory`]; [`dataset`] loads a
//! JSON dataset into them.

pub mod dataset;
pub mod memory;

use crate::error::CalibrationResult;
use crate::models::{
    FrequencyBand, MdacParametersFi, MdacParametersPs, MeasuredMwParameters,
    PathCalibrationMeasurement, PeakVelocityMeasurement, ReferenceMwParameters, ShapeMeasurement,
    SharedFrequencyBandParameters, SiteFrequencyBandParameters, SpectraMeasurement, SyntheticCoda,
    Waveform,
};
use std::collections::BTreeMap;
use std::sync::Arc;

pub use dataset::CalibrationDataset;
pub use memory::{InMemoryRepository, InMemoryWaveformSource};

/// Source of stacked coda envelopes
pub trait WaveformSource: Send + Sync {
    fn get_all_stacks(&self) -> CalibrationResult<Vec<Arc<Waveform>>>;

    /// Replace stored stacks that share an id with one of `stacks`
    ///
    /// Used to persist automatic picks.
    fn update_stacks(&self, stacks: &[Arc<Waveform>]) -> CalibrationResult<()>;
}

/// Record store for one type
pub trait Repository<T>: Send + Sync {
    fn find_all(&self) -> CalibrationResult<Vec<T>>;

    /// Append records, returning what was stored
    fn save(&self, items: Vec<T>) -> CalibrationResult<Vec<T>>;

    fn delete_all(&self) -> CalibrationResult<()>;
}

/// Delete everything in `repository`, then save `items`
///
/// Not atomic; callers rely on the single-run guarantee.
pub fn replace_all<T>(repository: &dyn Repository<T>, items: Vec<T>) -> CalibrationResult<Vec<T>> {
    repository.delete_all()?;
    repository.save(items)
}

/// Every store the calibration pipeline reads or writes
#[derive(Clone)]
pub struct CalibrationRepositories {
    pub stacks: Arc<dyn WaveformSource>,
    pub shared_parameters: Arc<dyn Repository<SharedFrequencyBandParameters>>,
    pub site_parameters: Arc<dyn Repository<SiteFrequencyBandParameters>>,
    pub mdac_fi: Arc<dyn Repository<MdacParametersFi>>,
    pub mdac_ps: Arc<dyn Repository<MdacParametersPs>>,
    pub reference_mws: Arc<dyn Repository<ReferenceMwParameters>>,
    pub measured_mws: Arc<dyn Repository<MeasuredMwParameters>>,
    pub peak_velocities: Arc<dyn Repository<PeakVelocityMeasurement>>,
    pub shape_measurements: Arc<dyn Repository<ShapeMeasurement>>,
    pub synthetics: Arc<dyn Repository<SyntheticCoda>>,
    pub spectra: Arc<dyn Repository<SpectraMeasurement>>,
    pub path_diagnostics: Arc<dyn Repository<PathCalibrationMeasurement>>,
}

impl CalibrationRepositories {
    /// Empty in-memory stores
    pub fn in_memory() -> Self {
        Self {
            stacks: Arc::new(InMemoryWaveformSource::default()),
            shared_parameters: Arc::new(InMemoryRepository::default()),
            site_parameters: Arc::new(InMemoryRepository::default()),
            mdac_fi: Arc::new(InMemoryRepository::default()),
            mdac_ps: Arc::new(InMemoryRepository::default()),
            reference_mws: Arc::new(InMemoryRepository::default()),
            measured_mws: Arc::new(InMemoryRepository::default()),
            peak_velocities: Arc::new(InMemoryRepository::default()),
            shape_measurements: Arc::new(InMemoryRepository::default()),
            synthetics: Arc::new(InMemoryRepository::default()),
            spectra: Arc::new(InMemoryRepository::default()),
            path_diagnostics: Arc::new(InMemoryRepository::default()),
        }
    }

    /// Shared parameters keyed by band
    ///
    /// When a band is stored twice the later record wins.
    pub fn shared_parameters_by_band(
        &self,
    ) -> CalibrationResult<BTreeMap<FrequencyBand, SharedFrequencyBandParameters>> {
        Ok(self
            .shared_parameters
            .find_all()?
            .into_iter()
            .map(|p| (p.band(), p))
            .collect())
    }

    pub fn find_shared_parameters(
        &self,
        band: FrequencyBand,
    ) -> CalibrationResult<Option<SharedFrequencyBandParameters>> {
        Ok(self
            .shared_parameters
            .find_all()?
            .into_iter()
            .rev()
            .find(|p| p.band() == band))
    }

    pub fn find_site_parameters(
        &self,
        station_name: &str,
        band: FrequencyBand,
    ) -> CalibrationResult<Option<SiteFrequencyBandParameters>> {
        Ok(self
            .site_parameters
            .find_all()?
            .into_iter()
            .find(|s| s.station.station_name == station_name && s.band() == band))
    }

    /// First stored frequency-independent MDAC record
    pub fn find_mdac_fi(&self) -> CalibrationResult<Option<MdacParametersFi>> {
        Ok(self.mdac_fi.find_all()?.into_iter().next())
    }

    /// MDAC phase constants, matching the phase name case-insensitively
    pub fn find_mdac_ps(&self, phase: &str) -> CalibrationResult<Option<MdacParametersPs>> {
        Ok(self
            .mdac_ps
            .find_all()?
            .into_iter()
            .find(|p| p.phase.eq_ignore_ascii_case(phase)))
    }

    pub fn find_reference_mw(&self, event_id: &str) -> CalibrationResult<Option<ReferenceMwParameters>> {
        Ok(self
            .reference_mws
            .find_all()?
            .into_iter()
            .find(|r| r.event_id == event_id))
    }
}
