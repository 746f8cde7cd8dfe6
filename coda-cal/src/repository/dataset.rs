//! JSON calibration dataset
//!
//! One document carrying everything a run needs:
//!
//! ```json
//! {
//!   "stacks": [ { "id": 1, "event": {..}, "stream": {..}, "segment": [..], .. } ],
//!   "shared_parameters": [ { "low_frequency": 0.5, "high_frequency": 0.7, .. } ],
//!   "mdac_fi": { "sigma": 0.3, .. },
//!   "mdac_ps": [ { "phase": "Lg", .. } ],
//!   "reference_mws": [ { "event_id": "E1", "ref_mw": 4.0 } ]
//! }
//! ```

use super::memory::{InMemoryRepository, InMemoryWaveformSource};
use super::CalibrationRepositories;
use crate::error::{CalibrationError, CalibrationResult};
use crate::models::{
    FrequencyBand, MdacParametersFi, MdacParametersPs, ReferenceMwParameters, SharedFrequencyBandParameters,
    SiteFrequencyBandParameters, Waveform,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationDataset {
    pub stacks: Vec<Waveform>,
    pub shared_parameters: Vec<SharedFrequencyBandParameters>,
    /// Site terms from an earlier calibration, replaced by the run
    #[serde(default)]
    pub site_parameters: Vec<SiteFrequencyBandParameters>,
    pub mdac_fi: MdacParametersFi,
    #[serde(default)]
    pub mdac_ps: Vec<MdacParametersPs>,
    #[serde(default)]
    pub reference_mws: Vec<ReferenceMwParameters>,
}

impl CalibrationDataset {
    pub fn load(path: &Path) -> CalibrationResult<Self> {
        let mut dataset: CalibrationDataset = coda_common::config::read_json(path)?;
        dataset.validate()?;
        dataset.normalize_bands();
        info!(
            stacks = dataset.stacks.len(),
            bands = dataset.shared_parameters.len(),
            reference_events = dataset.reference_mws.len(),
            "Loaded calibration dataset from {}",
            path.display()
        );
        Ok(dataset)
    }

    /// Reject datasets that cannot produce any calibration
    ///
    /// Every band edge must be finite and positive and the two edges of a
    /// band must differ. Edge order is not checked; see [`Self::normalize_bands`].
    pub fn validate(&self) -> CalibrationResult<()> {
        if self.shared_parameters.is_empty() {
            return Err(CalibrationError::InvalidInput(
                "dataset has no frequency band parameters".to_string(),
            ));
        }
        let edges = self
            .shared_parameters
            .iter()
            .map(|p| (p.low_frequency, p.high_frequency))
            .chain(
                self.site_parameters
                    .iter()
                    .map(|p| (p.low_frequency, p.high_frequency)),
            );
        for (low, high) in edges {
            let usable = low > 0.0 && high > 0.0 && FrequencyBand::try_new(low, high).is_some();
            if !usable {
                return Err(CalibrationError::InvalidInput(format!(
                    "band {}-{} Hz must have two distinct, finite, positive edges",
                    low, high
                )));
            }
        }
        Ok(())
    }

    /// Rewrite every stored band so that `low_frequency < high_frequency`
    pub fn normalize_bands(&mut self) {
        for p in &mut self.shared_parameters {
            let band = p.band();
            p.low_frequency = band.low();
            p.high_frequency = band.high();
        }
        for p in &mut self.site_parameters {
            let band = p.band();
            p.low_frequency = band.low();
            p.high_frequency = band.high();
        }
        for w in &mut self.stacks {
            let band = w.band();
            w.low_frequency = band.low();
            w.high_frequency = band.high();
        }
    }

    /// Move the dataset into fresh in-memory stores
    pub fn into_repositories(mut self) -> CalibrationRepositories {
        self.normalize_bands();
        let mut repos = CalibrationRepositories::in_memory();
        repos.stacks = Arc::new(InMemoryWaveformSource::new(self.stacks));
        repos.shared_parameters = Arc::new(InMemoryRepository::with_items(self.shared_parameters));
        repos.site_parameters = Arc::new(InMemoryRepository::with_items(self.site_parameters));
        repos.mdac_fi = Arc::new(InMemoryRepository::with_items(vec![self.mdac_fi]));
        repos.mdac_ps = Arc::new(InMemoryRepository::with_items(self.mdac_ps));
        repos.reference_mws = Arc::new(InMemoryRepository::with_items(self.reference_mws));
        repos
    }
}
