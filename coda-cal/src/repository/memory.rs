//! In-memory stores backed by `RwLock<Vec<_>>`

use super::{Repository, WaveformSource};
use crate::error::{CalibrationError, CalibrationResult};
use crate::models::Waveform;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

fn poisoned<T>(_: PoisonError<T>) -> CalibrationError {
    CalibrationError::Repository("store lock poisoned".to_string())
}

/// Vec-backed repository
#[derive(Debug)]
pub struct InMemoryRepository<T> {
    items: RwLock<Vec<T>>,
}

impl<T> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self {
            items: RwLock::new(Vec::new()),
        }
    }
}

impl<T> InMemoryRepository<T> {
    pub fn with_items(items: Vec<T>) -> Self {
        Self {
            items: RwLock::new(items),
        }
    }

    pub fn len(&self) -> CalibrationResult<usize> {
        Ok(self.items.read().map_err(poisoned)?.len())
    }

    pub fn is_empty(&self) -> CalibrationResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl<T: Clone + Send + Sync> Repository<T> for InMemoryRepository<T> {
    fn find_all(&self) -> CalibrationResult<Vec<T>> {
        Ok(self.items.read().map_err(poisoned)?.clone())
    }

    fn save(&self, items: Vec<T>) -> CalibrationResult<Vec<T>> {
        let mut guard = self.items.write().map_err(poisoned)?;
        guard.extend(items.iter().cloned());
        Ok(items)
    }

    fn delete_all(&self) -> CalibrationResult<()> {
        self.items.write().map_err(poisoned)?.clear();
        Ok(())
    }
}

/// Stack store keyed by waveform id, returned in id order
#[derive(Debug, Default)]
pub struct InMemoryWaveformSource {
    stacks: RwLock<Vec<Arc<Waveform>>>,
}

impl InMemoryWaveformSource {
    pub fn new(stacks: Vec<Waveform>) -> Self {
        let mut stacks: Vec<Arc<Waveform>> = stacks.into_iter().map(Arc::new).collect();
        stacks.sort_by_key(|w| w.id);
        Self {
            stacks: RwLock::new(stacks),
        }
    }
}

impl WaveformSource for InMemoryWaveformSource {
    fn get_all_stacks(&self) -> CalibrationResult<Vec<Arc<Waveform>>> {
        Ok(self.stacks.read().map_err(poisoned)?.clone())
    }

    fn update_stacks(&self, stacks: &[Arc<Waveform>]) -> CalibrationResult<()> {
        let updates: HashMap<u64, &Arc<Waveform>> = stacks.iter().map(|w| (w.id, w)).collect();
        let mut guard = self.stacks.write().map_err(poisoned)?;
        let mut replaced = 0;
        for stored in guard.iter_mut() {
            if let Some(update) = updates.get(&stored.id) {
                *stored = Arc::clone(update);
                replaced += 1;
            }
        }
        debug!(replaced, requested = stacks.len(), "Stacks updated");
        Ok(())
    }
}
