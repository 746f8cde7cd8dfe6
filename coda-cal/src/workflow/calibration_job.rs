//! Calibration job controller
//!
//! Owns the single execution slot. `start` claims the slot, posts STARTING
//! and hands the pipeline to a blocking worker; the worker posts exactly one
//! terminal status (COMPLETE or ERROR) for the run id and frees the slot
//! just before doing so. A start while the slot is held posts ERROR for its
//! own run id and returns `false`.

use super::pipeline::{CalibrationOutcome, CalibrationPipeline, CalibrationServices};
use crate::error::{CalibrationError, CalibrationResult};
use crate::models::CalibrationRun;
use crate::repository::CalibrationRepositories;
use coda_common::events::{CalibrationStatus, CodaEvent, EventBus, RunResult};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub type CalibrationHandle = JoinHandle<CalibrationResult<CalibrationOutcome>>;

/// Frees the execution slot when dropped
struct SlotGuard(Arc<AtomicBool>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Starts calibration runs, one at a time
pub struct CalibrationJobController {
    repositories: CalibrationRepositories,
    services: CalibrationServices,
    events: EventBus,
    running: Arc<AtomicBool>,
    next_run_id: AtomicU64,
    active: Mutex<Option<CalibrationHandle>>,
}

impl CalibrationJobController {
    /// Create a controller with a free slot
    ///
    /// # Arguments
    /// * `repositories` - Stores every run reads and replaces
    /// * `services` - Stage collaborators shared by all runs
    /// * `events` - Bus receiving status and stage events
    pub fn new(repositories: CalibrationRepositories, services: CalibrationServices, events: EventBus) -> Self {
        Self {
            repositories,
            services,
            events,
            running: Arc::new(AtomicBool::new(false)),
            next_run_id: AtomicU64::new(1),
            active: Mutex::new(None),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Id the next start attempt will get
    pub fn peek_next_run_id(&self) -> u64 {
        self.next_run_id.load(Ordering::SeqCst)
    }

    /// Take the join handle of the most recently accepted run
    pub fn take_handle(&self) -> Option<CalibrationHandle> {
        self.active.lock().ok().and_then(|mut slot| slot.take())
    }

    fn reject(&self, run_id: u64, cause: &CalibrationError) -> bool {
        warn!(run_id, "Calibration start rejected: {}", cause);
        self.events.emit_lossy(CodaEvent::status(
            run_id,
            CalibrationStatus::Error,
            Some(RunResult::failure(cause.to_string())),
        ));
        false
    }

    /// Start a run in the background
    ///
    /// Returns `false` when a run is already active or there is no tokio
    /// runtime to run on. Every attempt consumes a run id.
    pub fn start(&self, auto_picking: bool) -> bool {
        let run_id = self.next_run_id.fetch_add(1, Ordering::SeqCst);

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return self.reject(run_id, &CalibrationError::RunInProgress);
        }
        let guard = SlotGuard(Arc::clone(&self.running));

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                drop(guard);
                return self.reject(run_id, &CalibrationError::Task(e.to_string()));
            }
        };

        info!(run_id, auto_picking, "Starting calibration");
        self.events
            .emit_lossy(CodaEvent::status(run_id, CalibrationStatus::Starting, None));

        let pipeline = CalibrationPipeline::new(
            self.repositories.clone(),
            self.services.clone(),
            self.events.clone(),
        );
        let events = self.events.clone();

        let handle = runtime.spawn_blocking(move || {
            let mut run = CalibrationRun::new(run_id, auto_picking);
            let result = catch_unwind(AssertUnwindSafe(|| pipeline.run(&mut run)))
                .unwrap_or_else(|_| Err(CalibrationError::Task("calibration worker panicked".to_string())));

            let event = match &result {
                Ok(_) => {
                    run.transition_to(CalibrationStatus::Complete);
                    CodaEvent::status(run_id, CalibrationStatus::Complete, Some(RunResult::success()))
                }
                Err(e) => {
                    error!(run_id, stage = ?run.stage, "Calibration failed: {}", e);
                    run.fail(e.to_string());
                    CodaEvent::status(run_id, CalibrationStatus::Error, Some(RunResult::failure(e.to_string())))
                }
            };
            drop(guard);
            events.emit_lossy(event);
            result
        });

        match self.active.lock() {
            Ok(mut slot) => *slot = Some(handle),
            Err(_) => warn!(run_id, "Run handle slot poisoned; handle dropped"),
        }
        true
    }
}
