//! Event types for the coda event system
//!
//! Provides shared event definitions and the EventBus used as the
//! calibration status channel.

mod calibration_types;

pub use calibration_types::{BandFitSummary, CalibrationStatus, RunResult};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Coda event types
///
/// Events are broadcast via EventBus and can be serialized for transmission
/// to any listener (CLI progress output, a UI bridge).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CodaEvent {
    /// Calibration run status changed
    ///
    /// Exactly one terminal status (COMPLETE or ERROR) is emitted per run id.
    /// Rejected start attempts emit a single ERROR with their own run id.
    CalibrationStatusChanged {
        /// Monotonic run id assigned at start
        run_id: u64,
        /// New status
        status: CalibrationStatus,
        /// Outcome for terminal statuses
        result: Option<RunResult>,
        /// When status changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Calibration pipeline entered a new stage
    CalibrationStageChanged {
        /// Run the stage belongs to
        run_id: u64,
        /// Stage number (1-based)
        stage: u8,
        /// Stage description
        description: String,
        /// When the stage started
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Path correction finished fitting one frequency band
    PathBandFitted {
        /// Run the fit belongs to
        run_id: u64,
        /// Fit diagnostics
        summary: BandFitSummary,
        /// When the fit completed
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl CodaEvent {
    /// Event type name (matches the serde tag)
    pub fn event_type(&self) -> &str {
        match self {
            CodaEvent::CalibrationStatusChanged { .. } => "CalibrationStatusChanged",
            CodaEvent::CalibrationStageChanged { .. } => "CalibrationStageChanged",
            CodaEvent::PathBandFitted { .. } => "PathBandFitted",
        }
    }

    /// Run id this event refers to
    pub fn run_id(&self) -> u64 {
        match self {
            CodaEvent::CalibrationStatusChanged { run_id, .. }
            | CodaEvent::CalibrationStageChanged { run_id, .. }
            | CodaEvent::PathBandFitted { run_id, .. } => *run_id,
        }
    }

    /// Build a status event stamped with the current time
    pub fn status(run_id: u64, status: CalibrationStatus, result: Option<RunResult>) -> Self {
        CodaEvent::CalibrationStatusChanged {
            run_id,
            status,
            result,
            timestamp: chrono::Utc::now(),
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking sends usable from blocking worker threads
/// - Multiple concurrent subscribers
/// - Automatic lagging receiver handling
///
/// # Examples
///
/// ```
/// use coda_common::events::{CalibrationStatus, CodaEvent, EventBus};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
/// event_bus.emit_lossy(CodaEvent::status(1, CalibrationStatus::Starting, None));
/// let event = rx.try_recv().unwrap();
/// assert_eq!(event.run_id(), 1);
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CodaEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<CodaEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: CodaEvent,
    ) -> Result<usize, broadcast::error::SendError<CodaEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: CodaEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
