//! Run admission across periods.
//!
//! The scheduler owns the run ledger and enforces three rules:
//! - at most one run is active at a time;
//! - periods are admitted strictly oldest first;
//! - a period is admitted only once the period before it has a record on
//!   which every node succeeded.
//!
//! A failed period blocks everything after it until an operator re-runs it.

mod cadence;
mod history;

pub use cadence::Cadence;
pub use history::{InMemoryHistoryStore, JsonFileHistoryStore, RunHistory, RunHistoryStore};

use crate::core::{Period, RunRecord};
use crate::errors::GateflowError;
use crate::events::{
    EventSink, NoOpEventSink, SCHEDULER_ADMITTED, SCHEDULER_DEFERRED, SCHEDULER_FINALIZED,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Why a period was not admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deferral {
    /// Another run is active.
    Contention {
        /// The period currently running.
        active: Period,
    },
    /// The period is not one of the schedule's instants.
    OffSchedule,
    /// The period already has a successful record.
    AlreadySucceeded,
    /// The latest attempt failed; only an operator re-run may admit it.
    NeedsRerun,
    /// The previous period has no successful record yet.
    PredecessorUnresolved {
        /// The blocking period.
        previous: Period,
    },
}

impl fmt::Display for Deferral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contention { active } => write!(f, "run for {active} is still active"),
            Self::OffSchedule => write!(f, "period is not on the schedule"),
            Self::AlreadySucceeded => write!(f, "period already succeeded"),
            Self::NeedsRerun => write!(f, "latest attempt failed and needs an operator re-run"),
            Self::PredecessorUnresolved { previous } => {
                write!(f, "previous period {previous} has not succeeded")
            }
        }
    }
}

#[derive(Debug, Default)]
struct SchedulerState {
    history: RunHistory,
    active: Option<Period>,
}

/// Decides which period may run next and records finished runs.
///
/// All state sits behind one lock, so admission and finalization are
/// serialized: the ledger has a single writer.
#[derive(Debug)]
pub struct RunScheduler {
    cadence: Cadence,
    store: Arc<dyn RunHistoryStore>,
    sink: Arc<dyn EventSink>,
    state: Mutex<SchedulerState>,
}

impl RunScheduler {
    /// Creates a scheduler, loading the ledger from `store`.
    ///
    /// # Errors
    ///
    /// Returns a `GateflowError` if the stored ledger cannot be read.
    pub fn new(cadence: Cadence, store: Arc<dyn RunHistoryStore>) -> Result<Self, GateflowError> {
        let history = store.load()?;
        Ok(Self {
            cadence,
            store,
            sink: Arc::new(NoOpEventSink),
            state: Mutex::new(SchedulerState {
                history,
                active: None,
            }),
        })
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the cadence.
    #[must_use]
    pub const fn cadence(&self) -> &Cadence {
        &self.cadence
    }

    /// Returns the periods due at `now` that still need a successful run,
    /// oldest first. The active period is excluded.
    #[must_use]
    pub fn tick(&self, now: DateTime<Utc>) -> Vec<Period> {
        let state = self.state.lock();
        let queue: Vec<Period> = self
            .cadence
            .due_until(now)
            .into_iter()
            .filter(|period| state.active != Some(*period) && !state.history.is_resolved(*period))
            .collect();
        debug!(%now, queued = queue.len(), "Scheduler tick");
        queue
    }

    /// Checks whether `period` could be admitted now.
    ///
    /// # Errors
    ///
    /// Returns the [`Deferral`] that prevents admission.
    pub fn check_admission(&self, period: Period) -> Result<(), Deferral> {
        let state = self.state.lock();
        self.admission(&state, period, false)
    }

    /// Checks whether `period` could be admitted for a re-run now.
    ///
    /// # Errors
    ///
    /// Returns the [`Deferral`] that prevents admission.
    pub fn check_rerun(&self, period: Period) -> Result<(), Deferral> {
        let state = self.state.lock();
        self.admission(&state, period, true)
    }

    fn admission(
        &self,
        state: &SchedulerState,
        period: Period,
        rerun: bool,
    ) -> Result<(), Deferral> {
        if let Some(active) = state.active {
            return Err(Deferral::Contention { active });
        }
        if !self.cadence.contains(period) {
            return Err(Deferral::OffSchedule);
        }
        if let Some(latest) = state.history.latest(period) {
            if latest.is_success() {
                return Err(Deferral::AlreadySucceeded);
            }
            if !rerun {
                return Err(Deferral::NeedsRerun);
            }
        }
        if let Some(previous) = self.cadence.previous(period) {
            if !state.history.is_resolved(previous) {
                return Err(Deferral::PredecessorUnresolved { previous });
            }
        }
        Ok(())
    }

    fn try_admit(&self, period: Period, rerun: bool) -> bool {
        let mut state = self.state.lock();
        match self.admission(&state, period, rerun) {
            Ok(()) => {
                state.active = Some(period);
                info!(%period, rerun, "Period admitted");
                self.sink.try_emit(
                    SCHEDULER_ADMITTED,
                    Some(json!({"period": period.id(), "rerun": rerun})),
                );
                true
            }
            Err(deferral) => {
                debug!(%period, reason = %deferral, "Period deferred");
                self.sink.try_emit(
                    SCHEDULER_DEFERRED,
                    Some(json!({"period": period.id(), "reason": deferral.to_string()})),
                );
                false
            }
        }
    }

    /// Admits `period` if no run is active and every earlier period has
    /// succeeded. A `false` return is a deferral, not an error.
    pub fn admit(&self, period: Period) -> bool {
        self.try_admit(period, false)
    }

    /// Admits a period whose latest attempt failed. All other rules still
    /// apply.
    pub fn admit_rerun(&self, period: Period) -> bool {
        self.try_admit(period, true)
    }

    /// Records a finished run and releases the active slot.
    ///
    /// The ledger is persisted before the slot is released. If persisting
    /// fails, the record is dropped from memory and the slot stays held.
    ///
    /// # Errors
    ///
    /// Returns `GateflowError::Scheduler` if the record is not for the active
    /// period or is not finalized, and `GateflowError::Persistence` if the
    /// ledger cannot be saved.
    pub fn on_run_finished(&self, record: RunRecord) -> Result<(), GateflowError> {
        let mut state = self.state.lock();
        let period = record.period();

        match state.active {
            Some(active) if active == period => {}
            Some(active) => {
                return Err(GateflowError::Scheduler(format!(
                    "received record for {period} while {active} is active"
                )));
            }
            None => {
                return Err(GateflowError::Scheduler(format!(
                    "received record for {period} but no run is active"
                )));
            }
        }
        if !record.is_finalized() {
            return Err(GateflowError::Scheduler(format!(
                "record for {period} is still running"
            )));
        }

        let status = record.status();
        let success = record.is_success();
        let run_id = record.run_id();
        state.history.append(record);

        if let Err(err) = self.store.save(&state.history) {
            state.history.pop(period);
            error!(%period, error = %err, "Failed to persist run ledger");
            return Err(err);
        }

        state.active = None;
        info!(%period, %run_id, %status, success, "Run recorded");
        self.sink.try_emit(
            SCHEDULER_FINALIZED,
            Some(json!({
                "period": period.id(),
                "run_id": run_id.to_string(),
                "status": status.to_string(),
                "success": success,
            })),
        );
        Ok(())
    }

    /// Returns a snapshot of the ledger.
    #[must_use]
    pub fn history(&self) -> RunHistory {
        self.state.lock().history.clone()
    }

    /// Returns the latest record for a period.
    #[must_use]
    pub fn record_for(&self, period: Period) -> Option<RunRecord> {
        self.state.lock().history.latest(period).cloned()
    }

    /// Returns the active period, if a run is in progress.
    #[must_use]
    pub fn active(&self) -> Option<Period> {
        self.state.lock().active
    }
}
