//! Lifecycle events for runs and the scheduler.
//!
//! Sinks are passed explicitly to the executor and scheduler; there is no
//! process-wide sink. A sink is also the hook for operator alerting on failed
//! runs.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// A run was handed to the executor.
pub const RUN_STARTED: &str = "run.started";
/// Every node succeeded.
pub const RUN_COMPLETED: &str = "run.completed";
/// A node failed and the run halted.
pub const RUN_FAILED: &str = "run.failed";
/// The run was cancelled between nodes.
pub const RUN_CANCELLED: &str = "run.cancelled";
/// A node is about to execute.
pub const NODE_STARTED: &str = "node.started";
/// A node reported success.
pub const NODE_SUCCEEDED: &str = "node.succeeded";
/// A node reported failure.
pub const NODE_FAILED: &str = "node.failed";
/// A period was admitted.
pub const SCHEDULER_ADMITTED: &str = "scheduler.admitted";
/// A period was not admitted.
pub const SCHEDULER_DEFERRED: &str = "scheduler.deferred";
/// A finished run record was stored in the ledger.
pub const SCHEDULER_FINALIZED: &str = "scheduler.finalized";
