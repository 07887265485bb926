//! Core domain model types for gateflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Node status, failure and kind enums
//! - Scheduling periods
//! - Per-node stage results and per-period run records

mod period;
mod record;
mod result;
mod status;

pub use period::Period;
pub use record::RunRecord;
pub use result::StageResult;
pub use status::{FailureKind, NodeKind, RunStatus, RunnerKind, StageStatus};
