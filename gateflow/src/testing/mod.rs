//! Testing utilities for gateflow pipelines.
//!
//! This module provides:
//! - Scripted gates and runners
//! - Assertions for run records
//! - Small pipeline fixtures

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_last_failure_kind, assert_reason_contains, assert_results, assert_run_failed_at,
    assert_run_succeeded,
};
pub use fixtures::{daily_period, linear_pipeline, TestPipeline};
pub use mocks::{
    CancellingRunner, RecordedExecution, RecordingRunner, ScriptedGate, ScriptedRunner,
};
