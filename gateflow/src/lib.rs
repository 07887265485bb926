//! # Gateflow
//!
//! Scheduled, quality-gated, linear data pipeline orchestration.
//!
//! A pipeline is a chain of nodes. Each node is either a quality gate that
//! runs a validation checkpoint or a stage runner that extracts, transforms
//! or loads data. Gateflow provides:
//!
//! - **Validated graphs**: the builder rejects cycles, branches, missing
//!   predecessors and duplicate names before anything runs
//! - **Fail-fast execution**: a run halts at the first node that does not
//!   succeed and records exactly why
//! - **Ordered scheduling**: periods run oldest first, one at a time, and a
//!   failed period blocks later ones until it is re-run
//! - **A durable ledger**: every finished run is persisted before the next
//!   period is admitted
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gateflow::prelude::*;
//!
//! let graph = PipelineBuilder::new("daily")
//!     .then_gate("validate_source", source_gate, "source_checkpoint")
//!     .then_runner(extract)
//!     .then_runner(Arc::new(NoOpRunner::new("end")))
//!     .build()?;
//!
//! let record = Executor::default()
//!     .execute(&graph, template.bind(period), &CancellationToken::new())
//!     .await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod orchestrator;
pub mod pipeline;
pub mod scheduler;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{CommandsConfig, OrchestratorConfig};
    pub use crate::context::{RunContext, RunContextTemplate};
    pub use crate::core::{
        FailureKind, NodeKind, Period, RunRecord, RunStatus, RunnerKind, StageResult, StageStatus,
    };
    pub use crate::errors::{
        ConfigurationError, ContractErrorInfo, CycleDetectedError, GateflowError,
        InfrastructureError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::orchestrator::{Orchestrator, PeriodSummary};
    pub use crate::pipeline::{
        Executor, ExecutorState, Node, PipelineBuilder, PipelineGraph, RetryConfig,
    };
    pub use crate::scheduler::{
        Cadence, Deferral, InMemoryHistoryStore, JsonFileHistoryStore, RunHistory,
        RunHistoryStore, RunScheduler,
    };
    pub use crate::stages::{NoOpRunner, QualityGate, StageRunner};
}
