//! Pipeline building and execution.
//!
//! This module provides:
//! - Nodes and the validating pipeline builder
//! - The immutable, linear pipeline graph
//! - The fail-fast executor
//! - Retry wrappers layered above the executor
//! - The retail pipeline definition

mod builder;
mod executor;
mod graph;
mod integration_tests;
mod node;
pub mod retail;
mod retry;

pub use builder::PipelineBuilder;
pub use executor::{Executor, ExecutorState};
pub use graph::PipelineGraph;
pub use node::{Node, NodeAction};
pub use retail::{retail_context_template, retail_pipeline, RetailCollaborators};
pub use retry::{
    retry_stage, BackoffStrategy, JitterStrategy, RetryConfig, RetryState, RetryingGate,
    RetryingRunner,
};
