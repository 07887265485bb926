//! Quality gates and stage runners.
//!
//! Every node in a pipeline is either a [`QualityGate`] (a read-only
//! validation checkpoint) or a [`StageRunner`] (extract, transform or load
//! work). Both report their outcome as a [`StageResult`]; expected failures
//! never escape as errors.

mod gate;
mod ports;
mod process;
mod runners;

pub use gate::CheckpointGate;
pub use ports::{
    CheckpointOutcome, ScriptExecutor, ScriptOutcome, ScriptRequest, Transform, TransformOutcome,
    ValidationCollaborator,
};
pub use process::{CommandScriptExecutor, CommandSpec, CommandTransform, CommandValidator};
pub use runners::{ScriptRunner, TransformRunner};

#[cfg(test)]
pub(crate) use ports::{MockScriptExecutor, MockTransform, MockValidationCollaborator};

use crate::context::RunContext;
use crate::core::{RunnerKind, StageResult};
use async_trait::async_trait;
use std::fmt::Debug;

/// A validation checkpoint between processing stages.
#[async_trait]
pub trait QualityGate: Send + Sync + Debug {
    /// Returns the name of the gate.
    fn name(&self) -> &str;

    /// Runs the named checkpoint against the artifact of the preceding stage.
    ///
    /// Returns `Failure` with the failed rule names when validation does not
    /// pass, and an infrastructure-tagged `Failure` when the artifact or the
    /// validator is unreachable.
    async fn evaluate(&self, ctx: &RunContext, checkpoint_name: &str) -> StageResult;
}

/// A unit of pipeline work.
///
/// Implementations must be idempotent per period: re-running after a failure
/// overwrites the period-qualified output instead of appending to it.
#[async_trait]
pub trait StageRunner: Send + Sync + Debug {
    /// Returns the name of the runner.
    fn name(&self) -> &str;

    /// Returns the capability this runner provides.
    fn kind(&self) -> RunnerKind;

    /// Location keys this runner reads or writes.
    fn required_locations(&self) -> Vec<String> {
        Vec::new()
    }

    /// Logical connection names this runner uses.
    fn required_connections(&self) -> Vec<String> {
        Vec::new()
    }

    /// Performs the work for the context's period.
    async fn run(&self, ctx: &RunContext) -> StageResult;
}

/// A runner that does nothing; used as the terminal node.
#[derive(Debug, Clone)]
pub struct NoOpRunner {
    name: String,
}

impl NoOpRunner {
    /// Creates a new no-op runner.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl StageRunner for NoOpRunner {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> RunnerKind {
        RunnerKind::NoOp
    }

    async fn run(&self, _ctx: &RunContext) -> StageResult {
        StageResult::success(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunContextTemplate;
    use crate::core::Period;

    #[tokio::test]
    async fn test_noop_runner() {
        let runner = NoOpRunner::new("end_of_data_pipeline");
        assert_eq!(runner.name(), "end_of_data_pipeline");
        assert_eq!(runner.kind(), RunnerKind::NoOp);
        assert!(runner.required_locations().is_empty());

        let ctx = RunContextTemplate::new().bind(Period::on_day(2024, 1, 1, 16).unwrap());
        let result = runner.run(&ctx).await;
        assert!(result.is_success());
        assert_eq!(result.node, "end_of_data_pipeline");
    }
}
