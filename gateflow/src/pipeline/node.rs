//! Pipeline nodes.

use crate::context::RunContext;
use crate::core::{NodeKind, StageResult};
use crate::stages::{QualityGate, StageRunner};
use std::sync::Arc;

/// What a node does when it executes.
#[derive(Debug, Clone)]
pub enum NodeAction {
    /// Evaluate a named checkpoint.
    Gate {
        /// The gate implementation.
        gate: Arc<dyn QualityGate>,
        /// Checkpoint passed to the gate.
        checkpoint: String,
    },
    /// Run a unit of work.
    Runner(Arc<dyn StageRunner>),
}

impl NodeAction {
    /// Returns the kind of node this action makes.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Gate { .. } => NodeKind::QualityGate,
            Self::Runner(runner) => NodeKind::StageRunner(runner.kind()),
        }
    }
}

/// A named unit in the pipeline with at most one declared predecessor.
#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    predecessor: Option<String>,
    action: NodeAction,
}

impl Node {
    /// Creates a gate node.
    #[must_use]
    pub fn gate(
        name: impl Into<String>,
        gate: Arc<dyn QualityGate>,
        checkpoint: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            predecessor: None,
            action: NodeAction::Gate {
                gate,
                checkpoint: checkpoint.into(),
            },
        }
    }

    /// Creates a runner node named after its runner.
    #[must_use]
    pub fn runner(runner: Arc<dyn StageRunner>) -> Self {
        Self {
            name: runner.name().to_string(),
            predecessor: None,
            action: NodeAction::Runner(runner),
        }
    }

    /// Declares the node's predecessor.
    #[must_use]
    pub fn after(mut self, predecessor: impl Into<String>) -> Self {
        self.predecessor = Some(predecessor.into());
        self
    }

    /// Returns the node name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared predecessor, if any.
    #[must_use]
    pub fn predecessor(&self) -> Option<&str> {
        self.predecessor.as_deref()
    }

    /// Returns the node's action.
    #[must_use]
    pub const fn action(&self) -> &NodeAction {
        &self.action
    }

    /// Returns the node kind.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.action.kind()
    }

    pub(crate) fn set_predecessor(&mut self, predecessor: Option<String>) {
        self.predecessor = predecessor;
    }

    /// Executes the node and labels the result with the node's name.
    pub async fn execute(&self, ctx: &RunContext) -> StageResult {
        let result = match &self.action {
            NodeAction::Gate { gate, checkpoint } => gate.evaluate(ctx, checkpoint).await,
            NodeAction::Runner(runner) => runner.run(ctx).await,
        };
        result.for_node(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunContextTemplate;
    use crate::core::{Period, RunnerKind};
    use crate::stages::NoOpRunner;

    #[tokio::test]
    async fn test_runner_node_takes_runner_name() {
        let node = Node::runner(Arc::new(NoOpRunner::new("end"))).after("validate");
        assert_eq!(node.name(), "end");
        assert_eq!(node.predecessor(), Some("validate"));
        assert_eq!(node.kind(), NodeKind::StageRunner(RunnerKind::NoOp));

        let ctx = RunContextTemplate::new().bind(Period::on_day(2024, 1, 1, 16).unwrap());
        assert!(node.execute(&ctx).await.is_success());
    }
}
