//! Checkpoint-backed quality gate.

use super::{QualityGate, ValidationCollaborator};
use crate::context::RunContext;
use crate::core::StageResult;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// A quality gate that delegates to a validation collaborator.
#[derive(Debug, Clone)]
pub struct CheckpointGate {
    name: String,
    validator: Arc<dyn ValidationCollaborator>,
}

impl CheckpointGate {
    /// Creates a new checkpoint gate.
    #[must_use]
    pub fn new(name: impl Into<String>, validator: Arc<dyn ValidationCollaborator>) -> Self {
        Self {
            name: name.into(),
            validator,
        }
    }
}

#[async_trait]
impl QualityGate for CheckpointGate {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, ctx: &RunContext, checkpoint_name: &str) -> StageResult {
        match self
            .validator
            .run_checkpoint(checkpoint_name, ctx.data_context_root())
            .await
        {
            Ok(outcome) if outcome.pass => {
                debug!(gate = %self.name, checkpoint = %checkpoint_name, period = %ctx.period(), "Checkpoint passed");
                StageResult::success(&self.name)
                    .with_message(format!("checkpoint '{checkpoint_name}' passed"))
            }
            Ok(outcome) => {
                warn!(
                    gate = %self.name,
                    checkpoint = %checkpoint_name,
                    period = %ctx.period(),
                    failed_rules = ?outcome.failed_rules,
                    "Checkpoint failed"
                );
                StageResult::validation_failure(&self.name, checkpoint_name, &outcome.failed_rules)
            }
            Err(err) => {
                warn!(gate = %self.name, checkpoint = %checkpoint_name, error = %err, "Validator unreachable");
                StageResult::infrastructure_failure(&self.name, err.to_string())
            }
        }
    }
}
