//! Script and transform runners.

use super::{ScriptExecutor, ScriptRequest, StageRunner, Transform};
use crate::context::RunContext;
use crate::core::{FailureKind, RunnerKind, StageResult};
use crate::errors::CollaboratorError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

fn collaborator_failure(node: &str, err: CollaboratorError) -> StageResult {
    match err {
        CollaboratorError::Unreachable(infra) => {
            StageResult::infrastructure_failure(node, infra.to_string())
        }
        CollaboratorError::Failed(message) => {
            StageResult::failure(node, FailureKind::Execution, message)
        }
    }
}

fn missing(node: &str, what: &str, key: &str) -> StageResult {
    StageResult::failure(
        node,
        FailureKind::Execution,
        format!("run context has no {what} '{key}'"),
    )
}

/// Runs a parameterized script against a named connection.
///
/// Used for both extract-and-load (source connection, lands a file) and load
/// (destination connection) steps.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    name: String,
    kind: RunnerKind,
    script: String,
    connection: String,
    params: BTreeMap<String, String>,
    executor: Arc<dyn ScriptExecutor>,
}

impl ScriptRunner {
    /// Creates an extract-and-load runner.
    #[must_use]
    pub fn extract_load(
        name: impl Into<String>,
        script: impl Into<String>,
        connection: impl Into<String>,
        executor: Arc<dyn ScriptExecutor>,
    ) -> Self {
        Self::with_kind(name, RunnerKind::ExtractLoad, script, connection, executor)
    }

    /// Creates a load runner.
    #[must_use]
    pub fn load(
        name: impl Into<String>,
        script: impl Into<String>,
        connection: impl Into<String>,
        executor: Arc<dyn ScriptExecutor>,
    ) -> Self {
        Self::with_kind(name, RunnerKind::Load, script, connection, executor)
    }

    fn with_kind(
        name: impl Into<String>,
        kind: RunnerKind,
        script: impl Into<String>,
        connection: impl Into<String>,
        executor: Arc<dyn ScriptExecutor>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            script: script.into(),
            connection: connection.into(),
            params: BTreeMap::new(),
            executor,
        }
    }

    /// Passes the run context location `location_key` as script parameter `param`.
    #[must_use]
    pub fn with_param(mut self, param: impl Into<String>, location_key: impl Into<String>) -> Self {
        self.params.insert(param.into(), location_key.into());
        self
    }

    fn request(&self, ctx: &RunContext) -> Result<ScriptRequest, StageResult> {
        let connection = ctx
            .connection(&self.connection)
            .ok_or_else(|| missing(&self.name, "connection", &self.connection))?;

        let mut params = BTreeMap::new();
        for (param, key) in &self.params {
            let value = ctx
                .location(key)
                .ok_or_else(|| missing(&self.name, "location", key))?;
            params.insert(param.clone(), value.to_string());
        }

        Ok(ScriptRequest {
            script: self.script.clone(),
            connection: connection.to_string(),
            params,
        })
    }
}

#[async_trait]
impl StageRunner for ScriptRunner {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> RunnerKind {
        self.kind
    }

    fn required_locations(&self) -> Vec<String> {
        self.params.values().cloned().collect()
    }

    fn required_connections(&self) -> Vec<String> {
        vec![self.connection.clone()]
    }

    async fn run(&self, ctx: &RunContext) -> StageResult {
        let request = match self.request(ctx) {
            Ok(request) => request,
            Err(result) => return result,
        };

        debug!(runner = %self.name, script = %request.script, connection = %request.connection, "Executing script");
        match self.executor.execute(&request).await {
            Ok(outcome) => {
                let result = StageResult::success(&self.name);
                match outcome.rows_affected {
                    Some(rows) => result.with_rows_affected(rows),
                    None => result,
                }
            }
            Err(err) => {
                warn!(runner = %self.name, error = %err, "Script failed");
                collaborator_failure(&self.name, err)
            }
        }
    }
}

/// Converts one run context location into another.
#[derive(Debug, Clone)]
pub struct TransformRunner {
    name: String,
    input: String,
    output: String,
    transform: Arc<dyn Transform>,
}

impl TransformRunner {
    /// Creates a transform runner reading location `input` and writing `output`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        input: impl Into<String>,
        output: impl Into<String>,
        transform: Arc<dyn Transform>,
    ) -> Self {
        Self {
            name: name.into(),
            input: input.into(),
            output: output.into(),
            transform,
        }
    }
}

#[async_trait]
impl StageRunner for TransformRunner {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> RunnerKind {
        RunnerKind::Transform
    }

    fn required_locations(&self) -> Vec<String> {
        vec![self.input.clone(), self.output.clone()]
    }

    async fn run(&self, ctx: &RunContext) -> StageResult {
        let Some(input) = ctx.location(&self.input) else {
            return missing(&self.name, "location", &self.input);
        };
        let Some(output) = ctx.location(&self.output) else {
            return missing(&self.name, "location", &self.output);
        };

        debug!(runner = %self.name, %input, %output, "Applying transform");
        match self.transform.apply(input, output).await {
            Ok(outcome) => {
                let result = StageResult::success(&self.name);
                match outcome.rows_written {
                    Some(rows) => result.with_rows_affected(rows),
                    None => result,
                }
            }
            Err(err) => {
                warn!(runner = %self.name, error = %err, "Transform failed");
                collaborator_failure(&self.name, err)
            }
        }
    }
}
