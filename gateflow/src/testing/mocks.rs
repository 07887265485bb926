//! Scripted gates and runners for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

use crate::cancellation::CancellationToken;
use crate::context::RunContext;
use crate::core::{Period, RunnerKind, StageResult};
use crate::stages::{QualityGate, StageRunner};

/// A runner that returns queued results, then succeeds.
#[derive(Debug)]
pub struct ScriptedRunner {
    name: String,
    kind: RunnerKind,
    results: Mutex<VecDeque<StageResult>>,
    invocations: Mutex<usize>,
}

impl ScriptedRunner {
    /// Creates a runner that always succeeds.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: RunnerKind::Transform,
            results: Mutex::new(VecDeque::new()),
            invocations: Mutex::new(0),
        }
    }

    /// Creates a runner whose first invocation fails with `message`.
    #[must_use]
    pub fn failing(name: impl Into<String>, message: impl Into<String>) -> Self {
        let name = name.into();
        let result = StageResult::failure(&name, crate::core::FailureKind::Execution, message);
        Self::new(name).then_results([result])
    }

    /// Sets the runner kind.
    #[must_use]
    pub fn with_kind(mut self, kind: RunnerKind) -> Self {
        self.kind = kind;
        self
    }

    /// Queues results returned by successive invocations.
    #[must_use]
    pub fn then_results(self, results: impl IntoIterator<Item = StageResult>) -> Self {
        self.results.lock().extend(results);
        self
    }

    /// Queues one more result.
    pub fn push_result(&self, result: StageResult) {
        self.results.lock().push_back(result);
    }

    /// Returns how many times the runner was invoked.
    #[must_use]
    pub fn invocations(&self) -> usize {
        *self.invocations.lock()
    }
}

#[async_trait]
impl StageRunner for ScriptedRunner {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> RunnerKind {
        self.kind
    }

    async fn run(&self, _ctx: &RunContext) -> StageResult {
        *self.invocations.lock() += 1;
        self.results
            .lock()
            .pop_front()
            .unwrap_or_else(|| StageResult::success(&self.name))
    }
}

/// A gate that returns queued results, then repeats its default outcome.
#[derive(Debug)]
pub struct ScriptedGate {
    name: String,
    failed_rules: Mutex<Option<Vec<String>>>,
    results: Mutex<VecDeque<StageResult>>,
    checkpoints: Mutex<Vec<String>>,
}

impl ScriptedGate {
    /// Creates a gate that always passes.
    #[must_use]
    pub fn passing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failed_rules: Mutex::new(None),
            results: Mutex::new(VecDeque::new()),
            checkpoints: Mutex::new(Vec::new()),
        }
    }

    /// Creates a gate that always fails with the given rule names.
    #[must_use]
    pub fn failing<I, S>(name: impl Into<String>, rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let gate = Self::passing(name);
        *gate.failed_rules.lock() = Some(rules.into_iter().map(Into::into).collect());
        gate
    }

    /// Queues results returned before the default outcome.
    #[must_use]
    pub fn then_results(self, results: impl IntoIterator<Item = StageResult>) -> Self {
        self.results.lock().extend(results);
        self
    }

    /// Switches the default outcome to passing and drops queued results.
    pub fn heal(&self) {
        self.results.lock().clear();
        *self.failed_rules.lock() = None;
    }

    /// Returns the checkpoints evaluated, in order.
    #[must_use]
    pub fn checkpoints(&self) -> Vec<String> {
        self.checkpoints.lock().clone()
    }

    /// Returns how many times the gate was evaluated.
    #[must_use]
    pub fn invocations(&self) -> usize {
        self.checkpoints.lock().len()
    }
}

#[async_trait]
impl QualityGate for ScriptedGate {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, _ctx: &RunContext, checkpoint_name: &str) -> StageResult {
        self.checkpoints.lock().push(checkpoint_name.to_string());
        if let Some(result) = self.results.lock().pop_front() {
            return result;
        }
        match self.failed_rules.lock().as_deref() {
            Some(rules) => StageResult::validation_failure(&self.name, checkpoint_name, rules),
            None => StageResult::success(&self.name),
        }
    }
}

/// A runner that records the period and run ID of every invocation.
#[derive(Debug)]
pub struct RecordingRunner {
    name: String,
    delay: Option<Duration>,
    executions: Mutex<Vec<RecordedExecution>>,
}

/// A recorded execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedExecution {
    /// Period the run covered.
    pub period: Period,
    /// Fingerprint of the run context.
    pub fingerprint: String,
}

impl RecordingRunner {
    /// Creates a new recording runner.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delay: None,
            executions: Mutex::new(Vec::new()),
        }
    }

    /// Sleeps for `delay` before succeeding.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns all recorded executions.
    #[must_use]
    pub fn executions(&self) -> Vec<RecordedExecution> {
        self.executions.lock().clone()
    }

    /// Returns the periods executed, in order.
    #[must_use]
    pub fn periods(&self) -> Vec<Period> {
        self.executions.lock().iter().map(|e| e.period).collect()
    }
}

#[async_trait]
impl StageRunner for RecordingRunner {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> RunnerKind {
        RunnerKind::Load
    }

    async fn run(&self, ctx: &RunContext) -> StageResult {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.executions.lock().push(RecordedExecution {
            period: ctx.period(),
            fingerprint: ctx.fingerprint(),
        });
        StageResult::success(&self.name)
    }
}

/// A runner that cancels a token while it runs, then succeeds.
#[derive(Debug)]
pub struct CancellingRunner {
    name: String,
    token: CancellationToken,
    reason: String,
}

impl CancellingRunner {
    /// Creates a runner that cancels `token` with `reason`.
    #[must_use]
    pub fn new(name: impl Into<String>, token: CancellationToken, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            token,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl StageRunner for CancellingRunner {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> RunnerKind {
        RunnerKind::NoOp
    }

    async fn run(&self, _ctx: &RunContext) -> StageResult {
        self.token.cancel(self.reason.clone());
        StageResult::success(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunContextTemplate;
    use crate::core::FailureKind;

    fn ctx() -> RunContext {
        RunContextTemplate::new().bind(Period::on_day(2024, 1, 1, 16).unwrap())
    }

    #[tokio::test]
    async fn test_scripted_runner_drains_queue() {
        let runner = ScriptedRunner::failing("load", "syntax error");
        let first = runner.run(&ctx()).await;
        assert_eq!(first.failure_kind, Some(FailureKind::Execution));
        assert!(runner.run(&ctx()).await.is_success());
        assert_eq!(runner.invocations(), 2);
    }

    #[tokio::test]
    async fn test_scripted_gate_records_checkpoints() {
        let gate = ScriptedGate::failing("validate", ["row_count_min"]);
        let result = gate.evaluate(&ctx(), "retail_load_checkpoint").await;
        assert!(result.message.unwrap().contains("row_count_min"));

        gate.heal();
        assert!(gate.evaluate(&ctx(), "retail_load_checkpoint").await.is_success());
        assert_eq!(gate.checkpoints().len(), 2);
    }

    #[tokio::test]
    async fn test_recording_runner() {
        let runner = RecordingRunner::new("record");
        runner.run(&ctx()).await;
        runner.run(&ctx()).await;

        let executions = runner.executions();
        assert_eq!(executions.len(), 2);
        assert_eq!(executions[0].fingerprint, executions[1].fingerprint);
    }
}
