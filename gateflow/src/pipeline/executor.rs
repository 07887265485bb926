//! Fail-fast executor for one run of a pipeline graph.

use super::PipelineGraph;
use crate::cancellation::CancellationToken;
use crate::context::RunContext;
use crate::core::{RunRecord, RunStatus, StageResult};
use crate::errors::GateflowError;
use crate::events::{
    EventSink, NoOpEventSink, NODE_FAILED, NODE_STARTED, NODE_SUCCEEDED, RUN_CANCELLED,
    RUN_COMPLETED, RUN_FAILED, RUN_STARTED,
};
use crate::scheduler::RunScheduler;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Where an executor is in its walk over the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorState {
    /// No node has been evaluated yet.
    NotStarted,
    /// The named node is being evaluated.
    Running {
        /// Current node.
        node: String,
    },
    /// The terminal node succeeded.
    Completed,
    /// A node failed or the run was cancelled.
    Failed {
        /// Node the run halted at.
        node: String,
        /// Diagnostic reason.
        reason: String,
    },
}

impl ExecutorState {
    /// Derives the state a record reflects.
    #[must_use]
    pub fn from_record(record: &RunRecord) -> Self {
        match record.status() {
            RunStatus::Completed => Self::Completed,
            RunStatus::Failed => Self::Failed {
                node: record.failed_node().unwrap_or_default().to_string(),
                reason: record.failure_reason().unwrap_or_default().to_string(),
            },
            RunStatus::Running => record
                .results()
                .last()
                .map_or(Self::NotStarted, |result| Self::Running {
                    node: result.node.clone(),
                }),
        }
    }

    /// Returns true for `Completed` and `Failed`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. })
    }
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Running { node } => write!(f, "running({node})"),
            Self::Completed => write!(f, "completed"),
            Self::Failed { node, reason } => write!(f, "failed({node}: {reason})"),
        }
    }
}

fn failure_reason(result: &StageResult) -> String {
    result
        .message
        .clone()
        .unwrap_or_else(|| format!("node reported {}", result.status))
}

/// Walks a [`PipelineGraph`] strictly in order for one run context.
///
/// Evaluates each node once, appends its result, and halts at the first
/// result that is not a success. Node failures never escape as errors; they
/// end up in the returned [`RunRecord`]. Cancellation is checked between
/// nodes only.
#[derive(Debug, Clone)]
pub struct Executor {
    sink: Arc<dyn EventSink>,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(Arc::new(NoOpEventSink))
    }
}

impl Executor {
    /// Creates an executor emitting lifecycle events to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Executes one run and returns its finalized record.
    pub async fn execute(
        &self,
        graph: &PipelineGraph,
        ctx: RunContext,
        cancel: &CancellationToken,
    ) -> RunRecord {
        let period = ctx.period();
        let run_id = ctx.run_id();
        let mut record = RunRecord::start(period, run_id, Some(ctx.fingerprint()));
        let started = Instant::now();

        info!(pipeline = %graph.name(), %period, %run_id, "Run started");
        self.sink
            .emit(
                RUN_STARTED,
                Some(json!({
                    "pipeline": graph.name(),
                    "period": period.id(),
                    "run_id": run_id.to_string(),
                })),
            )
            .await;

        let mut state = ExecutorState::NotStarted;
        let mut current = Some(graph.source());

        while let Some(node) = current {
            if cancel.is_cancelled() {
                let reason = cancel.reason().unwrap_or_else(|| "cancelled".to_string());
                let result = StageResult::cancelled(node.name(), &reason);
                let message = failure_reason(&result);
                warn!(%period, node = %node.name(), %reason, "Run cancelled");

                record.push(result);
                record.fail(node.name(), message.clone());
                self.sink
                    .emit(
                        RUN_CANCELLED,
                        Some(json!({
                            "period": period.id(),
                            "run_id": run_id.to_string(),
                            "node": node.name(),
                            "reason": message,
                        })),
                    )
                    .await;
                state = ExecutorState::Failed {
                    node: node.name().to_string(),
                    reason: message,
                };
                break;
            }

            state = ExecutorState::Running {
                node: node.name().to_string(),
            };
            debug!(%period, node = %node.name(), kind = %node.kind(), "Executing node");
            self.sink
                .emit(
                    NODE_STARTED,
                    Some(json!({
                        "period": period.id(),
                        "node": node.name(),
                        "kind": node.kind().to_string(),
                    })),
                )
                .await;

            let node_start = Instant::now();
            let result = node.execute(&ctx).await;
            let duration_ms = node_start.elapsed().as_secs_f64() * 1000.0;

            if result.is_success() {
                self.sink
                    .emit(
                        NODE_SUCCEEDED,
                        Some(json!({
                            "period": period.id(),
                            "node": node.name(),
                            "rows_affected": result.rows_affected,
                            "attempts": result.attempts,
                            "duration_ms": duration_ms,
                        })),
                    )
                    .await;
                record.push(result);
                current = graph.successor_of(node.name());
                continue;
            }

            let reason = failure_reason(&result);
            warn!(%period, node = %node.name(), failure_kind = ?result.failure_kind, %reason, "Node failed");
            self.sink
                .emit(
                    NODE_FAILED,
                    Some(json!({
                        "period": period.id(),
                        "node": node.name(),
                        "failure_kind": result.failure_kind.map(|k| k.to_string()),
                        "message": reason,
                        "attempts": result.attempts,
                        "duration_ms": duration_ms,
                    })),
                )
                .await;
            record.push(result);
            record.fail(node.name(), reason.clone());
            self.sink
                .emit(
                    RUN_FAILED,
                    Some(json!({
                        "period": period.id(),
                        "run_id": run_id.to_string(),
                        "node": node.name(),
                        "reason": reason,
                    })),
                )
                .await;
            state = ExecutorState::Failed {
                node: node.name().to_string(),
                reason,
            };
            break;
        }

        if !state.is_terminal() {
            record.complete();
            state = ExecutorState::Completed;
            self.sink
                .emit(
                    RUN_COMPLETED,
                    Some(json!({
                        "period": period.id(),
                        "run_id": run_id.to_string(),
                        "nodes": record.results().len(),
                    })),
                )
                .await;
        }

        info!(
            %period,
            %run_id,
            %state,
            duration_ms = started.elapsed().as_secs_f64() * 1000.0,
            "Run finalized"
        );
        record
    }

    /// Executes a run the scheduler admitted and hands the finalized record
    /// back to it.
    ///
    /// # Errors
    ///
    /// Returns a `GateflowError` if the scheduler rejects the record or the
    /// ledger cannot be persisted.
    pub async fn execute_admitted(
        &self,
        scheduler: &RunScheduler,
        graph: &PipelineGraph,
        ctx: RunContext,
        cancel: &CancellationToken,
    ) -> Result<RunRecord, GateflowError> {
        let record = self.execute(graph, ctx, cancel).await;
        scheduler.on_run_finished(record.clone())?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunContextTemplate;
    use crate::core::{FailureKind, StageStatus};
    use crate::events::CollectingEventSink;
    use crate::testing::{
        assert_results, assert_run_failed_at, assert_run_succeeded, daily_period,
        CancellingRunner, TestPipeline,
    };
    use pretty_assertions::assert_eq;

    fn ctx() -> RunContext {
        RunContextTemplate::new().bind(daily_period(2024, 1, 1))
    }

    #[tokio::test]
    async fn test_all_nodes_succeed() {
        let pipeline = TestPipeline::new().gate("check", "cp").runner("load").runner("end");
        let graph = pipeline.build();

        let record = Executor::default()
            .execute(&graph, ctx(), &CancellationToken::new())
            .await;

        assert_run_succeeded(&record);
        assert_eq!(ExecutorState::from_record(&record), ExecutorState::Completed);
        assert_results(
            &record,
            &[
                ("check", StageStatus::Success),
                ("load", StageStatus::Success),
                ("end", StageStatus::Success),
            ],
        );
        assert_eq!(pipeline.scripted_gate("check").checkpoints(), vec!["cp".to_string()]);
    }

    #[tokio::test]
    async fn test_fail_fast_stops_downstream() {
        let pipeline = TestPipeline::new()
            .gate("source_gate", "cp1")
            .runner("extract")
            .failing_gate("raw_gate", "cp2", &["row_count_min"])
            .runner("transform")
            .runner("end");
        let graph = pipeline.build();

        let record = Executor::default()
            .execute(&graph, ctx(), &CancellationToken::new())
            .await;

        assert_run_failed_at(&record, "raw_gate");
        assert_eq!(record.results().len(), 3);
        assert_eq!(pipeline.scripted_runner("transform").invocations(), 0);
        assert!(record.failure_reason().unwrap().contains("row_count_min"));

        let names = graph.node_names();
        let statuses = record.node_statuses(&names);
        assert_eq!(statuses[3], ("transform", StageStatus::Skipped));
        assert_eq!(statuses[4], ("end", StageStatus::Skipped));
    }

    #[tokio::test]
    async fn test_cancellation_between_nodes() {
        let cancel = CancellationToken::new();
        let pipeline = TestPipeline::new()
            .runner("first")
            .with_stage(Arc::new(CancellingRunner::new("second", cancel.clone(), "operator")))
            .runner("third");
        let graph = pipeline.build();

        let record = Executor::default().execute(&graph, ctx(), &cancel).await;

        assert_run_failed_at(&record, "third");
        assert_eq!(record.failure_reason(), Some("cancelled: operator"));
        assert_eq!(
            record.results().last().and_then(|r| r.failure_kind),
            Some(FailureKind::Cancelled)
        );
        assert_eq!(pipeline.scripted_runner("third").invocations(), 0);
        assert_eq!(record.results().len(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel("shutdown");
        let graph = TestPipeline::new().runner("only").build();

        let record = Executor::default().execute(&graph, ctx(), &cancel).await;
        assert_run_failed_at(&record, "only");
        assert_eq!(record.results().len(), 1);
    }

    #[tokio::test]
    async fn test_event_order() {
        let sink = Arc::new(CollectingEventSink::new());
        let graph = TestPipeline::new()
            .runner("a")
            .failing_gate("b", "cp", &[])
            .build();

        Executor::new(sink.clone())
            .execute(&graph, ctx(), &CancellationToken::new())
            .await;

        assert_eq!(
            sink.event_types(),
            vec![
                RUN_STARTED,
                NODE_STARTED,
                NODE_SUCCEEDED,
                NODE_STARTED,
                NODE_FAILED,
                RUN_FAILED,
            ]
        );
    }

    #[tokio::test]
    async fn test_record_carries_context_fingerprint() {
        let graph = TestPipeline::new().runner("a").build();
        let context = ctx();
        let fingerprint = context.fingerprint();

        let record = Executor::default()
            .execute(&graph, context, &CancellationToken::new())
            .await;
        assert_eq!(record.context_fingerprint(), Some(fingerprint.as_str()));
    }
}
