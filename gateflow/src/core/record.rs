//! Run records: the audit trail of one pipeline execution.

use super::{Period, RunStatus, StageResult, StageStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The audit trail of one pipeline execution for one period.
///
/// Mutable only inside the crate while `Running`; once finalized (completed
/// or failed) it no longer changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    run_id: Uuid,
    period: Period,
    status: RunStatus,
    results: Vec<StageResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failed_node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    context_fingerprint: Option<String>,
    started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    finished_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    pub(crate) fn start(period: Period, run_id: Uuid, context_fingerprint: Option<String>) -> Self {
        Self {
            run_id,
            period,
            status: RunStatus::Running,
            results: Vec::new(),
            failed_node: None,
            failure_reason: None,
            context_fingerprint,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub(crate) fn push(&mut self, result: StageResult) {
        debug_assert!(!self.status.is_finalized(), "record is finalized");
        if !self.status.is_finalized() {
            self.results.push(result);
        }
    }

    pub(crate) fn complete(&mut self) {
        if !self.status.is_finalized() {
            self.status = RunStatus::Completed;
            self.finished_at = Some(Utc::now());
        }
    }

    pub(crate) fn fail(&mut self, node: impl Into<String>, reason: impl Into<String>) {
        if !self.status.is_finalized() {
            self.status = RunStatus::Failed;
            self.failed_node = Some(node.into());
            self.failure_reason = Some(reason.into());
            self.finished_at = Some(Utc::now());
        }
    }

    /// Returns the run ID.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the period this run covers.
    #[must_use]
    pub const fn period(&self) -> Period {
        self.period
    }

    /// Returns the overall status.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    /// Returns the stage results in execution order.
    #[must_use]
    pub fn results(&self) -> &[StageResult] {
        &self.results
    }

    /// Returns the node the run failed at, if any.
    #[must_use]
    pub fn failed_node(&self) -> Option<&str> {
        self.failed_node.as_deref()
    }

    /// Returns the failure reason, if any.
    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Returns the fingerprint of the run context inputs.
    #[must_use]
    pub fn context_fingerprint(&self) -> Option<&str> {
        self.context_fingerprint.as_deref()
    }

    /// Returns when the run started.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns when the run was finalized.
    #[must_use]
    pub const fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Returns true once the record can no longer change.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.status.is_finalized()
    }

    /// Returns true if the run completed and every node reported success.
    ///
    /// This is what later periods wait for before they may be admitted.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
            && !self.results.is_empty()
            && self.results.iter().all(StageResult::is_success)
    }

    /// Returns the result recorded for a node.
    #[must_use]
    pub fn result_for(&self, node: &str) -> Option<&StageResult> {
        self.results.iter().find(|result| result.node == node)
    }

    /// Returns the status of every node in `order`, reporting nodes that
    /// never ran after a failure as `Skipped`.
    #[must_use]
    pub fn node_statuses<'a>(&self, order: &'a [String]) -> Vec<(&'a str, StageStatus)> {
        order
            .iter()
            .map(|node| {
                let status = self
                    .result_for(node)
                    .map_or(StageStatus::Skipped, |result| result.status);
                (node.as_str(), status)
            })
            .collect()
    }
}
