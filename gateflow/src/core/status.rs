//! Node status, failure and kind enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The outcome of one node execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Node completed successfully.
    Success,
    /// Node failed; downstream nodes will not run.
    Failure,
    /// Node never ran because an upstream node failed.
    Skipped,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns true if the status indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure)
    }
}

/// Diagnostic tag attached to every failed [`StageResult`](super::StageResult).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A quality gate's rules did not pass. Requires data correction.
    Validation,
    /// A collaborator was unreachable. Eligible for retry.
    Infrastructure,
    /// A collaborator ran and reported an error.
    Execution,
    /// The run was cancelled before this node executed.
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Execution => write!(f, "execution"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FailureKind {
    /// Returns true if an external retry policy may re-invoke the node.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Infrastructure)
    }
}

/// The capability a stage runner provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerKind {
    /// Reads from a source connection and lands a file.
    ExtractLoad,
    /// Converts one location into another.
    Transform,
    /// Loads into a destination connection.
    Load,
    /// Does nothing; marks the end of the chain.
    NoOp,
}

impl fmt::Display for RunnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExtractLoad => write!(f, "extract_load"),
            Self::Transform => write!(f, "transform"),
            Self::Load => write!(f, "load"),
            Self::NoOp => write!(f, "noop"),
        }
    }
}

/// The kind of a pipeline node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "runner")]
pub enum NodeKind {
    /// A read-only validation checkpoint.
    QualityGate,
    /// A unit of processing work.
    StageRunner(RunnerKind),
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QualityGate => write!(f, "quality_gate"),
            Self::StageRunner(kind) => write!(f, "runner:{kind}"),
        }
    }
}

/// Overall status of a run for one period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The run is in progress.
    Running,
    /// Every node succeeded and the terminal node was reached.
    Completed,
    /// A node failed or the run was cancelled.
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl RunStatus {
    /// Returns true once the run can no longer change.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        !matches!(self, Self::Running)
    }
}
