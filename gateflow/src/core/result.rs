//! Per-node stage result.

use super::{FailureKind, StageStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one unit of pipeline work.
///
/// Created by the node that ran, appended to the run's log, never mutated
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// The node that produced this result.
    pub node: String,
    /// The outcome.
    pub status: StageStatus,
    /// Diagnostic message (always set for failures).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Failure tag, set only when `status` is `Failure`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    /// Rows reported by an extract/load collaborator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
    /// How many times the node was invoked to produce this result.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// When the result was recorded.
    pub timestamp: DateTime<Utc>,
}

const fn default_attempts() -> u32 {
    1
}

impl StageResult {
    /// Creates a success result.
    #[must_use]
    pub fn success(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            status: StageStatus::Success,
            message: None,
            failure_kind: None,
            rows_affected: None,
            attempts: 1,
            timestamp: Utc::now(),
        }
    }

    /// Creates a failure result with a diagnostic tag.
    #[must_use]
    pub fn failure(node: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            status: StageStatus::Failure,
            message: Some(message.into()),
            failure_kind: Some(kind),
            rows_affected: None,
            attempts: 1,
            timestamp: Utc::now(),
        }
    }

    /// Creates a validation failure listing the rules that did not pass.
    #[must_use]
    pub fn validation_failure(
        node: impl Into<String>,
        checkpoint: &str,
        failed_rules: &[String],
    ) -> Self {
        let message = if failed_rules.is_empty() {
            format!("checkpoint '{checkpoint}' did not pass")
        } else {
            format!(
                "checkpoint '{checkpoint}' failed rules: {}",
                failed_rules.join(", ")
            )
        };
        Self::failure(node, FailureKind::Validation, message)
    }

    /// Creates an infrastructure failure.
    #[must_use]
    pub fn infrastructure_failure(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::failure(node, FailureKind::Infrastructure, message)
    }

    /// Creates a cancellation failure.
    #[must_use]
    pub fn cancelled(node: impl Into<String>, reason: &str) -> Self {
        Self::failure(node, FailureKind::Cancelled, format!("cancelled: {reason}"))
    }

    /// Creates a skipped result for reporting nodes downstream of a failure.
    #[must_use]
    pub fn skipped(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            status: StageStatus::Skipped,
            message: None,
            failure_kind: None,
            rows_affected: None,
            attempts: 0,
            timestamp: Utc::now(),
        }
    }

    /// Sets the message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the reported row count.
    #[must_use]
    pub fn with_rows_affected(mut self, rows: u64) -> Self {
        self.rows_affected = Some(rows);
        self
    }

    /// Sets the attempt count.
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Relabels the result with the node name it is recorded under.
    #[must_use]
    pub fn for_node(mut self, node: &str) -> Self {
        if self.node != node {
            self.node = node.to_string();
        }
        self
    }

    /// Returns true if the node succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns true if the node failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }

    /// Returns true if an external retry policy may re-invoke the node.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.failure_kind.is_some_and(|kind| kind.is_retryable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_failure_lists_rules() {
        let result = StageResult::validation_failure(
            "validate_retail_raw_data",
            "retail_load_checkpoint",
            &["row_count_min".to_string()],
        );

        assert_eq!(result.status, StageStatus::Failure);
        assert_eq!(result.failure_kind, Some(FailureKind::Validation));
        let message = result.message.unwrap();
        assert!(message.contains("row_count_min"));
        assert!(message.contains("retail_load_checkpoint"));
    }

    #[test]
    fn test_validation_failure_without_rules() {
        let result = StageResult::validation_failure("gate", "cp", &[]);
        assert_eq!(result.message.as_deref(), Some("checkpoint 'cp' did not pass"));
    }

    #[test]
    fn test_retryable_only_for_infrastructure() {
        assert!(StageResult::infrastructure_failure("n", "refused").is_retryable());
        assert!(!StageResult::failure("n", FailureKind::Execution, "bad sql").is_retryable());
        assert!(!StageResult::success("n").is_retryable());
    }

    #[test]
    fn test_cancelled_message() {
        let result = StageResult::cancelled("load", "operator abort");
        assert_eq!(result.message.as_deref(), Some("cancelled: operator abort"));
        assert_eq!(result.failure_kind, Some(FailureKind::Cancelled));
    }

    #[test]
    fn test_serialize_defaults_attempts() {
        let json = r#"{"node":"n","status":"success","timestamp":"2024-01-01T16:00:00Z"}"#;
        let result: StageResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.attempts, 1);
        assert!(result.message.is_none());
    }
}
