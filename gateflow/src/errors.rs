//! Error types for the gateflow orchestrator.
//!
//! Node-level failures never surface here: gates and runners convert them
//! into [`StageResult`](crate::core::StageResult) values. These types cover
//! graph construction, configuration, collaborator plumbing and the ledger.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for gateflow operations.
#[derive(Debug, Error)]
pub enum GateflowError {
    /// The graph or configuration is malformed.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// A cycle was detected while building the graph.
    #[error("{0}")]
    CycleDetected(#[from] CycleDetectedError),

    /// A collaborator could not be reached.
    #[error("{0}")]
    Infrastructure(#[from] InfrastructureError),

    /// The scheduler was handed a record it does not expect.
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// The run ledger could not be read or written.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata about a configuration error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "GRAPH-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a graph or configuration is malformed.
///
/// Always surfaces at build time, before any run starts.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ConfigurationError {
    /// The error message.
    pub message: String,
    /// The nodes involved in the error.
    pub nodes: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl ConfigurationError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            nodes: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the nodes involved.
    #[must_use]
    pub fn with_nodes(mut self, nodes: Vec<String>) -> Self {
        self.nodes = nodes;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Error raised when a cycle is detected in the pipeline graph.
#[derive(Debug, Clone, Error)]
#[error("Cycle detected in pipeline: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The path of nodes forming the cycle.
    pub cycle_path: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ContractErrorInfo::new(
            "GRAPH-CYCLE",
            format!("Pipeline contains a predecessor cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Point one of the nodes in the cycle at an earlier predecessor.");

        Self {
            cycle_path,
            error_info: info,
        }
    }
}

impl From<CycleDetectedError> for ConfigurationError {
    fn from(err: CycleDetectedError) -> Self {
        Self {
            message: err.to_string(),
            nodes: err.cycle_path.clone(),
            error_info: Some(err.error_info),
        }
    }
}

/// A collaborator was unreachable or its artifact was missing.
///
/// Distinct from a validation failure: these are eligible for retry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Infrastructure error in {collaborator}: {message}")]
pub struct InfrastructureError {
    /// Which collaborator failed (e.g., "validator", "script:postgres_dest").
    pub collaborator: String,
    /// Diagnostic text.
    pub message: String,
}

impl InfrastructureError {
    /// Creates a new infrastructure error.
    #[must_use]
    pub fn new(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }
}

/// Error returned by extract/load and transform collaborators.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    /// The collaborator could not be reached at all.
    #[error("{0}")]
    Unreachable(#[from] InfrastructureError),

    /// The collaborator ran and reported an error (e.g., a SQL error).
    #[error("{0}")]
    Failed(String),
}

impl CollaboratorError {
    /// Creates an execution failure.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Creates an unreachable error.
    #[must_use]
    pub fn unreachable(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unreachable(InfrastructureError::new(collaborator, message))
    }
}

/// Provides default suggestions for configuration error codes.
pub struct ContractSuggestions;

impl ContractSuggestions {
    /// Gets a suggestion for a given error code.
    #[must_use]
    pub fn get(code: &str) -> Option<&'static str> {
        match code {
            "GRAPH-CYCLE" => Some(
                "Check node predecessors for circular references. \
                 A pipeline is a single linear chain.",
            ),
            "GRAPH-MISSING_PRED" => Some(
                "Ensure every predecessor names a node declared in the same pipeline. \
                 Check for typos in node names.",
            ),
            "GRAPH-BRANCH" => Some(
                "Each node may have at most one successor. Chain the nodes one after another.",
            ),
            "GRAPH-SOURCE" => Some("Exactly one node may be declared without a predecessor."),
            "GRAPH-EMPTY" => Some("Add at least one node to the pipeline before building."),
            "CONFIG-LOCATION" | "CONFIG-CONNECTION" => Some(
                "Declare every location and connection the runners reference in the run context template.",
            ),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_error_info_creation() {
        let info = ContractErrorInfo::new("TEST-001", "Test error")
            .with_fix_hint("Fix this by doing that")
            .with_context_entry("node", "extract");

        assert_eq!(info.code, "TEST-001");
        assert_eq!(info.summary, "Test error");
        assert_eq!(info.fix_hint, Some("Fix this by doing that".to_string()));
        assert_eq!(info.context.get("node"), Some(&"extract".to_string()));
    }

    #[test]
    fn test_cycle_detected_error() {
        let err = CycleDetectedError::new(vec![
            "a".to_string(),
            "b".to_string(),
            "a".to_string(),
        ]);

        assert!(err.to_string().contains("a -> b -> a"));
        assert_eq!(err.error_info.code, "GRAPH-CYCLE");

        let config: ConfigurationError = err.into();
        assert_eq!(config.code(), Some("GRAPH-CYCLE"));
        assert_eq!(config.nodes.len(), 3);
    }

    #[test]
    fn test_collaborator_error_display() {
        let err = CollaboratorError::unreachable("script:postgres_dest", "connection refused");
        assert_eq!(
            err.to_string(),
            "Infrastructure error in script:postgres_dest: connection refused"
        );
        assert_eq!(CollaboratorError::failed("syntax error").to_string(), "syntax error");
    }

    #[test]
    fn test_contract_suggestions() {
        assert!(ContractSuggestions::get("GRAPH-MISSING_PRED").is_some());
        assert!(ContractSuggestions::get("UNKNOWN").is_none());
    }
}
