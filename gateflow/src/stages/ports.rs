//! Collaborator ports - the narrow interfaces nodes invoke.
//!
//! Gates and runners never talk to databases, files or validation suites
//! directly. They go through these traits, so the orchestration core stays
//! independent of SQL, statistical rules and file formats.

use crate::errors::{CollaboratorError, InfrastructureError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of running a validation checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointOutcome {
    /// Whether every rule passed.
    pub pass: bool,
    /// Names of the rules that failed.
    #[serde(default, alias = "failedRuleNames")]
    pub failed_rules: Vec<String>,
}

impl CheckpointOutcome {
    /// A passing outcome.
    #[must_use]
    pub fn passed() -> Self {
        Self {
            pass: true,
            failed_rules: Vec::new(),
        }
    }

    /// A failing outcome naming the failed rules.
    #[must_use]
    pub fn failed<I, S>(rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pass: false,
            failed_rules: rules.into_iter().map(Into::into).collect(),
        }
    }
}

/// Runs named validation checkpoints against a data context.
///
/// Must be read-only with respect to pipeline data.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ValidationCollaborator: Send + Sync + std::fmt::Debug {
    /// Runs `checkpoint` against the data context rooted at `data_context`.
    ///
    /// Expected validation failures are an `Ok` outcome with `pass == false`.
    async fn run_checkpoint(
        &self,
        checkpoint: &str,
        data_context: &str,
    ) -> Result<CheckpointOutcome, InfrastructureError>;
}

/// A parameterized script execution request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRequest {
    /// Path of the script to run.
    pub script: String,
    /// Connection identifier to run it against.
    pub connection: String,
    /// Named parameters derived from the period.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// Result of a successful script execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptOutcome {
    /// Rows the script reported, if any.
    pub rows_affected: Option<u64>,
}

/// Executes extract/load scripts against named connections.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScriptExecutor: Send + Sync + std::fmt::Debug {
    /// Executes the request.
    ///
    /// Scripts must write to period-qualified, overwritable targets so that a
    /// re-run of the same period leaves the same state behind.
    async fn execute(&self, request: &ScriptRequest) -> Result<ScriptOutcome, CollaboratorError>;
}

/// Result of a successful transform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformOutcome {
    /// Rows written to the output, if known.
    pub rows_written: Option<u64>,
}

/// Converts one location into another (e.g., CSV to columnar).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transform: Send + Sync + std::fmt::Debug {
    /// Reads `input` and writes `output`, replacing any previous output.
    ///
    /// Deterministic given identical inputs.
    async fn apply(&self, input: &str, output: &str) -> Result<TransformOutcome, CollaboratorError>;
}
