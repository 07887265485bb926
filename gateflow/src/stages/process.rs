//! Collaborators backed by external commands.
//!
//! These let the binary drive real validation suites, SQL clients and
//! conversion scripts without the core knowing anything about them.

use super::{
    CheckpointOutcome, ScriptExecutor, ScriptOutcome, ScriptRequest, Transform, TransformOutcome,
    ValidationCollaborator,
};
use crate::context::placeholder_pattern;
use crate::errors::{CollaboratorError, InfrastructureError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

/// A command line with `{placeholder}` arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Program to execute.
    pub program: String,
    /// Argument templates.
    #[serde(default)]
    pub args: Vec<String>,
    /// Argument templates repeated once per parameter, using `{key}` and `{value}`.
    #[serde(default)]
    pub param_args: Vec<String>,
}

impl CommandSpec {
    /// Creates a command spec.
    #[must_use]
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            param_args: Vec::new(),
        }
    }

    /// Sets the per-parameter argument templates.
    #[must_use]
    pub fn with_param_args<I, S>(mut self, param_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.param_args = param_args.into_iter().map(Into::into).collect();
        self
    }

    fn render(&self, vars: &[(&str, &str)]) -> Vec<String> {
        self.args.iter().map(|arg| substitute(arg, vars)).collect()
    }

    fn render_params<'a>(&self, params: impl Iterator<Item = (&'a String, &'a String)>) -> Vec<String> {
        params
            .flat_map(|(key, value)| {
                let vars = [("key", key.as_str()), ("value", value.as_str())];
                self.param_args
                    .iter()
                    .map(move |arg| substitute(arg, &vars))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    async fn output(&self, args: &[String], envs: &[(String, String)]) -> std::io::Result<Output> {
        debug!(program = %self.program, ?args, "Spawning collaborator command");
        Command::new(&self.program)
            .args(args)
            .envs(envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .kill_on_drop(true)
            .output()
            .await
    }
}

/// Replaces known placeholders in one pass; substituted values are never
/// rescanned and unknown placeholders are left as written.
fn substitute(template: &str, vars: &[(&str, &str)]) -> String {
    placeholder_pattern()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            vars.iter()
                .find(|(name, _)| *name == &caps[1])
                .map_or_else(|| caps[0].to_string(), |(_, value)| (*value).to_string())
        })
        .into_owned()
}

fn describe_failure(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("command exited with {}", output.status)
    } else {
        stderr.to_string()
    }
}

fn trailing_count(output: &Output) -> Option<u64> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .and_then(|line| line.trim().parse().ok())
}

/// Runs checkpoints through an external validation command.
///
/// The command may print `{"pass": bool, "failed_rules": [...]}` on stdout;
/// that report is authoritative whatever the exit status. Without it, a zero
/// exit passes and a non-zero exit is an infrastructure failure.
#[derive(Debug, Clone)]
pub struct CommandValidator {
    command: CommandSpec,
}

impl CommandValidator {
    /// Creates a validator. Args may use `{checkpoint}` and `{data_context}`.
    #[must_use]
    pub const fn new(command: CommandSpec) -> Self {
        Self { command }
    }
}

#[async_trait]
impl ValidationCollaborator for CommandValidator {
    async fn run_checkpoint(
        &self,
        checkpoint: &str,
        data_context: &str,
    ) -> Result<CheckpointOutcome, InfrastructureError> {
        let args = self
            .command
            .render(&[("checkpoint", checkpoint), ("data_context", data_context)]);
        let output = self
            .command
            .output(&args, &[])
            .await
            .map_err(|e| InfrastructureError::new("validator", format!("{}: {e}", self.command.program)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if let Ok(outcome) = serde_json::from_str::<CheckpointOutcome>(stdout.trim()) {
            return Ok(outcome);
        }
        if output.status.success() {
            Ok(CheckpointOutcome::passed())
        } else {
            Err(InfrastructureError::new("validator", describe_failure(&output)))
        }
    }
}

/// Executes scripts through an external client (e.g., `psql`).
///
/// Args may use `{script}` and `{connection}`; each parameter is also exported
/// as `GATEFLOW_PARAM_<NAME>`. A trailing integer on stdout is read as the
/// affected row count.
#[derive(Debug, Clone)]
pub struct CommandScriptExecutor {
    command: CommandSpec,
}

impl CommandScriptExecutor {
    /// Creates a script executor.
    #[must_use]
    pub const fn new(command: CommandSpec) -> Self {
        Self { command }
    }
}

#[async_trait]
impl ScriptExecutor for CommandScriptExecutor {
    async fn execute(&self, request: &ScriptRequest) -> Result<ScriptOutcome, CollaboratorError> {
        let mut args = self.command.render(&[
            ("script", request.script.as_str()),
            ("connection", request.connection.as_str()),
        ]);
        args.extend(self.command.render_params(request.params.iter()));

        let mut envs = vec![("GATEFLOW_CONNECTION".to_string(), request.connection.clone())];
        envs.extend(request.params.iter().map(|(key, value)| {
            (format!("GATEFLOW_PARAM_{}", key.to_uppercase()), value.clone())
        }));

        let output = self.command.output(&args, &envs).await.map_err(|e| {
            CollaboratorError::unreachable(
                format!("script:{}", request.connection),
                format!("{}: {e}", self.command.program),
            )
        })?;

        if output.status.success() {
            Ok(ScriptOutcome {
                rows_affected: trailing_count(&output),
            })
        } else {
            Err(CollaboratorError::failed(describe_failure(&output)))
        }
    }
}

/// Runs a conversion through an external command.
///
/// Args may use `{input}` and `{output}`.
#[derive(Debug, Clone)]
pub struct CommandTransform {
    command: CommandSpec,
}

impl CommandTransform {
    /// Creates a transform.
    #[must_use]
    pub const fn new(command: CommandSpec) -> Self {
        Self { command }
    }
}

#[async_trait]
impl Transform for CommandTransform {
    async fn apply(&self, input: &str, output: &str) -> Result<TransformOutcome, CollaboratorError> {
        let args = self.command.render(&[("input", input), ("output", output)]);
        let result = self.command.output(&args, &[]).await.map_err(|e| {
            CollaboratorError::unreachable("transform", format!("{}: {e}", self.command.program))
        })?;

        if result.status.success() {
            Ok(TransformOutcome {
                rows_written: trailing_count(&result),
            })
        } else {
            Err(CollaboratorError::failed(describe_failure(&result)))
        }
    }
}
