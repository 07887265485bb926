//! Orchestrator configuration.

use crate::context::RunContextTemplate;
use crate::errors::{ConfigurationError, ContractErrorInfo};
use crate::pipeline::retail::{default_connections, default_locations, RETAIL_PIPELINE};
use crate::pipeline::RetryConfig;
use crate::scheduler::Cadence;
use crate::stages::CommandSpec;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Command lines for the process-backed collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandsConfig {
    /// Validation command. Args may use `{checkpoint}` and `{data_context}`.
    #[serde(default = "default_validator")]
    pub validator: CommandSpec,
    /// SQL client. Args may use `{script}` and `{connection}`.
    #[serde(default = "default_script")]
    pub script: CommandSpec,
    /// Raw CSV to columnar conversion. Args may use `{input}` and `{output}`.
    #[serde(default = "default_raw_transform")]
    pub raw_transform: CommandSpec,
    /// Columnar to CSV conversion. Args may use `{input}` and `{output}`.
    #[serde(default = "default_stage_transform")]
    pub stage_transform: CommandSpec,
}

fn default_validator() -> CommandSpec {
    CommandSpec::new(
        "great_expectations",
        ["--v3-api", "checkpoint", "run", "{checkpoint}"],
    )
}

fn default_script() -> CommandSpec {
    CommandSpec::new(
        "psql",
        ["{connection}", "-v", "ON_ERROR_STOP=1", "-f", "{script}"],
    )
    .with_param_args(["-v", "{key}={value}"])
}

fn default_raw_transform() -> CommandSpec {
    CommandSpec::new(
        "python3",
        [
            "-c",
            "import sys, pandas as pd; pd.read_csv(sys.argv[1]).to_parquet(sys.argv[2], compression='snappy')",
            "{input}",
            "{output}",
        ],
    )
}

fn default_stage_transform() -> CommandSpec {
    CommandSpec::new(
        "python3",
        [
            "-c",
            "import sys, pandas as pd; pd.read_parquet(sys.argv[1]).to_csv(sys.argv[2], index=False)",
            "{input}",
            "{output}",
        ],
    )
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            validator: default_validator(),
            script: default_script(),
            raw_transform: default_raw_transform(),
            stage_transform: default_stage_transform(),
        }
    }
}

/// Top-level configuration for the orchestrator and binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Pipeline name used in logs and events.
    #[serde(default = "default_pipeline_name")]
    pub pipeline_name: String,
    /// Cron schedule; five-field expressions are accepted.
    #[serde(default = "default_schedule")]
    pub schedule: String,
    /// First instant the schedule covers. When absent, the earliest
    /// recorded period is used, or the current time for an empty ledger.
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    /// Data root substituted for `{root}` in location templates.
    #[serde(default = "default_data_root")]
    pub data_root: String,
    /// Validation data context root.
    #[serde(default = "default_data_context_root")]
    pub data_context_root: String,
    /// Connection identifiers by logical name.
    #[serde(default = "default_connections")]
    pub connections: BTreeMap<String, String>,
    /// Location template overrides, merged over the defaults.
    #[serde(default)]
    pub locations: BTreeMap<String, String>,
    /// Directory holding the SQL scripts.
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: String,
    /// Node retry policy.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Path of the run ledger.
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    /// Seconds between scheduler ticks in `serve` mode.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_seconds: u64,
    /// Collaborator command lines.
    #[serde(default)]
    pub commands: CommandsConfig,
}

fn default_pipeline_name() -> String {
    RETAIL_PIPELINE.to_string()
}

fn default_schedule() -> String {
    "0 16 * * *".to_string()
}

fn default_data_root() -> String {
    ".".to_string()
}

fn default_data_context_root() -> String {
    "/opt/airflow/great_expectations".to_string()
}

fn default_scripts_dir() -> String {
    "./scripts/sql".to_string()
}

fn default_state_path() -> PathBuf {
    PathBuf::from("gateflow_state/run_history.json")
}

fn default_tick_interval() -> u64 {
    60
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            pipeline_name: default_pipeline_name(),
            schedule: default_schedule(),
            start_date: None,
            data_root: default_data_root(),
            data_context_root: default_data_context_root(),
            connections: default_connections(),
            locations: BTreeMap::new(),
            scripts_dir: default_scripts_dir(),
            retry: RetryConfig::default(),
            state_path: default_state_path(),
            tick_interval_seconds: default_tick_interval(),
            commands: CommandsConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the schedule.
    #[must_use]
    pub fn with_schedule(mut self, schedule: impl Into<String>) -> Self {
        self.schedule = schedule.into();
        self
    }

    /// Sets the start date.
    #[must_use]
    pub fn with_start_date(mut self, start: DateTime<Utc>) -> Self {
        self.start_date = Some(start);
        self
    }

    /// Sets the data root.
    #[must_use]
    pub fn with_data_root(mut self, root: impl Into<String>) -> Self {
        self.data_root = root.into();
        self
    }

    /// Sets the ledger path.
    #[must_use]
    pub fn with_state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = path.into();
        self
    }

    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` (`CONFIG-FILE`) for malformed JSON or
    /// any error from [`OrchestratorConfig::validate`].
    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            ConfigurationError::new(format!("Invalid configuration: {e}")).with_error_info(
                ContractErrorInfo::new("CONFIG-FILE", "Configuration is not valid JSON"),
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` (`CONFIG-FILE`) if the file cannot be
    /// read, plus any error from [`OrchestratorConfig::from_json_str`].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ConfigurationError::new(format!("Cannot read {}: {e}", path.display()))
                .with_error_info(
                    ContractErrorInfo::new("CONFIG-FILE", "Configuration file unreadable")
                        .with_context_entry("path", path.display().to_string()),
                )
        })?;
        Self::from_json_str(&json)
    }

    /// Checks the schedule, pipeline name and location templates.
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigurationError` found.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.pipeline_name.trim().is_empty() {
            return Err(ConfigurationError::new("Pipeline name is empty").with_error_info(
                ContractErrorInfo::new("CONFIG-FILE", "Empty pipeline name"),
            ));
        }
        if self.tick_interval_seconds == 0 {
            return Err(
                ConfigurationError::new("tick_interval_seconds must be positive").with_error_info(
                    ContractErrorInfo::new("CONFIG-SCHEDULE", "Zero tick interval"),
                ),
            );
        }
        self.cadence(Utc::now())?;
        self.context_template().validate()
    }

    /// Builds the cadence, anchored at the configured start or `fallback_start`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` (`CONFIG-SCHEDULE`) for an unparsable
    /// schedule.
    pub fn cadence(&self, fallback_start: DateTime<Utc>) -> Result<Cadence, ConfigurationError> {
        Cadence::parse(&self.schedule, self.start_date.unwrap_or(fallback_start))
    }

    /// Builds the run context template: default locations overlaid with the
    /// configured ones.
    #[must_use]
    pub fn context_template(&self) -> RunContextTemplate {
        let mut locations = default_locations();
        locations.extend(self.locations.clone());
        RunContextTemplate {
            root: self.data_root.clone(),
            locations,
            connections: self.connections.clone(),
            data_context_root: self.data_context_root.clone(),
        }
    }

    /// Returns the tick interval.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_seconds)
    }
}
