//! The orchestrator: scheduler, executor and graph wired together.
//!
//! Drives catch-up runs oldest first, operator re-runs and the long-running
//! tick loop used by the binary.

use crate::cancellation::CancellationToken;
use crate::config::OrchestratorConfig;
use crate::context::RunContextTemplate;
use crate::core::{Period, RunRecord, RunStatus};
use crate::errors::{ConfigurationError, GateflowError};
use crate::events::EventSink;
use crate::pipeline::{retail_pipeline, Executor, PipelineGraph, RetailCollaborators};
use crate::scheduler::{Deferral, JsonFileHistoryStore, RunHistoryStore, RunScheduler};
use crate::stages::{CommandScriptExecutor, CommandTransform, CommandValidator};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Per-period view of the ledger and the schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodSummary {
    /// The period.
    pub period: Period,
    /// Status of the latest attempt; `None` if the period never ran.
    pub status: Option<RunStatus>,
    /// True if the latest attempt succeeded on every node.
    pub succeeded: bool,
    /// Number of recorded attempts.
    pub attempts: usize,
    /// Node the latest attempt failed at.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_node: Option<String>,
    /// Failure reason of the latest attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// Runs a pipeline graph on a schedule.
#[derive(Debug)]
pub struct Orchestrator {
    graph: PipelineGraph,
    template: RunContextTemplate,
    scheduler: Arc<RunScheduler>,
    executor: Executor,
    tick_interval: Duration,
}

impl Orchestrator {
    /// Creates an orchestrator.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` if the template does not provide every
    /// location and connection the graph's runners need.
    pub fn new(
        graph: PipelineGraph,
        template: RunContextTemplate,
        scheduler: Arc<RunScheduler>,
        executor: Executor,
    ) -> Result<Self, ConfigurationError> {
        graph.validate_context(&template)?;
        Ok(Self {
            graph,
            template,
            scheduler,
            executor,
            tick_interval: Duration::from_secs(60),
        })
    }

    /// Sets the interval between ticks in [`Orchestrator::serve`].
    #[must_use]
    pub const fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Builds the retail pipeline with command-backed collaborators and a
    /// JSON ledger, as configured.
    ///
    /// Without a configured start date the schedule starts at the earliest
    /// recorded period, or now for an empty ledger.
    ///
    /// # Errors
    ///
    /// Returns a `GateflowError` for invalid configuration or an unreadable
    /// ledger.
    pub fn from_config(
        config: &OrchestratorConfig,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, GateflowError> {
        config.validate()?;

        let store = Arc::new(JsonFileHistoryStore::new(&config.state_path));
        let fallback_start = store
            .load()?
            .periods()
            .next()
            .map_or_else(Utc::now, |period| period.scheduled_for());
        let cadence = config.cadence(fallback_start)?;
        let scheduler = RunScheduler::new(cadence, store)?.with_event_sink(sink.clone());

        let collaborators = RetailCollaborators {
            validator: Arc::new(CommandValidator::new(config.commands.validator.clone())),
            scripts: Arc::new(CommandScriptExecutor::new(config.commands.script.clone())),
            raw_transform: Arc::new(CommandTransform::new(config.commands.raw_transform.clone())),
            stage_transform: Arc::new(CommandTransform::new(
                config.commands.stage_transform.clone(),
            )),
            scripts_dir: config.scripts_dir.clone(),
        };
        let graph = retail_pipeline(&collaborators, &config.retry)?;

        info!(
            pipeline = %config.pipeline_name,
            schedule = %config.schedule,
            ledger = %config.state_path.display(),
            "Orchestrator configured"
        );
        Ok(Self::new(
            graph,
            config.context_template(),
            Arc::new(scheduler),
            Executor::new(sink),
        )?
        .with_tick_interval(config.tick_interval()))
    }

    /// Returns the graph.
    #[must_use]
    pub const fn graph(&self) -> &PipelineGraph {
        &self.graph
    }

    /// Returns the scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &Arc<RunScheduler> {
        &self.scheduler
    }

    /// Runs every period due at `now`, oldest first.
    ///
    /// Stops at the first failed run, the first deferral, or cancellation.
    ///
    /// # Errors
    ///
    /// Returns a `GateflowError` if a finished record cannot be stored.
    pub async fn run_due(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Vec<RunRecord>, GateflowError> {
        let mut records = Vec::new();
        for period in self.scheduler.tick(now) {
            if cancel.is_cancelled() {
                break;
            }
            if !self.scheduler.admit(period) {
                info!(%period, "Backfill paused");
                break;
            }

            let record = self.run_admitted(period, cancel).await?;
            let succeeded = record.is_success();
            records.push(record);
            if !succeeded {
                break;
            }
        }
        Ok(records)
    }

    /// Re-runs a period whose latest attempt failed.
    ///
    /// # Errors
    ///
    /// Returns `GateflowError::Scheduler` if the period may not be re-run,
    /// and any error from storing the record.
    pub async fn rerun(
        &self,
        period: Period,
        cancel: &CancellationToken,
    ) -> Result<RunRecord, GateflowError> {
        if let Err(deferral) = self.scheduler.check_rerun(period) {
            return Err(GateflowError::Scheduler(format!(
                "cannot re-run {period}: {deferral}"
            )));
        }
        if !self.scheduler.admit_rerun(period) {
            return Err(GateflowError::Scheduler(format!(
                "cannot re-run {period}: admission refused"
            )));
        }
        info!(%period, "Operator re-run");
        self.run_admitted(period, cancel).await
    }

    async fn run_admitted(
        &self,
        period: Period,
        cancel: &CancellationToken,
    ) -> Result<RunRecord, GateflowError> {
        let ctx = self.template.bind(period);
        let record = self
            .executor
            .execute_admitted(&self.scheduler, &self.graph, ctx, cancel)
            .await?;
        if !record.is_success() {
            warn!(
                %period,
                failed_node = record.failed_node().unwrap_or_default(),
                reason = record.failure_reason().unwrap_or_default(),
                "Period failed; later periods wait for a re-run"
            );
        }
        Ok(record)
    }

    /// Ticks until `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns a `GateflowError` if a finished record cannot be stored.
    pub async fn serve(&self, cancel: &CancellationToken) -> Result<(), GateflowError> {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            pipeline = %self.graph.name(),
            interval_secs = self.tick_interval.as_secs(),
            "Serving"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!(reason = cancel.reason().unwrap_or_default(), "Stopping");
                    return Ok(());
                }
                _ = interval.tick() => {}
            }

            match self.run_due(Utc::now(), cancel).await {
                Ok(records) if !records.is_empty() => {
                    info!(runs = records.len(), "Tick finished");
                }
                Ok(_) => {}
                Err(err) => {
                    error!(error = %err, "Tick failed");
                    return Err(err);
                }
            }
        }
    }

    /// Returns the oldest period due at `now` that cannot be admitted, with
    /// the reason. `None` means the backfill is not blocked.
    #[must_use]
    pub fn blocked(&self, now: DateTime<Utc>) -> Option<(Period, Deferral)> {
        let head = self.scheduler.tick(now).into_iter().next()?;
        self.scheduler
            .check_admission(head)
            .err()
            .map(|deferral| (head, deferral))
    }

    /// Summarizes every recorded period plus every period due at `now`.
    #[must_use]
    pub fn status(&self, now: DateTime<Utc>) -> Vec<PeriodSummary> {
        let history = self.scheduler.history();
        let periods: BTreeSet<Period> = history
            .periods()
            .chain(self.scheduler.cadence().due_until(now))
            .collect();

        periods
            .into_iter()
            .map(|period| {
                let latest = history.latest(period);
                PeriodSummary {
                    period,
                    status: latest.map(RunRecord::status),
                    succeeded: latest.is_some_and(RunRecord::is_success),
                    attempts: history.attempts(period).len(),
                    failed_node: latest.and_then(|r| r.failed_node().map(str::to_string)),
                    failure_reason: latest.and_then(|r| r.failure_reason().map(str::to_string)),
                }
            })
            .collect()
    }
}
