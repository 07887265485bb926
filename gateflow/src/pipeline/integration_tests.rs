//! End-to-end tests: the retail pipeline driven through the scheduler.

#[cfg(test)]
mod tests {
    use crate::cancellation::CancellationToken;
    use crate::context::RunContextTemplate;
    use crate::core::{FailureKind, Period, RunRecord, StageStatus};
    use crate::errors::InfrastructureError;
    use crate::orchestrator::Orchestrator;
    use crate::pipeline::retail::{checkpoints, default_connections, nodes};
    use crate::pipeline::{
        retail_context_template, retail_pipeline, Executor, Node, PipelineBuilder,
        RetailCollaborators, RetryConfig,
    };
    use crate::scheduler::{Cadence, Deferral, InMemoryHistoryStore, RunScheduler};
    use crate::stages::{
        CheckpointOutcome, MockScriptExecutor, MockTransform, MockValidationCollaborator,
        NoOpRunner, ScriptOutcome, ScriptRequest, TransformOutcome,
    };
    use crate::testing::{assert_last_failure_kind, assert_results, daily_period};
    use chrono::{DateTime, TimeZone, Utc};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap()
    }

    /// Validator failing `row_count_min` on the raw checkpoint until healed.
    fn validator(raw_broken: Arc<AtomicBool>) -> MockValidationCollaborator {
        let mut validator = MockValidationCollaborator::new();
        validator
            .expect_run_checkpoint()
            .returning(move |checkpoint, _| {
                if checkpoint == checkpoints::LOAD && raw_broken.load(Ordering::SeqCst) {
                    Ok(CheckpointOutcome::failed(["row_count_min"]))
                } else {
                    Ok(CheckpointOutcome::passed())
                }
            });
        validator
    }

    fn scripts(requests: Arc<Mutex<Vec<ScriptRequest>>>) -> MockScriptExecutor {
        let mut scripts = MockScriptExecutor::new();
        scripts.expect_execute().returning(move |request| {
            requests.lock().push(request.clone());
            Ok(ScriptOutcome {
                rows_affected: Some(42),
            })
        });
        scripts
    }

    fn transform() -> MockTransform {
        let mut transform = MockTransform::new();
        transform
            .expect_apply()
            .returning(|_, _| Ok(TransformOutcome::default()));
        transform
    }

    struct Harness {
        orchestrator: Orchestrator,
        raw_broken: Arc<AtomicBool>,
        requests: Arc<Mutex<Vec<ScriptRequest>>>,
    }

    fn harness() -> Harness {
        let raw_broken = Arc::new(AtomicBool::new(false));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let collaborators = RetailCollaborators {
            validator: Arc::new(validator(raw_broken.clone())),
            scripts: Arc::new(scripts(requests.clone())),
            raw_transform: Arc::new(transform()),
            stage_transform: Arc::new(transform()),
            scripts_dir: "/opt/sql".to_string(),
        };
        let graph = retail_pipeline(&collaborators, &RetryConfig::default()).unwrap();
        let cadence = Cadence::parse("0 16 * * *", at(1, 0)).unwrap();
        let scheduler =
            RunScheduler::new(cadence, Arc::new(InMemoryHistoryStore::new())).unwrap();
        let orchestrator = Orchestrator::new(
            graph,
            retail_context_template("/data", "/gx", default_connections()),
            Arc::new(scheduler),
            Executor::default(),
        )
        .unwrap();

        Harness {
            orchestrator,
            raw_broken,
            requests,
        }
    }

    #[tokio::test]
    async fn test_retail_run_succeeds_on_every_node() {
        let harness = harness();
        let records = harness
            .orchestrator
            .run_due(at(1, 17), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert!(record.is_success());
        assert_eq!(record.results().len(), 11);
        assert_eq!(
            record.result_for(nodes::EXTRACT_LOAD_SOURCE).and_then(|r| r.rows_affected),
            Some(42)
        );

        let requests = harness.requests.lock();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].script, "/opt/sql/extract_load_retail_source.sql");
        assert_eq!(requests[0].connection, "postgres_source");
        assert_eq!(
            requests[0].params.get("to_raw").map(String::as_str),
            Some("/data/filesystem/raw/retail_profiling-2024-01-01.csv")
        );
        assert_eq!(requests[1].connection, "postgres_dest");
        assert_eq!(
            requests[1].params.get("from_stage").map(String::as_str),
            Some("/data/filesystem/stage/temp/retail_profiling-2024-01-01.csv")
        );
    }

    #[tokio::test]
    async fn test_raw_gate_failure_blocks_next_day_until_rerun() {
        let harness = harness();
        harness.raw_broken.store(true, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        let day1 = daily_period(2024, 1, 1);
        let day2 = daily_period(2024, 1, 2);

        let records = harness.orchestrator.run_due(at(2, 17), &cancel).await.unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.period(), day1);
        assert_results(
            record,
            &[
                (nodes::VALIDATE_SOURCE, StageStatus::Success),
                (nodes::EXTRACT_LOAD_SOURCE, StageStatus::Success),
                (nodes::VALIDATE_RAW, StageStatus::Failure),
            ],
        );
        assert_eq!(record.failed_node(), Some(nodes::VALIDATE_RAW));
        assert_last_failure_kind(record, FailureKind::Validation);
        let raw = record.result_for(nodes::VALIDATE_RAW).unwrap();
        assert!(raw.message.as_deref().unwrap_or_default().contains("row_count_min"));

        let scheduler = harness.orchestrator.scheduler();
        assert_eq!(
            scheduler.check_admission(day2),
            Err(Deferral::PredecessorUnresolved { previous: day1 })
        );
        assert!(harness
            .orchestrator
            .run_due(at(2, 18), &cancel)
            .await
            .unwrap()
            .is_empty());
        assert!(scheduler.record_for(day2).is_none());

        harness.raw_broken.store(false, Ordering::SeqCst);
        let rerun = harness.orchestrator.rerun(day1, &cancel).await.unwrap();
        assert!(rerun.is_success());

        let records = harness.orchestrator.run_due(at(2, 18), &cancel).await.unwrap();
        let periods: Vec<Period> = records.iter().map(RunRecord::period).collect();
        assert_eq!(periods, vec![day2]);
        assert!(records[0].is_success());
    }

    #[tokio::test]
    async fn test_queue_after_two_days_holds_only_the_third() {
        let harness = harness();
        let cancel = CancellationToken::new();
        harness.orchestrator.run_due(at(2, 17), &cancel).await.unwrap();

        assert_eq!(
            harness.orchestrator.scheduler().tick(at(3, 16)),
            vec![daily_period(2024, 1, 3)]
        );
    }

    #[tokio::test]
    async fn test_transient_validator_outage_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let mut validator = MockValidationCollaborator::new();
        validator.expect_run_checkpoint().returning(move |_, _| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(InfrastructureError::new("validator", "connection refused"))
            } else {
                Ok(CheckpointOutcome::passed())
            }
        });
        let collaborators = RetailCollaborators {
            validator: Arc::new(validator),
            scripts: Arc::new(scripts(Arc::new(Mutex::new(Vec::new())))),
            raw_transform: Arc::new(transform()),
            stage_transform: Arc::new(transform()),
            scripts_dir: "sql".to_string(),
        };
        let retry = RetryConfig::new()
            .with_max_attempts(2)
            .with_base_delay_ms(1)
            .with_max_delay_ms(1);
        let graph = retail_pipeline(&collaborators, &retry).unwrap();

        let ctx = retail_context_template("/data", "/gx", default_connections())
            .bind(daily_period(2024, 1, 1));
        let record = Executor::default()
            .execute(&graph, ctx, &CancellationToken::new())
            .await;

        assert!(record.is_success());
        let first = record.result_for(nodes::VALIDATE_SOURCE).unwrap();
        assert_eq!(first.attempts, 2);
    }

    #[test]
    fn test_missing_predecessor_fails_before_any_run() {
        let err = PipelineBuilder::new("broken")
            .node(Node::runner(Arc::new(NoOpRunner::new("first"))))
            .node(Node::runner(Arc::new(NoOpRunner::new("second"))).after("ghost"))
            .build()
            .unwrap_err();

        assert_eq!(err.code(), Some("GRAPH-MISSING_PRED"));
        assert!(err.nodes.contains(&"ghost".to_string()));
    }

    #[test]
    fn test_missing_connection_rejected_before_any_run() {
        let collaborators = RetailCollaborators {
            validator: Arc::new(MockValidationCollaborator::new()),
            scripts: Arc::new(MockScriptExecutor::new()),
            raw_transform: Arc::new(MockTransform::new()),
            stage_transform: Arc::new(MockTransform::new()),
            scripts_dir: "sql".to_string(),
        };
        let graph = retail_pipeline(&collaborators, &RetryConfig::default()).unwrap();
        let cadence = Cadence::parse("0 16 * * *", at(1, 0)).unwrap();
        let scheduler =
            RunScheduler::new(cadence, Arc::new(InMemoryHistoryStore::new())).unwrap();

        let err = Orchestrator::new(
            graph,
            RunContextTemplate::new().with_root("/data"),
            Arc::new(scheduler),
            Executor::default(),
        )
        .unwrap_err();
        assert!(matches!(err.code(), Some("CONFIG-LOCATION" | "CONFIG-CONNECTION")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_transform_rerun_produces_identical_output() {
        use crate::stages::{CommandSpec, CommandTransform, StageRunner, TransformRunner};
        use tempfile::TempDir;

        let dir = TempDir::new().unwrap();
        let root = dir.path().to_string_lossy().into_owned();
        std::fs::write(dir.path().join("in-2024-01-01.csv"), "id,amount\n1,10\n2,20\n").unwrap();

        let transform = CommandTransform::new(CommandSpec::new(
            "sh",
            ["-c", "sort -r \"$0\" > \"$1\"", "{input}", "{output}"],
        ));
        let runner = TransformRunner::new("convert", "input", "output", Arc::new(transform));
        let ctx = RunContextTemplate::new()
            .with_root(root)
            .with_location("input", "{root}/in-{ds}.csv")
            .with_location("output", "{root}/out-{ds}.csv")
            .bind(daily_period(2024, 1, 1));

        assert!(runner.run(&ctx).await.is_success());
        let first = std::fs::read(dir.path().join("out-2024-01-01.csv")).unwrap();
        assert!(runner.run(&ctx).await.is_success());
        let second = std::fs::read(dir.path().join("out-2024-01-01.csv")).unwrap();

        assert_eq!(first, second);
        assert!(!first.is_empty());
    }
}
