//! The retail data pipeline.
//!
//! Eleven nodes: a quality gate in front of and behind every processing
//! step, ending in a no-op terminal node.

use super::{PipelineBuilder, PipelineGraph, RetryConfig, RetryingGate, RetryingRunner};
use crate::context::RunContextTemplate;
use crate::errors::ConfigurationError;
use crate::stages::{
    CheckpointGate, NoOpRunner, QualityGate, ScriptExecutor, ScriptRunner, StageRunner, Transform,
    TransformRunner, ValidationCollaborator,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Pipeline name.
pub const RETAIL_PIPELINE: &str = "retail_data_pipeline";

/// Node names in execution order.
pub mod nodes {
    /// Validates the source tables.
    pub const VALIDATE_SOURCE: &str = "validate_retail_source_data";
    /// Extracts from the source database into the raw file.
    pub const EXTRACT_LOAD_SOURCE: &str = "extract_load_retail_source";
    /// Validates the raw file.
    pub const VALIDATE_RAW: &str = "validate_retail_raw_data";
    /// Converts the raw file to the columnar stage file.
    pub const TRANSFORM_RAW: &str = "transform_load_retail_raw";
    /// Validates the columnar stage file.
    pub const VALIDATE_STAGE: &str = "validate_retail_stage_data";
    /// Converts the stage file to the temporary load file.
    pub const TRANSFORM_STAGE: &str = "transform_retail_stage";
    /// Loads the stage file into the warehouse stage table.
    pub const LOAD_STAGE: &str = "load_retail_stage";
    /// Validates the warehouse stage table.
    pub const VALIDATE_WAREHOUSE: &str = "validate_retail_warehouse_data";
    /// Transforms the stage table into the warehouse tables.
    pub const TRANSFORM_LOAD_WAREHOUSE: &str = "transform_load_retail_warehouse";
    /// Validates the destination tables.
    pub const VALIDATE_DEST: &str = "validate_retail_dest_data";
    /// Terminal node.
    pub const END: &str = "end_of_data_pipeline";
}

/// Validation checkpoint names.
pub mod checkpoints {
    /// Source tables.
    pub const SOURCE: &str = "retail_source_checkpoint";
    /// Raw extract.
    pub const LOAD: &str = "retail_load_checkpoint";
    /// Columnar stage file.
    pub const TRANSFORM: &str = "retail_transform_checkpoint";
    /// Warehouse stage table.
    pub const WAREHOUSE: &str = "retail_warehouse_checkpoint";
    /// Destination tables.
    pub const DEST: &str = "retail_dest_checkpoint";
}

/// Location keys.
pub mod locations {
    /// Raw CSV extract.
    pub const TO_RAW: &str = "to_raw";
    /// Columnar stage file.
    pub const STAGE_PARQUET: &str = "stage_parquet";
    /// Temporary CSV for the stage load.
    pub const STAGE_CSV: &str = "stage_csv";
}

/// Logical connection names.
pub mod connections {
    /// Source database.
    pub const SOURCE: &str = "source";
    /// Destination warehouse.
    pub const DEST: &str = "dest";
}

/// Default location templates.
#[must_use]
pub fn default_locations() -> BTreeMap<String, String> {
    [
        (locations::TO_RAW, "{root}/filesystem/raw/retail_profiling-{ds}.csv"),
        (
            locations::STAGE_PARQUET,
            "{root}/filesystem/stage/retail_profiling-{ds}.snappy.parquet",
        ),
        (
            locations::STAGE_CSV,
            "{root}/filesystem/stage/temp/retail_profiling-{ds}.csv",
        ),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Default connection identifiers.
#[must_use]
pub fn default_connections() -> BTreeMap<String, String> {
    [
        (connections::SOURCE, "postgres_source"),
        (connections::DEST, "postgres_dest"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Builds the retail run context template.
#[must_use]
pub fn retail_context_template(
    root: impl Into<String>,
    data_context_root: impl Into<String>,
    connections: BTreeMap<String, String>,
) -> RunContextTemplate {
    RunContextTemplate {
        root: root.into(),
        locations: default_locations(),
        connections,
        data_context_root: data_context_root.into(),
    }
}

/// The external capabilities the retail pipeline runs on.
#[derive(Debug, Clone)]
pub struct RetailCollaborators {
    /// Runs validation checkpoints.
    pub validator: Arc<dyn ValidationCollaborator>,
    /// Executes SQL scripts.
    pub scripts: Arc<dyn ScriptExecutor>,
    /// Raw CSV to columnar conversion.
    pub raw_transform: Arc<dyn Transform>,
    /// Columnar to CSV conversion.
    pub stage_transform: Arc<dyn Transform>,
    /// Directory holding the SQL scripts.
    pub scripts_dir: String,
}

impl RetailCollaborators {
    fn script(&self, file: &str) -> String {
        Path::new(&self.scripts_dir).join(file).to_string_lossy().into_owned()
    }
}

/// Builds the retail pipeline graph.
///
/// Every node is wrapped in the retry policy when it allows more than one
/// attempt.
///
/// # Errors
///
/// Returns a `ConfigurationError` if the graph is malformed.
pub fn retail_pipeline(
    collaborators: &RetailCollaborators,
    retry: &RetryConfig,
) -> Result<PipelineGraph, ConfigurationError> {
    let gate = |name: &str| -> Arc<dyn QualityGate> {
        let gate: Arc<dyn QualityGate> =
            Arc::new(CheckpointGate::new(name, collaborators.validator.clone()));
        if retry.retries_enabled() {
            Arc::new(RetryingGate::new(gate, retry.clone()))
        } else {
            gate
        }
    };
    let runner = |runner: Arc<dyn StageRunner>| -> Arc<dyn StageRunner> {
        if retry.retries_enabled() {
            Arc::new(RetryingRunner::new(runner, retry.clone()))
        } else {
            runner
        }
    };

    let extract = ScriptRunner::extract_load(
        nodes::EXTRACT_LOAD_SOURCE,
        collaborators.script("extract_load_retail_source.sql"),
        connections::SOURCE,
        collaborators.scripts.clone(),
    )
    .with_param(locations::TO_RAW, locations::TO_RAW);
    let transform_raw = TransformRunner::new(
        nodes::TRANSFORM_RAW,
        locations::TO_RAW,
        locations::STAGE_PARQUET,
        collaborators.raw_transform.clone(),
    );
    let transform_stage = TransformRunner::new(
        nodes::TRANSFORM_STAGE,
        locations::STAGE_PARQUET,
        locations::STAGE_CSV,
        collaborators.stage_transform.clone(),
    );
    let load_stage = ScriptRunner::load(
        nodes::LOAD_STAGE,
        collaborators.script("load_retail_stage.sql"),
        connections::DEST,
        collaborators.scripts.clone(),
    )
    .with_param("from_stage", locations::STAGE_CSV);
    let load_warehouse = ScriptRunner::load(
        nodes::TRANSFORM_LOAD_WAREHOUSE,
        collaborators.script("transform_load_retail_warehouse.sql"),
        connections::DEST,
        collaborators.scripts.clone(),
    );

    PipelineBuilder::new(RETAIL_PIPELINE)
        .then_gate(nodes::VALIDATE_SOURCE, gate(nodes::VALIDATE_SOURCE), checkpoints::SOURCE)
        .then_runner(runner(Arc::new(extract)))
        .then_gate(nodes::VALIDATE_RAW, gate(nodes::VALIDATE_RAW), checkpoints::LOAD)
        .then_runner(runner(Arc::new(transform_raw)))
        .then_gate(nodes::VALIDATE_STAGE, gate(nodes::VALIDATE_STAGE), checkpoints::TRANSFORM)
        .then_runner(runner(Arc::new(transform_stage)))
        .then_runner(runner(Arc::new(load_stage)))
        .then_gate(
            nodes::VALIDATE_WAREHOUSE,
            gate(nodes::VALIDATE_WAREHOUSE),
            checkpoints::WAREHOUSE,
        )
        .then_runner(runner(Arc::new(load_warehouse)))
        .then_gate(nodes::VALIDATE_DEST, gate(nodes::VALIDATE_DEST), checkpoints::DEST)
        .then_runner(Arc::new(NoOpRunner::new(nodes::END)))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{NodeKind, RunnerKind};
    use crate::stages::{MockScriptExecutor, MockTransform, MockValidationCollaborator};
    use pretty_assertions::assert_eq;

    fn collaborators() -> RetailCollaborators {
        RetailCollaborators {
            validator: Arc::new(MockValidationCollaborator::new()),
            scripts: Arc::new(MockScriptExecutor::new()),
            raw_transform: Arc::new(MockTransform::new()),
            stage_transform: Arc::new(MockTransform::new()),
            scripts_dir: "/opt/sql".to_string(),
        }
    }

    #[test]
    fn test_retail_pipeline_has_eleven_nodes_in_order() {
        let graph = retail_pipeline(&collaborators(), &RetryConfig::default()).unwrap();

        assert_eq!(
            graph.node_names(),
            vec![
                nodes::VALIDATE_SOURCE,
                nodes::EXTRACT_LOAD_SOURCE,
                nodes::VALIDATE_RAW,
                nodes::TRANSFORM_RAW,
                nodes::VALIDATE_STAGE,
                nodes::TRANSFORM_STAGE,
                nodes::LOAD_STAGE,
                nodes::VALIDATE_WAREHOUSE,
                nodes::TRANSFORM_LOAD_WAREHOUSE,
                nodes::VALIDATE_DEST,
                nodes::END,
            ]
        );
        assert!(graph.is_terminal(nodes::END));
        assert_eq!(
            graph.get(nodes::EXTRACT_LOAD_SOURCE).map(|n| n.kind()),
            Some(NodeKind::StageRunner(RunnerKind::ExtractLoad))
        );
        assert_eq!(
            graph.get(nodes::VALIDATE_RAW).map(|n| n.kind()),
            Some(NodeKind::QualityGate)
        );
    }

    #[test]
    fn test_retail_template_satisfies_pipeline() {
        let graph = retail_pipeline(&collaborators(), &RetryConfig::default()).unwrap();
        let template = retail_context_template("/data", "/gx", default_connections());
        assert!(graph.validate_context(&template).is_ok());

        let mut missing = default_connections();
        missing.remove(connections::DEST);
        let err = graph
            .validate_context(&retail_context_template("/data", "/gx", missing))
            .unwrap_err();
        assert_eq!(err.code(), Some("CONFIG-CONNECTION"));
    }

    #[test]
    fn test_retry_wrapping_keeps_kinds() {
        let retry = RetryConfig::new().with_max_attempts(3);
        let graph = retail_pipeline(&collaborators(), &retry).unwrap();
        assert_eq!(
            graph.get(nodes::LOAD_STAGE).map(|n| n.kind()),
            Some(NodeKind::StageRunner(RunnerKind::Load))
        );
    }
}
