//! Test fixtures for pipeline testing.

use std::collections::HashMap;
use std::sync::Arc;

use super::{ScriptedGate, ScriptedRunner};
use crate::core::Period;
use crate::pipeline::{PipelineBuilder, PipelineGraph};
use crate::stages::{NoOpRunner, QualityGate, StageRunner};

/// Returns the period scheduled at 16:00 UTC on the given day.
///
/// # Panics
///
/// Panics if the date is invalid.
#[must_use]
pub fn daily_period(year: i32, month: u32, day: u32) -> Period {
    Period::on_day(year, month, day, 16).expect("valid test date")
}

/// Builds a chain of no-op runners with the given names.
///
/// # Panics
///
/// Panics if the names do not form a valid pipeline.
#[must_use]
pub fn linear_pipeline(names: &[&str]) -> PipelineGraph {
    names
        .iter()
        .fold(PipelineBuilder::new("test_pipeline"), |builder, name| {
            builder.then_runner(Arc::new(NoOpRunner::new(*name)))
        })
        .build()
        .expect("valid test pipeline")
}

/// A scripted pipeline whose nodes stay inspectable after the graph is built.
#[derive(Debug)]
pub struct TestPipeline {
    builder: PipelineBuilder,
    gates: HashMap<String, Arc<ScriptedGate>>,
    runners: HashMap<String, Arc<ScriptedRunner>>,
}

impl Default for TestPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl TestPipeline {
    /// Creates an empty test pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self {
            builder: PipelineBuilder::new("test_pipeline"),
            gates: HashMap::new(),
            runners: HashMap::new(),
        }
    }

    /// Appends a passing gate evaluating `checkpoint`.
    #[must_use]
    pub fn gate(self, name: &str, checkpoint: &str) -> Self {
        self.with_gate(ScriptedGate::passing(name), checkpoint)
    }

    /// Appends a gate failing with `rules`.
    #[must_use]
    pub fn failing_gate(self, name: &str, checkpoint: &str, rules: &[&str]) -> Self {
        self.with_gate(ScriptedGate::failing(name, rules.iter().copied()), checkpoint)
    }

    /// Appends a prepared gate.
    #[must_use]
    pub fn with_gate(mut self, gate: ScriptedGate, checkpoint: &str) -> Self {
        let gate = Arc::new(gate);
        let name = gate.name().to_string();
        self.gates.insert(name.clone(), gate.clone());
        self.builder = self.builder.then_gate(name, gate, checkpoint);
        self
    }

    /// Appends a succeeding runner.
    #[must_use]
    pub fn runner(self, name: &str) -> Self {
        self.with_runner(ScriptedRunner::new(name))
    }

    /// Appends a prepared runner.
    #[must_use]
    pub fn with_runner(mut self, runner: ScriptedRunner) -> Self {
        let runner = Arc::new(runner);
        self.runners.insert(runner.name().to_string(), runner.clone());
        self.builder = self.builder.then_runner(runner);
        self
    }

    /// Appends any runner.
    #[must_use]
    pub fn with_stage(mut self, runner: Arc<dyn StageRunner>) -> Self {
        self.builder = self.builder.then_runner(runner);
        self
    }

    /// Returns a gate added by name.
    ///
    /// # Panics
    ///
    /// Panics if no scripted gate has that name.
    #[must_use]
    pub fn scripted_gate(&self, name: &str) -> Arc<ScriptedGate> {
        self.gates[name].clone()
    }

    /// Returns a runner added by name.
    ///
    /// # Panics
    ///
    /// Panics if no scripted runner has that name.
    #[must_use]
    pub fn scripted_runner(&self, name: &str) -> Arc<ScriptedRunner> {
        self.runners[name].clone()
    }

    /// Builds the graph.
    ///
    /// # Panics
    ///
    /// Panics if the nodes do not form a valid pipeline.
    #[must_use]
    pub fn build(&self) -> PipelineGraph {
        self.builder.clone().build().expect("valid test pipeline")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_pipeline_fixture() {
        let graph = linear_pipeline(&["a", "b"]);
        assert_eq!(graph.node_names(), vec!["a", "b"]);
    }

    #[test]
    fn test_test_pipeline_keeps_handles() {
        let pipeline = TestPipeline::new()
            .gate("check", "cp")
            .runner("load")
            .failing_gate("verify", "cp2", &["row_count_min"]);
        let graph = pipeline.build();

        assert_eq!(graph.len(), 3);
        assert_eq!(pipeline.scripted_gate("check").invocations(), 0);
        assert_eq!(pipeline.scripted_runner("load").invocations(), 0);
        assert_eq!(daily_period(2024, 1, 1).id(), "2024-01-01");
    }
}
