//! The built, immutable pipeline graph.

use super::{Node, NodeAction};
use crate::context::RunContextTemplate;
use crate::errors::{ConfigurationError, ContractErrorInfo};
use std::collections::HashMap;

/// An ordered, linear chain of nodes.
///
/// Only [`PipelineBuilder`](super::PipelineBuilder) creates graphs, so every
/// graph is non-empty, acyclic and has exactly one source and one terminal.
#[derive(Debug, Clone)]
pub struct PipelineGraph {
    name: String,
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
}

impl PipelineGraph {
    pub(crate) fn new(name: String, nodes: Vec<Node>) -> Self {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.name().to_string(), i))
            .collect();
        Self { name, nodes, index }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the nodes in execution order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Returns the node names in execution order.
    #[must_use]
    pub fn node_names(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.name().to_string()).collect()
    }

    /// Returns a node by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Node> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    /// Returns the node that runs after `name`, or `None` for the terminal
    /// node and unknown names.
    #[must_use]
    pub fn successor_of(&self, name: &str) -> Option<&Node> {
        self.index.get(name).and_then(|&i| self.nodes.get(i + 1))
    }

    /// Returns the node that runs before `name`.
    #[must_use]
    pub fn predecessor_of(&self, name: &str) -> Option<&Node> {
        self.get(name)
            .and_then(Node::predecessor)
            .and_then(|pred| self.get(pred))
    }

    /// Returns true if `name` is the terminal node.
    #[must_use]
    pub fn is_terminal(&self, name: &str) -> bool {
        self.index.get(name).is_some_and(|&i| i + 1 == self.nodes.len())
    }

    /// Returns the source node.
    #[must_use]
    pub fn source(&self) -> &Node {
        &self.nodes[0]
    }

    /// Returns the terminal node.
    #[must_use]
    pub fn terminal(&self) -> &Node {
        &self.nodes[self.nodes.len() - 1]
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: built graphs have at least one node.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Checks that the template provides every location and connection the
    /// runners declare.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` (`CONFIG-LOCATION` or
    /// `CONFIG-CONNECTION`) naming the first node with a missing entry.
    pub fn validate_context(&self, template: &RunContextTemplate) -> Result<(), ConfigurationError> {
        template.validate()?;

        for node in &self.nodes {
            let NodeAction::Runner(runner) = node.action() else {
                continue;
            };

            if let Some(key) = runner
                .required_locations()
                .into_iter()
                .find(|key| !template.has_location(key))
            {
                return Err(ConfigurationError::new(format!(
                    "Node '{}' needs location '{key}' which is not configured",
                    node.name()
                ))
                .with_nodes(vec![node.name().to_string()])
                .with_error_info(
                    ContractErrorInfo::new("CONFIG-LOCATION", "Missing location template")
                        .with_context_entry("location", key)
                        .with_fix_hint("Add the location template to the run context."),
                ));
            }

            if let Some(name) = runner
                .required_connections()
                .into_iter()
                .find(|name| !template.has_connection(name))
            {
                return Err(ConfigurationError::new(format!(
                    "Node '{}' needs connection '{name}' which is not configured",
                    node.name()
                ))
                .with_nodes(vec![node.name().to_string()])
                .with_error_info(
                    ContractErrorInfo::new("CONFIG-CONNECTION", "Missing connection parameter")
                        .with_context_entry("connection", name),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineBuilder;
    use crate::stages::{MockScriptExecutor, NoOpRunner, ScriptRunner, StageRunner};
    use std::sync::Arc;

    fn chain() -> PipelineGraph {
        PipelineBuilder::new("chain")
            .then_runner(Arc::new(NoOpRunner::new("a")))
            .then_runner(Arc::new(NoOpRunner::new("b")))
            .then_runner(Arc::new(NoOpRunner::new("c")))
            .build()
            .unwrap()
    }

    #[test]
    fn test_successor_and_terminal() {
        let graph = chain();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.source().name(), "a");
        assert_eq!(graph.terminal().name(), "c");
        assert_eq!(graph.successor_of("a").map(Node::name), Some("b"));
        assert!(graph.successor_of("c").is_none());
        assert!(graph.successor_of("missing").is_none());
        assert_eq!(graph.predecessor_of("b").map(Node::name), Some("a"));
        assert!(graph.is_terminal("c"));
        assert!(!graph.is_terminal("a"));
    }

    #[test]
    fn test_validate_context_reports_missing_entries() {
        let runner: Arc<dyn StageRunner> = Arc::new(
            ScriptRunner::load("load", "load.sql", "dest", Arc::new(MockScriptExecutor::new()))
                .with_param("from_stage", "stage_csv"),
        );
        let graph = PipelineBuilder::new("p").then_runner(runner).build().unwrap();

        let err = graph
            .validate_context(&RunContextTemplate::new().with_connection("dest", "pg"))
            .unwrap_err();
        assert_eq!(err.code(), Some("CONFIG-LOCATION"));
        assert_eq!(err.nodes, vec!["load".to_string()]);

        let err = graph
            .validate_context(&RunContextTemplate::new().with_location("stage_csv", "/s/{ds}.csv"))
            .unwrap_err();
        assert_eq!(err.code(), Some("CONFIG-CONNECTION"));

        let ok = RunContextTemplate::new()
            .with_location("stage_csv", "/s/{ds}.csv")
            .with_connection("dest", "pg");
        assert!(graph.validate_context(&ok).is_ok());
    }
}
