//! Pipeline builder with build-time validation.

use super::{Node, PipelineGraph};
use crate::errors::{ConfigurationError, ContractErrorInfo, CycleDetectedError};
use crate::stages::{QualityGate, StageRunner};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Builder for linear, validated pipelines.
///
/// Nodes may be added with explicit predecessors ([`PipelineBuilder::node`])
/// or chained after the last added node ([`PipelineBuilder::then_gate`],
/// [`PipelineBuilder::then_runner`]). All structural checks run in
/// [`PipelineBuilder::build`].
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    name: String,
    nodes: Vec<Node>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
        }
    }

    /// Adds a node with whatever predecessor it declares.
    #[must_use]
    pub fn node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Adds a gate node after the last added node.
    #[must_use]
    pub fn then_gate(
        self,
        name: impl Into<String>,
        gate: Arc<dyn QualityGate>,
        checkpoint: impl Into<String>,
    ) -> Self {
        self.chain(Node::gate(name, gate, checkpoint))
    }

    /// Adds a runner node after the last added node.
    #[must_use]
    pub fn then_runner(self, runner: Arc<dyn StageRunner>) -> Self {
        self.chain(Node::runner(runner))
    }

    fn chain(mut self, mut node: Node) -> Self {
        let last = self.nodes.last().map(|n| n.name().to_string());
        node.set_predecessor(last);
        self.nodes.push(node);
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of nodes added so far.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Validates the nodes and builds the ordered graph.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` if the pipeline is empty, a name is
    /// duplicated, a predecessor is undeclared, the predecessors form a
    /// cycle, there is not exactly one source, or a node has more than one
    /// successor.
    pub fn build(self) -> Result<PipelineGraph, ConfigurationError> {
        if self.nodes.is_empty() {
            return Err(ConfigurationError::new("Pipeline has no nodes").with_error_info(
                ContractErrorInfo::new("GRAPH-EMPTY", "Cannot build an empty pipeline")
                    .with_fix_hint("Add at least one node to the pipeline before building."),
            ));
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.name()) {
                return Err(ConfigurationError::new(format!(
                    "Node '{}' is declared more than once",
                    node.name()
                ))
                .with_nodes(vec![node.name().to_string()])
                .with_error_info(ContractErrorInfo::new(
                    "GRAPH-DUPLICATE",
                    format!("Duplicate node '{}'", node.name()),
                )));
            }
        }

        for node in &self.nodes {
            if let Some(pred) = node.predecessor() {
                if !seen.contains(pred) {
                    return Err(ConfigurationError::new(format!(
                        "Node '{}' declares unknown predecessor '{}'",
                        node.name(),
                        pred
                    ))
                    .with_nodes(vec![node.name().to_string(), pred.to_string()])
                    .with_error_info(
                        ContractErrorInfo::new(
                            "GRAPH-MISSING_PRED",
                            format!("Predecessor '{pred}' not found"),
                        )
                        .with_fix_hint("Declare the predecessor node in the same pipeline."),
                    ));
                }
            }
        }

        self.detect_cycles()?;

        let sources: Vec<&Node> = self.nodes.iter().filter(|n| n.predecessor().is_none()).collect();
        if sources.len() != 1 {
            return Err(ConfigurationError::new(format!(
                "Pipeline must have exactly one source node, found {}",
                sources.len()
            ))
            .with_nodes(sources.iter().map(|n| n.name().to_string()).collect())
            .with_error_info(ContractErrorInfo::new(
                "GRAPH-SOURCE",
                "A linear pipeline has a single source",
            )));
        }

        let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();
        for node in &self.nodes {
            if let Some(pred) = node.predecessor() {
                successors.entry(pred).or_default().push(node.name());
            }
        }
        if let Some((pred, succ)) = successors.iter().find(|(_, succ)| succ.len() > 1) {
            let mut involved = vec![(*pred).to_string()];
            involved.extend(succ.iter().map(|s| (*s).to_string()));
            return Err(ConfigurationError::new(format!(
                "Node '{pred}' has more than one successor: {}",
                succ.join(", ")
            ))
            .with_nodes(involved)
            .with_error_info(ContractErrorInfo::new(
                "GRAPH-BRANCH",
                "Branching is not supported",
            )));
        }

        let order = Self::chain_order(sources[0].name(), &successors);
        let by_name: HashMap<String, Node> = self
            .nodes
            .into_iter()
            .map(|n| (n.name().to_string(), n))
            .collect();
        let mut by_name = by_name;
        let nodes = order
            .iter()
            .filter_map(|name| by_name.remove(name))
            .collect();

        Ok(PipelineGraph::new(self.name, nodes))
    }

    fn chain_order(source: &str, successors: &HashMap<&str, Vec<&str>>) -> Vec<String> {
        let mut order = vec![source.to_string()];
        let mut current = source;
        while let Some(next) = successors.get(current).and_then(|s| s.first()) {
            order.push((*next).to_string());
            current = next;
        }
        order
    }

    /// Detects cycles along predecessor links.
    fn detect_cycles(&self) -> Result<(), CycleDetectedError> {
        let preds: HashMap<&str, Option<&str>> = self
            .nodes
            .iter()
            .map(|n| (n.name(), n.predecessor()))
            .collect();
        let mut visited: HashSet<&str> = HashSet::new();

        for node in &self.nodes {
            if visited.contains(node.name()) {
                continue;
            }
            let mut path: Vec<&str> = Vec::new();
            let mut on_path: HashSet<&str> = HashSet::new();
            let mut current = Some(node.name());

            while let Some(name) = current {
                if on_path.contains(name) {
                    let start = path.iter().position(|n| *n == name).unwrap_or(0);
                    let mut cycle: Vec<String> = path[start..].iter().map(|s| (*s).to_string()).collect();
                    cycle.push(name.to_string());
                    return Err(CycleDetectedError::new(cycle));
                }
                if visited.contains(name) {
                    break;
                }
                path.push(name);
                on_path.insert(name);
                current = preds.get(name).copied().flatten();
            }
            visited.extend(path);
        }

        Ok(())
    }
}
