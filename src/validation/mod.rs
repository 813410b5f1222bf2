//! Pre-run graph validation.
//!
//! A [`Validator`] runs its phases in a fixed order: graph structure, edge
//! cardinality, per-node rules for nodes reachable from start, the optional
//! cycle pass and finally the unreachable-node warning.

mod connection;
mod error;

use std::collections::{BTreeMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::graph::{Edge, Graph, NodeType};
use crate::nodes::{NodeRegistry, ValidationContext};

pub use connection::{can_connect_handle, is_valid_connection, Connection, HandleKind};
pub use error::{EdgeRef, Severity, ValidationError, ValidationErrorKind, ValidationReport};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ValidationOptions {
    /// Report every cycle reachable from start as an error.
    pub detect_cycles: bool,
}

pub struct Validator<'r> {
    registry: &'r NodeRegistry,
    options: ValidationOptions,
}

impl<'r> Validator<'r> {
    pub fn new(registry: &'r NodeRegistry) -> Self {
        Self {
            registry,
            options: ValidationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ValidationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn validate(&self, graph: &Graph) -> ValidationReport {
        let mut findings = validate_structure(graph);
        findings.extend(validate_edge_constraints(graph));

        let reachable = reachable_node_ids(graph);
        findings.extend(self.validate_nodes(graph, &reachable));

        if self.options.detect_cycles {
            findings.extend(detect_cycles(graph));
        }
        findings.extend(validate_reachability(graph, &reachable));

        let report = ValidationReport::from_findings(findings);
        debug!(
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "graph validated"
        );
        report
    }

    fn validate_nodes(&self, graph: &Graph, reachable: &HashSet<&str>) -> Vec<ValidationError> {
        let context = ValidationContext::new(graph);
        let mut findings = Vec::new();

        for node in graph.nodes.iter().filter(|node| reachable.contains(node.id.as_str())) {
            match self.registry.get(node.node_type()) {
                Some(handler) => findings.extend(handler.validate(node, &context)),
                None => findings.push(ValidationError::node_config(
                    &node.id,
                    format!("Unknown node type: {}", node.node_type()),
                )),
            }
        }

        findings
    }
}

/// Validates `graph` against the built-in rules of `registry` with default options.
pub fn validate_workflow(graph: &Graph, registry: &NodeRegistry) -> ValidationReport {
    Validator::new(registry).validate(graph)
}

fn validate_structure(graph: &Graph) -> Vec<ValidationError> {
    let mut findings = Vec::new();

    let starts = graph.nodes_of_type(NodeType::Start).count();
    if starts == 0 {
        findings.push(ValidationError::error(
            ValidationErrorKind::NoStartNode { count: 0 },
            "Workflow must have exactly one start node",
        ));
    } else if starts > 1 {
        findings.push(ValidationError::error(
            ValidationErrorKind::NoStartNode { count: starts },
            format!("Workflow has {starts} start nodes, but must have exactly one"),
        ));
    }

    if graph.nodes_of_type(NodeType::End).next().is_none() {
        findings.push(ValidationError::error(
            ValidationErrorKind::NoEndNode,
            "Workflow must have at least one end node",
        ));
    }

    findings
}

fn validate_edge_constraints(graph: &Graph) -> Vec<ValidationError> {
    let mut groups: BTreeMap<(&str, &str), Vec<&Edge>> = BTreeMap::new();
    for edge in &graph.edges {
        groups
            .entry((edge.source.as_str(), edge.source_handle.as_str()))
            .or_default()
            .push(edge);
    }

    groups
        .into_iter()
        .filter(|(_, edges)| edges.len() > 1)
        .map(|((source, handle), edges)| {
            ValidationError::error(
                ValidationErrorKind::MultipleOutgoingFromSourceHandle {
                    edges: edges.iter().copied().map(EdgeRef::from).collect(),
                },
                format!(
                    "Node {source} handle \"{handle}\" has {} outgoing connections (maximum 1 allowed)",
                    edges.len()
                ),
            )
        })
        .collect()
}

/// Breadth-first walk over every edge starting at the first start node.
fn reachable_node_ids(graph: &Graph) -> HashSet<&str> {
    let mut reachable = HashSet::new();
    let Some(start) = graph.nodes_of_type(NodeType::Start).next() else {
        return reachable;
    };

    let mut queue = VecDeque::from([start.id.as_str()]);
    while let Some(node_id) = queue.pop_front() {
        if !reachable.insert(node_id) {
            continue;
        }
        for edge in graph.outgoing(node_id) {
            if !reachable.contains(edge.target.as_str()) {
                queue.push_back(edge.target.as_str());
            }
        }
    }

    reachable
}

/// Depth-first search from start; every back edge closes one reported cycle.
fn detect_cycles(graph: &Graph) -> Vec<ValidationError> {
    let mut findings = Vec::new();
    let Some(start) = graph.nodes_of_type(NodeType::Start).next() else {
        return findings;
    };

    let mut visited: HashSet<&str> = HashSet::new();
    let mut on_stack: HashSet<&str> = HashSet::new();
    let mut path: Vec<&Edge> = Vec::new();
    // (node, its outgoing edges, index of the next edge to follow)
    let mut stack: Vec<(&str, Vec<&Edge>, usize)> = Vec::new();

    visited.insert(start.id.as_str());
    on_stack.insert(start.id.as_str());
    stack.push((start.id.as_str(), graph.outgoing(&start.id).collect(), 0));

    while let Some((node_id, edges, next)) = stack.last_mut() {
        let Some(edge) = edges.get(*next).copied() else {
            on_stack.remove(*node_id);
            stack.pop();
            path.pop();
            continue;
        };
        *next += 1;

        let target = edge.target.as_str();
        if on_stack.contains(target) {
            let begin = path
                .iter()
                .position(|step| step.source == target)
                .unwrap_or(path.len());
            let mut cycle: Vec<&Edge> = path[begin..].to_vec();
            cycle.push(edge);

            let mut members: Vec<&str> = cycle.iter().map(|step| step.source.as_str()).collect();
            members.push(target);
            findings.push(ValidationError::error(
                ValidationErrorKind::Cycle {
                    edges: cycle.into_iter().map(EdgeRef::from).collect(),
                },
                format!(
                    "Cycle detected in workflow involving nodes: {}",
                    members.join(" → ")
                ),
            ));
        } else if visited.insert(target) {
            on_stack.insert(target);
            path.push(edge);
            stack.push((target, graph.outgoing(target).collect(), 0));
        }
    }

    findings
}

fn validate_reachability(graph: &Graph, reachable: &HashSet<&str>) -> Vec<ValidationError> {
    let unreachable: Vec<String> = graph
        .nodes
        .iter()
        .filter(|node| node.node_type() != NodeType::Note && !reachable.contains(node.id.as_str()))
        .map(|node| node.id.clone())
        .collect();

    if unreachable.is_empty() {
        return Vec::new();
    }

    let message = format!("{} node(s) are unreachable from the start node", unreachable.len());
    vec![ValidationError::warning(
        ValidationErrorKind::UnreachableNode {
            node_ids: unreachable,
        },
        message,
    )]
}
