//! Workflow graph model: typed nodes connected through named handles.

mod document;
mod edge;
mod node;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use document::GraphLoadError;
pub use edge::{Edge, ELSE_HANDLE, INPUT_HANDLE, OUTPUT_HANDLE};
pub use node::{
    AgentData, BranchHandle, EndData, IfElseData, Node, NodeKind, NodeType, NoteData, OutputMode,
    StartData, WaitData, WaitUnit,
};

/// Nodes and edges, treated as immutable for the duration of a validation or run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Graph {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|edge| edge.id == id)
    }

    pub fn nodes_of_type(&self, node_type: NodeType) -> impl Iterator<Item = &Node> {
        self.nodes
            .iter()
            .filter(move |node| node.node_type() == node_type)
    }

    /// The unique start node, or `None` when there are zero or several.
    pub fn start_node(&self) -> Option<&Node> {
        let mut starts = self.nodes_of_type(NodeType::Start);
        match (starts.next(), starts.next()) {
            (Some(start), None) => Some(start),
            _ => None,
        }
    }

    pub fn outgoing<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |edge| edge.source == node_id)
    }

    pub fn incoming<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |edge| edge.target == node_id)
    }

    /// Edges arriving on the node's `input` handle.
    pub fn input_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.incoming(node_id).filter(|edge| edge.feeds_input())
    }

    pub fn edge_from_handle(&self, source: &str, handle: &str) -> Option<&Edge> {
        self.edges
            .iter()
            .find(|edge| edge.source == source && edge.source_handle == handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_node_requires_exactly_one() {
        let mut graph = Graph::new(vec![Node::start("a"), Node::end("z")], Vec::new());
        assert_eq!(graph.start_node().map(|node| node.id.as_str()), Some("a"));

        graph.nodes.push(Node::start("b"));
        assert!(graph.start_node().is_none());
    }

    #[test]
    fn input_edges_ignore_other_handles() {
        let graph = Graph::new(
            vec![Node::start("s"), Node::end("e")],
            vec![
                Edge::new("e1", "s", "e"),
                Edge::new("e2", "s", "e").to_handle("aux"),
            ],
        );
        let ids: Vec<_> = graph.input_edges("e").map(|edge| edge.id.as_str()).collect();
        assert_eq!(ids, vec!["e1"]);
        assert_eq!(graph.incoming("e").count(), 2);
    }
}
