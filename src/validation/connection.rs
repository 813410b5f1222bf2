use serde::{Deserialize, Serialize};

use crate::graph::{Graph, NodeType};

/// A prospective edge an editor wants to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub source: String,
    pub source_handle: String,
    pub target: String,
    #[serde(default)]
    pub target_handle: Option<String>,
}

impl Connection {
    pub fn new(
        source: impl Into<String>,
        source_handle: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            source_handle: source_handle.into(),
            target: target.into(),
            target_handle: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleKind {
    Source,
    Target,
}

/// Whether `connection` may be added to `graph` without breaking a structural rule.
pub fn is_valid_connection(graph: &Graph, connection: &Connection) -> bool {
    let (Some(source), Some(target)) = (graph.node(&connection.source), graph.node(&connection.target))
    else {
        return false;
    };

    if source.id == target.id {
        return false;
    }
    if source.node_type() == NodeType::Note || target.node_type() == NodeType::Note {
        return false;
    }
    if target.node_type() == NodeType::Start || source.node_type() == NodeType::End {
        return false;
    }

    graph
        .edge_from_handle(&connection.source, &connection.source_handle)
        .is_none()
}

/// Whether a handle can take another connection.
pub fn can_connect_handle(graph: &Graph, node_id: &str, handle_id: &str, kind: HandleKind) -> bool {
    let Some(node) = graph.node(node_id) else {
        return true;
    };

    match (node.node_type(), kind) {
        (NodeType::Note, _) => false,
        (NodeType::Start, HandleKind::Target) => false,
        (NodeType::End, HandleKind::Source) => false,
        (_, HandleKind::Source) => graph.edge_from_handle(node_id, handle_id).is_none(),
        (_, HandleKind::Target) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Node, WaitUnit};

    fn graph() -> Graph {
        Graph::new(
            vec![
                Node::start("start"),
                Node::wait("pause", 1, WaitUnit::Seconds),
                Node::end("end"),
                Node::note("memo", "remember"),
            ],
            vec![Edge::new("e1", "start", "pause")],
        )
    }

    #[test]
    fn rejects_structurally_invalid_connections() {
        let graph = graph();
        assert!(is_valid_connection(&graph, &Connection::new("pause", "output", "end")));
        assert!(!is_valid_connection(&graph, &Connection::new("pause", "output", "pause")));
        assert!(!is_valid_connection(&graph, &Connection::new("pause", "output", "start")));
        assert!(!is_valid_connection(&graph, &Connection::new("end", "output", "pause")));
        assert!(!is_valid_connection(&graph, &Connection::new("pause", "output", "memo")));
        assert!(!is_valid_connection(&graph, &Connection::new("pause", "output", "ghost")));
        // start's output handle is already taken by e1
        assert!(!is_valid_connection(&graph, &Connection::new("start", "output", "end")));
    }

    #[test]
    fn handle_availability() {
        let graph = graph();
        assert!(!can_connect_handle(&graph, "start", "output", HandleKind::Source));
        assert!(!can_connect_handle(&graph, "start", "input", HandleKind::Target));
        assert!(!can_connect_handle(&graph, "end", "output", HandleKind::Source));
        assert!(!can_connect_handle(&graph, "memo", "input", HandleKind::Target));
        assert!(can_connect_handle(&graph, "pause", "output", HandleKind::Source));
        assert!(can_connect_handle(&graph, "unknown", "output", HandleKind::Source));
    }
}
