use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::Graph;

#[derive(Debug, Error)]
pub enum GraphLoadError {
    #[error("failed to read graph document {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse graph JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse graph YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Graph {
    pub fn from_json_str(input: &str) -> Result<Self, GraphLoadError> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn from_yaml_str(input: &str) -> Result<Self, GraphLoadError> {
        Ok(serde_yaml::from_str(input)?)
    }

    /// Loads a document, picking YAML for `.yaml`/`.yml` and JSON otherwise.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, GraphLoadError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| GraphLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&source),
            _ => Self::from_json_str(&source),
        }
    }

    pub fn to_json_string(&self) -> Result<String, GraphLoadError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_yaml_string(&self) -> Result<String, GraphLoadError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Node, NodeType};

    #[test]
    fn edge_handles_default_when_omitted() {
        let graph = Graph::from_yaml_str(
            r#"
nodes:
  - id: start
    type: start
  - id: end
    type: end
edges:
  - id: e1
    source: start
    target: end
"#,
        )
        .unwrap();

        assert_eq!(graph.edges[0].source_handle, "output");
        assert_eq!(graph.edges[0].target_handle, "input");
        assert_eq!(graph.nodes[1].node_type(), NodeType::End);
    }

    #[test]
    fn unknown_node_type_is_rejected() {
        let error = Graph::from_json_str(
            r#"{"nodes": [{"id": "x", "type": "teleport", "data": {}}], "edges": []}"#,
        )
        .unwrap_err();
        assert!(matches!(error, GraphLoadError::Json(_)));
    }

    #[test]
    fn yaml_and_json_agree() {
        let graph = Graph::new(
            vec![Node::start("s"), Node::end("e")],
            vec![Edge::new("e1", "s", "e")],
        );
        let from_yaml = Graph::from_yaml_str(&graph.to_yaml_string().unwrap()).unwrap();
        let from_json = Graph::from_json_str(&graph.to_json_string().unwrap()).unwrap();
        assert_eq!(from_yaml, from_json);
    }

    #[test]
    fn missing_file_reports_path() {
        let error = Graph::from_path("does/not/exist.json").unwrap_err();
        match error {
            GraphLoadError::Io { path, .. } => assert!(path.ends_with("exist.json")),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
