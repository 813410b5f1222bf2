use serde::{Deserialize, Serialize};

use crate::graph::Edge;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Edge identity as reported inside validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeRef {
    pub id: String,
    pub source: String,
    pub source_handle: String,
    pub target: String,
    pub target_handle: String,
}

impl From<&Edge> for EdgeRef {
    fn from(edge: &Edge) -> Self {
        Self {
            id: edge.id.clone(),
            source: edge.source.clone(),
            source_handle: edge.source_handle.clone(),
            target: edge.target.clone(),
            target_handle: edge.target_handle.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ValidationErrorKind {
    NoStartNode {
        count: usize,
    },
    NoEndNode,
    #[serde(rename_all = "camelCase")]
    InvalidNodeConfig {
        node_id: String,
    },
    #[serde(rename_all = "camelCase")]
    InvalidCondition {
        node_id: String,
        handle_id: String,
        condition: String,
        /// Underlying engine message, rewritten to name the offending source.
        error: String,
    },
    #[serde(rename_all = "camelCase")]
    UnreachableNode {
        node_ids: Vec<String>,
    },
    Cycle {
        edges: Vec<EdgeRef>,
    },
    MultipleOutgoingFromSourceHandle {
        edges: Vec<EdgeRef>,
    },
    MultipleSourcesForTargetHandle {
        edges: Vec<EdgeRef>,
    },
    #[serde(rename_all = "camelCase")]
    MissingRequiredConnection {
        node_id: String,
        handle_id: String,
    },
}

/// One finding of a validation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    #[serde(flatten)]
    pub kind: ValidationErrorKind,
    pub severity: Severity,
    pub message: String,
}

impl ValidationError {
    pub fn error(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            message: message.into(),
        }
    }

    pub fn warning(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn node_config(node_id: &str, message: impl Into<String>) -> Self {
        Self::error(
            ValidationErrorKind::InvalidNodeConfig {
                node_id: node_id.to_string(),
            },
            message,
        )
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Kebab-case tag, e.g. `invalid-condition`.
    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            ValidationErrorKind::NoStartNode { .. } => "no-start-node",
            ValidationErrorKind::NoEndNode => "no-end-node",
            ValidationErrorKind::InvalidNodeConfig { .. } => "invalid-node-config",
            ValidationErrorKind::InvalidCondition { .. } => "invalid-condition",
            ValidationErrorKind::UnreachableNode { .. } => "unreachable-node",
            ValidationErrorKind::Cycle { .. } => "cycle",
            ValidationErrorKind::MultipleOutgoingFromSourceHandle { .. } => {
                "multiple-outgoing-from-source-handle"
            }
            ValidationErrorKind::MultipleSourcesForTargetHandle { .. } => {
                "multiple-sources-for-target-handle"
            }
            ValidationErrorKind::MissingRequiredConnection { .. } => "missing-required-connection",
        }
    }

    pub fn affected_node_ids(&self) -> Vec<&str> {
        match &self.kind {
            ValidationErrorKind::NoStartNode { .. } | ValidationErrorKind::NoEndNode => Vec::new(),
            ValidationErrorKind::InvalidNodeConfig { node_id }
            | ValidationErrorKind::InvalidCondition { node_id, .. }
            | ValidationErrorKind::MissingRequiredConnection { node_id, .. } => vec![node_id],
            ValidationErrorKind::UnreachableNode { node_ids } => {
                node_ids.iter().map(String::as_str).collect()
            }
            ValidationErrorKind::Cycle { edges }
            | ValidationErrorKind::MultipleOutgoingFromSourceHandle { edges }
            | ValidationErrorKind::MultipleSourcesForTargetHandle { edges } => {
                let mut ids = Vec::new();
                for edge in edges {
                    for id in [edge.source.as_str(), edge.target.as_str()] {
                        if !ids.contains(&id) {
                            ids.push(id);
                        }
                    }
                }
                ids
            }
        }
    }

    pub fn affected_edge_ids(&self) -> Vec<&str> {
        match &self.kind {
            ValidationErrorKind::Cycle { edges }
            | ValidationErrorKind::MultipleOutgoingFromSourceHandle { edges }
            | ValidationErrorKind::MultipleSourcesForTargetHandle { edges } => {
                edges.iter().map(|edge| edge.id.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}

/// Outcome of validating a graph. Errors block execution, warnings do not.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn from_findings(findings: Vec<ValidationError>) -> Self {
        let (errors, warnings): (Vec<_>, Vec<_>) =
            findings.into_iter().partition(ValidationError::is_error);
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn all(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter().chain(self.warnings.iter())
    }

    pub fn errors_for_node<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a ValidationError> + 'a {
        self.all()
            .filter(move |finding| finding.affected_node_ids().contains(&node_id))
    }

    pub fn errors_for_edge<'a>(&'a self, edge_id: &'a str) -> impl Iterator<Item = &'a ValidationError> + 'a {
        self.all()
            .filter(move |finding| finding.affected_edge_ids().contains(&edge_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_with_type_tag_and_camel_case_payload() {
        let finding = ValidationError::error(
            ValidationErrorKind::InvalidCondition {
                node_id: "router".into(),
                handle_id: "output-urgent".into(),
                condition: "input.x ==".into(),
                error: "unexpected end of input".into(),
            },
            "bad",
        );
        assert_eq!(
            serde_json::to_value(&finding).unwrap(),
            json!({
                "type": "invalid-condition",
                "nodeId": "router",
                "handleId": "output-urgent",
                "condition": "input.x ==",
                "error": "unexpected end of input",
                "severity": "error",
                "message": "bad"
            })
        );
        assert_eq!(finding.type_name(), "invalid-condition");
    }

    #[test]
    fn report_splits_by_severity_and_indexes_by_node() {
        let report = ValidationReport::from_findings(vec![
            ValidationError::node_config("a", "broken"),
            ValidationError::warning(
                ValidationErrorKind::UnreachableNode {
                    node_ids: vec!["b".into(), "a".into()],
                },
                "2 node(s) are unreachable from the start node",
            ),
        ]);

        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.errors_for_node("a").count(), 2);
        assert_eq!(report.errors_for_node("b").count(), 1);
        assert_eq!(report.errors_for_edge("e1").count(), 0);
    }
}
