use async_trait::async_trait;
use serde_json::Value;

use super::{ExecutionContext, NodeError, NodeExecutionResult, NodeHandler, ValidationContext};
use crate::functions::json_schema_for;
use crate::graph::{Node, NodeType, NoteData};
use crate::validation::ValidationError;

/// Free-form annotation on the canvas. Never scheduled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoteHandler;

#[async_trait]
impl NodeHandler for NoteHandler {
    fn node_type(&self) -> NodeType {
        NodeType::Note
    }

    fn data_schema(&self) -> Value {
        json_schema_for::<NoteData>()
    }

    fn validate(&self, _node: &Node, _context: &ValidationContext<'_>) -> Vec<ValidationError> {
        Vec::new()
    }

    async fn execute(&self, context: ExecutionContext<'_>) -> Result<NodeExecutionResult, NodeError> {
        Err(NodeError::NotExecutable {
            node_id: context.node.id.clone(),
            node_type: context.node.node_type(),
        })
    }
}
