use async_trait::async_trait;
use serde_json::Value;

use super::{
    kind_mismatch, ExecutionContext, NodeError, NodeExecutionResult, NodeHandler, NodeResult,
    ValidationContext,
};
use crate::events::ExecutionEvent;
use crate::functions::json_schema_for;
use crate::graph::{EndData, Node, NodeKind, NodeType};
use crate::validation::ValidationError;

#[derive(Debug, Default, Clone, Copy)]
pub struct EndHandler;

#[async_trait]
impl NodeHandler for EndHandler {
    fn node_type(&self) -> NodeType {
        NodeType::End
    }

    fn data_schema(&self) -> Value {
        json_schema_for::<EndData>()
    }

    fn validate(&self, node: &Node, context: &ValidationContext<'_>) -> Vec<ValidationError> {
        if context.outgoing_count(&node.id) > 0 {
            vec![ValidationError::node_config(
                &node.id,
                "End node cannot have outgoing connections",
            )]
        } else {
            Vec::new()
        }
    }

    async fn execute(&self, context: ExecutionContext<'_>) -> Result<NodeExecutionResult, NodeError> {
        let NodeKind::End { .. } = &context.node.kind else {
            return Err(kind_mismatch(NodeType::End, context.node));
        };

        context.emit_state(context.node.data_value());
        context.emit(ExecutionEvent::Finish);

        Ok(NodeExecutionResult {
            result: NodeResult::text("end"),
            next_node_id: None,
        })
    }
}
