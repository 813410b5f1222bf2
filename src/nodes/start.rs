use async_trait::async_trait;
use serde_json::Value;

use super::{
    expect_single, kind_mismatch, ExecutionContext, NodeError, NodeExecutionResult, NodeHandler,
    NodeResult, ValidationContext,
};
use crate::functions::json_schema_for;
use crate::graph::{Node, NodeKind, NodeType, StartData};
use crate::validation::ValidationError;

/// Entry point. Hands the latest user message to its single successor.
#[derive(Debug, Default, Clone, Copy)]
pub struct StartHandler;

#[async_trait]
impl NodeHandler for StartHandler {
    fn node_type(&self) -> NodeType {
        NodeType::Start
    }

    fn data_schema(&self) -> Value {
        json_schema_for::<StartData>()
    }

    fn validate(&self, node: &Node, context: &ValidationContext<'_>) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if context.incoming_count(&node.id) > 0 {
            errors.push(ValidationError::node_config(
                &node.id,
                "Start node cannot have incoming connections",
            ));
        }

        errors.extend(expect_single(
            &node.id,
            context.outgoing_count(&node.id),
            "Start node must have exactly one outgoing connection",
            |found| format!("Start node can only have one outgoing connection (found {found})"),
        ));

        errors
    }

    async fn execute(&self, context: ExecutionContext<'_>) -> Result<NodeExecutionResult, NodeError> {
        let NodeKind::Start { .. } = &context.node.kind else {
            return Err(kind_mismatch(NodeType::Start, context.node));
        };

        let text = context.conversation.last_user_text().unwrap_or_default().to_string();
        context.emit_state(context.node.data_value());

        Ok(NodeExecutionResult {
            result: NodeResult::text(text),
            next_node_id: context.next_node(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Conversation;
    use crate::executor::ExecutionMemory;
    use crate::graph::{Edge, Graph};
    use crate::nodes::testing::run_handler;

    #[test]
    fn rejects_incoming_and_extra_outgoing() {
        let graph = Graph::new(
            vec![Node::start("s"), Node::end("a"), Node::end("b")],
            vec![
                Edge::new("e1", "s", "a"),
                Edge::new("e2", "s", "b").from_handle("other"),
                Edge::new("e3", "a", "s"),
            ],
        );
        let messages: Vec<_> = StartHandler
            .validate(graph.node("s").unwrap(), &ValidationContext::new(&graph))
            .into_iter()
            .map(|error| error.message)
            .collect();
        assert_eq!(
            messages,
            vec![
                "Start node cannot have incoming connections",
                "Start node can only have one outgoing connection (found 2)",
            ]
        );
    }

    #[tokio::test]
    async fn forwards_last_user_message() {
        let graph = Graph::new(
            vec![Node::start("s"), Node::end("e")],
            vec![Edge::new("e1", "s", "e")],
        );
        let mut conversation = Conversation::new();
        conversation.push_user("my invoice is wrong");

        let (result, events) = run_handler(
            &StartHandler,
            &graph,
            "s",
            "s",
            &ExecutionMemory::new(),
            &mut conversation,
        )
        .await;
        let result = result.unwrap();
        assert_eq!(result.result.text, "my invoice is wrong");
        assert_eq!(result.next_node_id.as_deref(), Some("e"));
        assert_eq!(events.len(), 1);
    }
}
