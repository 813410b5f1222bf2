use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{
    expect_single, kind_mismatch, ExecutionContext, NodeError, NodeExecutionResult, NodeHandler,
    NodeResult, ValidationContext,
};
use crate::events::NodeStatus;
use crate::functions::json_schema_for;
use crate::graph::{Node, NodeKind, NodeType, WaitData};
use crate::validation::ValidationError;

/// Timed delay that forwards its upstream payload untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct WaitHandler;

fn with_status(mut data: Value, status: NodeStatus) -> Value {
    if let Value::Object(map) = &mut data {
        map.insert(
            "status".to_string(),
            serde_json::to_value(status).unwrap_or(Value::Null),
        );
    }
    data
}

#[async_trait]
impl NodeHandler for WaitHandler {
    fn node_type(&self) -> NodeType {
        NodeType::Wait
    }

    fn data_schema(&self) -> Value {
        json_schema_for::<WaitData>()
    }

    fn validate(&self, node: &Node, context: &ValidationContext<'_>) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let NodeKind::Wait { data } = &node.kind {
            let max = data.unit.max_duration();
            if data.duration > max {
                errors.push(ValidationError::node_config(
                    &node.id,
                    format!("Duration exceeds maximum for {} ({max})", data.unit.as_str()),
                ));
            }
        }

        errors.extend(expect_single(
            &node.id,
            context.incoming_count(&node.id),
            "Wait node must have one incoming connection",
            |found| format!("Wait node can only have one incoming connection (found {found})"),
        ));
        errors.extend(expect_single(
            &node.id,
            context.outgoing_count(&node.id),
            "Wait node must have one outgoing connection",
            |found| format!("Wait node can only have one outgoing connection (found {found})"),
        ));

        errors
    }

    async fn execute(&self, context: ExecutionContext<'_>) -> Result<NodeExecutionResult, NodeError> {
        let NodeKind::Wait { data } = &context.node.kind else {
            return Err(kind_mismatch(NodeType::Wait, context.node));
        };

        let result = context
            .previous()
            .map(|previous| NodeResult {
                text: previous.text.clone(),
                structured: previous.structured.clone(),
            })
            .unwrap_or_default();

        let delay_ms = data.delay_ms();
        context.emit_state(with_status(context.node.data_value(), NodeStatus::Processing));
        debug!(node_id = %context.node.id, delay_ms, "waiting");
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        context.emit_state(with_status(context.node.data_value(), NodeStatus::Success));

        Ok(NodeExecutionResult {
            result,
            next_node_id: context.next_node(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Conversation;
    use crate::events::ExecutionEvent;
    use crate::executor::{ExecutionMemory, ExecutionRecord};
    use crate::graph::{Edge, Graph, WaitUnit};
    use crate::nodes::testing::run_handler;
    use serde_json::json;
    use tokio::time::Instant;

    fn graph(duration: u64, unit: WaitUnit) -> Graph {
        Graph::new(
            vec![Node::start("s"), Node::wait("w", duration, unit), Node::end("e")],
            vec![Edge::new("e1", "s", "w"), Edge::new("e2", "w", "e")],
        )
    }

    #[test]
    fn caps_duration_per_unit() {
        let graph = graph(61, WaitUnit::Minutes);
        let errors = WaitHandler.validate(graph.node("w").unwrap(), &ValidationContext::new(&graph));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Duration exceeds maximum for minutes (60)");

        let graph = self::graph(24, WaitUnit::Hours);
        assert!(WaitHandler
            .validate(graph.node("w").unwrap(), &ValidationContext::new(&graph))
            .is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_then_passes_payload_through() {
        let graph = graph(3, WaitUnit::Seconds);
        let mut memory = ExecutionMemory::new();
        memory.record(
            "s",
            ExecutionRecord {
                text: "{\"n\":1}".into(),
                structured: Some(json!({ "n": 1 })),
                node_type: NodeType::Agent,
                messages: Vec::new(),
            },
        );

        let started = Instant::now();
        let (result, events) =
            run_handler(&WaitHandler, &graph, "w", "s", &memory, &mut Conversation::new()).await;
        let result = result.unwrap();

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(3100), "{elapsed:?}");
        assert_eq!(result.result.structured, Some(json!({ "n": 1 })));
        assert_eq!(result.result.text, "{\"n\":1}");
        assert_eq!(result.next_node_id.as_deref(), Some("e"));

        let statuses: Vec<_> = events
            .iter()
            .map(|event| match event {
                ExecutionEvent::NodeExecutionState { data, .. } => data["status"].clone(),
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(statuses, vec![json!("processing"), json!("success")]);
    }
}
