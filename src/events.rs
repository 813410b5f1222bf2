//! Progress events emitted while a graph runs.

use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::graph::{Node, NodeType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Processing,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ExecutionEvent {
    #[serde(rename_all = "camelCase")]
    NodeExecutionStatus {
        node_id: String,
        node_type: NodeType,
        name: String,
        status: NodeStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Snapshot of a node's data as seen by the handler.
    #[serde(rename_all = "camelCase")]
    NodeExecutionState {
        node_id: String,
        node_type: NodeType,
        data: Value,
    },
    #[serde(rename_all = "camelCase")]
    AgentResponse { node_id: String, text: String },
    Finish,
}

impl ExecutionEvent {
    pub fn status(node: &Node, status: NodeStatus) -> Self {
        ExecutionEvent::NodeExecutionStatus {
            node_id: node.id.clone(),
            node_type: node.node_type(),
            name: node.display_name().to_string(),
            status,
            error: None,
        }
    }

    pub fn failed(node: &Node, error: impl Into<String>) -> Self {
        ExecutionEvent::NodeExecutionStatus {
            node_id: node.id.clone(),
            node_type: node.node_type(),
            name: node.display_name().to_string(),
            status: NodeStatus::Error,
            error: Some(error.into()),
        }
    }

    pub fn state(node: &Node, data: Value) -> Self {
        ExecutionEvent::NodeExecutionState {
            node_id: node.id.clone(),
            node_type: node.node_type(),
            data,
        }
    }

    pub fn node_id(&self) -> Option<&str> {
        match self {
            ExecutionEvent::NodeExecutionStatus { node_id, .. }
            | ExecutionEvent::NodeExecutionState { node_id, .. }
            | ExecutionEvent::AgentResponse { node_id, .. } => Some(node_id),
            ExecutionEvent::Finish => None,
        }
    }
}

/// Receiver of run events. Emission never fails the run.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ExecutionEvent);
}

impl<F> EventSink for F
where
    F: Fn(ExecutionEvent) + Send + Sync,
{
    fn emit(&self, event: ExecutionEvent) {
        self(event)
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<ExecutionEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ExecutionEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.lock().clone()
    }

    pub fn take(&self) -> Vec<ExecutionEvent> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: ExecutionEvent) {
        self.lock().push(event);
    }
}

/// Forwards events to an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ExecutionEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: ExecutionEvent) {
        // receiver gone: nobody is listening
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_event_wire_shape() {
        let node = Node::start("start");
        let event = ExecutionEvent::status(&node, NodeStatus::Processing);
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "node-execution-status",
                "nodeId": "start",
                "nodeType": "start",
                "name": "start",
                "status": "processing"
            })
        );
        assert_eq!(
            serde_json::to_value(ExecutionEvent::Finish).unwrap(),
            json!({ "type": "finish" })
        );
    }

    #[test]
    fn closures_are_sinks() {
        let seen = Mutex::new(0);
        let sink = |_event: ExecutionEvent| {
            *seen.lock().unwrap() += 1;
        };
        sink.emit(ExecutionEvent::Finish);
        sink.emit(ExecutionEvent::Finish);
        assert_eq!(*seen.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn channel_sink_forwards() {
        let (sink, mut receiver) = ChannelSink::new();
        sink.emit(ExecutionEvent::Finish);
        assert_eq!(receiver.recv().await, Some(ExecutionEvent::Finish));

        drop(receiver);
        sink.emit(ExecutionEvent::Finish);
    }
}
