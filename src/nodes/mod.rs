//! Per-type node behavior: static validation rules and run-time execution.

mod agent;
mod end;
mod if_else;
mod note;
mod registry;
mod start;
mod wait;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::conversation::Conversation;
use crate::events::{EventSink, ExecutionEvent};
use crate::executor::{ExecutionMemory, ExecutionRecord};
use crate::graph::{Graph, Node, NodeType};
use crate::validation::ValidationError;
use crate::LLMError;

pub use agent::{AgentHandler, DEFAULT_AGENT_MAX_STEPS};
pub use end::EndHandler;
pub use if_else::IfElseHandler;
pub use note::NoteHandler;
pub use registry::NodeRegistry;
pub use start::StartHandler;
pub use wait::WaitHandler;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("{handler} handler cannot execute node of type {found}")]
    KindMismatch { handler: NodeType, found: NodeType },
    #[error("node {node_id} of type {node_type} cannot be executed")]
    NotExecutable { node_id: String, node_type: NodeType },
    #[error("no completion provider configured for agent node {node_id}")]
    ProviderMissing { node_id: String },
    #[error(transparent)]
    Provider(#[from] LLMError),
    #[error("agent node {node_id} was still calling tools after {steps} step(s)")]
    ToolBudgetExhausted { node_id: String, steps: u32 },
}

/// Read-only view handed to node validators.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub graph: &'a Graph,
}

impl<'a> ValidationContext<'a> {
    pub fn new(graph: &'a Graph) -> Self {
        Self { graph }
    }

    pub fn incoming_count(&self, node_id: &str) -> usize {
        self.graph.incoming(node_id).count()
    }

    pub fn outgoing_count(&self, node_id: &str) -> usize {
        self.graph.outgoing(node_id).count()
    }
}

/// Everything a handler may read or touch while its node runs.
pub struct ExecutionContext<'a> {
    pub node: &'a Node,
    pub graph: &'a Graph,
    pub memory: &'a ExecutionMemory,
    pub conversation: &'a mut Conversation,
    pub previous_node_id: &'a str,
    pub events: &'a dyn EventSink,
}

impl ExecutionContext<'_> {
    /// Result of the node that ran right before this one.
    pub fn previous(&self) -> Option<&ExecutionRecord> {
        self.memory.get(self.previous_node_id)
    }

    /// Target of the first edge leaving this node.
    pub fn next_node(&self) -> Option<String> {
        self.graph
            .outgoing(&self.node.id)
            .next()
            .map(|edge| edge.target.clone())
    }

    pub fn next_node_from(&self, handle: &str) -> Option<String> {
        self.graph
            .edge_from_handle(&self.node.id, handle)
            .map(|edge| edge.target.clone())
    }

    pub fn emit(&self, event: ExecutionEvent) {
        self.events.emit(event);
    }

    /// Emits a `node-execution-state` snapshot of `data`.
    pub fn emit_state(&self, data: Value) {
        self.emit(ExecutionEvent::state(self.node, data));
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeResult {
    pub text: String,
    pub structured: Option<Value>,
}

impl NodeResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            structured: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeExecutionResult {
    pub result: NodeResult,
    /// `None` ends the run.
    pub next_node_id: Option<String>,
}

#[async_trait]
pub trait NodeHandler: Send + Sync {
    fn node_type(&self) -> NodeType;

    /// JSON Schema of the node's `data` object.
    fn data_schema(&self) -> Value;

    fn validate(&self, node: &Node, context: &ValidationContext<'_>) -> Vec<ValidationError>;

    async fn execute(&self, context: ExecutionContext<'_>) -> Result<NodeExecutionResult, NodeError>;
}

/// Checks that a node has exactly one connection in one direction.
pub(crate) fn expect_single(
    node_id: &str,
    found: usize,
    missing: &str,
    too_many: impl FnOnce(usize) -> String,
) -> Option<ValidationError> {
    match found {
        0 => Some(ValidationError::node_config(node_id, missing)),
        1 => None,
        n => Some(ValidationError::node_config(node_id, too_many(n))),
    }
}

pub(crate) fn kind_mismatch(handler: NodeType, node: &Node) -> NodeError {
    NodeError::KindMismatch {
        handler,
        found: node.node_type(),
    }
}
