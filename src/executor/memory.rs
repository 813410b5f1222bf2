use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::graph::NodeType;
use crate::types::ChatMessage;

/// What a node produced, as recorded after it ran.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured: Option<Value>,
    pub node_type: NodeType,
    /// Conversation as it stood right after the node finished.
    pub messages: Vec<ChatMessage>,
}

impl ExecutionRecord {
    /// Value downstream conditions see: the structured payload, else the text.
    pub fn payload(&self) -> Value {
        match &self.structured {
            Some(structured) => structured.clone(),
            None => Value::String(self.text.clone()),
        }
    }
}

/// Per-run results keyed by node id.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ExecutionMemory {
    records: HashMap<String, ExecutionRecord>,
}

impl ExecutionMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the latest result of `node_id`, returning the one it replaces.
    pub fn record(&mut self, node_id: impl Into<String>, record: ExecutionRecord) -> Option<ExecutionRecord> {
        self.records.insert(node_id.into(), record)
    }

    pub fn get(&self, node_id: &str) -> Option<&ExecutionRecord> {
        self.records.get(node_id)
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.records.contains_key(node_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
