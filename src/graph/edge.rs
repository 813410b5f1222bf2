use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const INPUT_HANDLE: &str = "input";
pub const OUTPUT_HANDLE: &str = "output";
/// Reserved if-else handle followed when no branch matches.
pub const ELSE_HANDLE: &str = "output-else";

fn default_source_handle() -> String {
    OUTPUT_HANDLE.to_string()
}

fn default_target_handle() -> String {
    INPUT_HANDLE.to_string()
}

/// Directed connection from one node's source handle to another node's target handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source: String,
    #[serde(default = "default_source_handle")]
    pub source_handle: String,
    pub target: String,
    #[serde(default = "default_target_handle")]
    pub target_handle: String,
}

impl Edge {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            source_handle: default_source_handle(),
            target: target.into(),
            target_handle: default_target_handle(),
        }
    }

    pub fn from_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = handle.into();
        self
    }

    pub fn to_handle(mut self, handle: impl Into<String>) -> Self {
        self.target_handle = handle.into();
        self
    }

    pub fn feeds_input(&self) -> bool {
        self.target_handle == INPUT_HANDLE
    }
}
