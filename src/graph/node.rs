use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Discriminant of [`NodeKind`], used for registry lookups and event payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum NodeType {
    Start,
    End,
    Agent,
    IfElse,
    Wait,
    Note,
}

impl NodeType {
    pub const ALL: [NodeType; 6] = [
        NodeType::Start,
        NodeType::End,
        NodeType::Agent,
        NodeType::IfElse,
        NodeType::Wait,
        NodeType::Note,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Start => "start",
            NodeType::End => "end",
            NodeType::Agent => "agent",
            NodeType::IfElse => "if-else",
            NodeType::Wait => "wait",
            NodeType::Note => "note",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Node {
    pub id: String,
    #[serde(flatten)]
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum NodeKind {
    Start {
        #[serde(default)]
        data: StartData,
    },
    End {
        #[serde(default)]
        data: EndData,
    },
    Agent { data: AgentData },
    IfElse { data: IfElseData },
    Wait { data: WaitData },
    Note {
        #[serde(default)]
        data: NoteData,
    },
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self { id: id.into(), kind }
    }

    pub fn start(id: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Start { data: StartData::default() })
    }

    pub fn end(id: impl Into<String>) -> Self {
        Self::new(id, NodeKind::End { data: EndData::default() })
    }

    pub fn agent(id: impl Into<String>, data: AgentData) -> Self {
        Self::new(id, NodeKind::Agent { data })
    }

    pub fn if_else(id: impl Into<String>, branches: Vec<BranchHandle>) -> Self {
        Self::new(
            id,
            NodeKind::IfElse {
                data: IfElseData {
                    dynamic_source_handles: branches,
                },
            },
        )
    }

    pub fn wait(id: impl Into<String>, duration: u64, unit: WaitUnit) -> Self {
        Self::new(id, NodeKind::Wait { data: WaitData { duration, unit } })
    }

    pub fn note(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(
            id,
            NodeKind::Note {
                data: NoteData {
                    content: content.into(),
                },
            },
        )
    }

    pub fn node_type(&self) -> NodeType {
        match &self.kind {
            NodeKind::Start { .. } => NodeType::Start,
            NodeKind::End { .. } => NodeType::End,
            NodeKind::Agent { .. } => NodeType::Agent,
            NodeKind::IfElse { .. } => NodeType::IfElse,
            NodeKind::Wait { .. } => NodeType::Wait,
            NodeKind::Note { .. } => NodeType::Note,
        }
    }

    /// Agent nodes are shown by their configured name, everything else by id.
    pub fn display_name(&self) -> &str {
        match &self.kind {
            NodeKind::Agent { data } if !data.name.trim().is_empty() => &data.name,
            _ => &self.id,
        }
    }

    pub fn data_value(&self) -> Value {
        let data = match &self.kind {
            NodeKind::Start { data } => serde_json::to_value(data),
            NodeKind::End { data } => serde_json::to_value(data),
            NodeKind::Agent { data } => serde_json::to_value(data),
            NodeKind::IfElse { data } => serde_json::to_value(data),
            NodeKind::Wait { data } => serde_json::to_value(data),
            NodeKind::Note { data } => serde_json::to_value(data),
        };
        data.unwrap_or(Value::Null)
    }

    pub fn as_agent(&self) -> Option<&AgentData> {
        match &self.kind {
            NodeKind::Agent { data } => Some(data),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StartData {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EndData {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NoteData {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgentData {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selected_tools: Vec<String>,
    #[serde(default)]
    pub source_type: OutputMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u32>,
    #[serde(default)]
    pub hide_response_in_chat: bool,
    #[serde(default)]
    pub exclude_from_conversation: bool,
}

impl AgentData {
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            system_prompt: String::new(),
            selected_tools: Vec::new(),
            source_type: OutputMode::Text,
            max_steps: None,
            hide_response_in_chat: false,
            exclude_from_conversation: false,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn structured(mut self, schema: Value) -> Self {
        self.source_type = OutputMode::Structured {
            schema: Some(schema),
        };
        self
    }

    pub fn with_max_steps(mut self, steps: u32) -> Self {
        self.max_steps = Some(steps);
        self
    }

    pub fn excluded_from_conversation(mut self) -> Self {
        self.exclude_from_conversation = true;
        self
    }

    pub fn hidden_from_chat(mut self) -> Self {
        self.hide_response_in_chat = true;
        self
    }

    /// The declared output schema, if the agent produces structured output.
    pub fn output_schema(&self) -> Option<&Value> {
        match &self.source_type {
            OutputMode::Structured { schema } => schema.as_ref(),
            OutputMode::Text => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutputMode {
    #[default]
    Text,
    Structured {
        #[serde(default)]
        schema: Option<Value>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IfElseData {
    #[serde(default)]
    pub dynamic_source_handles: Vec<BranchHandle>,
}

/// A named conditional output of an if-else node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BranchHandle {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub condition: String,
}

impl BranchHandle {
    pub fn new(id: impl Into<String>, condition: impl Into<String>) -> Self {
        let id = id.into();
        let label = id.trim_start_matches("output-").to_string();
        Self {
            id,
            label: Some(label),
            condition: condition.into(),
        }
    }

    /// The editor label, or the handle id when the branch is unlabelled.
    pub fn display_label(&self) -> &str {
        match self.label.as_deref() {
            Some(label) if !label.is_empty() => label,
            _ => &self.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WaitData {
    pub duration: u64,
    pub unit: WaitUnit,
}

impl WaitData {
    pub fn delay_ms(&self) -> u64 {
        self.duration.saturating_mul(self.unit.millis())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum WaitUnit {
    Seconds,
    Minutes,
    Hours,
}

impl WaitUnit {
    pub fn millis(self) -> u64 {
        match self {
            WaitUnit::Seconds => 1_000,
            WaitUnit::Minutes => 60_000,
            WaitUnit::Hours => 3_600_000,
        }
    }

    /// Largest duration accepted for this unit.
    pub fn max_duration(self) -> u64 {
        match self {
            WaitUnit::Seconds => 3600,
            WaitUnit::Minutes => 60,
            WaitUnit::Hours => 24,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WaitUnit::Seconds => "seconds",
            WaitUnit::Minutes => "minutes",
            WaitUnit::Hours => "hours",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_editor_export() {
        let node: Node = serde_json::from_value(json!({
            "id": "router",
            "type": "if-else",
            "position": { "x": 10.0, "y": 20.0 },
            "data": {
                "status": "idle",
                "dynamicSourceHandles": [
                    { "id": "output-urgent", "label": "Urgent", "condition": "input.category == 'urgent'" }
                ]
            }
        }))
        .unwrap();

        assert_eq!(node.node_type(), NodeType::IfElse);
        match node.kind {
            NodeKind::IfElse { data } => {
                assert_eq!(data.dynamic_source_handles[0].id, "output-urgent");
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn start_and_end_accept_missing_data() {
        let node: Node = serde_json::from_value(json!({ "id": "s", "type": "start" })).unwrap();
        assert_eq!(node.node_type(), NodeType::Start);
    }

    #[test]
    fn agent_display_name_falls_back_to_id() {
        let named = Node::agent("a1", AgentData::new("Classifier", "gpt-4o-mini"));
        let unnamed = Node::agent("a2", AgentData::new("  ", "gpt-4o-mini"));
        assert_eq!(named.display_name(), "Classifier");
        assert_eq!(unnamed.display_name(), "a2");
    }

    #[test]
    fn wait_delay_scales_with_unit() {
        let data = WaitData {
            duration: 2,
            unit: WaitUnit::Minutes,
        };
        assert_eq!(data.delay_ms(), 120_000);
    }
}
