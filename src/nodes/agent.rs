use std::sync::Arc;

use async_trait::async_trait;
use jsonschema::{Draft, JSONSchema};
use serde_json::Value;
use tracing::{debug, warn};

use super::{
    expect_single, kind_mismatch, ExecutionContext, NodeError, NodeExecutionResult, NodeHandler,
    NodeResult, ValidationContext,
};
use crate::events::ExecutionEvent;
use crate::functions::{json_schema_for, FunctionRegistry, ToolChoice};
use crate::graph::{AgentData, Node, NodeKind, NodeType, OutputMode};
use crate::providers::LLMProvider;
use crate::schema::{convert_schema_to_typed_declarations, SchemaError};
use crate::types::{ChatMessage, CompletionRequest};
use crate::validation::ValidationError;
use crate::LLMError;

pub const DEFAULT_AGENT_MAX_STEPS: u32 = 5;

/// Calls the completion provider with the node's prompt, tools and the shared conversation.
pub struct AgentHandler {
    provider: Option<Arc<dyn LLMProvider>>,
    tools: FunctionRegistry,
    default_max_steps: u32,
}

impl AgentHandler {
    pub fn new() -> Self {
        Self {
            provider: None,
            tools: FunctionRegistry::new(),
            default_max_steps: DEFAULT_AGENT_MAX_STEPS,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_tools(mut self, tools: FunctionRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Step budget for nodes that do not set `maxSteps`.
    pub fn with_default_max_steps(mut self, steps: u32) -> Self {
        self.default_max_steps = steps;
        self
    }

    pub fn tools(&self) -> &FunctionRegistry {
        &self.tools
    }

    fn validate_schema(node: &Node, schema: &Value, errors: &mut Vec<ValidationError>) {
        if let Err(error) = JSONSchema::options().with_draft(Draft::Draft7).compile(schema) {
            errors.push(ValidationError::node_config(
                &node.id,
                format!("Agent output schema is not a valid JSON Schema: {error}"),
            ));
        }
        if let Err(error @ SchemaError::TooDeep { .. }) = convert_schema_to_typed_declarations(schema, "input") {
            errors.push(ValidationError::node_config(
                &node.id,
                format!("Agent output schema is too deeply nested: {error}"),
            ));
        }
    }
}

impl Default for AgentHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn tool_output(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

fn extract_json_from_fenced_block(content: &str) -> Option<&str> {
    let start = content.find("```json").or_else(|| content.find("```"))?;
    let remainder = &content[start..];
    let after_language = remainder.find('\n')?;
    let body = &remainder[after_language + 1..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

/// Parses structured output, tolerating a fenced code block around the JSON.
fn parse_structured(node_id: &str, text: &str, schema: &Value) -> Option<Value> {
    let parsed = serde_json::from_str::<Value>(text.trim()).or_else(|error| {
        extract_json_from_fenced_block(text)
            .and_then(|body| serde_json::from_str(body).ok())
            .ok_or(error)
    });

    let value = match parsed {
        Ok(value) => value,
        Err(error) => {
            warn!(node_id, %error, "failed to parse structured output");
            return None;
        }
    };

    match JSONSchema::options().with_draft(Draft::Draft7).compile(schema) {
        Ok(compiled) => {
            if let Err(violations) = compiled.validate(&value) {
                for violation in violations.take(5) {
                    warn!(node_id, %violation, "structured output violates schema");
                }
            }
        }
        Err(error) => warn!(node_id, %error, "output schema does not compile"),
    }

    Some(value)
}

#[async_trait]
impl NodeHandler for AgentHandler {
    fn node_type(&self) -> NodeType {
        NodeType::Agent
    }

    fn data_schema(&self) -> Value {
        json_schema_for::<AgentData>()
    }

    fn validate(&self, node: &Node, context: &ValidationContext<'_>) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        errors.extend(expect_single(
            &node.id,
            context.outgoing_count(&node.id),
            "Agent node must have one outgoing connection",
            |found| format!("Agent node can only have one outgoing connection (found {found})"),
        ));

        let NodeKind::Agent { data } = &node.kind else {
            return errors;
        };

        if data.model.trim().is_empty() {
            errors.push(ValidationError::node_config(&node.id, "Agent node must specify a model"));
        }

        match &data.source_type {
            OutputMode::Structured { schema: None } => errors.push(ValidationError::node_config(
                &node.id,
                "Agent node with structured output must have a schema",
            )),
            OutputMode::Structured { schema: Some(schema) } => {
                Self::validate_schema(node, schema, &mut errors)
            }
            OutputMode::Text => {}
        }

        errors
    }

    async fn execute(&self, context: ExecutionContext<'_>) -> Result<NodeExecutionResult, NodeError> {
        let node = context.node;
        let NodeKind::Agent { data } = &node.kind else {
            return Err(kind_mismatch(NodeType::Agent, node));
        };
        let provider = self.provider.as_ref().ok_or_else(|| NodeError::ProviderMissing {
            node_id: node.id.clone(),
        })?;

        let (tools, unknown) = self.tools.subset(&data.selected_tools);
        for tool in unknown {
            warn!(node_id = %node.id, tool = %tool, "unknown tool skipped");
        }

        let max_steps = data.max_steps.unwrap_or(self.default_max_steps).max(1);
        let mut messages = Vec::with_capacity(context.conversation.len() + 1);
        if !data.system_prompt.trim().is_empty() {
            messages.push(ChatMessage::system(data.system_prompt.clone()));
        }
        messages.extend(context.conversation.messages().iter().cloned());

        let mut turns = Vec::new();
        let mut text = None;

        for step in 0..max_steps {
            let mut request = CompletionRequest::new(data.model.clone(), messages.clone());
            if !tools.is_empty() {
                let choice = if step + 1 == max_steps {
                    ToolChoice::None
                } else {
                    ToolChoice::Auto
                };
                request = request.with_function_registry(&tools).with_tool_choice(choice);
            }
            if let Some(schema) = data.output_schema() {
                request = request.with_json_schema(&node.id, schema);
            }

            debug!(node_id = %node.id, step, provider = provider.name(), "requesting completion");
            let response = provider.complete(request).await?;
            let message = response.message;
            messages.push(message.clone());
            turns.push(message.clone());

            if message.tool_calls.is_empty() {
                let content = message
                    .text()
                    .ok_or(LLMError::InvalidResponse("completion had neither content nor tool calls"))?;
                text = Some(content.to_string());
                break;
            }

            for call in &message.tool_calls {
                let output = match tools.invoke(call).await {
                    Ok(value) => tool_output(value),
                    Err(error) => {
                        warn!(node_id = %node.id, tool = %call.name, %error, "tool call failed");
                        format!("error: {error}")
                    }
                };
                let reply = ChatMessage::tool(call.id.clone(), output);
                messages.push(reply.clone());
                turns.push(reply);
            }
        }

        let text = text.ok_or_else(|| NodeError::ToolBudgetExhausted {
            node_id: node.id.clone(),
            steps: max_steps,
        })?;

        let structured = data
            .output_schema()
            .and_then(|schema| parse_structured(&node.id, &text, schema));

        if !data.hide_response_in_chat && !text.is_empty() {
            context.emit(ExecutionEvent::AgentResponse {
                node_id: node.id.clone(),
                text: text.clone(),
            });
        }
        if !data.exclude_from_conversation {
            context.conversation.extend(turns);
        }
        context.emit_state(node.data_value());

        Ok(NodeExecutionResult {
            result: NodeResult { text, structured },
            next_node_id: context.next_node(),
        })
    }
}
