use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::{
    kind_mismatch, ExecutionContext, NodeError, NodeExecutionResult, NodeHandler, NodeResult,
    ValidationContext,
};
use crate::condition::{default_engine, ConditionEngine, ConditionError, TypeEnv};
use crate::functions::json_schema_for;
use crate::graph::{BranchHandle, IfElseData, Node, NodeKind, NodeType, ELSE_HANDLE};
use crate::schema::{
    are_schemas_identical, convert_schema_to_typed_declarations, get_potential_input_schemas,
    InputSource,
};
use crate::validation::{ValidationError, ValidationErrorKind};

const DIVERGENT_SCHEMAS: &str = "Multiple input paths with different schemas detected. Conditions must be valid for all converging paths. Ensure all paths have compatible schemas.";

/// Routes to the first branch whose condition holds, else to `output-else`.
pub struct IfElseHandler {
    engine: Arc<dyn ConditionEngine>,
}

impl IfElseHandler {
    pub fn new(engine: Arc<dyn ConditionEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &dyn ConditionEngine {
        self.engine.as_ref()
    }

    fn check_syntax(&self, node: &Node, handle: &BranchHandle) -> Option<ValidationError> {
        let error = self.engine.check(&handle.condition, &TypeEnv::untyped()).err()?;
        Some(invalid_condition(
            node,
            handle,
            "Invalid condition expression syntax".to_string(),
            error.to_string(),
        ))
    }

    fn check_against(
        &self,
        node: &Node,
        handle: &BranchHandle,
        source: &InputSource,
    ) -> Option<ValidationError> {
        let name = source.label();
        let detail = match &source.schema {
            Some(schema) => match convert_schema_to_typed_declarations(schema, "input") {
                Ok(declarations) => self
                    .engine
                    .check(&handle.condition, &TypeEnv::from_declarations(&declarations))
                    .err()
                    .map(|error| describe_failure(error, name)),
                Err(error) => Some(error.to_string()),
            },
            None => self
                .engine
                .check(&handle.condition, &TypeEnv::text_input())
                .err()
                .map(|error| describe_failure(error, name)),
        }?;

        Some(invalid_condition(
            node,
            handle,
            format!("Expression failed validation for input from '{name}': {detail}"),
            detail,
        ))
    }

    fn select_branch(&self, data: &IfElseData, input: &Value, context: &ExecutionContext<'_>) -> Option<(String, String)> {
        for handle in &data.dynamic_source_handles {
            if handle.condition.trim().is_empty() {
                continue;
            }
            match self.engine.evaluate(&handle.condition, input) {
                Ok(Value::Bool(true)) => {
                    if let Some(next) = context.next_node_from(&handle.id) {
                        return Some((handle.id.clone(), next));
                    }
                }
                Ok(_) => {}
                Err(error) => {
                    debug!(node_id = %context.node.id, handle = %handle.id, %error, "condition treated as no match");
                }
            }
        }

        context
            .next_node_from(ELSE_HANDLE)
            .map(|next| (ELSE_HANDLE.to_string(), next))
    }
}

impl Default for IfElseHandler {
    fn default() -> Self {
        Self::new(default_engine())
    }
}

fn invalid_condition(node: &Node, handle: &BranchHandle, message: String, error: String) -> ValidationError {
    ValidationError::error(
        ValidationErrorKind::InvalidCondition {
            node_id: node.id.clone(),
            handle_id: handle.id.clone(),
            condition: handle.condition.clone(),
            error,
        },
        message,
    )
}

/// Rewrites lookup failures so they name the field and the upstream source.
fn describe_failure(error: ConditionError, source_name: &str) -> String {
    match error {
        ConditionError::NoSuchKey { key, path } => {
            let field = path.unwrap_or_else(|| format!("input.{key}"));
            format!(
                "Field '{field}' not found in schema from '{source_name}'. Ensure all converging paths have compatible schemas."
            )
        }
        ConditionError::UnknownVariable { name } => format!(
            "Variable '{name}' not found in schema from '{source_name}'. Ensure all converging paths have compatible schemas."
        ),
        other => other.to_string(),
    }
}

#[async_trait]
impl NodeHandler for IfElseHandler {
    fn node_type(&self) -> NodeType {
        NodeType::IfElse
    }

    fn data_schema(&self) -> Value {
        json_schema_for::<IfElseData>()
    }

    fn validate(&self, node: &Node, context: &ValidationContext<'_>) -> Vec<ValidationError> {
        let NodeKind::IfElse { data } = &node.kind else {
            return Vec::new();
        };
        let graph = context.graph;
        let mut errors = Vec::new();

        if context.outgoing_count(&node.id) == 0 {
            errors.push(ValidationError::node_config(
                &node.id,
                "If-else node must have at least one outgoing connection",
            ));
        }

        let sources = get_potential_input_schemas(&node.id, graph);
        let schemas: Vec<&Value> = sources.iter().filter_map(|source| source.schema.as_ref()).collect();
        if sources.len() > 1 && schemas.len() > 1 && !are_schemas_identical(&schemas) {
            errors.push(ValidationError::warning(
                ValidationErrorKind::InvalidNodeConfig {
                    node_id: node.id.clone(),
                },
                DIVERGENT_SCHEMAS,
            ));
        }

        let has_input = graph.input_edges(&node.id).next().is_some();

        for handle in &data.dynamic_source_handles {
            let condition = handle.condition.trim();
            let connected = graph.edge_from_handle(&node.id, &handle.id).is_some();

            if condition.is_empty() {
                if connected {
                    let label = handle.display_label();
                    errors.push(ValidationError::node_config(
                        &node.id,
                        format!("If-else condition \"{label}\" has a connection but no condition expression"),
                    ));
                }
                continue;
            }

            if !has_input || sources.is_empty() {
                errors.extend(self.check_syntax(node, handle));
                continue;
            }

            for source in &sources {
                errors.extend(self.check_against(node, handle, source));
            }
        }

        errors
    }

    async fn execute(&self, context: ExecutionContext<'_>) -> Result<NodeExecutionResult, NodeError> {
        let NodeKind::IfElse { data } = &context.node.kind else {
            return Err(kind_mismatch(NodeType::IfElse, context.node));
        };

        let (result, selected) = match context.previous() {
            Some(previous) => {
                let input = previous.payload();
                let result = NodeResult {
                    text: previous.text.clone(),
                    structured: previous.structured.clone(),
                };
                (result, self.select_branch(data, &input, &context))
            }
            None => {
                warn!(node_id = %context.node.id, previous = %context.previous_node_id, "no upstream result to route on");
                (NodeResult::default(), None)
            }
        };

        let mut snapshot = context.node.data_value();
        if let Value::Object(map) = &mut snapshot {
            let handle = selected.as_ref().map(|(handle, _)| Value::String(handle.clone()));
            map.insert("selectedHandle".to_string(), handle.unwrap_or(Value::Null));
        }
        context.emit_state(snapshot);

        debug!(
            node_id = %context.node.id,
            handle = selected.as_ref().map(|(handle, _)| handle.as_str()).unwrap_or("none"),
            "branch selected"
        );

        Ok(NodeExecutionResult {
            result,
            next_node_id: selected.map(|(_, next)| next),
        })
    }
}
