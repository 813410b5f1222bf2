use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::LLMError;

/// Callable description handed to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

impl FunctionDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            parameters: json!({ "type": "object", "properties": {} }),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionDefinition,
}

impl From<FunctionDefinition> for Tool {
    fn from(function: FunctionDefinition) -> Self {
        Self {
            kind: "function".to_string(),
            function,
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    Auto,
    None,
}

#[async_trait]
pub trait KernelFunction: Send + Sync {
    fn definition(&self) -> FunctionDefinition;

    async fn invoke(&self, arguments: &Value) -> Result<Value, LLMError>;
}

pub type DynKernelFunction = Arc<dyn KernelFunction>;

/// Tools available to agent nodes, keyed by name.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, DynKernelFunction>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, function: DynKernelFunction) {
        let name = function.definition().name;
        self.functions.insert(name, function);
    }

    pub fn get(&self, name: &str) -> Option<&DynKernelFunction> {
        self.functions.get(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn tools(&self) -> Vec<Tool> {
        self.functions
            .values()
            .map(|function| Tool::from(function.definition()))
            .collect()
    }

    /// Narrows the registry to `names`, returning the names that are not registered.
    pub fn subset<S: AsRef<str>>(&self, names: &[S]) -> (FunctionRegistry, Vec<String>) {
        let mut selected = FunctionRegistry::new();
        let mut missing = Vec::new();
        for name in names {
            let name = name.as_ref();
            match self.functions.get(name) {
                Some(function) => {
                    selected.functions.insert(name.to_string(), function.clone());
                }
                None => missing.push(name.to_string()),
            }
        }
        (selected, missing)
    }

    /// Runs the named tool. Failures other than bad arguments are reported as
    /// [`LLMError::FunctionExecution`].
    pub async fn invoke(&self, call: &ToolCall) -> Result<Value, LLMError> {
        let function = self
            .get(&call.name)
            .ok_or_else(|| LLMError::UnknownFunction(call.name.clone()))?;
        let arguments = normalize_arguments(&call.arguments)?;
        function
            .invoke(&arguments)
            .await
            .map_err(|error| match error {
                LLMError::FunctionExecution { .. } | LLMError::InvalidFunctionArguments(_) => error,
                other => LLMError::tool_failure(&call.name, other),
            })
    }
}

// Providers hand arguments over either as an object or as its JSON-encoded string.
fn normalize_arguments(arguments: &Value) -> Result<Value, LLMError> {
    let arguments = match arguments {
        Value::Null => return Ok(json!({})),
        Value::String(raw) if raw.trim().is_empty() => return Ok(json!({})),
        Value::String(raw) => serde_json::from_str(raw)
            .map_err(|error| LLMError::InvalidFunctionArguments(error.to_string()))?,
        other => other.clone(),
    };
    if arguments.is_object() {
        Ok(arguments)
    } else {
        Err(LLMError::InvalidFunctionArguments(format!(
            "expected an object, got {arguments}"
        )))
    }
}

/// JSON Schema (with definitions) describing `T`.
pub fn json_schema_for<T: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Null)
}
