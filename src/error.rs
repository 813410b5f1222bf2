use thiserror::Error;

/// Failures at the completion boundary an agent node talks to.
#[derive(Debug, Error)]
pub enum LLMError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("invalid response from provider: {0}")]
    InvalidResponse(&'static str),

    #[error("scripted provider ran out of responses (request for model '{model}')")]
    ScriptExhausted { model: String },

    #[error("unknown tool: {0}")]
    UnknownFunction(String),

    #[error("invalid tool arguments: {0}")]
    InvalidFunctionArguments(String),

    #[error("tool execution failed ({function}): {message}")]
    FunctionExecution { function: String, message: String },
}

impl LLMError {
    pub fn tool_failure(function: impl Into<String>, message: impl ToString) -> Self {
        Self::FunctionExecution {
            function: function.into(),
            message: message.to_string(),
        }
    }
}
