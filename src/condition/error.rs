use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConditionError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("Unknown variable: {name}")]
    UnknownVariable { name: String },

    #[error("No such key: {key}")]
    NoSuchKey { key: String, path: Option<String> },

    #[error("found no matching overload for '{operator}' applied to ({operands})")]
    NoMatchingOverload { operator: String, operands: String },

    #[error("type error: {0}")]
    Type(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("invalid regular expression '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("condition must produce a bool, found {found}")]
    NotBoolean { found: String },

    #[error("evaluation error: {0}")]
    Evaluation(String),
}

impl ConditionError {
    pub(crate) fn syntax(offset: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            offset,
            message: message.into(),
        }
    }

    pub(crate) fn overload(operator: &str, operands: &[&dyn std::fmt::Display]) -> Self {
        let operands = operands
            .iter()
            .map(|operand| operand.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Self::NoMatchingOverload {
            operator: operator.to_string(),
            operands,
        }
    }
}
