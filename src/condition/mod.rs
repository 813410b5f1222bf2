//! Branch condition language.
//!
//! Validation and execution only talk to [`ConditionEngine`]; [`CelEngine`] is the
//! default, [`EvalexprEngine`] an alternative with evalexpr syntax.

mod ast;
mod checker;
mod error;
mod eval;
mod evalexpr_engine;
mod lexer;
mod parser;
mod types;

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde_json::Value;

pub use ast::{BinaryOp, Expr, Literal, UnaryOp};
pub use error::ConditionError;
pub use evalexpr_engine::EvalexprEngine;
pub use parser::{parse, MAX_NESTING};
pub use types::{CelType, TypeEnv};

pub trait ConditionEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Static check of `expression` against `env`. No side effects.
    fn check(&self, expression: &str, env: &TypeEnv) -> Result<(), ConditionError>;

    /// Evaluates `expression` with `input` bound to the runtime payload.
    fn evaluate(&self, expression: &str, input: &Value) -> Result<Value, ConditionError>;
}

/// CEL-style conditions: `input.category == 'urgent' || size(input.tags) > 2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CelEngine;

impl CelEngine {
    pub fn new() -> Self {
        Self
    }
}

impl ConditionEngine for CelEngine {
    fn name(&self) -> &'static str {
        "cel"
    }

    fn check(&self, expression: &str, env: &TypeEnv) -> Result<(), ConditionError> {
        let expr = parse(expression)?;
        let result = checker::check(&expr, env)?;
        if result.is_bool_like() {
            Ok(())
        } else {
            Err(ConditionError::NotBoolean {
                found: result.to_string(),
            })
        }
    }

    fn evaluate(&self, expression: &str, input: &Value) -> Result<Value, ConditionError> {
        let expr = parse(expression)?;
        let bindings = HashMap::from([("input".to_string(), input.clone())]);
        eval::evaluate(&expr, &bindings)
    }
}

static DEFAULT_ENGINE: Lazy<Arc<dyn ConditionEngine>> = Lazy::new(|| Arc::new(CelEngine::new()));

/// Process-wide engine shared by the built-in if-else handler.
pub fn default_engine() -> Arc<dyn ConditionEngine> {
    DEFAULT_ENGINE.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn check_requires_boolean_result() {
        let engine = CelEngine::new();
        let env = TypeEnv::text_input();
        assert!(engine.check("input == 'hi'", &env).is_ok());
        assert_eq!(
            engine.check("size(input)", &env),
            Err(ConditionError::NotBoolean { found: "int".into() })
        );
    }

    #[test]
    fn evaluate_binds_input() {
        let engine = default_engine();
        assert_eq!(engine.name(), "cel");
        let result = engine.evaluate("input.n + 1 == 3", &json!({ "n": 2 }));
        assert_eq!(result, Ok(Value::Bool(true)));
    }
}
