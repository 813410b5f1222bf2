use evalexpr::{
    build_operator_tree, ContextWithMutableVariables, EvalexprError, HashMapContext, Node,
    Value as ExprValue,
};
use serde_json::{Number, Value};

use super::error::ConditionError;
use super::types::TypeEnv;
use super::ConditionEngine;

/// Conditions in evalexpr syntax, e.g. `input.category == "urgent" && input.score > 0.5`.
///
/// Payloads are flattened into dotted variables (`input.user.email`); arrays become tuples.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvalexprEngine;

impl EvalexprEngine {
    pub fn new() -> Self {
        Self
    }
}

fn convert_error(error: EvalexprError) -> ConditionError {
    match error {
        EvalexprError::VariableIdentifierNotFound(name) => ConditionError::UnknownVariable { name },
        EvalexprError::FunctionIdentifierNotFound(name) => ConditionError::UnknownFunction(name),
        EvalexprError::DivisionError { .. } => ConditionError::DivisionByZero,
        other => ConditionError::Evaluation(other.to_string()),
    }
}

fn parse_tree(expression: &str) -> Result<Node, ConditionError> {
    build_operator_tree(expression).map_err(|error| ConditionError::Syntax {
        offset: 0,
        message: error.to_string(),
    })
}

fn to_expr_value(value: &Value) -> ExprValue {
    match value {
        Value::Null => ExprValue::Empty,
        Value::Bool(flag) => ExprValue::Boolean(*flag),
        Value::Number(number) => match number.as_i64() {
            Some(int) => ExprValue::Int(int),
            None => ExprValue::Float(number.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(text) => ExprValue::String(text.clone()),
        Value::Array(items) => ExprValue::Tuple(items.iter().map(to_expr_value).collect()),
        Value::Object(_) => ExprValue::Empty,
    }
}

fn from_expr_value(value: ExprValue) -> Result<Value, ConditionError> {
    Ok(match value {
        ExprValue::Empty => Value::Null,
        ExprValue::Boolean(flag) => Value::Bool(flag),
        ExprValue::Int(int) => Value::from(int),
        ExprValue::Float(float) => Number::from_f64(float)
            .map(Value::Number)
            .ok_or_else(|| ConditionError::Evaluation("result is not a finite number".into()))?,
        ExprValue::String(text) => Value::String(text),
        ExprValue::Tuple(items) => Value::Array(
            items
                .into_iter()
                .map(from_expr_value)
                .collect::<Result<Vec<_>, _>>()?,
        ),
    })
}

fn bind(context: &mut HashMapContext, path: String, value: &Value) -> Result<(), ConditionError> {
    if let Value::Object(object) = value {
        for (key, nested) in object {
            bind(context, format!("{path}.{key}"), nested)?;
        }
    }
    context
        .set_value(path, to_expr_value(value))
        .map_err(convert_error)
}

impl ConditionEngine for EvalexprEngine {
    fn name(&self) -> &'static str {
        "evalexpr"
    }

    fn check(&self, expression: &str, env: &TypeEnv) -> Result<(), ConditionError> {
        let tree = parse_tree(expression)?;
        if env.is_permissive() {
            return Ok(());
        }

        let declared = env.variable_paths();
        for identifier in tree.iter_variable_identifiers() {
            if declared.contains(identifier) {
                continue;
            }
            return Err(match identifier.rsplit_once('.') {
                Some((parent, key)) if declared.contains(parent) => ConditionError::NoSuchKey {
                    key: key.to_string(),
                    path: Some(identifier.to_string()),
                },
                _ => ConditionError::UnknownVariable {
                    name: identifier.to_string(),
                },
            });
        }
        Ok(())
    }

    fn evaluate(&self, expression: &str, input: &Value) -> Result<Value, ConditionError> {
        let tree = parse_tree(expression)?;
        let mut context = HashMapContext::new();
        bind(&mut context, "input".to_string(), input)?;
        let value = tree.eval_with_context(&context).map_err(convert_error)?;
        from_expr_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::convert_schema_to_typed_declarations;
    use serde_json::json;

    fn env() -> TypeEnv {
        let schema = json!({
            "type": "object",
            "properties": {
                "category": { "type": "string" },
                "user": { "type": "object", "properties": { "email": { "type": "string" } } }
            }
        });
        TypeEnv::from_declarations(&convert_schema_to_typed_declarations(&schema, "input").unwrap())
    }

    #[test]
    fn checks_declared_paths() {
        let engine = EvalexprEngine::new();
        assert!(engine.check("input.category == \"urgent\"", &env()).is_ok());
        assert_eq!(
            engine.check("input.user.phone == \"1\"", &env()),
            Err(ConditionError::NoSuchKey {
                key: "phone".into(),
                path: Some("input.user.phone".into()),
            })
        );
        assert!(matches!(
            engine.check("ticket == 1", &env()),
            Err(ConditionError::UnknownVariable { .. })
        ));
        assert!(engine.check("anything > 1", &TypeEnv::untyped()).is_ok());
    }

    #[test]
    fn evaluates_flattened_payload() {
        let engine = EvalexprEngine::new();
        let payload = json!({ "category": "urgent", "user": { "email": "a@b.c" }, "score": 3 });
        assert_eq!(
            engine.evaluate("input.category == \"urgent\" && input.score > 2", &payload),
            Ok(Value::Bool(true))
        );
        assert_eq!(engine.evaluate("input == \"hi\"", &json!("hi")), Ok(Value::Bool(true)));
    }
}
