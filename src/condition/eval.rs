//! Dynamic evaluation of parsed conditions against JSON payloads.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Number, Value};

use super::ast::{BinaryOp, Expr, Literal, UnaryOp};
use super::error::ConditionError;
use crate::schema::json_kind;

const REGEX_CACHE_LIMIT: usize = 256;

static REGEX_CACHE: Lazy<RwLock<HashMap<String, Regex>>> = Lazy::new(|| RwLock::new(HashMap::new()));

/// Compiles `pattern` once per process; later lookups share the compiled regex.
pub(super) fn compiled_regex(pattern: &str) -> Result<Regex, ConditionError> {
    if let Some(regex) = REGEX_CACHE
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .get(pattern)
    {
        return Ok(regex.clone());
    }

    let regex = Regex::new(pattern).map_err(|error| ConditionError::InvalidRegex {
        pattern: pattern.to_string(),
        message: error.to_string(),
    })?;
    let mut cache = REGEX_CACHE.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    // patterns built from runtime data would otherwise grow the cache without bound
    if cache.len() >= REGEX_CACHE_LIMIT {
        cache.clear();
    }
    cache.insert(pattern.to_string(), regex.clone());
    Ok(regex)
}

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Double(f64),
}

impl Num {
    fn of(value: &Value) -> Option<Num> {
        let Value::Number(number) = value else {
            return None;
        };
        number
            .as_i64()
            .map(Num::Int)
            .or_else(|| number.as_f64().map(Num::Double))
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(value) => value as f64,
            Num::Double(value) => value,
        }
    }
}

fn double(value: f64) -> Result<Value, ConditionError> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| ConditionError::Evaluation("result is not a finite number".into()))
}

fn overflow(op: &str) -> ConditionError {
    ConditionError::Evaluation(format!("integer overflow in '{op}'"))
}

pub fn evaluate(expr: &Expr, bindings: &HashMap<String, Value>) -> Result<Value, ConditionError> {
    match expr {
        Expr::Literal(literal) => literal_value(literal),
        Expr::Ident(name) => bindings
            .get(name)
            .cloned()
            .ok_or_else(|| ConditionError::UnknownVariable { name: name.clone() }),
        Expr::Select { operand, field } => {
            let value = evaluate(operand, bindings)?;
            match value {
                Value::Object(mut object) => {
                    object
                        .remove(field)
                        .ok_or_else(|| ConditionError::NoSuchKey {
                            key: field.clone(),
                            path: expr.path(),
                        })
                }
                other => Err(ConditionError::Type(format!(
                    "cannot select '{field}' from {}",
                    json_kind(&other)
                ))),
            }
        }
        Expr::Has { operand, field } => match evaluate(operand, bindings)? {
            Value::Object(object) => Ok(Value::Bool(object.contains_key(field))),
            other => Err(ConditionError::Type(format!(
                "has() needs an object, found {}",
                json_kind(&other)
            ))),
        },
        Expr::Index { operand, index } => {
            let container = evaluate(operand, bindings)?;
            let index = evaluate(index, bindings)?;
            index_value(container, &index, expr)
        }
        Expr::Unary { op, operand } => {
            let value = evaluate(operand, bindings)?;
            match (op, &value) {
                (UnaryOp::Not, Value::Bool(flag)) => Ok(Value::Bool(!flag)),
                (UnaryOp::Negate, _) => match Num::of(&value) {
                    Some(Num::Int(number)) => number
                        .checked_neg()
                        .map(Value::from)
                        .ok_or_else(|| overflow("-_")),
                    Some(Num::Double(number)) => double(-number),
                    None => Err(ConditionError::overload("-_", &[&json_kind(&value)])),
                },
                (UnaryOp::Not, other) => Err(ConditionError::overload("!_", &[&json_kind(other)])),
            }
        }
        Expr::Binary {
            op: BinaryOp::And,
            left,
            right,
        } => logical(BinaryOp::And, left, right, bindings),
        Expr::Binary {
            op: BinaryOp::Or,
            left,
            right,
        } => logical(BinaryOp::Or, left, right, bindings),
        Expr::Binary { op, left, right } => {
            let left = evaluate(left, bindings)?;
            let right = evaluate(right, bindings)?;
            binary(*op, &left, &right)
        }
        Expr::Conditional {
            condition,
            then,
            otherwise,
        } => match evaluate(condition, bindings)? {
            Value::Bool(true) => evaluate(then, bindings),
            Value::Bool(false) => evaluate(otherwise, bindings),
            other => Err(ConditionError::overload("_?_:_", &[&json_kind(&other)])),
        },
        Expr::List(items) => items
            .iter()
            .map(|item| evaluate(item, bindings))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Expr::Map(entries) => {
            let mut object = Map::new();
            for (key, value) in entries {
                let Value::String(key) = evaluate(key, bindings)? else {
                    return Err(ConditionError::Type("map keys must be strings".into()));
                };
                object.insert(key, evaluate(value, bindings)?);
            }
            Ok(Value::Object(object))
        }
        Expr::Call {
            function,
            target,
            args,
        } => {
            let mut values = Vec::with_capacity(args.len() + 1);
            if let Some(target) = target {
                values.push(evaluate(target, bindings)?);
            }
            for arg in args {
                values.push(evaluate(arg, bindings)?);
            }
            call(function, &values)
        }
    }
}

fn literal_value(literal: &Literal) -> Result<Value, ConditionError> {
    Ok(match literal {
        Literal::Null => Value::Null,
        Literal::Bool(flag) => Value::Bool(*flag),
        Literal::Int(number) => Value::from(*number),
        Literal::Double(number) => return double(*number),
        Literal::String(text) => Value::String(text.clone()),
    })
}

fn index_value(container: Value, index: &Value, expr: &Expr) -> Result<Value, ConditionError> {
    match (container, index) {
        (Value::Array(mut items), _) => {
            let position = match Num::of(index) {
                Some(Num::Int(position)) => position,
                _ => return Err(ConditionError::overload("_[_]", &[&"array", &json_kind(index)])),
            };
            let length = items.len();
            usize::try_from(position)
                .ok()
                .filter(|position| *position < length)
                .map(|position| items.swap_remove(position))
                .ok_or_else(|| {
                    ConditionError::Evaluation(format!(
                        "index {position} out of range for list of size {length}"
                    ))
                })
        }
        (Value::Object(mut object), Value::String(key)) => {
            object
                .remove(key)
                .ok_or_else(|| ConditionError::NoSuchKey {
                    key: key.clone(),
                    path: expr.path(),
                })
        }
        (other, _) => Err(ConditionError::overload(
            "_[_]",
            &[&json_kind(&other), &json_kind(index)],
        )),
    }
}

fn logical(
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
    bindings: &HashMap<String, Value>,
) -> Result<Value, ConditionError> {
    // the absorbing value wins even when the other side fails
    let absorbing = op == BinaryOp::Or;
    let left = evaluate(left, bindings);
    if matches!(left, Ok(Value::Bool(flag)) if flag == absorbing) {
        return Ok(Value::Bool(absorbing));
    }
    let right = evaluate(right, bindings);
    if matches!(right, Ok(Value::Bool(flag)) if flag == absorbing) {
        return Ok(Value::Bool(absorbing));
    }

    match (left?, right?) {
        (Value::Bool(_), Value::Bool(_)) => Ok(Value::Bool(!absorbing)),
        (left, right) => Err(ConditionError::overload(
            op.symbol(),
            &[&json_kind(&left), &json_kind(&right)],
        )),
    }
}

/// Equality with int/double normalisation, applied recursively to lists and maps.
pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => match (Num::of(left), Num::of(right)) {
            (Some(Num::Int(a)), Some(Num::Int(b))) => a == b,
            (Some(a), Some(b)) => a.as_f64() == b.as_f64(),
            _ => false,
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, x)| b.get(key).map_or(false, |y| values_equal(x, y)))
        }
        (a, b) => a == b,
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<Ordering, ConditionError> {
    let ordering = match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => match (Num::of(left), Num::of(right)) {
            (Some(Num::Int(a)), Some(Num::Int(b))) => Some(a.cmp(&b)),
            (Some(a), Some(b)) => a.as_f64().partial_cmp(&b.as_f64()),
            _ => None,
        },
    };
    ordering.ok_or_else(|| {
        ConditionError::overload(op.symbol(), &[&json_kind(left), &json_kind(right)])
    })
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ConditionError> {
    let mismatch = || ConditionError::overload(op.symbol(), &[&json_kind(left), &json_kind(right)]);

    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(left, right))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(left, right))),
        BinaryOp::Lt => Ok(Value::Bool(compare(op, left, right)? == Ordering::Less)),
        BinaryOp::Le => Ok(Value::Bool(compare(op, left, right)? != Ordering::Greater)),
        BinaryOp::Gt => Ok(Value::Bool(compare(op, left, right)? == Ordering::Greater)),
        BinaryOp::Ge => Ok(Value::Bool(compare(op, left, right)? != Ordering::Less)),
        BinaryOp::In => match right {
            Value::Array(items) => Ok(Value::Bool(items.iter().any(|item| values_equal(left, item)))),
            Value::Object(object) => match left {
                Value::String(key) => Ok(Value::Bool(object.contains_key(key))),
                _ => Err(mismatch()),
            },
            _ => Err(mismatch()),
        },
        BinaryOp::Add => match (left, right) {
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
            (Value::Array(a), Value::Array(b)) => {
                Ok(Value::Array(a.iter().chain(b.iter()).cloned().collect()))
            }
            _ => arithmetic(op, left, right).ok_or_else(mismatch)?,
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            arithmetic(op, left, right).ok_or_else(mismatch)?
        }
        BinaryOp::And | BinaryOp::Or => Err(mismatch()),
    }
}

/// `None` when the operands are not both numbers.
fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Option<Result<Value, ConditionError>> {
    let (a, b) = (Num::of(left)?, Num::of(right)?);
    let result = match (a, b) {
        (Num::Int(a), Num::Int(b)) => {
            let value = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                BinaryOp::Mul => a.checked_mul(b),
                BinaryOp::Div | BinaryOp::Rem if b == 0 => {
                    return Some(Err(ConditionError::DivisionByZero))
                }
                BinaryOp::Div => a.checked_div(b),
                BinaryOp::Rem => a.checked_rem(b),
                _ => return None,
            };
            value.map(Value::from).ok_or_else(|| overflow(op.symbol()))
        }
        (a, b) => {
            let (a, b) = (a.as_f64(), b.as_f64());
            match op {
                BinaryOp::Add => double(a + b),
                BinaryOp::Sub => double(a - b),
                BinaryOp::Mul => double(a * b),
                BinaryOp::Div if b == 0.0 => Err(ConditionError::DivisionByZero),
                BinaryOp::Div => double(a / b),
                BinaryOp::Rem if b == 0.0 => Err(ConditionError::DivisionByZero),
                BinaryOp::Rem => double(a % b),
                _ => return None,
            }
        }
    };
    Some(result)
}

fn text<'a>(function: &str, value: &'a Value) -> Result<&'a str, ConditionError> {
    value.as_str().ok_or_else(|| {
        ConditionError::overload(function, &[&json_kind(value)])
    })
}

fn call(function: &str, values: &[Value]) -> Result<Value, ConditionError> {
    let expect = |count: usize| {
        if values.len() == count {
            Ok(())
        } else {
            Err(ConditionError::Type(format!(
                "'{function}' expects {count} argument(s), got {}",
                values.len()
            )))
        }
    };

    match function {
        "size" => {
            expect(1)?;
            let size = match &values[0] {
                Value::String(text) => text.chars().count(),
                Value::Array(items) => items.len(),
                Value::Object(object) => object.len(),
                other => return Err(ConditionError::overload("size", &[&json_kind(other)])),
            };
            Ok(Value::from(size as u64))
        }
        "matches" => {
            expect(2)?;
            let subject = text(function, &values[0])?;
            let pattern = text(function, &values[1])?;
            let regex = compiled_regex(pattern)?;
            Ok(Value::Bool(regex.is_match(subject)))
        }
        "contains" | "startsWith" | "endsWith" => {
            expect(2)?;
            let subject = text(function, &values[0])?;
            let needle = text(function, &values[1])?;
            Ok(Value::Bool(match function {
                "contains" => subject.contains(needle),
                "startsWith" => subject.starts_with(needle),
                _ => subject.ends_with(needle),
            }))
        }
        "int" => {
            expect(1)?;
            match (&values[0], Num::of(&values[0])) {
                (_, Some(Num::Int(number))) => Ok(Value::from(number)),
                (_, Some(Num::Double(number))) if number.is_finite()
                    && number >= i64::MIN as f64
                    && number < i64::MAX as f64 =>
                {
                    Ok(Value::from(number.trunc() as i64))
                }
                (Value::String(text), _) => text
                    .trim()
                    .parse::<i64>()
                    .map(Value::from)
                    .map_err(|error| ConditionError::Evaluation(format!("int('{text}'): {error}"))),
                (other, _) => Err(ConditionError::overload("int", &[&json_kind(other)])),
            }
        }
        "double" => {
            expect(1)?;
            match (&values[0], Num::of(&values[0])) {
                (_, Some(number)) => double(number.as_f64()),
                (Value::String(text), _) => text
                    .trim()
                    .parse::<f64>()
                    .map_err(|error| ConditionError::Evaluation(format!("double('{text}'): {error}")))
                    .and_then(double),
                (other, _) => Err(ConditionError::overload("double", &[&json_kind(other)])),
            }
        }
        "string" => {
            expect(1)?;
            match &values[0] {
                Value::String(text) => Ok(Value::String(text.clone())),
                Value::Number(number) => Ok(Value::String(number.to_string())),
                Value::Bool(flag) => Ok(Value::String(flag.to_string())),
                Value::Null => Ok(Value::String("null".into())),
                other => Err(ConditionError::overload("string", &[&json_kind(other)])),
            }
        }
        other => Err(ConditionError::UnknownFunction(other.to_string())),
    }
}
