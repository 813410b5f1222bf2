//! Static type checking of parsed conditions against a [`TypeEnv`].

use super::ast::{BinaryOp, Expr, Literal, UnaryOp};
use super::error::ConditionError;
use super::eval::compiled_regex;
use super::types::{CelType, TypeEnv};

pub fn check(expr: &Expr, env: &TypeEnv) -> Result<CelType, ConditionError> {
    match expr {
        Expr::Literal(literal) => Ok(literal_type(literal)),
        Expr::Ident(name) => env
            .variable(name)
            .ok_or_else(|| ConditionError::UnknownVariable { name: name.clone() }),
        Expr::Select { operand, field } => {
            let operand_type = check(operand, env)?;
            select_field(&operand_type, field, expr, env)
        }
        Expr::Has { operand, field } => {
            let operand_type = check(operand, env)?;
            select_field(&operand_type, field, expr, env)?;
            Ok(CelType::Bool)
        }
        Expr::Index { operand, index } => {
            let operand_type = check(operand, env)?;
            let index_type = check(index, env)?;
            match (&operand_type, &index_type) {
                (CelType::List(element), CelType::Int | CelType::Dyn) => Ok((**element).clone()),
                (CelType::Map(_, value), _) => Ok((**value).clone()),
                (CelType::Record(_), CelType::String | CelType::Dyn) => Ok(CelType::Dyn),
                (CelType::Dyn, _) => Ok(CelType::Dyn),
                _ => Err(ConditionError::overload("_[_]", &[&operand_type, &index_type])),
            }
        }
        Expr::Unary { op, operand } => {
            let operand_type = check(operand, env)?;
            match (op, &operand_type) {
                (UnaryOp::Not, ty) if ty.is_bool_like() => Ok(CelType::Bool),
                (UnaryOp::Negate, CelType::Int) => Ok(CelType::Int),
                (UnaryOp::Negate, CelType::Double) => Ok(CelType::Double),
                (UnaryOp::Negate, CelType::Dyn) => Ok(CelType::Dyn),
                (UnaryOp::Not, _) => Err(ConditionError::overload("!_", &[&operand_type])),
                (UnaryOp::Negate, _) => Err(ConditionError::overload("-_", &[&operand_type])),
            }
        }
        Expr::Binary { op, left, right } => {
            let left_type = check(left, env)?;
            let right_type = check(right, env)?;
            binary_type(*op, &left_type, &right_type)
        }
        Expr::Conditional {
            condition,
            then,
            otherwise,
        } => {
            let condition_type = check(condition, env)?;
            if !condition_type.is_bool_like() {
                return Err(ConditionError::overload("_?_:_", &[&condition_type]));
            }
            let then_type = check(then, env)?;
            let otherwise_type = check(otherwise, env)?;
            Ok(then_type.join(&otherwise_type))
        }
        Expr::List(items) => {
            let mut element = None::<CelType>;
            for item in items {
                let item_type = check(item, env)?;
                element = Some(match element {
                    Some(current) => current.join(&item_type),
                    None => item_type,
                });
            }
            Ok(CelType::List(Box::new(element.unwrap_or(CelType::Dyn))))
        }
        Expr::Map(entries) => {
            let mut key = None::<CelType>;
            let mut value = None::<CelType>;
            for (entry_key, entry_value) in entries {
                let key_type = check(entry_key, env)?;
                if !matches!(key_type, CelType::String | CelType::Dyn) {
                    return Err(ConditionError::Type(format!(
                        "map keys must be strings, found {key_type}"
                    )));
                }
                let value_type = check(entry_value, env)?;
                key = Some(key.map_or(key_type.clone(), |current| current.join(&key_type)));
                value = Some(value.map_or(value_type.clone(), |current| current.join(&value_type)));
            }
            Ok(CelType::Map(
                Box::new(key.unwrap_or(CelType::String)),
                Box::new(value.unwrap_or(CelType::Dyn)),
            ))
        }
        Expr::Call {
            function,
            target,
            args,
        } => check_call(function, target.as_deref(), args, env),
    }
}

fn literal_type(literal: &Literal) -> CelType {
    match literal {
        Literal::Null => CelType::Null,
        Literal::Bool(_) => CelType::Bool,
        Literal::Int(_) => CelType::Int,
        Literal::Double(_) => CelType::Double,
        Literal::String(_) => CelType::String,
    }
}

fn select_field(
    operand_type: &CelType,
    field: &str,
    expr: &Expr,
    env: &TypeEnv,
) -> Result<CelType, ConditionError> {
    match operand_type {
        CelType::Record(name) => match env.record(name) {
            Some(fields) => fields
                .get(field)
                .cloned()
                .ok_or_else(|| ConditionError::NoSuchKey {
                    key: field.to_string(),
                    path: expr.path(),
                }),
            None => Ok(CelType::Dyn),
        },
        CelType::Map(_, value) => Ok((**value).clone()),
        CelType::Dyn => Ok(CelType::Dyn),
        other => Err(ConditionError::Type(format!(
            "type '{other}' does not support field selection ('{field}')"
        ))),
    }
}

/// Whether values of the two types can meet in `==`, `in` and friends.
fn comparable(left: &CelType, right: &CelType) -> bool {
    match (left, right) {
        (CelType::Dyn, _) | (_, CelType::Dyn) => true,
        (CelType::Null, _) | (_, CelType::Null) => true,
        (a, b) if a.is_numeric() && b.is_numeric() => true,
        (CelType::Record(_), CelType::Map(..)) | (CelType::Map(..), CelType::Record(_)) => true,
        (CelType::List(a), CelType::List(b)) => comparable(a, b),
        (a, b) => a == b,
    }
}

fn orderable(left: &CelType, right: &CelType) -> bool {
    match (left, right) {
        (CelType::Dyn, other) | (other, CelType::Dyn) => {
            other.is_numeric() || matches!(other, CelType::String | CelType::Bool | CelType::Dyn)
        }
        (a, b) if a.is_numeric() && b.is_numeric() => true,
        (CelType::String, CelType::String) | (CelType::Bool, CelType::Bool) => true,
        _ => false,
    }
}

fn binary_type(op: BinaryOp, left: &CelType, right: &CelType) -> Result<CelType, ConditionError> {
    let mismatch = || ConditionError::overload(op.symbol(), &[left, right]);

    match op {
        BinaryOp::And | BinaryOp::Or => {
            if left.is_bool_like() && right.is_bool_like() {
                Ok(CelType::Bool)
            } else {
                Err(mismatch())
            }
        }
        BinaryOp::Eq | BinaryOp::Ne => {
            if comparable(left, right) {
                Ok(CelType::Bool)
            } else {
                Err(mismatch())
            }
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            if orderable(left, right) {
                Ok(CelType::Bool)
            } else {
                Err(mismatch())
            }
        }
        BinaryOp::In => match right {
            CelType::List(element) if comparable(left, element) => Ok(CelType::Bool),
            CelType::Map(key, _) if comparable(left, key) => Ok(CelType::Bool),
            CelType::Record(_) if matches!(left, CelType::String | CelType::Dyn) => Ok(CelType::Bool),
            CelType::Dyn => Ok(CelType::Bool),
            _ => Err(mismatch()),
        },
        BinaryOp::Add => match (left, right) {
            (CelType::Int, CelType::Int) => Ok(CelType::Int),
            (a, b) if a.is_numeric() && b.is_numeric() => Ok(CelType::Double),
            (CelType::String, CelType::String) => Ok(CelType::String),
            (CelType::List(a), CelType::List(b)) => Ok(CelType::List(Box::new(a.join(b)))),
            (CelType::Dyn, other) | (other, CelType::Dyn)
                if other.is_numeric()
                    || matches!(other, CelType::String | CelType::List(_) | CelType::Dyn) =>
            {
                Ok(CelType::Dyn)
            }
            _ => Err(mismatch()),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => match (left, right) {
            (CelType::Int, CelType::Int) => Ok(CelType::Int),
            (a, b) if a.is_numeric() && b.is_numeric() => Ok(CelType::Double),
            (CelType::Dyn, other) | (other, CelType::Dyn)
                if other.is_numeric() || other.is_dyn() =>
            {
                Ok(CelType::Dyn)
            }
            _ => Err(mismatch()),
        },
    }
}

fn check_call(
    function: &str,
    target: Option<&Expr>,
    args: &[Expr],
    env: &TypeEnv,
) -> Result<CelType, ConditionError> {
    // receiver-style calls are checked like their global form with the receiver first
    let mut operands: Vec<&Expr> = target.into_iter().collect();
    operands.extend(args.iter());
    let types = operands
        .iter()
        .map(|operand| check(operand, env))
        .collect::<Result<Vec<_>, _>>()?;

    let arity = |expected: usize| {
        if types.len() == expected {
            Ok(())
        } else {
            Err(ConditionError::Type(format!(
                "'{function}' expects {expected} argument(s), got {}",
                types.len()
            )))
        }
    };
    let overload = || {
        let refs: Vec<&dyn std::fmt::Display> =
            types.iter().map(|ty| ty as &dyn std::fmt::Display).collect();
        ConditionError::overload(function, &refs)
    };

    match function {
        "size" => {
            arity(1)?;
            match &types[0] {
                CelType::String | CelType::List(_) | CelType::Map(..) | CelType::Record(_) | CelType::Dyn => {
                    Ok(CelType::Int)
                }
                _ => Err(overload()),
            }
        }
        "matches" => {
            arity(2)?;
            if !types.iter().all(|ty| matches!(ty, CelType::String | CelType::Dyn)) {
                return Err(overload());
            }
            if let Expr::Literal(Literal::String(pattern)) = operands[1] {
                compiled_regex(pattern)?;
            }
            Ok(CelType::Bool)
        }
        "contains" | "startsWith" | "endsWith" => {
            arity(2)?;
            if types.iter().all(|ty| matches!(ty, CelType::String | CelType::Dyn)) {
                Ok(CelType::Bool)
            } else {
                Err(overload())
            }
        }
        "int" => {
            arity(1)?;
            match &types[0] {
                CelType::Int | CelType::Double | CelType::String | CelType::Dyn => Ok(CelType::Int),
                _ => Err(overload()),
            }
        }
        "double" => {
            arity(1)?;
            match &types[0] {
                CelType::Int | CelType::Double | CelType::String | CelType::Dyn => Ok(CelType::Double),
                _ => Err(overload()),
            }
        }
        "string" => {
            arity(1)?;
            match &types[0] {
                CelType::List(_) | CelType::Map(..) | CelType::Record(_) => Err(overload()),
                _ => Ok(CelType::String),
            }
        }
        other => Err(ConditionError::UnknownFunction(other.to_string())),
    }
}
