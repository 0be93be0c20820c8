// ABOUTME: Simple condition-expression evaluator over the context projection
// ABOUTME: Supports LHS OP RHS with dot paths and primitive literals only

use crate::error::ExpressionError;
use crate::types::ConditionExpression;
use serde_json::Value as JsonValue;

/// Comparison operators, longest tokens first so `>=` wins over `>`.
const OPERATORS: [&str; 6] = [">=", "<=", "==", "!=", ">", "<"];

/// Evaluates a condition against the projection
/// `{variables, step_results, execution_state, current_step}`.
///
/// Only the simple dialect is implemented; JSONPath and JavaScript reject
/// with `ExpressionNotImplemented` rather than silently passing.
pub fn evaluate(
    expression: &ConditionExpression,
    scope: &JsonValue,
) -> Result<bool, ExpressionError> {
    match expression {
        ConditionExpression::Simple(text) => evaluate_simple(text, scope),
        ConditionExpression::JsonPath(_) => Err(ExpressionError::ExpressionNotImplemented(
            "jsonpath".to_string(),
        )),
        ConditionExpression::JavaScript(_) => Err(ExpressionError::ExpressionNotImplemented(
            "javascript".to_string(),
        )),
    }
}

fn evaluate_simple(text: &str, scope: &JsonValue) -> Result<bool, ExpressionError> {
    let (lhs_text, operator, rhs_text) = split_expression(text)?;

    let lhs = resolve_path(scope, lhs_text)?;
    let rhs = parse_literal(rhs_text)?;

    match operator {
        "==" => Ok(loose_eq(&lhs, &rhs)),
        "!=" => Ok(!loose_eq(&lhs, &rhs)),
        ">" => Ok(as_number(&lhs)? > as_number(&rhs)?),
        "<" => Ok(as_number(&lhs)? < as_number(&rhs)?),
        ">=" => Ok(as_number(&lhs)? >= as_number(&rhs)?),
        "<=" => Ok(as_number(&lhs)? <= as_number(&rhs)?),
        _ => Err(ExpressionError::InvalidExpression(text.to_string())),
    }
}

/// Finds the earliest operator occurrence; two-character operators take
/// precedence over their one-character prefixes at the same position.
fn split_expression(text: &str) -> Result<(&str, &str, &str), ExpressionError> {
    let mut best: Option<(usize, &str)> = None;
    for op in OPERATORS {
        if let Some(pos) = text.find(op) {
            let better = match best {
                Some((best_pos, best_op)) => {
                    pos < best_pos || (pos == best_pos && op.len() > best_op.len())
                }
                None => true,
            };
            if better {
                best = Some((pos, op));
            }
        }
    }

    let (pos, op) = best.ok_or_else(|| {
        ExpressionError::InvalidExpression(format!("no operator in '{}'", text))
    })?;

    let lhs = text[..pos].trim();
    let rhs = text[pos + op.len()..].trim();
    if lhs.is_empty() || rhs.is_empty() {
        return Err(ExpressionError::InvalidExpression(text.to_string()));
    }
    Ok((lhs, op, rhs))
}

/// Resolves a dot path through objects (and array indices) in the scope.
fn resolve_path(scope: &JsonValue, path: &str) -> Result<JsonValue, ExpressionError> {
    let mut current = scope;
    for segment in path.split('.') {
        current = match current {
            JsonValue::Object(map) => map
                .get(segment)
                .ok_or_else(|| ExpressionError::PathNotFound(path.to_string()))?,
            JsonValue::Array(items) => {
                let index: usize = segment
                    .parse()
                    .map_err(|_| ExpressionError::PathNotFound(path.to_string()))?;
                items
                    .get(index)
                    .ok_or_else(|| ExpressionError::PathNotFound(path.to_string()))?
            }
            _ => return Err(ExpressionError::PathNotFound(path.to_string())),
        };
    }
    Ok(current.clone())
}

/// Parses the RHS greedily: keyword literals, numbers, then quoted or bare
/// strings. Quoted strings may contain spaces and either quote style.
fn parse_literal(text: &str) -> Result<JsonValue, ExpressionError> {
    match text {
        "true" => return Ok(JsonValue::Bool(true)),
        "false" => return Ok(JsonValue::Bool(false)),
        "null" => return Ok(JsonValue::Null),
        _ => {}
    }

    if let Ok(int) = text.parse::<i64>() {
        return Ok(JsonValue::from(int));
    }
    if let Ok(float) = text.parse::<f64>() {
        return Ok(JsonValue::from(float));
    }

    for quote in ['"', '\''] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return Ok(JsonValue::String(text[1..text.len() - 1].to_string()));
        }
    }

    Ok(JsonValue::String(text.to_string()))
}

/// Structural equality with numeric coercion so `3 == 3.0`.
fn loose_eq(a: &JsonValue, b: &JsonValue) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn as_number(value: &JsonValue) -> Result<f64, ExpressionError> {
    value
        .as_f64()
        .ok_or_else(|| ExpressionError::NotANumber(value.to_string()))
}
