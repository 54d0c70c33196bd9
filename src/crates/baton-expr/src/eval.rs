//! Tree-walking evaluation of parsed expressions
//!
//! Expressions evaluate against a `serde_json::Value` context, the same
//! shape the conductor hands to transition guards. Member access on a
//! missing key yields `null` so guards read naturally as "falsy when
//! absent"; type mismatches in arithmetic and comparisons are evaluation
//! failures.

use serde_json::Value;

use crate::parser::{BinaryOp, Expr, UnaryOp};

/// An evaluation failure, not yet tagged with the expression source
///
/// The dialect layer wraps this into
/// [`ExpressionError::Evaluation`](crate::ExpressionError::Evaluation).
#[derive(Debug, Clone, PartialEq)]
pub struct EvalError {
    pub message: String,
}

impl EvalError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

type EvalResult = std::result::Result<Value, EvalError>;

/// Truthiness of a JSON value
///
/// `null`, `false`, zero, the empty string, and empty collections are
/// false; everything else is true.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Evaluate an expression tree against a context value
pub fn evaluate(expr: &Expr, ctx: &Value) -> EvalResult {
    match expr {
        Expr::Null => Ok(Value::Null),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Int(n) => Ok(Value::from(*n)),
        Expr::Float(f) => float(*f),
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::Context => Ok(ctx.clone()),
        Expr::Ident(name) => Err(EvalError::new(format!("unknown identifier '{name}'"))),
        Expr::List(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(evaluate(item, ctx)?);
            }
            Ok(Value::Array(values))
        }
        Expr::Member { object, field } => {
            let object = evaluate(object, ctx)?;
            match object {
                Value::Null => Ok(Value::Null),
                Value::Object(mut map) => Ok(map.remove(field).unwrap_or(Value::Null)),
                other => Err(EvalError::new(format!(
                    "cannot access member '{field}' of {}",
                    type_name(&other)
                ))),
            }
        }
        Expr::Index { object, index } => {
            let object = evaluate(object, ctx)?;
            let index = evaluate(index, ctx)?;
            eval_index(object, index)
        }
        Expr::Call { function, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(evaluate(arg, ctx)?);
            }
            call(function, values)
        }
        Expr::Unary { op, operand } => {
            let value = evaluate(operand, ctx)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!is_truthy(&value))),
                UnaryOp::Neg => match value {
                    Value::Number(n) => {
                        if let Some(i) = n.as_i64() {
                            i.checked_neg()
                                .map(Value::from)
                                .ok_or_else(|| EvalError::new("integer overflow in negation"))
                        } else {
                            float(-n.as_f64().unwrap_or(f64::NAN))
                        }
                    }
                    other => Err(EvalError::new(format!(
                        "cannot negate {}",
                        type_name(&other)
                    ))),
                },
            }
        }
        Expr::Binary { op, left, right } => eval_binary(*op, left, right, ctx),
    }
}

fn eval_binary(op: BinaryOp, left: &Expr, right: &Expr, ctx: &Value) -> EvalResult {
    // Boolean connectives short-circuit; everything else is strict.
    match op {
        BinaryOp::And => {
            let lhs = evaluate(left, ctx)?;
            if !is_truthy(&lhs) {
                return Ok(Value::Bool(false));
            }
            let rhs = evaluate(right, ctx)?;
            return Ok(Value::Bool(is_truthy(&rhs)));
        }
        BinaryOp::Or => {
            let lhs = evaluate(left, ctx)?;
            if is_truthy(&lhs) {
                return Ok(Value::Bool(true));
            }
            let rhs = evaluate(right, ctx)?;
            return Ok(Value::Bool(is_truthy(&rhs)));
        }
        _ => {}
    }

    let lhs = evaluate(left, ctx)?;
    let rhs = evaluate(right, ctx)?;

    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(&lhs, &rhs))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(&lhs, &rhs))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(&lhs, &rhs)?;
            let result = match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                BinaryOp::Ge => ordering.is_ge(),
                _ => unreachable!(),
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::In => eval_in(&lhs, &rhs),
        BinaryOp::Add => match (&lhs, &rhs) {
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
            (Value::Array(a), Value::Array(b)) => {
                let mut items = a.clone();
                items.extend(b.iter().cloned());
                Ok(Value::Array(items))
            }
            _ => arith(op, &lhs, &rhs),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => arith(op, &lhs, &rhs),
        BinaryOp::And | BinaryOp::Or => unreachable!(),
    }
}

fn eval_index(object: Value, index: Value) -> EvalResult {
    match (object, index) {
        (Value::Array(items), Value::Number(n)) => {
            let Some(raw) = n.as_i64() else {
                return Err(EvalError::new("array index must be an integer"));
            };
            let idx = if raw < 0 {
                items.len() as i64 + raw
            } else {
                raw
            };
            if idx < 0 || idx as usize >= items.len() {
                Ok(Value::Null)
            } else {
                Ok(items[idx as usize].clone())
            }
        }
        (Value::Object(mut map), Value::String(key)) => {
            Ok(map.remove(&key).unwrap_or(Value::Null))
        }
        (Value::Null, _) => Ok(Value::Null),
        (object, index) => Err(EvalError::new(format!(
            "cannot index {} with {}",
            type_name(&object),
            type_name(&index)
        ))),
    }
}

fn eval_in(item: &Value, container: &Value) -> EvalResult {
    match container {
        Value::Array(items) => Ok(Value::Bool(items.iter().any(|v| values_equal(v, item)))),
        Value::Object(map) => match item {
            Value::String(key) => Ok(Value::Bool(map.contains_key(key))),
            other => Err(EvalError::new(format!(
                "object membership requires a string key, got {}",
                type_name(other)
            ))),
        },
        Value::String(haystack) => match item {
            Value::String(needle) => Ok(Value::Bool(haystack.contains(needle.as_str()))),
            other => Err(EvalError::new(format!(
                "string membership requires a string, got {}",
                type_name(other)
            ))),
        },
        other => Err(EvalError::new(format!(
            "'in' requires a collection on the right, got {}",
            type_name(other)
        ))),
    }
}

fn arith(op: BinaryOp, lhs: &Value, rhs: &Value) -> EvalResult {
    let (Value::Number(a), Value::Number(b)) = (lhs, rhs) else {
        return Err(EvalError::new(format!(
            "arithmetic requires numbers, got {} and {}",
            type_name(lhs),
            type_name(rhs)
        )));
    };

    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let result = match op {
            BinaryOp::Add => x.checked_add(y),
            BinaryOp::Sub => x.checked_sub(y),
            BinaryOp::Mul => x.checked_mul(y),
            BinaryOp::Div => {
                if y == 0 {
                    return Err(EvalError::new("division by zero"));
                }
                x.checked_div(y)
            }
            BinaryOp::Rem => {
                if y == 0 {
                    return Err(EvalError::new("division by zero"));
                }
                x.checked_rem(y)
            }
            _ => unreachable!(),
        };
        return result
            .map(Value::from)
            .ok_or_else(|| EvalError::new("integer overflow"));
    }

    let x = a.as_f64().unwrap_or(f64::NAN);
    let y = b.as_f64().unwrap_or(f64::NAN);
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => {
            if y == 0.0 {
                return Err(EvalError::new("division by zero"));
            }
            x / y
        }
        BinaryOp::Rem => {
            if y == 0.0 {
                return Err(EvalError::new("division by zero"));
            }
            x % y
        }
        _ => unreachable!(),
    };
    float(result)
}

fn call(function: &str, mut args: Vec<Value>) -> EvalResult {
    match (function, args.len()) {
        ("len", 1) => match &args[0] {
            Value::String(s) => Ok(Value::from(s.chars().count() as i64)),
            Value::Array(items) => Ok(Value::from(items.len() as i64)),
            Value::Object(map) => Ok(Value::from(map.len() as i64)),
            other => Err(EvalError::new(format!(
                "len() requires a string or collection, got {}",
                type_name(other)
            ))),
        },
        ("str", 1) => Ok(Value::String(render(&args[0]))),
        ("int", 1) => match &args[0] {
            Value::Number(n) => n
                .as_f64()
                .map(|f| Value::from(f as i64))
                .ok_or_else(|| EvalError::new("int() requires a finite number")),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| EvalError::new(format!("int() cannot parse {s:?}"))),
            Value::Bool(b) => Ok(Value::from(*b as i64)),
            other => Err(EvalError::new(format!(
                "int() requires a number or string, got {}",
                type_name(other)
            ))),
        },
        ("float", 1) => match &args[0] {
            Value::Number(n) => float(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| EvalError::new(format!("float() cannot parse {s:?}")))
                .and_then(float),
            other => Err(EvalError::new(format!(
                "float() requires a number or string, got {}",
                type_name(other)
            ))),
        },
        ("bool", 1) => Ok(Value::Bool(is_truthy(&args[0]))),
        ("abs", 1) => match &args[0] {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    i.checked_abs()
                        .map(Value::from)
                        .ok_or_else(|| EvalError::new("integer overflow in abs()"))
                } else {
                    float(n.as_f64().unwrap_or(f64::NAN).abs())
                }
            }
            other => Err(EvalError::new(format!(
                "abs() requires a number, got {}",
                type_name(other)
            ))),
        },
        ("min", 2) | ("max", 2) => {
            let b = args.pop().unwrap_or(Value::Null);
            let a = args.pop().unwrap_or(Value::Null);
            let ordering = compare(&a, &b)?;
            let pick_first = if function == "min" {
                ordering.is_le()
            } else {
                ordering.is_ge()
            };
            Ok(if pick_first { a } else { b })
        }
        ("keys", 1) => match &args[0] {
            Value::Object(map) => Ok(Value::Array(
                map.keys().map(|k| Value::String(k.clone())).collect(),
            )),
            other => Err(EvalError::new(format!(
                "keys() requires an object, got {}",
                type_name(other)
            ))),
        },
        ("values", 1) => match &args[0] {
            Value::Object(map) => Ok(Value::Array(map.values().cloned().collect())),
            other => Err(EvalError::new(format!(
                "values() requires an object, got {}",
                type_name(other)
            ))),
        },
        ("len" | "str" | "int" | "float" | "bool" | "abs" | "keys" | "values", n) => Err(
            EvalError::new(format!("{function}() takes 1 argument, got {n}")),
        ),
        ("min" | "max", n) => Err(EvalError::new(format!(
            "{function}() takes 2 arguments, got {n}"
        ))),
        _ => Err(EvalError::new(format!("unknown function '{function}'"))),
    }
}

/// Equality with numeric coercion: `1 = 1.0` holds.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> std::result::Result<std::cmp::Ordering, EvalError> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y)
                .ok_or_else(|| EvalError::new("cannot order non-finite numbers"))
        }
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        _ => Err(EvalError::new(format!(
            "cannot order {} and {}",
            type_name(a),
            type_name(b)
        ))),
    }
}

/// Render a value the way interpolation needs it: strings bare, the rest as
/// compact JSON.
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn float(f: f64) -> EvalResult {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| EvalError::new("result is not a finite number"))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
