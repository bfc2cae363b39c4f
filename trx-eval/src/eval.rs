//! Pure evaluation of AST expressions over a variable scope (§4.2).
//!
//! `eval` never mutates anything outside the `sqlcode`/variable reads it
//! performs to resolve paths and builtins; it does not execute statements
//! or touch the database.

use chrono::{Datelike, Local, Timelike};

use trx_core::{BinaryOp, Builtin, Expression, Scope, SqlFragmentPart, TrxError, UnaryOp, Value};

use crate::path::resolve_read;

/// Evaluates `expr` against `scope`, returning the resulting `Value` or the
/// `TrxError` the operator/variable-access contract was violated with.
pub fn eval(expr: &Expression, scope: &mut Scope<'_>) -> Result<Value, TrxError> {
    match expr {
        Expression::Literal(v) => Ok(v.clone()),
        Expression::Variable(path) => resolve_read(path, scope),
        Expression::Unary { op, expr } => eval_unary(*op, expr, scope),
        Expression::Binary { op, left, right } => eval_binary(*op, left, right, scope),
        Expression::Call { name, args } => eval_call(name, args, scope),
        Expression::Builtin(b) => Ok(eval_builtin(*b, scope)),
        Expression::SqlFragment(parts) => eval_sql_fragment(parts, scope),
    }
}

fn eval_unary(op: UnaryOp, expr: &Expression, scope: &mut Scope<'_>) -> Result<Value, TrxError> {
    let v = eval(expr, scope)?;
    match op {
        UnaryOp::Neg => match v {
            Value::Number(n) => Ok(Value::Number(-n)),
            other => Err(TrxError::type_error(format!(
                "unary - requires Number, got {}",
                other.kind_name()
            ))),
        },
        UnaryOp::Pos => match v {
            Value::Number(n) => Ok(Value::Number(n)),
            other => Err(TrxError::type_error(format!(
                "unary + requires Number, got {}",
                other.kind_name()
            ))),
        },
        UnaryOp::Not => match v {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            other => Err(TrxError::type_error(format!(
                "not requires Bool, got {}",
                other.kind_name()
            ))),
        },
    }
}

/// Operators fully evaluate both operands before combining them — §4.2
/// requires no short-circuiting, even for `and`/`or`.
fn eval_binary(
    op: BinaryOp,
    left: &Expression,
    right: &Expression,
    scope: &mut Scope<'_>,
) -> Result<Value, TrxError> {
    let lv = eval(left, scope)?;
    let rv = eval(right, scope)?;
    match op {
        BinaryOp::Add => add(lv, rv),
        BinaryOp::Sub => numeric_op(lv, rv, "-", |a, b| Ok(a - b)),
        BinaryOp::Mul => numeric_op(lv, rv, "*", |a, b| Ok(a * b)),
        BinaryOp::Div => numeric_op(lv, rv, "/", |a, b| {
            if b == 0.0 {
                Err(TrxError::arithmetic("division by zero"))
            } else {
                Ok(a / b)
            }
        }),
        BinaryOp::Mod => numeric_op(lv, rv, "mod", |a, b| {
            if b == 0.0 {
                Err(TrxError::arithmetic("modulo by zero"))
            } else {
                Ok(a % b)
            }
        }),
        BinaryOp::Eq => Ok(Value::Bool(lv.structural_eq(&rv))),
        BinaryOp::Ne => Ok(Value::Bool(!lv.structural_eq(&rv))),
        BinaryOp::Lt => Ok(Value::Bool(lv.compare(&rv)?.is_lt())),
        BinaryOp::Le => Ok(Value::Bool(lv.compare(&rv)?.is_le())),
        BinaryOp::Gt => Ok(Value::Bool(lv.compare(&rv)?.is_gt())),
        BinaryOp::Ge => Ok(Value::Bool(lv.compare(&rv)?.is_ge())),
        BinaryOp::And => bool_op(lv, rv, "and", |a, b| a && b),
        BinaryOp::Or => bool_op(lv, rv, "or", |a, b| a || b),
    }
}

fn add(lv: Value, rv: Value) -> Result<Value, TrxError> {
    match (lv, rv) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
        (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
        (a, b) => Err(TrxError::type_error(format!(
            "+ requires two Numbers or two Strings, got {} and {}",
            a.kind_name(),
            b.kind_name()
        ))),
    }
}

fn numeric_op(
    lv: Value,
    rv: Value,
    op_name: &str,
    f: impl FnOnce(f64, f64) -> Result<f64, TrxError>,
) -> Result<Value, TrxError> {
    match (lv, rv) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(f(a, b)?)),
        (a, b) => Err(TrxError::type_error(format!(
            "{op_name} requires two Numbers, got {} and {}",
            a.kind_name(),
            b.kind_name()
        ))),
    }
}

fn bool_op(lv: Value, rv: Value, op_name: &str, f: impl FnOnce(bool, bool) -> bool) -> Result<Value, TrxError> {
    match (lv, rv) {
        (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(f(a, b))),
        (a, b) => Err(TrxError::type_error(format!(
            "{op_name} requires two Bools, got {} and {}",
            a.kind_name(),
            b.kind_name()
        ))),
    }
}

/// A small fixed set of pure builtin functions reachable through the `call`
/// expression tag (§3). See DESIGN.md for why this set was chosen — the
/// spec names `call` as both a statement (procedure invocation, §4.5) and
/// an expression tag without describing the latter's semantics further.
fn eval_call(name: &str, args: &[Expression], scope: &mut Scope<'_>) -> Result<Value, TrxError> {
    let values: Result<Vec<Value>, TrxError> = args.iter().map(|a| eval(a, scope)).collect();
    let values = values?;
    match name.to_uppercase().as_str() {
        "LENGTH" => match values.as_slice() {
            [Value::String(s)] => Ok(Value::Number(s.chars().count() as f64)),
            [Value::Array(a)] => Ok(Value::Number(a.len() as f64)),
            _ => Err(TrxError::type_error("LENGTH requires a single String or Array argument")),
        },
        "UPPER" => match values.as_slice() {
            [Value::String(s)] => Ok(Value::String(s.to_uppercase())),
            _ => Err(TrxError::type_error("UPPER requires a single String argument")),
        },
        "LOWER" => match values.as_slice() {
            [Value::String(s)] => Ok(Value::String(s.to_lowercase())),
            _ => Err(TrxError::type_error("LOWER requires a single String argument")),
        },
        "ABS" => match values.as_slice() {
            [Value::Number(n)] => Ok(Value::Number(n.abs())),
            _ => Err(TrxError::type_error("ABS requires a single Number argument")),
        },
        other => Err(TrxError::not_found(format!("unknown function '{other}'"))),
    }
}

/// Snapshots process state at the moment of evaluation (§4.2).
fn eval_builtin(b: Builtin, scope: &Scope<'_>) -> Value {
    match b {
        Builtin::Sqlcode => Value::Number(scope.sqlcode() as f64),
        Builtin::Date => {
            let now = Local::now();
            Value::String(format!("{:04}-{:02}-{:02}", now.year(), now.month(), now.day()))
        }
        Builtin::Time => {
            let now = Local::now();
            Value::String(format!("{:02}:{:02}:{:02}", now.hour(), now.minute(), now.second()))
        }
        Builtin::Timestamp => {
            let now = Local::now();
            Value::String(now.format("%Y-%m-%d %H:%M:%S").to_string())
        }
        Builtin::Week => {
            let now = Local::now();
            Value::Number(now.iso_week().week() as f64)
        }
        Builtin::Weekday => {
            let now = Local::now();
            Value::Number(now.weekday().num_days_from_monday() as f64)
        }
    }
}

/// Interpolates Number/String operands into a single String (§4.2);
/// non-scalar operands fail.
fn eval_sql_fragment(parts: &[SqlFragmentPart], scope: &mut Scope<'_>) -> Result<Value, TrxError> {
    let mut out = String::new();
    for part in parts {
        match part {
            SqlFragmentPart::Text(t) => out.push_str(t),
            SqlFragmentPart::Interpolate(expr) => {
                let v = eval(expr, scope)?;
                match v {
                    Value::Number(n) => out.push_str(&n.to_string()),
                    Value::String(s) => out.push_str(&s),
                    other => {
                        return Err(TrxError::type_error(format!(
                            "SQL fragment interpolation requires a scalar, got {}",
                            other.kind_name()
                        )))
                    }
                }
            }
        }
    }
    Ok(Value::String(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use trx_core::VariablePath;

    fn eval_in_fresh_scope(expr: &Expression) -> Result<Value, TrxError> {
        let mut vars = HashMap::new();
        let mut sqlcode = 0;
        let mut scope = Scope::new(&mut vars, &mut sqlcode);
        eval(expr, &mut scope)
    }

    #[test]
    fn division_by_zero_is_arithmetic_error() {
        let expr = Expression::Binary {
            op: BinaryOp::Div,
            left: Box::new(Expression::Literal(Value::Number(1.0))),
            right: Box::new(Expression::Literal(Value::Number(0.0))),
        };
        let err = eval_in_fresh_scope(&expr).unwrap_err();
        assert_eq!(err.kind_name(), "ArithmeticError");
    }

    #[test]
    fn modulo_by_zero_is_arithmetic_error() {
        let expr = Expression::Binary {
            op: BinaryOp::Mod,
            left: Box::new(Expression::Literal(Value::Number(1.0))),
            right: Box::new(Expression::Literal(Value::Number(0.0))),
        };
        assert_eq!(eval_in_fresh_scope(&expr).unwrap_err().kind_name(), "ArithmeticError");
    }

    #[test]
    fn string_concatenation_via_plus() {
        let expr = Expression::Binary {
            op: BinaryOp::Add,
            left: Box::new(Expression::Literal(Value::String("foo".into()))),
            right: Box::new(Expression::Literal(Value::String("bar".into()))),
        };
        assert_eq!(eval_in_fresh_scope(&expr).unwrap().as_str(), Some("foobar"));
    }

    #[test]
    fn mixed_kind_comparison_is_type_error() {
        let expr = Expression::Binary {
            op: BinaryOp::Lt,
            left: Box::new(Expression::Literal(Value::Number(1.0))),
            right: Box::new(Expression::Literal(Value::String("x".into()))),
        };
        assert_eq!(eval_in_fresh_scope(&expr).unwrap_err().kind_name(), "TypeError");
    }

    #[test]
    fn structural_equality_works_across_kinds() {
        let expr = Expression::Binary {
            op: BinaryOp::Eq,
            left: Box::new(Expression::Literal(Value::Null)),
            right: Box::new(Expression::Literal(Value::Bool(false))),
        };
        assert_eq!(eval_in_fresh_scope(&expr).unwrap(), Value::Bool(false));
    }

    #[test]
    fn and_or_require_bools_and_fully_evaluate() {
        let expr = Expression::Binary {
            op: BinaryOp::And,
            left: Box::new(Expression::Literal(Value::Bool(true))),
            right: Box::new(Expression::Literal(Value::Bool(false))),
        };
        assert_eq!(eval_in_fresh_scope(&expr).unwrap(), Value::Bool(false));

        let bad = Expression::Binary {
            op: BinaryOp::And,
            left: Box::new(Expression::Literal(Value::Bool(true))),
            right: Box::new(Expression::Literal(Value::Number(1.0))),
        };
        assert_eq!(eval_in_fresh_scope(&bad).unwrap_err().kind_name(), "TypeError");
    }

    #[test]
    fn sqlcode_builtin_reads_current_scope_value() {
        let mut vars = HashMap::new();
        let mut sqlcode = 100;
        let mut scope = Scope::new(&mut vars, &mut sqlcode);
        let v = eval(&Expression::Builtin(Builtin::Sqlcode), &mut scope).unwrap();
        assert_eq!(v.as_number(), Some(100.0));
    }

    #[test]
    fn variable_path_resolves_through_scope() {
        let mut vars = HashMap::new();
        vars.insert("input".to_string(), {
            let mut m = std::collections::BTreeMap::new();
            m.insert("ZIP".to_string(), Value::Number(12345.0));
            Value::Object(m)
        });
        let mut sqlcode = 0;
        let mut scope = Scope::new(&mut vars, &mut sqlcode);
        let path = VariablePath {
            segments: vec![
                trx_core::PathSegment { name: "input".into(), subscript: None },
                trx_core::PathSegment { name: "ZIP".into(), subscript: None },
            ],
        };
        let v = eval(&Expression::Variable(path), &mut scope).unwrap();
        assert_eq!(v.as_number(), Some(12345.0));
    }

    #[test]
    fn sql_fragment_interpolates_scalars() {
        let parts = vec![
            SqlFragmentPart::Text("SELECT * FROM t WHERE id = ".into()),
            SqlFragmentPart::Interpolate(Box::new(Expression::Literal(Value::Number(7.0)))),
        ];
        let v = eval_in_fresh_scope(&Expression::SqlFragment(parts)).unwrap();
        assert_eq!(v.as_str(), Some("SELECT * FROM t WHERE id = 7"));
    }
}
