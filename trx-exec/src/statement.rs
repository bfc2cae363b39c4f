//! The Statement Executor (§4.3): effectful execution of statements,
//! control flow, and `return`/`throw` unwinding.
//!
//! Recursion here is genuinely recursive (an `if` body can itself contain
//! an `if`) and genuinely async (the `call` and SQL statement kinds await
//! the SQL Executor and nested procedure invocations), so statement
//! execution is boxed per recursive step via `async_recursion` rather than
//! hand-rolled `Pin<Box<dyn Future>>` bookkeeping.

use async_recursion::async_recursion;

use trx_core::{SortKey, Statement, TrxError, Value};
use trx_eval::{eval, resolve_read, resolve_write};

use crate::context::{ExecContext, Flow};
use crate::invoke;

#[async_recursion]
pub async fn exec_block(stmts: &[Statement], ctx: &mut ExecContext<'_>) -> Result<Flow, TrxError> {
    for stmt in stmts {
        match exec_statement(stmt, ctx).await? {
            Flow::Normal => {}
            returned @ Flow::Returned(_) => return Ok(returned),
        }
    }
    Ok(Flow::Normal)
}

fn eval_bool(expr: &trx_core::Expression, ctx: &mut ExecContext<'_>) -> Result<bool, TrxError> {
    let mut scope = ctx.scope();
    match eval(expr, &mut scope)? {
        Value::Bool(b) => Ok(b),
        other => Err(TrxError::type_error(format!(
            "condition must be Bool, got {}",
            other.kind_name()
        ))),
    }
}

#[async_recursion]
async fn exec_statement(stmt: &Statement, ctx: &mut ExecContext<'_>) -> Result<Flow, TrxError> {
    match stmt {
        Statement::Assign { path, value } => {
            let v = {
                let mut scope = ctx.scope();
                eval(value, &mut scope)?
            };
            let mut scope = ctx.scope();
            resolve_write(path, &mut scope, v)?;
            Ok(Flow::Normal)
        }

        Statement::If { condition, then_branch, else_branch } => {
            if eval_bool(condition, ctx)? {
                exec_block(then_branch, ctx).await
            } else {
                exec_block(else_branch, ctx).await
            }
        }

        Statement::While { condition, body } => {
            while eval_bool(condition, ctx)? {
                match exec_block(body, ctx).await? {
                    Flow::Normal => {}
                    returned @ Flow::Returned(_) => return Ok(returned),
                }
            }
            Ok(Flow::Normal)
        }

        Statement::For { variable, collection, body } => {
            let items = {
                let mut scope = ctx.scope();
                match eval(collection, &mut scope)? {
                    Value::Array(items) => items,
                    other => {
                        return Err(TrxError::type_error(format!(
                            "for-loop collection must be an Array, got {}",
                            other.kind_name()
                        )))
                    }
                }
            };
            for item in items {
                ctx.vars.insert(variable.clone(), item);
                match exec_block(body, ctx).await? {
                    Flow::Normal => {}
                    returned @ Flow::Returned(_) => return Ok(returned),
                }
            }
            Ok(Flow::Normal)
        }

        Statement::Switch { selector, cases, default } => {
            let selected = {
                let mut scope = ctx.scope();
                eval(selector, &mut scope)?
            };
            for (key_expr, body) in cases {
                let key = {
                    let mut scope = ctx.scope();
                    eval(key_expr, &mut scope)?
                };
                if key.structural_eq(&selected) {
                    return exec_block(body, ctx).await;
                }
            }
            match default {
                Some(body) => exec_block(body, ctx).await,
                None => Ok(Flow::Normal),
            }
        }

        Statement::Block(body) | Statement::Batch(body) => exec_block(body, ctx).await,

        Statement::Return(expr) => {
            let mut scope = ctx.scope();
            Ok(Flow::Returned(eval(expr, &mut scope)?))
        }

        Statement::Throw(expr) => {
            let v = {
                let mut scope = ctx.scope();
                eval(expr, &mut scope)?
            };
            Err(TrxError::Throw(v))
        }

        Statement::TryCatch { try_body, catch_variable, catch_body } => {
            match exec_block(try_body, ctx).await {
                Ok(flow) => Ok(flow),
                Err(err) => {
                    ctx.vars.insert(catch_variable.clone(), err.to_caught_value());
                    exec_block(catch_body, ctx).await
                }
            }
        }

        Statement::Call { target, input, output } => {
            let input_value = {
                let mut scope = ctx.scope();
                resolve_read(input, &mut scope)?
            };
            let proc = ctx
                .module
                .find_procedure(target)
                .ok_or_else(|| TrxError::not_found(format!("unknown procedure '{target}'")))?
                .clone();
            let result = invoke::invoke(ctx, &proc, input_value, &Default::default()).await?;
            let mut scope = ctx.scope();
            resolve_write(output, &mut scope, result)?;
            Ok(Flow::Normal)
        }

        Statement::Sql(sql_stmt) => {
            // Constructed from the two fields directly (rather than via
            // `ctx.scope()`) so this borrow stays disjoint from the
            // simultaneous borrow of `ctx.sql` below.
            let mut scope = trx_core::Scope::new(ctx.vars, ctx.sqlcode);
            ctx.sql.exec(sql_stmt, &mut scope).await?;
            Ok(Flow::Normal)
        }

        Statement::Sort { target, keys } => {
            exec_sort(target, keys, ctx)?;
            Ok(Flow::Normal)
        }

        Statement::Trace(expr) => {
            let v = {
                let mut scope = ctx.scope();
                eval(expr, &mut scope)?
            };
            tracing::info!(target: "trx::trace", value = %v.to_json_string(), "trace");
            Ok(Flow::Normal)
        }

        Statement::System(expr) => {
            let command = {
                let mut scope = ctx.scope();
                match eval(expr, &mut scope)? {
                    Value::String(s) => s,
                    other => {
                        return Err(TrxError::type_error(format!(
                            "system command must be a String, got {}",
                            other.kind_name()
                        )))
                    }
                }
            };
            let _ = tokio::task::spawn_blocking(move || {
                std::process::Command::new("sh").arg("-c").arg(&command).status()
            })
            .await;
            Ok(Flow::Normal)
        }

        Statement::Validate { rule, code, message } => {
            exec_validate(rule, code, message, ctx)?;
            Ok(Flow::Normal)
        }
    }
}

/// Sorts the Array at `target` in place, stable, by the first declared key
/// only (§9 Open Question, resolved in DESIGN.md: the reference
/// implementation's single-key behaviour is what this runtime reproduces;
/// the spec's stable-sort-on-first-key mandate is honoured, additional
/// keys are accepted syntactically but not consulted).
fn exec_sort(target: &trx_core::VariablePath, keys: &[SortKey], ctx: &mut ExecContext<'_>) -> Result<(), TrxError> {
    let key = keys
        .first()
        .ok_or_else(|| TrxError::internal("sort statement declares no keys"))?;

    let mut scope = ctx.scope();
    let mut array = match resolve_read(target, &mut scope)? {
        Value::Array(items) => items,
        other => {
            return Err(TrxError::type_error(format!(
                "sort target must be an Array, got {}",
                other.kind_name()
            )))
        }
    };

    let mut decorated = Vec::with_capacity(array.len());
    for item in array.drain(..) {
        let field_value = match &item {
            Value::Object(map) => map.get(&key.field).cloned().unwrap_or(Value::Null),
            other => {
                return Err(TrxError::type_error(format!(
                    "cannot sort {} by field '{}'",
                    other.kind_name(),
                    key.field
                )))
            }
        };
        decorated.push((field_value, item));
    }

    let mut sort_err = None;
    decorated.sort_by(|(a, _), (b, _)| match a.compare(b) {
        Ok(ordering) => if key.ascending { ordering } else { ordering.reverse() },
        Err(e) => {
            sort_err.get_or_insert(e);
            std::cmp::Ordering::Equal
        }
    });
    if let Some(e) = sort_err {
        return Err(e);
    }

    let sorted: Vec<Value> = decorated.into_iter().map(|(_, item)| item).collect();
    resolve_write(target, &mut scope, Value::Array(sorted))
}

/// Records the outcome of a `validate` statement as an appended descriptor
/// `{"success": Bool, "code": Value, "message": Value}` in the scope array
/// `VALIDATIONS` (an interpretation decision recorded in DESIGN.md: the
/// spec describes the descriptor's shape but not where it is kept —
/// writing it through the ordinary variable map is the only storage this
/// runtime's scope model provides).
fn exec_validate(
    rule: &trx_core::Expression,
    code: &trx_core::Expression,
    message: &trx_core::Expression,
    ctx: &mut ExecContext<'_>,
) -> Result<(), TrxError> {
    let (success, code_value, message_value) = {
        let mut scope = ctx.scope();
        let success = match eval(rule, &mut scope)? {
            Value::Bool(b) => b,
            other => {
                return Err(TrxError::type_error(format!(
                    "validate rule must be Bool, got {}",
                    other.kind_name()
                )))
            }
        };
        let code_value = eval(code, &mut scope)?;
        let message_value = eval(message, &mut scope)?;
        (success, code_value, message_value)
    };

    let mut descriptor = std::collections::BTreeMap::new();
    descriptor.insert("success".to_string(), Value::Bool(success));
    descriptor.insert("code".to_string(), code_value);
    descriptor.insert("message".to_string(), message_value);

    let path = trx_core::VariablePath::simple("VALIDATIONS");
    let mut scope = ctx.scope();
    let mut list = match resolve_read(&path, &mut scope) {
        Ok(Value::Array(items)) => items,
        _ => Vec::new(),
    };
    list.push(Value::Object(descriptor));
    resolve_write(&path, &mut scope, Value::Array(list))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use trx_core::{Expression, Module, PathSegment, VariablePath};
    use trx_sql::{MemoryDriver, SqlExecutor};

    #[tokio::test]
    async fn if_else_picks_correct_branch() {
        let module = Module::default();
        let mut vars = HashMap::new();
        let mut sqlcode = 0;
        let driver: Arc<dyn trx_sql::DbDriver> = Arc::new(MemoryDriver::new());
        let mut sql = SqlExecutor::new(driver);
        let mut ctx = ExecContext { module: &module, sql: &mut sql, vars: &mut vars, sqlcode: &mut sqlcode };

        let stmt = Statement::If {
            condition: Expression::Literal(Value::Bool(false)),
            then_branch: vec![Statement::Assign {
                path: VariablePath::simple("result"),
                value: Expression::Literal(Value::String("then".into())),
            }],
            else_branch: vec![Statement::Assign {
                path: VariablePath::simple("result"),
                value: Expression::Literal(Value::String("else".into())),
            }],
        };
        exec_statement(&stmt, &mut ctx).await.unwrap();
        assert_eq!(ctx.vars.get("result").unwrap().as_str(), Some("else"));
    }

    #[tokio::test]
    async fn return_unwinds_through_nested_block() {
        let module = Module::default();
        let mut vars = HashMap::new();
        let mut sqlcode = 0;
        let driver: Arc<dyn trx_sql::DbDriver> = Arc::new(MemoryDriver::new());
        let mut sql = SqlExecutor::new(driver);
        let mut ctx = ExecContext { module: &module, sql: &mut sql, vars: &mut vars, sqlcode: &mut sqlcode };

        let body = vec![Statement::Block(vec![Statement::Return(Expression::Literal(Value::Number(7.0)))])];
        match exec_block(&body, &mut ctx).await.unwrap() {
            Flow::Returned(v) => assert_eq!(v.as_number(), Some(7.0)),
            Flow::Normal => panic!("expected Returned"),
        }
    }

    #[tokio::test]
    async fn try_catch_binds_caught_descriptor() {
        let module = Module::default();
        let mut vars = HashMap::new();
        let mut sqlcode = 0;
        let driver: Arc<dyn trx_sql::DbDriver> = Arc::new(MemoryDriver::new());
        let mut sql = SqlExecutor::new(driver);
        let mut ctx = ExecContext { module: &module, sql: &mut sql, vars: &mut vars, sqlcode: &mut sqlcode };

        let stmt = Statement::TryCatch {
            try_body: vec![Statement::Throw(Expression::Literal(Value::String("bad".into())))],
            catch_variable: "err".into(),
            catch_body: vec![],
        };
        exec_statement(&stmt, &mut ctx).await.unwrap();
        let caught = ctx.vars.get("err").unwrap();
        assert_eq!(caught.as_object().unwrap().get("kind").unwrap().as_str(), Some("ThrowError"));
    }

    #[tokio::test]
    async fn switch_runs_first_matching_case_only() {
        let module = Module::default();
        let mut vars = HashMap::new();
        let mut sqlcode = 0;
        let driver: Arc<dyn trx_sql::DbDriver> = Arc::new(MemoryDriver::new());
        let mut sql = SqlExecutor::new(driver);
        let mut ctx = ExecContext { module: &module, sql: &mut sql, vars: &mut vars, sqlcode: &mut sqlcode };

        let stmt = Statement::Switch {
            selector: Expression::Literal(Value::Number(4.0)),
            cases: vec![
                (Expression::Literal(Value::Number(1.0)), vec![assign("result", 10.0)]),
                (Expression::Literal(Value::Number(4.0)), vec![assign("result", 40.0)]),
            ],
            default: Some(vec![assign("result", -1.0)]),
        };
        exec_statement(&stmt, &mut ctx).await.unwrap();
        assert_eq!(ctx.vars.get("result").unwrap().as_number(), Some(40.0));
    }

    #[tokio::test]
    async fn caught_message_is_fixed_text_even_for_a_non_string_throw() {
        let module = Module::default();
        let mut vars = HashMap::new();
        let mut sqlcode = 0;
        let driver: Arc<dyn trx_sql::DbDriver> = Arc::new(MemoryDriver::new());
        let mut sql = SqlExecutor::new(driver);
        let mut ctx = ExecContext { module: &module, sql: &mut sql, vars: &mut vars, sqlcode: &mut sqlcode };

        let stmt = Statement::TryCatch {
            try_body: vec![Statement::Throw(Expression::Literal(Value::object()))],
            catch_variable: "err".into(),
            catch_body: vec![],
        };
        exec_statement(&stmt, &mut ctx).await.unwrap();
        let caught = ctx.vars.get("err").unwrap().as_object().unwrap();
        assert_eq!(caught.get("message").unwrap().as_str(), Some("Exception thrown by THROW statement"));
        assert_eq!(caught.get("value").unwrap(), &Value::object());
    }

    fn assign(name: &str, n: f64) -> Statement {
        Statement::Assign {
            path: VariablePath { segments: vec![PathSegment { name: name.into(), subscript: None }] },
            value: Expression::Literal(Value::Number(n)),
        }
    }
}
