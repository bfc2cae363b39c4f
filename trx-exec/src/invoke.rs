//! The Procedure Invoker (§4.5): binds `input`/`output`/path-parameter
//! variables, runs the body, captures the return value.
//!
//! Runs directly against the caller's already-locked `ExecContext` — both
//! the top-level entry from `Interpreter::invoke` and the recursive
//! `call name(in, out)` statement share this one function, so a nested
//! call never re-acquires the interpreter's coarse mutex (§5: "a single
//! invocation sees a consistent view of its own cursors and `sqlcode`").

use std::collections::HashMap;

use async_recursion::async_recursion;

use trx_core::{PrimitiveType, ProcedureDecl, Scope, ScopeOverlay, TrxError, Value};

use crate::context::{ExecContext, Flow};
use crate::statement::exec_block;

/// Coerces a raw path-parameter string to its declared type (§4.5 step 3).
pub fn coerce_path_param(raw: &str, ty: PrimitiveType) -> Result<Value, TrxError> {
    match ty {
        PrimitiveType::Integer | PrimitiveType::Decimal => raw
            .parse::<f64>()
            .map(Value::Number)
            .map_err(|_| TrxError::type_error(format!("path parameter '{raw}' is not a number"))),
        PrimitiveType::Boolean => match raw {
            "1" | "true" | "TRUE" => Ok(Value::Bool(true)),
            "0" | "false" | "FALSE" => Ok(Value::Bool(false)),
            other => Err(TrxError::type_error(format!("path parameter '{other}' is not a boolean"))),
        },
        PrimitiveType::String | PrimitiveType::Date | PrimitiveType::Time | PrimitiveType::Timestamp => {
            Ok(Value::String(raw.to_string()))
        }
    }
}

/// Runs `proc`'s body against `ctx` with `input` and `path_params` bound
/// per §4.5's algorithm, returning the procedure's output (or the literal
/// string `"no output"` if it declares none).
#[async_recursion]
pub async fn invoke(
    ctx: &mut ExecContext<'_>,
    proc: &ProcedureDecl,
    input: Value,
    path_params: &HashMap<String, String>,
) -> Result<Value, TrxError> {
    let mut overlay = ScopeOverlay::new();
    {
        let mut scope = Scope::new(ctx.vars, ctx.sqlcode);
        overlay.bind(&mut scope, "input", input.clone());
        if let Some(decl) = &proc.input {
            overlay.bind(&mut scope, decl.name.clone(), input);
        }
        for p in &proc.path_parameters {
            let raw = path_params.get(&p.name).cloned().unwrap_or_default();
            let coerced = coerce_path_param(&raw, p.param_type)?;
            overlay.bind(&mut scope, p.name.clone(), coerced);
        }
        overlay.bind(&mut scope, "output", Value::object());
    }

    let flow = exec_block(&proc.body, ctx).await;

    let output = ctx.vars.get("output").cloned().unwrap_or(Value::object());
    {
        let mut scope = Scope::new(ctx.vars, ctx.sqlcode);
        overlay.unwind(&mut scope);
    }

    let final_output = match flow? {
        Flow::Returned(v) => v,
        Flow::Normal => output,
    };

    if proc.output.is_some() {
        Ok(final_output)
    } else {
        Ok(Value::String("no output".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use trx_core::{Expression, Module, ParamDecl, Statement, VariablePath};
    use trx_sql::{MemoryDriver, SqlExecutor};

    fn identity_procedure() -> ProcedureDecl {
        ProcedureDecl {
            name: "copy".into(),
            path_template: None,
            path_parameters: vec![],
            http_method: None,
            http_headers: vec![],
            input: Some(ParamDecl { name: "c".into(), type_name: "CUSTOMER".into() }),
            output: Some(ParamDecl { name: "r".into(), type_name: "CUSTOMER".into() }),
            is_exported: true,
            body: vec![
                Statement::Assign { path: VariablePath::simple("r"), value: Expression::Variable(VariablePath::simple("c")) },
                Statement::Return(Expression::Variable(VariablePath::simple("r"))),
            ],
            location: None,
        }
    }

    #[tokio::test]
    async fn identity_copy_returns_input_unchanged() {
        let module = Module::default();
        let mut vars = std::collections::HashMap::new();
        let mut sqlcode = 0;
        let driver: Arc<dyn trx_sql::DbDriver> = Arc::new(MemoryDriver::new());
        let mut sql = SqlExecutor::new(driver);
        let mut ctx = ExecContext { module: &module, sql: &mut sql, vars: &mut vars, sqlcode: &mut sqlcode };

        let proc = identity_procedure();
        let mut fields = std::collections::BTreeMap::new();
        fields.insert("NAME".to_string(), Value::String("Alice".into()));
        fields.insert("ZIP".to_string(), Value::Number(12345.0));
        let input = Value::Object(fields.clone());

        let output = invoke(&mut ctx, &proc, input, &HashMap::new()).await.unwrap();
        assert_eq!(output, Value::Object(fields));
        assert!(!ctx.vars.contains_key("input"), "overlay bindings must be unwound");
    }
}
