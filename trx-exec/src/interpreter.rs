//! The `Interpreter`: binds a `Module` to exactly one database driver and
//! owns the global variable scope, `sqlcode`, and cursor map behind a
//! single coarse lock (§3 "Lifecycle", §5 "Shared state").
//!
//! `tokio::sync::Mutex` is used rather than `std::sync::Mutex` because the
//! lock is held across `.await` points for the whole procedure invocation
//! (SQL Executor calls, nested `call` invocations) — exactly the case the
//! async-aware mutex exists for.

use std::collections::HashMap;
use std::sync::Arc;

use trx_core::{Module, ProcedureDecl, TrxError, Value};
use trx_sql::{DbDriver, SqlExecutor};

use crate::context::ExecContext;
use crate::invoke;

struct State {
    vars: HashMap<String, Value>,
    sqlcode: i32,
    sql: SqlExecutor,
}

/// Owns one `Module` plus the mutable runtime state a sequence of procedure
/// invocations operates on (§3, §5). Cheaply `Arc`-shared across the
/// worker pool's connection-handling tasks.
pub struct Interpreter {
    module: Module,
    state: tokio::sync::Mutex<State>,
}

impl Interpreter {
    pub fn new(module: Module, driver: Arc<dyn DbDriver>) -> Self {
        Interpreter {
            module,
            state: tokio::sync::Mutex::new(State {
                vars: HashMap::new(),
                sqlcode: 0,
                sql: SqlExecutor::new(driver),
            }),
        }
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Looks up `name` among the module's HTTP-exported procedures and
    /// invokes it (the HTTP Dispatcher's entry point, §4.6).
    pub async fn invoke_exported(
        &self,
        name: &str,
        input: Value,
        path_params: HashMap<String, String>,
    ) -> Result<Value, TrxError> {
        let proc = self
            .module
            .find_procedure(name)
            .filter(|p| p.is_exported)
            .ok_or_else(|| TrxError::not_found(format!("no exported procedure named '{name}'")))?
            .clone();
        self.run(&proc, input, path_params).await
    }

    /// Invokes any procedure by name regardless of HTTP export status —
    /// used by tests and by embedders driving the interpreter directly.
    pub async fn invoke_by_name(&self, name: &str, input: Value) -> Result<Value, TrxError> {
        let proc = self
            .module
            .find_procedure(name)
            .ok_or_else(|| TrxError::not_found(format!("no procedure named '{name}'")))?
            .clone();
        self.run(&proc, input, HashMap::new()).await
    }

    async fn run(
        &self,
        proc: &ProcedureDecl,
        input: Value,
        path_params: HashMap<String, String>,
    ) -> Result<Value, TrxError> {
        let mut state = self.state.lock().await;
        let State { vars, sqlcode, sql } = &mut *state;
        let mut ctx = ExecContext { module: &self.module, sql, vars, sqlcode };

        tracing::info!(procedure = %proc.name, "invoking procedure");
        let result = invoke::invoke(&mut ctx, proc, input, &path_params).await;
        match &result {
            Ok(_) => tracing::info!(procedure = %proc.name, "procedure completed"),
            Err(e) if e.is_explicit_throw() => {
                tracing::warn!(procedure = %proc.name, error = %e, "procedure threw")
            }
            Err(e) => tracing::error!(procedure = %proc.name, error = %e, "procedure failed"),
        }
        result
    }
}
