//! The borrowed view a running invocation executes against: the read-only
//! `Module`, the mutable global variable map + `sqlcode` (§9 "the only
//! mutable sharing is the global variables map held behind the interpreter
//! mutex"), and the SQL Executor. One `ExecContext` is built per top-level
//! invocation and threaded through every recursive statement/call.

use std::collections::HashMap;

use trx_core::{Module, Value};
use trx_sql::SqlExecutor;

pub struct ExecContext<'a> {
    pub module: &'a Module,
    pub sql: &'a mut SqlExecutor,
    pub vars: &'a mut HashMap<String, Value>,
    pub sqlcode: &'a mut i32,
}

impl<'a> ExecContext<'a> {
    pub fn scope(&mut self) -> trx_core::Scope<'_> {
        trx_core::Scope::new(self.vars, self.sqlcode)
    }
}

/// The outcome of executing a statement or block (§4.3, §9 "nonlocal
/// returns... modelled as signals"). `Returned` unwinds straight through
/// enclosing control constructs up to the Procedure Invoker; it is not
/// intercepted by `try`/`catch` (only `TrxError` is).
#[derive(Debug)]
pub enum Flow {
    Normal,
    Returned(Value),
}
