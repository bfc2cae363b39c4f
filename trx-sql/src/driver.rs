//! The abstract database driver contract (§6.2).
//!
//! An implementation must provide exec/query/cursor-lifecycle/schema-sync/
//! transaction operations. No inheritance — the driver is an
//! interface-shaped parameter (a `dyn DbDriver`) passed into the
//! interpreter at construction (§9 "Polymorphism over driver").

use async_trait::async_trait;

use trx_core::{ColumnDecl, TrxError, Value};

/// A single bound parameter: positional binding is mandatory, named binding
/// optional (§6.2).
#[derive(Debug, Clone)]
pub struct Param {
    pub name: Option<String>,
    pub value: Value,
}

impl Param {
    pub fn positional(value: Value) -> Self {
        Param { name: None, value }
    }

    pub fn named(name: impl Into<String>, value: Value) -> Self {
        Param { name: Some(name.into()), value }
    }
}

/// An ordered sequence of column values (§6.2). `NULL` is `Value::Null`.
pub type Row = Vec<Value>;

/// The abstract database driver contract (§6.2). Implementations:
/// `MemoryDriver` (always available) and `SqliteDriver` (feature `sqlite`,
/// backed by `sqlx`).
#[async_trait]
pub trait DbDriver: Send + Sync {
    async fn initialize(&self) -> Result<(), TrxError>;

    async fn execute_sql(&self, text: &str, params: &[Param]) -> Result<(), TrxError>;

    async fn query_sql(&self, text: &str, params: &[Param]) -> Result<Vec<Row>, TrxError>;

    async fn open_cursor(&self, name: &str, text: &str, params: &[Param]) -> Result<(), TrxError>;

    /// Advances the named driver-level cursor one row. Returns `false` at
    /// end-of-set.
    async fn cursor_next(&self, name: &str) -> Result<bool, TrxError>;

    /// Returns the row the cursor is currently positioned on. Only valid
    /// immediately after a `cursor_next` that returned `true`.
    async fn cursor_get_row(&self, name: &str) -> Result<Row, TrxError>;

    async fn close_cursor(&self, name: &str) -> Result<(), TrxError>;

    async fn create_or_migrate_table(&self, name: &str, columns: &[ColumnDecl]) -> Result<(), TrxError>;

    async fn get_table_schema(&self, name: &str) -> Result<Vec<ColumnDecl>, TrxError>;

    async fn begin_transaction(&self) -> Result<(), TrxError>;

    async fn commit_transaction(&self) -> Result<(), TrxError>;

    async fn rollback_transaction(&self) -> Result<(), TrxError>;

    fn is_in_transaction(&self) -> bool;
}

/// Converts a bound host-variable `Value` into the form the driver contract
/// expects at bind time (§4.4): `Bool` becomes integer 0/1 for backends
/// without a native boolean, `Number` becomes an integer `Value` when it
/// has no fractional part, `Null`/`String` pass through unchanged.
pub fn coerce_for_bind(value: Value) -> Value {
    match value {
        Value::Bool(b) => Value::Number(if b { 1.0 } else { 0.0 }),
        other => other,
    }
}
