//! The SQL Executor (§4.4): runs `SqlStatement`s against a `DbDriver`,
//! owning the per-interpreter cursor table and propagating `sqlcode`.
//!
//! One `SqlExecutor` lives for the whole process (it wraps a single driver
//! connection/pool); the cursor table it owns is keyed by cursor name and
//! is therefore shared across concurrent invocations exactly like the
//! interpreter's global variable map — both sit behind the same coarse
//! mutex in `trx-exec`, so no additional synchronisation is needed here.

use std::collections::HashMap;
use std::sync::Arc;

use trx_core::{Expression, Scope, SqlStatement, TrxError, Value, VariablePath};

use crate::driver::{coerce_for_bind, DbDriver, Param};

/// A cursor's lifecycle state (§4.4: "Declared -> Open -> Exhausted / Closed").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Declared,
    Open,
    Exhausted,
    Closed,
}

struct CursorEntry {
    text: Expression,
    host_vars: Vec<VariablePath>,
    state: CursorState,
}

/// `sqlcode` conventions used throughout this executor (§4.4, §7):
/// `0` on success, `100` at cursor end-of-data, any other nonzero value on
/// a driver-reported error.
pub const SQLCODE_OK: i32 = 0;
pub const SQLCODE_NO_DATA: i32 = 100;
pub const SQLCODE_ERROR: i32 = -1;

/// Runs embedded-SQL statements against a `DbDriver`, tracking declared
/// cursors by name (§4.4, §6.2).
pub struct SqlExecutor {
    driver: Arc<dyn DbDriver>,
    cursors: HashMap<String, CursorEntry>,
}

impl SqlExecutor {
    pub fn new(driver: Arc<dyn DbDriver>) -> Self {
        SqlExecutor { driver, cursors: HashMap::new() }
    }

    pub fn driver(&self) -> &Arc<dyn DbDriver> {
        &self.driver
    }

    /// Executes one `SqlStatement`, updating `scope`'s `sqlcode` and, for
    /// `Fetch`, the target host variables (§4.4).
    pub async fn exec(&mut self, stmt: &SqlStatement, scope: &mut Scope<'_>) -> Result<(), TrxError> {
        match stmt {
            SqlStatement::ExecImmediate { text, host_vars } => {
                self.exec_immediate(text, host_vars, scope).await
            }
            SqlStatement::DeclareCursor { name, text, host_vars } => {
                self.declare_cursor(name, text, host_vars, scope)
            }
            SqlStatement::OpenCursor { name, using_vars } => {
                self.open_cursor(name, using_vars.as_deref(), scope).await
            }
            SqlStatement::FetchCursor { name, target_vars } => {
                self.fetch_cursor(name, target_vars, scope).await
            }
            SqlStatement::CloseCursor { name } => self.close_cursor(name, scope).await,
            SqlStatement::Begin => self.begin(scope).await,
            SqlStatement::Commit => self.commit(scope).await,
            SqlStatement::Rollback => self.rollback(scope).await,
        }
    }

    fn sql_text(&self, text: &Expression, scope: &mut Scope<'_>) -> Result<String, TrxError> {
        let value = trx_eval::eval(text, scope)?;
        match value {
            Value::String(s) => Ok(s),
            other => Err(TrxError::type_error(format!(
                "SQL text must evaluate to a String, got {}",
                other.kind_name()
            ))),
        }
    }

    fn bind_params(host_vars: &[VariablePath], scope: &mut Scope<'_>) -> Result<Vec<Param>, TrxError> {
        host_vars
            .iter()
            .map(|path| {
                let value = trx_eval::resolve_read(path, scope)?;
                Ok(Param::positional(coerce_for_bind(value)))
            })
            .collect()
    }

    /// Records the outcome of a driver call into `sqlcode` (§4.4/§7): `0` on
    /// success, `-1` on a `DatabaseError`. Any other error kind (a
    /// programmer mistake such as binding a missing variable) is left
    /// unreflected in `sqlcode` and propagates to the caller unchanged.
    fn record_outcome<T>(scope: &mut Scope<'_>, result: Result<T, TrxError>) -> Result<T, TrxError> {
        match &result {
            Ok(_) => scope.set_sqlcode(SQLCODE_OK),
            Err(TrxError::Database(_)) => scope.set_sqlcode(SQLCODE_ERROR),
            Err(_) => {}
        }
        result
    }

    async fn exec_immediate(
        &mut self,
        text: &Expression,
        host_vars: &[VariablePath],
        scope: &mut Scope<'_>,
    ) -> Result<(), TrxError> {
        let sql = self.sql_text(text, scope)?;
        let params = Self::bind_params(host_vars, scope)?;
        let result = self.driver.execute_sql(&sql, &params).await;
        Self::record_outcome(scope, result)
    }

    /// Replacing an existing Declared/Closed cursor overwrites; replacing an
    /// Open one raises (§4.4: "Replacing an existing Declared/Closed cursor
    /// overwrites; replacing Open raises").
    fn declare_cursor(
        &mut self,
        name: &str,
        text: &Expression,
        host_vars: &[VariablePath],
        scope: &mut Scope<'_>,
    ) -> Result<(), TrxError> {
        if let Some(existing) = self.cursors.get(name) {
            if existing.state == CursorState::Open {
                return Err(TrxError::internal(format!(
                    "cannot re-declare cursor '{name}' while it is open"
                )));
            }
        }
        self.cursors.insert(
            name.to_string(),
            CursorEntry { text: text.clone(), host_vars: host_vars.to_vec(), state: CursorState::Declared },
        );
        scope.set_sqlcode(SQLCODE_OK);
        Ok(())
    }

    async fn open_cursor(
        &mut self,
        name: &str,
        using_vars: Option<&[VariablePath]>,
        scope: &mut Scope<'_>,
    ) -> Result<(), TrxError> {
        let (sql, host_vars_owned);
        {
            let entry = self
                .cursors
                .get(name)
                .ok_or_else(|| TrxError::not_found(format!("cursor '{name}' was never declared")))?;
            if entry.state == CursorState::Open {
                return Err(TrxError::internal(format!("cursor '{name}' is already open")));
            }
            sql = self.sql_text(&entry.text, scope)?;
            host_vars_owned = entry.host_vars.clone();
        }
        let bind_vars = using_vars.unwrap_or(&host_vars_owned);
        let params = Self::bind_params(bind_vars, scope)?;
        let result = self.driver.open_cursor(name, &sql, &params).await;
        let result = Self::record_outcome(scope, result);
        if result.is_ok() {
            self.cursors.get_mut(name).expect("checked above").state = CursorState::Open;
        }
        result
    }

    async fn fetch_cursor(
        &mut self,
        name: &str,
        target_vars: &[VariablePath],
        scope: &mut Scope<'_>,
    ) -> Result<(), TrxError> {
        {
            let entry = self
                .cursors
                .get(name)
                .ok_or_else(|| TrxError::not_found(format!("cursor '{name}' was never declared")))?;
            if entry.state != CursorState::Open {
                return Err(TrxError::internal(format!("cursor '{name}' is not open")));
            }
        }
        let has_next = match self.driver.cursor_next(name).await {
            Ok(v) => v,
            Err(e) => {
                scope.set_sqlcode(SQLCODE_ERROR);
                return Err(e);
            }
        };
        if !has_next {
            self.cursors.get_mut(name).expect("checked above").state = CursorState::Exhausted;
            scope.set_sqlcode(SQLCODE_NO_DATA);
            return Ok(());
        }
        let row = self.driver.cursor_get_row(name).await?;
        if row.len() != target_vars.len() {
            return Err(TrxError::internal(format!(
                "cursor '{name}' produced {} columns but fetch names {} target variables",
                row.len(),
                target_vars.len()
            )));
        }
        for (path, value) in target_vars.iter().zip(row.into_iter()) {
            trx_eval::resolve_write(path, scope, value)?;
        }
        scope.set_sqlcode(SQLCODE_OK);
        Ok(())
    }

    async fn close_cursor(&mut self, name: &str, scope: &mut Scope<'_>) -> Result<(), TrxError> {
        let result = self.driver.close_cursor(name).await;
        let result = Self::record_outcome(scope, result);
        if result.is_ok() {
            if let Some(entry) = self.cursors.get_mut(name) {
                entry.state = CursorState::Closed;
            }
        }
        result
    }

    async fn begin(&mut self, scope: &mut Scope<'_>) -> Result<(), TrxError> {
        let result = self.driver.begin_transaction().await;
        Self::record_outcome(scope, result)
    }

    async fn commit(&mut self, scope: &mut Scope<'_>) -> Result<(), TrxError> {
        let result = self.driver.commit_transaction().await;
        Self::record_outcome(scope, result)
    }

    async fn rollback(&mut self, scope: &mut Scope<'_>) -> Result<(), TrxError> {
        let result = self.driver.rollback_transaction().await;
        Self::record_outcome(scope, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDriver;
    use std::collections::HashMap as StdHashMap;
    use trx_core::{ColumnDecl, PathSegment, PrimitiveType};

    fn with_scope<F: FnOnce(&mut Scope<'_>)>(f: F) {
        let mut vars = StdHashMap::new();
        let mut sqlcode = 0;
        let mut scope = Scope::new(&mut vars, &mut sqlcode);
        f(&mut scope);
    }

    #[tokio::test]
    async fn exec_immediate_creates_and_inserts_row() {
        let driver: Arc<dyn DbDriver> = Arc::new(MemoryDriver::new());
        driver
            .create_or_migrate_table(
                "USERS",
                &[ColumnDecl {
                    name: "NAME".into(),
                    column_type: PrimitiveType::String,
                    primary_key: false,
                    nullable: true,
                    length: None,
                    scale: None,
                    default: None,
                }],
            )
            .await
            .unwrap();
        let mut exec = SqlExecutor::new(driver);
        with_scope(|scope| {
            scope.set("name", Value::String("Alice".into()));
        });
        let mut vars = StdHashMap::new();
        vars.insert("name".to_string(), Value::String("Alice".into()));
        let mut sqlcode = 0;
        let mut scope = Scope::new(&mut vars, &mut sqlcode);

        let stmt = SqlStatement::ExecImmediate {
            text: Expression::Literal(Value::String("INSERT INTO USERS (NAME) VALUES (?)".into())),
            host_vars: vec![VariablePath::simple("name")],
        };
        exec.exec(&stmt, &mut scope).await.unwrap();
        assert_eq!(scope.sqlcode(), SQLCODE_OK);
    }

    #[tokio::test]
    async fn fetch_past_end_sets_sqlcode_100_and_exhausts() {
        let driver: Arc<dyn DbDriver> = Arc::new(MemoryDriver::new());
        driver
            .create_or_migrate_table(
                "ITEMS",
                &[ColumnDecl {
                    name: "N".into(),
                    column_type: PrimitiveType::Integer,
                    primary_key: false,
                    nullable: true,
                    length: None,
                    scale: None,
                    default: None,
                }],
            )
            .await
            .unwrap();
        driver.execute_sql("INSERT INTO ITEMS (N) VALUES (?)", &[Param::positional(Value::Number(1.0))]).await.unwrap();
        let mut exec = SqlExecutor::new(driver);

        let mut vars = StdHashMap::new();
        vars.insert("n".to_string(), Value::Null);
        let mut sqlcode = 0;
        let mut scope = Scope::new(&mut vars, &mut sqlcode);

        exec.exec(
            &SqlStatement::DeclareCursor {
                name: "c1".into(),
                text: Expression::Literal(Value::String("SELECT N FROM ITEMS".into())),
                host_vars: vec![],
            },
            &mut scope,
        )
        .await
        .unwrap();
        exec.exec(&SqlStatement::OpenCursor { name: "c1".into(), using_vars: None }, &mut scope)
            .await
            .unwrap();

        let fetch = SqlStatement::FetchCursor {
            name: "c1".into(),
            target_vars: vec![VariablePath { segments: vec![PathSegment { name: "n".into(), subscript: None }] }],
        };
        exec.exec(&fetch, &mut scope).await.unwrap();
        assert_eq!(scope.sqlcode(), SQLCODE_OK);
        assert_eq!(scope.get("n").unwrap().as_number(), Some(1.0));

        exec.exec(&fetch, &mut scope).await.unwrap();
        assert_eq!(scope.sqlcode(), SQLCODE_NO_DATA);
        assert_eq!(exec.cursors.get("c1").unwrap().state, CursorState::Exhausted);
    }

    #[tokio::test]
    async fn redeclaring_an_open_cursor_raises() {
        let driver: Arc<dyn DbDriver> = Arc::new(MemoryDriver::new());
        let mut exec = SqlExecutor::new(driver);
        let mut vars = StdHashMap::new();
        let mut sqlcode = 0;
        let mut scope = Scope::new(&mut vars, &mut sqlcode);

        let declare = SqlStatement::DeclareCursor {
            name: "c1".into(),
            text: Expression::Literal(Value::String("SELECT 1".into())),
            host_vars: vec![],
        };
        exec.exec(&declare, &mut scope).await.unwrap();
        exec.exec(&SqlStatement::OpenCursor { name: "c1".into(), using_vars: None }, &mut scope)
            .await
            .unwrap();

        assert!(exec.exec(&declare, &mut scope).await.is_err());
    }

    #[tokio::test]
    async fn redeclaring_a_closed_cursor_is_reusable() {
        let driver: Arc<dyn DbDriver> = Arc::new(MemoryDriver::new());
        let mut exec = SqlExecutor::new(driver);
        let mut vars = StdHashMap::new();
        let mut sqlcode = 0;
        let mut scope = Scope::new(&mut vars, &mut sqlcode);

        let declare = SqlStatement::DeclareCursor {
            name: "c1".into(),
            text: Expression::Literal(Value::String("SELECT 1".into())),
            host_vars: vec![],
        };
        exec.exec(&declare, &mut scope).await.unwrap();
        exec.exec(&SqlStatement::OpenCursor { name: "c1".into(), using_vars: None }, &mut scope)
            .await
            .unwrap();
        exec.exec(&SqlStatement::CloseCursor { name: "c1".into() }, &mut scope).await.unwrap();

        // §8 round-trip law: DECLARE; OPEN; CLOSE; OPEN; CLOSE is legal.
        exec.exec(&declare, &mut scope).await.unwrap();
        exec.exec(&SqlStatement::OpenCursor { name: "c1".into(), using_vars: None }, &mut scope)
            .await
            .unwrap();
        exec.exec(&SqlStatement::CloseCursor { name: "c1".into() }, &mut scope).await.unwrap();
        assert_eq!(exec.cursors.get("c1").unwrap().state, CursorState::Closed);
    }
}
