//! `SqliteDriver`: the `sqlite` feature's [`DbDriver`] backed by `sqlx`
//! (§6.2). Grounded on the teacher's SQLx error-bridging and transaction
//! patterns (`SqlxErrorExt`, `Tx`), adapted from the `#[managed]` handler
//! lifecycle to the single coarse-mutex invocation model this runtime uses
//! instead.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteArguments, SqlitePoolOptions, SqliteRow};
use sqlx::{Arguments, Column, Row as SqlxRow, Sqlite, SqlitePool, Transaction, TypeInfo, ValueRef};
use tokio::sync::Mutex;

use trx_core::{ColumnDecl, PrimitiveType, TrxError, Value};

use crate::driver::{DbDriver, Param, Row};

/// Bridges a `sqlx::Error` into the runtime's own error taxonomy. Orphan
/// rules rule out a blanket `From` impl across the crate boundary, so this
/// mirrors the teacher's `SqlxErrorExt` trait instead of silently eating
/// the distinction.
trait SqlxErrorExt {
    fn into_trx_error(self) -> TrxError;
}

impl SqlxErrorExt for sqlx::Error {
    fn into_trx_error(self) -> TrxError {
        match &self {
            sqlx::Error::RowNotFound => TrxError::not_found("row not found"),
            other => TrxError::database(other.to_string()),
        }
    }
}

struct OpenCursorState {
    rows: Vec<Row>,
    position: Option<usize>,
}

/// A `DbDriver` backed by a SQLite file or in-memory database via `sqlx`
/// (§6.2). Cursors are materialised eagerly on open rather than streamed,
/// trading large-result-set memory for a driver implementation simple
/// enough to reason about inside the interpreter's coarse mutex.
pub struct SqliteDriver {
    pool: SqlitePool,
    tx: Mutex<Option<Transaction<'static, Sqlite>>>,
    cursors: Mutex<HashMap<String, OpenCursorState>>,
}

impl SqliteDriver {
    pub async fn connect(url: &str) -> Result<Self, TrxError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(SqlxErrorExt::into_trx_error)?;
        Ok(SqliteDriver { pool, tx: Mutex::new(None), cursors: Mutex::new(HashMap::new()) })
    }

    fn bind_args(params: &[Param]) -> Result<SqliteArguments<'static>, TrxError> {
        let mut args = SqliteArguments::default();
        for p in params {
            match &p.value {
                Value::Null => args.add(None::<String>).map_err(|e| TrxError::database(e.to_string()))?,
                Value::Bool(b) => args.add(if *b { 1i64 } else { 0i64 }).map_err(|e| TrxError::database(e.to_string()))?,
                Value::Number(n) => args.add(*n).map_err(|e| TrxError::database(e.to_string()))?,
                Value::String(s) => args.add(s.clone()).map_err(|e| TrxError::database(e.to_string()))?,
                other => {
                    return Err(TrxError::type_error(format!(
                        "cannot bind a {} as a SQL parameter",
                        other.kind_name()
                    )))
                }
            }
        }
        Ok(args)
    }

    fn row_to_values(row: &SqliteRow) -> Result<Row, TrxError> {
        let mut out = Vec::with_capacity(row.columns().len());
        for i in 0..row.columns().len() {
            let raw = row.try_get_raw(i).map_err(|e| TrxError::database(e.to_string()))?;
            if raw.is_null() {
                out.push(Value::Null);
                continue;
            }
            let type_name = raw.type_info().name();
            let value = match type_name {
                "TEXT" | "VARCHAR" | "DATE" | "TIME" | "DATETIME" => {
                    Value::String(row.try_get::<String, _>(i).map_err(|e| TrxError::database(e.to_string()))?)
                }
                "BOOLEAN" => Value::Bool(row.try_get::<bool, _>(i).map_err(|e| TrxError::database(e.to_string()))?),
                "REAL" => Value::Number(row.try_get::<f64, _>(i).map_err(|e| TrxError::database(e.to_string()))?),
                _ => Value::Number(row.try_get::<i64, _>(i).map_err(|e| TrxError::database(e.to_string()))? as f64),
            };
            out.push(value);
        }
        Ok(out)
    }

    fn column_ddl(col: &ColumnDecl) -> String {
        let sql_type = match col.column_type {
            PrimitiveType::Integer => "INTEGER",
            PrimitiveType::Decimal => "REAL",
            PrimitiveType::Boolean => "INTEGER",
            PrimitiveType::String => "TEXT",
            PrimitiveType::Date | PrimitiveType::Time | PrimitiveType::Timestamp => "TEXT",
        };
        let mut ddl = format!("{} {}", col.name, sql_type);
        if col.primary_key {
            ddl.push_str(" PRIMARY KEY");
        } else if !col.nullable {
            ddl.push_str(" NOT NULL");
        }
        ddl
    }
}

#[async_trait]
impl DbDriver for SqliteDriver {
    async fn initialize(&self) -> Result<(), TrxError> {
        sqlx::query("PRAGMA foreign_keys = ON;")
            .execute(&self.pool)
            .await
            .map_err(SqlxErrorExt::into_trx_error)?;
        Ok(())
    }

    async fn execute_sql(&self, text: &str, params: &[Param]) -> Result<(), TrxError> {
        let args = Self::bind_args(params)?;
        let query = sqlx::query_with(text, args);
        let mut guard = self.tx.lock().await;
        match guard.as_mut() {
            Some(tx) => query.execute(&mut **tx).await,
            None => query.execute(&self.pool).await,
        }
        .map_err(SqlxErrorExt::into_trx_error)?;
        Ok(())
    }

    async fn query_sql(&self, text: &str, params: &[Param]) -> Result<Vec<Row>, TrxError> {
        let args = Self::bind_args(params)?;
        let query = sqlx::query_with(text, args);
        let mut guard = self.tx.lock().await;
        let rows = match guard.as_mut() {
            Some(tx) => query.fetch_all(&mut **tx).await,
            None => query.fetch_all(&self.pool).await,
        }
        .map_err(SqlxErrorExt::into_trx_error)?;
        rows.iter().map(Self::row_to_values).collect()
    }

    async fn open_cursor(&self, name: &str, text: &str, params: &[Param]) -> Result<(), TrxError> {
        let rows = self.query_sql(text, params).await?;
        self.cursors
            .lock()
            .await
            .insert(name.to_string(), OpenCursorState { rows, position: None });
        Ok(())
    }

    async fn cursor_next(&self, name: &str) -> Result<bool, TrxError> {
        let mut cursors = self.cursors.lock().await;
        let state = cursors
            .get_mut(name)
            .ok_or_else(|| TrxError::not_found(format!("cursor '{name}' is not open")))?;
        let next = state.position.map(|p| p + 1).unwrap_or(0);
        if next < state.rows.len() {
            state.position = Some(next);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn cursor_get_row(&self, name: &str) -> Result<Row, TrxError> {
        let cursors = self.cursors.lock().await;
        let state = cursors
            .get(name)
            .ok_or_else(|| TrxError::not_found(format!("cursor '{name}' is not open")))?;
        let pos = state
            .position
            .ok_or_else(|| TrxError::internal(format!("cursor '{name}' has not been advanced")))?;
        Ok(state.rows[pos].clone())
    }

    async fn close_cursor(&self, name: &str) -> Result<(), TrxError> {
        self.cursors.lock().await.remove(name);
        Ok(())
    }

    async fn create_or_migrate_table(&self, name: &str, columns: &[ColumnDecl]) -> Result<(), TrxError> {
        let cols = columns.iter().map(Self::column_ddl).collect::<Vec<_>>().join(", ");
        let ddl = format!("CREATE TABLE IF NOT EXISTS {name} ({cols})");
        sqlx::query(&ddl).execute(&self.pool).await.map_err(SqlxErrorExt::into_trx_error)?;
        Ok(())
    }

    async fn get_table_schema(&self, name: &str) -> Result<Vec<ColumnDecl>, TrxError> {
        let rows = sqlx::query(&format!("PRAGMA table_info({name})"))
            .fetch_all(&self.pool)
            .await
            .map_err(SqlxErrorExt::into_trx_error)?;
        if rows.is_empty() {
            return Err(TrxError::not_found(format!("no such table '{name}'")));
        }
        rows.iter()
            .map(|row| {
                let col_name: String = row.try_get("name").map_err(|e| TrxError::database(e.to_string()))?;
                let decl_type: String = row.try_get("type").map_err(|e| TrxError::database(e.to_string()))?;
                let notnull: i64 = row.try_get("notnull").map_err(|e| TrxError::database(e.to_string()))?;
                let pk: i64 = row.try_get("pk").map_err(|e| TrxError::database(e.to_string()))?;
                let column_type = match decl_type.to_uppercase().as_str() {
                    "INTEGER" => PrimitiveType::Integer,
                    "REAL" => PrimitiveType::Decimal,
                    _ => PrimitiveType::String,
                };
                Ok(ColumnDecl {
                    name: col_name,
                    column_type,
                    primary_key: pk != 0,
                    nullable: notnull == 0,
                    length: None,
                    scale: None,
                    default: None,
                })
            })
            .collect()
    }

    async fn begin_transaction(&self) -> Result<(), TrxError> {
        let tx = self.pool.begin().await.map_err(SqlxErrorExt::into_trx_error)?;
        *self.tx.lock().await = Some(tx);
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<(), TrxError> {
        if let Some(tx) = self.tx.lock().await.take() {
            tx.commit().await.map_err(SqlxErrorExt::into_trx_error)?;
        }
        Ok(())
    }

    async fn rollback_transaction(&self) -> Result<(), TrxError> {
        if let Some(tx) = self.tx.lock().await.take() {
            tx.rollback().await.map_err(SqlxErrorExt::into_trx_error)?;
        }
        Ok(())
    }

    fn is_in_transaction(&self) -> bool {
        self.tx.try_lock().map(|g| g.is_some()).unwrap_or(true)
    }
}
