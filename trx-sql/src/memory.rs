//! `MemoryDriver`: the always-available reference `DbDriver` (§6.2,
//! "Non-goals" §1 exclude dialect completeness, not an in-process
//! implementation). Understands a minimal INSERT/SELECT/UPDATE/DELETE
//! subset with positional `?` placeholders and a single optional `WHERE
//! col = ?|<literal>` clause — enough to exercise the cursor lifecycle and
//! host-variable binding contract without an external database.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use trx_core::{ColumnDecl, TrxError, Value};

use crate::driver::{DbDriver, Param, Row};

#[derive(Clone)]
struct Table {
    columns: Vec<ColumnDecl>,
    rows: Vec<Row>,
}

struct OpenCursorState {
    rows: Vec<Row>,
    position: Option<usize>,
}

/// An in-memory reference implementation of [`DbDriver`]. Single-process,
/// not durable; the default driver when no external database is
/// configured (§6.2).
pub struct MemoryDriver {
    tables: Mutex<HashMap<String, Table>>,
    cursors: Mutex<HashMap<String, OpenCursorState>>,
    snapshot: Mutex<Option<HashMap<String, Table>>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        MemoryDriver {
            tables: Mutex::new(HashMap::new()),
            cursors: Mutex::new(HashMap::new()),
            snapshot: Mutex::new(None),
        }
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// A parsed statement in the minimal SQL subset this driver understands.
enum ParsedStatement {
    Insert { table: String, columns: Vec<String> },
    Select { table: String, columns: Vec<String>, filter: Option<Filter> },
    Update { table: String, assignments: Vec<String>, filter: Option<Filter> },
    Delete { table: String, filter: Option<Filter> },
}

struct Filter {
    column: String,
    /// `None` means the filter value comes from the next positional `?`.
    literal: Option<Value>,
}

fn strip_semicolon(s: &str) -> &str {
    s.trim().trim_end_matches(';').trim()
}

fn split_columns(s: &str) -> Vec<String> {
    s.split(',').map(|c| c.trim().trim_matches('"').to_uppercase()).collect()
}

fn parse_filter(clause: &str) -> Result<Filter, TrxError> {
    let clause = clause.trim();
    let (col, rhs) = clause
        .split_once('=')
        .ok_or_else(|| TrxError::database(format!("unsupported WHERE clause: {clause}")))?;
    let col = col.trim().to_uppercase();
    let rhs = rhs.trim();
    if rhs == "?" {
        Ok(Filter { column: col, literal: None })
    } else if let Ok(n) = rhs.parse::<f64>() {
        Ok(Filter { column: col, literal: Some(Value::Number(n)) })
    } else {
        let unquoted = rhs.trim_matches('\'').trim_matches('"');
        Ok(Filter { column: col, literal: Some(Value::String(unquoted.to_string())) })
    }
}

fn parse_sql(text: &str) -> Result<ParsedStatement, TrxError> {
    let text = strip_semicolon(text);
    let upper = text.to_uppercase();

    if let Some(rest) = upper.strip_prefix("INSERT INTO ") {
        let open = rest.find('(').ok_or_else(|| TrxError::database("INSERT missing column list"))?;
        let close = rest.find(')').ok_or_else(|| TrxError::database("INSERT missing closing paren"))?;
        let table = rest[..open].trim().to_string();
        let columns = split_columns(&rest[open + 1..close]);
        return Ok(ParsedStatement::Insert { table, columns });
    }

    if let Some(rest) = upper.strip_prefix("SELECT ") {
        let from_pos = rest.find(" FROM ").ok_or_else(|| TrxError::database("SELECT missing FROM"))?;
        let cols_part = rest[..from_pos].trim();
        let after_from = &rest[from_pos + 6..];
        let (table_and_rest, where_clause) = match after_from.find(" WHERE ") {
            Some(pos) => (&after_from[..pos], Some(after_from[pos + 7..].to_string())),
            None => (after_from, None),
        };
        let table = table_and_rest.trim().to_string();
        let columns = if cols_part == "*" {
            vec![]
        } else {
            split_columns(cols_part)
        };
        let filter = where_clause.as_deref().map(parse_filter).transpose()?;
        return Ok(ParsedStatement::Select { table, columns, filter });
    }

    if let Some(rest) = upper.strip_prefix("UPDATE ") {
        let set_pos = rest.find(" SET ").ok_or_else(|| TrxError::database("UPDATE missing SET"))?;
        let table = rest[..set_pos].trim().to_string();
        let after_set = &rest[set_pos + 5..];
        let (assign_part, where_clause) = match after_set.find(" WHERE ") {
            Some(pos) => (&after_set[..pos], Some(after_set[pos + 7..].to_string())),
            None => (after_set, None),
        };
        let assignments = assign_part
            .split(',')
            .map(|a| a.split('=').next().unwrap_or("").trim().to_uppercase())
            .collect();
        let filter = where_clause.as_deref().map(parse_filter).transpose()?;
        return Ok(ParsedStatement::Update { table, assignments, filter });
    }

    if let Some(rest) = upper.strip_prefix("DELETE FROM ") {
        let (table_part, where_clause) = match rest.find(" WHERE ") {
            Some(pos) => (&rest[..pos], Some(rest[pos + 7..].to_string())),
            None => (rest, None),
        };
        let table = table_part.trim().to_string();
        let filter = where_clause.as_deref().map(parse_filter).transpose()?;
        return Ok(ParsedStatement::Delete { table, filter });
    }

    Err(TrxError::database(format!("unsupported SQL statement: {text}")))
}

fn row_matches(columns: &[ColumnDecl], row: &Row, filter: &Filter, params: &[Param], param_cursor: &mut usize) -> Result<bool, TrxError> {
    let idx = columns
        .iter()
        .position(|c| c.name.eq_ignore_ascii_case(&filter.column))
        .ok_or_else(|| TrxError::database(format!("unknown column '{}'", filter.column)))?;
    let expected = match &filter.literal {
        Some(v) => v.clone(),
        None => {
            let p = params
                .get(*param_cursor)
                .ok_or_else(|| TrxError::database("not enough bound parameters for WHERE clause"))?;
            *param_cursor += 1;
            p.value.clone()
        }
    };
    Ok(row[idx].structural_eq(&expected))
}

#[async_trait]
impl DbDriver for MemoryDriver {
    async fn initialize(&self) -> Result<(), TrxError> {
        Ok(())
    }

    async fn execute_sql(&self, text: &str, params: &[Param]) -> Result<(), TrxError> {
        let parsed = parse_sql(text)?;
        let mut tables = self.tables.lock().await;
        match parsed {
            ParsedStatement::Insert { table, columns } => {
                let t = tables
                    .get_mut(&table)
                    .ok_or_else(|| TrxError::database(format!("no such table '{table}'")))?;
                let cols = if columns.is_empty() {
                    t.columns.iter().map(|c| c.name.clone()).collect()
                } else {
                    columns
                };
                if cols.len() != params.len() {
                    return Err(TrxError::database("column count does not match value count"));
                }
                let mut row = vec![Value::Null; t.columns.len()];
                for (col_name, param) in cols.iter().zip(params.iter()) {
                    let idx = t
                        .columns
                        .iter()
                        .position(|c| c.name.eq_ignore_ascii_case(col_name))
                        .ok_or_else(|| TrxError::database(format!("unknown column '{col_name}'")))?;
                    row[idx] = param.value.clone();
                }
                t.rows.push(row);
                Ok(())
            }
            ParsedStatement::Update { table, assignments, filter } => {
                let t = tables
                    .get_mut(&table)
                    .ok_or_else(|| TrxError::database(format!("no such table '{table}'")))?;
                let mut cursor = 0usize;
                let assign_values: Vec<Value> = assignments
                    .iter()
                    .map(|_| {
                        let p = params.get(cursor).cloned();
                        cursor += 1;
                        p.map(|p| p.value).unwrap_or(Value::Null)
                    })
                    .collect();
                let assign_idx: Vec<usize> = assignments
                    .iter()
                    .map(|name| {
                        t.columns
                            .iter()
                            .position(|c| c.name.eq_ignore_ascii_case(name))
                            .ok_or_else(|| TrxError::database(format!("unknown column '{name}'")))
                    })
                    .collect::<Result<_, _>>()?;
                for row in t.rows.iter_mut() {
                    let matches = match &filter {
                        Some(f) => row_matches(&t.columns, row, f, params, &mut cursor)?,
                        None => true,
                    };
                    if matches {
                        for (idx, value) in assign_idx.iter().zip(assign_values.iter()) {
                            row[*idx] = value.clone();
                        }
                    }
                }
                Ok(())
            }
            ParsedStatement::Delete { table, filter } => {
                let t = tables
                    .get_mut(&table)
                    .ok_or_else(|| TrxError::database(format!("no such table '{table}'")))?;
                match filter {
                    Some(f) => {
                        let mut cursor = 0usize;
                        let columns = t.columns.clone();
                        t.rows.retain(|row| {
                            !row_matches(&columns, row, &f, params, &mut cursor).unwrap_or(false)
                        });
                    }
                    None => t.rows.clear(),
                }
                Ok(())
            }
            ParsedStatement::Select { .. } => {
                Err(TrxError::internal("SELECT must be run through query_sql or a cursor"))
            }
        }
    }

    async fn query_sql(&self, text: &str, params: &[Param]) -> Result<Vec<Row>, TrxError> {
        let parsed = parse_sql(text)?;
        let tables = self.tables.lock().await;
        match parsed {
            ParsedStatement::Select { table, columns, filter } => {
                select_rows(&tables, &table, &columns, filter.as_ref(), params)
            }
            _ => Err(TrxError::internal("only SELECT can be run through query_sql")),
        }
    }

    async fn open_cursor(&self, name: &str, text: &str, params: &[Param]) -> Result<(), TrxError> {
        let rows = self.query_sql(text, params).await?;
        let mut cursors = self.cursors.lock().await;
        cursors.insert(name.to_string(), OpenCursorState { rows, position: None });
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
        let mut tables = self.tables.lock().await;
        tables
            .entry(name.to_string())
            .and_modify(|t| t.columns = columns.to_vec())
            .or_insert_with(|| Table { columns: columns.to_vec(), rows: Vec::new() });
        Ok(())
    }

    async fn get_table_schema(&self, name: &str) -> Result<Vec<ColumnDecl>, TrxError> {
        let tables = self.tables.lock().await;
        tables
            .get(name)
            .map(|t| t.columns.clone())
            .ok_or_else(|| TrxError::not_found(format!("no such table '{name}'")))
    }

    async fn begin_transaction(&self) -> Result<(), TrxError> {
        let tables = self.tables.lock().await.clone();
        *self.snapshot.lock().await = Some(tables);
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<(), TrxError> {
        *self.snapshot.lock().await = None;
        Ok(())
    }

    async fn rollback_transaction(&self) -> Result<(), TrxError> {
        if let Some(snapshot) = self.snapshot.lock().await.take() {
            *self.tables.lock().await = snapshot;
        }
        Ok(())
    }

    fn is_in_transaction(&self) -> bool {
        self.snapshot.try_lock().map(|g| g.is_some()).unwrap_or(false)
    }
}

fn select_rows(
    tables: &HashMap<String, Table>,
    table_name: &str,
    columns: &[String],
    filter: Option<&Filter>,
    params: &[Param],
) -> Result<Vec<Row>, TrxError> {
    let table = tables
        .get(table_name)
        .ok_or_else(|| TrxError::database(format!("no such table '{table_name}'")))?;
    let indices: Vec<usize> = if columns.is_empty() {
        (0..table.columns.len()).collect()
    } else {
        columns
            .iter()
            .map(|name| {
                table
                    .columns
                    .iter()
                    .position(|c| c.name.eq_ignore_ascii_case(name))
                    .ok_or_else(|| TrxError::database(format!("unknown column '{name}'")))
            })
            .collect::<Result<_, _>>()?
    };
    let mut out = Vec::new();
    let mut cursor = 0usize;
    for row in &table.rows {
        let include = match filter {
            Some(f) => row_matches(&table.columns, row, f, params, &mut cursor)?,
            None => true,
        };
        if include {
            out.push(indices.iter().map(|&i| row[i].clone()).collect());
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use trx_core::PrimitiveType;

    fn users_column() -> ColumnDecl {
        ColumnDecl {
            name: "NAME".into(),
            column_type: PrimitiveType::String,
            primary_key: false,
            nullable: true,
            length: None,
            scale: None,
            default: None,
        }
    }

    #[tokio::test]
    async fn insert_then_select_round_trips() {
        let driver = MemoryDriver::new();
        driver.create_or_migrate_table("USERS", &[users_column()]).await.unwrap();
        driver
            .execute_sql("INSERT INTO USERS (NAME) VALUES (?)", &[Param::positional(Value::String("Bob".into()))])
            .await
            .unwrap();
        let rows = driver.query_sql("SELECT NAME FROM USERS", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0].as_str(), Some("Bob"));
    }

    #[tokio::test]
    async fn rollback_restores_pre_transaction_state() {
        let driver = MemoryDriver::new();
        driver.create_or_migrate_table("USERS", &[users_column()]).await.unwrap();
        driver.begin_transaction().await.unwrap();
        driver
            .execute_sql("INSERT INTO USERS (NAME) VALUES (?)", &[Param::positional(Value::String("Carl".into()))])
            .await
            .unwrap();
        driver.rollback_transaction().await.unwrap();
        let rows = driver.query_sql("SELECT NAME FROM USERS", &[]).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn delete_with_where_removes_matching_row_only() {
        let driver = MemoryDriver::new();
        driver.create_or_migrate_table("USERS", &[users_column()]).await.unwrap();
        driver.execute_sql("INSERT INTO USERS (NAME) VALUES (?)", &[Param::positional(Value::String("Ann".into()))]).await.unwrap();
        driver.execute_sql("INSERT INTO USERS (NAME) VALUES (?)", &[Param::positional(Value::String("Bea".into()))]).await.unwrap();
        driver.execute_sql("DELETE FROM USERS WHERE NAME = 'Ann'", &[]).await.unwrap();
        let rows = driver.query_sql("SELECT NAME FROM USERS", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0].as_str(), Some("Bea"));
    }
}
