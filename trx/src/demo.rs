//! The demo `Module` this binary serves (§1: turning TRX source into a
//! `Module` is the parser's job, out of scope here). Built directly as Rust
//! values, the way the reference framework's example app builds its routes
//! programmatically instead of loading them from a descriptor file.
//!
//! Mirrors §8 scenario 1 (`CUSTOMER` record, identity `copy`) and scenario 2
//! (switch/default `classify`), plus a small `CUSTOMERS` table exercised
//! through `create_customer`/`get_customer_by_zip`/`list_customers` to show
//! the embedded-SQL surface (host-variable binding, cursor declare/open/
//! fetch/close, the `sqlcode` loop idiom) end to end over the one table.

use trx_core::{
    BinaryOp, Builtin, ColumnDecl, Expression, FieldDecl, Module, ParamDecl, PathParamDecl,
    PathSegment, PrimitiveType, ProcedureDecl, RecordDecl, SqlStatement, Statement, TableDecl,
    VariablePath,
};

fn path(segments: &[&str]) -> VariablePath {
    VariablePath {
        segments: segments
            .iter()
            .map(|s| PathSegment { name: (*s).to_string(), subscript: None })
            .collect(),
    }
}

fn subscripted(head: &str, index_var: &str, tail: &[&str]) -> VariablePath {
    let mut segments = vec![PathSegment {
        name: head.to_string(),
        subscript: Some(Box::new(Expression::Variable(path(&[index_var])))),
    }];
    segments.extend(tail.iter().map(|s| PathSegment { name: (*s).to_string(), subscript: None }));
    VariablePath { segments }
}

fn var(segments: &[&str]) -> Expression {
    Expression::Variable(path(segments))
}

fn assign(segments: &[&str], value: Expression) -> Statement {
    Statement::Assign { path: path(segments), value }
}

fn customer_record() -> RecordDecl {
    RecordDecl {
        name: "CUSTOMER".into(),
        fields: vec![
            FieldDecl {
                name: "NAME".into(),
                field_type: PrimitiveType::String,
                length: Some(64),
                scale: None,
                json_alias: None,
                omit_empty: false,
            },
            FieldDecl {
                name: "ZIP".into(),
                field_type: PrimitiveType::Integer,
                length: None,
                scale: None,
                json_alias: None,
                omit_empty: false,
            },
        ],
        location: None,
    }
}

fn classify_request_record() -> RecordDecl {
    RecordDecl {
        name: "CLASSIFY_REQUEST".into(),
        fields: vec![FieldDecl {
            name: "VALUE".into(),
            field_type: PrimitiveType::Integer,
            length: None,
            scale: None,
            json_alias: None,
            omit_empty: false,
        }],
        location: None,
    }
}

fn classify_result_record() -> RecordDecl {
    RecordDecl {
        name: "CLASSIFY_RESULT".into(),
        fields: vec![FieldDecl {
            name: "VALUE".into(),
            field_type: PrimitiveType::Integer,
            length: None,
            scale: None,
            json_alias: None,
            omit_empty: false,
        }],
        location: None,
    }
}

fn customers_table() -> TableDecl {
    TableDecl {
        name: "CUSTOMERS".into(),
        columns: vec![
            ColumnDecl {
                name: "NAME".into(),
                column_type: PrimitiveType::String,
                primary_key: false,
                nullable: true,
                length: Some(64),
                scale: None,
                default: None,
            },
            ColumnDecl {
                name: "ZIP".into(),
                column_type: PrimitiveType::Integer,
                primary_key: false,
                nullable: true,
                length: None,
                scale: None,
                default: None,
            },
        ],
        location: None,
    }
}

/// §8 scenario 1: `var r := c; RETURN r;` — the output equals the input
/// unchanged (object-key case preserved from ingress).
fn copy_procedure() -> ProcedureDecl {
    ProcedureDecl {
        name: "copy".into(),
        path_template: Some("/customers/copy".into()),
        path_parameters: vec![],
        http_method: None,
        http_headers: vec![],
        input: Some(ParamDecl { name: "c".into(), type_name: "CUSTOMER".into() }),
        output: Some(ParamDecl { name: "r".into(), type_name: "CUSTOMER".into() }),
        is_exported: true,
        body: vec![
            assign(&["r"], var(&["c"])),
            Statement::Return(var(&["r"])),
        ],
        location: None,
    }
}

/// §8 scenario 2: input `{"value": 4}` into cases 1/2/3 mapping to
/// 10/20/30, default -1.
fn classify_procedure() -> ProcedureDecl {
    let cases = vec![
        (Expression::Literal(trx_core::Value::Number(1.0)), vec![assign(&["result", "VALUE"], Expression::Literal(trx_core::Value::Number(10.0)))]),
        (Expression::Literal(trx_core::Value::Number(2.0)), vec![assign(&["result", "VALUE"], Expression::Literal(trx_core::Value::Number(20.0)))]),
        (Expression::Literal(trx_core::Value::Number(3.0)), vec![assign(&["result", "VALUE"], Expression::Literal(trx_core::Value::Number(30.0)))]),
    ];
    let default = vec![assign(&["result", "VALUE"], Expression::Literal(trx_core::Value::Number(-1.0)))];

    ProcedureDecl {
        name: "classify".into(),
        path_template: Some("/classify".into()),
        path_parameters: vec![],
        http_method: None,
        http_headers: vec![],
        input: Some(ParamDecl { name: "req".into(), type_name: "CLASSIFY_REQUEST".into() }),
        output: Some(ParamDecl { name: "result".into(), type_name: "CLASSIFY_RESULT".into() }),
        is_exported: true,
        body: vec![
            Statement::Switch { selector: var(&["req", "VALUE"]), cases, default: Some(default) },
            Statement::Return(var(&["result"])),
        ],
        location: None,
    }
}

/// Inserts the bound `CUSTOMER` into `CUSTOMERS` via a host-variable-bound
/// `ExecImmediate` (§4.4), then echoes it back as the output.
fn create_customer_procedure() -> ProcedureDecl {
    ProcedureDecl {
        name: "create_customer".into(),
        path_template: Some("/customers".into()),
        path_parameters: vec![],
        http_method: None,
        http_headers: vec![],
        input: Some(ParamDecl { name: "customer".into(), type_name: "CUSTOMER".into() }),
        output: Some(ParamDecl { name: "result".into(), type_name: "CUSTOMER".into() }),
        is_exported: true,
        body: vec![
            Statement::Sql(SqlStatement::ExecImmediate {
                text: Expression::Literal(trx_core::Value::String(
                    "INSERT INTO CUSTOMERS (NAME, ZIP) VALUES (?, ?)".into(),
                )),
                host_vars: vec![path(&["customer", "NAME"]), path(&["customer", "ZIP"])],
            }),
            assign(&["result"], var(&["customer"])),
            Statement::Return(var(&["result"])),
        ],
        location: None,
    }
}

/// Declares, opens, fetches once, and closes a cursor filtered by the `zip`
/// path parameter (§4.4, §4.6) — a single-row lookup over the embedded-SQL
/// surface. Throws when no row matches.
fn get_customer_by_zip_procedure() -> ProcedureDecl {
    let fetch = Statement::Sql(SqlStatement::FetchCursor {
        name: "cur".into(),
        target_vars: vec![path(&["row_name"]), path(&["row_zip"])],
    });
    let sqlcode_eq_zero = || Expression::Binary {
        op: BinaryOp::Eq,
        left: Box::new(Expression::Builtin(Builtin::Sqlcode)),
        right: Box::new(Expression::Literal(trx_core::Value::Number(0.0))),
    };

    ProcedureDecl {
        name: "get_customer_by_zip".into(),
        path_template: Some("/customers/{zip}".into()),
        path_parameters: vec![PathParamDecl { name: "zip".into(), param_type: PrimitiveType::Integer }],
        http_method: Some("GET".into()),
        http_headers: vec![],
        input: None,
        output: Some(ParamDecl { name: "result".into(), type_name: "CUSTOMER".into() }),
        is_exported: true,
        body: vec![
            Statement::Sql(SqlStatement::DeclareCursor {
                name: "cur".into(),
                text: Expression::Literal(trx_core::Value::String("SELECT NAME, ZIP FROM CUSTOMERS WHERE ZIP = ?".into())),
                host_vars: vec![path(&["zip"])],
            }),
            Statement::Sql(SqlStatement::OpenCursor { name: "cur".into(), using_vars: None }),
            fetch,
            Statement::If {
                condition: sqlcode_eq_zero(),
                then_branch: vec![
                    assign(&["result", "NAME"], var(&["row_name"])),
                    assign(&["result", "ZIP"], var(&["row_zip"])),
                ],
                else_branch: vec![Statement::Throw(Expression::Literal(trx_core::Value::String(
                    "customer not found".into(),
                )))],
            },
            Statement::Sql(SqlStatement::CloseCursor { name: "cur".into() }),
            Statement::Return(var(&["result"])),
        ],
        location: None,
    }
}

/// Iterates every row in `CUSTOMERS` via `WHILE sqlcode = 0 { FETCH ... }`
/// (§8 scenario 3's idiom), appending each to `items` by subscripting at
/// its current length.
fn list_customers_procedure() -> ProcedureDecl {
    let sqlcode_eq_zero = || Expression::Binary {
        op: BinaryOp::Eq,
        left: Box::new(Expression::Builtin(Builtin::Sqlcode)),
        right: Box::new(Expression::Literal(trx_core::Value::Number(0.0))),
    };

    let loop_body = vec![
        Statement::Sql(SqlStatement::FetchCursor {
            name: "cur2".into(),
            target_vars: vec![path(&["row_name"]), path(&["row_zip"])],
        }),
        Statement::If {
            condition: sqlcode_eq_zero(),
            then_branch: vec![
                assign(&["idx"], Expression::Call { name: "LENGTH".into(), args: vec![var(&["items"])] }),
                Statement::Assign { path: subscripted("items", "idx", &["NAME"]), value: var(&["row_name"]) },
                Statement::Assign { path: subscripted("items", "idx", &["ZIP"]), value: var(&["row_zip"]) },
            ],
            else_branch: vec![],
        },
    ];

    ProcedureDecl {
        name: "list_customers".into(),
        path_template: Some("/customers".into()),
        path_parameters: vec![],
        http_method: Some("GET".into()),
        http_headers: vec![],
        input: None,
        output: Some(ParamDecl { name: "items".into(), type_name: "CUSTOMER".into() }),
        is_exported: true,
        body: vec![
            assign(&["items"], Expression::Literal(trx_core::Value::array())),
            Statement::Sql(SqlStatement::DeclareCursor {
                name: "cur2".into(),
                text: Expression::Literal(trx_core::Value::String("SELECT NAME, ZIP FROM CUSTOMERS".into())),
                host_vars: vec![],
            }),
            Statement::Sql(SqlStatement::OpenCursor { name: "cur2".into(), using_vars: None }),
            Statement::While { condition: sqlcode_eq_zero(), body: loop_body },
            Statement::Sql(SqlStatement::CloseCursor { name: "cur2".into() }),
            Statement::Return(var(&["items"])),
        ],
        location: None,
    }
}

/// A trivial no-input, no-output procedure landing-page callers can hit to
/// check liveness without touching the database (§4.5: undeclared output
/// yields the literal string `"no output"`).
fn ping_procedure() -> ProcedureDecl {
    ProcedureDecl {
        name: "ping".into(),
        path_template: Some("/ping".into()),
        path_parameters: vec![],
        http_method: Some("GET".into()),
        http_headers: vec![],
        input: None,
        output: None,
        is_exported: true,
        body: vec![Statement::Trace(Expression::Literal(trx_core::Value::String("ping".into())))],
        location: None,
    }
}

pub fn module() -> Module {
    Module {
        records: vec![customer_record(), classify_request_record(), classify_result_record()],
        tables: vec![customers_table()],
        procedures: vec![
            copy_procedure(),
            classify_procedure(),
            create_customer_procedure(),
            get_customer_by_zip_procedure(),
            list_customers_procedure(),
            ping_procedure(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_exports_six_distinct_routes() {
        let m = module();
        assert_eq!(m.exported_procedures().count(), 6);
        assert!(m.find_procedure("copy").is_some());
        assert!(m.find_record("CUSTOMER").is_some());
    }

    #[test]
    fn list_customers_effective_method_is_get_with_no_input() {
        let m = module();
        let p = m.find_procedure("list_customers").unwrap();
        assert_eq!(p.effective_method(), "GET");
    }

    #[test]
    fn classify_effective_method_is_post_with_input() {
        let m = module();
        let p = m.find_procedure("classify").unwrap();
        assert_eq!(p.effective_method(), "POST");
    }
}
