//! The Module contract (§6.3): the immutable, parsed program the runtime
//! consumes. Construction of these types is the parser's job (an external
//! collaborator, out of scope here) — the runtime only walks them.

use crate::value::Value;

/// Optional diagnostic provenance carried by AST nodes. The runtime never
/// interprets this; it only threads it through for error messages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceLocation {
    pub file: String,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

/// Scalar field/column/parameter types recognised across record, table, and
/// procedure declarations (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    Integer,
    Decimal,
    Boolean,
    String,
    Date,
    Time,
    Timestamp,
}

impl PrimitiveType {
    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveType::Integer => "INTEGER",
            PrimitiveType::Decimal => "DECIMAL",
            PrimitiveType::Boolean => "BOOLEAN",
            PrimitiveType::String => "STRING",
            PrimitiveType::Date => "DATE",
            PrimitiveType::Time => "TIME",
            PrimitiveType::Timestamp => "TIMESTAMP",
        }
    }
}

/// A field of a `RecordDecl`.
#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub field_type: PrimitiveType,
    pub length: Option<u32>,
    pub scale: Option<u32>,
    pub json_alias: Option<String>,
    pub omit_empty: bool,
}

/// A named aggregate type (§3).
#[derive(Debug, Clone)]
pub struct RecordDecl {
    pub name: String,
    pub fields: Vec<FieldDecl>,
    pub location: Option<SourceLocation>,
}

/// A column of a `TableDecl`.
#[derive(Debug, Clone)]
pub struct ColumnDecl {
    pub name: String,
    pub column_type: PrimitiveType,
    pub primary_key: bool,
    pub nullable: bool,
    pub length: Option<u32>,
    pub scale: Option<u32>,
    pub default: Option<Value>,
}

/// A named relational table (§3).
#[derive(Debug, Clone)]
pub struct TableDecl {
    pub name: String,
    pub columns: Vec<ColumnDecl>,
    pub location: Option<SourceLocation>,
}

/// A named, typed input or output parameter of a procedure.
#[derive(Debug, Clone)]
pub struct ParamDecl {
    pub name: String,
    pub type_name: String,
}

/// A path parameter declared on a procedure's `pathTemplate` (§3, §4.6).
#[derive(Debug, Clone)]
pub struct PathParamDecl {
    pub name: String,
    pub param_type: PrimitiveType,
}

/// A procedure, optionally exported over HTTP (§3).
#[derive(Debug, Clone)]
pub struct ProcedureDecl {
    pub name: String,
    pub path_template: Option<String>,
    pub path_parameters: Vec<PathParamDecl>,
    pub http_method: Option<String>,
    pub http_headers: Vec<String>,
    pub input: Option<ParamDecl>,
    pub output: Option<ParamDecl>,
    pub is_exported: bool,
    pub body: Vec<Statement>,
    pub location: Option<SourceLocation>,
}

impl ProcedureDecl {
    /// The effective HTTP method (§4.6): explicit `httpMethod`, else `POST`
    /// if an input is declared, else `GET`.
    pub fn effective_method(&self) -> String {
        if let Some(m) = &self.http_method {
            return m.to_uppercase();
        }
        if self.input.is_some() {
            "POST".to_string()
        } else {
            "GET".to_string()
        }
    }
}

/// The immutable, parsed program (§3).
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub records: Vec<RecordDecl>,
    pub tables: Vec<TableDecl>,
    pub procedures: Vec<ProcedureDecl>,
}

impl Module {
    pub fn find_procedure(&self, name: &str) -> Option<&ProcedureDecl> {
        self.procedures.iter().find(|p| p.name == name)
    }

    pub fn exported_procedures(&self) -> impl Iterator<Item = &ProcedureDecl> {
        self.procedures.iter().filter(|p| p.is_exported)
    }

    pub fn find_record(&self, name: &str) -> Option<&RecordDecl> {
        self.records.iter().find(|r| r.name == name)
    }
}

// ── Variable paths (§3) ─────────────────────────────────────────────────

/// One segment of a variable path: an identifier, optionally followed by an
/// array subscript expression.
#[derive(Debug, Clone)]
pub struct PathSegment {
    pub name: String,
    pub subscript: Option<Box<Expression>>,
}

/// A non-empty ordered sequence of path segments (§3). The head segment
/// names a scope entry; later segments descend into `Object` fields
/// (no subscript) or `Array` elements (subscript).
#[derive(Debug, Clone)]
pub struct VariablePath {
    pub segments: Vec<PathSegment>,
}

impl VariablePath {
    pub fn simple(name: impl Into<String>) -> Self {
        VariablePath {
            segments: vec![PathSegment { name: name.into(), subscript: None }],
        }
    }

    pub fn head(&self) -> &str {
        &self.segments[0].name
    }
}

// ── Expressions (§3, §4.2) ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Builtin process-state values the evaluator can resolve (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Sqlcode,
    Date,
    Time,
    Timestamp,
    Week,
    Weekday,
}

/// A fragment of dynamically-built SQL text: either literal text or an
/// interpolated expression (§4.2: "SQL fragment expressions interpolate
/// values into a single String").
#[derive(Debug, Clone)]
pub enum SqlFragmentPart {
    Text(String),
    Interpolate(Box<Expression>),
}

#[derive(Debug, Clone)]
pub enum Expression {
    Literal(Value),
    Variable(VariablePath),
    Unary {
        op: UnaryOp,
        expr: Box<Expression>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Call {
        name: String,
        args: Vec<Expression>,
    },
    Builtin(Builtin),
    SqlFragment(Vec<SqlFragmentPart>),
}

// ── SQL statements (§4.4) ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum SqlStatement {
    ExecImmediate {
        text: Expression,
        host_vars: Vec<VariablePath>,
    },
    DeclareCursor {
        name: String,
        text: Expression,
        host_vars: Vec<VariablePath>,
    },
    OpenCursor {
        name: String,
        using_vars: Option<Vec<VariablePath>>,
    },
    FetchCursor {
        name: String,
        target_vars: Vec<VariablePath>,
    },
    CloseCursor {
        name: String,
    },
    Begin,
    Commit,
    Rollback,
}

// ── Statements (§3, §4.3) ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SortKey {
    pub field: String,
    pub ascending: bool,
}

#[derive(Debug, Clone)]
pub enum Statement {
    Assign {
        path: VariablePath,
        value: Expression,
    },
    If {
        condition: Expression,
        then_branch: Vec<Statement>,
        else_branch: Vec<Statement>,
    },
    While {
        condition: Expression,
        body: Vec<Statement>,
    },
    For {
        variable: String,
        collection: Expression,
        body: Vec<Statement>,
    },
    Switch {
        selector: Expression,
        cases: Vec<(Expression, Vec<Statement>)>,
        default: Option<Vec<Statement>>,
    },
    Block(Vec<Statement>),
    /// A group of statements run as a unit against the SQL backend,
    /// distinct from `Block` only in intent (§3 lists `block` and `batch`
    /// as separate tags); executed identically to `Block` (sequential,
    /// shared scope — see DESIGN.md).
    Batch(Vec<Statement>),
    Return(Expression),
    Throw(Expression),
    TryCatch {
        try_body: Vec<Statement>,
        catch_variable: String,
        catch_body: Vec<Statement>,
    },
    Call {
        target: String,
        input: VariablePath,
        output: VariablePath,
    },
    Sql(SqlStatement),
    Sort {
        target: VariablePath,
        keys: Vec<SortKey>,
    },
    Trace(Expression),
    System(Expression),
    Validate {
        rule: Expression,
        code: Expression,
        message: Expression,
    },
}
