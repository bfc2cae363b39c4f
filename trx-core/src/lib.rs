//! Core runtime types shared across the TRX workspace: the `Value` model,
//! the Module AST the parser hands the runtime (§6.3), the variable
//! `Scope`, the `TrxError` taxonomy (§7), and startup configuration (§6.4).

pub mod ast;
pub mod config;
pub mod error;
pub mod scope;
pub mod value;

pub use ast::{
    Builtin, BinaryOp, ColumnDecl, Expression, FieldDecl, Module, ParamDecl, PathParamDecl,
    PathSegment, PrimitiveType, ProcedureDecl, RecordDecl, SortKey, SqlFragmentPart, SqlStatement,
    Statement, TableDecl, UnaryOp, VariablePath,
};
pub use config::{DbConfig, DbKind, TrxConfig};
pub use error::TrxError;
pub use scope::{Scope, ScopeOverlay};
pub use value::Value;

/// Convenience re-exports for downstream crates.
pub mod prelude {
    pub use crate::ast::*;
    pub use crate::config::{DbConfig, DbKind, TrxConfig};
    pub use crate::error::TrxError;
    pub use crate::scope::{Scope, ScopeOverlay};
    pub use crate::value::Value;
}
