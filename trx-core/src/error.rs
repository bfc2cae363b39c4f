//! The error taxonomy shared by every crate in the workspace (§7).
//!
//! `TrxError` is the runtime's single error enum. It does not know about
//! HTTP — the HTTP layer (`trx-http`) maps it onto status codes and JSON
//! bodies. Mirrors the way the reference framework keeps a single
//! `AppError` per crate boundary and converts at the edge.

use crate::value::Value;

/// Error kinds raised by the evaluator, executor, SQL executor, and
/// procedure invoker. Corresponds to the taxonomy in §7: `TypeError`,
/// `ArithmeticError`, `DatabaseError`, `ThrowError`, `NotFoundError`, plus
/// `Internal` for conditions the spec doesn't name but which the type
/// system still needs a home for (never raised by correct interpreter
/// logic).
#[derive(Debug, Clone)]
pub enum TrxError {
    Type(String),
    Arithmetic(String),
    Database(String),
    Throw(Value),
    NotFound(String),
    Internal(String),
}

impl TrxError {
    pub fn type_error(msg: impl Into<String>) -> Self {
        TrxError::Type(msg.into())
    }

    pub fn arithmetic(msg: impl Into<String>) -> Self {
        TrxError::Arithmetic(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        TrxError::Database(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        TrxError::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        TrxError::Internal(msg.into())
    }

    /// The kind name used both in trace/log output and in the `{"kind":
    /// ..., "message": ...}` value bound to a caught try/catch variable
    /// (§4.3, §7).
    pub fn kind_name(&self) -> &'static str {
        match self {
            TrxError::Type(_) => "TypeError",
            TrxError::Arithmetic(_) => "ArithmeticError",
            TrxError::Database(_) => "DatabaseError",
            TrxError::Throw(_) => "ThrowError",
            TrxError::NotFound(_) => "NotFoundError",
            TrxError::Internal(_) => "InternalError",
        }
    }

    pub fn message(&self) -> String {
        match self {
            TrxError::Type(m) => m.clone(),
            TrxError::Arithmetic(m) => m.clone(),
            TrxError::Database(m) => m.clone(),
            // A thrown value's own text never surfaces as the exception
            // message — the payload travels separately under
            // `to_caught_value()`'s `value` key.
            TrxError::Throw(_) => "Exception thrown by THROW statement".to_string(),
            TrxError::NotFound(m) => m.clone(),
            TrxError::Internal(m) => m.clone(),
        }
    }

    /// The `Value` a catching try/catch block binds its exception variable
    /// to (§7): `{"kind": "<Kind>", "message": "<text>"}`, with `ThrowError`
    /// additionally exposing the original thrown value under `value`.
    pub fn to_caught_value(&self) -> Value {
        use std::collections::BTreeMap;
        let mut map = BTreeMap::new();
        map.insert("kind".to_string(), Value::String(self.kind_name().to_string()));
        map.insert("message".to_string(), Value::String(self.message()));
        if let TrxError::Throw(v) = self {
            map.insert("value".to_string(), v.clone());
        }
        Value::Object(map)
    }

    /// Whether this error, left uncaught at the HTTP boundary, becomes a
    /// 400 (explicit `throw`) rather than a 500 (§7).
    pub fn is_explicit_throw(&self) -> bool {
        matches!(self, TrxError::Throw(_))
    }
}

impl std::fmt::Display for TrxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind_name(), self.message())
    }
}

impl std::error::Error for TrxError {}
