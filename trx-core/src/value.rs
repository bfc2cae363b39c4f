//! The universal runtime datum: a tagged, JSON-shaped value.
//!
//! `Value` is the dynamic type every TRX variable, SQL host parameter, and
//! HTTP request/response body is made of. There is no static type system
//! above it — the evaluator and executor match on its variants directly.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::error::TrxError;

/// A tagged union mirroring the shape of JSON, used as the sole runtime
/// datum throughout the interpreter, the SQL executor, and the HTTP layer.
///
/// `Object` uses a `BTreeMap` so iteration order is stable across a process
/// (the spec only requires that no particular order be *guaranteed*; a
/// deterministic order makes the runtime's own tests reproducible without
/// granting callers the right to depend on it).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    pub fn object() -> Self {
        Value::Object(BTreeMap::new())
    }

    pub fn array() -> Self {
        Value::Array(Vec::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a.as_slice()),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Structural equality (§4.2: `=`/`≠` work over any pair of variants).
    pub fn structural_eq(&self, other: &Value) -> bool {
        self == other
    }

    /// Ordering for `<`, `<=`, `>`, `>=`. Valid only Number/Number or
    /// String/String; any other pairing is a TypeError (§4.2).
    pub fn compare(&self, other: &Value) -> Result<Ordering, TrxError> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => {
                a.partial_cmp(b).ok_or_else(|| {
                    TrxError::type_error("cannot compare NaN")
                })
            }
            (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
            _ => Err(TrxError::type_error(format!(
                "cannot compare {} with {}",
                self.kind_name(),
                other.kind_name()
            ))),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Number(_) => "Number",
            Value::String(_) => "String",
            Value::Array(_) => "Array",
            Value::Object(_) => "Object",
        }
    }

    /// Converts a parsed `serde_json::Value` into a `Value`, uppercasing
    /// every object key (§4.1: "JSON keys uppercased on ingress for
    /// case-insensitive field access"). Used only at the HTTP ingress
    /// boundary, never for internal round-tripping.
    pub fn from_json_uppercased(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(a) => {
                Value::Array(a.iter().map(Value::from_json_uppercased).collect())
            }
            serde_json::Value::Object(o) => {
                let mut map = BTreeMap::new();
                for (k, v) in o {
                    map.insert(k.to_uppercase(), Value::from_json_uppercased(v));
                }
                Value::Object(map)
            }
        }
    }

    /// Parses a JSON-encoded byte body straight into a `Value`, uppercasing
    /// object keys along the way. Used for HTTP request bodies.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Value, TrxError> {
        let parsed: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|e| TrxError::type_error(format!("invalid JSON: {e}")))?;
        Ok(Value::from_json_uppercased(&parsed))
    }

    /// Canonical JSON serialisation (§4.1): numbers with up to 15
    /// significant digits and no trailing zeros, strings with
    /// `\"\\\b\f\n\r\t\uXXXX` escaping. Object keys are emitted as stored
    /// (egress preserves whatever casing is currently in the map — no
    /// re-uppercasing happens on the way out).
    pub fn to_json_string(&self) -> String {
        let mut out = String::new();
        self.write_json(&mut out);
        out
    }

    fn write_json(&self, out: &mut String) {
        match self {
            Value::Null => out.push_str("null"),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Number(n) => out.push_str(&format_number(*n)),
            Value::String(s) => write_json_string(s, out),
            Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.write_json(out);
                }
                out.push(']');
            }
            Value::Object(map) => {
                out.push('{');
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write_json_string(k, out);
                    out.push(':');
                    v.write_json(out);
                }
                out.push('}');
            }
        }
    }
}

/// Formats a number with up to 15 significant digits, trimming trailing
/// zeros and a trailing decimal point, per §4.1/§8 ("JSON numbers beyond 15
/// significant digits lose precision; accepted but may not round-trip
/// bit-exactly").
fn format_number(n: f64) -> String {
    if n.is_nan() || n.is_infinite() {
        return "0".to_string();
    }
    if n == n.trunc() && n.abs() < 1e15 {
        return format!("{}", n as i64);
    }
    let mut s = format!("{n:.15e}");
    // Re-derive a plain-decimal rendering with at most 15 significant digits.
    let formatted = format!("{:.*}", 15usize.saturating_sub(integer_digits(n)), n);
    let trimmed = trim_trailing_zeros(&formatted);
    s = trimmed;
    s
}

fn integer_digits(n: f64) -> usize {
    let abs = n.abs();
    if abs < 1.0 {
        1
    } else {
        (abs.log10().floor() as i64 + 1).max(1) as usize
    }
}

fn trim_trailing_zeros(s: &str) -> String {
    if !s.contains('.') {
        return s.to_string();
    }
    let trimmed = s.trim_end_matches('0');
    let trimmed = trimmed.trim_end_matches('.');
    trimmed.to_string()
}

fn write_json_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{0008}' => out.push_str("\\b"),
            '\u{000C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Converts a `Value` into a `serde_json::Value` for interop with code
/// (metrics, OpenAPI, config) that speaks `serde_json` natively.
impl From<&Value> for serde_json::Value {
    fn from(v: &Value) -> Self {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(serde_json::Value::from).collect())
            }
            Value::Object(map) => {
                let mut obj = serde_json::Map::new();
                for (k, v) in map {
                    obj.insert(k.clone(), v.into());
                }
                serde_json::Value::Object(obj)
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    /// Internal conversion that preserves key casing (no uppercasing). Used
    /// for values that never crossed the HTTP ingress boundary (config,
    /// test fixtures).
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(a) => Value::Array(a.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(o) => {
                let mut map = BTreeMap::new();
                for (k, v) in o {
                    map.insert(k, Value::from(v));
                }
                Value::Object(map)
            }
        }
    }
}
