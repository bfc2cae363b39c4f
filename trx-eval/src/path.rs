//! Variable path resolution (§3 "VariablePath", §4.2): reading a path fails
//! on missing fields or out-of-range indices; writing auto-vivifies
//! Objects/Arrays along the way and grows arrays to `index + 1`.

use trx_core::{PathSegment, Scope, TrxError, Value, VariablePath};

use crate::eval;

fn index_from_value(v: &Value) -> Result<usize, TrxError> {
    match v {
        Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 => Ok(*n as usize),
        Value::Number(_) => Err(TrxError::type_error("array subscript must be a non-negative integer")),
        other => Err(TrxError::type_error(format!(
            "array subscript must be a number, got {}",
            other.kind_name()
        ))),
    }
}

fn read_field<'v>(value: &'v Value, key: &str) -> Result<&'v Value, TrxError> {
    match value {
        Value::Object(map) => map
            .get(key)
            .ok_or_else(|| TrxError::type_error(format!("missing field '{key}'"))),
        other => Err(TrxError::type_error(format!(
            "cannot read field '{key}' of {}",
            other.kind_name()
        ))),
    }
}

fn read_index(value: &Value, idx: usize) -> Result<&Value, TrxError> {
    match value {
        Value::Array(items) => items
            .get(idx)
            .ok_or_else(|| TrxError::type_error(format!("array index {idx} out of range"))),
        other => Err(TrxError::type_error(format!(
            "cannot index into {} with [{idx}]",
            other.kind_name()
        ))),
    }
}

/// Resolves a path for reading (§4.2: "missing fields or out-of-range
/// indices raise TypeError (read)"; an unreferenced head variable raises
/// NotFoundError — §7 "unknown variable").
pub fn resolve_read(path: &VariablePath, scope: &mut Scope<'_>) -> Result<Value, TrxError> {
    let head = &path.segments[0];
    let mut current = scope
        .get(&head.name)
        .cloned()
        .ok_or_else(|| TrxError::not_found(format!("unknown variable '{}'", head.name)))?;
    current = apply_segment_read(current, head, scope)?;
    for seg in &path.segments[1..] {
        current = read_field(&current, &seg.name)?.clone();
        current = apply_segment_read(current, seg, scope)?;
    }
    Ok(current)
}

fn apply_segment_read(value: Value, seg: &PathSegment, scope: &mut Scope<'_>) -> Result<Value, TrxError> {
    match &seg.subscript {
        Some(sub_expr) => {
            let idx_val = eval(sub_expr, scope)?;
            let idx = index_from_value(&idx_val)?;
            Ok(read_index(&value, idx)?.clone())
        }
        None => Ok(value),
    }
}

fn ensure_object(value: &mut Value) -> Result<(), TrxError> {
    match value {
        Value::Object(_) => Ok(()),
        Value::Null => {
            *value = Value::object();
            Ok(())
        }
        other => Err(TrxError::type_error(format!(
            "cannot write field into {}",
            other.kind_name()
        ))),
    }
}

fn ensure_array(value: &mut Value) -> Result<(), TrxError> {
    match value {
        Value::Array(_) => Ok(()),
        Value::Null => {
            *value = Value::array();
            Ok(())
        }
        other => Err(TrxError::type_error(format!(
            "cannot write index into {}",
            other.kind_name()
        ))),
    }
}

/// Applies one segment's field descent (by name) and, if present, its
/// subscript (array index), auto-vivifying as needed, returning a mutable
/// reference to the resulting slot.
fn descend_field_mut<'v>(root: &'v mut Value, key: &str) -> Result<&'v mut Value, TrxError> {
    ensure_object(root)?;
    match root {
        Value::Object(map) => Ok(map.entry(key.to_string()).or_insert(Value::Null)),
        _ => unreachable!(),
    }
}

fn descend_index_mut(root: &mut Value, idx: usize) -> Result<&mut Value, TrxError> {
    ensure_array(root)?;
    match root {
        Value::Array(items) => {
            if idx >= items.len() {
                items.resize(idx + 1, Value::Null);
            }
            Ok(&mut items[idx])
        }
        _ => unreachable!(),
    }
}

/// Resolves a path for writing, auto-vivifying Objects/Arrays along the way
/// and growing arrays to `index + 1` (§3), then stores `new_value` at the
/// resolved slot.
pub fn resolve_write(
    path: &VariablePath,
    scope: &mut Scope<'_>,
    new_value: Value,
) -> Result<(), TrxError> {
    let head = &path.segments[0];

    // Evaluate every subscript expression up front against the current
    // scope, before taking a mutable borrow of the target variable.
    let mut indices = Vec::with_capacity(path.segments.len());
    for seg in &path.segments {
        indices.push(match &seg.subscript {
            Some(expr) => Some(index_from_value(&eval(expr, scope)?)?),
            None => None,
        });
    }

    if !scope.contains(&head.name) {
        scope.set(head.name.clone(), Value::Null);
    }
    let slot = scope
        .get_mut(&head.name)
        .expect("just inserted or already present");

    let mut current: &mut Value = slot;
    if let Some(idx) = indices[0] {
        current = descend_index_mut(current, idx)?;
    }
    for (seg, idx) in path.segments[1..].iter().zip(&indices[1..]) {
        current = descend_field_mut(current, &seg.name)?;
        if let Some(idx) = idx {
            current = descend_index_mut(current, *idx)?;
        }
    }
    *current = new_value;
    Ok(())
}
