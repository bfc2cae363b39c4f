//! The variable scope active during expression evaluation and statement
//! execution (§3, §9: "Scope as a mapping from identifier to Value").
//!
//! `Scope` borrows its backing storage rather than owning it, so the
//! Procedure Invoker can hand the evaluator and executor a view directly
//! into the interpreter's shared global map (held behind the interpreter
//! mutex for the whole call) without copying it — see DESIGN.md for how
//! this reconciles the spec's "fresh scope... destroyed on exit" wording
//! with scenario 6's shared-counter guarantee.

use std::collections::HashMap;

use crate::value::Value;

/// A mapping from identifier to `Value`, plus the `sqlcode` of the most
/// recently executed SQL statement observable from this scope (§4.2, §4.4).
pub struct Scope<'a> {
    vars: &'a mut HashMap<String, Value>,
    sqlcode: &'a mut i32,
}

impl<'a> Scope<'a> {
    pub fn new(vars: &'a mut HashMap<String, Value>, sqlcode: &'a mut i32) -> Self {
        Scope { vars, sqlcode }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.vars.get_mut(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.vars.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn sqlcode(&self) -> i32 {
        *self.sqlcode
    }

    pub fn set_sqlcode(&mut self, code: i32) {
        *self.sqlcode = code;
    }

    /// A reborrow of this scope with a shorter lifetime, for passing into
    /// recursive evaluation calls.
    pub fn reborrow(&mut self) -> Scope<'_> {
        Scope { vars: self.vars, sqlcode: self.sqlcode }
    }
}

/// Tracks the invocation-local bindings a Procedure Invoker overlays onto
/// the shared global map, so they can be removed (and any shadowed value
/// restored) when the invocation exits — the literal "created on entry,
/// destroyed on exit" per-invocation scope of §3/§4.5.
#[derive(Default)]
pub struct ScopeOverlay {
    shadowed: Vec<(String, Option<Value>)>,
}

impl ScopeOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name` to `value` in `scope`, remembering whatever was there
    /// before (or that nothing was) so it can be restored later.
    pub fn bind(&mut self, scope: &mut Scope<'_>, name: impl Into<String>, value: Value) {
        let name = name.into();
        let previous = scope.vars.insert(name.clone(), value);
        self.shadowed.push((name, previous));
    }

    /// Undoes every binding made through this overlay, in reverse order,
    /// restoring shadowed values or removing newly-introduced ones.
    pub fn unwind(self, scope: &mut Scope<'_>) {
        for (name, previous) in self.shadowed.into_iter().rev() {
            match previous {
                Some(v) => {
                    scope.vars.insert(name, v);
                }
                None => {
                    scope.vars.remove(&name);
                }
            }
        }
    }
}
