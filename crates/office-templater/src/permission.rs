//! C4: the permission gate.
//!
//! Grounded on `templating/parser.py`'s `enforce_permissions` call site and
//! `pptx_renderer/exceptions.py::PermissionDeniedException`. A render either
//! carries no principal at all (checks disabled entirely) or carries one
//! that is consulted on every record-like value the expression evaluator
//! resolves, including each element of a resolved list/collection. Values
//! that aren't record-like (scalars, mappings, plain lists of scalars) are
//! always permitted — there is nothing to check permissions against.

use crate::value::{Record, Value};

/// An action a resolved tag performs against a record: reading it directly,
/// or reading one of its attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    View,
}

/// Host-supplied authorization check. `None` (no principal) disables C4
/// entirely; render proceeds as if every record were permitted.
pub trait Principal: Send + Sync {
    fn has_perm(&self, action: Action, record: &dyn Record) -> bool;
}

/// Returns `true` if `value` may be included in the render output.
/// Non-record values are always permitted. When `principal` is `None`,
/// every value is permitted (checks disabled).
pub fn allowed(value: &Value, principal: Option<&dyn Principal>) -> bool {
    let Some(principal) = principal else {
        return true;
    };
    match value {
        Value::Record(r) => principal.has_perm(Action::View, r.as_ref()),
        _ => true,
    }
}
