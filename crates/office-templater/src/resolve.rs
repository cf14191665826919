//! C3: attribute/key resolution along a `__`-separated chain.
//!
//! Mirrors `get_nested_attr` in `templating.py`/`templating/parser.py`:
//! mapping lookups never fail (an absent key is `Null`, the same as Python's
//! `dict.get`), reflective record attribute lookups distinguish a genuinely
//! absent attribute (`Missing`, reported as `MissingData` by the caller)
//! from one that is present and explicitly `Null`. A zero-arg method is
//! auto-invoked as a convenience when a same-named attribute doesn't exist;
//! a method that raises is swallowed to `Null` rather than propagated,
//! matching the "never raises" contract of this layer. Explicit `name(args)`
//! segments bypass this helper entirely and call `Record::call` directly
//! (see C5 in `expr.rs`).

use crate::value::Value;

/// Outcome of resolving one `__`-chain against a starting value.
pub enum AttrLookup {
    Found(Value),
    /// The attribute genuinely does not exist anywhere along the chain.
    Missing,
}

/// Resolve a (possibly `__`-joined) attribute chain against `current`.
pub fn get_nested_attr(current: &Value, name: &str) -> AttrLookup {
    let mut cur = current.clone();
    for part in name.split("__") {
        if cur.is_null() {
            return AttrLookup::Found(Value::Null);
        }
        cur = match step(&cur, part) {
            AttrLookup::Found(v) => v,
            AttrLookup::Missing => return AttrLookup::Missing,
        };
    }
    AttrLookup::Found(cur)
}

fn step(current: &Value, part: &str) -> AttrLookup {
    match current {
        Value::Mapping(m) => AttrLookup::Found(m.get(part).unwrap_or(Value::Null)),
        Value::Record(r) => {
            if let Some(v) = r.attr(part) {
                return AttrLookup::Found(v);
            }
            match r.call(part, &[]) {
                Some(Ok(v)) => AttrLookup::Found(v),
                Some(Err(_)) => AttrLookup::Found(Value::Null),
                None => AttrLookup::Missing,
            }
        }
        // A bare scalar/list/collection has no named attributes to descend
        // into; the caller (C5) only reaches `step` once lists have already
        // been mapped element-wise, so this is always a genuine dead end.
        _ => AttrLookup::Missing,
    }
}
