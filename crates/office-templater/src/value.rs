//! The context value model (§3, §9 design note).
//!
//! A render context is a heterogeneous tree of [`Value`]s. Three capability
//! traits stand in for the duck-typed Python objects the original system
//! resolves tags against: [`Record`] (an object with named, possibly
//! callable attributes — and the thing permission checks attach to),
//! [`MappingLike`] (plain string-keyed lookup, e.g. a parsed JSON object),
//! and [`CollectionLike`] (a queryset-like, optionally server-filterable
//! sequence of records). Host applications adapt their own domain objects by
//! implementing these traits; the engine never depends on a particular ORM.

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::literal::Literal;

/// A value resolvable from a render context.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Temporal(NaiveDateTime),
    /// A materialized, ordered list — the result of mapping a segment over
    /// a list, coercing a scalar to a singleton, or an equality-filtered
    /// selection. Distinct from [`Value::Collection`], which has not yet
    /// been materialized and may support server-side filtering.
    List(Vec<Value>),
    Mapping(Arc<dyn MappingLike>),
    Record(Arc<dyn Record>),
    Collection(Arc<dyn CollectionLike>),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for values the permission gate (C4) must check — i.e. "record-like".
    pub fn is_record_like(&self) -> bool {
        matches!(self, Value::Record(_))
    }

    pub fn as_record(&self) -> Option<&Arc<dyn Record>> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Coerce to a flat list: `Null` becomes empty, `List`/`Collection`
    /// unwrap to their elements, everything else is a singleton.
    pub fn into_list(self) -> Vec<Value> {
        match self {
            Value::Null => Vec::new(),
            Value::List(items) => items,
            Value::Collection(c) => c.all(),
            other => vec![other],
        }
    }

    /// `str()`-equivalent stringification, used for joining lists and
    /// writing scalar results into cells/runs.
    pub fn display(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => if *b { "true" } else { "false" }.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(s) => s.clone(),
            Value::Temporal(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            Value::List(items) => items
                .iter()
                .map(Value::display)
                .collect::<Vec<_>>()
                .join(", "),
            Value::Mapping(_) => "<mapping>".to_string(),
            Value::Record(r) => r.display(),
            Value::Collection(c) => c
                .all()
                .iter()
                .map(Value::display)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Numeric coercion for spreadsheet cells (§4.6's `as_float` policy).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Str(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Equality against a parsed literal (C2), used by equality filters.
    /// Numeric variants compare across `Int`/`Float`/`Bool` the way Python's
    /// `==` does; everything else compares structurally.
    pub fn equals_literal(&self, lit: &Literal) -> bool {
        self == &lit.to_value()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Temporal(a), Temporal(b)) => a == b,
            // Cross-numeric comparisons mirror Python's `True == 1`, `1 == 1.0`.
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Int(a), Float(b)) | (Float(b), Int(a)) => (*a as f64) == *b,
            (Bool(a), Int(b)) | (Int(b), Bool(a)) => i64::from(*a) == *b,
            (Bool(a), Float(b)) | (Float(b), Bool(a)) => (if *a { 1.0 } else { 0.0 }) == *b,
            _ => false,
        }
    }
}

/// An object exposing named, possibly-callable attributes. The unit the
/// permission gate (C4) enforces visibility on.
pub trait Record: fmt::Debug + Send + Sync {
    /// Fetch a plain (non-invoked) attribute. `None` means the attribute
    /// genuinely does not exist on this record (distinct from an attribute
    /// that exists and is explicitly `Null`) — callers use this to
    /// distinguish `MissingData` from a present-but-null value.
    fn attr(&self, name: &str) -> Option<Value>;

    /// Invoke a named method with the given arguments. `None` means there is
    /// no such callable method (falls through to [`Record::attr`]'s
    /// zero-argument auto-invoke convenience, or surfaces as `TagCallable`
    /// for an explicit `name(args)` segment). `Some(Err(..))` means the
    /// method exists but raised; the message is surfaced in `TagCallable`.
    fn call(&self, _name: &str, _args: &[Value]) -> Option<Result<Value, String>> {
        None
    }

    /// `str()`-equivalent rendering of this record.
    fn display(&self) -> String;

    /// A stable identifier used only for permission-check error messages.
    fn describe(&self) -> String {
        self.display()
    }
}

/// A plain string-keyed lookup (e.g. a parsed JSON object). Unlike
/// [`Record`], a missing key is not an error — Python's `dict.get` never
/// raises, so absent keys resolve to `Null` rather than `MissingData`.
pub trait MappingLike: fmt::Debug + Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
}

/// A finite, possibly lazily-evaluated, optionally server-filterable
/// sequence of records — the Rust stand-in for a Django queryset.
pub trait CollectionLike: fmt::Debug + Send + Sync {
    /// Materialize every item.
    fn all(&self) -> Vec<Value>;

    /// Apply server-side equality filtering, if this collection supports
    /// it. Returning `None` tells the evaluator to fall back to
    /// materializing via [`CollectionLike::all`] and filtering client-side.
    fn filter(&self, _conditions: &[(String, Literal)]) -> Option<Vec<Value>> {
        None
    }
}

/// A plain `HashMap<String, Value>`-backed context — the common case when a
/// context is built programmatically or parsed from JSON.
#[derive(Debug, Clone, Default)]
pub struct Context(std::collections::HashMap<String, Value>);

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn to_value(&self) -> Value {
        Value::Mapping(Arc::new(self.clone()))
    }
}

impl MappingLike for Context {
    fn get(&self, key: &str) -> Option<Value> {
        self.0.get(key).cloned()
    }
}

impl FromIterator<(String, Value)> for Context {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A context that shadows a base mapping with a small set of extra
/// bindings — the loop processor's per-iteration `{var, loop_count,
/// loop_number}` injection (§3's "child context... shadows the parent").
#[derive(Debug, Clone)]
struct LayeredContext {
    extra: Context,
    base: Value,
}

impl MappingLike for LayeredContext {
    fn get(&self, key: &str) -> Option<Value> {
        if let Some(v) = self.extra.get(key) {
            return Some(v);
        }
        match &self.base {
            Value::Mapping(m) => m.get(key),
            _ => None,
        }
    }
}

/// Build a loop-iteration context: `extra`'s keys shadow `base`'s.
pub fn layer_context(base: Value, extra: Context) -> Value {
    Value::Mapping(Arc::new(LayeredContext { extra, base }))
}

/// Convert a parsed JSON document into a [`Value`] tree, for the reference
/// CLI's `--context <json-file>` flag. Objects become [`Value::Mapping`],
/// arrays become [`Value::List`]. An object of the exact shape
/// `{"$date": "<RFC3339-ish naive datetime>"}` becomes [`Value::Temporal`]
/// since JSON has no native date type.
pub fn value_from_json(json: &serde_json::Value) -> Value {
    use serde_json::Value as J;
    match json {
        J::Null => Value::Null,
        J::Bool(b) => Value::Bool(*b),
        J::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        J::String(s) => Value::Str(s.clone()),
        J::Array(items) => Value::List(items.iter().map(value_from_json).collect()),
        J::Object(map) => {
            if map.len() == 1 {
                if let Some(J::String(s)) = map.get("$date") {
                    if let Some(dt) = parse_naive_datetime(s) {
                        return Value::Temporal(dt);
                    }
                }
            }
            let ctx: Context = map
                .iter()
                .map(|(k, v)| (k.clone(), value_from_json(v)))
                .collect();
            Value::Mapping(Arc::new(ctx))
        }
    }
}

fn parse_naive_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| {
            chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(|d| d.and_hms_opt(0, 0, 0).unwrap())
        })
        .ok()
}
