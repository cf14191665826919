//! C5: the expression parser/evaluator.
//!
//! Grounded on `templating/parser.py` (`parse_formatted_tag`,
//! `substitute_inner_tags`, `resolve_tag_expression`, `split_expression`,
//! `resolve_segment`). This is the busiest module in the crate: sub-
//! expression splicing, the pipe/dot splits, segment parsing, and the
//! filter/call/collection/permission machinery all live here.

use chrono::NaiveDateTime;

use crate::error::{ErrorAccumulator, RenderError};
use crate::format;
use crate::literal::Literal;
use crate::permission::{allowed, Principal};
use crate::resolve::{get_nested_attr, AttrLookup};
use crate::value::Value;

/// Per-render evaluation state: the sampled `now`, the optional permission
/// principal, and the accumulator recoverable errors are recorded into.
pub struct Evaluator<'a> {
    pub now: NaiveDateTime,
    pub principal: Option<&'a dyn Principal>,
    pub errors: &'a mut ErrorAccumulator,
}

impl<'a> Evaluator<'a> {
    pub fn new(now: NaiveDateTime, errors: &'a mut ErrorAccumulator) -> Self {
        Self {
            now,
            principal: None,
            errors,
        }
    }

    pub fn with_principal(mut self, principal: &'a dyn Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    /// Evaluate a tag body (the text between `{{` and `}}`, already
    /// whitespace-trimmed by the caller) against `context`.
    pub fn evaluate(&mut self, expr_text: &str, context: &Value) -> Result<Value, RenderError> {
        let substituted = self.substitute_subexpressions(expr_text, context)?;
        if substituted.contains('{') || substituted.contains('}') {
            return Err(RenderError::BadTag(
                expr_text.to_string(),
                "stray '{' or '}' left after sub-expression substitution".to_string(),
            ));
        }
        let (value_expr, fmt) = split_unquoted_pipe(&substituted);
        let segments = split_dot_segments(value_expr.trim());
        if segments.is_empty() || segments.iter().all(|s| s.trim().is_empty()) {
            return Err(RenderError::BadTag(
                expr_text.to_string(),
                "empty expression".to_string(),
            ));
        }

        let (mut current, remaining): (Value, &[String]) =
            if segments[0].trim() == "now" {
                (Value::Temporal(self.now), &segments[1..])
            } else {
                (context.clone(), &segments[..])
            };

        for seg in remaining {
            current = self.resolve_segment(&current, seg)?;
        }

        if let Some(fmt) = fmt {
            let Value::Temporal(dt) = current else {
                return Err(RenderError::BadTag(
                    expr_text.to_string(),
                    "format pipe applied to a non-temporal value".to_string(),
                ));
            };
            let directive = format::translate(fmt.trim());
            return Ok(Value::Str(dt.format(&directive).to_string()));
        }

        Ok(current)
    }

    fn substitute_subexpressions(
        &mut self,
        text: &str,
        context: &Value,
    ) -> Result<String, RenderError> {
        let mut s = text.to_string();
        loop {
            let Some(start) = s.find('$') else { break };
            let Some(rel_end) = s[start + 1..].find('$') else {
                return Err(RenderError::BadTag(
                    text.to_string(),
                    "unterminated sub-expression '$'".to_string(),
                ));
            };
            let end = start + 1 + rel_end;
            let inner = s[start + 1..end].to_string();
            let value = self.evaluate(&inner, context)?;
            let replacement = value.display();
            s.replace_range(start..=end, &replacement);
        }
        Ok(s)
    }

    /// `resolve_segment` from §4.5.
    fn resolve_segment(&mut self, current: &Value, seg: &str) -> Result<Value, RenderError> {
        let parsed = parse_segment(seg)?;

        if let Value::List(items) = current {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match self.resolve_segment(item, seg)? {
                    Value::List(inner) => out.extend(inner),
                    other => out.push(other),
                }
            }
            return Ok(Value::List(out));
        }

        let value = if let Some(args_str) = &parsed.call_args {
            let args = parse_call_args(args_str)?;
            match current {
                Value::Record(r) => match r.call(&parsed.ident, &args) {
                    Some(Ok(v)) => v,
                    Some(Err(e)) => return Err(RenderError::TagCallable(parsed.ident.clone(), e)),
                    None => {
                        return Err(RenderError::TagCallable(
                            parsed.ident.clone(),
                            "no such method".to_string(),
                        ))
                    }
                },
                _ => {
                    return Err(RenderError::TagCallable(
                        parsed.ident.clone(),
                        "value is not callable".to_string(),
                    ))
                }
            }
        } else {
            match get_nested_attr(current, &parsed.ident) {
                AttrLookup::Found(v) => v,
                AttrLookup::Missing => {
                    self.errors.missing_data(&parsed.ident);
                    Value::Null
                }
            }
        };

        self.apply_filter_and_permissions(value, parsed.filter.as_deref())
    }

    fn apply_filter_and_permissions(
        &mut self,
        value: Value,
        filter_str: Option<&str>,
    ) -> Result<Value, RenderError> {
        let conditions = filter_str.map(parse_filter_conditions).transpose()?;

        if let Value::Collection(c) = &value {
            let items = match &conditions {
                Some(conds) => c
                    .filter(conds)
                    .unwrap_or_else(|| filter_client_side(c.all(), conds)),
                None => c.all(),
            };
            return Ok(Value::List(self.enforce_permissions(items)));
        }

        let was_scalar = !matches!(value, Value::List(_));
        let mut items = value.into_list();
        if let Some(conds) = &conditions {
            items = filter_client_side(items, conds);
        }
        let items = self.enforce_permissions(items);
        if was_scalar {
            Ok(items.into_iter().next().unwrap_or(Value::Null))
        } else {
            Ok(Value::List(items))
        }
    }

    fn enforce_permissions(&mut self, items: Vec<Value>) -> Vec<Value> {
        items
            .into_iter()
            .filter(|item| {
                let ok = allowed(item, self.principal);
                if !ok {
                    self.errors.permission_denied(&describe(item));
                }
                ok
            })
            .collect()
    }
}

fn describe(value: &Value) -> String {
    match value.as_record() {
        Some(r) => r.describe(),
        None => value.display(),
    }
}

fn filter_client_side(items: Vec<Value>, conditions: &[(String, Literal)]) -> Vec<Value> {
    items
        .into_iter()
        .filter(|item| conditions_match(item, conditions))
        .collect()
}

fn conditions_match(item: &Value, conditions: &[(String, Literal)]) -> bool {
    conditions.iter().all(|(key, lit)| {
        matches!(get_nested_attr(item, key), AttrLookup::Found(v) if v.equals_literal(lit))
    })
}

struct ParsedSegment {
    ident: String,
    call_args: Option<String>,
    filter: Option<String>,
}

fn parse_segment(seg: &str) -> Result<ParsedSegment, RenderError> {
    let trimmed = seg.trim();
    if trimmed.is_empty() || trimmed == "#" || trimmed == "%" {
        return Err(RenderError::BadTag(
            seg.to_string(),
            "empty or placeholder-only segment".to_string(),
        ));
    }
    check_balanced(trimmed).map_err(|e| RenderError::BadTag(seg.to_string(), e))?;

    let ident_len = trimmed
        .char_indices()
        .take_while(|(_, c)| c.is_alphanumeric() || *c == '_')
        .count();
    let ident = trimmed.chars().take(ident_len).collect::<String>();
    if ident.is_empty() || ident.chars().next().unwrap().is_ascii_digit() {
        return Err(RenderError::BadTag(
            seg.to_string(),
            "segment does not start with a valid identifier".to_string(),
        ));
    }
    let mut rest = &trimmed[ident.len()..];

    let call_args = if rest.starts_with('(') {
        let (inside, consumed) = take_delimited(rest, '(', ')')
            .map_err(|e| RenderError::BadTag(seg.to_string(), e))?;
        rest = &rest[consumed..];
        Some(inside)
    } else {
        None
    };

    let filter = if rest.starts_with('[') {
        let (inside, consumed) = take_delimited(rest, '[', ']')
            .map_err(|e| RenderError::BadTag(seg.to_string(), e))?;
        rest = &rest[consumed..];
        Some(inside)
    } else {
        None
    };

    if !rest.is_empty() {
        return Err(RenderError::BadTag(
            seg.to_string(),
            format!("unexpected trailing text: {rest:?}"),
        ));
    }

    Ok(ParsedSegment {
        ident,
        call_args,
        filter,
    })
}

fn check_balanced(s: &str) -> Result<(), String> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for c in s.chars() {
        match c {
            '\'' | '"' => {
                if quote == Some(c) {
                    quote = None;
                } else if quote.is_none() {
                    quote = Some(c);
                }
            }
            '[' if quote.is_none() => depth += 1,
            ']' if quote.is_none() => {
                depth -= 1;
                if depth < 0 {
                    return Err("unmatched closing bracket".to_string());
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err("unmatched opening bracket".to_string());
    }
    Ok(())
}

/// `s` must start with `open`. Returns the text strictly between the
/// matching delimiters and the number of bytes consumed (including both
/// delimiters), respecting quoted spans so a literal arg/filter value may
/// itself contain `)`/`]`/`,` characters.
fn take_delimited(s: &str, open: char, close: char) -> Result<(String, usize), String> {
    let mut chars = s.char_indices();
    let (_, first) = chars.next().expect("caller checked starts_with");
    debug_assert_eq!(first, open);
    let mut depth = 1i32;
    let mut quote: Option<char> = None;
    for (i, c) in chars {
        match c {
            '\'' | '"' => {
                if quote == Some(c) {
                    quote = None;
                } else if quote.is_none() {
                    quote = Some(c);
                }
            }
            c if quote.is_none() && c == open => depth += 1,
            c if quote.is_none() && c == close => {
                depth -= 1;
                if depth == 0 {
                    return Ok((s[1..i].to_string(), i + c.len_utf8()));
                }
            }
            _ => {}
        }
    }
    Err(format!("unterminated '{open}'"))
}

fn split_unquoted_pipe(s: &str) -> (String, Option<String>) {
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match c {
            '\'' | '"' => {
                if quote == Some(c) {
                    quote = None;
                } else if quote.is_none() {
                    quote = Some(c);
                }
            }
            '|' if quote.is_none() => {
                return (s[..i].to_string(), Some(s[i + 1..].to_string()));
            }
            _ => {}
        }
    }
    (s.to_string(), None)
}

/// Split on `.`, never inside a quoted span or a `[...]` group.
fn split_dot_segments(s: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '\'' | '"' => {
                if quote == Some(c) {
                    quote = None;
                } else if quote.is_none() {
                    quote = Some(c);
                }
            }
            '[' if quote.is_none() => depth += 1,
            ']' if quote.is_none() => depth -= 1,
            '.' if quote.is_none() && depth == 0 => {
                segments.push(s[start..i].to_string());
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(s[start..].to_string());
    segments
}

fn split_commas(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '\'' | '"' => {
                if quote == Some(c) {
                    quote = None;
                } else if quote.is_none() {
                    quote = Some(c);
                }
            }
            ',' if quote.is_none() => {
                parts.push(s[start..i].to_string());
                start = i + 1;
            }
            _ => {}
        }
    }
    let tail = &s[start..];
    if !tail.trim().is_empty() || !parts.is_empty() {
        parts.push(tail.to_string());
    }
    parts
}

fn parse_call_args(args_str: &str) -> Result<Vec<Value>, RenderError> {
    if args_str.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(split_commas(args_str)
        .iter()
        .map(|tok| Literal::parse(tok).to_value())
        .collect())
}

fn parse_filter_conditions(filter_str: &str) -> Result<Vec<(String, Literal)>, RenderError> {
    split_commas(filter_str)
        .iter()
        .map(|cond| {
            // Accept both `k=v` and `k==v` (Open Question 1: treated as
            // equivalent rather than distinct operators).
            let (key, rhs) = cond
                .split_once("==")
                .or_else(|| cond.split_once('='))
                .ok_or_else(|| {
                    RenderError::BadTag(
                        filter_str.to_string(),
                        format!("malformed filter condition: {cond:?}"),
                    )
                })?;
            Ok((key.trim().to_string(), Literal::parse(rhs.trim())))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Context, Record};
    use std::sync::Arc;

    #[derive(Debug)]
    struct User {
        name: String,
        email: String,
        is_active: bool,
    }

    impl Record for User {
        fn attr(&self, name: &str) -> Option<Value> {
            match name {
                "name" => Some(Value::str(self.name.clone())),
                "email" => Some(Value::str(self.email.clone())),
                "is_active" => Some(Value::Bool(self.is_active)),
                _ => None,
            }
        }

        fn display(&self) -> String {
            self.name.clone()
        }
    }

    fn user(name: &str, email: &str, active: bool) -> Value {
        Value::Record(Arc::new(User {
            name: name.to_string(),
            email: email.to_string(),
            is_active: active,
        }))
    }

    fn sample_now() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2020, 1, 15)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn scalar_attribute_chain() {
        let mut inner = Context::new();
        inner.insert("name", Value::str("Alice"));
        let mut ctx = Context::new();
        ctx.insert("user", inner.to_value());

        let mut errors = ErrorAccumulator::new();
        let mut ev = Evaluator::new(sample_now(), &mut errors);
        let v = ev.evaluate("user.name", &ctx.to_value()).unwrap();
        assert_eq!(v, Value::str("Alice"));
    }

    #[test]
    fn list_joined_via_display() {
        let mut ctx = Context::new();
        ctx.insert(
            "users",
            Value::List(vec![user("A", "a@x", true), user("B", "b@x", true)]),
        );
        let mut errors = ErrorAccumulator::new();
        let mut ev = Evaluator::new(sample_now(), &mut errors);
        let v = ev.evaluate("users.email", &ctx.to_value()).unwrap();
        assert_eq!(v, Value::List(vec![Value::str("a@x"), Value::str("b@x")]));
        assert_eq!(v.display(), "a@x, b@x");
    }

    #[test]
    fn date_formatting_pipe() {
        let ctx = Context::new().to_value();
        let mut errors = ErrorAccumulator::new();
        let mut ev = Evaluator::new(sample_now(), &mut errors);
        let v = ev.evaluate("now | MMMM dd, YYYY", &ctx).unwrap();
        assert_eq!(v, Value::str("January 15, 2020"));
    }

    #[test]
    fn equality_filter_then_attribute() {
        let mut ctx = Context::new();
        ctx.insert(
            "users",
            Value::List(vec![
                user("A", "a@x", true),
                user("B", "b@x", true),
                user("C", "c@x", false),
            ]),
        );
        let mut errors = ErrorAccumulator::new();
        let mut ev = Evaluator::new(sample_now(), &mut errors);
        let v = ev
            .evaluate("users[is_active=true].email", &ctx.to_value())
            .unwrap();
        assert_eq!(v.display(), "a@x, b@x");
    }

    #[test]
    fn double_equals_filter_also_accepted() {
        let mut ctx = Context::new();
        ctx.insert("users", Value::List(vec![user("A", "a@x", true)]));
        let mut errors = ErrorAccumulator::new();
        let mut ev = Evaluator::new(sample_now(), &mut errors);
        let v = ev
            .evaluate("users[is_active==true].email", &ctx.to_value())
            .unwrap();
        assert_eq!(v.display(), "a@x");
    }

    #[test]
    fn missing_attribute_is_accumulated_not_fatal() {
        let mut ctx = Context::new();
        ctx.insert("user", user("Alice", "a@x", true));
        let mut errors = ErrorAccumulator::new();
        let mut ev = Evaluator::new(sample_now(), &mut errors);
        let v = ev.evaluate("user.ghost_field", &ctx.to_value()).unwrap();
        assert_eq!(v, Value::Null);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn unknown_top_level_identifier_is_null_not_an_error() {
        let ctx = Context::new().to_value();
        let mut errors = ErrorAccumulator::new();
        let mut ev = Evaluator::new(sample_now(), &mut errors);
        let v = ev.evaluate("nonexistent", &ctx).unwrap();
        assert_eq!(v, Value::Null);
        assert!(errors.is_empty());
    }

    #[test]
    fn sub_expression_is_spliced_before_parsing() {
        let mut inner = Context::new();
        inner.insert("field", Value::str("name"));
        let mut ctx = Context::new();
        ctx.insert("user", user("Alice", "a@x", true));
        ctx.insert("which", inner.to_value());

        let mut errors = ErrorAccumulator::new();
        let mut ev = Evaluator::new(sample_now(), &mut errors);
        // "$which.field$" substitutes to "name", giving "user.name".
        let v = ev
            .evaluate("user.$which.field$", &ctx.to_value())
            .unwrap();
        assert_eq!(v, Value::str("Alice"));
    }

    #[test]
    fn unbalanced_brackets_is_bad_tag() {
        let ctx = Context::new().to_value();
        let mut errors = ErrorAccumulator::new();
        let mut ev = Evaluator::new(sample_now(), &mut errors);
        assert!(matches!(
            ev.evaluate("user[is_active=true", &ctx),
            Err(RenderError::BadTag(..))
        ));
    }

    #[test]
    fn dot_inside_call_args_still_splits() {
        #[derive(Debug)]
        struct Calc;
        impl Record for Calc {
            fn attr(&self, _name: &str) -> Option<Value> {
                None
            }
            fn call(&self, _name: &str, _args: &[Value]) -> Option<Result<Value, String>> {
                Some(Ok(Value::Null))
            }
            fn display(&self) -> String {
                "calc".to_string()
            }
        }
        let mut ctx = Context::new();
        ctx.insert("item", Value::Record(Arc::new(Calc)));
        let mut errors = ErrorAccumulator::new();
        let mut ev = Evaluator::new(sample_now(), &mut errors);
        // The literal `3.14` inside the call args is itself split on `.`,
        // leaving an unterminated `(` in the "compute(3" segment.
        assert!(matches!(
            ev.evaluate("item.compute(3.14)", &ctx.to_value()),
            Err(RenderError::BadTag(..))
        ));
    }

    #[test]
    fn call_with_explicit_args() {
        #[derive(Debug)]
        struct Greeter;
        impl Record for Greeter {
            fn attr(&self, _name: &str) -> Option<Value> {
                None
            }
            fn call(&self, name: &str, args: &[Value]) -> Option<Result<Value, String>> {
                match name {
                    "greet" => Some(Ok(Value::str(format!(
                        "hi {}",
                        args.first().map(Value::display).unwrap_or_default()
                    )))),
                    _ => None,
                }
            }
            fn display(&self) -> String {
                "greeter".to_string()
            }
        }
        let mut ctx = Context::new();
        ctx.insert("g", Value::Record(Arc::new(Greeter)));
        let mut errors = ErrorAccumulator::new();
        let mut ev = Evaluator::new(sample_now(), &mut errors);
        let v = ev.evaluate("g.greet(\"Bob\")", &ctx.to_value()).unwrap();
        assert_eq!(v, Value::str("hi Bob"));
    }

    #[test]
    fn calling_a_non_callable_is_tag_callable_error() {
        let mut ctx = Context::new();
        ctx.insert("x", Value::Int(5));
        let mut errors = ErrorAccumulator::new();
        let mut ev = Evaluator::new(sample_now(), &mut errors);
        assert!(matches!(
            ev.evaluate("x()", &ctx.to_value()),
            Err(RenderError::TagCallable(..))
        ));
    }

    #[test]
    fn permission_denial_filters_list_and_records_error() {
        struct DenyNamed(&'static str);
        impl Principal for DenyNamed {
            fn has_perm(&self, _action: crate::permission::Action, record: &dyn Record) -> bool {
                record.display() != self.0
            }
        }
        let mut ctx = Context::new();
        ctx.insert(
            "users",
            Value::List(vec![
                user("Alice", "alice@x", true),
                user("Bob", "bob@x", true),
                user("DenyUser", "deny@x", true),
            ]),
        );
        let principal = DenyNamed("DenyUser");
        let mut errors = ErrorAccumulator::new();
        let mut ev = Evaluator::new(sample_now(), &mut errors).with_principal(&principal);
        let v = ev.evaluate("users.email", &ctx.to_value()).unwrap();
        assert_eq!(v.display(), "alice@x, bob@x");
        assert_eq!(errors.len(), 1);
    }
}
