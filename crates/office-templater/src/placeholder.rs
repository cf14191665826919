//! C6: the placeholder processor.
//!
//! Grounded on `templating.py::process_text` (normal mode) and
//! `templating/list.py::process_text_list` / `pptx_renderer/expander.py`'s
//! single-placeholder cell handling (table mode).

use crate::error::RenderError;
use crate::expr::Evaluator;
use crate::value::Value;

/// One `{{ ... }}` match within a text fragment.
struct Match {
    start: usize,
    end: usize,
    body: String,
}

fn find_tags(text: &str) -> Result<Vec<Match>, RenderError> {
    let mut out = Vec::new();
    let mut search_from = 0usize;
    while let Some(rel_open) = text[search_from..].find("{{") {
        let open = search_from + rel_open;
        let Some(rel_close) = text[open + 2..].find("}}") else {
            return Err(RenderError::UnterminatedTag(text[open..].to_string()));
        };
        let close = open + 2 + rel_close;
        out.push(Match {
            start: open,
            end: close + 2,
            body: text[open + 2..close].trim().to_string(),
        });
        search_from = close + 2;
    }
    Ok(out)
}

/// Normal-mode substitution: every tag is evaluated, lists are joined with
/// `", "`, and a null/empty result is recorded as an error but rendered as
/// an empty string (never aborts the walk).
pub fn process_normal(
    text: &str,
    context: &Value,
    eval: &mut Evaluator,
) -> Result<String, RenderError> {
    let matches = find_tags(text)?;
    if matches.is_empty() {
        return Ok(text.to_string());
    }
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;
    for m in &matches {
        out.push_str(&text[cursor..m.start]);
        let value = eval.evaluate(&m.body, context)?;
        let rendered = value.display();
        if rendered.is_empty() {
            eval.errors.missing_data(&m.body);
        }
        out.push_str(&rendered);
        cursor = m.end;
    }
    out.push_str(&text[cursor..]);
    Ok(out)
}

/// The raw (trimmed) body of every `{{ ... }}` tag in `text`, in order —
/// used by the context-key extractor (C11), which scans statically rather
/// than evaluating.
pub fn tag_bodies(text: &str) -> Result<Vec<String>, RenderError> {
    Ok(find_tags(text)?.into_iter().map(|m| m.body).collect())
}

/// True iff `trimmed` is *exactly* one `{{ ... }}` span with nothing else
/// around it (Open Question 2: "pure" means the placeholder is the only
/// non-whitespace content of the cell).
pub fn is_single_full_match(trimmed: &str) -> bool {
    match find_tags(trimmed) {
        Ok(matches) => {
            matches.len() == 1 && matches[0].start == 0 && matches[0].end == trimmed.len()
        }
        Err(_) => false,
    }
}

/// Result of table-mode evaluation of a single-placeholder cell.
pub enum TableResult {
    /// The placeholder resolved to a scalar (or an empty list): one string.
    Scalar(String),
    /// The placeholder resolved to a non-empty list: one string per item,
    /// each wrapped in the placeholder's surrounding literal text.
    List(Vec<String>),
}

/// Table-mode evaluation: `text` must contain exactly one placeholder.
/// Returns the prefix/suffix-wrapped rendering of each list item, or a
/// single scalar string.
pub fn process_table(
    text: &str,
    context: &Value,
    eval: &mut Evaluator,
) -> Result<TableResult, RenderError> {
    let matches = find_tags(text)?;
    if matches.len() != 1 {
        return Err(RenderError::BadTag(
            text.to_string(),
            format!(
                "table mode requires exactly one placeholder, found {}",
                matches.len()
            ),
        ));
    }
    let m = &matches[0];
    let prefix = &text[..m.start];
    let suffix = &text[m.end..];
    let value = eval.evaluate(&m.body, context)?;

    match value {
        Value::List(items) => {
            if items.is_empty() {
                return Ok(TableResult::List(Vec::new()));
            }
            Ok(TableResult::List(
                items
                    .iter()
                    .map(|item| format!("{prefix}{}{suffix}", item.display()))
                    .collect(),
            ))
        }
        other => Ok(TableResult::Scalar(format!(
            "{prefix}{}{suffix}",
            other.display()
        ))),
    }
}

/// A single processed text fragment, with an optional numeric coercion —
/// the spreadsheet-cell variant of C6 (§4.6's "optional post-coercion").
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
}

/// Drive a set of already-merged paragraph texts through C6: a single
/// fragment containing exactly one placeholder is evaluated in table mode
/// (so a list result can drive column/row expansion downstream); anything
/// else is evaluated fragment-by-fragment in normal mode. When
/// `as_float` is set, each resulting string is opportunistically parsed as
/// a number; `fail_if_not_float` controls whether a non-numeric result is
/// kept as text or rejected.
pub fn process_text_list(
    fragments: &[String],
    context: &Value,
    eval: &mut Evaluator,
    as_float: bool,
    fail_if_not_float: bool,
) -> Result<Vec<CellValue>, RenderError> {
    let is_single_placeholder = fragments.len() == 1 && find_tags(&fragments[0])?.len() == 1;

    let rendered: Vec<String> = if is_single_placeholder {
        match process_table(&fragments[0], context, eval)? {
            TableResult::Scalar(s) => vec![s],
            TableResult::List(items) => items,
        }
    } else {
        let mut out = Vec::with_capacity(fragments.len());
        for fragment in fragments {
            out.push(process_normal(fragment, context, eval)?);
        }
        out
    };

    if !as_float {
        return Ok(rendered.into_iter().map(CellValue::Text).collect());
    }

    rendered
        .into_iter()
        .map(|s| match s.trim().parse::<f64>() {
            Ok(n) => Ok(CellValue::Number(n)),
            Err(_) if fail_if_not_float => Err(RenderError::BadTag(
                s.clone(),
                "expected a numeric value".to_string(),
            )),
            Err(_) => Ok(CellValue::Text(s)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorAccumulator;
    use crate::value::Context;

    fn eval_of<'a>(errors: &'a mut ErrorAccumulator) -> Evaluator<'a> {
        let now = chrono::NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        Evaluator::new(now, errors)
    }

    #[test]
    fn normal_mode_substitutes_scalar() {
        let mut ctx = Context::new();
        ctx.insert("name", Value::str("Alice"));
        let mut errors = ErrorAccumulator::new();
        let mut ev = eval_of(&mut errors);
        let out = process_normal("Hello, {{ name }}.", &ctx.to_value(), &mut ev).unwrap();
        assert_eq!(out, "Hello, Alice.");
    }

    #[test]
    fn normal_mode_joins_lists_with_comma_space() {
        let mut ctx = Context::new();
        ctx.insert(
            "emails",
            Value::List(vec![Value::str("a@x"), Value::str("b@x")]),
        );
        let mut errors = ErrorAccumulator::new();
        let mut ev = eval_of(&mut errors);
        let out = process_normal("Emails: {{ emails }}", &ctx.to_value(), &mut ev).unwrap();
        assert_eq!(out, "Emails: a@x, b@x");
    }

    #[test]
    fn normal_mode_records_missing_as_error_but_substitutes_empty() {
        let ctx = Context::new().to_value();
        let mut errors = ErrorAccumulator::new();
        let mut ev = eval_of(&mut errors);
        let out = process_normal("X: {{ absent }}", &ctx, &mut ev).unwrap();
        assert_eq!(out, "X: ");
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn unterminated_tag_is_an_error() {
        let ctx = Context::new().to_value();
        let mut errors = ErrorAccumulator::new();
        let mut ev = eval_of(&mut errors);
        assert!(matches!(
            process_normal("oops {{ name", &ctx, &mut ev),
            Err(RenderError::UnterminatedTag(_))
        ));
    }

    #[test]
    fn table_mode_requires_exactly_one_placeholder() {
        let ctx = Context::new().to_value();
        let mut errors = ErrorAccumulator::new();
        let mut ev = eval_of(&mut errors);
        assert!(process_table("no tags here", &ctx, &mut ev).is_err());
        assert!(process_table("{{ a }} and {{ b }}", &ctx, &mut ev).is_err());
    }

    #[test]
    fn table_mode_expands_list_with_prefix_suffix() {
        let mut ctx = Context::new();
        ctx.insert(
            "emails",
            Value::List(vec![Value::str("a@x"), Value::str("b@x")]),
        );
        let mut errors = ErrorAccumulator::new();
        let mut ev = eval_of(&mut errors);
        match process_table("<{{ emails }}>", &ctx.to_value(), &mut ev).unwrap() {
            TableResult::List(items) => assert_eq!(items, vec!["<a@x>", "<b@x>"]),
            TableResult::Scalar(_) => panic!("expected list"),
        }
    }

    #[test]
    fn table_mode_empty_list_yields_empty_vec() {
        let mut ctx = Context::new();
        ctx.insert("emails", Value::List(vec![]));
        let mut errors = ErrorAccumulator::new();
        let mut ev = eval_of(&mut errors);
        match process_table("{{ emails }}", &ctx.to_value(), &mut ev).unwrap() {
            TableResult::List(items) => assert!(items.is_empty()),
            TableResult::Scalar(_) => panic!("expected list"),
        }
    }

    #[test]
    fn process_text_list_coerces_numeric_cells() {
        let mut ctx = Context::new();
        ctx.insert("amount", Value::Int(42));
        let mut errors = ErrorAccumulator::new();
        let mut ev = eval_of(&mut errors);
        let result = process_text_list(
            &["{{ amount }}".to_string()],
            &ctx.to_value(),
            &mut ev,
            true,
            false,
        )
        .unwrap();
        assert_eq!(result, vec![CellValue::Number(42.0)]);
    }

    #[test]
    fn process_text_list_fails_on_non_numeric_when_required() {
        let mut ctx = Context::new();
        ctx.insert("label", Value::str("not a number"));
        let mut errors = ErrorAccumulator::new();
        let mut ev = eval_of(&mut errors);
        let result = process_text_list(
            &["{{ label }}".to_string()],
            &ctx.to_value(),
            &mut ev,
            true,
            true,
        );
        assert!(result.is_err());
    }
}
