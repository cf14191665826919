//! C9: the loop processor.
//!
//! Grounded on `office_renderer/loops.py`: a two-state (`OUTSIDE`/`INSIDE`)
//! scan over slides in document order detects `%loop <ident> in <expr>%` /
//! `%endloop%` sentinel shapes, then a second pass duplicates each buffered
//! loop body once per collection item via [`PptxPackage::duplicate_slide_part`],
//! finally committing the order with [`PptxPackage::set_slide_order`].

use std::sync::OnceLock;

use regex::Regex;

use crate::error::RenderError;
use crate::expr::Evaluator;
use crate::pptx::package::PptxPackage;
use crate::pptx::text::text_body_content;
use crate::value::{layer_context, Context, Value};
use crate::xml::XmlElement;

pub(crate) fn loop_start_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^%loop\s+([A-Za-z_][A-Za-z0-9_]*)\s+in\s+(.+)%$").unwrap())
}

fn endloop_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^%endloop%$").unwrap())
}

/// What the first pass found on one slide.
enum Sentinel {
    None,
    LoopStart { var: String, collection_expr: String },
    EndLoop,
}

/// One slide in the final render plan: its (possibly freshly duplicated)
/// part path, and the extra loop-iteration bindings to merge with the base
/// context while processing its shapes.
pub struct PlannedSlide {
    pub path: String,
    pub extra_context: Option<Context>,
}

/// Run C9 over every slide in `pkg`, expanding loop sections in place and
/// committing the final slide order. Returns the ordered render plan.
pub fn expand_loops(
    pkg: &mut PptxPackage,
    base_context: &Value,
    eval: &mut Evaluator,
) -> Result<Vec<PlannedSlide>, RenderError> {
    let original_paths = pkg.slide_paths()?;

    enum Section {
        Plain(String),
        Loop {
            var: String,
            collection_expr: String,
            body: Vec<String>,
        },
    }

    let mut sections: Vec<Section> = Vec::new();
    let mut state_inside = false;
    let mut current_body: Vec<String> = Vec::new();
    let mut current_var = String::new();
    let mut current_expr = String::new();

    for path in &original_paths {
        let slide = pkg.parse_part(path)?;
        let sentinel = classify_slide(&slide)?;

        match (state_inside, sentinel) {
            (false, Sentinel::None) => sections.push(Section::Plain(path.clone())),
            (false, Sentinel::LoopStart { var, collection_expr }) => {
                state_inside = true;
                current_var = var;
                current_expr = collection_expr;
                current_body = Vec::new();
            }
            (false, Sentinel::EndLoop) => {
                return Err(RenderError::BadTag(
                    path.clone(),
                    "endloop without matching loop".to_string(),
                ))
            }
            (true, Sentinel::None) => current_body.push(path.clone()),
            (true, Sentinel::LoopStart { .. }) => {
                return Err(RenderError::BadTag(
                    path.clone(),
                    "nested loops unsupported".to_string(),
                ))
            }
            (true, Sentinel::EndLoop) => {
                state_inside = false;
                sections.push(Section::Loop {
                    var: std::mem::take(&mut current_var),
                    collection_expr: std::mem::take(&mut current_expr),
                    body: std::mem::take(&mut current_body),
                });
            }
        }
    }
    if state_inside {
        return Err(RenderError::BadTag(
            "<document end>".to_string(),
            "unclosed loop".to_string(),
        ));
    }

    let mut plan: Vec<PlannedSlide> = Vec::new();
    for section in sections {
        match section {
            Section::Plain(path) => plan.push(PlannedSlide {
                path,
                extra_context: None,
            }),
            Section::Loop {
                var,
                collection_expr,
                body,
            } => {
                let collection = eval.evaluate(&collection_expr, base_context)?.into_list();
                if collection.is_empty() {
                    return Err(RenderError::BadTag(
                        collection_expr.clone(),
                        format!("Collection '{collection_expr}' is empty"),
                    ));
                }
                let count = collection.len();
                for (i, item) in collection.into_iter().enumerate() {
                    let mut extra = Context::new();
                    extra.insert(var.clone(), item);
                    extra.insert("loop_count", Value::Int(count as i64));
                    extra.insert("loop_number", Value::Int(i as i64 + 1));

                    for body_path in &body {
                        let slide_path = if i == 0 {
                            body_path.clone()
                        } else {
                            pkg.duplicate_slide_part(body_path)?
                        };
                        plan.push(PlannedSlide {
                            path: slide_path,
                            extra_context: Some(extra.clone()),
                        });
                    }
                }
            }
        }
    }

    let final_order: Vec<String> = plan.iter().map(|s| s.path.clone()).collect();
    pkg.set_slide_order(&final_order)?;
    Ok(plan)
}

/// Merge a planned slide's extra bindings (if any) over the base context.
pub fn effective_context(base: &Value, planned: &PlannedSlide) -> Value {
    match &planned.extra_context {
        Some(extra) => layer_context(base.clone(), extra.clone()),
        None => base.clone(),
    }
}

fn classify_slide(slide: &XmlElement) -> Result<Sentinel, RenderError> {
    let mut found: Option<Sentinel> = None;
    for shape in slide.find_all("p:sp") {
        let Some(tx_body) = shape.child("p:txBody") else {
            continue;
        };
        let trimmed = text_body_content(tx_body).trim().to_string();
        if trimmed.is_empty() {
            continue;
        }
        let this = if let Some(caps) = loop_start_re().captures(&trimmed) {
            Some(Sentinel::LoopStart {
                var: caps[1].to_string(),
                collection_expr: caps[2].trim().to_string(),
            })
        } else if endloop_re().is_match(&trimmed) {
            Some(Sentinel::EndLoop)
        } else {
            None
        };
        if let Some(this) = this {
            if found.is_some() {
                return Err(RenderError::BadTag(
                    trimmed,
                    "multiple loop sentinels on the same slide".to_string(),
                ));
            }
            found = Some(this);
        }
    }
    Ok(found.unwrap_or(Sentinel::None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_start_sentinel_captures_var_and_expression() {
        let caps = loop_start_re().captures("%loop u in team.members%").unwrap();
        assert_eq!(&caps[1], "u");
        assert_eq!(&caps[2], "team.members");
    }

    #[test]
    fn endloop_sentinel_matches_exactly() {
        assert!(endloop_re().is_match("%endloop%"));
        assert!(!endloop_re().is_match("%endloop% trailing"));
    }

    #[test]
    fn loop_start_requires_full_match() {
        assert!(!loop_start_re().is_match("leading %loop u in x%"));
    }
}
