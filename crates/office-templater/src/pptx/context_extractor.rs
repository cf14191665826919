//! C11: the context-key extractor.
//!
//! Grounded on `context_extractor.py`'s static template scan: walk every
//! text frame, table cell, and chart category/series name, find every
//! `{{ ... }}`, and record the leading identifier — without ever
//! evaluating an expression. Unlike the renderer, this never mutates the
//! package; it only reads.

use std::collections::BTreeSet;

use crate::config::SlideRange;
use crate::error::RenderError;
use crate::placeholder::tag_bodies;
use crate::pptx::loops::loop_start_re;
use crate::pptx::package::PptxPackage;
use crate::pptx::text::text_body_content;
use crate::xml::XmlElement;

const RESERVED: &[&str] = &["now", "loop_count", "loop_number"];

/// The two sorted, duplicate-free lists a static scan produces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedFields {
    /// Top-level identifiers that appear without `.`/`[` qualification.
    pub simple_fields: Vec<String>,
    /// Top-level identifiers that appear with `.`/`[` qualification.
    pub object_fields: Vec<String>,
}

/// Scan every slide of `pkg` and return the fields it references. When
/// `slide_range` is given, only slides within it (1-indexed, in document
/// order) are scanned.
pub fn extract_context_keys(
    pkg: &PptxPackage,
    slide_range: Option<SlideRange>,
) -> Result<ExtractedFields, RenderError> {
    let mut simple = BTreeSet::new();
    let mut object = BTreeSet::new();
    let mut loop_vars = BTreeSet::new();

    let paths = pkg.slide_paths()?;
    let paths = paths
        .into_iter()
        .enumerate()
        .filter(|(i, _)| slide_range.map(|r| r.contains(*i as u32 + 1)).unwrap_or(true))
        .map(|(_, p)| p);

    for path in paths {
        let slide = pkg.parse_part(&path)?;
        collect_loop_vars(&slide, &mut loop_vars);

        for tx_body in slide.find_all("p:txBody") {
            scan_text(&text_body_content(tx_body), &mut simple, &mut object)?;
        }
        for tx_body in slide.find_all("a:txBody") {
            scan_text(&text_body_content(tx_body), &mut simple, &mut object)?;
        }
        for ser in slide.find_all("c:ser") {
            if let Some(tx) = ser.child("c:tx") {
                for v in tx.find_all("c:v") {
                    scan_text(&v.text_content(), &mut simple, &mut object)?;
                }
            }
            if let Some(cat) = ser.child("c:cat") {
                for v in cat.find_all("c:v") {
                    scan_text(&v.text_content(), &mut simple, &mut object)?;
                }
            }
        }
    }

    simple.retain(|k| !is_reserved(k) && !loop_vars.contains(k));
    object.retain(|k| !is_reserved(k) && !loop_vars.contains(k));

    Ok(ExtractedFields {
        simple_fields: simple.into_iter().collect(),
        object_fields: object.into_iter().collect(),
    })
}

fn is_reserved(ident: &str) -> bool {
    RESERVED.contains(&ident)
}

fn collect_loop_vars(slide: &XmlElement, loop_vars: &mut BTreeSet<String>) {
    for shape in slide.find_all("p:sp") {
        let Some(tx_body) = shape.child("p:txBody") else {
            continue;
        };
        let trimmed = text_body_content(tx_body).trim().to_string();
        if let Some(caps) = loop_start_re().captures(&trimmed) {
            loop_vars.insert(caps[1].to_string());
        }
    }
}

fn scan_text(
    text: &str,
    simple: &mut BTreeSet<String>,
    object: &mut BTreeSet<String>,
) -> Result<(), RenderError> {
    for body in tag_bodies(text)? {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            continue;
        }
        let ident_end = trimmed
            .find(|c: char| matches!(c, '.' | '[' | ']' | '|'))
            .unwrap_or(trimmed.len());
        let ident = trimmed[..ident_end].trim_end().to_string();
        if ident.is_empty() {
            continue;
        }
        let rest = trimmed[ident_end..].trim_start();
        if rest.starts_with('.') || rest.starts_with('[') {
            object.insert(ident);
        } else {
            simple.insert(ident);
        }
    }
    Ok(())
}
