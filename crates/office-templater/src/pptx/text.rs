//! Paragraph/run-level text processing for PPTX shapes: C7 (run
//! reassembly) driving C6 (placeholder substitution) in normal mode.
//!
//! Grounded on `pptx_renderer/renderer.py`'s per-shape dispatch and
//! `pptx_renderer/merger.py`'s run-merge, adapted to the owned XML tree in
//! [`crate::xml`].

use crate::error::RenderError;
use crate::expr::Evaluator;
use crate::placeholder::process_normal;
use crate::runs::{merge_split_placeholders, TextRun};
use crate::value::Value;
use crate::xml::{XmlElement, XmlNode};

/// Wraps an owned `<a:r>` run element so the generic C7 merge algorithm can
/// operate on it.
struct RunWrap(XmlElement);

impl TextRun for RunWrap {
    fn text(&self) -> String {
        self.0.child("a:t").map(|t| t.text_content()).unwrap_or_default()
    }

    fn set_text(&mut self, text: String) {
        if let Some(t) = self.0.child_mut("a:t") {
            t.set_text_content(text);
        } else {
            let mut t = XmlElement::new("a:t");
            t.set_text_content(text);
            self.0.children.push(XmlNode::Element(t));
        }
    }
}

/// Process every paragraph in a `<p:txBody>` (or `<a:txBody>`) in normal
/// mode: C7 merges split tags within each paragraph, then every resulting
/// run is passed through C6 individually.
pub fn process_text_body_normal(
    tx_body: &mut XmlElement,
    context: &Value,
    eval: &mut Evaluator,
) -> Result<(), RenderError> {
    for child in &mut tx_body.children {
        if let XmlNode::Element(paragraph) = child {
            if paragraph.name == "a:p" {
                process_paragraph_normal(paragraph, context, eval)?;
            }
        }
    }
    Ok(())
}

fn process_paragraph_normal(
    paragraph: &mut XmlElement,
    context: &Value,
    eval: &mut Evaluator,
) -> Result<(), RenderError> {
    let run_positions: Vec<usize> = paragraph
        .children
        .iter()
        .enumerate()
        .filter_map(|(i, c)| match c {
            XmlNode::Element(e) if e.name == "a:r" => Some(i),
            _ => None,
        })
        .collect();
    if run_positions.is_empty() {
        return Ok(());
    }

    let mut wrapped: Vec<RunWrap> = run_positions
        .iter()
        .map(|&i| match &mut paragraph.children[i] {
            XmlNode::Element(e) => RunWrap(std::mem::replace(e, XmlElement::new("a:r"))),
            _ => unreachable!(),
        })
        .collect();

    merge_split_placeholders(&mut wrapped)?;

    for run in &mut wrapped {
        let text = run.text();
        let rendered = process_normal(&text, context, eval)?;
        run.set_text(rendered);
    }

    // Merging may have reduced the run count; drop the now-unused
    // placeholder slots and splice the final runs in at the first one.
    let first = run_positions[0];
    for &pos in run_positions[1..].iter().rev() {
        paragraph.children.remove(pos);
    }
    paragraph.children.remove(first);
    for (offset, run) in wrapped.into_iter().enumerate() {
        paragraph
            .children
            .insert(first + offset, XmlNode::Element(run.0));
    }
    Ok(())
}

/// Concatenated text of every run in a `<*:txBody>`, across all paragraphs.
pub fn text_body_content(tx_body: &XmlElement) -> String {
    tx_body.text_content()
}

/// Replace a text body's content wholesale with a single paragraph/run
/// carrying `text`, preserving the first existing run's formatting
/// (`a:rPr`) if there is one — the same "originating run survives"
/// principle C7 uses for merges.
pub fn replace_text_body(tx_body: &mut XmlElement, text: &str) {
    let r_pr = tx_body
        .find_all("a:r")
        .into_iter()
        .find_map(|r| r.child("a:rPr").cloned());

    let mut run = XmlElement::new("a:r");
    if let Some(r_pr) = r_pr {
        run.children.push(XmlNode::Element(r_pr));
    }
    let mut t = XmlElement::new("a:t");
    t.set_text_content(text.to_string());
    run.children.push(XmlNode::Element(t));

    let mut paragraph = XmlElement::new("a:p");
    paragraph.children.push(XmlNode::Element(run));

    tx_body.children.retain(|c| !matches!(c, XmlNode::Element(e) if e.name == "a:p"));
    tx_body.children.push(XmlNode::Element(paragraph));
}
