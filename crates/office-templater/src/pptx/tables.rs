//! C8: table expansion.
//!
//! Grounded on `pptx_renderer/table.py`'s cell-by-cell walk: a cell whose
//! trimmed text is *exactly* one placeholder is evaluated in table mode
//! (scalar replaces the cell in place; a list fills the column downward,
//! cloning rows as needed); any other cell falls back to the normal-mode
//! per-run substitution in [`crate::pptx::text`].

use crate::error::RenderError;
use crate::expr::Evaluator;
use crate::placeholder::{is_single_full_match, process_table, TableResult};
use crate::pptx::text::{process_text_body_normal, replace_text_body, text_body_content};
use crate::value::Value;
use crate::xml::{XmlElement, XmlNode};

/// Expand a `<a:tbl>` in place: every row's cells are inspected, pure
/// single-placeholder cells drive table mode, everything else is rendered
/// in normal mode.
pub fn process_table_element(
    tbl: &mut XmlElement,
    context: &Value,
    eval: &mut Evaluator,
) -> Result<(), RenderError> {
    let row_positions: Vec<usize> = tbl
        .children
        .iter()
        .enumerate()
        .filter_map(|(i, c)| match c {
            XmlNode::Element(e) if e.name == "a:tr" => Some(i),
            _ => None,
        })
        .collect();
    if row_positions.is_empty() {
        return Ok(());
    }

    let mut rows: Vec<XmlElement> = row_positions
        .iter()
        .map(|&i| match &mut tbl.children[i] {
            XmlNode::Element(e) => std::mem::replace(e, XmlElement::new("a:tr")),
            _ => unreachable!(),
        })
        .collect();

    let mut row_idx = 0;
    while row_idx < rows.len() {
        let n_cols = count_cells(&rows[row_idx]);
        for col in 0..n_cols {
            process_cell(&mut rows, row_idx, col, context, eval)?;
        }
        row_idx += 1;
    }

    let first = row_positions[0];
    for &pos in row_positions[1..].iter().rev() {
        tbl.children.remove(pos);
    }
    tbl.children.remove(first);
    for (offset, row) in rows.into_iter().enumerate() {
        tbl.children.insert(first + offset, XmlNode::Element(row));
    }
    Ok(())
}

fn count_cells(row: &XmlElement) -> usize {
    row.children_named("a:tc").count()
}

fn get_cell(row: &XmlElement, col: usize) -> Option<&XmlElement> {
    row.children_named("a:tc").nth(col)
}

fn get_cell_mut(row: &mut XmlElement, col: usize) -> Option<&mut XmlElement> {
    row.children
        .iter_mut()
        .filter_map(|c| match c {
            XmlNode::Element(e) if e.name == "a:tc" => Some(e),
            _ => None,
        })
        .nth(col)
}

fn cell_tx_body(cell: &XmlElement) -> Result<&XmlElement, RenderError> {
    cell.child("a:txBody")
        .ok_or_else(|| RenderError::TableStructure("table cell has no txBody".to_string()))
}

fn cell_tx_body_mut(cell: &mut XmlElement) -> Result<&mut XmlElement, RenderError> {
    cell.child_mut("a:txBody")
        .ok_or_else(|| RenderError::TableStructure("table cell has no txBody".to_string()))
}

fn set_cell_text(rows: &mut [XmlElement], row: usize, col: usize, text: &str) -> Result<(), RenderError> {
    let cell = get_cell_mut(&mut rows[row], col)
        .ok_or_else(|| RenderError::TableStructure(format!("row {row} has no cell at column {col}")))?;
    replace_text_body(cell_tx_body_mut(cell)?, text);
    Ok(())
}

fn process_cell(
    rows: &mut Vec<XmlElement>,
    row_idx: usize,
    col: usize,
    context: &Value,
    eval: &mut Evaluator,
) -> Result<(), RenderError> {
    let cell = get_cell(&rows[row_idx], col)
        .ok_or_else(|| RenderError::TableStructure(format!("row {row_idx} has no cell at column {col}")))?;
    let text = text_body_content(cell_tx_body(cell)?);
    let trimmed = text.trim();

    if is_single_full_match(trimmed) {
        let result = process_table(trimmed, context, eval)?;
        match result {
            TableResult::Scalar(s) => set_cell_text(rows, row_idx, col, &s)?,
            TableResult::List(items) => column_fill(rows, row_idx, col, items)?,
        }
    } else {
        let cell = get_cell_mut(&mut rows[row_idx], col).unwrap();
        process_text_body_normal(cell_tx_body_mut(cell)?, context, eval)?;
    }
    Ok(())
}

/// Fill `items` down column `col`, starting at `source_row`: the first item
/// replaces the source cell, subsequent items land in the next rows' empty
/// cells at that column, cloning the source row (with its placeholder-
/// bearing cells cleared) onto the end of the table whenever rows run out.
/// An empty list clears the source cell.
fn column_fill(
    rows: &mut Vec<XmlElement>,
    source_row: usize,
    col: usize,
    items: Vec<String>,
) -> Result<(), RenderError> {
    if items.is_empty() {
        return set_cell_text(rows, source_row, col, "");
    }

    set_cell_text(rows, source_row, col, &items[0])?;

    let mut item_idx = 1;
    let mut scan_row = source_row + 1;
    while item_idx < items.len() {
        if scan_row >= rows.len() {
            let clone = clone_row_clearing_placeholders(&rows[source_row]);
            rows.push(clone);
        }

        let existing = match get_cell(&rows[scan_row], col) {
            Some(cell) => Some(text_body_content(cell_tx_body(cell)?).trim().to_string()),
            None => None,
        };

        match existing {
            None => scan_row += 1,
            Some(text) if text.is_empty() => {
                set_cell_text(rows, scan_row, col, &items[item_idx])?;
                item_idx += 1;
                scan_row += 1;
            }
            Some(_) => {
                return Err(RenderError::CellOverwrite(format!(
                    "row {scan_row}, column {col} already has content"
                )))
            }
        }
    }
    Ok(())
}

fn clone_row_clearing_placeholders(row: &XmlElement) -> XmlElement {
    let mut clone = row.clone();
    for child in &mut clone.children {
        if let XmlNode::Element(cell) = child {
            if cell.name == "a:tc" {
                if let Some(tx_body) = cell.child_mut("a:txBody") {
                    if tx_body.text_content().contains("{{") {
                        replace_text_body(tx_body, "");
                    }
                }
            }
        }
    }
    clone
}
