//! The XLSX variant of C12 (§6 "`render_xlsx` has the same shape ... invokes
//! a worksheet-walk that processes column-by-column").
//!
//! Grounded on this crate's existing `umya-spreadsheet` cell access idiom
//! (`sheet.get_cell((col, row))`, `get_raw_value`/`get_value`) and on the
//! list-expansion policy already established in
//! `pptx::tables`'s column-fill — adapted from an XML row list to a flat
//! cell grid, since `umya-spreadsheet` owns the package format directly
//! (§4.13) and there is no row element to clone: a blank cell below the
//! placeholder is simply written into, and the walk grows past the
//! sheet's prior extent once it runs out of blank cells.

use std::io::Cursor;

use chrono::NaiveDateTime;
use umya_spreadsheet::{Cell, Worksheet};

use crate::config::RenderOptions;
use crate::error::{ErrorAccumulator, RenderError};
use crate::expr::Evaluator;
use crate::permission::Principal;
use crate::placeholder::{process_text_list, CellValue};
use crate::value::Value;

/// Render a `.xlsx` template against `context`. Same disposition rules as
/// [`crate::pptx::renderer::render_pptx`]: `(Some(bytes), None)` on a clean
/// render, `(None, Some(errors))` once any recoverable error accumulates.
pub fn render_xlsx(
    bytes: &[u8],
    context: &Value,
    principal: Option<&dyn Principal>,
    now: NaiveDateTime,
    opts: &RenderOptions,
) -> Result<(Option<Vec<u8>>, Option<Vec<String>>), RenderError> {
    let span = tracing::info_span!("render_xlsx");
    let _enter = span.enter();

    let mut book = umya_spreadsheet::reader::xlsx::read_reader(Cursor::new(bytes), true)
        .map_err(|e| RenderError::Spreadsheet(e.to_string()))?;
    let mut errors = ErrorAccumulator::new();

    {
        let mut eval = Evaluator::new(now, &mut errors);
        if opts.check_permissions {
            if let Some(p) = principal {
                eval = eval.with_principal(p);
            }
        }

        let sheet_count = book.get_sheet_collection().len();
        for index in 0..sheet_count {
            let name = book
                .get_sheet_collection()
                .get(index)
                .map(|s| s.get_name().to_string())
                .unwrap_or_default();
            if let Some(names) = &opts.sheet_names {
                if !names.iter().any(|n| n == &name) {
                    continue;
                }
            }
            let Some(sheet) = book.get_sheet_mut(&index) else {
                continue;
            };

            let rows_before = sheet.get_highest_row();
            render_sheet(sheet, context, &mut eval)?;
            tracing::info!(
                sheet = %name,
                rows_before,
                rows_after = sheet.get_highest_row(),
                "sheet rendered"
            );

            if opts.fail_on_missing && !eval.errors.is_empty() {
                return Err(RenderError::UnresolvedTag(eval.errors.as_slice().to_vec()));
            }
        }
    }

    if !errors.is_empty() {
        return Ok((None, Some(errors.into_vec())));
    }

    let mut out = Cursor::new(Vec::new());
    umya_spreadsheet::writer::xlsx::write_writer(&book, &mut out)
        .map_err(|e| RenderError::Spreadsheet(e.to_string()))?;
    Ok((Some(out.into_inner()), None))
}

fn render_sheet(
    sheet: &mut Worksheet,
    context: &Value,
    eval: &mut Evaluator,
) -> Result<(), RenderError> {
    let highest_row = sheet.get_highest_row();
    let highest_col = sheet.get_highest_column();

    for col in 1..=highest_col.max(1) {
        let mut row = 1u32;
        while row <= highest_row.max(1) {
            let text = sheet
                .get_cell((col, row))
                .map(cell_text)
                .unwrap_or_default();
            if !text.contains("{{") && text.trim().parse::<f64>().is_err() {
                row += 1;
                continue;
            }

            let values = process_text_list(&[text], context, eval, true, false)?;
            row = match values.len() {
                0 => {
                    set_cell_value(sheet, col, row, &CellValue::Text(String::new()));
                    row + 1
                }
                1 => {
                    set_cell_value(sheet, col, row, &values[0]);
                    row + 1
                }
                _ => fill_column_downward(sheet, col, row, highest_row, &values)?,
            };
        }
    }
    Ok(())
}

/// Write `values` into `col` starting at `start_row`, one per row. A row
/// still within the sheet's original extent must be blank or this is a
/// `CellOverwrite`; rows past the original extent are free to use.
fn fill_column_downward(
    sheet: &mut Worksheet,
    col: u32,
    start_row: u32,
    highest_row: u32,
    values: &[CellValue],
) -> Result<u32, RenderError> {
    let mut row = start_row;
    for (i, value) in values.iter().enumerate() {
        if i > 0 && row <= highest_row {
            let occupied = sheet
                .get_cell((col, row))
                .map(|c| !cell_text(c).trim().is_empty())
                .unwrap_or(false);
            if occupied {
                return Err(RenderError::CellOverwrite(format!(
                    "column {col} row {row} already has content"
                )));
            }
        }
        set_cell_value(sheet, col, row, value);
        row += 1;
    }
    Ok(row)
}

fn cell_text(cell: &Cell) -> String {
    cell.get_value().to_string()
}

fn set_cell_value(sheet: &mut Worksheet, col: u32, row: u32, value: &CellValue) {
    let cell = sheet.get_cell_mut((col, row));
    match value {
        CellValue::Text(s) => {
            cell.set_value(s.clone());
        }
        CellValue::Number(n) => {
            cell.set_value_number(*n);
        }
    }
}
