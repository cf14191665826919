//! Integration tests for the XLSX renderer (C12's worksheet-walk variant)
//! exercising numeric coercion and column growth past a sheet's original
//! extent, which the renderer's own unit tests don't cover.

use std::io::Cursor;

use chrono::NaiveDateTime;

use office_templater::config::RenderOptions;
use office_templater::value::{Context, Value};

fn now() -> NaiveDateTime {
    chrono::NaiveDate::from_ymd_opt(2020, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn build_fixture_xlsx(cells: &[(&str, &str)]) -> Vec<u8> {
    let mut book = umya_spreadsheet::new_file();
    {
        let sheet = book.get_sheet_mut(&0).unwrap();
        for (coord, text) in cells {
            sheet.get_cell_mut(*coord).set_value(*text);
        }
    }
    let mut cursor = Cursor::new(Vec::new());
    umya_spreadsheet::writer::xlsx::write_writer(&book, &mut cursor).unwrap();
    cursor.into_inner()
}

#[test]
fn numeric_list_is_coerced_to_numbers_in_each_cell() {
    let xlsx = build_fixture_xlsx(&[("A1", "{{ amounts }}")]);
    let mut ctx = Context::new();
    ctx.insert(
        "amounts",
        Value::List(vec![Value::Int(10), Value::Int(20), Value::Int(30)]),
    );
    let (output, errors) = office_templater::render_xlsx(
        &xlsx,
        &ctx.to_value(),
        None,
        now(),
        &RenderOptions::default(),
    )
    .unwrap();
    assert!(errors.is_none());

    let book = umya_spreadsheet::reader::xlsx::read_reader(Cursor::new(output.unwrap()), true)
        .unwrap();
    let sheet = book.get_sheet(&0).unwrap();
    assert_eq!(sheet.get_cell((1, 1)).unwrap().get_value().to_string(), "10");
    assert_eq!(sheet.get_cell((1, 2)).unwrap().get_value().to_string(), "20");
    assert_eq!(sheet.get_cell((1, 3)).unwrap().get_value().to_string(), "30");
}

#[test]
fn list_longer_than_the_original_sheet_grows_past_its_extent() {
    // A1 is the only populated cell: the sheet's original highest_row is 1,
    // so a 3-item list must grow two rows past it freely.
    let xlsx = build_fixture_xlsx(&[("A1", "{{ items }}")]);
    let mut ctx = Context::new();
    ctx.insert(
        "items",
        Value::List(vec![Value::str("x"), Value::str("y"), Value::str("z")]),
    );
    let (output, errors) = office_templater::render_xlsx(
        &xlsx,
        &ctx.to_value(),
        None,
        now(),
        &RenderOptions::default(),
    )
    .unwrap();
    assert!(errors.is_none());

    let book = umya_spreadsheet::reader::xlsx::read_reader(Cursor::new(output.unwrap()), true)
        .unwrap();
    let sheet = book.get_sheet(&0).unwrap();
    assert_eq!(sheet.get_cell((1, 1)).unwrap().get_value().to_string(), "x");
    assert_eq!(sheet.get_cell((1, 2)).unwrap().get_value().to_string(), "y");
    assert_eq!(sheet.get_cell((1, 3)).unwrap().get_value().to_string(), "z");
}

#[test]
fn non_numeric_list_falls_back_to_text_cells() {
    let xlsx = build_fixture_xlsx(&[("A1", "{{ labels }}")]);
    let mut ctx = Context::new();
    ctx.insert(
        "labels",
        Value::List(vec![Value::str("north"), Value::str("south")]),
    );
    let (output, errors) = office_templater::render_xlsx(
        &xlsx,
        &ctx.to_value(),
        None,
        now(),
        &RenderOptions::default(),
    )
    .unwrap();
    assert!(errors.is_none());

    let book = umya_spreadsheet::reader::xlsx::read_reader(Cursor::new(output.unwrap()), true)
        .unwrap();
    let sheet = book.get_sheet(&0).unwrap();
    assert_eq!(sheet.get_cell((1, 1)).unwrap().get_value().to_string(), "north");
    assert_eq!(sheet.get_cell((1, 2)).unwrap().get_value().to_string(), "south");
}
