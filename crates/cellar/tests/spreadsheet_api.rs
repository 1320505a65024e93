//! Sheet lifecycle, bounds and locking through the public API

use std::sync::Arc;
use std::thread;

use cellar::prelude::*;
use cellar::{cell_name_to_coordinates, coordinates_to_cell_name, Chart, ChartKind, ChartSeries};
use pretty_assertions::assert_eq;

#[test]
fn test_bounds() {
    let book = Spreadsheet::new();
    let last = coordinates_to_cell_name(16_384, 1_048_576, false).unwrap();
    assert_eq!(last, "XFD1048576");
    book.set_cell_value("Sheet1", &last, 1.0).unwrap();

    let err = coordinates_to_cell_name(16_385, 1, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfBounds);
    let err = book.set_cell_value("Sheet1", "XFE1", 1.0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = book.set_cell_value("Sheet1", "A1048577", 1.0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    assert_eq!(cell_name_to_coordinates("$C$7").unwrap(), (3, 7));
    assert!(cell_name_to_coordinates("7C").is_err());
}

#[test]
fn test_duplicate_sheet_name_ignores_case() {
    let book = Spreadsheet::new();
    let err = book.add_sheet("SHEET1").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateSheetName);
    let err = book.add_sheet("bad/name").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidSheetName);
    assert_eq!(book.add_sheet("Second").unwrap(), 1);
}

#[test]
fn test_remove_sheet_drops_its_names() {
    let book = Spreadsheet::new();
    book.add_sheet("Rates").unwrap();
    book.set_defined_name("Prime", "Rates!$A$1", None).unwrap();
    book.set_defined_name("Local", "$B$1", Some("Rates")).unwrap();
    book.set_defined_name("Kept", "Sheet1!$A$1", None).unwrap();

    book.remove_sheet("rates").unwrap();
    let names: Vec<String> = book.defined_names().unwrap().into_iter().map(|n| n.name).collect();
    assert_eq!(names, vec!["Kept"]);

    let err = book.remove_sheet("Sheet1").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidSheetName);
}

#[test]
fn test_rename_and_copy_sheet() {
    let book = Spreadsheet::new();
    book.set_cell_value("Sheet1", "A1", "x").unwrap();
    book.set_defined_name("Cell", "Sheet1!$A$1", None).unwrap();
    book.rename_sheet("Sheet1", "Source").unwrap();
    assert_eq!(book.defined_names().unwrap()[0].formula, "Source!$A$1");

    book.add_sheet("Target").unwrap();
    book.copy_sheet("Source", "Target").unwrap();
    assert_eq!(book.cell_value("Target", "A1").unwrap(), CellValue::from("x"));
}

#[test]
fn test_rows_and_columns() {
    let book = Spreadsheet::new();
    book.set_sheet_row("Sheet1", "A1", [1.0, 2.0]).unwrap();
    book.set_sheet_row("Sheet1", "A2", [3.0]).unwrap();
    book.duplicate_row("Sheet1", 1).unwrap();
    assert_eq!(
        book.rows("Sheet1").unwrap(),
        vec![
            vec![CellValue::Number(1.0), CellValue::Number(2.0)],
            vec![CellValue::Number(1.0), CellValue::Number(2.0)],
            vec![CellValue::Number(3.0)],
        ]
    );

    book.duplicate_row_to("Sheet1", 3, 1).unwrap();
    assert_eq!(book.cell_value("Sheet1", "A1").unwrap(), CellValue::Number(3.0));
    assert_eq!(book.cell_value("Sheet1", "A4").unwrap(), CellValue::Number(3.0));

    book.set_row_visible("Sheet1", 2, false).unwrap();
    book.set_row_outline_level("Sheet1", 2, 1).unwrap();
    assert!(book.set_row_outline_level("Sheet1", 2, 8).is_err());
    book.set_col_width("Sheet1", "C", "A", 18.5).unwrap();
    assert_eq!(
        book.set_col_width("Sheet1", "A", "B", 300.0).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
}

#[test]
fn test_merge_rejects_single_cell() {
    let book = Spreadsheet::new();
    book.merge_cell("Sheet1", "B2", "A1").unwrap();
    assert!(book.merge_cell("Sheet1", "D4", "D4").is_err());
    assert_eq!(book.unmerge_cell("Sheet1", "A1", "A1").unwrap(), 1);
}

#[test]
fn test_hidden_sheet_cannot_be_active() {
    let book = Spreadsheet::new();
    book.add_sheet("Back").unwrap();
    book.set_sheet_visible("Back", false).unwrap();
    assert!(book.set_active_sheet("Back").is_err());
    assert!(book.set_sheet_visible("Sheet1", false).is_err());
    assert_eq!(book.active_sheet().unwrap(), "Sheet1");
}

#[test]
fn test_unknown_style_index() {
    let book = Spreadsheet::new();
    let err = book.set_cell_style("Sheet1", "A1", "A1", 99).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfBounds);
    assert_eq!(book.style(99).unwrap_err().kind(), ErrorKind::OutOfBounds);
}

#[test]
fn test_concurrent_readers() {
    let book = Spreadsheet::new();
    for row in 1..=50u32 {
        book.set_cell_value("Sheet1", &format!("A{}", row), row as f64).unwrap();
    }
    let bytes = book.write_to(Vec::new()).unwrap();
    let shared = Arc::new(Spreadsheet::from_bytes(bytes, Options::default()).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let book = Arc::clone(&shared);
            thread::spawn(move || {
                (1..=50u32)
                    .map(|row| {
                        book.cell_value("Sheet1", &format!("A{}", row))
                            .unwrap()
                            .as_number()
                            .unwrap()
                    })
                    .sum::<f64>()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), 1275.0);
    }
}

#[test]
fn test_use_after_close() {
    let book = Spreadsheet::new();
    book.close().unwrap();
    assert_eq!(book.cell_value("Sheet1", "A1").unwrap_err().kind(), ErrorKind::UseAfterClose);
    assert_eq!(book.write_to(Vec::new()).unwrap_err().kind(), ErrorKind::UseAfterClose);
}

#[test]
fn test_charts_and_backgrounds() {
    let book = Spreadsheet::new();
    book.set_sheet_row("Sheet1", "A1", vec![CellValue::from("north"), CellValue::Number(12.0)])
        .unwrap();
    let chart = Chart::new(ChartKind::Pie).with_series(ChartSeries::new("", "Sheet1!$A$1", "Sheet1!$B$1"));
    book.add_chart("Sheet1", "D2", &chart).unwrap();
    book.set_sheet_background_from_bytes("Sheet1", "png", b"PNG").unwrap();
    assert_eq!(
        book.add_chart("Missing", "D2", &chart).unwrap_err().kind(),
        ErrorKind::SheetNotFound
    );
    assert_eq!(
        book.set_sheet_background_from_bytes("Sheet1", "doc", b"PNG").unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );

    let reopened = Spreadsheet::from_bytes(book.write_to(Vec::new()).unwrap(), Options::default()).unwrap();
    reopened.delete_chart("Sheet1", "D2").unwrap();
    reopened.delete_picture("Sheet1", "D2").unwrap();
    reopened.delete_comment("Sheet1", "A1").unwrap();
    assert_eq!(reopened.cell_value("Sheet1", "B1").unwrap(), CellValue::Number(12.0));
    assert_eq!(reopened.delete_slicer("Region").unwrap_err().kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_streaming_sheet_rejects_chart() {
    let book = Spreadsheet::new();
    let writer = book.stream_writer("Sheet1").unwrap();
    let chart = Chart::new(ChartKind::Line).with_series(ChartSeries::new("", "", "Sheet1!$A$1:$A$9"));
    let err = book.add_chart("Sheet1", "C3", &chart).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConflictingAccessMode);
    drop(writer);
}
