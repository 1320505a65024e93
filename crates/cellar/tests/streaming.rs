//! Streaming reads and writes through the public API

use cellar::prelude::*;
use cellar::XlsxError;
use pretty_assertions::assert_eq;

#[test]
fn test_stream_write_then_read() {
    let book = Spreadsheet::new();
    let mut writer = book.stream_writer("Sheet1").unwrap();
    writer.set_col_width("A", "B", 14.0).unwrap();
    writer.write_row("A1", ["Name", "Score"]).unwrap();
    writer
        .write_row("A2", vec![StreamCell::from("ada"), StreamCell::from(91.5)])
        .unwrap();
    writer
        .write_row_with(
            "A3",
            vec![StreamCell::formula("SUM(B2:B2)", CellValue::Number(91.5))],
            &RowOptions {
                height: Some(24.0),
                ..Default::default()
            },
        )
        .unwrap();
    writer.merge_cell("C1", "D1").unwrap();
    assert_eq!(writer.last_row(), Some(3));
    writer.flush().unwrap();

    let bytes = book.write_to(Vec::new()).unwrap();
    let back = Spreadsheet::from_bytes(bytes, Options::default()).unwrap();
    let rows: Vec<_> = back
        .stream_rows("Sheet1")
        .unwrap()
        .collect::<std::result::Result<_, _>>()
        .unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].values(), vec![CellValue::from("Name"), CellValue::from("Score")]);
    assert_eq!(rows[2].number, 3);
    assert_eq!(rows[2].height, Some(24.0));
    assert_eq!(rows[2].cells[0].formula.as_deref(), Some("SUM(B2:B2)"));
    assert_eq!(rows[2].cells[0].value, CellValue::Number(91.5));

    assert_eq!(back.cell_value("Sheet1", "B2").unwrap(), CellValue::Number(91.5));
}

#[test]
fn test_rows_must_increase() {
    let book = Spreadsheet::new();
    let mut writer = book.stream_writer("Sheet1").unwrap();
    writer.write_row("A1", [1.0]).unwrap();
    writer.write_row("A2", [2.0]).unwrap();
    writer.write_row("A3", [3.0]).unwrap();
    let err = writer.write_row("A2", [4.0]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfOrderRow);
    assert!(matches!(
        err,
        Error::Xlsx(XlsxError::OutOfOrderRow { row: 2, last: 3 })
    ));
}

#[test]
fn test_writer_holds_the_sheet() {
    let book = Spreadsheet::new();
    book.add_sheet("Other").unwrap();
    let writer = book.stream_writer("Sheet1").unwrap();

    let err = book.set_cell_value("Sheet1", "A1", 1.0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConflictingAccessMode);
    let err = book.stream_writer("Sheet1").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConflictingAccessMode);
    book.set_cell_value("Other", "A1", 1.0).unwrap();

    drop(writer);
    book.set_cell_value("Sheet1", "A1", 1.0).unwrap();
}

#[test]
fn test_buffered_sheet_rejects_writer() {
    let book = Spreadsheet::new();
    book.set_cell_value("Sheet1", "A1", 1.0).unwrap();
    let err = book.stream_writer("Sheet1").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConflictingAccessMode);
}

#[test]
fn test_stream_rows_sees_buffered_changes() {
    let book = Spreadsheet::new();
    book.set_sheet_row("Sheet1", "B2", [true]).unwrap();
    let row = book.stream_rows("Sheet1").unwrap().next().unwrap().unwrap();
    assert_eq!(row.number, 2);
    assert_eq!(row.values(), vec![CellValue::Empty, CellValue::Boolean(true)]);
}

#[test]
fn test_cancelled_stream() {
    let book = Spreadsheet::new();
    let token = CancellationToken::new();
    let mut writer = book.stream_writer_with("Sheet1", Some(token.clone())).unwrap();
    writer.write_row("A1", [1.0]).unwrap();
    token.cancel();
    assert_eq!(writer.write_row("A2", [2.0]).unwrap_err().kind(), ErrorKind::Cancelled);
}
