//! Streaming reads and writes through a package.

use cellar_core::{AccessMode, CellAddress, CellRange, CellValue};
use cellar_xlsx::{
    CancellationToken, Options, Package, RowOptions, StreamCell, XlsxError, XlsxResult,
};
use pretty_assertions::assert_eq;

use crate::{entry_text, PackageBuilder};

fn fixture() -> PackageBuilder {
    PackageBuilder::new()
        .sheet(
            "Log",
            r#"<row r="1"><c r="A1"><v>1</v></c></row><row><c><v>2</v></c><c t="inlineStr"><is><t>two</t></is></c></row><row r="4" hidden="1"><c r="B4" t="b"><v>0</v></c></row>"#,
        )
        .sheet("Other", "")
}

#[test]
fn test_stream_rows_from_archive() {
    let package = fixture().open();
    let rows: Vec<_> = package
        .stream_rows(0, None)
        .unwrap()
        .collect::<XlsxResult<_>>()
        .unwrap();
    let numbers: Vec<u32> = rows.iter().map(|r| r.number).collect();
    assert_eq!(numbers, vec![1, 2, 4]);
    assert_eq!(rows[1].values(), vec![CellValue::Number(2.0), CellValue::from("two")]);
    assert!(rows[2].hidden);
    assert_eq!(rows[2].cells[0].column, 2);
}

#[test]
fn test_stream_rows_reopens_source() {
    let package = fixture().open();
    let first = package.stream_rows(0, None).unwrap().count();
    let second = package.stream_rows(0, None).unwrap().count();
    assert_eq!(first, 3);
    assert_eq!(first, second);
}

#[test]
fn test_stream_rows_sees_buffered_changes() {
    let mut package = fixture().open();
    package
        .edit_sheet(0, |wb| wb.set_cell_value(0, CellAddress::new(9, 0), CellValue::Number(10.0)))
        .unwrap();
    let last = package
        .stream_rows(0, None)
        .unwrap()
        .last()
        .unwrap()
        .unwrap();
    assert_eq!(last.number, 10);
}

#[test]
fn test_spooled_large_sheet() {
    let rows: String = (1..=500)
        .map(|r| format!(r#"<row r="{r}"><c r="A{r}"><v>{r}</v></c></row>"#))
        .collect();
    let bytes = PackageBuilder::new().sheet("Big", &rows).build();
    let package = Package::from_bytes(bytes, Options::default().with_unzip_xml_size_limit(256)).unwrap();
    let total: f64 = package
        .stream_rows(0, None)
        .unwrap()
        .map(|row| row.unwrap().values()[0].as_number().unwrap())
        .sum();
    assert_eq!(total, (1..=500).sum::<u32>() as f64);
}

#[test]
fn test_write_then_save_and_reopen() {
    let mut package = fixture().open();
    let mut writer = package.stream_writer(1, None).unwrap();
    writer.set_col_width(0, 0, 24.0).unwrap();
    writer
        .write_row(
            CellAddress::new(0, 0),
            vec!["id".into(), "label".into(), StreamCell::formula("A2*2", CellValue::Empty)],
            &RowOptions {
                height: Some(20.0),
                ..Default::default()
            },
        )
        .unwrap();
    for row in 1..=3u32 {
        writer
            .write_row(
                CellAddress::new(row, 0),
                vec![StreamCell::from(row as i64), StreamCell::from(format!("item {}", row))],
                &RowOptions::default(),
            )
            .unwrap();
    }
    let err = writer
        .write_row(CellAddress::new(1, 0), vec![1.0.into()], &RowOptions::default())
        .unwrap_err();
    assert!(matches!(err, XlsxError::OutOfOrderRow { row: 2, last: 4 }));
    writer.merge_cell(CellRange::parse("A6:C6").unwrap()).unwrap();
    package.flush_stream(writer).unwrap();

    assert_eq!(
        package.workbook().unwrap().worksheet(1).unwrap().access_mode(),
        AccessMode::Streamed
    );
    let out = package.to_bytes(None).unwrap();
    let xml = entry_text(&out, "xl/worksheets/sheet2.xml").unwrap();
    assert!(xml.contains(r#"<dimension ref="A1:C4"/>"#), "{}", xml);
    assert!(xml.contains("<cols>"));

    let mut reopened = Package::from_bytes(out, Options::default()).unwrap();
    reopened.load_sheet(1).unwrap();
    let wb = reopened.workbook().unwrap();
    assert_eq!(
        wb.cell_value(1, CellAddress::new(3, 1)).unwrap(),
        CellValue::from("item 3")
    );
    assert_eq!(
        wb.cell_formula(1, CellAddress::new(0, 2)).unwrap().as_deref(),
        Some("A2*2")
    );
}

#[test]
fn test_streamed_sheet_is_readable_not_writable() {
    let mut package = fixture().open();
    let mut writer = package.stream_writer(1, None).unwrap();
    writer
        .write_row(CellAddress::new(0, 0), vec![5.0.into()], &RowOptions::default())
        .unwrap();
    package.flush_stream(writer).unwrap();

    package.load_sheet(1).unwrap();
    assert_eq!(
        package.workbook().unwrap().cell_value(1, CellAddress::new(0, 0)).unwrap(),
        CellValue::Number(5.0)
    );
    let err = package
        .edit_sheet(1, |wb| wb.set_cell_value(1, CellAddress::new(0, 0), CellValue::Number(6.0)))
        .unwrap_err();
    assert!(matches!(
        err,
        XlsxError::Core(cellar_core::Error::ConflictingAccessMode { .. })
    ));
}

#[test]
fn test_abort_releases_sheet() {
    let mut package = fixture().open();
    let writer = package.stream_writer(1, None).unwrap();
    let id = writer.sheet_id();
    drop(writer);
    package.abort_stream(id);
    package
        .edit_sheet(1, |wb| wb.set_cell_value(1, CellAddress::new(0, 0), CellValue::Number(1.0)))
        .unwrap();
}

#[test]
fn test_cancelled_writer() {
    let mut package = fixture().open();
    let token = CancellationToken::new();
    let mut writer = package.stream_writer(1, Some(token.clone())).unwrap();
    token.cancel();
    let err = writer
        .write_row(CellAddress::new(0, 0), vec![1.0.into()], &RowOptions::default())
        .unwrap_err();
    assert!(matches!(err, XlsxError::Cancelled));
}
