//! Open, change, save and reopen whole packages.

use std::io::Cursor;

use cellar_core::{CellAddress, CellValue, NameScope, SheetVisibility};
use cellar_xlsx::{CancellationToken, Options, Package, PackageState, XlsxError};
use pretty_assertions::assert_eq;

use crate::{entry_names, entry_text, PackageBuilder};

const ROWS: &str = r#"<row r="1"><c r="A1" t="inlineStr"><is><t>name</t></is></c><c r="B1" t="inlineStr"><is><t>qty</t></is></c></row><row r="2"><c r="A2" t="inlineStr"><is><t>bolts</t></is></c><c r="B2"><v>12</v></c><c r="C2"><f>B2*2</f><v>24</v></c></row>"#;

fn addr(a1: &str) -> CellAddress {
    CellAddress::parse(a1).unwrap()
}

fn two_sheets() -> PackageBuilder {
    PackageBuilder::new()
        .sheet("Inventory", ROWS)
        .sheet("Archive", r#"<row r="1"><c r="A1"><v>1</v></c></row>"#)
        .defined_name("Stock", "Inventory!$B$2")
        .entry("customXml/item1.xml", "<root>opaque</root>")
}

#[test]
fn test_unreferenced_parts_pass_through() {
    let mut package = two_sheets().open();
    package
        .edit_sheet(0, |wb| wb.set_cell_value(0, addr("D4"), CellValue::Boolean(true)))
        .unwrap();
    let out = package.to_bytes(None).unwrap();
    assert_eq!(entry_text(&out, "customXml/item1.xml").as_deref(), Some("<root>opaque</root>"));
    assert_eq!(entry_names(&out)[0], "[Content_Types].xml");
}

#[test]
fn test_round_trip_equal_model() {
    let source = two_sheets().build();
    let mut original = Package::from_bytes(source, Options::default().with_preload_sheets(true)).unwrap();
    let out = original.to_bytes(None).unwrap();
    let reopened = Package::from_bytes(out, Options::default().with_preload_sheets(true)).unwrap();

    let a = original.workbook().unwrap();
    let b = reopened.workbook().unwrap();
    assert_eq!(a.sheet_names(), b.sheet_names());
    for sheet in 0..a.sheet_count() {
        assert_eq!(a.rows(sheet).unwrap(), b.rows(sheet).unwrap());
    }
    assert_eq!(b.cell_formula(0, addr("C2")).unwrap().as_deref(), Some("B2*2"));
    assert_eq!(b.cell_value(0, addr("C2")).unwrap(), CellValue::Number(24.0));
}

#[test]
fn test_modified_round_trip() {
    let mut package = two_sheets().open();
    package
        .edit_sheet(0, |wb| {
            wb.set_cell_value(0, addr("B2"), CellValue::Number(13.0))?;
            wb.set_cell_value(0, addr("A3"), CellValue::from("nuts"))?;
            wb.set_row_height(0, 2, Some(30.0))
        })
        .unwrap();
    package
        .edit(|wb| wb.set_sheet_visibility(1, SheetVisibility::Hidden))
        .unwrap();
    let out = package.to_bytes(None).unwrap();

    let mut reopened = Package::from_bytes(out, Options::default()).unwrap();
    reopened.load_sheet(0).unwrap();
    let wb = reopened.workbook().unwrap();
    assert_eq!(wb.cell_value(0, addr("B2")).unwrap(), CellValue::Number(13.0));
    assert_eq!(wb.cell_value(0, addr("A3")).unwrap(), CellValue::from("nuts"));
    assert_eq!(wb.cell_value(0, addr("A1")).unwrap(), CellValue::from("name"));
    assert_eq!(
        wb.worksheet(0).unwrap().row_meta(2).height,
        Some(30.0)
    );
    assert_eq!(wb.worksheet(1).unwrap().visibility(), SheetVisibility::Hidden);
    // stale cached result is kept
    assert_eq!(wb.cell_value(0, addr("C2")).unwrap(), CellValue::Number(24.0));
}

#[test]
fn test_rename_sheet_rewrites_names() {
    let mut package = two_sheets().open();
    package.edit(|wb| wb.rename_sheet("Inventory", "Stockroom")).unwrap();
    let out = package.to_bytes(None).unwrap();

    let reopened = Package::from_bytes(out, Options::default()).unwrap();
    let wb = reopened.workbook().unwrap();
    assert_eq!(wb.sheet_names()[0], "Stockroom");
    let name = wb.defined_name("Stock", NameScope::Workbook).unwrap();
    assert_eq!(name.formula, "Stockroom!$B$2");
}

#[test]
fn test_duplicate_sheet_name_rejected() {
    let mut package = two_sheets().open();
    let err = package.add_sheet("inventory").unwrap_err();
    assert!(matches!(
        err,
        XlsxError::Core(cellar_core::Error::DuplicateSheetName(_))
    ));
    assert_eq!(package.state(), PackageState::Open);
}

#[test]
fn test_bounds() {
    let mut package = Package::new();
    let last = CellAddress::from_coordinates(16_384, 1_048_576).unwrap();
    package
        .edit_sheet(0, |wb| wb.set_cell_value(0, last, CellValue::Number(1.0)))
        .unwrap();
    assert!(CellAddress::from_coordinates(16_385, 1).is_err());

    let out = package.to_bytes(None).unwrap();
    let sheet = entry_text(&out, "xl/worksheets/sheet1.xml").unwrap();
    assert!(sheet.contains(r#"r="XFD1048576""#));
}

#[test]
fn test_save_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("book.xlsx");
    std::fs::write(&path, two_sheets().build()).unwrap();

    let mut package = Package::open(&path, Options::default()).unwrap();
    assert_eq!(package.path(), Some(path.as_path()));
    package
        .edit_sheet(1, |wb| wb.set_cell_value(1, addr("B1"), CellValue::from("added")))
        .unwrap();
    package.save(None).unwrap();
    assert_eq!(package.state(), PackageState::Saved);

    let mut again = Package::open(&path, Options::default()).unwrap();
    again.load_sheet(1).unwrap();
    assert_eq!(
        again.workbook().unwrap().cell_value(1, addr("B1")).unwrap(),
        CellValue::from("added")
    );
    assert!(entry_text(&std::fs::read(&path).unwrap(), "xl/sharedStrings.xml").is_some());
}

#[test]
fn test_template_flavor_from_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.xltx");
    let mut package = two_sheets().open();
    package.save_as(&path, None).unwrap();

    let reopened = Package::open(&path, Options::default()).unwrap();
    assert_eq!(reopened.flavor(), cellar_xlsx::Flavor::Template);
    let ct = entry_text(&std::fs::read(&path).unwrap(), "[Content_Types].xml").unwrap();
    assert!(ct.contains("spreadsheetml.template.main+xml"));
}

#[test]
fn test_cancelled_write_keeps_state() {
    let mut package = two_sheets().open();
    package
        .edit_sheet(0, |wb| wb.set_cell_value(0, addr("A9"), CellValue::Number(9.0)))
        .unwrap();
    let token = CancellationToken::new();
    token.cancel();
    let result = package.write_to(Cursor::new(Vec::new()), Some(&token));
    assert!(matches!(result, Err(XlsxError::Cancelled)));
    assert_eq!(package.state(), PackageState::Modified);
}

#[test]
fn test_too_large_package_rejected() {
    let bytes = two_sheets().build();
    let err = Package::from_bytes(bytes, Options::default().with_unzip_size_limit(64)).unwrap_err();
    assert!(matches!(err, XlsxError::PackageTooLarge { .. }));
}

#[test]
fn test_not_a_zip() {
    let err = Package::from_bytes(b"plain text".to_vec(), Options::default()).unwrap_err();
    assert!(matches!(err, XlsxError::CorruptContainer(_)));
}
