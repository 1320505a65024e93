//! Styles written through the model and read back from the saved package.

use cellar_core::{CellAddress, CellValue, Color, FillStyle, NumberFormat, Style};
use cellar_xlsx::{Options, Package};
use pretty_assertions::assert_eq;

use crate::entry_text;

fn saved_with_styles() -> (Vec<u8>, u32, u32) {
    let mut package = Package::new();
    let header = Style::new().bold(true).fill_color(Color::Rgb { r: 0xDD, g: 0xEE, b: 0xFF });
    let money = Style::new().number_format("#,##0.00 \"EUR\"");
    let (h, m) = package
        .edit_sheet(0, |wb| {
            wb.set_cell_value(0, CellAddress::new(0, 0), CellValue::from("amount"))?;
            wb.set_cell_value(0, CellAddress::new(1, 0), CellValue::Number(1234.5))?;
            let h = wb.set_cell_style(0, CellAddress::new(0, 0), &header)?;
            let m = wb.set_cell_style(0, CellAddress::new(1, 0), &money)?;
            // same descriptor again does not grow the table
            let again = wb.set_cell_style(0, CellAddress::new(2, 0), &money)?;
            assert_eq!(again, m);
            Ok((h, m))
        })
        .unwrap();
    (package.to_bytes(None).unwrap(), h, m)
}

#[test]
fn test_styles_survive_round_trip() {
    let (bytes, header, money) = saved_with_styles();
    let mut package = Package::from_bytes(bytes, Options::default()).unwrap();
    package.load_sheet(0).unwrap();
    let wb = package.workbook().unwrap();

    let h = wb.cell_style(0, CellAddress::new(0, 0)).unwrap();
    let m = wb.cell_style(0, CellAddress::new(1, 0)).unwrap();
    assert_eq!(h, header);
    assert_eq!(m, money);
    let h = wb.style(h).unwrap();
    assert!(h.font.bold);
    assert!(matches!(h.fill, FillStyle::Pattern { .. }));
    let m = wb.style(m).unwrap();
    assert_eq!(m.number_format.format_code(), "#,##0.00 \"EUR\"");
}

#[test]
fn test_custom_number_format_ids() {
    let (bytes, _, _) = saved_with_styles();
    let styles = entry_text(&bytes, "xl/styles.xml").unwrap();
    assert!(styles.contains(r#"numFmtId="164""#), "{}", styles);
}

#[test]
fn test_builtin_code_is_normalized() {
    let mut package = Package::new();
    let index = package
        .edit_sheet(0, |wb| {
            wb.set_cell_style(
                0,
                CellAddress::new(0, 0),
                &Style::new().number_format("0.00"),
            )
        })
        .unwrap();
    let wb = package.workbook().unwrap();
    assert_eq!(wb.style(index).unwrap().number_format, NumberFormat::BuiltIn(2));
}
