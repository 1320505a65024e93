//! # cellar
//!
//! Read, edit, stream and write Office Open XML spreadsheets (`.xlsx`,
//! `.xlsm`, `.xltx`, `.xltm`).
//!
//! [`Spreadsheet`] is the entry point. Sheets load lazily, untouched parts
//! are copied through unchanged on save, and large sheets can be read and
//! written a row at a time.
//!
//! ## Features
//!
//! - Cell values, formulas (stored, never evaluated) and styles
//! - Sheets, defined names, row and column settings, merged ranges
//! - Charts, sheet backgrounds, and removal of comments, pictures and slicers
//! - Streaming row reader and writer backed by temporary files
//! - Byte-identical round trips for documents that were not changed
//!
//! ## Example
//!
//! ```rust
//! use cellar::prelude::*;
//!
//! let book = Spreadsheet::new();
//! book.set_cell_value("Sheet1", "A1", "Hello").unwrap();
//! book.set_cell_value("Sheet1", "B1", 42.0).unwrap();
//! book.set_cell_formula("Sheet1", "C1", "B1*2").unwrap();
//!
//! let bold = book.new_style(Style::new().bold(true)).unwrap();
//! book.set_cell_style("Sheet1", "A1", "A1", bold).unwrap();
//!
//! let bytes = book.write_to(Vec::new()).unwrap();
//! let reopened = Spreadsheet::from_bytes(bytes, Options::default()).unwrap();
//! assert_eq!(reopened.cell_value("Sheet1", "B1").unwrap(), CellValue::Number(42.0));
//! // book.save_as("output.xlsx").unwrap();
//! ```

pub mod error;
pub mod prelude;
mod spreadsheet;
mod stream;

pub use error::{Error, ErrorKind, Result};
pub use spreadsheet::Spreadsheet;
pub use stream::StreamWriter;

// Re-export core types
pub use cellar_core::{
    Alignment, BorderEdge, BorderLineStyle, BorderStyle, CalendarDateTime, CellAddress,
    CellError, CellRange, CellValue, Color, DateSystem, DefinedName, DocProperties, FillStyle,
    FontStyle, HorizontalAlignment, NameScope, NumberFormat, PatternType, Protection,
    SheetVisibility, StringMode, Style, Underline, VerticalAlignment, MAX_CELL_TEXT_LEN, MAX_COLS, MAX_ROWS,
    MAX_SHEET_NAME_LEN,
};
pub use cellar_core::date;

// Re-export package types
pub use cellar_xlsx::{
    CancellationToken, Chart, ChartKind, ChartSeries, Flavor, LegendPosition, Options, Row, RowCell, RowOptions, RowStream, StreamCell,
    XlsxError,
};

/// Convert 1-based column and row numbers to a cell name such as `"B3"`
///
/// ```
/// assert_eq!(cellar::coordinates_to_cell_name(2, 3, false).unwrap(), "B3");
/// assert_eq!(cellar::coordinates_to_cell_name(2, 3, true).unwrap(), "$B$3");
/// ```
pub fn coordinates_to_cell_name(col: u32, row: u32, absolute: bool) -> Result<String> {
    Ok(cellar_core::coordinates_to_cell_name(col, row, absolute)?)
}

/// Convert a cell name to 1-based `(column, row)` numbers
///
/// ```
/// assert_eq!(cellar::cell_name_to_coordinates("AB12").unwrap(), (28, 12));
/// ```
pub fn cell_name_to_coordinates(name: &str) -> Result<(u32, u32)> {
    cellar_core::cell_name_to_coordinates(name)
        .map_err(|e| Error::invalid(format!("cell '{}': {}", name, e)))
}
