//! # cellar-core
//!
//! Core workbook model for the cellar spreadsheet engine.
//!
//! This crate holds everything that does not depend on the on-disk package:
//! - [`CellValue`] - Resolved cell values (numbers, strings, booleans, errors, formulas)
//! - [`CellAddress`] and [`CellRange`] - Cell addressing and ranges
//! - [`Style`] and [`StyleTable`] - Cell formatting with structural deduplication
//! - [`SharedStringTable`] - Interned cell text
//! - [`Workbook`], [`Worksheet`] - The document model and its mutation rules
//! - [`date`] - Serial-number date conversion for both date systems
//!
//! ## Example
//!
//! ```rust
//! use cellar_core::{CellAddress, CellValue, Workbook};
//!
//! let mut workbook = Workbook::new();
//! let sheet = workbook.add_sheet("Data").unwrap();
//!
//! workbook
//!     .set_cell_value(sheet, CellAddress::parse("A1").unwrap(), "Hello".into())
//!     .unwrap();
//! workbook
//!     .set_cell_value(sheet, CellAddress::new(0, 1), CellValue::Number(42.0))
//!     .unwrap();
//!
//! assert_eq!(
//!     workbook.cell_value(sheet, CellAddress::new(0, 0)).unwrap(),
//!     CellValue::from("Hello")
//! );
//! ```

pub mod cell;
pub mod column;
pub mod date;
pub mod defined_name;
pub mod doc_props;
pub mod error;
pub mod row;
pub mod shared_strings;
pub mod style;
pub mod workbook;
pub mod worksheet;

// Re-exports for convenience
pub use cell::{
    cell_name_to_coordinates, coordinates_to_cell_name, CellAddress, CellContent, CellData,
    CellError, CellRange, CellStorage, CellValue, FormulaKind,
};
pub use column::{ColumnMeta, ColumnSpan};
pub use date::{CalendarDateTime, DateSystem};
pub use defined_name::{DefinedName, DefinedNames, NameScope};
pub use doc_props::DocProperties;
pub use error::{Error, Result};
pub use row::RowMeta;
pub use shared_strings::SharedStringTable;
pub use workbook::{StringMode, Workbook, WorkbookSettings};
pub use worksheet::{AccessMode, SheetVisibility, Worksheet};

// Re-export all style types for convenience
pub use style::{
    Alignment, BorderEdge, BorderLineStyle, BorderStyle, Color, FillStyle, FontStyle,
    HorizontalAlignment, NumberFormat, NumberFormatTable, PatternType, Protection, Style,
    StyleTable, Underline, VerticalAlignment,
};

/// Maximum number of rows in a worksheet (Excel limit)
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns in a worksheet (Excel limit)
pub const MAX_COLS: u16 = 16_384;

/// Maximum length of a sheet name
pub const MAX_SHEET_NAME_LEN: usize = 31;

/// Maximum number of characters a cell can hold
pub const MAX_CELL_TEXT_LEN: usize = 32_767;
