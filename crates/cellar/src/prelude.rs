//! Common imports
//!
//! ```rust
//! use cellar::prelude::*;
//! ```

pub use crate::{
    CancellationToken, CellValue, Color, Error, ErrorKind, FillStyle, FontStyle,
    HorizontalAlignment, NumberFormat, Options, Result, RowOptions, Spreadsheet, StreamCell,
    StreamWriter, Style,
};
