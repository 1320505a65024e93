//! # cellar-xlsx
//!
//! Office Open XML spreadsheet packages for cellar.
//!
//! This crate owns everything between the bytes of a `.xlsx` file and the
//! [`cellar_core::Workbook`] model:
//! - [`archive`] - zip container access with size limits
//! - [`content_types`] and [`rels`] - the package's part registry and
//!   relationship graph
//! - [`codec`] - structured decode/encode of the typed parts
//! - [`package`] - open, lazy sheet loading, mutation and save
//! - [`stream`] - row-at-a-time reading and writing of one sheet
//!
//! ## Example
//!
//! ```rust
//! use cellar_core::{CellAddress, CellValue};
//! use cellar_xlsx::Package;
//!
//! let mut package = Package::new();
//! package
//!     .edit_sheet(0, |wb| wb.set_cell_value(0, CellAddress::new(0, 0), CellValue::from("Hello")))
//!     .unwrap();
//! let bytes = package.to_bytes(None).unwrap();
//!
//! let mut reopened = cellar_xlsx::Package::from_bytes(bytes, Default::default()).unwrap();
//! reopened.load_sheet(0).unwrap();
//! let value = reopened.workbook().unwrap().cell_value(0, CellAddress::new(0, 0)).unwrap();
//! assert_eq!(value, CellValue::from("Hello"));
//! ```

pub mod archive;
pub mod cancel;
pub mod codec;
pub mod content_types;
pub mod error;
pub mod options;
pub mod package;
pub mod rels;
pub mod stream;

mod dom;
mod xml;

pub use cancel::CancellationToken;
pub use codec::{Chart, ChartKind, ChartSeries, LegendPosition};
pub use content_types::Flavor;
pub use error::{XlsxError, XlsxResult};
pub use options::Options;
pub use package::{Package, PackageState};
pub use xml::{Attrs, RawFragment};
pub use stream::{Row, RowCell, RowOptions, RowStream, StreamCell, StreamWriter, StreamedSheet};
