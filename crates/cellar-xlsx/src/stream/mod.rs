//! Row-at-a-time access to one worksheet
//!
//! [`RowStream`] reads a sheet's serialized form without building the cell
//! model, holding one row in memory at a time. [`StreamWriter`] writes rows
//! in ascending order to a temporary file; once flushed through the package
//! its output replaces the sheet's part.

mod reader;
mod writer;

pub use reader::{Row, RowCell, RowStream};
pub use writer::{RowOptions, StreamCell, StreamWriter, StreamedSheet};
