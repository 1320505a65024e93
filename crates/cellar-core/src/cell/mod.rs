//! Cell-related types and utilities
//!
//! This module contains:
//! - [`CellValue`] - The resolved value of a cell as callers see it
//! - [`CellContent`] - What a cell stores (shared-string indices, inline text, formulas)
//! - [`CellAddress`] - A cell's location (e.g., "A1")
//! - [`CellRange`] - A range of cells (e.g., "A1:B10")
//! - [`CellStorage`] - Sparse per-sheet storage of cells, rows, columns and merges

mod address;
mod storage;
mod value;

pub use address::{
    cell_name_to_coordinates, coordinates_to_cell_name, CellAddress, CellRange, CellRangeIterator,
};
pub use storage::{CellData, CellStorage};
pub use value::{CellContent, CellError, CellValue, FormulaKind};
