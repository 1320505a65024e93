//! Worksheet type

use crate::cell::{CellAddress, CellData, CellRange, CellStorage};
use crate::error::{Error, Result};
use crate::row::RowMeta;
use crate::{MAX_COLS, MAX_ROWS};

/// How a sheet's content is being accessed in this session
///
/// Buffered edits go through the in-memory model; streamed writes go
/// through a stream writer straight to a temporary part. A sheet is
/// accessed one way or the other, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Not modified yet
    #[default]
    Untouched,
    /// Modified through the in-memory model
    Buffered,
    /// A stream writer holds the sheet
    Streaming,
    /// A stream writer finished; readable, not writable
    Streamed,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Untouched => "untouched",
            AccessMode::Buffered => "buffered",
            AccessMode::Streaming => "streaming",
            AccessMode::Streamed => "streamed",
        }
    }
}

/// Sheet tab visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SheetVisibility {
    #[default]
    Visible,
    /// Hidden, can be unhidden from the application
    Hidden,
    /// Hidden, can only be unhidden programmatically
    VeryHidden,
}

impl SheetVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            SheetVisibility::Visible => "visible",
            SheetVisibility::Hidden => "hidden",
            SheetVisibility::VeryHidden => "veryHidden",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "visible" => SheetVisibility::Visible,
            "hidden" => SheetVisibility::Hidden,
            "veryHidden" => SheetVisibility::VeryHidden,
            _ => return None,
        })
    }
}

/// A worksheet (single sheet in a workbook)
#[derive(Debug, Clone)]
pub struct Worksheet {
    /// Stable id (the `sheetId` attribute); never reused within a workbook
    id: u32,
    name: String,
    cells: CellStorage,
    visibility: SheetVisibility,
    access: AccessMode,
}

impl Worksheet {
    /// Create a new worksheet with the given id and name
    pub fn new<S: Into<String>>(id: u32, name: S) -> Self {
        Self {
            id,
            name: name.into(),
            cells: CellStorage::new(),
            visibility: SheetVisibility::Visible,
            access: AccessMode::Untouched,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name<S: Into<String>>(&mut self, name: S) {
        self.name = name.into();
    }

    pub fn visibility(&self) -> SheetVisibility {
        self.visibility
    }

    pub fn is_visible(&self) -> bool {
        self.visibility == SheetVisibility::Visible
    }

    pub fn set_visibility(&mut self, visibility: SheetVisibility) {
        self.visibility = visibility;
    }

    pub fn access_mode(&self) -> AccessMode {
        self.access
    }

    /// Cell storage
    pub fn cells(&self) -> &CellStorage {
        &self.cells
    }

    /// Mutable cell storage, bypassing access-mode checks
    pub fn cells_mut(&mut self) -> &mut CellStorage {
        &mut self.cells
    }

    /// Get a cell by address
    pub fn cell(&self, addr: CellAddress) -> Option<&CellData> {
        self.cells.get(addr.row, addr.col)
    }

    /// Style index of a cell; 0 if the cell is not stored
    pub fn cell_style_index(&self, addr: CellAddress) -> u32 {
        self.cells
            .get(addr.row, addr.col)
            .map(|c| c.style_index)
            .unwrap_or(0)
    }

    /// Bounds of all stored cells
    pub fn used_range(&self) -> Option<CellRange> {
        self.cells
            .used_bounds()
            .map(|(min_row, min_col, max_row, max_col)| {
                CellRange::from_indices(min_row, min_col, max_row, max_col)
            })
    }

    pub fn row_meta(&self, row: u32) -> RowMeta {
        self.cells.row_meta(row).cloned().unwrap_or_default()
    }

    // === Access mode ===

    fn conflict(&self, operation: &'static str) -> Error {
        Error::ConflictingAccessMode {
            sheet: self.name.clone(),
            mode: self.access.as_str(),
            operation,
        }
    }

    /// Check that the in-memory model may be read
    pub fn check_read(&self, operation: &'static str) -> Result<()> {
        match self.access {
            AccessMode::Streaming => Err(self.conflict(operation)),
            _ => Ok(()),
        }
    }

    /// Check that the in-memory model may be changed
    pub fn check_write(&self, operation: &'static str) -> Result<()> {
        match self.access {
            AccessMode::Streaming | AccessMode::Streamed => Err(self.conflict(operation)),
            _ => Ok(()),
        }
    }

    /// Check that the in-memory model may be changed and mark the sheet buffered
    pub fn begin_buffered_write(&mut self, operation: &'static str) -> Result<()> {
        self.check_write(operation)?;
        self.access = AccessMode::Buffered;
        Ok(())
    }

    /// Hand the sheet to a stream writer
    pub fn begin_stream(&mut self) -> Result<()> {
        match self.access {
            AccessMode::Untouched => {
                self.access = AccessMode::Streaming;
                Ok(())
            }
            _ => Err(self.conflict("stream_writer")),
        }
    }

    /// Mark a stream writer as flushed; the streamed content replaces the cells
    pub fn finish_stream(&mut self) -> Result<()> {
        match self.access {
            AccessMode::Streaming => {
                self.access = AccessMode::Streamed;
                self.cells.clear();
                Ok(())
            }
            _ => Err(self.conflict("flush")),
        }
    }

    /// Release a stream writer that was dropped without flushing
    pub fn abort_stream(&mut self) {
        if self.access == AccessMode::Streaming {
            self.access = AccessMode::Untouched;
        }
    }
}

/// Check that a 0-based row index is inside the sheet
pub(crate) fn check_row(row: u32) -> Result<()> {
    if row >= MAX_ROWS {
        return Err(Error::RowOutOfBounds(row.saturating_add(1), MAX_ROWS));
    }
    Ok(())
}

/// Check that a 0-based column index is inside the sheet
pub(crate) fn check_col(col: u32) -> Result<()> {
    if col >= MAX_COLS as u32 {
        return Err(Error::ColumnOutOfBounds(col.saturating_add(1), MAX_COLS as u32));
    }
    Ok(())
}

pub(crate) fn check_address(addr: CellAddress) -> Result<()> {
    check_row(addr.row)?;
    check_col(addr.col as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_mode_transitions() {
        let mut ws = Worksheet::new(1, "Data");
        ws.begin_buffered_write("set_cell_value").unwrap();
        assert_eq!(ws.access_mode(), AccessMode::Buffered);
        assert!(matches!(
            ws.begin_stream(),
            Err(Error::ConflictingAccessMode { .. })
        ));

        let mut ws = Worksheet::new(2, "Stream");
        ws.begin_stream().unwrap();
        assert!(ws.check_read("cell_value").is_err());
        assert!(ws.begin_buffered_write("set_cell_value").is_err());
        ws.finish_stream().unwrap();
        assert_eq!(ws.access_mode(), AccessMode::Streamed);
        assert!(ws.check_read("cell_value").is_ok());
        assert!(ws.begin_buffered_write("set_cell_value").is_err());
        assert!(ws.begin_stream().is_err());
    }

    #[test]
    fn test_abort_stream_releases_sheet() {
        let mut ws = Worksheet::new(1, "Data");
        ws.begin_stream().unwrap();
        ws.abort_stream();
        assert_eq!(ws.access_mode(), AccessMode::Untouched);
        ws.begin_buffered_write("set_cell_value").unwrap();
    }

    #[test]
    fn test_bounds_helpers() {
        assert!(check_row(MAX_ROWS - 1).is_ok());
        assert!(matches!(
            check_row(MAX_ROWS),
            Err(Error::RowOutOfBounds(1_048_577, MAX_ROWS))
        ));
        assert!(check_col(16_383).is_ok());
        assert!(matches!(
            check_col(16_384),
            Err(Error::ColumnOutOfBounds(16_385, 16_384))
        ));
    }

    #[test]
    fn test_visibility_tokens() {
        for v in [
            SheetVisibility::Visible,
            SheetVisibility::Hidden,
            SheetVisibility::VeryHidden,
        ] {
            assert_eq!(SheetVisibility::parse(v.as_str()), Some(v));
        }
    }
}
