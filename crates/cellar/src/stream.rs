//! Streaming writes through a [`Spreadsheet`](crate::Spreadsheet)

use std::sync::{Arc, RwLock};

use cellar_core::CellAddress;
use cellar_xlsx::{Package, RowOptions, StreamCell};

use crate::error::{Error, Result};

/// Row-at-a-time writer for one sheet
///
/// Rows go to a temporary file in strictly increasing order. [`flush`]
/// installs them as the sheet's content; dropping the writer instead
/// discards them and hands the sheet back unchanged.
///
/// [`flush`]: StreamWriter::flush
pub struct StreamWriter {
    package: Arc<RwLock<Package>>,
    writer: Option<cellar_xlsx::StreamWriter>,
    sheet_id: u32,
}

impl std::fmt::Debug for StreamWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamWriter")
            .field("sheet_id", &self.sheet_id)
            .field("writer", &self.writer)
            .finish()
    }
}

impl StreamWriter {
    pub(crate) fn new(package: Arc<RwLock<Package>>, writer: cellar_xlsx::StreamWriter) -> Self {
        Self {
            package,
            sheet_id: writer.sheet_id(),
            writer: Some(writer),
        }
    }

    fn inner(&mut self) -> Result<&mut cellar_xlsx::StreamWriter> {
        self.writer
            .as_mut()
            .ok_or_else(|| Error::Internal("stream writer already finished".into()))
    }

    /// 1-based number of the last row written
    pub fn last_row(&self) -> Option<u32> {
        self.writer.as_ref().and_then(|w| w.last_row())
    }

    /// Set the width of columns `first..=last` (letters); only before the first row
    pub fn set_col_width(&mut self, first: &str, last: &str, width: f64) -> Result<()> {
        let min = column(first)?;
        let max = column(last)?;
        Ok(self.inner()?.set_col_width(min.min(max), min.max(max), width)?)
    }

    /// Write `cells` rightwards from `cell`
    pub fn write_row<I>(&mut self, cell: &str, cells: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<StreamCell>,
    {
        self.write_row_with(cell, cells, &RowOptions::default())
    }

    /// Write a row with height, visibility, style or outline settings
    pub fn write_row_with<I>(&mut self, cell: &str, cells: I, options: &RowOptions) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<StreamCell>,
    {
        let start = address(cell)?;
        let cells = cells.into_iter().map(Into::into).collect();
        Ok(self.inner()?.write_row(start, cells, options)?)
    }

    pub fn merge_cell(&mut self, first: &str, last: &str) -> Result<()> {
        let range = address(first)?.to(address(last)?);
        Ok(self.inner()?.merge_cell(range)?)
    }

    /// Install the written rows as the sheet's content
    pub fn flush(mut self) -> Result<()> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| Error::Internal("stream writer already finished".into()))?;
        let rows = writer.last_row();
        let mut package = self
            .package
            .write()
            .map_err(|_| Error::Internal("spreadsheet lock poisoned".into()))?;
        package.flush_stream(writer)?;
        tracing::info!(sheet_id = self.sheet_id, last_row = ?rows, "stream writer flushed");
        Ok(())
    }
}

impl Drop for StreamWriter {
    fn drop(&mut self) {
        if self.writer.take().is_none() {
            return;
        }
        tracing::debug!(sheet_id = self.sheet_id, "stream writer dropped without flush");
        match self.package.write() {
            Ok(mut package) => package.abort_stream(self.sheet_id),
            Err(poisoned) => poisoned.into_inner().abort_stream(self.sheet_id),
        }
    }
}

fn address(cell: &str) -> Result<CellAddress> {
    CellAddress::parse(cell)
        .map(|addr| addr.relative())
        .map_err(|e| Error::invalid(format!("cell '{}': {}", cell, e)))
}

fn column(letters: &str) -> Result<u16> {
    CellAddress::letters_to_column(letters.trim())
        .map_err(|e| Error::invalid(format!("column '{}': {}", letters, e)))
}
