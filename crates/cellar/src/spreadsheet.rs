//! The `Spreadsheet` handle

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use cellar_core::{
    CellAddress, CellRange, CellValue, DefinedName, DocProperties, FormulaKind, NameScope,
    SheetVisibility, Style, Workbook,
};
use cellar_xlsx::{CancellationToken, Chart, Flavor, Options, Package, RowStream};

use crate::error::{Error, Result};
use crate::stream::StreamWriter;

/// An open xlsx document
///
/// Cheap to clone; clones share the same document. Reads run concurrently,
/// while every mutation holds an exclusive lock for the length of the call.
///
/// Cells are addressed by A1 names (`"B7"`), rows by 1-based numbers and
/// columns by letters, and sheets by name (matched case-insensitively).
#[derive(Clone)]
pub struct Spreadsheet {
    inner: Arc<RwLock<Package>>,
}

impl std::fmt::Debug for Spreadsheet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spreadsheet").finish_non_exhaustive()
    }
}

impl Default for Spreadsheet {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_cell(cell: &str) -> Result<CellAddress> {
    CellAddress::parse(cell)
        .map(|addr| addr.relative())
        .map_err(|e| Error::invalid(format!("cell '{}': {}", cell, e)))
}

fn parse_range(first: &str, last: &str) -> Result<CellRange> {
    Ok(CellRange::new(parse_cell(first)?, parse_cell(last)?))
}

fn parse_column(letters: &str) -> Result<u16> {
    CellAddress::letters_to_column(letters.trim())
        .map_err(|e| Error::invalid(format!("column '{}': {}", letters, e)))
}

fn zero_based_row(row: u32) -> Result<u32> {
    if row == 0 || row > cellar_core::MAX_ROWS {
        return Err(cellar_core::Error::RowOutOfBounds(row, cellar_core::MAX_ROWS).into());
    }
    Ok(row - 1)
}

fn sheet_index(package: &Package, sheet: &str) -> Result<usize> {
    package
        .workbook()?
        .sheet_index(sheet)
        .ok_or_else(|| cellar_core::Error::SheetNotFound(sheet.to_string()).into())
}

fn scope_of(workbook: &Workbook, scope: Option<&str>) -> cellar_core::Result<NameScope> {
    match scope {
        None => Ok(NameScope::Workbook),
        Some(sheet) => {
            let index = workbook
                .sheet_index(sheet)
                .ok_or_else(|| cellar_core::Error::SheetNotFound(sheet.to_string()))?;
            let id = workbook
                .worksheet(index)
                .map(|ws| ws.id())
                .ok_or_else(|| cellar_core::Error::SheetNotFound(sheet.to_string()))?;
            Ok(NameScope::Sheet(id))
        }
    }
}

impl Spreadsheet {
    // ==================== Opening and creating ====================

    /// A new document with one empty sheet named `Sheet1`
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    pub fn with_options(options: Options) -> Self {
        Self::from_package(Package::with_options(options))
    }

    /// Open a file with default options
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, Options::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: Options) -> Result<Self> {
        let path = path.as_ref();
        let span = tracing::info_span!("open", path = %path.display());
        let _enter = span.enter();
        let package = Package::open(path, options)?;
        tracing::info!(
            sheets = package.workbook()?.sheet_count(),
            flavor = ?package.flavor(),
            "opened spreadsheet"
        );
        Ok(Self::from_package(package))
    }

    /// Read a whole package from a reader
    pub fn open_reader<R: Read>(reader: R, options: Options) -> Result<Self> {
        let span = tracing::info_span!("open_reader");
        let _enter = span.enter();
        let package = Package::open_reader(reader, options)?;
        tracing::debug!(sheets = package.workbook()?.sheet_count(), "opened spreadsheet");
        Ok(Self::from_package(package))
    }

    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>, options: Options) -> Result<Self> {
        let package = Package::from_bytes(bytes, options)?;
        tracing::debug!(sheets = package.workbook()?.sheet_count(), "opened spreadsheet from memory");
        Ok(Self::from_package(package))
    }

    fn from_package(package: Package) -> Self {
        Self {
            inner: Arc::new(RwLock::new(package)),
        }
    }

    // ==================== Locking ====================

    fn read(&self) -> Result<RwLockReadGuard<'_, Package>> {
        self.inner
            .read()
            .map_err(|_| Error::Internal("spreadsheet lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Package>> {
        self.inner
            .write()
            .map_err(|_| Error::Internal("spreadsheet lock poisoned".into()))
    }

    /// Run a read against a sheet, loading it under the write lock first if needed
    fn read_sheet<T>(
        &self,
        sheet: &str,
        f: impl FnOnce(&Workbook, usize) -> cellar_core::Result<T>,
    ) -> Result<T> {
        {
            let package = self.read()?;
            let index = sheet_index(&package, sheet)?;
            if package.is_sheet_loaded(index)? {
                return Ok(f(package.workbook()?, index)?);
            }
        }
        let mut package = self.write()?;
        let index = sheet_index(&package, sheet)?;
        package.load_sheet(index)?;
        tracing::debug!(sheet, "loaded sheet on first read");
        Ok(f(package.workbook()?, index)?)
    }

    fn edit_sheet<T>(
        &self,
        sheet: &str,
        f: impl FnOnce(&mut Workbook, usize) -> cellar_core::Result<T>,
    ) -> Result<T> {
        let mut package = self.write()?;
        let index = sheet_index(&package, sheet)?;
        Ok(package.edit_sheet(index, |wb| f(wb, index))?)
    }

    fn edit<T>(&self, f: impl FnOnce(&mut Workbook) -> cellar_core::Result<T>) -> Result<T> {
        Ok(self.write()?.edit(f)?)
    }

    // ==================== Document ====================

    pub fn flavor(&self) -> Result<Flavor> {
        let package = self.read()?;
        package.workbook()?;
        Ok(package.flavor())
    }

    /// File the document was opened from or last saved to
    pub fn path(&self) -> Result<Option<PathBuf>> {
        Ok(self.read()?.path().map(Path::to_path_buf))
    }

    pub fn doc_props(&self) -> Result<DocProperties> {
        Ok(self.read()?.workbook()?.doc_props().clone())
    }

    pub fn set_doc_props(&self, props: DocProperties) -> Result<()> {
        self.edit(|wb| {
            wb.set_doc_props(props);
            Ok(())
        })
    }

    // ==================== Sheets ====================

    /// Sheet names in tab order
    pub fn sheet_list(&self) -> Result<Vec<String>> {
        Ok(self.read()?.workbook()?.sheet_names())
    }

    /// Append a sheet and return its 0-based position
    pub fn add_sheet(&self, name: &str) -> Result<usize> {
        let index = self.write()?.add_sheet(name)?;
        tracing::debug!(name, index, "added sheet");
        Ok(index)
    }

    /// Remove a sheet, the parts only it used, and the names that refer to it
    pub fn remove_sheet(&self, name: &str) -> Result<()> {
        self.write()?.remove_sheet(name)?;
        tracing::debug!(name, "removed sheet");
        Ok(())
    }

    /// Rename a sheet; defined names referring to it follow
    pub fn rename_sheet(&self, old: &str, new: &str) -> Result<()> {
        self.edit(|wb| wb.rename_sheet(old, new))
    }

    /// Replace the content of sheet `to` with a copy of sheet `from`
    pub fn copy_sheet(&self, from: &str, to: &str) -> Result<()> {
        let mut package = self.write()?;
        let from = sheet_index(&package, from)?;
        let to = sheet_index(&package, to)?;
        Ok(package.copy_sheet(from, to)?)
    }

    pub fn active_sheet(&self) -> Result<String> {
        let package = self.read()?;
        let wb = package.workbook()?;
        wb.worksheet(wb.active_sheet())
            .map(|ws| ws.name().to_string())
            .ok_or_else(|| Error::Internal("active sheet index out of range".into()))
    }

    pub fn set_active_sheet(&self, name: &str) -> Result<()> {
        self.edit(|wb| {
            let index = wb
                .sheet_index(name)
                .ok_or_else(|| cellar_core::Error::SheetNotFound(name.to_string()))?;
            wb.set_active_sheet(index)
        })
    }

    /// Show or hide a sheet; the last visible sheet cannot be hidden
    pub fn set_sheet_visible(&self, name: &str, visible: bool) -> Result<()> {
        let visibility = if visible {
            SheetVisibility::Visible
        } else {
            SheetVisibility::Hidden
        };
        self.edit(|wb| {
            let index = wb
                .sheet_index(name)
                .ok_or_else(|| cellar_core::Error::SheetNotFound(name.to_string()))?;
            wb.set_sheet_visibility(index, visibility)
        })
    }

    pub fn sheet_visibility(&self, name: &str) -> Result<SheetVisibility> {
        let package = self.read()?;
        let index = sheet_index(&package, name)?;
        package
            .workbook()?
            .worksheet(index)
            .map(|ws| ws.visibility())
            .ok_or_else(|| cellar_core::Error::SheetNotFound(name.to_string()).into())
    }

    /// Bounding range of the stored cells, or `None` for an empty sheet
    pub fn used_range(&self, sheet: &str) -> Result<Option<CellRange>> {
        self.read_sheet(sheet, |wb, index| {
            wb.worksheet(index)
                .map(|ws| ws.used_range())
                .ok_or(cellar_core::Error::SheetOutOfBounds(index, wb.sheet_count()))
        })
    }

    // ==================== Cells ====================

    /// Value of a cell; formula cells give their cached result
    pub fn cell_value(&self, sheet: &str, cell: &str) -> Result<CellValue> {
        let addr = parse_cell(cell)?;
        self.read_sheet(sheet, |wb, index| wb.cell_value(index, addr))
    }

    /// Stored content of a cell, including the formula wrapper if any
    pub fn cell(&self, sheet: &str, cell: &str) -> Result<CellValue> {
        let addr = parse_cell(cell)?;
        self.read_sheet(sheet, |wb, index| wb.cell(index, addr))
    }

    /// Formula of a cell without the leading `=`
    pub fn cell_formula(&self, sheet: &str, cell: &str) -> Result<Option<String>> {
        let addr = parse_cell(cell)?;
        self.read_sheet(sheet, |wb, index| wb.cell_formula(index, addr))
    }

    /// Set a cell's value; `CellValue::Empty` clears it but keeps its style
    pub fn set_cell_value(&self, sheet: &str, cell: &str, value: impl Into<CellValue>) -> Result<()> {
        let addr = parse_cell(cell)?;
        let value = value.into();
        self.edit_sheet(sheet, |wb, index| wb.set_cell_value(index, addr, value))
    }

    /// Set a cell's formula; the cached result is cleared, never computed
    pub fn set_cell_formula(&self, sheet: &str, cell: &str, formula: &str) -> Result<()> {
        let addr = parse_cell(cell)?;
        self.edit_sheet(sheet, |wb, index| {
            wb.set_cell_formula(index, addr, formula, FormulaKind::Normal)
        })
    }

    /// Set an array formula spilling over `first:last`, anchored at `first`
    pub fn set_cell_array_formula(&self, sheet: &str, first: &str, last: &str, formula: &str) -> Result<()> {
        let range = parse_range(first, last)?;
        self.edit_sheet(sheet, |wb, index| {
            wb.set_cell_formula(index, range.start, formula, FormulaKind::Array { range: range.to_a1_string() })
        })
    }

    /// Apply a style index to every cell of `first:last`
    pub fn set_cell_style(&self, sheet: &str, first: &str, last: &str, style: u32) -> Result<()> {
        let range = parse_range(first, last)?;
        self.edit_sheet(sheet, |wb, index| wb.set_cell_style_index(index, range, style))
    }

    /// Style index of a cell (0 for the default style)
    pub fn cell_style(&self, sheet: &str, cell: &str) -> Result<u32> {
        let addr = parse_cell(cell)?;
        self.read_sheet(sheet, |wb, index| wb.cell_style(index, addr))
    }

    // ==================== Styles ====================

    /// Register a style and return its index; equal styles share one index
    pub fn new_style(&self, style: Style) -> Result<u32> {
        self.edit(|wb| Ok(wb.new_style(style)))
    }

    pub fn style(&self, index: u32) -> Result<Style> {
        self.read()?
            .workbook()?
            .style(index)
            .cloned()
            .ok_or_else(|| cellar_core::Error::InvalidStyleIndex(index).into())
    }

    // ==================== Rows and columns ====================

    /// Dense grid of values from A1 to the last used cell
    pub fn rows(&self, sheet: &str) -> Result<Vec<Vec<CellValue>>> {
        self.read_sheet(sheet, |wb, index| wb.rows(index))
    }

    /// Write consecutive values rightwards from `cell`
    pub fn set_sheet_row<I>(&self, sheet: &str, cell: &str, values: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<CellValue>,
    {
        let start = parse_cell(cell)?;
        let values: Vec<CellValue> = values.into_iter().map(Into::into).collect();
        self.edit_sheet(sheet, |wb, index| wb.set_sheet_row(index, start, values))
    }

    /// Insert a copy of `row` directly below it
    pub fn duplicate_row(&self, sheet: &str, row: u32) -> Result<()> {
        let row = zero_based_row(row)?;
        self.edit_sheet(sheet, |wb, index| wb.duplicate_row(index, row))
    }

    /// Insert a copy of `row` at `dst`, pushing `dst` and later rows down
    pub fn duplicate_row_to(&self, sheet: &str, row: u32, dst: u32) -> Result<()> {
        let row = zero_based_row(row)?;
        let dst = zero_based_row(dst)?;
        self.edit_sheet(sheet, |wb, index| wb.duplicate_row_to(index, row, dst))
    }

    /// Set a row's height in points
    pub fn set_row_height(&self, sheet: &str, row: u32, height: f64) -> Result<()> {
        let row = zero_based_row(row)?;
        self.edit_sheet(sheet, |wb, index| wb.set_row_height(index, row, Some(height)))
    }

    pub fn set_row_visible(&self, sheet: &str, row: u32, visible: bool) -> Result<()> {
        let row = zero_based_row(row)?;
        self.edit_sheet(sheet, |wb, index| wb.set_row_hidden(index, row, !visible))
    }

    /// Set a row's outline level (0 to 7)
    pub fn set_row_outline_level(&self, sheet: &str, row: u32, level: u8) -> Result<()> {
        let row = zero_based_row(row)?;
        self.edit_sheet(sheet, |wb, index| wb.set_row_outline_level(index, row, level))
    }

    /// Set the width of columns `first..=last`, given as letters
    pub fn set_col_width(&self, sheet: &str, first: &str, last: &str, width: f64) -> Result<()> {
        let (min, max) = (parse_column(first)?, parse_column(last)?);
        self.edit_sheet(sheet, |wb, index| {
            wb.set_col_width(index, min.min(max), min.max(max), Some(width))
        })
    }

    /// Merge `first:last`, replacing merges it overlaps
    pub fn merge_cell(&self, sheet: &str, first: &str, last: &str) -> Result<()> {
        let range = parse_range(first, last)?;
        self.edit_sheet(sheet, |wb, index| wb.merge_cells(index, range))
    }

    /// Remove merges overlapping `first:last`; returns how many went
    pub fn unmerge_cell(&self, sheet: &str, first: &str, last: &str) -> Result<usize> {
        let range = parse_range(first, last)?;
        self.edit_sheet(sheet, |wb, index| wb.unmerge_cells(index, range))
    }

    // ==================== Defined names ====================

    /// Define a name, workbook-wide or local to the sheet named by `scope`
    pub fn set_defined_name(&self, name: &str, refers_to: &str, scope: Option<&str>) -> Result<()> {
        self.edit(|wb| {
            let scope = scope_of(wb, scope)?;
            wb.set_defined_name(name, scope, refers_to)
        })
    }

    pub fn defined_names(&self) -> Result<Vec<DefinedName>> {
        Ok(self.read()?.workbook()?.defined_names().iter().cloned().collect())
    }

    pub fn delete_defined_name(&self, name: &str, scope: Option<&str>) -> Result<()> {
        self.edit(|wb| {
            let scope = scope_of(wb, scope)?;
            wb.remove_defined_name(name, scope)?;
            Ok(())
        })
    }

    // ==================== Comments, pictures and charts ====================

    /// Remove the comment on a cell, and the comments part with the last one
    pub fn delete_comment(&self, sheet: &str, cell: &str) -> Result<()> {
        let cell = parse_cell(cell)?;
        let mut package = self.write()?;
        let index = sheet_index(&package, sheet)?;
        package.delete_comment(index, cell)?;
        tracing::debug!(sheet, cell = %cell, "deleted comment");
        Ok(())
    }

    /// Remove the pictures anchored at a cell
    pub fn delete_picture(&self, sheet: &str, cell: &str) -> Result<()> {
        let cell = parse_cell(cell)?;
        let mut package = self.write()?;
        let index = sheet_index(&package, sheet)?;
        Ok(package.delete_picture(index, cell)?)
    }

    /// Add a chart with its top-left corner at a cell
    pub fn add_chart(&self, sheet: &str, cell: &str, chart: &Chart) -> Result<()> {
        let cell = parse_cell(cell)?;
        let mut package = self.write()?;
        let index = sheet_index(&package, sheet)?;
        package.add_chart(index, cell, chart)?;
        tracing::debug!(sheet, cell = %cell, kind = ?chart.kind, "added chart");
        Ok(())
    }

    /// Remove the charts anchored at a cell
    pub fn delete_chart(&self, sheet: &str, cell: &str) -> Result<()> {
        let cell = parse_cell(cell)?;
        let mut package = self.write()?;
        let index = sheet_index(&package, sheet)?;
        Ok(package.delete_chart(index, cell)?)
    }

    /// Remove a slicer by name; slicer names are unique in a workbook
    pub fn delete_slicer(&self, name: &str) -> Result<()> {
        self.write()?.delete_slicer(name)?;
        tracing::debug!(name, "deleted slicer");
        Ok(())
    }

    /// Tile an image behind a sheet's cells
    ///
    /// `extension` names the image format, like `"png"` or `".jpg"`.
    pub fn set_sheet_background_from_bytes(&self, sheet: &str, extension: &str, bytes: &[u8]) -> Result<()> {
        let mut package = self.write()?;
        let index = sheet_index(&package, sheet)?;
        package.set_sheet_background_from_bytes(index, extension, bytes)?;
        tracing::debug!(sheet, extension, size = bytes.len(), "set sheet background");
        Ok(())
    }

    // ==================== Streaming ====================

    /// Iterate over a sheet's rows without loading it into memory
    pub fn stream_rows(&self, sheet: &str) -> Result<RowStream> {
        self.stream_rows_with(sheet, None)
    }

    pub fn stream_rows_with(&self, sheet: &str, cancel: Option<CancellationToken>) -> Result<RowStream> {
        let package = self.read()?;
        let index = sheet_index(&package, sheet)?;
        let rows = package.stream_rows(index, cancel)?;
        tracing::debug!(sheet, part = rows.part(), "streaming rows");
        Ok(rows)
    }

    /// Take a sheet for streaming writes
    ///
    /// The sheet's previous content is replaced when the writer is flushed.
    /// Until then the sheet rejects buffered access; dropping the writer
    /// without flushing releases it unchanged.
    pub fn stream_writer(&self, sheet: &str) -> Result<StreamWriter> {
        self.stream_writer_with(sheet, None)
    }

    pub fn stream_writer_with(&self, sheet: &str, cancel: Option<CancellationToken>) -> Result<StreamWriter> {
        let mut package = self.write()?;
        let index = sheet_index(&package, sheet)?;
        let writer = package.stream_writer(index, cancel)?;
        tracing::info!(sheet, part = writer.part(), "stream writer opened");
        Ok(StreamWriter::new(Arc::clone(&self.inner), writer))
    }

    // ==================== Saving and closing ====================

    /// Save to the file the document came from
    pub fn save(&self) -> Result<()> {
        self.save_with(None)
    }

    pub fn save_with(&self, cancel: Option<&CancellationToken>) -> Result<()> {
        let span = tracing::info_span!("save");
        let _enter = span.enter();
        self.write()?.save(cancel)?;
        tracing::info!("saved spreadsheet");
        Ok(())
    }

    /// Save to `path`; the extension picks the flavor
    pub fn save_as(&self, path: impl AsRef<Path>) -> Result<()> {
        self.save_as_with(path, None)
    }

    pub fn save_as_with(&self, path: impl AsRef<Path>, cancel: Option<&CancellationToken>) -> Result<()> {
        let path = path.as_ref();
        let span = tracing::info_span!("save_as", path = %path.display());
        let _enter = span.enter();
        self.write()?.save_as(path, cancel)?;
        tracing::info!("saved spreadsheet");
        Ok(())
    }

    /// Serialize the package into a writer and hand the writer back
    pub fn write_to<W: Write>(&self, out: W) -> Result<W> {
        self.write_to_with(out, None)
    }

    pub fn write_to_with<W: Write>(&self, out: W, cancel: Option<&CancellationToken>) -> Result<W> {
        let span = tracing::info_span!("write_to");
        let _enter = span.enter();
        Ok(self.write()?.write_to(out, cancel)?)
    }

    /// Release the package; later calls fail with `UseAfterClose`
    pub fn close(&self) -> Result<()> {
        self.write()?.close();
        tracing::debug!("closed spreadsheet");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_spreadsheet_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Spreadsheet>();
    }

    #[test]
    fn test_cells_are_a1_names() {
        let book = Spreadsheet::new();
        book.set_cell_value("Sheet1", "$C$4", 12.5).unwrap();
        assert_eq!(book.cell_value("sheet1", "C4").unwrap(), CellValue::Number(12.5));

        let err = book.set_cell_value("Sheet1", "4C", 1.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let err = book.cell_value("Missing", "A1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SheetNotFound);
    }

    #[test]
    fn test_rows_are_one_based() {
        let book = Spreadsheet::new();
        assert_eq!(book.set_row_height("Sheet1", 0, 20.0).unwrap_err().kind(), ErrorKind::OutOfBounds);
        book.set_row_height("Sheet1", 1, 20.0).unwrap();
    }

    #[test]
    fn test_scoped_names() {
        let book = Spreadsheet::new();
        book.set_defined_name("Rate", "Sheet1!$A$1", Some("Sheet1")).unwrap();
        book.set_defined_name("Rate", "0.2", None).unwrap();
        assert_eq!(book.defined_names().unwrap().len(), 2);

        book.delete_defined_name("Rate", Some("Sheet1")).unwrap();
        let names = book.defined_names().unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(names[0].scope, NameScope::Workbook);
    }

    #[test]
    fn test_closed_spreadsheet_rejects_calls() {
        let book = Spreadsheet::new();
        let other = book.clone();
        book.close().unwrap();
        assert_eq!(other.sheet_list().unwrap_err().kind(), ErrorKind::UseAfterClose);
    }
}
