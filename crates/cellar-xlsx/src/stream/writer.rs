//! Streaming row writer

use std::collections::BTreeMap;
use std::io::{self, BufRead, BufReader, BufWriter, Cursor, Read, Write};
use std::sync::Arc;

use cellar_core::workbook::validate_value;
use cellar_core::{CellAddress, CellData, CellRange, CellValue, ColumnMeta, ColumnSpan, RowMeta};
use cellar_core::{MAX_COLS, MAX_ROWS};
use tempfile::NamedTempFile;

use crate::cancel::{self, CancellationToken};
use crate::codec::{
    cell_content, dimension_ref, encode_head, encode_tail, write_cell, write_row_end,
    write_row_start, SheetLayout,
};
use crate::error::{XlsxError, XlsxResult};
use crate::options::Options;

const MAX_ROW_HEIGHT: f64 = 409.0;
const MAX_COL_WIDTH: f64 = 255.0;
const MAX_OUTLINE_LEVEL: u8 = 7;

/// A cell handed to [`StreamWriter::write_row`]
///
/// ```
/// use cellar_xlsx::StreamCell;
///
/// let total = StreamCell::formula("SUM(A1:A9)", 45.0.into()).with_style(2);
/// assert_eq!(total.style, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamCell {
    /// Value, or the cached result when `formula` is set
    pub value: CellValue,
    pub style: u32,
    /// Formula text, with or without a leading `=`
    pub formula: Option<String>,
}

impl StreamCell {
    pub fn new(value: impl Into<CellValue>) -> Self {
        Self {
            value: value.into(),
            ..Default::default()
        }
    }

    /// A formula with a cached result (`CellValue::Empty` for none)
    pub fn formula(text: impl Into<String>, cached: CellValue) -> Self {
        Self {
            value: cached,
            style: 0,
            formula: Some(text.into()),
        }
    }

    pub fn with_style(mut self, style: u32) -> Self {
        self.style = style;
        self
    }

    fn is_blank(&self) -> bool {
        self.value.is_empty() && self.formula.is_none() && self.style == 0
    }

    fn into_value(self) -> CellValue {
        match self.formula {
            Some(text) => match self.value {
                CellValue::Empty => CellValue::formula(text),
                cached => CellValue::formula_with_result(text, cached),
            },
            None => self.value,
        }
    }
}

macro_rules! stream_cell_from {
    ($($t:ty),*) => {
        $(impl From<$t> for StreamCell {
            fn from(value: $t) -> Self {
                StreamCell::new(value)
            }
        })*
    };
}

stream_cell_from!(CellValue, f64, i64, bool, &str, String);

/// Row settings for [`StreamWriter::write_row`]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowOptions {
    /// Height in points
    pub height: Option<f64>,
    pub hidden: bool,
    pub style: Option<u32>,
    pub outline_level: u8,
}

impl RowOptions {
    fn validate(&self) -> XlsxResult<()> {
        if let Some(h) = self.height {
            if !h.is_finite() || !(0.0..=MAX_ROW_HEIGHT).contains(&h) {
                return Err(XlsxError::InvalidArgument(format!(
                    "row height {} outside 0..={}",
                    h, MAX_ROW_HEIGHT
                )));
            }
        }
        if self.outline_level > MAX_OUTLINE_LEVEL {
            return Err(XlsxError::InvalidArgument(format!(
                "outline level {} above {}",
                self.outline_level, MAX_OUTLINE_LEVEL
            )));
        }
        Ok(())
    }

    fn meta(&self) -> RowMeta {
        RowMeta {
            height: self.height,
            hidden: self.hidden,
            outline_level: self.outline_level,
            style_index: self.style,
            collapsed: false,
            extra_attrs: Vec::new(),
        }
    }
}

/// The finished output of a stream writer
///
/// The rows stay in their temporary file; the head and tail of the part are
/// kept in memory and stitched around them when the part is read.
#[derive(Debug, Clone)]
pub struct StreamedSheet {
    head: String,
    body: Arc<NamedTempFile>,
    tail: String,
}

impl StreamedSheet {
    /// Open a reader over the complete part
    pub fn open(&self) -> io::Result<Box<dyn BufRead + Send>> {
        let body = self.body.reopen()?;
        let part = Cursor::new(self.head.clone().into_bytes())
            .chain(body)
            .chain(Cursor::new(self.tail.clone().into_bytes()));
        Ok(Box::new(BufReader::new(part)))
    }

    /// Size of the complete part in bytes
    pub fn len(&self) -> io::Result<u64> {
        let body = self.body.as_file().metadata()?.len();
        Ok(self.head.len() as u64 + body + self.tail.len() as u64)
    }
}

/// Writes the rows of one sheet to a temporary file
///
/// Obtained from [`Package::stream_writer`](crate::Package::stream_writer),
/// which holds the sheet in streaming mode until the writer is passed to
/// [`Package::flush_stream`](crate::Package::flush_stream) or released with
/// [`Package::abort_stream`](crate::Package::abort_stream).
pub struct StreamWriter {
    sheet_id: u32,
    part: String,
    layout: SheetLayout,
    columns: BTreeMap<u16, ColumnMeta>,
    merges: Vec<CellRange>,
    body: BufWriter<NamedTempFile>,
    scratch: String,
    last_row: Option<u32>,
    bounds: Option<(u32, u16, u32, u16)>,
    max_style: Option<u32>,
    cancel: Option<CancellationToken>,
}

impl std::fmt::Debug for StreamWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamWriter")
            .field("sheet_id", &self.sheet_id)
            .field("part", &self.part)
            .field("last_row", &self.last_row)
            .finish()
    }
}

impl StreamWriter {
    pub(crate) fn new(
        sheet_id: u32,
        part: String,
        layout: SheetLayout,
        options: &Options,
        cancel: Option<CancellationToken>,
    ) -> XlsxResult<Self> {
        let file = options.tempfile()?;
        log::debug!("streaming {} to {}", part, file.path().display());
        Ok(Self {
            sheet_id,
            part,
            layout,
            columns: BTreeMap::new(),
            merges: Vec::new(),
            body: BufWriter::new(file),
            scratch: String::with_capacity(1024),
            last_row: None,
            bounds: None,
            max_style: None,
            cancel,
        })
    }

    /// Stable id of the sheet being written
    pub fn sheet_id(&self) -> u32 {
        self.sheet_id
    }

    pub fn part(&self) -> &str {
        &self.part
    }

    /// 1-based number of the last row written
    pub fn last_row(&self) -> Option<u32> {
        self.last_row.map(|r| r + 1)
    }

    /// Highest style index used by a cell or row so far
    pub fn max_style(&self) -> Option<u32> {
        self.max_style
    }

    fn note_style(&mut self, style: u32) {
        self.max_style = Some(self.max_style.map_or(style, |m| m.max(style)));
    }

    /// Set the width of columns `min..=max` (0-based); only before the first row
    pub fn set_col_width(&mut self, min: u16, max: u16, width: f64) -> XlsxResult<()> {
        if self.last_row.is_some() {
            return Err(XlsxError::InvalidArgument(
                "column widths must be set before the first row".into(),
            ));
        }
        if min > max || max >= MAX_COLS {
            return Err(XlsxError::InvalidArgument(format!(
                "bad column span {}..={}",
                min as u32 + 1,
                max as u32 + 1
            )));
        }
        if !width.is_finite() || !(0.0..=MAX_COL_WIDTH).contains(&width) {
            return Err(XlsxError::InvalidArgument(format!(
                "column width {} outside 0..={}",
                width, MAX_COL_WIDTH
            )));
        }
        for col in min..=max {
            self.columns.entry(col).or_default().width = Some(width);
        }
        Ok(())
    }

    /// Write one row, with `cells` placed from `start` to the right
    ///
    /// Rows must be written in strictly increasing order. Blank cells
    /// (no value, formula or style) are skipped.
    pub fn write_row(
        &mut self,
        start: CellAddress,
        cells: Vec<StreamCell>,
        options: &RowOptions,
    ) -> XlsxResult<()> {
        cancel::check(self.cancel.as_ref())?;
        let row = start.row;
        if row >= MAX_ROWS {
            return Err(cellar_core::Error::RowOutOfBounds(row.saturating_add(1), MAX_ROWS).into());
        }
        if let Some(last) = self.last_row {
            if row <= last {
                return Err(XlsxError::OutOfOrderRow {
                    row: row + 1,
                    last: last + 1,
                });
            }
        }
        let end = start.col as usize + cells.len();
        if end > MAX_COLS as usize {
            return Err(cellar_core::Error::ColumnOutOfBounds(end as u32, MAX_COLS as u32).into());
        }
        options.validate()?;

        let mut row_cells = Vec::with_capacity(cells.len());
        for (offset, cell) in cells.into_iter().enumerate() {
            if cell.is_blank() {
                continue;
            }
            let style = cell.style;
            let value = cell.into_value();
            validate_value(&value)?;
            let col = start.col + offset as u16;
            row_cells.push((col, CellData::with_style(cell_content(value), style)));
        }

        let meta = options.meta();
        self.scratch.clear();
        if row_cells.is_empty() {
            if meta.has_custom_settings() {
                write_row_start(&mut self.scratch, row, &meta, true);
            }
        } else {
            write_row_start(&mut self.scratch, row, &meta, false);
            for (col, data) in &row_cells {
                write_cell(&mut self.scratch, row, *col, data);
            }
            write_row_end(&mut self.scratch);
        }
        self.body.write_all(self.scratch.as_bytes())?;

        self.last_row = Some(row);
        if let Some(style) = meta.style_index {
            self.note_style(style);
        }
        for (col, data) in &row_cells {
            self.note_style(data.style_index);
            let col = *col;
            self.bounds = Some(match self.bounds {
                None => (row, col, row, col),
                Some((r1, c1, _, c2)) => (r1, c1.min(col), row, c2.max(col)),
            });
        }
        Ok(())
    }

    /// Merge a range of cells
    pub fn merge_cell(&mut self, range: CellRange) -> XlsxResult<()> {
        if range.end.row >= MAX_ROWS || range.end.col >= MAX_COLS {
            return Err(XlsxError::InvalidArgument(format!("{} is outside the sheet", range)));
        }
        if range.cell_count() < 2 {
            return Err(XlsxError::InvalidArgument(format!("{} is a single cell", range)));
        }
        if let Some(other) = self.merges.iter().find(|m| m.overlaps(&range)) {
            return Err(XlsxError::InvalidArgument(format!(
                "{} overlaps merged range {}",
                range, other
            )));
        }
        self.merges.push(range);
        Ok(())
    }

    /// Finish the part; the package installs the result
    pub(crate) fn finish(self) -> XlsxResult<StreamedSheet> {
        let Self {
            part,
            layout,
            columns,
            merges,
            body,
            bounds,
            ..
        } = self;
        let file = body.into_inner().map_err(|e| XlsxError::Io(e.into_error()))?;
        file.as_file().sync_data()?;
        let head = encode_head(&layout, &dimension_ref(bounds), &ColumnSpan::collapse(&columns));
        let tail = encode_tail(&layout, &merges);
        log::debug!("finished streamed part {}", part);
        Ok(StreamedSheet {
            head,
            body: Arc::new(file),
            tail,
        })
    }
}
