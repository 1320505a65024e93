//! Streaming row reader

use std::fmt;
use std::io::BufRead;
use std::sync::Arc;

use cellar_core::{CellContent, CellValue, DateSystem};
use quick_xml::Reader;

use crate::cancel::{self, CancellationToken};
use crate::codec::{seek_sheet_data, ParsedRow, RowParser, SheetContext};
use crate::error::{XlsxError, XlsxResult};
use crate::xml;

/// One cell of a streamed row
#[derive(Debug, Clone, PartialEq)]
pub struct RowCell {
    /// 1-based column number
    pub column: u32,
    /// The cell's value; formula cells give their cached result
    pub value: CellValue,
    /// Formula text without the leading `=`
    pub formula: Option<String>,
    pub style: u32,
}

/// One row of a streamed sheet
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    /// 1-based row number
    pub number: u32,
    pub height: Option<f64>,
    pub hidden: bool,
    pub outline_level: u8,
    pub style: Option<u32>,
    /// Stored cells in ascending column order
    pub cells: Vec<RowCell>,
}

impl Row {
    /// Values laid out from column A, with `Empty` in the gaps
    pub fn values(&self) -> Vec<CellValue> {
        let width = self.cells.last().map_or(0, |c| c.column as usize);
        let mut values = vec![CellValue::Empty; width];
        for cell in &self.cells {
            values[cell.column as usize - 1] = cell.value.clone();
        }
        values
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Start,
    Rows,
    Done,
}

/// Lazy iterator over the rows of one sheet
///
/// The stream is single-pass. Rows without an `r` attribute are numbered
/// after the previous row.
pub struct RowStream {
    part: String,
    reader: Reader<Box<dyn BufRead + Send>>,
    buf: Vec<u8>,
    rows: RowParser,
    shared_strings: Arc<[Arc<str>]>,
    date_system: DateSystem,
    cancel: Option<CancellationToken>,
    position: Position,
}

impl fmt::Debug for RowStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowStream")
            .field("part", &self.part)
            .field("position", &self.position)
            .finish()
    }
}

impl RowStream {
    pub(crate) fn new(
        part: impl Into<String>,
        input: Box<dyn BufRead + Send>,
        shared_strings: Arc<[Arc<str>]>,
        date_system: DateSystem,
        cancel: Option<CancellationToken>,
    ) -> Self {
        Self {
            part: part.into(),
            reader: xml::reader(input),
            buf: Vec::with_capacity(4096),
            rows: RowParser::default(),
            shared_strings,
            date_system,
            cancel,
            position: Position::Start,
        }
    }

    /// Part the rows are read from
    pub fn part(&self) -> &str {
        &self.part
    }

    fn read_row(&mut self) -> XlsxResult<Option<Row>> {
        if self.position == Position::Done {
            return Ok(None);
        }
        cancel::check(self.cancel.as_ref())?;
        if self.position == Position::Start {
            if !seek_sheet_data(&mut self.reader, &mut self.buf, &self.part)? {
                self.position = Position::Done;
                return Ok(None);
            }
            self.position = Position::Rows;
        }

        let ctx = SheetContext {
            date_system: self.date_system,
            shared_strings: Some(&self.shared_strings[..]),
            load_cells: true,
        };
        match self
            .rows
            .next_row(&mut self.reader, &mut self.buf, &self.part, &ctx)?
        {
            Some(parsed) => self.convert(parsed).map(Some),
            None => {
                self.position = Position::Done;
                Ok(None)
            }
        }
    }

    fn resolve(&self, content: CellContent) -> XlsxResult<(CellValue, Option<String>)> {
        Ok(match content {
            CellContent::Empty => (CellValue::Empty, None),
            CellContent::Boolean(b) => (CellValue::Boolean(b), None),
            CellContent::Number(n) => (CellValue::Number(n), None),
            CellContent::Error(e) => (CellValue::Error(e), None),
            CellContent::InlineString(s) => (CellValue::String(s), None),
            CellContent::SharedString(idx) => {
                let text = self.shared_strings.get(idx as usize).ok_or_else(|| {
                    XlsxError::invalid_part(
                        self.part.as_str(),
                        "v",
                        format!("shared string index {} out of range", idx),
                    )
                })?;
                (CellValue::String(text.to_string()), None)
            }
            CellContent::Formula { text, cached, .. } => {
                (cached.map(|v| *v).unwrap_or_default(), Some(text))
            }
        })
    }

    fn convert(&self, parsed: ParsedRow) -> XlsxResult<Row> {
        let mut cells = Vec::with_capacity(parsed.cells.len());
        for (col, data) in parsed.cells {
            let (value, formula) = self.resolve(data.content)?;
            cells.push(RowCell {
                column: col as u32 + 1,
                value,
                formula,
                style: data.style_index,
            });
        }
        Ok(Row {
            number: parsed.index + 1,
            height: parsed.meta.height,
            hidden: parsed.meta.hidden,
            outline_level: parsed.meta.outline_level,
            style: parsed.meta.style_index,
            cells,
        })
    }
}

impl Iterator for RowStream {
    type Item = XlsxResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_row() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => None,
            Err(e) => {
                self.position = Position::Done;
                Some(Err(e))
            }
        }
    }
}
