//! Worksheet part codec (`xl/worksheets/sheetN.xml`)

use std::io::BufRead;
use std::sync::Arc;

use cellar_core::date::{self, DateSystem};
use cellar_core::{
    CellAddress, CellContent, CellData, CellError, CellRange, CellStorage, CellValue, ColumnMeta,
    ColumnSpan, FormulaKind, RowMeta, MAX_COLS, MAX_ROWS,
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use super::{PartCodec, PartKind};
use crate::error::{XlsxError, XlsxResult};
use crate::xml::{self, Attrs, RawFragment};

/// `<row>` attributes the codec reads into `RowMeta` or regenerates
const ROW_ATTRS: [&str; 8] = [
    "r",
    "ht",
    "customHeight",
    "hidden",
    "outlineLevel",
    "s",
    "customFormat",
    "collapsed",
];

/// `<c>` attributes the codec reads into `CellData` or regenerates
const CELL_ATTRS: [&str; 3] = ["r", "s", "t"];

/// Position of one top-level element of a worksheet
#[derive(Debug, Clone, PartialEq)]
pub enum SheetSlot {
    /// Element kept verbatim (`sheetViews`, `hyperlinks`, `drawing`, ...)
    Raw(RawFragment),
    /// `<dimension>`, regenerated from the cells
    Dimension,
    /// `<cols>`, regenerated from column settings
    Cols,
    /// `<sheetData>`
    SheetData,
    /// `<mergeCells>`
    MergeCells,
}

impl SheetSlot {
    fn name(&self) -> &str {
        match self {
            SheetSlot::Raw(raw) => &raw.name,
            SheetSlot::Dimension => "dimension",
            SheetSlot::Cols => "cols",
            SheetSlot::SheetData => "sheetData",
            SheetSlot::MergeCells => "mergeCells",
        }
    }
}

/// Children of `<worksheet>` in schema order
const SCHEMA_ORDER: [&str; 39] = [
    "sheetPr",
    "dimension",
    "sheetViews",
    "sheetFormatPr",
    "cols",
    "sheetData",
    "sheetCalcPr",
    "sheetProtection",
    "protectedRanges",
    "scenarios",
    "autoFilter",
    "sortState",
    "dataConsolidate",
    "customSheetViews",
    "mergeCells",
    "phoneticPr",
    "conditionalFormatting",
    "dataValidations",
    "hyperlinks",
    "printOptions",
    "pageMargins",
    "pageSetup",
    "headerFooter",
    "rowBreaks",
    "colBreaks",
    "customProperties",
    "cellWatches",
    "ignoredErrors",
    "smartTags",
    "drawing",
    "legacyDrawing",
    "legacyDrawingHF",
    "drawingHF",
    "picture",
    "oleObjects",
    "controls",
    "webPublishItems",
    "tableParts",
    "extLst",
];

/// Everything about a worksheet part except its cells
#[derive(Debug, Clone, PartialEq)]
pub struct SheetLayout {
    pub root_attrs: Attrs,
    pub slots: Vec<SheetSlot>,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            root_attrs: vec![
                ("xmlns".to_string(), xml::NS_MAIN.to_string()),
                ("xmlns:r".to_string(), xml::NS_RELATIONSHIPS.to_string()),
            ],
            slots: vec![
                SheetSlot::Dimension,
                SheetSlot::Raw(RawFragment::fixed(
                    "sheetViews",
                    "<sheetViews><sheetView workbookViewId=\"0\"/></sheetViews>",
                )),
                SheetSlot::Raw(RawFragment::fixed(
                    "sheetFormatPr",
                    "<sheetFormatPr defaultRowHeight=\"15\"/>",
                )),
                SheetSlot::Cols,
                SheetSlot::SheetData,
                SheetSlot::MergeCells,
                SheetSlot::Raw(RawFragment::fixed(
                    "pageMargins",
                    "<pageMargins left=\"0.7\" right=\"0.7\" top=\"0.75\" bottom=\"0.75\" header=\"0.3\" footer=\"0.3\"/>",
                )),
            ],
        }
    }
}

impl SheetLayout {
    /// Relationship ids referenced by preserved elements
    pub fn rel_ids(&self) -> impl Iterator<Item = &String> {
        self.slots.iter().flat_map(|slot| match slot {
            SheetSlot::Raw(raw) => raw.rel_ids.iter(),
            _ => [].iter(),
        })
    }

    fn has(&self, name: &str) -> bool {
        self.slots.iter().any(|s| s.name() == name)
    }

    /// A preserved element by local name
    pub fn raw(&self, name: &str) -> Option<&RawFragment> {
        self.slots.iter().find_map(|slot| match slot {
            SheetSlot::Raw(raw) if raw.name == name => Some(raw),
            _ => None,
        })
    }

    /// Take a preserved element out of the layout
    pub fn remove_raw(&mut self, name: &str) -> Option<RawFragment> {
        let pos = self
            .slots
            .iter()
            .position(|slot| matches!(slot, SheetSlot::Raw(raw) if raw.name == name))?;
        match self.slots.remove(pos) {
            SheetSlot::Raw(raw) => Some(raw),
            _ => None,
        }
    }

    /// Put a preserved element at its schema position, replacing one of the same name
    pub fn place(&mut self, fragment: RawFragment) {
        if let Some(slot) = self
            .slots
            .iter_mut()
            .find(|slot| matches!(slot, SheetSlot::Raw(raw) if raw.name == fragment.name))
        {
            *slot = SheetSlot::Raw(fragment);
            return;
        }
        let rank = |name: &str| SCHEMA_ORDER.iter().position(|n| *n == name);
        let Some(own) = rank(&fragment.name) else {
            self.slots.push(SheetSlot::Raw(fragment));
            return;
        };
        let pos = self
            .slots
            .iter()
            .rposition(|slot| rank(slot.name()).is_some_and(|r| r < own))
            .map_or(0, |p| p + 1);
        self.slots.insert(pos, SheetSlot::Raw(fragment));
    }

    fn insert_after_last(&mut self, names: &[&str], slot: SheetSlot) {
        let pos = self
            .slots
            .iter()
            .rposition(|s| names.contains(&s.name()))
            .map(|p| p + 1)
            .unwrap_or(0);
        self.slots.insert(pos, slot);
    }

    /// Add the regenerated slots a loaded part did not have, in schema order
    fn complete(&mut self) {
        if !self.has("dimension") {
            self.insert_after_last(&["sheetPr"], SheetSlot::Dimension);
        }
        if !self.has("sheetData") {
            self.insert_after_last(
                &["sheetPr", "dimension", "sheetViews", "sheetFormatPr", "cols"],
                SheetSlot::SheetData,
            );
        }
        if !self.has("cols") {
            self.insert_after_last(
                &["sheetPr", "dimension", "sheetViews", "sheetFormatPr"],
                SheetSlot::Cols,
            );
        }
        if !self.has("mergeCells") {
            self.insert_after_last(
                &[
                    "sheetData",
                    "sheetCalcPr",
                    "sheetProtection",
                    "protectedRanges",
                    "scenarios",
                    "autoFilter",
                    "sortState",
                    "dataConsolidate",
                    "customSheetViews",
                ],
                SheetSlot::MergeCells,
            );
        }
    }
}

/// What a worksheet decode needs from the rest of the workbook
#[derive(Debug, Clone, Copy)]
pub struct SheetContext<'a> {
    /// Epoch for `t="d"` cells
    pub date_system: DateSystem,
    /// Shared strings to check `t="s"` indices against
    pub shared_strings: Option<&'a [Arc<str>]>,
    /// When false, rows are skipped and only the layout is kept
    pub load_cells: bool,
}

impl Default for SheetContext<'_> {
    fn default() -> Self {
        Self {
            date_system: DateSystem::V1900,
            shared_strings: None,
            load_cells: true,
        }
    }
}

/// A decoded worksheet
#[derive(Debug, Clone, Default)]
pub struct WorksheetPart {
    pub layout: SheetLayout,
    pub cells: CellStorage,
}

impl WorksheetPart {
    /// Decode with workbook context
    pub fn decode_with<R: BufRead>(path: &str, input: R, ctx: &SheetContext<'_>) -> XlsxResult<Self> {
        let mut reader = xml::reader(input);
        let mut buf = Vec::new();
        let (root, root_attrs, empty) = xml::read_root(&mut reader, &mut buf, path)?;
        if root != "worksheet" {
            return Err(XlsxError::invalid_part(path, root, "expected <worksheet>"));
        }
        xml::check_transitional(path, &root_attrs)?;
        let rel_prefixes = xml::relationship_prefixes(&root_attrs);

        let mut layout = SheetLayout {
            root_attrs,
            slots: Vec::new(),
        };
        let mut cells = CellStorage::new();
        if empty {
            layout.complete();
            return Ok(Self { layout, cells });
        }

        loop {
            buf.clear();
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    let e = e.into_owned();
                    match e.local_name().as_ref() {
                        b"dimension" => {
                            xml::skip_element(&mut reader, &mut buf, path, &e)?;
                            layout.slots.push(SheetSlot::Dimension);
                        }
                        b"cols" => {
                            cells.set_column_spans(read_cols(&mut reader, &mut buf, path)?);
                            layout.slots.push(SheetSlot::Cols);
                        }
                        b"sheetData" => {
                            let mut rows = RowParser::default();
                            while let Some(row) = rows.next_row(&mut reader, &mut buf, path, ctx)? {
                                if ctx.load_cells {
                                    install_row(&mut cells, row);
                                }
                            }
                            layout.slots.push(SheetSlot::SheetData);
                        }
                        b"mergeCells" => {
                            for range in read_merges(&mut reader, &mut buf, path)? {
                                cells.add_merged_region(range).map_err(|err| {
                                    XlsxError::invalid_part(path, "mergeCell", err.to_string())
                                })?;
                            }
                            layout.slots.push(SheetSlot::MergeCells);
                        }
                        _ => {
                            let raw =
                                xml::capture(&mut reader, &mut buf, path, &e, false, &rel_prefixes)?;
                            layout.slots.push(SheetSlot::Raw(raw));
                        }
                    }
                }
                Ok(Event::Empty(e)) => {
                    let e = e.into_owned();
                    match e.local_name().as_ref() {
                        b"dimension" => layout.slots.push(SheetSlot::Dimension),
                        b"cols" => layout.slots.push(SheetSlot::Cols),
                        b"sheetData" => layout.slots.push(SheetSlot::SheetData),
                        b"mergeCells" => layout.slots.push(SheetSlot::MergeCells),
                        _ => {
                            let raw =
                                xml::capture(&mut reader, &mut buf, path, &e, true, &rel_prefixes)?;
                            layout.slots.push(SheetSlot::Raw(raw));
                        }
                    }
                }
                Ok(Event::End(_)) | Ok(Event::Eof) => break,
                Err(e) => return Err(XlsxError::xml(path, e)),
                _ => {}
            }
        }

        layout.complete();
        Ok(Self { layout, cells })
    }
}

impl PartCodec for WorksheetPart {
    const KIND: PartKind = PartKind::Worksheet;

    fn decode<R: BufRead>(path: &str, input: R) -> XlsxResult<Self> {
        Self::decode_with(path, input, &SheetContext::default())
    }

    fn encode(&self) -> Vec<u8> {
        encode_worksheet(&self.layout, &self.cells)
    }
}

fn install_row(cells: &mut CellStorage, row: ParsedRow) {
    for (col, data) in row.cells {
        cells.set(row.index, col, data);
    }
    cells.set_row_meta(row.index, row.meta);
}

fn parse_num<T: std::str::FromStr>(value: &str, part: &str, element: &str) -> XlsxResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| XlsxError::invalid_part(part, element, format!("bad number '{}'", value)))
}

fn read_cols<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
    part: &str,
) -> XlsxResult<Vec<ColumnSpan>> {
    let mut spans = Vec::new();
    loop {
        buf.clear();
        match reader.read_event_into(buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"col" => {
                let attrs = xml::attributes(&e, part)?;
                let min: u32 = parse_num(xml::attr(&attrs, "min").unwrap_or("1"), part, "col")?;
                let max: u32 = parse_num(xml::attr(&attrs, "max").unwrap_or("1"), part, "col")?;
                if min == 0 || max < min {
                    return Err(XlsxError::invalid_part(
                        part,
                        "col",
                        format!("bad column span {}..{}", min, max),
                    ));
                }
                let max = max.min(MAX_COLS as u32);
                let mut meta = ColumnMeta::default();
                for (key, value) in &attrs {
                    match key.as_str() {
                        "width" => meta.width = Some(parse_num(value, part, "col")?),
                        "hidden" => meta.hidden = xml::parse_bool(value),
                        "outlineLevel" => meta.outline_level = parse_num(value, part, "col")?,
                        "style" => meta.style_index = Some(parse_num(value, part, "col")?),
                        "collapsed" => meta.collapsed = xml::parse_bool(value),
                        "bestFit" => meta.best_fit = xml::parse_bool(value),
                        _ => {}
                    }
                }
                if min <= max && meta.has_custom_settings() {
                    spans.push(ColumnSpan {
                        min: (min - 1) as u16,
                        max: (max - 1) as u16,
                        meta,
                    });
                }
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"cols" => return Ok(spans),
            Ok(Event::Eof) => return Err(XlsxError::invalid_part(part, "cols", "unexpected end of part")),
            Err(e) => return Err(XlsxError::xml(part, e)),
            _ => {}
        }
    }
}

fn read_merges<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
    part: &str,
) -> XlsxResult<Vec<CellRange>> {
    let mut ranges = Vec::new();
    loop {
        buf.clear();
        match reader.read_event_into(buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"mergeCell" => {
                let attrs = xml::attributes(&e, part)?;
                let Some(reference) = xml::attr(&attrs, "ref") else {
                    continue;
                };
                let range = CellRange::parse(reference)
                    .map_err(|err| XlsxError::invalid_part(part, "mergeCell", err.to_string()))?;
                ranges.push(range);
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"mergeCells" => return Ok(ranges),
            Ok(Event::Eof) => {
                return Err(XlsxError::invalid_part(part, "mergeCells", "unexpected end of part"))
            }
            Err(e) => return Err(XlsxError::xml(part, e)),
            _ => {}
        }
    }
}

/// Move a reader to just inside `<sheetData>`
///
/// Returns false if the sheet has no rows (missing or empty `sheetData`).
pub(crate) fn seek_sheet_data<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
    part: &str,
) -> XlsxResult<bool> {
    let mut depth = 0usize;
    loop {
        buf.clear();
        match reader.read_event_into(buf) {
            Ok(Event::Start(e)) => {
                if depth == 1 && e.local_name().as_ref() == b"sheetData" {
                    return Ok(true);
                }
                depth += 1;
            }
            Ok(Event::Empty(e)) if depth == 1 && e.local_name().as_ref() == b"sheetData" => {
                return Ok(false)
            }
            Ok(Event::End(_)) => depth = depth.saturating_sub(1),
            Ok(Event::Eof) => return Ok(false),
            Err(e) => return Err(XlsxError::xml(part, e)),
            _ => {}
        }
    }
}

/// One `<row>` as read from a part
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParsedRow {
    /// 0-based row index
    pub index: u32,
    pub meta: RowMeta,
    /// Cells by 0-based column, ascending as written
    pub cells: Vec<(u16, CellData)>,
}

/// Reads the rows of a `sheetData` element one at a time
///
/// Rows and cells without an `r` attribute are numbered after their
/// predecessor.
#[derive(Debug, Default)]
pub(crate) struct RowParser {
    last_row: Option<u32>,
    done: bool,
}

impl RowParser {
    /// Next row, or `None` once `</sheetData>` is reached
    pub(crate) fn next_row<R: BufRead>(
        &mut self,
        reader: &mut Reader<R>,
        buf: &mut Vec<u8>,
        part: &str,
        ctx: &SheetContext<'_>,
    ) -> XlsxResult<Option<ParsedRow>> {
        if self.done {
            return Ok(None);
        }
        loop {
            buf.clear();
            match reader.read_event_into(buf) {
                Ok(Event::Start(e)) => {
                    let e = e.into_owned();
                    if e.local_name().as_ref() != b"row" {
                        xml::skip_element(reader, buf, part, &e)?;
                        continue;
                    }
                    let (index, meta) = self.row_head(&e, part)?;
                    let cells = if ctx.load_cells {
                        read_row_cells(reader, buf, part, index, ctx)?
                    } else {
                        xml::skip_element(reader, buf, part, &e)?;
                        Vec::new()
                    };
                    return Ok(Some(ParsedRow { index, meta, cells }));
                }
                Ok(Event::Empty(e)) if e.local_name().as_ref() == b"row" => {
                    let e = e.into_owned();
                    let (index, meta) = self.row_head(&e, part)?;
                    return Ok(Some(ParsedRow {
                        index,
                        meta,
                        cells: Vec::new(),
                    }));
                }
                Ok(Event::End(_)) | Ok(Event::Eof) => {
                    self.done = true;
                    return Ok(None);
                }
                Err(e) => return Err(XlsxError::xml(part, e)),
                _ => {}
            }
        }
    }

    fn row_head(&mut self, e: &BytesStart<'_>, part: &str) -> XlsxResult<(u32, RowMeta)> {
        let attrs = xml::attributes(e, part)?;
        let index = match xml::attr(&attrs, "r") {
            Some(r) => {
                let r: u32 = parse_num(r, part, "row")?;
                if r == 0 || r > MAX_ROWS {
                    return Err(XlsxError::invalid_part(part, "row", format!("row {} out of range", r)));
                }
                r - 1
            }
            None => self.last_row.map_or(0, |last| last + 1),
        };
        self.last_row = Some(index);

        let mut meta = RowMeta::default();
        let custom_height = xml::attr(&attrs, "customHeight").is_some_and(xml::parse_bool);
        let custom_format = xml::attr(&attrs, "customFormat").is_some_and(xml::parse_bool);
        for (key, value) in &attrs {
            match key.as_str() {
                "ht" if custom_height => meta.height = Some(parse_num(value, part, "row")?),
                "hidden" => meta.hidden = xml::parse_bool(value),
                "outlineLevel" => meta.outline_level = parse_num(value, part, "row")?,
                "s" if custom_format => meta.style_index = Some(parse_num(value, part, "row")?),
                "collapsed" => meta.collapsed = xml::parse_bool(value),
                key if !ROW_ATTRS.contains(&key) => {
                    meta.extra_attrs.push((key.to_string(), value.clone()));
                }
                _ => {}
            }
        }
        Ok((index, meta))
    }
}

/// Attributes and children of a `<c>` element
#[derive(Debug, Default)]
struct RawCell {
    cell_type: Option<String>,
    style: u32,
    extra_attrs: Attrs,
    value: Option<String>,
    inline: Option<String>,
    formula: Option<(String, FormulaKind)>,
}

fn read_row_cells<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
    part: &str,
    row: u32,
    ctx: &SheetContext<'_>,
) -> XlsxResult<Vec<(u16, CellData)>> {
    let mut cells = Vec::new();
    let mut next_col: u32 = 0;
    loop {
        buf.clear();
        match reader.read_event_into(buf) {
            Ok(Event::Start(e)) => {
                let e = e.into_owned();
                if e.local_name().as_ref() != b"c" {
                    xml::skip_element(reader, buf, part, &e)?;
                    continue;
                }
                let (col, mut raw) = cell_head(&e, part, row, next_col)?;
                read_cell_children(reader, buf, part, &mut raw)?;
                cells.push((col, finish_cell(raw, part, ctx)?));
                next_col = col as u32 + 1;
            }
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"c" => {
                let e = e.into_owned();
                let (col, raw) = cell_head(&e, part, row, next_col)?;
                cells.push((col, finish_cell(raw, part, ctx)?));
                next_col = col as u32 + 1;
            }
            Ok(Event::End(_)) => return Ok(cells),
            Ok(Event::Eof) => return Err(XlsxError::invalid_part(part, "row", "unexpected end of part")),
            Err(e) => return Err(XlsxError::xml(part, e)),
            _ => {}
        }
    }
}

fn cell_head(e: &BytesStart<'_>, part: &str, row: u32, next_col: u32) -> XlsxResult<(u16, RawCell)> {
    let attrs = xml::attributes(e, part)?;
    let col = match xml::attr(&attrs, "r") {
        Some(r) => {
            let addr = CellAddress::parse(r)
                .map_err(|err| XlsxError::invalid_part(part, "c", err.to_string()))?;
            if addr.row != row {
                return Err(XlsxError::invalid_part(
                    part,
                    "c",
                    format!("cell {} is not in row {}", r, row + 1),
                ));
            }
            addr.col
        }
        None if next_col < MAX_COLS as u32 => next_col as u16,
        None => {
            return Err(XlsxError::invalid_part(part, "c", "too many cells in row"));
        }
    };
    let mut raw = RawCell::default();
    for (key, value) in attrs {
        match key.as_str() {
            "t" => raw.cell_type = Some(value),
            "s" => raw.style = parse_num(&value, part, "c")?,
            key if !CELL_ATTRS.contains(&key) => raw.extra_attrs.push((key.to_string(), value)),
            _ => {}
        }
    }
    Ok((col, raw))
}

fn read_cell_children<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
    part: &str,
    raw: &mut RawCell,
) -> XlsxResult<()> {
    loop {
        buf.clear();
        match reader.read_event_into(buf) {
            Ok(Event::Start(e)) => {
                let e = e.into_owned();
                match e.local_name().as_ref() {
                    b"v" => raw.value = Some(xml::read_text(reader, buf, part, "v")?),
                    b"f" => {
                        let kind = formula_kind(&e, part)?;
                        let text = xml::read_text(reader, buf, part, "f")?;
                        raw.formula = Some((text, kind));
                    }
                    b"is" => raw.inline = Some(read_rich_text(reader, buf, part, "is")?),
                    _ => xml::skip_element(reader, buf, part, &e)?,
                }
            }
            Ok(Event::Empty(e)) => {
                let e = e.into_owned();
                match e.local_name().as_ref() {
                    b"v" => raw.value = Some(String::new()),
                    b"f" => raw.formula = Some((String::new(), formula_kind(&e, part)?)),
                    b"is" => raw.inline = Some(String::new()),
                    _ => {}
                }
            }
            Ok(Event::End(_)) => return Ok(()),
            Ok(Event::Eof) => return Err(XlsxError::invalid_part(part, "c", "unexpected end of part")),
            Err(e) => return Err(XlsxError::xml(part, e)),
            _ => {}
        }
    }
}

fn formula_kind(e: &BytesStart<'_>, part: &str) -> XlsxResult<FormulaKind> {
    let attrs = xml::attributes(e, part)?;
    let range = xml::attr(&attrs, "ref").map(str::to_string);
    Ok(match xml::attr(&attrs, "t") {
        Some("array") => FormulaKind::Array {
            range: range.ok_or_else(|| XlsxError::invalid_part(part, "f", "array formula without ref"))?,
        },
        Some("shared") => FormulaKind::Shared {
            index: parse_num(
                xml::attr(&attrs, "si")
                    .ok_or_else(|| XlsxError::invalid_part(part, "f", "shared formula without si"))?,
                part,
                "f",
            )?,
            range,
        },
        _ => FormulaKind::Normal,
    })
}

/// Plain text of a rich-text container (`<is>` or `<si>`): the `<t>`
/// elements outside phonetic runs, concatenated
pub(crate) fn read_rich_text<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
    part: &str,
    element: &str,
) -> XlsxResult<String> {
    let mut text = String::new();
    let mut depth = 0usize;
    let mut phonetic_depth: Option<usize> = None;
    loop {
        buf.clear();
        match reader.read_event_into(buf) {
            Ok(Event::Start(e)) => {
                let name = e.local_name().as_ref().to_vec();
                drop(e);
                depth += 1;
                match name.as_slice() {
                    b"rPh" => phonetic_depth = phonetic_depth.or(Some(depth)),
                    b"t" if phonetic_depth.is_none() => {
                        let t = xml::read_text(reader, buf, part, "t")?;
                        text.push_str(&xml::decode_excel_escapes(&t));
                        depth -= 1;
                    }
                    _ => {}
                }
            }
            Ok(Event::End(_)) => {
                if depth == 0 {
                    return Ok(text);
                }
                if phonetic_depth == Some(depth) {
                    phonetic_depth = None;
                }
                depth -= 1;
            }
            Ok(Event::Eof) => {
                return Err(XlsxError::invalid_part(part, element, "unexpected end of part"))
            }
            Err(e) => return Err(XlsxError::xml(part, e)),
            _ => {}
        }
    }
}

/// Parse the ISO 8601 value of a `t="d"` cell
pub(crate) fn parse_iso_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim().trim_end_matches('Z');
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M") {
        return Some(dt);
    }
    if let Ok(d) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0);
    }
    let time = NaiveTime::parse_from_str(value, "%H:%M:%S%.f").ok()?;
    NaiveDate::from_ymd_opt(1899, 12, 30).map(|d| d.and_time(time))
}

fn plain_value(raw: &RawCell, part: &str, ctx: &SheetContext<'_>) -> XlsxResult<CellContent> {
    let value = raw.value.as_deref();
    Ok(match raw.cell_type.as_deref() {
        None | Some("n") => match value {
            Some(v) if !v.trim().is_empty() => CellContent::Number(parse_num(v, part, "v")?),
            _ => CellContent::Empty,
        },
        Some("s") => match value {
            Some(v) => {
                let idx: u32 = parse_num(v, part, "v")?;
                if let Some(sst) = ctx.shared_strings {
                    if idx as usize >= sst.len() {
                        return Err(XlsxError::invalid_part(
                            part,
                            "v",
                            format!("shared string index {} out of range ({})", idx, sst.len()),
                        ));
                    }
                }
                CellContent::SharedString(idx)
            }
            None => CellContent::Empty,
        },
        Some("b") => match value.map(str::trim) {
            Some("1") | Some("true") => CellContent::Boolean(true),
            Some("0") | Some("false") => CellContent::Boolean(false),
            Some(other) => {
                return Err(XlsxError::invalid_part(part, "v", format!("bad boolean '{}'", other)))
            }
            None => CellContent::Empty,
        },
        Some("e") => match value {
            Some(v) => CellContent::Error(CellError::parse(v).ok_or_else(|| {
                XlsxError::invalid_part(part, "v", format!("unknown error value '{}'", v))
            })?),
            None => CellContent::Empty,
        },
        Some("str") => match value {
            Some(v) => CellContent::InlineString(xml::decode_excel_escapes(v).into_owned()),
            None => CellContent::Empty,
        },
        Some("inlineStr") => match &raw.inline {
            Some(text) => CellContent::InlineString(text.clone()),
            None => CellContent::Empty,
        },
        Some("d") => match value {
            Some(v) => {
                let dt = parse_iso_datetime(v).ok_or_else(|| {
                    XlsxError::invalid_part(part, "v", format!("bad ISO 8601 date '{}'", v))
                })?;
                CellContent::Number(
                    date::datetime_to_serial(dt, ctx.date_system)
                        .map_err(|err| XlsxError::invalid_part(part, "v", err.to_string()))?,
                )
            }
            None => CellContent::Empty,
        },
        Some(other) => {
            return Err(XlsxError::invalid_part(
                part,
                "c",
                format!("unknown cell type '{}'", other),
            ))
        }
    })
}

/// Turn a cached formula result into a value
fn cached_value(content: CellContent, ctx: &SheetContext<'_>) -> Option<CellValue> {
    Some(match content {
        CellContent::Empty => return None,
        CellContent::Boolean(b) => CellValue::Boolean(b),
        CellContent::Number(n) => CellValue::Number(n),
        CellContent::Error(e) => CellValue::Error(e),
        CellContent::InlineString(s) => CellValue::String(s),
        CellContent::SharedString(idx) => {
            CellValue::String(ctx.shared_strings?.get(idx as usize)?.to_string())
        }
        CellContent::Formula { .. } => return None,
    })
}

fn finish_cell(raw: RawCell, part: &str, ctx: &SheetContext<'_>) -> XlsxResult<CellData> {
    let value = plain_value(&raw, part, ctx)?;
    let extra_attrs = raw.extra_attrs;
    let content = match raw.formula {
        Some((text, kind)) => CellContent::Formula {
            text,
            kind,
            cached: cached_value(value, ctx).map(Box::new),
        },
        None => value,
    };
    let mut data = CellData::with_style(content, raw.style);
    data.extra_attrs = extra_attrs;
    Ok(data)
}

/// Convert a value written by a stream writer to stored content
///
/// Strings are always inline.
pub(crate) fn cell_content(value: CellValue) -> CellContent {
    match value {
        CellValue::Empty => CellContent::Empty,
        CellValue::Boolean(b) => CellContent::Boolean(b),
        CellValue::Number(n) => CellContent::Number(n),
        CellValue::String(s) => CellContent::InlineString(s),
        CellValue::Error(e) => CellContent::Error(e),
        CellValue::Formula { text, cached } => CellContent::Formula {
            text: text.strip_prefix('=').map(str::to_string).unwrap_or(text),
            kind: FormulaKind::Normal,
            cached,
        },
    }
}

// === Writing ===

fn number_text(n: f64) -> String {
    format!("{}", n)
}

fn push_inline_text(xml: &mut String, text: &str) {
    if xml::needs_space_preserve(text) {
        xml.push_str("<t xml:space=\"preserve\">");
    } else {
        xml.push_str("<t>");
    }
    xml.push_str(&xml::cell_text(text));
    xml.push_str("</t>");
}

/// Write a `<row>` start tag
pub(crate) fn write_row_start(xml: &mut String, row: u32, meta: &RowMeta, empty: bool) {
    xml.push_str(&format!("<row r=\"{}\"", row + 1));
    if let Some(style) = meta.style_index {
        xml.push_str(&format!(" s=\"{}\" customFormat=\"1\"", style));
    }
    if let Some(height) = meta.height {
        xml.push_str(&format!(" ht=\"{}\" customHeight=\"1\"", number_text(height)));
    }
    if meta.hidden {
        xml.push_str(" hidden=\"1\"");
    }
    if meta.outline_level > 0 {
        xml.push_str(&format!(" outlineLevel=\"{}\"", meta.outline_level));
    }
    if meta.collapsed {
        xml.push_str(" collapsed=\"1\"");
    }
    write_extra_attrs(xml, &meta.extra_attrs, &ROW_ATTRS);
    xml.push_str(if empty { "/>" } else { ">" });
}

/// Write kept attributes, skipping any the codec writes itself
fn write_extra_attrs(xml: &mut String, attrs: &[(String, String)], modelled: &[&str]) {
    for (key, value) in attrs {
        if modelled.contains(&key.as_str()) {
            continue;
        }
        xml.push(' ');
        xml.push_str(key);
        xml.push_str("=\"");
        xml.push_str(&xml::escape_attr(value));
        xml.push('"');
    }
}

pub(crate) fn write_row_end(xml: &mut String) {
    xml.push_str("</row>");
}

fn cached_type(cached: Option<&CellValue>) -> Option<&'static str> {
    match cached? {
        CellValue::String(_) => Some("str"),
        CellValue::Boolean(_) => Some("b"),
        CellValue::Error(_) => Some("e"),
        _ => None,
    }
}

fn cached_text(cached: &CellValue) -> Option<String> {
    match cached {
        CellValue::Number(n) => Some(number_text(*n)),
        CellValue::Boolean(b) => Some(if *b { "1" } else { "0" }.to_string()),
        CellValue::Error(e) => Some(e.as_str().to_string()),
        CellValue::String(s) => Some(xml::cell_text(s)),
        CellValue::Empty | CellValue::Formula { .. } => None,
    }
}

/// Write one `<c>` element
pub(crate) fn write_cell(xml: &mut String, row: u32, col: u16, data: &CellData) {
    let reference = CellAddress::new(row, col).to_a1_string();
    xml.push_str("<c r=\"");
    xml.push_str(&reference);
    xml.push('"');
    if data.style_index != 0 {
        xml.push_str(&format!(" s=\"{}\"", data.style_index));
    }
    write_extra_attrs(xml, &data.extra_attrs, &CELL_ATTRS);

    match &data.content {
        CellContent::Empty => xml.push_str("/>"),
        CellContent::Number(n) => {
            xml.push_str("><v>");
            xml.push_str(&number_text(*n));
            xml.push_str("</v></c>");
        }
        CellContent::Boolean(b) => {
            xml.push_str(if *b { " t=\"b\"><v>1</v></c>" } else { " t=\"b\"><v>0</v></c>" });
        }
        CellContent::SharedString(idx) => {
            xml.push_str(&format!(" t=\"s\"><v>{}</v></c>", idx));
        }
        CellContent::InlineString(s) => {
            xml.push_str(" t=\"inlineStr\"><is>");
            push_inline_text(xml, s);
            xml.push_str("</is></c>");
        }
        CellContent::Error(e) => {
            xml.push_str(&format!(" t=\"e\"><v>{}</v></c>", xml::escape_text(e.as_str())));
        }
        CellContent::Formula { text, kind, cached } => {
            let cached = cached.as_deref();
            if let Some(t) = cached_type(cached) {
                xml.push_str(&format!(" t=\"{}\"", t));
            }
            xml.push_str("><f");
            match kind {
                FormulaKind::Normal => {}
                FormulaKind::Array { range } => {
                    xml.push_str(&format!(" t=\"array\" ref=\"{}\"", xml::escape_attr(range)));
                }
                FormulaKind::Shared { index, range } => {
                    xml.push_str(" t=\"shared\"");
                    if let Some(range) = range {
                        xml.push_str(&format!(" ref=\"{}\"", xml::escape_attr(range)));
                    }
                    xml.push_str(&format!(" si=\"{}\"", index));
                }
            }
            if text.is_empty() {
                xml.push_str("/>");
            } else {
                xml.push('>');
                xml.push_str(&xml::escape_text(text));
                xml.push_str("</f>");
            }
            if let Some(v) = cached.and_then(cached_text) {
                xml.push_str("<v>");
                xml.push_str(&v);
                xml.push_str("</v>");
            }
            xml.push_str("</c>");
        }
    }
}

fn write_cols(xml: &mut String, spans: &[ColumnSpan]) {
    if spans.is_empty() {
        return;
    }
    xml.push_str("<cols>");
    for span in spans {
        let meta = &span.meta;
        xml.push_str(&format!("<col min=\"{}\" max=\"{}\"", span.min + 1, span.max + 1));
        if let Some(width) = meta.width {
            xml.push_str(&format!(" width=\"{}\" customWidth=\"1\"", number_text(width)));
        }
        if let Some(style) = meta.style_index {
            xml.push_str(&format!(" style=\"{}\"", style));
        }
        if meta.hidden {
            xml.push_str(" hidden=\"1\"");
        }
        if meta.best_fit {
            xml.push_str(" bestFit=\"1\"");
        }
        if meta.outline_level > 0 {
            xml.push_str(&format!(" outlineLevel=\"{}\"", meta.outline_level));
        }
        if meta.collapsed {
            xml.push_str(" collapsed=\"1\"");
        }
        xml.push_str("/>");
    }
    xml.push_str("</cols>");
}

fn write_merges(xml: &mut String, merges: &[CellRange]) {
    if merges.is_empty() {
        return;
    }
    xml.push_str(&format!("<mergeCells count=\"{}\">", merges.len()));
    for range in merges {
        xml.push_str(&format!("<mergeCell ref=\"{}\"/>", range.to_a1_string()));
    }
    xml.push_str("</mergeCells>");
}

/// `ref` value of the `<dimension>` element
pub(crate) fn dimension_ref(bounds: Option<(u32, u16, u32, u16)>) -> String {
    match bounds {
        Some((r1, c1, r2, c2)) if (r1, c1) != (r2, c2) => {
            CellRange::from_indices(r1, c1, r2, c2).to_a1_string()
        }
        Some((r, c, _, _)) => CellAddress::new(r, c).to_a1_string(),
        None => "A1".to_string(),
    }
}

fn write_sheet_data(xml: &mut String, cells: &CellStorage) {
    let rows = cells.occupied_rows();
    if rows.is_empty() {
        xml.push_str("<sheetData/>");
        return;
    }
    xml.push_str("<sheetData>");
    let default_meta = RowMeta::default();
    for row in rows {
        let meta = cells.row_meta(row).unwrap_or(&default_meta);
        let mut row_cells = cells.iter_row(row).peekable();
        let empty = row_cells.peek().is_none();
        write_row_start(xml, row, meta, empty);
        if empty {
            continue;
        }
        for (col, data) in row_cells {
            write_cell(xml, row, col, data);
        }
        write_row_end(xml);
    }
    xml.push_str("</sheetData>");
}

/// Head of a worksheet part: everything before the rows
///
/// Used by the stream writer, which produces the rows itself.
pub(crate) fn encode_head(layout: &SheetLayout, dimension: &str, cols: &[ColumnSpan]) -> String {
    let mut xml = String::from(xml::XML_DECLARATION);
    xml.push_str("<worksheet");
    xml::write_attrs(&mut xml, &layout.root_attrs);
    xml.push('>');
    for slot in &layout.slots {
        match slot {
            SheetSlot::SheetData => {
                xml.push_str("<sheetData>");
                break;
            }
            SheetSlot::Raw(raw) => xml.push_str(&raw.xml),
            SheetSlot::Dimension => {
                xml.push_str(&format!("<dimension ref=\"{}\"/>", dimension));
            }
            SheetSlot::Cols => write_cols(&mut xml, cols),
            SheetSlot::MergeCells => {}
        }
    }
    xml
}

/// Tail of a worksheet part: everything after the rows
pub(crate) fn encode_tail(layout: &SheetLayout, merges: &[CellRange]) -> String {
    let mut xml = String::from("</sheetData>");
    let after = layout
        .slots
        .iter()
        .skip_while(|s| !matches!(s, SheetSlot::SheetData))
        .skip(1);
    for slot in after {
        match slot {
            SheetSlot::Raw(raw) => xml.push_str(&raw.xml),
            SheetSlot::MergeCells => write_merges(&mut xml, merges),
            SheetSlot::Dimension | SheetSlot::Cols | SheetSlot::SheetData => {}
        }
    }
    xml.push_str("</worksheet>");
    xml
}

/// Serialize a worksheet
pub fn encode_worksheet(layout: &SheetLayout, cells: &CellStorage) -> Vec<u8> {
    let mut xml = String::with_capacity(1024 + cells.cell_count() * 32);
    xml.push_str(xml::XML_DECLARATION);
    xml.push_str("<worksheet");
    xml::write_attrs(&mut xml, &layout.root_attrs);
    xml.push('>');
    for slot in &layout.slots {
        match slot {
            SheetSlot::Raw(raw) => xml.push_str(&raw.xml),
            SheetSlot::Dimension => {
                xml.push_str(&format!(
                    "<dimension ref=\"{}\"/>",
                    dimension_ref(cells.used_bounds())
                ));
            }
            SheetSlot::Cols => write_cols(&mut xml, &cells.column_spans()),
            SheetSlot::SheetData => write_sheet_data(&mut xml, cells),
            SheetSlot::MergeCells => write_merges(&mut xml, cells.merged_regions()),
        }
    }
    xml.push_str("</worksheet>");
    xml.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:mc="http://schemas.openxmlformats.org/markup-compatibility/2006" mc:Ignorable="x14ac">
  <sheetPr><tabColor rgb="FFFF0000"/></sheetPr>
  <dimension ref="A1:D3"/>
  <sheetViews><sheetView tabSelected="1" workbookViewId="0"/></sheetViews>
  <cols><col min="1" max="2" width="20.5" customWidth="1"/><col min="4" max="4" width="9" hidden="1"/></cols>
  <sheetData>
    <row r="1" ht="30" customHeight="1"><c r="A1" t="s"><v>0</v></c><c r="B1" s="1"><v>3.5</v></c><c r="C1" t="b"><v>1</v></c><c r="D1" t="e"><v>#N/A</v></c></row>
    <row r="2"><c r="A2"><f>B1*2</f><v>7</v></c><c r="B2" t="str"><f>"a"&amp;"b"</f><v>ab</v></c><c r="C2" t="inlineStr"><is><t xml:space="preserve"> pad_x000D_</t></is></c><c r="D2" t="d"><v>1900-03-01T12:00:00</v></c></row>
    <row><c><v>1</v></c><c><v>2</v></c></row>
  </sheetData>
  <mergeCells count="1"><mergeCell ref="A3:B3"/></mergeCells>
  <hyperlinks><hyperlink ref="A1" r:id="rId1"/></hyperlinks>
  <pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/>
  <extLst><ext uri="{78C0D931-6437-407d-A8EE-F0AAD7539E65}"><x14:conditionalFormattings xmlns:x14="http://schemas.microsoft.com/office/spreadsheetml/2009/9/main"/></ext></extLst>
</worksheet>"#;

    fn sst() -> Vec<Arc<str>> {
        vec![Arc::from("hello")]
    }

    fn decode(xml: &str) -> XlsxResult<WorksheetPart> {
        let sst = sst();
        let ctx = SheetContext {
            shared_strings: Some(&sst),
            ..Default::default()
        };
        WorksheetPart::decode_with("xl/worksheets/sheet1.xml", xml.as_bytes(), &ctx)
    }

    #[test]
    fn test_decode_cells() {
        let part = decode(SHEET).unwrap();
        let cells = &part.cells;
        assert_eq!(cells.get(0, 0).unwrap().content, CellContent::SharedString(0));
        assert_eq!(cells.get(0, 1).unwrap(), &CellData::with_style(CellContent::Number(3.5), 1));
        assert_eq!(cells.get(0, 2).unwrap().content, CellContent::Boolean(true));
        assert_eq!(cells.get(0, 3).unwrap().content, CellContent::Error(CellError::Na));
        assert_eq!(
            cells.get(1, 0).unwrap().content,
            CellContent::Formula {
                text: "B1*2".into(),
                kind: FormulaKind::Normal,
                cached: Some(Box::new(CellValue::Number(7.0))),
            }
        );
        assert_eq!(
            cells.get(1, 1).unwrap().content,
            CellContent::Formula {
                text: "\"a\"&\"b\"".into(),
                kind: FormulaKind::Normal,
                cached: Some(Box::new(CellValue::String("ab".into()))),
            }
        );
        assert_eq!(cells.get(1, 2).unwrap().content, CellContent::InlineString(" pad\r".into()));
        assert_eq!(cells.get(1, 3).unwrap().content, CellContent::Number(61.5));
        // Implicit numbering: third row, columns A and B
        assert_eq!(cells.get(2, 1).unwrap().content, CellContent::Number(2.0));
        assert_eq!(cells.row_meta(0).unwrap().height, Some(30.0));
        assert_eq!(cells.column_meta(1).unwrap().width, Some(20.5));
        assert!(cells.column_meta(3).unwrap().hidden);
        assert_eq!(cells.merged_regions(), &[CellRange::parse("A3:B3").unwrap()]);
    }

    #[test]
    fn test_layout_is_preserved_in_order() {
        let part = decode(SHEET).unwrap();
        let names: Vec<_> = part.layout.slots.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(
            names,
            vec![
                "sheetPr",
                "dimension",
                "sheetViews",
                "cols",
                "sheetData",
                "mergeCells",
                "hyperlinks",
                "pageMargins",
                "extLst"
            ]
        );
        assert_eq!(part.layout.rel_ids().collect::<Vec<_>>(), vec!["rId1"]);

        let encoded = String::from_utf8(part.encode()).unwrap();
        assert!(encoded.contains("mc:Ignorable=\"x14ac\""));
        assert!(encoded.contains("<extLst><ext uri=\"{78C0D931-6437-407d-A8EE-F0AAD7539E65}\">"));
        let hyperlinks = encoded.find("<hyperlinks>").unwrap();
        let merges = encoded.find("<mergeCells").unwrap();
        assert!(merges < hyperlinks);

        let again = decode(&encoded).unwrap();
        assert_eq!(again.layout, part.layout);
        assert_eq!(again.cells.iter().count(), part.cells.iter().count());
        for (row, col, data) in part.cells.iter() {
            assert_eq!(again.cells.get(row, col), Some(data), "{}:{}", row, col);
        }
        assert_eq!(again.encode(), encoded.into_bytes());
    }

    #[test]
    fn test_bad_shared_string_index() {
        let xml = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c r="A1" t="s"><v>5</v></c></row></sheetData></worksheet>"#;
        match decode(xml) {
            Err(XlsxError::InvalidPart { element, .. }) => assert_eq!(element, "v"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_bad_cell_type_and_reference() {
        let bad_type = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c r="A1" t="zz"><v>1</v></c></row></sheetData></worksheet>"#;
        assert!(matches!(decode(bad_type), Err(XlsxError::InvalidPart { .. })));
        let bad_ref = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c r="1A"><v>1</v></c></row></sheetData></worksheet>"#;
        assert!(matches!(decode(bad_ref), Err(XlsxError::InvalidPart { .. })));
        let bad_number = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c r="A1"><v>abc</v></c></row></sheetData></worksheet>"#;
        assert!(matches!(decode(bad_number), Err(XlsxError::InvalidPart { .. })));
    }

    #[test]
    fn test_overlapping_merges_are_invalid() {
        let xml = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData/><mergeCells count="2"><mergeCell ref="A1:B2"/><mergeCell ref="B2:C3"/></mergeCells></worksheet>"#;
        match decode(xml) {
            Err(XlsxError::InvalidPart { element, message, .. }) => {
                assert_eq!(element, "mergeCell");
                assert!(message.contains("B2:C3"), "{}", message);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_missing_slots_are_added_in_schema_order() {
        let xml = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetViews/><pageMargins left="1" right="1" top="1" bottom="1" header="0" footer="0"/></worksheet>"#;
        let part = decode(xml).unwrap();
        let names: Vec<_> = part.layout.slots.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(
            names,
            vec!["dimension", "sheetViews", "cols", "sheetData", "mergeCells", "pageMargins"]
        );
    }

    #[test]
    fn test_place_keeps_schema_order() {
        let xml = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheetData/><pageMargins left="1" right="1" top="1" bottom="1" header="0" footer="0"/><drawing r:id="rId1"/><tableParts count="0"/></worksheet>"#;
        let mut layout = decode(xml).unwrap().layout;
        layout.place(RawFragment::fixed("picture", r#"<picture r:id="rId2"/>"#));
        layout.place(RawFragment::fixed("legacyDrawing", r#"<legacyDrawing r:id="rId4"/>"#));
        layout.place(RawFragment::fixed("picture", r#"<picture r:id="rId3"/>"#));
        let names: Vec<_> = layout.slots.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(
            names,
            vec![
                "dimension",
                "cols",
                "sheetData",
                "mergeCells",
                "pageMargins",
                "drawing",
                "legacyDrawing",
                "picture",
                "tableParts"
            ]
        );
        assert_eq!(layout.raw("picture").unwrap().xml, r#"<picture r:id="rId3"/>"#);
        assert_eq!(layout.remove_raw("drawing").unwrap().rel_ids, ["rId1"]);
        assert!(layout.raw("drawing").is_none());
    }

    #[test]
    fn test_shared_and_array_formulas() {
        let xml = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c r="A1"><f t="shared" ref="A1:A2" si="0">B1</f><v>1</v></c><c r="B1"><f t="array" ref="B1:B2">C1:C2</f></c></row><row r="2"><c r="A2"><f t="shared" si="0"/><v>2</v></c></row></sheetData></worksheet>"#;
        let part = decode(xml).unwrap();
        match &part.cells.get(1, 0).unwrap().content {
            CellContent::Formula { text, kind, .. } => {
                assert_eq!(text, "");
                assert_eq!(kind, &FormulaKind::Shared { index: 0, range: None });
            }
            other => panic!("unexpected {:?}", other),
        }
        let encoded = String::from_utf8(part.encode()).unwrap();
        assert!(encoded.contains("<f t=\"shared\" ref=\"A1:A2\" si=\"0\">B1</f>"));
        assert!(encoded.contains("<f t=\"shared\" si=\"0\"/>"));
        assert!(encoded.contains("<f t=\"array\" ref=\"B1:B2\">C1:C2</f>"));
    }

    #[test]
    fn test_unmodelled_row_and_cell_attributes_survive_edits() {
        let xml = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:x14ac="http://schemas.microsoft.com/office/spreadsheetml/2009/9/ac"><sheetData><row r="1" spans="1:2" ht="20" customHeight="1" thickBot="1" x14ac:dyDescent="0.25"><c r="A1" ph="1"><v>1</v></c><c r="C1" cm="1"><f t="array" ref="C1:C3">SEQUENCE(3)</f><v>1</v></c></row></sheetData></worksheet>"#;
        let mut part = decode(xml).unwrap();
        assert_eq!(
            part.cells.row_meta(0).unwrap().extra_attrs,
            vec![
                ("spans".to_string(), "1:2".to_string()),
                ("thickBot".to_string(), "1".to_string()),
                ("x14ac:dyDescent".to_string(), "0.25".to_string()),
            ]
        );
        part.cells.set_content(0, 1, CellContent::Number(2.0));

        let encoded = String::from_utf8(part.encode()).unwrap();
        assert!(encoded.contains(
            "<row r=\"1\" ht=\"20\" customHeight=\"1\" spans=\"1:2\" thickBot=\"1\" x14ac:dyDescent=\"0.25\">"
        ));
        assert!(encoded.contains("<c r=\"A1\" ph=\"1\"><v>1</v></c><c r=\"B1\"><v>2</v></c>"));
        assert!(encoded.contains("<c r=\"C1\" cm=\"1\"><f t=\"array\" ref=\"C1:C3\">SEQUENCE(3)</f>"));

        // a new value drops the metadata reference of the old one
        part.cells.set_content(0, 2, CellContent::Number(9.0));
        let encoded = String::from_utf8(part.encode()).unwrap();
        assert!(encoded.contains("<c r=\"C1\"><v>9</v></c>"));
    }

    #[test]
    fn test_iso_dates() {
        let dt = parse_iso_datetime("2024-01-31T12:30:00Z").unwrap();
        assert_eq!(dt.to_string(), "2024-01-31 12:30:00");
        assert!(parse_iso_datetime("2024-01-31").is_some());
        assert!(parse_iso_datetime("06:00:00").is_some());
        assert!(parse_iso_datetime("yesterday").is_none());
    }

    #[test]
    fn test_write_cell_forms() {
        let mut xml = String::new();
        write_cell(&mut xml, 0, 0, &CellData::with_style(CellContent::Empty, 2));
        write_cell(&mut xml, 0, 1, &CellData::new(CellContent::InlineString("a<b".into())));
        write_cell(&mut xml, 0, 2, &CellData::new(CellContent::Boolean(false)));
        assert_eq!(
            xml,
            "<c r=\"A1\" s=\"2\"/><c r=\"B1\" t=\"inlineStr\"><is><t>a&lt;b</t></is></c><c r=\"C1\" t=\"b\"><v>0</v></c>"
        );
    }

    #[test]
    fn test_dimension_ref() {
        assert_eq!(dimension_ref(None), "A1");
        assert_eq!(dimension_ref(Some((2, 1, 2, 1))), "B3");
        assert_eq!(dimension_ref(Some((0, 0, 9, 3))), "A1:D10");
    }
}
