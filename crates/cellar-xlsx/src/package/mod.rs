//! The package: ownership root of an open document
//!
//! A [`Package`] ties together the source archive, the content types, the
//! relationship graph and the workbook model. Worksheets are decoded on
//! first use unless [`Options::preload_sheets`] is set; until then their
//! cells stay in the archive and are copied through unchanged on save.

mod objects;
mod open;
mod save;

use std::collections::{BTreeMap, BTreeSet};
use std::io::{BufRead, Cursor};
use std::path::{Path, PathBuf};

use cellar_core::{AccessMode, CellStorage, Workbook};

use crate::archive::ArchiveReader;
use crate::cancel::CancellationToken;
use crate::codec::{
    encode_worksheet, CoreLayout, SheetContext, SheetLayout, StylesLayout, WorkbookLayout,
    WorksheetPart,
};
use crate::content_types::{ContentTypes, Flavor, CT_STYLES, CT_WORKSHEET};
use crate::error::{XlsxError, XlsxResult};
use crate::options::Options;
use crate::rels::{RelationshipGraph, PACKAGE_ROOT, REL_CALC_CHAIN, REL_OFFICE_DOCUMENT, REL_STYLES, REL_WORKSHEET};
use crate::stream::{RowStream, StreamWriter, StreamedSheet};
use crate::xml::Attrs;

/// Lifecycle of a package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageState {
    /// Opened or created, not changed since
    Open,
    /// Changed since it was opened or last saved
    Modified,
    /// Saved, not changed since
    Saved,
    /// Closed; every further call fails
    Closed,
}

/// What a sheet entry's part holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SheetKind {
    Worksheet,
    /// Chartsheets, dialog sheets and macro sheets: listed, never decoded
    Opaque,
}

/// Where a sheet's serialized form lives
#[derive(Debug, Clone)]
pub(crate) enum SheetSource {
    /// An entry of the source archive
    Archive,
    /// Output of a flushed stream writer
    Streamed(StreamedSheet),
    /// Created in this session
    New,
}

/// Per-sheet package state, index-aligned with the workbook's sheets
#[derive(Debug, Clone)]
pub(crate) struct SheetEntry {
    pub path: String,
    pub rel_id: String,
    pub kind: SheetKind,
    pub source: SheetSource,
    /// Cells have been decoded into the model
    pub loaded: bool,
    pub layout: SheetLayout,
}

/// An open spreadsheet package
#[derive(Debug)]
pub struct Package {
    state: PackageState,
    /// Set by the first mutation and never cleared; typed parts are
    /// re-encoded on save once it is set
    changed: bool,
    options: Options,
    flavor: Flavor,
    path: Option<PathBuf>,
    source: Option<ArchiveReader>,
    content_types: ContentTypes,
    rels: RelationshipGraph,
    workbook: Workbook,
    main_part: String,
    workbook_layout: WorkbookLayout,
    styles_path: Option<String>,
    styles_layout: StylesLayout,
    shared_strings_path: Option<String>,
    shared_strings_root: Attrs,
    core_path: Option<String>,
    core_layout: CoreLayout,
    sheets: Vec<SheetEntry>,
    /// Parts outside the model that were added or rewritten in this session
    parts: BTreeMap<String, Vec<u8>>,
    /// Source entries that are not written back
    removed: BTreeSet<String>,
}

const MAIN_PART: &str = "xl/workbook.xml";

impl Package {
    /// A blank workbook with one sheet
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    /// A blank workbook with one sheet, using `options`
    pub fn with_options(options: Options) -> Self {
        let flavor = Flavor::Workbook;
        let mut content_types = ContentTypes::new();
        content_types.set_override(MAIN_PART, flavor.main_content_type());

        let mut rels = RelationshipGraph::new();
        rels.add_edge(PACKAGE_ROOT, MAIN_PART, REL_OFFICE_DOCUMENT);

        let mut workbook = Workbook::new();
        workbook.settings_mut().string_mode = options.string_mode;

        let mut package = Self {
            state: PackageState::Open,
            changed: false,
            options,
            flavor,
            path: None,
            source: None,
            content_types,
            rels,
            workbook,
            main_part: MAIN_PART.to_string(),
            workbook_layout: WorkbookLayout::default(),
            styles_path: None,
            styles_layout: StylesLayout::default(),
            shared_strings_path: None,
            shared_strings_root: vec![("xmlns".to_string(), crate::xml::NS_MAIN.to_string())],
            core_path: None,
            core_layout: CoreLayout::default(),
            sheets: Vec::new(),
            parts: BTreeMap::new(),
            removed: BTreeSet::new(),
        };

        let styles = package.part_beside_main("styles.xml");
        package.rels.add_edge(MAIN_PART, &styles, REL_STYLES);
        package.content_types.set_override(&styles, CT_STYLES);
        package.styles_path = Some(styles);

        let path = package.next_sheet_path();
        let rel_id = package.rels.add_edge(MAIN_PART, &path, REL_WORKSHEET);
        package.content_types.set_override(&path, CT_WORKSHEET);
        package.sheets.push(SheetEntry::created(path, rel_id));
        package
    }

    // ==================== State ====================

    pub fn state(&self) -> PackageState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == PackageState::Closed
    }

    pub(crate) fn check_open(&self) -> XlsxResult<()> {
        if self.state == PackageState::Closed {
            return Err(XlsxError::UseAfterClose);
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.changed = true;
        self.state = PackageState::Modified;
    }

    /// Release the source archive; every further call fails with `UseAfterClose`
    ///
    /// Closing twice is not an error.
    pub fn close(&mut self) {
        if self.state == PackageState::Closed {
            return;
        }
        log::debug!("closing package ({} sheets)", self.sheets.len());
        self.state = PackageState::Closed;
        self.source = None;
        self.sheets.clear();
        self.workbook = Workbook::empty();
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Path the package was opened from or last saved to
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Path of the main workbook part
    pub fn main_part(&self) -> &str {
        &self.main_part
    }

    pub fn content_types(&self) -> &ContentTypes {
        &self.content_types
    }

    pub fn relationships(&self) -> &RelationshipGraph {
        &self.rels
    }

    // ==================== Model access ====================

    /// The workbook model
    ///
    /// Sheets that were not loaded yet have no cells in the model; call
    /// [`Package::load_sheet`] first.
    pub fn workbook(&self) -> XlsxResult<&Workbook> {
        self.check_open()?;
        Ok(&self.workbook)
    }

    fn entry(&self, sheet: usize) -> XlsxResult<&SheetEntry> {
        self.sheets
            .get(sheet)
            .ok_or_else(|| cellar_core::Error::SheetOutOfBounds(sheet, self.sheets.len()).into())
    }

    /// Part path of a sheet
    pub fn sheet_part(&self, sheet: usize) -> XlsxResult<&str> {
        self.check_open()?;
        Ok(&self.entry(sheet)?.path)
    }

    /// Whether a sheet's cells are in the model
    pub fn is_sheet_loaded(&self, sheet: usize) -> XlsxResult<bool> {
        self.check_open()?;
        Ok(self.entry(sheet)?.loaded)
    }

    /// Decode a sheet's cells into the model if they are not there yet
    pub fn load_sheet(&mut self, sheet: usize) -> XlsxResult<()> {
        self.check_open()?;
        if self.entry(sheet)?.loaded {
            return Ok(());
        }
        let part = self.decode_sheet(sheet, true)?;
        self.install_sheet(sheet, part)
    }

    /// Load every sheet, decoding in parallel
    pub fn load_all_sheets(&mut self) -> XlsxResult<()> {
        use rayon::prelude::*;

        self.check_open()?;
        let pending: Vec<usize> = (0..self.sheets.len())
            .filter(|&i| !self.sheets[i].loaded)
            .collect();
        let decoded: Vec<(usize, WorksheetPart)> = pending
            .par_iter()
            .map(|&i| Ok((i, self.decode_sheet(i, true)?)))
            .collect::<XlsxResult<_>>()?;
        for (i, part) in decoded {
            self.install_sheet(i, part)?;
        }
        Ok(())
    }

    /// Open a reader over a sheet's current serialized form
    fn sheet_input(&self, sheet: usize) -> XlsxResult<Box<dyn BufRead + Send>> {
        let entry = self.entry(sheet)?;
        if self.needs_encode(sheet) {
            let ws = self
                .workbook
                .worksheet(sheet)
                .ok_or_else(|| XlsxError::InvalidPackage(format!("no sheet {}", sheet)))?;
            return Ok(Box::new(Cursor::new(encode_worksheet(&entry.layout, ws.cells()))));
        }
        match &entry.source {
            SheetSource::Archive => {
                let source = self.archive()?;
                let spooled = source.spool_part(
                    &entry.path,
                    self.options.unzip_xml_size_limit,
                    &self.options,
                )?;
                Ok(spooled.open()?)
            }
            SheetSource::Streamed(streamed) => Ok(streamed.open()?),
            SheetSource::New => Ok(Box::new(Cursor::new(encode_worksheet(
                &entry.layout,
                &CellStorage::new(),
            )))),
        }
    }

    /// Decode a sheet from its source; with `load_cells` off only the layout is read
    fn decode_sheet(&self, sheet: usize, load_cells: bool) -> XlsxResult<WorksheetPart> {
        let entry = self.entry(sheet)?;
        if entry.kind == SheetKind::Opaque {
            return Ok(WorksheetPart::default());
        }
        let ctx = SheetContext {
            date_system: self.workbook.date_system(),
            shared_strings: Some(self.workbook.shared_strings().entries()),
            load_cells,
        };
        match &entry.source {
            SheetSource::Archive => self
                .archive()?
                .with_part(&entry.path, |input| WorksheetPart::decode_with(&entry.path, input, &ctx)),
            SheetSource::Streamed(streamed) => {
                WorksheetPart::decode_with(&entry.path, streamed.open()?, &ctx)
            }
            SheetSource::New => Ok(WorksheetPart {
                layout: entry.layout.clone(),
                cells: CellStorage::new(),
            }),
        }
    }

    fn install_sheet(&mut self, sheet: usize, part: WorksheetPart) -> XlsxResult<()> {
        let entry = self
            .sheets
            .get_mut(sheet)
            .ok_or_else(|| XlsxError::InvalidPackage(format!("no sheet {}", sheet)))?;
        self.rels.check_ids(&entry.path, part.layout.rel_ids())?;
        log::debug!("loaded {} ({} cells)", entry.path, part.cells.cell_count());
        entry.layout = part.layout;
        entry.loaded = true;
        if let Some(ws) = self.workbook.worksheet_mut(sheet) {
            *ws.cells_mut() = part.cells;
        }
        Ok(())
    }

    /// Whether a sheet's part must be regenerated from the model
    pub(crate) fn needs_encode(&self, sheet: usize) -> bool {
        let Some(entry) = self.sheets.get(sheet) else {
            return false;
        };
        if !entry.loaded || entry.kind == SheetKind::Opaque {
            return false;
        }
        matches!(entry.source, SheetSource::New)
            || self
                .workbook
                .worksheet(sheet)
                .is_some_and(|ws| ws.access_mode() == AccessMode::Buffered)
    }

    fn archive(&self) -> XlsxResult<&ArchiveReader> {
        self.source
            .as_ref()
            .ok_or_else(|| XlsxError::InvalidPackage("package has no source archive".into()))
    }

    // ==================== Mutation ====================

    /// Apply a workbook-level change
    ///
    /// Use [`Package::edit_sheet`] for anything that reads or writes cells.
    pub fn edit<T>(&mut self, f: impl FnOnce(&mut Workbook) -> cellar_core::Result<T>) -> XlsxResult<T> {
        self.check_open()?;
        let out = f(&mut self.workbook)?;
        self.touch();
        Ok(out)
    }

    /// Apply a change to one sheet's content, loading it first
    pub fn edit_sheet<T>(
        &mut self,
        sheet: usize,
        f: impl FnOnce(&mut Workbook) -> cellar_core::Result<T>,
    ) -> XlsxResult<T> {
        self.check_editable(sheet)?;
        self.load_sheet(sheet)?;
        self.edit(f)
    }

    fn check_editable(&self, sheet: usize) -> XlsxResult<()> {
        self.check_open()?;
        let entry = self.entry(sheet)?;
        if entry.kind == SheetKind::Opaque {
            return Err(XlsxError::InvalidArgument(format!(
                "{} is not a worksheet and cannot be edited",
                entry.path
            )));
        }
        Ok(())
    }

    fn part_beside_main(&self, file: &str) -> String {
        match self.main_part.rsplit_once('/') {
            Some((dir, _)) => format!("{}/{}", dir, file),
            None => file.to_string(),
        }
    }

    fn part_exists(&self, path: &str) -> bool {
        self.source.as_ref().is_some_and(|s| s.contains(path))
            || self.parts.contains_key(path)
            || self.sheets.iter().any(|e| e.path.eq_ignore_ascii_case(path))
    }

    /// Drop every part that was reachable in `before` and no longer is
    ///
    /// Returns how many parts went.
    fn prune(&mut self, before: &BTreeSet<String>) -> usize {
        let after = self.rels.reachable_parts();
        let gone: Vec<String> = before.difference(&after).cloned().collect();
        for part in &gone {
            self.rels.remove_source(part);
            self.content_types.remove_override(part);
            self.parts.remove(part);
            if self.source.as_ref().is_some_and(|s| s.contains(part)) {
                self.removed.insert(part.clone());
            }
        }
        gone.len()
    }

    fn next_sheet_path(&self) -> String {
        (1..)
            .map(|n| self.part_beside_main(&format!("worksheets/sheet{}.xml", n)))
            .find(|p| !self.part_exists(p))
            .unwrap_or_default()
    }

    /// Append a sheet and return its index
    pub fn add_sheet(&mut self, name: &str) -> XlsxResult<usize> {
        self.check_open()?;
        let index = self.workbook.add_sheet(name)?;
        let path = self.next_sheet_path();
        let rel_id = self.rels.add_edge(&self.main_part, &path, REL_WORKSHEET);
        self.content_types.set_override(&path, CT_WORKSHEET);
        log::debug!("added sheet '{}' as {} ({})", name, path, rel_id);
        self.sheets.push(SheetEntry::created(path, rel_id));
        self.touch();
        Ok(index)
    }

    /// Remove a sheet and every part only it referenced
    ///
    /// Defined names scoped to the sheet or referring to it go as well. The
    /// calculation chain is dropped, since it may list cells of the sheet.
    pub fn remove_sheet(&mut self, name: &str) -> XlsxResult<()> {
        self.check_open()?;
        let index = self
            .workbook
            .sheet_index(name)
            .ok_or_else(|| cellar_core::Error::SheetNotFound(name.to_string()))?;
        let (sheet, names) = self.workbook.remove_sheet(name)?;
        let entry = self.sheets.remove(index);
        for dn in &names {
            log::debug!("removed defined name '{}' with sheet '{}'", dn.name, sheet.name());
        }

        let before = self.rels.reachable_parts();
        self.rels.remove_edge(&self.main_part, &entry.rel_id);
        self.content_types.remove_override(&entry.path);
        let calc_chain = self
            .rels
            .find_by_type(&self.main_part, REL_CALC_CHAIN)
            .map(|r| r.id.clone());
        if let Some(id) = calc_chain {
            self.rels.remove_edge(&self.main_part, &id);
        }

        let pruned = self.prune(&before);
        self.rels.remove_source(&entry.path);
        log::debug!(
            "removed sheet '{}' ({}); {} parts pruned",
            sheet.name(),
            entry.path,
            pruned
        );
        self.touch();
        Ok(())
    }

    /// Replace the content of sheet `to` with a copy of sheet `from`
    pub fn copy_sheet(&mut self, from: usize, to: usize) -> XlsxResult<()> {
        self.check_editable(from)?;
        self.check_editable(to)?;
        self.load_sheet(from)?;
        self.load_sheet(to)?;
        self.edit(|wb| wb.copy_sheet(from, to))
    }

    // ==================== Streaming ====================

    /// Stream the rows of a sheet
    ///
    /// The rows come from the sheet's current serialized form: the source
    /// entry, a stream writer's output, or a fresh encoding of a sheet
    /// changed in memory.
    pub fn stream_rows(&self, sheet: usize, cancel: Option<CancellationToken>) -> XlsxResult<RowStream> {
        self.check_open()?;
        let ws = self
            .workbook
            .worksheet(sheet)
            .ok_or_else(|| cellar_core::Error::SheetOutOfBounds(sheet, self.sheets.len()))?;
        ws.check_read("stream_rows")?;
        let input = self.sheet_input(sheet)?;
        Ok(RowStream::new(
            self.entry(sheet)?.path.clone(),
            input,
            self.workbook.shared_strings().snapshot(),
            self.workbook.date_system(),
            cancel,
        ))
    }

    /// Hand a sheet to a stream writer
    ///
    /// The sheet must not have been changed through the model in this
    /// session. It stays in streaming mode until the writer is passed to
    /// [`Package::flush_stream`] or [`Package::abort_stream`] is called.
    pub fn stream_writer(
        &mut self,
        sheet: usize,
        cancel: Option<CancellationToken>,
    ) -> XlsxResult<StreamWriter> {
        self.check_editable(sheet)?;
        self.workbook.begin_stream(sheet)?;
        let setup = self.writer_for(sheet, cancel);
        if setup.is_err() {
            self.workbook.abort_stream(sheet);
        }
        setup
    }

    fn writer_for(&self, sheet: usize, cancel: Option<CancellationToken>) -> XlsxResult<StreamWriter> {
        let entry = self.entry(sheet)?;
        let layout = if entry.loaded {
            entry.layout.clone()
        } else {
            self.decode_sheet(sheet, false)?.layout
        };
        let id = self
            .workbook
            .worksheet(sheet)
            .map(|ws| ws.id())
            .ok_or_else(|| cellar_core::Error::SheetOutOfBounds(sheet, self.sheets.len()))?;
        StreamWriter::new(id, entry.path.clone(), layout, &self.options, cancel)
    }

    /// Install a stream writer's output as its sheet's part
    ///
    /// Style indices the writer used must exist in the styles table. On
    /// failure the sheet is released and nothing is installed.
    pub fn flush_stream(&mut self, writer: StreamWriter) -> XlsxResult<()> {
        self.check_open()?;
        let index = self
            .workbook
            .sheet_index_by_id(writer.sheet_id())
            .ok_or_else(|| cellar_core::Error::SheetNotFound(format!("sheet id {}", writer.sheet_id())))?;
        if let Some(style) = writer.max_style() {
            if !self.workbook.styles().contains(style) {
                self.workbook.abort_stream(index);
                return Err(cellar_core::Error::InvalidStyleIndex(style).into());
            }
        }
        let streamed = match writer.finish() {
            Ok(streamed) => streamed,
            Err(e) => {
                self.workbook.abort_stream(index);
                return Err(e);
            }
        };
        self.workbook.finish_stream(index)?;
        if let Some(entry) = self.sheets.get_mut(index) {
            entry.source = SheetSource::Streamed(streamed);
            entry.loaded = false;
        }
        self.touch();
        Ok(())
    }

    /// Release a sheet held by an unflushed stream writer
    pub fn abort_stream(&mut self, sheet_id: u32) {
        if let Some(index) = self.workbook.sheet_index_by_id(sheet_id) {
            self.workbook.abort_stream(index);
        }
    }
}

impl Default for Package {
    fn default() -> Self {
        Self::new()
    }
}

impl SheetEntry {
    fn created(path: String, rel_id: String) -> Self {
        Self {
            path,
            rel_id,
            kind: SheetKind::Worksheet,
            source: SheetSource::New,
            loaded: true,
            layout: SheetLayout::default(),
        }
    }
}
