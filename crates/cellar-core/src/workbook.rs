//! Workbook type - the main document structure
//!
//! Every mutating operation validates its arguments before it changes
//! anything, so a failed call leaves the workbook exactly as it was.

use crate::cell::{CellAddress, CellContent, CellData, CellRange, CellValue, FormulaKind};
use crate::date::DateSystem;
use crate::defined_name::{DefinedName, DefinedNames, NameScope};
use crate::doc_props::DocProperties;
use crate::error::{Error, Result};
use crate::row::RowMeta;
use crate::shared_strings::SharedStringTable;
use crate::style::{Alignment, BorderStyle, FillStyle, FontStyle, NumberFormat, Style, StyleTable};
use crate::worksheet::{check_address, check_col, check_row, SheetVisibility, Worksheet};
use crate::{MAX_CELL_TEXT_LEN, MAX_COLS, MAX_SHEET_NAME_LEN};

/// Maximum length of formula text
const MAX_FORMULA_LEN: usize = 8192;

/// Maximum row height in points
const MAX_ROW_HEIGHT: f64 = 409.0;

/// Maximum column width in characters
const MAX_COL_WIDTH: f64 = 255.0;

/// Maximum outline level for rows and columns
const MAX_OUTLINE_LEVEL: u8 = 7;

/// How new string values are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StringMode {
    /// Interned in the shared strings table
    #[default]
    Shared,
    /// Stored in the cell itself
    Inline,
}

/// Workbook-level settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkbookSettings {
    /// Epoch of date serial numbers
    pub date_system: DateSystem,
    /// Where string values written through the model are stored
    pub string_mode: StringMode,
}

/// A workbook (spreadsheet document)
#[derive(Debug, Clone)]
pub struct Workbook {
    sheets: Vec<Worksheet>,
    next_sheet_id: u32,
    shared_strings: SharedStringTable,
    styles: StyleTable,
    defined_names: DefinedNames,
    settings: WorkbookSettings,
    active_sheet: usize,
    doc_props: DocProperties,
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new()
    }
}

impl Workbook {
    /// Create a workbook with one sheet named "Sheet1"
    pub fn new() -> Self {
        let mut wb = Self::empty();
        wb.sheets.push(Worksheet::new(1, "Sheet1"));
        wb.next_sheet_id = 2;
        wb
    }

    /// Create a workbook with no sheets and a default style, to be filled by a loader
    pub fn empty() -> Self {
        Self {
            sheets: Vec::new(),
            next_sheet_id: 1,
            shared_strings: SharedStringTable::new(),
            styles: StyleTable::new(),
            defined_names: DefinedNames::new(),
            settings: WorkbookSettings::default(),
            active_sheet: 0,
            doc_props: DocProperties::default(),
        }
    }

    // ==================== Sheets ====================

    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    pub fn worksheet(&self, index: usize) -> Option<&Worksheet> {
        self.sheets.get(index)
    }

    /// Raw mutable access to a sheet, bypassing access-mode checks
    ///
    /// Package loaders use this to fill sheets; edits should go through the
    /// workbook's own methods.
    pub fn worksheet_mut(&mut self, index: usize) -> Option<&mut Worksheet> {
        self.sheets.get_mut(index)
    }

    pub fn worksheets(&self) -> impl Iterator<Item = &Worksheet> {
        self.sheets.iter()
    }

    /// Sheet names in tab order
    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name().to_string()).collect()
    }

    /// Index of a sheet by name (case-insensitive)
    pub fn sheet_index(&self, name: &str) -> Option<usize> {
        let lower = name.to_lowercase();
        self.sheets
            .iter()
            .position(|s| s.name().to_lowercase() == lower)
    }

    /// Index of a sheet by its stable id
    pub fn sheet_index_by_id(&self, id: u32) -> Option<usize> {
        self.sheets.iter().position(|s| s.id() == id)
    }

    fn sheet(&self, index: usize) -> Result<&Worksheet> {
        self.sheets
            .get(index)
            .ok_or(Error::SheetOutOfBounds(index, self.sheets.len()))
    }

    fn sheet_for_read(&self, index: usize, operation: &'static str) -> Result<&Worksheet> {
        let ws = self.sheet(index)?;
        ws.check_read(operation)?;
        Ok(ws)
    }

    fn check_writable(&self, index: usize, operation: &'static str) -> Result<()> {
        self.sheet(index)?.check_write(operation)
    }

    /// Mark a sheet buffered and hand it out; call only after validation
    fn sheet_for_write(&mut self, index: usize, operation: &'static str) -> Result<&mut Worksheet> {
        let count = self.sheets.len();
        let ws = self
            .sheets
            .get_mut(index)
            .ok_or(Error::SheetOutOfBounds(index, count))?;
        ws.begin_buffered_write(operation)?;
        Ok(ws)
    }

    /// Add a sheet at the end and return its index
    pub fn add_sheet(&mut self, name: &str) -> Result<usize> {
        self.validate_sheet_name(name, None)?;
        let id = self.next_sheet_id;
        self.next_sheet_id += 1;
        self.sheets.push(Worksheet::new(id, name));
        Ok(self.sheets.len() - 1)
    }

    /// Add a sheet read from a file, keeping its id
    pub fn add_loaded_sheet(
        &mut self,
        id: u32,
        name: &str,
        visibility: SheetVisibility,
    ) -> Result<usize> {
        self.validate_sheet_name(name, None)?;
        if self.sheet_index_by_id(id).is_some() {
            return Err(Error::other(format!("duplicate sheet id {}", id)));
        }
        let mut ws = Worksheet::new(id, name);
        ws.set_visibility(visibility);
        self.sheets.push(ws);
        self.next_sheet_id = self.next_sheet_id.max(id.saturating_add(1));
        Ok(self.sheets.len() - 1)
    }

    /// Remove a sheet by name
    ///
    /// Defined names scoped to the sheet, or whose formula refers to it, are
    /// removed as well and returned alongside the sheet.
    pub fn remove_sheet(&mut self, name: &str) -> Result<(Worksheet, Vec<DefinedName>)> {
        let index = self
            .sheet_index(name)
            .ok_or_else(|| Error::SheetNotFound(name.to_string()))?;
        if self.sheets.len() == 1 {
            return Err(Error::LastSheet(name.to_string()));
        }
        self.sheets[index].check_read("remove_sheet")?;
        let hidden_others = self
            .sheets
            .iter()
            .enumerate()
            .all(|(i, s)| i == index || !s.is_visible());
        if hidden_others {
            return Err(Error::InvalidValue(format!(
                "removing '{}' would leave no visible sheet",
                name
            )));
        }

        let removed = self.sheets.remove(index);
        let names = self.defined_names.prune_sheet(removed.id(), removed.name());

        if self.active_sheet > index {
            self.active_sheet -= 1;
        } else if self.active_sheet == index {
            self.active_sheet = self.first_visible_from(index.min(self.sheets.len() - 1));
        }
        Ok((removed, names))
    }

    fn first_visible_from(&self, start: usize) -> usize {
        (start..self.sheets.len())
            .chain(0..start)
            .find(|&i| self.sheets[i].is_visible())
            .unwrap_or(0)
    }

    /// Rename a sheet; defined names referring to it are rewritten
    pub fn rename_sheet(&mut self, old: &str, new: &str) -> Result<()> {
        let index = self
            .sheet_index(old)
            .ok_or_else(|| Error::SheetNotFound(old.to_string()))?;
        self.validate_sheet_name(new, Some(index))?;

        let current = self.sheets[index].name().to_string();
        self.defined_names.rename_sheet(&current, new);
        self.sheets[index].set_name(new);
        Ok(())
    }

    /// Replace the content of sheet `to` with a copy of sheet `from`
    ///
    /// Cells, row and column settings and merged ranges are copied.
    pub fn copy_sheet(&mut self, from: usize, to: usize) -> Result<()> {
        let source = self.sheet_for_read(from, "copy_sheet")?.cells().clone();
        self.check_writable(to, "copy_sheet")?;
        if from == to {
            return Ok(());
        }
        *self.sheet_for_write(to, "copy_sheet")?.cells_mut() = source;
        Ok(())
    }

    pub fn active_sheet(&self) -> usize {
        self.active_sheet
    }

    /// Make a sheet the active tab; hidden sheets cannot be active
    pub fn set_active_sheet(&mut self, index: usize) -> Result<()> {
        let ws = self.sheet(index)?;
        if !ws.is_visible() {
            return Err(Error::InvalidValue(format!(
                "hidden sheet '{}' cannot be active",
                ws.name()
            )));
        }
        self.active_sheet = index;
        Ok(())
    }

    /// Set the active sheet recorded in a file, without validation
    pub fn set_loaded_active_sheet(&mut self, index: usize) {
        if index < self.sheets.len() {
            self.active_sheet = index;
        }
    }

    /// Show or hide a sheet; at least one sheet stays visible
    pub fn set_sheet_visibility(&mut self, index: usize, visibility: SheetVisibility) -> Result<()> {
        self.sheet(index)?;
        if visibility != SheetVisibility::Visible {
            let others_visible = self
                .sheets
                .iter()
                .enumerate()
                .any(|(i, s)| i != index && s.is_visible());
            if !others_visible {
                return Err(Error::InvalidValue(
                    "at least one sheet must stay visible".into(),
                ));
            }
        }
        self.sheets[index].set_visibility(visibility);
        if index == self.active_sheet && visibility != SheetVisibility::Visible {
            self.active_sheet = self.first_visible_from(0);
        }
        Ok(())
    }

    fn validate_sheet_name(&self, name: &str, exclude: Option<usize>) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidSheetName("Sheet name cannot be empty".into()));
        }
        if name.chars().count() > MAX_SHEET_NAME_LEN {
            return Err(Error::InvalidSheetName(format!(
                "'{}' is longer than {} characters",
                name, MAX_SHEET_NAME_LEN
            )));
        }

        const INVALID_CHARS: &[char] = &[':', '\\', '/', '?', '*', '[', ']'];
        if let Some(c) = name.chars().find(|c| INVALID_CHARS.contains(c)) {
            return Err(Error::InvalidSheetName(format!(
                "'{}' contains '{}'",
                name, c
            )));
        }
        if name.starts_with('\'') || name.ends_with('\'') {
            return Err(Error::InvalidSheetName(format!(
                "'{}' starts or ends with an apostrophe",
                name
            )));
        }

        match self.sheet_index(name) {
            Some(i) if Some(i) != exclude => Err(Error::DuplicateSheetName(name.into())),
            _ => Ok(()),
        }
    }

    // ==================== Cells ====================

    /// Set a cell value, keeping the cell's style
    ///
    /// Strings go to the shared strings table or inline depending on
    /// [`WorkbookSettings::string_mode`]. Formula text is stored without a
    /// leading `=`. An empty value clears the content.
    pub fn set_cell_value(&mut self, sheet: usize, addr: CellAddress, value: CellValue) -> Result<()> {
        check_address(addr)?;
        validate_value(&value)?;
        self.check_writable(sheet, "set_cell_value")?;

        let content = self.store_value(value);
        self.sheet_for_write(sheet, "set_cell_value")?
            .cells_mut()
            .set_content(addr.row, addr.col, content);
        Ok(())
    }

    /// Set a formula with an optional kind and cached result
    pub fn set_cell_formula(
        &mut self,
        sheet: usize,
        addr: CellAddress,
        text: &str,
        kind: FormulaKind,
    ) -> Result<()> {
        check_address(addr)?;
        let value = CellValue::formula(text);
        validate_value(&value)?;
        if let FormulaKind::Array { range } = &kind {
            CellRange::parse(range)?;
        }
        self.check_writable(sheet, "set_cell_formula")?;

        let text = value.formula_text().unwrap_or_default().to_string();
        self.sheet_for_write(sheet, "set_cell_formula")?
            .cells_mut()
            .set_content(
                addr.row,
                addr.col,
                CellContent::Formula {
                    text,
                    kind,
                    cached: None,
                },
            );
        Ok(())
    }

    /// Write a horizontal run of values starting at `start`
    pub fn set_sheet_row(&mut self, sheet: usize, start: CellAddress, values: Vec<CellValue>) -> Result<()> {
        check_address(start)?;
        let last_col = start.col as usize + values.len();
        if last_col > MAX_COLS as usize {
            return Err(Error::ColumnOutOfBounds(last_col as u32, MAX_COLS as u32));
        }
        for value in &values {
            validate_value(value)?;
        }
        self.check_writable(sheet, "set_sheet_row")?;

        let contents: Vec<CellContent> = values.into_iter().map(|v| self.store_value(v)).collect();
        let cells = self.sheet_for_write(sheet, "set_sheet_row")?.cells_mut();
        for (offset, content) in contents.into_iter().enumerate() {
            cells.set_content(start.row, start.col + offset as u16, content);
        }
        Ok(())
    }

    fn store_value(&mut self, value: CellValue) -> CellContent {
        match value {
            CellValue::Empty => CellContent::Empty,
            CellValue::Boolean(b) => CellContent::Boolean(b),
            CellValue::Number(n) => CellContent::Number(n),
            CellValue::Error(e) => CellContent::Error(e),
            CellValue::String(s) => match self.settings.string_mode {
                StringMode::Shared => CellContent::SharedString(self.shared_strings.intern(&s)),
                StringMode::Inline => CellContent::InlineString(s),
            },
            CellValue::Formula { text, cached } => CellContent::Formula {
                text: text.strip_prefix('=').map(str::to_string).unwrap_or(text),
                kind: FormulaKind::Normal,
                cached,
            },
        }
    }

    /// Resolve stored content to a value
    pub fn resolve_content(&self, content: &CellContent) -> Result<CellValue> {
        Ok(match content {
            CellContent::Empty => CellValue::Empty,
            CellContent::Boolean(b) => CellValue::Boolean(*b),
            CellContent::Number(n) => CellValue::Number(*n),
            CellContent::Error(e) => CellValue::Error(*e),
            CellContent::InlineString(s) => CellValue::String(s.clone()),
            CellContent::SharedString(idx) => CellValue::String(
                self.shared_strings
                    .get(*idx)
                    .ok_or(Error::SharedStringOutOfRange(*idx, self.shared_strings.len()))?
                    .to_string(),
            ),
            CellContent::Formula { text, cached, .. } => CellValue::Formula {
                text: text.clone(),
                cached: cached.clone(),
            },
        })
    }

    /// Get a cell with its formula, if any
    pub fn cell(&self, sheet: usize, addr: CellAddress) -> Result<CellValue> {
        check_address(addr)?;
        let ws = self.sheet_for_read(sheet, "cell")?;
        match ws.cell(addr) {
            Some(data) => self.resolve_content(&data.content),
            None => Ok(CellValue::Empty),
        }
    }

    /// Get a cell's value; formula cells yield their cached result or `Empty`
    pub fn cell_value(&self, sheet: usize, addr: CellAddress) -> Result<CellValue> {
        Ok(self.cell(sheet, addr)?.effective_value().clone())
    }

    /// Formula text of a cell, without the leading `=`
    pub fn cell_formula(&self, sheet: usize, addr: CellAddress) -> Result<Option<String>> {
        check_address(addr)?;
        let ws = self.sheet_for_read(sheet, "cell_formula")?;
        Ok(match ws.cell(addr).map(|d| &d.content) {
            Some(CellContent::Formula { text, .. }) => Some(text.clone()),
            _ => None,
        })
    }

    /// Dense, row-major grid of values from A1 to the last used cell
    ///
    /// Each row is trimmed after its last stored cell, so rows can differ in
    /// length and rows without cells are empty.
    pub fn rows(&self, sheet: usize) -> Result<Vec<Vec<CellValue>>> {
        let ws = self.sheet_for_read(sheet, "rows")?;
        let Some((_, _, max_row, _)) = ws.cells().used_bounds() else {
            return Ok(Vec::new());
        };

        let mut grid = vec![Vec::new(); max_row as usize + 1];
        for (row, col, data) in ws.cells().iter() {
            let value = self.resolve_content(&data.content)?.effective_value().clone();
            let line = &mut grid[row as usize];
            if line.len() <= col as usize {
                line.resize(col as usize + 1, CellValue::Empty);
            }
            line[col as usize] = value;
        }
        for line in &mut grid {
            while line.last().map_or(false, CellValue::is_empty) {
                line.pop();
            }
        }
        Ok(grid)
    }

    // ==================== Styles ====================

    /// Intern a style and return its index
    pub fn new_style(&mut self, style: Style) -> u32 {
        self.styles.intern(style)
    }

    /// Build a style from its parts, returning an existing index when one matches
    pub fn compose_style(
        &mut self,
        font: FontStyle,
        fill: FillStyle,
        border: BorderStyle,
        alignment: Alignment,
        number_format: NumberFormat,
    ) -> u32 {
        self.styles
            .compose(font, fill, border, alignment, number_format)
    }

    /// Register a number format code and return its id
    pub fn intern_number_format(&mut self, code: &str) -> u32 {
        self.styles.intern_number_format(code)
    }

    pub fn style(&self, index: u32) -> Option<&Style> {
        self.styles.get(index)
    }

    /// Style index of a cell (0 for cells without a style)
    pub fn cell_style(&self, sheet: usize, addr: CellAddress) -> Result<u32> {
        check_address(addr)?;
        Ok(self
            .sheet_for_read(sheet, "cell_style")?
            .cell_style_index(addr))
    }

    /// Intern a style and apply it to one cell
    pub fn set_cell_style(&mut self, sheet: usize, addr: CellAddress, style: &Style) -> Result<u32> {
        check_address(addr)?;
        self.check_writable(sheet, "set_cell_style")?;
        let index = self.styles.intern(style.clone());
        self.sheet_for_write(sheet, "set_cell_style")?
            .cells_mut()
            .set_style(addr.row, addr.col, index);
        Ok(index)
    }

    /// Apply an existing style index to every cell of a range
    pub fn set_cell_style_index(&mut self, sheet: usize, range: CellRange, index: u32) -> Result<()> {
        check_address(range.end)?;
        if !self.styles.contains(index) {
            return Err(Error::InvalidStyleIndex(index));
        }
        self.check_writable(sheet, "set_cell_style")?;
        let cells = self.sheet_for_write(sheet, "set_cell_style")?.cells_mut();
        for addr in range.cells() {
            cells.set_style(addr.row, addr.col, index);
        }
        Ok(())
    }

    fn check_style(&self, index: Option<u32>) -> Result<()> {
        match index {
            Some(idx) if !self.styles.contains(idx) => Err(Error::InvalidStyleIndex(idx)),
            _ => Ok(()),
        }
    }

    // ==================== Rows, columns and merges ====================

    /// Insert a copy of `row` directly below it
    pub fn duplicate_row(&mut self, sheet: usize, row: u32) -> Result<()> {
        self.duplicate_row_to(sheet, row, row.saturating_add(1))
    }

    /// Insert a copy of `row` at `dst`, shifting `dst` and later rows down
    ///
    /// Row indices are 0-based. Merged ranges below the insertion point move
    /// with their rows; merges confined to the source row are repeated.
    pub fn duplicate_row_to(&mut self, sheet: usize, row: u32, dst: u32) -> Result<()> {
        check_row(row)?;
        check_row(dst)?;
        self.check_writable(sheet, "duplicate_row")?;

        let ws = self.sheet_for_write(sheet, "duplicate_row")?;
        ws.cells_mut().shift_rows_down(dst, 1)?;
        let src = if row >= dst { row + 1 } else { row };
        ws.cells_mut().copy_row(src, dst);
        Ok(())
    }

    fn update_row(
        &mut self,
        sheet: usize,
        row: u32,
        operation: &'static str,
        f: impl FnOnce(&mut RowMeta),
    ) -> Result<()> {
        check_row(row)?;
        self.check_writable(sheet, operation)?;
        self.sheet_for_write(sheet, operation)?
            .cells_mut()
            .update_row_meta(row, f);
        Ok(())
    }

    /// Set a custom row height in points, or reset it with `None`
    pub fn set_row_height(&mut self, sheet: usize, row: u32, height: Option<f64>) -> Result<()> {
        if let Some(h) = height {
            if !h.is_finite() || !(0.0..=MAX_ROW_HEIGHT).contains(&h) {
                return Err(Error::InvalidValue(format!(
                    "row height {} outside 0..={}",
                    h, MAX_ROW_HEIGHT
                )));
            }
        }
        self.update_row(sheet, row, "set_row_height", |meta| meta.height = height)
    }

    pub fn set_row_hidden(&mut self, sheet: usize, row: u32, hidden: bool) -> Result<()> {
        self.update_row(sheet, row, "set_row_visible", |meta| meta.hidden = hidden)
    }

    pub fn set_row_outline_level(&mut self, sheet: usize, row: u32, level: u8) -> Result<()> {
        check_outline_level(level)?;
        self.update_row(sheet, row, "set_row_outline_level", |meta| {
            meta.outline_level = level
        })
    }

    /// Set or clear the default style of a row
    pub fn set_row_style(&mut self, sheet: usize, row: u32, style: Option<u32>) -> Result<()> {
        self.check_style(style)?;
        self.update_row(sheet, row, "set_row_style", |meta| meta.style_index = style)
    }

    fn update_columns(
        &mut self,
        sheet: usize,
        min: u16,
        max: u16,
        operation: &'static str,
        f: impl Fn(&mut crate::column::ColumnMeta),
    ) -> Result<()> {
        check_col(min as u32)?;
        check_col(max as u32)?;
        if min > max {
            return Err(Error::InvalidRange(format!(
                "column {} is after column {}",
                min + 1,
                max + 1
            )));
        }
        self.check_writable(sheet, operation)?;
        self.sheet_for_write(sheet, operation)?
            .cells_mut()
            .update_columns(min, max, f);
        Ok(())
    }

    /// Set the width (in characters) of columns `min..=max` (0-based)
    pub fn set_col_width(&mut self, sheet: usize, min: u16, max: u16, width: Option<f64>) -> Result<()> {
        if let Some(w) = width {
            if !w.is_finite() || !(0.0..=MAX_COL_WIDTH).contains(&w) {
                return Err(Error::InvalidValue(format!(
                    "column width {} outside 0..={}",
                    w, MAX_COL_WIDTH
                )));
            }
        }
        self.update_columns(sheet, min, max, "set_col_width", |meta| meta.width = width)
    }

    pub fn set_col_hidden(&mut self, sheet: usize, min: u16, max: u16, hidden: bool) -> Result<()> {
        self.update_columns(sheet, min, max, "set_col_visible", |meta| {
            meta.hidden = hidden
        })
    }

    pub fn set_col_outline_level(&mut self, sheet: usize, min: u16, max: u16, level: u8) -> Result<()> {
        check_outline_level(level)?;
        self.update_columns(sheet, min, max, "set_col_outline_level", |meta| {
            meta.outline_level = level
        })
    }

    pub fn set_col_style(&mut self, sheet: usize, min: u16, max: u16, style: Option<u32>) -> Result<()> {
        self.check_style(style)?;
        self.update_columns(sheet, min, max, "set_col_style", |meta| {
            meta.style_index = style
        })
    }

    /// Merge a range, replacing any merged ranges it overlaps
    pub fn merge_cells(&mut self, sheet: usize, range: CellRange) -> Result<()> {
        check_address(range.end)?;
        if range.cell_count() < 2 {
            return Err(Error::InvalidRange(format!(
                "{} is a single cell",
                range
            )));
        }
        self.check_writable(sheet, "merge_cell")?;
        let cells = self.sheet_for_write(sheet, "merge_cell")?.cells_mut();
        cells.remove_merged_regions_in(&range);
        cells.add_merged_region(range)
    }

    /// Remove merged ranges overlapping `range`; returns how many were removed
    pub fn unmerge_cells(&mut self, sheet: usize, range: CellRange) -> Result<usize> {
        check_address(range.end)?;
        self.check_writable(sheet, "unmerge_cell")?;
        Ok(self
            .sheet_for_write(sheet, "unmerge_cell")?
            .cells_mut()
            .remove_merged_regions_in(&range))
    }

    // ==================== Defined names ====================

    fn check_scope(&self, scope: NameScope) -> Result<()> {
        match scope {
            NameScope::Sheet(id) if self.sheet_index_by_id(id).is_none() => {
                Err(Error::SheetNotFound(format!("sheet id {}", id)))
            }
            _ => Ok(()),
        }
    }

    /// Define a name; an existing (name, scope) pair is overwritten
    pub fn set_defined_name(&mut self, name: &str, scope: NameScope, formula: &str) -> Result<()> {
        self.check_scope(scope)?;
        self.defined_names
            .set(DefinedName::new(name, scope, formula))?;
        Ok(())
    }

    pub fn defined_name(&self, name: &str, scope: NameScope) -> Option<&DefinedName> {
        self.defined_names.get(name, scope)
    }

    /// Look up a name as seen from a sheet (sheet scope first)
    pub fn resolve_name(&self, name: &str, sheet: usize) -> Result<Option<&DefinedName>> {
        let id = self.sheet(sheet)?.id();
        Ok(self.defined_names.resolve(name, id))
    }

    pub fn remove_defined_name(&mut self, name: &str, scope: NameScope) -> Result<DefinedName> {
        self.defined_names
            .remove(name, scope)
            .ok_or_else(|| Error::NameNotFound(name.to_string()))
    }

    pub fn defined_names(&self) -> &DefinedNames {
        &self.defined_names
    }

    pub fn defined_names_mut(&mut self) -> &mut DefinedNames {
        &mut self.defined_names
    }

    // ==================== Tables, settings, properties ====================

    pub fn shared_strings(&self) -> &SharedStringTable {
        &self.shared_strings
    }

    pub fn shared_strings_mut(&mut self) -> &mut SharedStringTable {
        &mut self.shared_strings
    }

    pub fn styles(&self) -> &StyleTable {
        &self.styles
    }

    pub fn styles_mut(&mut self) -> &mut StyleTable {
        &mut self.styles
    }

    pub fn settings(&self) -> &WorkbookSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut WorkbookSettings {
        &mut self.settings
    }

    pub fn date_system(&self) -> DateSystem {
        self.settings.date_system
    }

    pub fn doc_props(&self) -> &DocProperties {
        &self.doc_props
    }

    pub fn set_doc_props(&mut self, props: DocProperties) {
        self.doc_props = props;
    }

    // ==================== Streaming ====================

    /// Hand a sheet to a stream writer
    pub fn begin_stream(&mut self, sheet: usize) -> Result<()> {
        let count = self.sheets.len();
        self.sheets
            .get_mut(sheet)
            .ok_or(Error::SheetOutOfBounds(sheet, count))?
            .begin_stream()
    }

    /// Record that a stream writer finished
    pub fn finish_stream(&mut self, sheet: usize) -> Result<()> {
        let count = self.sheets.len();
        self.sheets
            .get_mut(sheet)
            .ok_or(Error::SheetOutOfBounds(sheet, count))?
            .finish_stream()
    }

    /// Release a sheet held by a stream writer that was not flushed
    pub fn abort_stream(&mut self, sheet: usize) {
        if let Some(ws) = self.sheets.get_mut(sheet) {
            ws.abort_stream();
        }
    }
}

fn check_outline_level(level: u8) -> Result<()> {
    if level > MAX_OUTLINE_LEVEL {
        return Err(Error::InvalidValue(format!(
            "outline level {} above {}",
            level, MAX_OUTLINE_LEVEL
        )));
    }
    Ok(())
}

/// Check that a value can be stored in a cell
pub fn validate_value(value: &CellValue) -> Result<()> {
    match value {
        CellValue::Number(n) if !n.is_finite() => {
            Err(Error::InvalidValue(format!("{} is not a finite number", n)))
        }
        CellValue::String(s) => {
            let len = s.chars().count();
            if len > MAX_CELL_TEXT_LEN {
                return Err(Error::CellTextTooLong(len));
            }
            Ok(())
        }
        CellValue::Formula { text, cached } => {
            let text = text.strip_prefix('=').unwrap_or(text);
            if text.trim().is_empty() {
                return Err(Error::InvalidValue("empty formula".into()));
            }
            if text.chars().count() > MAX_FORMULA_LEN {
                return Err(Error::InvalidValue(format!(
                    "formula longer than {} characters",
                    MAX_FORMULA_LEN
                )));
            }
            match cached.as_deref() {
                Some(CellValue::Formula { .. }) => Err(Error::InvalidValue(
                    "a cached result cannot be a formula".into(),
                )),
                Some(cached) => validate_value(cached),
                None => Ok(()),
            }
        }
        _ => Ok(()),
    }
}
