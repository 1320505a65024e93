//! Cell storage implementation
//!
//! Sparse, row-major storage for one worksheet. Only non-empty cells are
//! stored: `BTreeMap<row, BTreeMap<col, CellData>>`, so iteration is always in
//! ascending row then column order.

use std::collections::{BTreeMap, BTreeSet};

use super::{CellContent, CellRange};
use crate::column::{ColumnMeta, ColumnSpan};
use crate::error::{Error, Result};
use crate::row::RowMeta;
use crate::MAX_ROWS;

/// Complete data for a single cell
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CellData {
    /// What the cell stores
    pub content: CellContent,
    /// Index into the workbook's style table (0 = default style)
    pub style_index: u32,
    /// Attributes of a loaded `<c>` that are not modelled (`ph`, `cm`,
    /// `vm`, ...), written back unchanged
    pub extra_attrs: Vec<(String, String)>,
}

/// Cell attributes that describe the stored value rather than the cell
const VALUE_METADATA_ATTRS: [&str; 2] = ["cm", "vm"];

impl CellData {
    /// Create a new cell with content and default style
    pub fn new(content: CellContent) -> Self {
        Self::with_style(content, 0)
    }

    /// Create a new cell with content and style
    pub fn with_style(content: CellContent, style_index: u32) -> Self {
        Self {
            content,
            style_index,
            extra_attrs: Vec::new(),
        }
    }

    /// Check if this cell is effectively empty (no content and default style)
    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.style_index == 0
    }
}

/// Sparse storage for worksheet cells, row and column settings and merges
#[derive(Debug, Clone, Default)]
pub struct CellStorage {
    rows: BTreeMap<u32, BTreeMap<u16, CellData>>,
    row_meta: BTreeMap<u32, RowMeta>,
    columns: BTreeMap<u16, ColumnMeta>,
    merged_regions: Vec<CellRange>,
}

impl CellStorage {
    /// Create a new empty cell storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cell
    pub fn get(&self, row: u32, col: u16) -> Option<&CellData> {
        self.rows.get(&row).and_then(|r| r.get(&col))
    }

    /// Get a mutable cell
    pub fn get_mut(&mut self, row: u32, col: u16) -> Option<&mut CellData> {
        self.rows.get_mut(&row).and_then(|r| r.get_mut(&col))
    }

    /// Store a cell
    ///
    /// If the cell data is empty (no content, default style), the cell is removed.
    pub fn set(&mut self, row: u32, col: u16, data: CellData) {
        if data.is_empty() {
            self.remove(row, col);
        } else {
            self.rows.entry(row).or_default().insert(col, data);
        }
    }

    /// Replace just the cell content, preserving the style
    ///
    /// Cell and value metadata references (`cm`, `vm`) belong to the old
    /// value and are dropped; other kept attributes stay.
    pub fn set_content(&mut self, row: u32, col: u16, content: CellContent) {
        let data = match self.get(row, col) {
            Some(old) => CellData {
                content,
                style_index: old.style_index,
                extra_attrs: old
                    .extra_attrs
                    .iter()
                    .filter(|(key, _)| !VALUE_METADATA_ATTRS.contains(&key.as_str()))
                    .cloned()
                    .collect(),
            },
            None => CellData::new(content),
        };
        self.set(row, col, data);
    }

    /// Replace just the cell style, preserving the content
    pub fn set_style(&mut self, row: u32, col: u16, style_index: u32) {
        let mut data = self.get(row, col).cloned().unwrap_or_default();
        data.style_index = style_index;
        self.set(row, col, data);
    }

    /// Remove a cell
    pub fn remove(&mut self, row: u32, col: u16) -> Option<CellData> {
        let row_map = self.rows.get_mut(&row)?;
        let removed = row_map.remove(&col);
        if row_map.is_empty() {
            self.rows.remove(&row);
        }
        removed
    }

    /// Clear cells, row and column settings and merges
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Get the number of stored cells
    pub fn cell_count(&self) -> usize {
        self.rows.values().map(|r| r.len()).sum()
    }

    /// Check if no cells are stored
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Bounds of stored cells as (min_row, min_col, max_row, max_col)
    pub fn used_bounds(&self) -> Option<(u32, u16, u32, u16)> {
        let min_row = *self.rows.keys().next()?;
        let max_row = *self.rows.keys().next_back()?;

        let mut min_col = u16::MAX;
        let mut max_col = 0u16;
        for cols in self.rows.values() {
            if let Some(&col) = cols.keys().next() {
                min_col = min_col.min(col);
            }
            if let Some(&col) = cols.keys().next_back() {
                max_col = max_col.max(col);
            }
        }

        Some((min_row, min_col, max_row, max_col))
    }

    /// Iterate over all cells in row order
    pub fn iter(&self) -> impl Iterator<Item = (u32, u16, &CellData)> {
        self.rows
            .iter()
            .flat_map(|(&row, cols)| cols.iter().map(move |(&col, data)| (row, col, data)))
    }

    /// Iterate over cells in a specific row
    pub fn iter_row(&self, row: u32) -> impl Iterator<Item = (u16, &CellData)> {
        self.rows
            .get(&row)
            .into_iter()
            .flat_map(|cols| cols.iter().map(|(&col, data)| (col, data)))
    }

    /// Iterate over row indices that have cells
    pub fn row_indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.rows.keys().copied()
    }

    /// Rows that have cells or custom settings, ascending
    pub fn occupied_rows(&self) -> Vec<u32> {
        let rows: BTreeSet<u32> = self
            .rows
            .keys()
            .chain(self.row_meta.keys())
            .copied()
            .collect();
        rows.into_iter().collect()
    }

    /// Settings of a row, if it has any
    pub fn row_meta(&self, row: u32) -> Option<&RowMeta> {
        self.row_meta.get(&row)
    }

    /// Replace the settings of a row; default settings are not stored
    pub fn set_row_meta(&mut self, row: u32, meta: RowMeta) {
        if meta.has_custom_settings() {
            self.row_meta.insert(row, meta);
        } else {
            self.row_meta.remove(&row);
        }
    }

    /// Update the settings of a row in place
    pub fn update_row_meta(&mut self, row: u32, f: impl FnOnce(&mut RowMeta)) {
        let mut meta = self.row_meta.get(&row).cloned().unwrap_or_default();
        f(&mut meta);
        self.set_row_meta(row, meta);
    }

    /// Settings of a column, if it has any
    pub fn column_meta(&self, col: u16) -> Option<&ColumnMeta> {
        self.columns.get(&col)
    }

    /// Update the settings of a column range in place
    pub fn update_columns(&mut self, min: u16, max: u16, f: impl Fn(&mut ColumnMeta)) {
        for col in min..=max {
            let mut meta = self.columns.get(&col).cloned().unwrap_or_default();
            f(&mut meta);
            if meta.has_custom_settings() {
                self.columns.insert(col, meta);
            } else {
                self.columns.remove(&col);
            }
        }
    }

    /// Install `<col>` spans read from a file
    pub fn set_column_spans(&mut self, spans: Vec<ColumnSpan>) {
        for span in spans {
            for col in span.min..=span.max {
                self.columns.insert(col, span.meta.clone());
            }
        }
    }

    /// Column settings collapsed into spans for writing
    pub fn column_spans(&self) -> Vec<ColumnSpan> {
        ColumnSpan::collapse(&self.columns)
    }

    /// Get merged regions
    pub fn merged_regions(&self) -> &[CellRange] {
        &self.merged_regions
    }

    /// Add a merged region; it must not overlap an existing one
    pub fn add_merged_region(&mut self, range: CellRange) -> Result<()> {
        if let Some(existing) = self.merged_regions.iter().find(|r| r.overlaps(&range)) {
            return Err(Error::InvalidRange(format!(
                "{} overlaps merged region {}",
                range, existing
            )));
        }
        self.merged_regions.push(range);
        Ok(())
    }

    /// Remove every merged region that overlaps `range`
    pub fn remove_merged_regions_in(&mut self, range: &CellRange) -> usize {
        let before = self.merged_regions.len();
        self.merged_regions.retain(|r| !r.overlaps(range));
        before - self.merged_regions.len()
    }

    /// Check if a cell is part of a merged region
    pub fn is_merged(&self, row: u32, col: u16) -> bool {
        let addr = super::CellAddress::new(row, col);
        self.merged_regions.iter().any(|r| r.contains(&addr))
    }

    /// Move every row at or below `from` down by `by` rows
    ///
    /// Fails without changing anything if a stored row would leave the sheet.
    pub fn shift_rows_down(&mut self, from: u32, by: u32) -> Result<()> {
        let last = self
            .rows
            .keys()
            .chain(self.row_meta.keys())
            .copied()
            .filter(|&r| r >= from)
            .max();
        if let Some(last) = last {
            if last as u64 + by as u64 >= MAX_ROWS as u64 {
                return Err(Error::RowOutOfBounds(
                    last.saturating_add(by).saturating_add(1),
                    MAX_ROWS,
                ));
            }
        }

        let moved = self.rows.split_off(&from);
        self.rows
            .extend(moved.into_iter().map(|(row, cols)| (row + by, cols)));
        let moved = self.row_meta.split_off(&from);
        self.row_meta
            .extend(moved.into_iter().map(|(row, meta)| (row + by, meta)));

        for region in &mut self.merged_regions {
            if region.start.row >= from {
                region.start.row += by;
                region.end.row += by;
            } else if region.end.row >= from {
                region.end.row += by;
            }
        }
        Ok(())
    }

    /// Overwrite row `dst` with a copy of row `src` (cells and settings)
    pub fn copy_row(&mut self, src: u32, dst: u32) {
        if src == dst {
            return;
        }
        match self.rows.get(&src).cloned() {
            Some(cols) => {
                self.rows.insert(dst, cols);
            }
            None => {
                self.rows.remove(&dst);
            }
        }
        match self.row_meta.get(&src).cloned() {
            Some(meta) => {
                self.row_meta.insert(dst, meta);
            }
            None => {
                self.row_meta.remove(&dst);
            }
        }

        // Merges that sit entirely on the source row are repeated on the copy
        let copies: Vec<CellRange> = self
            .merged_regions
            .iter()
            .filter(|r| r.start.row == src && r.end.row == src)
            .map(|r| CellRange::from_indices(dst, r.start.col, dst, r.end.col))
            .collect();
        for copy in copies {
            self.merged_regions.retain(|r| !r.overlaps(&copy));
            self.merged_regions.push(copy);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn number(n: f64) -> CellData {
        CellData::new(CellContent::Number(n))
    }

    #[test]
    fn test_basic_operations() {
        let mut storage = CellStorage::new();
        storage.set(0, 0, number(42.0));
        assert_eq!(storage.get(0, 0), Some(&number(42.0)));
        assert!(storage.get(1, 1).is_none());
    }

    #[test]
    fn test_empty_cells_not_stored() {
        let mut storage = CellStorage::new();
        storage.set(0, 0, number(42.0));
        assert_eq!(storage.cell_count(), 1);

        storage.set(0, 0, CellData::default());
        assert_eq!(storage.cell_count(), 0);
        assert!(storage.is_empty());
    }

    #[test]
    fn test_set_content_keeps_style() {
        let mut storage = CellStorage::new();
        storage.set_style(2, 2, 5);
        storage.set_content(2, 2, CellContent::Boolean(true));
        assert_eq!(
            storage.get(2, 2),
            Some(&CellData::with_style(CellContent::Boolean(true), 5))
        );

        storage.set_style(2, 2, 0);
        storage.set_content(2, 2, CellContent::Empty);
        assert!(storage.get(2, 2).is_none());
    }

    #[test]
    fn test_set_content_drops_value_metadata() {
        let mut storage = CellStorage::new();
        let mut data = number(1.0);
        data.extra_attrs = vec![
            ("ph".to_string(), "1".to_string()),
            ("cm".to_string(), "1".to_string()),
            ("vm".to_string(), "2".to_string()),
        ];
        storage.set(0, 0, data);

        storage.set_style(0, 0, 3);
        assert_eq!(storage.get(0, 0).unwrap().extra_attrs.len(), 3);

        storage.set_content(0, 0, CellContent::Number(2.0));
        assert_eq!(
            storage.get(0, 0).unwrap().extra_attrs,
            vec![("ph".to_string(), "1".to_string())]
        );
    }

    #[test]
    fn test_used_bounds() {
        let mut storage = CellStorage::new();
        assert!(storage.used_bounds().is_none());

        storage.set(5, 3, number(1.0));
        storage.set(10, 7, number(2.0));
        storage.set(2, 1, number(3.0));
        assert_eq!(storage.used_bounds(), Some((2, 1, 10, 7)));
    }

    #[test]
    fn test_iteration_is_row_major() {
        let mut storage = CellStorage::new();
        storage.set(1, 0, number(3.0));
        storage.set(0, 1, number(2.0));
        storage.set(0, 0, number(1.0));

        let order: Vec<_> = storage.iter().map(|(r, c, _)| (r, c)).collect();
        assert_eq!(order, vec![(0, 0), (0, 1), (1, 0)]);
    }

    #[test]
    fn test_occupied_rows_include_settings() {
        let mut storage = CellStorage::new();
        storage.set(4, 0, number(1.0));
        storage.update_row_meta(1, |m| m.hidden = true);
        storage.update_row_meta(9, |m| m.height = None);
        assert_eq!(storage.occupied_rows(), vec![1, 4]);
    }

    #[test]
    fn test_merged_regions_reject_overlap() {
        let mut storage = CellStorage::new();
        storage
            .add_merged_region(CellRange::parse("A1:B2").unwrap())
            .unwrap();
        assert!(storage
            .add_merged_region(CellRange::parse("B2:C3").unwrap())
            .is_err());
        assert!(storage.is_merged(1, 1));
        assert_eq!(
            storage.remove_merged_regions_in(&CellRange::parse("A1").unwrap()),
            1
        );
    }

    #[test]
    fn test_shift_rows_down_moves_cells_and_merges() {
        let mut storage = CellStorage::new();
        storage.set(0, 0, number(1.0));
        storage.set(1, 0, number(2.0));
        storage
            .add_merged_region(CellRange::parse("B2:C2").unwrap())
            .unwrap();

        storage.shift_rows_down(1, 2).unwrap();
        assert_eq!(storage.get(0, 0), Some(&number(1.0)));
        assert!(storage.get(1, 0).is_none());
        assert_eq!(storage.get(3, 0), Some(&number(2.0)));
        assert_eq!(storage.merged_regions()[0].to_a1_string(), "B4:C4");
    }

    #[test]
    fn test_shift_rows_down_fails_at_sheet_end() {
        let mut storage = CellStorage::new();
        storage.set(MAX_ROWS - 1, 0, number(1.0));
        assert!(storage.shift_rows_down(0, 1).is_err());
        assert_eq!(storage.get(MAX_ROWS - 1, 0), Some(&number(1.0)));
    }

    #[test]
    fn test_copy_row() {
        let mut storage = CellStorage::new();
        storage.set(0, 0, number(1.0));
        storage.update_row_meta(0, |m| m.height = Some(30.0));
        storage.set(2, 5, number(9.0));

        storage.copy_row(0, 2);
        assert_eq!(storage.get(2, 0), Some(&number(1.0)));
        assert!(storage.get(2, 5).is_none());
        assert_eq!(storage.row_meta(2).and_then(|m| m.height), Some(30.0));
    }
}
