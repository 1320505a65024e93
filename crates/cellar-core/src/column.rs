//! Column metadata

use std::collections::BTreeMap;

/// Per-column settings
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnMeta {
    /// Custom width in characters (None = default)
    pub width: Option<f64>,
    /// Column is hidden
    pub hidden: bool,
    /// Outline/grouping level (0-7)
    pub outline_level: u8,
    /// Column-level style index (None = no column style)
    pub style_index: Option<u32>,
    /// Column is collapsed (in outline)
    pub collapsed: bool,
    /// Best fit (auto-sized)
    pub best_fit: bool,
}

impl ColumnMeta {
    /// Check if this column has any custom settings
    pub fn has_custom_settings(&self) -> bool {
        self.width.is_some()
            || self.hidden
            || self.outline_level > 0
            || self.style_index.is_some()
            || self.collapsed
            || self.best_fit
    }
}

/// A run of adjacent columns sharing the same settings (the `<col>` element)
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpan {
    /// First column (0-based)
    pub min: u16,
    /// Last column (0-based, inclusive)
    pub max: u16,
    pub meta: ColumnMeta,
}

impl ColumnSpan {
    /// Collapse per-column settings into the minimal list of spans
    pub fn collapse(columns: &BTreeMap<u16, ColumnMeta>) -> Vec<ColumnSpan> {
        let mut spans: Vec<ColumnSpan> = Vec::new();
        for (&col, meta) in columns {
            match spans.last_mut() {
                Some(last) if last.max + 1 == col && last.meta == *meta => last.max = col,
                _ => spans.push(ColumnSpan {
                    min: col,
                    max: col,
                    meta: meta.clone(),
                }),
            }
        }
        spans
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_merges_adjacent_equal_columns() {
        let wide = ColumnMeta {
            width: Some(20.0),
            ..Default::default()
        };
        let hidden = ColumnMeta {
            hidden: true,
            ..Default::default()
        };
        let mut columns = BTreeMap::new();
        columns.insert(0, wide.clone());
        columns.insert(1, wide.clone());
        columns.insert(2, hidden);
        columns.insert(4, wide);

        let spans = ColumnSpan::collapse(&columns);
        let bounds: Vec<_> = spans.iter().map(|s| (s.min, s.max)).collect();
        assert_eq!(bounds, vec![(0, 1), (2, 2), (4, 4)]);
    }
}
