//! Row metadata

/// Per-row settings that are independent of the cells in the row
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowMeta {
    /// Custom height in points (None = sheet default)
    pub height: Option<f64>,
    /// Row is hidden
    pub hidden: bool,
    /// Outline/grouping level (0-7)
    pub outline_level: u8,
    /// Row-level style index (None = no row style)
    pub style_index: Option<u32>,
    /// Row is collapsed (in outline)
    pub collapsed: bool,
    /// Attributes of a loaded `<row>` that are not modelled (`spans`,
    /// `thickBot`, `x14ac:dyDescent`, ...), written back unchanged
    pub extra_attrs: Vec<(String, String)>,
}

impl RowMeta {
    /// Check if this row has any custom settings
    pub fn has_custom_settings(&self) -> bool {
        self.height.is_some()
            || self.hidden
            || self.outline_level > 0
            || self.style_index.is_some()
            || self.collapsed
            || !self.extra_attrs.is_empty()
    }
}
