//! Style table with structural deduplication

use super::{Alignment, BorderStyle, FillStyle, FontStyle, NumberFormat, NumberFormatTable, Style};
use ahash::AHashMap;
use std::hash::{Hash, Hasher};

/// Interned styles of a workbook
///
/// Cells reference styles by index. Index 0 is the default style. Composing
/// an identical descriptor twice returns the same index, so the table grows
/// by at most one entry per distinct style. Styles loaded from a file keep
/// their file order (and duplicates), because unloaded sheets still refer to
/// them by position.
#[derive(Debug, Clone)]
pub struct StyleTable {
    styles: Vec<Style>,
    index: AHashMap<StyleKey, Vec<u32>>,
    number_formats: NumberFormatTable,
}

/// Hash of a style descriptor; collisions are resolved by equality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct StyleKey(u64);

impl StyleKey {
    fn from_style(style: &Style) -> Self {
        let mut hasher = ahash::AHasher::default();
        style.hash(&mut hasher);
        StyleKey(hasher.finish())
    }
}

impl Default for StyleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StyleTable {
    /// Create a table holding only the default style
    pub fn new() -> Self {
        let mut table = Self::empty();
        table.push_loaded(Style::default());
        table
    }

    /// Create a table with no styles, to be filled from a styles part
    pub fn empty() -> Self {
        Self {
            styles: Vec::with_capacity(64),
            index: AHashMap::with_capacity(64),
            number_formats: NumberFormatTable::new(),
        }
    }

    fn lookup(&self, key: StyleKey, style: &Style) -> Option<u32> {
        self.index
            .get(&key)?
            .iter()
            .copied()
            .find(|&idx| self.styles.get(idx as usize) == Some(style))
    }

    fn push(&mut self, key: StyleKey, style: Style) -> u32 {
        let idx = self.styles.len() as u32;
        self.index.entry(key).or_default().push(idx);
        self.styles.push(style);
        idx
    }

    /// Get or create a style, returning its index
    pub fn intern(&mut self, style: Style) -> u32 {
        let mut style = style;
        style.number_format = style.number_format.normalized();
        if let NumberFormat::Custom(code) = &style.number_format {
            self.number_formats.intern(code);
        }

        let key = StyleKey::from_style(&style);
        match self.lookup(key, &style) {
            Some(idx) => idx,
            None => self.push(key, style),
        }
    }

    /// Build a style from its parts and intern it
    pub fn compose(
        &mut self,
        font: FontStyle,
        fill: FillStyle,
        border: BorderStyle,
        alignment: Alignment,
        number_format: NumberFormat,
    ) -> u32 {
        self.intern(Style {
            number_format,
            font,
            fill,
            border,
            alignment,
            ..Style::default()
        })
    }

    /// Append a style read from a file, keeping its position
    pub fn push_loaded(&mut self, style: Style) -> u32 {
        let key = StyleKey::from_style(&style);
        self.push(key, style)
    }

    /// Register a number format code and return its id
    pub fn intern_number_format(&mut self, code: &str) -> u32 {
        self.number_formats.intern(code)
    }

    /// Get a style by index
    pub fn get(&self, index: u32) -> Option<&Style> {
        self.styles.get(index as usize)
    }

    /// Check if an index refers to a style
    pub fn contains(&self, index: u32) -> bool {
        (index as usize) < self.styles.len()
    }

    /// Get the number of styles
    pub fn len(&self) -> usize {
        self.styles.len()
    }

    /// Check if the table has no styles
    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }

    /// Iterate over all styles with their indices
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Style)> {
        self.styles.iter().enumerate().map(|(i, s)| (i as u32, s))
    }

    pub fn number_formats(&self) -> &NumberFormatTable {
        &self.number_formats
    }

    pub fn number_formats_mut(&mut self) -> &mut NumberFormatTable {
        &mut self.number_formats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::{BorderLineStyle, Color};

    #[test]
    fn test_default_style() {
        let table = StyleTable::new();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(0), Some(&Style::default()));
    }

    #[test]
    fn test_deduplication() {
        let mut table = StyleTable::new();

        let idx1 = table.intern(Style::new().bold(true));
        let idx2 = table.intern(Style::new().bold(true));
        let idx3 = table.intern(Style::new().italic(true));

        assert_eq!(idx1, idx2);
        assert_ne!(idx1, idx3);
        assert_eq!(table.len(), 3);
        assert_eq!(table.intern(Style::default()), 0);
    }

    #[test]
    fn test_compose_many_times_grows_once() {
        let mut table = StyleTable::new();
        let before = table.len();
        let indices: Vec<u32> = (0..50)
            .map(|_| {
                table.compose(
                    FontStyle::new().with_bold(true),
                    FillStyle::solid(Color::YELLOW),
                    BorderStyle::all(BorderLineStyle::Thin, Color::BLACK),
                    Alignment::default(),
                    NumberFormat::Custom("0.000".into()),
                )
            })
            .collect();
        assert!(indices.iter().all(|&i| i == indices[0]));
        assert_eq!(table.len(), before + 1);
        assert_eq!(table.number_formats().custom_count(), 1);
    }

    #[test]
    fn test_builtin_code_written_as_custom_dedups() {
        let mut table = StyleTable::new();
        let a = table.intern(Style {
            number_format: NumberFormat::Custom("0.00".into()),
            ..Style::default()
        });
        let b = table.intern(Style {
            number_format: NumberFormat::BuiltIn(2),
            ..Style::default()
        });
        assert_eq!(a, b);
        assert_eq!(table.number_formats().custom_count(), 0);
    }

    #[test]
    fn test_loaded_duplicates_keep_positions() {
        let mut table = StyleTable::empty();
        assert_eq!(table.push_loaded(Style::default()), 0);
        assert_eq!(table.push_loaded(Style::new().bold(true)), 1);
        assert_eq!(table.push_loaded(Style::new().bold(true)), 2);
        assert_eq!(table.intern(Style::new().bold(true)), 1);
        assert_eq!(table.len(), 3);
    }
}
