//! Shared strings table

use std::collections::BTreeMap;
use std::sync::Arc;

use ahash::AHashMap;

/// Interned cell text, referenced by index from cells
///
/// The table is append-only. Interning returns the first index holding the
/// same text. Tables read from a file may contain duplicates; they are kept
/// so that indices in not-yet-loaded sheets still point at the right entry.
#[derive(Debug, Clone, Default)]
pub struct SharedStringTable {
    strings: Vec<Arc<str>>,
    index: AHashMap<Arc<str>, u32>,
    /// Original `<si>` markup of rich-text entries, by index
    rich: BTreeMap<u32, Arc<str>>,
}

impl SharedStringTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `text`, adding it if it is not in the table yet
    pub fn intern(&mut self, text: &str) -> u32 {
        if let Some(&idx) = self.index.get(text) {
            return idx;
        }
        self.push_loaded(text)
    }

    /// Append an entry read from a file, keeping its position
    pub fn push_loaded(&mut self, text: &str) -> u32 {
        let idx = self.strings.len() as u32;
        let text: Arc<str> = Arc::from(text);
        self.index.entry(text.clone()).or_insert(idx);
        self.strings.push(text);
        idx
    }

    /// Append a rich-text entry with its plain text and original markup
    pub fn push_loaded_rich(&mut self, text: &str, markup: &str) -> u32 {
        let idx = self.push_loaded(text);
        self.rich.insert(idx, Arc::from(markup));
        idx
    }

    pub fn get(&self, index: u32) -> Option<&str> {
        self.strings.get(index as usize).map(|s| &**s)
    }

    /// Original markup of a rich-text entry
    pub fn rich_markup(&self, index: u32) -> Option<&str> {
        self.rich.get(&index).map(|s| &**s)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.strings
            .iter()
            .enumerate()
            .map(|(i, s)| (i as u32, &**s))
    }

    /// All entries in index order
    pub fn entries(&self) -> &[Arc<str>] {
        &self.strings
    }

    /// Number of distinct strings
    pub fn unique_count(&self) -> usize {
        self.index.len()
    }

    /// Cheap read-only copy for readers that must not hold the workbook
    pub fn snapshot(&self) -> Arc<[Arc<str>]> {
        self.strings.iter().cloned().collect()
    }
}
