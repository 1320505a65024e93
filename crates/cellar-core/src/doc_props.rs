//! Document core properties (`docProps/core.xml`)

/// Core properties of a document
///
/// Dates are W3CDTF strings (`2024-01-31T12:00:00Z`) as stored in the file.
/// Saving a modified package stamps `modified` (and `created` when unset).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DocProperties {
    pub title: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub keywords: Option<String>,
    pub description: Option<String>,
    pub last_modified_by: Option<String>,
    pub category: Option<String>,
    pub content_status: Option<String>,
    pub revision: Option<String>,
    pub created: Option<String>,
    pub modified: Option<String>,
}

impl DocProperties {
    /// Check if no property is set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Set `created` and `modified` to a timestamp
    pub fn stamp(&mut self, timestamp: chrono::DateTime<chrono::Utc>) {
        let value = timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        if self.created.is_none() {
            self.created = Some(value.clone());
        }
        self.modified = Some(value);
    }
}
