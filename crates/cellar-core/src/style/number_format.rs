//! Number formats and the number-format registry
//!
//! Ids 0-163 are reserved for built-in formats. Custom format codes are
//! assigned ids from 164 upwards and deduplicated by exact string match.

use std::collections::BTreeMap;

use ahash::AHashMap;
use once_cell::sync::Lazy;
use regex::Regex;

/// First id available to custom number formats
pub const FIRST_CUSTOM_ID: u32 = 164;

/// Number format of a cell style
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NumberFormat {
    /// General format (id 0)
    #[default]
    General,

    /// Built-in format by id (1-163)
    BuiltIn(u32),

    /// Custom format code
    Custom(String),
}

static BUILTIN_CODES: &[(u32, &str)] = &[
    (0, "General"),
    (1, "0"),
    (2, "0.00"),
    (3, "#,##0"),
    (4, "#,##0.00"),
    (9, "0%"),
    (10, "0.00%"),
    (11, "0.00E+00"),
    (12, "# ?/?"),
    (13, "# ??/??"),
    (14, "mm-dd-yy"),
    (15, "d-mmm-yy"),
    (16, "d-mmm"),
    (17, "mmm-yy"),
    (18, "h:mm AM/PM"),
    (19, "h:mm:ss AM/PM"),
    (20, "h:mm"),
    (21, "h:mm:ss"),
    (22, "m/d/yy h:mm"),
    (37, "#,##0 ;(#,##0)"),
    (38, "#,##0 ;[Red](#,##0)"),
    (39, "#,##0.00;(#,##0.00)"),
    (40, "#,##0.00;[Red](#,##0.00)"),
    (41, r#"_(* #,##0_);_(* \(#,##0\);_(* "-"_);_(@_)"#),
    (42, r#"_("$"* #,##0_);_("$"* \(#,##0\);_("$"* "-"_);_(@_)"#),
    (43, r#"_(* #,##0.00_);_(* \(#,##0.00\);_(* "-"??_);_(@_)"#),
    (44, r#"_("$"* #,##0.00_);_("$"* \(#,##0.00\);_("$"* "-"??_);_(@_)"#),
    (45, "mm:ss"),
    (46, "[h]:mm:ss"),
    (47, "mmss.0"),
    (48, "##0.0E+0"),
    (49, "@"),
];

/// Literal text, escapes, padding and fill characters never affect the format class
static LITERALS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""[^"]*"|\\.|_.|\*."#).expect("valid literal pattern"));
static ELAPSED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[(h+|m+|s+)\]").expect("valid elapsed pattern"));
static BRACKETS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\]]*\]").expect("valid bracket pattern"));
static DATE_TOKENS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[dmyhs]").expect("valid date token pattern"));

impl NumberFormat {
    pub const ID_GENERAL: u32 = 0;
    pub const ID_DATE_SHORT: u32 = 14;
    pub const ID_DATETIME: u32 = 22;
    pub const ID_TEXT: u32 = 49;

    /// Built-in format code for an id, if the id has a locale-independent code
    pub fn builtin_code(id: u32) -> Option<&'static str> {
        BUILTIN_CODES
            .iter()
            .find(|(builtin, _)| *builtin == id)
            .map(|(_, code)| *code)
    }

    /// Built-in id whose code is exactly `code`
    pub fn builtin_id(code: &str) -> Option<u32> {
        BUILTIN_CODES
            .iter()
            .find(|(_, builtin)| *builtin == code)
            .map(|(id, _)| *id)
    }

    /// Canonical form: built-in codes written as custom collapse to their id
    pub fn normalized(self) -> Self {
        match self {
            NumberFormat::BuiltIn(0) => NumberFormat::General,
            NumberFormat::Custom(code) => match Self::builtin_id(&code) {
                Some(0) => NumberFormat::General,
                Some(id) => NumberFormat::BuiltIn(id),
                None => NumberFormat::Custom(code),
            },
            other => other,
        }
    }

    /// Format code; reserved built-in ids without a fixed code read as "General"
    pub fn format_code(&self) -> &str {
        match self {
            NumberFormat::General => "General",
            NumberFormat::BuiltIn(id) => Self::builtin_code(*id).unwrap_or("General"),
            NumberFormat::Custom(code) => code,
        }
    }

    /// Check if values with this format are dates or times
    pub fn is_date_format(&self) -> bool {
        match self {
            NumberFormat::General => false,
            NumberFormat::BuiltIn(id) => {
                matches!(id, 14..=22 | 27..=36 | 45..=47 | 50..=58)
            }
            NumberFormat::Custom(code) => is_date_code(code),
        }
    }
}

fn is_date_code(code: &str) -> bool {
    let stripped = LITERALS.replace_all(code, "");
    if ELAPSED.is_match(&stripped) {
        return true;
    }
    let stripped = BRACKETS.replace_all(&stripped, "");
    DATE_TOKENS.is_match(&stripped)
}

/// Registry of number formats used by a workbook's styles
#[derive(Debug, Clone)]
pub struct NumberFormatTable {
    custom: BTreeMap<u32, String>,
    by_code: AHashMap<String, u32>,
    next_id: u32,
}

impl Default for NumberFormatTable {
    fn default() -> Self {
        Self {
            custom: BTreeMap::new(),
            by_code: AHashMap::new(),
            next_id: FIRST_CUSTOM_ID,
        }
    }
}

impl NumberFormatTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for a format code, registering it as a custom format if needed
    pub fn intern(&mut self, code: &str) -> u32 {
        if let Some(id) = NumberFormat::builtin_id(code) {
            return id;
        }
        if let Some(&id) = self.by_code.get(code) {
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.custom.insert(id, code.to_string());
        self.by_code.insert(code.to_string(), id);
        id
    }

    /// Register a `<numFmt>` read from a styles part, keeping its id
    pub fn insert_loaded(&mut self, id: u32, code: &str) {
        self.custom.insert(id, code.to_string());
        self.by_code.entry(code.to_string()).or_insert(id);
        if id >= self.next_id {
            self.next_id = id + 1;
        }
    }

    /// Id of a format that is already registered
    pub fn id_of(&self, format: &NumberFormat) -> Option<u32> {
        match format {
            NumberFormat::General => Some(0),
            NumberFormat::BuiltIn(id) => Some(*id),
            NumberFormat::Custom(code) => self.by_code.get(code.as_str()).copied(),
        }
    }

    /// Format referenced by a `numFmtId` attribute
    pub fn resolve(&self, id: u32) -> NumberFormat {
        match self.custom.get(&id) {
            Some(code) => NumberFormat::Custom(code.clone()),
            None if id == 0 => NumberFormat::General,
            None => NumberFormat::BuiltIn(id),
        }
    }

    /// Format code for an id
    pub fn code(&self, id: u32) -> Option<&str> {
        self.custom
            .get(&id)
            .map(String::as_str)
            .or_else(|| NumberFormat::builtin_code(id))
    }

    /// Custom formats in id order
    pub fn custom_formats(&self) -> impl Iterator<Item = (u32, &str)> {
        self.custom.iter().map(|(id, code)| (*id, code.as_str()))
    }

    /// Number of custom formats
    pub fn custom_count(&self) -> usize {
        self.custom.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_codes_map_to_reserved_ids() {
        let mut table = NumberFormatTable::new();
        assert_eq!(table.intern("General"), 0);
        assert_eq!(table.intern("0.00%"), 10);
        assert_eq!(table.intern("[h]:mm:ss"), 46);
        assert_eq!(table.custom_count(), 0);
    }

    #[test]
    fn test_custom_codes_dedup_from_164() {
        let mut table = NumberFormatTable::new();
        let a = table.intern("0.000");
        let b = table.intern("yyyy-mm-dd");
        assert_eq!((a, b), (164, 165));
        assert_eq!(table.intern("0.000"), 164);
        assert_eq!(table.code(165), Some("yyyy-mm-dd"));
        assert_eq!(table.custom_count(), 2);
    }

    #[test]
    fn test_loaded_ids_are_kept() {
        let mut table = NumberFormatTable::new();
        table.insert_loaded(170, "0.0");
        assert_eq!(table.intern("0.0"), 170);
        assert_eq!(table.intern("0.00000"), 171);
        assert_eq!(table.resolve(170), NumberFormat::Custom("0.0".into()));
        assert_eq!(table.resolve(14), NumberFormat::BuiltIn(14));
        assert_eq!(table.resolve(0), NumberFormat::General);
    }

    #[test]
    fn test_normalized() {
        assert_eq!(
            NumberFormat::Custom("0%".into()).normalized(),
            NumberFormat::BuiltIn(9)
        );
        assert_eq!(
            NumberFormat::Custom("General".into()).normalized(),
            NumberFormat::General
        );
        assert_eq!(
            NumberFormat::Custom("0.0".into()).normalized(),
            NumberFormat::Custom("0.0".into())
        );
    }

    #[test]
    fn test_is_date_format() {
        assert!(NumberFormat::BuiltIn(14).is_date_format());
        assert!(!NumberFormat::BuiltIn(4).is_date_format());
        assert!(NumberFormat::Custom("yyyy-mm-dd".into()).is_date_format());
        assert!(NumberFormat::Custom("[h]:mm".into()).is_date_format());
        assert!(NumberFormat::Custom("[$-409]d-mmm".into()).is_date_format());
        assert!(!NumberFormat::Custom("[Red]0.00".into()).is_date_format());
        assert!(!NumberFormat::Custom("0 \"days\"".into()).is_date_format());
        assert!(!NumberFormat::Custom("0.00E+00".into()).is_date_format());
    }
}
