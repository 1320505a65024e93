//! Defined names
//!
//! A defined name maps an identifier to a formula or reference, either for
//! the whole workbook or for a single sheet. Names are case-insensitive and a
//! sheet-scoped name shadows a workbook-scoped one of the same name.

use std::collections::BTreeMap;

use crate::cell::CellAddress;
use crate::error::{Error, Result};

/// Scope of a defined name
///
/// Sheet scopes hold the sheet's stable id, not its position, so reordering
/// or removing other sheets never re-targets a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NameScope {
    /// Visible from every sheet
    Workbook,
    /// Visible only from the sheet with this id
    Sheet(u32),
}

/// A defined name
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DefinedName {
    /// Name as written by the user (case preserved)
    pub name: String,
    pub scope: NameScope,
    /// Formula or reference, without a leading `=`
    pub formula: String,
    pub comment: Option<String>,
    pub hidden: bool,
}

impl DefinedName {
    /// Create a name; a leading `=` on the formula is stripped
    pub fn new(name: impl Into<String>, scope: NameScope, formula: impl AsRef<str>) -> Self {
        let formula = formula.as_ref();
        Self {
            name: name.into(),
            scope,
            formula: formula.strip_prefix('=').unwrap_or(formula).to_string(),
            comment: None,
            hidden: false,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    /// Check if the name is one of the reserved `_xlnm.` names (print area, filters)
    pub fn is_builtin(&self) -> bool {
        self.name.len() > 6
            && self
                .name
                .get(..6)
                .map_or(false, |prefix| prefix.eq_ignore_ascii_case("_xlnm."))
    }
}

/// Validate a user-supplied defined name
///
/// Names start with a letter, `_` or `\`, continue with letters, digits,
/// `_`, `.`, `\` or `?`, and must not look like a cell reference.
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = |why: &str| Error::InvalidName(format!("'{}': {}", name, why));

    let mut chars = name.chars();
    let first = chars.next().ok_or_else(|| invalid("name is empty"))?;
    if name.chars().count() > 255 {
        return Err(invalid("longer than 255 characters"));
    }
    if !(first.is_alphabetic() || first == '_' || first == '\\') {
        return Err(invalid("must start with a letter, '_' or '\\'"));
    }
    if let Some(c) = chars.find(|&c| !(c.is_alphanumeric() || matches!(c, '_' | '.' | '\\' | '?'))) {
        return Err(invalid(&format!("contains '{}'", c)));
    }
    if name.eq_ignore_ascii_case("r") || name.eq_ignore_ascii_case("c") {
        return Err(invalid("reserved"));
    }
    if CellAddress::parse(name).is_ok() || is_r1c1_reference(name) {
        return Err(invalid("looks like a cell reference"));
    }
    Ok(())
}

fn is_r1c1_reference(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    let Some(rest) = upper.strip_prefix('R') else {
        return false;
    };
    let digits = rest.trim_start_matches(|c: char| c.is_ascii_digit());
    match digits.strip_prefix('C') {
        Some(cols) => cols.chars().all(|c| c.is_ascii_digit()),
        None => digits.is_empty() && !rest.is_empty(),
    }
}

type NameKey = (String, NameScope);

fn key(name: &str, scope: NameScope) -> NameKey {
    (name.to_lowercase(), scope)
}

/// Collection of defined names, ordered by name then scope
#[derive(Debug, Clone, Default)]
pub struct DefinedNames {
    names: BTreeMap<NameKey, DefinedName>,
}

impl DefinedNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a name, replacing any existing name with the same (name, scope)
    pub fn set(&mut self, name: DefinedName) -> Result<Option<DefinedName>> {
        if !name.is_builtin() {
            validate_name(&name.name)?;
        }
        Ok(self.insert_loaded(name))
    }

    /// Insert a name read from a file without validating it
    pub fn insert_loaded(&mut self, name: DefinedName) -> Option<DefinedName> {
        self.names.insert(key(&name.name, name.scope), name)
    }

    /// Get a name with an exact scope
    pub fn get(&self, name: &str, scope: NameScope) -> Option<&DefinedName> {
        self.names.get(&key(name, scope))
    }

    /// Look a name up from a sheet: its own scope first, then the workbook
    pub fn resolve(&self, name: &str, sheet_id: u32) -> Option<&DefinedName> {
        self.get(name, NameScope::Sheet(sheet_id))
            .or_else(|| self.get(name, NameScope::Workbook))
    }

    pub fn remove(&mut self, name: &str, scope: NameScope) -> Option<DefinedName> {
        self.names.remove(&key(name, scope))
    }

    pub fn contains(&self, name: &str, scope: NameScope) -> bool {
        self.names.contains_key(&key(name, scope))
    }

    pub fn iter(&self) -> impl Iterator<Item = &DefinedName> {
        self.names.values()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Remove names scoped to a sheet or whose formula refers to it
    pub fn prune_sheet(&mut self, sheet_id: u32, sheet_name: &str) -> Vec<DefinedName> {
        let doomed: Vec<NameKey> = self
            .names
            .iter()
            .filter(|(_, n)| {
                n.scope == NameScope::Sheet(sheet_id)
                    || formula_references_sheet(&n.formula, sheet_name)
            })
            .map(|(k, _)| k.clone())
            .collect();
        doomed
            .into_iter()
            .filter_map(|k| self.names.remove(&k))
            .collect()
    }

    /// Rewrite sheet references after a rename; returns how many names changed
    pub fn rename_sheet(&mut self, old: &str, new: &str) -> usize {
        let mut changed = 0;
        for name in self.names.values_mut() {
            if let Some(rewritten) = rename_sheet_in_formula(&name.formula, old, new) {
                name.formula = rewritten;
                changed += 1;
            }
        }
        changed
    }
}

/// A `Sheet!` (or `Sheet1:Sheet3!`) prefix found in a formula
#[derive(Debug, PartialEq)]
struct SheetPrefix {
    /// Byte span of the prefix, without the `!`
    start: usize,
    end: usize,
    sheets: Vec<String>,
}

fn is_unquoted_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | ':')
}

/// Find every sheet prefix in a formula, skipping string literals and
/// references into external workbooks (`[1]Sheet1!A1`)
fn sheet_prefixes(formula: &str) -> Vec<SheetPrefix> {
    let bytes = formula.as_bytes();
    let mut found = Vec::new();
    let mut chars = formula.char_indices().peekable();
    let mut prev: Option<char> = None;

    while let Some((start, c)) = chars.next() {
        match c {
            '"' => {
                // Literal; "" is an escaped quote
                while let Some((_, c)) = chars.next() {
                    if c == '"' {
                        if chars.peek().map(|&(_, c)| c) == Some('"') {
                            chars.next();
                        } else {
                            break;
                        }
                    }
                }
                prev = Some('"');
            }
            '\'' => {
                let mut name = String::new();
                let mut end = formula.len();
                while let Some((i, c)) = chars.next() {
                    if c == '\'' {
                        if chars.peek().map(|&(_, c)| c) == Some('\'') {
                            chars.next();
                            name.push('\'');
                        } else {
                            end = i + 1;
                            break;
                        }
                    } else {
                        name.push(c);
                    }
                }
                let external = name.starts_with('[') || prev == Some(']');
                if bytes.get(end) == Some(&b'!') && !external {
                    found.push(SheetPrefix {
                        start,
                        end,
                        sheets: name.split(':').map(str::to_string).collect(),
                    });
                }
                prev = Some('\'');
            }
            c if is_unquoted_name_char(c) => {
                let mut end = start + c.len_utf8();
                while let Some(&(i, c)) = chars.peek() {
                    if !is_unquoted_name_char(c) {
                        break;
                    }
                    end = i + c.len_utf8();
                    chars.next();
                }
                if bytes.get(end) == Some(&b'!') && prev != Some(']') {
                    found.push(SheetPrefix {
                        start,
                        end,
                        sheets: formula[start..end].split(':').map(str::to_string).collect(),
                    });
                }
                prev = formula[..end].chars().next_back();
            }
            c => prev = Some(c),
        }
    }
    found
}

fn same_sheet(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Check if a formula refers to a sheet by name
pub fn formula_references_sheet(formula: &str, sheet: &str) -> bool {
    sheet_prefixes(formula)
        .iter()
        .any(|p| p.sheets.iter().any(|s| same_sheet(s, sheet)))
}

/// Quote a sheet name for use in a formula, if it needs quoting
pub fn quote_sheet_name(name: &str) -> String {
    let plain = name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && CellAddress::parse(name).is_err()
        && !is_r1c1_reference(name);
    if plain {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}

/// Rewrite references to sheet `old` as `new`; `None` if the formula has none
pub fn rename_sheet_in_formula(formula: &str, old: &str, new: &str) -> Option<String> {
    let prefixes = sheet_prefixes(formula);
    if !prefixes
        .iter()
        .any(|p| p.sheets.iter().any(|s| same_sheet(s, old)))
    {
        return None;
    }

    let mut out = String::with_capacity(formula.len() + new.len());
    let mut pos = 0;
    for prefix in prefixes {
        if !prefix.sheets.iter().any(|s| same_sheet(s, old)) {
            continue;
        }
        out.push_str(&formula[pos..prefix.start]);
        let renamed: Vec<&str> = prefix
            .sheets
            .iter()
            .map(|s| if same_sheet(s, old) { new } else { s.as_str() })
            .collect();
        if renamed.len() == 1 {
            out.push_str(&quote_sheet_name(renamed[0]));
        } else {
            let joined = renamed.join(":");
            let needs_quotes = renamed.iter().any(|s| quote_sheet_name(s).starts_with('\''));
            if needs_quotes {
                out.push_str(&format!("'{}'", joined.replace('\'', "''")));
            } else {
                out.push_str(&joined);
            }
        }
        pos = prefix.end;
    }
    out.push_str(&formula[pos..]);
    Some(out)
}
