//! XML helpers shared by the part codecs

use std::borrow::Cow;
use std::io::BufRead;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::error::{XlsxError, XlsxResult};

pub(crate) const XML_DECLARATION: &str =
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n";

pub(crate) const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
pub(crate) const NS_RELATIONSHIPS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
pub(crate) const NS_PACKAGE_RELATIONSHIPS: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships";
pub(crate) const NS_CONTENT_TYPES: &str =
    "http://schemas.openxmlformats.org/package/2006/content-types";

/// Namespace prefix of strict OOXML, which is not supported
const NS_STRICT_PREFIX: &str = "http://purl.oclc.org/ooxml/";

/// Attributes of an element as `(qualified name, unescaped value)` pairs
pub type Attrs = Vec<(String, String)>;

/// Create a reader over a part
pub(crate) fn reader<R: BufRead>(input: R) -> Reader<R> {
    let mut reader = Reader::from_reader(input);
    reader.check_end_names(true);
    reader
}

/// Escape text content
pub(crate) fn escape_text(s: &str) -> Cow<'_, str> {
    if !s.contains(['&', '<', '>']) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Escape an attribute value
pub(crate) fn escape_attr(s: &str) -> Cow<'_, str> {
    if !s.contains(['&', '<', '>', '"', '\n', '\r', '\t']) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            '\t' => out.push_str("&#9;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn hex4(bytes: &[u8]) -> Option<u32> {
    if bytes.len() != 4 || !bytes.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| u32::from_str_radix(s, 16).ok())
}

/// Decode Excel's `_xHHHH_` escape sequences
///
/// Excel writes characters XML cannot carry (mostly control characters) as
/// `_x000D_` and friends, and a literal `_x` sequence as `_x005F_x...`.
pub(crate) fn decode_excel_escapes(s: &str) -> Cow<'_, str> {
    if !s.contains("_x") {
        return Cow::Borrowed(s);
    }
    let bytes = s.as_bytes();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    let mut copied = 0;
    while i + 7 <= bytes.len() {
        if bytes[i] == b'_' && bytes[i + 1] == b'x' && bytes[i + 6] == b'_' {
            if let Some(c) = hex4(&bytes[i + 2..i + 6]).and_then(char::from_u32) {
                out.push_str(&s[copied..i]);
                out.push(c);
                i += 7;
                copied = i;
                continue;
            }
        }
        i += 1;
    }
    out.push_str(&s[copied..]);
    Cow::Owned(out)
}

fn needs_excel_escape(c: char) -> bool {
    (c < ' ' && !matches!(c, '\t' | '\n' | '\r')) || matches!(c, '\u{FFFE}' | '\u{FFFF}')
}

/// Encode characters XML 1.0 cannot carry as `_xHHHH_`
///
/// Literal text that would read back as an escape gets its underscore
/// escaped, so decoding returns the original string.
pub(crate) fn encode_excel_escapes(s: &str) -> Cow<'_, str> {
    let has_literal = s.contains("_x");
    if !has_literal && !s.chars().any(needs_excel_escape) {
        return Cow::Borrowed(s);
    }
    let bytes = s.as_bytes();
    let mut out = String::with_capacity(s.len() + 8);
    for (i, c) in s.char_indices() {
        if needs_excel_escape(c) {
            out.push_str(&format!("_x{:04X}_", c as u32));
        } else if c == '_'
            && bytes.get(i + 1) == Some(&b'x')
            && bytes.get(i + 6) == Some(&b'_')
            && bytes.get(i + 2..i + 6).and_then(hex4).is_some()
        {
            out.push_str("_x005F_");
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

/// Escape text for an element body, including Excel escapes
pub(crate) fn cell_text(s: &str) -> String {
    escape_text(&encode_excel_escapes(s)).into_owned()
}

/// Whether text needs `xml:space="preserve"`
pub(crate) fn needs_space_preserve(s: &str) -> bool {
    s.starts_with(char::is_whitespace) || s.ends_with(char::is_whitespace) || s.contains('\n')
}

/// Parse an `xsd:boolean`
pub(crate) fn parse_bool(s: &str) -> bool {
    matches!(s.trim(), "1" | "true")
}

/// Collect the attributes of an element
pub(crate) fn attributes(e: &BytesStart<'_>, part: &str) -> XlsxResult<Attrs> {
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| {
            XlsxError::invalid_part(part, local_name(e), format!("bad attribute: {}", err))
        })?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| XlsxError::invalid_part(part, local_name(e), err.to_string()))?
            .into_owned();
        attrs.push((key, value));
    }
    Ok(attrs)
}

/// Value of an attribute by qualified name
pub(crate) fn attr<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Value of an attribute whose key is `prefix:local` for one of `prefixes`
pub(crate) fn prefixed_attr<'a>(
    attrs: &'a [(String, String)],
    prefixes: &[String],
    local: &str,
) -> Option<&'a str> {
    attrs.iter().find_map(|(k, v)| {
        let (prefix, name) = k.split_once(':')?;
        (name == local && prefixes.iter().any(|p| p == prefix)).then_some(v.as_str())
    })
}

/// Set or replace an attribute
pub(crate) fn set_attr(attrs: &mut Attrs, key: &str, value: impl Into<String>) {
    let value = value.into();
    match attrs.iter_mut().find(|(k, _)| k == key) {
        Some((_, v)) => *v = value,
        None => attrs.push((key.to_string(), value)),
    }
}

pub(crate) fn remove_attr(attrs: &mut Attrs, key: &str) {
    attrs.retain(|(k, _)| k != key);
}

/// Render attributes as ` key="value"` pairs
pub(crate) fn write_attrs(xml: &mut String, attrs: &[(String, String)]) {
    for (key, value) in attrs {
        xml.push(' ');
        xml.push_str(key);
        xml.push_str("=\"");
        xml.push_str(&escape_attr(value));
        xml.push('"');
    }
}

/// Local name of an element as a string
pub(crate) fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

/// Prefixes that a root element binds to the relationships namespace
pub(crate) fn relationship_prefixes(root: &[(String, String)]) -> Vec<String> {
    let mut prefixes: Vec<String> = root
        .iter()
        .filter(|(_, v)| v == NS_RELATIONSHIPS)
        .filter_map(|(k, _)| k.strip_prefix("xmlns:").map(str::to_string))
        .collect();
    if prefixes.is_empty() {
        prefixes.push("r".to_string());
    }
    prefixes
}

/// Make sure the root declares `prefix` for `namespace`; returns the prefix in use
pub(crate) fn ensure_namespace(root: &mut Attrs, prefix: &str, namespace: &str) -> String {
    if let Some(existing) = root
        .iter()
        .filter(|(_, v)| v == namespace)
        .find_map(|(k, _)| k.strip_prefix("xmlns:"))
    {
        return existing.to_string();
    }
    let mut candidate = prefix.to_string();
    let mut n = 1;
    while attr(root, &format!("xmlns:{}", candidate)).is_some() {
        candidate = format!("{}{}", prefix, n);
        n += 1;
    }
    root.push((format!("xmlns:{}", candidate), namespace.to_string()));
    candidate
}

/// Reject strict OOXML namespaces on a root element
pub(crate) fn check_transitional(part: &str, root: &[(String, String)]) -> XlsxResult<()> {
    let strict = root
        .iter()
        .any(|(k, v)| (k == "xmlns" || k.starts_with("xmlns:")) && v.starts_with(NS_STRICT_PREFIX));
    if strict {
        return Err(XlsxError::UnsupportedFormatVersion(format!(
            "{} uses the strict OOXML namespace",
            part
        )));
    }
    Ok(())
}

/// Read the root element of a part, returning its local name and attributes
pub(crate) fn read_root<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
    part: &str,
) -> XlsxResult<(String, Attrs, bool)> {
    loop {
        buf.clear();
        match reader.read_event_into(buf) {
            Ok(Event::Start(e)) => return Ok((local_name(&e), attributes(&e, part)?, false)),
            Ok(Event::Empty(e)) => return Ok((local_name(&e), attributes(&e, part)?, true)),
            Ok(Event::Eof) => {
                return Err(XlsxError::invalid_part(part, "root", "no root element"))
            }
            Ok(_) => {}
            Err(e) => return Err(XlsxError::xml(part, e)),
        }
    }
}

/// Read the text content of the current element up to its end tag
pub(crate) fn read_text<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
    part: &str,
    element: &str,
) -> XlsxResult<String> {
    let mut text = String::new();
    let mut depth = 0usize;
    loop {
        buf.clear();
        match reader.read_event_into(buf) {
            Ok(Event::Text(t)) if depth == 0 => {
                let t = t
                    .unescape()
                    .map_err(|e| XlsxError::invalid_part(part, element, e.to_string()))?;
                text.push_str(&t);
            }
            Ok(Event::CData(t)) if depth == 0 => {
                text.push_str(&String::from_utf8_lossy(&t.into_inner()));
            }
            Ok(Event::Start(_)) => depth += 1,
            Ok(Event::End(_)) => {
                if depth == 0 {
                    return Ok(text);
                }
                depth -= 1;
            }
            Ok(Event::Eof) => {
                return Err(XlsxError::invalid_part(part, element, "unexpected end of part"))
            }
            Ok(_) => {}
            Err(e) => return Err(XlsxError::xml(part, e)),
        }
    }
}

/// Skip the current element up to its end tag
pub(crate) fn skip_element<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
    part: &str,
    start: &BytesStart<'_>,
) -> XlsxResult<()> {
    let end = start.to_end().into_owned();
    buf.clear();
    reader
        .read_to_end_into(end.name(), buf)
        .map_err(|e| XlsxError::xml(part, e))?;
    Ok(())
}

/// An element kept verbatim because the codecs do not model it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFragment {
    /// Local name of the element
    pub name: String,
    /// Serialized element, exactly as read
    pub xml: String,
    /// Relationship ids referenced anywhere inside the element
    pub rel_ids: Vec<String>,
}

impl RawFragment {
    /// A fragment that references no relationships
    pub(crate) fn fixed(name: &str, xml: &str) -> Self {
        Self {
            name: name.to_string(),
            xml: xml.to_string(),
            rel_ids: Vec::new(),
        }
    }
}

fn collect_rel_ids(e: &BytesStart<'_>, rel_prefixes: &[String], ids: &mut Vec<String>) {
    for attr in e.attributes().flatten() {
        let Some(prefix) = attr.key.prefix() else {
            continue;
        };
        if rel_prefixes.iter().any(|p| p.as_bytes() == prefix.as_ref()) {
            if let Ok(value) = attr.unescape_value() {
                if !value.is_empty() {
                    ids.push(value.into_owned());
                }
            }
        }
    }
}

/// Capture an element and its subtree verbatim
///
/// `start` is the element's start (or empty) tag, already consumed from
/// `reader`. Attributes in the relationships namespace are collected so the
/// caller can check that they resolve.
pub(crate) fn capture<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
    part: &str,
    start: &BytesStart<'_>,
    empty: bool,
    rel_prefixes: &[String],
) -> XlsxResult<RawFragment> {
    let name = local_name(start);
    let mut rel_ids = Vec::new();
    collect_rel_ids(start, rel_prefixes, &mut rel_ids);

    let mut writer = Writer::new(Vec::new());
    let first = if empty {
        Event::Empty(start.borrow())
    } else {
        Event::Start(start.borrow())
    };
    writer
        .write_event(first)
        .map_err(|e| XlsxError::xml(part, e))?;

    let mut depth = if empty { 0usize } else { 1 };
    while depth > 0 {
        buf.clear();
        let event = reader
            .read_event_into(buf)
            .map_err(|e| XlsxError::xml(part, e))?;
        match &event {
            Event::Start(e) => {
                collect_rel_ids(e, rel_prefixes, &mut rel_ids);
                depth += 1;
            }
            Event::Empty(e) => collect_rel_ids(e, rel_prefixes, &mut rel_ids),
            Event::End(_) => depth -= 1,
            Event::Eof => {
                return Err(XlsxError::invalid_part(
                    part,
                    name,
                    "unexpected end of part",
                ))
            }
            _ => {}
        }
        writer
            .write_event(event)
            .map_err(|e| XlsxError::xml(part, e))?;
    }

    let xml = String::from_utf8(writer.into_inner())
        .map_err(|e| XlsxError::invalid_part(part, &name, e.to_string()))?;
    Ok(RawFragment { name, xml, rel_ids })
}
