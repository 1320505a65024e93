//! Shared strings part codec (`xl/sharedStrings.xml`)

use std::io::BufRead;

use cellar_core::SharedStringTable;
use quick_xml::events::Event;

use super::worksheet::read_rich_text;
use super::{PartCodec, PartKind};
use crate::error::{XlsxError, XlsxResult};
use crate::xml::{self, Attrs};

/// The decoded shared strings table
#[derive(Debug, Clone, Default)]
pub struct SharedStringsPart {
    pub root_attrs: Attrs,
    pub table: SharedStringTable,
}

fn is_rich(markup: &str) -> bool {
    ["<r>", "<r ", "<rPh", "<phoneticPr"]
        .iter()
        .any(|tag| markup.contains(tag))
}

/// Plain text of a captured `<si>` element
fn plain_text(part: &str, markup: &str) -> XlsxResult<String> {
    let mut reader = xml::reader(markup.as_bytes());
    let mut buf = Vec::new();
    let (_, _, empty) = xml::read_root(&mut reader, &mut buf, part)?;
    if empty {
        return Ok(String::new());
    }
    read_rich_text(&mut reader, &mut buf, part, "si")
}

impl PartCodec for SharedStringsPart {
    const KIND: PartKind = PartKind::SharedStrings;

    fn decode<R: BufRead>(path: &str, input: R) -> XlsxResult<Self> {
        let mut reader = xml::reader(input);
        let mut buf = Vec::new();
        let (root, mut root_attrs, empty) = xml::read_root(&mut reader, &mut buf, path)?;
        if root != "sst" {
            return Err(XlsxError::invalid_part(path, root, "expected <sst>"));
        }
        xml::check_transitional(path, &root_attrs)?;
        xml::remove_attr(&mut root_attrs, "count");
        xml::remove_attr(&mut root_attrs, "uniqueCount");

        let mut table = SharedStringTable::new();
        while !empty {
            buf.clear();
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) if e.local_name().as_ref() == b"si" => {
                    let e = e.into_owned();
                    let raw = xml::capture(&mut reader, &mut buf, path, &e, false, &[])?;
                    let text = plain_text(path, &raw.xml)?;
                    if is_rich(&raw.xml) {
                        table.push_loaded_rich(&text, &raw.xml);
                    } else {
                        table.push_loaded(&text);
                    }
                }
                Ok(Event::Empty(e)) if e.local_name().as_ref() == b"si" => {
                    table.push_loaded("");
                }
                Ok(Event::End(_)) | Ok(Event::Eof) => break,
                Err(e) => return Err(XlsxError::xml(path, e)),
                _ => {}
            }
        }
        Ok(Self { root_attrs, table })
    }

    fn encode(&self) -> Vec<u8> {
        encode_with_root(&self.root_attrs, &self.table)
    }
}

pub(crate) fn encode_with_root(root_attrs: &[(String, String)], table: &SharedStringTable) -> Vec<u8> {
    let mut xml = String::with_capacity(128 + table.len() * 24);
    xml.push_str(xml::XML_DECLARATION);
    xml.push_str("<sst");
    xml::write_attrs(&mut xml, root_attrs);
    xml.push_str(&format!(
        " count=\"{}\" uniqueCount=\"{}\">",
        table.len(),
        table.len()
    ));
    for (idx, text) in table.iter() {
        if let Some(markup) = table.rich_markup(idx) {
            xml.push_str(markup);
            continue;
        }
        if xml::needs_space_preserve(text) {
            xml.push_str("<si><t xml:space=\"preserve\">");
        } else {
            xml.push_str("<si><t>");
        }
        xml.push_str(&xml::cell_text(text));
        xml.push_str("</t></si>");
    }
    xml.push_str("</sst>");
    xml.into_bytes()
}

/// Serialize a shared strings table with the default root element
pub fn encode_shared_strings(table: &SharedStringTable) -> Vec<u8> {
    encode_with_root(&[("xmlns".to_string(), xml::NS_MAIN.to_string())], table)
}
