//! Core document properties (`docProps/core.xml`)

use std::io::BufRead;

use cellar_core::DocProperties;
use quick_xml::events::Event;

use super::{PartCodec, PartKind};
use crate::error::{XlsxError, XlsxResult};
use crate::xml::{self, Attrs, RawFragment};

const NS_CORE: &str = "http://schemas.openxmlformats.org/package/2006/metadata/core-properties";
const NS_DC: &str = "http://purl.org/dc/elements/1.1/";
const NS_DCTERMS: &str = "http://purl.org/dc/terms/";
const NS_DCMITYPE: &str = "http://purl.org/dc/dcmitype/";
const NS_XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Root attributes and elements the model does not cover
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CoreLayout {
    pub root_attrs: Attrs,
    pub extra: Vec<RawFragment>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CorePropertiesPart {
    pub layout: CoreLayout,
    pub props: DocProperties,
}

fn field<'a>(props: &'a mut DocProperties, local: &[u8]) -> Option<&'a mut Option<String>> {
    Some(match local {
        b"title" => &mut props.title,
        b"subject" => &mut props.subject,
        b"creator" => &mut props.creator,
        b"keywords" => &mut props.keywords,
        b"description" => &mut props.description,
        b"lastModifiedBy" => &mut props.last_modified_by,
        b"category" => &mut props.category,
        b"contentStatus" => &mut props.content_status,
        b"revision" => &mut props.revision,
        b"created" => &mut props.created,
        b"modified" => &mut props.modified,
        _ => return None,
    })
}

impl PartCodec for CorePropertiesPart {
    const KIND: PartKind = PartKind::CoreProperties;

    fn decode<R: BufRead>(path: &str, input: R) -> XlsxResult<Self> {
        let mut reader = xml::reader(input);
        let mut buf = Vec::new();
        let (root, root_attrs, empty) = xml::read_root(&mut reader, &mut buf, path)?;
        if root != "coreProperties" {
            return Err(XlsxError::invalid_part(path, root, "expected <coreProperties>"));
        }
        let mut part = CorePropertiesPart {
            layout: CoreLayout {
                root_attrs,
                extra: Vec::new(),
            },
            props: DocProperties::default(),
        };

        while !empty {
            buf.clear();
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    let e = e.into_owned();
                    let local = e.local_name().as_ref().to_vec();
                    match field(&mut part.props, &local) {
                        Some(slot) => {
                            let text = xml::read_text(&mut reader, &mut buf, path, &xml::local_name(&e))?;
                            *slot = Some(text);
                        }
                        None => {
                            let raw = xml::capture(&mut reader, &mut buf, path, &e, false, &[])?;
                            part.layout.extra.push(raw);
                        }
                    }
                }
                Ok(Event::Empty(e)) => {
                    let e = e.into_owned();
                    let local = e.local_name().as_ref().to_vec();
                    match field(&mut part.props, &local) {
                        Some(slot) => *slot = Some(String::new()),
                        None => {
                            let raw = xml::capture(&mut reader, &mut buf, path, &e, true, &[])?;
                            part.layout.extra.push(raw);
                        }
                    }
                }
                Ok(Event::End(_)) | Ok(Event::Eof) => break,
                Err(e) => return Err(XlsxError::xml(path, e)),
                _ => {}
            }
        }
        Ok(part)
    }

    fn encode(&self) -> Vec<u8> {
        encode_doc_props(&self.layout, &self.props)
    }
}

/// Serialize core properties, keeping unknown elements of a loaded part
pub fn encode_doc_props(layout: &CoreLayout, props: &DocProperties) -> Vec<u8> {
    let mut root_attrs = layout.root_attrs.clone();
    let cp = xml::ensure_namespace(&mut root_attrs, "cp", NS_CORE);
    let dc = xml::ensure_namespace(&mut root_attrs, "dc", NS_DC);
    let dcterms = xml::ensure_namespace(&mut root_attrs, "dcterms", NS_DCTERMS);
    xml::ensure_namespace(&mut root_attrs, "dcmitype", NS_DCMITYPE);
    let xsi = xml::ensure_namespace(&mut root_attrs, "xsi", NS_XSI);

    let mut xml = String::from(xml::XML_DECLARATION);
    xml.push_str(&format!("<{}:coreProperties", cp));
    xml::write_attrs(&mut xml, &root_attrs);
    xml.push('>');

    let mut element = |prefix: &str, name: &str, value: &Option<String>| {
        if let Some(value) = value {
            xml.push_str(&format!(
                "<{p}:{n}>{v}</{p}:{n}>",
                p = prefix,
                n = name,
                v = xml::escape_text(value)
            ));
        }
    };
    element(&dc, "title", &props.title);
    element(&dc, "subject", &props.subject);
    element(&dc, "creator", &props.creator);
    element(&cp, "keywords", &props.keywords);
    element(&dc, "description", &props.description);
    element(&cp, "lastModifiedBy", &props.last_modified_by);
    element(&cp, "revision", &props.revision);

    for (name, value) in [("created", &props.created), ("modified", &props.modified)] {
        if let Some(value) = value {
            xml.push_str(&format!(
                "<{d}:{n} {x}:type=\"dcterms:W3CDTF\">{v}</{d}:{n}>",
                d = dcterms,
                n = name,
                x = xsi,
                v = xml::escape_text(value)
            ));
        }
    }

    let mut element = |prefix: &str, name: &str, value: &Option<String>| {
        if let Some(value) = value {
            xml.push_str(&format!(
                "<{p}:{n}>{v}</{p}:{n}>",
                p = prefix,
                n = name,
                v = xml::escape_text(value)
            ));
        }
    };
    element(&cp, "category", &props.category);
    element(&cp, "contentStatus", &props.content_status);

    for raw in &layout.extra {
        xml.push_str(&raw.xml);
    }
    xml.push_str(&format!("</{}:coreProperties>", cp));
    xml.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CORE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:dcmitype="http://purl.org/dc/dcmitype/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><dc:title>Q3 &amp; Q4</dc:title><dc:creator>Ana</dc:creator><cp:lastModifiedBy>Ben</cp:lastModifiedBy><cp:lastPrinted>2023-01-01T00:00:00Z</cp:lastPrinted><dcterms:created xsi:type="dcterms:W3CDTF">2023-02-03T04:05:06Z</dcterms:created><dcterms:modified xsi:type="dcterms:W3CDTF">2024-02-03T04:05:06Z</dcterms:modified></cp:coreProperties>"#;

    #[test]
    fn test_decode() {
        let part = CorePropertiesPart::decode("docProps/core.xml", CORE.as_bytes()).unwrap();
        assert_eq!(part.props.title.as_deref(), Some("Q3 & Q4"));
        assert_eq!(part.props.creator.as_deref(), Some("Ana"));
        assert_eq!(part.props.last_modified_by.as_deref(), Some("Ben"));
        assert_eq!(part.props.created.as_deref(), Some("2023-02-03T04:05:06Z"));
        assert_eq!(part.layout.extra.len(), 1);
        assert_eq!(part.layout.extra[0].name, "lastPrinted");
    }

    #[test]
    fn test_encode_round_trip() {
        let mut part = CorePropertiesPart::decode("docProps/core.xml", CORE.as_bytes()).unwrap();
        part.props.subject = Some("Budget".into());
        let out = String::from_utf8(part.encode()).unwrap();
        assert!(out.contains("<dc:subject>Budget</dc:subject>"));
        assert!(out.contains("<cp:lastPrinted>2023-01-01T00:00:00Z</cp:lastPrinted>"));
        assert!(out.contains("<dcterms:created xsi:type=\"dcterms:W3CDTF\">2023-02-03T04:05:06Z</dcterms:created>"));
        let again = CorePropertiesPart::decode("docProps/core.xml", out.as_bytes()).unwrap();
        assert_eq!(again, part);
    }

    #[test]
    fn test_fresh_part_declares_namespaces() {
        let props = DocProperties {
            creator: Some("cellar".into()),
            ..Default::default()
        };
        let out = String::from_utf8(encode_doc_props(&CoreLayout::default(), &props)).unwrap();
        assert!(out.starts_with(xml::XML_DECLARATION));
        assert!(out.contains("<cp:coreProperties xmlns:cp="));
        assert!(out.contains("xmlns:dc=\"http://purl.org/dc/elements/1.1/\""));
        assert!(out.contains("<dc:creator>cellar</dc:creator>"));
    }
}
