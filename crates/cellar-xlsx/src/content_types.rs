//! `[Content_Types].xml` and package flavors

use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;

use quick_xml::events::Event;

use crate::error::{XlsxError, XlsxResult};
use crate::xml::{self, Attrs};

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

pub const CT_WORKSHEET: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";
pub const CT_SHARED_STRINGS: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml";
pub const CT_STYLES: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml";
pub const CT_CORE_PROPERTIES: &str = "application/vnd.openxmlformats-package.core-properties+xml";
pub const CT_RELATIONSHIPS: &str = "application/vnd.openxmlformats-package.relationships+xml";
pub const CT_VBA_PROJECT: &str = "application/vnd.ms-office.vbaProject";
pub const CT_VBA_SIGNATURE: &str = "application/vnd.ms-office.vbaProjectSignature";
pub const CT_CALC_CHAIN: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.calcChain+xml";
pub const CT_DRAWING: &str = "application/vnd.openxmlformats-officedocument.drawing+xml";
pub const CT_CHART: &str = "application/vnd.openxmlformats-officedocument.drawingml.chart+xml";
pub const CT_COMMENTS: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.comments+xml";
pub const CT_VML_DRAWING: &str = "application/vnd.openxmlformats-officedocument.vmlDrawing";
pub const CT_SLICER: &str = "application/vnd.ms-excel.slicer+xml";
pub const CT_SLICER_CACHE: &str = "application/vnd.ms-excel.slicerCache+xml";
const CT_BINARY_WORKBOOK: &str = "application/vnd.ms-excel.sheet.binary.macroEnabled.main";

/// Which kind of spreadsheet document a package is
///
/// The flavors differ only in the content type of the main workbook part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flavor {
    /// `.xlsx`
    #[default]
    Workbook,
    /// `.xltx`
    Template,
    /// `.xlsm`
    MacroWorkbook,
    /// `.xltm`
    MacroTemplate,
}

impl Flavor {
    /// Content type of the main workbook part
    pub fn main_content_type(&self) -> &'static str {
        match self {
            Flavor::Workbook => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"
            }
            Flavor::Template => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.template.main+xml"
            }
            Flavor::MacroWorkbook => "application/vnd.ms-excel.sheet.macroEnabled.main+xml",
            Flavor::MacroTemplate => "application/vnd.ms-excel.template.macroEnabled.main+xml",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Flavor::Workbook => "xlsx",
            Flavor::Template => "xltx",
            Flavor::MacroWorkbook => "xlsm",
            Flavor::MacroTemplate => "xltm",
        }
    }

    pub fn is_macro_enabled(&self) -> bool {
        matches!(self, Flavor::MacroWorkbook | Flavor::MacroTemplate)
    }

    /// Flavor for a file extension (case-insensitive)
    pub fn from_extension(ext: &str) -> XlsxResult<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "xlsx" => Ok(Flavor::Workbook),
            "xltx" => Ok(Flavor::Template),
            "xlsm" => Ok(Flavor::MacroWorkbook),
            "xltm" => Ok(Flavor::MacroTemplate),
            other => Err(XlsxError::UnsupportedFormatVersion(format!(
                "unsupported file extension '.{}'",
                other
            ))),
        }
    }

    /// Flavor for the extension of a path
    pub fn from_path(path: &Path) -> XlsxResult<Self> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        Self::from_extension(ext)
    }

    /// Flavor for a main part content type
    pub fn from_content_type(content_type: &str) -> XlsxResult<Self> {
        let flavor = [
            Flavor::Workbook,
            Flavor::Template,
            Flavor::MacroWorkbook,
            Flavor::MacroTemplate,
        ]
        .into_iter()
        .find(|f| f.main_content_type() == content_type);
        match flavor {
            Some(flavor) => Ok(flavor),
            None if content_type == CT_BINARY_WORKBOOK => Err(
                XlsxError::UnsupportedFormatVersion("binary workbooks (.xlsb) are not supported".into()),
            ),
            None => Err(XlsxError::UnsupportedFormatVersion(format!(
                "unknown workbook content type '{}'",
                content_type
            ))),
        }
    }
}

/// The content type registry of a package
///
/// Part names are stored without a leading `/`. Extensions are lowercase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentTypes {
    root_attrs: Attrs,
    defaults: BTreeMap<String, String>,
    overrides: BTreeMap<String, String>,
}

impl Default for ContentTypes {
    fn default() -> Self {
        let mut ct = Self {
            root_attrs: vec![("xmlns".to_string(), xml::NS_CONTENT_TYPES.to_string())],
            defaults: BTreeMap::new(),
            overrides: BTreeMap::new(),
        };
        ct.set_default("rels", CT_RELATIONSHIPS);
        ct.set_default("xml", "application/xml");
        ct
    }
}

impl ContentTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_default(&mut self, extension: &str, content_type: &str) {
        self.defaults
            .insert(extension.to_ascii_lowercase(), content_type.to_string());
    }

    pub fn set_override(&mut self, part: &str, content_type: &str) {
        self.overrides
            .insert(normalize(part).to_string(), content_type.to_string());
    }

    pub fn remove_override(&mut self, part: &str) -> Option<String> {
        self.overrides.remove(normalize(part))
    }

    pub fn override_for(&self, part: &str) -> Option<&str> {
        self.overrides.get(normalize(part)).map(String::as_str)
    }

    /// Content type of a part: its override, or the default for its extension
    pub fn content_type_of(&self, part: &str) -> Option<&str> {
        let part = normalize(part);
        if let Some(ct) = self.overrides.get(part) {
            return Some(ct);
        }
        let file = part.rsplit('/').next().unwrap_or(part);
        let ext = file.rsplit_once('.').map(|(_, e)| e)?;
        self.defaults.get(&ext.to_ascii_lowercase()).map(String::as_str)
    }

    /// Parts that have an override with the given content type
    pub fn parts_with(&self, content_type: &str) -> Vec<String> {
        self.overrides
            .iter()
            .filter(|(_, ct)| *ct == content_type)
            .map(|(part, _)| part.clone())
            .collect()
    }

    pub fn overrides(&self) -> impl Iterator<Item = (&str, &str)> {
        self.overrides.iter().map(|(p, c)| (p.as_str(), c.as_str()))
    }

    pub fn decode<R: BufRead>(input: R) -> XlsxResult<Self> {
        let part = CONTENT_TYPES_PART;
        let mut reader = xml::reader(input);
        let mut buf = Vec::new();
        let (root, root_attrs, empty) = xml::read_root(&mut reader, &mut buf, part)?;
        if root != "Types" {
            return Err(XlsxError::invalid_part(part, root, "expected <Types>"));
        }
        let mut ct = Self {
            root_attrs,
            defaults: BTreeMap::new(),
            overrides: BTreeMap::new(),
        };
        if empty {
            return Ok(ct);
        }

        loop {
            buf.clear();
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                    let attrs = xml::attributes(&e, part)?;
                    match e.local_name().as_ref() {
                        b"Default" => {
                            let (Some(ext), Some(ct_value)) =
                                (xml::attr(&attrs, "Extension"), xml::attr(&attrs, "ContentType"))
                            else {
                                return Err(XlsxError::invalid_part(
                                    part,
                                    "Default",
                                    "missing Extension or ContentType",
                                ));
                            };
                            ct.set_default(ext, ct_value);
                        }
                        b"Override" => {
                            let (Some(name), Some(ct_value)) =
                                (xml::attr(&attrs, "PartName"), xml::attr(&attrs, "ContentType"))
                            else {
                                return Err(XlsxError::invalid_part(
                                    part,
                                    "Override",
                                    "missing PartName or ContentType",
                                ));
                            };
                            ct.set_override(name, ct_value);
                        }
                        _ => {}
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(XlsxError::xml(part, e)),
                _ => {}
            }
        }
        Ok(ct)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut xml = String::from(xml::XML_DECLARATION);
        xml.push_str("<Types");
        xml::write_attrs(&mut xml, &self.root_attrs);
        xml.push('>');
        for (ext, ct) in &self.defaults {
            xml.push_str(&format!(
                "<Default Extension=\"{}\" ContentType=\"{}\"/>",
                xml::escape_attr(ext),
                xml::escape_attr(ct)
            ));
        }
        for (part, ct) in &self.overrides {
            xml.push_str(&format!(
                "<Override PartName=\"/{}\" ContentType=\"{}\"/>",
                xml::escape_attr(part),
                xml::escape_attr(ct)
            ));
        }
        xml.push_str("</Types>");
        xml.into_bytes()
    }
}

/// Content type of an image format by file extension
///
/// These are the formats a sheet background may use.
pub fn image_content_type(extension: &str) -> Option<&'static str> {
    Some(match extension.to_ascii_lowercase().as_str() {
        "bmp" => "image/bmp",
        "emf" => "image/x-emf",
        "emz" => "image/x-emz",
        "gif" => "image/gif",
        "jpeg" | "jpg" => "image/jpeg",
        "png" => "image/png",
        "svg" => "image/svg+xml",
        "tif" | "tiff" => "image/tiff",
        "wmf" => "image/x-wmf",
        "wmz" => "image/x-wmz",
        _ => return None,
    })
}

fn normalize(part: &str) -> &str {
    part.trim_start_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="XML" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.ms-excel.sheet.macroEnabled.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

    #[test]
    fn test_decode_and_lookup() {
        let ct = ContentTypes::decode(SAMPLE.as_bytes()).unwrap();
        let main = ct.content_type_of("/xl/workbook.xml").unwrap();
        assert_eq!(Flavor::from_content_type(main).unwrap(), Flavor::MacroWorkbook);
        assert_eq!(ct.content_type_of("xl/worksheets/sheet1.xml"), Some(CT_WORKSHEET));
        assert_eq!(ct.content_type_of("docProps/app.xml"), Some("application/xml"));
        assert_eq!(ct.content_type_of("xl/media/image1.png"), None);
        assert_eq!(ct.parts_with(CT_WORKSHEET), vec!["xl/worksheets/sheet1.xml".to_string()]);
    }

    #[test]
    fn test_encode_is_stable() {
        let ct = ContentTypes::decode(SAMPLE.as_bytes()).unwrap();
        let once = ct.encode();
        let again = ContentTypes::decode(&once[..]).unwrap();
        assert_eq!(again, ct);
        assert_eq!(again.encode(), once);
    }

    #[test]
    fn test_flavors() {
        assert_eq!(Flavor::from_extension("XLTM").unwrap(), Flavor::MacroTemplate);
        assert!(matches!(
            Flavor::from_extension("xls"),
            Err(XlsxError::UnsupportedFormatVersion(_))
        ));
        assert!(matches!(
            Flavor::from_content_type(CT_BINARY_WORKBOOK),
            Err(XlsxError::UnsupportedFormatVersion(_))
        ));
        assert!(Flavor::MacroWorkbook.is_macro_enabled());
        assert!(!Flavor::Template.is_macro_enabled());
    }

    #[test]
    fn test_image_content_types() {
        assert_eq!(image_content_type("PNG"), Some("image/png"));
        assert_eq!(image_content_type("jpg"), image_content_type("jpeg"));
        assert_eq!(image_content_type("tiff"), Some("image/tiff"));
        assert_eq!(image_content_type("webp"), None);
    }
}
