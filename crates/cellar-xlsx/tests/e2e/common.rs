//! Common utilities for E2E tests.

use std::io::Cursor;

use cellar_xlsx::archive::{ArchiveReader, ArchiveWriter};
use cellar_xlsx::{Options, Package};

const WORKSHEET_CT: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";
const WORKBOOK_CT: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml";
const REL_WORKSHEET: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";

/// Builds a minimal transitional package, one worksheet per `sheet` call
#[derive(Default)]
pub struct PackageBuilder {
    sheets: Vec<(String, String)>,
    /// Elements after `<pageMargins>`, per sheet
    tails: Vec<String>,
    defined_names: Vec<(String, String)>,
    extra: Vec<(String, String)>,
    overrides: Vec<(String, String)>,
    defaults: Vec<(String, String)>,
    workbook_rels: Vec<(String, String, String)>,
    workbook_ext: Option<String>,
}

impl PackageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sheet whose `<sheetData>` content is `rows`
    pub fn sheet(mut self, name: &str, rows: &str) -> Self {
        self.sheets.push((name.to_string(), rows.to_string()));
        self.tails.push(String::new());
        self
    }

    /// Elements closing the last sheet added, like `<drawing r:id="rId1"/>`
    pub fn sheet_tail(mut self, xml: &str) -> Self {
        if let Some(tail) = self.tails.last_mut() {
            *tail = xml.to_string();
        }
        self
    }

    pub fn defined_name(mut self, name: &str, formula: &str) -> Self {
        self.defined_names.push((name.to_string(), formula.to_string()));
        self
    }

    /// An extra entry nothing references
    pub fn entry(mut self, name: &str, body: &str) -> Self {
        self.extra.push((name.to_string(), body.to_string()));
        self
    }

    /// An extra entry with a content type override
    pub fn part(mut self, name: &str, content_type: &str, body: &str) -> Self {
        self.overrides.push((name.to_string(), content_type.to_string()));
        self.entry(name, body)
    }

    pub fn default_type(mut self, extension: &str, content_type: &str) -> Self {
        self.defaults.push((extension.to_string(), content_type.to_string()));
        self
    }

    /// A workbook relationship; ids must not collide with the sheets' `rId1..rIdN`
    pub fn workbook_rel(mut self, id: &str, rel_type: &str, target: &str) -> Self {
        self.workbook_rels
            .push((id.to_string(), rel_type.to_string(), target.to_string()));
        self
    }

    /// The workbook's `<extLst>`
    pub fn workbook_ext(mut self, xml: &str) -> Self {
        self.workbook_ext = Some(xml.to_string());
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut ct = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/>"#,
        );
        for (ext, content_type) in &self.defaults {
            ct.push_str(&format!(
                r#"<Default Extension="{}" ContentType="{}"/>"#,
                ext, content_type
            ));
        }
        ct.push_str(&format!(
            r#"<Override PartName="/xl/workbook.xml" ContentType="{}"/>"#,
            WORKBOOK_CT
        ));
        for (name, content_type) in &self.overrides {
            ct.push_str(&format!(
                r#"<Override PartName="/{}" ContentType="{}"/>"#,
                name, content_type
            ));
        }
        let mut sheets = String::new();
        let mut rels = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        for (i, (name, _)) in self.sheets.iter().enumerate() {
            let n = i + 1;
            ct.push_str(&format!(
                r#"<Override PartName="/xl/worksheets/sheet{}.xml" ContentType="{}"/>"#,
                n, WORKSHEET_CT
            ));
            sheets.push_str(&format!(
                r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
                name, n, n
            ));
            rels.push_str(&format!(
                r#"<Relationship Id="rId{}" Type="{}" Target="worksheets/sheet{}.xml"/>"#,
                n, REL_WORKSHEET, n
            ));
        }
        for (id, rel_type, target) in &self.workbook_rels {
            rels.push_str(&format!(
                r#"<Relationship Id="{}" Type="{}" Target="{}"/>"#,
                id, rel_type, target
            ));
        }
        ct.push_str("</Types>");
        rels.push_str("</Relationships>");

        let names = if self.defined_names.is_empty() {
            String::new()
        } else {
            let inner: String = self
                .defined_names
                .iter()
                .map(|(name, formula)| format!(r#"<definedName name="{}">{}</definedName>"#, name, formula))
                .collect();
            format!("<definedNames>{}</definedNames>", inner)
        };
        let workbook = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>{}</sheets>{}<calcPr calcId="191029"/>{}</workbook>"#,
            sheets,
            names,
            self.workbook_ext.as_deref().unwrap_or_default()
        );

        let mut writer = ArchiveWriter::new(Cursor::new(Vec::new()));
        writer.add_bytes("[Content_Types].xml", ct.as_bytes()).unwrap();
        writer
            .add_bytes(
                "_rels/.rels",
                br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#,
            )
            .unwrap();
        writer.add_bytes("xl/workbook.xml", workbook.as_bytes()).unwrap();
        writer.add_bytes("xl/_rels/workbook.xml.rels", rels.as_bytes()).unwrap();
        for (i, ((_, rows), tail)) in self.sheets.iter().zip(&self.tails).enumerate() {
            let xmlns_r = if tail.is_empty() {
                ""
            } else {
                r#" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships""#
            };
            let xml = format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"{}><sheetViews><sheetView workbookViewId="0"/></sheetViews><sheetData>{}</sheetData><pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/>{}</worksheet>"#,
                xmlns_r, rows, tail
            );
            writer
                .add_bytes(&format!("xl/worksheets/sheet{}.xml", i + 1), xml.as_bytes())
                .unwrap();
        }
        for (name, body) in &self.extra {
            writer.add_bytes(name, body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    pub fn open(&self) -> Package {
        Package::from_bytes(self.build(), Options::default()).expect("fixture should open")
    }
}

/// Read one entry of a saved package as text
pub fn entry_text(bytes: &[u8], name: &str) -> Option<String> {
    let reader = ArchiveReader::new(bytes.to_vec(), &Options::default()).ok()?;
    if !reader.contains(name) {
        return None;
    }
    reader
        .read_part(name)
        .ok()
        .map(|b| String::from_utf8_lossy(&b).into_owned())
}

/// Entry names of a saved package, in archive order
pub fn entry_names(bytes: &[u8]) -> Vec<String> {
    let reader = ArchiveReader::new(bytes.to_vec(), &Options::default()).unwrap();
    let mut entries: Vec<_> = reader.entries().collect();
    entries.sort_by_key(|e| e.index);
    entries.into_iter().map(|e| e.name.clone()).collect()
}
