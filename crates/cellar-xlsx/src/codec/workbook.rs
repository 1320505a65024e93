//! Workbook part codec (`xl/workbook.xml`)

use std::io::BufRead;

use cellar_core::{NameScope, SheetVisibility, Workbook};
use quick_xml::events::Event;
use quick_xml::reader::Reader;

use super::{PartCodec, PartKind};
use crate::error::{XlsxError, XlsxResult};
use crate::xml::{self, Attrs, RawFragment};

/// Position of one top-level element of the workbook part
#[derive(Debug, Clone, PartialEq)]
pub enum WorkbookSlot {
    Raw(RawFragment),
    WorkbookPr,
    BookViews,
    Sheets,
    DefinedNames,
}

impl WorkbookSlot {
    fn name(&self) -> &str {
        match self {
            WorkbookSlot::Raw(raw) => &raw.name,
            WorkbookSlot::WorkbookPr => "workbookPr",
            WorkbookSlot::BookViews => "bookViews",
            WorkbookSlot::Sheets => "sheets",
            WorkbookSlot::DefinedNames => "definedNames",
        }
    }
}

/// Everything about the workbook part that the model does not own
#[derive(Debug, Clone, PartialEq)]
pub struct WorkbookLayout {
    pub root_attrs: Attrs,
    pub slots: Vec<WorkbookSlot>,
    /// Attributes of `<workbookPr>` other than the ones regenerated
    pub workbook_pr: Attrs,
    /// Attributes of each `<workbookView>`
    pub book_views: Vec<Attrs>,
}

impl Default for WorkbookLayout {
    fn default() -> Self {
        Self {
            root_attrs: vec![
                ("xmlns".to_string(), xml::NS_MAIN.to_string()),
                ("xmlns:r".to_string(), xml::NS_RELATIONSHIPS.to_string()),
            ],
            slots: vec![
                WorkbookSlot::WorkbookPr,
                WorkbookSlot::BookViews,
                WorkbookSlot::Sheets,
                WorkbookSlot::DefinedNames,
            ],
            workbook_pr: Vec::new(),
            book_views: vec![Vec::new()],
        }
    }
}

impl WorkbookLayout {
    /// Relationship ids referenced by preserved elements
    pub fn rel_ids(&self) -> impl Iterator<Item = &String> {
        self.slots.iter().flat_map(|slot| match slot {
            WorkbookSlot::Raw(raw) => raw.rel_ids.iter(),
            _ => [].iter(),
        })
    }

    fn has(&self, name: &str) -> bool {
        self.slots.iter().any(|s| s.name() == name)
    }

    fn insert_after_last(&mut self, names: &[&str], slot: WorkbookSlot) {
        let pos = self
            .slots
            .iter()
            .rposition(|s| names.contains(&s.name()))
            .map(|p| p + 1)
            .unwrap_or(0);
        self.slots.insert(pos, slot);
    }

    fn complete(&mut self) {
        if !self.has("workbookPr") {
            self.insert_after_last(&["fileVersion", "fileSharing"], WorkbookSlot::WorkbookPr);
        }
        if !self.has("bookViews") {
            self.insert_after_last(
                &["fileVersion", "fileSharing", "workbookPr", "workbookProtection"],
                WorkbookSlot::BookViews,
            );
        }
        if !self.has("sheets") {
            self.insert_after_last(
                &["fileVersion", "fileSharing", "workbookPr", "workbookProtection", "bookViews"],
                WorkbookSlot::Sheets,
            );
        }
        if !self.has("definedNames") {
            self.insert_after_last(
                &["sheets", "functionGroups", "externalReferences"],
                WorkbookSlot::DefinedNames,
            );
        }
    }
}

/// One `<sheet>` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRecord {
    pub name: String,
    pub sheet_id: u32,
    pub rel_id: String,
    pub state: SheetVisibility,
}

/// One `<definedName>` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinedNameRecord {
    pub name: String,
    /// Position of the sheet the name is local to
    pub local_sheet_id: Option<usize>,
    pub formula: String,
    pub comment: Option<String>,
    pub hidden: bool,
}

/// The decoded workbook part
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorkbookPart {
    pub layout: WorkbookLayout,
    pub date1904: bool,
    pub active_tab: usize,
    pub sheets: Vec<SheetRecord>,
    pub defined_names: Vec<DefinedNameRecord>,
}

impl WorkbookPart {
    /// Build the part for a model, with one relationship id per sheet
    pub fn from_model(layout: WorkbookLayout, wb: &Workbook, rel_ids: &[String]) -> Self {
        let sheets = wb
            .worksheets()
            .zip(rel_ids)
            .map(|(ws, rel_id)| SheetRecord {
                name: ws.name().to_string(),
                sheet_id: ws.id(),
                rel_id: rel_id.clone(),
                state: ws.visibility(),
            })
            .collect();
        let defined_names = wb
            .defined_names()
            .iter()
            .filter_map(|dn| {
                let local_sheet_id = match dn.scope {
                    NameScope::Workbook => None,
                    NameScope::Sheet(id) => Some(wb.sheet_index_by_id(id)?),
                };
                Some(DefinedNameRecord {
                    name: dn.name.clone(),
                    local_sheet_id,
                    formula: dn.formula.clone(),
                    comment: dn.comment.clone(),
                    hidden: dn.hidden,
                })
            })
            .collect();
        Self {
            layout,
            date1904: wb.date_system() == cellar_core::DateSystem::V1904,
            active_tab: wb.active_sheet(),
            sheets,
            defined_names,
        }
    }

    fn read_book_views<R: BufRead>(
        &mut self,
        reader: &mut Reader<R>,
        buf: &mut Vec<u8>,
        part: &str,
    ) -> XlsxResult<()> {
        loop {
            buf.clear();
            match reader.read_event_into(buf) {
                Ok(Event::Start(e)) | Ok(Event::Empty(e))
                    if e.local_name().as_ref() == b"workbookView" =>
                {
                    let attrs = xml::attributes(&e, part)?;
                    if self.layout.book_views.is_empty() {
                        if let Some(tab) = xml::attr(&attrs, "activeTab") {
                            self.active_tab = tab.trim().parse().map_err(|_| {
                                XlsxError::invalid_part(part, "workbookView", "bad activeTab")
                            })?;
                        }
                    }
                    self.layout.book_views.push(attrs);
                }
                Ok(Event::End(e)) if e.local_name().as_ref() == b"bookViews" => return Ok(()),
                Ok(Event::Eof) => {
                    return Err(XlsxError::invalid_part(part, "bookViews", "unexpected end of part"))
                }
                Err(e) => return Err(XlsxError::xml(part, e)),
                _ => {}
            }
        }
    }

    fn read_sheets<R: BufRead>(
        &mut self,
        reader: &mut Reader<R>,
        buf: &mut Vec<u8>,
        part: &str,
        rel_prefixes: &[String],
    ) -> XlsxResult<()> {
        loop {
            buf.clear();
            match reader.read_event_into(buf) {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"sheet" => {
                    let attrs = xml::attributes(&e, part)?;
                    let name = xml::attr(&attrs, "name")
                        .ok_or_else(|| XlsxError::invalid_part(part, "sheet", "missing name"))?;
                    let sheet_id = xml::attr(&attrs, "sheetId")
                        .and_then(|id| id.trim().parse().ok())
                        .ok_or_else(|| XlsxError::invalid_part(part, "sheet", "missing or bad sheetId"))?;
                    let rel_id = xml::prefixed_attr(&attrs, rel_prefixes, "id")
                        .ok_or_else(|| XlsxError::invalid_part(part, "sheet", "missing r:id"))?;
                    let state = match xml::attr(&attrs, "state") {
                        Some(state) => SheetVisibility::parse(state).ok_or_else(|| {
                            XlsxError::invalid_part(part, "sheet", format!("bad state '{}'", state))
                        })?,
                        None => SheetVisibility::Visible,
                    };
                    self.sheets.push(SheetRecord {
                        name: name.to_string(),
                        sheet_id,
                        rel_id: rel_id.to_string(),
                        state,
                    });
                }
                Ok(Event::End(e)) if e.local_name().as_ref() == b"sheets" => return Ok(()),
                Ok(Event::Eof) => {
                    return Err(XlsxError::invalid_part(part, "sheets", "unexpected end of part"))
                }
                Err(e) => return Err(XlsxError::xml(part, e)),
                _ => {}
            }
        }
    }

    fn read_defined_names<R: BufRead>(
        &mut self,
        reader: &mut Reader<R>,
        buf: &mut Vec<u8>,
        part: &str,
    ) -> XlsxResult<()> {
        loop {
            buf.clear();
            match reader.read_event_into(buf) {
                Ok(Event::Start(e)) if e.local_name().as_ref() == b"definedName" => {
                    let attrs = xml::attributes(&e, part)?;
                    drop(e);
                    let formula = xml::read_text(reader, buf, part, "definedName")?;
                    self.push_defined_name(attrs, formula, part)?;
                }
                Ok(Event::Empty(e)) if e.local_name().as_ref() == b"definedName" => {
                    let attrs = xml::attributes(&e, part)?;
                    self.push_defined_name(attrs, String::new(), part)?;
                }
                Ok(Event::End(e)) if e.local_name().as_ref() == b"definedNames" => return Ok(()),
                Ok(Event::Eof) => {
                    return Err(XlsxError::invalid_part(part, "definedNames", "unexpected end of part"))
                }
                Err(e) => return Err(XlsxError::xml(part, e)),
                _ => {}
            }
        }
    }

    fn push_defined_name(&mut self, attrs: Attrs, formula: String, part: &str) -> XlsxResult<()> {
        let name = xml::attr(&attrs, "name")
            .ok_or_else(|| XlsxError::invalid_part(part, "definedName", "missing name"))?;
        let local_sheet_id = match xml::attr(&attrs, "localSheetId") {
            Some(id) => Some(id.trim().parse().map_err(|_| {
                XlsxError::invalid_part(part, "definedName", format!("bad localSheetId '{}'", id))
            })?),
            None => None,
        };
        self.defined_names.push(DefinedNameRecord {
            name: name.to_string(),
            local_sheet_id,
            formula,
            comment: xml::attr(&attrs, "comment").map(str::to_string),
            hidden: xml::attr(&attrs, "hidden").is_some_and(xml::parse_bool),
        });
        Ok(())
    }
}

impl PartCodec for WorkbookPart {
    const KIND: PartKind = PartKind::Workbook;

    fn decode<R: BufRead>(path: &str, input: R) -> XlsxResult<Self> {
        let mut reader = xml::reader(input);
        let mut buf = Vec::new();
        let (root, root_attrs, empty) = xml::read_root(&mut reader, &mut buf, path)?;
        if root != "workbook" {
            return Err(XlsxError::invalid_part(path, root, "expected <workbook>"));
        }
        xml::check_transitional(path, &root_attrs)?;
        let rel_prefixes = xml::relationship_prefixes(&root_attrs);

        let mut wb = WorkbookPart {
            layout: WorkbookLayout {
                root_attrs,
                slots: Vec::new(),
                workbook_pr: Vec::new(),
                book_views: Vec::new(),
            },
            ..Default::default()
        };

        while !empty {
            buf.clear();
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    let e = e.into_owned();
                    match e.local_name().as_ref() {
                        b"workbookPr" => {
                            wb.set_workbook_pr(xml::attributes(&e, path)?);
                            xml::skip_element(&mut reader, &mut buf, path, &e)?;
                            wb.layout.slots.push(WorkbookSlot::WorkbookPr);
                        }
                        b"bookViews" => {
                            wb.read_book_views(&mut reader, &mut buf, path)?;
                            wb.layout.slots.push(WorkbookSlot::BookViews);
                        }
                        b"sheets" => {
                            wb.read_sheets(&mut reader, &mut buf, path, &rel_prefixes)?;
                            wb.layout.slots.push(WorkbookSlot::Sheets);
                        }
                        b"definedNames" => {
                            wb.read_defined_names(&mut reader, &mut buf, path)?;
                            wb.layout.slots.push(WorkbookSlot::DefinedNames);
                        }
                        _ => {
                            let raw =
                                xml::capture(&mut reader, &mut buf, path, &e, false, &rel_prefixes)?;
                            wb.layout.slots.push(WorkbookSlot::Raw(raw));
                        }
                    }
                }
                Ok(Event::Empty(e)) => {
                    let e = e.into_owned();
                    match e.local_name().as_ref() {
                        b"workbookPr" => {
                            wb.set_workbook_pr(xml::attributes(&e, path)?);
                            wb.layout.slots.push(WorkbookSlot::WorkbookPr);
                        }
                        b"bookViews" => wb.layout.slots.push(WorkbookSlot::BookViews),
                        b"sheets" => wb.layout.slots.push(WorkbookSlot::Sheets),
                        b"definedNames" => wb.layout.slots.push(WorkbookSlot::DefinedNames),
                        _ => {
                            let raw =
                                xml::capture(&mut reader, &mut buf, path, &e, true, &rel_prefixes)?;
                            wb.layout.slots.push(WorkbookSlot::Raw(raw));
                        }
                    }
                }
                Ok(Event::End(_)) | Ok(Event::Eof) => break,
                Err(e) => return Err(XlsxError::xml(path, e)),
                _ => {}
            }
        }

        if wb.sheets.is_empty() {
            return Err(XlsxError::invalid_part(path, "sheets", "workbook has no sheets"));
        }
        if wb.active_tab >= wb.sheets.len() {
            log::warn!(
                "{}: activeTab {} out of range, using first sheet",
                path,
                wb.active_tab
            );
            wb.active_tab = 0;
        }
        wb.layout.complete();
        Ok(wb)
    }

    fn encode(&self) -> Vec<u8> {
        let mut root_attrs = self.layout.root_attrs.clone();
        let r = xml::ensure_namespace(&mut root_attrs, "r", xml::NS_RELATIONSHIPS);

        let mut xml = String::from(xml::XML_DECLARATION);
        xml.push_str("<workbook");
        xml::write_attrs(&mut xml, &root_attrs);
        xml.push('>');
        for slot in &self.layout.slots {
            match slot {
                WorkbookSlot::Raw(raw) => xml.push_str(&raw.xml),
                WorkbookSlot::WorkbookPr => self.write_workbook_pr(&mut xml),
                WorkbookSlot::BookViews => self.write_book_views(&mut xml),
                WorkbookSlot::Sheets => self.write_sheets(&mut xml, &r),
                WorkbookSlot::DefinedNames => self.write_defined_names(&mut xml),
            }
        }
        xml.push_str("</workbook>");
        xml.into_bytes()
    }
}

impl WorkbookPart {
    fn set_workbook_pr(&mut self, attrs: Attrs) {
        self.date1904 = xml::attr(&attrs, "date1904").is_some_and(xml::parse_bool);
        self.layout.workbook_pr = attrs;
    }

    fn write_workbook_pr(&self, xml: &mut String) {
        let mut attrs = self.layout.workbook_pr.clone();
        if self.date1904 {
            xml::set_attr(&mut attrs, "date1904", "1");
        } else {
            xml::remove_attr(&mut attrs, "date1904");
        }
        xml.push_str("<workbookPr");
        xml::write_attrs(xml, &attrs);
        xml.push_str("/>");
    }

    fn write_book_views(&self, xml: &mut String) {
        let mut views = self.layout.book_views.clone();
        if views.is_empty() {
            views.push(Vec::new());
        }
        if self.active_tab > 0 {
            xml::set_attr(&mut views[0], "activeTab", self.active_tab.to_string());
        } else {
            xml::remove_attr(&mut views[0], "activeTab");
        }
        xml.push_str("<bookViews>");
        for view in &views {
            xml.push_str("<workbookView");
            xml::write_attrs(xml, view);
            xml.push_str("/>");
        }
        xml.push_str("</bookViews>");
    }

    fn write_sheets(&self, xml: &mut String, r: &str) {
        xml.push_str("<sheets>");
        for sheet in &self.sheets {
            xml.push_str(&format!(
                "<sheet name=\"{}\" sheetId=\"{}\"",
                xml::escape_attr(&sheet.name),
                sheet.sheet_id
            ));
            if sheet.state != SheetVisibility::Visible {
                xml.push_str(&format!(" state=\"{}\"", sheet.state.as_str()));
            }
            xml.push_str(&format!(" {}:id=\"{}\"/>", r, xml::escape_attr(&sheet.rel_id)));
        }
        xml.push_str("</sheets>");
    }

    fn write_defined_names(&self, xml: &mut String) {
        if self.defined_names.is_empty() {
            return;
        }
        xml.push_str("<definedNames>");
        for dn in &self.defined_names {
            xml.push_str(&format!("<definedName name=\"{}\"", xml::escape_attr(&dn.name)));
            if let Some(comment) = &dn.comment {
                xml.push_str(&format!(" comment=\"{}\"", xml::escape_attr(comment)));
            }
            if let Some(local) = dn.local_sheet_id {
                xml.push_str(&format!(" localSheetId=\"{}\"", local));
            }
            if dn.hidden {
                xml.push_str(" hidden=\"1\"");
            }
            xml.push('>');
            xml.push_str(&xml::escape_text(&dn.formula));
            xml.push_str("</definedName>");
        }
        xml.push_str("</definedNames>");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:rel="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><fileVersion appName="xl" lastEdited="7"/><workbookPr date1904="1" defaultThemeVersion="166925"/><bookViews><workbookView xWindow="0" yWindow="0" activeTab="1"/></bookViews><sheets><sheet name="Data" sheetId="3" rel:id="rId1"/><sheet name="Hidden &amp; Co" sheetId="7" state="hidden" rel:id="rId2"/></sheets><definedNames><definedName name="_xlnm.Print_Area" localSheetId="0">Data!$A$1:$C$4</definedName><definedName name="Rate" comment="tax">0.2</definedName></definedNames><calcPr calcId="191029"/></workbook>"#;

    #[test]
    fn test_decode() {
        let wb = WorkbookPart::decode("xl/workbook.xml", WORKBOOK.as_bytes()).unwrap();
        assert!(wb.date1904);
        assert_eq!(wb.active_tab, 1);
        assert_eq!(
            wb.sheets[1],
            SheetRecord {
                name: "Hidden & Co".into(),
                sheet_id: 7,
                rel_id: "rId2".into(),
                state: SheetVisibility::Hidden,
            }
        );
        assert_eq!(wb.defined_names[0].local_sheet_id, Some(0));
        assert_eq!(wb.defined_names[0].formula, "Data!$A$1:$C$4");
        assert_eq!(wb.defined_names[1].comment.as_deref(), Some("tax"));
    }

    #[test]
    fn test_encode_keeps_unknown_elements_and_prefix() {
        let wb = WorkbookPart::decode("xl/workbook.xml", WORKBOOK.as_bytes()).unwrap();
        let out = String::from_utf8(wb.encode()).unwrap();
        assert!(out.contains("<fileVersion appName=\"xl\" lastEdited=\"7\"/>"));
        assert!(out.contains("<calcPr calcId=\"191029\"/>"));
        assert!(out.contains("defaultThemeVersion=\"166925\""));
        assert!(out.contains("rel:id=\"rId2\""));
        assert!(!out.contains("xmlns:r="));

        let again = WorkbookPart::decode("xl/workbook.xml", out.as_bytes()).unwrap();
        assert_eq!(again, wb);
    }

    #[test]
    fn test_active_tab_zero_removes_attribute() {
        let mut wb = WorkbookPart::decode("xl/workbook.xml", WORKBOOK.as_bytes()).unwrap();
        wb.active_tab = 0;
        wb.date1904 = false;
        let out = String::from_utf8(wb.encode()).unwrap();
        assert!(out.contains("<workbookView xWindow=\"0\" yWindow=\"0\"/>"));
        assert!(!out.contains("date1904"));
    }

    #[test]
    fn test_no_sheets_is_invalid() {
        let xml = r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheets/></workbook>"#;
        assert!(matches!(
            WorkbookPart::decode("xl/workbook.xml", xml.as_bytes()),
            Err(XlsxError::InvalidPart { .. })
        ));
    }

    #[test]
    fn test_missing_slots_inserted() {
        let xml = r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="A" sheetId="1" r:id="rId1"/></sheets><calcPr/></workbook>"#;
        let wb = WorkbookPart::decode("xl/workbook.xml", xml.as_bytes()).unwrap();
        let names: Vec<_> = wb.layout.slots.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["workbookPr", "bookViews", "sheets", "definedNames", "calcPr"]);
    }

    #[test]
    fn test_from_model() {
        let mut model = Workbook::new();
        model.add_sheet("Two").unwrap();
        model
            .set_defined_name("Local", NameScope::Sheet(2), "Two!$A$1")
            .unwrap();
        let part = WorkbookPart::from_model(
            WorkbookLayout::default(),
            &model,
            &["rId1".to_string(), "rId2".to_string()],
        );
        assert_eq!(part.sheets.len(), 2);
        assert_eq!(part.sheets[1].sheet_id, 2);
        assert_eq!(part.defined_names[0].local_sheet_id, Some(1));
        let out = String::from_utf8(part.encode()).unwrap();
        assert!(out.contains("<sheet name=\"Two\" sheetId=\"2\" r:id=\"rId2\"/>"));
    }
}
