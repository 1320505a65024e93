//! Parts the model does not own: comments, drawings, charts, slicers and
//! sheet backgrounds
//!
//! These parts are edited as element trees and held in the package's part
//! overlay until save. Dropping the last reference to a part prunes it, and
//! every part only it reached, from the relationship graph.

use std::collections::BTreeSet;

use cellar_core::{CellAddress, NameScope};

use super::{Package, SheetKind};
use crate::codec::drawing::{self, Anchor, Graphic};
use crate::codec::{comments, encode_chart, slicer, Chart, SheetLayout, WorkbookSlot};
use crate::content_types::{image_content_type, CT_CHART, CT_DRAWING};
use crate::dom::Document;
use crate::error::{XlsxError, XlsxResult};
use crate::rels::{
    Relationship, REL_CHART, REL_COMMENTS, REL_DRAWING, REL_IMAGE, REL_SLICER, REL_SLICER_CACHE,
    REL_VML_DRAWING,
};
use crate::xml::{self, RawFragment};

/// Qualified `id` attribute for relationship references in a sheet
fn rel_attr(layout: &mut SheetLayout) -> String {
    let prefix = xml::ensure_namespace(&mut layout.root_attrs, "r", xml::NS_RELATIONSHIPS);
    format!("{}:id", prefix)
}

/// A one-element slot referencing a relationship, like `<drawing r:id="rId2"/>`
fn rel_slot(layout: &mut SheetLayout, name: &str, rel_id: &str) -> RawFragment {
    let attr = rel_attr(layout);
    RawFragment {
        name: name.to_string(),
        xml: format!(r#"<{} {}="{}"/>"#, name, attr, xml::escape_attr(rel_id)),
        rel_ids: vec![rel_id.to_string()],
    }
}

/// A removed slicer and what it left behind
struct FoundSlicer {
    sheet: usize,
    rel: Relationship,
    doc: Document,
    cache: String,
}

impl Package {
    // ==================== Part overlay ====================

    /// Current bytes of a part outside the model
    fn part_bytes(&self, path: &str) -> XlsxResult<Vec<u8>> {
        match self.parts.get(path) {
            Some(bytes) => Ok(bytes.clone()),
            None => self.archive()?.read_part(path),
        }
    }

    fn read_document(&self, path: &str) -> XlsxResult<Document> {
        Document::parse(path, &self.part_bytes(path)?)
    }

    fn put_part(&mut self, path: &str, bytes: Vec<u8>) {
        self.removed.remove(path);
        self.parts.insert(path.to_string(), bytes);
    }

    /// First free part name beside the main part
    fn next_part_name(&self, file: impl Fn(u32) -> String) -> String {
        (1..)
            .map(|n| self.part_beside_main(&file(n)))
            .find(|p| !self.part_exists(p))
            .unwrap_or_default()
    }

    fn check_sheet_writable(&self, sheet: usize, operation: &'static str) -> XlsxResult<()> {
        self.check_editable(sheet)?;
        if let Some(ws) = self.workbook.worksheet(sheet) {
            ws.check_write(operation)?;
        }
        Ok(())
    }

    /// Change a sheet's preserved elements; the sheet is re-encoded on save
    fn edit_layout<T>(
        &mut self,
        sheet: usize,
        operation: &'static str,
        f: impl FnOnce(&mut SheetLayout) -> T,
    ) -> XlsxResult<T> {
        self.check_editable(sheet)?;
        self.load_sheet(sheet)?;
        let count = self.sheets.len();
        self.workbook
            .worksheet_mut(sheet)
            .ok_or(cellar_core::Error::SheetOutOfBounds(sheet, count))?
            .begin_buffered_write(operation)?;
        let entry = self
            .sheets
            .get_mut(sheet)
            .ok_or_else(|| XlsxError::InvalidPackage(format!("no sheet {}", sheet)))?;
        Ok(f(&mut entry.layout))
    }

    /// Drop the drawing edges that only `gone` anchors used
    fn release_anchor_edges(&mut self, drawing_path: &str, gone: &[Anchor], kept: &[Anchor]) {
        let in_use: BTreeSet<&String> = kept.iter().flat_map(|a| &a.rel_ids).collect();
        let unused: BTreeSet<String> = gone
            .iter()
            .flat_map(|a| &a.rel_ids)
            .filter(|id| !in_use.contains(id))
            .cloned()
            .collect();
        for id in &unused {
            self.rels.remove_edge(drawing_path, id);
        }
    }

    // ==================== Comments ====================

    /// Remove the comment on a cell
    ///
    /// The cell's note shape in the sheet's VML drawing goes with it. When
    /// the last comment goes, the comments part, its relationship and its
    /// content type go too, and so does a VML drawing left without shapes.
    /// A cell without a comment is left alone.
    pub fn delete_comment(&mut self, sheet: usize, cell: CellAddress) -> XlsxResult<()> {
        self.check_sheet_writable(sheet, "delete_comment")?;
        let sheet_path = self.entry(sheet)?.path.clone();
        let Some(rel) = self.rels.find_by_type(&sheet_path, REL_COMMENTS).cloned() else {
            return Ok(());
        };
        let mut doc = self.read_document(&rel.target)?;
        if comments::remove_comment(&mut doc, cell) == 0 {
            return Ok(());
        }

        let before = self.rels.reachable_parts();
        self.delete_note_shape(sheet, &sheet_path, cell)?;
        if comments::comment_count(&doc) == 0 {
            self.rels.remove_edge(&sheet_path, &rel.id);
        } else {
            self.put_part(&rel.target, doc.to_bytes());
        }
        let pruned = self.prune(&before);
        log::debug!(
            "deleted comment at {}!{} ({} parts pruned)",
            sheet_path,
            cell.to_a1_string(),
            pruned
        );
        self.touch();
        Ok(())
    }

    fn delete_note_shape(&mut self, sheet: usize, sheet_path: &str, cell: CellAddress) -> XlsxResult<()> {
        let Some(rel) = self.rels.find_by_type(sheet_path, REL_VML_DRAWING).cloned() else {
            return Ok(());
        };
        let mut doc = match self.read_document(&rel.target) {
            Ok(doc) => doc,
            Err(err) => {
                log::warn!("keeping note shapes of {}: {}", rel.target, err);
                return Ok(());
            }
        };
        if comments::remove_note_shape(&mut doc, cell) == 0 {
            return Ok(());
        }
        if comments::shape_count(&doc) > 0 {
            self.put_part(&rel.target, doc.to_bytes());
            return Ok(());
        }
        self.edit_layout(sheet, "delete_comment", |layout| layout.remove_raw("legacyDrawing"))?;
        self.rels.remove_edge(sheet_path, &rel.id);
        Ok(())
    }

    // ==================== Drawings ====================

    /// Remove the pictures anchored at a cell
    ///
    /// An image part goes once no anchor references it.
    pub fn delete_picture(&mut self, sheet: usize, cell: CellAddress) -> XlsxResult<()> {
        self.delete_anchored(sheet, cell, Graphic::Picture, "delete_picture")
    }

    /// Remove the charts anchored at a cell, with their chart parts
    pub fn delete_chart(&mut self, sheet: usize, cell: CellAddress) -> XlsxResult<()> {
        self.delete_anchored(sheet, cell, Graphic::Chart, "delete_chart")
    }

    fn delete_anchored(
        &mut self,
        sheet: usize,
        cell: CellAddress,
        graphic: Graphic,
        operation: &'static str,
    ) -> XlsxResult<()> {
        self.check_sheet_writable(sheet, operation)?;
        let sheet_path = self.entry(sheet)?.path.clone();
        let Some(drawing_path) = self
            .rels
            .find_by_type(&sheet_path, REL_DRAWING)
            .map(|r| r.target.clone())
        else {
            return Ok(());
        };
        let mut doc = self.read_document(&drawing_path)?;
        let (gone, kept): (Vec<Anchor>, Vec<Anchor>) = drawing::anchors(&doc)
            .into_iter()
            .partition(|a| a.graphic == graphic && a.is_at(cell));
        if gone.is_empty() {
            return Ok(());
        }

        let positions: Vec<usize> = gone.iter().map(|a| a.position).collect();
        drawing::remove_anchors(&mut doc, &positions);
        let before = self.rels.reachable_parts();
        self.put_part(&drawing_path, doc.to_bytes());
        self.release_anchor_edges(&drawing_path, &gone, &kept);
        let pruned = self.prune(&before);
        log::debug!(
            "{}: removed {} anchors at {}!{} ({} parts pruned)",
            operation,
            gone.len(),
            sheet_path,
            cell.to_a1_string(),
            pruned
        );
        self.touch();
        Ok(())
    }

    /// Add a chart anchored at a cell
    ///
    /// The chart part is generated from `chart`. A sheet without a drawing
    /// gets one. Chart parts are written, never read back.
    pub fn add_chart(&mut self, sheet: usize, cell: CellAddress, chart: &Chart) -> XlsxResult<()> {
        chart.validate()?;
        self.check_sheet_writable(sheet, "add_chart")?;
        let sheet_path = self.entry(sheet)?.path.clone();
        let existing = self
            .rels
            .find_by_type(&sheet_path, REL_DRAWING)
            .map(|r| r.target.clone());
        let (drawing_path, mut doc) = match existing {
            Some(path) => {
                let doc = self.read_document(&path)?;
                (path, doc)
            }
            None => {
                self.load_sheet(sheet)?;
                let path = self.next_part_name(|n| format!("drawings/drawing{}.xml", n));
                let rel_id = self.rels.add_edge(&sheet_path, &path, REL_DRAWING);
                self.content_types.set_override(&path, CT_DRAWING);
                self.edit_layout(sheet, "add_chart", |layout| {
                    let slot = rel_slot(layout, "drawing", &rel_id);
                    layout.place(slot);
                })?;
                (path, drawing::blank())
            }
        };

        let chart_path = self.next_part_name(|n| format!("charts/chart{}.xml", n));
        let rel_id = self.rels.add_edge(&drawing_path, &chart_path, REL_CHART);
        drawing::append_chart(&mut doc, &drawing_path, cell, chart, &rel_id)?;
        self.put_part(&drawing_path, doc.to_bytes());
        self.put_part(&chart_path, encode_chart(chart));
        self.content_types.set_override(&chart_path, CT_CHART);
        log::debug!(
            "added {:?} chart {} at {}!{}",
            chart.kind,
            chart_path,
            sheet_path,
            cell.to_a1_string()
        );
        self.touch();
        Ok(())
    }

    // ==================== Backgrounds ====================

    /// Use an image as a sheet's background
    ///
    /// `extension` names the image format (`png`, `.jpeg`, ...). A previous
    /// background image is pruned once nothing else references it.
    pub fn set_sheet_background_from_bytes(
        &mut self,
        sheet: usize,
        extension: &str,
        bytes: &[u8],
    ) -> XlsxResult<()> {
        let ext = extension.trim().trim_start_matches('.').to_ascii_lowercase();
        let content_type = image_content_type(&ext).ok_or_else(|| {
            XlsxError::InvalidArgument(format!("unsupported image extension '{}'", extension))
        })?;
        if bytes.is_empty() {
            return Err(XlsxError::InvalidArgument("background image is empty".into()));
        }
        self.check_sheet_writable(sheet, "set_sheet_background")?;
        self.load_sheet(sheet)?;

        let sheet_path = self.entry(sheet)?.path.clone();
        let media = self.next_part_name(|n| format!("media/image{}.{}", n, ext));
        let before = self.rels.reachable_parts();
        let rel_id = self.rels.add_edge(&sheet_path, &media, REL_IMAGE);
        let replaced = self.edit_layout(sheet, "set_sheet_background", |layout| {
            let old = layout
                .raw("picture")
                .map(|p| p.rel_ids.clone())
                .unwrap_or_default();
            let slot = rel_slot(layout, "picture", &rel_id);
            layout.place(slot);
            old
        })?;
        for id in &replaced {
            self.rels.remove_edge(&sheet_path, id);
        }
        self.put_part(&media, bytes.to_vec());
        if self.content_types.content_type_of(&media).is_none() {
            self.content_types.set_default(&ext, content_type);
        }
        let pruned = self.prune(&before);
        log::debug!("background of {} is {} ({} parts pruned)", sheet_path, media, pruned);
        self.touch();
        Ok(())
    }

    // ==================== Slicers ====================

    /// Slicers parts of every worksheet
    fn slicer_parts(&self) -> Vec<(usize, Relationship)> {
        self.sheets
            .iter()
            .enumerate()
            .filter(|(_, e)| e.kind == SheetKind::Worksheet)
            .flat_map(|(i, e)| {
                self.rels
                    .edges_from(&e.path)
                    .iter()
                    .filter(|r| r.rel_type == REL_SLICER && !r.external)
                    .map(move |r| (i, r.clone()))
            })
            .collect()
    }

    /// The workbook's relationship to the cache definition called `cache`
    fn slicer_cache_edge(&self, cache: &str) -> XlsxResult<Option<String>> {
        for rel in self
            .rels
            .edges_from(&self.main_part)
            .iter()
            .filter(|r| r.rel_type == REL_SLICER_CACHE && !r.external)
        {
            if slicer::cache_name(&self.read_document(&rel.target)?) == Some(cache) {
                return Ok(Some(rel.id.clone()));
            }
        }
        Ok(None)
    }

    /// Remove a slicer by name
    ///
    /// Slicer names are unique in a workbook, so no sheet is named. The
    /// slicer's drawing anchor goes with it. A slicers part left empty is
    /// dropped along with its `extLst` entry. A cache no other slicer uses
    /// is dropped along with its workbook entry and defined name.
    pub fn delete_slicer(&mut self, name: &str) -> XlsxResult<()> {
        self.check_open()?;
        let mut found = None;
        let mut caches_in_use = BTreeSet::new();
        for (sheet, rel) in self.slicer_parts() {
            let mut doc = self.read_document(&rel.target)?;
            if found.is_none() {
                if let Some(cache) = slicer::remove_slicer(&mut doc, name) {
                    caches_in_use.extend(slicer::caches(&doc));
                    found = Some(FoundSlicer { sheet, rel, doc, cache });
                    continue;
                }
            }
            caches_in_use.extend(slicer::caches(&doc));
        }
        let FoundSlicer { sheet, rel, doc, cache } = found.ok_or_else(|| {
            XlsxError::InvalidArgument(format!("slicer '{}' does not exist", name))
        })?;
        self.check_sheet_writable(sheet, "delete_slicer")?;
        self.load_sheet(sheet)?;
        let sheet_path = self.entry(sheet)?.path.clone();

        // Everything fallible is read before the first change
        let drawing = match self.rels.find_by_type(&sheet_path, REL_DRAWING).cloned() {
            Some(d) => {
                let mut drawing_doc = self.read_document(&d.target)?;
                let (gone, kept): (Vec<Anchor>, Vec<Anchor>) = drawing::anchors(&drawing_doc)
                    .into_iter()
                    .partition(|a| a.graphic == Graphic::Slicer(name.to_string()));
                let positions: Vec<usize> = gone.iter().map(|a| a.position).collect();
                drawing::remove_anchors(&mut drawing_doc, &positions);
                (!gone.is_empty()).then_some((d.target, drawing_doc, gone, kept))
            }
            None => None,
        };
        let cache_edge = if caches_in_use.contains(&cache) {
            None
        } else {
            self.slicer_cache_edge(&cache)?
        };
        let workbook_ext = match &cache_edge {
            Some(id) => self.workbook_ext_without(id)?,
            None => None,
        };
        let part_empty = slicer::slicer_count(&doc) == 0;
        if part_empty {
            let prefixes = xml::relationship_prefixes(&self.entry(sheet)?.layout.root_attrs);
            let ext = match self.entry(sheet)?.layout.raw("extLst") {
                Some(raw) => Some(slicer::prune_ext_list(
                    &sheet_path,
                    raw,
                    "slicerList",
                    "slicer",
                    &rel.id,
                    &prefixes,
                )?),
                None => None,
            };
            self.edit_layout(sheet, "delete_slicer", |layout| match ext {
                Some(Some(kept)) => layout.place(kept),
                Some(None) => {
                    layout.remove_raw("extLst");
                }
                None => {}
            })?;
        }

        let before = self.rels.reachable_parts();
        if let Some((drawing_path, drawing_doc, gone, kept)) = drawing {
            self.put_part(&drawing_path, drawing_doc.to_bytes());
            self.release_anchor_edges(&drawing_path, &gone, &kept);
        }
        if part_empty {
            self.rels.remove_edge(&sheet_path, &rel.id);
        } else {
            self.put_part(&rel.target, doc.to_bytes());
        }
        if let Some(id) = &cache_edge {
            match workbook_ext {
                Some((pos, Some(kept))) => {
                    if let Some(slot) = self.workbook_layout.slots.get_mut(pos) {
                        *slot = WorkbookSlot::Raw(kept);
                    }
                }
                Some((pos, None)) => {
                    self.workbook_layout.slots.remove(pos);
                }
                None => {}
            }
            let main_part = self.main_part.clone();
            self.rels.remove_edge(&main_part, id);
            if self.workbook.remove_defined_name(&cache, NameScope::Workbook).is_err() {
                log::debug!("slicer cache {} had no defined name", cache);
            }
        }
        let pruned = self.prune(&before);
        log::debug!("deleted slicer {} ({} parts pruned)", name, pruned);
        self.touch();
        Ok(())
    }

    /// The workbook's `extLst` slot with the cache entry for `rel_id` dropped
    ///
    /// Returns the slot position and its new content, `None` when nothing is
    /// left of it.
    fn workbook_ext_without(&self, rel_id: &str) -> XlsxResult<Option<(usize, Option<RawFragment>)>> {
        let Some((pos, raw)) = self
            .workbook_layout
            .slots
            .iter()
            .enumerate()
            .find_map(|(i, slot)| match slot {
                WorkbookSlot::Raw(raw) if raw.name == "extLst" => Some((i, raw)),
                _ => None,
            })
        else {
            return Ok(None);
        };
        let prefixes = xml::relationship_prefixes(&self.workbook_layout.root_attrs);
        let kept = slicer::prune_ext_list(
            &self.main_part,
            raw,
            "slicerCaches",
            "slicerCache",
            rel_id,
            &prefixes,
        )?;
        Ok(Some((pos, kept)))
    }
}
