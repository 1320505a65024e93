//! Relationship graph
//!
//! Every `*.rels` part lists the outgoing edges of one source part. Edges are
//! kept in a table keyed by source part path; nothing in the model points
//! back at the parts that reference it. Internal targets are stored as
//! package-absolute part paths and written back relative to their source.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::io::BufRead;

use quick_xml::events::Event;
use rayon::prelude::*;

use crate::error::{XlsxError, XlsxResult};
use crate::xml;

pub const REL_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
pub const REL_WORKSHEET: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
pub const REL_SHARED_STRINGS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings";
pub const REL_STYLES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
pub const REL_CALC_CHAIN: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain";
pub const REL_CORE_PROPERTIES: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties";
pub const REL_VBA_PROJECT: &str = "http://schemas.microsoft.com/office/2006/relationships/vbaProject";
pub const REL_DRAWING: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/drawing";
pub const REL_CHART: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/chart";
pub const REL_IMAGE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
pub const REL_COMMENTS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/comments";
pub const REL_VML_DRAWING: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/vmlDrawing";
pub const REL_SLICER: &str = "http://schemas.microsoft.com/office/2007/relationships/slicer";
pub const REL_SLICER_CACHE: &str = "http://schemas.microsoft.com/office/2007/relationships/slicerCache";

/// The package root, as a relationship source
pub const PACKAGE_ROOT: &str = "";

/// One edge of the graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    /// Package-absolute part path, or the URI of an external target
    pub target: String,
    pub external: bool,
    /// Target as written in the file, reused while the edge is unchanged
    written: Option<String>,
}

impl Relationship {
    /// Last segment of the relationship type (`worksheet`, `styles`, ...)
    pub fn kind(&self) -> &str {
        self.rel_type.rsplit('/').next().unwrap_or(&self.rel_type)
    }
}

/// Path of the `.rels` part that holds a source's relationships
pub fn rels_path_for(source: &str) -> String {
    if source.is_empty() {
        return "_rels/.rels".to_string();
    }
    match source.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", source),
    }
}

/// Source part of a `.rels` part, or `None` if the path is not one
pub fn source_for_rels(path: &str) -> Option<String> {
    let path = path.trim_start_matches('/');
    let (dir, file) = match path.rsplit_once('/') {
        Some((dir, file)) => (dir, file),
        None => return None,
    };
    let file = file.strip_suffix(".rels")?;
    let parent = if dir == "_rels" {
        ""
    } else {
        dir.strip_suffix("/_rels")?
    };
    Some(match (parent, file) {
        ("", "") => PACKAGE_ROOT.to_string(),
        ("", file) => file.to_string(),
        (parent, file) => format!("{}/{}", parent, file),
    })
}

fn source_dir(source: &str) -> &str {
    source.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Resolve a target written in `source`'s rels to a package-absolute path
pub fn resolve_target(source: &str, target: &str) -> String {
    let target = target.split('#').next().unwrap_or(target);
    let joined = match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => {
            let dir = source_dir(source);
            if dir.is_empty() {
                target.to_string()
            } else {
                format!("{}/{}", dir, target)
            }
        }
    };
    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// Express a package-absolute path relative to `source`'s directory
pub fn relative_target(source: &str, path: &str) -> String {
    let dir = source_dir(source);
    if dir.is_empty() {
        return path.to_string();
    }
    let from: Vec<&str> = dir.split('/').collect();
    let to: Vec<&str> = path.split('/').collect();
    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut parts: Vec<&str> = vec![".."; from.len() - common];
    parts.extend(&to[common..]);
    parts.join("/")
}

/// Parse one `.rels` part
pub fn decode_rels<R: BufRead>(part: &str, input: R) -> XlsxResult<Vec<Relationship>> {
    let source = source_for_rels(part)
        .ok_or_else(|| XlsxError::invalid_part(part, "Relationships", "not a .rels part name"))?;
    let mut reader = xml::reader(input);
    let mut buf = Vec::new();
    let (root, _, empty) = xml::read_root(&mut reader, &mut buf, part)?;
    if root != "Relationships" {
        return Err(XlsxError::invalid_part(part, root, "expected <Relationships>"));
    }
    let mut rels = Vec::new();
    if empty {
        return Ok(rels);
    }

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() != b"Relationship" {
                    continue;
                }
                let attrs = xml::attributes(&e, part)?;
                let (Some(id), Some(rel_type), Some(target)) = (
                    xml::attr(&attrs, "Id"),
                    xml::attr(&attrs, "Type"),
                    xml::attr(&attrs, "Target"),
                ) else {
                    return Err(XlsxError::invalid_part(
                        part,
                        "Relationship",
                        "missing Id, Type or Target",
                    ));
                };
                let external = xml::attr(&attrs, "TargetMode") == Some("External");
                if rel_type.starts_with("http://purl.oclc.org/ooxml/") {
                    return Err(XlsxError::UnsupportedFormatVersion(format!(
                        "{} uses strict OOXML relationship types",
                        part
                    )));
                }
                rels.push(Relationship {
                    id: id.to_string(),
                    rel_type: rel_type.to_string(),
                    target: if external {
                        target.to_string()
                    } else {
                        resolve_target(&source, target)
                    },
                    external,
                    written: Some(target.to_string()),
                });
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(XlsxError::xml(part, e)),
            _ => {}
        }
    }
    Ok(rels)
}

/// Serialize the relationships of one source
pub fn encode_rels(source: &str, rels: &[Relationship]) -> Vec<u8> {
    let mut xml = String::from(xml::XML_DECLARATION);
    xml.push_str(&format!(
        "<Relationships xmlns=\"{}\">",
        xml::NS_PACKAGE_RELATIONSHIPS
    ));
    for rel in rels {
        let target = match &rel.written {
            Some(written) => written.clone(),
            None if rel.external => rel.target.clone(),
            None => relative_target(source, &rel.target),
        };
        xml.push_str(&format!(
            "<Relationship Id=\"{}\" Type=\"{}\" Target=\"{}\"",
            xml::escape_attr(&rel.id),
            xml::escape_attr(&rel.rel_type),
            xml::escape_attr(&target)
        ));
        if rel.external {
            xml.push_str(" TargetMode=\"External\"");
        }
        xml.push_str("/>");
    }
    xml.push_str("</Relationships>");
    xml.into_bytes()
}

fn numeric_id(id: &str) -> Option<u32> {
    id.strip_prefix("rId")?.parse().ok()
}

/// All relationships of a package
#[derive(Debug, Clone, Default)]
pub struct RelationshipGraph {
    edges: BTreeMap<String, Vec<Relationship>>,
    next_ids: BTreeMap<String, u32>,
    dirty: BTreeSet<String>,
}

impl RelationshipGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph from `(rels part path, bytes)` pairs, parsing in parallel
    pub fn resolve(parts: &[(String, Vec<u8>)]) -> XlsxResult<Self> {
        let parsed: Vec<(String, Vec<Relationship>)> = parts
            .par_iter()
            .map(|(path, bytes)| {
                let source = source_for_rels(path).ok_or_else(|| {
                    XlsxError::invalid_part(path.as_str(), "Relationships", "not a .rels part name")
                })?;
                Ok((source, decode_rels(path, &bytes[..])?))
            })
            .collect::<XlsxResult<_>>()?;

        let mut graph = Self::new();
        for (source, rels) in parsed {
            let highest = rels.iter().filter_map(|r| numeric_id(&r.id)).max().unwrap_or(0);
            graph.next_ids.insert(source.clone(), highest + 1);
            graph.edges.insert(source, rels);
        }
        Ok(graph)
    }

    /// Add an internal edge and return its new id
    ///
    /// Ids are `rId{n}` with `n` above every id seen or handed out for the
    /// source, so a removed id is never reused.
    pub fn add_edge(&mut self, source: &str, target: &str, rel_type: &str) -> String {
        let next = self.next_ids.entry(source.to_string()).or_insert(1);
        let id = format!("rId{}", next);
        *next += 1;
        self.edges
            .entry(source.to_string())
            .or_default()
            .push(Relationship {
                id: id.clone(),
                rel_type: rel_type.to_string(),
                target: target.trim_start_matches('/').to_string(),
                external: false,
                written: None,
            });
        self.dirty.insert(source.to_string());
        id
    }

    /// Remove an edge, returning it
    pub fn remove_edge(&mut self, source: &str, id: &str) -> Option<Relationship> {
        let rels = self.edges.get_mut(source)?;
        let pos = rels.iter().position(|r| r.id == id)?;
        self.dirty.insert(source.to_string());
        Some(rels.remove(pos))
    }

    /// Drop every edge whose source is `source`
    pub fn remove_source(&mut self, source: &str) -> Vec<Relationship> {
        self.dirty.remove(source);
        self.edges.remove(source).unwrap_or_default()
    }

    /// Drop every internal edge pointing at `target`; returns the sources touched
    pub fn remove_edges_to(&mut self, target: &str) -> Vec<String> {
        let mut touched = Vec::new();
        for (source, rels) in &mut self.edges {
            let before = rels.len();
            rels.retain(|r| r.external || r.target != target);
            if rels.len() != before {
                touched.push(source.clone());
            }
        }
        self.dirty.extend(touched.iter().cloned());
        touched
    }

    /// Point an existing edge at a different part
    pub fn retarget(&mut self, source: &str, id: &str, target: &str) -> XlsxResult<()> {
        let rel = self
            .edges
            .get_mut(source)
            .and_then(|rels| rels.iter_mut().find(|r| r.id == id))
            .ok_or_else(|| XlsxError::dangling(source, id))?;
        rel.target = target.trim_start_matches('/').to_string();
        rel.external = false;
        rel.written = None;
        self.dirty.insert(source.to_string());
        Ok(())
    }

    /// Target part of an edge
    pub fn target_of(&self, source: &str, id: &str) -> XlsxResult<&str> {
        self.edges
            .get(source)
            .and_then(|rels| rels.iter().find(|r| r.id == id))
            .map(|r| r.target.as_str())
            .ok_or_else(|| XlsxError::dangling(source, id))
    }

    pub fn edge(&self, source: &str, id: &str) -> Option<&Relationship> {
        self.edges.get(source)?.iter().find(|r| r.id == id)
    }

    pub fn edges_from(&self, source: &str) -> &[Relationship] {
        self.edges.get(source).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First edge of a type (matched on the full type URI)
    pub fn find_by_type(&self, source: &str, rel_type: &str) -> Option<&Relationship> {
        self.edges_from(source).iter().find(|r| r.rel_type == rel_type)
    }

    /// Check that every id in `ids` is an edge of `source`
    pub fn check_ids<'a>(&self, source: &str, ids: impl IntoIterator<Item = &'a String>) -> XlsxResult<()> {
        for id in ids {
            self.target_of(source, id)?;
        }
        Ok(())
    }

    /// Sources that have a relationships part
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    /// Sources whose edges changed since the graph was read
    pub fn is_dirty(&self, source: &str) -> bool {
        self.dirty.contains(source)
    }

    /// Parts reachable from the package root over internal edges
    pub fn reachable_parts(&self) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([PACKAGE_ROOT.to_string()]);
        while let Some(source) = queue.pop_front() {
            for rel in self.edges_from(&source) {
                if !rel.external && seen.insert(rel.target.clone()) {
                    queue.push_back(rel.target.clone());
                }
            }
        }
        seen
    }

    /// Check that internal targets exist
    ///
    /// In strict mode the first dangling edge fails the check. Otherwise
    /// dangling edges are logged and dropped.
    pub fn validate(&mut self, existing: &BTreeSet<String>, strict: bool) -> XlsxResult<()> {
        let exists = |target: &str| {
            existing.contains(target)
                || existing.iter().any(|p| p.eq_ignore_ascii_case(target))
        };
        for (source, rels) in &mut self.edges {
            let before = rels.len();
            let mut failure = None;
            rels.retain(|rel| {
                if rel.external || exists(&rel.target) {
                    return true;
                }
                if strict {
                    failure.get_or_insert_with(|| rel.id.clone());
                    return true;
                }
                log::warn!(
                    "dropping relationship {} from '{}': target '{}' does not exist",
                    rel.id,
                    source,
                    rel.target
                );
                false
            });
            if let Some(id) = failure {
                return Err(XlsxError::dangling(source.as_str(), id));
            }
            if rels.len() != before {
                self.dirty.insert(source.clone());
            }
        }
        Ok(())
    }

    /// Serialize the relationships of a source
    pub fn encode_source(&self, source: &str) -> Vec<u8> {
        encode_rels(source, self.edges_from(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId7" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com" TargetMode="External"/></Relationships>"#;

    fn graph() -> RelationshipGraph {
        RelationshipGraph::resolve(&[(
            "xl/_rels/workbook.xml.rels".to_string(),
            WORKBOOK_RELS.as_bytes().to_vec(),
        )])
        .unwrap()
    }

    #[test]
    fn test_rels_paths() {
        assert_eq!(rels_path_for(""), "_rels/.rels");
        assert_eq!(rels_path_for("xl/workbook.xml"), "xl/_rels/workbook.xml.rels");
        assert_eq!(source_for_rels("_rels/.rels").as_deref(), Some(""));
        assert_eq!(
            source_for_rels("xl/worksheets/_rels/sheet1.xml.rels").as_deref(),
            Some("xl/worksheets/sheet1.xml")
        );
        assert_eq!(source_for_rels("xl/workbook.xml"), None);
    }

    #[test]
    fn test_target_resolution() {
        assert_eq!(resolve_target("xl/workbook.xml", "worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
        assert_eq!(resolve_target("xl/worksheets/sheet1.xml", "../drawings/drawing1.xml"), "xl/drawings/drawing1.xml");
        assert_eq!(resolve_target("xl/workbook.xml", "/xl/styles.xml"), "xl/styles.xml");
        assert_eq!(resolve_target("", "xl/workbook.xml"), "xl/workbook.xml");
        assert_eq!(relative_target("xl/worksheets/sheet1.xml", "xl/drawings/drawing1.xml"), "../drawings/drawing1.xml");
        assert_eq!(relative_target("xl/workbook.xml", "xl/worksheets/sheet2.xml"), "worksheets/sheet2.xml");
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut g = graph();
        assert_eq!(g.target_of("xl/workbook.xml", "rId1").unwrap(), "xl/worksheets/sheet1.xml");
        let id = g.add_edge("xl/workbook.xml", "xl/worksheets/sheet2.xml", REL_WORKSHEET);
        assert_eq!(id, "rId8");
        g.remove_edge("xl/workbook.xml", &id).unwrap();
        assert_eq!(g.add_edge("xl/workbook.xml", "xl/worksheets/sheet3.xml", REL_WORKSHEET), "rId9");
        assert!(g.is_dirty("xl/workbook.xml"));
    }

    #[test]
    fn test_unknown_id_is_dangling() {
        let g = graph();
        assert!(matches!(
            g.target_of("xl/workbook.xml", "rId42"),
            Err(XlsxError::DanglingRelationship { .. })
        ));
    }

    #[test]
    fn test_validate_strict_and_lenient() {
        let existing: BTreeSet<String> = ["xl/styles.xml".to_string()].into();
        let mut g = graph();
        assert!(matches!(
            g.validate(&existing, true),
            Err(XlsxError::DanglingRelationship { .. })
        ));
        let mut g = graph();
        g.validate(&existing, false).unwrap();
        let ids: Vec<_> = g.edges_from("xl/workbook.xml").iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["rId3", "rId7"]);
    }

    #[test]
    fn test_reachable_parts() {
        let mut g = RelationshipGraph::new();
        g.add_edge(PACKAGE_ROOT, "xl/workbook.xml", REL_OFFICE_DOCUMENT);
        let sheet = g.add_edge("xl/workbook.xml", "xl/worksheets/sheet1.xml", REL_WORKSHEET);
        g.add_edge("xl/worksheets/sheet1.xml", "xl/drawings/drawing1.xml", "drawing");
        assert!(g.reachable_parts().contains("xl/drawings/drawing1.xml"));
        g.remove_edge("xl/workbook.xml", &sheet);
        let reachable = g.reachable_parts();
        assert!(reachable.contains("xl/workbook.xml"));
        assert!(!reachable.contains("xl/drawings/drawing1.xml"));
    }

    #[test]
    fn test_unchanged_targets_are_written_back_verbatim() {
        let g = graph();
        let xml = String::from_utf8(g.encode_source("xl/workbook.xml")).unwrap();
        assert!(xml.contains(r#"Target="worksheets/sheet1.xml""#));
        assert!(xml.contains(r#"TargetMode="External""#));
    }
}
