//! Save pipeline
//!
//! Saving never mutates the package until the output is complete. The
//! content types, relationships and removal set are planned on copies, the
//! archive is written to a temporary file, and only then is the plan
//! committed. A failed or cancelled save leaves both the package and the
//! destination as they were.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use cellar_core::DocProperties;
use rayon::prelude::*;

use super::{Package, PackageState, SheetSource};
use crate::archive::ArchiveWriter;
use crate::cancel::{self, CancellationToken};
use crate::codec::{
    encode_doc_props, encode_shared_strings_with_root, encode_styles, encode_worksheet,
    PartCodec, WorkbookPart,
};
use crate::content_types::{
    ContentTypes, Flavor, CONTENT_TYPES_PART, CT_CORE_PROPERTIES, CT_SHARED_STRINGS, CT_STYLES,
};
use crate::error::{XlsxError, XlsxResult};
use crate::rels::{
    self, RelationshipGraph, PACKAGE_ROOT, REL_CORE_PROPERTIES, REL_SHARED_STRINGS, REL_STYLES,
    REL_VBA_PROJECT,
};
use crate::stream::StreamedSheet;

/// How one output entry is produced
enum Output {
    Bytes(Vec<u8>),
    /// Copied compressed from the source archive
    Raw,
    Streamed(StreamedSheet),
}

/// Package changes that take effect once the output is written
struct SavePlan {
    flavor: Flavor,
    content_types: ContentTypes,
    rels: RelationshipGraph,
    removed: BTreeSet<String>,
    styles_path: Option<String>,
    shared_strings_path: Option<String>,
    core_path: Option<String>,
    doc_props: Option<DocProperties>,
}

impl Package {
    /// Save to the path the package was opened from or last saved to
    pub fn save(&mut self, cancel: Option<&CancellationToken>) -> XlsxResult<()> {
        self.check_open()?;
        let path = self
            .path
            .clone()
            .ok_or_else(|| XlsxError::InvalidArgument("package has no path; use save_as".into()))?;
        self.save_as(path, cancel)
    }

    /// Save to a file; the flavor follows the file extension
    ///
    /// The output is written next to the destination and renamed over it,
    /// so the destination is either fully replaced or left untouched.
    pub fn save_as(&mut self, path: impl AsRef<Path>, cancel: Option<&CancellationToken>) -> XlsxResult<()> {
        self.check_open()?;
        let path = path.as_ref();
        let flavor = Flavor::from_path(path)?;
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let tmp = tempfile::Builder::new().prefix(".cellar-").tempfile_in(&dir)?;
        let (tmp, plan) = self.write_package(tmp, flavor, cancel)?;
        tmp.persist(path).map_err(|e| XlsxError::Io(e.error))?;
        log::debug!("saved {}", path.display());
        self.commit(plan);
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    /// Write the package to any writer, keeping the current flavor
    pub fn write_to<W: Write>(&mut self, mut out: W, cancel: Option<&CancellationToken>) -> XlsxResult<W> {
        self.check_open()?;
        let tmp = self.options.tempfile()?;
        let (mut tmp, plan) = self.write_package(tmp, self.flavor, cancel)?;
        tmp.seek(SeekFrom::Start(0))?;
        io::copy(&mut tmp, &mut out)?;
        out.flush()?;
        self.commit(plan);
        Ok(out)
    }

    /// Serialize the package into memory, keeping the current flavor
    pub fn to_bytes(&mut self, cancel: Option<&CancellationToken>) -> XlsxResult<Vec<u8>> {
        self.write_to(Vec::new(), cancel)
    }

    fn commit(&mut self, plan: SavePlan) {
        self.flavor = plan.flavor;
        self.content_types = plan.content_types;
        self.rels = plan.rels;
        self.removed = plan.removed;
        self.styles_path = plan.styles_path;
        self.shared_strings_path = plan.shared_strings_path;
        self.core_path = plan.core_path;
        if let Some(props) = plan.doc_props {
            self.workbook.set_doc_props(props);
        }
        self.state = PackageState::Saved;
    }

    /// Whether a typed workbook-level part is regenerated from the model
    fn regenerate(&self, path: &str) -> bool {
        self.changed || !self.source.as_ref().is_some_and(|s| s.contains(path))
    }

    fn plan(&self, flavor: Flavor) -> SavePlan {
        let mut plan = SavePlan {
            flavor,
            content_types: self.content_types.clone(),
            rels: self.rels.clone(),
            removed: self.removed.clone(),
            styles_path: self.styles_path.clone(),
            shared_strings_path: self.shared_strings_path.clone(),
            core_path: self.core_path.clone(),
            doc_props: None,
        };
        plan.content_types
            .set_override(&self.main_part, flavor.main_content_type());

        if !flavor.is_macro_enabled() {
            self.drop_vba(&mut plan);
        }

        // An untouched source package is written back without new parts
        let fills_gaps = self.changed || self.source.is_none();
        if plan.styles_path.is_none() && fills_gaps {
            let path = self.part_beside_main("styles.xml");
            plan.rels.add_edge(&self.main_part, &path, REL_STYLES);
            plan.content_types.set_override(&path, CT_STYLES);
            plan.styles_path = Some(path);
        }
        if plan.shared_strings_path.is_none() && fills_gaps && !self.workbook.shared_strings().is_empty() {
            let path = self.part_beside_main("sharedStrings.xml");
            plan.rels.add_edge(&self.main_part, &path, REL_SHARED_STRINGS);
            plan.content_types.set_override(&path, CT_SHARED_STRINGS);
            plan.shared_strings_path = Some(path);
        }

        if self.state == PackageState::Modified {
            let mut props = self.workbook.doc_props().clone();
            props.stamp(chrono::Utc::now());
            plan.doc_props = Some(props);
        }
        let has_props = plan
            .doc_props
            .as_ref()
            .map_or(!self.workbook.doc_props().is_empty(), |p| !p.is_empty());
        if plan.core_path.is_none() && fills_gaps && has_props {
            let path = "docProps/core.xml".to_string();
            plan.rels.add_edge(PACKAGE_ROOT, &path, REL_CORE_PROPERTIES);
            plan.content_types.set_override(&path, CT_CORE_PROPERTIES);
            plan.core_path = Some(path);
        }
        plan
    }

    /// Remove the VBA project and every part only it referenced
    fn drop_vba(&self, plan: &mut SavePlan) {
        let ids: Vec<String> = plan
            .rels
            .edges_from(&self.main_part)
            .iter()
            .filter(|r| r.rel_type == REL_VBA_PROJECT)
            .map(|r| r.id.clone())
            .collect();
        if ids.is_empty() {
            return;
        }
        let before = plan.rels.reachable_parts();
        for id in &ids {
            if let Some(rel) = plan.rels.remove_edge(&self.main_part, id) {
                log::warn!(
                    "dropping VBA project '{}': {} files cannot hold macros",
                    rel.target,
                    plan.flavor.extension()
                );
            }
        }
        let after = plan.rels.reachable_parts();
        for part in before.difference(&after) {
            plan.rels.remove_source(part);
            plan.content_types.remove_override(part);
            if self.source.as_ref().is_some_and(|s| s.contains(part)) {
                plan.removed.insert(part.clone());
            }
        }
    }

    /// Produce every output entry except the content types
    fn outputs(&self, plan: &SavePlan) -> XlsxResult<BTreeMap<String, Output>> {
        let mut outputs = BTreeMap::new();

        let encoded: Vec<(String, Vec<u8>)> = (0..self.sheets.len())
            .into_par_iter()
            .filter(|&i| self.needs_encode(i))
            .filter_map(|i| {
                let ws = self.workbook.worksheet(i)?;
                let entry = &self.sheets[i];
                Some((entry.path.clone(), encode_worksheet(&entry.layout, ws.cells())))
            })
            .collect();
        let mut encoded: BTreeMap<String, Vec<u8>> = encoded.into_iter().collect();

        for (i, entry) in self.sheets.iter().enumerate() {
            let output = if let Some(bytes) = encoded.remove(&entry.path) {
                Output::Bytes(bytes)
            } else {
                match &entry.source {
                    SheetSource::Streamed(streamed) => Output::Streamed(streamed.clone()),
                    SheetSource::Archive => Output::Raw,
                    SheetSource::New => {
                        let ws = self
                            .workbook
                            .worksheet(i)
                            .ok_or_else(|| XlsxError::InvalidPackage(format!("no sheet {}", i)))?;
                        Output::Bytes(encode_worksheet(&entry.layout, ws.cells()))
                    }
                }
            };
            outputs.insert(entry.path.clone(), output);
        }

        let workbook = if self.regenerate(&self.main_part) {
            let rel_ids: Vec<String> = self.sheets.iter().map(|e| e.rel_id.clone()).collect();
            let part = WorkbookPart::from_model(self.workbook_layout.clone(), &self.workbook, &rel_ids);
            Output::Bytes(part.encode())
        } else {
            Output::Raw
        };
        outputs.insert(self.main_part.clone(), workbook);

        if let Some(path) = &plan.styles_path {
            let output = if self.regenerate(path) {
                Output::Bytes(encode_styles(&self.styles_layout, self.workbook.styles()))
            } else {
                Output::Raw
            };
            outputs.insert(path.clone(), output);
        }
        if let Some(path) = &plan.shared_strings_path {
            let output = if self.regenerate(path) {
                Output::Bytes(encode_shared_strings_with_root(
                    &self.shared_strings_root,
                    self.workbook.shared_strings(),
                ))
            } else {
                Output::Raw
            };
            outputs.insert(path.clone(), output);
        }
        if let Some(path) = &plan.core_path {
            let output = match &plan.doc_props {
                Some(props) => Output::Bytes(encode_doc_props(&self.core_layout, props)),
                None if self.regenerate(path) => {
                    Output::Bytes(encode_doc_props(&self.core_layout, self.workbook.doc_props()))
                }
                None => Output::Raw,
            };
            outputs.insert(path.clone(), output);
        }

        for (path, bytes) in &self.parts {
            if !plan.removed.contains(path) {
                outputs.insert(path.clone(), Output::Bytes(bytes.clone()));
            }
        }

        for source in plan.rels.sources() {
            let rels_path = rels::rels_path_for(source);
            let unchanged = !plan.rels.is_dirty(source)
                && self.source.as_ref().is_some_and(|s| s.contains(&rels_path));
            let output = if unchanged {
                Output::Raw
            } else {
                Output::Bytes(plan.rels.encode_source(source))
            };
            outputs.insert(rels_path, output);
        }

        if let Some(source) = &self.source {
            for name in source.names() {
                if name == CONTENT_TYPES_PART
                    || name.ends_with(".rels")
                    || name.ends_with('/')
                    || plan.removed.contains(name)
                    || outputs.contains_key(name)
                {
                    continue;
                }
                outputs.insert(name.to_string(), Output::Raw);
            }
        }
        Ok(outputs)
    }

    /// Write the whole package to `out`
    fn write_package<W: Write + Seek>(
        &self,
        out: W,
        flavor: Flavor,
        cancel: Option<&CancellationToken>,
    ) -> XlsxResult<(W, SavePlan)> {
        cancel::check(cancel)?;
        let plan = self.plan(flavor);
        let outputs = self.outputs(&plan)?;

        let mut writer = ArchiveWriter::new(out);
        let mut copied = 0usize;
        let mut encoded = 0usize;
        let ct_unchanged = !self.changed
            && plan.content_types == self.content_types
            && self.source.as_ref().is_some_and(|s| s.contains(CONTENT_TYPES_PART));
        match (&self.source, ct_unchanged) {
            (Some(source), true) => {
                writer.copy_raw(source, CONTENT_TYPES_PART)?;
                copied += 1;
            }
            _ => {
                writer.add_bytes(CONTENT_TYPES_PART, &PartCodec::encode(&plan.content_types))?;
                encoded += 1;
            }
        }

        for (name, output) in &outputs {
            cancel::check(cancel)?;
            match output {
                Output::Bytes(bytes) => {
                    writer.add_bytes(name, bytes)?;
                    encoded += 1;
                }
                Output::Raw => {
                    let source = self.source.as_ref().ok_or_else(|| {
                        XlsxError::InvalidPackage(format!("no source for part {}", name))
                    })?;
                    writer.copy_raw(source, name)?;
                    copied += 1;
                }
                Output::Streamed(streamed) => {
                    let mut input = streamed.open()?;
                    writer.add_reader(name, &mut input)?;
                    encoded += 1;
                }
            }
        }
        let out = writer.finish()?;
        log::debug!(
            "wrote {} package: {} parts encoded, {} copied",
            flavor.extension(),
            encoded,
            copied
        );
        Ok((out, plan))
    }
}
