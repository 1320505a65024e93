//! Open pipeline: archive, content types, relationships, typed parts, model

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use cellar_core::{DateSystem, DefinedName, NameScope, SharedStringTable, StyleTable, Workbook};

use super::{Package, PackageState, SheetEntry, SheetKind, SheetSource};
use crate::archive::ArchiveReader;
use crate::codec::{
    CoreLayout, CorePropertiesPart, PartCodec, SharedStringsPart, SheetLayout, StylesLayout,
    StylesPart, WorkbookPart,
};
use crate::content_types::{ContentTypes, Flavor, CONTENT_TYPES_PART};
use crate::error::{XlsxError, XlsxResult};
use crate::options::Options;
use crate::rels::{
    RelationshipGraph, PACKAGE_ROOT, REL_CORE_PROPERTIES, REL_OFFICE_DOCUMENT,
    REL_SHARED_STRINGS, REL_STYLES,
};
use crate::xml;

const REL_STRICT_OFFICE_DOCUMENT: &str =
    "http://purl.oclc.org/ooxml/officeDocument/relationships/officeDocument";

impl Package {
    /// Open a package from a file
    pub fn open(path: impl AsRef<Path>, options: Options) -> XlsxResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        log::debug!("opening {} ({} bytes)", path.display(), bytes.len());
        let mut package = Self::from_bytes(bytes, options)?;
        package.path = Some(path.to_path_buf());
        Ok(package)
    }

    /// Open a package from any reader
    pub fn open_reader<R: Read>(mut reader: R, options: Options) -> XlsxResult<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(bytes, options)
    }

    /// Open a package held in memory
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>, options: Options) -> XlsxResult<Self> {
        let source = ArchiveReader::new(bytes, &options)?;

        if !source.contains(CONTENT_TYPES_PART) {
            return Err(XlsxError::InvalidPackage(format!("missing {}", CONTENT_TYPES_PART)));
        }
        let content_types = source.with_part(CONTENT_TYPES_PART, |input| ContentTypes::decode(input))?;

        let rels_parts: Vec<String> = source
            .names()
            .filter(|name| name.ends_with(".rels"))
            .map(str::to_string)
            .collect();
        if !rels_parts.iter().any(|p| p == "_rels/.rels") {
            return Err(XlsxError::InvalidPackage("missing _rels/.rels".into()));
        }
        let mut graph = RelationshipGraph::resolve(&source.read_parts(&rels_parts)?)?;

        if graph
            .find_by_type(PACKAGE_ROOT, REL_STRICT_OFFICE_DOCUMENT)
            .is_some()
        {
            return Err(XlsxError::UnsupportedFormatVersion(
                "strict Open XML packages are not supported".into(),
            ));
        }
        let existing: BTreeSet<String> = source.names().map(str::to_string).collect();
        graph.validate(&existing, options.strict_relationships)?;

        let main_part = graph
            .find_by_type(PACKAGE_ROOT, REL_OFFICE_DOCUMENT)
            .map(|r| r.target.clone())
            .ok_or_else(|| XlsxError::InvalidPackage("no officeDocument relationship".into()))?;
        if !source.contains(&main_part) {
            return Err(XlsxError::InvalidPackage(format!("missing main part {}", main_part)));
        }
        let main_type = content_types.content_type_of(&main_part).ok_or_else(|| {
            XlsxError::InvalidPackage(format!("no content type for {}", main_part))
        })?;
        let flavor = Flavor::from_content_type(main_type)?;

        let workbook_part = source.with_part(&main_part, |input| WorkbookPart::decode(&main_part, input))?;
        graph.check_ids(&main_part, workbook_part.layout.rel_ids())?;

        let styles_path = graph.find_by_type(&main_part, REL_STYLES).map(|r| r.target.clone());
        let shared_strings_path = graph
            .find_by_type(&main_part, REL_SHARED_STRINGS)
            .map(|r| r.target.clone());
        let core_path = graph
            .find_by_type(PACKAGE_ROOT, REL_CORE_PROPERTIES)
            .map(|r| r.target.clone());

        let (styles, (shared_strings, core)) = rayon::join(
            || read_styles(&source, styles_path.as_deref()),
            || {
                rayon::join(
                    || read_shared_strings(&source, shared_strings_path.as_deref()),
                    || read_core(&source, core_path.as_deref()),
                )
            },
        );
        let styles = styles?;
        let shared_strings = shared_strings?;
        let core = core?;

        let mut workbook = Workbook::empty();
        *workbook.styles_mut() = styles.table;
        *workbook.shared_strings_mut() = shared_strings.table;
        workbook.set_doc_props(core.props);
        let settings = workbook.settings_mut();
        settings.date_system = if workbook_part.date1904 {
            DateSystem::V1904
        } else {
            DateSystem::V1900
        };
        settings.string_mode = options.string_mode;

        let mut sheets = Vec::with_capacity(workbook_part.sheets.len());
        for record in &workbook_part.sheets {
            let rel = graph
                .edge(&main_part, &record.rel_id)
                .ok_or_else(|| XlsxError::dangling(main_part.as_str(), record.rel_id.as_str()))?;
            let kind = if rel.kind() == "worksheet" {
                SheetKind::Worksheet
            } else {
                log::debug!("{} is a {}; kept as an opaque sheet", rel.target, rel.kind());
                SheetKind::Opaque
            };
            workbook
                .add_loaded_sheet(record.sheet_id, &record.name, record.state)
                .map_err(|e| XlsxError::invalid_part(main_part.as_str(), "sheet", e.to_string()))?;
            sheets.push(SheetEntry {
                path: rel.target.clone(),
                rel_id: record.rel_id.clone(),
                kind,
                source: SheetSource::Archive,
                loaded: kind == SheetKind::Opaque,
                layout: SheetLayout::default(),
            });
        }

        for record in &workbook_part.defined_names {
            let scope = match record.local_sheet_id {
                None => NameScope::Workbook,
                Some(index) => match workbook.worksheet(index) {
                    Some(ws) => NameScope::Sheet(ws.id()),
                    None => {
                        return Err(XlsxError::invalid_part(
                            main_part.as_str(),
                            "definedName",
                            format!(
                                "'{}' has localSheetId {} but the workbook has {} sheets",
                                record.name,
                                index,
                                workbook.sheet_count()
                            ),
                        ))
                    }
                },
            };
            let mut name = DefinedName::new(record.name.as_str(), scope, &record.formula)
                .with_hidden(record.hidden);
            if let Some(comment) = &record.comment {
                name = name.with_comment(comment.as_str());
            }
            workbook.defined_names_mut().insert_loaded(name);
        }
        workbook.set_loaded_active_sheet(workbook_part.active_tab);

        log::debug!(
            "opened {} workbook: {} sheets, {} styles, {} shared strings",
            flavor.extension(),
            sheets.len(),
            workbook.styles().len(),
            workbook.shared_strings().len()
        );

        let mut package = Package {
            state: PackageState::Open,
            changed: false,
            options,
            flavor,
            path: None,
            source: Some(source),
            content_types,
            rels: graph,
            workbook,
            main_part,
            workbook_layout: workbook_part.layout,
            styles_path,
            styles_layout: styles.layout,
            shared_strings_path,
            shared_strings_root: shared_strings.root_attrs,
            core_path,
            core_layout: core.layout,
            sheets,
            parts: BTreeMap::new(),
            removed: BTreeSet::new(),
        };
        if package.options.preload_sheets {
            package.load_all_sheets()?;
        }
        Ok(package)
    }
}

fn read_styles(source: &ArchiveReader, path: Option<&str>) -> XlsxResult<StylesPart> {
    match path {
        Some(path) => source.with_part(path, |input| StylesPart::decode(path, input)),
        None => {
            log::warn!("package has no styles part, using the default style");
            Ok(StylesPart {
                layout: StylesLayout::default(),
                table: StyleTable::new(),
            })
        }
    }
}

fn read_shared_strings(source: &ArchiveReader, path: Option<&str>) -> XlsxResult<SharedStringsPart> {
    match path {
        Some(path) => source.with_part(path, |input| SharedStringsPart::decode(path, input)),
        None => Ok(SharedStringsPart {
            root_attrs: vec![("xmlns".to_string(), xml::NS_MAIN.to_string())],
            table: SharedStringTable::new(),
        }),
    }
}

fn read_core(source: &ArchiveReader, path: Option<&str>) -> XlsxResult<CorePropertiesPart> {
    match path {
        Some(path) => source.with_part(path, |input| CorePropertiesPart::decode(path, input)),
        None => Ok(CorePropertiesPart {
            layout: CoreLayout::default(),
            props: Default::default(),
        }),
    }
}
