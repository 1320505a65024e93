//! Slicer parts (`xl/slicers/slicerN.xml`, `xl/slicerCaches/slicerCacheN.xml`)
//!
//! A sheet lists its slicer parts twice: through relationships and through
//! `x14:slicerList` entries in its `extLst`. The workbook does the same for
//! slicer caches with `x14:slicerCaches`.

use crate::dom::{Document, Element};
use crate::error::XlsxResult;
use crate::xml::RawFragment;

/// Remove the slicer called `name`; returns the name of the cache it used
pub(crate) fn remove_slicer(doc: &mut Document, name: &str) -> Option<String> {
    let cache = doc
        .root
        .elements()
        .find(|s| s.local_name() == "slicer" && s.attr("name") == Some(name))?
        .attr("cache")
        .unwrap_or_default()
        .to_string();
    doc.root
        .retain_elements(|s| !(s.local_name() == "slicer" && s.attr("name") == Some(name)));
    Some(cache)
}

/// Caches used by the slicers of a slicers part
pub(crate) fn caches(doc: &Document) -> Vec<String> {
    doc.root
        .elements()
        .filter(|s| s.local_name() == "slicer")
        .filter_map(|s| s.attr("cache").map(str::to_string))
        .collect()
}

pub(crate) fn slicer_count(doc: &Document) -> usize {
    doc.root
        .elements()
        .filter(|s| s.local_name() == "slicer")
        .count()
}

/// Name of a slicer cache definition
pub(crate) fn cache_name(doc: &Document) -> Option<&str> {
    doc.root.attr("name")
}

/// Drop the `item` entries pointing at `rel_id` from a preserved `extLst`
///
/// An `ext` whose `list` element is left empty goes too. Returns `None`
/// when nothing is left of the `extLst`.
pub(crate) fn prune_ext_list(
    part: &str,
    ext_lst: &RawFragment,
    list: &str,
    item: &str,
    rel_id: &str,
    rel_prefixes: &[String],
) -> XlsxResult<Option<RawFragment>> {
    let mut root = Element::parse(part, &ext_lst.xml)?;
    let removed = root.remove_descendants(&|e: &Element| {
        e.local_name() == item && e.attr_local("id") == Some(rel_id)
    });
    if removed == 0 {
        return Ok(Some(ext_lst.clone()));
    }
    root.retain_elements(|ext| {
        !(ext.local_name() == "ext"
            && ext
                .elements()
                .any(|l| l.local_name() == list && l.elements().next().is_none()))
    });
    if root.elements().next().is_none() {
        return Ok(None);
    }
    Ok(Some(RawFragment {
        name: ext_lst.name.clone(),
        xml: root.to_xml(),
        rel_ids: root.rel_ids(rel_prefixes),
    }))
}
