//! Cell comments (`xl/commentsN.xml`) and their VML note shapes

use cellar_core::CellAddress;

use crate::dom::{Document, Element};

fn refers_to(comment: &Element, cell: CellAddress) -> bool {
    comment
        .attr("ref")
        .and_then(|r| CellAddress::parse(r).ok())
        .is_some_and(|at| at.row == cell.row && at.col == cell.col)
}

/// Remove the comments on `cell`; returns how many went
pub(crate) fn remove_comment(doc: &mut Document, cell: CellAddress) -> usize {
    match doc.root.child_mut("commentList") {
        Some(list) => {
            list.retain_elements(|c| !(c.local_name() == "comment" && refers_to(c, cell)))
        }
        None => 0,
    }
}

pub(crate) fn comment_count(doc: &Document) -> usize {
    doc.root
        .child("commentList")
        .map_or(0, |list| list.elements().filter(|c| c.local_name() == "comment").count())
}

/// Whether a VML shape is the note box of `cell`
///
/// Note rows and columns are zero-based.
fn is_note_at(shape: &Element, cell: CellAddress) -> bool {
    if shape.local_name() != "shape" {
        return false;
    }
    let Some(data) = shape.child("ClientData") else {
        return false;
    };
    let index = |name: &str| data.child(name).and_then(|e| e.text().trim().parse::<u32>().ok());
    data.attr("ObjectType") == Some("Note")
        && index("Row") == Some(cell.row)
        && index("Column") == Some(u32::from(cell.col))
}

/// Remove the note shape of `cell` from a VML drawing; returns how many went
pub(crate) fn remove_note_shape(doc: &mut Document, cell: CellAddress) -> usize {
    doc.root.retain_elements(|shape| !is_note_at(shape, cell))
}

/// Shapes left in a VML drawing (notes, form controls)
pub(crate) fn shape_count(doc: &Document) -> usize {
    doc.root
        .elements()
        .filter(|e| e.local_name() == "shape")
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMMENTS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<comments xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><authors><author>kim</author></authors><commentList><comment ref="A1" authorId="0"><text><t>first</t></text></comment><comment ref="C3" authorId="0"><text><t>second</t></text></comment></commentList></comments>"#;

    const VML: &str = r##"<xml xmlns:v="urn:schemas-microsoft-com:vml" xmlns:o="urn:schemas-microsoft-com:office:office" xmlns:x="urn:schemas-microsoft-com:office:excel"><o:shapelayout v:ext="edit"><o:idmap v:ext="edit" data="1"/></o:shapelayout><v:shapetype id="_x0000_t202" coordsize="21600,21600" o:spt="202"/><v:shape id="_x0000_s1025" type="#_x0000_t202"><x:ClientData ObjectType="Note"><x:Row>0</x:Row><x:Column>0</x:Column></x:ClientData></v:shape><v:shape id="_x0000_s1026" type="#_x0000_t202"><x:ClientData ObjectType="Note"><x:Row>2</x:Row><x:Column>2</x:Column></x:ClientData></v:shape></xml>"##;

    fn addr(a1: &str) -> CellAddress {
        CellAddress::parse(a1).unwrap()
    }

    #[test]
    fn test_remove_comment() {
        let mut doc = Document::parse("xl/comments1.xml", COMMENTS.as_bytes()).unwrap();
        assert_eq!(remove_comment(&mut doc, addr("B2")), 0);
        assert_eq!(remove_comment(&mut doc, addr("$C$3")), 1);
        assert_eq!(comment_count(&doc), 1);
        let xml = String::from_utf8(doc.to_bytes()).unwrap();
        assert!(xml.contains("<authors><author>kim</author></authors>"));
        assert!(!xml.contains("second"));
    }

    #[test]
    fn test_remove_note_shape() {
        let mut doc = Document::parse("xl/drawings/vmlDrawing1.vml", VML.as_bytes()).unwrap();
        assert_eq!(shape_count(&doc), 2);
        assert_eq!(remove_note_shape(&mut doc, addr("A1")), 1);
        assert_eq!(shape_count(&doc), 1);
        assert_eq!(remove_note_shape(&mut doc, addr("A1")), 0);
        let xml = String::from_utf8(doc.to_bytes()).unwrap();
        assert!(xml.contains("_x0000_s1026"));
        assert!(xml.contains("<v:shapetype"));
    }
}
