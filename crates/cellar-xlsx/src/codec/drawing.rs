//! Drawing parts (`xl/drawings/drawingN.xml`)
//!
//! A drawing is a list of anchors, each placing one graphic (a picture, a
//! chart frame, a slicer, a shape) on the sheet grid. Anchors may be wrapped
//! in `mc:AlternateContent`; the wrapper is treated as part of the anchor.

use cellar_core::CellAddress;

use super::chart::Chart;
use crate::dom::{Document, Element};
use crate::error::XlsxResult;
use crate::xml;

const NS_SPREADSHEET_DRAWING: &str =
    "http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing";
const NS_DRAWING: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const NS_CHART: &str = "http://schemas.openxmlformats.org/drawingml/2006/chart";

/// EMUs per pixel at 96 dpi
const EMU_PER_PIXEL: u64 = 9525;

/// What an anchor shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Graphic {
    Picture,
    Chart,
    /// A slicer, by name
    Slicer(String),
    Other,
}

/// One anchor of a drawing
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Anchor {
    /// Position among the root's child elements
    pub position: usize,
    /// Top-left cell; absolute anchors have none
    pub from: Option<CellAddress>,
    pub graphic: Graphic,
    /// Relationship ids referenced anywhere in the anchor
    pub rel_ids: Vec<String>,
}

impl Anchor {
    pub(crate) fn is_at(&self, cell: CellAddress) -> bool {
        self.from
            .is_some_and(|from| from.row == cell.row && from.col == cell.col)
    }
}

fn is_anchor(e: &Element) -> bool {
    matches!(
        e.local_name(),
        "twoCellAnchor" | "oneCellAnchor" | "absoluteAnchor"
    )
}

/// The anchor a top-level element stands for
fn anchor_element(e: &Element) -> Option<&Element> {
    if is_anchor(e) {
        return Some(e);
    }
    if e.local_name() != "AlternateContent" {
        return None;
    }
    let branches: Vec<&Element> = e
        .elements()
        .filter(|b| b.local_name() == "Choice")
        .chain(e.elements().filter(|b| b.local_name() == "Fallback"))
        .collect();
    branches
        .into_iter()
        .find_map(|b| b.descendants().into_iter().find(|d| is_anchor(d)))
}

fn cell_of(anchor: &Element) -> Option<CellAddress> {
    let from = anchor.child("from")?;
    let col = from.child("col")?.text().trim().parse::<u16>().ok()?;
    let row = from.child("row")?.text().trim().parse::<u32>().ok()?;
    Some(CellAddress::new(row, col))
}

fn graphic_of(anchor: &Element) -> Graphic {
    let all = anchor.descendants();
    if let Some(name) = all
        .iter()
        .find(|e| e.local_name() == "slicer")
        .and_then(|e| e.attr("name"))
    {
        return Graphic::Slicer(name.to_string());
    }
    if all
        .iter()
        .any(|e| e.local_name() == "chart" && e.attr_local("id").is_some())
    {
        return Graphic::Chart;
    }
    if all.iter().any(|e| e.local_name() == "pic") {
        return Graphic::Picture;
    }
    Graphic::Other
}

/// The anchors of a drawing, in document order
pub(crate) fn anchors(doc: &Document) -> Vec<Anchor> {
    let prefixes = doc.rel_prefixes();
    doc.root
        .elements()
        .enumerate()
        .filter_map(|(position, top)| {
            let anchor = anchor_element(top)?;
            Some(Anchor {
                position,
                from: cell_of(anchor),
                graphic: graphic_of(anchor),
                rel_ids: top.rel_ids(&prefixes),
            })
        })
        .collect()
}

/// Remove the top-level elements at `positions`
pub(crate) fn remove_anchors(doc: &mut Document, positions: &[usize]) {
    let mut position = 0;
    doc.root.retain_elements(|_| {
        let keep = !positions.contains(&position);
        position += 1;
        keep
    });
}

/// An empty drawing part
pub(crate) fn blank() -> Document {
    Document::with_root(Element::new(
        "xdr:wsDr",
        vec![
            ("xmlns:xdr".to_string(), NS_SPREADSHEET_DRAWING.to_string()),
            ("xmlns:a".to_string(), NS_DRAWING.to_string()),
        ],
    ))
}

fn next_shape_id(doc: &Document) -> u32 {
    doc.root
        .descendants()
        .into_iter()
        .filter(|e| e.local_name() == "cNvPr")
        .filter_map(|e| e.attr("id")?.parse::<u32>().ok())
        .max()
        .unwrap_or(1)
        + 1
}

/// Append a one-cell anchor holding a chart frame
///
/// `rel_id` is the drawing's relationship to the chart part.
pub(crate) fn append_chart(
    doc: &mut Document,
    part: &str,
    cell: CellAddress,
    chart: &Chart,
    rel_id: &str,
) -> XlsxResult<()> {
    let id = next_shape_id(doc);
    let number = anchors(doc)
        .iter()
        .filter(|a| a.graphic == Graphic::Chart)
        .count()
        + 1;
    let x = doc.root.ensure_namespace("xdr", NS_SPREADSHEET_DRAWING);
    let a = doc.root.ensure_namespace("a", NS_DRAWING);
    let fragment = format!(
        concat!(
            r#"<{x}:oneCellAnchor>"#,
            r#"<{x}:from><{x}:col>{col}</{x}:col><{x}:colOff>{dx}</{x}:colOff><{x}:row>{row}</{x}:row><{x}:rowOff>{dy}</{x}:rowOff></{x}:from>"#,
            r#"<{x}:ext cx="{cx}" cy="{cy}"/>"#,
            r#"<{x}:graphicFrame macro=""><{x}:nvGraphicFramePr><{x}:cNvPr id="{id}" name="Chart {number}"/><{x}:cNvGraphicFramePr/></{x}:nvGraphicFramePr>"#,
            r#"<{x}:xfrm><{a}:off x="0" y="0"/><{a}:ext cx="0" cy="0"/></{x}:xfrm>"#,
            r#"<{a}:graphic><{a}:graphicData uri="{ns_chart}"><c:chart xmlns:c="{ns_chart}" xmlns:r="{ns_rel}" r:id="{rel_id}"/></{a}:graphicData></{a}:graphic>"#,
            r#"</{x}:graphicFrame><{x}:clientData/></{x}:oneCellAnchor>"#,
        ),
        x = x,
        a = a,
        col = cell.col,
        row = cell.row,
        dx = u64::from(chart.offset_x) * EMU_PER_PIXEL,
        dy = u64::from(chart.offset_y) * EMU_PER_PIXEL,
        cx = u64::from(chart.width) * EMU_PER_PIXEL,
        cy = u64::from(chart.height) * EMU_PER_PIXEL,
        id = id,
        number = number,
        ns_chart = NS_CHART,
        ns_rel = xml::NS_RELATIONSHIPS,
        rel_id = xml::escape_attr(rel_id),
    );
    doc.root.push(Element::parse(part, &fragment)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::chart::{ChartKind, ChartSeries};
    use pretty_assertions::assert_eq;

    const DRAWING: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<xdr:wsDr xmlns:xdr="http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"><xdr:twoCellAnchor editAs="oneCell"><xdr:from><xdr:col>1</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>2</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:from><xdr:to><xdr:col>4</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>9</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:to><xdr:pic><xdr:nvPicPr><xdr:cNvPr id="2" name="Picture 1"/><xdr:cNvPicPr/></xdr:nvPicPr><xdr:blipFill><a:blip xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" r:embed="rId1"/></xdr:blipFill><xdr:spPr/></xdr:pic><xdr:clientData/></xdr:twoCellAnchor><mc:AlternateContent xmlns:mc="http://schemas.openxmlformats.org/markup-compatibility/2006"><mc:Choice xmlns:sle15="http://schemas.microsoft.com/office/drawing/2012/slicer" Requires="sle15"><xdr:twoCellAnchor><xdr:from><xdr:col>6</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>0</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:from><xdr:to><xdr:col>8</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>8</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:to><xdr:graphicFrame macro=""><xdr:nvGraphicFramePr><xdr:cNvPr id="3" name="Region"/><xdr:cNvGraphicFramePr/></xdr:nvGraphicFramePr><xdr:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/></xdr:xfrm><a:graphic><a:graphicData uri="http://schemas.microsoft.com/office/drawing/2010/slicer"><sle:slicer xmlns:sle="http://schemas.microsoft.com/office/drawing/2010/slicer" name="Region"/></a:graphicData></a:graphic></xdr:graphicFrame><xdr:clientData/></xdr:twoCellAnchor></mc:Choice><mc:Fallback/></mc:AlternateContent></xdr:wsDr>"#;

    #[test]
    fn test_anchors() {
        let doc = Document::parse("xl/drawings/drawing1.xml", DRAWING.as_bytes()).unwrap();
        let found = anchors(&doc);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].graphic, Graphic::Picture);
        assert!(found[0].is_at(CellAddress::parse("B3").unwrap()));
        assert_eq!(found[0].rel_ids, ["rId1"]);
        assert_eq!(found[1].graphic, Graphic::Slicer("Region".into()));
        assert_eq!(found[1].position, 1);
        assert!(found[1].is_at(CellAddress::parse("G1").unwrap()));
    }

    #[test]
    fn test_append_and_remove_chart() {
        let mut doc = Document::parse("xl/drawings/drawing1.xml", DRAWING.as_bytes()).unwrap();
        let chart = Chart::new(ChartKind::Line).with_series(ChartSeries::new("", "", "Sheet1!$A$1:$A$3"));
        append_chart(&mut doc, "xl/drawings/drawing1.xml", CellAddress::parse("E5").unwrap(), &chart, "rId2").unwrap();

        let found = anchors(&doc);
        assert_eq!(found.len(), 3);
        assert_eq!(found[2].graphic, Graphic::Chart);
        assert!(found[2].is_at(CellAddress::parse("E5").unwrap()));
        assert_eq!(found[2].rel_ids, ["rId2"]);
        let xml = String::from_utf8(doc.to_bytes()).unwrap();
        assert!(xml.contains(r#"<xdr:cNvPr id="4" name="Chart 1"/>"#));
        assert!(xml.contains(r#"<xdr:ext cx="4572000" cy="2762250"/>"#));

        remove_anchors(&mut doc, &[0, 2]);
        let left = anchors(&doc);
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].graphic, Graphic::Slicer("Region".into()));
    }

    #[test]
    fn test_blank_drawing_takes_a_chart() {
        let mut doc = blank();
        let chart = Chart::new(ChartKind::Pie).with_series(ChartSeries::new("", "", "Sheet1!$A$1:$A$3"));
        append_chart(&mut doc, "d.xml", CellAddress::new(0, 0), &chart, "rId1").unwrap();
        let again = Document::parse("d.xml", &doc.to_bytes()).unwrap();
        assert_eq!(anchors(&again)[0].graphic, Graphic::Chart);
        assert!(String::from_utf8(doc.to_bytes()).unwrap().starts_with("<?xml"));
    }
}
