//! Comments, drawings, charts, slicers and backgrounds: parts the model
//! does not own, edited in place and pruned when nothing references them.

use cellar_core::{CellAddress, NameScope};
use cellar_xlsx::content_types::{CT_CHART, CT_COMMENTS, CT_DRAWING, CT_SLICER, CT_SLICER_CACHE, CT_VML_DRAWING};
use cellar_xlsx::rels::{
    REL_CHART, REL_COMMENTS, REL_DRAWING, REL_IMAGE, REL_SLICER, REL_SLICER_CACHE, REL_VML_DRAWING,
};
use cellar_xlsx::{Chart, ChartKind, ChartSeries, Options, Package, PackageState, XlsxError};
use pretty_assertions::assert_eq;

use crate::{entry_names, entry_text, PackageBuilder};

const ROWS: &str = r#"<row r="1"><c r="A1" t="inlineStr"><is><t>region</t></is></c><c r="B1" t="inlineStr"><is><t>sales</t></is></c></row><row r="2"><c r="A2" t="inlineStr"><is><t>north</t></is></c><c r="B2"><v>12</v></c></row><row r="3"><c r="A3" t="inlineStr"><is><t>south</t></is></c><c r="B3"><v>7</v></c></row>"#;

const COMMENTS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<comments xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><authors><author>kim</author></authors><commentList><comment ref="A1" authorId="0"><text><t>first</t></text></comment><comment ref="C3" authorId="0"><text><t>second</t></text></comment></commentList></comments>"#;

const VML: &str = r##"<xml xmlns:v="urn:schemas-microsoft-com:vml" xmlns:o="urn:schemas-microsoft-com:office:office" xmlns:x="urn:schemas-microsoft-com:office:excel"><v:shapetype id="_x0000_t202" coordsize="21600,21600" o:spt="202"/><v:shape id="_x0000_s1025" type="#_x0000_t202"><x:ClientData ObjectType="Note"><x:Row>0</x:Row><x:Column>0</x:Column></x:ClientData></v:shape><v:shape id="_x0000_s1026" type="#_x0000_t202"><x:ClientData ObjectType="Note"><x:Row>2</x:Row><x:Column>2</x:Column></x:ClientData></v:shape></xml>"##;

/// Pictures at B3 and D5 sharing one image, and a chart at F2
const DRAWING: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<xdr:wsDr xmlns:xdr="http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><xdr:oneCellAnchor><xdr:from><xdr:col>1</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>2</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:from><xdr:ext cx="952500" cy="952500"/><xdr:pic><xdr:nvPicPr><xdr:cNvPr id="2" name="Picture 1"/><xdr:cNvPicPr/></xdr:nvPicPr><xdr:blipFill><a:blip r:embed="rId1"/></xdr:blipFill><xdr:spPr/></xdr:pic><xdr:clientData/></xdr:oneCellAnchor><xdr:oneCellAnchor><xdr:from><xdr:col>3</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>4</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:from><xdr:ext cx="952500" cy="952500"/><xdr:pic><xdr:nvPicPr><xdr:cNvPr id="3" name="Picture 2"/><xdr:cNvPicPr/></xdr:nvPicPr><xdr:blipFill><a:blip r:embed="rId1"/></xdr:blipFill><xdr:spPr/></xdr:pic><xdr:clientData/></xdr:oneCellAnchor><xdr:oneCellAnchor><xdr:from><xdr:col>5</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>1</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:from><xdr:ext cx="4572000" cy="2762250"/><xdr:graphicFrame macro=""><xdr:nvGraphicFramePr><xdr:cNvPr id="4" name="Chart 1"/><xdr:cNvGraphicFramePr/></xdr:nvGraphicFramePr><xdr:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/></xdr:xfrm><a:graphic><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/chart"><c:chart xmlns:c="http://schemas.openxmlformats.org/drawingml/2006/chart" r:id="rId2"/></a:graphicData></a:graphic></xdr:graphicFrame><xdr:clientData/></xdr:oneCellAnchor></xdr:wsDr>"#;

const CHART: &str = r#"<c:chartSpace xmlns:c="http://schemas.openxmlformats.org/drawingml/2006/chart"/>"#;

const SLICER_DRAWING: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<xdr:wsDr xmlns:xdr="http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"><mc:AlternateContent xmlns:mc="http://schemas.openxmlformats.org/markup-compatibility/2006"><mc:Choice xmlns:sle15="http://schemas.microsoft.com/office/drawing/2012/slicer" Requires="sle15"><xdr:twoCellAnchor><xdr:from><xdr:col>6</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>0</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:from><xdr:to><xdr:col>8</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>8</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:to><xdr:graphicFrame macro=""><xdr:nvGraphicFramePr><xdr:cNvPr id="2" name="Region"/><xdr:cNvGraphicFramePr/></xdr:nvGraphicFramePr><xdr:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/></xdr:xfrm><a:graphic><a:graphicData uri="http://schemas.microsoft.com/office/drawing/2010/slicer"><sle:slicer xmlns:sle="http://schemas.microsoft.com/office/drawing/2010/slicer" name="Region"/></a:graphicData></a:graphic></xdr:graphicFrame><xdr:clientData/></xdr:twoCellAnchor></mc:Choice><mc:Fallback/></mc:AlternateContent></xdr:wsDr>"#;

const SLICER_CACHE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<slicerCacheDefinition xmlns="http://schemas.microsoft.com/office/spreadsheetml/2009/9/main" name="Slicer_Region" sourceName="region"/>"#;

fn addr(a1: &str) -> CellAddress {
    CellAddress::parse(a1).unwrap()
}

fn rels(edges: &[(&str, &str, &str)]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for (id, rel_type, target) in edges {
        xml.push_str(&format!(
            r#"<Relationship Id="{}" Type="{}" Target="{}"/>"#,
            id, rel_type, target
        ));
    }
    xml.push_str("</Relationships>");
    xml
}

fn has(names: &[String], name: &str) -> bool {
    names.iter().any(|n| n == name)
}

fn commented() -> PackageBuilder {
    PackageBuilder::new()
        .sheet("Sales", ROWS)
        .sheet_tail(r#"<legacyDrawing r:id="rId2"/>"#)
        .entry(
            "xl/worksheets/_rels/sheet1.xml.rels",
            &rels(&[
                ("rId1", REL_COMMENTS, "../comments1.xml"),
                ("rId2", REL_VML_DRAWING, "../drawings/vmlDrawing1.vml"),
            ]),
        )
        .part("xl/comments1.xml", CT_COMMENTS, COMMENTS)
        .default_type("vml", CT_VML_DRAWING)
        .entry("xl/drawings/vmlDrawing1.vml", VML)
}

fn drawn() -> PackageBuilder {
    PackageBuilder::new()
        .sheet("Sales", ROWS)
        .sheet_tail(r#"<drawing r:id="rId1"/>"#)
        .entry(
            "xl/worksheets/_rels/sheet1.xml.rels",
            &rels(&[("rId1", REL_DRAWING, "../drawings/drawing1.xml")]),
        )
        .part("xl/drawings/drawing1.xml", CT_DRAWING, DRAWING)
        .entry(
            "xl/drawings/_rels/drawing1.xml.rels",
            &rels(&[
                ("rId1", REL_IMAGE, "../media/image1.png"),
                ("rId2", REL_CHART, "../charts/chart1.xml"),
            ]),
        )
        .default_type("png", "image/png")
        .entry("xl/media/image1.png", "PNG-BYTES")
        .part("xl/charts/chart1.xml", CT_CHART, CHART)
}

/// One slicers part on Sales holding `slicers`, all using cache `Slicer_Region`
fn sliced(slicers: &[&str]) -> PackageBuilder {
    let body: String = slicers
        .iter()
        .map(|name| format!(r#"<slicer name="{}" cache="Slicer_Region" caption="region" rowHeight="241300"/>"#, name))
        .collect();
    let slicers_part = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><slicers xmlns="http://schemas.microsoft.com/office/spreadsheetml/2009/9/main">{}</slicers>"#,
        body
    );
    PackageBuilder::new()
        .sheet("Sales", ROWS)
        .sheet_tail(r#"<drawing r:id="rId1"/><extLst><ext uri="{3A4CF648-6AED-40f4-86FF-DC5316D8AED3}" xmlns:x14="http://schemas.microsoft.com/office/spreadsheetml/2009/9/main"><x14:slicerList><x14:slicer r:id="rId2"/></x14:slicerList></ext></extLst>"#)
        .sheet("Notes", "")
        .entry(
            "xl/worksheets/_rels/sheet1.xml.rels",
            &rels(&[
                ("rId1", REL_DRAWING, "../drawings/drawing1.xml"),
                ("rId2", REL_SLICER, "../slicers/slicer1.xml"),
            ]),
        )
        .part("xl/drawings/drawing1.xml", CT_DRAWING, SLICER_DRAWING)
        .part("xl/slicers/slicer1.xml", CT_SLICER, &slicers_part)
        .part("xl/slicerCaches/slicerCache1.xml", CT_SLICER_CACHE, SLICER_CACHE)
        .workbook_rel("rId10", REL_SLICER_CACHE, "slicerCaches/slicerCache1.xml")
        .workbook_ext(r#"<extLst><ext uri="{BBE1A952-AA13-448e-AADC-164F8A28A991}" xmlns:x14="http://schemas.microsoft.com/office/spreadsheetml/2009/9/main"><x14:slicerCaches><x14:slicerCache r:id="rId10"/></x14:slicerCaches></ext></extLst>"#)
        .defined_name("Slicer_Region", "#N/A")
}

// ==================== Comments ====================

#[test]
fn test_delete_comment_keeps_the_others() {
    let mut package = commented().open();
    package.delete_comment(0, addr("A1")).unwrap();
    let out = package.to_bytes(None).unwrap();

    let names = entry_names(&out);
    assert!(has(&names, "xl/comments1.xml"));
    assert!(has(&names, "xl/drawings/vmlDrawing1.vml"));
    let comments = entry_text(&out, "xl/comments1.xml").unwrap();
    assert!(!comments.contains("first"));
    assert!(comments.contains(r#"<comment ref="C3" authorId="0">"#));
    let vml = entry_text(&out, "xl/drawings/vmlDrawing1.vml").unwrap();
    assert!(!vml.contains("_x0000_s1025"));
    assert!(vml.contains("_x0000_s1026"));
}

#[test]
fn test_delete_last_comment_drops_its_parts() {
    let mut package = commented().open();
    package.delete_comment(0, addr("A1")).unwrap();
    package.delete_comment(0, addr("C3")).unwrap();
    let out = package.to_bytes(None).unwrap();

    let names = entry_names(&out);
    assert!(!has(&names, "xl/comments1.xml"));
    assert!(!has(&names, "xl/drawings/vmlDrawing1.vml"));
    let types = entry_text(&out, "[Content_Types].xml").unwrap();
    assert!(!types.contains("/xl/comments1.xml"));
    let sheet = entry_text(&out, "xl/worksheets/sheet1.xml").unwrap();
    assert!(!sheet.contains("legacyDrawing"));
    assert!(sheet.contains("<sheetData>"));
    if let Some(sheet_rels) = entry_text(&out, "xl/worksheets/_rels/sheet1.xml.rels") {
        assert!(!sheet_rels.contains("comments"));
        assert!(!sheet_rels.contains("vmlDrawing"));
    }

    let reopened = Package::from_bytes(out, Options::default().with_preload_sheets(true)).unwrap();
    assert_eq!(reopened.workbook().unwrap().sheet_names(), vec!["Sales".to_string()]);
}

#[test]
fn test_delete_comment_on_bare_cell_changes_nothing() {
    let mut package = commented().open();
    package.delete_comment(0, addr("B9")).unwrap();
    assert_eq!(package.state(), PackageState::Open);

    let mut plain = PackageBuilder::new().sheet("Sales", ROWS).open();
    plain.delete_comment(0, addr("A1")).unwrap();
    assert_eq!(plain.state(), PackageState::Open);
}

// ==================== Pictures and charts ====================

#[test]
fn test_delete_picture_prunes_image_after_last_use() {
    let mut package = drawn().open();
    package.delete_picture(0, addr("B3")).unwrap();
    let out = package.to_bytes(None).unwrap();
    let names = entry_names(&out);
    assert!(has(&names, "xl/media/image1.png"));
    let drawing = entry_text(&out, "xl/drawings/drawing1.xml").unwrap();
    assert!(!drawing.contains("Picture 1"));
    assert!(drawing.contains("Picture 2"));

    package.delete_picture(0, addr("D5")).unwrap();
    let out = package.to_bytes(None).unwrap();
    let names = entry_names(&out);
    assert!(!has(&names, "xl/media/image1.png"));
    assert!(has(&names, "xl/drawings/drawing1.xml"));
    assert!(has(&names, "xl/charts/chart1.xml"));
    let drawing_rels = entry_text(&out, "xl/drawings/_rels/drawing1.xml.rels").unwrap();
    assert!(!drawing_rels.contains("image1.png"));
    assert!(drawing_rels.contains("chart1.xml"));
}

#[test]
fn test_delete_picture_leaves_charts_alone() {
    let mut package = drawn().open();
    package.delete_picture(0, addr("F2")).unwrap();
    assert_eq!(package.state(), PackageState::Open);
}

#[test]
fn test_delete_chart_drops_chart_part() {
    let mut package = drawn().open();
    package.delete_chart(0, addr("F2")).unwrap();
    let out = package.to_bytes(None).unwrap();

    let names = entry_names(&out);
    assert!(!has(&names, "xl/charts/chart1.xml"));
    assert!(has(&names, "xl/media/image1.png"));
    let types = entry_text(&out, "[Content_Types].xml").unwrap();
    assert!(!types.contains("/xl/charts/chart1.xml"));
    assert!(types.contains("/xl/drawings/drawing1.xml"));
    let drawing = entry_text(&out, "xl/drawings/drawing1.xml").unwrap();
    assert!(!drawing.contains("Chart 1"));
}

#[test]
fn test_add_chart_creates_drawing() {
    let mut package = PackageBuilder::new().sheet("Sales", ROWS).open();
    let chart = Chart::new(ChartKind::Col)
        .with_title("Sales")
        .with_series(ChartSeries::new("Sales!$B$1", "Sales!$A$2:$A$3", "Sales!$B$2:$B$3"));
    package.add_chart(0, addr("D2"), &chart).unwrap();
    package.add_chart(0, addr("D20"), &chart).unwrap();
    let out = package.to_bytes(None).unwrap();

    let names = entry_names(&out);
    for name in [
        "xl/drawings/drawing1.xml",
        "xl/drawings/_rels/drawing1.xml.rels",
        "xl/charts/chart1.xml",
        "xl/charts/chart2.xml",
        "xl/worksheets/_rels/sheet1.xml.rels",
    ] {
        assert!(has(&names, name), "missing {}", name);
    }
    let sheet = entry_text(&out, "xl/worksheets/sheet1.xml").unwrap();
    assert!(sheet.contains(r#"<drawing r:id="rId1"/>"#));
    let types = entry_text(&out, "[Content_Types].xml").unwrap();
    assert!(types.contains("/xl/charts/chart2.xml"));
    assert!(types.contains("/xl/drawings/drawing1.xml"));
    let chart_xml = entry_text(&out, "xl/charts/chart1.xml").unwrap();
    assert!(chart_xml.contains("<c:barDir val=\"col\"/>"));
    assert!(chart_xml.contains("Sales!$B$2:$B$3"));

    let mut reopened = Package::from_bytes(out, Options::default()).unwrap();
    reopened.delete_chart(0, addr("D2")).unwrap();
    let out = reopened.to_bytes(None).unwrap();
    let names = entry_names(&out);
    assert!(!has(&names, "xl/charts/chart1.xml"));
    assert!(has(&names, "xl/charts/chart2.xml"));
}

#[test]
fn test_add_chart_rejects_empty_chart() {
    let mut package = PackageBuilder::new().sheet("Sales", ROWS).open();
    let err = package.add_chart(0, addr("D2"), &Chart::new(ChartKind::Pie)).unwrap_err();
    assert!(matches!(err, XlsxError::InvalidArgument(_)));
    assert_eq!(package.state(), PackageState::Open);
}

// ==================== Backgrounds ====================

#[test]
fn test_sheet_background_replaces_previous_image() {
    let mut package = PackageBuilder::new().sheet("Sales", ROWS).open();
    package.set_sheet_background_from_bytes(0, ".png", b"PNG-BYTES").unwrap();
    let out = package.to_bytes(None).unwrap();
    let names = entry_names(&out);
    assert!(has(&names, "xl/media/image1.png"));
    assert_eq!(entry_text(&out, "xl/media/image1.png").as_deref(), Some("PNG-BYTES"));
    let sheet = entry_text(&out, "xl/worksheets/sheet1.xml").unwrap();
    assert!(sheet.contains(r#"<picture r:id="rId1"/>"#));
    let types = entry_text(&out, "[Content_Types].xml").unwrap();
    assert!(types.contains(r#"Extension="png""#));

    package.set_sheet_background_from_bytes(0, "JPEG", b"JPEG-BYTES").unwrap();
    let out = package.to_bytes(None).unwrap();
    let names = entry_names(&out);
    assert!(!has(&names, "xl/media/image1.png"));
    assert!(has(&names, "xl/media/image1.jpeg"));
    let sheet = entry_text(&out, "xl/worksheets/sheet1.xml").unwrap();
    assert_eq!(sheet.matches("<picture ").count(), 1);
}

#[test]
fn test_sheet_background_rejects_bad_input() {
    let mut package = Package::new();
    let err = package.set_sheet_background_from_bytes(0, "txt", b"text").unwrap_err();
    assert!(matches!(err, XlsxError::InvalidArgument(_)));
    let err = package.set_sheet_background_from_bytes(0, "png", b"").unwrap_err();
    assert!(matches!(err, XlsxError::InvalidArgument(_)));
    assert!(package.set_sheet_background_from_bytes(3, "png", b"PNG").is_err());
}

// ==================== Slicers ====================

#[test]
fn test_delete_last_slicer_drops_cache() {
    let mut package = sliced(&["Region"]).open();
    package.delete_slicer("Region").unwrap();
    let out = package.to_bytes(None).unwrap();

    let names = entry_names(&out);
    assert!(!has(&names, "xl/slicers/slicer1.xml"));
    assert!(!has(&names, "xl/slicerCaches/slicerCache1.xml"));
    assert!(has(&names, "xl/drawings/drawing1.xml"));
    let sheet = entry_text(&out, "xl/worksheets/sheet1.xml").unwrap();
    assert!(!sheet.contains("slicerList"));
    assert!(sheet.contains(r#"<drawing r:id="rId1"/>"#));
    let workbook = entry_text(&out, "xl/workbook.xml").unwrap();
    assert!(!workbook.contains("slicerCache"));
    assert!(!workbook.contains("Slicer_Region"));
    let drawing = entry_text(&out, "xl/drawings/drawing1.xml").unwrap();
    assert!(!drawing.contains("AlternateContent"));
    let types = entry_text(&out, "[Content_Types].xml").unwrap();
    assert!(!types.contains("slicer"));

    let reopened = Package::from_bytes(out, Options::default()).unwrap();
    assert!(reopened
        .workbook()
        .unwrap()
        .defined_names()
        .get("Slicer_Region", NameScope::Workbook)
        .is_none());
}

#[test]
fn test_delete_slicer_keeps_shared_cache() {
    let mut package = sliced(&["Region", "Region 1"]).open();
    package.delete_slicer("Region").unwrap();
    let out = package.to_bytes(None).unwrap();

    let names = entry_names(&out);
    assert!(has(&names, "xl/slicers/slicer1.xml"));
    assert!(has(&names, "xl/slicerCaches/slicerCache1.xml"));
    let slicers = entry_text(&out, "xl/slicers/slicer1.xml").unwrap();
    assert!(!slicers.contains(r#"name="Region" "#));
    assert!(slicers.contains(r#"name="Region 1""#));
    let sheet = entry_text(&out, "xl/worksheets/sheet1.xml").unwrap();
    assert!(sheet.contains("slicerList"));
    let workbook = entry_text(&out, "xl/workbook.xml").unwrap();
    assert!(workbook.contains("slicerCache"));
}

#[test]
fn test_delete_missing_slicer() {
    let mut package = sliced(&["Region"]).open();
    let err = package.delete_slicer("Quarter").unwrap_err();
    assert!(matches!(err, XlsxError::InvalidArgument(_)));
    assert_eq!(package.state(), PackageState::Open);
}
