//! Styles part codec (`xl/styles.xml`)
//!
//! Cells refer to styles by their position in `<cellXfs>`. A loaded styles
//! part keeps its fonts, fills and borders as a prefix of the written tables,
//! so the ids used by the preserved `<cellStyleXfs>` stay valid.

use std::collections::HashMap;
use std::io::BufRead;

use cellar_core::style::{FontVerticalAlign, GradientStop};
use cellar_core::{
    Alignment, BorderEdge, BorderLineStyle, BorderStyle, Color, FillStyle, FontStyle,
    HorizontalAlignment, PatternType, Protection, Style, StyleTable, Underline, VerticalAlignment,
};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use super::{PartCodec, PartKind};
use crate::error::{XlsxError, XlsxResult};
use crate::xml::{self, Attrs, RawFragment};

/// Parts of a styles part that the style table does not model
#[derive(Debug, Clone, PartialEq)]
pub struct StylesLayout {
    pub root_attrs: Attrs,
    pub fonts: Vec<FontStyle>,
    pub fills: Vec<FillStyle>,
    pub borders: Vec<BorderStyle>,
    /// `xfId` of each loaded `<cellXfs>` entry
    pub xf_parents: Vec<u32>,
    pub cell_style_xfs: Option<RawFragment>,
    pub cell_styles: Option<RawFragment>,
    pub dxfs: Option<RawFragment>,
    pub table_styles: Option<RawFragment>,
    pub colors: Option<RawFragment>,
    pub ext_lst: Option<RawFragment>,
    /// Any other top-level element, in document order
    pub others: Vec<RawFragment>,
}

impl Default for StylesLayout {
    fn default() -> Self {
        Self {
            root_attrs: vec![("xmlns".to_string(), xml::NS_MAIN.to_string())],
            fonts: Vec::new(),
            fills: Vec::new(),
            borders: Vec::new(),
            xf_parents: Vec::new(),
            cell_style_xfs: None,
            cell_styles: None,
            dxfs: None,
            table_styles: None,
            colors: None,
            ext_lst: None,
            others: Vec::new(),
        }
    }
}

/// A decoded styles part
#[derive(Debug, Clone)]
pub struct StylesPart {
    pub layout: StylesLayout,
    pub table: StyleTable,
}

/// One `<xf>` of `<cellXfs>` before its ids are resolved
#[derive(Debug, Default)]
struct XfRecord {
    num_fmt_id: u32,
    font_id: usize,
    fill_id: usize,
    border_id: usize,
    xf_id: u32,
    alignment: Alignment,
    protection: Protection,
}

// === Reading ===

fn parse_attr<T: std::str::FromStr>(
    attrs: &[(String, String)],
    key: &str,
    part: &str,
    element: &str,
) -> XlsxResult<Option<T>> {
    match xml::attr(attrs, key) {
        Some(value) => value.trim().parse().map(Some).map_err(|_| {
            XlsxError::invalid_part(part, element, format!("bad {} '{}'", key, value))
        }),
        None => Ok(None),
    }
}

fn read_color(e: &BytesStart<'_>, part: &str) -> XlsxResult<Color> {
    let attrs = xml::attributes(e, part)?;
    if xml::attr(&attrs, "auto").is_some_and(xml::parse_bool) {
        return Ok(Color::Auto);
    }
    if let Some(rgb) = xml::attr(&attrs, "rgb") {
        return match Color::from_hex(rgb) {
            Some(Color::Argb { a: 0xFF, r, g, b }) => Ok(Color::Rgb { r, g, b }),
            Some(color) => Ok(color),
            None => Err(XlsxError::invalid_part(part, "color", format!("bad rgb '{}'", rgb))),
        };
    }
    if let Some(index) = parse_attr::<u32>(&attrs, "theme", part, "color")? {
        let tint = parse_attr::<f64>(&attrs, "tint", part, "color")?.unwrap_or(0.0);
        return Ok(Color::Theme { index, tint });
    }
    match parse_attr::<u32>(&attrs, "indexed", part, "color")? {
        Some(64) | None => Ok(Color::Auto),
        Some(index) => Ok(Color::Indexed(index)),
    }
}

/// `<b/>` is on, `<b val="0"/>` is off
fn flag(e: &BytesStart<'_>, part: &str) -> XlsxResult<bool> {
    let attrs = xml::attributes(e, part)?;
    Ok(xml::attr(&attrs, "val").map_or(true, xml::parse_bool))
}

fn val(e: &BytesStart<'_>, part: &str) -> XlsxResult<Option<String>> {
    let attrs = xml::attributes(e, part)?;
    Ok(xml::attr(&attrs, "val").map(str::to_string))
}

fn blank_font() -> FontStyle {
    FontStyle {
        family: None,
        scheme: None,
        ..FontStyle::default()
    }
}

fn apply_font_property(font: &mut FontStyle, e: &BytesStart<'_>, part: &str) -> XlsxResult<()> {
    match e.local_name().as_ref() {
        b"b" => font.bold = flag(e, part)?,
        b"i" => font.italic = flag(e, part)?,
        b"strike" => font.strikethrough = flag(e, part)?,
        b"u" => {
            font.underline = match val(e, part)? {
                Some(v) => Underline::parse(&v),
                None => Underline::Single,
            }
        }
        b"vertAlign" => {
            font.vertical_align = val(e, part)?
                .map(|v| FontVerticalAlign::parse(&v))
                .unwrap_or_default()
        }
        b"sz" => {
            if let Some(size) = val(e, part)? {
                font.size = size
                    .trim()
                    .parse()
                    .map_err(|_| XlsxError::invalid_part(part, "sz", format!("bad size '{}'", size)))?;
            }
        }
        b"color" => font.color = read_color(e, part)?,
        b"name" | b"rFont" => {
            if let Some(name) = val(e, part)? {
                font.name = name;
            }
        }
        b"family" => font.family = val(e, part)?.and_then(|v| v.trim().parse().ok()),
        b"scheme" => font.scheme = val(e, part)?,
        _ => {}
    }
    Ok(())
}

fn read_fonts<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
    part: &str,
) -> XlsxResult<Vec<FontStyle>> {
    let mut fonts = Vec::new();
    let mut current: Option<FontStyle> = None;
    loop {
        buf.clear();
        match reader.read_event_into(buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"font" => current = Some(blank_font()),
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"font" => fonts.push(blank_font()),
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if let Some(font) = current.as_mut() {
                    apply_font_property(font, &e, part)?;
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"font" => fonts.extend(current.take()),
                b"fonts" => return Ok(fonts),
                _ => {}
            },
            Ok(Event::Eof) => return Err(XlsxError::invalid_part(part, "fonts", "unexpected end of part")),
            Err(e) => return Err(XlsxError::xml(part, e)),
            _ => {}
        }
    }
}

#[derive(Debug, Default)]
struct FillBuilder {
    pattern: Option<PatternType>,
    foreground: Color,
    background: Color,
    gradient: Option<(bool, f64, Vec<GradientStop>)>,
    stop_position: Option<f64>,
}

impl FillBuilder {
    fn finish(self) -> FillStyle {
        if let Some((path, degree, stops)) = self.gradient {
            return FillStyle::Gradient { path, degree, stops };
        }
        match self.pattern {
            None | Some(PatternType::None) => FillStyle::None,
            Some(pattern) => FillStyle::Pattern {
                pattern,
                foreground: self.foreground,
                background: self.background,
            },
        }
    }

    fn apply(&mut self, e: &BytesStart<'_>, part: &str) -> XlsxResult<()> {
        match e.local_name().as_ref() {
            b"patternFill" => {
                let attrs = xml::attributes(e, part)?;
                self.pattern = match xml::attr(&attrs, "patternType") {
                    Some(p) => Some(PatternType::parse(p).ok_or_else(|| {
                        XlsxError::invalid_part(part, "patternFill", format!("unknown pattern '{}'", p))
                    })?),
                    None => None,
                };
            }
            b"fgColor" => self.foreground = read_color(e, part)?,
            b"bgColor" => self.background = read_color(e, part)?,
            b"gradientFill" => {
                let attrs = xml::attributes(e, part)?;
                let path = xml::attr(&attrs, "type") == Some("path");
                let degree = parse_attr(&attrs, "degree", part, "gradientFill")?.unwrap_or(0.0);
                self.gradient = Some((path, degree, Vec::new()));
            }
            b"stop" => {
                let attrs = xml::attributes(e, part)?;
                self.stop_position = Some(parse_attr(&attrs, "position", part, "stop")?.unwrap_or(0.0));
            }
            b"color" => {
                if let (Some(position), Some((_, _, stops))) =
                    (self.stop_position.take(), self.gradient.as_mut())
                {
                    stops.push(GradientStop {
                        position,
                        color: read_color(e, part)?,
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn read_fills<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
    part: &str,
) -> XlsxResult<Vec<FillStyle>> {
    let mut fills = Vec::new();
    let mut current: Option<FillBuilder> = None;
    loop {
        buf.clear();
        match reader.read_event_into(buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"fill" => {
                current = Some(FillBuilder::default())
            }
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"fill" => fills.push(FillStyle::None),
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if let Some(fill) = current.as_mut() {
                    fill.apply(&e, part)?;
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"fill" => fills.extend(current.take().map(FillBuilder::finish)),
                b"fills" => return Ok(fills),
                _ => {}
            },
            Ok(Event::Eof) => return Err(XlsxError::invalid_part(part, "fills", "unexpected end of part")),
            Err(e) => return Err(XlsxError::xml(part, e)),
            _ => {}
        }
    }
}

fn set_edge(border: &mut BorderStyle, name: &[u8], edge: Option<BorderEdge>) {
    match name {
        b"left" | b"start" => border.left = edge,
        b"right" | b"end" => border.right = edge,
        b"top" => border.top = edge,
        b"bottom" => border.bottom = edge,
        b"diagonal" => border.diagonal = edge,
        _ => {}
    }
}

fn edge_style(e: &BytesStart<'_>, part: &str) -> XlsxResult<Option<BorderLineStyle>> {
    let attrs = xml::attributes(e, part)?;
    match xml::attr(&attrs, "style") {
        None | Some("none") => Ok(None),
        Some(s) => BorderLineStyle::parse(s)
            .map(Some)
            .ok_or_else(|| XlsxError::invalid_part(part, "border", format!("unknown border style '{}'", s))),
    }
}

fn read_borders<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
    part: &str,
) -> XlsxResult<Vec<BorderStyle>> {
    const EDGES: [&[u8]; 7] = [b"left", b"right", b"top", b"bottom", b"diagonal", b"start", b"end"];
    let mut borders = Vec::new();
    let mut current: Option<BorderStyle> = None;
    let mut edge: Option<(Vec<u8>, Option<BorderEdge>)> = None;
    loop {
        buf.clear();
        match reader.read_event_into(buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"border" => {
                current = Some(border_head(&e, part)?);
            }
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"border" => {
                borders.push(border_head(&e, part)?);
            }
            Ok(Event::Start(e)) if EDGES.contains(&e.local_name().as_ref()) => {
                let style = edge_style(&e, part)?;
                let name = e.local_name().as_ref().to_vec();
                edge = Some((name, style.map(|style| BorderEdge::new(style, Color::Auto))));
            }
            Ok(Event::Empty(e)) if EDGES.contains(&e.local_name().as_ref()) => {
                let style = edge_style(&e, part)?;
                if let Some(border) = current.as_mut() {
                    set_edge(
                        border,
                        e.local_name().as_ref(),
                        style.map(|style| BorderEdge::new(style, Color::Auto)),
                    );
                }
            }
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"color" => {
                if let Some((_, Some(border_edge))) = edge.as_mut() {
                    border_edge.color = read_color(&e, part)?;
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"border" => borders.extend(current.take()),
                b"borders" => return Ok(borders),
                name if EDGES.contains(&name) => {
                    if let (Some(border), Some((name, value))) = (current.as_mut(), edge.take()) {
                        set_edge(border, &name, value);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => {
                return Err(XlsxError::invalid_part(part, "borders", "unexpected end of part"))
            }
            Err(e) => return Err(XlsxError::xml(part, e)),
            _ => {}
        }
    }
}

fn border_head(e: &BytesStart<'_>, part: &str) -> XlsxResult<BorderStyle> {
    let attrs = xml::attributes(e, part)?;
    Ok(BorderStyle {
        diagonal_up: xml::attr(&attrs, "diagonalUp").is_some_and(xml::parse_bool),
        diagonal_down: xml::attr(&attrs, "diagonalDown").is_some_and(xml::parse_bool),
        ..BorderStyle::default()
    })
}

fn read_alignment(e: &BytesStart<'_>, part: &str) -> XlsxResult<Alignment> {
    let attrs = xml::attributes(e, part)?;
    let mut alignment = Alignment::default();
    for (key, value) in &attrs {
        match key.as_str() {
            "horizontal" => {
                alignment.horizontal = HorizontalAlignment::parse(value).ok_or_else(|| {
                    XlsxError::invalid_part(part, "alignment", format!("bad horizontal '{}'", value))
                })?
            }
            "vertical" => {
                alignment.vertical = VerticalAlignment::parse(value).ok_or_else(|| {
                    XlsxError::invalid_part(part, "alignment", format!("bad vertical '{}'", value))
                })?
            }
            "wrapText" => alignment.wrap_text = xml::parse_bool(value),
            "shrinkToFit" => alignment.shrink_to_fit = xml::parse_bool(value),
            "indent" => alignment.indent = parse_attr(&attrs, "indent", part, "alignment")?.unwrap_or(0),
            "textRotation" => {
                alignment.rotation = parse_attr(&attrs, "textRotation", part, "alignment")?.unwrap_or(0)
            }
            "readingOrder" => {
                alignment.reading_order =
                    parse_attr(&attrs, "readingOrder", part, "alignment")?.unwrap_or(0)
            }
            _ => {}
        }
    }
    Ok(alignment)
}

fn read_protection(e: &BytesStart<'_>, part: &str) -> XlsxResult<Protection> {
    let attrs = xml::attributes(e, part)?;
    let mut protection = Protection::default();
    if let Some(locked) = xml::attr(&attrs, "locked") {
        protection.locked = xml::parse_bool(locked);
    }
    if let Some(hidden) = xml::attr(&attrs, "hidden") {
        protection.hidden = xml::parse_bool(hidden);
    }
    Ok(protection)
}

fn xf_record(e: &BytesStart<'_>, part: &str) -> XlsxResult<XfRecord> {
    let attrs = xml::attributes(e, part)?;
    Ok(XfRecord {
        num_fmt_id: parse_attr(&attrs, "numFmtId", part, "xf")?.unwrap_or(0),
        font_id: parse_attr(&attrs, "fontId", part, "xf")?.unwrap_or(0),
        fill_id: parse_attr(&attrs, "fillId", part, "xf")?.unwrap_or(0),
        border_id: parse_attr(&attrs, "borderId", part, "xf")?.unwrap_or(0),
        xf_id: parse_attr(&attrs, "xfId", part, "xf")?.unwrap_or(0),
        ..XfRecord::default()
    })
}

fn read_cell_xfs<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
    part: &str,
) -> XlsxResult<Vec<XfRecord>> {
    let mut xfs = Vec::new();
    let mut current: Option<XfRecord> = None;
    loop {
        buf.clear();
        match reader.read_event_into(buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"xf" => current = Some(xf_record(&e, part)?),
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"xf" => xfs.push(xf_record(&e, part)?),
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if let Some(xf) = current.as_mut() {
                    match e.local_name().as_ref() {
                        b"alignment" => xf.alignment = read_alignment(&e, part)?,
                        b"protection" => xf.protection = read_protection(&e, part)?,
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"xf" => xfs.extend(current.take()),
                b"cellXfs" => return Ok(xfs),
                _ => {}
            },
            Ok(Event::Eof) => return Err(XlsxError::invalid_part(part, "cellXfs", "unexpected end of part")),
            Err(e) => return Err(XlsxError::xml(part, e)),
            _ => {}
        }
    }
}

fn read_num_fmts<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
    part: &str,
    table: &mut StyleTable,
) -> XlsxResult<()> {
    loop {
        buf.clear();
        match reader.read_event_into(buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"numFmt" => {
                let attrs = xml::attributes(&e, part)?;
                let id: u32 = parse_attr(&attrs, "numFmtId", part, "numFmt")?
                    .ok_or_else(|| XlsxError::invalid_part(part, "numFmt", "missing numFmtId"))?;
                let code = xml::attr(&attrs, "formatCode")
                    .ok_or_else(|| XlsxError::invalid_part(part, "numFmt", "missing formatCode"))?;
                table.number_formats_mut().insert_loaded(id, code);
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"numFmts" => return Ok(()),
            Ok(Event::Eof) => return Err(XlsxError::invalid_part(part, "numFmts", "unexpected end of part")),
            Err(e) => return Err(XlsxError::xml(part, e)),
            _ => {}
        }
    }
}

fn lookup<'a, T>(items: &'a [T], id: usize, part: &str, what: &str) -> XlsxResult<&'a T> {
    items.get(id).ok_or_else(|| {
        XlsxError::invalid_part(
            part,
            "xf",
            format!("{} {} out of range ({} defined)", what, id, items.len()),
        )
    })
}

impl PartCodec for StylesPart {
    const KIND: PartKind = PartKind::Styles;

    fn decode<R: BufRead>(path: &str, input: R) -> XlsxResult<Self> {
        let mut reader = xml::reader(input);
        let mut buf = Vec::new();
        let (root, root_attrs, empty) = xml::read_root(&mut reader, &mut buf, path)?;
        if root != "styleSheet" {
            return Err(XlsxError::invalid_part(path, root, "expected <styleSheet>"));
        }
        xml::check_transitional(path, &root_attrs)?;
        let rel_prefixes = xml::relationship_prefixes(&root_attrs);

        let mut layout = StylesLayout {
            root_attrs,
            ..StylesLayout::default()
        };
        let mut table = StyleTable::empty();
        let mut xfs = Vec::new();

        while !empty {
            buf.clear();
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    let e = e.into_owned();
                    match e.local_name().as_ref() {
                        b"numFmts" => read_num_fmts(&mut reader, &mut buf, path, &mut table)?,
                        b"fonts" => layout.fonts = read_fonts(&mut reader, &mut buf, path)?,
                        b"fills" => layout.fills = read_fills(&mut reader, &mut buf, path)?,
                        b"borders" => layout.borders = read_borders(&mut reader, &mut buf, path)?,
                        b"cellXfs" => xfs = read_cell_xfs(&mut reader, &mut buf, path)?,
                        _ => {
                            let raw =
                                xml::capture(&mut reader, &mut buf, path, &e, false, &rel_prefixes)?;
                            layout.keep(raw);
                        }
                    }
                }
                Ok(Event::Empty(e)) => {
                    let e = e.into_owned();
                    match e.local_name().as_ref() {
                        b"numFmts" | b"fonts" | b"fills" | b"borders" | b"cellXfs" => {}
                        _ => {
                            let raw =
                                xml::capture(&mut reader, &mut buf, path, &e, true, &rel_prefixes)?;
                            layout.keep(raw);
                        }
                    }
                }
                Ok(Event::End(_)) | Ok(Event::Eof) => break,
                Err(e) => return Err(XlsxError::xml(path, e)),
                _ => {}
            }
        }

        if xfs.is_empty() {
            table.push_loaded(Style::default());
            layout.xf_parents.push(0);
        }
        let default_font = FontStyle::default();
        let default_border = BorderStyle::default();
        for xf in xfs {
            let font = if layout.fonts.is_empty() && xf.font_id == 0 {
                &default_font
            } else {
                lookup(&layout.fonts, xf.font_id, path, "fontId")?
            };
            let fill = if layout.fills.is_empty() && xf.fill_id == 0 {
                FillStyle::None
            } else {
                lookup(&layout.fills, xf.fill_id, path, "fillId")?.clone()
            };
            let border = if layout.borders.is_empty() && xf.border_id == 0 {
                &default_border
            } else {
                lookup(&layout.borders, xf.border_id, path, "borderId")?
            };
            table.push_loaded(Style {
                number_format: table.number_formats().resolve(xf.num_fmt_id),
                font: font.clone(),
                fill,
                border: border.clone(),
                alignment: xf.alignment,
                protection: xf.protection,
            });
            layout.xf_parents.push(xf.xf_id);
        }

        Ok(Self { layout, table })
    }

    fn encode(&self) -> Vec<u8> {
        encode_styles(&self.layout, &self.table)
    }
}

impl StylesLayout {
    fn keep(&mut self, raw: RawFragment) {
        let slot = match raw.name.as_str() {
            "cellStyleXfs" => &mut self.cell_style_xfs,
            "cellStyles" => &mut self.cell_styles,
            "dxfs" => &mut self.dxfs,
            "tableStyles" => &mut self.table_styles,
            "colors" => &mut self.colors,
            "extLst" => &mut self.ext_lst,
            _ => {
                self.others.push(raw);
                return;
            }
        };
        *slot = Some(raw);
    }
}

// === Writing ===

fn color_attrs(color: &Color) -> Option<String> {
    match color {
        Color::Auto => None,
        Color::Rgb { .. } | Color::Argb { .. } => {
            color.to_argb_hex().map(|hex| format!(" rgb=\"{}\"", hex))
        }
        Color::Theme { index, tint } => {
            if *tint == 0.0 {
                Some(format!(" theme=\"{}\"", index))
            } else {
                Some(format!(" theme=\"{}\" tint=\"{}\"", index, tint))
            }
        }
        Color::Indexed(i) => Some(format!(" indexed=\"{}\"", i)),
    }
}

fn write_color(xml: &mut String, tag: &str, color: &Color) {
    if let Some(attrs) = color_attrs(color) {
        xml.push_str(&format!("<{}{}/>", tag, attrs));
    }
}

fn write_font(xml: &mut String, font: &FontStyle) {
    xml.push_str("<font>");
    if font.bold {
        xml.push_str("<b/>");
    }
    if font.italic {
        xml.push_str("<i/>");
    }
    if font.strikethrough {
        xml.push_str("<strike/>");
    }
    match font.underline {
        Underline::None => {}
        Underline::Single => xml.push_str("<u/>"),
        other => xml.push_str(&format!("<u val=\"{}\"/>", other.as_str())),
    }
    if font.vertical_align != FontVerticalAlign::Baseline {
        xml.push_str(&format!("<vertAlign val=\"{}\"/>", font.vertical_align.as_str()));
    }
    xml.push_str(&format!("<sz val=\"{}\"/>", font.size));
    write_color(xml, "color", &font.color);
    xml.push_str(&format!("<name val=\"{}\"/>", xml::escape_attr(&font.name)));
    if let Some(family) = font.family {
        xml.push_str(&format!("<family val=\"{}\"/>", family));
    }
    if let Some(scheme) = &font.scheme {
        xml.push_str(&format!("<scheme val=\"{}\"/>", xml::escape_attr(scheme)));
    }
    xml.push_str("</font>");
}

fn write_fill(xml: &mut String, fill: &FillStyle) {
    match fill {
        FillStyle::None => xml.push_str("<fill><patternFill patternType=\"none\"/></fill>"),
        FillStyle::Pattern {
            pattern,
            foreground,
            background,
        } => {
            let mut colors = String::new();
            write_color(&mut colors, "fgColor", foreground);
            write_color(&mut colors, "bgColor", background);
            if colors.is_empty() {
                xml.push_str(&format!(
                    "<fill><patternFill patternType=\"{}\"/></fill>",
                    pattern.as_str()
                ));
            } else {
                xml.push_str(&format!(
                    "<fill><patternFill patternType=\"{}\">{}</patternFill></fill>",
                    pattern.as_str(),
                    colors
                ));
            }
        }
        FillStyle::Gradient { path, degree, stops } => {
            xml.push_str("<fill><gradientFill");
            if *path {
                xml.push_str(" type=\"path\"");
            }
            if *degree != 0.0 {
                xml.push_str(&format!(" degree=\"{}\"", degree));
            }
            xml.push('>');
            for stop in stops {
                xml.push_str(&format!("<stop position=\"{}\">", stop.position));
                match color_attrs(&stop.color) {
                    Some(attrs) => xml.push_str(&format!("<color{}/>", attrs)),
                    None => xml.push_str("<color auto=\"1\"/>"),
                }
                xml.push_str("</stop>");
            }
            xml.push_str("</gradientFill></fill>");
        }
    }
}

fn write_border_edge(xml: &mut String, tag: &str, edge: &Option<BorderEdge>) {
    match edge {
        Some(edge) if edge.style != BorderLineStyle::None => {
            xml.push_str(&format!("<{} style=\"{}\">", tag, edge.style.as_str()));
            match color_attrs(&edge.color) {
                Some(attrs) => xml.push_str(&format!("<color{}/>", attrs)),
                None => xml.push_str("<color auto=\"1\"/>"),
            }
            xml.push_str(&format!("</{}>", tag));
        }
        _ => xml.push_str(&format!("<{}/>", tag)),
    }
}

fn write_border(xml: &mut String, border: &BorderStyle) {
    xml.push_str("<border");
    if border.diagonal_up {
        xml.push_str(" diagonalUp=\"1\"");
    }
    if border.diagonal_down {
        xml.push_str(" diagonalDown=\"1\"");
    }
    xml.push('>');
    write_border_edge(xml, "left", &border.left);
    write_border_edge(xml, "right", &border.right);
    write_border_edge(xml, "top", &border.top);
    write_border_edge(xml, "bottom", &border.bottom);
    write_border_edge(xml, "diagonal", &border.diagonal);
    xml.push_str("</border>");
}

fn write_alignment(xml: &mut String, al: &Alignment) {
    let default = Alignment::default();
    if al == &default {
        return;
    }
    xml.push_str("<alignment");
    if al.horizontal != default.horizontal {
        xml.push_str(&format!(" horizontal=\"{}\"", al.horizontal.as_str()));
    }
    if al.vertical != default.vertical {
        xml.push_str(&format!(" vertical=\"{}\"", al.vertical.as_str()));
    }
    if al.rotation != 0 {
        xml.push_str(&format!(" textRotation=\"{}\"", al.rotation));
    }
    if al.wrap_text {
        xml.push_str(" wrapText=\"1\"");
    }
    if al.indent != 0 {
        xml.push_str(&format!(" indent=\"{}\"", al.indent));
    }
    if al.shrink_to_fit {
        xml.push_str(" shrinkToFit=\"1\"");
    }
    if al.reading_order != 0 {
        xml.push_str(&format!(" readingOrder=\"{}\"", al.reading_order));
    }
    xml.push_str("/>");
}

fn write_protection(xml: &mut String, p: &Protection) {
    let default = Protection::default();
    if p == &default {
        return;
    }
    xml.push_str("<protection");
    if p.locked != default.locked {
        xml.push_str(&format!(" locked=\"{}\"", u8::from(p.locked)));
    }
    if p.hidden != default.hidden {
        xml.push_str(&format!(" hidden=\"{}\"", u8::from(p.hidden)));
    }
    xml.push_str("/>");
}

#[derive(Debug, Clone, Copy)]
struct XfIds {
    num_fmt_id: u32,
    font_id: usize,
    fill_id: usize,
    border_id: usize,
    xf_id: u32,
}

fn write_xf(xml: &mut String, style: &Style, ids: XfIds) {
    xml.push_str(&format!(
        "<xf numFmtId=\"{}\" fontId=\"{}\" fillId=\"{}\" borderId=\"{}\" xfId=\"{}\"",
        ids.num_fmt_id, ids.font_id, ids.fill_id, ids.border_id, ids.xf_id
    ));
    if ids.num_fmt_id != 0 {
        xml.push_str(" applyNumberFormat=\"1\"");
    }
    if ids.font_id != 0 {
        xml.push_str(" applyFont=\"1\"");
    }
    if ids.fill_id != 0 {
        xml.push_str(" applyFill=\"1\"");
    }
    if ids.border_id != 0 {
        xml.push_str(" applyBorder=\"1\"");
    }
    if !style.alignment.is_default() {
        xml.push_str(" applyAlignment=\"1\"");
    }
    if style.protection != Protection::default() {
        xml.push_str(" applyProtection=\"1\"");
    }

    let mut children = String::new();
    write_alignment(&mut children, &style.alignment);
    write_protection(&mut children, &style.protection);
    if children.is_empty() {
        xml.push_str("/>");
    } else {
        xml.push('>');
        xml.push_str(&children);
        xml.push_str("</xf>");
    }
}

/// Components shared between styles, each written once
struct Interner<'a, T: std::hash::Hash + Eq> {
    items: Vec<&'a T>,
    ids: HashMap<&'a T, usize>,
}

impl<'a, T: std::hash::Hash + Eq> Interner<'a, T> {
    fn new(seed: impl IntoIterator<Item = &'a T>) -> Self {
        let mut interner = Self {
            items: Vec::new(),
            ids: HashMap::new(),
        };
        for item in seed {
            let id = interner.items.len();
            interner.items.push(item);
            interner.ids.entry(item).or_insert(id);
        }
        interner
    }

    fn id(&mut self, item: &'a T) -> usize {
        if let Some(&id) = self.ids.get(item) {
            return id;
        }
        let id = self.items.len();
        self.items.push(item);
        self.ids.insert(item, id);
        id
    }
}

/// Serialize a style table into a styles part
pub fn encode_styles(layout: &StylesLayout, table: &StyleTable) -> Vec<u8> {
    let default_font = FontStyle::default();
    let default_fills = [
        FillStyle::None,
        FillStyle::Pattern {
            pattern: PatternType::Gray125,
            foreground: Color::Auto,
            background: Color::Auto,
        },
    ];
    let default_border = BorderStyle::default();

    let mut fonts = if layout.fonts.is_empty() {
        Interner::new([&default_font])
    } else {
        Interner::new(&layout.fonts)
    };
    let mut fills = if layout.fills.is_empty() {
        Interner::new(&default_fills)
    } else {
        Interner::new(&layout.fills)
    };
    let mut borders = if layout.borders.is_empty() {
        Interner::new([&default_border])
    } else {
        Interner::new(&layout.borders)
    };

    let ids: Vec<XfIds> = table
        .iter()
        .map(|(idx, style)| XfIds {
            num_fmt_id: table.number_formats().id_of(&style.number_format).unwrap_or(0),
            font_id: fonts.id(&style.font),
            fill_id: fills.id(&style.fill),
            border_id: borders.id(&style.border),
            xf_id: layout.xf_parents.get(idx as usize).copied().unwrap_or(0),
        })
        .collect();

    let mut xml = String::with_capacity(4096);
    xml.push_str(xml::XML_DECLARATION);
    xml.push_str("<styleSheet");
    xml::write_attrs(&mut xml, &layout.root_attrs);
    xml.push('>');

    let custom: Vec<(u32, &str)> = table.number_formats().custom_formats().collect();
    if !custom.is_empty() {
        xml.push_str(&format!("<numFmts count=\"{}\">", custom.len()));
        for (id, code) in custom {
            xml.push_str(&format!(
                "<numFmt numFmtId=\"{}\" formatCode=\"{}\"/>",
                id,
                xml::escape_attr(code)
            ));
        }
        xml.push_str("</numFmts>");
    }

    xml.push_str(&format!("<fonts count=\"{}\">", fonts.items.len()));
    for font in &fonts.items {
        write_font(&mut xml, font);
    }
    xml.push_str("</fonts>");

    xml.push_str(&format!("<fills count=\"{}\">", fills.items.len()));
    for fill in &fills.items {
        write_fill(&mut xml, fill);
    }
    xml.push_str("</fills>");

    xml.push_str(&format!("<borders count=\"{}\">", borders.items.len()));
    for border in &borders.items {
        write_border(&mut xml, border);
    }
    xml.push_str("</borders>");

    match &layout.cell_style_xfs {
        Some(raw) => xml.push_str(&raw.xml),
        None => xml.push_str(
            "<cellStyleXfs count=\"1\"><xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\"/></cellStyleXfs>",
        ),
    }

    xml.push_str(&format!("<cellXfs count=\"{}\">", table.len()));
    for ((_, style), ids) in table.iter().zip(ids) {
        write_xf(&mut xml, style, ids);
    }
    xml.push_str("</cellXfs>");

    match &layout.cell_styles {
        Some(raw) => xml.push_str(&raw.xml),
        None => xml.push_str(
            "<cellStyles count=\"1\"><cellStyle name=\"Normal\" xfId=\"0\" builtinId=\"0\"/></cellStyles>",
        ),
    }
    match &layout.dxfs {
        Some(raw) => xml.push_str(&raw.xml),
        None => xml.push_str("<dxfs count=\"0\"/>"),
    }
    match &layout.table_styles {
        Some(raw) => xml.push_str(&raw.xml),
        None => xml.push_str(
            "<tableStyles count=\"0\" defaultTableStyle=\"TableStyleMedium2\" defaultPivotStyle=\"PivotStyleLight16\"/>",
        ),
    }
    if let Some(raw) = &layout.colors {
        xml.push_str(&raw.xml);
    }
    for raw in &layout.others {
        xml.push_str(&raw.xml);
    }
    if let Some(raw) = &layout.ext_lst {
        xml.push_str(&raw.xml);
    }
    xml.push_str("</styleSheet>");
    xml.into_bytes()
}
