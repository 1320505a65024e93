//! Chart parts (`xl/charts/chartN.xml`)
//!
//! Charts are write-only: a [`Chart`] is encoded once when it is added and
//! the part is passed through from then on.

use crate::error::{XlsxError, XlsxResult};
use crate::xml::{self, escape_text};

const NS_CHART: &str = "http://schemas.openxmlformats.org/drawingml/2006/chart";
const NS_DRAWING: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";

const CATEGORY_AXIS_ID: u32 = 100_000_000;
const VALUE_AXIS_ID: u32 = 100_000_001;

/// Default chart size in pixels
pub const DEFAULT_CHART_WIDTH: u32 = 480;
pub const DEFAULT_CHART_HEIGHT: u32 = 290;

/// Chart types that can be added
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Area,
    AreaStacked,
    /// Horizontal bars
    Bar,
    BarStacked,
    /// Vertical bars
    Col,
    ColStacked,
    Doughnut,
    Line,
    Pie,
    Scatter,
}

impl ChartKind {
    fn has_axes(self) -> bool {
        !matches!(self, ChartKind::Pie | ChartKind::Doughnut)
    }
}

/// Where the legend goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LegendPosition {
    /// No legend
    None,
    Top,
    #[default]
    Bottom,
    Left,
    Right,
    TopRight,
}

impl LegendPosition {
    fn xml_value(self) -> Option<&'static str> {
        match self {
            LegendPosition::None => None,
            LegendPosition::Top => Some("t"),
            LegendPosition::Bottom => Some("b"),
            LegendPosition::Left => Some("l"),
            LegendPosition::Right => Some("r"),
            LegendPosition::TopRight => Some("tr"),
        }
    }
}

/// One data series
///
/// `name` is either a reference (`Sheet1!$A$2`) or literal text.
/// `categories` and `values` are range references such as
/// `Sheet1!$B$1:$D$1`; a leading `=` is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChartSeries {
    pub name: String,
    pub categories: String,
    pub values: String,
}

impl ChartSeries {
    pub fn new(name: &str, categories: &str, values: &str) -> Self {
        Self {
            name: name.to_string(),
            categories: categories.to_string(),
            values: values.to_string(),
        }
    }
}

/// A chart to add to a sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chart {
    pub kind: ChartKind,
    pub series: Vec<ChartSeries>,
    pub title: Option<String>,
    pub legend: LegendPosition,
    /// Size in pixels
    pub width: u32,
    pub height: u32,
    /// Offset from the top-left corner of the anchor cell, in pixels
    pub offset_x: u32,
    pub offset_y: u32,
}

impl Chart {
    pub fn new(kind: ChartKind) -> Self {
        Self {
            kind,
            series: Vec::new(),
            title: None,
            legend: LegendPosition::default(),
            width: DEFAULT_CHART_WIDTH,
            height: DEFAULT_CHART_HEIGHT,
            offset_x: 0,
            offset_y: 0,
        }
    }

    pub fn with_series(mut self, series: ChartSeries) -> Self {
        self.series.push(series);
        self
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Reject charts Excel would not open
    pub fn validate(&self) -> XlsxResult<()> {
        if self.series.is_empty() {
            return Err(XlsxError::InvalidArgument("a chart needs at least one series".into()));
        }
        if let Some(i) = self.series.iter().position(|s| reference(&s.values).is_empty()) {
            return Err(XlsxError::InvalidArgument(format!(
                "series {} of the chart has no values",
                i + 1
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(XlsxError::InvalidArgument(format!(
                "chart size {}x{} is empty",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

fn reference(formula: &str) -> &str {
    formula.trim().trim_start_matches('=')
}

/// Serialize a chart part
pub fn encode_chart(chart: &Chart) -> Vec<u8> {
    let mut out = String::with_capacity(2048);
    out.push_str(xml::XML_DECLARATION);
    out.push_str(&format!(
        r#"<c:chartSpace xmlns:c="{}" xmlns:a="{}" xmlns:r="{}">"#,
        NS_CHART,
        NS_DRAWING,
        xml::NS_RELATIONSHIPS
    ));
    out.push_str(r#"<c:date1904 val="0"/><c:lang val="en-US"/><c:roundedCorners val="0"/><c:chart>"#);

    if let Some(title) = &chart.title {
        out.push_str(&format!(
            r#"<c:title><c:tx><c:rich><a:bodyPr/><a:lstStyle/><a:p><a:r><a:t>{}</a:t></a:r></a:p></c:rich></c:tx><c:overlay val="0"/></c:title>"#,
            escape_text(title)
        ));
    }
    out.push_str(&format!(
        r#"<c:autoTitleDeleted val="{}"/>"#,
        if chart.title.is_some() { 0 } else { 1 }
    ));

    out.push_str("<c:plotArea><c:layout/>");
    write_group(&mut out, chart);
    if chart.kind.has_axes() {
        write_axes(&mut out, chart.kind);
    }
    out.push_str("</c:plotArea>");

    if let Some(pos) = chart.legend.xml_value() {
        out.push_str(&format!(
            r#"<c:legend><c:legendPos val="{}"/><c:overlay val="0"/></c:legend>"#,
            pos
        ));
    }
    out.push_str(r#"<c:plotVisOnly val="1"/><c:dispBlanksAs val="gap"/></c:chart></c:chartSpace>"#);
    out.into_bytes()
}

fn write_group(out: &mut String, chart: &Chart) {
    let axis_ids = format!(
        r#"<c:axId val="{}"/><c:axId val="{}"/>"#,
        CATEGORY_AXIS_ID, VALUE_AXIS_ID
    );
    match chart.kind {
        ChartKind::Bar | ChartKind::BarStacked | ChartKind::Col | ChartKind::ColStacked => {
            let dir = if matches!(chart.kind, ChartKind::Bar | ChartKind::BarStacked) {
                "bar"
            } else {
                "col"
            };
            let stacked = matches!(chart.kind, ChartKind::BarStacked | ChartKind::ColStacked);
            out.push_str(&format!(
                r#"<c:barChart><c:barDir val="{}"/><c:grouping val="{}"/><c:varyColors val="0"/>"#,
                dir,
                if stacked { "stacked" } else { "clustered" }
            ));
            write_series(out, chart);
            out.push_str(r#"<c:gapWidth val="150"/>"#);
            if stacked {
                out.push_str(r#"<c:overlap val="100"/>"#);
            }
            out.push_str(&axis_ids);
            out.push_str("</c:barChart>");
        }
        ChartKind::Area | ChartKind::AreaStacked => {
            out.push_str(&format!(
                r#"<c:areaChart><c:grouping val="{}"/><c:varyColors val="0"/>"#,
                if chart.kind == ChartKind::AreaStacked {
                    "stacked"
                } else {
                    "standard"
                }
            ));
            write_series(out, chart);
            out.push_str(&axis_ids);
            out.push_str("</c:areaChart>");
        }
        ChartKind::Line => {
            out.push_str(r#"<c:lineChart><c:grouping val="standard"/><c:varyColors val="0"/>"#);
            write_series(out, chart);
            out.push_str(r#"<c:marker val="1"/>"#);
            out.push_str(&axis_ids);
            out.push_str("</c:lineChart>");
        }
        ChartKind::Pie => {
            out.push_str(r#"<c:pieChart><c:varyColors val="1"/>"#);
            write_series(out, chart);
            out.push_str(r#"<c:firstSliceAng val="0"/></c:pieChart>"#);
        }
        ChartKind::Doughnut => {
            out.push_str(r#"<c:doughnutChart><c:varyColors val="1"/>"#);
            write_series(out, chart);
            out.push_str(r#"<c:firstSliceAng val="0"/><c:holeSize val="75"/></c:doughnutChart>"#);
        }
        ChartKind::Scatter => {
            out.push_str(r#"<c:scatterChart><c:scatterStyle val="lineMarker"/><c:varyColors val="0"/>"#);
            write_series(out, chart);
            out.push_str(&axis_ids);
            out.push_str("</c:scatterChart>");
        }
    }
}

fn write_series(out: &mut String, chart: &Chart) {
    let (cat_tag, val_tag) = if chart.kind == ChartKind::Scatter {
        ("c:xVal", "c:yVal")
    } else {
        ("c:cat", "c:val")
    };
    for (i, series) in chart.series.iter().enumerate() {
        out.push_str(&format!(r#"<c:ser><c:idx val="{0}"/><c:order val="{0}"/>"#, i));
        let name = series.name.trim();
        if !name.is_empty() {
            if name.contains('!') {
                out.push_str(&format!(
                    "<c:tx><c:strRef><c:f>{}</c:f></c:strRef></c:tx>",
                    escape_text(reference(name))
                ));
            } else {
                out.push_str(&format!("<c:tx><c:v>{}</c:v></c:tx>", escape_text(name)));
            }
        }
        let categories = reference(&series.categories);
        if !categories.is_empty() {
            let kind = if chart.kind == ChartKind::Scatter { "num" } else { "str" };
            out.push_str(&format!(
                "<{tag}><c:{kind}Ref><c:f>{f}</c:f></c:{kind}Ref></{tag}>",
                tag = cat_tag,
                kind = kind,
                f = escape_text(categories)
            ));
        }
        out.push_str(&format!(
            "<{tag}><c:numRef><c:f>{f}</c:f></c:numRef></{tag}>",
            tag = val_tag,
            f = escape_text(reference(&series.values))
        ));
        out.push_str("</c:ser>");
    }
}

fn write_axes(out: &mut String, kind: ChartKind) {
    let horizontal = matches!(kind, ChartKind::Bar | ChartKind::BarStacked);
    let (cat_pos, val_pos) = if horizontal { ("l", "b") } else { ("b", "l") };
    let common = |id: u32, pos: &str, cross: u32, gridlines: bool| {
        format!(
            r#"<c:axId val="{}"/><c:scaling><c:orientation val="minMax"/></c:scaling><c:delete val="0"/><c:axPos val="{}"/>{}<c:numFmt formatCode="General" sourceLinked="1"/><c:majorTickMark val="none"/><c:minorTickMark val="none"/><c:tickLblPos val="nextTo"/><c:crossAx val="{}"/><c:crosses val="autoZero"/>"#,
            id,
            pos,
            if gridlines { "<c:majorGridlines/>" } else { "" },
            cross
        )
    };
    if kind == ChartKind::Scatter {
        out.push_str(&format!(
            r#"<c:valAx>{}<c:crossBetween val="midCat"/></c:valAx>"#,
            common(CATEGORY_AXIS_ID, "b", VALUE_AXIS_ID, false)
        ));
    } else {
        out.push_str(&format!(
            r#"<c:catAx>{}<c:auto val="1"/><c:lblAlgn val="ctr"/><c:lblOffset val="100"/><c:noMultiLvlLbl val="0"/></c:catAx>"#,
            common(CATEGORY_AXIS_ID, cat_pos, VALUE_AXIS_ID, false)
        ));
    }
    out.push_str(&format!(
        r#"<c:valAx>{}<c:crossBetween val="between"/></c:valAx>"#,
        common(VALUE_AXIS_ID, val_pos, CATEGORY_AXIS_ID, true)
    ));
}
