//! Part codecs
//!
//! Each typed part has a codec that turns its XML into structured data and
//! back. Decoding keeps everything the model does not understand (root
//! attributes, unknown elements and their position) so that encoding puts
//! it back in the same place. Codecs are pure: they never touch the archive.
//!
//! Drawings, comments and slicers are not decoded into structures; their
//! modules edit the parsed element tree in place.

mod chart;
pub(crate) mod comments;
mod doc_props;
pub(crate) mod drawing;
mod shared_strings;
pub(crate) mod slicer;
mod styles;
mod workbook;
mod worksheet;

use std::io::BufRead;

use crate::content_types::ContentTypes;
use crate::error::XlsxResult;
use crate::rels::{self, Relationship};

pub use chart::{
    encode_chart, Chart, ChartKind, ChartSeries, LegendPosition, DEFAULT_CHART_HEIGHT,
    DEFAULT_CHART_WIDTH,
};
pub use doc_props::{encode_doc_props, CoreLayout, CorePropertiesPart};
pub use shared_strings::{encode_shared_strings, SharedStringsPart};
pub use styles::{encode_styles, StylesLayout, StylesPart};
pub use workbook::{DefinedNameRecord, SheetRecord, WorkbookLayout, WorkbookPart, WorkbookSlot};
pub use worksheet::{encode_worksheet, SheetContext, SheetLayout, SheetSlot, WorksheetPart};

pub(crate) use shared_strings::encode_with_root as encode_shared_strings_with_root;
pub(crate) use worksheet::{
    cell_content, dimension_ref, encode_head, encode_tail, seek_sheet_data, write_cell,
    write_row_end, write_row_start, ParsedRow, RowParser,
};

/// The parts the codecs understand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartKind {
    ContentTypes,
    Relationships,
    Workbook,
    Worksheet,
    SharedStrings,
    Styles,
    CoreProperties,
}

/// A decoded part
#[derive(Debug, Clone)]
pub enum TypedPart {
    ContentTypes(ContentTypes),
    Relationships {
        source: String,
        rels: Vec<Relationship>,
    },
    Workbook(WorkbookPart),
    Worksheet(WorksheetPart),
    SharedStrings(SharedStringsPart),
    Styles(StylesPart),
    CoreProperties(CorePropertiesPart),
}

impl TypedPart {
    pub fn kind(&self) -> PartKind {
        match self {
            TypedPart::ContentTypes(_) => PartKind::ContentTypes,
            TypedPart::Relationships { .. } => PartKind::Relationships,
            TypedPart::Workbook(_) => PartKind::Workbook,
            TypedPart::Worksheet(_) => PartKind::Worksheet,
            TypedPart::SharedStrings(_) => PartKind::SharedStrings,
            TypedPart::Styles(_) => PartKind::Styles,
            TypedPart::CoreProperties(_) => PartKind::CoreProperties,
        }
    }
}

/// Conversion between a part's bytes and its structure
pub trait PartCodec: Sized {
    const KIND: PartKind;

    /// Parse a part; `path` is used in error messages
    fn decode<R: BufRead>(path: &str, input: R) -> XlsxResult<Self>;

    fn decode_bytes(path: &str, bytes: &[u8]) -> XlsxResult<Self> {
        Self::decode(path, bytes)
    }

    fn encode(&self) -> Vec<u8>;
}

impl PartCodec for ContentTypes {
    const KIND: PartKind = PartKind::ContentTypes;

    fn decode<R: BufRead>(_path: &str, input: R) -> XlsxResult<Self> {
        ContentTypes::decode(input)
    }

    fn encode(&self) -> Vec<u8> {
        ContentTypes::encode(self)
    }
}

/// Decode a part of a known kind
pub fn decode(kind: PartKind, path: &str, bytes: &[u8]) -> XlsxResult<TypedPart> {
    Ok(match kind {
        PartKind::ContentTypes => TypedPart::ContentTypes(ContentTypes::decode_bytes(path, bytes)?),
        PartKind::Relationships => TypedPart::Relationships {
            source: rels::source_for_rels(path).unwrap_or_default(),
            rels: rels::decode_rels(path, bytes)?,
        },
        PartKind::Workbook => TypedPart::Workbook(WorkbookPart::decode_bytes(path, bytes)?),
        PartKind::Worksheet => TypedPart::Worksheet(WorksheetPart::decode_bytes(path, bytes)?),
        PartKind::SharedStrings => {
            TypedPart::SharedStrings(SharedStringsPart::decode_bytes(path, bytes)?)
        }
        PartKind::Styles => TypedPart::Styles(StylesPart::decode_bytes(path, bytes)?),
        PartKind::CoreProperties => {
            TypedPart::CoreProperties(CorePropertiesPart::decode_bytes(path, bytes)?)
        }
    })
}

/// Encode a decoded part
pub fn encode(part: &TypedPart) -> Vec<u8> {
    match part {
        TypedPart::ContentTypes(p) => PartCodec::encode(p),
        TypedPart::Relationships { source, rels } => rels::encode_rels(source, rels),
        TypedPart::Workbook(p) => p.encode(),
        TypedPart::Worksheet(p) => p.encode(),
        TypedPart::SharedStrings(p) => p.encode(),
        TypedPart::Styles(p) => p.encode(),
        TypedPart::CoreProperties(p) => p.encode(),
    }
}
