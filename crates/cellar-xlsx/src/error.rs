//! XLSX error types

use thiserror::Error;

/// Result type for XLSX operations
pub type XlsxResult<T> = std::result::Result<T, XlsxError>;

/// Errors raised while reading, editing or writing a package
#[derive(Debug, Error)]
pub enum XlsxError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The container is not a readable zip archive
    #[error("Corrupt container: {0}")]
    CorruptContainer(String),

    /// A required part or relationship is missing
    #[error("Invalid package: {0}")]
    InvalidPackage(String),

    /// A part could not be parsed
    #[error("Invalid part {part} at <{element}>: {message}")]
    InvalidPart {
        part: String,
        element: String,
        message: String,
    },

    /// A relationship id does not resolve
    #[error("Dangling relationship {id} in {source_part}")]
    DanglingRelationship { source_part: String, id: String },

    /// Encrypted, binary, legacy or strict-namespace packages
    #[error("Unsupported format: {0}")]
    UnsupportedFormatVersion(String),

    /// Stream writer rows must be strictly increasing
    #[error("Row {row} written after row {last}")]
    OutOfOrderRow { row: u32, last: u32 },

    /// The package was closed
    #[error("Package is closed")]
    UseAfterClose,

    /// A single part decompresses past the configured limit
    #[error("Part {part} exceeds the size limit of {limit} bytes")]
    PartTooLarge { part: String, limit: u64 },

    /// The declared uncompressed size of the package exceeds the limit
    #[error("Package declares {size} uncompressed bytes (limit: {limit})")]
    PackageTooLarge { size: u64, limit: u64 },

    /// A caller-supplied argument is malformed
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Cancelled through a cancellation token
    #[error("Operation cancelled")]
    Cancelled,

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] cellar_core::Error),
}

impl XlsxError {
    pub(crate) fn invalid_part(
        part: impl Into<String>,
        element: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        XlsxError::InvalidPart {
            part: part.into(),
            element: element.into(),
            message: message.into(),
        }
    }

    /// Wrap a quick-xml error with the part it happened in
    pub(crate) fn xml(part: &str, err: quick_xml::Error) -> Self {
        XlsxError::invalid_part(part, "xml", err.to_string())
    }

    pub(crate) fn dangling(source_part: impl Into<String>, id: impl Into<String>) -> Self {
        XlsxError::DanglingRelationship {
            source_part: source_part.into(),
            id: id.into(),
        }
    }
}

impl From<zip::result::ZipError> for XlsxError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => XlsxError::Io(e),
            other => XlsxError::CorruptContainer(other.to_string()),
        }
    }
}
