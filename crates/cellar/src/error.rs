//! Caller-facing errors

use cellar_xlsx::XlsxError;
use thiserror::Error;

/// Broad category of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The file is not a readable zip archive
    CorruptContainer,
    /// Required parts or relationships are missing
    InvalidPackage,
    /// A part's XML does not match its schema
    InvalidPart,
    /// A relationship id or target does not resolve
    DanglingRelationship,
    /// Binary, strict, encrypted or otherwise unsupported formats and extensions
    UnsupportedFormatVersion,
    DuplicateSheetName,
    InvalidSheetName,
    SheetNotFound,
    /// A stream writer row at or before the previous one
    OutOfOrderRow,
    /// Buffered and streaming access mixed on one sheet
    ConflictingAccessMode,
    /// The spreadsheet was closed
    UseAfterClose,
    /// A row, column, sheet or style index outside its range
    OutOfBounds,
    /// A malformed address, range, name or value
    InvalidArgument,
    /// A size limit was exceeded
    LimitExceeded,
    Cancelled,
    Io,
    Internal,
}

/// Errors returned by [`Spreadsheet`](crate::Spreadsheet)
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Xlsx(#[from] XlsxError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Lock poisoning and other broken internal state
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for facade operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<cellar_core::Error> for Error {
    fn from(err: cellar_core::Error) -> Self {
        Error::Xlsx(XlsxError::Core(err))
    }
}

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Xlsx(err) => xlsx_kind(err),
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }
}

fn xlsx_kind(err: &XlsxError) -> ErrorKind {
    match err {
        XlsxError::Io(_) => ErrorKind::Io,
        XlsxError::CorruptContainer(_) => ErrorKind::CorruptContainer,
        XlsxError::InvalidPackage(_) => ErrorKind::InvalidPackage,
        XlsxError::InvalidPart { .. } => ErrorKind::InvalidPart,
        XlsxError::DanglingRelationship { .. } => ErrorKind::DanglingRelationship,
        XlsxError::UnsupportedFormatVersion(_) => ErrorKind::UnsupportedFormatVersion,
        XlsxError::OutOfOrderRow { .. } => ErrorKind::OutOfOrderRow,
        XlsxError::UseAfterClose => ErrorKind::UseAfterClose,
        XlsxError::PartTooLarge { .. } | XlsxError::PackageTooLarge { .. } => {
            ErrorKind::LimitExceeded
        }
        XlsxError::InvalidArgument(_) => ErrorKind::InvalidArgument,
        XlsxError::Cancelled => ErrorKind::Cancelled,
        XlsxError::Core(err) => core_kind(err),
    }
}

fn core_kind(err: &cellar_core::Error) -> ErrorKind {
    use cellar_core::Error as E;
    match err {
        E::RowOutOfBounds(..)
        | E::ColumnOutOfBounds(..)
        | E::SheetOutOfBounds(..)
        | E::InvalidStyleIndex(_)
        | E::SharedStringOutOfRange(..)
        | E::DateOutOfRange(_) => ErrorKind::OutOfBounds,
        E::SheetNotFound(_) => ErrorKind::SheetNotFound,
        E::InvalidSheetName(_) | E::LastSheet(_) => ErrorKind::InvalidSheetName,
        E::DuplicateSheetName(_) => ErrorKind::DuplicateSheetName,
        E::ConflictingAccessMode { .. } => ErrorKind::ConflictingAccessMode,
        E::CellTextTooLong(_) => ErrorKind::LimitExceeded,
        E::InvalidAddress(_)
        | E::InvalidRange(_)
        | E::InvalidName(_)
        | E::NameNotFound(_)
        | E::InvalidValue(_) => ErrorKind::InvalidArgument,
        E::Other(_) => ErrorKind::Internal,
    }
}
