//! Error types for cellar-core

use thiserror::Error;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the workbook model
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid cell address format
    #[error("Invalid cell address: {0}")]
    InvalidAddress(String),

    /// Invalid cell range format
    #[error("Invalid cell range: {0}")]
    InvalidRange(String),

    /// Row number out of bounds (1-based)
    #[error("Row {0} out of bounds (max: {1})")]
    RowOutOfBounds(u32, u32),

    /// Column number out of bounds (1-based)
    #[error("Column {0} out of bounds (max: {1})")]
    ColumnOutOfBounds(u32, u32),

    /// Sheet index out of bounds
    #[error("Sheet index {0} out of bounds (count: {1})")]
    SheetOutOfBounds(usize, usize),

    /// Sheet not found by name
    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    /// Invalid sheet name
    #[error("Invalid sheet name: {0}")]
    InvalidSheetName(String),

    /// Duplicate sheet name
    #[error("Sheet name already exists: {0}")]
    DuplicateSheetName(String),

    /// The only remaining sheet cannot be removed
    #[error("Cannot remove the only sheet: {0}")]
    LastSheet(String),

    /// Invalid defined name
    #[error("Invalid defined name: {0}")]
    InvalidName(String),

    /// Defined name not found
    #[error("Defined name not found: {0}")]
    NameNotFound(String),

    /// Invalid style index
    #[error("Invalid style index: {0}")]
    InvalidStyleIndex(u32),

    /// Shared string index does not exist in the table
    #[error("Shared string index {0} out of range (count: {1})")]
    SharedStringOutOfRange(u32, usize),

    /// Text exceeds the per-cell character limit
    #[error("Cell text has {0} characters (max: {max})", max = crate::MAX_CELL_TEXT_LEN)]
    CellTextTooLong(usize),

    /// Value cannot be stored in a cell
    #[error("Invalid cell value: {0}")]
    InvalidValue(String),

    /// Buffered and streaming access were mixed on one sheet
    #[error("Sheet '{sheet}' is {mode}; {operation} is not allowed")]
    ConflictingAccessMode {
        sheet: String,
        mode: &'static str,
        operation: &'static str,
    },

    /// Date or serial number outside the representable range
    #[error("Date out of range: {0}")]
    DateOutOfRange(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a new "other" error with a message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Error::Other(msg.into())
    }
}
