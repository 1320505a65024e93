//! FFI error codes and the last-error message

use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::{c_char, c_int};

use cellar::ErrorKind;

// Success
pub const CELLAR_OK: c_int = 0;

// Call errors
pub const CELLAR_ERR_NULL_PTR: c_int = -1;
pub const CELLAR_ERR_INVALID_HANDLE: c_int = -2;
pub const CELLAR_ERR_INTERNAL: c_int = -3;
pub const CELLAR_ERR_INVALID_UTF8: c_int = -4;

// I/O errors
pub const CELLAR_ERR_IO: c_int = -10;
pub const CELLAR_ERR_CANCELLED: c_int = -11;

// Package errors
pub const CELLAR_ERR_CORRUPT_CONTAINER: c_int = -20;
pub const CELLAR_ERR_INVALID_PACKAGE: c_int = -21;
pub const CELLAR_ERR_INVALID_PART: c_int = -22;
pub const CELLAR_ERR_DANGLING_RELATIONSHIP: c_int = -23;
pub const CELLAR_ERR_UNSUPPORTED: c_int = -24;
pub const CELLAR_ERR_LIMIT_EXCEEDED: c_int = -25;

// Sheet errors
pub const CELLAR_ERR_DUPLICATE_SHEET_NAME: c_int = -30;
pub const CELLAR_ERR_INVALID_SHEET_NAME: c_int = -31;
pub const CELLAR_ERR_SHEET_NOT_FOUND: c_int = -32;
pub const CELLAR_ERR_OUT_OF_ORDER_ROW: c_int = -33;
pub const CELLAR_ERR_CONFLICTING_ACCESS_MODE: c_int = -34;
pub const CELLAR_ERR_USE_AFTER_CLOSE: c_int = -35;

// Data errors
pub const CELLAR_ERR_OUT_OF_BOUNDS: c_int = -40;
pub const CELLAR_ERR_INVALID_ARGUMENT: c_int = -41;
pub const CELLAR_ERR_TYPE_MISMATCH: c_int = -42;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Remember a message for `cellar_last_error` on this thread
pub(crate) fn set_last_error(message: impl Into<String>) {
    let message = CString::new(message.into().replace('\0', " ")).ok();
    LAST_ERROR.with(|slot| *slot.borrow_mut() = message);
}

pub(crate) fn clear_last_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

/// Record an error and return its code
pub(crate) fn fail(code: c_int, message: impl Into<String>) -> c_int {
    set_last_error(message);
    code
}

pub(crate) fn report(err: cellar::Error) -> c_int {
    fail(code_for(err.kind()), err.to_string())
}

pub(crate) fn code_for(kind: ErrorKind) -> c_int {
    match kind {
        ErrorKind::CorruptContainer => CELLAR_ERR_CORRUPT_CONTAINER,
        ErrorKind::InvalidPackage => CELLAR_ERR_INVALID_PACKAGE,
        ErrorKind::InvalidPart => CELLAR_ERR_INVALID_PART,
        ErrorKind::DanglingRelationship => CELLAR_ERR_DANGLING_RELATIONSHIP,
        ErrorKind::UnsupportedFormatVersion => CELLAR_ERR_UNSUPPORTED,
        ErrorKind::DuplicateSheetName => CELLAR_ERR_DUPLICATE_SHEET_NAME,
        ErrorKind::InvalidSheetName => CELLAR_ERR_INVALID_SHEET_NAME,
        ErrorKind::SheetNotFound => CELLAR_ERR_SHEET_NOT_FOUND,
        ErrorKind::OutOfOrderRow => CELLAR_ERR_OUT_OF_ORDER_ROW,
        ErrorKind::ConflictingAccessMode => CELLAR_ERR_CONFLICTING_ACCESS_MODE,
        ErrorKind::UseAfterClose => CELLAR_ERR_USE_AFTER_CLOSE,
        ErrorKind::OutOfBounds => CELLAR_ERR_OUT_OF_BOUNDS,
        ErrorKind::InvalidArgument => CELLAR_ERR_INVALID_ARGUMENT,
        ErrorKind::LimitExceeded => CELLAR_ERR_LIMIT_EXCEEDED,
        ErrorKind::Cancelled => CELLAR_ERR_CANCELLED,
        ErrorKind::Io => CELLAR_ERR_IO,
        _ => CELLAR_ERR_INTERNAL,
    }
}

/// Map a facade result to a status code
pub(crate) fn status(result: cellar::Result<()>) -> c_int {
    match result {
        Ok(()) => {
            clear_last_error();
            CELLAR_OK
        }
        Err(err) => report(err),
    }
}

/// Get a static description of an error code
#[no_mangle]
pub extern "C" fn cellar_error_message(code: c_int) -> *const c_char {
    let msg: &'static [u8] = match code {
        CELLAR_OK => b"Success\0",
        CELLAR_ERR_NULL_PTR => b"Null pointer argument\0",
        CELLAR_ERR_INVALID_HANDLE => b"Invalid handle\0",
        CELLAR_ERR_INTERNAL => b"Internal error\0",
        CELLAR_ERR_INVALID_UTF8 => b"String is not valid UTF-8\0",
        CELLAR_ERR_IO => b"I/O error\0",
        CELLAR_ERR_CANCELLED => b"Cancelled\0",
        CELLAR_ERR_CORRUPT_CONTAINER => b"Not a readable zip archive\0",
        CELLAR_ERR_INVALID_PACKAGE => b"Invalid package structure\0",
        CELLAR_ERR_INVALID_PART => b"Invalid part content\0",
        CELLAR_ERR_DANGLING_RELATIONSHIP => b"Dangling relationship\0",
        CELLAR_ERR_UNSUPPORTED => b"Unsupported format\0",
        CELLAR_ERR_LIMIT_EXCEEDED => b"Size limit exceeded\0",
        CELLAR_ERR_DUPLICATE_SHEET_NAME => b"Duplicate sheet name\0",
        CELLAR_ERR_INVALID_SHEET_NAME => b"Invalid sheet name\0",
        CELLAR_ERR_SHEET_NOT_FOUND => b"Sheet not found\0",
        CELLAR_ERR_OUT_OF_ORDER_ROW => b"Row written out of order\0",
        CELLAR_ERR_CONFLICTING_ACCESS_MODE => b"Sheet is in another access mode\0",
        CELLAR_ERR_USE_AFTER_CLOSE => b"Spreadsheet is closed\0",
        CELLAR_ERR_OUT_OF_BOUNDS => b"Index out of bounds\0",
        CELLAR_ERR_INVALID_ARGUMENT => b"Invalid argument\0",
        CELLAR_ERR_TYPE_MISMATCH => b"Cell holds another type\0",
        _ => b"Unknown error\0",
    };

    msg.as_ptr() as *const c_char
}

/// Message of the last failed call on this thread, or null
///
/// The pointer stays valid until the next failing call on the same thread.
#[no_mangle]
pub extern "C" fn cellar_last_error() -> *const c_char {
    LAST_ERROR.with(|slot| {
        slot.borrow()
            .as_ref()
            .map_or(std::ptr::null(), |msg| msg.as_ptr())
    })
}
