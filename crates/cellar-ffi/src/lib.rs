//! # cellar-ffi
//!
//! C FFI bindings for cellar.
//!
//! Every function returns `CELLAR_OK` (0) or a negative error code; the
//! message for the last failure on the calling thread is available from
//! `cellar_last_error`. Spreadsheets are referred to by opaque handles, and
//! strings returned through out-pointers are freed with `cellar_string_free`.

/// Unwrap a `Result<T, c_int>`, returning the code on failure
macro_rules! try_ffi {
    ($e:expr) => {
        match $e {
            Ok(value) => value,
            Err(code) => return code,
        }
    };
}

mod cell;
mod error;
mod handles;
mod strings;
mod workbook;

pub use cell::*;
pub use error::*;
pub use handles::{Handle, HANDLE_NULL};
pub use strings::cellar_string_free;
pub use workbook::*;
