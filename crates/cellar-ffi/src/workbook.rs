//! Spreadsheet lifecycle and sheet FFI functions

use std::os::raw::{c_char, c_int};

use cellar::Spreadsheet;

use crate::error::*;
use crate::handles::{lookup, Handle, CONTEXT};
use crate::strings::{str_arg, string_out};
use crate::with_context;

fn register(book: Spreadsheet, out_handle: *mut Handle) -> c_int {
    with_context!(|mut ctx| {
        let handle = ctx.insert(book);
        unsafe {
            *out_handle = handle;
        }
        clear_last_error();
        CELLAR_OK
    })
}

/// Create a new spreadsheet with one empty sheet
#[no_mangle]
pub extern "C" fn cellar_new(out_handle: *mut Handle) -> c_int {
    if out_handle.is_null() {
        return fail(CELLAR_ERR_NULL_PTR, "out_handle is null");
    }
    register(Spreadsheet::new(), out_handle)
}

/// Open an xlsx file
#[no_mangle]
pub extern "C" fn cellar_open(path: *const c_char, out_handle: *mut Handle) -> c_int {
    if out_handle.is_null() {
        return fail(CELLAR_ERR_NULL_PTR, "out_handle is null");
    }
    let path = try_ffi!(unsafe { str_arg(path, "path") });
    match Spreadsheet::open(path) {
        Ok(book) => register(book, out_handle),
        Err(err) => report(err),
    }
}

/// Close a spreadsheet and release its handle
#[no_mangle]
pub extern "C" fn cellar_close(handle: Handle) -> c_int {
    let removed = match CONTEXT.lock() {
        Ok(mut ctx) => ctx.remove(handle),
        Err(_) => return fail(CELLAR_ERR_INTERNAL, "handle registry poisoned"),
    };
    let book = match removed {
        Some(book) => book,
        None => {
            return fail(
                CELLAR_ERR_INVALID_HANDLE,
                format!("no spreadsheet with handle {}", handle),
            )
        }
    };
    status(book.close())
}

/// Save to the file the spreadsheet was opened from
#[no_mangle]
pub extern "C" fn cellar_save(handle: Handle) -> c_int {
    let book = try_ffi!(lookup(handle));
    status(book.save())
}

/// Save to a path; the extension picks the flavor
#[no_mangle]
pub extern "C" fn cellar_save_as(handle: Handle, path: *const c_char) -> c_int {
    let path = try_ffi!(unsafe { str_arg(path, "path") });
    let book = try_ffi!(lookup(handle));
    status(book.save_as(path))
}

/// Get the number of sheets
#[no_mangle]
pub extern "C" fn cellar_sheet_count(handle: Handle, out_count: *mut c_int) -> c_int {
    if out_count.is_null() {
        return fail(CELLAR_ERR_NULL_PTR, "out_count is null");
    }
    let book = try_ffi!(lookup(handle));
    match book.sheet_list() {
        Ok(names) => {
            unsafe {
                *out_count = names.len() as c_int;
            }
            clear_last_error();
            CELLAR_OK
        }
        Err(err) => report(err),
    }
}

/// Get the name of the sheet at a 0-based position
#[no_mangle]
pub extern "C" fn cellar_sheet_name(handle: Handle, index: c_int, out_name: *mut *mut c_char) -> c_int {
    let book = try_ffi!(lookup(handle));
    let names = match book.sheet_list() {
        Ok(names) => names,
        Err(err) => return report(err),
    };
    let name = match usize::try_from(index).ok().and_then(|i| names.get(i)) {
        Some(name) => name.clone(),
        None => {
            return fail(
                CELLAR_ERR_OUT_OF_BOUNDS,
                format!("sheet {} of {}", index, names.len()),
            )
        }
    };
    try_ffi!(string_out(name, out_name));
    clear_last_error();
    CELLAR_OK
}

/// Append a sheet; its 0-based position goes to `out_index` when not null
#[no_mangle]
pub extern "C" fn cellar_add_sheet(handle: Handle, name: *const c_char, out_index: *mut c_int) -> c_int {
    let name = try_ffi!(unsafe { str_arg(name, "name") });
    let book = try_ffi!(lookup(handle));
    match book.add_sheet(name) {
        Ok(index) => {
            if !out_index.is_null() {
                unsafe {
                    *out_index = index as c_int;
                }
            }
            clear_last_error();
            CELLAR_OK
        }
        Err(err) => report(err),
    }
}

#[no_mangle]
pub extern "C" fn cellar_remove_sheet(handle: Handle, name: *const c_char) -> c_int {
    let name = try_ffi!(unsafe { str_arg(name, "name") });
    let book = try_ffi!(lookup(handle));
    status(book.remove_sheet(name))
}
