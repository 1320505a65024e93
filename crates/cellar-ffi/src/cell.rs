//! Cell FFI functions

use std::os::raw::{c_char, c_int};

use cellar::{CellValue, Color, Style};

use crate::error::*;
use crate::handles::{lookup, Handle};
use crate::strings::{str_arg, string_out};

/// Cell type tags returned by `cellar_get_cell_type`
pub const CELLAR_CELL_EMPTY: c_int = 0;
pub const CELLAR_CELL_NUMBER: c_int = 1;
pub const CELLAR_CELL_STRING: c_int = 2;
pub const CELLAR_CELL_BOOL: c_int = 3;
pub const CELLAR_CELL_ERROR: c_int = 4;

fn cell_value(handle: Handle, sheet: *const c_char, cell: *const c_char) -> Result<CellValue, c_int> {
    let sheet = unsafe { str_arg(sheet, "sheet") }?;
    let cell = unsafe { str_arg(cell, "cell") }?;
    lookup(handle)?.cell_value(sheet, cell).map_err(report)
}

fn set_value(handle: Handle, sheet: *const c_char, cell: *const c_char, value: CellValue) -> c_int {
    let sheet = try_ffi!(unsafe { str_arg(sheet, "sheet") });
    let cell = try_ffi!(unsafe { str_arg(cell, "cell") });
    let book = try_ffi!(lookup(handle));
    status(book.set_cell_value(sheet, cell, value))
}

fn mismatch(value: &CellValue, wanted: &str) -> c_int {
    fail(
        CELLAR_ERR_TYPE_MISMATCH,
        format!("cell holds {}, not {}", value.type_name(), wanted),
    )
}

/// Get the type of a cell's value (formula cells report their cached result)
#[no_mangle]
pub extern "C" fn cellar_get_cell_type(
    handle: Handle,
    sheet: *const c_char,
    cell: *const c_char,
    out_type: *mut c_int,
) -> c_int {
    if out_type.is_null() {
        return fail(CELLAR_ERR_NULL_PTR, "out_type is null");
    }
    let tag = match try_ffi!(cell_value(handle, sheet, cell)) {
        CellValue::Number(_) => CELLAR_CELL_NUMBER,
        CellValue::String(_) => CELLAR_CELL_STRING,
        CellValue::Boolean(_) => CELLAR_CELL_BOOL,
        CellValue::Error(_) => CELLAR_CELL_ERROR,
        _ => CELLAR_CELL_EMPTY,
    };
    unsafe {
        *out_type = tag;
    }
    clear_last_error();
    CELLAR_OK
}

/// Get a cell's value as text; numbers and booleans are formatted
#[no_mangle]
pub extern "C" fn cellar_get_cell_string(
    handle: Handle,
    sheet: *const c_char,
    cell: *const c_char,
    out_value: *mut *mut c_char,
) -> c_int {
    let text = match try_ffi!(cell_value(handle, sheet, cell)) {
        CellValue::Empty => String::new(),
        CellValue::String(s) => s,
        CellValue::Number(n) => n.to_string(),
        CellValue::Boolean(b) => if b { "TRUE" } else { "FALSE" }.to_string(),
        CellValue::Error(e) => e.as_str().to_string(),
        other => return mismatch(&other, "text"),
    };
    try_ffi!(string_out(text, out_value));
    clear_last_error();
    CELLAR_OK
}

#[no_mangle]
pub extern "C" fn cellar_get_cell_number(
    handle: Handle,
    sheet: *const c_char,
    cell: *const c_char,
    out_value: *mut f64,
) -> c_int {
    if out_value.is_null() {
        return fail(CELLAR_ERR_NULL_PTR, "out_value is null");
    }
    match try_ffi!(cell_value(handle, sheet, cell)) {
        CellValue::Number(n) => {
            unsafe {
                *out_value = n;
            }
            clear_last_error();
            CELLAR_OK
        }
        other => mismatch(&other, "a number"),
    }
}

#[no_mangle]
pub extern "C" fn cellar_get_cell_bool(
    handle: Handle,
    sheet: *const c_char,
    cell: *const c_char,
    out_value: *mut c_int,
) -> c_int {
    if out_value.is_null() {
        return fail(CELLAR_ERR_NULL_PTR, "out_value is null");
    }
    match try_ffi!(cell_value(handle, sheet, cell)) {
        CellValue::Boolean(b) => {
            unsafe {
                *out_value = b as c_int;
            }
            clear_last_error();
            CELLAR_OK
        }
        other => mismatch(&other, "a boolean"),
    }
}

/// Get a cell's formula without the leading `=`; an empty string if none
#[no_mangle]
pub extern "C" fn cellar_get_cell_formula(
    handle: Handle,
    sheet: *const c_char,
    cell: *const c_char,
    out_formula: *mut *mut c_char,
) -> c_int {
    let sheet = try_ffi!(unsafe { str_arg(sheet, "sheet") });
    let cell = try_ffi!(unsafe { str_arg(cell, "cell") });
    let book = try_ffi!(lookup(handle));
    let formula = match book.cell_formula(sheet, cell) {
        Ok(formula) => formula.unwrap_or_default(),
        Err(err) => return report(err),
    };
    try_ffi!(string_out(formula, out_formula));
    clear_last_error();
    CELLAR_OK
}

#[no_mangle]
pub extern "C" fn cellar_set_cell_string(
    handle: Handle,
    sheet: *const c_char,
    cell: *const c_char,
    value: *const c_char,
) -> c_int {
    let value = try_ffi!(unsafe { str_arg(value, "value") });
    set_value(handle, sheet, cell, CellValue::from(value))
}

#[no_mangle]
pub extern "C" fn cellar_set_cell_number(
    handle: Handle,
    sheet: *const c_char,
    cell: *const c_char,
    value: f64,
) -> c_int {
    set_value(handle, sheet, cell, CellValue::Number(value))
}

#[no_mangle]
pub extern "C" fn cellar_set_cell_bool(
    handle: Handle,
    sheet: *const c_char,
    cell: *const c_char,
    value: c_int,
) -> c_int {
    set_value(handle, sheet, cell, CellValue::Boolean(value != 0))
}

/// Set a formula; the cached result is cleared
#[no_mangle]
pub extern "C" fn cellar_set_cell_formula(
    handle: Handle,
    sheet: *const c_char,
    cell: *const c_char,
    formula: *const c_char,
) -> c_int {
    let sheet = try_ffi!(unsafe { str_arg(sheet, "sheet") });
    let cell = try_ffi!(unsafe { str_arg(cell, "cell") });
    let formula = try_ffi!(unsafe { str_arg(formula, "formula") });
    let book = try_ffi!(lookup(handle));
    status(book.set_cell_formula(sheet, cell, formula))
}

/// Register a style and return its index
///
/// `fill_rgb` is `0xRRGGBB`, or negative for no fill. `number_format` may
/// be null.
#[no_mangle]
pub extern "C" fn cellar_new_style(
    handle: Handle,
    bold: c_int,
    fill_rgb: i64,
    number_format: *const c_char,
    out_style: *mut u32,
) -> c_int {
    if out_style.is_null() {
        return fail(CELLAR_ERR_NULL_PTR, "out_style is null");
    }
    if fill_rgb > 0xFF_FFFF {
        return fail(CELLAR_ERR_INVALID_ARGUMENT, format!("fill color {:#x} is not RGB", fill_rgb));
    }
    let mut style = Style::new().bold(bold != 0);
    if fill_rgb >= 0 {
        let [_, r, g, b] = (fill_rgb as u32).to_be_bytes();
        style = style.fill_color(Color::rgb(r, g, b));
    }
    if !number_format.is_null() {
        let code = try_ffi!(unsafe { str_arg(number_format, "number_format") });
        style = style.number_format(code);
    }
    let book = try_ffi!(lookup(handle));
    match book.new_style(style) {
        Ok(index) => {
            unsafe {
                *out_style = index;
            }
            clear_last_error();
            CELLAR_OK
        }
        Err(err) => report(err),
    }
}

/// Apply a style index to the range `first:last`
#[no_mangle]
pub extern "C" fn cellar_set_cell_style(
    handle: Handle,
    sheet: *const c_char,
    first: *const c_char,
    last: *const c_char,
    style: u32,
) -> c_int {
    let sheet = try_ffi!(unsafe { str_arg(sheet, "sheet") });
    let first = try_ffi!(unsafe { str_arg(first, "first") });
    let last = try_ffi!(unsafe { str_arg(last, "last") });
    let book = try_ffi!(lookup(handle));
    status(book.set_cell_style(sheet, first, last, style))
}

/// Format 1-based column and row numbers as a cell name such as `B3`
#[no_mangle]
pub extern "C" fn cellar_coordinates_to_cell_name(
    col: u32,
    row: u32,
    absolute: c_int,
    out_name: *mut *mut c_char,
) -> c_int {
    match cellar::coordinates_to_cell_name(col, row, absolute != 0) {
        Ok(name) => {
            try_ffi!(string_out(name, out_name));
            clear_last_error();
            CELLAR_OK
        }
        Err(err) => report(err),
    }
}
