//! String arguments and results

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};

use crate::error::{fail, CELLAR_ERR_INVALID_ARGUMENT, CELLAR_ERR_INVALID_UTF8, CELLAR_ERR_NULL_PTR};

/// Borrow a C string argument as UTF-8
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that outlives `'a`.
pub(crate) unsafe fn str_arg<'a>(ptr: *const c_char, what: &str) -> Result<&'a str, c_int> {
    if ptr.is_null() {
        return Err(fail(CELLAR_ERR_NULL_PTR, format!("{} is null", what)));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| fail(CELLAR_ERR_INVALID_UTF8, format!("{} is not valid UTF-8", what)))
}

/// Hand a string to the caller, who frees it with `cellar_string_free`
pub(crate) fn string_out(value: String, out: *mut *mut c_char) -> Result<(), c_int> {
    if out.is_null() {
        return Err(fail(CELLAR_ERR_NULL_PTR, "output pointer is null"));
    }
    let value = CString::new(value)
        .map_err(|_| fail(CELLAR_ERR_INVALID_ARGUMENT, "string contains a NUL byte"))?;
    unsafe {
        *out = value.into_raw();
    }
    Ok(())
}

/// Free a string returned by this library
#[no_mangle]
pub extern "C" fn cellar_string_free(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }
    unsafe {
        drop(CString::from_raw(ptr));
    }
}
