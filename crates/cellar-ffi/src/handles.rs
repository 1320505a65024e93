//! Handle management for FFI

use cellar::Spreadsheet;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::os::raw::c_int;
use std::sync::Mutex;

use crate::error::{fail, CELLAR_ERR_INTERNAL, CELLAR_ERR_INVALID_HANDLE};

/// Opaque handle type
pub type Handle = u64;

/// Null handle constant
pub const HANDLE_NULL: Handle = 0;

/// Registry of the spreadsheets handed out to C callers
pub struct FfiContext {
    spreadsheets: HashMap<Handle, Spreadsheet>,
    next_handle: Handle,
}

impl FfiContext {
    fn new() -> Self {
        Self {
            spreadsheets: HashMap::new(),
            next_handle: 1, // Start at 1, 0 is null
        }
    }

    pub fn insert(&mut self, book: Spreadsheet) -> Handle {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.spreadsheets.insert(handle, book);
        handle
    }

    /// A shared reference to the spreadsheet behind a handle
    ///
    /// Clones share the document, so the registry lock is not held while
    /// the caller works with it.
    pub fn get(&self, handle: Handle) -> Option<Spreadsheet> {
        self.spreadsheets.get(&handle).cloned()
    }

    pub fn remove(&mut self, handle: Handle) -> Option<Spreadsheet> {
        self.spreadsheets.remove(&handle)
    }
}

lazy_static! {
    pub static ref CONTEXT: Mutex<FfiContext> = Mutex::new(FfiContext::new());
}

/// Helper macro for FFI functions
#[macro_export]
macro_rules! with_context {
    (|$ctx:ident| $body:expr) => {
        match $crate::handles::CONTEXT.lock() {
            Ok($ctx) => $body,
            Err(_) => $crate::error::CELLAR_ERR_INTERNAL,
        }
    };
    (|mut $ctx:ident| $body:expr) => {
        match $crate::handles::CONTEXT.lock() {
            Ok(mut $ctx) => $body,
            Err(_) => $crate::error::CELLAR_ERR_INTERNAL,
        }
    };
}

/// Look up a handle, recording the failure for `cellar_last_error`
pub(crate) fn lookup(handle: Handle) -> Result<Spreadsheet, c_int> {
    let ctx = CONTEXT
        .lock()
        .map_err(|_| fail(CELLAR_ERR_INTERNAL, "handle registry poisoned"))?;
    ctx.get(handle)
        .ok_or_else(|| fail(CELLAR_ERR_INVALID_HANDLE, format!("no spreadsheet with handle {}", handle)))
}
