//! Cooperative cancellation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{XlsxError, XlsxResult};

/// A flag shared between the caller and a long-running save or stream
///
/// Cloning shares the flag. Work checks it between parts and rows and stops
/// with [`XlsxError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Fail with `Cancelled` if the flag is set
    pub fn check(&self) -> XlsxResult<()> {
        if self.is_cancelled() {
            return Err(XlsxError::Cancelled);
        }
        Ok(())
    }
}

/// Check an optional token
pub(crate) fn check(token: Option<&CancellationToken>) -> XlsxResult<()> {
    match token {
        Some(token) => token.check(),
        None => Ok(()),
    }
}
