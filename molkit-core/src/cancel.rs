//! Cooperative cancellation for long-running parse and fingerprint calls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::{MolkitError, Result};

/// A shared flag polled by cancellable operations.
///
/// Clones share the same flag, so a token handed to a worker can be
/// cancelled from any other thread holding a clone.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Return [`MolkitError::Cancelled`] once the token has fired.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(MolkitError::Cancelled)
        } else {
            Ok(())
        }
    }
}
