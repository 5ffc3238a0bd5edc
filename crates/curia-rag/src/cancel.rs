use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use curia_core::{Error, Result};

/// Shared cancellation flag, checked between model calls.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Error::Cancelled` naming `what` once cancelled.
    pub fn check(&self, what: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled(what.to_string()));
        }
        Ok(())
    }
}
