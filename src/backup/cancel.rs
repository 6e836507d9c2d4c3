//! Cooperative cancellation for long-running backup I/O

#[cfg(test)]
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{InvoicerError, InvoicerResult};

/// Shared flag checked between archive entries
///
/// Clones observe the same flag, so a scheduler can hand one clone to its
/// worker and cancel it from `stop()`.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    #[cfg(test)]
    trip_after: Option<Arc<AtomicUsize>>,
}

impl CancelToken {
    /// Create a token that has not been cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that passes `checks` checks and cancels itself on the next one
    #[cfg(test)]
    pub(crate) fn tripping_after(checks: usize) -> Self {
        Self {
            cancelled: Arc::default(),
            trip_after: Some(Arc::new(AtomicUsize::new(checks))),
        }
    }

    #[cfg(test)]
    fn count_check(&self) {
        if let Some(remaining) = &self.trip_after {
            if remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_err()
            {
                self.cancel();
            }
        }
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Return `Cancelled` if cancellation was requested
    pub fn check(&self, during: &str) -> InvoicerResult<()> {
        #[cfg(test)]
        self.count_check();

        if self.is_cancelled() {
            Err(InvoicerError::Cancelled(during.to_string()))
        } else {
            Ok(())
        }
    }
}
