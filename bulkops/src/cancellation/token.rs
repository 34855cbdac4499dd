//! Cancellation token for cooperative cancellation.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

use crate::errors::BulkOpError;

/// A token for cooperative cancellation of a bulk run.
///
/// Services consult it before every step; a step that is already running
/// finishes. Cancellation is idempotent and the first reason is kept.
#[derive(Default)]
pub struct CancellationToken {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation with a reason.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let reason = reason.into();
            info!(reason = %reason, "Cancellation requested");
            *self.reason.write() = Some(reason);
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }

    /// Fails with [`BulkOpError::Cancelled`] once cancellation was requested.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` carrying the first reason.
    pub fn check(&self) -> Result<(), BulkOpError> {
        if self.is_cancelled() {
            return Err(BulkOpError::Cancelled(
                self.reason().unwrap_or_else(|| "cancelled".to_string()),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_token_default_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
        assert!(token.check().is_ok());
    }

    #[test]
    fn test_token_cancel_idempotent() {
        let token = CancellationToken::new();
        token.cancel("Operator stopped the job");
        token.cancel("Second reason");

        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some("Operator stopped the job".to_string()));
    }

    #[test]
    fn test_check_reports_reason() {
        let token = CancellationToken::new();
        token.cancel("shutdown");

        match token.check() {
            Err(BulkOpError::Cancelled(reason)) => assert_eq!(reason, "shutdown"),
            other => panic!("expected cancellation, got {other:?}"),
        }
    }

    #[test]
    fn test_shared_across_threads() {
        let token = Arc::new(CancellationToken::new());
        let remote = Arc::clone(&token);

        std::thread::spawn(move || remote.cancel("from another thread"))
            .join()
            .unwrap();

        assert!(token.is_cancelled());
    }
}
