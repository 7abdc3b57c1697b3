//! Cooperative cancellation for the capture loop.
//!
//! A [`CancelToken`] is a shared boolean flag. The frame reader polls it
//! after every bounded read attempt, so cancellation latency is bounded by
//! the read timeout rather than being instantaneous.
//!
//! # Example
//!
//! ```
//! use pcd_capture::CancelToken;
//!
//! let token = CancelToken::new();
//! let handle = token.clone();
//!
//! assert!(!token.is_cancelled());
//! handle.cancel();
//! assert!(token.is_cancelled());
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;

/// Shared cancellation flag.
///
/// Cloning is cheap; all clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a new, un-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Cancel this token when the process receives Ctrl+C.
    ///
    /// The returned task completes after the first interrupt. Callers that
    /// want a second interrupt to behave differently should wait on the
    /// handle and install their own follow-up.
    pub fn cancel_on_ctrl_c(&self) -> JoinHandle<()> {
        let token = self.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Interrupt received, stopping capture");
                    token.cancel();
                }
                Err(e) => tracing::error!("Failed to listen for Ctrl+C: {}", e),
            }
        })
    }
}
