//! Cooperative cancellation for scans.
//!
//! Every scan owns a [`CancelToken`]. The token wraps an `AtomicBool` that is
//! shared by reference with the collector, the hashing workers and the
//! duplicate finder, each of which polls it at well-defined points. Nothing
//! is interrupted pre-emptively: an in-flight image decode or comparison pass
//! always runs to completion before the flag is observed.
//!
//! # Usage
//!
//! ```rust,no_run
//! use imgdupe::signal::{install_handler, CancelToken};
//!
//! let token = CancelToken::new();
//! install_handler(&token).expect("Failed to install signal handler");
//!
//! // Pass `&token` (or a clone) into the scan; Ctrl+C now cancels it.
//! if token.is_cancelled() {
//!     println!("Scan cancelled");
//! }
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag for one scan invocation.
///
/// Clones share the same flag. Create a fresh token per scan; tokens are
/// never reset, so a cancelled token stays cancelled.
#[derive(Debug, Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a new token with no cancellation requested.
    #[must_use]
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Request cancellation.
    ///
    /// Workers observe the request at their next polling point.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Get the underlying flag, for APIs that take a bare `Arc<AtomicBool>`.
    #[must_use]
    pub fn get_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Error type for signal handler installation.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Failed to install the Ctrl+C handler.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

/// Install a Ctrl+C handler that cancels the given token.
///
/// `ctrlc` allows a single handler per process, so this is meant to be
/// called once by the binary for the scan it is about to run.
///
/// # Errors
///
/// Returns [`SignalError::InstallFailed`] if a handler is already registered
/// or the platform hook could not be installed.
pub fn install_handler(token: &CancelToken) -> Result<(), SignalError> {
    let flag = token.get_flag();

    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);

        // stderr is line-buffered, flush explicitly
        let _ = writeln!(std::io::stderr(), "\nInterrupted. Finishing current file...");
        let _ = std::io::stderr().flush();

        log::info!("Cancellation requested by signal");
    })?;

    Ok(())
}
