//! Cooperative cancellation for in-flight fits.
//!
//! A [`CancelToken`] is shared between the caller and the worker tasks spawned
//! by a fit (multi-start local optimizations, bootstrap replicates). Tasks
//! check the token at their natural checkpoints and stop early; a cancelled
//! fit publishes no partial result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{FitError, Result};

/// Shared cancellation flag.
///
/// Cloning the token is cheap and all clones observe the same flag, so one
/// clone can be handed to a UI thread while the fit runs elsewhere.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. In-flight tasks stop at their next checkpoint.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Checkpoint: return `Err(FitError::Cancelled)` if cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(FitError::Cancelled)
        } else {
            Ok(())
        }
    }
}
