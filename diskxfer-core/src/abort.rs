//! Cooperative abort signaling (spec.md §5: "user may at any time request
//! abort via a keyboard signal ... handled by the TUI collaborator, which
//! sets a shared flag polled by the sender's outer loop").
//!
//! Mirrors the global-flag-plus-explicit-context split the teacher uses for
//! its own cancellation: a global flag a CLI's signal handler can set
//! without threading a handle through, and an explicit `AbortContext` for
//! callers (tests, in particular) that want an isolated, non-global flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

static INTERRUPT_FLAG: AtomicBool = AtomicBool::new(false);

/// Request abort via the process-global flag (set by a CLI's Ctrl-C
/// handler).
pub fn request_global_abort() {
    INTERRUPT_FLAG.store(true, Ordering::SeqCst);
}

/// Clear the process-global abort flag.
pub fn clear_global_abort() {
    INTERRUPT_FLAG.store(false, Ordering::SeqCst);
}

/// An abort-request source the sender/receiver FSMs poll.
#[derive(Clone)]
pub struct AbortContext {
    checker: Arc<dyn Fn() -> bool + Send + Sync>,
}

impl AbortContext {
    /// Build a context backed by the process-global flag.
    #[must_use]
    pub fn global() -> Self {
        Self {
            checker: Arc::new(|| INTERRUPT_FLAG.load(Ordering::SeqCst)),
        }
    }

    /// Build a context that never reports an abort request.
    #[must_use]
    pub fn none() -> Self {
        Self {
            checker: Arc::new(|| false),
        }
    }

    /// Build a context backed by a caller-supplied predicate, useful for
    /// tests that want to trigger an abort deterministically.
    pub fn from_checker<F>(checker: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self { checker: Arc::new(checker) }
    }

    /// Whether an abort has been requested.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        (self.checker)()
    }
}

impl Default for AbortContext {
    fn default() -> Self {
        Self::none()
    }
}
