//! Cooperative "print status now" signaling (SPEC_FULL.md §3 "Live status
//! readout on demand"), the on-demand-readout counterpart to `abort.rs`'s
//! cancellation flag: same global-flag-plus-explicit-context split, so a
//! CLI's input-watcher thread can request a status line without the core
//! threading a handle through, while tests get an isolated, non-global
//! flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

static STATUS_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Request a status line via the process-global flag (set by a CLI's
/// input-watcher thread, not an OS signal — status-on-demand needs a
/// printable trigger a user types, unlike abort's Ctrl-C).
pub fn request_global_status() {
    STATUS_REQUESTED.store(true, Ordering::SeqCst);
}

/// A status-request source the sender FSM polls once per tick, clearing
/// the request as it observes it.
#[derive(Clone)]
pub struct StatusRequestContext {
    checker: Arc<dyn Fn() -> bool + Send + Sync>,
}

impl StatusRequestContext {
    /// Build a context backed by the process-global flag.
    #[must_use]
    pub fn global() -> Self {
        Self {
            checker: Arc::new(|| STATUS_REQUESTED.swap(false, Ordering::SeqCst)),
        }
    }

    /// Build a context that never reports a pending request.
    #[must_use]
    pub fn none() -> Self {
        Self { checker: Arc::new(|| false) }
    }

    /// Build a context backed by a caller-supplied predicate, useful for
    /// tests that want to trigger a status request deterministically.
    pub fn from_checker<F>(checker: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self { checker: Arc::new(checker) }
    }

    /// Whether a status line was requested since the last call. Takes
    /// (clears) the request the same way the global flag does, so a
    /// caller-supplied predicate backing a test should model that itself.
    #[must_use]
    pub fn take_requested(&self) -> bool {
        (self.checker)()
    }
}

impl Default for StatusRequestContext {
    fn default() -> Self {
        Self::none()
    }
}
