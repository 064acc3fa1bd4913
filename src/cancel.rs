use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Run-wide stop flag shared by the supervisor and every session.
///
/// Once set it stays set. Sessions only look at it between loop iterations, so
/// a session notices cancellation at most one frame read plus one pacing
/// interval after it is raised.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    cancelled: Arc<AtomicBool>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal. Returns `true` only for the call that actually set it.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::AcqRel)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Handle given to outside shutdown sources (Ctrl-C handler, API calls).
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    signal: CancellationSignal,
}

impl ShutdownTrigger {
    pub(crate) fn new(signal: CancellationSignal) -> Self {
        Self { signal }
    }

    /// Request a clean shutdown of every session. Safe to call repeatedly.
    pub fn trigger(&self) {
        if self.signal.cancel() {
            tracing::info!("Shutdown requested");
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.signal.is_cancelled()
    }
}
