//! Shared stop signal for the recorder loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative stop flag, checked by the recorder at the top of each cycle.
///
/// Clones share the same flag. Raising it never interrupts a cycle in
/// progress.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    raised: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag.
    pub fn stop(&self) {
        self.raised.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }
}
