use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared across pipeline phases.
///
/// Workers poll it between files; nothing is interrupted mid-write, so
/// the database stays consistent at entry granularity.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Clears the flag so the token can be reused for the next run.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Relaxed);
    }
}
