use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-request cancellation token. Long-running steps (executor query,
/// vector search, embedding) check it at entry; a cancelled request
/// returns without writes to learning memory or the vector store.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
