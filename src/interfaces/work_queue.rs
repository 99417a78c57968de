// Explicit work-queue interface, only driven in work-queue mode.
use crate::error::ProgressResult;

pub trait WorkQueue: Send + Sync {
    /// Drain whatever per-context work the queue has pending.
    fn vci_progress(&self) -> ProgressResult<()>;
}

impl<T: WorkQueue + ?Sized> WorkQueue for std::sync::Arc<T> {
    fn vci_progress(&self) -> ProgressResult<()> {
        (**self).vci_progress()
    }
}
