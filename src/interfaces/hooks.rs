// User progress hook interface.
use crate::error::ProgressResult;

/// Runs every registered progress hook once.
pub trait ProgressHooks: Send + Sync {
    /// Returns whether any hook reported progress. The engine does not act on
    /// the flag; it is there for callers that share the hook table.
    fn exec_all(&self) -> ProgressResult<bool>;
}

impl<T: ProgressHooks + ?Sized> ProgressHooks for std::sync::Arc<T> {
    fn exec_all(&self) -> ProgressResult<bool> {
        (**self).exec_all()
    }
}

/// Hook table with nothing registered.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl ProgressHooks for NoHooks {
    fn exec_all(&self) -> ProgressResult<bool> {
        Ok(false)
    }
}
