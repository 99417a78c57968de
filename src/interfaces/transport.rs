// Transport polling interface.
use crate::error::ProgressResult;

/// A transport that can advance the operations queued on one context.
///
/// The engine calls [`progress`](Transport::progress) while holding `vci`'s
/// lock, so an implementation may touch that context's state freely but must
/// not take any other context's lock. Completing work is reported by bumping
/// the context's counter through
/// [`VciRegistry::record_progress`](crate::registry::VciRegistry::record_progress).
pub trait Transport: Send + Sync {
    /// Advance `vci` once. `blocking` is a hint; the engine always passes
    /// `false`.
    fn progress(&self, vci: usize, blocking: bool) -> ProgressResult<()>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn progress(&self, vci: usize, blocking: bool) -> ProgressResult<()> {
        (**self).progress(vci, blocking)
    }
}
