// Failed-process detection and the signal counter that gates it.
use crate::error::ProgressResult;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Scans for peers that have died. Only invoked after a failure signal.
pub trait FailureDetector: Send + Sync {
    fn check_for_failed_procs(&self) -> ProgressResult<()>;
}

impl<T: FailureDetector + ?Sized> FailureDetector for Arc<T> {
    fn check_for_failed_procs(&self) -> ProgressResult<()> {
        (**self).check_for_failed_procs()
    }
}

/// Counts failure notifications and remembers how many the engine has acted
/// on.
///
/// `raise` only touches an atomic, so it is safe to call from a signal
/// handler.
///
/// # Examples
///
/// ```
/// use vci_progress::interfaces::FailureSignal;
///
/// let signal = FailureSignal::new();
/// assert!(!signal.take_pending());
///
/// signal.raise();
/// signal.raise();
/// assert!(signal.take_pending());
/// assert!(!signal.take_pending());
/// ```
#[derive(Debug, Default)]
pub struct FailureSignal {
    raised: AtomicU64,
    observed: AtomicU64,
}

impl FailureSignal {
    pub const fn new() -> Self {
        Self {
            raised: AtomicU64::new(0),
            observed: AtomicU64::new(0),
        }
    }

    /// Record one failure notification.
    pub fn raise(&self) {
        self.raised.fetch_add(1, Ordering::Release);
    }

    /// Number of notifications recorded so far.
    pub fn raised(&self) -> u64 {
        self.raised.load(Ordering::Acquire)
    }

    /// Catch up with every raise seen so far. True if there was anything new;
    /// any number of raises since the last call collapse into one.
    pub fn take_pending(&self) -> bool {
        let raised = self.raised.load(Ordering::Acquire);
        let mut observed = self.observed.load(Ordering::Relaxed);
        while raised > observed {
            match self.observed.compare_exchange_weak(
                observed,
                raised,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(current) => observed = current,
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn concurrent_takers_claim_each_raise_once() {
        let signal = Arc::new(FailureSignal::new());
        signal.raise();

        let claimed = Arc::new(AtomicUsize::new(0));
        crossbeam::scope(|s| {
            for _ in 0..4 {
                let signal = Arc::clone(&signal);
                let claimed = Arc::clone(&claimed);
                s.spawn(move |_| {
                    if signal.take_pending() {
                        claimed.fetch_add(1, Ordering::Relaxed);
                    }
                });
            }
        })
        .unwrap();

        assert_eq!(claimed.load(Ordering::Relaxed), 1);
    }
}
