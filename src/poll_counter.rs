//! Execution-entity-local poll counter and the global-progress decision.
//!
//! Targeted sweeps only visit the contexts a caller watches, which could
//! starve a context no one is waiting on. Every `mask + 1` multi-context
//! driver calls, an entity sweeps all contexts instead.
//!
//! The counter needs no synchronization: each OS thread owns one through
//! thread-local storage, and a user-level task that migrates between threads
//! can carry its own [`PollCounter`] and pass it explicitly.

use std::cell::Cell;

/// Per-entity poll counter. Incremented once per multi-context decision,
/// never reset.
#[derive(Debug, Default)]
pub struct PollCounter {
    count: Cell<u32>,
}

impl PollCounter {
    pub const fn new() -> Self {
        Self {
            count: Cell::new(0),
        }
    }

    /// Current value
    #[inline]
    pub fn get(&self) -> u32 {
        self.count.get()
    }

    /// Decide whether this call should sweep every context.
    ///
    /// With a single context there is nothing to sweep beyond the fast path,
    /// and the counter is left untouched. Otherwise the counter is bumped and
    /// the answer is whether its low `mask` bits are all zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use vci_progress::poll_counter::PollCounter;
    ///
    /// let counter = PollCounter::new();
    /// assert!(!counter.should_do_global_progress(1, 0xff));
    /// assert_eq!(counter.get(), 0);
    ///
    /// let globals = (0..512)
    ///     .filter(|_| counter.should_do_global_progress(4, 0xff))
    ///     .count();
    /// assert_eq!(globals, 2);
    /// ```
    #[inline]
    pub fn should_do_global_progress(&self, num_vcis: usize, mask: u32) -> bool {
        if num_vcis == 1 {
            return false;
        }
        let next = self.count.get().wrapping_add(1);
        self.count.set(next);
        next & mask == 0
    }
}

thread_local! {
    static THREAD_POLL_COUNTER: PollCounter = const { PollCounter::new() };
}

/// Run `f` with the calling thread's poll counter.
pub fn with_thread_poll_counter<R>(f: impl FnOnce(&PollCounter) -> R) -> R {
    THREAD_POLL_COUNTER.with(f)
}

/// Current value of the calling thread's poll counter.
pub fn thread_poll_count() -> u32 {
    with_thread_poll_counter(PollCounter::get)
}
