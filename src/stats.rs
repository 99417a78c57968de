//! Progress engine statistics.
//!
//! All counters are relaxed atomics: they are diagnostics, not
//! synchronization.

use std::sync::atomic::{AtomicU64, Ordering};

/// Plain copy of the engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressStats {
    /// Driver invocations
    pub driver_calls: u64,
    /// Multi-context calls that swept every context
    pub global_sweeps: u64,
    /// Multi-context calls that swept only the watch list
    pub targeted_sweeps: u64,
    /// Calls that took the single-context fast path
    pub fast_path_polls: u64,
    /// Contexts polled under their lock, across all sweeps
    pub contexts_polled: u64,
    /// Driver calls that set `progress_made`
    pub progress_detected: u64,
    /// Yields taken by `wait`
    pub wait_yields: u64,
    /// Driver calls that returned a failure
    pub failures: u64,
}

impl ProgressStats {
    /// Fraction of multi-context calls that were global sweeps.
    pub fn global_ratio(&self) -> f64 {
        let total = self.global_sweeps + self.targeted_sweeps;
        if total > 0 {
            self.global_sweeps as f64 / total as f64
        } else {
            0.0
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    driver_calls: AtomicU64,
    global_sweeps: AtomicU64,
    targeted_sweeps: AtomicU64,
    fast_path_polls: AtomicU64,
    contexts_polled: AtomicU64,
    progress_detected: AtomicU64,
    wait_yields: AtomicU64,
    failures: AtomicU64,
}

macro_rules! bump_fns {
    ($($name:ident => $field:ident),* $(,)?) => {
        $(
            #[inline]
            pub(crate) fn $name(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl StatsCounters {
    bump_fns! {
        driver_call => driver_calls,
        global_sweep => global_sweeps,
        targeted_sweep => targeted_sweeps,
        fast_path_poll => fast_path_polls,
        context_polled => contexts_polled,
        progress_detected => progress_detected,
        wait_yield => wait_yields,
        failure => failures,
    }

    pub(crate) fn snapshot(&self) -> ProgressStats {
        ProgressStats {
            driver_calls: self.driver_calls.load(Ordering::Relaxed),
            global_sweeps: self.global_sweeps.load(Ordering::Relaxed),
            targeted_sweeps: self.targeted_sweeps.load(Ordering::Relaxed),
            fast_path_polls: self.fast_path_polls.load(Ordering::Relaxed),
            contexts_polled: self.contexts_polled.load(Ordering::Relaxed),
            progress_detected: self.progress_detected.load(Ordering::Relaxed),
            wait_yields: self.wait_yields.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn reset(&self) {
        for counter in [
            &self.driver_calls,
            &self.global_sweeps,
            &self.targeted_sweeps,
            &self.fast_path_polls,
            &self.contexts_polled,
            &self.progress_detected,
            &self.wait_yields,
            &self.failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
