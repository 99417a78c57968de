//! Context registry: one record per VCI.
//!
//! Each record pairs the lock that serializes transport polling for that
//! context with the progress counter the transports bump whenever they
//! complete work. The counter is read without the lock.
//!
//! # Examples
//!
//! ```
//! use vci_progress::registry::VciRegistry;
//!
//! let registry = VciRegistry::new(4).unwrap();
//! assert_eq!(registry.len(), 4);
//!
//! let before = registry.read_counter(2);
//! registry.record_progress(2);
//! assert_ne!(registry.read_counter(2), before);
//!
//! {
//!     let guard = registry.lock(2);
//!     assert_eq!(guard.vci(), 2);
//!     assert!(registry.is_locked(2));
//! }
//! assert!(!registry.is_locked(2));
//! ```

use crate::error::{ProgressError, ProgressResult};
use crate::state::MAX_VCIS;
use crossbeam_utils::CachePadded;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Value of a context's progress counter. Comparison is by equality only,
/// so wrapping is harmless.
pub type ProgressCount = u32;

/// Per-context record
#[derive(Debug, Default)]
pub struct VciRecord {
    lock: Mutex<()>,
    progress_count: AtomicU32,
}

impl VciRecord {
    fn new() -> Self {
        Self::default()
    }
}

/// Fixed table of context records, sized once at startup.
pub struct VciRegistry {
    records: Box<[CachePadded<VciRecord>]>,
}

impl VciRegistry {
    /// Create a registry holding `count` contexts.
    pub fn new(count: usize) -> ProgressResult<Self> {
        if count == 0 {
            return Err(ProgressError::InvalidConfig(
                "registry needs at least one context".into(),
            ));
        }
        if count > MAX_VCIS {
            return Err(ProgressError::TooManyContexts {
                requested: count,
                max: MAX_VCIS,
            });
        }

        let records = (0..count)
            .map(|_| CachePadded::new(VciRecord::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self { records })
    }

    /// Number of contexts; fixed for the registry's lifetime.
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Range check used by validation paths.
    pub fn check_vci(&self, vci: usize) -> ProgressResult<()> {
        if vci < self.len() {
            Ok(())
        } else {
            Err(ProgressError::InvalidContext {
                vci,
                count: self.len(),
            })
        }
    }

    /// Acquire the lock of context `vci`. Released when the guard drops.
    ///
    /// Panics if `vci` is out of range.
    pub fn lock(&self, vci: usize) -> VciGuard<'_> {
        VciGuard {
            vci,
            registry: self,
            guard: self.records[vci].lock.lock(),
        }
    }

    /// Non-blocking variant of [`lock`](Self::lock).
    pub fn try_lock(&self, vci: usize) -> Option<VciGuard<'_>> {
        self.records[vci]
            .lock
            .try_lock()
            .map(|guard| VciGuard {
                vci,
                registry: self,
                guard,
            })
    }

    /// Whether some execution entity currently holds `vci`'s lock.
    pub fn is_locked(&self, vci: usize) -> bool {
        self.records[vci].lock.is_locked()
    }

    /// Relaxed read of the progress counter; no lock needed.
    #[inline]
    pub fn read_counter(&self, vci: usize) -> ProgressCount {
        self.records[vci].progress_count.load(Ordering::Relaxed)
    }

    /// Bump the progress counter. Called by transports after completing work
    /// on `vci`.
    #[inline]
    pub fn record_progress(&self, vci: usize) {
        self.records[vci]
            .progress_count
            .fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Debug for VciRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VciRegistry")
            .field("len", &self.len())
            .finish()
    }
}

/// Scoped hold on one context's lock.
#[must_use = "dropping the guard releases the context lock"]
pub struct VciGuard<'a> {
    vci: usize,
    registry: &'a VciRegistry,
    guard: MutexGuard<'a, ()>,
}

impl VciGuard<'_> {
    /// Context this guard locks.
    #[inline]
    pub fn vci(&self) -> usize {
        self.vci
    }

    /// Whether this guard was taken from `registry`.
    #[inline]
    pub fn belongs_to(&self, registry: &VciRegistry) -> bool {
        std::ptr::eq(self.registry, registry)
    }

    /// Release the lock for the duration of `f`, then take it back.
    pub fn unlocked<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        MutexGuard::unlocked(&mut self.guard, f)
    }
}

impl fmt::Debug for VciGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("VciGuard").field(&self.vci).finish()
    }
}
