//! Progress snapshot threaded through a test/wait session.
//!
//! A [`ProgressState`] lives on the caller's stack. It names the contexts the
//! caller cares about, keeps the last counter value seen for each, and
//! records whether any of them moved.

use crate::error::{ProgressError, ProgressResult};
use crate::registry::{ProgressCount, VciRegistry};
use bitflags::bitflags;

/// Upper bound on contexts; sizes the snapshot's inline arrays.
pub const MAX_VCIS: usize = 64;

bitflags! {
    /// Progress sources a snapshot asks the driver to poll.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ProgressFlags: u8 {
        /// Network transport
        const NETMOD = 0b001;
        /// Shared-memory transport
        const SHM = 0b010;
        /// User-registered progress hooks
        const HOOKS = 0b100;
        const ALL = Self::NETMOD.bits() | Self::SHM.bits() | Self::HOOKS.bits();
    }
}

impl Default for ProgressFlags {
    fn default() -> Self {
        ProgressFlags::ALL
    }
}

/// Per-session progress snapshot.
///
/// `vcis` and `saved_counts` are parallel arrays; only the first
/// `vci_count` entries are meaningful.
///
/// # Examples
///
/// ```
/// use vci_progress::registry::VciRegistry;
/// use vci_progress::state::{ProgressFlags, ProgressState};
///
/// let registry = VciRegistry::new(4).unwrap();
/// let mut state = ProgressState::watching(&registry, ProgressFlags::ALL, &[2, 0]).unwrap();
/// assert_eq!(state.vcis(), &[2, 0]);
///
/// registry.record_progress(2);
/// state.check_progress_made_vci(&registry, 2);
/// assert!(state.progress_made());
/// ```
#[derive(Debug, Clone)]
pub struct ProgressState {
    flag: ProgressFlags,
    vcis: [usize; MAX_VCIS],
    saved_counts: [ProgressCount; MAX_VCIS],
    vci_count: usize,
    progress_made: bool,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            flag: ProgressFlags::ALL,
            vcis: [0; MAX_VCIS],
            saved_counts: [0; MAX_VCIS],
            vci_count: 0,
            progress_made: false,
        }
    }
}

impl ProgressState {
    /// Empty snapshot watching nothing. Fill it with
    /// [`init_all`](Self::init_all) or build one with
    /// [`watching`](Self::watching).
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot over every context with zero saved counts. Enough for a
    /// poke, which never checks counts.
    pub fn all_contexts(registry: &VciRegistry) -> Self {
        let mut state = Self::default();
        state.init_all(registry);
        state
    }

    /// Snapshot over an explicit ordered subset, baselined at the current
    /// counter values.
    pub fn watching(
        registry: &VciRegistry,
        flag: ProgressFlags,
        vcis: &[usize],
    ) -> ProgressResult<Self> {
        if vcis.len() > MAX_VCIS {
            return Err(ProgressError::TooManyContexts {
                requested: vcis.len(),
                max: MAX_VCIS,
            });
        }
        for (i, &vci) in vcis.iter().enumerate() {
            registry.check_vci(vci)?;
            if vcis[..i].contains(&vci) {
                return Err(ProgressError::InvalidConfig(format!(
                    "vci {vci} listed twice in watch list"
                )));
            }
        }

        let mut state = Self {
            flag,
            ..Self::default()
        };
        state.vcis[..vcis.len()].copy_from_slice(vcis);
        state.vci_count = vcis.len();
        state.capture_counts(registry);
        Ok(state)
    }

    /// Watch every context with flag `ALL` and clear `progress_made`.
    /// Saved counts are left alone; see [`capture_counts`](Self::capture_counts).
    pub fn init_all(&mut self, registry: &VciRegistry) {
        self.flag = ProgressFlags::ALL;
        self.progress_made = false;
        let n = registry.len();
        for (slot, vci) in self.vcis[..n].iter_mut().zip(0..n) {
            *slot = vci;
        }
        self.vci_count = n;
    }

    /// Baseline every watched context at its live counter value.
    pub fn capture_counts(&mut self, registry: &VciRegistry) {
        for i in 0..self.vci_count {
            self.saved_counts[i] = registry.read_counter(self.vcis[i]);
        }
    }

    #[inline]
    pub fn flag(&self) -> ProgressFlags {
        self.flag
    }

    pub fn set_flag(&mut self, flag: ProgressFlags) {
        self.flag = flag;
    }

    /// Watched contexts in sweep order
    #[inline]
    pub fn vcis(&self) -> &[usize] {
        &self.vcis[..self.vci_count]
    }

    #[inline]
    pub fn vci_count(&self) -> usize {
        self.vci_count
    }

    /// Saved counter per watched context, parallel to [`vcis`](Self::vcis).
    #[inline]
    pub fn saved_counts(&self) -> &[ProgressCount] {
        &self.saved_counts[..self.vci_count]
    }

    /// Saved counter for context `vci`, if watched.
    pub fn saved_count_of(&self, vci: usize) -> Option<ProgressCount> {
        self.position_of(vci).map(|idx| self.saved_counts[idx])
    }

    #[inline]
    pub fn progress_made(&self) -> bool {
        self.progress_made
    }

    pub fn reset_progress_made(&mut self) {
        self.progress_made = false;
    }

    /// Whether `vci` is in the watch list.
    pub fn watches(&self, vci: usize) -> bool {
        self.position_of(vci).is_some()
    }

    fn position_of(&self, vci: usize) -> Option<usize> {
        self.vcis().iter().position(|&v| v == vci)
    }

    /// Targeted-sweep check: compare the `idx`-th watched context against its
    /// saved count, refreshing the saved copy on change.
    ///
    /// Returns true if this check saw the counter move. `progress_made` is
    /// sticky across calls; the return value is not.
    pub fn check_progress_made_idx(&mut self, registry: &VciRegistry, idx: usize) -> bool {
        let current = registry.read_counter(self.vcis[idx]);
        if self.saved_counts[idx] == current {
            return false;
        }
        self.saved_counts[idx] = current;
        self.progress_made = true;
        true
    }

    /// Global-sweep check: `vci` may or may not be watched. Unwatched
    /// contexts never set `progress_made`.
    pub fn check_progress_made_vci(&mut self, registry: &VciRegistry, vci: usize) -> bool {
        match self.position_of(vci) {
            Some(idx) => self.check_progress_made_idx(registry, idx),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_all_watches_every_context_in_order() {
        let registry = VciRegistry::new(5).unwrap();
        let state = ProgressState::all_contexts(&registry);
        assert_eq!(state.vcis(), &[0, 1, 2, 3, 4]);
        assert_eq!(state.flag(), ProgressFlags::ALL);
        assert!(!state.progress_made());
        assert_eq!(state.saved_counts(), &[0; 5]);
    }

    #[test]
    fn watching_validates_and_baselines() {
        let registry = VciRegistry::new(4).unwrap();
        registry.record_progress(3);

        let state = ProgressState::watching(&registry, ProgressFlags::NETMOD, &[3, 1]).unwrap();
        assert_eq!(state.saved_counts(), &[1, 0]);
        assert_eq!(state.flag(), ProgressFlags::NETMOD);

        assert_eq!(
            ProgressState::watching(&registry, ProgressFlags::ALL, &[4]).unwrap_err(),
            ProgressError::InvalidContext { vci: 4, count: 4 }
        );
    }

    #[test]
    fn unwatched_context_never_sets_progress() {
        let registry = VciRegistry::new(6).unwrap();
        let mut state = ProgressState::watching(&registry, ProgressFlags::ALL, &[2, 5]).unwrap();

        registry.record_progress(3);
        state.check_progress_made_vci(&registry, 3);
        assert!(!state.progress_made());

        registry.record_progress(5);
        state.check_progress_made_vci(&registry, 5);
        assert!(state.progress_made());
        assert_eq!(state.saved_count_of(5), Some(1));
        assert_eq!(state.saved_count_of(3), None);
    }

    #[test]
    fn saved_count_refreshes_so_next_check_needs_new_progress() {
        let registry = VciRegistry::new(1).unwrap();
        let mut state = ProgressState::all_contexts(&registry);
        state.capture_counts(&registry);

        registry.record_progress(0);
        assert!(state.check_progress_made_idx(&registry, 0));
        assert!(state.progress_made());

        state.reset_progress_made();
        assert!(!state.check_progress_made_idx(&registry, 0));
        assert!(!state.progress_made());
    }

    #[test]
    fn check_reports_only_fresh_movement() {
        let registry = VciRegistry::new(3).unwrap();
        let mut state = ProgressState::all_contexts(&registry);

        registry.record_progress(1);
        assert!(state.check_progress_made_vci(&registry, 1));

        // Flag stays set, but a quiet context is not reported as moving.
        assert!(!state.check_progress_made_vci(&registry, 2));
        assert!(!state.check_progress_made_vci(&registry, 1));
        assert!(state.progress_made());
    }

    #[test]
    fn watch_list_rejects_repeated_contexts() {
        let registry = VciRegistry::new(4).unwrap();
        let err = ProgressState::watching(&registry, ProgressFlags::ALL, &[2, 0, 2]).unwrap_err();
        assert!(matches!(err, ProgressError::InvalidConfig(_)));
    }

    #[test]
    fn flags_default_to_all() {
        assert_eq!(ProgressFlags::default(), ProgressFlags::ALL);
        assert!(ProgressFlags::ALL.contains(ProgressFlags::HOOKS));
        assert!(!ProgressFlags::NETMOD.contains(ProgressFlags::SHM));
    }
}
