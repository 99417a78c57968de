//! Session lifecycle on top of the driver.
//!
//! ```
//! use vci_progress::state::ProgressState;
//! use vci_progress::test_utils::TestFixture;
//!
//! let fixture = TestFixture::new(4);
//! fixture.netmod.bump_on_poll(2);
//!
//! let mut state = ProgressState::new();
//! fixture.engine.session_start(&mut state);
//! fixture.engine.session_wait(&mut state).unwrap();
//! assert!(state.progress_made());
//! fixture.engine.session_end(&mut state);
//! ```

use crate::engine::ProgressEngine;
use crate::error::{ProgressError, ProgressResult};
use crate::poll_counter::with_thread_poll_counter;
use crate::registry::VciGuard;
use crate::state::{ProgressFlags, ProgressState};

impl ProgressEngine {
    /// Open a session watching every context with flag `ALL`, baselined at
    /// the current counters.
    pub fn session_start(&self, state: &mut ProgressState) {
        state.init_all(self.registry());
        state.capture_counts(self.registry());
        log::debug!("progress session started over {} contexts", state.vci_count());
    }

    /// Open a session over an explicit ordered subset of contexts.
    pub fn session_start_with(
        &self,
        state: &mut ProgressState,
        flag: ProgressFlags,
        vcis: &[usize],
    ) -> ProgressResult<()> {
        *state = ProgressState::watching(self.registry(), flag, vcis)?;
        log::debug!("progress session started over {vcis:?}");
        Ok(())
    }

    /// Close a session. Nothing was allocated, so there is nothing to free.
    pub fn session_end(&self, _state: &mut ProgressState) {}

    /// Advance once.
    ///
    /// With a session, the snapshot is driven with detection enabled and its
    /// `progress_made` flag and saved counts are updated. Without one, a
    /// transient all-contexts snapshot is polled and discarded.
    pub fn session_test(&self, state: Option<&mut ProgressState>) -> ProgressResult<()> {
        let _global = self.enter_global();
        match state {
            Some(state) => self.progress_test(state, true),
            None => {
                let mut transient = ProgressState::all_contexts(self.registry());
                self.progress_test(&mut transient, false)
            }
        }
    }

    /// Spin until a watched context makes progress, yielding between
    /// attempts. Returns early only on a collaborator failure.
    ///
    /// In work-queue mode the queue guarantees forward progress, so this is a
    /// single undetected poll followed by one yield.
    pub fn session_wait(&self, state: &mut ProgressState) -> ProgressResult<()> {
        let mut global = self.enter_global();

        if self.config().work_queues {
            self.progress_test(state, false)?;
            self.progress_yield(&mut global);
            return Ok(());
        }

        state.reset_progress_made();
        loop {
            self.progress_test(state, true)?;
            if state.progress_made() {
                return Ok(());
            }
            self.progress_yield(&mut global);
        }
    }

    /// Opportunistic advance of every context; never blocks on progress.
    pub fn poke(&self) -> ProgressResult<()> {
        self.session_test(None)
    }

    /// Like [`poke`](Self::poke) but polls only the sources in `flag`.
    pub fn progress_test_flags(&self, flag: ProgressFlags) -> ProgressResult<()> {
        let _global = self.enter_global();
        let mut transient = ProgressState::all_contexts(self.registry());
        transient.set_flag(flag);
        self.progress_test(&mut transient, false)
    }

    /// Make progress from code that already holds `guard`'s context lock.
    ///
    /// When a global sweep is due the lock is released for the sweep and
    /// retaken afterwards, so the sweep can visit every context without lock
    /// inversion. Otherwise only the held context is polled, in place.
    ///
    /// Fails with [`ProgressError::ForeignGuard`] if `guard` was not taken
    /// from this engine's registry.
    pub fn test_one_context(&self, guard: &mut VciGuard<'_>) -> ProgressResult<()> {
        let vci = guard.vci();
        if !guard.belongs_to(self.registry()) {
            return Err(ProgressError::ForeignGuard { vci });
        }

        let global = with_thread_poll_counter(|counter| {
            counter.should_do_global_progress(self.num_vcis(), self.config().poll_mask)
        });

        if global {
            log::trace!("vci {vci}: global progress due, releasing lock");
            guard.unlocked(|| self.session_test(None))
        } else {
            self.poll_context_locked(vci)
        }
    }
}
