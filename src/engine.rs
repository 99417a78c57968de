//! Progress engine and its driver.
//!
//! The driver polls transports one context at a time: lock, poll, check the
//! counter, unlock, and only then look at the outcome. It never holds two
//! context locks at once.
//!
//! ## Sweep modes
//!
//! - **Fast path**: exactly one context exists; poll it directly.
//! - **Targeted sweep**: poll only the snapshot's watch list, in its order.
//! - **Global sweep**: every `poll_mask + 1` calls per execution entity, poll
//!   every context in ascending order so unwatched contexts are not starved.
//!
//! With detection enabled, either sweep stops as soon as a watched counter
//! moves.
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//! use vci_progress::config::ProgressConfig;
//! use vci_progress::engine::ProgressEngine;
//! use vci_progress::registry::VciRegistry;
//! use vci_progress::test_utils::StubTransport;
//!
//! let registry = Arc::new(VciRegistry::new(2).unwrap());
//! let netmod = Arc::new(StubTransport::netmod(Arc::clone(&registry)));
//! let shm = Arc::new(StubTransport::shm(Arc::clone(&registry)));
//!
//! let engine = ProgressEngine::builder(ProgressConfig {
//!     num_vcis: 2,
//!     ..ProgressConfig::default()
//! })
//! .registry(Arc::clone(&registry))
//! .netmod(Arc::clone(&netmod))
//! .shm(shm)
//! .build()
//! .unwrap();
//!
//! engine.poke().unwrap();
//! assert_eq!(netmod.polled_vcis(), vec![0, 1]);
//! ```

use crate::config::{LockGranularity, ProgressConfig};
use crate::error::{ProgressError, ProgressResult};
use crate::interfaces::{
    FailureDetector, FailureSignal, NoHooks, ProgressHooks, Transport, WorkQueue,
};
use crate::poll_counter::{PollCounter, with_thread_poll_counter};
use crate::registry::VciRegistry;
use crate::state::{ProgressFlags, ProgressState};
use crate::stats::{ProgressStats, StatsCounters};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::fmt;
use std::sync::Arc;
use std::thread;

struct FailureWatch {
    signal: Arc<FailureSignal>,
    detector: Arc<dyn FailureDetector>,
}

/// Drives every outstanding transport operation across a set of contexts.
pub struct ProgressEngine {
    config: ProgressConfig,
    registry: Arc<VciRegistry>,
    netmod: Arc<dyn Transport>,
    /// `None` in direct-netmod mode
    shm: Option<Arc<dyn Transport>>,
    hooks: Arc<dyn ProgressHooks>,
    failure: Option<FailureWatch>,
    work_queue: Option<Arc<dyn WorkQueue>>,
    /// Held across public operations under global lock granularity
    global_lock: Option<ReentrantMutex<()>>,
    stats: StatsCounters,
}

impl ProgressEngine {
    pub fn builder(config: ProgressConfig) -> ProgressEngineBuilder {
        ProgressEngineBuilder::new(config)
    }

    pub fn config(&self) -> &ProgressConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<VciRegistry> {
        &self.registry
    }

    #[inline]
    pub fn num_vcis(&self) -> usize {
        self.registry.len()
    }

    pub fn stats(&self) -> ProgressStats {
        self.stats.snapshot()
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Run the driver once using the calling thread's poll counter.
    ///
    /// `check_progress` enables progress-made detection and the early exit
    /// that comes with it; only wait loops need it.
    pub fn progress_test(
        &self,
        state: &mut ProgressState,
        check_progress: bool,
    ) -> ProgressResult<()> {
        with_thread_poll_counter(|counter| self.progress_test_with(state, check_progress, counter))
    }

    /// Run the driver once with an explicitly supplied poll counter, for
    /// user-level tasks that do not map onto one OS thread.
    pub fn progress_test_with(
        &self,
        state: &mut ProgressState,
        check_progress: bool,
        counter: &PollCounter,
    ) -> ProgressResult<()> {
        self.stats.driver_call();
        let had_progress = state.progress_made();

        let result = self.drive(state, check_progress, counter);

        match &result {
            Err(err) => {
                self.stats.failure();
                log::warn!("progress sweep aborted: {err}");
            }
            Ok(()) if check_progress && !had_progress && state.progress_made() => {
                self.stats.progress_detected();
            }
            Ok(()) => {}
        }
        result
    }

    fn drive(
        &self,
        state: &mut ProgressState,
        check_progress: bool,
        counter: &PollCounter,
    ) -> ProgressResult<()> {
        if let Some(watch) = &self.failure {
            if watch.signal.take_pending() {
                log::debug!("failure signal observed, checking for failed processes");
                watch.detector.check_for_failed_procs()?;
            }
        }

        if state.flag().contains(ProgressFlags::HOOKS) {
            self.hooks.exec_all()?;
        }

        if let Some(work_queue) = &self.work_queue {
            work_queue.vci_progress()?;
        }

        let num_vcis = self.registry.len();
        if num_vcis == 1 {
            return self.fast_path(state, check_progress);
        }

        if counter.should_do_global_progress(num_vcis, self.config.poll_mask) {
            log::trace!("global sweep over {num_vcis} contexts (poll count {})", counter.get());
            self.stats.global_sweep();
            for vci in 0..num_vcis {
                let (polled, moved) = {
                    let _guard = self.registry.lock(vci);
                    let polled = self.poll_context(state.flag(), vci);
                    let moved =
                        check_progress && state.check_progress_made_vci(&self.registry, vci);
                    (polled, moved)
                };
                polled?;
                // Only movement seen in this call ends the sweep early.
                if moved {
                    break;
                }
            }
        } else {
            self.stats.targeted_sweep();
            for idx in 0..state.vci_count() {
                let vci = state.vcis()[idx];
                let (polled, moved) = {
                    let _guard = self.registry.lock(vci);
                    let polled = self.poll_context(state.flag(), vci);
                    let moved =
                        check_progress && state.check_progress_made_idx(&self.registry, idx);
                    (polled, moved)
                };
                polled?;
                // Only movement seen in this call ends the sweep early.
                if moved {
                    break;
                }
            }
        }

        Ok(())
    }

    fn fast_path(&self, state: &mut ProgressState, check_progress: bool) -> ProgressResult<()> {
        self.stats.fast_path_poll();
        let _guard = self.registry.lock(0);
        let polled = self.poll_context(state.flag(), 0);
        if check_progress && state.vci_count() > 0 {
            state.check_progress_made_idx(&self.registry, 0);
        }
        polled
    }

    /// Poll one context's transports. Caller holds `vci`'s lock.
    ///
    /// Shared memory is skipped once the network transport has failed.
    fn poll_context(&self, flag: ProgressFlags, vci: usize) -> ProgressResult<()> {
        self.stats.context_polled();
        if flag.contains(ProgressFlags::NETMOD) {
            self.netmod.progress(vci, false)?;
        }
        if flag.contains(ProgressFlags::SHM) {
            if let Some(shm) = &self.shm {
                shm.progress(vci, false)?;
            }
        }
        Ok(())
    }

    /// Poll every transport of `vci` regardless of flags. Caller holds the
    /// lock.
    pub(crate) fn poll_context_locked(&self, vci: usize) -> ProgressResult<()> {
        self.stats.context_polled();
        self.netmod.progress(vci, false)?;
        if let Some(shm) = &self.shm {
            shm.progress(vci, false)?;
        }
        Ok(())
    }

    pub(crate) fn enter_global(&self) -> Option<ReentrantMutexGuard<'_, ()>> {
        self.global_lock.as_ref().map(|lock| lock.lock())
    }

    /// Yield between unsuccessful wait attempts.
    pub(crate) fn progress_yield(&self, global: &mut Option<ReentrantMutexGuard<'_, ()>>) {
        self.stats.wait_yield();
        match global {
            Some(guard) => ReentrantMutexGuard::unlocked(guard, thread::yield_now),
            None => thread::yield_now(),
        }
    }
}

impl fmt::Debug for ProgressEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressEngine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("shm", &self.shm.is_some())
            .field("failure_detection", &self.failure.is_some())
            .field("work_queue", &self.work_queue.is_some())
            .finish()
    }
}

/// Assembles a [`ProgressEngine`] from its collaborators.
pub struct ProgressEngineBuilder {
    config: ProgressConfig,
    registry: Option<Arc<VciRegistry>>,
    netmod: Option<Arc<dyn Transport>>,
    shm: Option<Arc<dyn Transport>>,
    hooks: Option<Arc<dyn ProgressHooks>>,
    failure: Option<FailureWatch>,
    work_queue: Option<Arc<dyn WorkQueue>>,
}

impl ProgressEngineBuilder {
    fn new(config: ProgressConfig) -> Self {
        Self {
            config,
            registry: None,
            netmod: None,
            shm: None,
            hooks: None,
            failure: None,
            work_queue: None,
        }
    }

    /// Share an existing registry, typically the one the transports bump.
    /// Without one, the engine creates its own.
    pub fn registry(mut self, registry: Arc<VciRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn netmod(mut self, transport: impl Transport + 'static) -> Self {
        self.netmod = Some(Arc::new(transport));
        self
    }

    pub fn shm(mut self, transport: impl Transport + 'static) -> Self {
        self.shm = Some(Arc::new(transport));
        self
    }

    pub fn hooks(mut self, hooks: impl ProgressHooks + 'static) -> Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    /// Run `detector` whenever `signal` has been raised since the last check.
    pub fn failure_detection(
        mut self,
        signal: Arc<FailureSignal>,
        detector: impl FailureDetector + 'static,
    ) -> Self {
        self.failure = Some(FailureWatch {
            signal,
            detector: Arc::new(detector),
        });
        self
    }

    pub fn work_queue(mut self, work_queue: impl WorkQueue + 'static) -> Self {
        self.work_queue = Some(Arc::new(work_queue));
        self
    }

    pub fn build(self) -> ProgressResult<ProgressEngine> {
        let config = self.config;
        config.validate()?;

        let registry = match self.registry {
            Some(registry) if registry.len() != config.num_vcis => {
                return Err(ProgressError::InvalidConfig(format!(
                    "registry holds {} contexts, config asks for {}",
                    registry.len(),
                    config.num_vcis
                )));
            }
            Some(registry) => registry,
            None => Arc::new(VciRegistry::new(config.num_vcis)?),
        };

        let netmod = self
            .netmod
            .ok_or(ProgressError::MissingCollaborator("network transport"))?;

        let shm = if config.direct_netmod {
            if self.shm.is_some() {
                log::debug!("direct-netmod mode: shared-memory transport will not be polled");
            }
            None
        } else {
            Some(
                self.shm
                    .ok_or(ProgressError::MissingCollaborator("shared-memory transport"))?,
            )
        };

        let work_queue = if config.work_queues {
            Some(
                self.work_queue
                    .ok_or(ProgressError::MissingCollaborator("work queue"))?,
            )
        } else {
            None
        };

        let global_lock = match config.lock_granularity {
            LockGranularity::Global => Some(ReentrantMutex::new(())),
            LockGranularity::PerVci => None,
        };

        log::debug!(
            "progress engine ready: {} contexts, mask {:#x}, direct_netmod={}, work_queues={}, {:?}",
            config.num_vcis,
            config.poll_mask,
            config.direct_netmod,
            config.work_queues,
            config.lock_granularity
        );

        Ok(ProgressEngine {
            config,
            registry,
            netmod,
            shm,
            hooks: self.hooks.unwrap_or_else(|| Arc::new(NoHooks)),
            failure: self.failure,
            work_queue,
            global_lock,
            stats: StatsCounters::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportKind;
    use crate::test_utils::{StubTransport, TestFixture};

    fn config(num_vcis: usize) -> ProgressConfig {
        ProgressConfig {
            num_vcis,
            ..ProgressConfig::default()
        }
    }

    #[test]
    fn build_requires_transports() {
        let err = ProgressEngine::builder(config(2)).build().unwrap_err();
        assert_eq!(err, ProgressError::MissingCollaborator("network transport"));

        let registry = Arc::new(VciRegistry::new(2).unwrap());
        let err = ProgressEngine::builder(config(2))
            .registry(Arc::clone(&registry))
            .netmod(StubTransport::netmod(Arc::clone(&registry)))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ProgressError::MissingCollaborator("shared-memory transport")
        );
    }

    #[test]
    fn direct_netmod_needs_no_shm() {
        let registry = Arc::new(VciRegistry::new(2).unwrap());
        let engine = ProgressEngine::builder(ProgressConfig {
            direct_netmod: true,
            ..config(2)
        })
        .registry(Arc::clone(&registry))
        .netmod(StubTransport::netmod(registry))
        .build()
        .unwrap();
        assert!(engine.shm.is_none());
    }

    #[test]
    fn work_queue_mode_requires_queue() {
        let registry = Arc::new(VciRegistry::new(1).unwrap());
        let err = ProgressEngine::builder(ProgressConfig {
            work_queues: true,
            direct_netmod: true,
            ..config(1)
        })
        .registry(Arc::clone(&registry))
        .netmod(StubTransport::netmod(registry))
        .build()
        .unwrap_err();
        assert_eq!(err, ProgressError::MissingCollaborator("work queue"));
    }

    #[test]
    fn registry_size_must_match_config() {
        let registry = Arc::new(VciRegistry::new(3).unwrap());
        let err = ProgressEngine::builder(config(2))
            .registry(Arc::clone(&registry))
            .netmod(StubTransport::netmod(Arc::clone(&registry)))
            .shm(StubTransport::shm(registry))
            .build()
            .unwrap_err();
        assert!(matches!(err, ProgressError::InvalidConfig(_)));
    }

    #[test]
    fn flags_gate_transports() {
        let fixture = TestFixture::new(1);
        let mut state = ProgressState::all_contexts(&fixture.registry);

        state.set_flag(ProgressFlags::NETMOD);
        fixture.engine.progress_test(&mut state, false).unwrap();
        assert_eq!(fixture.netmod.invocations(), 1);
        assert_eq!(fixture.shm.invocations(), 0);
        assert_eq!(fixture.hooks.calls(), 0);

        state.set_flag(ProgressFlags::SHM | ProgressFlags::HOOKS);
        fixture.engine.progress_test(&mut state, false).unwrap();
        assert_eq!(fixture.netmod.invocations(), 1);
        assert_eq!(fixture.shm.invocations(), 1);
        assert_eq!(fixture.hooks.calls(), 1);
    }

    #[test]
    fn netmod_failure_skips_shm_and_releases_lock() {
        let fixture = TestFixture::new(1);
        fixture.netmod.fail_on_invocation(1);
        let mut state = ProgressState::all_contexts(&fixture.registry);

        let err = fixture.engine.progress_test(&mut state, true).unwrap_err();
        assert!(matches!(
            err,
            ProgressError::Transport {
                kind: TransportKind::Netmod,
                vci: 0,
                ..
            }
        ));
        assert_eq!(fixture.shm.invocations(), 0);
        assert!(!fixture.registry.is_locked(0));
        assert_eq!(fixture.engine.stats().failures, 1);
    }

    #[test]
    fn explicit_counter_drives_sweep_choice() {
        let fixture = TestFixture::with_config(ProgressConfig {
            num_vcis: 3,
            poll_mask: 0,
            ..ProgressConfig::default()
        });
        let counter = PollCounter::new();
        let mut state =
            ProgressState::watching(&fixture.registry, ProgressFlags::ALL, &[1]).unwrap();

        fixture
            .engine
            .progress_test_with(&mut state, false, &counter)
            .unwrap();

        assert_eq!(counter.get(), 1);
        assert_eq!(fixture.netmod.polled_vcis(), vec![0, 1, 2]);
        assert_eq!(fixture.engine.stats().global_sweeps, 1);
    }
}
