//! Test utilities for progress engine tests
//!
//! Scriptable stand-ins for every collaborator, plus a [`TestFixture`] that
//! wires them into an engine. Shared by unit tests, integration tests and
//! benches.

use crate::config::ProgressConfig;
use crate::engine::ProgressEngine;
use crate::error::{ProgressError, ProgressResult, TransportKind};
use crate::interfaces::{FailureDetector, FailureSignal, ProgressHooks, Transport, WorkQueue};
use crate::registry::VciRegistry;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One transport invocation as seen by a [`StubTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollRecord {
    pub vci: usize,
    /// Whether `vci`'s lock was held during the call
    pub own_lock_held: bool,
    /// How many other contexts' locks were held during the call
    pub foreign_locks_held: usize,
}

impl PollRecord {
    /// Exactly the polled context's lock was held. Only meaningful when a
    /// single thread is driving the engine.
    pub fn lock_discipline_ok(&self) -> bool {
        self.own_lock_held && self.foreign_locks_held == 0
    }
}

#[derive(Debug, Default)]
struct TransportScript {
    fail_on_invocation: Option<usize>,
    fail_on_vci: Option<usize>,
    bump_once: Vec<usize>,
    bump_always: HashSet<usize>,
    bump_at: Vec<(usize, usize)>,
}

/// Transport stub that records every poll and can bump counters or fail on
/// cue.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use vci_progress::interfaces::Transport;
/// use vci_progress::registry::VciRegistry;
/// use vci_progress::test_utils::StubTransport;
///
/// let registry = Arc::new(VciRegistry::new(2).unwrap());
/// let transport = StubTransport::netmod(Arc::clone(&registry));
/// transport.bump_on_poll(1);
///
/// let _guard = registry.lock(1);
/// transport.progress(1, false).unwrap();
/// assert_eq!(registry.read_counter(1), 1);
/// assert!(transport.records()[0].lock_discipline_ok());
/// ```
#[derive(Debug)]
pub struct StubTransport {
    kind: TransportKind,
    registry: Arc<VciRegistry>,
    invocations: AtomicUsize,
    records: Mutex<Vec<PollRecord>>,
    script: Mutex<TransportScript>,
}

impl StubTransport {
    pub fn new(kind: TransportKind, registry: Arc<VciRegistry>) -> Self {
        Self {
            kind,
            registry,
            invocations: AtomicUsize::new(0),
            records: Mutex::new(Vec::new()),
            script: Mutex::new(TransportScript::default()),
        }
    }

    pub fn netmod(registry: Arc<VciRegistry>) -> Self {
        Self::new(TransportKind::Netmod, registry)
    }

    pub fn shm(registry: Arc<VciRegistry>) -> Self {
        Self::new(TransportKind::Shm, registry)
    }

    /// Fail the `n`-th invocation (1-based) and only that one.
    pub fn fail_on_invocation(&self, n: usize) {
        self.script.lock().fail_on_invocation = Some(n);
    }

    /// Fail every poll of `vci`.
    pub fn fail_on_vci(&self, vci: usize) {
        self.script.lock().fail_on_vci = Some(vci);
    }

    /// Bump `vci`'s counter the next time it is polled.
    pub fn bump_on_poll(&self, vci: usize) {
        self.script.lock().bump_once.push(vci);
    }

    /// Bump `vci`'s counter during the `n`-th invocation (1-based), whichever
    /// context that invocation polls.
    pub fn bump_on_invocation(&self, n: usize, vci: usize) {
        self.script.lock().bump_at.push((n, vci));
    }

    /// Bump `vci`'s counter on every poll.
    pub fn bump_on_every_poll(&self, vci: usize) {
        self.script.lock().bump_always.insert(vci);
    }

    pub fn clear_script(&self) {
        *self.script.lock() = TransportScript::default();
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::Acquire)
    }

    pub fn records(&self) -> Vec<PollRecord> {
        self.records.lock().clone()
    }

    /// Contexts polled so far, in call order.
    pub fn polled_vcis(&self) -> Vec<usize> {
        self.records.lock().iter().map(|r| r.vci).collect()
    }

    pub fn clear_records(&self) {
        self.records.lock().clear();
    }
}

impl Transport for StubTransport {
    fn progress(&self, vci: usize, _blocking: bool) -> ProgressResult<()> {
        let n = self.invocations.fetch_add(1, Ordering::AcqRel) + 1;

        let own_lock_held = self.registry.is_locked(vci);
        let foreign_locks_held = (0..self.registry.len())
            .filter(|&other| other != vci && self.registry.is_locked(other))
            .count();
        self.records.lock().push(PollRecord {
            vci,
            own_lock_held,
            foreign_locks_held,
        });

        let mut script = self.script.lock();
        if script.fail_on_invocation == Some(n) || script.fail_on_vci == Some(vci) {
            return Err(ProgressError::transport(
                self.kind,
                vci,
                format!("scripted failure on invocation {n}"),
            ));
        }
        if let Some(pos) = script.bump_once.iter().position(|&v| v == vci) {
            script.bump_once.remove(pos);
            self.registry.record_progress(vci);
        }
        if script.bump_always.contains(&vci) {
            self.registry.record_progress(vci);
        }
        for &(_, target) in script.bump_at.iter().filter(|(at, _)| *at == n) {
            self.registry.record_progress(target);
        }
        Ok(())
    }
}

/// Call counter with an optional scripted failure, shared by the small stubs.
#[derive(Debug, Default)]
struct CallScript {
    calls: AtomicUsize,
    fail_on_call: Mutex<Option<usize>>,
}

impl CallScript {
    /// Count a call; true if this call should fail.
    fn enter(&self) -> (usize, bool) {
        let n = self.calls.fetch_add(1, Ordering::AcqRel) + 1;
        (n, *self.fail_on_call.lock() == Some(n))
    }
}

/// Progress hook table stub
#[derive(Debug, Default)]
pub struct StubHooks {
    script: CallScript,
}

impl StubHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.script.calls.load(Ordering::Acquire)
    }

    pub fn fail_on_call(&self, n: usize) {
        *self.script.fail_on_call.lock() = Some(n);
    }
}

impl ProgressHooks for StubHooks {
    fn exec_all(&self) -> ProgressResult<bool> {
        match self.script.enter() {
            (n, true) => Err(ProgressError::Hook(format!("scripted failure on call {n}"))),
            _ => Ok(false),
        }
    }
}

/// Failed-process detector stub
#[derive(Debug, Default)]
pub struct StubDetector {
    script: CallScript,
}

impl StubDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.script.calls.load(Ordering::Acquire)
    }

    pub fn fail_on_call(&self, n: usize) {
        *self.script.fail_on_call.lock() = Some(n);
    }
}

impl FailureDetector for StubDetector {
    fn check_for_failed_procs(&self) -> ProgressResult<()> {
        match self.script.enter() {
            (n, true) => Err(ProgressError::FailedProcess(format!(
                "scripted failure on call {n}"
            ))),
            _ => Ok(()),
        }
    }
}

/// Work queue stub
#[derive(Debug, Default)]
pub struct StubWorkQueue {
    script: CallScript,
}

impl StubWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.script.calls.load(Ordering::Acquire)
    }

    pub fn fail_on_call(&self, n: usize) {
        *self.script.fail_on_call.lock() = Some(n);
    }
}

impl WorkQueue for StubWorkQueue {
    fn vci_progress(&self) -> ProgressResult<()> {
        match self.script.enter() {
            (n, true) => Err(ProgressError::WorkQueue(format!(
                "scripted failure on call {n}"
            ))),
            _ => Ok(()),
        }
    }
}

/// Engine wired to stubs for every collaborator.
///
/// # Examples
///
/// ```
/// use vci_progress::test_utils::TestFixture;
///
/// let fixture = TestFixture::new(4);
/// fixture.engine.poke().unwrap();
/// assert_eq!(fixture.netmod.invocations(), 4);
/// assert_eq!(fixture.shm.invocations(), 4);
/// assert_eq!(fixture.hooks.calls(), 1);
/// ```
pub struct TestFixture {
    pub registry: Arc<VciRegistry>,
    pub netmod: Arc<StubTransport>,
    pub shm: Arc<StubTransport>,
    pub hooks: Arc<StubHooks>,
    pub failure_signal: Arc<FailureSignal>,
    pub detector: Arc<StubDetector>,
    pub work_queue: Arc<StubWorkQueue>,
    pub engine: ProgressEngine,
}

impl TestFixture {
    pub fn new(num_vcis: usize) -> Self {
        Self::with_config(ProgressConfig {
            num_vcis,
            ..ProgressConfig::default()
        })
    }

    pub fn with_config(config: ProgressConfig) -> Self {
        let registry =
            Arc::new(VciRegistry::new(config.num_vcis).expect("fixture registry size"));
        let netmod = Arc::new(StubTransport::netmod(Arc::clone(&registry)));
        let shm = Arc::new(StubTransport::shm(Arc::clone(&registry)));
        let hooks = Arc::new(StubHooks::new());
        let failure_signal = Arc::new(FailureSignal::new());
        let detector = Arc::new(StubDetector::new());
        let work_queue = Arc::new(StubWorkQueue::new());

        let engine = ProgressEngine::builder(config)
            .registry(Arc::clone(&registry))
            .netmod(Arc::clone(&netmod))
            .shm(Arc::clone(&shm))
            .hooks(Arc::clone(&hooks))
            .failure_detection(Arc::clone(&failure_signal), Arc::clone(&detector))
            .work_queue(Arc::clone(&work_queue))
            .build()
            .expect("fixture engine");

        Self {
            registry,
            netmod,
            shm,
            hooks,
            failure_signal,
            detector,
            work_queue,
            engine,
        }
    }

    /// Every recorded poll, both transports, held exactly its own lock.
    pub fn lock_discipline_ok(&self) -> bool {
        let netmod = self.netmod.records();
        let shm = self.shm.records();
        netmod
            .iter()
            .chain(shm.iter())
            .all(PollRecord::lock_discipline_ok)
    }
}
