use std::sync::atomic::{AtomicBool, Ordering};
use vci_progress::config::{LockGranularity, ProgressConfig};
use vci_progress::state::{ProgressFlags, ProgressState};
use vci_progress::test_utils::TestFixture;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn direct_netmod_never_polls_shared_memory() {
    let fixture = TestFixture::with_config(ProgressConfig {
        num_vcis: 4,
        direct_netmod: true,
        ..ProgressConfig::default()
    });

    fixture.engine.poke().unwrap();
    let mut guard = fixture.registry.lock(1);
    fixture.engine.test_one_context(&mut guard).unwrap();
    drop(guard);

    assert_eq!(fixture.netmod.invocations(), 5);
    assert_eq!(fixture.shm.invocations(), 0);
}

#[test]
fn work_queue_wait_is_one_poll_and_one_yield() {
    let fixture = TestFixture::with_config(ProgressConfig {
        num_vcis: 4,
        work_queues: true,
        ..ProgressConfig::default()
    });
    let mut state = ProgressState::new();
    fixture.engine.session_start(&mut state);

    fixture.engine.session_wait(&mut state).unwrap();

    let stats = fixture.engine.stats();
    assert_eq!(stats.driver_calls, 1);
    assert_eq!(stats.wait_yields, 1);
    assert_eq!(fixture.work_queue.calls(), 1);
    assert_eq!(fixture.netmod.polled_vcis(), vec![0, 1, 2, 3]);
    assert!(!state.progress_made());
}

#[test]
fn work_queue_is_driven_on_every_call() {
    let fixture = TestFixture::with_config(ProgressConfig {
        num_vcis: 1,
        work_queues: true,
        ..ProgressConfig::default()
    });

    for _ in 0..3 {
        fixture.engine.poke().unwrap();
    }

    assert_eq!(fixture.work_queue.calls(), 3);
}

#[test]
fn queue_is_ignored_outside_work_queue_mode() {
    let fixture = TestFixture::new(2);
    fixture.engine.poke().unwrap();
    assert_eq!(fixture.work_queue.calls(), 0);
}

#[test]
fn global_lock_wait_lets_other_threads_in_while_yielding() {
    init_logging();
    let fixture = TestFixture::with_config(ProgressConfig {
        num_vcis: 2,
        lock_granularity: LockGranularity::Global,
        ..ProgressConfig::default()
    });
    let mut state = ProgressState::new();
    fixture
        .engine
        .session_start_with(&mut state, ProgressFlags::ALL, &[1])
        .unwrap();
    let done = AtomicBool::new(false);

    crossbeam::scope(|s| {
        s.spawn(|_| {
            for _ in 0..20 {
                fixture.engine.poke().unwrap();
            }
            fixture.registry.record_progress(1);
            while !done.load(Ordering::Acquire) {
                fixture.engine.poke().unwrap();
            }
        });

        fixture.engine.session_wait(&mut state).unwrap();
        done.store(true, Ordering::Release);
    })
    .unwrap();

    assert!(state.progress_made());
    assert!(fixture.engine.stats().driver_calls > 20);
    assert!((0..2).all(|vci| !fixture.registry.is_locked(vci)));
}

#[test]
fn global_lock_helper_sweep_reenters_the_lock() {
    let fixture = TestFixture::with_config(ProgressConfig {
        num_vcis: 3,
        poll_mask: 0,
        lock_granularity: LockGranularity::Global,
        ..ProgressConfig::default()
    });
    let mut guard = fixture.registry.lock(0);

    fixture.engine.test_one_context(&mut guard).unwrap();

    assert_eq!(fixture.netmod.polled_vcis(), vec![0, 1, 2]);
    assert!(fixture.registry.is_locked(0));
}

#[test]
fn flag_subset_polls_only_named_sources() {
    let fixture = TestFixture::new(3);

    fixture
        .engine
        .progress_test_flags(ProgressFlags::HOOKS)
        .unwrap();
    assert_eq!(fixture.hooks.calls(), 1);
    assert_eq!(fixture.netmod.invocations(), 0);
    assert_eq!(fixture.shm.invocations(), 0);

    fixture
        .engine
        .progress_test_flags(ProgressFlags::NETMOD)
        .unwrap();
    assert_eq!(fixture.hooks.calls(), 1);
    assert_eq!(fixture.netmod.invocations(), 3);
    assert_eq!(fixture.shm.invocations(), 0);

    fixture.engine.progress_test_flags(ProgressFlags::SHM).unwrap();
    assert_eq!(fixture.netmod.invocations(), 3);
    assert_eq!(fixture.shm.invocations(), 3);
}
