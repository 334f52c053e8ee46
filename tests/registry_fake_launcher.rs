// tests/registry_fake_launcher.rs

use std::collections::HashSet;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use procreg::errors::ProcregError;
use procreg::exec::{LaunchSpec, StopSignal};
use procreg::registry::{ProcessRegistry, RegistryOptions};
use procreg::types::{ProcessId, ProcessStatus, ShutdownPolicy};
use procreg_test_utils::fake_launcher::{FakeLauncher, SIGKILL_EXIT, SIGTERM_EXIT};
use procreg_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

fn registry_with(options: RegistryOptions) -> (Arc<ProcessRegistry>, FakeLauncher) {
    init_tracing();
    let launcher = FakeLauncher::new();
    let registry = ProcessRegistry::with_launcher(options, Box::new(launcher.clone()));
    (Arc::new(registry), launcher)
}

fn sleep_spec(secs: &str) -> LaunchSpec {
    LaunchSpec::new("sleep", [secs], "/tmp")
}

#[test]
fn start_tracks_running_process_with_zero_elapsed() -> TestResult {
    let (registry, launcher) = registry_with(RegistryOptions::default());

    let id = registry.start(sleep_spec("30"))?;

    let list = registry.list();
    assert_eq!(list.len(), 1);
    let snap = &list[0];
    assert_eq!(snap.id, id);
    assert_eq!(snap.status, ProcessStatus::Running);
    assert_eq!(snap.elapsed_seconds, 0);
    assert_eq!(snap.running_duration(), "0:00:00");
    assert!(snap.pid.is_some());
    assert!(snap.started_at.is_some());
    assert_eq!(snap.executable, "sleep");
    assert_eq!(snap.arguments, vec!["30".to_string()]);

    assert_eq!(launcher.launches().len(), 1);
    Ok(())
}

#[test]
fn each_tick_adds_one_second_to_running_processes() -> TestResult {
    let (registry, _launcher) = registry_with(RegistryOptions::default());
    let id = registry.start(sleep_spec("300"))?;

    for _ in 0..65 {
        assert!(registry.tick().is_empty());
    }

    let snap = registry.get(id)?;
    assert_eq!(snap.elapsed_seconds, 65);
    assert_eq!(snap.running_duration(), "0:01:05");
    Ok(())
}

#[test]
fn natural_exit_is_reaped_on_next_tick() -> TestResult {
    let (registry, launcher) = registry_with(RegistryOptions::default());
    let id = registry.start(sleep_spec("2"))?;

    registry.tick();
    registry.tick();
    launcher.finish(id, 0);

    let reaped = registry.tick();
    assert_eq!(reaped.len(), 1);
    assert_eq!(reaped[0].id, id);
    assert_eq!(reaped[0].status, ProcessStatus::Exited);
    assert_eq!(reaped[0].exit_code, Some(0));
    // The tick that observes the exit does not count another second.
    assert_eq!(reaped[0].elapsed_seconds, 2);

    assert!(registry.list().is_empty());
    assert_eq!(registry.get(id)?.exit_code, Some(0));
    Ok(())
}

#[test]
fn terminate_unknown_id_is_not_found_and_leaves_registry_alone() -> TestResult {
    let (registry, launcher) = registry_with(RegistryOptions::default());
    let id = registry.start(sleep_spec("30"))?;
    let before = registry.list();

    match registry.terminate(ProcessId(999)) {
        Err(ProcregError::ProcessNotFound(missing)) => assert_eq!(missing, ProcessId(999)),
        other => panic!("expected ProcessNotFound, got {other:?}"),
    }

    assert_eq!(registry.list(), before);
    assert!(launcher.signals(id).is_empty());
    Ok(())
}

#[test]
fn terminate_then_tick_reaps_with_sigterm_exit_code() -> TestResult {
    let (registry, launcher) = registry_with(RegistryOptions::default());
    let id = registry.start(sleep_spec("30"))?;

    registry.terminate(id)?;
    assert_eq!(registry.get(id)?.status, ProcessStatus::Terminating);
    assert_eq!(launcher.signals(id), vec![StopSignal::Graceful]);

    let reaped = registry.tick();
    assert_eq!(reaped.len(), 1);
    assert_eq!(reaped[0].status, ProcessStatus::Exited);
    assert_eq!(reaped[0].exit_code, Some(SIGTERM_EXIT));
    assert!(registry.is_empty());

    match registry.terminate(id) {
        Err(ProcregError::AlreadyExited(gone)) => assert_eq!(gone, id),
        other => panic!("expected AlreadyExited, got {other:?}"),
    }
    Ok(())
}

#[test]
fn failed_signal_keeps_status_and_reports_terminate_error() -> TestResult {
    let (registry, launcher) = registry_with(RegistryOptions::default());
    let id = registry.start(sleep_spec("30"))?;
    launcher.fail_signals(id, true);

    match registry.terminate(id) {
        Err(ProcregError::TerminateError { id: failed, reason }) => {
            assert_eq!(failed, id);
            assert!(reason.contains("EPERM"));
        }
        other => panic!("expected TerminateError, got {other:?}"),
    }
    assert_eq!(registry.get(id)?.status, ProcessStatus::Running);

    // A retry after the cause clears goes through.
    launcher.fail_signals(id, false);
    registry.terminate(id)?;
    assert_eq!(registry.get(id)?.status, ProcessStatus::Terminating);
    Ok(())
}

#[test]
fn process_ignoring_sigterm_stays_terminating_and_can_be_signalled_again() -> TestResult {
    let (registry, launcher) = registry_with(RegistryOptions::default());
    launcher.ignore_sigterm(true);
    let id = registry.start(sleep_spec("30"))?;

    registry.tick();
    registry.terminate(id)?;
    registry.tick();
    registry.tick();

    let snap = registry.get(id)?;
    assert_eq!(snap.status, ProcessStatus::Terminating);
    // Only time spent running is counted.
    assert_eq!(snap.elapsed_seconds, 1);

    registry.terminate(id)?;
    assert_eq!(
        launcher.signals(id),
        vec![StopSignal::Graceful, StopSignal::Graceful]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn escalates_to_sigkill_after_configured_delay() -> TestResult {
    let options = RegistryOptions {
        force_kill_after: Some(Duration::from_secs(5)),
        ..RegistryOptions::default()
    };
    let (registry, launcher) = registry_with(options);
    launcher.ignore_sigterm(true);
    let id = registry.start(sleep_spec("30"))?;

    registry.terminate(id)?;
    tokio::time::advance(Duration::from_secs(3)).await;
    assert!(registry.tick().is_empty());
    assert_eq!(launcher.signals(id), vec![StopSignal::Graceful]);

    tokio::time::advance(Duration::from_secs(3)).await;
    assert!(registry.tick().is_empty());
    assert_eq!(
        launcher.signals(id),
        vec![StopSignal::Graceful, StopSignal::Force]
    );

    let reaped = registry.tick();
    assert_eq!(reaped.len(), 1);
    assert_eq!(reaped[0].exit_code, Some(SIGKILL_EXIT));
    Ok(())
}

#[test]
fn spawn_failure_leaves_no_entry_and_ids_are_not_reused() -> TestResult {
    let (registry, launcher) = registry_with(RegistryOptions::default());
    launcher.fail_on("missing");

    let first = registry.start(sleep_spec("30"))?;
    let before = registry.list();

    match registry.start(LaunchSpec::new("missing", ["x"], "")) {
        Err(ProcregError::SpawnError { executable, .. }) => assert_eq!(executable, "missing"),
        other => panic!("expected SpawnError, got {other:?}"),
    }
    assert_eq!(registry.list(), before);

    let second = registry.start(sleep_spec("30"))?;
    assert!(second > first);
    // The failed attempt consumed an id of its own.
    assert_eq!(second.0, first.0 + 2);

    // That id never ran, so it is unknown rather than exited.
    let failed = ProcessId(first.0 + 1);
    assert!(matches!(
        registry.terminate(failed),
        Err(ProcregError::ProcessNotFound(_))
    ));
    assert!(matches!(
        registry.terminate(ProcessId(second.0 + 1)),
        Err(ProcregError::ProcessNotFound(_))
    ));
    Ok(())
}

#[test]
fn concurrent_starts_get_distinct_ids() -> TestResult {
    let (registry, _launcher) = registry_with(RegistryOptions::default());

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                (0..25)
                    .map(|_| registry.start(sleep_spec("30")).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for worker in workers {
        for id in worker.join().unwrap() {
            assert!(ids.insert(id), "duplicate id {id}");
        }
    }

    assert_eq!(ids.len(), 200);
    assert_eq!(registry.len(), 200);

    // List comes back in id order.
    let listed: Vec<ProcessId> = registry.list().iter().map(|s| s.id).collect();
    let mut sorted = listed.clone();
    sorted.sort();
    assert_eq!(listed, sorted);
    Ok(())
}

#[test]
fn list_length_is_starts_minus_reaped() -> TestResult {
    let (registry, launcher) = registry_with(RegistryOptions::default());
    let ids: Vec<ProcessId> = (0..5)
        .map(|_| registry.start(sleep_spec("30")))
        .collect::<Result<_, _>>()?;

    launcher.finish(ids[1], 0);
    launcher.finish(ids[3], 1);
    let reaped = registry.tick();

    assert_eq!(reaped.len(), 2);
    assert_eq!(registry.len(), 3);
    let remaining: Vec<ProcessId> = registry.list().iter().map(|s| s.id).collect();
    assert_eq!(remaining, vec![ids[0], ids[2], ids[4]]);
    Ok(())
}

#[test]
fn slow_spawn_shows_starting_and_does_not_block_other_ids() -> TestResult {
    let (registry, launcher) = registry_with(RegistryOptions::default());
    let running = registry.start(sleep_spec("30"))?;

    launcher.hold_launches();
    let starter = {
        let registry = Arc::clone(&registry);
        std::thread::spawn(move || registry.start(sleep_spec("60")))
    };

    // Wait for the placeholder to appear.
    let pending = loop {
        if let Some(snap) = registry.list().into_iter().find(|s| s.id != running) {
            break snap;
        }
        std::thread::yield_now();
    };
    assert_eq!(pending.status, ProcessStatus::Starting);
    assert_eq!(pending.pid, None);

    match registry.terminate(pending.id) {
        Err(ProcregError::TerminateError { id, .. }) => assert_eq!(id, pending.id),
        other => panic!("expected TerminateError, got {other:?}"),
    }

    // Other ids stay usable while the spawn is in flight.
    registry.terminate(running)?;
    registry.tick();
    assert_eq!(registry.get(running)?.status, ProcessStatus::Exited);
    assert_eq!(registry.get(pending.id)?.elapsed_seconds, 0);

    launcher.release_launches();
    let started = starter.join().unwrap()?;
    assert_eq!(started, pending.id);
    assert_eq!(registry.get(started)?.status, ProcessStatus::Running);
    Ok(())
}

#[test]
fn history_is_bounded_but_reaped_ids_stay_known() -> TestResult {
    let options = RegistryOptions {
        history_limit: 2,
        ..RegistryOptions::default()
    };
    let (registry, launcher) = registry_with(options);
    let ids: Vec<ProcessId> = (0..3)
        .map(|_| registry.start(sleep_spec("1")))
        .collect::<Result<_, _>>()?;
    for id in &ids {
        launcher.finish(*id, 0);
    }
    registry.tick();

    let history: Vec<ProcessId> = registry.history().iter().map(|s| s.id).collect();
    assert_eq!(history, vec![ids[1], ids[2]]);

    assert!(matches!(
        registry.get(ids[0]),
        Err(ProcregError::ProcessNotFound(_))
    ));
    assert!(matches!(
        registry.terminate(ids[0]),
        Err(ProcregError::AlreadyExited(_))
    ));
    Ok(())
}

#[test]
fn subscribers_see_every_change() -> TestResult {
    let (registry, launcher) = registry_with(RegistryOptions::default());
    let mut updates = registry.subscribe();

    let id = registry.start(sleep_spec("30"))?;
    assert!(updates.has_changed()?);
    assert_eq!(updates.borrow_and_update().len(), 1);

    registry.tick();
    assert!(updates.has_changed()?);
    assert_eq!(updates.borrow_and_update()[0].elapsed_seconds, 1);

    launcher.finish(id, 0);
    registry.tick();
    assert!(updates.borrow_and_update().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn shutdown_terminate_signals_everything_and_reaps() -> TestResult {
    let (registry, launcher) = registry_with(RegistryOptions::default());
    let a = registry.start(sleep_spec("30"))?;
    let b = registry.start(sleep_spec("30"))?;

    let reaped = registry.shutdown(ShutdownPolicy::Terminate).await;

    assert_eq!(reaped.len(), 2);
    assert!(reaped.iter().all(|s| s.exit_code == Some(SIGTERM_EXIT)));
    assert!(registry.is_empty());
    assert_eq!(launcher.signals(a), vec![StopSignal::Graceful]);
    assert_eq!(launcher.signals(b), vec![StopSignal::Graceful]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn shutdown_terminate_force_kills_after_grace() -> TestResult {
    let options = RegistryOptions {
        shutdown_grace: Duration::from_secs(1),
        ..RegistryOptions::default()
    };
    let (registry, launcher) = registry_with(options);
    launcher.ignore_sigterm(true);
    let id = registry.start(sleep_spec("30"))?;

    let reaped = registry.shutdown(ShutdownPolicy::Terminate).await;

    assert_eq!(reaped.len(), 1);
    assert_eq!(reaped[0].exit_code, Some(SIGKILL_EXIT));
    assert_eq!(launcher.signals(id).last(), Some(&StopSignal::Force));
    assert!(registry.is_empty());
    Ok(())
}

#[tokio::test]
async fn shutdown_detach_sends_no_signals() -> TestResult {
    let (registry, launcher) = registry_with(RegistryOptions::default());
    let id = registry.start(sleep_spec("30"))?;

    let detached = registry.shutdown(ShutdownPolicy::Detach).await;

    assert_eq!(detached.len(), 1);
    assert_eq!(detached[0].status, ProcessStatus::Running);
    assert!(launcher.signals(id).is_empty());
    assert!(registry.is_empty());
    assert!(matches!(
        registry.terminate(id),
        Err(ProcregError::ProcessNotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn detach_during_spawn_kills_the_orphaned_process() -> TestResult {
    let (registry, launcher) = registry_with(RegistryOptions::default());

    launcher.hold_launches();
    let starter = {
        let registry = Arc::clone(&registry);
        std::thread::spawn(move || registry.start(sleep_spec("60")))
    };
    let pending = loop {
        if let Some(snap) = registry.list().into_iter().next() {
            break snap;
        }
        std::thread::yield_now();
    };

    let detached = registry.shutdown(ShutdownPolicy::Detach).await;
    assert_eq!(detached.len(), 1);
    assert_eq!(detached[0].status, ProcessStatus::Starting);

    launcher.release_launches();
    match starter.join().unwrap() {
        Err(ProcregError::SpawnError { .. }) => {}
        other => panic!("expected SpawnError, got {other:?}"),
    }

    assert_eq!(launcher.signals(pending.id), vec![StopSignal::Force]);
    assert!(registry.is_empty());
    assert!(matches!(
        registry.get(pending.id),
        Err(ProcregError::ProcessNotFound(_))
    ));
    Ok(())
}

#[test]
fn latest_published_list_never_lags_behind_a_terminate() -> TestResult {
    for _ in 0..100 {
        let (registry, _launcher) = registry_with(RegistryOptions::default());
        let target = registry.start(sleep_spec("30"))?;
        let updates = registry.subscribe();

        let starters: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        registry.start(sleep_spec("30")).unwrap();
                    }
                })
            })
            .collect();
        let terminator = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || registry.terminate(target))
        };

        for starter in starters {
            starter.join().unwrap();
        }
        terminator.join().unwrap()?;

        let latest = updates.borrow().clone();
        assert_eq!(latest.len(), 81);
        let snap = latest
            .iter()
            .find(|s| s.id == target)
            .expect("target missing from published list");
        assert_eq!(snap.status, ProcessStatus::Terminating);
        assert_eq!(latest, registry.list());
    }
    Ok(())
}
