use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex};

use procreg::errors::{ProcregError, Result};
use procreg::exec::{ChildProcess, LaunchSpec, Launcher, StopSignal};
use procreg::types::ProcessId;

/// Exit code a fake child reports after SIGTERM.
pub const SIGTERM_EXIT: i32 = 128 + 15;
/// Exit code a fake child reports after SIGKILL.
pub const SIGKILL_EXIT: i32 = 128 + 9;

#[derive(Debug, Default)]
struct ChildState {
    exit: Option<i32>,
    signals: Vec<StopSignal>,
    ignore_sigterm: bool,
    fail_signals: bool,
}

#[derive(Default)]
struct LauncherState {
    next_pid: u32,
    launches: Vec<(ProcessId, LaunchSpec)>,
    children: HashMap<ProcessId, Arc<Mutex<ChildState>>>,
    fail_executables: HashSet<String>,
    ignore_sigterm: bool,
}

/// A launcher that spawns nothing.
///
/// - records every launch
/// - lets the test decide when each "process" exits
/// - models SIGTERM / SIGKILL as exits with `128 + signal`
/// - can hold launches mid-flight to observe the `Starting` state
#[derive(Clone, Default)]
pub struct FakeLauncher {
    state: Arc<Mutex<LauncherState>>,
    gate: Arc<(Mutex<bool>, Condvar)>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launches of this executable fail with `SpawnError`.
    pub fn fail_on(&self, executable: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_executables
            .insert(executable.to_string());
    }

    /// Children launched from now on ignore SIGTERM.
    pub fn ignore_sigterm(&self, ignore: bool) {
        self.state.lock().unwrap().ignore_sigterm = ignore;
    }

    /// Make the process with this id exit with `code`.
    pub fn finish(&self, id: ProcessId, code: i32) {
        let child = self.child(id);
        child.lock().unwrap().exit = Some(code);
    }

    /// Make signal delivery to this process fail.
    pub fn fail_signals(&self, id: ProcessId, fail: bool) {
        let child = self.child(id);
        child.lock().unwrap().fail_signals = fail;
    }

    /// Signals delivered to the process with this id.
    pub fn signals(&self, id: ProcessId) -> Vec<StopSignal> {
        self.child(id).lock().unwrap().signals.clone()
    }

    pub fn launches(&self) -> Vec<(ProcessId, LaunchSpec)> {
        self.state.lock().unwrap().launches.clone()
    }

    /// Block every subsequent `launch` until [`release_launches`] is called.
    ///
    /// [`release_launches`]: FakeLauncher::release_launches
    pub fn hold_launches(&self) {
        *self.gate.0.lock().unwrap() = true;
    }

    pub fn release_launches(&self) {
        let (held, cvar) = &*self.gate;
        *held.lock().unwrap() = false;
        cvar.notify_all();
    }

    fn child(&self, id: ProcessId) -> Arc<Mutex<ChildState>> {
        self.state
            .lock()
            .unwrap()
            .children
            .get(&id)
            .cloned()
            .unwrap_or_else(|| panic!("no fake child launched for id {id}"))
    }

    fn wait_for_gate(&self) {
        let (held, cvar) = &*self.gate;
        let mut guard = held.lock().unwrap();
        while *guard {
            guard = cvar.wait(guard).unwrap();
        }
    }
}

impl Launcher for FakeLauncher {
    fn launch(&self, id: ProcessId, spec: &LaunchSpec) -> Result<Box<dyn ChildProcess>> {
        self.wait_for_gate();

        let mut state = self.state.lock().unwrap();
        state.launches.push((id, spec.clone()));

        if state.fail_executables.contains(&spec.executable) {
            return Err(ProcregError::SpawnError {
                executable: spec.executable.clone(),
                reason: "fake launcher refused".to_string(),
            });
        }

        state.next_pid += 1;
        let pid = 10_000 + state.next_pid;
        let child = Arc::new(Mutex::new(ChildState {
            ignore_sigterm: state.ignore_sigterm,
            ..ChildState::default()
        }));
        state.children.insert(id, Arc::clone(&child));

        Ok(Box::new(FakeChild { pid, state: child }))
    }
}

struct FakeChild {
    pid: u32,
    state: Arc<Mutex<ChildState>>,
}

impl ChildProcess for FakeChild {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn try_wait(&mut self) -> std::io::Result<Option<i32>> {
        Ok(self.state.lock().unwrap().exit)
    }

    fn signal(&mut self, signal: StopSignal) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_signals {
            anyhow::bail!("EPERM: operation not permitted");
        }
        state.signals.push(signal);
        if state.exit.is_none() {
            match signal {
                StopSignal::Graceful if !state.ignore_sigterm => state.exit = Some(SIGTERM_EXIT),
                StopSignal::Graceful => {}
                StopSignal::Force => state.exit = Some(SIGKILL_EXIT),
            }
        }
        Ok(())
    }
}
