// src/registry/mod.rs

//! The process lifecycle registry.
//!
//! `ProcessRegistry` exclusively owns every tracked process. All mutation
//! goes through its operations:
//!
//! - `start` inserts a `Starting` placeholder, spawns with no lock held, then
//!   promotes the handle to `Running` (or removes it on failure).
//! - `terminate` signals one handle and marks it `Terminating`.
//! - `tick` is driven by the supervisor; it advances elapsed time and reaps
//!   exited processes into a bounded history.
//!
//! Locking: the active set sits behind a reader/writer lock and every handle
//! behind its own mutex, always acquired in that order. Operations on
//! different ids only share the set read lock, so they run concurrently.
//! `tick` takes the set write lock so `list` never sees half a sweep.

pub mod handle;

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::errors::{ProcregError, Result};
use crate::exec::{LaunchSpec, Launcher, OsLauncher, StopSignal};
use crate::types::{OutputMode, ProcessId, ProcessStatus, ShutdownPolicy};

use self::handle::{PollOutcome, ProcessHandle};
pub use self::handle::{ProcessSnapshot, LOST_EXIT_CODE};

/// How often shutdown re-checks for exited processes.
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);
/// How long shutdown waits for SIGKILLed processes to be reaped.
const FORCE_KILL_WAIT: Duration = Duration::from_secs(2);

/// Tunables for a registry instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryOptions {
    /// Escalate from SIGTERM to SIGKILL after this long. `None` never escalates.
    pub force_kill_after: Option<Duration>,
    /// Number of reaped snapshots kept for `get` / `history`.
    pub history_limit: usize,
    /// How long `shutdown(Terminate)` waits before force killing.
    pub shutdown_grace: Duration,
    pub output: OutputMode,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            force_kill_after: None,
            history_limit: 64,
            shutdown_grace: Duration::from_secs(5),
            output: OutputMode::Null,
        }
    }
}

type SharedHandle = Arc<Mutex<ProcessHandle>>;

struct ActiveSet {
    next_id: u64,
    // Ids are allocated under the write lock, so key order is insertion order.
    handles: BTreeMap<ProcessId, SharedHandle>,
    // Issued ids that never ran or were handed off: failed spawns and
    // detached processes. Every other issued id that is no longer in
    // `handles` has been reaped.
    untracked: HashSet<ProcessId>,
}

impl ActiveSet {
    fn was_reaped(&self, id: ProcessId) -> bool {
        id.0 < self.next_id && !self.handles.contains_key(&id) && !self.untracked.contains(&id)
    }
}

struct History {
    limit: usize,
    entries: VecDeque<ProcessSnapshot>,
}

impl History {
    fn record(&mut self, snapshot: ProcessSnapshot) {
        if self.limit == 0 {
            return;
        }
        while self.entries.len() >= self.limit {
            self.entries.pop_front();
        }
        self.entries.push_back(snapshot);
    }

    fn find(&self, id: ProcessId) -> Option<&ProcessSnapshot> {
        self.entries.iter().find(|s| s.id == id)
    }
}

pub struct ProcessRegistry {
    launcher: Box<dyn Launcher>,
    options: RegistryOptions,
    active: RwLock<ActiveSet>,
    history: Mutex<History>,
    updates: watch::Sender<Vec<ProcessSnapshot>>,
    // Serialises building and sending a snapshot list, so an older list
    // can never overwrite a newer one.
    publish_lock: Mutex<()>,
}

impl std::fmt::Debug for ProcessRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessRegistry")
            .field("options", &self.options)
            .field("active", &self.len())
            .finish_non_exhaustive()
    }
}

impl ProcessRegistry {
    /// Registry that spawns real OS processes.
    ///
    /// Build it inside a Tokio runtime; children are then owned by that
    /// runtime whichever thread calls `start`. Without a runtime every
    /// `start` fails with `SpawnError`.
    pub fn new(options: RegistryOptions) -> Self {
        let launcher = OsLauncher::new(options.output);
        Self::with_launcher(options, Box::new(launcher))
    }

    pub fn with_launcher(options: RegistryOptions, launcher: Box<dyn Launcher>) -> Self {
        let (updates, _) = watch::channel(Vec::new());
        let history = History {
            limit: options.history_limit,
            entries: VecDeque::new(),
        };
        Self {
            launcher,
            options,
            active: RwLock::new(ActiveSet {
                next_id: 1,
                handles: BTreeMap::new(),
                untracked: HashSet::new(),
            }),
            history: Mutex::new(history),
            updates,
            publish_lock: Mutex::new(()),
        }
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    /// Start a process and begin tracking it.
    ///
    /// On success the handle is `Running` with zero elapsed time. On failure
    /// a `SpawnError` is returned and nothing is left in the registry; the
    /// id consumed by the attempt is not handed out again.
    pub fn start(&self, spec: LaunchSpec) -> Result<ProcessId> {
        let (id, handle) = {
            let mut active = self.active.write();
            let id = ProcessId(active.next_id);
            active.next_id += 1;
            let handle = Arc::new(Mutex::new(ProcessHandle::starting(id, spec.clone())));
            active.handles.insert(id, Arc::clone(&handle));
            (id, handle)
        };

        // No registry lock is held while the OS creates the process.
        match self.launcher.launch(id, &spec) {
            Ok(mut child) => {
                let pid = child.pid();
                {
                    let active = self.active.read();
                    if !active.handles.contains_key(&id) {
                        // Detached by shutdown mid-spawn; nobody can reach
                        // this process any more.
                        drop(active);
                        warn!(%id, pid, "registry shut down during spawn; killing new process");
                        if let Err(e) = child.signal(StopSignal::Force) {
                            warn!(%id, pid, error = %format!("{e:#}"), "failed to kill orphaned process");
                        }
                        return Err(ProcregError::spawn(
                            &spec.executable,
                            "registry was shut down while the process was starting",
                        ));
                    }
                    handle.lock().mark_running(child);
                }
                info!(%id, pid, executable = %spec.executable, "process started");
                self.publish();
                Ok(id)
            }
            Err(err) => {
                {
                    let mut active = self.active.write();
                    active.handles.remove(&id);
                    active.untracked.insert(id);
                }
                warn!(%id, executable = %spec.executable, error = %err, "process failed to start");
                Err(err)
            }
        }
    }

    /// Snapshot of every tracked process, in insertion order.
    pub fn list(&self) -> Vec<ProcessSnapshot> {
        let active = self.active.read();
        active
            .handles
            .values()
            .map(|handle| handle.lock().snapshot())
            .collect()
    }

    /// Snapshot of one process, live or recently reaped.
    pub fn get(&self, id: ProcessId) -> Result<ProcessSnapshot> {
        let active = self.active.read();
        if let Some(handle) = active.handles.get(&id) {
            return Ok(handle.lock().snapshot());
        }
        self.history
            .lock()
            .find(id)
            .cloned()
            .ok_or(ProcregError::ProcessNotFound(id))
    }

    /// Ask a process to exit with SIGTERM. Returns without waiting.
    ///
    /// The handle becomes `Exited` once a later `tick` confirms the exit.
    pub fn terminate(&self, id: ProcessId) -> Result<()> {
        {
            let active = self.active.read();
            let Some(handle) = active.handles.get(&id) else {
                return if active.was_reaped(id) {
                    Err(ProcregError::AlreadyExited(id))
                } else {
                    Err(ProcregError::ProcessNotFound(id))
                };
            };

            let mut handle = handle.lock();
            handle.request_termination()?;
            info!(%id, pid = ?handle.snapshot().pid, "sent SIGTERM");
        }

        self.publish();
        Ok(())
    }

    /// Advance every running process by one second and reap exits.
    ///
    /// Returns the final snapshots of processes reaped by this tick.
    pub fn tick(&self) -> Vec<ProcessSnapshot> {
        self.sweep(true)
    }

    /// Receiver that sees the full snapshot list after every change.
    pub fn subscribe(&self) -> watch::Receiver<Vec<ProcessSnapshot>> {
        self.updates.subscribe()
    }

    /// Reaped processes, oldest first.
    pub fn history(&self) -> Vec<ProcessSnapshot> {
        self.history.lock().entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.active.read().handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tear the registry down.
    ///
    /// - `Terminate`: SIGTERM everything, reap until the grace period runs
    ///   out, then SIGKILL what is left. Returns every snapshot reaped here.
    /// - `Detach`: stop tracking without signalling; processes keep running.
    ///   Returns the last snapshot of each detached process.
    pub async fn shutdown(&self, policy: ShutdownPolicy) -> Vec<ProcessSnapshot> {
        match policy {
            ShutdownPolicy::Detach => self.detach_all(),
            ShutdownPolicy::Terminate => self.terminate_all().await,
        }
    }

    fn detach_all(&self) -> Vec<ProcessSnapshot> {
        let drained = {
            let mut active = self.active.write();
            let drained = std::mem::take(&mut active.handles);
            active.untracked.extend(drained.keys().copied());
            drained
        };
        let snapshots: Vec<ProcessSnapshot> = drained
            .values()
            .map(|handle| handle.lock().snapshot())
            .collect();

        for snap in &snapshots {
            info!(id = %snap.id, pid = ?snap.pid, "detached process");
        }
        self.publish();
        snapshots
    }

    async fn terminate_all(&self) -> Vec<ProcessSnapshot> {
        let mut reaped = Vec::new();
        let grace_deadline = Instant::now() + self.options.shutdown_grace;

        info!(count = self.len(), "shutting down registry");

        loop {
            // Re-run each round: handles that were still starting get signalled
            // once they are running.
            self.signal_running();
            reaped.extend(self.sweep(false));
            if self.is_empty() {
                return reaped;
            }
            if Instant::now() >= grace_deadline {
                break;
            }
            sleep(SHUTDOWN_POLL).await;
        }

        warn!(
            remaining = self.len(),
            "shutdown grace period expired; sending SIGKILL"
        );
        {
            let active = self.active.read();
            for handle in active.handles.values() {
                handle.lock().force_kill();
            }
        }

        let kill_deadline = Instant::now() + FORCE_KILL_WAIT;
        loop {
            reaped.extend(self.sweep(false));
            if self.is_empty() {
                break;
            }
            if Instant::now() >= kill_deadline {
                let left: Vec<ProcessId> = self.active.read().handles.keys().copied().collect();
                error!(?left, "processes still alive after SIGKILL; leaving them tracked");
                break;
            }
            sleep(SHUTDOWN_POLL).await;
        }

        reaped
    }

    fn signal_running(&self) {
        let active = self.active.read();
        for (id, handle) in active.handles.iter() {
            let mut handle = handle.lock();
            if handle.status() != ProcessStatus::Running {
                continue;
            }
            if let Err(e) = handle.request_termination() {
                warn!(%id, error = %e, "failed to signal process during shutdown");
            }
        }
    }

    /// Poll every handle; with `advance`, running handles gain one second.
    fn sweep(&self, advance: bool) -> Vec<ProcessSnapshot> {
        let reaped = {
            let mut active = self.active.write();

            let finished: Vec<ProcessId> = active
                .handles
                .iter()
                .filter_map(|(id, handle)| {
                    let outcome = handle.lock().poll(advance, self.options.force_kill_after);
                    (outcome == PollOutcome::Finished).then_some(*id)
                })
                .collect();

            // Record history before releasing the set lock so a concurrent
            // get sees the id either live or in history, never missing.
            let mut history = self.history.lock();
            let mut reaped = Vec::with_capacity(finished.len());
            for id in finished {
                if let Some(handle) = active.handles.remove(&id) {
                    let snapshot = handle.lock().snapshot();
                    history.record(snapshot.clone());
                    reaped.push(snapshot);
                }
            }
            reaped
        };

        for snap in &reaped {
            info!(
                id = %snap.id,
                pid = ?snap.pid,
                status = %snap.status,
                exit_code = ?snap.exit_code,
                elapsed = %snap.running_duration(),
                "process reaped"
            );
        }
        debug!(advance, reaped = reaped.len(), "registry sweep complete");

        self.publish();
        reaped
    }

    fn publish(&self) {
        let _ordered = self.publish_lock.lock();
        self.updates.send_replace(self.list());
    }
}
