// src/registry/handle.rs

//! One tracked process and the immutable snapshots handed to callers.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::clock::seconds_to_clock;
use crate::errors::{ProcregError, Result};
use crate::exec::{ChildProcess, LaunchSpec, StopSignal};
use crate::types::{ProcessId, ProcessStatus};

/// Exit code recorded when the OS stops reporting on a child.
pub const LOST_EXIT_CODE: i32 = -1;

/// Point-in-time copy of a process handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSnapshot {
    pub id: ProcessId,
    pub pid: Option<u32>,
    pub executable: String,
    pub arguments: Vec<String>,
    pub working_dir: PathBuf,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_seconds: u64,
    pub status: ProcessStatus,
    pub exit_code: Option<i32>,
}

impl ProcessSnapshot {
    /// Elapsed time as `H:MM:SS`.
    pub fn running_duration(&self) -> String {
        seconds_to_clock(self.elapsed_seconds)
    }
}

/// Result of polling a handle during a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollOutcome {
    Alive,
    Finished,
}

/// Registry-owned state for one process.
///
/// Only `ProcessRegistry` holds these, always behind a mutex.
pub(crate) struct ProcessHandle {
    id: ProcessId,
    pid: Option<u32>,
    spec: LaunchSpec,
    started_at: Option<DateTime<Utc>>,
    elapsed_seconds: u64,
    status: ProcessStatus,
    exit_code: Option<i32>,
    child: Option<Box<dyn ChildProcess>>,
    termination_requested_at: Option<Instant>,
    force_killed: bool,
}

impl ProcessHandle {
    /// Placeholder inserted while the OS spawn is in flight.
    pub(crate) fn starting(id: ProcessId, spec: LaunchSpec) -> Self {
        Self {
            id,
            pid: None,
            spec,
            started_at: None,
            elapsed_seconds: 0,
            status: ProcessStatus::Starting,
            exit_code: None,
            child: None,
            termination_requested_at: None,
            force_killed: false,
        }
    }

    pub(crate) fn status(&self) -> ProcessStatus {
        self.status
    }

    pub(crate) fn snapshot(&self) -> ProcessSnapshot {
        ProcessSnapshot {
            id: self.id,
            pid: self.pid,
            executable: self.spec.executable.clone(),
            arguments: self.spec.args.clone(),
            working_dir: self.spec.working_dir.clone(),
            started_at: self.started_at,
            elapsed_seconds: self.elapsed_seconds,
            status: self.status,
            exit_code: self.exit_code,
        }
    }

    /// Attach the spawned child and move to `Running`.
    pub(crate) fn mark_running(&mut self, child: Box<dyn ChildProcess>) {
        if !self.transition(ProcessStatus::Running) {
            return;
        }
        self.pid = Some(child.pid());
        self.started_at = Some(Utc::now());
        self.elapsed_seconds = 0;
        self.child = Some(child);
    }

    /// Send SIGTERM and move to `Terminating`.
    ///
    /// A second request on a `Terminating` handle re-sends the signal. On
    /// delivery failure the status is left untouched so the caller can retry.
    pub(crate) fn request_termination(&mut self) -> Result<()> {
        match self.status {
            ProcessStatus::Starting => Err(ProcregError::terminate(
                self.id,
                "process is still starting; no pid to signal yet",
            )),
            ProcessStatus::Exited | ProcessStatus::Failed => {
                Err(ProcregError::AlreadyExited(self.id))
            }
            ProcessStatus::Running | ProcessStatus::Terminating => {
                let child = self.child.as_mut().ok_or_else(|| {
                    ProcregError::terminate(self.id, "no child attached to handle")
                })?;
                child
                    .signal(StopSignal::Graceful)
                    .map_err(|e| ProcregError::terminate(self.id, format!("{e:#}")))?;

                if self.status == ProcessStatus::Running {
                    self.transition(ProcessStatus::Terminating);
                    self.termination_requested_at = Some(Instant::now());
                }
                Ok(())
            }
        }
    }

    /// Send SIGKILL without changing status; exit is confirmed by a later poll.
    pub(crate) fn force_kill(&mut self) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        match child.signal(StopSignal::Force) {
            Ok(()) => {
                self.force_killed = true;
                debug!(id = %self.id, pid = ?self.pid, "sent SIGKILL");
            }
            Err(e) => {
                warn!(id = %self.id, pid = ?self.pid, error = %format!("{e:#}"), "failed to force kill process");
            }
        }
    }

    /// Check for exit and, if `advance` is set, count one more second of
    /// runtime for a handle that is still `Running`.
    pub(crate) fn poll(&mut self, advance: bool, force_kill_after: Option<Duration>) -> PollOutcome {
        if self.status.is_terminal() {
            return PollOutcome::Finished;
        }
        let Some(child) = self.child.as_mut() else {
            // Still starting.
            return PollOutcome::Alive;
        };

        match child.try_wait() {
            Ok(Some(code)) => {
                self.transition(ProcessStatus::Exited);
                self.exit_code = Some(code);
                self.child = None;
                PollOutcome::Finished
            }
            Ok(None) => {
                if advance && self.status == ProcessStatus::Running {
                    self.elapsed_seconds += 1;
                }
                self.maybe_escalate(force_kill_after);
                PollOutcome::Alive
            }
            Err(e) => {
                warn!(
                    id = %self.id,
                    pid = ?self.pid,
                    error = %e,
                    "lost track of child process; killing it and marking failed"
                );
                self.force_kill();
                self.transition(ProcessStatus::Failed);
                self.exit_code = Some(LOST_EXIT_CODE);
                self.child = None;
                PollOutcome::Finished
            }
        }
    }

    fn maybe_escalate(&mut self, force_kill_after: Option<Duration>) {
        if self.status != ProcessStatus::Terminating || self.force_killed {
            return;
        }
        let (Some(after), Some(requested)) = (force_kill_after, self.termination_requested_at) else {
            return;
        };
        if requested.elapsed() >= after {
            warn!(
                id = %self.id,
                pid = ?self.pid,
                waited_ms = after.as_millis() as u64,
                "process ignored SIGTERM; escalating to SIGKILL"
            );
            self.force_kill();
        }
    }

    fn transition(&mut self, next: ProcessStatus) -> bool {
        if !self.status.can_transition_to(next) {
            warn!(
                id = %self.id,
                from = %self.status,
                to = %next,
                "ignoring invalid status transition"
            );
            return false;
        }
        debug!(id = %self.id, from = %self.status, to = %next, "status transition");
        self.status = next;
        true
    }
}
