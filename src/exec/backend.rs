// src/exec/backend.rs

//! Pluggable launcher abstraction.
//!
//! The registry talks to a `Launcher` instead of `tokio::process` directly.
//! This keeps the lifecycle bookkeeping testable with a fake launcher while
//! the production implementation lives in [`OsLauncher`].
//!
//! - `Launcher::launch` creates one OS process and hands back a
//!   `ChildProcess`.
//! - `ChildProcess` is the registry's only window onto that process: its pid,
//!   a non-blocking exit check, and signal delivery.

use std::process::Stdio;

use anyhow::Context;
use tokio::process::Command;
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::errors::{ProcregError, Result};
use crate::exec::launch::LaunchSpec;
use crate::exec::output::forward_output;
use crate::types::{OutputMode, ProcessId};

/// Termination signal requested by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// SIGTERM: ask the process to exit.
    Graceful,
    /// SIGKILL: used for escalation and shutdown stragglers.
    Force,
}

/// A spawned child the registry can observe and signal.
pub trait ChildProcess: Send {
    fn pid(&self) -> u32;

    /// Non-blocking exit check.
    ///
    /// Returns `Ok(Some(code))` once the process has exited. Death by signal
    /// `N` is reported as `128 + N`.
    fn try_wait(&mut self) -> std::io::Result<Option<i32>>;

    /// Deliver a termination signal. Does not wait for the process to exit.
    fn signal(&mut self, signal: StopSignal) -> anyhow::Result<()>;
}

/// Trait abstracting how processes are created.
///
/// Production code uses [`OsLauncher`]; tests can provide their own
/// implementation that doesn't spawn real processes.
pub trait Launcher: Send + Sync {
    /// Create the OS process for `spec`.
    ///
    /// Failures must be reported as `ProcregError::SpawnError`.
    fn launch(&self, id: ProcessId, spec: &LaunchSpec) -> Result<Box<dyn ChildProcess>>;
}

/// Real launcher backed by `tokio::process::Command`.
///
/// Child processes are registered with the Tokio runtime that was current
/// when the launcher was built, so `launch` may be called from any thread.
/// A launcher built outside a runtime uses whatever runtime is current at
/// launch time, and refuses to spawn when there is none.
#[derive(Debug, Clone, Default)]
pub struct OsLauncher {
    output: OutputMode,
    runtime: Option<Handle>,
}

impl OsLauncher {
    pub fn new(output: OutputMode) -> Self {
        Self {
            output,
            runtime: Handle::try_current().ok(),
        }
    }

    fn runtime(&self) -> Option<Handle> {
        self.runtime.clone().or_else(|| Handle::try_current().ok())
    }
}

impl Launcher for OsLauncher {
    fn launch(&self, id: ProcessId, spec: &LaunchSpec) -> Result<Box<dyn ChildProcess>> {
        let resolved = spec.resolve()?;
        let runtime = self.runtime().ok_or_else(|| {
            ProcregError::spawn(&spec.executable, "no Tokio runtime available to own the child")
        })?;
        let _entered = runtime.enter();

        info!(
            %id,
            program = %resolved.program.display(),
            args = ?spec.args,
            working_dir = %resolved.working_dir.display(),
            "spawning process"
        );

        let mut cmd = Command::new(&resolved.program);
        cmd.args(&spec.args)
            .current_dir(&resolved.working_dir)
            .stdin(Stdio::null());

        match self.output {
            OutputMode::Null => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
            OutputMode::Inherit => {
                cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
            OutputMode::Log => {
                cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| ProcregError::spawn(&spec.executable, e.to_string()))?;

        let pid = child.id().ok_or_else(|| {
            ProcregError::spawn(&spec.executable, "process exited before its pid was read")
        })?;

        if self.output == OutputMode::Log {
            forward_output(id, pid, child.stdout.take(), child.stderr.take());
        }

        debug!(%id, pid, "process spawned");
        Ok(Box::new(OsChild {
            child,
            pid,
            runtime: runtime.clone(),
        }))
    }
}

struct OsChild {
    child: tokio::process::Child,
    pid: u32,
    runtime: Handle,
}

impl ChildProcess for OsChild {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn try_wait(&mut self) -> std::io::Result<Option<i32>> {
        let _entered = self.runtime.enter();
        Ok(self.child.try_wait()?.map(exit_code_of))
    }

    fn signal(&mut self, signal: StopSignal) -> anyhow::Result<()> {
        let _entered = self.runtime.enter();
        send_signal(&mut self.child, self.pid, signal)
    }
}

#[cfg(unix)]
fn send_signal(_child: &mut tokio::process::Child, pid: u32, signal: StopSignal) -> anyhow::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let sig = match signal {
        StopSignal::Graceful => Signal::SIGTERM,
        StopSignal::Force => Signal::SIGKILL,
    };

    // The child has not been reaped yet, so its pid cannot have been recycled.
    kill(Pid::from_raw(pid as i32), sig).with_context(|| format!("sending {sig:?} to pid {pid}"))
}

#[cfg(not(unix))]
fn send_signal(child: &mut tokio::process::Child, pid: u32, signal: StopSignal) -> anyhow::Result<()> {
    // No graceful signal exists here; both requests end the process.
    let _ = signal;
    child
        .start_kill()
        .with_context(|| format!("killing pid {pid}"))
}

#[cfg(unix)]
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
