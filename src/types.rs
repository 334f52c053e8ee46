use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Registry-assigned identity of a tracked process.
///
/// Ids come from a monotonically increasing counter and are never reused,
/// so they stay meaningful after the handle has been reaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub u64);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for ProcessId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(ProcessId)
            .map_err(|e| format!("invalid process id '{}': {}", s.trim(), e))
    }
}

/// Lifecycle state of a process handle.
///
/// Observed transitions are monotonic:
/// `Starting -> Running -> Terminating -> Exited`, or `Starting -> Failed`.
/// A running process may also exit on its own (`Running -> Exited`), and
/// the OS may stop reporting on a live child (`Running | Terminating -> Failed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessStatus {
    Starting,
    Running,
    Terminating,
    Exited,
    Failed,
}

impl ProcessStatus {
    /// Exited and Failed are terminal; nothing follows them.
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessStatus::Exited | ProcessStatus::Failed)
    }

    pub fn can_transition_to(self, next: ProcessStatus) -> bool {
        use ProcessStatus::*;
        matches!(
            (self, next),
            (Starting, Running)
                | (Starting, Failed)
                | (Running, Terminating)
                | (Running, Exited)
                | (Running, Failed)
                | (Terminating, Exited)
                | (Terminating, Failed)
        )
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessStatus::Starting => "starting",
            ProcessStatus::Running => "running",
            ProcessStatus::Terminating => "terminating",
            ProcessStatus::Exited => "exited",
            ProcessStatus::Failed => "failed",
        };
        f.pad(s)
    }
}

/// What happens to child stdout/stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Discard everything (default).
    Null,
    /// Share the terminal of the registry process.
    Inherit,
    /// Forward each line to `tracing`, tagged with the process id.
    Log,
}

impl Default for OutputMode {
    fn default() -> Self {
        OutputMode::Null
    }
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "null" => Ok(OutputMode::Null),
            "inherit" => Ok(OutputMode::Inherit),
            "log" => Ok(OutputMode::Log),
            other => Err(format!(
                "invalid output mode: {other} (expected \"null\", \"inherit\" or \"log\")"
            )),
        }
    }
}

/// What the registry does with live processes when it is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownPolicy {
    /// Send SIGTERM, wait for the grace period, then SIGKILL stragglers.
    Terminate,
    /// Stop tracking and leave the processes running.
    Detach,
}

impl Default for ShutdownPolicy {
    fn default() -> Self {
        ShutdownPolicy::Terminate
    }
}

impl FromStr for ShutdownPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "terminate" => Ok(ShutdownPolicy::Terminate),
            "detach" => Ok(ShutdownPolicy::Detach),
            other => Err(format!(
                "invalid shutdown policy: {other} (expected \"terminate\" or \"detach\")"
            )),
        }
    }
}
