// src/exec/output.rs

//! Forwarding of child stdout/stderr into the log.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tracing::{debug, info};

use crate::types::ProcessId;

/// Spawn one reader task per piped stream.
///
/// Both streams are always drained to the end so the child never blocks on
/// a full pipe. Stdout lines are logged at info, stderr lines at debug.
pub fn forward_output(
    id: ProcessId,
    pid: u32,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
) {
    if let Some(stdout) = stdout {
        tokio::spawn(drain_lines(id, pid, "stdout", stdout));
    }
    if let Some(stderr) = stderr {
        tokio::spawn(drain_lines(id, pid, "stderr", stderr));
    }
}

async fn drain_lines<R>(id: ProcessId, pid: u32, stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if stream == "stdout" {
                    info!(%id, pid, stream, "{}", line);
                } else {
                    debug!(%id, pid, stream, "{}", line);
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!(%id, pid, stream, error = %e, "stopped reading child output");
                break;
            }
        }
    }
}
