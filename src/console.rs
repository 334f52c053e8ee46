// src/console.rs

//! Plain-text front end: the process table and the stdin command language.
//!
//! Commands, one per line:
//!
//! ```text
//! start <working_dir> <executable> [args...]
//! kill <id>
//! list
//! quit
//! ```
//!
//! Words are split with shell quoting rules, so `start . echo "a b"` passes
//! a single argument.

use std::fmt::Write as _;

use crate::exec::LaunchSpec;
use crate::registry::ProcessSnapshot;
use crate::types::ProcessId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start(LaunchSpec),
    Kill(ProcessId),
    List,
    Quit,
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let words = shell_words::split(line).map_err(|e| format!("cannot parse '{line}': {e}"))?;
    let Some((verb, rest)) = words.split_first() else {
        return Ok(None);
    };

    let command = match verb.as_str() {
        "start" => {
            let [dir, exe, args @ ..] = rest else {
                return Err("usage: start <working_dir> <executable> [args...]".to_string());
            };
            ConsoleCommand::Start(LaunchSpec::new(exe.as_str(), args.iter().cloned(), dir.as_str()))
        }
        "kill" => match rest {
            [id] => ConsoleCommand::Kill(id.parse()?),
            _ => return Err("usage: kill <id>".to_string()),
        },
        "list" | "ls" => ConsoleCommand::List,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(format!("unknown command '{other}' (start, kill, list, quit)")),
    };

    Ok(Some(command))
}

/// Render snapshots as a fixed-width table.
pub fn render_table(snapshots: &[ProcessSnapshot]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<5} {:<8} {:<12} {:<10} {:<20} {}",
        "ID", "PID", "STATUS", "DURATION", "EXEC NAME", "ARGUMENTS"
    );

    for snap in snapshots {
        let pid = snap.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());
        let status = match snap.exit_code {
            Some(code) => format!("{}({})", snap.status, code),
            None => snap.status.to_string(),
        };
        let _ = writeln!(
            out,
            "{:<5} {:<8} {:<12} {:<10} {:<20} {}",
            snap.id,
            pid,
            status,
            snap.running_duration(),
            snap.executable,
            shell_words::join(&snap.arguments)
        );
    }

    out
}
