// src/lib.rs

pub mod cli;
pub mod clock;
pub mod config;
pub mod console;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod registry;
pub mod supervisor;
pub mod types;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::{default_config_path, load_and_validate};
use crate::config::model::ConfigFile;
use crate::console::{parse_command, render_table, ConsoleCommand};
use crate::registry::ProcessRegistry;
use crate::supervisor::Supervisor;

pub use crate::clock::{clock_to_seconds, seconds_to_clock};
pub use crate::errors::{ProcregError, Result as ProcregResult};
pub use crate::exec::LaunchSpec;
pub use crate::registry::{ProcessSnapshot, RegistryOptions};
pub use crate::types::{ProcessId, ProcessStatus};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the registry and its supervisor loop
/// - the console front end (table on stdout, commands on stdin)
/// - Ctrl-C handling and registry teardown
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = if config_path.exists() {
        load_and_validate(&config_path)?
    } else if config_path == default_config_path() {
        info!(path = %config_path.display(), "no config file; starting with an empty registry");
        ConfigFile::default()
    } else {
        bail!("config file {} does not exist", config_path.display());
    };

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let registry = Arc::new(ProcessRegistry::new(cfg.registry_options()));

    for spec in cfg.processes() {
        match registry.start(spec.clone()) {
            Ok(id) => println!("started {} as id {id}", spec.executable),
            Err(e) => eprintln!("{e}"),
        }
    }

    let supervisor = Supervisor::spawn(Arc::clone(&registry), cfg.tick_interval);

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<ConsoleCommand>(16);
    spawn_stdin_reader(cmd_tx.clone());

    // Ctrl-C → graceful shutdown.
    {
        let tx = cmd_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(ConsoleCommand::Quit).await;
        });
    }
    drop(cmd_tx);

    let mut updates = registry.subscribe();
    let mut running = !(args.once && registry.is_empty());

    while running {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshots = updates.borrow_and_update().clone();
                print!("{}", render_table(&snapshots));
                if args.once && snapshots.is_empty() {
                    info!("all processes exited; leaving (--once)");
                    running = false;
                }
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(cmd) => running = handle_command(&registry, cmd),
                    None => running = false,
                }
            }
        }
    }

    supervisor.shutdown().await;

    let policy = cfg.shutdown;
    let reaped = registry.shutdown(policy).await;
    info!(?policy, count = reaped.len(), "registry shut down");

    Ok(())
}

/// Apply one console command. Returns `false` when the front end should exit.
fn handle_command(registry: &ProcessRegistry, cmd: ConsoleCommand) -> bool {
    debug!(?cmd, "console command");
    match cmd {
        ConsoleCommand::Start(spec) => match registry.start(spec) {
            Ok(id) => println!("started id {id}"),
            Err(e) => eprintln!("{e}"),
        },
        ConsoleCommand::Kill(id) => match registry.terminate(id) {
            Ok(()) => println!("sent SIGTERM to id {id}"),
            Err(e) => eprintln!("{e}"),
        },
        ConsoleCommand::List => {
            print!("{}", render_table(&registry.list()));
        }
        ConsoleCommand::Quit => return false,
    }
    true
}

/// Read console commands on a plain thread; blocking stdin reads would
/// otherwise hold up runtime shutdown.
fn spawn_stdin_reader(tx: mpsc::Sender<ConsoleCommand>) {
    let spawned = std::thread::Builder::new()
        .name("procreg-stdin".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                match parse_command(&line) {
                    Ok(Some(cmd)) => {
                        if tx.blocking_send(cmd).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(msg) => eprintln!("{msg}"),
                }
            }
        });

    if let Err(e) = spawned {
        warn!(error = %e, "could not start stdin reader; console commands disabled");
    }
}

/// Simple dry-run output: print registry settings and the launch plan.
fn print_dry_run(cfg: &ConfigFile) {
    let options = cfg.registry_options();

    println!("procreg dry-run");
    println!("  registry.tick_interval = {:?}", cfg.tick_interval);
    println!("  registry.force_kill_after = {:?}", options.force_kill_after);
    println!("  registry.output = {:?}", options.output);
    println!("  registry.history_limit = {}", options.history_limit);
    println!("  registry.shutdown = {:?}", cfg.shutdown);
    println!("  registry.shutdown_grace = {:?}", options.shutdown_grace);
    println!();

    println!("processes ({}):", cfg.processes().len());
    for spec in cfg.processes() {
        println!("  - {}", spec.executable);
        if !spec.args.is_empty() {
            println!("      args: {:?}", spec.args);
        }
        match spec.resolve() {
            Ok(resolved) => {
                println!("      program: {}", resolved.program.display());
                println!("      working_dir: {}", resolved.working_dir.display());
            }
            Err(e) => println!("      would fail: {e}"),
        }
    }

    debug!("dry-run complete (nothing started)");
}
