// src/supervisor.rs

//! The single periodic task that drives the registry clock.
//!
//! Handles never update themselves; once per period the supervisor calls
//! `ProcessRegistry::tick`, which advances elapsed time and reaps exits.
//! Ticks are scheduled against the previous *scheduled* instant
//! (`MissedTickBehavior::Burst`), so a slow tick makes the loop catch up
//! instead of drifting.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::registry::ProcessRegistry;

/// Default tick period.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);
/// Shortest period the loop accepts; shorter requests are raised to this.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Handle to a running supervisor loop.
///
/// Dropping it stops the loop; use [`Supervisor::shutdown`] to also wait
/// for the task to finish.
pub struct Supervisor {
    stop_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Supervisor {
    /// Spawn the loop on the current Tokio runtime.
    ///
    /// The first tick fires one `period` after this call. A `period` below
    /// [`MIN_TICK_INTERVAL`] (including zero) is raised to it.
    pub fn spawn(registry: Arc<ProcessRegistry>, period: Duration) -> Self {
        let period = if period < MIN_TICK_INTERVAL {
            warn!(requested_ms = period.as_millis() as u64, "tick period too short; using 1ms");
            MIN_TICK_INTERVAL
        } else {
            period
        };
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(run_supervisor_loop(registry, period, stop_rx));
        Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// Stop the loop and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "supervisor task ended abnormally");
            } else {
                info!("supervisor stopped");
            }
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
    }
}

async fn run_supervisor_loop(
    registry: Arc<ProcessRegistry>,
    period: Duration,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Burst);

    info!(period_ms = period.as_millis() as u64, "supervisor loop started");

    let mut ticks: u64 = 0;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                ticks += 1;
                let reaped = registry.tick();
                debug!(tick = ticks, reaped = reaped.len(), "supervisor tick");
            }
            _ = &mut stop_rx => {
                // Either an explicit stop or the Supervisor was dropped.
                break;
            }
        }
    }

    info!(ticks, "supervisor loop finished");
}
