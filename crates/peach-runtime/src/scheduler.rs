//! [`MaintenanceScheduler`] – background decay and rehearsal.
//!
//! A tokio interval task that hands each pass to the blocking pool, so
//! SQLite work never stalls the async executor.  Stopping is cooperative:
//! the stop signal is only observed between passes, and a pass already in
//! flight always runs to completion.

use std::time::Duration;

use peach_memory::MaintenanceHandle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Ticks between rehearsal passes when the caller has no preference.
pub const DEFAULT_REHEARSAL_EVERY: u64 = 60;

/// Running totals returned on shutdown.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SchedulerTotals {
    pub passes: u64,
    pub evicted: usize,
    pub rehearsals: u64,
}

pub struct MaintenanceScheduler {
    stop: watch::Sender<bool>,
    task: JoinHandle<SchedulerTotals>,
}

impl MaintenanceScheduler {
    /// Start decaying every `period`, rehearsing every `rehearse_every`
    /// ticks (`0` disables rehearsal).  Must be called inside a tokio
    /// runtime.
    pub fn spawn(handle: MaintenanceHandle, period: Duration, rehearse_every: u64) -> Self {
        let (stop, stop_rx) = watch::channel(false);
        info!(period_secs = period.as_secs_f64(), rehearse_every, "maintenance scheduler started");
        let task = tokio::spawn(run(handle, period, rehearse_every, stop_rx));
        Self { stop, task }
    }

    /// Signal the task to stop and wait for the in-flight pass to finish.
    pub async fn shutdown(self) -> SchedulerTotals {
        // A send error means the task already exited.
        let _ = self.stop.send(true);
        match self.task.await {
            Ok(totals) => totals,
            Err(e) => {
                error!(error = %e, "maintenance task ended abnormally");
                SchedulerTotals::default()
            }
        }
    }
}

async fn run(
    handle: MaintenanceHandle,
    period: Duration,
    rehearse_every: u64,
    mut stop: watch::Receiver<bool>,
) -> SchedulerTotals {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    interval.tick().await;

    let mut totals = SchedulerTotals::default();
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
                continue;
            }
        }

        totals.passes += 1;
        let rehearse = rehearse_every > 0 && totals.passes % rehearse_every == 0;
        let worker = handle.clone();
        let pass = tokio::task::spawn_blocking(move || {
            let report = worker.run_once();
            let rehearsed = rehearse.then(|| worker.rehearse());
            (report, rehearsed)
        })
        .await;

        match pass {
            Ok((report, rehearsed)) => {
                totals.evicted += report.evicted;
                match rehearsed {
                    Some(Ok(touched)) => {
                        totals.rehearsals += 1;
                        debug!(touched, "rehearsal pass complete");
                    }
                    Some(Err(e)) => warn!(error = %e, "rehearsal pass failed"),
                    None => {}
                }
            }
            Err(e) => error!(error = %e, "maintenance pass panicked"),
        }
    }

    info!(passes = totals.passes, evicted = totals.evicted, "maintenance scheduler stopped");
    totals
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
