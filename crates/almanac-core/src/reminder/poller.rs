//! Periodic driver for the firing coordinator.
//!
//! The poller runs one cycle immediately, then one cycle per interval. The
//! next wait starts only after the previous cycle has finished, so cycles
//! never overlap. Store access happens on tokio's blocking pool; only the
//! due batch travels back to the consumer, over an mpsc channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::clock::Clock;

use super::coordinator::ReminderCoordinator;
use super::rule::DueReminder;
use super::store::RuleStore;

/// Default interval between cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Capacity of the batch channel. A slow consumer back-pressures the loop.
const BATCH_CHANNEL_CAPACITY: usize = 16;

pub struct Poller;

/// Handle to a running poll loop.
pub struct PollerHandle {
    batches: mpsc::Receiver<Vec<DueReminder>>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Poller {
    /// Start polling on the current tokio runtime.
    pub fn spawn<S>(
        coordinator: Arc<ReminderCoordinator<S>>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> PollerHandle
    where
        S: RuleStore + 'static,
    {
        let (batch_tx, batch_rx) = mpsc::channel(BATCH_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(poll_loop(coordinator, clock, interval, batch_tx, shutdown_rx));

        PollerHandle {
            batches: batch_rx,
            shutdown: shutdown_tx,
            task,
        }
    }
}

impl PollerHandle {
    /// Next non-empty batch of due reminders. `None` once the loop has stopped.
    pub async fn recv(&mut self) -> Option<Vec<DueReminder>> {
        self.batches.recv().await
    }

    /// Stop after the cycle in progress (if any) and wait for the loop to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        drop(self.batches);
        if let Err(e) = self.task.await {
            error!(error = %e, "reminder poller task failed");
        }
    }
}

async fn poll_loop<S>(
    coordinator: Arc<ReminderCoordinator<S>>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    batches: mpsc::Sender<Vec<DueReminder>>,
    mut shutdown: watch::Receiver<bool>,
) where
    S: RuleStore + 'static,
{
    info!(interval_secs = interval.as_secs(), "reminder poller started");

    loop {
        let cycle_coordinator = Arc::clone(&coordinator);
        let cycle_clock = Arc::clone(&clock);
        let cycle = tokio::task::spawn_blocking(move || {
            cycle_coordinator.run_cycle(cycle_clock.now()).into_due()
        });

        match cycle.await {
            Ok(due) if !due.is_empty() => {
                if batches.send(due).await.is_err() {
                    debug!("batch receiver dropped, stopping poller");
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "reminder cycle panicked"),
        }

        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("reminder poller stopped");
}
