//! Fixed-interval driver for evaluation passes.

use crate::evaluator::Evaluator;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default interval between passes.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Runs one pass immediately, then one per tick, until cancelled.
///
/// Passes run inline on the scheduler task, so they never overlap. A pass
/// already in progress finishes before cancellation is observed.
pub struct Scheduler {
    evaluator: Arc<Evaluator>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(evaluator: Arc<Evaluator>, interval: Duration) -> Self {
        Self { evaluator, interval }
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!(interval = ?self.interval, "Scheduler started");

        let mut ticker = tokio::time::interval(self.interval);
        // A slow pass delays the next tick instead of bursting
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            debug!("Scheduler tick");
            self.evaluator.run_pass().await;
        }

        info!("Scheduler stopped");
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
