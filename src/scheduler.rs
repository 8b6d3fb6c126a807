use std::future::Future;
use tokio::time::{interval, timeout, Duration, MissedTickBehavior};
use tracing::{info, warn};

use crate::alerting::MonitorService;

/// How long a check already in progress may keep running after shutdown.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Drives the monitor at a fixed cadence: one cycle immediately, then one per
/// period, until the shutdown future resolves.
pub struct Scheduler {
    period: Duration,
    shutdown_grace: Duration,
}

impl Scheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    pub fn every_minutes(minutes: u32) -> Self {
        Self::new(Duration::from_secs(u64::from(minutes) * 60))
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Returns the number of completed cycles. No new cycle starts once
    /// shutdown has resolved. A cycle in progress at that point gets
    /// `shutdown_grace` to finish and is dropped if it does not, so a hung
    /// query cannot keep the process alive. A cycle that outlasts the period
    /// pushes the next tick back instead of triggering a burst.
    pub async fn run<F>(&self, monitor: &mut MonitorService, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        info!(
            interval_seconds = self.period.as_secs(),
            "Monitor scheduler started."
        );
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut cycles = 0;
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!(cycles, "Shutdown signal received, stopping monitor.");
                    break;
                }
                _ = ticker.tick() => {}
            }

            let check = monitor.run_check();
            tokio::pin!(check);
            tokio::select! {
                biased;
                _ = &mut check => {
                    cycles += 1;
                }
                _ = &mut shutdown => {
                    info!(
                        grace_seconds = self.shutdown_grace.as_secs(),
                        "Shutdown signal received during a check, waiting for it to finish."
                    );
                    if timeout(self.shutdown_grace, check).await.is_ok() {
                        cycles += 1;
                    } else {
                        warn!("Check did not finish within the shutdown grace period, abandoning it.");
                    }
                    info!(cycles, "Monitor stopped.");
                    break;
                }
            }
        }
        cycles
    }
}
