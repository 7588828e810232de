//! Periodic health-check scheduling, one independent task per record.

use async_trait::async_trait;
use futures::future::join_all;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::health::{HealthCheck, HealthChecker};

/// Work performed each time a record's check falls due.
#[async_trait]
pub trait CheckRunner: Clone + Send + Sync + 'static {
    /// Run one check. Returns whether it succeeded.
    async fn run(&self, check: &HealthCheck) -> bool;
}

#[async_trait]
impl CheckRunner for HealthChecker {
    async fn run(&self, check: &HealthCheck) -> bool {
        HealthChecker::run(self, check).await
    }
}

/// Drives each record's health check on its own interval.
///
/// Every record is checked once immediately, then every `interval`. Runs of
/// the same check never overlap: a tick that falls due while the previous
/// run is still going is skipped. A panicking run is logged and the record
/// keeps its schedule.
pub struct Scheduler<R = HealthChecker> {
    runner: R,
    checks: Vec<HealthCheck>,
}

impl<R: CheckRunner> Scheduler<R> {
    /// Create a scheduler that hands due checks to `runner`.
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            checks: Vec::new(),
        }
    }

    /// Add a check to the schedule.
    pub fn add(&mut self, check: HealthCheck) {
        self.checks.push(check);
    }

    /// Number of scheduled checks.
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// True if nothing is scheduled.
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Run all schedules until the token is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(checks = self.checks.len(), "Starting health check scheduler");

        let handles: Vec<_> = self
            .checks
            .into_iter()
            .map(|check| {
                let runner = self.runner.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(run_schedule(check, runner, shutdown))
            })
            .collect();

        for result in join_all(handles).await {
            if let Err(e) = result {
                error!("Health check schedule task failed: {}", e);
            }
        }

        debug!("health check scheduler stopped");
    }
}

async fn run_schedule<R: CheckRunner>(check: HealthCheck, runner: R, shutdown: CancellationToken) {
    let mut ticker = interval(check.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let run = tokio::spawn({
            let runner = runner.clone();
            let check = check.clone();
            async move { runner.run(&check).await }
        });
        let abort = run.abort_handle();

        tokio::select! {
            _ = shutdown.cancelled() => {
                abort.abort();
                return;
            }
            result = run => {
                if let Err(e) = result {
                    error!(
                        id = %check.id,
                        record = %check.label,
                        "Health check run failed: {}",
                        e
                    );
                }
            }
        }
    }
}
