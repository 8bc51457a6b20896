use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::service::WaitlistService;

/// What one sweep tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub trips_scanned: usize,
    pub turns_expired: usize,
    pub turns_granted: usize,
    pub failures: usize,
}

/// Periodically expires overdue turns and hands them to the next in line.
pub struct ExpirySweeper {
    service: Arc<WaitlistService>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(service: Arc<WaitlistService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    /// One pass over every trip with an overdue turn. A trip that fails is
    /// logged and counted; the rest are still processed.
    pub async fn sweep_once(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let now = self.service.now();

        let trips = match self.service.repository().trips_with_expired_turns(now).await {
            Ok(trips) => trips,
            Err(e) => {
                error!("Sweep could not list trips with expired turns: {}", e);
                report.failures += 1;
                return report;
            }
        };

        for trip_id in trips {
            report.trips_scanned += 1;
            match self.service.expire_turns(trip_id).await {
                Ok(outcome) => {
                    report.turns_expired += outcome.expired;
                    if outcome.granted {
                        report.turns_granted += 1;
                    }
                }
                Err(e) => {
                    error!("Sweep failed for trip {}: {}", trip_id, e);
                    report.failures += 1;
                }
            }
        }

        report
    }

    /// Tick until `shutdown` flips to true or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Expiry sweeper started, interval {:?}", self.interval);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            let report = self.sweep_once().await;
            if report.trips_scanned > 0 || report.failures > 0 {
                info!(
                    "Sweep: {} trips, {} turns expired, {} granted, {} failures",
                    report.trips_scanned,
                    report.turns_expired,
                    report.turns_granted,
                    report.failures
                );
            } else {
                debug!("Sweep: nothing to do");
            }
        }

        info!("Expiry sweeper stopped");
    }

    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(self.run(shutdown_rx));
        SweeperHandle { shutdown_tx, join }
    }
}

/// Dropping the handle also stops the sweeper.
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn request_shutdown(&self) {
        // receiver may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }
}
