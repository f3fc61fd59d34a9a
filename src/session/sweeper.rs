// Background sweep task

use super::issuer::SessionIssuer;
use crate::metrics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Run maintenance on a fixed interval until `shutdown` is cancelled.
/// Runs independently of request traffic.
pub fn spawn_sweeper(
    issuer: Arc<SessionIssuer>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Session sweeper started, interval {:?}", interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let started = Instant::now();
            match issuer.run_maintenance().await {
                Ok(report) => {
                    metrics::record_sweep(report.swept, started.elapsed().as_secs_f64());
                    debug!(
                        "Sweep removed {} sessions, {} index entries, {} rate windows, {} locks",
                        report.swept, report.reconciled, report.pruned_windows, report.pruned_locks
                    );
                }
                Err(e) => error!("Session sweep failed: {}", e),
            }
        }

        info!("Session sweeper stopped");
    })
}
