//! Periodic assessment of the configured default tenant.

use std::time::Duration;

use cadence_core::health::{BatchRunOptions, HealthAssessmentJob, StopSignal};
use cadence_db::SqlCustomerHealthRepository;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::bootstrap::Application;

pub struct SweepHandle {
    stop: StopSignal,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweepHandle {
    /// Stops the sweep between chunks and waits up to `grace` for the
    /// in-flight run to persist what it has.
    pub async fn shutdown(self, grace: Duration) {
        self.stop.stop();
        let _ = self.shutdown.send(true);
        match time::timeout(grace, self.task).await {
            Ok(_) => info!(
                event_name = "server.sweep.stopped",
                correlation_id = "shutdown",
                "assessment sweep stopped"
            ),
            Err(_) => warn!(
                event_name = "server.sweep.shutdown_timeout",
                correlation_id = "shutdown",
                grace_secs = grace.as_secs(),
                "assessment sweep did not stop within the grace period"
            ),
        }
    }
}

/// Runs one assessment immediately and then every `every`.
pub fn spawn(app: &Application, every: Duration) -> SweepHandle {
    let job = HealthAssessmentJob::new(
        SqlCustomerHealthRepository::new(app.db_pool.clone()),
        app.resolver.clone(),
    );
    let options: BatchRunOptions =
        app.config.assessment.batch_options(app.config.assessment.default_selector());
    let stop = StopSignal::new();
    let (shutdown, mut shutdown_rx) = watch::channel(false);

    info!(
        event_name = "server.sweep.start",
        correlation_id = "sweep",
        tenant = %options.tenant,
        interval_secs = every.as_secs(),
        "assessment sweep scheduled"
    );

    let task = {
        let stop = stop.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown_rx.changed() => break,
                }
                if stop.is_stopped() {
                    break;
                }
                if let Err(failure) = job.run(&options, Utc::now(), &stop).await {
                    error!(
                        event_name = "server.sweep.failed",
                        correlation_id = "sweep",
                        tenant = %options.tenant,
                        error = %failure,
                        "scheduled assessment failed"
                    );
                }
            }
        })
    };

    SweepHandle { stop, shutdown, task }
}
