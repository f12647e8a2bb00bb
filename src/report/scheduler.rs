//! Periodic report generation

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info};

use super::orchestrator::ReportOrchestrator;

/// Generates a report every `interval`, first one interval after start
#[derive(Debug)]
pub struct ReportScheduler {
    orchestrator: Arc<ReportOrchestrator>,
    interval: Duration,
}

impl ReportScheduler {
    pub fn new(orchestrator: Arc<ReportOrchestrator>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
        }
    }

    /// Tick until `shutdown` resolves. Returns the number of reports created.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> usize {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(interval_secs = self.interval.as_secs(), "Report scheduler started");
        let mut created = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => match self.orchestrator.generate_report().await {
                    Ok(id) => {
                        created += 1;
                        info!(report_id = %id, "Scheduled report created");
                    }
                    Err(e) => error!("Scheduled report generation failed: {e}"),
                },
            }
        }

        info!(created, "Report scheduler stopped");
        created
    }
}
