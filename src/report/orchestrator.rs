//! Wiring between report creation, check execution and finalization.
//!
//! ```text
//! generate_report ──> ReportCreated ──> runner ──> aggregator
//!                                                     │
//!                  ReportFinalized <── lifecycle <── ChecksGathered
//! ```
//!
//! The orchestrator reacts to its own events on a dispatcher task started by
//! [`ReportOrchestrator::start`]. Each reaction runs on its own task, so
//! several reports can be in flight at once.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::aggregator::ReportAggregator;
use super::events::{EventBus, ReportEvent};
use super::lifecycle::ReportLifecycle;
use super::model::{NewReport, Report, ReportId};
use super::repository::ReportRepository;
use crate::checks::Check;
use crate::datastore::DataStore;
use crate::error::{EngineError, EngineResult};
use crate::runner::{CheckRunner, CompletionSink};

pub struct ReportOrchestrator {
    repository: Arc<dyn ReportRepository>,
    store: Arc<dyn DataStore>,
    checks: Arc<[Check]>,
    runner: CheckRunner,
    aggregator: Arc<ReportAggregator>,
    lifecycle: ReportLifecycle,
    bus: EventBus,
    defaults: NewReport,
}

impl std::fmt::Debug for ReportOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportOrchestrator")
            .field("checks", &self.checks)
            .field("runner", &self.runner)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl ReportOrchestrator {
    pub fn new(
        repository: Arc<dyn ReportRepository>,
        store: Arc<dyn DataStore>,
        checks: Vec<Check>,
        runner: CheckRunner,
        bus: EventBus,
    ) -> Self {
        Self {
            aggregator: Arc::new(ReportAggregator::new(repository.clone(), bus.clone())),
            lifecycle: ReportLifecycle::new(repository.clone(), store.clone(), bus.clone()),
            repository,
            store,
            checks: checks.into(),
            runner,
            bus,
            defaults: NewReport::default(),
        }
    }

    /// Epsilon budget stamped on reports created by [`generate_report`](Self::generate_report)
    pub fn with_epsilon_budget(mut self, epsilon_budget: f64) -> Self {
        self.defaults.epsilon_budget = epsilon_budget;
        self
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    /// Create a GENERATING report and announce it.
    ///
    /// Returns as soon as the report exists; population and finalization
    /// happen asynchronously once [`start`](Self::start) is running.
    pub async fn generate_report(&self) -> EngineResult<ReportId> {
        self.create_report(self.defaults).await
    }

    /// Like [`generate_report`](Self::generate_report) with explicit parameters
    pub async fn create_report(&self, draft: NewReport) -> EngineResult<ReportId> {
        let report = self.repository.create(draft).await?;
        info!(report_id = %report.id, epsilon_budget = report.epsilon_budget, "Report created");
        self.bus.publish(ReportEvent::ReportCreated {
            report_id: report.id,
        });
        Ok(report.id)
    }

    pub async fn get_by_id(&self, id: ReportId) -> EngineResult<Report> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or(EngineError::NotFound(id))
    }

    /// All stored reports, ordered by id
    pub async fn list(&self) -> EngineResult<Vec<Report>> {
        self.repository.find_all().await
    }

    /// Generate a report and wait until it is GENERATED.
    ///
    /// Requires the dispatcher to be running. Gives up after `timeout`.
    pub async fn generate_and_wait(&self, timeout: Duration) -> EngineResult<Report> {
        // subscribe first so the finalization event cannot be missed
        let mut events = self.bus.subscribe();
        let id = self.generate_report().await?;

        let finalized = async {
            while let Some(event) = events.recv().await {
                if event == (ReportEvent::ReportFinalized { report_id: id }) {
                    return true;
                }
            }
            false
        };

        match tokio::time::timeout(timeout, finalized).await {
            Ok(true) => self.get_by_id(id).await,
            Ok(false) => Err(EngineError::Persistence(format!(
                "event bus closed before report {id} was finalized"
            ))),
            Err(_) => Err(EngineError::Persistence(format!(
                "report {id} was not finalized within {}s",
                timeout.as_secs_f64()
            ))),
        }
    }

    /// Start the dispatcher reacting to report events.
    ///
    /// The subscription is taken before this returns, so reports created
    /// afterwards are always picked up. Abort the handle to stop.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.bus.subscribe();
        let this = Arc::clone(self);

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                this.dispatch(event);
            }
            debug!("Report dispatcher stopped");
        })
    }

    fn dispatch(self: &Arc<Self>, event: ReportEvent) {
        match event {
            ReportEvent::ReportCreated { report_id } => {
                let this = Arc::clone(self);
                tokio::spawn(async move { this.populate(report_id).await });
            }
            ReportEvent::ChecksGathered { report_id } => {
                let this = Arc::clone(self);
                tokio::spawn(async move { this.finalize(report_id).await });
            }
            ReportEvent::ReportFinalized { .. } => {}
        }
    }

    /// Run every check against the data store and feed the aggregator
    async fn populate(&self, id: ReportId) {
        let report = match self.repository.find_by_id(id).await {
            Ok(Some(report)) => report,
            Ok(None) => {
                warn!(report_id = %id, "Created report vanished before it could be populated");
                return;
            }
            Err(e) => {
                error!(report_id = %id, "Cannot load report for population: {e}");
                return;
            }
        };

        if report.is_generated() {
            debug!(report_id = %id, "Report already generated, skipping");
            return;
        }

        if self.aggregator.register(report, self.checks.len()).is_none() {
            debug!(report_id = %id, "Report already in progress, skipping");
            return;
        }

        let sink: Arc<dyn CompletionSink> = self.aggregator.clone();
        self.runner
            .run(id, &self.checks, Arc::clone(&self.store), sink)
            .await;
    }

    async fn finalize(&self, id: ReportId) {
        let Some(slot) = self.aggregator.slot(id) else {
            debug!(report_id = %id, "No report in progress to finalize");
            return;
        };

        match self.lifecycle.finalize(&slot).await {
            Ok(true) => {
                self.aggregator.release(id);
            }
            Ok(false) => {}
            Err(e) => {
                // the report is complete in memory but its final state is lost
                error!(report_id = %id, "Finalized report could not be saved: {e}");
                self.aggregator.release(id);
            }
        }
    }
}
