//! GENERATING -> GENERATED transition

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::aggregator::ReportSlot;
use super::events::{EventBus, ReportEvent};
use super::repository::ReportRepository;
use crate::datastore::{DataStore, POPULATION_RESOURCE};
use crate::error::EngineResult;

/// Finalizes gathered reports
pub struct ReportLifecycle {
    repository: Arc<dyn ReportRepository>,
    store: Arc<dyn DataStore>,
    bus: EventBus,
}

impl ReportLifecycle {
    pub fn new(repository: Arc<dyn ReportRepository>, store: Arc<dyn DataStore>, bus: EventBus) -> Self {
        Self {
            repository,
            store,
            bus,
        }
    }

    /// Stamp the population size, mark the report GENERATED, persist it and
    /// publish [`ReportEvent::ReportFinalized`].
    ///
    /// Returns `Ok(false)` without side effects when the report is not
    /// gathered yet or another caller already finalized it. A failing
    /// population count is recorded as 0 and does not block finalization.
    ///
    /// # Errors
    ///
    /// [`EngineError::Persistence`](crate::error::EngineError::Persistence)
    /// when the finalized report cannot be saved. The report stays GENERATED
    /// in memory but no event is published.
    pub async fn finalize(&self, slot: &ReportSlot) -> EngineResult<bool> {
        let id = slot.id();
        if !slot.is_gathered() {
            debug!(report_id = %id, "Finalize requested before all results arrived");
            return Ok(false);
        }
        if !slot.begin_finalize() {
            debug!(report_id = %id, "Report already finalized");
            return Ok(false);
        }

        let entities = match self.store.count_resources(POPULATION_RESOURCE).await {
            Ok(count) => count,
            Err(e) => {
                warn!(report_id = %id, "Population count failed, recording 0: {e:#}");
                0
            }
        };

        {
            let mut report = slot.report.lock().await;
            if !report.mark_generated(entities) {
                return Ok(false);
            }
            self.repository.save(&report).await?;
        }

        info!(report_id = %id, number_of_entities = entities, "Report finalized");
        self.bus.publish(ReportEvent::ReportFinalized { report_id: id });
        Ok(true)
    }
}
