//! Result aggregation and completion tracking
//!
//! Each report under generation owns a [`ReportSlot`]. Appends to one report
//! are serialized by the slot's own lock; different reports never contend.
//! The slot counts checks still outstanding and results announced versus
//! received, and the first append that balances the books publishes
//! [`ReportEvent::ChecksGathered`], exactly once.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info, warn};

use super::events::{EventBus, ReportEvent};
use super::model::{Report, ReportId, ReportResult};
use super::repository::ReportRepository;
use crate::checks::CheckDefinition;
use crate::error::{EngineError, EngineResult};
use crate::runner::CompletionSink;

#[derive(Debug, Clone, Copy, Default)]
struct Progress {
    /// Checks that have not announced their result count yet
    outstanding_checks: usize,
    /// Results announced so far
    expected: usize,
    /// Results appended so far
    received: usize,
}

impl Progress {
    fn is_complete(&self) -> bool {
        self.outstanding_checks == 0 && self.received == self.expected
    }
}

/// In-flight state of one report
#[derive(Debug)]
pub struct ReportSlot {
    id: ReportId,
    pub(crate) report: tokio::sync::Mutex<Report>,
    progress: Mutex<Progress>,
    gathered: AtomicBool,
    finalized: AtomicBool,
}

impl ReportSlot {
    fn new(report: Report, check_count: usize) -> Self {
        Self {
            id: report.id,
            report: tokio::sync::Mutex::new(report),
            progress: Mutex::new(Progress {
                outstanding_checks: check_count,
                ..Progress::default()
            }),
            gathered: AtomicBool::new(false),
            finalized: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ReportId {
        self.id
    }

    /// Copy of the report as currently accumulated
    pub async fn snapshot(&self) -> Report {
        self.report.lock().await.clone()
    }

    /// Every expected result has been appended
    pub fn is_gathered(&self) -> bool {
        self.gathered.load(Ordering::Acquire)
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    /// Apply `update` to the counters. True if this call completed the report.
    fn advance(&self, update: impl FnOnce(&mut Progress)) -> bool {
        let complete = {
            let mut progress = self.progress.lock().unwrap_or_else(PoisonError::into_inner);
            update(&mut progress);
            progress.is_complete()
        };
        complete && !self.gathered.swap(true, Ordering::AcqRel)
    }

    /// Claim the right to finalize. Only the first caller wins.
    pub(crate) fn begin_finalize(&self) -> bool {
        self.finalized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Collects results into their reports and detects completion
pub struct ReportAggregator {
    slots: RwLock<HashMap<ReportId, Arc<ReportSlot>>>,
    repository: Arc<dyn ReportRepository>,
    bus: EventBus,
}

impl std::fmt::Debug for ReportAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportAggregator")
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl ReportAggregator {
    pub fn new(repository: Arc<dyn ReportRepository>, bus: EventBus) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            repository,
            bus,
        }
    }

    /// Start tracking `report`, which will receive results from `check_count`
    /// checks. Returns `None` if the report is already being tracked.
    ///
    /// A report with no checks is gathered immediately.
    pub fn register(&self, report: Report, check_count: usize) -> Option<Arc<ReportSlot>> {
        let id = report.id;
        let slot = {
            let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
            if slots.contains_key(&id) {
                return None;
            }
            let slot = Arc::new(ReportSlot::new(report, check_count));
            slots.insert(id, Arc::clone(&slot));
            slot
        };

        debug!(report_id = %id, check_count, "Tracking report");
        if slot.advance(|_| {}) {
            self.publish_gathered(id);
        }
        Some(slot)
    }

    pub fn slot(&self, id: ReportId) -> Option<Arc<ReportSlot>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Stop tracking a report
    pub fn release(&self, id: ReportId) -> Option<Arc<ReportSlot>> {
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    /// Number of reports currently tracked
    pub fn in_flight(&self) -> usize {
        self.slots.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Record that a check finished and will deliver `result_count` results
    pub fn expect_results(&self, id: ReportId, result_count: usize) -> EngineResult<()> {
        let slot = self.slot(id).ok_or(EngineError::NotFound(id))?;
        let completed = slot.advance(|progress| {
            if progress.outstanding_checks == 0 {
                warn!(report_id = %id, "More checks completed than were registered");
            } else {
                progress.outstanding_checks -= 1;
            }
            progress.expected += result_count;
        });
        if completed {
            self.publish_gathered(id);
        }
        Ok(())
    }

    /// Append one result to its report and persist it.
    ///
    /// The result counts towards completion even when saving fails: it is held
    /// in memory and written with the finalized report.
    pub async fn append(&self, id: ReportId, result: ReportResult) -> EngineResult<()> {
        let slot = self.slot(id).ok_or(EngineError::NotFound(id))?;

        let saved = {
            let mut report = slot.report.lock().await;
            if !report.push_result(result) {
                warn!(report_id = %id, "Dropping result for an already generated report");
                return Ok(());
            }
            self.repository.save(&report).await
        };

        if slot.advance(|progress| progress.received += 1) {
            self.publish_gathered(id);
        }
        saved
    }

    fn publish_gathered(&self, id: ReportId) {
        info!(report_id = %id, "All results gathered");
        self.bus.publish(ReportEvent::ChecksGathered { report_id: id });
    }
}

#[async_trait]
impl CompletionSink for ReportAggregator {
    async fn check_completed(
        &self,
        report_id: ReportId,
        check: &CheckDefinition,
        result_count: usize,
    ) -> EngineResult<()> {
        debug!(%report_id, check = %check.name, result_count, "Check completed");
        self.expect_results(report_id, result_count)
    }

    async fn result_ready(&self, report_id: ReportId, result: ReportResult) -> EngineResult<()> {
        self.append(report_id, result).await
    }
}
