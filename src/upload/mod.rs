//! Hand-off of finalized reports
//!
//! A [`ReportUploadListener`] follows the event bus and passes every finalized
//! report, as a [`ReportDto`], to its [`ReportSender`]s. Delivery failures are
//! logged and never affect the stored report.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::report::{EventBus, ReportDto, ReportEvent, ReportId, ReportRepository};

#[async_trait]
pub trait ReportSender: Send + Sync {
    /// Short label used in logs
    fn name(&self) -> &str;

    async fn send_report(&self, report: &ReportDto) -> Result<()>;
}

/// Writes each report as `report-<id>.json` into a local outbox directory
#[derive(Debug, Clone)]
pub struct OutboxSender {
    dir: PathBuf,
}

impl OutboxSender {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: ReportId) -> PathBuf {
        self.dir.join(format!("report-{id}.json"))
    }
}

#[async_trait]
impl ReportSender for OutboxSender {
    fn name(&self) -> &str {
        "outbox"
    }

    async fn send_report(&self, report: &ReportDto) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create outbox {}", self.dir.display()))?;

        let path = self.path_for(report.id);
        let json = serde_json::to_vec_pretty(report)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        debug!(report_id = %report.id, path = %path.display(), "Report placed in outbox");
        Ok(())
    }
}

pub struct ReportUploadListener {
    repository: Arc<dyn ReportRepository>,
    senders: Vec<Arc<dyn ReportSender>>,
}

impl ReportUploadListener {
    pub fn new(repository: Arc<dyn ReportRepository>) -> Self {
        Self {
            repository,
            senders: Vec::new(),
        }
    }

    pub fn with_sender(mut self, sender: Arc<dyn ReportSender>) -> Self {
        self.senders.push(sender);
        self
    }

    /// Follow `bus` until the returned handle is aborted
    pub fn start(self, bus: &EventBus) -> JoinHandle<()> {
        let mut events = bus.subscribe();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let ReportEvent::ReportFinalized { report_id } = event {
                    self.upload(report_id).await;
                }
            }
        })
    }

    /// Send one report to every sender. Returns how many accepted it.
    pub async fn upload(&self, id: ReportId) -> usize {
        let report = match self.repository.find_by_id(id).await {
            Ok(Some(report)) => report,
            Ok(None) => {
                warn!(report_id = %id, "Finalized report not found, nothing to upload");
                return 0;
            }
            Err(e) => {
                error!(report_id = %id, "Cannot load finalized report: {e}");
                return 0;
            }
        };

        let dto = ReportDto::from(&report);
        let mut delivered = 0;
        for sender in &self.senders {
            match sender.send_report(&dto).await {
                Ok(()) => {
                    delivered += 1;
                    info!(report_id = %id, sender = sender.name(), "Report uploaded");
                }
                Err(e) => error!(report_id = %id, sender = sender.name(), "Upload failed: {e:#}"),
            }
        }
        delivered
    }
}
