//! Report persistence

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use super::model::{NewReport, Report, ReportId};
use crate::error::{EngineError, EngineResult};

/// Durable home of reports and their results
#[async_trait]
pub trait ReportRepository: Send + Sync {
    /// Persist a new GENERATING report and assign its id
    async fn create(&self, draft: NewReport) -> EngineResult<Report>;

    async fn find_by_id(&self, id: ReportId) -> EngineResult<Option<Report>>;

    /// Overwrite a previously created report
    async fn save(&self, report: &Report) -> EngineResult<()>;

    /// All reports, ordered by id
    async fn find_all(&self) -> EngineResult<Vec<Report>>;
}

/// Volatile repository, used by tests and one-shot runs
#[derive(Debug)]
pub struct InMemoryReportRepository {
    next_id: AtomicU64,
    reports: RwLock<BTreeMap<ReportId, Report>>,
}

impl Default for InMemoryReportRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryReportRepository {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            reports: RwLock::new(BTreeMap::new()),
        }
    }
}

#[async_trait]
impl ReportRepository for InMemoryReportRepository {
    async fn create(&self, draft: NewReport) -> EngineResult<Report> {
        let id = ReportId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let report = Report::new(id, draft);
        self.reports.write().await.insert(id, report.clone());
        Ok(report)
    }

    async fn find_by_id(&self, id: ReportId) -> EngineResult<Option<Report>> {
        Ok(self.reports.read().await.get(&id).cloned())
    }

    async fn save(&self, report: &Report) -> EngineResult<()> {
        let mut reports = self.reports.write().await;
        match reports.get_mut(&report.id) {
            Some(stored) => {
                *stored = report.clone();
                Ok(())
            }
            None => Err(EngineError::Persistence(format!(
                "report {} was never created",
                report.id
            ))),
        }
    }

    async fn find_all(&self) -> EngineResult<Vec<Report>> {
        Ok(self.reports.read().await.values().cloned().collect())
    }
}

/// One `report-<id>.json` file per report in a directory.
///
/// Writes go through a uniquely named temporary file, so a crash never leaves
/// a half-written report behind. New reports claim their id by hard-linking
/// that file into place, which fails instead of overwriting when another
/// process sharing the directory took the same id first.
#[derive(Debug)]
pub struct JsonReportRepository {
    dir: PathBuf,
    // serializes id allocation between concurrent creates of this instance
    create_lock: Mutex<()>,
}

// distinguishes temporary files of concurrent writers within one process
static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

impl JsonReportRepository {
    /// Open (and create if needed) a report directory
    pub async fn open(dir: impl Into<PathBuf>) -> EngineResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            EngineError::Persistence(format!("cannot create {}: {e}", dir.display()))
        })?;
        Ok(Self {
            dir,
            create_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: ReportId) -> PathBuf {
        self.dir.join(format!("report-{id}.json"))
    }

    /// Write the report to a fresh temporary file next to its final path
    async fn stage(&self, report: &Report) -> EngineResult<PathBuf> {
        let tmp = self.dir.join(format!(
            ".report-{}.{}-{}.tmp",
            report.id,
            std::process::id(),
            STAGING_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        let json = serde_json::to_vec_pretty(report).map_err(EngineError::persistence)?;
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| EngineError::Persistence(format!("cannot write {}: {e}", tmp.display())))?;
        Ok(tmp)
    }

    async fn write(&self, report: &Report) -> EngineResult<()> {
        let path = self.path_for(report.id);
        let tmp = self.stage(report).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(EngineError::Persistence(format!(
                "cannot replace {}: {e}",
                path.display()
            )));
        }

        debug!(report_id = %report.id, path = %path.display(), "Report written");
        Ok(())
    }

    /// Publish a staged report under its id unless that id is already taken.
    /// Returns false when another writer owns the id.
    async fn claim(&self, report: &Report) -> EngineResult<bool> {
        let path = self.path_for(report.id);
        let tmp = self.stage(report).await?;
        let linked = tokio::fs::hard_link(&tmp, &path).await;
        let _ = tokio::fs::remove_file(&tmp).await;

        match linked {
            Ok(()) => {
                debug!(report_id = %report.id, path = %path.display(), "Report created");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(EngineError::Persistence(format!(
                "cannot create {}: {e}",
                path.display()
            ))),
        }
    }

    async fn read(path: &Path) -> EngineResult<Report> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| EngineError::Persistence(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_slice(&bytes).map_err(|e| {
            EngineError::Persistence(format!("corrupt report {}: {e}", path.display()))
        })
    }

    /// Ids of every stored report, ascending
    async fn stored_ids(&self) -> EngineResult<Vec<ReportId>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(EngineError::persistence)?;

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(EngineError::persistence)? {
            let name = entry.file_name();
            let id = name
                .to_str()
                .and_then(|name| name.strip_prefix("report-"))
                .and_then(|rest| rest.strip_suffix(".json"))
                .and_then(|id| id.parse::<ReportId>().ok());
            if let Some(id) = id {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl ReportRepository for JsonReportRepository {
    async fn create(&self, draft: NewReport) -> EngineResult<Report> {
        let _guard = self.create_lock.lock().await;
        let mut next = self
            .stored_ids()
            .await?
            .last()
            .map_or(1, |ReportId(last)| last + 1);

        loop {
            let report = Report::new(ReportId(next), draft);
            if self.claim(&report).await? {
                return Ok(report);
            }
            debug!(report_id = next, "Report id taken by another writer, trying the next one");
            next += 1;
        }
    }

    async fn find_by_id(&self, id: ReportId) -> EngineResult<Option<Report>> {
        let path = self.path_for(id);
        if !tokio::fs::try_exists(&path)
            .await
            .map_err(EngineError::persistence)?
        {
            return Ok(None);
        }
        Self::read(&path).await.map(Some)
    }

    async fn save(&self, report: &Report) -> EngineResult<()> {
        let exists = tokio::fs::try_exists(self.path_for(report.id))
            .await
            .map_err(EngineError::persistence)?;
        if !exists {
            return Err(EngineError::Persistence(format!(
                "report {} was never created",
                report.id
            )));
        }
        self.write(report).await
    }

    async fn find_all(&self) -> EngineResult<Vec<Report>> {
        let mut reports = Vec::new();
        for id in self.stored_ids().await? {
            reports.push(Self::read(&self.path_for(id)).await?);
        }
        Ok(reports)
    }
}
