//! Configuration management for the quality agent
//!
//! Settings are layered with figment (see [`core`]) and extracted into the
//! typed [`AgentConfig`]. Every section has defaults, so partial files and
//! single environment overrides are enough.

pub mod core;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{EngineError, EngineResult};
use crate::report::model::DEFAULT_EPSILON_BUDGET;

pub use self::core::{ENV_PREFIX, load, load_from};

/// Main configuration structure for the agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub report: ReportConfig,
    pub runner: RunnerConfig,
    pub storage: StorageConfig,
    pub datastore: DataStoreConfig,
    pub schedule: ScheduleConfig,
    pub upload: UploadConfig,
    pub logging: LoggingConfig,
}

/// Report defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Epsilon budget stamped on new reports (informational)
    pub epsilon_budget: f64,
}

/// Check execution policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Maximum checks running at once (0 = derive from CPU cores)
    pub max_concurrent_checks: usize,

    /// Percentage of CPU cores used when deriving the limit (1-100)
    pub thread_percentage: u8,

    /// Per-check deadline in seconds (0 = no deadline)
    pub check_timeout_secs: u64,
}

/// Report repository location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub reports_dir: PathBuf,
}

/// Source data store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataStoreConfig {
    /// FHIR Bundle file backing the store
    pub bundle_path: Option<PathBuf>,

    /// Identifier system inspected by the duplicate-identifier check
    pub identifier_system: String,
}

/// Scheduled generation in `serve` mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub interval_secs: u64,
}

/// Hand-off of finalized reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub enabled: bool,
    pub outbox_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `tracing` filter directive; `RUST_LOG` takes precedence
    pub level: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            epsilon_budget: DEFAULT_EPSILON_BUDGET,
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_checks: 0,
            thread_percentage: 75,
            check_timeout_secs: 0,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            reports_dir: PathBuf::from(".quality-agent/reports"),
        }
    }
}

impl Default for DataStoreConfig {
    fn default() -> Self {
        Self {
            bundle_path: None,
            identifier_system: crate::checks::duplicate_identifier::DEFAULT_IDENTIFIER_SYSTEM
                .to_string(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: 24 * 60 * 60,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            outbox_dir: PathBuf::from(".quality-agent/outbox"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl RunnerConfig {
    /// Per-check deadline, if one is configured
    pub fn check_timeout(&self) -> Option<Duration> {
        (self.check_timeout_secs > 0).then(|| Duration::from_secs(self.check_timeout_secs))
    }

    /// Concurrency limit for check execution
    pub fn effective_concurrency(&self) -> usize {
        let cpu_cores = num_cpus::get();

        let max_by_percentage =
            std::cmp::max(1, (cpu_cores * self.thread_percentage as usize) / 100);

        if self.max_concurrent_checks > 0 {
            self.max_concurrent_checks
        } else {
            max_by_percentage
        }
    }
}

impl ScheduleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl AgentConfig {
    /// Validate configuration
    pub fn validate(&self) -> EngineResult<()> {
        if !(self.report.epsilon_budget > 0.0) {
            return Err(EngineError::Config(format!(
                "report.epsilon_budget must be positive, got: {}",
                self.report.epsilon_budget
            )));
        }

        if !(1..=100).contains(&self.runner.thread_percentage) {
            return Err(EngineError::Config(format!(
                "runner.thread_percentage must be between 1 and 100, got: {}",
                self.runner.thread_percentage
            )));
        }

        if self.schedule.interval_secs == 0 {
            return Err(EngineError::Config(
                "schedule.interval_secs cannot be 0".to_string(),
            ));
        }

        Ok(())
    }
}
