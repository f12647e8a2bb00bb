//! # Quality Agent - privacy-preserving data-quality reports
//!
//! Quality Agent runs data-quality checks against a FHIR clinical data store
//! and assembles their outcomes into reports that are safe to share:
//!
//! - **Differential privacy**: every count is protected with Laplace noise
//!   sized by the check's epsilon and sensitivity
//! - **Low-count suppression**: noisy values below 10 are released as 0
//! - **Stratification**: checks can split their count over strata discovered
//!   in the data, such as gender values
//! - **Isolation**: a failing, panicking or hanging check becomes an error
//!   result and never aborts its report
//! - **Exactly-once finalization**: a report becomes GENERATED once, only
//!   after every expected result has been stored
//!
//! ## Quick Start
//!
//! ```bash
//! # Run all built-in checks against a FHIR bundle
//! quality-agent generate --bundle patients.json
//!
//! # Inspect stored reports
//! quality-agent list
//! quality-agent show 1 --format json
//!
//! # Generate on a schedule
//! quality-agent serve --bundle patients.json
//! ```
//!
//! ## Library use
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use quality_agent::checks::builtin_checks;
//! use quality_agent::config::AgentConfig;
//! use quality_agent::datastore::BundleStore;
//! use quality_agent::report::{EventBus, InMemoryReportRepository, ReportOrchestrator};
//! use quality_agent::runner::CheckRunner;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = AgentConfig::default();
//! let orchestrator = Arc::new(ReportOrchestrator::new(
//!     Arc::new(InMemoryReportRepository::new()),
//!     Arc::new(BundleStore::load(Path::new("patients.json"))?),
//!     builtin_checks(&config),
//!     CheckRunner::default(),
//!     EventBus::new(),
//! ));
//! let _dispatcher = orchestrator.start();
//! let report = orchestrator.generate_and_wait(Duration::from_secs(60)).await?;
//! println!("{} results", report.results.len());
//! # Ok(())
//! # }
//! ```

pub mod checks;
pub mod cli;
pub mod config;
pub mod datastore;
pub mod error;
pub mod privacy;
pub mod report;
pub mod runner;
pub mod upload;

pub use cli::{Cli, Output};
pub use config::AgentConfig;
pub use error::{EngineError, EngineResult};

/// Result type alias for agent operations
pub type Result<T> = anyhow::Result<T>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
