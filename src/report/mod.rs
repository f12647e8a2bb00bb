//! Report generation
//!
//! - [`model`]: reports, results and their invariants
//! - [`repository`]: persistence behind [`ReportRepository`]
//! - [`events`]: lifecycle notifications and the [`EventBus`]
//! - [`aggregator`]: appends results and detects completion
//! - [`lifecycle`]: the one-time transition to GENERATED
//! - [`orchestrator`]: the public entry point tying it together
//! - [`scheduler`]: periodic generation
//! - [`dto`]: the export view without raw data

pub mod aggregator;
pub mod dto;
pub mod events;
pub mod lifecycle;
pub mod model;
pub mod orchestrator;
pub mod repository;
pub mod scheduler;

pub use aggregator::{ReportAggregator, ReportSlot};
pub use dto::{ReportDto, ResultDto};
pub use events::{EventBus, ReportEvent};
pub use lifecycle::ReportLifecycle;
pub use model::{NewReport, Report, ReportId, ReportResult, ReportStatus, truncate_error};
pub use orchestrator::ReportOrchestrator;
pub use repository::{InMemoryReportRepository, JsonReportRepository, ReportRepository};
pub use scheduler::ReportScheduler;
