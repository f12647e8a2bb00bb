//! Error taxonomy for the report engine.
//!
//! Check execution failures are deliberately absent: the runner turns them into
//! error-carrying results instead of returning them (see [`crate::runner`]).

use thiserror::Error;

use crate::report::ReportId;

/// Errors surfaced by the report engine to its callers.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A privacy parameter was zero, negative or NaN.
    #[error("{name} must be positive, got: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    /// No report exists with the requested identifier.
    #[error("report {0} not found")]
    NotFound(ReportId),

    /// The report repository could not create, read or save a report.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// The agent configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    pub(crate) fn persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;
