// Report errors - what the query engine can fail with
//
// Empty result sets are NOT errors; every report may legitimately
// return zero rows.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    /// The store is unreachable or a query failed. No partial result.
    #[error("data access failed: {0}")]
    DataAccess(#[from] rusqlite::Error),

    /// The store could not be reached outside of a query (worker died,
    /// file missing).
    #[error("data store unavailable: {0}")]
    Unavailable(String),

    /// Input rejected before touching the store.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The caller-imposed bound on data access elapsed.
    #[error("report timed out after {0} seconds")]
    Timeout(u64),
}

impl ReportError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ReportError::InvalidParameter(message.into())
    }

    pub fn is_invalid_parameter(&self) -> bool {
        matches!(self, ReportError::InvalidParameter(_))
    }
}

/// Convenience alias.
pub type ReportResult<T> = std::result::Result<T, ReportError>;
