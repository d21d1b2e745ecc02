//! Failure taxonomy for the submission and reporting pipeline.
//!
//! Every variant is surfaced to the immediate caller. Nothing in this crate
//! retries on its own; re-submitting or paging an operator is up to whoever
//! receives the error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing or empty upload. No side effects were performed.
    #[error("invalid submission: {0}")]
    InvalidSubmission(String),

    /// The external scoring engine could not produce a mark.
    #[error("scoring failed: {0}")]
    ScoringFailure(String),

    /// Durable storage (the ledger or the document directory) could not be read or written.
    #[error("result store unavailable: {0}")]
    StoreUnavailable(String),

    /// Chart generation or artifact publication failed.
    #[error("report render failed: {0}")]
    ReportRenderFailure(String),
}

impl PipelineError {
    /// Returns `true` for failures caused by the caller's input rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, PipelineError::InvalidSubmission(_))
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        PipelineError::StoreUnavailable(err.to_string())
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
