//! Error taxonomy for pipeline jobs.
//!
//! Errors are classified by how the caller should react:
//! - Validation / NotFound / Conflict: surface or resolve, never retry
//! - RateLimited / TransientIo: retry with backoff
//! - Fatal: abort the job and exit non-zero so a supervisor restarts it

use thiserror::Error;

use crate::db::DbError;
use crate::enrich::EnrichError;
use crate::github::GithubError;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input violates a documented constraint (malformed email, suffix-only
    /// company name, bad id). Do not retry.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Unique-constraint collision during create. Callers resolve by looking
    /// up the existing entity via the same canonical key and enriching it.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited by external API")]
    RateLimited,

    #[error("Transient I/O error: {0}")]
    TransientIo(String),

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    /// Unrecoverable: missing credentials, unreadable input file, schema
    /// failure. The job aborts with a non-zero exit code.
    #[error("Fatal: {0}")]
    Fatal(String),
}

impl PipelineError {
    /// Whether a bounded retry with backoff is appropriate.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::RateLimited | PipelineError::TransientIo(_))
    }
}

impl From<GithubError> for PipelineError {
    fn from(err: GithubError) -> Self {
        match err {
            GithubError::RateLimited { .. } => PipelineError::RateLimited,
            GithubError::NotFound(what) => PipelineError::NotFound(what),
            GithubError::MissingToken => {
                PipelineError::Fatal("GITHUB_TOKEN not set".to_string())
            }
            other => PipelineError::TransientIo(other.to_string()),
        }
    }
}

impl From<EnrichError> for PipelineError {
    fn from(err: EnrichError) -> Self {
        match err {
            EnrichError::MissingApiKey => {
                PipelineError::Fatal("PHANTOMBUSTER_API_KEY not set".to_string())
            }
            EnrichError::RateLimited => PipelineError::RateLimited,
            other => PipelineError::TransientIo(other.to_string()),
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::TransientIo(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(PipelineError::RateLimited.is_retryable());
        assert!(PipelineError::TransientIo("connection reset".into()).is_retryable());
        assert!(!PipelineError::Validation("bad input".into()).is_retryable());
        assert!(!PipelineError::Fatal("missing credentials".into()).is_retryable());
    }
}
