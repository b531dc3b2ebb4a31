//! Orchestrator error types.

use thiserror::Error;

pub type RenderResult<T> = Result<T, RenderJobError>;

/// Errors surfaced by job submission, execution, and status handling.
///
/// Validation and missing-asset errors surface synchronously at submission
/// and never create a job row. Execution failures transition the job to
/// FAILED instead of propagating.
#[derive(Debug, Error)]
pub enum RenderJobError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("missing assets: {}", asset_ids.join(", "))]
    MissingAssets { asset_ids: Vec<String> },

    #[error("timeline not found: {0}")]
    TimelineNotFound(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("render failed: {0}")]
    Render(String),

    #[error("render timed out after {0} seconds")]
    Timeout(u64),

    #[error("invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("callback authentication failed")]
    Unauthorized,

    #[error("remote runner is not configured")]
    RemoteUnavailable,

    #[error("compile error: {0}")]
    Compile(#[from] cutline_timeline::CompileError),

    #[error("media error: {0}")]
    Media(#[from] cutline_media::MediaError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RenderJobError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn render(message: impl Into<String>) -> Self {
        Self::Render(message.into())
    }

    pub fn job_not_found(job_id: impl Into<String>) -> Self {
        Self::JobNotFound(job_id.into())
    }
}
