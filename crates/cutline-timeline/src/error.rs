//! Error types for timeline compilation.

use thiserror::Error;

/// Result type for compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// Errors that can occur while compiling a timeline snapshot.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("invalid timeline snapshot: {0}")]
    Snapshot(String),

    #[error("timeline has no tracks and no assets to pass through")]
    EmptyTimeline,

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl CompileError {
    pub fn snapshot(message: impl Into<String>) -> Self {
        Self::Snapshot(message.into())
    }
}
