//! Render job and its status state machine.
//!
//! A job row is created once at submission and mutated only through
//! [`RenderJob::apply`]. Both update channels (remote polling and webhook
//! delivery) funnel into that single method, so the regression guard lives
//! in exactly one place.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::preset::RenderPreset;

/// Unique identifier for a render job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type of render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Full-quality timeline export
    #[default]
    Render,
    /// Reduced-quality preview render
    Preview,
}

/// Render job status.
///
/// `Pending → Queued → Processing → Uploading → {Completed | Failed |
/// Cancelled}`. Failed and Cancelled are reachable from any non-terminal
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Queued,
    Processing,
    Uploading,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Uploading => "uploading",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal states accept no further updates.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Position in the forward progression, used by the regression guard.
    /// All terminal states share the top rank.
    fn rank(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Queued => 1,
            JobStatus::Processing => 2,
            JobStatus::Uploading => 3,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => 4,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A status update from either channel (poll or webhook).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct StatusUpdate {
    pub status: JobStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_frame: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_frames: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_size_bytes: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_execution_id: Option<String>,
}

impl StatusUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn processing(progress: u8) -> Self {
        Self {
            status: JobStatus::Processing,
            progress: Some(progress),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            error_message: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn completed(output_url: impl Into<String>, output_size_bytes: u64) -> Self {
        Self {
            status: JobStatus::Completed,
            progress: Some(100),
            output_url: Some(output_url.into()),
            output_size_bytes: Some(output_size_bytes),
            ..Default::default()
        }
    }
}

/// Outcome of applying a [`StatusUpdate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The job row changed.
    Applied,
    /// Idempotent no-op or a discarded regression.
    Ignored,
    /// The update violated a transition precondition.
    Rejected(String),
}

/// Job-level metadata the orchestrator keeps alongside the status fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct JobMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
}

/// A render job row.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RenderJob {
    pub job_id: JobId,
    pub project_id: String,
    pub timeline_id: String,
    pub timeline_version: u64,
    pub job_type: JobType,
    pub status: JobStatus,

    /// Progress percentage (0-100)
    pub progress: u8,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_frame: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_frames: Option<u64>,

    pub preset: RenderPreset,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_filename: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_size_bytes: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_execution_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub metadata: JobMetadata,
}

impl RenderJob {
    /// Create a new pending job.
    pub fn new(
        job_id: JobId,
        project_id: impl Into<String>,
        timeline_id: impl Into<String>,
        timeline_version: u64,
        preset: RenderPreset,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            project_id: project_id.into(),
            timeline_id: timeline_id.into(),
            timeline_version,
            job_type: JobType::Render,
            status: JobStatus::Pending,
            progress: 0,
            current_frame: None,
            total_frames: None,
            preset,
            output_filename: None,
            output_url: None,
            output_size_bytes: None,
            error_message: None,
            error_details: None,
            remote_execution_id: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            metadata: JobMetadata::default(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a status update, enforcing the state machine in one place.
    ///
    /// - Updates after a terminal state are discarded.
    /// - An update whose status ranks below the current one is discarded
    ///   (a late "processing" after Completed).
    /// - Re-applying an identical update is a no-op.
    /// - Completed requires `output_url` and `output_size_bytes`.
    /// - Progress never decreases.
    pub fn apply(&mut self, update: &StatusUpdate) -> ApplyOutcome {
        if self.status.is_terminal() {
            return ApplyOutcome::Ignored;
        }
        if update.status.rank() < self.status.rank() {
            return ApplyOutcome::Ignored;
        }
        if update.status == JobStatus::Completed
            && (update.output_url.is_none() || update.output_size_bytes.is_none())
        {
            return ApplyOutcome::Rejected(
                "completed update requires output_url and output_size_bytes".into(),
            );
        }

        let mut changed = false;
        let now = Utc::now();

        if update.status != self.status {
            self.status = update.status;
            changed = true;
            match update.status {
                JobStatus::Processing => {
                    if self.started_at.is_none() {
                        self.started_at = Some(now);
                    }
                }
                JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => {
                    self.completed_at = Some(now);
                }
                _ => {}
            }
        }

        if let Some(progress) = update.progress {
            let progress = progress.min(100);
            if progress > self.progress {
                self.progress = progress;
                changed = true;
            }
        }
        if self.status == JobStatus::Completed && self.progress != 100 {
            self.progress = 100;
            changed = true;
        }

        if let Some(frame) = update.current_frame {
            if self.current_frame != Some(frame) {
                self.current_frame = Some(frame);
                changed = true;
            }
        }
        if let Some(total) = update.total_frames {
            if self.total_frames != Some(total) {
                self.total_frames = Some(total);
                changed = true;
            }
        }
        if let Some(url) = &update.output_url {
            if self.output_url.as_deref() != Some(url) {
                self.output_url = Some(url.clone());
                changed = true;
            }
        }
        if let Some(size) = update.output_size_bytes {
            if self.output_size_bytes != Some(size) {
                self.output_size_bytes = Some(size);
                changed = true;
            }
        }
        if let Some(error) = &update.error_message {
            if self.error_message.as_deref() != Some(error) {
                self.error_message = Some(error.clone());
                changed = true;
            }
        }
        if let Some(details) = &update.error_details {
            if self.error_details.as_ref() != Some(details) {
                self.error_details = Some(details.clone());
                changed = true;
            }
        }
        if let Some(remote_id) = &update.remote_execution_id {
            if self.remote_execution_id.as_deref() != Some(remote_id) {
                self.remote_execution_id = Some(remote_id.clone());
                changed = true;
            }
        }

        if changed {
            self.updated_at = now;
            ApplyOutcome::Applied
        } else {
            ApplyOutcome::Ignored
        }
    }
}
