//! Progress/status callback payload.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::{JobStatus, StatusUpdate};

/// Body of the progress/status POST sent by an executing render process and
/// ingested by the orchestrator's webhook endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CallbackPayload {
    pub job_id: String,
    pub status: JobStatus,

    /// Progress percentage (0-100)
    pub progress: u8,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_frame: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_frames: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_size_bytes: Option<u64>,
}

impl CallbackPayload {
    /// Convert into the status update the state machine consumes.
    pub fn into_update(self) -> StatusUpdate {
        StatusUpdate {
            status: self.status,
            progress: Some(self.progress),
            current_frame: self.current_frame,
            total_frames: self.total_frames,
            message: self.message,
            error_message: self.error_message,
            error_details: None,
            output_url: self.output_url,
            output_size_bytes: self.output_size_bytes,
            remote_execution_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_round_trip() {
        let payload = CallbackPayload {
            job_id: "job-1".into(),
            status: JobStatus::Processing,
            progress: 55,
            current_frame: Some(1320),
            total_frames: Some(2400),
            message: None,
            error_message: None,
            output_url: None,
            output_size_bytes: None,
        };
        let json = serde_json::to_string(&payload).unwrap();
        let again: CallbackPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(again.progress, 55);

        let update = again.into_update();
        assert_eq!(update.status, JobStatus::Processing);
        assert_eq!(update.current_frame, Some(1320));
    }
}
