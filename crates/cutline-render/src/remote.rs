//! Remote execution substrate client.
//!
//! JSON over HTTP: `POST /jobs` dispatches a manifest, `GET /jobs/:id`
//! reports status, `POST /jobs/:id/cancel` requests a best-effort stop and
//! says whether it was confirmed.

use cutline_models::{JobStatus, RenderManifest, StatusUpdate};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{RenderJobError, RenderResult};

#[derive(Debug, Serialize)]
struct DispatchRequest<'a> {
    manifest: &'a RenderManifest,
}

#[derive(Debug, Deserialize)]
struct DispatchResponse {
    execution_id: String,
}

/// Status document reported by the remote runner.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteJobStatus {
    pub status: JobStatus,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub current_frame: Option<u64>,
    #[serde(default)]
    pub total_frames: Option<u64>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub output_url: Option<String>,
    #[serde(default)]
    pub output_size_bytes: Option<u64>,
}

impl RemoteJobStatus {
    /// Convert into the update the state machine consumes.
    pub fn into_update(self) -> StatusUpdate {
        StatusUpdate {
            status: self.status,
            progress: Some(self.progress),
            current_frame: self.current_frame,
            total_frames: self.total_frames,
            message: None,
            error_message: self.error_message,
            error_details: None,
            output_url: self.output_url,
            output_size_bytes: self.output_size_bytes,
            remote_execution_id: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CancelResponse {
    #[serde(default)]
    confirmed: bool,
}

/// HTTP client for the remote runner.
#[derive(Debug, Clone)]
pub struct RemoteRunner {
    base_url: String,
    client: reqwest::Client,
}

impl RemoteRunner {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Hand a manifest to the substrate. Returns the remote execution id.
    pub async fn dispatch(&self, manifest: &RenderManifest) -> RenderResult<String> {
        let url = format!("{}/jobs", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&DispatchRequest { manifest })
            .send()
            .await?
            .error_for_status()?;
        let body: DispatchResponse = response.json().await?;
        info!(
            job_id = %manifest.job_id,
            execution_id = %body.execution_id,
            "dispatched to remote runner"
        );
        Ok(body.execution_id)
    }

    /// Fetch the current remote status.
    pub async fn status(&self, execution_id: &str) -> RenderResult<RemoteJobStatus> {
        let url = format!("{}/jobs/{}", self.base_url, execution_id);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    /// Request a stop. Returns whether the runner confirmed it.
    pub async fn cancel(&self, execution_id: &str) -> RenderResult<bool> {
        let url = format!("{}/jobs/{}/cancel", self.base_url, execution_id);
        let response = self.client.post(&url).send().await?;
        if !response.status().is_success() {
            return Err(RenderJobError::render(format!(
                "remote cancel returned {}",
                response.status()
            )));
        }
        let body: CancelResponse = response.json().await.unwrap_or(CancelResponse {
            confirmed: false,
        });
        Ok(body.confirmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let runner = RemoteRunner::new("http://runner.internal/");
        assert_eq!(runner.base_url, "http://runner.internal");
    }

    #[test]
    fn test_remote_status_into_update() {
        let status = RemoteJobStatus {
            status: JobStatus::Processing,
            progress: 40,
            current_frame: Some(10),
            total_frames: Some(100),
            error_message: None,
            output_url: None,
            output_size_bytes: None,
        };
        let update = status.into_update();
        assert_eq!(update.status, JobStatus::Processing);
        assert_eq!(update.progress, Some(40));
    }
}
