//! Outbound status callback delivery.
//!
//! Called only after the store write has committed; a delivery failure is
//! logged and never unwinds job state.

use cutline_models::CallbackPayload;
use tracing::{debug, warn};

/// Header carrying the shared secret on callback requests.
pub const SECRET_HEADER: &str = "x-render-secret";

/// HTTP callback sender.
#[derive(Debug, Clone)]
pub struct CallbackNotifier {
    client: reqwest::Client,
    secret: Option<String>,
}

impl CallbackNotifier {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret,
        }
    }

    /// POST a payload to the callback URL. Errors are logged, not returned.
    pub async fn send(&self, url: &str, payload: &CallbackPayload) {
        let mut request = self.client.post(url).json(payload);
        if let Some(secret) = &self.secret {
            request = request.header(SECRET_HEADER, secret);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                debug!(job_id = %payload.job_id, status = %payload.status, "callback delivered");
            }
            Ok(response) => {
                warn!(
                    job_id = %payload.job_id,
                    http_status = %response.status(),
                    "callback rejected by receiver"
                );
            }
            Err(e) => {
                warn!(job_id = %payload.job_id, error = %e, "callback delivery failed");
            }
        }
    }
}
