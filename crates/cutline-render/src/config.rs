//! Orchestrator configuration.
//!
//! Environment-derived values are resolved once, here, and passed into the
//! orchestrator at construction. Nothing reads the environment mid-flight.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the orchestrator and its local executor.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Shared secret expected on callback requests; `None` disables the
    /// webhook surface
    pub callback_secret: Option<String>,
    /// Base URL of the remote execution substrate
    pub remote_base_url: Option<String>,
    /// Scratch directory for in-flight encodes
    pub work_dir: PathBuf,
    /// Root under which output buckets live
    pub output_root: PathBuf,
    /// Wall-clock ceiling for one encode
    pub job_timeout: Duration,
    /// Grace period between cancel request and hard kill
    pub cancel_grace: Duration,
    /// Caller-visible progress band (floor, ceiling)
    pub progress_band: (u8, u8),
    /// How often to poll the remote substrate for active jobs
    pub poll_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            callback_secret: None,
            remote_base_url: None,
            work_dir: PathBuf::from("/tmp/cutline"),
            output_root: PathBuf::from("/tmp/cutline/out"),
            job_timeout: Duration::from_secs(3600),
            cancel_grace: Duration::from_secs(10),
            progress_band: (10, 95),
            poll_interval: Duration::from_secs(5),
        }
    }
}

impl OrchestratorConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            callback_secret: std::env::var("RENDER_CALLBACK_SECRET").ok(),
            remote_base_url: std::env::var("RENDER_REMOTE_URL").ok(),
            work_dir: std::env::var("RENDER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            output_root: std::env::var("RENDER_OUTPUT_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_root),
            job_timeout: Duration::from_secs(
                std::env::var("RENDER_JOB_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            cancel_grace: Duration::from_secs(
                std::env::var("RENDER_CANCEL_GRACE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            progress_band: defaults.progress_band,
            poll_interval: Duration::from_secs(
                std::env::var("RENDER_POLL_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.job_timeout, Duration::from_secs(3600));
        assert_eq!(config.progress_band, (10, 95));
        assert!(config.callback_secret.is_none());
    }
}
