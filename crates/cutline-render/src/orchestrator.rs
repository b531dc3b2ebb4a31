//! Render job orchestrator.
//!
//! Owns the job lifecycle: submission validation, one-shot dispatch to the
//! execution substrate (local task or remote runner), serialized status
//! application, cancellation, and remote polling. Both update channels
//! (webhook delivery and active polling) funnel into [`apply_status`],
//! where the per-job lock and the state-machine guard live.
//!
//! [`apply_status`]: Orchestrator::apply_status

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tracing::{info, warn};

use cutline_models::{
    ApplyOutcome, CallbackPayload, JobId, JobStatus, RenderJob, RenderManifest, StatusUpdate,
};

use crate::config::OrchestratorConfig;
use crate::error::{RenderJobError, RenderResult};
use crate::local;
use crate::notify::CallbackNotifier;
use crate::remote::RemoteRunner;
use crate::store::{JobFilter, JobStore, Page};

struct Inner {
    config: OrchestratorConfig,
    store: JobStore,
    notifier: CallbackNotifier,
    remote: Option<RemoteRunner>,
    /// Per-job advisory locks serializing status mutation
    locks: Mutex<HashMap<JobId, Arc<Mutex<()>>>>,
    /// Cancellation handles for local executions
    cancels: Mutex<HashMap<JobId, watch::Sender<bool>>>,
    /// Manifests for in-flight jobs (callback URLs live here)
    manifests: Mutex<HashMap<JobId, Arc<RenderManifest>>>,
}

/// The orchestrator. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        let remote = config.remote_base_url.clone().map(RemoteRunner::new);
        let notifier = CallbackNotifier::new(config.callback_secret.clone());
        Self {
            inner: Arc::new(Inner {
                config,
                store: JobStore::new(),
                notifier,
                remote,
                locks: Mutex::new(HashMap::new()),
                cancels: Mutex::new(HashMap::new()),
                manifests: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &JobStore {
        &self.inner.store
    }

    /// Submit a manifest: validate, create the job row, dispatch once.
    ///
    /// Validation and missing-asset failures return before any row is
    /// created. A dispatch failure marks the already-created row FAILED and
    /// propagates the error.
    pub async fn submit(&self, manifest: RenderManifest) -> RenderResult<RenderJob> {
        manifest
            .preset
            .validate()
            .map_err(RenderJobError::Validation)?;
        if manifest.timeline.tracks.children.is_empty() {
            return Err(RenderJobError::TimelineNotFound(format!(
                "{} v{}",
                manifest.project_id, manifest.timeline_version
            )));
        }
        let unresolved = manifest.unresolved_assets();
        if !unresolved.is_empty() {
            return Err(RenderJobError::MissingAssets {
                asset_ids: unresolved,
            });
        }

        let job_id = JobId::from_string(&manifest.job_id);
        let timeline_id = manifest
            .timeline
            .name
            .clone()
            .unwrap_or_else(|| format!("{}:timeline", manifest.project_id));
        let mut job = RenderJob::new(
            job_id.clone(),
            manifest.project_id.clone(),
            timeline_id,
            manifest.timeline_version,
            manifest.preset.clone(),
        );
        job.output_filename = manifest.output_filename();
        job.metadata.output_path = Some(manifest.output_path.clone());

        self.inner.store.create(job).await?;
        let manifest = Arc::new(manifest);
        self.inner
            .manifests
            .lock()
            .await
            .insert(job_id.clone(), Arc::clone(&manifest));

        let dispatched = match manifest.execution_mode {
            cutline_models::ExecutionMode::Local => self.dispatch_local(&job_id, manifest).await,
            cutline_models::ExecutionMode::Remote => self.dispatch_remote(&job_id, &manifest).await,
        };
        if let Err(e) = dispatched {
            warn!(job_id = %job_id, error = %e, "dispatch failed");
            let _ = self
                .apply_status(&job_id, StatusUpdate::failed(e.to_string()))
                .await;
            return Err(e);
        }

        self.inner.store.get(&job_id).await
    }

    /// Hand the job to the in-process substrate: mark QUEUED, then spawn
    /// the encode task off the request path.
    async fn dispatch_local(
        &self,
        job_id: &JobId,
        manifest: Arc<RenderManifest>,
    ) -> RenderResult<()> {
        self.apply_status(job_id, StatusUpdate::status(JobStatus::Queued))
            .await?;

        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.inner
            .cancels
            .lock()
            .await
            .insert(job_id.clone(), cancel_tx);

        let (update_tx, mut update_rx) = mpsc::unbounded_channel::<StatusUpdate>();

        // Pump: serializes every update from the encode through apply_status.
        let pump_orch = self.clone();
        let pump_job_id = job_id.clone();
        tokio::spawn(async move {
            while let Some(update) = update_rx.recv().await {
                if let Err(e) = pump_orch.apply_status(&pump_job_id, update).await {
                    warn!(job_id = %pump_job_id, error = %e, "status update failed");
                }
            }
        });

        let orch = self.clone();
        let job_id = job_id.clone();
        tokio::spawn(async move {
            let result =
                local::execute(&manifest, orch.config(), cancel_rx, update_tx.clone()).await;
            match result {
                Ok(outcome) => {
                    let mut update =
                        StatusUpdate::completed(outcome.output_url, outcome.output_size_bytes);
                    update.current_frame = outcome.total_frames;
                    update.total_frames = outcome.total_frames;
                    let _ = update_tx.send(update);
                }
                Err(RenderJobError::Media(cutline_media::MediaError::Cancelled)) => {
                    // The cancel path already flipped the row; the encode
                    // just finished tearing down.
                    info!(job_id = %job_id, "local execution stopped after cancellation");
                }
                Err(e) => {
                    let _ = update_tx.send(local::failure_update(&e));
                }
            }
            drop(update_tx);
            orch.inner.cancels.lock().await.remove(&job_id);
        });

        Ok(())
    }

    /// Hand the job to the remote substrate and record its execution id.
    async fn dispatch_remote(
        &self,
        job_id: &JobId,
        manifest: &RenderManifest,
    ) -> RenderResult<()> {
        let remote = self
            .inner
            .remote
            .as_ref()
            .ok_or(RenderJobError::RemoteUnavailable)?;
        let execution_id = remote.dispatch(manifest).await?;
        let mut update = StatusUpdate::status(JobStatus::Queued);
        update.remote_execution_id = Some(execution_id);
        self.apply_status(job_id, update).await?;
        Ok(())
    }

    /// Apply a status update under the per-job lock.
    ///
    /// The store write commits before any callback is attempted, so a
    /// notification failure can never desynchronize stored state.
    pub async fn apply_status(
        &self,
        job_id: &JobId,
        update: StatusUpdate,
    ) -> RenderResult<ApplyOutcome> {
        let lock = self.job_lock(job_id).await;
        let guard = lock.lock().await;

        let mut job = self.inner.store.get(job_id).await?;
        let outcome = job.apply(&update);
        match &outcome {
            ApplyOutcome::Applied => {
                self.inner.store.update(job.clone()).await?;
            }
            ApplyOutcome::Ignored => return Ok(outcome),
            ApplyOutcome::Rejected(reason) => {
                return Err(RenderJobError::InvalidTransition(reason.clone()));
            }
        }
        drop(guard);

        if let Some(url) = self.callback_url(job_id).await {
            let payload = payload_for(&job, update.message);
            self.inner.notifier.send(&url, &payload).await;
        }
        Ok(outcome)
    }

    /// Cancel a job: flip the stored status, best-effort stop the
    /// underlying execution.
    ///
    /// The row is marked CANCELLED even when the stop cannot be confirmed;
    /// that ambiguity is recorded in `error_details`. Cancelling a job
    /// already in a terminal state is a no-op.
    pub async fn cancel(&self, job_id: &JobId, reason: Option<String>) -> RenderResult<RenderJob> {
        let job = self.inner.store.get(job_id).await?;
        if job.is_terminal() {
            return Ok(job);
        }

        let mut confirmed = true;
        let mut detail: Option<String> = None;

        if let Some(execution_id) = &job.remote_execution_id {
            match self.inner.remote.as_ref() {
                Some(remote) => match remote.cancel(execution_id).await {
                    Ok(ok) => confirmed = ok,
                    Err(e) => {
                        confirmed = false;
                        detail = Some(e.to_string());
                    }
                },
                None => {
                    confirmed = false;
                    detail = Some("remote runner not configured".into());
                }
            }
        } else {
            match self.inner.cancels.lock().await.get(job_id) {
                Some(tx) => confirmed = tx.send(true).is_ok(),
                None => {
                    confirmed = false;
                    detail = Some("no active local execution".into());
                }
            }
        }

        let mut update = StatusUpdate::status(JobStatus::Cancelled);
        update.error_message = Some(reason.unwrap_or_else(|| "cancelled by requester".into()));
        if !confirmed {
            update.error_details = Some(serde_json::json!({
                "cancel_confirmed": false,
                "detail": detail,
            }));
        }
        self.apply_status(job_id, update).await?;
        info!(job_id = %job_id, confirmed, "job cancelled");
        self.inner.store.get(job_id).await
    }

    /// Poll the remote substrate for a job's status and apply it.
    pub async fn poll_remote(&self, job_id: &JobId) -> RenderResult<ApplyOutcome> {
        let job = self.inner.store.get(job_id).await?;
        let execution_id = job.remote_execution_id.ok_or_else(|| {
            RenderJobError::validation(format!("job {job_id} has no remote execution"))
        })?;
        let remote = self
            .inner
            .remote
            .as_ref()
            .ok_or(RenderJobError::RemoteUnavailable)?;
        let status = remote.status(&execution_id).await?;
        self.apply_status(job_id, status.into_update()).await
    }

    /// Get a job by id.
    pub async fn get(&self, job_id: &JobId) -> RenderResult<RenderJob> {
        self.inner.store.get(job_id).await
    }

    /// List jobs with filter and pagination.
    pub async fn list(&self, filter: &JobFilter, page: Page) -> RenderResult<Vec<RenderJob>> {
        self.inner.store.list(filter, page).await
    }

    /// Delete a job row and drop its in-memory bookkeeping.
    pub async fn delete(&self, job_id: &JobId) -> RenderResult<bool> {
        self.inner.manifests.lock().await.remove(job_id);
        self.inner.cancels.lock().await.remove(job_id);
        self.inner.locks.lock().await.remove(job_id);
        self.inner.store.delete(job_id).await
    }

    async fn job_lock(&self, job_id: &JobId) -> Arc<Mutex<()>> {
        let mut locks = self.inner.locks.lock().await;
        Arc::clone(
            locks
                .entry(job_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    async fn callback_url(&self, job_id: &JobId) -> Option<String> {
        self.inner
            .manifests
            .lock()
            .await
            .get(job_id)
            .and_then(|m| m.callback_url.clone())
    }
}

fn payload_for(job: &RenderJob, message: Option<String>) -> CallbackPayload {
    CallbackPayload {
        job_id: job.job_id.to_string(),
        status: job.status,
        progress: job.progress,
        current_frame: job.current_frame,
        total_frames: job.total_frames,
        message,
        error_message: job.error_message.clone(),
        output_url: job.output_url.clone(),
        output_size_bytes: job.output_size_bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutline_models::{
        AssetEntry, Clip, ExecutionMode, MediaReference, RationalTime, RenderPreset, Stack,
        TimeRange, TimelineSnapshot, Track, TrackItem, TrackKind,
    };
    use std::collections::BTreeMap;

    fn manifest(mode: ExecutionMode, resolved: bool) -> RenderManifest {
        let clip = Clip {
            source_range: TimeRange::new(
                RationalTime::new(0.0, 24.0),
                RationalTime::new(48.0, 24.0),
            ),
            media_reference: MediaReference::ExternalReference {
                asset_id: "a".into(),
            },
            effects: Vec::new(),
        };
        let mut asset_map = BTreeMap::new();
        if resolved {
            asset_map.insert("a".to_string(), AssetEntry::new("/media/a.mp4"));
        }
        RenderManifest {
            job_id: "job-1".into(),
            project_id: "p1".into(),
            timeline_version: 2,
            timeline: TimelineSnapshot {
                name: Some("cut".into()),
                tracks: Stack {
                    children: vec![Track {
                        kind: TrackKind::Video,
                        name: None,
                        children: vec![TrackItem::Clip(clip)],
                    }],
                },
            },
            asset_map,
            preset: RenderPreset::default(),
            input_bucket: "in".into(),
            output_bucket: "out".into(),
            output_path: "renders/final.mp4".into(),
            start_frame: None,
            end_frame: None,
            callback_url: None,
            execution_mode: mode,
        }
    }

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(OrchestratorConfig::default())
    }

    #[tokio::test]
    async fn test_missing_assets_fails_fast_without_job_row() {
        let orch = orchestrator();
        let result = orch.submit(manifest(ExecutionMode::Local, false)).await;
        match result {
            Err(RenderJobError::MissingAssets { asset_ids }) => {
                assert_eq!(asset_ids, vec!["a".to_string()]);
            }
            other => panic!("expected MissingAssets, got {other:?}"),
        }
        assert!(orch.get(&JobId::from_string("job-1")).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_preset_rejected_without_job_row() {
        let orch = orchestrator();
        let mut manifest = manifest(ExecutionMode::Local, true);
        manifest.preset.video.crf = 99;
        assert!(matches!(
            orch.submit(manifest).await,
            Err(RenderJobError::Validation(_))
        ));
        assert!(orch.get(&JobId::from_string("job-1")).await.is_err());
    }

    #[tokio::test]
    async fn test_remote_dispatch_without_runner_fails_job() {
        let orch = orchestrator();
        let result = orch.submit(manifest(ExecutionMode::Remote, true)).await;
        assert!(matches!(result, Err(RenderJobError::RemoteUnavailable)));
        // The row exists and records the failure.
        let job = orch.get(&JobId::from_string("job-1")).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_apply_status_serializes_and_guards() {
        let orch = orchestrator();
        let job_id = JobId::from_string("j1");
        let job = RenderJob::new(job_id.clone(), "p", "t", 1, RenderPreset::default());
        orch.store().create(job).await.unwrap();

        orch.apply_status(&job_id, StatusUpdate::status(JobStatus::Queued))
            .await
            .unwrap();
        orch.apply_status(&job_id, StatusUpdate::processing(50))
            .await
            .unwrap();

        // Regressing update is discarded.
        let outcome = orch
            .apply_status(&job_id, StatusUpdate::status(JobStatus::Queued))
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Ignored);

        // Completed without output fields is rejected.
        assert!(matches!(
            orch.apply_status(&job_id, StatusUpdate::status(JobStatus::Completed))
                .await,
            Err(RenderJobError::InvalidTransition(_))
        ));
    }

    #[tokio::test]
    async fn test_terminal_update_is_noop_for_further_updates() {
        let orch = orchestrator();
        let job_id = JobId::from_string("j1");
        let job = RenderJob::new(job_id.clone(), "p", "t", 1, RenderPreset::default());
        orch.store().create(job).await.unwrap();

        orch.apply_status(&job_id, StatusUpdate::completed("file:///x.mp4", 10))
            .await
            .unwrap();
        let outcome = orch
            .apply_status(&job_id, StatusUpdate::processing(10))
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Ignored);
        assert_eq!(
            orch.get(&job_id).await.unwrap().status,
            JobStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_cancel_records_unconfirmed_stop() {
        let orch = orchestrator();
        let job_id = JobId::from_string("j1");
        let mut job = RenderJob::new(job_id.clone(), "p", "t", 1, RenderPreset::default());
        job.status = JobStatus::Processing;
        orch.store().create(job).await.unwrap();

        // No local execution registered, so the stop is unconfirmed.
        let cancelled = orch.cancel(&job_id, Some("user clicked stop".into())).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert_eq!(
            cancelled.error_message.as_deref(),
            Some("user clicked stop")
        );
        let details = cancelled.error_details.unwrap();
        assert_eq!(details["cancel_confirmed"], false);
    }

    #[tokio::test]
    async fn test_cancel_terminal_job_is_noop() {
        let orch = orchestrator();
        let job_id = JobId::from_string("j1");
        let mut job = RenderJob::new(job_id.clone(), "p", "t", 1, RenderPreset::default());
        job.status = JobStatus::Completed;
        orch.store().create(job).await.unwrap();

        let result = orch.cancel(&job_id, None).await.unwrap();
        assert_eq!(result.status, JobStatus::Completed);
        assert!(result.error_details.is_none());
    }

    #[tokio::test]
    async fn test_cancel_signals_local_execution() {
        let orch = orchestrator();
        let job_id = JobId::from_string("j1");
        let mut job = RenderJob::new(job_id.clone(), "p", "t", 1, RenderPreset::default());
        job.status = JobStatus::Processing;
        orch.store().create(job).await.unwrap();

        let (tx, rx) = watch::channel(false);
        orch.inner.cancels.lock().await.insert(job_id.clone(), tx);

        let cancelled = orch.cancel(&job_id, None).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert!(cancelled.error_details.is_none(), "stop was confirmed");
        assert!(*rx.borrow(), "terminate signal delivered");
    }
}
