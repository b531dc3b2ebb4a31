//! Local execution substrate: compile → encode → publish in-process.
//!
//! Runs inside a background task spawned at dispatch; never on the caller's
//! request path. Progress flows back through a status-update channel and
//! the caller owns the terminal transition.

use std::path::PathBuf;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use cutline_media::{encoder, FfmpegCommand, FfmpegRunner};
use cutline_models::{JobStatus, RenderManifest, StatusUpdate};
use cutline_timeline::compile;

use crate::config::OrchestratorConfig;
use crate::error::{RenderJobError, RenderResult};

/// Result of a successful local render.
#[derive(Debug, Clone)]
pub struct LocalOutcome {
    pub output_url: String,
    pub output_size_bytes: u64,
    pub total_frames: Option<u64>,
}

/// Compile and run one encode, publishing the output under the configured
/// output root.
///
/// Non-terminal progress updates are pushed through `updates`; the caller
/// applies the terminal transition from the returned result. Cancellation
/// arrives through `cancel_rx` and surfaces as `MediaError::Cancelled`.
pub async fn execute(
    manifest: &RenderManifest,
    config: &OrchestratorConfig,
    cancel_rx: watch::Receiver<bool>,
    updates: mpsc::UnboundedSender<StatusUpdate>,
) -> RenderResult<LocalOutcome> {
    let graph = compile(&manifest.timeline, &manifest.asset_map)?;
    debug!(
        job_id = %manifest.job_id,
        inputs = graph.inputs.len(),
        video_segments = graph.video_segments,
        audio_segments = graph.audio_segments,
        "timeline compiled"
    );

    let fps = manifest.preset.video.framerate;
    let total_frames = graph
        .output_duration_ms
        .map(|ms| ((ms as f64 / 1000.0) * fps).round() as u64);

    let _ = updates.send(StatusUpdate {
        status: JobStatus::Processing,
        progress: Some(config.progress_band.0),
        total_frames,
        ..Default::default()
    });

    tokio::fs::create_dir_all(&config.work_dir).await?;
    let work_file = config.work_dir.join(format!(
        "{}.{}",
        manifest.job_id, manifest.preset.video.container
    ));

    let mut cmd = FfmpegCommand::new(&work_file).inputs(&graph.inputs);
    if let Some(filter) = &graph.filter_complex {
        cmd = cmd.filter_complex(filter.clone());
    }
    if let Some(map) = &graph.video_map {
        cmd = cmd.map(map.clone());
    }
    if let Some(map) = &graph.audio_map {
        cmd = cmd.map(map.clone());
    }
    cmd = cmd.output_args(encoder::resolve(&manifest.preset));
    cmd = apply_frame_bounds(cmd, manifest, fps);

    let runner = FfmpegRunner::new()
        .with_cancel(cancel_rx)
        .with_timeout(config.job_timeout)
        .with_grace(config.cancel_grace)
        .with_band(config.progress_band.0, config.progress_band.1);

    let progress_updates = updates.clone();
    let report = runner
        .run_with_progress(&cmd, graph.output_duration_ms, move |banded, raw| {
            let _ = progress_updates.send(StatusUpdate {
                status: JobStatus::Processing,
                progress: Some(banded),
                current_frame: Some(raw.frame),
                total_frames,
                ..Default::default()
            });
        })
        .await?;

    // The banner is the only duration source for pass-through graphs.
    let total_frames = total_frames.or_else(|| {
        report
            .total_duration_ms
            .map(|ms| ((ms as f64 / 1000.0) * fps).round() as u64)
    });

    let _ = updates.send(StatusUpdate {
        status: JobStatus::Uploading,
        progress: Some(config.progress_band.1),
        total_frames,
        ..Default::default()
    });

    let destination = publish(&work_file, manifest, config).await?;
    let output_size_bytes = tokio::fs::metadata(&destination).await?.len();
    let output_url = format!("file://{}", destination.display());
    info!(
        job_id = %manifest.job_id,
        output = %destination.display(),
        size_bytes = output_size_bytes,
        "render published"
    );

    Ok(LocalOutcome {
        output_url,
        output_size_bytes,
        total_frames,
    })
}

/// Optional start/end frame bounds become output-side seek and frame-count
/// arguments.
fn apply_frame_bounds(cmd: FfmpegCommand, manifest: &RenderManifest, fps: f64) -> FfmpegCommand {
    let mut cmd = cmd;
    if let Some(start) = manifest.start_frame {
        if fps > 0.0 {
            cmd = cmd
                .output_arg("-ss")
                .output_arg(format!("{:.3}", start as f64 / fps));
        }
    }
    if let Some(end) = manifest.end_frame {
        let start = manifest.start_frame.unwrap_or(0);
        if end > start {
            cmd = cmd
                .output_arg("-frames:v")
                .output_arg((end - start).to_string());
        }
    }
    cmd
}

/// Move the finished work file to its bucket path under the output root.
async fn publish(
    work_file: &PathBuf,
    manifest: &RenderManifest,
    config: &OrchestratorConfig,
) -> RenderResult<PathBuf> {
    let destination = config
        .output_root
        .join(&manifest.output_bucket)
        .join(&manifest.output_path);
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    // Rename when the work dir and output root share a filesystem; fall
    // back to a copy when they do not.
    if tokio::fs::rename(work_file, &destination).await.is_err() {
        tokio::fs::copy(work_file, &destination).await?;
        let _ = tokio::fs::remove_file(work_file).await;
    }
    Ok(destination)
}

/// Map an execution error onto the FAILED update that records it.
pub fn failure_update(error: &RenderJobError) -> StatusUpdate {
    let mut update = StatusUpdate::failed(error.to_string());
    match error {
        RenderJobError::Media(cutline_media::MediaError::Timeout(secs)) => {
            update.error_details = Some(serde_json::json!({
                "kind": "timeout",
                "timeout_secs": secs,
            }));
        }
        RenderJobError::Media(cutline_media::MediaError::FfmpegFailed {
            stderr,
            exit_code,
            ..
        }) => {
            update.error_details = Some(serde_json::json!({
                "kind": "encoder_failure",
                "exit_code": exit_code,
                "stderr_tail": stderr,
            }));
        }
        _ => {
            update.error_details = Some(serde_json::json!({ "kind": "render_failure" }));
        }
    }
    update
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutline_models::{RenderPreset, Stack, TimelineSnapshot};
    use std::collections::BTreeMap;

    fn manifest(start_frame: Option<u64>, end_frame: Option<u64>) -> RenderManifest {
        RenderManifest {
            job_id: "job-1".into(),
            project_id: "p".into(),
            timeline_version: 1,
            timeline: TimelineSnapshot {
                name: None,
                tracks: Stack { children: vec![] },
            },
            asset_map: BTreeMap::new(),
            preset: RenderPreset::default(),
            input_bucket: "in".into(),
            output_bucket: "out".into(),
            output_path: "final.mp4".into(),
            start_frame,
            end_frame,
            callback_url: None,
            execution_mode: Default::default(),
        }
    }

    #[test]
    fn test_frame_bounds_args() {
        let cmd = FfmpegCommand::new("out.mp4");
        let args = apply_frame_bounds(cmd, &manifest(Some(60), Some(120)), 30.0).build_args();
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        assert_eq!(args[ss + 1], "2.000");
        let frames = args.iter().position(|a| a == "-frames:v").unwrap();
        assert_eq!(args[frames + 1], "60");
    }

    #[test]
    fn test_no_bounds_no_args() {
        let cmd = FfmpegCommand::new("out.mp4");
        let args = apply_frame_bounds(cmd, &manifest(None, None), 30.0).build_args();
        assert!(!args.contains(&"-ss".to_string()));
        assert!(!args.contains(&"-frames:v".to_string()));
    }

    #[tokio::test]
    async fn test_publish_moves_output_into_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let work_file = dir.path().join("job-1.mp4");
        tokio::fs::write(&work_file, b"encoded bytes").await.unwrap();

        let mut config = OrchestratorConfig::default();
        config.output_root = dir.path().join("published");

        let destination = publish(&work_file, &manifest(None, None), &config)
            .await
            .unwrap();
        assert_eq!(
            destination,
            config.output_root.join("out").join("final.mp4")
        );
        let bytes = tokio::fs::read(&destination).await.unwrap();
        assert_eq!(bytes, b"encoded bytes");
        assert!(!work_file.exists(), "work file moved, not left behind");
    }

    #[test]
    fn test_failure_update_carries_details() {
        let error = RenderJobError::Media(cutline_media::MediaError::Timeout(3600));
        let update = failure_update(&error);
        assert_eq!(update.status, JobStatus::Failed);
        let details = update.error_details.unwrap();
        assert_eq!(details["kind"], "timeout");
        assert_eq!(details["timeout_secs"], 3600);
    }
}
