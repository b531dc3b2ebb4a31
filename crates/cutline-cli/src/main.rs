//! Local/dev render driver.
//!
//! Loads a render manifest, submits it to the orchestrator, and waits for
//! the job to reach a terminal state. Status callbacks go to the manifest's
//! callback URL (or `RENDER_CALLBACK_URL`) when configured; otherwise
//! progress is only logged. Exits 0 on COMPLETED, 1 otherwise.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cutline_models::{ExecutionMode, JobId, JobStatus, RenderManifest};
use cutline_render::{Orchestrator, OrchestratorConfig};

#[derive(Parser, Debug)]
#[command(name = "cutline", about = "Render a timeline manifest")]
struct Args {
    /// Path to the render manifest (JSON)
    #[arg(long)]
    manifest: PathBuf,

    /// Override the manifest's job id
    #[arg(long)]
    job_id: Option<String>,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    if let Err(e) = run(Args::parse()).await {
        error!("render failed: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("cutline=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn run(args: Args) -> Result<()> {
    let mut manifest = load_manifest(&args.manifest).await?;
    if let Some(job_id) = args.job_id {
        manifest.job_id = job_id;
    }
    if manifest.callback_url.is_none() {
        manifest.callback_url = std::env::var("RENDER_CALLBACK_URL").ok();
    }

    let config = OrchestratorConfig::from_env();
    if manifest.execution_mode == ExecutionMode::Remote && config.remote_base_url.is_none() {
        anyhow::bail!("manifest requests remote execution but RENDER_REMOTE_URL is unset");
    }

    let poll_interval = config.poll_interval;
    let orchestrator = Orchestrator::new(config);

    let job_id = JobId::from_string(&manifest.job_id);
    let remote = manifest.execution_mode == ExecutionMode::Remote;
    info!(
        job_id = %job_id,
        manifest = %args.manifest.display(),
        remote,
        "submitting render job"
    );
    orchestrator
        .submit(manifest)
        .await
        .context("job submission failed")?;

    let job = wait_for_terminal(&orchestrator, &job_id, remote, poll_interval).await?;
    match job.status {
        JobStatus::Completed => {
            info!(
                job_id = %job_id,
                output_url = job.output_url.as_deref().unwrap_or(""),
                output_size_bytes = job.output_size_bytes.unwrap_or(0),
                "render complete"
            );
            Ok(())
        }
        status => {
            anyhow::bail!(
                "job ended {status}: {}",
                job.error_message.as_deref().unwrap_or("no error recorded")
            )
        }
    }
}

async fn load_manifest(path: &PathBuf) -> Result<RenderManifest> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read manifest {}", path.display()))?;
    serde_json::from_str(&raw).context("manifest is not a valid render manifest")
}

/// Wait for the job to leave the active states, logging progress changes.
/// Remote jobs are actively polled; local jobs update in-process.
async fn wait_for_terminal(
    orchestrator: &Orchestrator,
    job_id: &JobId,
    remote: bool,
    poll_interval: Duration,
) -> Result<cutline_models::RenderJob> {
    let mut last_progress = 0u8;
    loop {
        if remote {
            if let Err(e) = orchestrator.poll_remote(job_id).await {
                error!(job_id = %job_id, "remote poll failed: {e}");
            }
        }
        let job = orchestrator.get(job_id).await?;
        if job.progress > last_progress {
            last_progress = job.progress;
            info!(
                job_id = %job_id,
                status = %job.status,
                progress = job.progress,
                current_frame = job.current_frame.unwrap_or(0),
                total_frames = job.total_frames.unwrap_or(0),
                "render progress"
            );
        }
        if job.is_terminal() {
            return Ok(job);
        }
        tokio::time::sleep(if remote {
            poll_interval
        } else {
            Duration::from_millis(250)
        })
        .await;
    }
}
