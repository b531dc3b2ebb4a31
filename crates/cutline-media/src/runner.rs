//! FFmpeg process execution with progress monitoring, timeout, and
//! cancellation.
//!
//! The encode runs in its own process group so that teardown (timeout or
//! cancellation) reaches child processes too: SIGTERM first, then SIGKILL
//! after the grace period.

use std::collections::VecDeque;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};
use crate::progress::{
    parse_duration_banner, parse_progress_line, EncodeProgress, ProgressMapper,
    DEFAULT_BAND_CEIL, DEFAULT_BAND_FLOOR,
};

/// Lines of stderr retained for failure diagnostics.
const STDERR_TAIL_LINES: usize = 60;

/// Default grace period between SIGTERM and SIGKILL.
const DEFAULT_GRACE_SECS: u64 = 10;

/// Facts learned from a completed run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Total input duration, from the caller or the metadata banner
    pub total_duration_ms: Option<i64>,
}

/// Runner for FFmpeg commands.
pub struct FfmpegRunner {
    cancel_rx: Option<watch::Receiver<bool>>,
    timeout: Option<Duration>,
    grace: Duration,
    band: (u8, u8),
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self {
            cancel_rx: None,
            timeout: None,
            grace: Duration::from_secs(DEFAULT_GRACE_SECS),
            band: (DEFAULT_BAND_FLOOR, DEFAULT_BAND_CEIL),
        }
    }

    /// Cancellation signal. Flipping the sender to `true` tears the encode
    /// down within the grace period.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Wall-clock ceiling for the whole encode.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Grace period between SIGTERM and SIGKILL during teardown.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Caller-visible progress band.
    pub fn with_band(mut self, floor: u8, ceil: u8) -> Self {
        self.band = (floor, ceil);
        self
    }

    /// Run a command, discarding progress.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<RunReport> {
        self.run_with_progress(cmd, None, |_, _| {}).await
    }

    /// Run a command, reporting banded progress.
    ///
    /// `total_ms` seeds the progress mapper; when `None`, the total is
    /// derived from FFmpeg's own metadata banner and progress records seen
    /// before that are ignored.
    pub async fn run_with_progress<F>(
        &self,
        cmd: &FfmpegCommand,
        total_ms: Option<i64>,
        on_progress: F,
    ) -> MediaResult<RunReport>
    where
        F: Fn(u8, &EncodeProgress) + Send + 'static,
    {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let args = cmd.build_args();
        debug!("running ffmpeg {}", args.join(" "));

        let mut command = Command::new("ffmpeg");
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn()?;
        let stderr = child.stderr.take().expect("stderr not captured");

        let mut mapper = ProgressMapper::new(self.band.0, self.band.1);
        if let Some(total) = total_ms {
            mapper.set_total_ms(total);
        }

        // Reader task: stderr tail for diagnostics, duration banner, and
        // progress records.
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut current = EncodeProgress::default();

            while let Ok(Some(line)) = lines.next_line().await {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line.clone());

                if mapper.total_ms().is_none() {
                    if let Some(banner_ms) = parse_duration_banner(&line) {
                        debug!(total_ms = banner_ms, "derived duration from banner");
                        mapper.set_total_ms(banner_ms);
                    }
                }
                if let Some(snapshot) = parse_progress_line(&line, &mut current) {
                    if let Some(banded) = mapper.observe(&snapshot) {
                        on_progress(banded, &snapshot);
                    }
                }
            }

            (tail.into_iter().collect::<Vec<_>>(), mapper.total_ms())
        });

        let mut cancel_rx = self.cancel_rx.clone();
        let cancelled = async {
            match cancel_rx.as_mut() {
                Some(rx) => loop {
                    if *rx.borrow() {
                        break;
                    }
                    if rx.changed().await.is_err() {
                        std::future::pending::<()>().await;
                    }
                },
                None => std::future::pending().await,
            }
        };
        tokio::pin!(cancelled);

        let ceiling = async {
            match self.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(ceiling);

        enum WaitOutcome {
            Exited(std::process::ExitStatus),
            Cancelled,
            TimedOut,
        }

        // The wait future's borrow of the child ends with this block, so
        // teardown below can take the child mutably again.
        let outcome = {
            let wait = child.wait();
            tokio::pin!(wait);
            tokio::select! {
                status = &mut wait => WaitOutcome::Exited(status?),
                _ = &mut cancelled => WaitOutcome::Cancelled,
                _ = &mut ceiling => WaitOutcome::TimedOut,
            }
        };

        let status = match outcome {
            WaitOutcome::Exited(status) => status,
            WaitOutcome::Cancelled => {
                info!("encode cancelled, terminating process group");
                self.terminate(&mut child).await;
                let _ = reader.await;
                return Err(MediaError::Cancelled);
            }
            WaitOutcome::TimedOut => {
                let secs = self.timeout.map(|t| t.as_secs()).unwrap_or_default();
                warn!(timeout_secs = secs, "encode exceeded wall-clock ceiling, killing");
                self.terminate(&mut child).await;
                let _ = reader.await;
                return Err(MediaError::Timeout(secs));
            }
        };

        let (tail, derived_total) = reader.await.unwrap_or_default();

        if status.success() {
            Ok(RunReport {
                total_duration_ms: derived_total,
            })
        } else {
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                Some(tail.join("\n")),
                status.code(),
            ))
        }
    }

    /// Stop the process group: SIGTERM, wait out the grace period, SIGKILL.
    async fn terminate(&self, child: &mut Child) {
        #[cfg(unix)]
        {
            if let Some(pid) = child.id() {
                unsafe {
                    libc::killpg(pid as i32, libc::SIGTERM);
                }
                if tokio::time::timeout(self.grace, child.wait()).await.is_ok() {
                    return;
                }
                warn!("process group survived SIGTERM, escalating to SIGKILL");
                unsafe {
                    libc::killpg(pid as i32, libc::SIGKILL);
                }
            }
        }
        let _ = child.kill().await;
        let _ = child.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runner_defaults() {
        let runner = FfmpegRunner::new();
        assert!(runner.timeout.is_none());
        assert!(runner.cancel_rx.is_none());
        assert_eq!(runner.band, (DEFAULT_BAND_FLOOR, DEFAULT_BAND_CEIL));
        assert_eq!(runner.grace, Duration::from_secs(DEFAULT_GRACE_SECS));
    }

    #[test]
    fn test_runner_builder() {
        let (_tx, rx) = watch::channel(false);
        let runner = FfmpegRunner::new()
            .with_cancel(rx)
            .with_timeout(Duration::from_secs(90))
            .with_grace(Duration::from_secs(5))
            .with_band(5, 90);
        assert_eq!(runner.timeout, Some(Duration::from_secs(90)));
        assert!(runner.cancel_rx.is_some());
        assert_eq!(runner.band, (5, 90));
    }
}
