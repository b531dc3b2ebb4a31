//! FFmpeg progress parsing and caller-visible progress mapping.
//!
//! FFmpeg's `-progress` channel emits `key=value` records terminated by a
//! `progress=continue|end` line. Raw elapsed time is mapped into a
//! caller-visible band (default 10-95, head and tail reserved for setup and
//! finalization) and the mapped value never decreases.

use serde::{Deserialize, Serialize};

/// Default lower bound of the caller-visible band.
pub const DEFAULT_BAND_FLOOR: u8 = 10;
/// Default upper bound of the caller-visible band.
pub const DEFAULT_BAND_CEIL: u8 = 95;

/// Progress information from FFmpeg.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncodeProgress {
    /// Current frame number
    pub frame: u64,
    /// Current encode FPS
    pub fps: f64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (e.g. 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

/// Parse one line of `-progress` output into the running record.
///
/// Returns a snapshot when the record is complete (a `progress=` line).
pub fn parse_progress_line(line: &str, current: &mut EncodeProgress) -> Option<EncodeProgress> {
    let line = line.trim();
    let (key, value) = line.split_once('=')?;

    match key {
        "out_time_ms" | "out_time_us" => {
            // Despite the name, ffmpeg reports out_time_ms in microseconds.
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_ms = us / 1000;
            }
        }
        "frame" => {
            if let Ok(frame) = value.parse() {
                current.frame = frame;
            }
        }
        "fps" => {
            if let Ok(fps) = value.parse() {
                current.fps = fps;
            }
        }
        "speed" => {
            if value != "N/A" {
                if let Some(speed) = value.strip_suffix('x').and_then(|s| s.parse().ok()) {
                    current.speed = speed;
                }
            }
        }
        "progress" => {
            if value == "end" {
                current.is_complete = true;
            }
            return Some(current.clone());
        }
        _ => {}
    }

    None
}

/// Parse FFmpeg's metadata banner line for the input duration.
///
/// The banner looks like `  Duration: 00:01:30.45, start: 0.000000, ...`.
/// Used to derive the total when the caller did not already know it.
pub fn parse_duration_banner(line: &str) -> Option<i64> {
    let rest = line.trim().strip_prefix("Duration:")?.trim_start();
    let stamp = rest.split([',', ' ']).next()?;
    if stamp == "N/A" {
        return None;
    }

    let mut parts = stamp.split(':');
    let hours: i64 = parts.next()?.parse().ok()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || hours < 0 || !(0..60).contains(&minutes) || seconds < 0.0 {
        return None;
    }

    Some(hours * 3_600_000 + minutes * 60_000 + (seconds * 1000.0) as i64)
}

/// Maps raw elapsed-time progress into a monotone caller-visible band.
#[derive(Debug, Clone)]
pub struct ProgressMapper {
    total_ms: Option<i64>,
    floor: u8,
    ceil: u8,
    last: u8,
}

impl Default for ProgressMapper {
    fn default() -> Self {
        Self::new(DEFAULT_BAND_FLOOR, DEFAULT_BAND_CEIL)
    }
}

impl ProgressMapper {
    pub fn new(floor: u8, ceil: u8) -> Self {
        let floor = floor.min(100);
        let ceil = ceil.clamp(floor, 100);
        Self {
            total_ms: None,
            floor,
            ceil,
            last: floor,
        }
    }

    /// Provide the total duration, if not already known.
    pub fn set_total_ms(&mut self, total_ms: i64) {
        if self.total_ms.is_none() && total_ms > 0 {
            self.total_ms = Some(total_ms);
        }
    }

    pub fn total_ms(&self) -> Option<i64> {
        self.total_ms
    }

    /// Last value handed to the caller.
    pub fn last(&self) -> u8 {
        self.last
    }

    /// Observe a raw progress record.
    ///
    /// Returns a new band value only when it advances past the previous
    /// one. Records arriving before the total duration is known are
    /// ignored.
    pub fn observe(&mut self, progress: &EncodeProgress) -> Option<u8> {
        let total = self.total_ms?;
        let fraction = (progress.out_time_ms as f64 / total as f64).clamp(0.0, 1.0);
        let span = (self.ceil - self.floor) as f64;
        let mapped = self.floor + (fraction * span).round() as u8;
        let mapped = mapped.min(self.ceil);
        if mapped > self.last {
            self.last = mapped;
            Some(mapped)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(out_time_ms: i64) -> EncodeProgress {
        EncodeProgress {
            out_time_ms,
            ..Default::default()
        }
    }

    #[test]
    fn test_progress_line_parsing() {
        let mut current = EncodeProgress::default();
        assert!(parse_progress_line("frame=120", &mut current).is_none());
        assert!(parse_progress_line("out_time_ms=5000000", &mut current).is_none());
        assert!(parse_progress_line("speed=1.5x", &mut current).is_none());

        let snapshot = parse_progress_line("progress=continue", &mut current).unwrap();
        assert_eq!(snapshot.frame, 120);
        assert_eq!(snapshot.out_time_ms, 5000);
        assert!((snapshot.speed - 1.5).abs() < 0.01);
        assert!(!snapshot.is_complete);

        let done = parse_progress_line("progress=end", &mut current).unwrap();
        assert!(done.is_complete);
    }

    #[test]
    fn test_duration_banner_parsing() {
        assert_eq!(
            parse_duration_banner("  Duration: 00:01:30.45, start: 0.000000, bitrate: 5000 kb/s"),
            Some(90_450)
        );
        assert_eq!(parse_duration_banner("Duration: 01:00:00.00"), Some(3_600_000));
        assert_eq!(parse_duration_banner("Duration: N/A, bitrate: N/A"), None);
        assert_eq!(parse_duration_banner("frame=12"), None);
    }

    #[test]
    fn test_mapper_ignores_records_before_duration_known() {
        let mut mapper = ProgressMapper::default();
        assert_eq!(mapper.observe(&record(5_000)), None);
        mapper.set_total_ms(10_000);
        assert_eq!(mapper.observe(&record(5_000)), Some(53));
    }

    #[test]
    fn test_mapper_band_endpoints() {
        let mut mapper = ProgressMapper::new(10, 95);
        mapper.set_total_ms(10_000);
        // Floor is the starting value, so zero elapsed emits nothing new.
        assert_eq!(mapper.observe(&record(0)), None);
        assert_eq!(mapper.observe(&record(10_000)), Some(95));
        // Past-the-end raw values stay clamped to the ceiling.
        assert_eq!(mapper.observe(&record(20_000)), None);
        assert_eq!(mapper.last(), 95);
    }

    #[test]
    fn test_mapper_is_monotone_under_reordered_lines() {
        let mut mapper = ProgressMapper::default();
        mapper.set_total_ms(100_000);
        let mut emitted = Vec::new();
        for out_ms in [10_000, 40_000, 20_000, 80_000, 60_000, 100_000] {
            if let Some(value) = mapper.observe(&record(out_ms)) {
                emitted.push(value);
            }
        }
        let mut sorted = emitted.clone();
        sorted.sort_unstable();
        assert_eq!(emitted, sorted, "emitted values must never decrease");
        assert_eq!(*emitted.last().unwrap(), 95);
    }

    #[test]
    fn test_set_total_keeps_first_value() {
        let mut mapper = ProgressMapper::default();
        mapper.set_total_ms(10_000);
        mapper.set_total_ms(99_000);
        assert_eq!(mapper.total_ms(), Some(10_000));
    }
}
