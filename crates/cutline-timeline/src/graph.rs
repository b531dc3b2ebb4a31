//! Filter-graph assembly.
//!
//! Turns a [`SegmentScan`](crate::segment::SegmentScan) into the
//! `-filter_complex` expression, input list, and output stream maps for a
//! single FFmpeg invocation. One trim chain per segment, one concat per
//! stream type when there is more than one segment.

use std::collections::BTreeMap;
use std::path::PathBuf;

use cutline_models::{AssetEntry, TimelineSnapshot};
use tracing::debug;

use crate::error::{CompileError, CompileResult};
use crate::segment::{scan, SegmentScan, TrackSegment};

/// Source parameters for synthesized silence segments.
const SILENCE_SOURCE: &str = "anullsrc=channel_layout=stereo:sample_rate=48000";

/// A compiled render graph, ready to hand to the command builder.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledGraph {
    /// Input files, in assigned index order
    pub inputs: Vec<PathBuf>,
    /// Filter-graph expression; `None` for pass-through
    pub filter_complex: Option<String>,
    /// Output video map (`[vout]`, `[v0]`, or a native `0:v?`)
    pub video_map: Option<String>,
    /// Output audio map
    pub audio_map: Option<String>,
    /// Number of video segments emitted
    pub video_segments: usize,
    /// Number of audio segments emitted
    pub audio_segments: usize,
    /// Expected output duration in milliseconds; `None` for pass-through,
    /// where only the source itself knows
    pub output_duration_ms: Option<i64>,
}

/// Compile a timeline snapshot against an asset map.
///
/// Clips with unresolvable assets are excluded; if nothing resolves, the
/// graph falls back to passing the first asset's native streams through
/// unmodified. An empty asset map with no segments is an error.
pub fn compile(
    timeline: &TimelineSnapshot,
    asset_map: &BTreeMap<String, AssetEntry>,
) -> CompileResult<CompiledGraph> {
    let scan = scan(timeline, asset_map);
    build(scan, asset_map)
}

fn build(
    scan: SegmentScan,
    asset_map: &BTreeMap<String, AssetEntry>,
) -> CompileResult<CompiledGraph> {
    if scan.video.is_empty() && scan.audio.is_empty() {
        // Pass-through: first asset in id order, native streams unmodified.
        let first = asset_map
            .values()
            .next()
            .ok_or(CompileError::EmptyTimeline)?;
        debug!("no resolvable clips; passing through first input");
        return Ok(CompiledGraph {
            inputs: vec![first.path.clone()],
            filter_complex: None,
            video_map: Some("0:v?".to_string()),
            audio_map: Some("0:a?".to_string()),
            video_segments: 0,
            audio_segments: 0,
            output_duration_ms: None,
        });
    }

    let video_secs: f64 = scan.video.iter().map(|s| s.duration).sum();
    let audio_secs: f64 = scan.audio.iter().map(|s| s.duration).sum();
    let output_secs = if scan.video.is_empty() {
        audio_secs
    } else {
        video_secs
    };

    let mut filters: Vec<String> = Vec::new();

    for (i, seg) in scan.video.iter().enumerate() {
        filters.push(video_chain(seg, i));
    }
    for (i, seg) in scan.audio.iter().enumerate() {
        filters.push(audio_chain(seg, i));
    }

    let video_map = match scan.video.len() {
        0 => None,
        1 => Some("[v0]".to_string()),
        n => {
            let labels: String = (0..n).map(|i| format!("[v{i}]")).collect();
            filters.push(format!("{labels}concat=n={n}:v=1:a=0[vout]"));
            Some("[vout]".to_string())
        }
    };
    let audio_map = match scan.audio.len() {
        0 => None,
        1 => Some("[a0]".to_string()),
        n => {
            let labels: String = (0..n).map(|i| format!("[a{i}]")).collect();
            filters.push(format!("{labels}concat=n={n}:v=0:a=1[aout]"));
            Some("[aout]".to_string())
        }
    };

    Ok(CompiledGraph {
        inputs: scan.inputs,
        filter_complex: Some(filters.join(";")),
        video_map,
        audio_map,
        video_segments: scan.video.len(),
        audio_segments: scan.audio.len(),
        output_duration_ms: Some((output_secs * 1000.0).round() as i64),
    })
}

/// Trim chain for one video segment: `[i:v]trim,setpts[,fades][vN]`.
fn video_chain(seg: &TrackSegment, label: usize) -> String {
    let index = seg
        .input_index
        .expect("video segments always carry an input");
    let mut chain = format!(
        "[{index}:v]trim=start={}:duration={},setpts=PTS-STARTPTS",
        seg.source_start, seg.source_duration
    );
    if let Some(d) = seg.fades.fade_in {
        chain.push_str(&format!(",fade=t=in:st=0:d={d}"));
    }
    if let Some((st, d)) = seg.fades.fade_out {
        chain.push_str(&format!(",fade=t=out:st={st}:d={d}"));
    }
    chain.push_str(&format!("[v{label}]"));
    chain
}

/// Trim chain for one audio segment; silence is synthesized in-graph when
/// the segment has no source stream.
fn audio_chain(seg: &TrackSegment, label: usize) -> String {
    match seg.input_index {
        Some(index) => format!(
            "[{index}:a]atrim=start={}:duration={},asetpts=PTS-STARTPTS[a{label}]",
            seg.source_start, seg.source_duration
        ),
        None => format!(
            "{SILENCE_SOURCE},atrim=duration={},asetpts=PTS-STARTPTS[a{label}]",
            seg.duration
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutline_models::{
        Clip, MediaReference, RationalTime, Stack, TimeRange, Track, TrackItem, TrackKind,
    };

    fn clip(asset_id: &str, start: f64, dur: f64) -> TrackItem {
        TrackItem::Clip(Clip {
            source_range: TimeRange::new(
                RationalTime::new(start * 24.0, 24.0),
                RationalTime::new(dur * 24.0, 24.0),
            ),
            media_reference: MediaReference::ExternalReference {
                asset_id: asset_id.to_string(),
            },
            effects: Vec::new(),
        })
    }

    fn video_track(items: Vec<TrackItem>) -> TimelineSnapshot {
        TimelineSnapshot {
            name: None,
            tracks: Stack {
                children: vec![Track {
                    kind: TrackKind::Video,
                    name: None,
                    children: items,
                }],
            },
        }
    }

    fn assets(ids: &[&str]) -> BTreeMap<String, AssetEntry> {
        ids.iter()
            .map(|id| (id.to_string(), AssetEntry::new(format!("/media/{id}.mp4"))))
            .collect()
    }

    #[test]
    fn test_two_clips_two_trims_one_concat_per_stream() {
        // 0-5s of asset a, 10-12s of asset b on one video track.
        let timeline = video_track(vec![clip("a", 0.0, 5.0), clip("b", 10.0, 2.0)]);
        let graph = compile(&timeline, &assets(&["a", "b"])).unwrap();

        let fc = graph.filter_complex.as_deref().unwrap();
        assert_eq!(fc.matches("trim=start=").count() - fc.matches("atrim=start=").count(), 2);
        assert_eq!(fc.matches("atrim=start=").count(), 2);
        assert_eq!(fc.matches("concat=n=2:v=1:a=0").count(), 1);
        assert_eq!(fc.matches("concat=n=2:v=0:a=1").count(), 1);
        assert!(fc.contains("[0:v]trim=start=0:duration=5"));
        assert!(fc.contains("[1:v]trim=start=10:duration=2"));
        assert_eq!(graph.video_map.as_deref(), Some("[vout]"));
        assert_eq!(graph.audio_map.as_deref(), Some("[aout]"));
        assert_eq!(graph.inputs.len(), 2);
        assert_eq!(graph.output_duration_ms, Some(7000));
    }

    #[test]
    fn test_single_segment_skips_concat() {
        let timeline = video_track(vec![clip("a", 0.0, 5.0)]);
        let graph = compile(&timeline, &assets(&["a"])).unwrap();
        let fc = graph.filter_complex.as_deref().unwrap();
        assert!(!fc.contains("concat"));
        assert_eq!(graph.video_map.as_deref(), Some("[v0]"));
        assert_eq!(graph.audio_map.as_deref(), Some("[a0]"));
    }

    #[test]
    fn test_silence_synthesis_for_silent_source() {
        let timeline = video_track(vec![clip("a", 0.0, 5.0)]);
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), AssetEntry::without_audio("/media/a.mp4"));
        let graph = compile(&timeline, &map).unwrap();
        let fc = graph.filter_complex.as_deref().unwrap();
        assert!(fc.contains("anullsrc"));
        assert!(fc.contains("atrim=duration=5"));
        assert_eq!(graph.audio_segments, 1);
    }

    #[test]
    fn test_zero_resolvable_clips_passes_through() {
        let timeline = video_track(vec![clip("ghost", 0.0, 5.0)]);
        let graph = compile(&timeline, &assets(&["a"])).unwrap();
        assert!(graph.filter_complex.is_none());
        assert_eq!(graph.video_map.as_deref(), Some("0:v?"));
        assert_eq!(graph.audio_map.as_deref(), Some("0:a?"));
        assert_eq!(graph.inputs.len(), 1);
        assert_eq!(graph.video_segments, 0);
    }

    #[test]
    fn test_empty_timeline_and_empty_assets_is_error() {
        let timeline = video_track(vec![]);
        assert!(matches!(
            compile(&timeline, &BTreeMap::new()),
            Err(CompileError::EmptyTimeline)
        ));
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let timeline = video_track(vec![clip("b", 1.5, 3.25), clip("a", 0.0, 2.0)]);
        let map = assets(&["a", "b"]);
        let first = compile(&timeline, &map).unwrap();
        let second = compile(&timeline, &map).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.filter_complex, second.filter_complex);
        assert_eq!(first.inputs, second.inputs);
    }

    #[test]
    fn test_segment_counts_match_clip_counts() {
        // N=2 video clips and M=1 audio-only clip: N video segments,
        // N paired audio + M audio segments.
        let timeline = TimelineSnapshot {
            name: None,
            tracks: Stack {
                children: vec![
                    Track {
                        kind: TrackKind::Video,
                        name: None,
                        children: vec![clip("a", 0.0, 5.0), clip("b", 0.0, 3.0)],
                    },
                    Track {
                        kind: TrackKind::Audio,
                        name: None,
                        children: vec![clip("music", 0.0, 8.0)],
                    },
                ],
            },
        };
        let graph = compile(&timeline, &assets(&["a", "b", "music"])).unwrap();
        assert_eq!(graph.video_segments, 2);
        assert_eq!(graph.audio_segments, 3);
        let fc = graph.filter_complex.as_deref().unwrap();
        assert!(fc.contains("concat=n=3:v=0:a=1"));
    }
}
