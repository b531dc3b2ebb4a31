//! Track scan: timeline snapshot → ordered segments + input assignment.
//!
//! Clips are visited strictly in document order (track order, then child
//! order). Concatenation later preserves this order; segments are never
//! reordered by their timeline position.

use std::collections::BTreeMap;
use std::path::PathBuf;

use cutline_models::{AssetEntry, MediaReference, TimelineSnapshot, TrackItem, TrackKind};
use tracing::debug;

use crate::anim::{fade_ramps, FadeRamps};

/// One contiguous trimmed span of source media included in the output.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSegment {
    /// Position in the assembled output stream
    pub start_time: f64,
    /// Length of the segment in seconds
    pub duration: f64,
    /// In-point in the source, seconds
    pub source_start: f64,
    /// Span read from the source, seconds
    pub source_duration: f64,
    /// Index into the compiled input list; `None` for synthesized silence
    pub input_index: Option<usize>,
    /// Fades derived from the clip's opacity curve
    pub fades: FadeRamps,
}

/// Result of scanning a snapshot against an asset map.
#[derive(Debug, Clone, Default)]
pub struct SegmentScan {
    /// Distinct input files, in first-use order
    pub inputs: Vec<PathBuf>,
    /// Video segments in document order
    pub video: Vec<TrackSegment>,
    /// Audio segments in document order (paired first, then audio tracks)
    pub audio: Vec<TrackSegment>,
    /// Asset ids that were referenced but not resolvable
    pub skipped_assets: Vec<String>,
}

/// Scan a snapshot, assigning one input index per distinct asset id.
///
/// Clips whose asset id is absent from the map are excluded and recorded in
/// `skipped_assets`; this mirrors the submission-time validation that fails
/// fast on the same list.
pub fn scan(timeline: &TimelineSnapshot, asset_map: &BTreeMap<String, AssetEntry>) -> SegmentScan {
    let mut scan = SegmentScan::default();
    let mut index_by_asset: BTreeMap<String, usize> = BTreeMap::new();
    let mut video_offset = 0.0_f64;
    let mut audio_offset = 0.0_f64;

    for track in &timeline.tracks.children {
        for item in &track.children {
            let clip = match item {
                TrackItem::Clip(clip) => clip,
                // Gaps and transitions contribute no segments; order is
                // preserved by the clips around them.
                TrackItem::Gap(_) | TrackItem::Transition(_) => continue,
            };
            if !clip.is_included() {
                continue;
            }
            let asset_id = match &clip.media_reference {
                MediaReference::ExternalReference { asset_id } => asset_id,
                MediaReference::Missing => continue,
            };
            let Some(entry) = asset_map.get(asset_id) else {
                if !scan.skipped_assets.contains(asset_id) {
                    scan.skipped_assets.push(asset_id.clone());
                }
                debug!(asset_id = %asset_id, "clip excluded: asset not in map");
                continue;
            };

            let input_index = *index_by_asset.entry(asset_id.clone()).or_insert_with(|| {
                scan.inputs.push(entry.path.clone());
                scan.inputs.len() - 1
            });

            let source_start = clip.source_range.start_time.to_seconds();
            let duration = clip.source_range.duration.to_seconds();
            let fades = clip
                .effects
                .iter()
                .find(|e| e.kind == "opacity")
                .map(|e| fade_ramps(&e.keyframes, duration))
                .unwrap_or_default();

            match track.kind {
                TrackKind::Video => {
                    scan.video.push(TrackSegment {
                        start_time: video_offset,
                        duration,
                        source_start,
                        source_duration: duration,
                        input_index: Some(input_index),
                        fades,
                    });
                    video_offset += duration;

                    // Every video segment gets a paired audio segment so
                    // concatenation stays uniform; sources without audio
                    // get silence of equal length.
                    scan.audio.push(TrackSegment {
                        start_time: audio_offset,
                        duration,
                        source_start,
                        source_duration: duration,
                        input_index: entry.has_audio.then_some(input_index),
                        fades: FadeRamps::default(),
                    });
                    audio_offset += duration;
                }
                TrackKind::Audio => {
                    scan.audio.push(TrackSegment {
                        start_time: audio_offset,
                        duration,
                        source_start,
                        source_duration: duration,
                        input_index: Some(input_index),
                        fades: FadeRamps::default(),
                    });
                    audio_offset += duration;
                }
            }
        }
    }

    scan
}
