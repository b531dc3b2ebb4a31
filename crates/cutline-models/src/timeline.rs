//! Timeline snapshot types.
//!
//! A snapshot is a schema-tagged tree: `Timeline` holds a `Stack` of tracks,
//! each track holds clips, gaps, and transitions in document order. Time
//! values are rational (`value / rate`) so snapshots survive frame-rate
//! changes without rounding.
//!
//! The tag set is closed: a document carrying an unrecognized `schema` tag
//! fails to deserialize rather than being silently ignored.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A rational time value: `value` ticks at `rate` ticks per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RationalTime {
    pub value: f64,
    pub rate: f64,
}

impl RationalTime {
    pub fn new(value: f64, rate: f64) -> Self {
        Self { value, rate }
    }

    /// Convert to seconds. A non-positive rate yields 0.0.
    pub fn to_seconds(&self) -> f64 {
        if self.rate <= 0.0 {
            return 0.0;
        }
        self.value / self.rate
    }

    /// Whether the value and rate are both non-negative.
    pub fn is_valid(&self) -> bool {
        self.value >= 0.0 && self.rate > 0.0
    }
}

/// A span of source media: where to start reading and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimeRange {
    pub start_time: RationalTime,
    pub duration: RationalTime,
}

impl TimeRange {
    pub fn new(start_time: RationalTime, duration: RationalTime) -> Self {
        Self {
            start_time,
            duration,
        }
    }
}

/// Root of a timeline snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "schema", rename = "Timeline")]
pub struct TimelineSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub tracks: Stack,
}

impl TimelineSnapshot {
    /// Iterate over all clips in document order, with their track kind.
    pub fn clips(&self) -> impl Iterator<Item = (TrackKind, &Clip)> {
        self.tracks.children.iter().flat_map(|track| {
            track.children.iter().filter_map(move |item| match item {
                TrackItem::Clip(clip) => Some((track.kind, clip)),
                _ => None,
            })
        })
    }

    /// Collect every asset id referenced by an included clip.
    pub fn referenced_assets(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for (_, clip) in self.clips() {
            if !clip.is_included() {
                continue;
            }
            if let MediaReference::ExternalReference { asset_id } = &clip.media_reference {
                if !ids.contains(asset_id) {
                    ids.push(asset_id.clone());
                }
            }
        }
        ids
    }
}

/// Ordered collection of tracks (index 0 renders first).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "schema", rename = "Stack")]
pub struct Stack {
    pub children: Vec<Track>,
}

/// Track kind: carries video (with paired audio) or audio only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum TrackKind {
    Video,
    Audio,
}

/// A single track containing clips, gaps, and transitions in document order.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "schema", rename = "Track")]
pub struct Track {
    pub kind: TrackKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub children: Vec<TrackItem>,
}

/// Items that may appear on a track. The tag set is closed; anything else is
/// a data error.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "schema")]
pub enum TrackItem {
    Clip(Clip),
    Gap(Gap),
    Transition(Transition),
}

/// A clip: a trimmed span of a referenced source.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Clip {
    pub source_range: TimeRange,
    pub media_reference: MediaReference,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub effects: Vec<Effect>,
}

impl Clip {
    /// A clip is included in compilation only when its duration is positive
    /// and its time values are well-formed.
    pub fn is_included(&self) -> bool {
        self.source_range.start_time.is_valid()
            && self.source_range.duration.is_valid()
            && self.source_range.duration.to_seconds() > 0.0
    }
}

/// What a clip points at.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "schema")]
pub enum MediaReference {
    ExternalReference { asset_id: String },
    Missing,
}

/// Empty space on a track. Skipped by the compiler; concatenation is by
/// document order, not by timeline position.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Gap {
    pub duration: RationalTime,
}

/// A transition between adjacent clips. Carried in the model; the compiler
/// currently cuts hard at clip boundaries.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Transition {
    pub in_offset: RationalTime,
    pub out_offset: RationalTime,
}

/// A per-clip effect: a named kind with an animated parameter curve.
///
/// `"opacity"` is interpreted by the compiler (fade synthesis at the clip
/// head/tail); other kinds are carried through untouched.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Effect {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keyframes: Vec<Keyframe>,
}

/// One keyframe of an animated parameter.
///
/// `time` is in seconds relative to the clip start. `easing` describes the
/// curve from this keyframe to the next one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Keyframe {
    pub time: f64,
    pub value: f64,
    #[serde(default)]
    pub easing: Easing,
}

/// Easing mode between two keyframes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    #[default]
    Linear,
    Hold,
    EaseIn,
    EaseOut,
    EaseInOut,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip_json() -> &'static str {
        r#"{
            "schema": "Timeline",
            "name": "demo",
            "tracks": {
                "schema": "Stack",
                "children": [
                    {
                        "schema": "Track",
                        "kind": "Video",
                        "children": [
                            {
                                "schema": "Clip",
                                "source_range": {
                                    "start_time": {"value": 0.0, "rate": 24.0},
                                    "duration": {"value": 120.0, "rate": 24.0}
                                },
                                "media_reference": {
                                    "schema": "ExternalReference",
                                    "asset_id": "asset-a"
                                }
                            },
                            {"schema": "Gap", "duration": {"value": 24.0, "rate": 24.0}}
                        ]
                    }
                ]
            }
        }"#
    }

    #[test]
    fn test_snapshot_round_trip() {
        let snapshot: TimelineSnapshot = serde_json::from_str(clip_json()).unwrap();
        assert_eq!(snapshot.name.as_deref(), Some("demo"));
        assert_eq!(snapshot.tracks.children.len(), 1);

        let encoded = serde_json::to_string(&snapshot).unwrap();
        let again: TimelineSnapshot = serde_json::from_str(&encoded).unwrap();
        assert_eq!(again.referenced_assets(), vec!["asset-a".to_string()]);
    }

    #[test]
    fn test_unknown_schema_tag_is_an_error() {
        let bad = r#"{
            "schema": "Timeline",
            "tracks": {
                "schema": "Stack",
                "children": [
                    {
                        "schema": "Track",
                        "kind": "Video",
                        "children": [{"schema": "Marker", "label": "x"}]
                    }
                ]
            }
        }"#;
        assert!(serde_json::from_str::<TimelineSnapshot>(bad).is_err());
    }

    #[test]
    fn test_rational_time_to_seconds() {
        assert_eq!(RationalTime::new(48.0, 24.0).to_seconds(), 2.0);
        assert_eq!(RationalTime::new(10.0, 0.0).to_seconds(), 0.0);
        assert!(!RationalTime::new(-1.0, 24.0).is_valid());
    }

    #[test]
    fn test_zero_duration_clip_excluded() {
        let clip = Clip {
            source_range: TimeRange::new(
                RationalTime::new(0.0, 24.0),
                RationalTime::new(0.0, 24.0),
            ),
            media_reference: MediaReference::ExternalReference {
                asset_id: "a".into(),
            },
            effects: Vec::new(),
        };
        assert!(!clip.is_included());
    }
}
