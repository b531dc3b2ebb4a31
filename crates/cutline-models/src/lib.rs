//! Shared data models for the Cutline render pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Render manifests and asset maps
//! - Timeline snapshots (tagged track/clip tree)
//! - Encoding presets
//! - Render jobs and their status state machine
//! - Progress/status callback payloads

pub mod callback;
pub mod job;
pub mod manifest;
pub mod preset;
pub mod timeline;

// Re-export common types
pub use callback::CallbackPayload;
pub use job::{ApplyOutcome, JobId, JobMetadata, JobStatus, JobType, RenderJob, StatusUpdate};
pub use manifest::{AssetEntry, ExecutionMode, RenderManifest};
pub use preset::{AudioSettings, GpuBackend, RenderPreset, VideoSettings};
pub use timeline::{
    Clip, Easing, Effect, Gap, Keyframe, MediaReference, RationalTime, Stack, TimeRange,
    TimelineSnapshot, Track, TrackItem, TrackKind, Transition,
};
