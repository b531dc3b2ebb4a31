//! Render manifest: the fully resolved, self-contained job description
//! handed to the execution substrate. Immutable once built.

use std::collections::BTreeMap;
use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::preset::RenderPreset;
use crate::timeline::TimelineSnapshot;

/// Where the encode actually runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Local,
    Remote,
}

/// One resolved asset: a local path plus the stream facts the compiler
/// needs so it never has to probe mid-compile.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AssetEntry {
    pub path: PathBuf,

    /// Whether the source carries an audio stream. When false, the compiler
    /// synthesizes silence for the paired audio segment.
    #[serde(default = "default_has_audio")]
    pub has_audio: bool,
}

fn default_has_audio() -> bool {
    true
}

impl AssetEntry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            has_audio: true,
        }
    }

    pub fn without_audio(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            has_audio: false,
        }
    }
}

/// The render manifest.
///
/// Asset ids map to resolved entries in a `BTreeMap` so iteration order,
/// and therefore compilation, is deterministic.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RenderManifest {
    pub job_id: String,
    pub project_id: String,
    pub timeline_version: u64,
    pub timeline: TimelineSnapshot,
    pub asset_map: BTreeMap<String, AssetEntry>,

    #[serde(default)]
    pub preset: RenderPreset,

    pub input_bucket: String,
    pub output_bucket: String,
    pub output_path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_frame: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_frame: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,

    #[serde(default)]
    pub execution_mode: ExecutionMode,
}

impl RenderManifest {
    /// Asset ids referenced by the timeline but absent from the asset map.
    pub fn unresolved_assets(&self) -> Vec<String> {
        self.timeline
            .referenced_assets()
            .into_iter()
            .filter(|id| !self.asset_map.contains_key(id))
            .collect()
    }

    /// Output file name derived from the output path.
    pub fn output_filename(&self) -> Option<String> {
        PathBuf::from(&self.output_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
    }
}
