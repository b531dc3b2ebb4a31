//! Render preset: declarative encoder settings.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "h264";
/// Default container
pub const DEFAULT_CONTAINER: &str = "mp4";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default encoder speed preset
pub const DEFAULT_SPEED_PRESET: &str = "medium";
/// Default CRF (Constant Rate Factor)
pub const DEFAULT_CRF: u8 = 23;
/// Default audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "192k";
/// Default pixel format
pub const DEFAULT_PIXEL_FORMAT: &str = "yuv420p";

/// GPU encoder backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GpuBackend {
    #[default]
    Nvenc,
    Qsv,
    Videotoolbox,
}

impl GpuBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            GpuBackend::Nvenc => "nvenc",
            GpuBackend::Qsv => "qsv",
            GpuBackend::Videotoolbox => "videotoolbox",
        }
    }
}

/// Video encoder settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VideoSettings {
    /// Codec family (e.g. "h264", "hevc", "av1")
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// Output container (e.g. "mp4", "mov")
    #[serde(default = "default_container")]
    pub container: String,

    /// Output width in pixels
    pub width: u32,

    /// Output height in pixels
    pub height: u32,

    /// Output frame rate
    pub framerate: f64,

    /// Target bitrate (e.g. "8M"); constant-quality when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<String>,

    /// Constant Rate Factor (0-51, lower is better)
    #[serde(default = "default_crf")]
    pub crf: u8,

    /// Encoder speed preset (x264 names: "ultrafast".."veryslow")
    #[serde(default = "default_speed_preset")]
    pub preset: String,

    /// Pixel format
    #[serde(default = "default_pixel_format")]
    pub pixel_format: String,

    /// Two-pass encode request
    #[serde(default)]
    pub two_pass: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_primaries: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_trc: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colorspace: Option<String>,
}

fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_container() -> String {
    DEFAULT_CONTAINER.to_string()
}
fn default_crf() -> u8 {
    DEFAULT_CRF
}
fn default_speed_preset() -> String {
    DEFAULT_SPEED_PRESET.to_string()
}
fn default_pixel_format() -> String {
    DEFAULT_PIXEL_FORMAT.to_string()
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_audio_bitrate() -> String {
    DEFAULT_AUDIO_BITRATE.to_string()
}
fn default_sample_rate() -> u32 {
    48_000
}
fn default_channels() -> u8 {
    2
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            codec: default_video_codec(),
            container: default_container(),
            width: 1920,
            height: 1080,
            framerate: 30.0,
            bitrate: None,
            crf: DEFAULT_CRF,
            preset: default_speed_preset(),
            pixel_format: default_pixel_format(),
            two_pass: false,
            color_primaries: None,
            color_trc: None,
            colorspace: None,
        }
    }
}

/// Audio encoder settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AudioSettings {
    #[serde(default = "default_audio_codec")]
    pub codec: String,

    #[serde(default = "default_audio_bitrate")]
    pub bitrate: String,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_channels")]
    pub channels: u8,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            codec: default_audio_codec(),
            bitrate: default_audio_bitrate(),
            sample_rate: default_sample_rate(),
            channels: default_channels(),
        }
    }
}

/// A complete render preset.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RenderPreset {
    #[serde(default)]
    pub video: VideoSettings,

    #[serde(default)]
    pub audio: AudioSettings,

    /// Prefer a hardware encoder when a mapping exists
    #[serde(default)]
    pub use_gpu: bool,

    #[serde(default)]
    pub gpu_backend: GpuBackend,
}

impl RenderPreset {
    /// 1080p H.264 at CRF 23, the everyday export.
    pub fn standard() -> Self {
        Self::default()
    }

    /// Validate field ranges. Returns the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.video.width == 0 || self.video.height == 0 {
            return Err("video dimensions must be non-zero".into());
        }
        if self.video.framerate <= 0.0 {
            return Err("framerate must be positive".into());
        }
        if self.video.crf > 51 {
            return Err(format!("crf {} out of range (0-51)", self.video.crf));
        }
        if self.audio.channels == 0 {
            return Err("audio channels must be non-zero".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_preset_is_valid() {
        let preset = RenderPreset::default();
        assert!(preset.validate().is_ok());
        assert_eq!(preset.video.codec, "h264");
        assert_eq!(preset.video.crf, DEFAULT_CRF);
        assert!(!preset.use_gpu);
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let mut preset = RenderPreset::default();
        preset.video.crf = 60;
        assert!(preset.validate().is_err());

        let mut preset = RenderPreset::default();
        preset.video.width = 0;
        assert!(preset.validate().is_err());
    }

    #[test]
    fn test_preset_round_trip() {
        let mut preset = RenderPreset::default();
        preset.use_gpu = true;
        preset.gpu_backend = GpuBackend::Qsv;
        let json = serde_json::to_string(&preset).unwrap();
        let again: RenderPreset = serde_json::from_str(&json).unwrap();
        assert_eq!(again.gpu_backend, GpuBackend::Qsv);
    }
}
