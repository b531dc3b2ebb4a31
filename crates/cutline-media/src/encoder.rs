//! Encoding preset resolver.
//!
//! A pure mapping from a [`RenderPreset`] to the encoder half of an FFmpeg
//! argument list. No process is invoked here; every branch is testable with
//! plain assertions.

use cutline_models::{GpuBackend, RenderPreset};

/// Resolve a preset into concrete encoder arguments.
pub fn resolve(preset: &RenderPreset) -> Vec<String> {
    let video = &preset.video;
    let audio = &preset.audio;
    let encoder = select_video_encoder(preset);
    let gpu = preset.use_gpu && encoder.is_gpu;

    let mut args: Vec<String> = vec!["-c:v".into(), encoder.name.to_string()];

    // Speed preset: x264 names pass straight through on CPU; nvenc takes
    // the coarse p-band equivalent; other GPU backends have no portable
    // preset flag.
    if gpu {
        if encoder.backend == Some(GpuBackend::Nvenc) {
            args.push("-preset".into());
            args.push(nvenc_preset_band(&video.preset).to_string());
            if video.two_pass {
                args.push("-multipass".into());
                args.push("qres".into());
            }
        }
    } else {
        args.push("-preset".into());
        args.push(video.preset.clone());
    }

    // Quality: constant-quality flag per encoder family.
    let quality_flag = if gpu {
        match encoder.backend {
            Some(GpuBackend::Nvenc) => "-cq",
            Some(GpuBackend::Qsv) => "-global_quality",
            Some(GpuBackend::Videotoolbox) => "-q:v",
            None => "-crf",
        }
    } else {
        "-crf"
    };
    args.push(quality_flag.into());
    args.push(video.crf.to_string());

    if let Some(bitrate) = &video.bitrate {
        args.push("-b:v".into());
        args.push(bitrate.clone());
    }

    args.push("-s:v".into());
    args.push(format!("{}x{}", video.width, video.height));
    args.push("-r".into());
    args.push(format_framerate(video.framerate));
    args.push("-pix_fmt".into());
    args.push(video.pixel_format.clone());

    if let Some(primaries) = &video.color_primaries {
        args.push("-color_primaries".into());
        args.push(primaries.clone());
    }
    if let Some(trc) = &video.color_trc {
        args.push("-color_trc".into());
        args.push(trc.clone());
    }
    if let Some(space) = &video.colorspace {
        args.push("-colorspace".into());
        args.push(space.clone());
    }

    args.push("-c:a".into());
    args.push(audio.codec.clone());
    args.push("-b:a".into());
    args.push(audio.bitrate.clone());
    args.push("-ar".into());
    args.push(audio.sample_rate.to_string());
    args.push("-ac".into());
    args.push(audio.channels.to_string());

    // Streamable output: moov atom up front.
    args.push("-movflags".into());
    args.push("+faststart".into());

    args
}

struct SelectedEncoder {
    name: &'static str,
    is_gpu: bool,
    backend: Option<GpuBackend>,
}

/// Pick the encoder binary name for the preset's codec family.
///
/// A GPU encoder is selected only when `use_gpu` is set and the
/// codec/backend pair has a known mapping; anything else falls back to the
/// CPU encoder.
fn select_video_encoder(preset: &RenderPreset) -> SelectedEncoder {
    let codec = preset.video.codec.as_str();
    if preset.use_gpu {
        if let Some(name) = gpu_encoder(codec, preset.gpu_backend) {
            return SelectedEncoder {
                name,
                is_gpu: true,
                backend: Some(preset.gpu_backend),
            };
        }
    }
    SelectedEncoder {
        name: cpu_encoder(codec),
        is_gpu: false,
        backend: None,
    }
}

fn cpu_encoder(codec: &str) -> &'static str {
    match codec {
        "h264" => "libx264",
        "hevc" | "h265" => "libx265",
        "av1" => "libaom-av1",
        "vp9" => "libvpx-vp9",
        _ => "libx264",
    }
}

fn gpu_encoder(codec: &str, backend: GpuBackend) -> Option<&'static str> {
    match (codec, backend) {
        ("h264", GpuBackend::Nvenc) => Some("h264_nvenc"),
        ("hevc" | "h265", GpuBackend::Nvenc) => Some("hevc_nvenc"),
        ("av1", GpuBackend::Nvenc) => Some("av1_nvenc"),
        ("h264", GpuBackend::Qsv) => Some("h264_qsv"),
        ("hevc" | "h265", GpuBackend::Qsv) => Some("hevc_qsv"),
        ("h264", GpuBackend::Videotoolbox) => Some("h264_videotoolbox"),
        ("hevc" | "h265", GpuBackend::Videotoolbox) => Some("hevc_videotoolbox"),
        _ => None,
    }
}

/// Collapse the nine x264 speed presets into nvenc's coarse p-bands.
fn nvenc_preset_band(x264_preset: &str) -> &'static str {
    match x264_preset {
        "ultrafast" | "superfast" => "p1",
        "veryfast" | "faster" => "p3",
        "fast" | "medium" => "p4",
        "slow" => "p5",
        "slower" => "p6",
        "veryslow" => "p7",
        _ => "p4",
    }
}

/// Frame rates print without a trailing fraction when whole.
fn format_framerate(fps: f64) -> String {
    if (fps - fps.round()).abs() < 1e-9 {
        format!("{}", fps.round() as u64)
    } else {
        format!("{fps}")
    }
}
