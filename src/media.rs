use std::{path::Path, process::Command};

use serde::Deserialize;

use crate::error::{CineforgeError, CineforgeResult};

/// Sample rate assumed when a container does not declare one.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Static properties of a media file, as reported by ffprobe. Audio-only
/// files are valid; their video fields are zeroed and `has_video` is false.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaInfo {
    pub duration_sec: f64,
    pub has_video: bool,
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    pub video_codec: String,
    pub bit_rate: Option<String>,
    pub has_audio: bool,
    pub audio_codec: Option<String>,
    pub audio_sample_rate: u32,
    pub audio_channels: u16,
}

impl MediaInfo {
    pub fn fps(&self) -> f64 {
        if self.fps_den == 0 {
            return 0.0;
        }
        self.fps_num as f64 / self.fps_den as f64
    }
}

/// Runs `ffprobe` against `path` and parses the JSON report.
#[tracing::instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub fn probe(path: &Path) -> CineforgeResult<MediaInfo> {
    if !path.exists() {
        return Err(CineforgeError::validation(format!(
            "input file '{}' does not exist",
            path.display()
        )));
    }

    let out = Command::new("ffprobe")
        .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .output()
        .map_err(|e| CineforgeError::spawn(format!("failed to launch 'ffprobe': {e}")))?;

    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        return Err(CineforgeError::process_exit(format!(
            "ffprobe on '{}' exited with {}: {}",
            path.display(),
            out.status,
            stderr.trim()
        )));
    }

    parse_probe_json(&out.stdout)
}

#[derive(Deserialize)]
struct ProbeReport {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u16>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
}

pub(crate) fn parse_probe_json(bytes: &[u8]) -> CineforgeResult<MediaInfo> {
    let report: ProbeReport = serde_json::from_slice(bytes)
        .map_err(|e| CineforgeError::protocol(format!("unreadable ffprobe report: {e}")))?;

    let video = report
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let audio = report
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));
    if video.is_none() && audio.is_none() {
        return Err(CineforgeError::validation(
            "media has neither a video nor an audio stream",
        ));
    }

    let (width, height, fps_num, fps_den, video_codec) = match video {
        Some(v) => {
            let width = v.width.unwrap_or(0);
            let height = v.height.unwrap_or(0);
            if width == 0 || height == 0 {
                return Err(CineforgeError::protocol(
                    "ffprobe reported a video stream without dimensions",
                ));
            }
            let (num, den) = v
                .r_frame_rate
                .as_deref()
                .and_then(parse_ff_ratio)
                .ok_or_else(|| {
                    CineforgeError::protocol("ffprobe reported an unusable frame rate")
                })?;
            (width, height, num, den, v.codec_name.clone().unwrap_or_default())
        }
        None => (0, 0, 0, 1, String::new()),
    };

    let format = report.format;
    let duration_sec = format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(MediaInfo {
        duration_sec,
        has_video: video.is_some(),
        width,
        height,
        fps_num,
        fps_den,
        video_codec,
        bit_rate: format.and_then(|f| f.bit_rate),
        has_audio: audio.is_some(),
        audio_codec: audio.and_then(|a| a.codec_name.clone()),
        audio_sample_rate: audio
            .and_then(|a| a.sample_rate.as_deref())
            .and_then(|r| r.parse().ok())
            .unwrap_or(DEFAULT_SAMPLE_RATE),
        audio_channels: audio.and_then(|a| a.channels).unwrap_or(2),
    })
}

/// Parses ffprobe's "num/den" rational notation. Plain integers are accepted
/// as a denominator of 1.
fn parse_ff_ratio(s: &str) -> Option<(u32, u32)> {
    let s = s.trim();
    match s.split_once('/') {
        Some((num, den)) => {
            let num = num.trim().parse().ok()?;
            let den: u32 = den.trim().parse().ok()?;
            if den == 0 { None } else { Some((num, den)) }
        }
        None => s.parse().ok().map(|n| (n, 1)),
    }
}
