use std::{path::Path, sync::Arc};

use crate::{
    clip::Clip,
    encode_ffmpeg::{AudioEncodeConfig, AudioEncoder, EncodeConfig, VideoEncoder},
    error::{CineforgeError, CineforgeResult},
    frame::Frame,
    supervisor::ProcessSupervisor,
};

/// Audio chunk length fed to the audio encoder per iteration.
const AUDIO_CHUNK_SEC: f64 = 0.5;

#[derive(Clone, Debug, Default)]
pub struct WriteOptions {
    /// Output frame rate; defaults to the clip's own.
    pub fps: Option<f64>,
    pub codec: Option<String>,
    pub bitrate: Option<String>,
    pub audio_codec: Option<String>,
    pub audio_bitrate: Option<String>,
}

/// Renders `clip` frame by frame into an encoder writing `out_path`.
#[tracing::instrument(level = "info", skip_all, fields(out = %out_path.display()))]
pub fn write_video(
    clip: &Clip,
    out_path: &Path,
    opts: &WriteOptions,
    supervisor: &Arc<ProcessSupervisor>,
) -> CineforgeResult<()> {
    let (width, height) = clip.size();
    let fps = opts.fps.unwrap_or_else(|| clip.fps());
    let duration = clip.duration_sec();
    if duration <= 0.0 {
        return Err(CineforgeError::validation("clip has no duration to render"));
    }

    let mut cfg = EncodeConfig::new(out_path, width, height, fps);
    if let Some(codec) = &opts.codec {
        cfg = cfg.with_codec(codec.clone());
    }
    if let Some(bitrate) = &opts.bitrate {
        cfg = cfg.with_bitrate(bitrate.clone());
    }

    let mut encoder = VideoEncoder::open(cfg, Arc::clone(supervisor))?;
    let total = (duration * fps).ceil() as u64;
    tracing::info!(total, width, height, fps, "starting render");

    for i in 0..total {
        let t = i as f64 / fps;
        if t > duration {
            break;
        }
        let frame = clip.frame_at(t)?;
        encoder.write_frame(&frame)?;
        if i % 100 == 0 {
            tracing::info!(frame = i, total, "render progress");
        }
    }
    encoder.finish()
}

/// Renders `clip`'s audio track into a standalone audio file. Video and
/// audio are exported separately; muxing them is the caller's concern.
#[tracing::instrument(level = "info", skip_all, fields(out = %out_path.display()))]
pub fn write_audio(
    clip: &Clip,
    out_path: &Path,
    opts: &WriteOptions,
    supervisor: &Arc<ProcessSupervisor>,
) -> CineforgeResult<()> {
    if !clip.has_audio() {
        return Err(CineforgeError::validation("clip carries no audio stream"));
    }
    let duration = clip.duration_sec();
    if duration <= 0.0 {
        return Err(CineforgeError::validation("clip has no duration to render"));
    }

    let mut cfg = AudioEncodeConfig::new(
        out_path,
        clip.audio_sample_rate(),
        clip.audio_channels(),
    );
    if let Some(codec) = &opts.audio_codec {
        cfg.codec = codec.clone();
    }
    if let Some(bitrate) = &opts.audio_bitrate {
        cfg.bitrate = bitrate.clone();
    }

    let mut encoder = AudioEncoder::open(cfg, Arc::clone(supervisor))?;
    let mut t = 0.0;
    while t < duration {
        let chunk = AUDIO_CHUNK_SEC.min(duration - t);
        let samples = clip.audio_frame_at(t, chunk)?;
        encoder.write_samples(&samples)?;
        t += chunk;
    }
    encoder.finish()
}

/// Saves one frame as a PNG.
pub fn save_frame_png(frame: &Frame, out_path: &Path) -> CineforgeResult<()> {
    crate::encode_ffmpeg::ensure_parent_dir(out_path)?;
    let (w, h) = frame.size();
    let img = image::RgbImage::from_raw(w, h, frame.as_bytes().to_vec()).ok_or_else(|| {
        CineforgeError::protocol("frame byte length does not match its geometry")
    })?;
    img.save(out_path)
        .map_err(|e| CineforgeError::validation(format!(
            "failed to save '{}': {e}",
            out_path.display()
        )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_duration_clip_is_rejected() {
        let sup = Arc::new(ProcessSupervisor::new());
        let clip = Clip::solid(8, 8, [0, 0, 0], 30.0, 0.0).unwrap();
        let err = write_video(&clip, Path::new("/tmp/never.mp4"), &WriteOptions::default(), &sup)
            .unwrap_err();
        assert!(matches!(err, CineforgeError::Validation(_)));
    }

    #[test]
    fn audio_export_requires_an_audio_stream() {
        let sup = Arc::new(ProcessSupervisor::new());
        let clip = Clip::solid(8, 8, [0, 0, 0], 30.0, 1.0).unwrap();
        let err = write_audio(&clip, Path::new("/tmp/never.aac"), &WriteOptions::default(), &sup)
            .unwrap_err();
        assert!(matches!(err, CineforgeError::Validation(_)));
    }

    #[test]
    fn png_save_roundtrips_through_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        let frame = Frame::solid(16, 16, [10, 200, 40]);
        save_frame_png(&frame, &path).unwrap();
        let loaded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(loaded.dimensions(), (16, 16));
        assert_eq!(loaded.get_pixel(8, 8).0, [10, 200, 40]);
    }
}
