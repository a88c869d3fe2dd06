//! End-to-end pipeline tests against a synthesized clip. Every test is a
//! no-op when ffmpeg/ffprobe are not on PATH.

use std::{path::Path, process::Command, sync::Arc};

use cineforge::{
    BlendMode, CineforgeError, Clip, CompositeClip, EncodeConfig, Frame, Layer,
    ProcessSupervisor, VideoEncoder, WriteOptions, presets,
};

fn ffmpeg_tools_available() -> bool {
    let ffmpeg_ok = Command::new("ffmpeg")
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false);
    let ffprobe_ok = Command::new("ffprobe")
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false);
    ffmpeg_ok && ffprobe_ok
}

fn synth_clip(path: &Path, seconds: u32) -> anyhow::Result<()> {
    let status = Command::new("ffmpeg")
        .args([
            "-v",
            "error",
            "-y",
            "-f",
            "lavfi",
            "-i",
            "testsrc=size=64x64:rate=30",
            "-f",
            "lavfi",
            "-i",
            "sine=frequency=440:sample_rate=48000",
            "-t",
            &seconds.to_string(),
            "-pix_fmt",
            "yuv420p",
            "-c:v",
            "libx264",
            "-c:a",
            "aac",
        ])
        .arg(path)
        .status()?;
    anyhow::ensure!(status.success(), "ffmpeg failed creating test clip");
    Ok(())
}

fn synth_audio(path: &Path, seconds: u32) -> anyhow::Result<()> {
    let status = Command::new("ffmpeg")
        .args([
            "-v",
            "error",
            "-y",
            "-f",
            "lavfi",
            "-i",
            "sine=frequency=440:sample_rate=48000",
            "-t",
            &seconds.to_string(),
            "-c:a",
            "pcm_s16le",
        ])
        .arg(path)
        .status()?;
    anyhow::ensure!(status.success(), "ffmpeg failed creating test audio");
    Ok(())
}

#[test]
fn probe_reports_synthesized_properties() {
    if !ffmpeg_tools_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.mp4");
    synth_clip(&path, 2).unwrap();

    let info = cineforge::media::probe(&path).unwrap();
    assert_eq!(info.width, 64);
    assert_eq!(info.height, 64);
    assert!((info.fps() - 30.0).abs() < 0.01);
    assert!(info.duration_sec > 1.5 && info.duration_sec < 2.5);
    assert!(info.has_audio);
    assert_eq!(info.audio_sample_rate, 48_000);
}

#[test]
fn frame_decode_honors_the_byte_contract() {
    if !ffmpeg_tools_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.mp4");
    synth_clip(&path, 1).unwrap();

    let supervisor = Arc::new(ProcessSupervisor::new());
    let clip = Clip::open(&path, Arc::clone(&supervisor)).unwrap();
    let frame = clip.frame_at(0.5).unwrap();
    assert_eq!(frame.size(), (64, 64));
    assert_eq!(frame.as_bytes().len(), 64 * 64 * 3);

    // testsrc is colorful; the frame must not be all black.
    assert!(frame.as_bytes().iter().any(|&b| b > 16));

    // Out-of-range timestamps are rejected without spawning anything.
    assert!(clip.frame_at(99.0).is_err());
    assert!(clip.frame_at(-1.0).is_err());

    supervisor.close();
    assert_eq!(supervisor.process_count(), 0);
}

#[test]
fn trimmed_sped_and_graded_clip_renders_to_mp4() {
    if !ffmpeg_tools_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("clip.mp4");
    synth_clip(&src, 2).unwrap();

    let supervisor = Arc::new(ProcessSupervisor::new());
    let clip = Clip::open(&src, Arc::clone(&supervisor))
        .unwrap()
        .subclip(0.2, 1.4)
        .unwrap()
        .with_speed(2.0)
        .unwrap()
        .with_effects(presets::cinematic());
    assert!((clip.duration_sec() - 0.6).abs() < 1e-9);

    let out = dir.path().join("out.mp4");
    cineforge::write_video(&clip, &out, &WriteOptions::default(), &supervisor).unwrap();
    assert!(out.exists());

    let info = cineforge::media::probe(&out).unwrap();
    assert_eq!((info.width, info.height), (64, 64));
    assert!(info.duration_sec > 0.3);

    supervisor.close();
    assert_eq!(supervisor.process_count(), 0);
}

#[test]
fn composite_over_video_base_renders() {
    if !ffmpeg_tools_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("clip.mp4");
    synth_clip(&src, 1).unwrap();

    let supervisor = Arc::new(ProcessSupervisor::new());
    let base = Clip::open(&src, Arc::clone(&supervisor)).unwrap();
    let overlay = Clip::solid(32, 32, [255, 255, 255], 30.0, 1.0).unwrap();
    let comp = CompositeClip::new(vec![
        Layer::new(base),
        Layer::new(overlay)
            .centered()
            .with_blend(BlendMode::Screen)
            .with_opacity(0.6),
    ])
    .unwrap();

    let frame = comp.frame_at(0.25).unwrap();
    assert_eq!(frame.size(), (64, 64));

    let out = dir.path().join("comp.mp4");
    cineforge::write_video(
        &Clip::Composite(comp),
        &out,
        &WriteOptions::default(),
        &supervisor,
    )
    .unwrap();
    assert!(out.exists());

    supervisor.close();
}

#[test]
fn audio_track_exports_standalone() {
    if !ffmpeg_tools_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("clip.mp4");
    synth_clip(&src, 1).unwrap();

    let supervisor = Arc::new(ProcessSupervisor::new());
    let clip = Clip::open(&src, Arc::clone(&supervisor))
        .unwrap()
        .with_volume(0.5)
        .unwrap();
    assert!(clip.has_audio());

    // A sine at half volume still carries signal.
    let samples = clip.audio_frame_at(0.1, 0.2).unwrap();
    assert!(!samples.is_empty());
    assert!(samples.iter().any(|s| s.abs() > 0.01));

    let out = dir.path().join("audio.aac");
    cineforge::write_audio(&clip, &out, &WriteOptions::default(), &supervisor).unwrap();
    assert!(out.exists());
    assert!(std::fs::metadata(&out).unwrap().len() > 0);

    supervisor.close();
}

#[test]
fn encoder_rejects_mismatched_frame_without_writing() {
    if !ffmpeg_tools_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.mp4");

    let supervisor = Arc::new(ProcessSupervisor::new());
    let cfg = EncodeConfig::new(&out, 64, 64, 30.0);
    let mut enc = VideoEncoder::open(cfg, Arc::clone(&supervisor)).unwrap();

    // Wrong geometry must be refused before any bytes hit the pipe; a partial
    // frame would shift every later frame boundary.
    let err = enc
        .write_frame(&Frame::solid(32, 32, [40, 40, 40]))
        .unwrap_err();
    assert!(matches!(err, CineforgeError::Protocol(_)));
    assert_eq!(enc.frames_written(), 0);

    // The encoder is still usable for correctly sized frames.
    for _ in 0..8 {
        enc.write_frame(&Frame::solid(64, 64, [40, 40, 40])).unwrap();
    }
    assert_eq!(enc.frames_written(), 8);
    enc.finish().unwrap();
    assert!(out.exists());

    supervisor.close();
}

#[test]
fn audio_only_file_opens_as_audio_clip() {
    if !ffmpeg_tools_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("tone.wav");
    synth_audio(&src, 1).unwrap();

    let supervisor = Arc::new(ProcessSupervisor::new());

    // No video stream, so it is not a video clip.
    let err = Clip::open(&src, Arc::clone(&supervisor)).unwrap_err();
    assert!(matches!(err, CineforgeError::Validation(_)));

    let clip = Clip::open_audio(&src, Arc::clone(&supervisor)).unwrap();
    assert!(clip.has_audio());
    assert_eq!(clip.audio_sample_rate(), 48_000);
    assert!(clip.duration_sec() > 0.5);
    assert!(matches!(
        clip.frame_at(0.0).unwrap_err(),
        CineforgeError::Validation(_)
    ));

    let samples = clip.audio_frame_at(0.1, 0.2).unwrap();
    assert!(samples.iter().any(|s| s.abs() > 0.01));

    let out = dir.path().join("tone.aac");
    cineforge::write_audio(&clip, &out, &WriteOptions::default(), &supervisor).unwrap();
    assert!(std::fs::metadata(&out).unwrap().len() > 0);

    supervisor.close();
}

#[test]
fn audio_track_can_be_stripped_and_replaced() {
    if !ffmpeg_tools_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let video = dir.path().join("clip.mp4");
    synth_clip(&video, 1).unwrap();
    let tone = dir.path().join("tone.wav");
    synth_audio(&tone, 1).unwrap();

    let supervisor = Arc::new(ProcessSupervisor::new());

    let muted = Clip::open(&video, Arc::clone(&supervisor)).unwrap().without_audio();
    assert!(!muted.has_audio());
    assert!(muted.frame_at(0.5).is_ok());
    assert!(muted.audio_frame_at(0.2, 0.1).unwrap().iter().all(|&s| s == 0.0));

    let track = Clip::open_audio(&tone, Arc::clone(&supervisor)).unwrap();
    let dubbed = Clip::open(&video, Arc::clone(&supervisor))
        .unwrap()
        .with_audio(track)
        .unwrap();
    assert!(dubbed.has_audio());
    assert_eq!(dubbed.audio_sample_rate(), 48_000);
    assert!(dubbed.frame_at(0.5).is_ok());
    let samples = dubbed.audio_frame_at(0.1, 0.2).unwrap();
    assert!(samples.iter().any(|s| s.abs() > 0.01));

    let out = dir.path().join("dubbed.mp4");
    cineforge::write_video(&dubbed, &out, &WriteOptions::default(), &supervisor).unwrap();
    assert!(out.exists());

    supervisor.close();
}
