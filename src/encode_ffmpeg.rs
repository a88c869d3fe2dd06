use std::{
    io::{Read, Write},
    path::{Path, PathBuf},
    process::{ChildStderr, ChildStdin, Command, Stdio},
    sync::Arc,
};

use crate::{
    error::{CineforgeError, CineforgeResult},
    frame::Frame,
    supervisor::{ManagedProcess, ProcessSupervisor},
};

pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
pub const DEFAULT_VIDEO_BITRATE: &str = "1000k";
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";

#[derive(Clone, Debug)]
pub struct EncodeConfig {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: String,
    pub bitrate: String,
    pub out_path: PathBuf,
    pub overwrite: bool,
}

impl EncodeConfig {
    pub fn new(out_path: impl Into<PathBuf>, width: u32, height: u32, fps: f64) -> Self {
        Self {
            width,
            height,
            fps,
            codec: DEFAULT_VIDEO_CODEC.to_string(),
            bitrate: DEFAULT_VIDEO_BITRATE.to_string(),
            out_path: out_path.into(),
            overwrite: true,
        }
    }

    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = codec.into();
        self
    }

    pub fn with_bitrate(mut self, bitrate: impl Into<String>) -> Self {
        self.bitrate = bitrate.into();
        self
    }

    pub fn validate(&self) -> CineforgeResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(CineforgeError::validation(
                "encode width/height must be non-zero",
            ));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            // With the default settings we target yuv420p output for maximum compatibility.
            return Err(CineforgeError::validation(
                "encode width/height must be even (required for yuv420p mp4 output)",
            ));
        }
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(CineforgeError::validation("encode fps must be positive"));
        }
        Ok(())
    }
}

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

pub fn ensure_parent_dir(path: &Path) -> CineforgeResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Long-lived encoder process fed raw rgb24 frames on stdin.
///
/// The process is supervised; dropping an unfinished encoder terminates it
/// rather than leaving a half-written file behind an orphaned pipe.
pub struct VideoEncoder {
    cfg: EncodeConfig,
    supervisor: Arc<ProcessSupervisor>,
    process: ManagedProcess,
    stdin: Option<ChildStdin>,
    stderr: Option<ChildStderr>,
    frames_written: u64,
    finished: bool,
}

impl VideoEncoder {
    #[tracing::instrument(level = "debug", skip_all, fields(out = %cfg.out_path.display()))]
    pub fn open(cfg: EncodeConfig, supervisor: Arc<ProcessSupervisor>) -> CineforgeResult<Self> {
        cfg.validate()?;
        ensure_parent_dir(&cfg.out_path)?;

        let mut cmd = Command::new("ffmpeg");
        cmd.args([
            "-v", "error",
            "-f", "rawvideo",
            "-pix_fmt", "rgb24",
            "-s", &format!("{}x{}", cfg.width, cfg.height),
            "-r", &format!("{}", cfg.fps),
            "-i", "-",
            "-c:v", &cfg.codec,
            "-b:v", &cfg.bitrate,
            "-preset", "medium",
            "-crf", "23",
            "-pix_fmt", "yuv420p",
            "-threads", "1",
        ])
        .arg(if cfg.overwrite { "-y" } else { "-n" })
        .arg(&cfg.out_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

        let mut spawned = supervisor.start(cmd)?;
        let stdin = spawned
            .stdin
            .take()
            .ok_or_else(|| CineforgeError::spawn("ffmpeg stdin pipe missing"))?;
        let stderr = spawned.stderr.take();

        Ok(Self {
            cfg,
            supervisor,
            process: spawned.process,
            stdin: Some(stdin),
            stderr,
            frames_written: 0,
            finished: false,
        })
    }

    pub fn config(&self) -> &EncodeConfig {
        &self.cfg
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Writes one frame. Dimensions are checked against the configured
    /// geometry before any bytes hit the pipe; a mismatch would silently
    /// corrupt every subsequent frame boundary.
    pub fn write_frame(&mut self, frame: &Frame) -> CineforgeResult<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(CineforgeError::state("encoder is already finalized"));
        };

        if frame.size() != (self.cfg.width, self.cfg.height) {
            return Err(CineforgeError::protocol(format!(
                "frame is {}x{}, encoder expects {}x{}",
                frame.width(),
                frame.height(),
                self.cfg.width,
                self.cfg.height
            )));
        }

        // Fail fast if the encoder died under us instead of blocking on a
        // broken pipe.
        if let Some(exit) = self.process.exit() {
            return Err(CineforgeError::process_exit(format!(
                "encoder exited before frame {}: {}",
                self.frames_written,
                exit.describe()
            )));
        }

        if let Err(e) = stdin.write_all(frame.as_bytes()) {
            return Err(match self.process.exit() {
                Some(exit) => CineforgeError::process_exit(format!(
                    "encoder exited mid-write at frame {}: {}",
                    self.frames_written,
                    exit.describe()
                )),
                None => CineforgeError::protocol(format!(
                    "failed to write frame {} bytes: {e}",
                    self.frames_written
                )),
            });
        }
        self.frames_written += 1;
        Ok(())
    }

    /// Closes stdin and waits for the encoder to finish the file.
    pub fn finish(mut self) -> CineforgeResult<()> {
        drop(self.stdin.take());

        let mut diagnostics = String::new();
        if let Some(mut stderr) = self.stderr.take() {
            let _ = stderr.read_to_string(&mut diagnostics);
        }

        let exit = self.process.wait();
        self.finished = true;
        if !exit.success() {
            return Err(CineforgeError::process_exit(format!(
                "ffmpeg encode to '{}' failed ({}): {}",
                self.cfg.out_path.display(),
                exit.describe(),
                diagnostics.trim()
            )));
        }
        tracing::debug!(
            frames = self.frames_written,
            out = %self.cfg.out_path.display(),
            "encode finished"
        );
        Ok(())
    }
}

impl Drop for VideoEncoder {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        drop(self.stdin.take());
        if self.process.exit().is_none() {
            let _ = self.supervisor.terminate(self.process.pid());
        }
    }
}

#[derive(Clone, Debug)]
pub struct AudioEncodeConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub codec: String,
    pub bitrate: String,
    pub out_path: PathBuf,
    pub overwrite: bool,
}

impl AudioEncodeConfig {
    pub fn new(out_path: impl Into<PathBuf>, sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            codec: DEFAULT_AUDIO_CODEC.to_string(),
            bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
            out_path: out_path.into(),
            overwrite: true,
        }
    }

    pub fn validate(&self) -> CineforgeResult<()> {
        if self.sample_rate == 0 {
            return Err(CineforgeError::validation("sample rate must be non-zero"));
        }
        if self.channels == 0 {
            return Err(CineforgeError::validation("channel count must be non-zero"));
        }
        Ok(())
    }
}

/// Encoder fed interleaved f32le samples on stdin.
pub struct AudioEncoder {
    cfg: AudioEncodeConfig,
    supervisor: Arc<ProcessSupervisor>,
    process: ManagedProcess,
    stdin: Option<ChildStdin>,
    stderr: Option<ChildStderr>,
    finished: bool,
}

impl AudioEncoder {
    pub fn open(
        cfg: AudioEncodeConfig,
        supervisor: Arc<ProcessSupervisor>,
    ) -> CineforgeResult<Self> {
        cfg.validate()?;
        ensure_parent_dir(&cfg.out_path)?;

        let mut cmd = Command::new("ffmpeg");
        cmd.args([
            "-v", "error",
            "-f", "f32le",
            "-ar", &cfg.sample_rate.to_string(),
            "-ac", &cfg.channels.to_string(),
            "-i", "-",
            "-c:a", &cfg.codec,
            "-b:a", &cfg.bitrate,
        ])
        .arg(if cfg.overwrite { "-y" } else { "-n" })
        .arg(&cfg.out_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

        let mut spawned = supervisor.start(cmd)?;
        let stdin = spawned
            .stdin
            .take()
            .ok_or_else(|| CineforgeError::spawn("ffmpeg stdin pipe missing"))?;
        let stderr = spawned.stderr.take();

        Ok(Self {
            cfg,
            supervisor,
            process: spawned.process,
            stdin: Some(stdin),
            stderr,
            finished: false,
        })
    }

    pub fn write_samples(&mut self, samples: &[f32]) -> CineforgeResult<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(CineforgeError::state("encoder is already finalized"));
        };
        if let Some(exit) = self.process.exit() {
            return Err(CineforgeError::process_exit(format!(
                "audio encoder exited early: {}",
                exit.describe()
            )));
        }

        let mut bytes = Vec::with_capacity(samples.len() * 4);
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        stdin.write_all(&bytes).map_err(|e| {
            CineforgeError::protocol(format!("failed to write audio samples: {e}"))
        })
    }

    pub fn finish(mut self) -> CineforgeResult<()> {
        drop(self.stdin.take());

        let mut diagnostics = String::new();
        if let Some(mut stderr) = self.stderr.take() {
            let _ = stderr.read_to_string(&mut diagnostics);
        }

        let exit = self.process.wait();
        self.finished = true;
        if !exit.success() {
            return Err(CineforgeError::process_exit(format!(
                "ffmpeg audio encode to '{}' failed ({}): {}",
                self.cfg.out_path.display(),
                exit.describe(),
                diagnostics.trim()
            )));
        }
        Ok(())
    }
}

impl Drop for AudioEncoder {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        drop(self.stdin.take());
        if self.process.exit().is_none() {
            let _ = self.supervisor.terminate(self.process.pid());
        }
    }
}
