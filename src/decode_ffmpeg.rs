use std::{
    io::Read,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::{
    error::{CineforgeError, CineforgeResult},
    frame::{self, Frame},
    media::{self, MediaInfo},
    supervisor::ProcessSupervisor,
};

/// Decoder for a single media file.
///
/// Every frame read spawns a short-lived ffmpeg seek-and-decode process under
/// the supervisor; there is no persistent decoder process to keep in sync.
/// `close` is a soft flag so shared handles can refuse further reads.
pub struct VideoSource {
    path: PathBuf,
    info: MediaInfo,
    supervisor: Arc<ProcessSupervisor>,
    closed: AtomicBool,
}

impl VideoSource {
    /// Probes `path` and prepares a decoder for it.
    #[tracing::instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(
        path: impl AsRef<Path>,
        supervisor: Arc<ProcessSupervisor>,
    ) -> CineforgeResult<Self> {
        let path = path.as_ref().to_path_buf();
        let info = media::probe(&path)?;
        tracing::debug!(
            width = info.width,
            height = info.height,
            fps = info.fps(),
            duration_sec = info.duration_sec,
            "opened video source"
        );
        Ok(Self {
            path,
            info,
            supervisor,
            closed: AtomicBool::new(false),
        })
    }

    pub fn info(&self) -> &MediaInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn supervisor(&self) -> &Arc<ProcessSupervisor> {
        &self.supervisor
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> CineforgeResult<()> {
        if self.is_closed() {
            return Err(CineforgeError::state(format!(
                "video source '{}' is closed",
                self.path.display()
            )));
        }
        Ok(())
    }

    fn check_time(&self, t_sec: f64) -> CineforgeResult<()> {
        if !t_sec.is_finite() || t_sec < 0.0 || t_sec > self.info.duration_sec {
            return Err(CineforgeError::range(format!(
                "timestamp {t_sec:.3}s outside [0, {:.3}]s of '{}'",
                self.info.duration_sec,
                self.path.display()
            )));
        }
        Ok(())
    }

    /// Decodes the frame at `t_sec` (millisecond-precision seek).
    ///
    /// Exactly `width * height * 3` bytes are read from the decoder; a short
    /// stream is a protocol error and the producing process is terminated.
    pub fn frame_at(&self, t_sec: f64) -> CineforgeResult<Frame> {
        self.ensure_open()?;
        if !self.info.has_video {
            return Err(CineforgeError::validation(format!(
                "'{}' has no video stream to decode frames from",
                self.path.display()
            )));
        }
        self.check_time(t_sec)?;

        let (width, height) = (self.info.width, self.info.height);
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-v", "error", "-ss", &format!("{t_sec:.3}")])
            .arg("-i")
            .arg(&self.path)
            .args([
                "-vframes", "1",
                "-f", "image2pipe",
                "-pix_fmt", "rgb24",
                "-vcodec", "rawvideo",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut spawned = self.supervisor.start(cmd)?;
        let mut stdout = spawned
            .stdout
            .take()
            .ok_or_else(|| CineforgeError::spawn("ffmpeg stdout pipe missing"))?;

        let mut buf = vec![0u8; frame::byte_len(width, height)];
        if let Err(e) = stdout.read_exact(&mut buf) {
            let _ = self.supervisor.terminate(spawned.process.pid());
            return Err(CineforgeError::protocol(format!(
                "short read before {} frame bytes at {t_sec:.3}s of '{}': {e}",
                buf.len(),
                self.path.display()
            )));
        }
        // Closing the pipe first means a misbehaving decoder that keeps
        // writing cannot wedge the wait below.
        drop(stdout);

        let exit = spawned.process.wait();
        if !exit.success() {
            return Err(CineforgeError::process_exit(format!(
                "ffmpeg decode at {t_sec:.3}s of '{}': {}",
                self.path.display(),
                exit.describe()
            )));
        }

        Frame::from_rgb(width, height, buf)
    }

    /// Decodes `dur_sec` seconds of audio starting at `t_sec` as interleaved
    /// f32le samples at the source's sample rate and channel count.
    ///
    /// A source without an audio stream yields silence of the requested
    /// length. Near end of stream ffmpeg may deliver fewer samples; the
    /// caller receives whatever whole samples arrived.
    pub fn audio_samples_at(&self, t_sec: f64, dur_sec: f64) -> CineforgeResult<Vec<f32>> {
        self.ensure_open()?;
        self.check_time(t_sec)?;
        if !dur_sec.is_finite() || dur_sec < 0.0 {
            return Err(CineforgeError::range(format!(
                "audio duration {dur_sec:.3}s must be non-negative"
            )));
        }

        let rate = self.info.audio_sample_rate;
        let channels = self.info.audio_channels as usize;
        if !self.info.has_audio {
            let n = (dur_sec * rate as f64) as usize * channels;
            return Ok(vec![0.0; n]);
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-v", "error", "-ss", &format!("{t_sec:.3}")])
            .arg("-i")
            .arg(&self.path)
            .args([
                "-t", &format!("{dur_sec:.3}"),
                "-f", "f32le",
                "-acodec", "pcm_f32le",
                "-ac", &channels.to_string(),
                "-ar", &rate.to_string(),
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut spawned = self.supervisor.start(cmd)?;
        let mut stdout = spawned
            .stdout
            .take()
            .ok_or_else(|| CineforgeError::spawn("ffmpeg stdout pipe missing"))?;

        let mut bytes = Vec::new();
        if let Err(e) = stdout.read_to_end(&mut bytes) {
            let _ = self.supervisor.terminate(spawned.process.pid());
            return Err(CineforgeError::protocol(format!(
                "audio read at {t_sec:.3}s of '{}': {e}",
                self.path.display()
            )));
        }
        drop(stdout);

        let exit = spawned.process.wait();
        if !exit.success() {
            return Err(CineforgeError::process_exit(format!(
                "ffmpeg audio decode at {t_sec:.3}s of '{}': {}",
                self.path.display(),
                exit.describe()
            )));
        }

        if bytes.len() % 4 != 0 {
            return Err(CineforgeError::protocol(format!(
                "audio stream delivered {} bytes, not a whole number of f32 samples",
                bytes.len()
            )));
        }
        Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }
}

impl Drop for VideoSource {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for VideoSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoSource")
            .field("path", &self.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}
