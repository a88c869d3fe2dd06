use std::{path::Path, sync::Arc};

use crate::{
    chain::EffectChain,
    composite::CompositeClip,
    decode_ffmpeg::VideoSource,
    error::{CineforgeError, CineforgeResult},
    frame::Frame,
    fx::Effect,
    media::DEFAULT_SAMPLE_RATE,
    supervisor::ProcessSupervisor,
};

/// Leaf of a clip tree: a decodable origin of frames or samples.
#[derive(Clone, Debug)]
pub enum SourceClip {
    /// An ffmpeg-decoded media file. The decoder is shared; wrapping a source
    /// in several clips costs one probe, not one decoder per clip.
    Video(Arc<VideoSource>),
    /// An audio-only media file. Carries no frames; decoding one is an error.
    Audio(Arc<VideoSource>),
    /// A synthetic single-color source. No subprocess involved.
    Solid(SolidSource),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SolidSource {
    pub width: u32,
    pub height: u32,
    pub rgb: [u8; 3],
    pub fps: f64,
    pub duration_sec: f64,
}

/// A composable timeline node. Wrappers are explicit variants rather than a
/// trait object, so every derived property is an exhaustive match and adding
/// a transform forces every site to account for it.
///
/// Time always flows downward: `frame_at(t)` takes a timestamp local to this
/// clip and each wrapper translates it for its inner clip.
#[derive(Clone, Debug)]
pub enum Clip {
    Source(SourceClip),
    /// A [start, end) window into the inner clip's timeline.
    Window {
        inner: Box<Clip>,
        start_sec: f64,
        end_sec: f64,
    },
    /// Playback-rate change; factor 2 plays twice as fast.
    Speed { inner: Box<Clip>, factor: f64 },
    /// Audio gain; frames pass through untouched.
    Volume { inner: Box<Clip>, factor: f32 },
    /// Audio track override: `None` strips the audio, `Some` replaces it with
    /// another clip's track. Frames pass through untouched.
    AudioTrack {
        inner: Box<Clip>,
        track: Option<Box<Clip>>,
    },
    /// Per-frame effect pipeline.
    Effects { inner: Box<Clip>, chain: EffectChain },
    Composite(CompositeClip),
}

impl Clip {
    /// Opens a media file with a video stream as a clip.
    pub fn open(
        path: impl AsRef<Path>,
        supervisor: Arc<ProcessSupervisor>,
    ) -> CineforgeResult<Self> {
        let source = VideoSource::open(path, supervisor)?;
        if !source.info().has_video {
            return Err(CineforgeError::validation(format!(
                "'{}' has no video stream; use an audio clip for audio-only files",
                source.path().display()
            )));
        }
        Ok(Clip::Source(SourceClip::Video(Arc::new(source))))
    }

    /// Opens an audio file (or the audio side of any media file) as a
    /// frameless clip. Useful as a replacement track for `with_audio`.
    pub fn open_audio(
        path: impl AsRef<Path>,
        supervisor: Arc<ProcessSupervisor>,
    ) -> CineforgeResult<Self> {
        let source = VideoSource::open(path, supervisor)?;
        if !source.info().has_audio {
            return Err(CineforgeError::validation(format!(
                "'{}' has no audio stream",
                source.path().display()
            )));
        }
        Ok(Clip::Source(SourceClip::Audio(Arc::new(source))))
    }

    pub fn from_source(source: Arc<VideoSource>) -> Self {
        Clip::Source(SourceClip::Video(source))
    }

    /// A solid color clip, handy for backgrounds and tests.
    pub fn solid(
        width: u32,
        height: u32,
        rgb: [u8; 3],
        fps: f64,
        duration_sec: f64,
    ) -> CineforgeResult<Self> {
        if width == 0 || height == 0 {
            return Err(CineforgeError::validation("solid clip needs non-zero dimensions"));
        }
        if !fps.is_finite() || fps <= 0.0 {
            return Err(CineforgeError::validation("solid clip fps must be positive"));
        }
        if !duration_sec.is_finite() || duration_sec < 0.0 {
            return Err(CineforgeError::validation("solid clip duration must be non-negative"));
        }
        Ok(Clip::Source(SourceClip::Solid(SolidSource {
            width,
            height,
            rgb,
            fps,
            duration_sec,
        })))
    }

    pub fn duration_sec(&self) -> f64 {
        match self {
            Clip::Source(SourceClip::Video(v)) | Clip::Source(SourceClip::Audio(v)) => {
                v.info().duration_sec
            }
            Clip::Source(SourceClip::Solid(s)) => s.duration_sec,
            Clip::Window { start_sec, end_sec, .. } => end_sec - start_sec,
            Clip::Speed { inner, factor } => inner.duration_sec() / factor,
            Clip::Volume { inner, .. }
            | Clip::AudioTrack { inner, .. }
            | Clip::Effects { inner, .. } => inner.duration_sec(),
            Clip::Composite(c) => c.duration_sec(),
        }
    }

    pub fn fps(&self) -> f64 {
        match self {
            Clip::Source(SourceClip::Video(v)) => v.info().fps(),
            Clip::Source(SourceClip::Audio(_)) => 0.0,
            Clip::Source(SourceClip::Solid(s)) => s.fps,
            Clip::Window { inner, .. }
            | Clip::Speed { inner, .. }
            | Clip::Volume { inner, .. }
            | Clip::AudioTrack { inner, .. }
            | Clip::Effects { inner, .. } => inner.fps(),
            Clip::Composite(c) => c.fps(),
        }
    }

    pub fn size(&self) -> (u32, u32) {
        match self {
            Clip::Source(SourceClip::Video(v)) => (v.info().width, v.info().height),
            Clip::Source(SourceClip::Audio(_)) => (0, 0),
            Clip::Source(SourceClip::Solid(s)) => (s.width, s.height),
            Clip::Window { inner, .. }
            | Clip::Speed { inner, .. }
            | Clip::Volume { inner, .. }
            | Clip::AudioTrack { inner, .. } => inner.size(),
            Clip::Effects { inner, chain } => {
                let (w, h) = inner.size();
                chain.output_size(w, h)
            }
            Clip::Composite(c) => c.size(),
        }
    }

    pub fn width(&self) -> u32 {
        self.size().0
    }

    pub fn height(&self) -> u32 {
        self.size().1
    }

    pub fn has_audio(&self) -> bool {
        match self {
            Clip::Source(SourceClip::Video(v)) => v.info().has_audio,
            Clip::Source(SourceClip::Audio(_)) => true,
            Clip::Source(SourceClip::Solid(_)) => false,
            Clip::AudioTrack { track, .. } => track.as_ref().is_some_and(|t| t.has_audio()),
            Clip::Window { inner, .. }
            | Clip::Speed { inner, .. }
            | Clip::Volume { inner, .. }
            | Clip::Effects { inner, .. } => inner.has_audio(),
            Clip::Composite(c) => c.base().has_audio(),
        }
    }

    pub fn audio_sample_rate(&self) -> u32 {
        match self {
            Clip::Source(SourceClip::Video(v)) | Clip::Source(SourceClip::Audio(v)) => {
                v.info().audio_sample_rate
            }
            Clip::Source(SourceClip::Solid(_)) => DEFAULT_SAMPLE_RATE,
            Clip::AudioTrack { track, .. } => track
                .as_ref()
                .map_or(DEFAULT_SAMPLE_RATE, |t| t.audio_sample_rate()),
            Clip::Window { inner, .. }
            | Clip::Speed { inner, .. }
            | Clip::Volume { inner, .. }
            | Clip::Effects { inner, .. } => inner.audio_sample_rate(),
            Clip::Composite(c) => c.base().audio_sample_rate(),
        }
    }

    pub fn audio_channels(&self) -> u16 {
        match self {
            Clip::Source(SourceClip::Video(v)) | Clip::Source(SourceClip::Audio(v)) => {
                v.info().audio_channels
            }
            Clip::Source(SourceClip::Solid(_)) => 2,
            Clip::AudioTrack { track, .. } => {
                track.as_ref().map_or(2, |t| t.audio_channels())
            }
            Clip::Window { inner, .. }
            | Clip::Speed { inner, .. }
            | Clip::Volume { inner, .. }
            | Clip::Effects { inner, .. } => inner.audio_channels(),
            Clip::Composite(c) => c.base().audio_channels(),
        }
    }

    /// Maps a timestamp local to this clip down to the underlying source's
    /// timeline. Pure; decodes nothing.
    pub fn source_time_sec(&self, t_sec: f64) -> f64 {
        match self {
            Clip::Source(_) | Clip::Composite(_) => t_sec,
            Clip::Window { inner, start_sec, .. } => inner.source_time_sec(start_sec + t_sec),
            Clip::Speed { inner, factor } => inner.source_time_sec(t_sec * factor),
            Clip::Volume { inner, .. }
            | Clip::AudioTrack { inner, .. }
            | Clip::Effects { inner, .. } => inner.source_time_sec(t_sec),
        }
    }

    /// Decodes the frame at local time `t_sec`.
    pub fn frame_at(&self, t_sec: f64) -> CineforgeResult<Frame> {
        match self {
            Clip::Source(SourceClip::Video(v)) => v.frame_at(t_sec),
            Clip::Source(SourceClip::Audio(a)) => Err(CineforgeError::validation(format!(
                "'{}' is an audio clip and has no frames",
                a.path().display()
            ))),
            Clip::Source(SourceClip::Solid(s)) => {
                check_local_time(t_sec, s.duration_sec)?;
                Ok(Frame::solid(s.width, s.height, s.rgb))
            }
            Clip::Window { inner, start_sec, end_sec } => {
                check_local_time(t_sec, end_sec - start_sec)?;
                inner.frame_at(start_sec + t_sec)
            }
            Clip::Speed { inner, factor } => inner.frame_at(t_sec * factor),
            Clip::Volume { inner, .. } | Clip::AudioTrack { inner, .. } => inner.frame_at(t_sec),
            Clip::Effects { inner, chain } => chain.apply(&inner.frame_at(t_sec)?),
            Clip::Composite(c) => c.frame_at(t_sec),
        }
    }

    /// Decodes `dur_sec` seconds of interleaved f32 samples at local time
    /// `t_sec`. Speed changes shift where audio is read from but do not
    /// resample it.
    pub fn audio_frame_at(&self, t_sec: f64, dur_sec: f64) -> CineforgeResult<Vec<f32>> {
        match self {
            Clip::Source(SourceClip::Video(v)) | Clip::Source(SourceClip::Audio(v)) => {
                v.audio_samples_at(t_sec, dur_sec)
            }
            Clip::Source(SourceClip::Solid(s)) => {
                check_local_time(t_sec, s.duration_sec)?;
                let n = (dur_sec * DEFAULT_SAMPLE_RATE as f64) as usize * 2;
                Ok(vec![0.0; n])
            }
            Clip::Window { inner, start_sec, end_sec } => {
                check_local_time(t_sec, end_sec - start_sec)?;
                inner.audio_frame_at(start_sec + t_sec, dur_sec)
            }
            Clip::Speed { inner, factor } => inner.audio_frame_at(t_sec * factor, dur_sec),
            Clip::Volume { inner, factor } => {
                let mut samples = inner.audio_frame_at(t_sec, dur_sec)?;
                for s in &mut samples {
                    *s *= factor;
                }
                Ok(samples)
            }
            Clip::AudioTrack { inner, track } => {
                check_local_time(t_sec, inner.duration_sec())?;
                match track {
                    Some(t) => t.audio_frame_at(t_sec, dur_sec),
                    None => {
                        let n = (dur_sec * DEFAULT_SAMPLE_RATE as f64) as usize * 2;
                        Ok(vec![0.0; n])
                    }
                }
            }
            Clip::Effects { inner, .. } => inner.audio_frame_at(t_sec, dur_sec),
            Clip::Composite(c) => c.base().audio_frame_at(t_sec, dur_sec),
        }
    }

    /// Restricts this clip to the local time window [start, end).
    pub fn subclip(self, start_sec: f64, end_sec: f64) -> CineforgeResult<Self> {
        let duration = self.duration_sec();
        if !start_sec.is_finite() || !end_sec.is_finite() || start_sec < 0.0 {
            return Err(CineforgeError::range(format!(
                "subclip bounds [{start_sec}, {end_sec}) must be finite and non-negative"
            )));
        }
        if start_sec >= end_sec {
            return Err(CineforgeError::range(format!(
                "subclip start {start_sec}s must precede end {end_sec}s"
            )));
        }
        if end_sec > duration {
            return Err(CineforgeError::range(format!(
                "subclip end {end_sec}s exceeds clip duration {duration:.3}s"
            )));
        }
        Ok(Clip::Window {
            inner: Box::new(self),
            start_sec,
            end_sec,
        })
    }

    pub fn with_speed(self, factor: f64) -> CineforgeResult<Self> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(CineforgeError::validation(format!(
                "speed factor {factor} must be positive"
            )));
        }
        Ok(Clip::Speed { inner: Box::new(self), factor })
    }

    pub fn with_volume(self, factor: f32) -> CineforgeResult<Self> {
        if !factor.is_finite() || factor < 0.0 {
            return Err(CineforgeError::validation(format!(
                "volume factor {factor} must be non-negative"
            )));
        }
        Ok(Clip::Volume { inner: Box::new(self), factor })
    }

    /// Strips the audio track; frames are unaffected and `audio_frame_at`
    /// yields silence.
    pub fn without_audio(self) -> Self {
        Clip::AudioTrack { inner: Box::new(self), track: None }
    }

    /// Replaces the audio track with another clip's. The replacement is read
    /// on this clip's local timeline starting at zero.
    pub fn with_audio(self, track: Clip) -> CineforgeResult<Self> {
        if !track.has_audio() {
            return Err(CineforgeError::validation(
                "replacement audio track carries no audio",
            ));
        }
        Ok(Clip::AudioTrack {
            inner: Box::new(self),
            track: Some(Box::new(track)),
        })
    }

    pub fn with_effects(self, chain: EffectChain) -> Self {
        Clip::Effects { inner: Box::new(self), chain }
    }

    /// Appends one effect, extending an existing effect stage if this clip
    /// already ends in one.
    pub fn with_effect(self, effect: Effect) -> Self {
        match self {
            Clip::Effects { inner, mut chain } => {
                chain.push(effect);
                Clip::Effects { inner, chain }
            }
            other => {
                let mut chain = EffectChain::new();
                chain.push(effect);
                Clip::Effects { inner: Box::new(other), chain }
            }
        }
    }
}

fn check_local_time(t_sec: f64, duration_sec: f64) -> CineforgeResult<()> {
    if !t_sec.is_finite() || t_sec < 0.0 || t_sec > duration_sec {
        return Err(CineforgeError::range(format!(
            "timestamp {t_sec:.3}s outside [0, {duration_sec:.3}]s"
        )));
    }
    Ok(())
}
