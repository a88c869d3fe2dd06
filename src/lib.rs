#![forbid(unsafe_code)]

pub mod chain;
pub mod clip;
pub mod composite;
pub mod composite_cpu;
pub mod decode_ffmpeg;
pub mod encode_ffmpeg;
pub mod error;
pub mod export;
pub mod frame;
pub mod fx;
pub mod fx_cpu;
pub mod media;
pub mod supervisor;

pub use chain::{EffectChain, EffectChainBuilder, presets};
pub use clip::{Clip, SolidSource, SourceClip};
pub use composite::{BlendMode, CompositeClip, Layer, Position};
pub use decode_ffmpeg::VideoSource;
pub use encode_ffmpeg::{AudioEncodeConfig, AudioEncoder, EncodeConfig, VideoEncoder};
pub use error::{CineforgeError, CineforgeResult};
pub use export::{WriteOptions, save_frame_png, write_audio, write_video};
pub use frame::Frame;
pub use fx::Effect;
pub use media::MediaInfo;
pub use supervisor::{ManagedProcess, ProcessExit, ProcessSupervisor, Spawned};
