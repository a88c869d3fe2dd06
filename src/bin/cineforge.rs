use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cineforge::{Clip, ProcessSupervisor, WriteOptions, presets};

#[derive(Parser, Debug)]
#[command(name = "cineforge", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print media properties as JSON (requires `ffprobe` on PATH).
    Probe(ProbeArgs),
    /// Extract a single frame as a PNG (requires `ffmpeg` on PATH).
    Frame(FrameArgs),
    /// Render a processed clip to a video file (requires `ffmpeg` on PATH).
    Render(RenderArgs),
}

#[derive(Parser, Debug)]
struct ProbeArgs {
    /// Input media file.
    #[arg(long = "in")]
    in_path: PathBuf,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Input media file.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Timestamp in seconds.
    #[arg(long, default_value_t = 0.0)]
    time: f64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input media file.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output video path.
    #[arg(long)]
    out: PathBuf,

    /// Trim start, seconds.
    #[arg(long)]
    start: Option<f64>,

    /// Trim end, seconds.
    #[arg(long)]
    end: Option<f64>,

    /// Playback speed factor.
    #[arg(long)]
    speed: Option<f64>,

    /// Effect preset: vintage, cinematic, warm, cool or dramatic.
    #[arg(long)]
    preset: Option<String>,

    /// Video codec (default libx264).
    #[arg(long)]
    codec: Option<String>,

    /// Video bitrate (default 1000k).
    #[arg(long)]
    bitrate: Option<String>,

    /// Output frame rate (default: source frame rate).
    #[arg(long)]
    fps: Option<f64>,

    /// Also export the audio track to this path.
    #[arg(long)]
    audio_out: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Probe(args) => cmd_probe(args),
        Command::Frame(args) => cmd_frame(args),
        Command::Render(args) => cmd_render(args),
    }
}

fn cmd_probe(args: ProbeArgs) -> anyhow::Result<()> {
    let info = cineforge::media::probe(&args.in_path)?;
    println!(
        "{}",
        serde_json::json!({
            "duration_sec": info.duration_sec,
            "width": info.width,
            "height": info.height,
            "fps": info.fps(),
            "video_codec": info.video_codec,
            "bit_rate": info.bit_rate,
            "has_audio": info.has_audio,
            "audio_codec": info.audio_codec,
            "audio_sample_rate": info.audio_sample_rate,
            "audio_channels": info.audio_channels,
        })
    );
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let supervisor = Arc::new(ProcessSupervisor::new());
    let clip = Clip::open(&args.in_path, Arc::clone(&supervisor))?;
    let frame = clip.frame_at(args.time)?;
    cineforge::save_frame_png(&frame, &args.out)?;
    supervisor.close();
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let supervisor = Arc::new(ProcessSupervisor::new());
    let mut clip = Clip::open(&args.in_path, Arc::clone(&supervisor))?;

    if args.start.is_some() || args.end.is_some() {
        let start = args.start.unwrap_or(0.0);
        let end = args.end.unwrap_or_else(|| clip.duration_sec());
        clip = clip.subclip(start, end)?;
    }
    if let Some(speed) = args.speed {
        clip = clip.with_speed(speed)?;
    }
    if let Some(name) = &args.preset {
        let chain = presets::by_name(name)
            .with_context(|| format!("unknown preset '{name}'"))?;
        clip = clip.with_effects(chain);
    }

    let opts = WriteOptions {
        fps: args.fps,
        codec: args.codec.clone(),
        bitrate: args.bitrate.clone(),
        ..WriteOptions::default()
    };
    cineforge::write_video(&clip, &args.out, &opts, &supervisor)?;
    eprintln!("wrote {}", args.out.display());

    if let Some(audio_out) = &args.audio_out {
        cineforge::write_audio(&clip, audio_out, &opts, &supervisor)?;
        eprintln!("wrote {}", audio_out.display());
    }

    supervisor.close();
    Ok(())
}
