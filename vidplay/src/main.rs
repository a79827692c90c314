use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vidplay::media_types::MediaInfo;
use vidplay::{
    AudioOutput, MediaBackend, PlaybackState, Player, PlayerConfig, SnapshotSurface,
    SyntheticBackend, SyntheticMedia,
};

/// How often the progress line is refreshed.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(name = "vidplay")]
#[command(about = "Threaded audio/video playback engine")]
struct Args {
    /// Player configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the streams of a media file
    Probe { path: PathBuf },
    /// Play a media file
    Play {
        path: PathBuf,
        #[command(flatten)]
        options: PlayOptions,
    },
    /// Play a generated test pattern and tone
    Demo {
        /// Length of the generated media
        #[arg(long, default_value = "10")]
        seconds: u64,
        #[command(flatten)]
        options: PlayOptions,
    },
    /// Decode every video frame of a file to raw RGBA, without pacing
    Dump { path: PathBuf, output: PathBuf },
}

#[derive(clap::Args, Debug)]
struct PlayOptions {
    /// Playback speed multiplier
    #[arg(long, default_value = "1.0")]
    speed: f64,

    /// Start position, as a fraction of the duration
    #[arg(long)]
    start: Option<f64>,

    /// Output volume between 0 and 1
    #[arg(long)]
    volume: Option<f32>,

    /// Play without sound
    #[arg(long)]
    mute: bool,

    /// Save the last presented frame as PNG when playback ends
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

/// Commands read from stdin while playing.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Control {
    TogglePause,
    Seek(f64),
    Speed(f64),
    Quit,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vidplay=info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => PlayerConfig::load(path)?,
        None => PlayerConfig::default(),
    };

    match args.command {
        Command::Probe { path } => {
            let player = Player::new(file_backend()?, audio_output(), config)?;
            let info = player.probe(&path)?;
            print_info(&path, &info);
        }
        Command::Play { path, options } => {
            let player = Player::new(file_backend()?, audio_output(), config)?;
            play(&player, &path, &options)?;
        }
        Command::Demo { seconds, options } => {
            let media = SyntheticMedia::new(Duration::from_secs(seconds.max(1)));
            let player = Player::new(SyntheticBackend::new(media), audio_output(), config)?;
            play(&player, Path::new("demo"), &options)?;
        }
        Command::Dump { path, output } => {
            dump(&file_backend()?, &path, &output)?;
        }
    }

    Ok(())
}

#[cfg(feature = "ffmpeg")]
fn file_backend() -> anyhow::Result<vidplay::FfmpegBackend> {
    let backend = vidplay::FfmpegBackend::new()?;
    tracing::debug!("using {}", vidplay::ffmpeg_version());
    Ok(backend)
}

#[cfg(not(feature = "ffmpeg"))]
fn file_backend() -> anyhow::Result<SyntheticBackend> {
    bail!("vidplay was built without the `ffmpeg` feature; only `demo` is available")
}

#[cfg(feature = "cpal")]
fn audio_output() -> impl AudioOutput + 'static {
    vidplay::CpalOutput
}

#[cfg(not(feature = "cpal"))]
fn audio_output() -> impl AudioOutput + 'static {
    vidplay::NullOutput
}

fn play(player: &Player, path: &Path, options: &PlayOptions) -> anyhow::Result<()> {
    player.set_data_source(path);
    if !player.set_speed(options.speed) {
        bail!("speed must be a positive number, got {}", options.speed);
    }
    if let Some(volume) = options.volume {
        player.set_volume(volume);
    }
    if options.mute {
        player.set_volume(0.0);
    }

    let snapshot = SnapshotSurface::new();
    player.attach_surface(snapshot.clone());

    player.start()?;
    if let Some(info) = player.media_info() {
        print_info(path, &info);
    }
    if let Some(start) = options.start {
        player.seek(start)?;
    }
    println!("commands: p = pause/resume, s <0..1> = seek, x <speed> = speed, q = quit");

    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("vidplay-stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                match parse_control(&line) {
                    Some(control) => {
                        if tx.send(control).is_err() {
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => eprintln!("unknown command: {}", line.trim()),
                }
            }
        })?;

    // The progress poller: wakes up every interval, or early for a command
    let mut stdin_open = true;
    loop {
        let control = if stdin_open {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(control) => Some(control),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => {
                    stdin_open = false;
                    None
                }
            }
        } else {
            thread::sleep(POLL_INTERVAL);
            None
        };

        match control {
            Some(Control::TogglePause) => player.pause(player.state() == PlaybackState::Playing),
            Some(Control::Seek(fraction)) => {
                if let Err(e) = player.seek(fraction) {
                    eprintln!("seek failed: {e}");
                }
            }
            Some(Control::Speed(speed)) => {
                if !player.set_speed(speed) {
                    eprintln!("invalid speed: {speed}");
                }
            }
            Some(Control::Quit) => {
                player.stop();
            }
            None => {}
        }

        let state = player.state();
        print!(
            "\r{} / {}  {:>5.1}%  x{}  [{}]   ",
            format_time(player.position()),
            format_time(player.duration()),
            player.progress() * 100.0,
            player.speed(),
            state
        );
        io::stdout().flush()?;

        if state == PlaybackState::End {
            println!();
            break;
        }
    }

    if let Some(error) = player.last_error() {
        eprintln!("playback failed: {error}");
    }

    let stats = player.stats();
    println!(
        "presented {} frames, dropped {} late, {} decode errors, {} audio batches",
        stats.frames_presented, stats.frames_dropped, stats.decode_errors, stats.audio_frames_played
    );

    if let Some(out) = &options.snapshot {
        if snapshot.save_png(out)? {
            println!("saved last frame to {}", out.display());
        } else {
            println!("no frame was presented, nothing saved");
        }
    }

    Ok(())
}

fn dump(backend: &dyn MediaBackend, path: &Path, output: &Path) -> anyhow::Result<()> {
    let mut demuxer = backend.open(path)?;
    let mut decoder = demuxer
        .open_video_decoder()?
        .with_context(|| format!("{} has no video stream", path.display()))?;

    let file = File::create(output).with_context(|| format!("failed to create {}", output.display()))?;
    let mut writer = BufWriter::new(file);
    let mut frames = 0usize;
    let mut size = (0, 0);

    let mut write_frames = |decoded: Vec<vidplay::media_types::VideoFrame>| -> io::Result<()> {
        for frame in decoded {
            size = (frame.width, frame.height);
            writer.write_all(&frame.data)?;
            frames += 1;
        }
        Ok(())
    };

    while let Some(packet) = demuxer.read_packet()? {
        if !packet.is_video() {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => write_frames(decoded)?,
            Err(e) => tracing::warn!(pts = ?packet.pts, "skipping undecodable packet: {e}"),
        }
    }
    write_frames(decoder.flush()?)?;
    writer.flush()?;

    println!(
        "wrote {frames} frames of {}x{} RGBA to {}",
        size.0,
        size.1,
        output.display()
    );
    Ok(())
}

fn parse_control(line: &str) -> Option<Control> {
    let mut parts = line.split_whitespace();
    let command = parts.next()?;
    let value = parts.next().and_then(|v| v.parse::<f64>().ok());
    match (command, value) {
        ("p", None) => Some(Control::TogglePause),
        ("s", Some(fraction)) => Some(Control::Seek(fraction)),
        ("x", Some(speed)) => Some(Control::Speed(speed)),
        ("q", None) => Some(Control::Quit),
        _ => None,
    }
}

fn print_info(path: &Path, info: &MediaInfo) {
    println!("{}: {}", path.display(), format_time(info.duration));
    if let Some(video) = &info.video {
        let fps = video
            .frame_rate
            .map(|r| format!(" @ {:.2} fps", r.to_f64()))
            .unwrap_or_default();
        println!("  video: {} {}x{}{fps}", video.codec, video.width, video.height);
    }
    if let Some(audio) = &info.audio {
        println!(
            "  audio: {} {} Hz, {} channels",
            audio.codec, audio.sample_rate, audio.channels
        );
    }
}

fn format_time(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!(
        "{:02}:{:02}.{}",
        secs / 60,
        secs % 60,
        duration.subsec_millis() / 100
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stdin_commands() {
        assert_eq!(parse_control("p"), Some(Control::TogglePause));
        assert_eq!(parse_control(" s 0.25 "), Some(Control::Seek(0.25)));
        assert_eq!(parse_control("x 2"), Some(Control::Speed(2.0)));
        assert_eq!(parse_control("q"), Some(Control::Quit));
        assert_eq!(parse_control("s"), None);
        assert_eq!(parse_control("jump"), None);
    }

    #[test]
    fn formats_times() {
        assert_eq!(format_time(Duration::from_millis(65_400)), "01:05.4");
        assert_eq!(format_time(Duration::ZERO), "00:00.0");
    }

    #[test]
    fn cli_parses_play_options() {
        let args = Args::try_parse_from(["vidplay", "play", "movie.mp4", "--speed", "2", "--mute"]).unwrap();
        match args.command {
            Command::Play { path, options } => {
                assert_eq!(path, PathBuf::from("movie.mp4"));
                assert_eq!(options.speed, 2.0);
                assert!(options.mute);
                assert!(options.start.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
