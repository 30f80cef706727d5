use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tracing_subscriber::EnvFilter;
use yuvenc::{
    CodecId, EncodingSession, FfmpegBackend, FfmpegLogLevel, SessionOptions, TestPattern,
};

const CLI_AFTER_HELP: &str = "Examples:\n  yuvenc encode out.mp4\n  yuvenc encode out.mkv --width 640 --height 480 --fps 30 --frames 90 --progress\n  yuvenc encode out.bin --container mpegts --codec mpeg2video --dump\n  yuvenc probe out.mp4 --json\n  yuvenc completions zsh > _yuvenc";

#[derive(Debug, Parser)]
#[command(
    name = "yuvenc",
    version,
    about = "Encode synthetic YUV 4:2:0 video and inspect the result",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show debug logging from the encoder session.
    #[arg(long, global = true)]
    verbose: bool,

    /// Allow overwriting existing output files.
    #[arg(long, global = true)]
    overwrite: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Encode a moving test pattern.
    #[command(
        about = "Encode a synthetic test pattern",
        after_help = "Examples:\n  yuvenc encode out.mp4\n  yuvenc encode out.mkv --frames 250 --bitrate 1000000 --gop 25"
    )]
    Encode {
        /// Output file. Its extension selects the container.
        output: PathBuf,
        /// Frame width in pixels (even).
        #[arg(long, default_value_t = 352)]
        width: u32,
        /// Frame height in pixels (even).
        #[arg(long, default_value_t = 288)]
        height: u32,
        /// Frames per second.
        #[arg(long, default_value_t = 25)]
        fps: u32,
        /// Number of frames to encode.
        #[arg(long, default_value_t = 25)]
        frames: u64,
        /// Target bit rate in bits per second.
        #[arg(long)]
        bitrate: Option<usize>,
        /// Maximum distance between key frames.
        #[arg(long)]
        gop: Option<u32>,
        /// Force a container by short name (mp4, matroska, mpegts, ...).
        #[arg(long)]
        container: Option<String>,
        /// Use this codec instead of the container's preferred one.
        #[arg(long)]
        codec: Option<String>,
        /// Print the negotiated container layout.
        #[arg(long)]
        dump: bool,
        /// Show a progress bar.
        #[arg(long)]
        progress: bool,
    },

    /// Summarise an encoded file.
    #[command(
        about = "Inspect an encoded file",
        after_help = "Examples:\n  yuvenc probe out.mp4\n  yuvenc probe out.mp4 --json --snapshot first.png"
    )]
    Probe {
        /// Encoded file.
        input: PathBuf,
        /// Output as machine-readable JSON.
        #[arg(long)]
        json: bool,
        /// Save the luma plane of the first decoded frame as an image.
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let default_directive = if verbose { "yuvenc=debug" } else { "yuvenc=warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    init_logging(global.verbose);

    if let Some(level) = &global.log_level {
        let parsed: FfmpegLogLevel = level.parse()?;
        yuvenc::set_ffmpeg_log_level(parsed);
    }

    Ok(())
}

struct EncodeArgs {
    output: PathBuf,
    width: u32,
    height: u32,
    fps: u32,
    frames: u64,
    progress: bool,
}

fn session_options(
    bitrate: Option<usize>,
    gop: Option<u32>,
    container: Option<String>,
    codec: Option<String>,
    dump: bool,
) -> SessionOptions {
    let mut options = SessionOptions::default().dump_format(dump);
    if let Some(bit_rate) = bitrate {
        options = options.bit_rate(bit_rate);
    }
    if let Some(gop_size) = gop {
        options = options.gop_size(gop_size);
    }
    if let Some(name) = container {
        options = options.container(name);
    }
    if let Some(name) = codec {
        options = options.codec(CodecId::new(name));
    }
    options
}

/// Run `step` once per frame index, ticking `bar`. The bar is abandoned at
/// the first failure so the error is printed below it.
fn for_each_frame<E>(
    bar: Option<&ProgressBar>,
    frames: u64,
    mut step: impl FnMut(u64) -> Result<(), E>,
) -> Result<(), E> {
    for index in 0..frames {
        if let Err(error) = step(index) {
            if let Some(bar) = bar {
                bar.abandon();
            }
            return Err(error);
        }
        if let Some(bar) = bar {
            bar.inc(1);
        }
    }
    Ok(())
}

fn encode(
    args: EncodeArgs,
    options: &SessionOptions,
    overwrite: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    ensure_writable_path(&args.output, overwrite)?;

    let mut session = EncodingSession::open_with(
        FfmpegBackend::new()?,
        &args.output,
        args.width,
        args.height,
        args.fps,
        options,
    )?;

    let progress = if args.progress {
        let bar = ProgressBar::new(args.frames);
        let style =
            ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}")?;
        bar.set_style(style.progress_chars("##-"));
        Some(bar)
    } else {
        None
    };

    let pattern = TestPattern::new(args.width, args.height);
    let mut frame = pattern.frame(0);
    for_each_frame(progress.as_ref(), args.frames, |index| {
        pattern.fill(index, &mut frame.y, &mut frame.u, &mut frame.v);
        session.submit_frame(&frame.buffer())
    })?;

    let codec = session
        .codec()
        .map(ToString::to_string)
        .unwrap_or_default();
    let container = session
        .container()
        .map(|container| container.name.clone())
        .unwrap_or_default();
    let summary = session.close().inspect_err(|_| {
        if let Some(bar) = &progress {
            bar.abandon();
        }
    })?;

    if let Some(bar) = progress {
        bar.finish_with_message("done");
    }

    println!(
        "{} {} ({container}/{codec}, {} frames, {} packets)",
        "saved".green().bold(),
        args.output.display(),
        summary.frames_submitted,
        summary.packets_written,
    );
    Ok(())
}

fn probe(
    input: &Path,
    json: bool,
    snapshot: Option<PathBuf>,
    overwrite: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let report = yuvenc::probe::probe(input)?;

    if json {
        let payload = json!({
            "format": report.format,
            "codec": report.codec,
            "width": report.width,
            "height": report.height,
            "frame_rate": report.frame_rate.to_string(),
            "time_base": report.time_base.to_string(),
            "packets": report.packets,
            "keyframes": report.keyframes,
            "duration_seconds": report.duration.as_secs_f64(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("Format: {}", report.format);
        println!("Codec: {}", report.codec);
        println!("Size: {}x{}", report.width, report.height);
        println!("Frame rate: {}", report.frame_rate);
        println!("Time base: {}", report.time_base);
        println!("Packets: {} ({} key)", report.packets, report.keyframes);
        println!("Duration: {:.3}s", report.duration.as_secs_f64());
    }

    if let Some(path) = snapshot {
        ensure_writable_path(&path, overwrite)?;
        let frames = yuvenc::probe::decode_frames(input)?;
        let first = frames.first().ok_or("no decodable frames")?;
        first.save_luma(&path)?;
        eprintln!("{} {}", "saved".green().bold(), path.display());
    }

    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Encode {
            output,
            width,
            height,
            fps,
            frames,
            bitrate,
            gop,
            container,
            codec,
            dump,
            progress,
        } => {
            let options = session_options(bitrate, gop, container, codec, dump);
            let args = EncodeArgs {
                output,
                width,
                height,
                fps,
                frames,
                progress,
            };
            encode(args, &options, cli.global.overwrite)?;
        }
        Commands::Probe {
            input,
            json,
            snapshot,
        } => probe(&input, json, snapshot, cli.global.overwrite)?,
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "yuvenc", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use indicatif::ProgressBar;

    use super::{Cli, Commands, for_each_frame, session_options};
    use yuvenc::{CodecId, DEFAULT_BIT_RATE};

    #[test]
    fn encode_defaults_match_the_sample_program() {
        let cli = Cli::try_parse_from(["yuvenc", "encode", "out.mp4"]).unwrap();
        match cli.command {
            Commands::Encode {
                width,
                height,
                fps,
                frames,
                ..
            } => {
                assert_eq!((width, height, fps, frames), (352, 288, 25, 25));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_flags_are_accepted_after_the_subcommand() {
        let cli = Cli::try_parse_from([
            "yuvenc",
            "encode",
            "out.mp4",
            "--overwrite",
            "--verbose",
            "--log-level",
            "error",
        ])
        .unwrap();
        assert!(cli.global.overwrite);
        assert!(cli.global.verbose);
        assert_eq!(cli.global.log_level.as_deref(), Some("error"));
    }

    #[test]
    fn session_options_follow_flags() {
        let options = session_options(
            None,
            Some(25),
            Some("matroska".to_string()),
            Some("mpeg4".to_string()),
            true,
        );
        assert_eq!(options.bit_rate, DEFAULT_BIT_RATE);
        assert_eq!(options.gop_size, 25);
        assert_eq!(options.container.as_deref(), Some("matroska"));
        assert_eq!(options.codec, Some(CodecId::MPEG4));
        assert!(options.dump_format);
    }

    #[test]
    fn failed_frame_abandons_the_progress_bar() {
        let bar = ProgressBar::hidden();
        bar.set_length(5);
        let result = for_each_frame(Some(&bar), 5, |index| {
            if index == 3 { Err("disk full") } else { Ok(()) }
        });
        assert_eq!(result, Err("disk full"));
        assert_eq!(bar.position(), 3);
        assert!(bar.is_finished());
    }

    #[test]
    fn completed_frames_leave_the_bar_running() {
        let bar = ProgressBar::hidden();
        bar.set_length(4);
        let mut seen = Vec::new();
        let result: Result<(), &str> = for_each_frame(Some(&bar), 4, |index| {
            seen.push(index);
            Ok(())
        });
        assert!(result.is_ok());
        assert_eq!(seen, vec![0, 1, 2, 3]);
        assert_eq!(bar.position(), 4);
        assert!(!bar.is_finished());
    }

    #[test]
    fn probe_requires_an_input() {
        assert!(Cli::try_parse_from(["yuvenc", "probe"]).is_err());
    }
}
