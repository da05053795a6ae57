use std::path::{Path, PathBuf};

use camelia_core::{
    analyze_song, ApproxMetrics, AssetStore, BackgroundSpec, ColorMask, Ffmpeg, MainClipSpec,
    MediaBackend, MusicVideo, OutputSettings, Platform, Recorder, RenderJob, TextPreset,
    TextTiming, VideoConfig,
};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

fn main() -> camelia_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render { args, dry_run } => run_job(&args.into_job()?, dry_run),
        Commands::Job { path, dry_run } => run_job(&RenderJob::from_json_file(&path)?, dry_run),
        Commands::Analyze { input, output } => run_analyze(&input, output.as_deref()),
    }
}

fn run_job(job: &RenderJob, dry_run: bool) -> camelia_core::Result<()> {
    tracing::info!(audio = %job.audio.display(), output = %job.output.path.display(), "starting render");

    let backend = Ffmpeg::default();
    backend.ensure_available()?;
    let video = MusicVideo::from_job(job, &backend)?;
    let mut assets = AssetStore::new();
    let layers = video.plan_layers(job, &mut assets, &backend, &ApproxMetrics::default())?;
    let composition = video.compose(layers, job.cut)?;
    let recorder = Recorder::with_ffmpeg(job.output.clone(), backend.ffmpeg.clone());

    if dry_run {
        let args = recorder.command_args(&composition, &job.output.temp_audio_path());
        let line: Vec<String> = args
            .iter()
            .map(|arg| shell_quote(&arg.to_string_lossy()))
            .collect();
        println!("{} {}", backend.ffmpeg.display(), line.join(" "));
        return Ok(());
    }

    recorder.record(&composition)
}

fn run_analyze(input: &Path, output: Option<&Path>) -> camelia_core::Result<()> {
    tracing::info!(?input, ?output, "analysing song");

    let backend = Ffmpeg::default();
    backend.ensure_available()?;
    let song = backend.decode_song(input)?;
    let summary = analyze_song(&song)?;
    let json = serde_json::to_string_pretty(&summary)?;

    match output {
        Some(path) => std::fs::write(path, json)?,
        None => println!("{json}"),
    }
    Ok(())
}

fn shell_quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:+=@".contains(c))
    {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "BPM-synchronised music video generator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render a video described by command line flags.
    Render {
        #[command(flatten)]
        args: RenderArgs,
        /// Print the ffmpeg command instead of running it.
        #[arg(long)]
        dry_run: bool,
    },
    /// Render a video described by a JSON job file.
    Job {
        path: PathBuf,
        /// Print the ffmpeg command instead of running it.
        #[arg(long)]
        dry_run: bool,
    },
    /// Detect the tempo of an audio file and report it as JSON.
    Analyze {
        /// Path to the audio file that should be analysed.
        input: PathBuf,
        /// Write the report here instead of stdout.
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Song to put under the video.
    #[arg(long)]
    audio: PathBuf,
    /// Main looping clip.
    #[arg(long)]
    clip: PathBuf,
    /// Output video file.
    #[arg(short, long)]
    output: PathBuf,
    #[arg(long)]
    artist: String,
    #[arg(long)]
    track: String,
    /// Tempo of the song. Detected from the audio when omitted.
    #[arg(long)]
    bpm: Option<f64>,
    /// Tempo of the main clip. When omitted the clip is one perfect loop.
    #[arg(long)]
    video_bpm: Option<f64>,
    /// Beat at which the main clip appears.
    #[arg(long)]
    drop_beats: Option<u32>,
    /// Background clip looped behind the main clip; repeatable.
    #[arg(long = "background")]
    backgrounds: Vec<PathBuf>,
    /// Align background clips to the beat.
    #[arg(long)]
    sync_backgrounds: bool,
    /// Key out this colour from the main clip, as `RRGGBB`.
    #[arg(long, value_parser = parse_hex_color)]
    mask_color: Option<[u8; 3]>,
    #[arg(long, default_value_t = 20)]
    mask_threshold: u8,
    #[arg(long, default_value_t = 10)]
    mask_softness: u8,
    #[arg(long, default_value_t = Platform::Instagram)]
    platform: Platform,
    #[arg(long, default_value_t = 30)]
    fps: u32,
    #[arg(long, default_value_t = TextPreset::Fancy)]
    text_preset: TextPreset,
    #[arg(long, default_value_t = TextTiming::BeforeDrop)]
    text_timing: TextTiming,
    #[arg(long, default_value_t = 0.5)]
    text_width: f64,
    #[arg(long, default_value_t = 1.0)]
    square_prop: f64,
    /// Seconds of crossfade between loops; negative leads into the drop.
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    crossfade: f64,
    /// Keep a single loop per beat instead of packing as many as fit.
    #[arg(long)]
    no_optimize_loop: bool,
    #[arg(long)]
    watermark: bool,
    /// Truncate the video to this many seconds.
    #[arg(long)]
    cut: Option<f64>,
    #[arg(long, default_value = "libx264")]
    codec: String,
    #[arg(long, default_value = "aac")]
    audio_codec: String,
}

impl RenderArgs {
    fn into_job(self) -> camelia_core::Result<RenderJob> {
        let video = VideoConfig {
            platform: self.platform,
            fps: self.fps,
            text_preset: self.text_preset,
            text_timing: self.text_timing,
            text_width_prop: self.text_width,
            square_prop: self.square_prop,
            crossfade: self.crossfade,
            optimize_loop: !self.no_optimize_loop,
            watermark: self.watermark,
            ..VideoConfig::default()
        };
        video.validate()?;

        let mut output = OutputSettings::new(self.output);
        output.codec = self.codec;
        output.audio_codec = self.audio_codec;

        let sync = self.sync_backgrounds;
        Ok(RenderJob {
            audio: self.audio,
            music_bpm: self.bpm,
            main_clip: MainClipSpec {
                path: self.clip,
                video_bpm: self.video_bpm,
                mask: self.mask_color.map(|color| ColorMask {
                    color,
                    threshold: self.mask_threshold,
                    softness: self.mask_softness,
                }),
            },
            backgrounds: self
                .backgrounds
                .into_iter()
                .map(|path| BackgroundSpec { path, sync })
                .collect(),
            artist: self.artist,
            track: self.track,
            drop_beats: self.drop_beats,
            cut: self.cut,
            video,
            output,
        })
    }
}

fn parse_hex_color(value: &str) -> Result<[u8; 3], String> {
    let hex = value.trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("`{value}` is not an RRGGBB colour"));
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| e.to_string());
    Ok([channel(0)?, channel(2)?, channel(4)?])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_render_flags_into_job() {
        let cli = Cli::try_parse_from([
            "camelia",
            "render",
            "--audio",
            "assets/boombap.mp3",
            "--clip",
            "assets/mpc_vid_89bpm.mp4",
            "--output",
            "results/numero13.mp4",
            "--artist",
            "NUMERO 13",
            "--track",
            "Boom bap!",
            "--bpm",
            "91",
            "--video-bpm",
            "87.4",
            "--drop-beats",
            "14",
            "--background",
            "assets/boreal_static.gif",
            "--sync-backgrounds",
            "--mask-color",
            "EBEEE7",
            "--crossfade",
            "-0.5",
            "--cut",
            "30",
        ])
        .unwrap();

        let Commands::Render { args, dry_run } = cli.command else {
            panic!("expected render command");
        };
        assert!(!dry_run);
        let job = args.into_job().unwrap();
        assert_eq!(job.music_bpm, Some(91.0));
        assert_eq!(job.main_clip.video_bpm, Some(87.4));
        assert_eq!(job.main_clip.mask.unwrap().color, [0xEB, 0xEE, 0xE7]);
        assert_eq!(job.drop_beats, Some(14));
        assert!(job.backgrounds[0].sync);
        assert_eq!(job.video.crossfade, -0.5);
        assert!(job.video.optimize_loop);
        assert_eq!(job.output.codec, "libx264");
    }

    #[test]
    fn rejects_unknown_timing_mode() {
        let parsed = Cli::try_parse_from([
            "camelia",
            "render",
            "--audio",
            "a.mp3",
            "--clip",
            "c.mp4",
            "--output",
            "o.mp4",
            "--artist",
            "A",
            "--track",
            "B",
            "--text-timing",
            "sideways",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn hex_colors_parse() {
        assert_eq!(parse_hex_color("#ff0080").unwrap(), [255, 0, 128]);
        assert!(parse_hex_color("red").is_err());
    }

    #[test]
    fn quotes_shell_arguments_with_spaces() {
        assert_eq!(shell_quote("-filter_complex"), "-filter_complex");
        assert_eq!(shell_quote("a b"), "'a b'");
    }
}
